// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::parties;
use crate::posting::ledger_total_for_party;
use crate::utils::{from_micro, pretty_table};

/// Read-only consistency checks. Returns one `[issue, detail]` row per finding.
pub fn check(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    // 1) Cached balances that drifted from the ledger
    for party in parties::list_parties(conn)? {
        let ledger = ledger_total_for_party(conn, party.id)?;
        if ledger != party.balance {
            rows.push(vec![
                "balance_mismatch".into(),
                format!(
                    "{} (id {}): balance {} vs ledger {}",
                    party.name, party.id, party.balance, ledger
                ),
            ]);
        }
    }

    // 2) Negative stock
    for (issue, sql) in [
        (
            "negative_lot",
            "SELECT 'lot ' || id, remaining_micro FROM stock_lots WHERE remaining_micro < 0",
        ),
        (
            "negative_product",
            "SELECT 'product ' || code, remaining_micro FROM products WHERE remaining_micro < 0",
        ),
        (
            "negative_pool",
            "SELECT 'pool ' || product_type_id || ':' || karat_id, weight_micro
             FROM stock_pools WHERE weight_micro < 0",
        ),
    ] {
        let mut stmt = conn.prepare(sql)?;
        let mut cur = stmt.query([])?;
        while let Some(r) = cur.next()? {
            let what: String = r.get(0)?;
            let micro: i64 = r.get(1)?;
            rows.push(vec![issue.into(), format!("{} at {}", what, from_micro(micro))]);
        }
    }

    // 3) Unique items marked sold that still report stock
    let mut stmt = conn.prepare(
        "SELECT code FROM products WHERE stock_status='SOLD' AND remaining_micro > 0",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let code: String = r.get(0)?;
        rows.push(vec!["sold_with_stock".into(), code]);
    }

    Ok(rows)
}

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = check(conn)?;
    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
