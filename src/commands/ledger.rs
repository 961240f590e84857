// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use super::arg;
use crate::models::{FinancialTransaction, TransactionType};
use crate::posting::{self, TransactionFilter};
use crate::pricing;
use crate::utils::{fmt_ts, maybe_print_json, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => show(conn, arg(sub, "code")?)?,
        _ => {}
    }
    Ok(())
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> Result<Vec<FinancialTransaction>> {
    let filter = TransactionFilter {
        party_id: sub.get_one::<i64>("party").copied(),
        type_code: sub.get_one::<String>("type").map(|t| t.parse::<TransactionType>()).transpose()?,
        limit: sub.get_one::<usize>("limit").copied(),
    };
    Ok(posting::list_transactions(conn, &filter)?)
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = query_rows(conn, sub)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|t| {
            vec![
                t.code.clone(),
                t.type_code.to_string(),
                fmt_ts(&t.transaction_at),
                t.party_id.map(|p| p.to_string()).unwrap_or_default(),
                t.total_has.to_string(),
                match (&t.currency, t.currency_amount) {
                    (Some(c), Some(a)) => format!("{} {}", a, c),
                    _ => String::new(),
                },
                t.created_by.clone(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Code", "Type", "At", "Party", "Total (HAS)", "Amount", "By"], rows)
    );
    Ok(())
}

fn show(conn: &Connection, code: &str) -> Result<()> {
    let tx = posting::get_transaction(conn, code)?;
    let snap = pricing::get_snapshot(conn, tx.snapshot_id)?;
    println!(
        "{} {} at {} total {} HAS",
        tx.code,
        tx.type_code,
        fmt_ts(&tx.transaction_at),
        tx.total_has
    );
    println!(
        "priced at snapshot {} ({}, {}): gold {}/{}",
        snap.id,
        snap.source,
        fmt_ts(&snap.effective_at),
        snap.gold_buy,
        snap.gold_sell
    );
    let rows = tx
        .lines
        .iter()
        .map(|l| {
            vec![
                l.kind().to_string(),
                l.has_amount.to_string(),
                serde_json::to_string(&l.detail).unwrap_or_default(),
                l.meta.to_string(),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Kind", "HAS", "Detail", "Meta"], rows));
    Ok(())
}
