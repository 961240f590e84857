// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{bail, Result};
use rusqlite::Connection;
use serde_json::json;

use super::arg;
use crate::posting::{self, TransactionFilter};
use crate::utils::fmt_ts;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(conn, sub),
        _ => Ok(()),
    }
}

fn export_transactions(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = arg(sub, "format")?.to_lowercase();
    let out = arg(sub, "out")?;
    if fmt != "csv" && fmt != "json" {
        bail!("Unknown format: {} (use csv|json)", fmt);
    }

    let mut data = posting::list_transactions(conn, &TransactionFilter::default())?;
    data.reverse();

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "code",
                "type",
                "transaction_at",
                "party_id",
                "total_has",
                "currency",
                "currency_amount",
                "snapshot_id",
                "created_by",
            ])?;
            for t in &data {
                wtr.write_record([
                    t.code.clone(),
                    t.type_code.to_string(),
                    fmt_ts(&t.transaction_at),
                    t.party_id.map(|p| p.to_string()).unwrap_or_default(),
                    t.total_has.to_string(),
                    t.currency.clone().unwrap_or_default(),
                    t.currency_amount.map(|a| a.to_string()).unwrap_or_default(),
                    t.snapshot_id.to_string(),
                    t.created_by.clone(),
                ])?;
            }
            wtr.flush()?;
        }
        _ => {
            let mut items = Vec::new();
            for t in &data {
                let full = posting::get_transaction(conn, &t.code)?;
                items.push(json!({
                    "code": full.code,
                    "type": full.type_code,
                    "transaction_at": fmt_ts(&full.transaction_at),
                    "party_id": full.party_id,
                    "total_has": full.total_has,
                    "currency": full.currency,
                    "currency_amount": full.currency_amount,
                    "snapshot_id": full.snapshot_id,
                    "created_by": full.created_by,
                    "lines": full.lines,
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
    }
    println!("Exported {} transactions to {}", data.len(), out);
    Ok(())
}
