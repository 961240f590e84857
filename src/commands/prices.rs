// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use super::arg;
use crate::config::LedgerConfig;
use crate::models::{PriceSnapshot, SnapshotRates};
use crate::pricing;
use crate::utils::{fmt_ts, maybe_print_json, parse_business_time, parse_decimal, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => {
            let limit = *sub.get_one::<usize>("limit").unwrap_or(&50);
            let data = pricing::list_snapshots(conn, limit)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                println!("{}", snapshot_table(&data));
            }
        }
        Some(("resolve", sub)) => {
            let at = sub.get_one::<String>("at").map(|s| s.as_str());
            let at = parse_business_time(at, Utc::now())?;
            let snap = pricing::resolve(conn, at)?;
            println!("{}", snapshot_table(&[snap]));
        }
        _ => {}
    }
    Ok(())
}

fn optional_rate(sub: &clap::ArgMatches, name: &str) -> Result<Option<rust_decimal::Decimal>> {
    sub.get_one::<String>(name).map(|s| parse_decimal(s)).transpose()
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let cfg = LedgerConfig::load(conn)?;
    let rates = SnapshotRates {
        gold_buy: parse_decimal(arg(sub, "gold-buy")?)?,
        gold_sell: parse_decimal(arg(sub, "gold-sell")?)?,
        usd_buy: optional_rate(sub, "usd-buy")?,
        usd_sell: optional_rate(sub, "usd-sell")?,
        eur_buy: optional_rate(sub, "eur-buy")?,
        eur_sell: optional_rate(sub, "eur-sell")?,
    };
    let at = parse_business_time(sub.get_one::<String>("at").map(|s| s.as_str()), Utc::now())?;
    let snap = pricing::record_snapshot(conn, &rates, at, cfg.feed_debounce)?;
    println!("Snapshot {} effective {}", snap.id, fmt_ts(&snap.effective_at));
    Ok(())
}

fn snapshot_table(data: &[PriceSnapshot]) -> comfy_table::Table {
    let opt = |d: Option<rust_decimal::Decimal>| {
        d.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
    };
    let rows = data
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                fmt_ts(&s.effective_at),
                s.source.to_string(),
                s.gold_buy.to_string(),
                s.gold_sell.to_string(),
                format!("{} / {}", opt(s.usd_buy), opt(s.usd_sell)),
                format!("{} / {}", opt(s.eur_buy), opt(s.eur_sell)),
            ]
        })
        .collect();
    pretty_table(
        &["Id", "Effective", "Source", "Gold buy", "Gold sell", "USD b/s", "EUR b/s"],
        rows,
    )
}
