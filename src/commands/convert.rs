// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use super::arg;
use crate::config::{LedgerConfig, GOLD_UNIT};
use crate::convert::{from_gold_units, to_gold_units};
use crate::models::Direction;
use crate::pricing;
use crate::utils::{parse_business_time, parse_decimal};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let cfg = LedgerConfig::load(conn)?;
    let amount = parse_decimal(arg(m, "amount")?)?;
    let currency = arg(m, "currency")?.to_uppercase();
    let direction: Direction = arg(m, "direction")?.parse()?;
    let at = parse_business_time(m.get_one::<String>("at").map(|s| s.as_str()), Utc::now())?;
    let snapshot = pricing::resolve(conn, at)?;

    let (from, to) = if m.get_flag("reverse") {
        let res = from_gold_units(&cfg, &snapshot, amount, &currency, direction)?;
        ((amount, GOLD_UNIT), (res, currency.as_str()))
    } else {
        let res = to_gold_units(&cfg, &snapshot, amount, &currency, direction)?;
        ((amount, currency.as_str()), (res, GOLD_UNIT))
    };
    println!(
        "{} {} -> {} {} (snapshot {}, {})",
        from.0, from.1, to.0, to.1, snapshot.id, direction
    );
    Ok(())
}
