// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

use super::arg;
use crate::config::{
    LedgerConfig, KEY_BASE_CURRENCY, KEY_CASH_REGISTER, KEY_FEED_DEBOUNCE_SECS,
    KEY_SUPPORTED_CURRENCIES,
};
use crate::utils::{pretty_table, set_setting};

const KEYS: [&str; 4] = [
    KEY_BASE_CURRENCY,
    KEY_SUPPORTED_CURRENCIES,
    KEY_CASH_REGISTER,
    KEY_FEED_DEBOUNCE_SECS,
];

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => set(conn, arg(sub, "key")?, arg(sub, "value")?),
        Some(("show", _)) | None => show(conn),
        _ => Ok(()),
    }
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if !KEYS.contains(&key) {
        bail!("Unknown setting '{}' (expected one of: {})", key, KEYS.join(", "));
    }
    let tx = conn.unchecked_transaction()?;
    set_setting(&tx, key, value.trim())?;
    LedgerConfig::load(&tx).with_context(|| format!("Invalid value for {}", key))?;
    tx.commit()?;
    println!("{} = {}", key, value.trim());
    Ok(())
}

fn show(conn: &Connection) -> Result<()> {
    let cfg = LedgerConfig::load(conn)?;
    let rows = vec![
        vec![KEY_BASE_CURRENCY.to_string(), cfg.base_currency.clone()],
        vec![KEY_SUPPORTED_CURRENCIES.to_string(), cfg.supported_currencies.join(",")],
        vec![
            KEY_CASH_REGISTER.to_string(),
            cfg.cash_register_party_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".into()),
        ],
        vec![KEY_FEED_DEBOUNCE_SECS.to_string(), cfg.feed_debounce.as_secs().to_string()],
    ];
    println!("{}", pretty_table(&["Key", "Value"], rows));
    Ok(())
}
