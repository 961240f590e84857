// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::Connection;
use serde::Serialize;
use std::time::Duration;

use crate::error::{LedgerError, LedgerResult};
use crate::utils::get_setting;

pub const KEY_BASE_CURRENCY: &str = "base_currency";
pub const KEY_SUPPORTED_CURRENCIES: &str = "supported_currencies";
pub const KEY_CASH_REGISTER: &str = "cash_register_party_id";
pub const KEY_FEED_DEBOUNCE_SECS: &str = "feed_debounce_secs";

/// The gold-equivalent unit. It converts to itself at 1:1.
pub const GOLD_UNIT: &str = "HAS";

/// Runtime settings handed to the conversion engine and posting handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerConfig {
    pub base_currency: String,
    pub supported_currencies: Vec<String>,
    pub cash_register_party_id: Option<i64>,
    pub feed_debounce: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: "TRY".to_string(),
            supported_currencies: ["TRY", "USD", "EUR", GOLD_UNIT]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            cash_register_party_id: None,
            feed_debounce: Duration::from_secs(5),
        }
    }
}

impl LedgerConfig {
    pub fn load(conn: &Connection) -> LedgerResult<Self> {
        let mut cfg = Self::default();
        if let Some(base) = get_setting(conn, KEY_BASE_CURRENCY)? {
            cfg.base_currency = base.trim().to_uppercase();
        }
        if let Some(list) = get_setting(conn, KEY_SUPPORTED_CURRENCIES)? {
            cfg.supported_currencies = list
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(raw) = get_setting(conn, KEY_CASH_REGISTER)? {
            let id = raw.trim().parse::<i64>().map_err(|_| {
                LedgerError::validation(KEY_CASH_REGISTER, format!("'{}' is not an id", raw))
            })?;
            cfg.cash_register_party_id = Some(id);
        }
        if let Some(raw) = get_setting(conn, KEY_FEED_DEBOUNCE_SECS)? {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                LedgerError::validation(
                    KEY_FEED_DEBOUNCE_SECS,
                    format!("'{}' is not a number", raw),
                )
            })?;
            cfg.feed_debounce = Duration::from_secs(secs);
        }
        if !cfg.supported_currencies.contains(&cfg.base_currency) {
            cfg.supported_currencies.push(cfg.base_currency.clone());
        }
        Ok(cfg)
    }

    pub fn is_supported(&self, currency: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == currency)
    }
}
