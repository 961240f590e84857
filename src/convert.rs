// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Conversion between fiat currencies and the gold-equivalent unit.
//!
//! Foreign fiat goes through the base currency first (snapshot cross-rate),
//! then base currency is divided by the gold buy or sell rate. Gold results are
//! rounded half-up to 6 places, fiat results to 2.

use rust_decimal::Decimal;

use crate::config::{LedgerConfig, GOLD_UNIT};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Direction, PriceSnapshot};
use crate::utils::{round_fiat, round_has};

fn normalize_currency(cfg: &LedgerConfig, currency: &str) -> LedgerResult<String> {
    let code = currency.trim().to_uppercase();
    if !cfg.is_supported(&code) {
        return Err(LedgerError::UnsupportedCurrency(code));
    }
    Ok(code)
}

fn gold_rate(snapshot: &PriceSnapshot, direction: Direction) -> LedgerResult<Decimal> {
    let rate = match direction {
        Direction::Buy => snapshot.gold_buy,
        Direction::Sell => snapshot.gold_sell,
    };
    if rate <= Decimal::ZERO {
        return Err(LedgerError::MissingRate {
            currency: GOLD_UNIT.to_string(),
        });
    }
    Ok(rate)
}

/// Units of base currency per one unit of `currency`.
fn cross_rate(
    cfg: &LedgerConfig,
    snapshot: &PriceSnapshot,
    currency: &str,
    direction: Direction,
) -> LedgerResult<Decimal> {
    if currency == cfg.base_currency {
        return Ok(Decimal::ONE);
    }
    let rate = match (currency, direction) {
        ("USD", Direction::Buy) => snapshot.usd_buy,
        ("USD", Direction::Sell) => snapshot.usd_sell,
        ("EUR", Direction::Buy) => snapshot.eur_buy,
        ("EUR", Direction::Sell) => snapshot.eur_sell,
        _ => None,
    };
    match rate {
        Some(r) if r > Decimal::ZERO => Ok(r),
        _ => Err(LedgerError::MissingRate {
            currency: currency.to_string(),
        }),
    }
}

/// Convert `amount` of `currency` into gold-equivalent units.
pub fn to_gold_units(
    cfg: &LedgerConfig,
    snapshot: &PriceSnapshot,
    amount: Decimal,
    currency: &str,
    direction: Direction,
) -> LedgerResult<Decimal> {
    let code = normalize_currency(cfg, currency)?;
    if code == GOLD_UNIT {
        return Ok(round_has(amount));
    }
    let base_amount = amount * cross_rate(cfg, snapshot, &code, direction)?;
    Ok(round_has(base_amount / gold_rate(snapshot, direction)?))
}

/// Convert gold-equivalent units back into `currency`.
pub fn from_gold_units(
    cfg: &LedgerConfig,
    snapshot: &PriceSnapshot,
    gold: Decimal,
    currency: &str,
    direction: Direction,
) -> LedgerResult<Decimal> {
    let code = normalize_currency(cfg, currency)?;
    if code == GOLD_UNIT {
        return Ok(round_has(gold));
    }
    let base_amount = gold * gold_rate(snapshot, direction)?;
    Ok(round_fiat(base_amount / cross_rate(cfg, snapshot, &code, direction)?))
}
