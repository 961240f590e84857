// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LedgerError, LedgerResult};

/// Decimal places kept for gold-equivalent amounts and weights.
pub const HAS_DP: u32 = 6;
/// Decimal places kept for fiat amounts.
pub const FIAT_DP: u32 = 2;

const MICRO: i64 = 1_000_000;

/// Round-half-up to 6 places. Every gold-equivalent figure goes through here.
pub fn round_has(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(HAS_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round-half-up to 2 places for fiat currency amounts.
pub fn round_fiat(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(FIAT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Fixed-point integer form used by columns that take atomic increments.
pub fn to_micro(d: Decimal) -> LedgerResult<i64> {
    (round_has(d) * Decimal::from(MICRO))
        .to_i64()
        .ok_or_else(|| LedgerError::validation("amount", format!("{} is out of range", d)))
}

pub fn from_micro(v: i64) -> Decimal {
    Decimal::new(v, HAS_DP).normalize()
}

pub fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| text_conversion_error(Box::new(e)))
}

fn text_conversion_error(e: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e)
}

/// Parse a decimal TEXT column.
pub fn dec_col(s: &str) -> rusqlite::Result<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| text_conversion_error(Box::new(e)))
}

pub fn opt_dec_col(s: Option<String>) -> rusqlite::Result<Option<Decimal>> {
    s.as_deref().map(dec_col).transpose()
}

/// Business timestamp of a transaction. Accepts RFC-3339, a naive
/// `YYYY-MM-DDTHH:MM:SS`, or a bare date (time of day taken from `now`).
pub fn parse_business_time(raw: Option<&str>, now: DateTime<Utc>) -> LedgerResult<DateTime<Utc>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now.trunc_subsecs(6));
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(6));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).trunc_subsecs(6));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc
            .from_utc_datetime(&date.and_time(now.time()))
            .trunc_subsecs(6));
    }
    Err(LedgerError::validation(
        "transaction_date",
        format!("'{}' is not an ISO-8601 date or date-time", raw),
    ))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

pub fn id_for_party(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM parties WHERE name=?1")?;
    let id: i64 = stmt
        .query_row(params![name], |r| r.get(0))
        .with_context(|| format!("Party '{}' not found", name))?;
    Ok(id)
}

pub fn get_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
        r.get(0)
    })
    .optional()
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_has(d("1.6949155")), d("1.694916"));
        assert_eq!(round_has(d("1.6949154")), d("1.694915"));
        assert_eq!(round_fiat(d("10.005")), d("10.01"));
        assert_eq!(round_fiat(d("-10.005")), d("-10.01"));
    }

    #[test]
    fn micro_units_are_exact() {
        assert_eq!(to_micro(d("20.025")).unwrap(), 20_025_000);
        assert_eq!(from_micro(-1_694_915), d("-1.694915"));
        assert_eq!(from_micro(to_micro(d("0.0000004")).unwrap()), Decimal::ZERO);
    }

    #[test]
    fn business_time_accepts_date_only() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 15, 30, 0).unwrap();
        let t = parse_business_time(Some("2025-01-10"), now).unwrap();
        assert_eq!(fmt_ts(&t), "2025-01-10T15:30:00.000000Z");

        let t = parse_business_time(Some("2025-01-10T08:00:00+03:00"), now).unwrap();
        assert_eq!(fmt_ts(&t), "2025-01-10T05:00:00.000000Z");

        let t = parse_business_time(None, now).unwrap();
        assert_eq!(t, now);

        assert!(parse_business_time(Some("10/01/2025"), now).is_err());
    }
}
