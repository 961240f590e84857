// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Price snapshots: recording feed ticks and resolving the rates in effect
//! at a transaction's business time.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{PriceSnapshot, SnapshotRates, SnapshotSource};
use crate::utils::{dec_col, fmt_ts, opt_dec_col, parse_ts};

const SNAPSHOT_COLUMNS: &str = "id, gold_buy, gold_sell, usd_buy, usd_sell, eur_buy, eur_sell, \
                                source, effective_at, raw_payload";

fn snapshot_from_row(r: &Row<'_>) -> rusqlite::Result<PriceSnapshot> {
    let source: String = r.get(7)?;
    let effective_at: String = r.get(8)?;
    Ok(PriceSnapshot {
        id: r.get(0)?,
        gold_buy: dec_col(&r.get::<_, String>(1)?)?,
        gold_sell: dec_col(&r.get::<_, String>(2)?)?,
        usd_buy: opt_dec_col(r.get(3)?)?,
        usd_sell: opt_dec_col(r.get(4)?)?,
        eur_buy: opt_dec_col(r.get(5)?)?,
        eur_sell: opt_dec_col(r.get(6)?)?,
        source: if source == "BACKFILL" {
            SnapshotSource::Backfill
        } else {
            SnapshotSource::Live
        },
        effective_at: parse_ts(&effective_at)?,
        raw_payload: r.get(9)?,
    })
}

pub fn get_snapshot(conn: &Connection, id: i64) -> LedgerResult<PriceSnapshot> {
    conn.query_row(
        &format!("SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE id=?1"),
        params![id],
        snapshot_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("price snapshot", id))
}

fn latest_on_or_before(
    conn: &Connection,
    at: &DateTime<Utc>,
) -> LedgerResult<Option<PriceSnapshot>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots
                 WHERE effective_at<=?1 ORDER BY effective_at DESC, id DESC LIMIT 1"
            ),
            params![fmt_ts(at)],
            snapshot_from_row,
        )
        .optional()?)
}

fn latest_by_source(
    conn: &Connection,
    source: Option<SnapshotSource>,
) -> LedgerResult<Option<PriceSnapshot>> {
    let snap = match source {
        Some(src) => conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots
                     WHERE source=?1 ORDER BY effective_at DESC, id DESC LIMIT 1"
                ),
                params![src.as_str()],
                snapshot_from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots
                     ORDER BY effective_at DESC, id DESC LIMIT 1"
                ),
                [],
                snapshot_from_row,
            )
            .optional()?,
    };
    Ok(snap)
}

fn validate_rates(rates: &SnapshotRates) -> LedgerResult<()> {
    let required = [("gold_buy", Some(rates.gold_buy)), ("gold_sell", Some(rates.gold_sell))];
    let optional = [
        ("usd_buy", rates.usd_buy),
        ("usd_sell", rates.usd_sell),
        ("eur_buy", rates.eur_buy),
        ("eur_sell", rates.eur_sell),
    ];
    for (field, value) in required.into_iter().chain(optional) {
        if let Some(v) = value {
            if v <= rust_decimal::Decimal::ZERO {
                return Err(LedgerError::validation(field, "rate must be positive"));
            }
        }
    }
    Ok(())
}

fn insert_snapshot(
    conn: &Connection,
    rates: &SnapshotRates,
    source: SnapshotSource,
    effective_at: &DateTime<Utc>,
    raw_payload: Option<&str>,
) -> LedgerResult<PriceSnapshot> {
    let opt = |d: Option<rust_decimal::Decimal>| d.map(|v| v.to_string());
    conn.execute(
        "INSERT OR IGNORE INTO price_snapshots
            (gold_buy, gold_sell, usd_buy, usd_sell, eur_buy, eur_sell,
             source, effective_at, raw_payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            rates.gold_buy.to_string(),
            rates.gold_sell.to_string(),
            opt(rates.usd_buy),
            opt(rates.usd_sell),
            opt(rates.eur_buy),
            opt(rates.eur_sell),
            source.as_str(),
            fmt_ts(effective_at),
            raw_payload,
        ],
    )?;
    // An existing row for the same (effective_at, source) wins; snapshots are immutable.
    Ok(conn.query_row(
        &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots WHERE effective_at=?1 AND source=?2"
        ),
        params![fmt_ts(effective_at), source.as_str()],
        snapshot_from_row,
    )?)
}

/// Record a LIVE tick from the price feed.
///
/// A tick whose rates match the latest LIVE snapshot taken less than
/// `debounce` earlier is merged into it and not stored again.
pub fn record_snapshot(
    conn: &Connection,
    rates: &SnapshotRates,
    effective_at: DateTime<Utc>,
    debounce: std::time::Duration,
) -> LedgerResult<PriceSnapshot> {
    validate_rates(rates)?;
    if let Some(last) = latest_by_source(conn, Some(SnapshotSource::Live))? {
        let window = Duration::from_std(debounce).unwrap_or_else(|_| Duration::zero());
        let age = effective_at - last.effective_at;
        if age >= Duration::zero() && age < window && last.rates() == *rates {
            debug!(snapshot_id = last.id, "tick merged into previous snapshot");
            return Ok(last);
        }
    }
    let payload = serde_json::to_string(rates)?;
    let snap = insert_snapshot(conn, rates, SnapshotSource::Live, &effective_at, Some(&payload))?;
    info!(
        snapshot_id = snap.id,
        effective_at = %fmt_ts(&snap.effective_at),
        "price snapshot recorded"
    );
    Ok(snap)
}

/// Find the snapshot in effect at `at`.
///
/// Falls back to copying the globally latest snapshot into a BACKFILL row
/// stamped at `at`, so later lookups around that time stay stable.
pub fn resolve(conn: &Connection, at: DateTime<Utc>) -> LedgerResult<PriceSnapshot> {
    if let Some(snap) = latest_on_or_before(conn, &at)? {
        debug!(snapshot_id = snap.id, source = %snap.source, "snapshot resolved");
        return Ok(snap);
    }
    let latest = latest_by_source(conn, None)?.ok_or(LedgerError::NoPriceDataAvailable)?;
    let payload = serde_json::json!({ "backfilled_from": latest.id }).to_string();
    let snap = insert_snapshot(
        conn,
        &latest.rates(),
        SnapshotSource::Backfill,
        &at,
        Some(&payload),
    )?;
    info!(
        snapshot_id = snap.id,
        copied_from = latest.id,
        effective_at = %fmt_ts(&at),
        "backfill snapshot synthesized"
    );
    Ok(snap)
}

pub fn list_snapshots(conn: &Connection, limit: usize) -> LedgerResult<Vec<PriceSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM price_snapshots
         ORDER BY effective_at DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], snapshot_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
