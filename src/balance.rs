// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Per-party running balance in gold-equivalent units.
//!
//! The balance is a write-through cache of the transaction history and only
//! ever moves by an atomic increment. Corrections are compensating increments.

use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::audit::{self, AuditCtx};
use crate::error::{LedgerError, LedgerResult};
use crate::utils::{from_micro, to_micro};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub before: Decimal,
    pub after: Decimal,
}

/// Add `delta` to the party's balance in a single UPDATE and return the
/// balance on both sides of the increment.
pub fn adjust_balance(
    conn: &Connection,
    party_id: i64,
    delta: Decimal,
    ctx: &AuditCtx<'_>,
) -> LedgerResult<BalanceChange> {
    let delta_micro = to_micro(delta)?;
    let after_micro: i64 = conn
        .query_row(
            "UPDATE parties SET balance_micro = balance_micro + ?2 WHERE id=?1
             RETURNING balance_micro",
            params![party_id, delta_micro],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("party", party_id))?;
    let change = BalanceChange {
        before: from_micro(after_micro - delta_micro),
        after: from_micro(after_micro),
    };
    debug!(party_id, %delta, after = %change.after, "balance adjusted");
    audit::record(
        conn,
        "party",
        &party_id.to_string(),
        "balance_adjust",
        ctx.actor,
        json!({ "balance": change.before }),
        json!({
            "balance": change.after,
            "delta": from_micro(delta_micro),
            "reference": ctx.reference,
        }),
    )?;
    Ok(change)
}
