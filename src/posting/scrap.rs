// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! HURDA: scrap gold taken in as payment-in-kind, plus the scrap stock
//! helpers shared with scrap-gold payments.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Computed, HandlerCtx};
use crate::catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory;
use crate::models::{Karat, LineDetail, TrackType, TransactionLine};
use crate::utils::round_has;

/// Product type that holds scrap stock.
pub const SCRAP_PRODUCT_TYPE: &str = "HURDA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapLine {
    pub karat: String,
    pub weight: Decimal,
}

impl ScrapLine {
    pub fn new(karat: &str, weight: Decimal) -> Self {
        Self {
            karat: karat.to_string(),
            weight,
        }
    }
}

pub(super) fn validate_scrap_lines(field: &str, lines: &[ScrapLine]) -> LedgerResult<()> {
    for (i, line) in lines.iter().enumerate() {
        if line.karat.trim().is_empty() {
            return Err(LedgerError::validation(format!("{field}[{i}].karat"), "is required"));
        }
        if line.weight <= Decimal::ZERO {
            return Err(LedgerError::validation(format!("{field}[{i}].weight"), "must be positive"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HurdaBody {
    pub lines: Vec<ScrapLine>,
}

impl HurdaBody {
    pub(super) fn normalize(&mut self) {
        for line in &mut self.lines {
            line.weight = round_has(line.weight);
        }
    }

    pub(super) fn validate(&self) -> LedgerResult<()> {
        if self.lines.is_empty() {
            return Err(LedgerError::validation("lines", "at least one scrap line is required"));
        }
        validate_scrap_lines("lines", &self.lines)
    }
}

/// Pure gold content of a scrap line.
pub fn scrap_has(karat: &Karat, weight: Decimal) -> Decimal {
    round_has(weight * karat.fineness)
}

/// Put scrap into stock at its gold content.
pub(super) fn stock_scrap(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    karat: &Karat,
    weight: Decimal,
    has: Decimal,
) -> LedgerResult<Value> {
    let pt = catalog::product_type_by_code(conn, SCRAP_PRODUCT_TYPE)?;
    match pt.track_type {
        TrackType::Pool => {
            let pool = inventory::add_to_pool(conn, &ctx.audit, pt.id, karat.id, weight, has)?;
            Ok(json!({ "pool_weight_after": pool.total_weight }))
        }
        TrackType::Fifo => {
            let lot = inventory::create_lot(
                conn,
                &ctx.audit,
                pt.id,
                karat.id,
                None,
                weight,
                karat.fineness,
                ctx.at,
            )?;
            Ok(json!({ "lot_id": lot.id }))
        }
        TrackType::Unique => Err(LedgerError::validation(
            "product_type",
            format!("{} must be tracked by weight", SCRAP_PRODUCT_TYPE),
        )),
    }
}

/// Take scrap out of stock; returns the cost relieved.
pub(super) fn draw_scrap(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    karat: &Karat,
    weight: Decimal,
) -> LedgerResult<(Decimal, Value)> {
    let pt = catalog::product_type_by_code(conn, SCRAP_PRODUCT_TYPE)?;
    match pt.track_type {
        TrackType::Fifo => {
            let draw = inventory::consume_fifo(conn, &ctx.audit, pt.id, karat.id, weight)?;
            let lots: Vec<i64> = draw.draws.iter().map(|d| d.lot_id).collect();
            Ok((draw.consumed_cost, json!({ "lots": lots })))
        }
        TrackType::Pool => {
            let draw = inventory::consume_from_pool(conn, &ctx.audit, pt.id, karat.id, weight)?;
            Ok((draw.cost, json!({ "pool_weight_after": draw.pool_after.total_weight })))
        }
        TrackType::Unique => Err(LedgerError::validation(
            "product_type",
            format!("{} must be tracked by weight", SCRAP_PRODUCT_TYPE),
        )),
    }
}

pub(super) fn compute(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    body: &HurdaBody,
) -> LedgerResult<Computed> {
    let mut lines = Vec::with_capacity(body.lines.len());
    let mut sum = Decimal::ZERO;
    for (i, input) in body.lines.iter().enumerate() {
        let karat = catalog::karat_by_code(conn, &input.karat)?;
        let has = scrap_has(&karat, input.weight);
        let mut meta = stock_scrap(conn, ctx, &karat, input.weight, has).map_err(|e| match e {
            LedgerError::Validation { field, message } => {
                LedgerError::validation(format!("lines[{i}].{field}"), message)
            }
            other => other,
        })?;
        meta["has"] = json!(has);
        lines.push(TransactionLine::new(
            LineDetail::GoldScrapPayment {
                karat: karat.code.clone(),
                weight: input.weight,
                fineness: karat.fineness,
            },
            -has,
            meta,
        ));
        sum += has;
    }
    Ok(Computed {
        lines,
        total_has: -sum,
        meta: json!({ "scrap_has": sum }),
        ..Computed::default()
    })
}
