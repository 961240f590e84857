// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{round_opt_has, CashLeg, Computed, CurrencyLeg, HandlerCtx};
use crate::catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory;
use crate::models::{Direction, LineDetail, TrackType, TransactionLine};
use crate::utils::round_has;

/// One item or weight sold. Unique items are named by `product_id`;
/// fungible stock by `(product_type, karat, weight)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub karat: Option<String>,
    #[serde(default)]
    pub weight: Option<Decimal>,
    /// Negotiated price in gold units.
    pub sale_has: Decimal,
    /// Price before discount; defaults to `sale_has`.
    #[serde(default)]
    pub list_has: Option<Decimal>,
}

impl SaleLine {
    pub fn unique(product_id: i64, sale_has: Decimal) -> Self {
        Self {
            product_id: Some(product_id),
            product_type: None,
            karat: None,
            weight: None,
            sale_has,
            list_has: None,
        }
    }

    pub fn by_weight(product_type: &str, karat: &str, weight: Decimal, sale_has: Decimal) -> Self {
        Self {
            product_id: None,
            product_type: Some(product_type.to_string()),
            karat: Some(karat.to_string()),
            weight: Some(weight),
            sale_has,
            list_has: None,
        }
    }

    pub fn listed_at(mut self, list_has: Decimal) -> Self {
        self.list_has = Some(list_has);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleBody {
    pub lines: Vec<SaleLine>,
    /// Money collected now. Anything short of the sale value stays as debt.
    #[serde(default)]
    pub collected: Option<CurrencyLeg>,
    /// Charge added to the customer's debt, in gold units.
    #[serde(default)]
    pub fee_has: Option<Decimal>,
}

impl SaleBody {
    pub(super) fn normalize(&mut self) {
        for line in &mut self.lines {
            line.sale_has = round_has(line.sale_has);
            round_opt_has(&mut line.list_has);
            round_opt_has(&mut line.weight);
        }
        if let Some(c) = self.collected.as_mut() {
            c.normalize();
        }
        round_opt_has(&mut self.fee_has);
    }

    pub(super) fn validate(&self) -> LedgerResult<()> {
        if self.lines.is_empty() {
            return Err(LedgerError::validation("lines", "at least one line is required"));
        }
        for (i, line) in self.lines.iter().enumerate() {
            if line.sale_has <= Decimal::ZERO {
                return Err(LedgerError::validation(
                    format!("lines[{i}].sale_has"),
                    "must be positive",
                ));
            }
            if matches!(line.list_has, Some(list) if list < line.sale_has) {
                return Err(LedgerError::validation(
                    format!("lines[{i}].list_has"),
                    "must not be below sale_has",
                ));
            }
            if line.product_id.is_none() {
                if line.product_type.as_deref().is_none_or(|s| s.trim().is_empty()) {
                    return Err(LedgerError::validation(
                        format!("lines[{i}].product_type"),
                        "is required without product_id",
                    ));
                }
                if line.karat.as_deref().is_none_or(|s| s.trim().is_empty()) {
                    return Err(LedgerError::validation(
                        format!("lines[{i}].karat"),
                        "is required without product_id",
                    ));
                }
                if !matches!(line.weight, Some(w) if w > Decimal::ZERO) {
                    return Err(LedgerError::validation(
                        format!("lines[{i}].weight"),
                        "must be positive",
                    ));
                }
            }
        }
        if let Some(c) = &self.collected {
            c.validate("collected")?;
        }
        if matches!(self.fee_has, Some(f) if f <= Decimal::ZERO) {
            return Err(LedgerError::validation("fee_has", "must be positive"));
        }
        Ok(())
    }
}

struct Consumed {
    product_id: Option<i64>,
    product_type: String,
    karat: String,
    weight: Decimal,
    cost: Decimal,
    detail: Value,
}

fn consume(conn: &Connection, ctx: &HandlerCtx<'_>, line: &SaleLine) -> LedgerResult<Consumed> {
    if let Some(product_id) = line.product_id {
        let product = inventory::get_product(conn, product_id)?;
        let pt = catalog::product_type_by_id(conn, product.product_type_id)?;
        if pt.track_type != TrackType::Unique {
            return Err(LedgerError::validation(
                "product_id",
                format!("{} is tracked as {}, sell it by weight", pt.code, pt.track_type),
            ));
        }
        let karat = catalog::karat_by_id(conn, product.karat_id)?;
        let sold = inventory::sell_unique(conn, &ctx.audit, product_id)?;
        return Ok(Consumed {
            product_id: Some(sold.id),
            product_type: pt.code,
            karat: karat.code,
            weight: sold.weight,
            cost: sold.total_cost(),
            detail: json!({ "product_code": sold.code }),
        });
    }

    let pt = catalog::product_type_by_code(conn, line.product_type.as_deref().unwrap_or_default())?;
    let karat = catalog::karat_by_code(conn, line.karat.as_deref().unwrap_or_default())?;
    let weight = line.weight.unwrap_or_default();
    let (cost, detail) = match pt.track_type {
        TrackType::Fifo => {
            let draw = inventory::consume_fifo(conn, &ctx.audit, pt.id, karat.id, weight)?;
            let lots: Vec<i64> = draw.draws.iter().map(|d| d.lot_id).collect();
            (
                draw.consumed_cost,
                json!({
                    "lots": lots,
                    "average_unit_cost": draw.average_unit_cost,
                    "remaining_stock": draw.remainder,
                }),
            )
        }
        TrackType::Pool => {
            let draw = inventory::consume_from_pool(conn, &ctx.audit, pt.id, karat.id, weight)?;
            (
                draw.cost,
                json!({
                    "average_cost_per_gram": draw.average_cost_per_gram,
                    "pool_weight_after": draw.pool_after.total_weight,
                }),
            )
        }
        TrackType::Unique => {
            return Err(LedgerError::validation(
                "product_id",
                format!("{} items are sold individually by product_id", pt.code),
            ));
        }
    };
    Ok(Consumed {
        product_id: None,
        product_type: pt.code,
        karat: karat.code,
        weight,
        cost,
        detail,
    })
}

pub(super) fn compute(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    body: &SaleBody,
) -> LedgerResult<Computed> {
    let mut lines = Vec::new();
    let mut sale_total = Decimal::ZERO;
    let mut cost_total = Decimal::ZERO;

    for (i, input) in body.lines.iter().enumerate() {
        let consumed = consume(conn, ctx, input).map_err(|e| match e {
            LedgerError::Validation { field, message } => {
                LedgerError::validation(format!("lines[{i}].{field}"), message)
            }
            other => other,
        })?;
        let list = input.list_has.unwrap_or(input.sale_has);
        let discount = list - input.sale_has;
        let gross_profit = input.sale_has - consumed.cost;

        let mut meta = json!({
            "cost_basis": consumed.cost,
            "sale_has": input.sale_has,
            "list_has": list,
            "gross_profit": gross_profit,
        });
        if let (Value::Object(m), Value::Object(extra)) = (&mut meta, consumed.detail) {
            m.extend(extra);
        }
        lines.push(TransactionLine::new(
            LineDetail::Inventory {
                product_id: consumed.product_id,
                product_type: consumed.product_type,
                karat: consumed.karat,
                weight: consumed.weight,
            },
            -list,
            meta,
        ));
        if discount > Decimal::ZERO {
            lines.push(TransactionLine::new(
                LineDetail::Discount {
                    reason: format!("sale discount on line {i}"),
                },
                discount,
                json!({ "line": i }),
            ));
        }
        sale_total += input.sale_has;
        cost_total += consumed.cost;
    }

    let fee = body.fee_has.unwrap_or_default();
    if fee > Decimal::ZERO {
        lines.push(TransactionLine::new(
            LineDetail::Fee {
                reason: "sale fee".into(),
            },
            -fee,
            json!({ "fee_has": fee }),
        ));
    }

    let mut out = Computed {
        total_has: -sale_total - fee,
        ..Computed::default()
    };
    let mut collected_has = Decimal::ZERO;
    if let Some(leg) = &body.collected {
        let (leg, has) = ctx.convert_leg(leg, Direction::Buy)?;
        lines.push(TransactionLine::new(
            LineDetail::Payment {
                currency: leg.currency.clone(),
                amount: leg.amount,
                direction: leg.direction.unwrap_or(Direction::Buy),
            },
            has,
            json!({ "rate_source": ctx.snapshot.source }),
        ));
        out.total_has += has;
        out.currency = Some(leg.currency.clone());
        out.currency_amount = Some(leg.amount);
        out.cash.push(CashLeg {
            currency: leg.currency,
            amount: leg.amount,
        });
        collected_has = has;
    }

    out.meta = json!({
        "sale_has": sale_total,
        "cost_basis": cost_total,
        "gross_profit": sale_total - cost_total,
        "fee_has": fee,
        "collected_has": collected_has,
        "remaining_debt": (sale_total + fee - collected_has).max(Decimal::ZERO),
    });
    out.lines = lines;
    Ok(out)
}
