// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{round_opt_has, CashLeg, Computed, CurrencyLeg, HandlerCtx};
use crate::catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::inventory::{self, NewProduct};
use crate::models::{Direction, LaborType, LineDetail, ProductType, TrackType, TransactionLine};
use crate::utils::round_has;

/// What to do with the gap between goods received and money paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Book the gap as profit or loss and leave the balance untouched.
    Settle,
    /// Carry the gap on the supplier's balance.
    #[default]
    Credit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLine {
    /// Buy back a previously sold unique item instead of creating a new one.
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub karat: String,
    #[serde(default)]
    pub weight: Decimal,
    /// Overrides the product type's labor rate.
    #[serde(default)]
    pub labor_rate: Option<Decimal>,
}

impl PurchaseLine {
    pub fn new(product_type: &str, karat: &str, weight: Decimal) -> Self {
        Self {
            product_id: None,
            product_type: product_type.to_string(),
            karat: karat.to_string(),
            weight,
            labor_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseBody {
    pub lines: Vec<PurchaseLine>,
    #[serde(default)]
    pub payment: Option<CurrencyLeg>,
    #[serde(default)]
    pub settlement: SettlementMode,
}

impl PurchaseBody {
    pub(super) fn normalize(&mut self) {
        for line in &mut self.lines {
            line.weight = round_has(line.weight);
            round_opt_has(&mut line.labor_rate);
        }
        if let Some(p) = self.payment.as_mut() {
            p.normalize();
        }
    }

    pub(super) fn validate(&self) -> LedgerResult<()> {
        if self.lines.is_empty() {
            return Err(LedgerError::validation("lines", "at least one line is required"));
        }
        for (i, line) in self.lines.iter().enumerate() {
            if line.product_id.is_some() {
                continue;
            }
            let field = |name: &str| format!("lines[{i}].{name}");
            if line.product_type.trim().is_empty() {
                return Err(LedgerError::validation(field("product_type"), "is required"));
            }
            if line.karat.trim().is_empty() {
                return Err(LedgerError::validation(field("karat"), "is required"));
            }
            if line.weight <= Decimal::ZERO {
                return Err(LedgerError::validation(field("weight"), "must be positive"));
            }
            if matches!(line.labor_rate, Some(r) if r < Decimal::ZERO) {
                return Err(LedgerError::validation(field("labor_rate"), "must not be negative"));
            }
        }
        if let Some(p) = &self.payment {
            p.validate("payment")?;
        }
        if self.settlement == SettlementMode::Settle && self.payment.is_none() {
            return Err(LedgerError::validation("settlement", "settle mode requires a payment"));
        }
        Ok(())
    }
}

fn labor_cost(pt: &ProductType, rate: Decimal, weight: Decimal) -> Decimal {
    match pt.labor_type {
        LaborType::PerGram => round_has(weight * rate),
        LaborType::PerPiece => round_has(rate),
    }
}

pub(super) fn compute(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    body: &PurchaseBody,
) -> LedgerResult<Computed> {
    let mut lines = Vec::with_capacity(body.lines.len() + 2);
    let mut inventory_total = Decimal::ZERO;

    for (i, input) in body.lines.iter().enumerate() {
        let line = match input.product_id {
            Some(product_id) => buy_back(conn, ctx, product_id)?,
            None => receive(conn, ctx, input)
                .map_err(|e| match e {
                    LedgerError::Validation { field, message } => {
                        LedgerError::validation(format!("lines[{i}].{field}"), message)
                    }
                    other => other,
                })?,
        };
        inventory_total += line.has_amount;
        lines.push(line);
    }

    let mut out = Computed {
        total_has: inventory_total,
        meta: json!({ "inventory_has": inventory_total, "settlement": body.settlement }),
        ..Computed::default()
    };

    if let Some(leg) = &body.payment {
        let (leg, paid) = ctx.convert_leg(leg, Direction::Buy)?;
        lines.push(TransactionLine::new(
            LineDetail::Payment {
                currency: leg.currency.clone(),
                amount: leg.amount,
                direction: leg.direction.unwrap_or(Direction::Buy),
            },
            -paid,
            json!({ "rate_source": ctx.snapshot.source }),
        ));
        out.total_has -= paid;
        out.currency = Some(leg.currency.clone());
        out.currency_amount = Some(leg.amount);
        out.cash.push(CashLeg {
            currency: leg.currency.clone(),
            amount: -leg.amount,
        });

        let difference = inventory_total - paid;
        if body.settlement == SettlementMode::Settle && !difference.is_zero() {
            let result = if difference > Decimal::ZERO { "profit" } else { "loss" };
            lines.push(TransactionLine::new(
                LineDetail::Discount {
                    reason: format!("purchase settlement {result}"),
                },
                -difference,
                json!({ "result": result, "amount": difference.abs() }),
            ));
            out.total_has -= difference;
        }
        out.meta["paid_has"] = json!(paid);
        out.meta["difference_has"] = json!(difference);
    }

    out.lines = lines;
    Ok(out)
}

fn receive(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    input: &PurchaseLine,
) -> LedgerResult<TransactionLine> {
    let pt = catalog::product_type_by_code(conn, &input.product_type)?;
    let karat = catalog::karat_by_code(conn, &input.karat)?;
    let weight = input.weight;
    let material = round_has(weight * karat.fineness);
    let labor = labor_cost(&pt, input.labor_rate.unwrap_or(pt.labor_rate), weight);
    let has = material + labor;

    let mut meta = json!({
        "track_type": pt.track_type,
        "fineness": karat.fineness,
        "material_cost": material,
        "labor_cost": labor,
    });
    let product_id = match pt.track_type {
        TrackType::Pool => {
            let pool = inventory::add_to_pool(conn, &ctx.audit, pt.id, karat.id, weight, has)?;
            meta["pool_weight_after"] = json!(pool.total_weight);
            None
        }
        TrackType::Fifo | TrackType::Unique => {
            let quantity = if pt.track_type == TrackType::Unique {
                Decimal::ONE
            } else {
                weight
            };
            let product = inventory::create_product(
                conn,
                &ctx.audit,
                &NewProduct {
                    product_type_id: pt.id,
                    karat_id: karat.id,
                    weight,
                    material_cost: material,
                    labor_cost: labor,
                    quantity,
                    source_tx: Some(ctx.audit.reference),
                    created_at: ctx.at,
                },
            )?;
            if pt.track_type == TrackType::Fifo {
                let lot = inventory::create_lot(
                    conn,
                    &ctx.audit,
                    pt.id,
                    karat.id,
                    Some(product.id),
                    weight,
                    round_has(has / weight),
                    ctx.at,
                )?;
                meta["lot_id"] = json!(lot.id);
            }
            meta["product_code"] = json!(product.code);
            Some(product.id)
        }
    };

    Ok(TransactionLine::new(
        LineDetail::Inventory {
            product_id,
            product_type: pt.code,
            karat: karat.code,
            weight,
        },
        has,
        meta,
    ))
}

fn buy_back(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    product_id: i64,
) -> LedgerResult<TransactionLine> {
    let product = inventory::get_product(conn, product_id)?;
    let pt = catalog::product_type_by_id(conn, product.product_type_id)?;
    if pt.track_type != TrackType::Unique {
        return Err(LedgerError::validation(
            "product_id",
            format!("only unique items can be bought back, {} is {}", pt.code, pt.track_type),
        ));
    }
    let karat = catalog::karat_by_id(conn, product.karat_id)?;
    let product = inventory::restock_unique(conn, &ctx.audit, product_id)?;
    let has = product.total_cost();
    Ok(TransactionLine::new(
        LineDetail::Inventory {
            product_id: Some(product.id),
            product_type: pt.code,
            karat: karat.code,
            weight: product.weight,
        },
        has,
        json!({
            "track_type": pt.track_type,
            "material_cost": product.material_cost,
            "labor_cost": product.labor_cost,
            "product_code": product.code,
            "restocked": true,
        }),
    ))
}
