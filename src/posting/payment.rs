// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! PAYMENT (we pay a party) and RECEIPT (a party pays us). The two are
//! mirror images: a payment lowers the party's balance by paid + discount,
//! a receipt raises it by received + discount. A fee charged on either
//! is booked against the party.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::scrap::{self, ScrapLine};
use super::{round_opt_has, CashLeg, Computed, CurrencyLeg, HandlerCtx};
use crate::catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Direction, LineDetail, TransactionLine, TransactionType};
use crate::utils::round_has;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SettlementBody {
    #[serde(default)]
    pub amount: Option<CurrencyLeg>,
    /// Scrap gold handed over instead of money. Payments only.
    #[serde(default)]
    pub scrap: Vec<ScrapLine>,
    /// Debt closed without money changing hands, in gold units.
    #[serde(default)]
    pub discount_has: Option<Decimal>,
    /// Handling charge taken from the party, in gold units.
    #[serde(default)]
    pub fee_has: Option<Decimal>,
}

impl SettlementBody {
    pub fn money(leg: CurrencyLeg) -> Self {
        Self {
            amount: Some(leg),
            ..Self::default()
        }
    }

    pub fn with_discount(mut self, has: Decimal) -> Self {
        self.discount_has = Some(has);
        self
    }

    pub fn with_fee(mut self, has: Decimal) -> Self {
        self.fee_has = Some(has);
        self
    }

    pub(super) fn normalize(&mut self) {
        if let Some(leg) = self.amount.as_mut() {
            leg.normalize();
        }
        for line in &mut self.scrap {
            line.weight = round_has(line.weight);
        }
        round_opt_has(&mut self.discount_has);
        round_opt_has(&mut self.fee_has);
    }

    pub(super) fn validate(&self, type_code: TransactionType) -> LedgerResult<()> {
        if let Some(leg) = &self.amount {
            leg.validate("amount")?;
        }
        if !self.scrap.is_empty() && type_code == TransactionType::Receipt {
            return Err(LedgerError::validation(
                "scrap",
                "scrap received from a party is posted as HURDA",
            ));
        }
        scrap::validate_scrap_lines("scrap", &self.scrap)?;
        if matches!(self.discount_has, Some(d) if d <= Decimal::ZERO) {
            return Err(LedgerError::validation("discount_has", "must be positive"));
        }
        if matches!(self.fee_has, Some(f) if f <= Decimal::ZERO) {
            return Err(LedgerError::validation("fee_has", "must be positive"));
        }
        if self.amount.is_none() && self.scrap.is_empty() && self.discount_has.is_none() {
            return Err(LedgerError::validation(
                "amount",
                "an amount, scrap lines or a discount is required",
            ));
        }
        Ok(())
    }
}

pub(super) fn compute(
    conn: &Connection,
    ctx: &HandlerCtx<'_>,
    body: &SettlementBody,
    type_code: TransactionType,
) -> LedgerResult<Computed> {
    let sign = if type_code == TransactionType::Payment {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };
    let mut out = Computed::default();
    let mut settled = Decimal::ZERO;

    if let Some(leg) = &body.amount {
        let (leg, has) = ctx.convert_leg(leg, Direction::Buy)?;
        out.lines.push(TransactionLine::new(
            LineDetail::Payment {
                currency: leg.currency.clone(),
                amount: leg.amount,
                direction: leg.direction.unwrap_or(Direction::Buy),
            },
            sign * has,
            json!({ "rate_source": ctx.snapshot.source }),
        ));
        out.currency = Some(leg.currency.clone());
        out.currency_amount = Some(leg.amount);
        out.cash.push(CashLeg {
            currency: leg.currency,
            amount: sign * leg.amount,
        });
        settled += has;
    }

    for (i, input) in body.scrap.iter().enumerate() {
        let karat = catalog::karat_by_code(conn, &input.karat)?;
        let has = scrap::scrap_has(&karat, input.weight);
        let (cost, mut meta) =
            scrap::draw_scrap(conn, ctx, &karat, input.weight).map_err(|e| match e {
                LedgerError::Validation { field, message } => {
                    LedgerError::validation(format!("scrap[{i}].{field}"), message)
                }
                other => other,
            })?;
        meta["cost_basis"] = json!(cost);
        out.lines.push(TransactionLine::new(
            LineDetail::GoldScrapPayment {
                karat: karat.code.clone(),
                weight: input.weight,
                fineness: karat.fineness,
            },
            sign * has,
            meta,
        ));
        settled += has;
    }

    if let Some(discount) = body.discount_has {
        let result = if type_code == TransactionType::Payment {
            "profit"
        } else {
            "loss"
        };
        out.lines.push(TransactionLine::new(
            LineDetail::Discount {
                reason: format!("{} discount", type_code.as_str().to_lowercase()),
            },
            sign * discount,
            json!({ "result": result }),
        ));
        settled += discount;
    }

    let fee = body.fee_has.unwrap_or_default();
    if fee > Decimal::ZERO {
        out.lines.push(TransactionLine::new(
            LineDetail::Fee {
                reason: format!("{} fee", type_code.as_str().to_lowercase()),
            },
            -fee,
            json!({ "fee_has": fee }),
        ));
    }

    out.total_has = sign * settled - fee;
    out.meta = json!({ "settled_has": settled, "fee_has": fee });
    Ok(out)
}
