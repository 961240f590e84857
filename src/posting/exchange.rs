// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{round_amount, CashLeg, Computed, CurrencyLeg, HandlerCtx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Direction, LineDetail, TransactionLine};

/// Internal currency swap: the shop takes in `from_amount` of
/// `from_currency` and hands out `to_amount` of `to_currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeBody {
    pub from_currency: String,
    pub from_amount: Decimal,
    pub to_currency: String,
    pub to_amount: Decimal,
    #[serde(default)]
    pub from_direction: Option<Direction>,
    #[serde(default)]
    pub to_direction: Option<Direction>,
}

impl ExchangeBody {
    pub fn new(
        from_currency: &str,
        from_amount: Decimal,
        to_currency: &str,
        to_amount: Decimal,
    ) -> Self {
        Self {
            from_currency: from_currency.to_string(),
            from_amount,
            to_currency: to_currency.to_string(),
            to_amount,
            from_direction: None,
            to_direction: None,
        }
    }

    pub(super) fn normalize(&mut self) {
        self.from_amount = round_amount(&self.from_currency, self.from_amount);
        self.to_amount = round_amount(&self.to_currency, self.to_amount);
    }

    pub(super) fn validate(&self) -> LedgerResult<()> {
        let from = CurrencyLeg::new(&self.from_currency, self.from_amount);
        let to = CurrencyLeg::new(&self.to_currency, self.to_amount);
        from.validate("from")?;
        to.validate("to")?;
        if from.currency.trim().eq_ignore_ascii_case(to.currency.trim()) {
            return Err(LedgerError::validation(
                "to_currency",
                "must differ from from_currency",
            ));
        }
        Ok(())
    }
}

pub(super) fn compute(
    _conn: &Connection,
    ctx: &HandlerCtx<'_>,
    body: &ExchangeBody,
) -> LedgerResult<Computed> {
    let (from, from_has) = ctx.convert_leg(
        &CurrencyLeg {
            currency: body.from_currency.clone(),
            amount: body.from_amount,
            direction: body.from_direction,
        },
        Direction::Buy,
    )?;
    let (to, to_has) = ctx.convert_leg(
        &CurrencyLeg {
            currency: body.to_currency.clone(),
            amount: body.to_amount,
            direction: body.to_direction,
        },
        Direction::Sell,
    )?;
    let spread = to_has - from_has;

    let lines = vec![
        TransactionLine::new(
            LineDetail::Fx {
                currency: from.currency.clone(),
                amount: from.amount,
                direction: from.direction.unwrap_or(Direction::Buy),
            },
            -from_has,
            json!({ "leg": "from" }),
        ),
        TransactionLine::new(
            LineDetail::Fx {
                currency: to.currency.clone(),
                amount: to.amount,
                direction: to.direction.unwrap_or(Direction::Sell),
            },
            to_has,
            json!({ "leg": "to" }),
        ),
    ];

    Ok(Computed {
        lines,
        total_has: spread,
        currency: Some(from.currency.clone()),
        currency_amount: Some(from.amount),
        cash: vec![
            CashLeg {
                currency: from.currency,
                amount: from.amount,
            },
            CashLeg {
                currency: to.currency,
                amount: -to.amount,
            },
        ],
        meta: json!({
            "from_has": from_has,
            "to_has": to_has,
            "spread_has": spread,
            "result": spread_result(spread),
        }),
    })
}

fn spread_result(spread: Decimal) -> &'static str {
    match spread.cmp(&Decimal::ZERO) {
        std::cmp::Ordering::Greater => "loss",
        std::cmp::Ordering::Less => "profit",
        std::cmp::Ordering::Equal => "even",
    }
}
