// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Enums stored as TEXT columns. `as_str` is the persisted spelling.
macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(LedgerError::validation(
                        $field,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The shop acquires currency or goods; the gold buy rate applies.
    Buy,
    /// The shop disposes of currency or goods; the gold sell rate applies.
    Sell,
}

text_enum!(Direction, "direction", { Buy => "BUY", Sell => "SELL" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotSource {
    Live,
    Backfill,
}

text_enum!(SnapshotSource, "source", { Live => "LIVE", Backfill => "BACKFILL" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: i64,
    pub gold_buy: Decimal,
    pub gold_sell: Decimal,
    pub usd_buy: Option<Decimal>,
    pub usd_sell: Option<Decimal>,
    pub eur_buy: Option<Decimal>,
    pub eur_sell: Option<Decimal>,
    pub source: SnapshotSource,
    pub effective_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
}

/// Rates for a snapshot that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotRates {
    pub gold_buy: Decimal,
    pub gold_sell: Decimal,
    pub usd_buy: Option<Decimal>,
    pub usd_sell: Option<Decimal>,
    pub eur_buy: Option<Decimal>,
    pub eur_sell: Option<Decimal>,
}

impl PriceSnapshot {
    pub fn rates(&self) -> SnapshotRates {
        SnapshotRates {
            gold_buy: self.gold_buy,
            gold_sell: self.gold_sell,
            usd_buy: self.usd_buy,
            usd_sell: self.usd_sell,
            eur_buy: self.eur_buy,
            eur_sell: self.eur_sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyKind {
    Customer,
    Supplier,
    Cash,
    Bank,
}

text_enum!(PartyKind, "kind", {
    Customer => "CUSTOMER",
    Supplier => "SUPPLIER",
    Cash => "CASH",
    Bank => "BANK",
});

/// A counterparty. `balance` is in gold-equivalent units:
/// positive means we owe the party, negative means the party owes us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: i64,
    pub name: String,
    pub kind: PartyKind,
    pub is_active: bool,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackType {
    Fifo,
    Pool,
    Unique,
}

text_enum!(TrackType, "track_type", { Fifo => "FIFO", Pool => "POOL", Unique => "UNIQUE" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaborType {
    PerGram,
    PerPiece,
}

text_enum!(LaborType, "labor_type", { PerGram => "PER_GRAM", PerPiece => "PER_PIECE" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Karat {
    pub id: i64,
    pub code: String,
    pub fineness: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub track_type: TrackType,
    pub labor_type: LaborType,
    /// Default labor rate in gold-equivalent units (per gram or per piece).
    pub labor_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    Sold,
    Reserved,
}

text_enum!(StockStatus, "stock_status", {
    InStock => "IN_STOCK",
    Sold => "SOLD",
    Reserved => "RESERVED",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub code: String,
    pub product_type_id: i64,
    pub karat_id: i64,
    pub weight: Decimal,
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub stock_status: StockStatus,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn total_cost(&self) -> Decimal {
        self.material_cost + self.labor_cost
    }
}

/// A FIFO batch of fungible weight. `unit_cost` is gold units per gram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLot {
    pub id: i64,
    pub product_type_id: i64,
    pub karat_id: i64,
    pub product_id: Option<i64>,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub unit_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPool {
    pub product_type_id: i64,
    pub karat_id: i64,
    pub total_weight: Decimal,
    pub total_cost: Decimal,
}

impl StockPool {
    pub fn average_cost_per_gram(&self) -> Decimal {
        if self.total_weight.is_zero() {
            Decimal::ZERO
        } else {
            self.total_cost / self.total_weight
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Purchase,
    Sale,
    Payment,
    Receipt,
    Exchange,
    Hurda,
}

text_enum!(TransactionType, "type_code", {
    Purchase => "PURCHASE",
    Sale => "SALE",
    Payment => "PAYMENT",
    Receipt => "RECEIPT",
    Exchange => "EXCHANGE",
    Hurda => "HURDA",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    Inventory,
    Payment,
    Fx,
    Fee,
    Discount,
    GoldScrapPayment,
}

text_enum!(LineKind, "kind", {
    Inventory => "INVENTORY",
    Payment => "PAYMENT",
    Fx => "FX",
    Fee => "FEE",
    Discount => "DISCOUNT",
    GoldScrapPayment => "GOLD_SCRAP_PAYMENT",
});

/// Kind-specific part of a ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineDetail {
    Inventory {
        product_id: Option<i64>,
        product_type: String,
        karat: String,
        weight: Decimal,
    },
    Payment {
        currency: String,
        amount: Decimal,
        direction: Direction,
    },
    Fx {
        currency: String,
        amount: Decimal,
        direction: Direction,
    },
    Fee {
        reason: String,
    },
    Discount {
        reason: String,
    },
    GoldScrapPayment {
        karat: String,
        weight: Decimal,
        fineness: Decimal,
    },
}

impl LineDetail {
    pub fn kind(&self) -> LineKind {
        match self {
            Self::Inventory { .. } => LineKind::Inventory,
            Self::Payment { .. } => LineKind::Payment,
            Self::Fx { .. } => LineKind::Fx,
            Self::Fee { .. } => LineKind::Fee,
            Self::Discount { .. } => LineKind::Discount,
            Self::GoldScrapPayment { .. } => LineKind::GoldScrapPayment,
        }
    }

    pub fn currency_amount(&self) -> Option<(&str, Decimal)> {
        match self {
            Self::Payment {
                currency, amount, ..
            }
            | Self::Fx {
                currency, amount, ..
            } => Some((currency.as_str(), *amount)),
            _ => None,
        }
    }
}

/// One economic movement inside a transaction. `has_amount` is signed
/// from the party's point of view: it is what the line adds to their balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub detail: LineDetail,
    pub has_amount: Decimal,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl TransactionLine {
    pub fn new(detail: LineDetail, has_amount: Decimal, meta: serde_json::Value) -> Self {
        Self {
            detail,
            has_amount,
            meta,
        }
    }

    pub fn kind(&self) -> LineKind {
        self.detail.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub code: String,
    pub type_code: TransactionType,
    pub party_id: Option<i64>,
    pub transaction_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub total_has: Decimal,
    pub currency: Option<String>,
    pub currency_amount: Option<Decimal>,
    pub snapshot_id: i64,
    pub lines: Vec<TransactionLine>,
    pub meta: serde_json::Value,
    pub version: i64,
    pub idempotency_key: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub entity: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub diff: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
