// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the posting engine and the services it composes.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing or invalid input. Never retried automatically.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),

    #[error("snapshot has no rate for {currency}")]
    MissingRate { currency: String },

    #[error("no price data available")]
    NoPriceDataAvailable,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// A failed non-critical effect (cash-register movement and the like).
///
/// These are reported next to a successful posting instead of failing it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{effect} failed: {message}")]
pub struct SecondaryEffectError {
    pub effect: String,
    pub message: String,
}
