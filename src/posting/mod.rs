// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The posting engine.
//!
//! Every request goes through the same skeleton inside one IMMEDIATE SQLite
//! transaction: shape validation, idempotency replay, party check, snapshot
//! resolution, the type-specific computation (which mutates inventory),
//! the balance increment, best-effort secondary effects, and finally the
//! ledger row plus its audit entry. Any error before commit rolls back every
//! mutation made for the request.

pub mod exchange;
pub mod payment;
pub mod purchase;
pub mod sale;
pub mod scrap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::audit::{self, AuditCtx};
use crate::balance;
use crate::config::{LedgerConfig, GOLD_UNIT};
use crate::convert;
use crate::error::{LedgerError, LedgerResult, SecondaryEffectError};
use crate::models::{
    Direction, FinancialTransaction, LineDetail, PartyKind, PriceSnapshot, TransactionLine,
    TransactionType,
};
use crate::parties;
use crate::pricing;
use crate::utils::{
    dec_col, fmt_ts, opt_dec_col, parse_business_time, parse_ts, round_fiat, round_has,
};

pub use exchange::ExchangeBody;
pub use payment::SettlementBody;
pub use purchase::{PurchaseBody, PurchaseLine, SettlementMode};
pub use sale::{SaleBody, SaleLine};
pub use scrap::{HurdaBody, ScrapLine};

/// A currency movement attached to a transaction. `amount` is in `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyLeg {
    pub currency: String,
    pub amount: Decimal,
    #[serde(default)]
    pub direction: Option<Direction>,
}

impl CurrencyLeg {
    pub fn new(currency: &str, amount: Decimal) -> Self {
        Self {
            currency: currency.to_string(),
            amount,
            direction: None,
        }
    }

    fn normalize(&mut self) {
        self.amount = round_amount(&self.currency, self.amount);
    }

    fn validate(&self, field: &str) -> LedgerResult<()> {
        if self.currency.trim().is_empty() {
            return Err(LedgerError::validation(format!("{field}.currency"), "is required"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!("{field}.amount"), "must be positive"));
        }
        Ok(())
    }
}

/// Gold-unit amounts keep 6 places, fiat amounts 2.
fn round_amount(currency: &str, amount: Decimal) -> Decimal {
    if currency.trim().eq_ignore_ascii_case(GOLD_UNIT) {
        round_has(amount)
    } else {
        round_fiat(amount)
    }
}

/// Rounds an optional gold figure taken from a request.
fn round_opt_has(value: &mut Option<Decimal>) {
    if let Some(v) = value.as_mut() {
        *v = round_has(*v);
    }
}

/// Type-specific payload, tagged by `type_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type_code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingBody {
    Purchase(PurchaseBody),
    Sale(SaleBody),
    Payment(SettlementBody),
    Receipt(SettlementBody),
    Exchange(ExchangeBody),
    Hurda(HurdaBody),
}

impl PostingBody {
    pub fn type_code(&self) -> TransactionType {
        match self {
            Self::Purchase(_) => TransactionType::Purchase,
            Self::Sale(_) => TransactionType::Sale,
            Self::Payment(_) => TransactionType::Payment,
            Self::Receipt(_) => TransactionType::Receipt,
            Self::Exchange(_) => TransactionType::Exchange,
            Self::Hurda(_) => TransactionType::Hurda,
        }
    }

    /// Round every gold figure and weight to storage precision.
    fn normalize(&mut self) {
        match self {
            Self::Purchase(b) => b.normalize(),
            Self::Sale(b) => b.normalize(),
            Self::Payment(b) | Self::Receipt(b) => b.normalize(),
            Self::Exchange(b) => b.normalize(),
            Self::Hurda(b) => b.normalize(),
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        match self {
            Self::Purchase(b) => b.validate(),
            Self::Sale(b) => b.validate(),
            Self::Payment(b) | Self::Receipt(b) => b.validate(self.type_code()),
            Self::Exchange(b) => b.validate(),
            Self::Hurda(b) => b.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRequest {
    #[serde(default)]
    pub party_id: Option<i64>,
    /// ISO-8601 date or date-time; absent means now.
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(flatten)]
    pub body: PostingBody,
}

impl PostingRequest {
    pub fn new(party_id: Option<i64>, body: PostingBody) -> Self {
        Self {
            party_id,
            transaction_date: None,
            idempotency_key: None,
            note: None,
            body,
        }
    }

    pub fn at(mut self, date: &str) -> Self {
        self.transaction_date = Some(date.to_string());
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    fn validate(&self) -> LedgerResult<()> {
        let needs_party = self.body.type_code() != TransactionType::Exchange;
        match (needs_party, self.party_id) {
            (true, None) => return Err(LedgerError::validation("party_id", "is required")),
            (false, Some(_)) => {
                return Err(LedgerError::validation(
                    "party_id",
                    "exchange transactions have no party",
                ));
            }
            _ => {}
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(LedgerError::validation("idempotency_key", "must not be blank"));
            }
        }
        self.body.validate()
    }
}

/// What the caller gets back, stored with the transaction and replayed
/// verbatim for a repeated idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingResponse {
    pub code: String,
    pub type_code: TransactionType,
    pub party_id: Option<i64>,
    pub transaction_at: DateTime<Utc>,
    pub total_has: Decimal,
    pub currency: Option<String>,
    pub currency_amount: Option<Decimal>,
    pub snapshot_id: i64,
    pub lines: Vec<TransactionLine>,
    pub party_balance_after: Option<Decimal>,
    #[serde(default)]
    pub warnings: Vec<SecondaryEffectError>,
}

/// Everything a handler needs besides its own body.
pub struct HandlerCtx<'a> {
    pub cfg: &'a LedgerConfig,
    pub snapshot: &'a PriceSnapshot,
    pub audit: AuditCtx<'a>,
    pub at: DateTime<Utc>,
}

impl HandlerCtx<'_> {
    /// Convert a currency leg to gold units, returning the normalized leg
    /// (currency upper-cased, fiat rounded to cents, direction filled in).
    pub fn convert_leg(
        &self,
        leg: &CurrencyLeg,
        default: Direction,
    ) -> LedgerResult<(CurrencyLeg, Decimal)> {
        let currency = leg.currency.trim().to_uppercase();
        let direction = leg.direction.unwrap_or(default);
        let amount = round_amount(&currency, leg.amount);
        let has = convert::to_gold_units(self.cfg, self.snapshot, amount, &currency, direction)?;
        Ok((
            CurrencyLeg {
                currency,
                amount,
                direction: Some(direction),
            },
            has,
        ))
    }
}

/// A cash register movement: positive flows into the register.
#[derive(Debug, Clone, PartialEq)]
pub struct CashLeg {
    pub currency: String,
    pub amount: Decimal,
}

/// Result of a handler's type-specific computation.
#[derive(Debug, Clone, Default)]
pub struct Computed {
    pub lines: Vec<TransactionLine>,
    pub total_has: Decimal,
    pub currency: Option<String>,
    pub currency_amount: Option<Decimal>,
    pub cash: Vec<CashLeg>,
    pub meta: Value,
}

fn new_code(type_code: TransactionType, at: &DateTime<Utc>) -> String {
    let prefix = match type_code {
        TransactionType::Purchase => "PUR",
        TransactionType::Sale => "SAL",
        TransactionType::Payment => "PAY",
        TransactionType::Receipt => "REC",
        TransactionType::Exchange => "EXC",
        TransactionType::Hurda => "HUR",
    };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix[..10].to_uppercase())
}

fn stored_response(
    conn: &Connection,
    key: &str,
    actor: &str,
) -> LedgerResult<Option<PostingResponse>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT response FROM financial_transactions
             WHERE idempotency_key=?1 AND created_by=?2",
            params![key, actor],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match raw {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    })
}

fn is_unique_violation(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

/// Post one transaction. Replays return the stored response and touch nothing.
#[instrument(
    skip(conn, cfg, req),
    fields(type_code = %req.body.type_code(), key = ?req.idempotency_key)
)]
pub fn post(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    actor: &str,
    req: &PostingRequest,
) -> LedgerResult<PostingResponse> {
    if actor.trim().is_empty() {
        return Err(LedgerError::validation("created_by", "is required"));
    }
    let mut req = req.clone();
    req.body.normalize();
    req.validate()?;
    let type_code = req.body.type_code();
    let transaction_at = parse_business_time(req.transaction_date.as_deref(), Utc::now())?;

    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if let Some(key) = &req.idempotency_key {
        if let Some(previous) = stored_response(&tx, key, actor)? {
            info!(code = %previous.code, "idempotent replay");
            return Ok(previous);
        }
    }

    let party = match req.party_id {
        Some(id) => Some(parties::require_active(&tx, id)?),
        None => None,
    };
    let snapshot = pricing::resolve(&tx, transaction_at)?;
    let code = new_code(type_code, &transaction_at);
    let hctx = HandlerCtx {
        cfg,
        snapshot: &snapshot,
        audit: AuditCtx::new(actor, &code),
        at: transaction_at,
    };

    let computed = match &req.body {
        PostingBody::Purchase(b) => purchase::compute(&tx, &hctx, b)?,
        PostingBody::Sale(b) => sale::compute(&tx, &hctx, b)?,
        PostingBody::Payment(b) => payment::compute(&tx, &hctx, b, TransactionType::Payment)?,
        PostingBody::Receipt(b) => payment::compute(&tx, &hctx, b, TransactionType::Receipt)?,
        PostingBody::Exchange(b) => exchange::compute(&tx, &hctx, b)?,
        PostingBody::Hurda(b) => scrap::compute(&tx, &hctx, b)?,
    };
    debug_assert_eq!(
        computed.lines.iter().map(|l| l.has_amount).sum::<Decimal>(),
        computed.total_has,
        "line amounts must add up to the transaction total"
    );

    let party_balance_after = match &party {
        Some(p) => Some(balance::adjust_balance(&tx, p.id, computed.total_has, &hctx.audit)?.after),
        None => None,
    };
    let warnings = apply_cash_movements(&mut tx, cfg, &code, transaction_at, &computed.cash);

    let response = PostingResponse {
        code: code.clone(),
        type_code,
        party_id: req.party_id,
        transaction_at,
        total_has: computed.total_has,
        currency: computed.currency.clone(),
        currency_amount: computed.currency_amount,
        snapshot_id: snapshot.id,
        lines: computed.lines.clone(),
        party_balance_after,
        warnings,
    };

    let mut meta = match computed.meta {
        Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    if let Some(note) = &req.note {
        meta.insert("note".into(), json!(note));
    }
    let key = req.idempotency_key.as_deref();
    if let Err(e) = insert_transaction(&tx, actor, key, &response, &Value::Object(meta)) {
        if let (true, Some(key)) = (is_unique_violation(&e), &req.idempotency_key) {
            drop(tx);
            warn!(%key, "lost idempotency race, replaying winner");
            return stored_response(conn, key, actor)?.ok_or(e);
        }
        return Err(e);
    }
    audit::record(
        &tx,
        "financial_transaction",
        &code,
        "create",
        actor,
        Value::Null,
        serde_json::to_value(&response)?,
    )?;
    tx.commit()?;

    info!(
        %code,
        total_has = %response.total_has,
        lines = response.lines.len(),
        "transaction posted"
    );
    Ok(response)
}

fn insert_transaction(
    conn: &Connection,
    actor: &str,
    idempotency_key: Option<&str>,
    resp: &PostingResponse,
    meta: &Value,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO financial_transactions(code, type_code, party_id, transaction_at, created_at,
                status, total_has, currency, currency_amount, snapshot_id, meta, response, version,
                idempotency_key, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, 'COMPLETED', ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?13)",
        params![
            resp.code,
            resp.type_code.as_str(),
            resp.party_id,
            fmt_ts(&resp.transaction_at),
            fmt_ts(&Utc::now()),
            resp.total_has.to_string(),
            resp.currency,
            resp.currency_amount.map(|d| d.to_string()),
            resp.snapshot_id,
            serde_json::to_string(meta)?,
            serde_json::to_string(resp)?,
            idempotency_key,
            actor,
        ],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transaction_lines(transaction_code, position, kind, has_amount, currency,
                                       currency_amount, detail, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (i, line) in resp.lines.iter().enumerate() {
        let fx = line.detail.currency_amount();
        stmt.execute(params![
            resp.code,
            i as i64,
            line.kind().as_str(),
            line.has_amount.to_string(),
            fx.map(|(c, _)| c.to_string()),
            fx.map(|(_, a)| a.to_string()),
            serde_json::to_string(&line.detail)?,
            serde_json::to_string(&line.meta)?,
        ])?;
    }
    Ok(())
}

/// Record cash register movements, each in its own savepoint. A failure is
/// rolled back alone and reported, never propagated.
fn apply_cash_movements(
    tx: &mut rusqlite::Transaction<'_>,
    cfg: &LedgerConfig,
    code: &str,
    at: DateTime<Utc>,
    legs: &[CashLeg],
) -> Vec<SecondaryEffectError> {
    let Some(register) = cfg.cash_register_party_id else {
        return Vec::new();
    };
    let mut warnings = Vec::new();
    for leg in legs.iter().filter(|l| l.currency != GOLD_UNIT) {
        if let Err(e) = record_cash_movement(tx, register, code, at, leg) {
            let err = SecondaryEffectError {
                effect: "cash_movement".into(),
                message: e.to_string(),
            };
            warn!(%code, register, error = %err, "secondary effect failed");
            warnings.push(err);
        }
    }
    warnings
}

fn record_cash_movement(
    tx: &mut rusqlite::Transaction<'_>,
    register: i64,
    code: &str,
    at: DateTime<Utc>,
    leg: &CashLeg,
) -> LedgerResult<()> {
    let sp = tx.savepoint()?;
    let register_party = parties::get_party(&sp, register)?;
    if !matches!(register_party.kind, PartyKind::Cash | PartyKind::Bank) {
        return Err(LedgerError::validation(
            "cash_register_party_id",
            format!("party '{}' is not a cash or bank account", register_party.name),
        ));
    }
    sp.execute(
        "INSERT INTO cash_movements(transaction_code, register_party_id, currency, amount,
                                    created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![code, register, leg.currency, leg.amount.to_string(), fmt_ts(&at)],
    )?;
    sp.commit()?;
    Ok(())
}

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<(FinancialTransaction, String)> {
    let type_code: String = r.get(1)?;
    let meta: String = r.get(10)?;
    Ok((
        FinancialTransaction {
            code: r.get(0)?,
            type_code: type_code.parse().map_err(|e: LedgerError| {
                let kind = rusqlite::types::Type::Text;
                rusqlite::Error::FromSqlConversionFailure(1, kind, Box::new(e))
            })?,
            party_id: r.get(2)?,
            transaction_at: parse_ts(&r.get::<_, String>(3)?)?,
            created_at: parse_ts(&r.get::<_, String>(4)?)?,
            status: r.get(5)?,
            total_has: dec_col(&r.get::<_, String>(6)?)?,
            currency: r.get(7)?,
            currency_amount: opt_dec_col(r.get(8)?)?,
            snapshot_id: r.get(9)?,
            lines: Vec::new(),
            meta: Value::Null,
            version: r.get(11)?,
            idempotency_key: r.get(12)?,
            created_by: r.get(13)?,
        },
        meta,
    ))
}

const TRANSACTION_COLUMNS: &str = "code, type_code, party_id, transaction_at, created_at, status, \
     total_has, currency, currency_amount, snapshot_id, meta, version, idempotency_key, created_by";

fn load_lines(conn: &Connection, code: &str) -> LedgerResult<Vec<TransactionLine>> {
    let mut stmt = conn.prepare_cached(
        "SELECT detail, has_amount, meta FROM transaction_lines
         WHERE transaction_code=?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![code], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (detail, has, meta) = row?;
        let detail: LineDetail = serde_json::from_str(&detail)?;
        out.push(TransactionLine::new(detail, dec_col(&has)?, serde_json::from_str(&meta)?));
    }
    Ok(out)
}

pub fn get_transaction(conn: &Connection, code: &str) -> LedgerResult<FinancialTransaction> {
    let (mut tx, meta) = conn
        .query_row(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM financial_transactions WHERE code=?1"),
            params![code],
            transaction_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("transaction", code))?;
    tx.meta = serde_json::from_str(&meta)?;
    tx.lines = load_lines(conn, code)?;
    Ok(tx)
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub party_id: Option<i64>,
    pub type_code: Option<TransactionType>,
    pub limit: Option<usize>,
}

/// Newest first. Lines are not loaded; use `get_transaction` for those.
pub fn list_transactions(
    conn: &Connection,
    filter: &TransactionFilter,
) -> LedgerResult<Vec<FinancialTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM financial_transactions
         WHERE (?1 IS NULL OR party_id=?1) AND (?2 IS NULL OR type_code=?2)
         ORDER BY transaction_at DESC, id DESC LIMIT ?3"
    ))?;
    let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
    let rows = stmt.query_map(
        params![filter.party_id, filter.type_code.map(|t| t.as_str()), limit],
        transaction_from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        let (mut tx, meta) = row?;
        tx.meta = serde_json::from_str(&meta)?;
        out.push(tx);
    }
    Ok(out)
}

/// Signed sum of a party's transaction totals, which the stored balance must equal.
pub fn ledger_total_for_party(conn: &Connection, party_id: i64) -> LedgerResult<Decimal> {
    let mut stmt = conn.prepare_cached(
        "SELECT total_has FROM financial_transactions WHERE party_id=?1 AND status='COMPLETED'",
    )?;
    let rows = stmt.query_map(params![party_id], |r| r.get::<_, String>(0))?;
    let mut total = Decimal::ZERO;
    for row in rows {
        total += dec_col(&row?)?;
    }
    Ok(total)
}
