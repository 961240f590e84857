// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Stock accounting. Three costing policies coexist and are picked by the
//! product type's track type:
//!
//! * FIFO lots: discrete batches consumed oldest-first at their own unit cost.
//! * POOL: one (weight, cost) pair per (product type, karat); consumption
//!   relieves cost at the pool's current moving average.
//! * UNIQUE: one product row per physical item, sold whole or not at all.
//!
//! None of these dedupe calls. The transaction-level idempotency check is the
//! only guard against double consumption.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::audit::{self, AuditCtx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Product, StockLot, StockPool, StockStatus};
use crate::utils::{dec_col, fmt_ts, from_micro, parse_ts, round_has, to_micro};

/// One lot's contribution to a FIFO consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FifoConsumption {
    pub consumed_cost: Decimal,
    pub average_unit_cost: Decimal,
    /// Stock left across all lots of the pair after this draw.
    pub remainder: Decimal,
    pub draws: Vec<LotDraw>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConsumption {
    pub cost: Decimal,
    pub average_cost_per_gram: Decimal,
    pub pool_after: StockPool,
}

pub struct NewProduct<'a> {
    pub product_type_id: i64,
    pub karat_id: i64,
    pub weight: Decimal,
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub quantity: Decimal,
    pub source_tx: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

const PRODUCT_COLUMNS: &str = "id, code, product_type_id, karat_id, weight, material_cost, \
     labor_cost, quantity_micro, remaining_micro, stock_status, created_at";

const LOT_COLUMNS: &str = "id, product_type_id, karat_id, product_id, quantity_micro, \
     remaining_micro, unit_cost, created_at";

fn product_from_row(r: &Row<'_>) -> rusqlite::Result<Product> {
    let status: String = r.get(9)?;
    Ok(Product {
        id: r.get(0)?,
        code: r.get(1)?,
        product_type_id: r.get(2)?,
        karat_id: r.get(3)?,
        weight: dec_col(&r.get::<_, String>(4)?)?,
        material_cost: dec_col(&r.get::<_, String>(5)?)?,
        labor_cost: dec_col(&r.get::<_, String>(6)?)?,
        quantity: from_micro(r.get(7)?),
        remaining_quantity: from_micro(r.get(8)?),
        stock_status: match status.as_str() {
            "SOLD" => StockStatus::Sold,
            "RESERVED" => StockStatus::Reserved,
            _ => StockStatus::InStock,
        },
        created_at: parse_ts(&r.get::<_, String>(10)?)?,
    })
}

fn lot_from_row(r: &Row<'_>) -> rusqlite::Result<StockLot> {
    Ok(StockLot {
        id: r.get(0)?,
        product_type_id: r.get(1)?,
        karat_id: r.get(2)?,
        product_id: r.get(3)?,
        quantity: from_micro(r.get(4)?),
        remaining: from_micro(r.get(5)?),
        unit_cost: dec_col(&r.get::<_, String>(6)?)?,
        created_at: parse_ts(&r.get::<_, String>(7)?)?,
    })
}

/// Rejects quantities that are not positive once held at micro precision,
/// returning the stored micro value.
fn require_positive(field: &str, value: Decimal) -> LedgerResult<i64> {
    let micro = to_micro(value)?;
    if micro <= 0 {
        return Err(LedgerError::validation(field, "must be positive"));
    }
    Ok(micro)
}

pub fn get_product(conn: &Connection, id: i64) -> LedgerResult<Product> {
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id=?1"),
        params![id],
        product_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("product", id))
}

pub fn create_product(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    new: &NewProduct<'_>,
) -> LedgerResult<Product> {
    let weight = from_micro(require_positive("weight", new.weight)?);
    let qty = require_positive("quantity", new.quantity)?;
    let code = format!(
        "PRD-{}",
        &uuid::Uuid::new_v4().simple().to_string()[..10].to_uppercase()
    );
    conn.execute(
        "INSERT INTO products(code, product_type_id, karat_id, weight, material_cost, labor_cost,
                              quantity_micro, remaining_micro, stock_status, source_tx, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 'IN_STOCK', ?8, ?9)",
        params![
            code,
            new.product_type_id,
            new.karat_id,
            weight.to_string(),
            round_has(new.material_cost).to_string(),
            round_has(new.labor_cost).to_string(),
            qty,
            new.source_tx,
            fmt_ts(&new.created_at),
        ],
    )?;
    let product = get_product(conn, conn.last_insert_rowid())?;
    audit::record(
        conn,
        "product",
        &product.id.to_string(),
        "create",
        ctx.actor,
        serde_json::Value::Null,
        serde_json::to_value(&product)?,
    )?;
    Ok(product)
}

/// Add a FIFO lot. `unit_cost` is gold units per gram.
#[allow(clippy::too_many_arguments)]
pub fn create_lot(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_type_id: i64,
    karat_id: i64,
    product_id: Option<i64>,
    quantity: Decimal,
    unit_cost: Decimal,
    created_at: DateTime<Utc>,
) -> LedgerResult<StockLot> {
    let qty = require_positive("quantity", quantity)?;
    if unit_cost < Decimal::ZERO {
        return Err(LedgerError::validation("unit_cost", "must not be negative"));
    }
    conn.execute(
        "INSERT INTO stock_lots(product_type_id, karat_id, product_id, quantity_micro,
                                remaining_micro, unit_cost, created_at)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
        params![
            product_type_id,
            karat_id,
            product_id,
            qty,
            unit_cost.to_string(),
            fmt_ts(&created_at)
        ],
    )?;
    let lot = conn.query_row(
        &format!("SELECT {LOT_COLUMNS} FROM stock_lots WHERE id=?1"),
        params![conn.last_insert_rowid()],
        lot_from_row,
    )?;
    audit::record(
        conn,
        "stock_lot",
        &lot.id.to_string(),
        "create",
        ctx.actor,
        serde_json::Value::Null,
        json!({ "lot": lot, "reference": ctx.reference }),
    )?;
    Ok(lot)
}

pub fn open_lots(
    conn: &Connection,
    product_type_id: i64,
    karat_id: i64,
) -> LedgerResult<Vec<StockLot>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LOT_COLUMNS} FROM stock_lots
         WHERE product_type_id=?1 AND karat_id=?2 AND remaining_micro>0
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![product_type_id, karat_id], lot_from_row)?;
    let mut lots = Vec::new();
    for row in rows {
        lots.push(row?);
    }
    Ok(lots)
}

/// Consume `quantity` grams oldest lot first.
///
/// The whole draw is planned before anything is written, so a request that
/// cannot be satisfied fails with `InsufficientStock` and leaves every lot
/// as it was.
pub fn consume_fifo(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_type_id: i64,
    karat_id: i64,
    quantity: Decimal,
) -> LedgerResult<FifoConsumption> {
    let quantity = from_micro(require_positive("quantity", quantity)?);
    let lots = open_lots(conn, product_type_id, karat_id)?;
    let available: Decimal = lots.iter().map(|l| l.remaining).sum();
    if available < quantity {
        return Err(LedgerError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    let mut draws = Vec::new();
    for lot in &lots {
        if remaining <= Decimal::ZERO {
            break;
        }
        let use_qty = if remaining < lot.remaining {
            remaining
        } else {
            lot.remaining
        };
        draws.push(LotDraw {
            lot_id: lot.id,
            quantity: use_qty,
            unit_cost: lot.unit_cost,
            cost: round_has(use_qty * lot.unit_cost),
        });
        remaining -= use_qty;
    }

    for (draw, lot) in draws.iter().zip(&lots) {
        let take = to_micro(draw.quantity)?;
        let changed = conn.execute(
            "UPDATE stock_lots SET remaining_micro = remaining_micro - ?2
             WHERE id=?1 AND remaining_micro >= ?2",
            params![draw.lot_id, take],
        )?;
        if changed == 0 {
            return Err(LedgerError::InsufficientStock {
                requested: draw.quantity,
                available: Decimal::ZERO,
            });
        }
        if let Some(product_id) = lot.product_id {
            conn.execute(
                "UPDATE products SET remaining_micro = MAX(remaining_micro - ?2, 0),
                        stock_status = CASE WHEN remaining_micro - ?2 <= 0
                                            THEN 'SOLD' ELSE stock_status END
                 WHERE id=?1",
                params![product_id, take],
            )?;
        }
        audit::record(
            conn,
            "stock_lot",
            &draw.lot_id.to_string(),
            "consume",
            ctx.actor,
            json!({ "remaining": lot.remaining }),
            json!({ "remaining": lot.remaining - draw.quantity, "reference": ctx.reference }),
        )?;
        debug!(lot_id = draw.lot_id, quantity = %draw.quantity, "fifo draw");
    }

    let consumed_cost: Decimal = draws.iter().map(|d| d.cost).sum();
    Ok(FifoConsumption {
        consumed_cost,
        average_unit_cost: round_has(consumed_cost / quantity),
        remainder: available - quantity,
        draws,
    })
}

pub fn get_pool(
    conn: &Connection,
    product_type_id: i64,
    karat_id: i64,
) -> LedgerResult<Option<StockPool>> {
    Ok(conn
        .query_row(
            "SELECT product_type_id, karat_id, weight_micro, cost_micro FROM stock_pools
             WHERE product_type_id=?1 AND karat_id=?2",
            params![product_type_id, karat_id],
            |r| {
                Ok(StockPool {
                    product_type_id: r.get(0)?,
                    karat_id: r.get(1)?,
                    total_weight: from_micro(r.get(2)?),
                    total_cost: from_micro(r.get(3)?),
                })
            },
        )
        .optional()?)
}

/// Increment the pool's weight and cost in one upsert.
pub fn add_to_pool(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_type_id: i64,
    karat_id: i64,
    weight: Decimal,
    cost: Decimal,
) -> LedgerResult<StockPool> {
    let w = require_positive("weight", weight)?;
    if cost < Decimal::ZERO {
        return Err(LedgerError::validation("cost", "must not be negative"));
    }
    let c = to_micro(cost)?;
    let (after_w, after_c): (i64, i64) = conn.query_row(
        "INSERT INTO stock_pools(product_type_id, karat_id, weight_micro, cost_micro)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(product_type_id, karat_id) DO UPDATE
            SET weight_micro = weight_micro + excluded.weight_micro,
                cost_micro = cost_micro + excluded.cost_micro
         RETURNING weight_micro, cost_micro",
        params![product_type_id, karat_id, w, c],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let pool = StockPool {
        product_type_id,
        karat_id,
        total_weight: from_micro(after_w),
        total_cost: from_micro(after_c),
    };
    audit::record(
        conn,
        "stock_pool",
        &format!("{}:{}", product_type_id, karat_id),
        "add",
        ctx.actor,
        json!({ "weight": from_micro(after_w - w), "cost": from_micro(after_c - c) }),
        json!({ "weight": pool.total_weight, "cost": pool.total_cost, "reference": ctx.reference }),
    )?;
    Ok(pool)
}

/// Remove `weight` grams from the pool, relieving cost at the current
/// average cost per gram. Draining the pool takes whatever cost is left.
pub fn consume_from_pool(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_type_id: i64,
    karat_id: i64,
    weight: Decimal,
) -> LedgerResult<PoolConsumption> {
    let weight = from_micro(require_positive("weight", weight)?);
    let pool = get_pool(conn, product_type_id, karat_id)?.unwrap_or(StockPool {
        product_type_id,
        karat_id,
        total_weight: Decimal::ZERO,
        total_cost: Decimal::ZERO,
    });
    if pool.total_weight < weight {
        return Err(LedgerError::InsufficientStock {
            requested: weight,
            available: pool.total_weight,
        });
    }
    let average = pool.average_cost_per_gram();
    let cost = if pool.total_weight == weight {
        pool.total_cost
    } else {
        round_has(weight * average)
    };
    let (w, c) = (to_micro(weight)?, to_micro(cost)?);
    let after: Option<(i64, i64)> = conn
        .query_row(
            "UPDATE stock_pools SET weight_micro = weight_micro - ?3, cost_micro = cost_micro - ?4
             WHERE product_type_id=?1 AND karat_id=?2 AND weight_micro >= ?3
             RETURNING weight_micro, cost_micro",
            params![product_type_id, karat_id, w, c],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((after_w, after_c)) = after else {
        return Err(LedgerError::InsufficientStock {
            requested: weight,
            available: pool.total_weight,
        });
    };
    let pool_after = StockPool {
        product_type_id,
        karat_id,
        total_weight: from_micro(after_w),
        total_cost: from_micro(after_c),
    };
    audit::record(
        conn,
        "stock_pool",
        &format!("{}:{}", product_type_id, karat_id),
        "consume",
        ctx.actor,
        json!({ "weight": pool.total_weight, "cost": pool.total_cost }),
        json!({
            "weight": pool_after.total_weight,
            "cost": pool_after.total_cost,
            "reference": ctx.reference,
        }),
    )?;
    debug!(product_type_id, karat_id, %weight, %cost, "pool draw");
    Ok(PoolConsumption {
        cost,
        average_cost_per_gram: round_has(average),
        pool_after,
    })
}

/// Mark a unique item sold. Items not currently in stock cannot be sold.
pub fn sell_unique(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_id: i64,
) -> LedgerResult<Product> {
    let before = get_product(conn, product_id)?;
    let changed = conn.execute(
        "UPDATE products SET stock_status='SOLD', remaining_micro=0
         WHERE id=?1 AND stock_status='IN_STOCK' AND remaining_micro>0",
        params![product_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::InsufficientStock {
            requested: Decimal::ONE,
            available: Decimal::ZERO,
        });
    }
    let after = get_product(conn, product_id)?;
    audit::record(
        conn,
        "product",
        &product_id.to_string(),
        "sell",
        ctx.actor,
        json!({
            "stock_status": before.stock_status,
            "remaining_quantity": before.remaining_quantity,
        }),
        json!({
            "stock_status": after.stock_status,
            "remaining_quantity": after.remaining_quantity,
            "reference": ctx.reference,
        }),
    )?;
    Ok(after)
}

/// Bring a previously sold unique item back into stock (buy-back).
pub fn restock_unique(
    conn: &Connection,
    ctx: &AuditCtx<'_>,
    product_id: i64,
) -> LedgerResult<Product> {
    let before = get_product(conn, product_id)?;
    let changed = conn.execute(
        "UPDATE products SET stock_status='IN_STOCK', remaining_micro=quantity_micro
         WHERE id=?1 AND stock_status='SOLD'",
        params![product_id],
    )?;
    if changed == 0 {
        return Err(LedgerError::validation(
            "product_id",
            format!("product {} is {} and cannot be restocked", before.code, before.stock_status),
        ));
    }
    let after = get_product(conn, product_id)?;
    audit::record(
        conn,
        "product",
        &product_id.to_string(),
        "restock",
        ctx.actor,
        json!({ "stock_status": before.stock_status }),
        json!({ "stock_status": after.stock_status, "reference": ctx.reference }),
    )?;
    Ok(after)
}

pub fn list_products(conn: &Connection, status: Option<StockStatus>) -> LedgerResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE (?1 IS NULL OR stock_status=?1) ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![status.map(|s| s.as_str())], product_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_lots(conn: &Connection, only_open: bool) -> LedgerResult<Vec<StockLot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOT_COLUMNS} FROM stock_lots WHERE (?1 = 0 OR remaining_micro > 0)
         ORDER BY product_type_id, karat_id, created_at, id"
    ))?;
    let rows = stmt.query_map(params![only_open], lot_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_pools(conn: &Connection) -> LedgerResult<Vec<StockPool>> {
    let mut stmt = conn.prepare(
        "SELECT product_type_id, karat_id, weight_micro, cost_micro FROM stock_pools
         ORDER BY product_type_id, karat_id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(StockPool {
            product_type_id: r.get(0)?,
            karat_id: r.get(1)?,
            total_weight: from_micro(r.get(2)?),
            total_cost: from_micro(r.get(3)?),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
