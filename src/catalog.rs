// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Karat, LaborType, ProductType, TrackType};
use crate::utils::dec_col;

fn karat_from_row(r: &Row<'_>) -> rusqlite::Result<Karat> {
    Ok(Karat {
        id: r.get(0)?,
        code: r.get(1)?,
        fineness: dec_col(&r.get::<_, String>(2)?)?,
    })
}

const PRODUCT_TYPE_COLUMNS: &str = "id, code, name, track_type, labor_type, labor_rate";

type ProductTypeRow = (i64, String, String, String, String, String);

fn product_type_from_row(r: &Row<'_>) -> rusqlite::Result<ProductTypeRow> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
}

fn build_product_type(raw: ProductTypeRow) -> LedgerResult<ProductType> {
    let (id, code, name, track, labor, rate) = raw;
    Ok(ProductType {
        id,
        code,
        name,
        track_type: track.parse()?,
        labor_type: labor.parse()?,
        labor_rate: dec_col(&rate)?,
    })
}

pub fn karat_by_code(conn: &Connection, code: &str) -> LedgerResult<Karat> {
    let code = code.trim().to_uppercase();
    conn.query_row(
        "SELECT id, code, fineness FROM karats WHERE code=?1",
        params![code],
        karat_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("karat", code))
}

pub fn karat_by_id(conn: &Connection, id: i64) -> LedgerResult<Karat> {
    conn.query_row(
        "SELECT id, code, fineness FROM karats WHERE id=?1",
        params![id],
        karat_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("karat", id))
}

pub fn product_type_by_code(conn: &Connection, code: &str) -> LedgerResult<ProductType> {
    let code = code.trim().to_uppercase();
    let raw = conn
        .query_row(
            &format!("SELECT {PRODUCT_TYPE_COLUMNS} FROM product_types WHERE code=?1"),
            params![code],
            product_type_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("product type", code))?;
    build_product_type(raw)
}

pub fn product_type_by_id(conn: &Connection, id: i64) -> LedgerResult<ProductType> {
    let raw = conn
        .query_row(
            &format!("SELECT {PRODUCT_TYPE_COLUMNS} FROM product_types WHERE id=?1"),
            params![id],
            product_type_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("product type", id))?;
    build_product_type(raw)
}

pub fn list_karats(conn: &Connection) -> LedgerResult<Vec<Karat>> {
    let mut stmt = conn.prepare("SELECT id, code, fineness FROM karats ORDER BY fineness DESC")?;
    let rows = stmt.query_map([], karat_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_product_types(conn: &Connection) -> LedgerResult<Vec<ProductType>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_TYPE_COLUMNS} FROM product_types ORDER BY code"
    ))?;
    let rows = stmt.query_map([], product_type_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(build_product_type(row?)?);
    }
    Ok(out)
}

pub fn add_karat(conn: &Connection, code: &str, fineness: Decimal) -> LedgerResult<Karat> {
    if fineness <= Decimal::ZERO || fineness > Decimal::ONE {
        return Err(LedgerError::validation("fineness", "must be in (0, 1]"));
    }
    let code = code.trim().to_uppercase();
    conn.execute(
        "INSERT INTO karats(code, fineness) VALUES (?1, ?2)",
        params![code, fineness.to_string()],
    )?;
    karat_by_code(conn, &code)
}

pub fn add_product_type(
    conn: &Connection,
    code: &str,
    name: &str,
    track_type: TrackType,
    labor_type: LaborType,
    labor_rate: Decimal,
) -> LedgerResult<ProductType> {
    if labor_rate < Decimal::ZERO {
        return Err(LedgerError::validation("labor_rate", "must not be negative"));
    }
    let code = code.trim().to_uppercase();
    conn.execute(
        "INSERT INTO product_types(code, name, track_type, labor_type, labor_rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            code,
            name.trim(),
            track_type.as_str(),
            labor_type.as_str(),
            labor_rate.to_string()
        ],
    )?;
    product_type_by_code(conn, &code)
}
