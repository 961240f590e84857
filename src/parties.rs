// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Party, PartyKind};
use crate::utils::from_micro;

fn party_from_row(r: &Row<'_>) -> rusqlite::Result<(i64, String, String, bool, i64)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn build_party(raw: (i64, String, String, bool, i64)) -> LedgerResult<Party> {
    let (id, name, kind, is_active, balance_micro) = raw;
    Ok(Party {
        id,
        name,
        kind: kind.parse()?,
        is_active,
        balance: from_micro(balance_micro),
    })
}

pub fn create_party(conn: &Connection, name: &str, kind: PartyKind) -> LedgerResult<Party> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("name", "must not be empty"));
    }
    conn.execute(
        "INSERT INTO parties(name, kind) VALUES (?1, ?2)",
        params![name, kind.as_str()],
    )?;
    get_party(conn, conn.last_insert_rowid())
}

pub fn get_party(conn: &Connection, id: i64) -> LedgerResult<Party> {
    let raw = conn
        .query_row(
            "SELECT id, name, kind, is_active, balance_micro FROM parties WHERE id=?1",
            params![id],
            party_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("party", id))?;
    build_party(raw)
}

pub fn list_parties(conn: &Connection) -> LedgerResult<Vec<Party>> {
    let mut stmt =
        conn.prepare("SELECT id, name, kind, is_active, balance_micro FROM parties ORDER BY name")?;
    let rows = stmt.query_map([], party_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(build_party(row?)?);
    }
    Ok(out)
}

pub fn set_active(conn: &Connection, id: i64, active: bool) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE parties SET is_active=?2 WHERE id=?1",
        params![id, active],
    )?;
    if changed == 0 {
        return Err(LedgerError::not_found("party", id));
    }
    Ok(())
}

/// Load a party that may take part in a new transaction.
pub fn require_active(conn: &Connection, id: i64) -> LedgerResult<Party> {
    let party = get_party(conn, id)?;
    if !party.is_active {
        return Err(LedgerError::validation(
            "party_id",
            format!("party '{}' is inactive", party.name),
        ));
    }
    Ok(party)
}
