// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Append-only audit trail. Every mutation made by the posting engine leaves
//! one row here with a before/after diff.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{json, Value};

use crate::error::LedgerResult;
use crate::models::AuditEntry;
use crate::utils::{fmt_ts, parse_ts};

/// Who is mutating, and on behalf of which transaction.
#[derive(Debug, Clone, Copy)]
pub struct AuditCtx<'a> {
    pub actor: &'a str,
    pub reference: &'a str,
}

impl<'a> AuditCtx<'a> {
    pub fn new(actor: &'a str, reference: &'a str) -> Self {
        Self { actor, reference }
    }
}

pub fn record(
    conn: &Connection,
    entity: &str,
    entity_id: &str,
    action: &str,
    actor: &str,
    before: Value,
    after: Value,
) -> LedgerResult<i64> {
    let diff = json!({ "before": before, "after": after });
    conn.execute(
        "INSERT INTO audit_log(entity, entity_id, action, actor, diff, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entity,
            entity_id,
            action,
            actor,
            serde_json::to_string(&diff)?,
            fmt_ts(&Utc::now())
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list(
    conn: &Connection,
    entity: Option<&str>,
    limit: usize,
) -> LedgerResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity, entity_id, action, actor, diff, created_at FROM audit_log
         WHERE (?1 IS NULL OR entity=?1) ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![entity, limit as i64], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, String>(5)?,
            r.get::<_, String>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, entity, entity_id, action, actor, diff, created_at) = row?;
        out.push(AuditEntry {
            id,
            entity,
            entity_id,
            action,
            actor,
            diff: serde_json::from_str(&diff)?,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(out)
}
