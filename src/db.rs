// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Karatbook", "karatbook"));

pub fn db_path() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("KARATBOOK_DB") {
        return Ok(PathBuf::from(custom));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("karatbook.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_at(&path)
}

/// Open (and migrate) a database file. Writers on other connections are
/// waited for instead of failing immediately with SQLITE_BUSY.
pub fn open_at(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(10))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    init_schema(&conn)?;
    debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS parties(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL CHECK(kind IN ('CUSTOMER','SUPPLIER','CASH','BANK')),
        is_active INTEGER NOT NULL DEFAULT 1,
        balance_micro INTEGER NOT NULL DEFAULT 0, -- gold units x 1e6; positive = we owe them
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    );

    CREATE TABLE IF NOT EXISTS karats(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        fineness TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS product_types(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        track_type TEXT NOT NULL CHECK(track_type IN ('FIFO','POOL','UNIQUE')),
        labor_type TEXT NOT NULL DEFAULT 'PER_GRAM' CHECK(labor_type IN ('PER_GRAM','PER_PIECE')),
        labor_rate TEXT NOT NULL DEFAULT '0'
    );

    CREATE TABLE IF NOT EXISTS price_snapshots(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        gold_buy TEXT NOT NULL,
        gold_sell TEXT NOT NULL,
        usd_buy TEXT,
        usd_sell TEXT,
        eur_buy TEXT,
        eur_sell TEXT,
        source TEXT NOT NULL CHECK(source IN ('LIVE','BACKFILL')),
        effective_at TEXT NOT NULL,
        raw_payload TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        UNIQUE(effective_at, source)
    );
    CREATE INDEX IF NOT EXISTS idx_price_snapshots_effective ON price_snapshots(effective_at);

    CREATE TABLE IF NOT EXISTS products(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        product_type_id INTEGER NOT NULL,
        karat_id INTEGER NOT NULL,
        weight TEXT NOT NULL,
        material_cost TEXT NOT NULL,
        labor_cost TEXT NOT NULL,
        quantity_micro INTEGER NOT NULL,
        remaining_micro INTEGER NOT NULL CHECK(remaining_micro >= 0),
        stock_status TEXT NOT NULL CHECK(stock_status IN ('IN_STOCK','SOLD','RESERVED')),
        source_tx TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(product_type_id) REFERENCES product_types(id),
        FOREIGN KEY(karat_id) REFERENCES karats(id)
    );

    CREATE TABLE IF NOT EXISTS stock_lots(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_type_id INTEGER NOT NULL,
        karat_id INTEGER NOT NULL,
        product_id INTEGER,
        quantity_micro INTEGER NOT NULL,
        remaining_micro INTEGER NOT NULL CHECK(remaining_micro >= 0),
        unit_cost TEXT NOT NULL, -- gold units per gram
        created_at TEXT NOT NULL,
        FOREIGN KEY(product_type_id) REFERENCES product_types(id),
        FOREIGN KEY(karat_id) REFERENCES karats(id),
        FOREIGN KEY(product_id) REFERENCES products(id)
    );
    CREATE INDEX IF NOT EXISTS idx_stock_lots_fifo
        ON stock_lots(product_type_id, karat_id, created_at, id);

    CREATE TABLE IF NOT EXISTS stock_pools(
        product_type_id INTEGER NOT NULL,
        karat_id INTEGER NOT NULL,
        weight_micro INTEGER NOT NULL DEFAULT 0 CHECK(weight_micro >= 0),
        cost_micro INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY(product_type_id, karat_id),
        FOREIGN KEY(product_type_id) REFERENCES product_types(id),
        FOREIGN KEY(karat_id) REFERENCES karats(id)
    );

    CREATE TABLE IF NOT EXISTS financial_transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        type_code TEXT NOT NULL,
        party_id INTEGER,
        transaction_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'COMPLETED',
        total_has TEXT NOT NULL,
        currency TEXT,
        currency_amount TEXT,
        snapshot_id INTEGER NOT NULL,
        meta TEXT NOT NULL DEFAULT '{}',
        response TEXT NOT NULL,
        reconciled_at TEXT,
        reconciled_by TEXT,
        version INTEGER NOT NULL DEFAULT 1,
        idempotency_key TEXT,
        created_by TEXT NOT NULL,
        FOREIGN KEY(party_id) REFERENCES parties(id),
        FOREIGN KEY(snapshot_id) REFERENCES price_snapshots(id)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_financial_transactions_idempotency
        ON financial_transactions(idempotency_key, created_by)
        WHERE idempotency_key IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_financial_transactions_party
        ON financial_transactions(party_id, transaction_at);

    CREATE TABLE IF NOT EXISTS transaction_lines(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_code TEXT NOT NULL,
        position INTEGER NOT NULL,
        kind TEXT NOT NULL,
        has_amount TEXT NOT NULL,
        currency TEXT,
        currency_amount TEXT,
        detail TEXT NOT NULL,
        meta TEXT NOT NULL DEFAULT '{}',
        UNIQUE(transaction_code, position),
        FOREIGN KEY(transaction_code) REFERENCES financial_transactions(code) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS audit_log(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        action TEXT NOT NULL,
        actor TEXT NOT NULL,
        diff TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity, entity_id);

    CREATE TABLE IF NOT EXISTS cash_movements(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_code TEXT NOT NULL,
        register_party_id INTEGER NOT NULL,
        currency TEXT NOT NULL,
        amount TEXT NOT NULL, -- signed: positive flows into the register
        created_at TEXT NOT NULL,
        FOREIGN KEY(register_party_id) REFERENCES parties(id)
    );

    INSERT OR IGNORE INTO karats(code, fineness) VALUES
        ('24K', '0.995'),
        ('22K', '0.916'),
        ('21K', '0.875'),
        ('18K', '0.750'),
        ('14K', '0.585'),
        ('8K', '0.333');

    INSERT OR IGNORE INTO product_types(code, name, track_type, labor_type, labor_rate) VALUES
        ('BULLION', 'Gram bullion', 'FIFO', 'PER_GRAM', '0'),
        ('HURDA', 'Scrap gold', 'FIFO', 'PER_GRAM', '0'),
        ('BILEZIK', 'Bracelets', 'POOL', 'PER_GRAM', '0.010'),
        ('JEWELRY', 'Finished jewelry', 'UNIQUE', 'PER_PIECE', '0.500');
    "#,
    )?;
    Ok(())
}
