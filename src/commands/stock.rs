// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashMap;

use crate::catalog;
use crate::inventory;
use crate::models::{StockStatus, TrackType};
use crate::utils::{fmt_ts, pretty_table, round_has};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let all = match m.subcommand() {
        Some(("list", sub)) => sub.get_flag("all"),
        _ => false,
    };
    let catalog_types = catalog::list_product_types(conn)?;
    let types: HashMap<i64, String> = catalog_types
        .iter()
        .map(|t| (t.id, t.code.clone()))
        .collect();
    let karats: HashMap<i64, String> = catalog::list_karats(conn)?
        .into_iter()
        .map(|k| (k.id, k.code))
        .collect();
    let name = |map: &HashMap<i64, String>, id: i64| {
        map.get(&id).cloned().unwrap_or_else(|| id.to_string())
    };

    let lots = inventory::list_lots(conn, !all)?
        .into_iter()
        .map(|l| {
            vec![
                l.id.to_string(),
                name(&types, l.product_type_id),
                name(&karats, l.karat_id),
                l.remaining.to_string(),
                l.quantity.to_string(),
                l.unit_cost.to_string(),
                fmt_ts(&l.created_at),
            ]
        })
        .collect();
    println!("FIFO lots");
    let headers = [
        "Lot",
        "Type",
        "Karat",
        "Remaining (g)",
        "Quantity (g)",
        "Unit cost",
        "Created",
    ];
    println!("{}", pretty_table(&headers, lots));

    let pools = inventory::list_pools(conn)?
        .into_iter()
        .map(|p| {
            vec![
                name(&types, p.product_type_id),
                name(&karats, p.karat_id),
                p.total_weight.to_string(),
                p.total_cost.to_string(),
                round_has(p.average_cost_per_gram()).to_string(),
            ]
        })
        .collect();
    println!("Pools");
    println!(
        "{}",
        pretty_table(&["Type", "Karat", "Weight (g)", "Cost (HAS)", "Avg cost/g"], pools)
    );

    let items = inventory::list_products(conn, Some(StockStatus::InStock))?
        .into_iter()
        .filter(|p| {
            catalog_types
                .iter()
                .any(|t| t.id == p.product_type_id && t.track_type == TrackType::Unique)
        })
        .map(|p| {
            vec![
                p.code.clone(),
                name(&types, p.product_type_id),
                name(&karats, p.karat_id),
                p.weight.to_string(),
                p.total_cost().to_string(),
            ]
        })
        .collect();
    println!("Unique items in stock");
    println!(
        "{}",
        pretty_table(&["Code", "Type", "Karat", "Weight (g)", "Cost (HAS)"], items)
    );
    Ok(())
}
