// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use super::arg;
use crate::models::PartyKind;
use crate::parties;
use crate::utils::{id_for_party, maybe_print_json, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let kind: PartyKind = arg(sub, "kind")?.parse()?;
            let party = parties::create_party(conn, arg(sub, "name")?, kind)?;
            println!("Added {} '{}' (id {})", party.kind, party.name, party.id);
        }
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => {
            let id = resolve_party(conn, arg(sub, "party")?)?;
            let party = parties::get_party(conn, id)?;
            println!("{}", serde_json::to_string_pretty(&party)?);
        }
        Some(("deactivate", sub)) => {
            let id = resolve_party(conn, arg(sub, "party")?)?;
            parties::set_active(conn, id, false)?;
            println!("Party {} deactivated", id);
        }
        _ => {}
    }
    Ok(())
}

/// Accept either a numeric id or an exact party name.
pub fn resolve_party(conn: &Connection, raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) => Ok(id),
        Err(_) => id_for_party(conn, raw.trim()),
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = parties::list_parties(conn)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.name.clone(),
                p.kind.to_string(),
                if p.is_active { "yes".into() } else { "no".into() },
                p.balance.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Id", "Name", "Kind", "Active", "Balance (HAS)"], rows)
    );
    Ok(())
}
