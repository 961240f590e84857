// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::audit;
use crate::utils::{fmt_ts, maybe_print_json, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    if let Some(("list", sub)) = m.subcommand() {
        let entity = sub.get_one::<String>("entity").map(|s| s.as_str());
        let limit = *sub.get_one::<usize>("limit").unwrap_or(&50);
        let data = audit::list(conn, entity, limit)?;
        if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
            let rows = data
                .into_iter()
                .map(|e| {
                    vec![
                        e.id.to_string(),
                        fmt_ts(&e.created_at),
                        e.entity,
                        e.entity_id,
                        e.action,
                        e.actor,
                        e.diff.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Id", "At", "Entity", "Entity id", "Action", "Actor", "Diff"], rows)
            );
        }
    }
    Ok(())
}
