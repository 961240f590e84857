// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use super::arg;
use crate::catalog;
use crate::utils::{parse_decimal, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add-karat", sub)) => {
            let fineness = parse_decimal(arg(sub, "fineness")?)?;
            let k = catalog::add_karat(conn, arg(sub, "code")?, fineness)?;
            println!("Added karat {} (fineness {})", k.code, k.fineness);
        }
        Some(("add-type", sub)) => {
            let pt = catalog::add_product_type(
                conn,
                arg(sub, "code")?,
                arg(sub, "name")?,
                arg(sub, "track")?.parse()?,
                arg(sub, "labor-type")?.parse()?,
                parse_decimal(arg(sub, "labor-rate")?)?,
            )?;
            println!("Added product type {} ({})", pt.code, pt.track_type);
        }
        Some(("list", _)) | None => list(conn)?,
        _ => {}
    }
    Ok(())
}

fn list(conn: &Connection) -> Result<()> {
    let karats = catalog::list_karats(conn)?
        .into_iter()
        .map(|k| vec![k.code, k.fineness.to_string()])
        .collect();
    println!("{}", pretty_table(&["Karat", "Fineness"], karats));

    let types = catalog::list_product_types(conn)?
        .into_iter()
        .map(|t| {
            vec![
                t.code,
                t.name,
                t.track_type.to_string(),
                t.labor_type.to_string(),
                t.labor_rate.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Type", "Name", "Tracking", "Labor", "Labor rate"], types)
    );
    Ok(())
}
