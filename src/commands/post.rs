// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::io::Read;

use super::arg;
use crate::config::LedgerConfig;
use crate::posting::{self, PostingRequest, PostingResponse};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    let path = arg(m, "file")?;
    let user = arg(m, "user")?;
    let raw = if path == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Read {}", path))?
    };
    let response = post_json(conn, user, &raw)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    for w in &response.warnings {
        eprintln!("warning: {}", w);
    }
    Ok(())
}

/// Parse a JSON request and post it as `user`.
pub fn post_json(conn: &mut Connection, user: &str, raw: &str) -> Result<PostingResponse> {
    let req: PostingRequest = serde_json::from_str(raw).context("Invalid posting request")?;
    let cfg = LedgerConfig::load(conn)?;
    let response = posting::post(conn, &cfg, user, &req)
        .with_context(|| format!("Posting {} failed", req.body.type_code()))?;
    Ok(response)
}
