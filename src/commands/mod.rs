// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod doctor;
pub mod exporter;
pub mod ledger;
pub mod parties;
pub mod post;
pub mod prices;
pub mod stock;

use anyhow::{Context, Result};

pub(crate) fn arg<'a>(m: &'a clap::ArgMatches, name: &str) -> Result<&'a String> {
    m.get_one::<String>(name)
        .with_context(|| format!("missing --{}", name))
}
