// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod audit;
pub mod balance;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod inventory;
pub mod models;
pub mod parties;
pub mod posting;
pub mod pricing;
pub mod utils;
