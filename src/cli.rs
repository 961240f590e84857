// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{value_parser, Arg, ArgAction, Command};

fn party_arg() -> Arg {
    Arg::new("party").required(true).help("Id or name")
}

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as a JSON array"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn limit_arg(default: &'static str) -> Arg {
    Arg::new("limit")
        .long("limit")
        .value_parser(value_parser!(usize))
        .default_value(default)
}

pub fn build_cli() -> Command {
    Command::new("karatbook")
        .about("Karatbook: gold-denominated ledger, inventory and posting engine for jewelry shops")
        .version(clap::crate_version!())
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Create the database and seed the catalog"))
        .subcommand(
            Command::new("config")
                .about("Ledger settings")
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                ),
        )
        .subcommand(
            Command::new("party")
                .about("Customers, suppliers and cash accounts")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .value_parser(["customer", "supplier", "cash", "bank"])
                                .default_value("customer"),
                        ),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("show").arg(party_arg()))
                .subcommand(Command::new("deactivate").arg(party_arg())),
        )
        .subcommand(
            Command::new("catalog")
                .about("Karats and product types")
                .subcommand(Command::new("list"))
                .subcommand(
                    Command::new("add-karat")
                        .arg(Arg::new("code").long("code").required(true))
                        .arg(Arg::new("fineness").long("fineness").required(true)),
                )
                .subcommand(
                    Command::new("add-type")
                        .arg(Arg::new("code").long("code").required(true))
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("track")
                                .long("track")
                                .value_parser(["fifo", "pool", "unique"])
                                .required(true),
                        )
                        .arg(
                            Arg::new("labor-type")
                                .long("labor-type")
                                .value_parser(["per_gram", "per_piece"])
                                .default_value("per_gram"),
                        )
                        .arg(Arg::new("labor-rate").long("labor-rate").default_value("0")),
                ),
        )
        .subcommand(
            Command::new("price")
                .about("Price snapshots")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("gold-buy").long("gold-buy").required(true))
                        .arg(Arg::new("gold-sell").long("gold-sell").required(true))
                        .arg(Arg::new("usd-buy").long("usd-buy"))
                        .arg(Arg::new("usd-sell").long("usd-sell"))
                        .arg(Arg::new("eur-buy").long("eur-buy"))
                        .arg(Arg::new("eur-sell").long("eur-sell"))
                        .arg(Arg::new("at").long("at").help("Effective time (default now)")),
                )
                .subcommand(json_flags(Command::new("list").arg(limit_arg("50"))))
                .subcommand(Command::new("resolve").arg(Arg::new("at").long("at"))),
        )
        .subcommand(
            Command::new("post")
                .about("Post a transaction from a JSON request")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .help("Request file, or - for stdin"),
                )
                .arg(Arg::new("user").long("user").default_value("cli")),
        )
        .subcommand(
            Command::new("ledger")
                .about("Posted transactions")
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(Arg::new("party").long("party").value_parser(value_parser!(i64)))
                        .arg(Arg::new("type").long("type"))
                        .arg(limit_arg("50")),
                ))
                .subcommand(Command::new("show").arg(Arg::new("code").required(true))),
        )
        .subcommand(
            Command::new("audit").about("Audit trail").subcommand(json_flags(
                Command::new("list")
                    .arg(Arg::new("entity").long("entity"))
                    .arg(limit_arg("50")),
            )),
        )
        .subcommand(
            Command::new("stock")
                .about("Inventory")
                .subcommand(
                    Command::new("list").arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include exhausted lots"),
                    ),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert between a currency and gold units at a snapshot")
                .arg(Arg::new("amount").long("amount").required(true))
                .arg(Arg::new("currency").long("currency").required(true))
                .arg(Arg::new("at").long("at"))
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .value_parser(["buy", "sell"])
                        .default_value("buy"),
                )
                .arg(
                    Arg::new("reverse")
                        .long("reverse")
                        .action(ArgAction::SetTrue)
                        .help("Treat amount as gold units and convert into the currency"),
                ),
        )
        .subcommand(Command::new("doctor").about("Check balances and stock for inconsistencies"))
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("transactions")
                    .arg(
                        Arg::new("format")
                            .long("format")
                            .default_value("csv")
                            .help("csv or json"),
                    )
                    .arg(Arg::new("out").long("out").required(true)),
            ),
        )
}
