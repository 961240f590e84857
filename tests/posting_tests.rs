// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{TimeZone, Utc};
use karatbook::catalog;
use karatbook::config::{LedgerConfig, KEY_CASH_REGISTER};
use karatbook::db::init_schema;
use karatbook::error::{LedgerError, LedgerResult};
use karatbook::inventory;
use karatbook::models::{
    LineDetail, LineKind, PartyKind, SnapshotRates, StockStatus, TransactionType,
};
use karatbook::parties;
use karatbook::posting::{
    self, CurrencyLeg, ExchangeBody, HurdaBody, PostingBody, PostingRequest, PostingResponse,
    PurchaseBody, PurchaseLine, SaleBody, SaleLine, ScrapLine, SettlementBody, SettlementMode,
    TransactionFilter,
};
use karatbook::pricing;
use karatbook::utils::set_setting;
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::str::FromStr;

const AT: &str = "2025-01-10T10:00:00Z";

struct Shop {
    conn: Connection,
    supplier: i64,
    customer: i64,
}

fn setup() -> Shop {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    pricing::record_snapshot(
        &conn,
        &SnapshotRates {
            gold_buy: dec!(5900),
            gold_sell: dec!(5950),
            usd_buy: Some(dec!(35.0)),
            usd_sell: Some(dec!(35.2)),
            ..SnapshotRates::default()
        },
        Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        std::time::Duration::ZERO,
    )
    .unwrap();
    let supplier = parties::create_party(&conn, "Toptanci", PartyKind::Supplier).unwrap().id;
    let customer = parties::create_party(&conn, "Ayse Hanim", PartyKind::Customer).unwrap().id;
    Shop {
        conn,
        supplier,
        customer,
    }
}

fn post(conn: &mut Connection, req: PostingRequest) -> LedgerResult<PostingResponse> {
    let cfg = LedgerConfig::load(conn).unwrap();
    posting::post(conn, &cfg, "clerk", &req)
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn balance(conn: &Connection, party: i64) -> Decimal {
    parties::get_party(conn, party).unwrap().balance
}

fn meta_dec(v: &Value) -> Decimal {
    Decimal::from_str(v.as_str().unwrap()).unwrap()
}

fn try_leg(amount: Decimal) -> CurrencyLeg {
    CurrencyLeg::new("TRY", amount)
}

fn purchase(
    lines: Vec<PurchaseLine>,
    payment: Option<CurrencyLeg>,
    settlement: SettlementMode,
) -> PostingBody {
    PostingBody::Purchase(PurchaseBody {
        lines,
        payment,
        settlement,
    })
}

fn inventory_product_id(resp: &PostingResponse) -> i64 {
    match &resp.lines[0].detail {
        LineDetail::Inventory {
            product_id: Some(id), ..
        } => *id,
        other => panic!("expected inventory line with product, got {other:?}"),
    }
}

#[test]
fn payment_converts_at_buy_rate() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody::money(try_leg(dec!(10000)))),
        )
        .at(AT),
    )
    .unwrap();

    assert_eq!(resp.type_code, TransactionType::Payment);
    assert!(resp.code.starts_with("PAY-20250110-"));
    assert_eq!(resp.lines.len(), 1);
    assert_eq!(resp.lines[0].kind(), LineKind::Payment);
    assert_eq!(resp.lines[0].has_amount, dec!(-1.694915));
    assert_eq!(resp.total_has, dec!(-1.694915));
    assert_eq!(resp.currency.as_deref(), Some("TRY"));
    assert_eq!(resp.currency_amount, Some(dec!(10000)));
    assert_eq!(resp.party_balance_after, Some(dec!(-1.694915)));
    assert_eq!(balance(&shop.conn, shop.supplier), dec!(-1.694915));
}

#[test]
fn payment_discount_closes_extra_debt() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(
                SettlementBody::money(try_leg(dec!(10000))).with_discount(dec!(0.1)),
            ),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(resp.lines.len(), 2);
    assert_eq!(resp.lines[1].kind(), LineKind::Discount);
    assert_eq!(resp.lines[1].has_amount, dec!(-0.1));
    assert_eq!(resp.lines[1].meta["result"], "profit");
    assert_eq!(resp.total_has, dec!(-1.794915));
}

#[test]
fn receipt_raises_balance_through_cross_rate() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(CurrencyLeg::new("usd", dec!(1000)))),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(resp.total_has, dec!(5.932203));
    assert_eq!(resp.currency.as_deref(), Some("USD"));
    assert_eq!(balance(&shop.conn, shop.customer), dec!(5.932203));
}

#[test]
fn purchase_credit_mode_carries_difference() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "22K", dec!(10))],
                Some(try_leg(dec!(50000))),
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();

    assert_eq!(resp.lines.len(), 2);
    assert_eq!(resp.lines[0].has_amount, dec!(9.16));
    assert_eq!(resp.lines[1].has_amount, dec!(-8.474576));
    assert_eq!(resp.total_has, dec!(0.685424));
    assert_eq!(balance(&shop.conn, shop.supplier), dec!(0.685424));

    let (pt, k) = (
        catalog::product_type_by_code(&shop.conn, "BULLION").unwrap().id,
        catalog::karat_by_code(&shop.conn, "22K").unwrap().id,
    );
    let lots = inventory::open_lots(&shop.conn, pt, k).unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].remaining, dec!(10));
    assert_eq!(lots[0].unit_cost, dec!(0.916));
}

#[test]
fn purchase_settle_mode_books_profit_and_zeroes_balance() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "22K", dec!(10))],
                Some(try_leg(dec!(50000))),
                SettlementMode::Settle,
            ),
        )
        .at(AT),
    )
    .unwrap();

    assert_eq!(resp.lines.len(), 3);
    let discount = &resp.lines[2];
    assert_eq!(discount.kind(), LineKind::Discount);
    assert_eq!(discount.has_amount, dec!(-0.685424));
    assert_eq!(discount.meta["result"], "profit");
    assert_eq!(resp.total_has, Decimal::ZERO);
    assert_eq!(balance(&shop.conn, shop.supplier), Decimal::ZERO);
}

#[test]
fn purchase_overpayment_in_settle_mode_is_a_loss() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "24K", dec!(1))],
                Some(try_leg(dec!(5900))),
                SettlementMode::Settle,
            ),
        )
        .at(AT),
    )
    .unwrap();
    // 0.995 of goods against 1.0 paid
    assert_eq!(resp.lines[2].has_amount, dec!(0.005));
    assert_eq!(resp.lines[2].meta["result"], "loss");
    assert_eq!(resp.total_has, Decimal::ZERO);
}

#[test]
fn purchase_without_payment_credits_supplier_for_goods() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![
                    PurchaseLine::new("BILEZIK", "22K", dec!(20)),
                    PurchaseLine::new("JEWELRY", "18K", dec!(7.2)),
                ],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();

    // bracelets: 20 * 0.916 + 20 * 0.010 labor per gram
    assert_eq!(resp.lines[0].has_amount, dec!(18.52));
    assert_eq!(meta_dec(&resp.lines[0].meta["labor_cost"]), dec!(0.2));
    // jewelry: 7.2 * 0.750 + 0.5 per piece
    assert_eq!(resp.lines[1].has_amount, dec!(5.9));
    assert_eq!(resp.total_has, dec!(24.42));
    assert_eq!(resp.currency, None);
    assert_eq!(balance(&shop.conn, shop.supplier), dec!(24.42));

    let pt = catalog::product_type_by_code(&shop.conn, "BILEZIK").unwrap();
    let k = catalog::karat_by_code(&shop.conn, "22K").unwrap();
    let pool = inventory::get_pool(&shop.conn, pt.id, k.id).unwrap().unwrap();
    assert_eq!(pool.total_weight, dec!(20));
    assert_eq!(pool.total_cost, dec!(18.52));

    match &resp.lines[1].detail {
        LineDetail::Inventory {
            product_id: Some(id), ..
        } => {
            let p = inventory::get_product(&shop.conn, *id).unwrap();
            assert_eq!(p.stock_status, StockStatus::InStock);
            assert_eq!(p.quantity, dec!(1));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn sale_with_discount_and_partial_collection_leaves_debt() {
    let mut shop = setup();
    let bought = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("JEWELRY", "18K", dec!(7.2))],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();
    let product_id = inventory_product_id(&bought);

    let sold = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![SaleLine::unique(product_id, dec!(7)).listed_at(dec!(7.5))],
                collected: Some(try_leg(dec!(20000))),
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap();

    let kinds: Vec<LineKind> = sold.lines.iter().map(|l| l.kind()).collect();
    assert_eq!(kinds, vec![LineKind::Inventory, LineKind::Discount, LineKind::Payment]);
    assert_eq!(sold.lines[0].has_amount, dec!(-7.5));
    assert_eq!(sold.lines[1].has_amount, dec!(0.5));
    assert_eq!(sold.lines[2].has_amount, dec!(3.389831));
    assert_eq!(sold.total_has, dec!(-3.610169));
    assert_eq!(meta_dec(&sold.lines[0].meta["cost_basis"]), dec!(5.9));
    assert_eq!(meta_dec(&sold.lines[0].meta["gross_profit"]), dec!(1.1));
    assert_eq!(balance(&shop.conn, shop.customer), dec!(-3.610169));

    let stored = posting::get_transaction(&shop.conn, &sold.code).unwrap();
    assert_eq!(meta_dec(&stored.meta["remaining_debt"]), dec!(3.610169));
    assert_eq!(
        inventory::get_product(&shop.conn, product_id).unwrap().stock_status,
        StockStatus::Sold
    );
}

#[test]
fn sale_by_weight_consumes_fifo_stock_at_cost() {
    let mut shop = setup();
    post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "22K", dec!(10))],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();

    let sold = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![SaleLine::by_weight("BULLION", "22K", dec!(4), dec!(3.8))],
                collected: None,
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(sold.total_has, dec!(-3.8));
    assert_eq!(meta_dec(&sold.lines[0].meta["cost_basis"]), dec!(3.664));
    assert_eq!(meta_dec(&sold.lines[0].meta["remaining_stock"]), dec!(6));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![SaleLine::by_weight("BULLION", "22K", dec!(6.5), dec!(6))],
                collected: None,
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(balance(&shop.conn, shop.customer), dec!(-3.8));
}

#[test]
fn hurda_scenario_totals_negative_sum_of_lines() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![
                    ScrapLine::new("18K", dec!(15)),
                    ScrapLine::new("14K", dec!(15)),
                ],
            }),
        )
        .at(AT),
    )
    .unwrap();

    assert_eq!(resp.lines[0].has_amount, dec!(-11.25));
    assert_eq!(resp.lines[1].has_amount, dec!(-8.775));
    assert_eq!(resp.total_has, dec!(-20.025));
    assert_eq!(resp.currency, None);
    assert_eq!(balance(&shop.conn, shop.customer), dec!(-20.025));

    let hurda = catalog::product_type_by_code(&shop.conn, "HURDA").unwrap();
    let k14 = catalog::karat_by_code(&shop.conn, "14K").unwrap();
    let lots = inventory::open_lots(&shop.conn, hurda.id, k14.id).unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].remaining, dec!(15));
}

#[test]
fn hurda_rejects_unknown_karat() {
    let mut shop = setup();
    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![ScrapLine::new("18K", dec!(5)), ScrapLine::new("19K", dec!(5))],
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "karat", .. }));
    assert_eq!(count(&shop.conn, "stock_lots"), 0);
    assert_eq!(count(&shop.conn, "financial_transactions"), 0);
}

#[test]
fn scrap_payment_draws_scrap_stock() {
    let mut shop = setup();
    post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![ScrapLine::new("14K", dec!(15))],
            }),
        )
        .at(AT),
    )
    .unwrap();

    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody {
                scrap: vec![ScrapLine::new("14K", dec!(5))],
                ..SettlementBody::default()
            }),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(resp.lines[0].kind(), LineKind::GoldScrapPayment);
    assert_eq!(resp.total_has, dec!(-2.925));
    assert_eq!(resp.currency, None);

    let hurda = catalog::product_type_by_code(&shop.conn, "HURDA").unwrap();
    let k14 = catalog::karat_by_code(&shop.conn, "14K").unwrap();
    assert_eq!(inventory::open_lots(&shop.conn, hurda.id, k14.id).unwrap()[0].remaining, dec!(10));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody {
                scrap: vec![ScrapLine::new("14K", dec!(11))],
                ..SettlementBody::default()
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(balance(&shop.conn, shop.supplier), dec!(-2.925));
}

#[test]
fn exchange_books_spread_without_party() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            None,
            PostingBody::Exchange(ExchangeBody::new("USD", dec!(1000), "TRY", dec!(35000))),
        )
        .at(AT),
    )
    .unwrap();

    assert_eq!(resp.lines.len(), 2);
    assert!(resp.lines.iter().all(|l| l.kind() == LineKind::Fx));
    assert_eq!(resp.lines[0].has_amount, dec!(-5.932203));
    assert_eq!(resp.lines[1].has_amount, dec!(5.882353));
    assert_eq!(resp.total_has, dec!(-0.04985));
    assert_eq!(resp.party_id, None);
    assert_eq!(resp.party_balance_after, None);
}

#[test]
fn exchange_validation() {
    let mut shop = setup();
    let same = post(
        &mut shop.conn,
        PostingRequest::new(
            None,
            PostingBody::Exchange(ExchangeBody::new("TRY", dec!(10), "try", dec!(10))),
        ),
    )
    .unwrap_err();
    assert!(matches!(same, LedgerError::Validation { ref field, .. } if field == "to_currency"));

    let zero = post(
        &mut shop.conn,
        PostingRequest::new(
            None,
            PostingBody::Exchange(ExchangeBody::new("USD", dec!(0), "TRY", dec!(10))),
        ),
    )
    .unwrap_err();
    assert!(matches!(zero, LedgerError::Validation { ref field, .. } if field == "from.amount"));

    let with_party = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Exchange(ExchangeBody::new("USD", dec!(10), "TRY", dec!(350))),
        ),
    )
    .unwrap_err();
    assert!(matches!(with_party, LedgerError::Validation { ref field, .. } if field == "party_id"));
}

#[test]
fn replayed_key_returns_identical_response_once() {
    let mut shop = setup();
    let req = PostingRequest::new(
        Some(shop.supplier),
        purchase(
            vec![PurchaseLine::new("BILEZIK", "22K", dec!(10))],
            Some(try_leg(dec!(20000))),
            SettlementMode::Credit,
        ),
    )
    .at(AT)
    .with_key("req-1");

    let first = post(&mut shop.conn, req.clone()).unwrap();
    let second = post(&mut shop.conn, req.clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(count(&shop.conn, "financial_transactions"), 1);
    assert_eq!(balance(&shop.conn, shop.supplier), first.total_has);

    let pt = catalog::product_type_by_code(&shop.conn, "BILEZIK").unwrap();
    let k = catalog::karat_by_code(&shop.conn, "22K").unwrap();
    assert_eq!(
        inventory::get_pool(&shop.conn, pt.id, k.id).unwrap().unwrap().total_weight,
        dec!(10)
    );

    // keys are scoped to the creator
    let cfg = LedgerConfig::load(&shop.conn).unwrap();
    let other = posting::post(&mut shop.conn, &cfg, "another-clerk", &req).unwrap();
    assert_ne!(other.code, first.code);
    assert_eq!(count(&shop.conn, "financial_transactions"), 2);
}

#[test]
fn balance_equals_sum_of_transaction_totals() {
    let mut shop = setup();
    let party = shop.supplier;
    let requests = vec![
        purchase(
            vec![
                PurchaseLine::new("BULLION", "24K", dec!(12.5)),
                PurchaseLine::new("JEWELRY", "22K", dec!(3.3)),
            ],
            Some(try_leg(dec!(30000))),
            SettlementMode::Credit,
        ),
        PostingBody::Payment(SettlementBody::money(CurrencyLeg::new("USD", dec!(250)))),
        PostingBody::Sale(SaleBody {
            lines: vec![SaleLine::by_weight("BULLION", "24K", dec!(2.25), dec!(2.4))],
            collected: Some(try_leg(dec!(7000.55))),
            fee_has: None,
        }),
        PostingBody::Receipt(
            SettlementBody::money(try_leg(dec!(1234.56))).with_discount(dec!(0.01)),
        ),
        PostingBody::Hurda(HurdaBody {
            lines: vec![ScrapLine::new("21K", dec!(3.33))],
        }),
    ];

    let mut expected = Decimal::ZERO;
    for body in requests {
        let resp = post(&mut shop.conn, PostingRequest::new(Some(party), body).at(AT)).unwrap();
        assert_eq!(resp.lines.iter().map(|l| l.has_amount).sum::<Decimal>(), resp.total_has);
        expected += resp.total_has;
        assert_eq!(resp.party_balance_after, Some(expected));
    }
    assert_eq!(balance(&shop.conn, party), expected);
    assert_eq!(posting::ledger_total_for_party(&shop.conn, party).unwrap(), expected);
    assert!(karatbook::commands::doctor::check(&shop.conn).unwrap().is_empty());
}

#[test]
fn cash_register_failure_does_not_fail_the_posting() {
    let mut shop = setup();
    set_setting(&shop.conn, KEY_CASH_REGISTER, "9999").unwrap();

    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(10000)))),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(resp.warnings.len(), 1);
    assert_eq!(resp.warnings[0].effect, "cash_movement");
    assert_eq!(count(&shop.conn, "cash_movements"), 0);
    assert_eq!(count(&shop.conn, "financial_transactions"), 1);
    assert_eq!(balance(&shop.conn, shop.customer), dec!(1.694915));

    let stored = posting::get_transaction(&shop.conn, &resp.code).unwrap();
    assert_eq!(stored.total_has, resp.total_has);
}

#[test]
fn cash_register_records_money_flows() {
    let mut shop = setup();
    let register = parties::create_party(&shop.conn, "Kasa", PartyKind::Cash).unwrap().id;
    set_setting(&shop.conn, KEY_CASH_REGISTER, &register.to_string()).unwrap();

    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(10000)))),
        )
        .at(AT),
    )
    .unwrap();
    assert!(resp.warnings.is_empty());
    post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody::money(try_leg(dec!(2500)))),
        )
        .at(AT),
    )
    .unwrap();

    let mut stmt = shop
        .conn
        .prepare("SELECT currency, amount FROM cash_movements ORDER BY id")
        .unwrap();
    let rows: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "TRY");
    assert_eq!(Decimal::from_str(&rows[0].1).unwrap(), dec!(10000));
    assert_eq!(Decimal::from_str(&rows[1].1).unwrap(), dec!(-2500));
}

#[test]
fn validation_and_lookup_errors() {
    let mut shop = setup();
    let receipt = || PostingBody::Receipt(SettlementBody::money(try_leg(dec!(100))));

    let err = post(&mut shop.conn, PostingRequest::new(None, receipt())).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "party_id"));

    let err = post(&mut shop.conn, PostingRequest::new(Some(4242), receipt())).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "party", .. }));

    parties::set_active(&shop.conn, shop.customer, false).unwrap();
    let req = PostingRequest::new(Some(shop.customer), receipt());
    let err = post(&mut shop.conn, req).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "party_id"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(-5)))),
        ),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "amount.amount"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(Some(shop.supplier), purchase(vec![], None, SettlementMode::Credit)),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "lines"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "24K", dec!(1))],
                None,
                SettlementMode::Settle,
            ),
        ),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "settlement"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody::money(CurrencyLeg::new("GBP", dec!(100)))),
        ),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::UnsupportedCurrency(_)));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(Some(shop.supplier), receipt()).at("10.01.2025"),
    )
    .unwrap_err();
    assert!(
        matches!(err, LedgerError::Validation { ref field, .. } if field == "transaction_date")
    );

    assert_eq!(count(&shop.conn, "financial_transactions"), 0);
    assert_eq!(count(&shop.conn, "audit_log"), 0);
}

#[test]
fn no_price_data_fails_before_any_write() {
    let mut conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    let party = parties::create_party(&conn, "Musteri", PartyKind::Customer).unwrap().id;
    let err = post(
        &mut conn,
        PostingRequest::new(
            Some(party),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(100)))),
        ),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::NoPriceDataAvailable));
    assert_eq!(count(&conn, "price_snapshots"), 0);
}

#[test]
fn failing_later_line_rolls_back_earlier_lines() {
    let mut shop = setup();
    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![
                    PurchaseLine::new("BULLION", "24K", dec!(10)),
                    PurchaseLine::new("BILEZIK", "22K", dec!(10)),
                    PurchaseLine::new("BULLION", "99K", dec!(1)),
                ],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { entity: "karat", .. }));
    for table in ["products", "stock_lots", "stock_pools", "financial_transactions", "audit_log"] {
        assert_eq!(count(&shop.conn, table), 0, "{table} should be empty");
    }
    assert_eq!(balance(&shop.conn, shop.supplier), Decimal::ZERO);

    // a sale whose second line cannot be filled leaves the first item in stock
    let bought = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("JEWELRY", "22K", dec!(4))],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();
    let product_id = inventory_product_id(&bought);
    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![
                    SaleLine::unique(product_id, dec!(4.5)),
                    SaleLine::by_weight("BILEZIK", "22K", dec!(1), dec!(1)),
                ],
                collected: None,
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(
        inventory::get_product(&shop.conn, product_id).unwrap().stock_status,
        StockStatus::InStock
    );
    assert_eq!(balance(&shop.conn, shop.customer), Decimal::ZERO);
}

#[test]
fn stored_transactions_match_responses() {
    let mut shop = setup();
    let resp = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![],
                collected: None,
                fee_has: None,
            }),
        ),
    );
    assert!(resp.is_err());

    let hurda = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![ScrapLine::new("22K", dec!(2))],
            }),
        )
        .at(AT)
        .with_key("h-1"),
    )
    .unwrap();
    let receipt = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(590)))),
        )
        .at("2025-01-11T10:00:00Z"),
    )
    .unwrap();

    let stored = posting::get_transaction(&shop.conn, &hurda.code).unwrap();
    assert_eq!(stored.type_code, TransactionType::Hurda);
    assert_eq!(stored.status, "COMPLETED");
    assert_eq!(stored.lines, hurda.lines);
    assert_eq!(stored.idempotency_key.as_deref(), Some("h-1"));
    assert_eq!(stored.created_by, "clerk");
    assert_eq!(stored.snapshot_id, hurda.snapshot_id);

    let all = posting::list_transactions(&shop.conn, &TransactionFilter::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].code, receipt.code);

    let only_customer = posting::list_transactions(
        &shop.conn,
        &TransactionFilter {
            party_id: Some(shop.customer),
            ..TransactionFilter::default()
        },
    )
    .unwrap();
    assert_eq!(only_customer.len(), 1);
    assert_eq!(only_customer[0].code, hurda.code);

    let audits = karatbook::audit::list(&shop.conn, Some("financial_transaction"), 10).unwrap();
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[1].entity_id, hurda.code);
    assert_eq!(audits[1].diff["after"]["code"], hurda.code.as_str());
}

#[test]
fn json_requests_post_through_the_command_layer() {
    let mut shop = setup();
    let raw = format!(
        r#"{{
            "type_code": "HURDA",
            "party_id": {},
            "transaction_date": "{AT}",
            "idempotency_key": "json-1",
            "note": "walk-in scrap",
            "lines": [
                {{ "karat": "18K", "weight": "15" }},
                {{ "karat": "14K", "weight": "15" }}
            ]
        }}"#,
        shop.customer
    );
    let resp = karatbook::commands::post::post_json(&mut shop.conn, "clerk", &raw).unwrap();
    assert_eq!(resp.total_has, dec!(-20.025));

    let again = karatbook::commands::post::post_json(&mut shop.conn, "clerk", &raw).unwrap();
    assert_eq!(again, resp);

    let stored = posting::get_transaction(&shop.conn, &resp.code).unwrap();
    assert_eq!(stored.meta["note"], "walk-in scrap");

    let raw = r#"{"type_code":"GIFT"}"#;
    let bad = karatbook::commands::post::post_json(&mut shop.conn, "clerk", raw);
    assert!(bad.is_err());
}

fn assert_books_agree(conn: &Connection, party: i64) {
    assert_eq!(balance(conn, party), posting::ledger_total_for_party(conn, party).unwrap());
    assert!(karatbook::commands::doctor::check(conn).unwrap().is_empty());
}

#[test]
fn sub_micro_gold_figures_are_rounded_before_booking() {
    let mut shop = setup();
    let paid = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(
                SettlementBody::money(try_leg(dec!(100))).with_discount(dec!(0.0000005)),
            ),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(paid.lines[0].has_amount, dec!(-0.016949));
    assert_eq!(paid.lines[1].has_amount, dec!(-0.000001));
    assert_eq!(paid.total_has, dec!(-0.01695));
    assert_eq!(balance(&shop.conn, shop.supplier), dec!(-0.01695));
    assert_books_agree(&shop.conn, shop.supplier);

    post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "22K", dec!(10))],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();
    let sold = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![
                    SaleLine::by_weight("BULLION", "22K", dec!(4), dec!(3.8000004))
                        .listed_at(dec!(3.9000004)),
                ],
                collected: None,
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(sold.lines[0].has_amount, dec!(-3.9));
    assert_eq!(sold.lines[1].has_amount, dec!(0.1));
    assert_eq!(sold.total_has, dec!(-3.8));
    assert_eq!(sold.lines.iter().map(|l| l.has_amount).sum::<Decimal>(), sold.total_has);
    assert_books_agree(&shop.conn, shop.customer);
    assert_books_agree(&shop.conn, shop.supplier);
}

#[test]
fn gold_figures_rounding_to_zero_are_rejected() {
    let mut shop = setup();
    let tiny = dec!(0.0000004);

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody::default().with_discount(tiny)),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "discount_has"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![SaleLine::by_weight("BULLION", "22K", dec!(1), tiny)],
                collected: None,
                fee_has: None,
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(
        matches!(err, LedgerError::Validation { ref field, .. } if field == "lines[0].sale_has")
    );

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(100))).with_fee(tiny)),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "fee_has"));

    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(0.004)))),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "amount.amount"));

    assert_eq!(count(&shop.conn, "financial_transactions"), 0);
    assert_eq!(count(&shop.conn, "audit_log"), 0);
}

#[test]
fn hurda_weight_is_held_at_micro_precision() {
    let mut shop = setup();
    let taken = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![ScrapLine::new("14K", dec!(2.0000004))],
            }),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(taken.total_has, dec!(-1.17));
    let LineDetail::GoldScrapPayment { weight, .. } = &taken.lines[0].detail else {
        panic!("expected a scrap line, got {:?}", taken.lines[0].detail);
    };
    assert_eq!(*weight, dec!(2));

    let hurda = catalog::product_type_by_code(&shop.conn, "HURDA").unwrap();
    let k14 = catalog::karat_by_code(&shop.conn, "14K").unwrap();
    assert_eq!(inventory::open_lots(&shop.conn, hurda.id, k14.id).unwrap()[0].remaining, dec!(2));

    let paid = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            PostingBody::Payment(SettlementBody {
                scrap: vec![ScrapLine::new("14K", dec!(2.0000004))],
                ..SettlementBody::default()
            }),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(paid.total_has, dec!(-1.17));
    assert!(inventory::open_lots(&shop.conn, hurda.id, k14.id).unwrap().is_empty());
    assert_books_agree(&shop.conn, shop.customer);
    assert_books_agree(&shop.conn, shop.supplier);
}

#[test]
fn hurda_line_below_a_microgram_is_rejected() {
    let mut shop = setup();
    let err = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Hurda(HurdaBody {
                lines: vec![ScrapLine::new("14K", dec!(0.0000004))],
            }),
        )
        .at(AT),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "lines[0].weight"));
    assert_eq!(count(&shop.conn, "stock_lots"), 0);
    assert_eq!(count(&shop.conn, "financial_transactions"), 0);
    assert_eq!(balance(&shop.conn, shop.customer), dec!(0));
}

#[test]
fn fees_are_charged_to_the_party() {
    let mut shop = setup();
    post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.supplier),
            purchase(
                vec![PurchaseLine::new("BULLION", "22K", dec!(10))],
                None,
                SettlementMode::Credit,
            ),
        )
        .at(AT),
    )
    .unwrap();

    let sold = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Sale(SaleBody {
                lines: vec![SaleLine::by_weight("BULLION", "22K", dec!(4), dec!(3.8))],
                collected: None,
                fee_has: Some(dec!(0.05)),
            }),
        )
        .at(AT),
    )
    .unwrap();
    let kinds: Vec<LineKind> = sold.lines.iter().map(|l| l.kind()).collect();
    assert_eq!(kinds, vec![LineKind::Inventory, LineKind::Fee]);
    assert_eq!(sold.lines[1].has_amount, dec!(-0.05));
    assert_eq!(sold.total_has, dec!(-3.85));
    let stored = posting::get_transaction(&shop.conn, &sold.code).unwrap();
    assert_eq!(meta_dec(&stored.meta["remaining_debt"]), dec!(3.85));

    let received = post(
        &mut shop.conn,
        PostingRequest::new(
            Some(shop.customer),
            PostingBody::Receipt(SettlementBody::money(try_leg(dec!(5900))).with_fee(dec!(0.01))),
        )
        .at(AT),
    )
    .unwrap();
    assert_eq!(received.lines[0].has_amount, dec!(1));
    assert_eq!(received.lines[1].kind(), LineKind::Fee);
    assert_eq!(received.lines[1].has_amount, dec!(-0.01));
    assert_eq!(received.total_has, dec!(0.99));
    assert_eq!(balance(&shop.conn, shop.customer), dec!(-2.86));
    assert_books_agree(&shop.conn, shop.customer);
}
