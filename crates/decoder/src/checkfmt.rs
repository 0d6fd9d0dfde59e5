//! Parser for the verbose, element-encoded "CHECK" schema.
//!
//! Unlike RQ, every value here is human-readable decimal text nested in
//! named elements, and the capture timestamp is split across separate
//! `ORDERDATE` / `ORDERTIME` fields.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::{DecodedReceipt, Payment, ReceiptItem, TaxLine};
use crate::values::{decimal_field, line_number, parse_date_time_pair, strip_nbsp};
use crate::xml::Element;

pub(crate) fn parse_check(root: &Element, raw_xml: &str) -> DecodedReceipt {
    let head = root.child("CHECKHEAD");

    let mut header = BTreeMap::new();
    if let Some(head) = head {
        let mut put = |key: &str, tag: &str| {
            if let Some(v) = head.child_text(tag) {
                header.insert(key.to_string(), v.to_string());
            }
        };
        put("uid", "UID");
        put("tin", "TIN");
        put("org_name", "ORGNM");
        put("point_name", "POINTNM");
        put("point_addr", "POINTADDR");
        put("order_date", "ORDERDATE");
        put("order_time", "ORDERTIME");
        put("order_num", "ORDERNUM");
        put("cashregister_num", "CASHREGISTERNUM");
    }

    let datetime = match (header.get("order_date"), header.get("order_time")) {
        (Some(d), Some(t)) => parse_date_time_pair(d, t),
        _ => None,
    };

    let total_sum = root
        .child("CHECKTOTAL")
        .and_then(|t| decimal_field(t.child_text("SUM")))
        .map(|v| v.round_dp(2));

    let mut items = Vec::new();
    if let Some(body) = root.child("CHECKBODY") {
        for row in body.children_named("ROW") {
            items.push(ReceiptItem {
                line_no: line_number(row.attr("ROWNUM")),
                code: row.child_text("CODE").map(str::to_string),
                barcode: None,
                excise_code: None,
                name: row.child_text("NAME").map(strip_nbsp),
                unit: row.child_text("UNITNM").map(str::to_string),
                qty: decimal_field(row.child_text("AMOUNT")).map(|q| q.normalize()),
                price: decimal_field(row.child_text("PRICE")).map(|p| p.round_dp(2)),
                sum: decimal_field(row.child_text("COST")).map(|c| c.round_dp(2)),
                tax_code: row.child_text("LETTERS").map(str::to_string),
            });
        }
    }

    let mut payments = Vec::new();
    if let Some(pay) = root.child("CHECKPAY") {
        for row in pay.children_named("ROW") {
            payments.push(Payment {
                line_no: line_number(row.attr("ROWNUM")),
                type_code: row.child_text("PAYFORMCD").map(str::to_string),
                name: row.child_text("PAYFORMNM").map(str::to_string),
                system_name: None,
                provider: None,
                terminal: None,
                rrn: None,
                pan_mask: None,
                auth_code: None,
                comment: None,
                sum: Some(money_or_zero(row.child_text("SUM"))),
                provided: Some(money_or_zero(row.child_text("PROVIDED"))),
                remains: Some(money_or_zero(row.child_text("REMAINS"))),
            });
        }
    }

    let mut taxes = Vec::new();
    if let Some(tax) = root.child("CHECKTAX") {
        for row in tax.children_named("ROW") {
            taxes.push(TaxLine {
                code: row.child_text("LETTER").map(str::to_string),
                name: row.child_text("NAME").map(str::to_string),
                rate: decimal_field(row.child_text("PRC")),
                sum: Some(money_or_zero(row.child_text("SUM"))),
                allowance: None,
                turnover: Some(money_or_zero(row.child_text("TURNOVER"))),
            });
        }
    }

    DecodedReceipt {
        source_format: "CHECK".to_string(),
        header,
        datetime,
        total_sum,
        currency: "UAH".to_string(),
        items,
        discounts: Vec::new(),
        payments,
        taxes,
        footer_lines: Vec::new(),
        integrity: None,
        raw_xml: raw_xml.to_string(),
    }
}

// Absent or unparseable amounts in payment and tax rows collapse to 0.00.
fn money_or_zero(raw: Option<&str>) -> Decimal {
    decimal_field(raw).unwrap_or(Decimal::ZERO).round_dp(2)
}
