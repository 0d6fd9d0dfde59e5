use chrono::NaiveDateTime;
use cheq_core::{money_str, qty_str};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One purchased line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub line_no: Option<i64>,
    pub code: Option<String>,
    pub barcode: Option<String>,
    pub excise_code: Option<String>,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub sum: Option<Decimal>,
    pub tax_code: Option<String>,
}

/// A discount row, referencing the items it applies to by line number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub line_no: Option<i64>,
    pub sum: Option<Decimal>,
    pub kind: Option<String>,
    pub rounding: Option<String>,
    pub tax_code: Option<String>,
    pub targets: Vec<i64>,
}

/// A payment row. RQ populates the card fields; CHECK populates
/// provided/remains change amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub line_no: Option<i64>,
    pub type_code: Option<String>,
    pub name: Option<String>,
    pub system_name: Option<String>,
    pub provider: Option<String>,
    pub terminal: Option<String>,
    pub rrn: Option<String>,
    pub pan_mask: Option<String>,
    pub auth_code: Option<String>,
    pub comment: Option<String>,
    pub sum: Option<Decimal>,
    pub provided: Option<Decimal>,
    pub remains: Option<Decimal>,
}

/// One tax-breakdown row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLine {
    pub code: Option<String>,
    pub name: Option<String>,
    pub rate: Option<Decimal>,
    pub sum: Option<Decimal>,
    pub allowance: Option<String>,
    pub turnover: Option<Decimal>,
}

/// Opaque integrity block (RQ `MAC` element), passed through unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityBlock {
    pub di: Option<String>,
    pub nt: Option<String>,
    pub value: Option<String>,
}

/// Format-agnostic decoded receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedReceipt {
    pub source_format: String,
    pub header: BTreeMap<String, String>,
    pub datetime: Option<NaiveDateTime>,
    pub total_sum: Option<Decimal>,
    pub currency: String,
    pub items: Vec<ReceiptItem>,
    pub discounts: Vec<Discount>,
    pub payments: Vec<Payment>,
    pub taxes: Vec<TaxLine>,
    /// Free-text footer lines (RQ only).
    pub footer_lines: Vec<String>,
    pub integrity: Option<IntegrityBlock>,
    /// Original text preserved for forward compatibility.
    pub raw_xml: String,
}

impl DecodedReceipt {
    /// Echo an unrecognized document back without failing: the root tag
    /// becomes the source format and every collection stays empty.
    pub fn passthrough(root_tag: String, raw_xml: &str) -> Self {
        DecodedReceipt {
            source_format: root_tag,
            header: BTreeMap::new(),
            datetime: None,
            total_sum: None,
            currency: "UAH".to_string(),
            items: Vec::new(),
            discounts: Vec::new(),
            payments: Vec::new(),
            taxes: Vec::new(),
            footer_lines: Vec::new(),
            integrity: None,
            raw_xml: raw_xml.to_string(),
        }
    }

    /// The client-facing summary shape: strings only, money at 2dp,
    /// quantities with trailing zeros removed.
    pub fn summary(&self) -> ReceiptSummary {
        ReceiptSummary {
            source_format: self.source_format.clone(),
            capture_datetime: self
                .datetime
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            total_sum: self.total_sum.map(money_str),
            currency: self.currency.clone(),
            items: self
                .items
                .iter()
                .map(|item| SummaryItem {
                    name: item.name.clone(),
                    qty: item.qty.map(qty_str),
                    price: item.price.map(money_str),
                    sum: item.sum.map(money_str),
                })
                .collect(),
        }
    }
}

/// Normalized summary stored on the check row and returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub source_format: String,
    pub capture_datetime: Option<String>,
    pub total_sum: Option<String>,
    pub currency: String,
    pub items: Vec<SummaryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryItem {
    pub name: Option<String>,
    pub qty: Option<String>,
    pub price: Option<String>,
    pub sum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn summary_formats_money_and_qty() {
        let mut r = DecodedReceipt::passthrough("RQ".into(), "<RQ/>");
        r.total_sum = Some(dec!(65.48));
        r.datetime = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(12, 30, 45));
        r.items.push(ReceiptItem {
            line_no: Some(1),
            code: None,
            barcode: None,
            excise_code: None,
            name: Some("Пиво".into()),
            unit: None,
            qty: Some(dec!(1.000)),
            price: Some(dec!(65.48)),
            sum: Some(dec!(65.48)),
            tax_code: None,
        });

        let s = r.summary();
        assert_eq!(s.capture_datetime.as_deref(), Some("2024-01-15T12:30:45"));
        assert_eq!(s.total_sum.as_deref(), Some("65.48"));
        assert_eq!(s.items[0].qty.as_deref(), Some("1"));
        assert_eq!(s.items[0].price.as_deref(), Some("65.48"));
    }

    #[test]
    fn summary_roundtrips_through_json() {
        let r = DecodedReceipt::passthrough("WHATEVER".into(), "<WHATEVER/>");
        let s = r.summary();
        let json = serde_json::to_string(&s).unwrap();
        let back: ReceiptSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source_format, "WHATEVER");
        assert!(back.items.is_empty());
    }
}
