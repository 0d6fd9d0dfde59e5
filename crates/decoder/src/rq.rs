//! Parser for the compact, attribute-encoded "RQ" schema.
//!
//! Money travels as integer minor units, quantities as integer thousandths,
//! and the capture timestamp as a 14-digit compact form. Item, discount,
//! payment and tax rows all live under `RQ/DAT/C`.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::{DecodedReceipt, Discount, IntegrityBlock, Payment, ReceiptItem, TaxLine};
use crate::values::{
    line_number, money_from_minor_units, parse_compact_timestamp, qty_from_thousandths, strip_nbsp,
};
use crate::xml::Element;

pub(crate) fn parse_rq(root: &Element, raw_xml: &str) -> DecodedReceipt {
    let dat = root.child("DAT");
    let body = dat.and_then(|d| d.child("C"));

    let mut header = BTreeMap::new();
    if let Some(dat) = dat {
        let mut put = |key: &str, value: Option<&str>| {
            if let Some(v) = value {
                header.insert(key.to_string(), v.to_string());
            }
        };
        put("ndv", root.attr("NDv"));
        put("prv", root.attr("PrV"));
        put("rq_v", root.attr("V"));
        put("di", dat.attr("DI"));
        put("dt", dat.attr("DT"));
        put("fn", dat.attr("FN"));
        put("tn", dat.attr("TN"));
        put("zn", dat.attr("ZN"));
        put("dat_v", dat.attr("V"));
    }

    // Capture time: the dedicated TS child, falling back to the summary
    // element's TS attribute.
    let mut datetime = dat
        .and_then(|d| d.child_text("TS"))
        .and_then(parse_compact_timestamp);
    if datetime.is_none() {
        datetime = body
            .and_then(|c| c.child("E"))
            .and_then(|e| e.attr("TS"))
            .and_then(parse_compact_timestamp);
    }

    let mut items = Vec::new();
    let mut discounts = Vec::new();
    let mut payments = Vec::new();
    let mut taxes = Vec::new();
    let mut footer_lines = Vec::new();
    let mut total_sum: Option<Decimal> = None;

    if let Some(body) = body {
        for p in body.children_named("P") {
            items.push(parse_item(p));
        }

        for d in body.children_named("D") {
            discounts.push(parse_discount(d));
        }

        for m in body.children_named("M") {
            let sum = money_from_minor_units(m.attr("SM"));
            payments.push(Payment {
                line_no: line_number(m.attr("N")),
                type_code: m.attr("T").map(str::to_string),
                name: m.attr("NM").map(str::to_string),
                system_name: m.attr("PSNM").map(str::to_string),
                provider: m.attr("PA").map(str::to_string),
                terminal: m.attr("PB").map(str::to_string),
                rrn: m.attr("RRN").map(str::to_string),
                pan_mask: m.attr("PD").map(str::to_string),
                auth_code: m.attr("PE").map(str::to_string),
                comment: m.attr("PC").map(str::to_string),
                sum,
                provided: None,
                remains: None,
            });
            // The first payment carrying a nonzero amount seeds the total
            // until the summary element provides the authoritative one.
            if total_sum.is_none() {
                if let Some(sm) = sum {
                    if !sm.is_zero() {
                        total_sum = Some(sm);
                    }
                }
            }
        }

        if let Some(e) = body.child("E") {
            let rows: Vec<_> = e.children_named("TX").collect();
            if rows.is_empty() {
                taxes.push(parse_tax_attrs(e, e.attr("AT_NM")));
            } else {
                for tx in rows {
                    taxes.push(parse_tax_attrs(tx, tx.attr("AT_NM").or_else(|| tx.attr("AT_NMD"))));
                }
            }
            if let Some(sm) = money_from_minor_units(e.attr("SM")) {
                total_sum = Some(sm);
            }
        }

        for l in body.children_named("L") {
            if let Some(t) = l.text_trimmed() {
                footer_lines.push(strip_nbsp(t));
            }
        }
    }

    let integrity = root.child("MAC").map(|mac| IntegrityBlock {
        di: mac.attr("DI").map(str::to_string),
        nt: mac.attr("NT").map(str::to_string),
        value: mac.text_trimmed().map(str::to_string),
    });

    DecodedReceipt {
        source_format: "RQ".to_string(),
        header,
        datetime,
        total_sum,
        currency: "UAH".to_string(),
        items,
        discounts,
        payments,
        taxes,
        footer_lines,
        integrity,
        raw_xml: raw_xml.to_string(),
    }
}

fn parse_item(p: &Element) -> ReceiptItem {
    let sum = money_from_minor_units(p.attr("SM"));
    let qty = qty_from_thousandths(p.attr("Q")).unwrap_or(Decimal::ONE);
    let mut price = money_from_minor_units(p.attr("PRC"));

    // Registries frequently omit the unit price; derive it from sum/qty.
    if price.is_none() && !qty.is_zero() {
        if let Some(sm) = sum {
            price = Some((sm / qty).round_dp(2));
        }
    }

    ReceiptItem {
        line_no: line_number(p.attr("N")),
        code: p.attr("C").map(str::to_string),
        barcode: p.attr("CD").map(str::to_string),
        excise_code: p.attr("CZD").map(str::to_string),
        name: p.attr("NM").map(strip_nbsp),
        unit: p.attr("AT_TM").map(str::to_string),
        qty: Some(qty),
        price,
        sum,
        tax_code: p.attr("TX").map(str::to_string),
    }
}

fn parse_discount(d: &Element) -> Discount {
    let targets = d
        .children_named("NI")
        .filter_map(|ni| line_number(ni.attr("NI")))
        .collect();

    // Tax code may be an attribute or a nested TX element's attribute.
    let tax_code = d
        .attr("TX")
        .or_else(|| d.child("TX").and_then(|tx| tx.attr("TX")))
        .map(str::to_string);

    Discount {
        line_no: line_number(d.attr("N")),
        sum: money_from_minor_units(d.attr("SM")),
        kind: d.attr("TY").map(str::to_string),
        rounding: d.attr("TR").map(str::to_string),
        tax_code,
        targets,
    }
}

fn parse_tax_attrs(el: &Element, name: Option<&str>) -> TaxLine {
    TaxLine {
        code: el.attr("TX").map(str::to_string),
        name: name.map(str::to_string),
        rate: crate::values::decimal_field(el.attr("TXPR")),
        sum: money_from_minor_units(el.attr("TXSM")),
        allowance: el.attr("TXAL").map(str::to_string),
        turnover: None,
    }
}

#[cfg(test)]
mod tests {
    use crate::decode_text;
    use rust_decimal_macros::dec;

    const SAMPLE_RQ: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<RQ V="1" NDv="21" PrV="1">
  <DAT DI="123456" DT="1" FN="4000123456" TN="987654321" ZN="ПН123" V="1">
    <TS>20240115123045</TS>
    <C>
      <P N="1" C="101" CD="4820000123456" NM="Пиво&#160;світле 0,5л" AT_TM="шт" Q="2000" SM="13096" TX="А"/>
      <P N="2" C="102" NM="Хліб житній" Q="1000" SM="2150" TX="Б"/>
      <D N="3" SM="200" TY="0" TX="А"><NI NI="1"/></D>
      <M N="1" T="2" NM="КАРТКА" PA="Приват" PB="S1K7" RRN="000012345678" PD="444111XXXXXX1234" PE="123456" SM="15046"/>
      <E TS="20240115123045" SM="15046" TX="А" AT_NM="ПДВ" TXPR="20" TXSM="2508"/>
      <L>Дякуємо за покупку!</L>
      <L>  </L>
    </C>
  </DAT>
  <MAC DI="123456" NT="1">a1b2c3d4</MAC>
</RQ>"#;

    #[test]
    fn full_rq_document() {
        let r = decode_text(SAMPLE_RQ).unwrap();
        assert_eq!(r.source_format, "RQ");
        assert_eq!(r.header.get("fn").map(String::as_str), Some("4000123456"));
        assert_eq!(r.header.get("rq_v").map(String::as_str), Some("1"));
        assert_eq!(r.datetime.unwrap().to_string(), "2024-01-15 12:30:45");
        assert_eq!(r.total_sum, Some(dec!(150.46)));
        assert_eq!(r.items.len(), 2);
        assert_eq!(r.discounts.len(), 1);
        assert_eq!(r.payments.len(), 1);
        assert_eq!(r.taxes.len(), 1);
        assert_eq!(r.footer_lines, ["Дякуємо за покупку!"]);
        assert_eq!(r.integrity.as_ref().unwrap().value.as_deref(), Some("a1b2c3d4"));
    }

    #[test]
    fn minor_units_and_thousandths() {
        let r = decode_text(SAMPLE_RQ).unwrap();
        let beer = &r.items[0];
        assert_eq!(beer.sum, Some(dec!(130.96)));
        assert_eq!(beer.qty.map(|q| q.to_string()), Some("2".into()));
        // Price derived from sum / qty.
        assert_eq!(beer.price, Some(dec!(65.48)));
        // NBSP folded to a regular space.
        assert_eq!(beer.name.as_deref(), Some("Пиво світле 0,5л"));
    }

    #[test]
    fn missing_qty_defaults_to_one() {
        let r = decode_text(r#"<RQ><DAT><C><P N="1" NM="Сік" SM="6548"/></C></DAT></RQ>"#).unwrap();
        assert_eq!(r.items[0].qty.map(|q| q.to_string()), Some("1".into()));
        assert_eq!(r.items[0].price, Some(dec!(65.48)));
    }

    #[test]
    fn zero_qty_leaves_price_unset() {
        let r = decode_text(r#"<RQ><DAT><C><P N="1" NM="X" Q="0" SM="100"/></C></DAT></RQ>"#).unwrap();
        assert!(r.items[0].price.is_none());
    }

    #[test]
    fn discount_targets_reference_item_lines() {
        let r = decode_text(SAMPLE_RQ).unwrap();
        let d = &r.discounts[0];
        assert_eq!(d.targets, [1]);
        assert_eq!(d.sum, Some(dec!(2.00)));
        assert_eq!(d.tax_code.as_deref(), Some("А"));
    }

    #[test]
    fn payment_seeds_total_when_summary_absent() {
        let r = decode_text(
            r#"<RQ><DAT><C><M N="1" T="2" SM="500"/><M N="2" T="0" SM="700"/></C></DAT></RQ>"#,
        )
        .unwrap();
        assert_eq!(r.total_sum, Some(dec!(5.00)));
    }

    #[test]
    fn zero_sum_payment_does_not_seed_total() {
        let r =
            decode_text(r#"<RQ><DAT><C><M N="1" SM="0"/><M N="2" SM="700"/></C></DAT></RQ>"#).unwrap();
        assert_eq!(r.total_sum, Some(dec!(7.00)));
    }

    #[test]
    fn summary_element_overrides_payment_total() {
        let r = decode_text(
            r#"<RQ><DAT><C><M N="1" SM="500"/><E SM="9999" TX="А" AT_NM="ПДВ"/></C></DAT></RQ>"#,
        )
        .unwrap();
        assert_eq!(r.total_sum, Some(dec!(99.99)));
    }

    #[test]
    fn timestamp_falls_back_to_summary_attribute() {
        let r = decode_text(r#"<RQ><DAT><C><E TS="20231201080000"/></C></DAT></RQ>"#).unwrap();
        assert_eq!(r.datetime.unwrap().to_string(), "2023-12-01 08:00:00");
    }

    #[test]
    fn tax_rows_preferred_over_summary_attributes() {
        let r = decode_text(
            r#"<RQ><DAT><C><E TX="Х" AT_NM="ignored"><TX TX="А" AT_NMD="ПДВ" TXPR="20" TXSM="100"/><TX TX="Б" AT_NM="Акциз" TXPR="5" TXSM="50"/></E></C></DAT></RQ>"#,
        )
        .unwrap();
        assert_eq!(r.taxes.len(), 2);
        assert_eq!(r.taxes[0].name.as_deref(), Some("ПДВ"));
        assert_eq!(r.taxes[0].sum, Some(dec!(1.00)));
        assert_eq!(r.taxes[1].code.as_deref(), Some("Б"));
    }

    #[test]
    fn empty_dat_still_decodes() {
        let r = decode_text("<RQ><DAT/></RQ>").unwrap();
        assert!(r.items.is_empty());
        assert!(r.datetime.is_none());
        assert!(r.total_sum.is_none());
    }
}
