pub mod checkfmt;
pub mod encoding;
pub mod rq;
pub mod types;
pub mod values;
pub mod xml;

pub use encoding::decode_receipt_bytes;
pub use types::{
    DecodedReceipt, Discount, IntegrityBlock, Payment, ReceiptItem, ReceiptSummary, SummaryItem,
    TaxLine,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] xml::XmlError),
}

/// The two wire formats the registry emits, plus a forward-compatible
/// passthrough for anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemaKind {
    Rq,
    Check,
    Other(String),
}

impl SchemaKind {
    fn from_root_tag(tag: &str) -> Self {
        match xml::local_name(tag) {
            "RQ" => SchemaKind::Rq,
            "CHECK" => SchemaKind::Check,
            other => SchemaKind::Other(other.to_string()),
        }
    }
}

/// Decode raw receipt bytes: sniff the declared charset, then parse.
pub fn decode_bytes(raw: &[u8]) -> Result<DecodedReceipt, DecodeError> {
    let text = decode_receipt_bytes(raw);
    decode_text(&text)
}

/// Decode already charset-decoded receipt text into the normalized structure.
/// An unrecognized root tag is not an error; it yields a passthrough result
/// with the root tag echoed as `source_format` and empty collections.
pub fn decode_text(xml_text: &str) -> Result<DecodedReceipt, DecodeError> {
    let xml_text = xml_text.trim();
    let root = xml::parse(xml_text)?;

    Ok(match SchemaKind::from_root_tag(&root.tag) {
        SchemaKind::Rq => rq::parse_rq(&root, xml_text),
        SchemaKind::Check => checkfmt::parse_check(&root, xml_text),
        SchemaKind::Other(tag) => DecodedReceipt::passthrough(tag, xml_text),
    })
}
