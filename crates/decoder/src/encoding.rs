use encoding_rs::{Encoding, UTF_8};

/// Decode raw receipt bytes into text. The registry serves XML in a mix of
/// charsets (windows-1251 is common); the declared `encoding="…"` hint in the
/// prolog is honored when the label is known to `encoding_rs`, otherwise
/// UTF-8 is assumed. Invalid sequences are replaced, never fatal. The result
/// is trimmed.
pub fn decode_receipt_bytes(raw: &[u8]) -> String {
    let encoding = sniff_declared_encoding(raw).unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(raw);
    text.trim().to_string()
}

/// Look for an `encoding="…"` (or single-quoted) hint in the first 256 bytes,
/// ASCII-decoded and case-insensitive.
fn sniff_declared_encoding(raw: &[u8]) -> Option<&'static Encoding> {
    let head: String = raw
        .iter()
        .take(256)
        .map(|&b| if b.is_ascii() { (b as char).to_ascii_lowercase() } else { ' ' })
        .collect();

    let rest = &head[head.find("encoding=")? + "encoding=".len()..];
    let mut chars = rest.chars();
    let quote = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let label: String = chars.take_while(|&c| c != quote).collect();
    Encoding::for_label(label.trim().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_windows_1251_is_honored() {
        // "пиво" in windows-1251.
        let mut raw = br#"<?xml version="1.0" encoding="windows-1251"?><T>"#.to_vec();
        raw.extend_from_slice(&[0xEF, 0xE8, 0xE2, 0xEE]);
        raw.extend_from_slice(b"</T>");
        let text = decode_receipt_bytes(&raw);
        assert!(text.contains("пиво"), "got: {text}");
    }

    #[test]
    fn missing_declaration_falls_back_to_utf8() {
        let text = decode_receipt_bytes("<T>пиво</T>".as_bytes());
        assert_eq!(text, "<T>пиво</T>");
    }

    #[test]
    fn unknown_label_falls_back_to_utf8() {
        let raw = br#"<?xml encoding="x-no-such-charset"?><T>ok</T>"#;
        assert_eq!(decode_receipt_bytes(raw), r#"<?xml encoding="x-no-such-charset"?><T>ok</T>"#);
    }

    #[test]
    fn invalid_sequences_are_replaced_not_fatal() {
        let raw = [b'<', b'T', b'>', 0xFF, 0xFE, b'<', b'/', b'T', b'>'];
        let text = decode_receipt_bytes(&raw);
        assert!(text.starts_with("<T>"));
        assert!(text.ends_with("</T>"));
    }

    #[test]
    fn result_is_trimmed() {
        assert_eq!(decode_receipt_bytes(b"  <T/>\n"), "<T/>");
    }

    #[test]
    fn single_quoted_declaration_is_accepted() {
        let raw = b"<?xml version='1.0' encoding='UTF-8'?><T/>";
        assert_eq!(decode_receipt_bytes(raw), "<?xml version='1.0' encoding='UTF-8'?><T/>");
    }
}
