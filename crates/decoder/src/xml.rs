//! Minimal XML reader for the registry's receipt documents.
//!
//! Supports what the two wire formats actually use: nested elements,
//! attributes in either quote style, text content, CDATA, comments,
//! processing instructions and the standard five entities. It does not
//! validate against a DTD and treats namespace prefixes as part of the tag
//! name (callers strip them with [`local_name`] where the formats require).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Unexpected end of document at byte {0}")]
    UnexpectedEof(usize),
    #[error("Expected '{expected}' at byte {at}")]
    Expected { expected: char, at: usize },
    #[error("Mismatched closing tag </{found}> for <{open}> at byte {at}")]
    MismatchedClose { open: String, found: String, at: usize },
    #[error("No root element")]
    NoRoot,
    #[error("Trailing content after the root element at byte {0}")]
    TrailingContent(usize),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated direct text content (child element text excluded).
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Trimmed text content, `None` when empty.
    pub fn text_trimmed(&self) -> Option<&str> {
        let t = self.text.trim();
        (!t.is_empty()).then_some(t)
    }

    /// Trimmed text of a named child, `None` when the child is absent or empty.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).and_then(|c| c.text_trimmed())
    }
}

/// Tag name with any namespace prefix removed ("ns:RQ" -> "RQ").
pub fn local_name(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

/// Parse a document and return its root element.
pub fn parse(input: &str) -> Result<Element, XmlError> {
    let mut p = Parser { data: input.as_bytes(), pos: 0 };
    p.skip_misc();
    if p.peek() != Some(b'<') {
        return Err(XmlError::NoRoot);
    }
    let root = p.parse_element()?;
    p.skip_misc();
    if p.pos < p.data.len() {
        return Err(XmlError::TrailingContent(p.pos));
    }
    Ok(root)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.data[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, the BOM, prolog, comments and doctype between
    /// top-level constructs.
    fn skip_misc(&mut self) {
        loop {
            if self.data[self.pos..].starts_with(&[0xEF, 0xBB, 0xBF]) {
                self.pos += 3;
                continue;
            }
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_until("?>");
            } else if self.starts_with("<!--") {
                self.skip_until("-->");
            } else if self.starts_with("<!") {
                self.skip_until(">");
            } else {
                return;
            }
        }
    }

    fn skip_until(&mut self, end: &str) {
        match find_from(self.data, self.pos, end.as_bytes()) {
            Some(i) => self.pos = i + end.len(),
            None => self.pos = self.data.len(),
        }
    }

    fn expect(&mut self, ch: u8) -> Result<(), XmlError> {
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else if self.pos >= self.data.len() {
            Err(XmlError::UnexpectedEof(self.pos))
        } else {
            Err(XmlError::Expected { expected: ch as char, at: self.pos })
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/' | b'=') {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.pos]).into_owned()
    }

    /// Parse `<tag attr="v" …>…</tag>` starting at the opening `<`.
    fn parse_element(&mut self) -> Result<Element, XmlError> {
        self.expect(b'<')?;
        let tag = self.read_name();
        let mut el = Element { tag, ..Element::default() };

        // Attributes.
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(el); // self-closing
                }
                Some(_) => {
                    let name = self.read_name();
                    if name.is_empty() {
                        return Err(XmlError::Expected { expected: '>', at: self.pos });
                    }
                    self.skip_whitespace();
                    self.expect(b'=')?;
                    self.skip_whitespace();
                    let quote = self.peek().ok_or(XmlError::UnexpectedEof(self.pos))?;
                    if quote != b'"' && quote != b'\'' {
                        return Err(XmlError::Expected { expected: '"', at: self.pos });
                    }
                    self.pos += 1;
                    let start = self.pos;
                    let end = find_byte(self.data, self.pos, quote)
                        .ok_or(XmlError::UnexpectedEof(self.pos))?;
                    let raw = String::from_utf8_lossy(&self.data[start..end]);
                    self.pos = end + 1;
                    el.attrs.push((name, decode_entities(&raw)));
                }
                None => return Err(XmlError::UnexpectedEof(self.pos)),
            }
        }

        // Content.
        loop {
            if self.pos >= self.data.len() {
                return Err(XmlError::UnexpectedEof(self.pos));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.read_name();
                if close != el.tag {
                    return Err(XmlError::MismatchedClose {
                        open: el.tag,
                        found: close,
                        at: self.pos,
                    });
                }
                self.skip_whitespace();
                self.expect(b'>')?;
                return Ok(el);
            }
            if self.starts_with("<!--") {
                self.skip_until("-->");
            } else if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let end = find_from(self.data, self.pos, b"]]>")
                    .ok_or(XmlError::UnexpectedEof(self.pos))?;
                el.text.push_str(&String::from_utf8_lossy(&self.data[self.pos..end]));
                self.pos = end + 3;
            } else if self.starts_with("<?") {
                self.skip_until("?>");
            } else if self.peek() == Some(b'<') {
                el.children.push(self.parse_element()?);
            } else {
                let start = self.pos;
                let end = find_byte(self.data, self.pos, b'<').unwrap_or(self.data.len());
                let raw = String::from_utf8_lossy(&self.data[start..end]);
                el.text.push_str(&decode_entities(&raw));
                self.pos = end;
            }
        }
    }
}

fn find_byte(data: &[u8], from: usize, needle: u8) -> Option<usize> {
    data[from..].iter().position(|&b| b == needle).map(|i| from + i)
}

fn find_from(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

/// Replace the predefined entities plus numeric character references.
/// Unknown entities are left untouched (the registry's documents contain
/// occasional bare ampersands).
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let semi = rest.find(';').filter(|&s| s <= 10);
        let Some(semi) = semi else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
