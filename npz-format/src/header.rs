//! FILENAME: npz-format/src/header.rs
//! PURPOSE: The dictionary literal at the head of every NPY file.
//! CONTEXT: Headers are written in one fixed form but read in any form other
//! writers produce: either quote style, optional trailing commas, spacing and
//! padding, and keys in any order.

use crate::error::{ArchiveError, Result};

pub(crate) const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ARRAY_ALIGN: usize = 64;

/// Decoded NPY header fields.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

fn literal_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn literal_tuple(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({},)", single),
        _ => {
            let parts: Vec<String> = shape.iter().map(|s| s.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Full version 3.0 preamble: magic, version, length and padded header text.
///
/// The data that follows starts on a 64 byte boundary.
pub(crate) fn encode_header(header: &NpyHeader) -> Vec<u8> {
    let text = format!(
        "{{\"descr\":\"{}\",\"fortran_order\":{},\"shape\":{}}}",
        header.descr,
        literal_bool(header.fortran_order),
        literal_tuple(&header.shape)
    );
    let hlen = text.len() + 1;
    let padlen = ARRAY_ALIGN - ((MAGIC.len() + 2 + 4 + hlen) % ARRAY_ALIGN);

    let mut out = Vec::with_capacity(MAGIC.len() + 6 + hlen + padlen);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[3, 0]);
    out.extend_from_slice(&((hlen + padlen) as u32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padlen));
    out.push(b'\n');
    out
}

// ============================================================================
// LITERAL PARSER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Bool(bool),
    Int(i64),
    None,
    Tuple(Vec<Literal>),
    Dict(Vec<(String, Literal)>),
}

struct Parser<'a> {
    text: &'a [u8],
    pos: usize,
}

fn invalid(message: impl Into<String>) -> ArchiveError {
    ArchiveError::InvalidFormat(message.into())
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.text.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            other => Err(invalid(format!(
                "expected '{}' in header, found {:?}",
                byte as char,
                other.map(|b| b as char)
            ))),
        }
    }

    /// Items up to `close`, separated by commas with an optional trailing one.
    fn sequence<T>(&mut self, close: u8, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(item(self)?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {}
                other => return Err(invalid(format!("unexpected {:?} in header", other.map(|b| b as char)))),
            }
        }
    }

    fn value(&mut self) -> Result<Literal> {
        match self.peek() {
            Some(b'{') => {
                self.pos += 1;
                let entries = self.sequence(b'}', |p| {
                    let key = match p.value()? {
                        Literal::Str(key) => key,
                        other => return Err(invalid(format!("header key {:?} is not a string", other))),
                    };
                    p.expect(b':')?;
                    Ok((key, p.value()?))
                })?;
                Ok(Literal::Dict(entries))
            }
            Some(b'(') => {
                self.pos += 1;
                Ok(Literal::Tuple(self.sequence(b')', |p| p.value())?))
            }
            Some(quote @ (b'\'' | b'"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.text.len() && self.text[self.pos] != quote {
                    self.pos += 1;
                }
                if self.pos >= self.text.len() {
                    return Err(invalid("unterminated string in header"));
                }
                let s = String::from_utf8_lossy(&self.text[start..self.pos]).into_owned();
                self.pos += 1;
                Ok(Literal::Str(s))
            }
            Some(b) if b == b'-' || b.is_ascii_digit() => {
                let start = self.pos;
                self.pos += 1;
                while self.pos < self.text.len() && self.text[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let digits = String::from_utf8_lossy(&self.text[start..self.pos]).into_owned();
                // long suffix from old writers
                if self.text.get(self.pos) == Some(&b'L') {
                    self.pos += 1;
                }
                digits
                    .parse()
                    .map(Literal::Int)
                    .map_err(|_| invalid(format!("bad integer {:?} in header", digits)))
            }
            Some(b) if b.is_ascii_alphabetic() => {
                let start = self.pos;
                while self.pos < self.text.len() && self.text[self.pos].is_ascii_alphanumeric() {
                    self.pos += 1;
                }
                match &self.text[start..self.pos] {
                    b"True" => Ok(Literal::Bool(true)),
                    b"False" => Ok(Literal::Bool(false)),
                    b"None" => Ok(Literal::None),
                    other => Err(invalid(format!("unknown name {:?} in header", String::from_utf8_lossy(other)))),
                }
            }
            other => Err(invalid(format!("unexpected {:?} in header", other.map(|b| b as char)))),
        }
    }
}

/// Parse header text into its three fields.
pub(crate) fn decode_header(text: &str) -> Result<NpyHeader> {
    let mut parser = Parser::new(text);
    let entries = match parser.value()? {
        Literal::Dict(entries) => entries,
        _ => return Err(invalid("header is not a dictionary")),
    };

    let mut descr = None;
    let mut fortran_order = None;
    let mut shape = None;
    for (key, value) in entries {
        match (key.as_str(), value) {
            ("descr", Literal::Str(s)) => descr = Some(s),
            ("fortran_order", Literal::Bool(b)) => fortran_order = Some(b),
            ("shape", Literal::Tuple(items)) => {
                let dims = items
                    .into_iter()
                    .map(|item| match item {
                        Literal::Int(n) if n >= 0 => Ok(n as usize),
                        other => Err(invalid(format!("bad dimension {:?}", other))),
                    })
                    .collect::<Result<Vec<usize>>>()?;
                shape = Some(dims);
            }
            (key, value) => return Err(invalid(format!("unexpected header entry {}: {:?}", key, value))),
        }
    }
    Ok(NpyHeader {
        descr: descr.ok_or_else(|| invalid("header has no descr"))?,
        fortran_order: fortran_order.ok_or_else(|| invalid("header has no fortran_order"))?,
        shape: shape.ok_or_else(|| invalid("header has no shape"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_header_is_aligned() {
        let header = NpyHeader {
            descr: "<i8".to_string(),
            fortran_order: true,
            shape: vec![3],
        };
        let bytes = encode_header(&header);
        assert_eq!(bytes.len() % 64, 0);
        assert_eq!(&bytes[..8], b"\x93NUMPY\x03\x00");
        assert_eq!(*bytes.last().unwrap(), b'\n');
        let text = std::str::from_utf8(&bytes[12..]).unwrap();
        assert!(text.starts_with(r#"{"descr":"<i8","fortran_order":True,"shape":(3,)}"#));
        assert_eq!(decode_header(text).unwrap(), header);
    }

    #[test]
    fn test_reads_foreign_header_forms() {
        let text = "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 3), }          \n";
        let header = decode_header(text).unwrap();
        assert_eq!(header.descr, "<f8");
        assert!(!header.fortran_order);
        assert_eq!(header.shape, vec![2, 3]);

        let scalar = decode_header("{'shape': (), 'fortran_order': False, 'descr': '|b1'}").unwrap();
        assert!(scalar.shape.is_empty());
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(decode_header("{'descr': '<i8'").is_err());
        assert!(decode_header("{'descr': '<i8', 'fortran_order': Maybe, 'shape': ()}").is_err());
        assert!(decode_header("('descr',)").is_err());
    }
}
