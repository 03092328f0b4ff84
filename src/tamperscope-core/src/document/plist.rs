//! XML property-list reader.
//!
//! Only the XML flavour is handled; binary plists never appear inside the
//! provisioning envelope.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::DocumentValue;
use crate::error::DocumentError;

/// Deepest container nesting accepted before parsing stops.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse XML property-list text into a value.
///
/// The `<plist>` wrapper is optional. Declarations, doctypes, comments and
/// whitespace between elements are ignored.
pub fn parse_plist(text: &str) -> Result<DocumentValue, DocumentError> {
    let mut parser = PlistParser::new(text);
    let first = parser.next_significant()?;
    let wrapped = matches!(&first, Event::Start(e) if e.name().as_ref() == b"plist");
    if wrapped {
        let value = parser.value("plist")?;
        parser.expect_end("plist")?;
        Ok(value)
    } else {
        parser.value_from(first, "document")
    }
}

struct PlistParser<'a> {
    reader: Reader<&'a [u8]>,
    depth: usize,
}

impl<'a> PlistParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            reader: Reader::from_str(text),
            depth: 0,
        }
    }

    fn read_raw(&mut self) -> Result<Event<'a>, DocumentError> {
        match self.reader.read_event() {
            Ok(Event::Eof) => Err(DocumentError::UnexpectedEof),
            Ok(event) => Ok(event),
            Err(e) => Err(DocumentError::Xml {
                position: self.reader.buffer_position() as u64,
                reason: e.to_string(),
            }),
        }
    }

    /// Next event that carries structure.
    fn next_significant(&mut self) -> Result<Event<'a>, DocumentError> {
        loop {
            let event = self.read_raw()?;
            let skip = match &event {
                Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => true,
                Event::Text(t) => t.iter().all(u8::is_ascii_whitespace),
                _ => false,
            };
            if !skip {
                return Ok(event);
            }
        }
    }

    fn expect_end(&mut self, name: &'static str) -> Result<(), DocumentError> {
        match self.next_significant()? {
            Event::End(e) if e.name().as_ref() == name.as_bytes() => Ok(()),
            other => Err(unexpected(&other, name)),
        }
    }

    fn value(&mut self, context: &'static str) -> Result<DocumentValue, DocumentError> {
        let event = self.next_significant()?;
        self.value_from(event, context)
    }

    fn value_from(
        &mut self,
        event: Event<'a>,
        context: &'static str,
    ) -> Result<DocumentValue, DocumentError> {
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "dict" => self.nested(Self::dict),
                    "array" => self.nested(Self::array),
                    "string" => Ok(DocumentValue::String(self.text("string")?)),
                    "date" => Ok(DocumentValue::Date(self.text("date")?.trim().to_string())),
                    "integer" => parse_integer(&self.text("integer")?),
                    "real" => parse_real(&self.text("real")?),
                    "data" => decode_data(&self.text("data")?),
                    "true" => {
                        self.expect_end("true")?;
                        Ok(DocumentValue::Bool(true))
                    },
                    "false" => {
                        self.expect_end("false")?;
                        Ok(DocumentValue::Bool(false))
                    },
                    _ => Err(DocumentError::UnexpectedElement {
                        element: name,
                        context,
                    }),
                }
            },
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "dict" => Ok(DocumentValue::Dict(BTreeMap::new())),
                    "array" => Ok(DocumentValue::Array(Vec::new())),
                    "string" => Ok(DocumentValue::String(String::new())),
                    "data" => Ok(DocumentValue::Data(Vec::new())),
                    "true" => Ok(DocumentValue::Bool(true)),
                    "false" => Ok(DocumentValue::Bool(false)),
                    "integer" => parse_integer(""),
                    "real" => parse_real(""),
                    "date" => Err(DocumentError::InvalidScalar {
                        element: "date",
                        value: String::new(),
                    }),
                    _ => Err(DocumentError::UnexpectedElement {
                        element: name,
                        context,
                    }),
                }
            },
            other => Err(unexpected(&other, context)),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<DocumentValue, DocumentError>,
    ) -> Result<DocumentValue, DocumentError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(DocumentError::TooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Result<DocumentValue, DocumentError> {
        let mut map = BTreeMap::new();
        loop {
            let key = match self.next_significant()? {
                Event::End(e) if e.name().as_ref() == b"dict" => break,
                Event::Start(e) if e.name().as_ref() == b"key" => self.text("key")?,
                Event::Empty(e) if e.name().as_ref() == b"key" => String::new(),
                other => return Err(unexpected(&other, "dict")),
            };
            let value = self.value("dict")?;
            map.insert(key, value);
        }
        Ok(DocumentValue::Dict(map))
    }

    fn array(&mut self) -> Result<DocumentValue, DocumentError> {
        let mut items = Vec::new();
        loop {
            let event = self.next_significant()?;
            if let Event::End(e) = &event {
                if e.name().as_ref() == b"array" {
                    break;
                }
            }
            items.push(self.value_from(event, "array")?);
        }
        Ok(DocumentValue::Array(items))
    }

    /// Collect character data up to the closing tag of `element`.
    fn text(&mut self, element: &'static str) -> Result<String, DocumentError> {
        let mut out = String::new();
        loop {
            match self.read_raw()? {
                Event::Text(t) => {
                    let unescaped = t.unescape().map_err(|e| DocumentError::Xml {
                        position: self.reader.buffer_position() as u64,
                        reason: e.to_string(),
                    })?;
                    out.push_str(&unescaped);
                },
                Event::CData(c) => {
                    let raw = std::str::from_utf8(&c).map_err(|e| DocumentError::Xml {
                        position: self.reader.buffer_position() as u64,
                        reason: e.to_string(),
                    })?;
                    out.push_str(raw);
                },
                Event::Comment(_) => {},
                Event::End(e) if e.name().as_ref() == element.as_bytes() => return Ok(out),
                other => return Err(unexpected(&other, element)),
            }
        }
    }
}

fn unexpected(event: &Event<'_>, context: &'static str) -> DocumentError {
    let element = match event {
        Event::Start(e) | Event::Empty(e) => String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        Event::End(e) => format!("/{}", String::from_utf8_lossy(e.name().as_ref())),
        Event::Text(_) | Event::CData(_) => "#text".to_string(),
        _ => "#other".to_string(),
    };
    DocumentError::UnexpectedElement { element, context }
}

fn parse_integer(raw: &str) -> Result<DocumentValue, DocumentError> {
    let trimmed = raw.trim();
    let invalid = || DocumentError::InvalidScalar {
        element: "integer",
        value: raw.to_string(),
    };

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, body) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex_digits) => (16, hex_digits),
        None => (10, digits),
    };
    // from_str_radix takes its own sign; only one is allowed, before any 0x
    if !body.starts_with(|c: char| c.is_digit(radix)) {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(body, radix).map_err(|_| invalid())?;
    let signed = if negative {
        magnitude.checked_neg().ok_or_else(invalid)?
    } else {
        magnitude
    };
    i64::try_from(signed)
        .map(DocumentValue::Integer)
        .map_err(|_| invalid())
}

fn parse_real(raw: &str) -> Result<DocumentValue, DocumentError> {
    raw.trim()
        .parse::<f64>()
        .map(DocumentValue::Real)
        .map_err(|_| DocumentError::InvalidScalar {
            element: "real",
            value: raw.to_string(),
        })
}

fn decode_data(raw: &str) -> Result<DocumentValue, DocumentError> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map(DocumentValue::Data)
        .map_err(|_| DocumentError::InvalidScalar {
            element: "data",
            value: raw.to_string(),
        })
}
