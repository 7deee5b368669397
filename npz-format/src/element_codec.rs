//! FILENAME: npz-format/src/element_codec.rs
//! PURPOSE: JSON forms of elements for archive manifests.
//! CONTEXT: Values JSON cannot hold directly are tagged: date-times, dates,
//! times, fractions, integers too long for every JSON reader, non-finite
//! floats and nested arrays. Names use plain JSON where they can, with a
//! tagged value written as a single-key object. Object array values are
//! always written as `[tag, value]` pairs, with an empty tag for plain values.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use frame_engine::{Array, DType, Element, FrameError, Fraction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

use crate::error::{ArchiveError, Result};

const TAG_PLAIN: &str = "";
const TAG_DATETIME: &str = "DT";
const TAG_DATE: &str = "D";
const TAG_TIME: &str = "T";
const TAG_FRACTION: &str = "F";
const TAG_INT: &str = "I";
const TAG_ARRAY: &str = "A";
const TAG_NON_FINITE: &str = "N";

const FORMAT_DATETIME: &str = "%a %b %d %H:%M:%S:%6f";
const FORMAT_DATE: &str = "%a %b %d";
const FORMAT_TIME: &str = "%H:%M:%S:%6f";

/// Integers with this many characters or more are written as strings.
const LONG_INT_CHARS: usize = 19;

// ============================================================================
// TAGGED VALUES
// ============================================================================

fn tagged(element: &Element) -> Result<Option<(&'static str, Value)>> {
    Ok(Some(match element {
        // year is zero padded so it parses back with a fixed width
        Element::DateTime(dt) => (
            TAG_DATETIME,
            Value::String(format!("{:04} {}", dt.year(), dt.format(FORMAT_DATETIME))),
        ),
        Element::Date(d) => (TAG_DATE, Value::String(format!("{:04} {}", d.year(), d.format(FORMAT_DATE)))),
        Element::Time(t) => (TAG_TIME, Value::String(t.format(FORMAT_TIME).to_string())),
        Element::Fraction(f) => (TAG_FRACTION, Value::String(f.to_string())),
        Element::Int(i) => {
            let text = i.to_string();
            if text.len() < LONG_INT_CHARS {
                return Ok(None);
            }
            (TAG_INT, Value::String(text))
        }
        Element::Float(f) if !f.is_finite() => {
            let text = if f.is_nan() {
                "nan"
            } else if *f > 0.0 {
                "inf"
            } else {
                "-inf"
            };
            (TAG_NON_FINITE, Value::String(text.to_string()))
        }
        Element::Array(a) => (TAG_ARRAY, encode_array(a)?),
        _ => return Ok(None),
    }))
}

fn parse_error(kind: &'static str, text: &str) -> ArchiveError {
    FrameError::Parse {
        kind,
        text: text.to_string(),
    }
    .into()
}

fn untagged(tag: &str, value: &Value) -> Result<Element> {
    if tag == TAG_ARRAY {
        return Ok(Element::Array(Box::new(decode_array(value)?)));
    }
    let text = value
        .as_str()
        .ok_or_else(|| ArchiveError::InvalidFormat(format!("tag {} holds {}", tag, value)))?;
    Ok(match tag {
        TAG_DATETIME => Element::DateTime(
            NaiveDateTime::parse_from_str(text, &format!("%Y {}", FORMAT_DATETIME))
                .map_err(|_| parse_error("datetime", text))?,
        ),
        TAG_DATE => Element::Date(
            NaiveDate::parse_from_str(text, &format!("%Y {}", FORMAT_DATE)).map_err(|_| parse_error("date", text))?,
        ),
        TAG_TIME => {
            Element::Time(NaiveTime::parse_from_str(text, FORMAT_TIME).map_err(|_| parse_error("time", text))?)
        }
        TAG_FRACTION => Element::Fraction(text.parse::<Fraction>()?),
        TAG_INT => Element::Int(text.parse().map_err(|_| parse_error("integer", text))?),
        TAG_NON_FINITE => match text {
            "nan" => Element::Float(f64::NAN),
            "inf" => Element::Float(f64::INFINITY),
            "-inf" => Element::Float(f64::NEG_INFINITY),
            _ => return Err(parse_error("float", text)),
        },
        other => return Err(ArchiveError::InvalidFormat(format!("unknown element tag {:?}", other))),
    })
}

// ============================================================================
// PLAIN VALUES
// ============================================================================

fn plain(element: &Element, part: fn(&Element) -> Result<Value>) -> Result<Value> {
    Ok(match element {
        Element::Null => Value::Null,
        Element::Bool(b) => Value::Bool(*b),
        Element::Int(i) => Value::Number((*i).into()),
        Element::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Element::Str(s) => Value::String(s.clone()),
        Element::Tuple(parts) => Value::Array(parts.iter().map(part).collect::<Result<Vec<_>>>()?),
        // every other variant is tagged
        other => Value::String(other.to_string()),
    })
}

fn from_plain(value: &Value, part: fn(&Value) -> Result<Element>) -> Result<Element> {
    Ok(match value {
        Value::Null => Element::Null,
        Value::Bool(b) => Element::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Element::Int(i),
            None => Element::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Element::Str(s.clone()),
        Value::Array(parts) => Element::Tuple(parts.iter().map(part).collect::<Result<Vec<_>>>()?),
        Value::Object(_) => return Err(ArchiveError::InvalidFormat(format!("unexpected object {}", value))),
    })
}

// ============================================================================
// PUBLIC CODECS
// ============================================================================

/// Encode one object value as a `[tag, value]` pair.
pub fn encode_element(element: &Element) -> Result<Value> {
    Ok(match tagged(element)? {
        Some((tag, value)) => json!([tag, value]),
        None => json!([TAG_PLAIN, plain(element, encode_element)?]),
    })
}

pub fn decode_element(value: &Value) -> Result<Element> {
    match value.as_array().map(Vec::as_slice) {
        Some([Value::String(tag), inner]) if tag == TAG_PLAIN => from_plain(inner, decode_element),
        Some([Value::String(tag), inner]) => untagged(tag, inner),
        _ => Err(ArchiveError::InvalidFormat(format!("expected a [tag, value] pair, found {}", value))),
    }
}

/// Encode a frame or index name; plain JSON where possible.
pub fn encode_name(name: &Element) -> Result<Value> {
    match tagged(name)? {
        Some((tag, value)) => {
            let mut object = Map::new();
            object.insert(tag.to_string(), value);
            Ok(Value::Object(object))
        }
        None => plain(name, encode_name),
    }
}

pub fn decode_name(value: &Value) -> Result<Element> {
    match value {
        Value::Object(object) if object.len() == 1 => match object.iter().next() {
            Some((tag, inner)) => untagged(tag, inner),
            None => Err(ArchiveError::InvalidFormat("empty name object".to_string())),
        },
        _ => from_plain(value, decode_name),
    }
}

#[derive(Serialize, Deserialize)]
struct EncodedArray {
    dtype: DType,
    shape: Vec<usize>,
    values: Vec<Value>,
}

/// Encode an array of any dtype, values in row-major order.
pub fn encode_array(array: &Array) -> Result<Value> {
    let encoded = EncodedArray {
        dtype: array.dtype(),
        shape: array.shape().to_vec(),
        values: array.iter().map(|e| encode_element(&e)).collect::<Result<_>>()?,
    };
    Ok(serde_json::to_value(encoded)?)
}

pub fn decode_array(value: &Value) -> Result<Array> {
    let encoded = EncodedArray::deserialize(value)?;
    let elements = encoded
        .values
        .iter()
        .map(decode_element)
        .collect::<Result<Vec<Element>>>()?;
    let array = Array::from_elements(&elements, Some(encoded.dtype))?;
    if encoded.shape.len() == 1 {
        Ok(array)
    } else {
        Ok(array.reshape(&encoded.shape)?)
    }
}
