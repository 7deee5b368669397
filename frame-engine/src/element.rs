//! FILENAME: frame-engine/src/element.rs
//! PURPOSE: The dynamically typed scalar stored in object arrays and used as a label.
//! CONTEXT: Labels must be hashable and totally ordered so that indices can map
//! them to positions and group-by can sort them. Floats therefore compare by a
//! total order in which NaN equals NaN, and values of different variants order
//! by variant rank.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::array::Array;
use crate::error::{FrameError, Result};

// ============================================================================
// FRACTION
// ============================================================================

/// An exact rational number, always stored reduced with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    numer: i64,
    denom: i64,
}

fn gcd(a: i64, b: i64) -> u64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Fraction {
    /// Returns `None` for a zero denominator, or when the reduced fraction
    /// with a positive denominator does not fit in `i64`.
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let g = gcd(numer, denom) as i64;
        // g is 2^63 only when both are i64::MIN
        let (numer, denom) = if g == i64::MIN { (1, 1) } else { (numer / g, denom / g) };
        if denom < 0 {
            return Some(Fraction {
                numer: numer.checked_neg()?,
                denom: denom.checked_neg()?,
            });
        }
        Some(Fraction { numer, denom })
    }

    pub fn numer(&self) -> i64 {
        self.numer
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }

    pub fn to_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.numer as i128 * other.denom as i128;
        let rhs = other.numer as i128 * self.denom as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

impl FromStr for Fraction {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || FrameError::Parse {
            kind: "fraction",
            text: s.to_string(),
        };
        let (numer, denom) = match s.trim().split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s.trim(), "1"),
        };
        let numer: i64 = numer.parse().map_err(|_| err())?;
        let denom: i64 = denom.parse().map_err(|_| err())?;
        Fraction::new(numer, denom).ok_or_else(err)
    }
}

// ============================================================================
// ELEMENT
// ============================================================================

/// A single value of any supported kind.
#[derive(Debug, Clone)]
pub enum Element {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Fraction(Fraction),
    /// A hierarchical label; one component per depth.
    Tuple(Vec<Element>),
    /// An array nested inside an object array.
    Array(Box<Array>),
}

impl Element {
    pub fn str(value: impl Into<String>) -> Self {
        Element::Str(value.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Element>) -> Self {
        Element::Tuple(items.into_iter().collect())
    }

    pub fn nan() -> Self {
        Element::Float(f64::NAN)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Element::Float(v) if v.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Element::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Element::Int(v) => Some(*v as f64),
            Element::Float(v) => Some(*v),
            Element::Fraction(f) => Some(f.to_f64()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Element::Bool(b) => Some(*b as i64),
            Element::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Components of a hierarchical label; a scalar is a label of depth one.
    pub fn components(&self) -> Vec<Element> {
        match self {
            Element::Tuple(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    /// Position of the variant in the cross-variant ordering.
    fn rank(&self) -> u8 {
        match self {
            Element::Null => 0,
            Element::Bool(_) => 1,
            Element::Int(_) => 2,
            Element::Float(_) => 3,
            Element::Fraction(_) => 4,
            Element::Str(_) => 5,
            Element::Date(_) => 6,
            Element::DateTime(_) => 7,
            Element::Time(_) => 8,
            Element::Tuple(_) => 9,
            Element::Array(_) => 10,
        }
    }
}

/// Total order for floats: NaN sorts last and equals itself; -0.0 equals 0.0.
pub fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn float_hash<H: Hasher>(v: f64, state: &mut H) {
    if v.is_nan() {
        u64::MAX.hash(state);
    } else if v == 0.0 {
        0u64.hash(state);
    } else {
        v.to_bits().hash(state);
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Element::Null, Element::Null) => Ordering::Equal,
            (Element::Bool(a), Element::Bool(b)) => a.cmp(b),
            (Element::Int(a), Element::Int(b)) => a.cmp(b),
            (Element::Float(a), Element::Float(b)) => float_cmp(*a, *b),
            (Element::Fraction(a), Element::Fraction(b)) => a.cmp(b),
            (Element::Str(a), Element::Str(b)) => a.cmp(b),
            (Element::Date(a), Element::Date(b)) => a.cmp(b),
            (Element::DateTime(a), Element::DateTime(b)) => a.cmp(b),
            (Element::Time(a), Element::Time(b)) => a.cmp(b),
            (Element::Tuple(a), Element::Tuple(b)) => a.cmp(b),
            (Element::Array(a), Element::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Element::Null => {}
            Element::Bool(v) => v.hash(state),
            Element::Int(v) => v.hash(state),
            Element::Float(v) => float_hash(*v, state),
            Element::Fraction(v) => v.hash(state),
            Element::Str(v) => v.hash(state),
            Element::Date(v) => v.hash(state),
            Element::DateTime(v) => v.hash(state),
            Element::Time(v) => v.hash(state),
            Element::Tuple(v) => v.hash(state),
            Element::Array(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Null => write!(f, "None"),
            Element::Bool(v) => write!(f, "{}", v),
            Element::Int(v) => write!(f, "{}", v),
            Element::Float(v) => write!(f, "{}", v),
            Element::Str(v) => write!(f, "{:?}", v),
            Element::Date(v) => write!(f, "{}", v),
            Element::DateTime(v) => write!(f, "{}", v),
            Element::Time(v) => write!(f, "{}", v),
            Element::Fraction(v) => write!(f, "{}", v),
            Element::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Element::Array(a) => write!(f, "<array {:?} {:?}>", a.dtype(), a.shape()),
        }
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<bool> for Element {
    fn from(v: bool) -> Self {
        Element::Bool(v)
    }
}

impl From<i64> for Element {
    fn from(v: i64) -> Self {
        Element::Int(v)
    }
}

impl From<i32> for Element {
    fn from(v: i32) -> Self {
        Element::Int(v as i64)
    }
}

impl From<usize> for Element {
    fn from(v: usize) -> Self {
        Element::Int(v as i64)
    }
}

impl From<f64> for Element {
    fn from(v: f64) -> Self {
        Element::Float(v)
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::Str(v.to_string())
    }
}

impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::Str(v)
    }
}

impl From<NaiveDate> for Element {
    fn from(v: NaiveDate) -> Self {
        Element::Date(v)
    }
}

impl From<NaiveDateTime> for Element {
    fn from(v: NaiveDateTime) -> Self {
        Element::DateTime(v)
    }
}

impl From<NaiveTime> for Element {
    fn from(v: NaiveTime) -> Self {
        Element::Time(v)
    }
}

impl From<Fraction> for Element {
    fn from(v: Fraction) -> Self {
        Element::Fraction(v)
    }
}

impl From<Array> for Element {
    fn from(v: Array) -> Self {
        Element::Array(Box::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nan_labels_are_equal_and_hash_together() {
        let mut set = HashSet::new();
        set.insert(Element::nan());
        set.insert(Element::Float(f64::NAN));
        assert_eq!(set.len(), 1);
        assert!(Element::Float(1.0) < Element::nan());
    }

    #[test]
    fn variants_order_by_rank() {
        let mut values = vec![
            Element::str("a"),
            Element::Int(3),
            Element::Null,
            Element::Bool(true),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![Element::Null, Element::Bool(true), Element::Int(3), Element::str("a")]
        );
    }

    #[test]
    fn fraction_reduces_and_parses() {
        let f = Fraction::new(6, -8).unwrap();
        assert_eq!((f.numer(), f.denom()), (-3, 4));
        assert_eq!(f.to_string(), "-3/4");
        assert_eq!("-3/4".parse::<Fraction>().unwrap(), f);
        assert_eq!("5".parse::<Fraction>().unwrap().to_string(), "5");
        assert!("1/0".parse::<Fraction>().is_err());
        assert!(Fraction::new(1, 3).unwrap() < Fraction::new(1, 2).unwrap());
    }

    #[test]
    fn fraction_extremes_do_not_overflow() {
        assert_eq!(Fraction::new(i64::MIN, -1), None);
        let half = Fraction::new(i64::MIN, -2).unwrap();
        assert_eq!((half.numer(), half.denom()), (1 << 62, 1));
        let one = Fraction::new(i64::MIN, i64::MIN).unwrap();
        assert_eq!((one.numer(), one.denom()), (1, 1));
        let min = Fraction::new(i64::MIN, 1).unwrap();
        assert_eq!((min.numer(), min.denom()), (i64::MIN, 1));
        assert_eq!(Fraction::new(1, i64::MIN), None);
        assert_eq!(Fraction::new(0, -5).map(|f| (f.numer(), f.denom())), Some((0, 1)));
    }

    #[test]
    fn tuple_display() {
        let t = Element::tuple([Element::str("a"), Element::Int(1)]);
        assert_eq!(t.to_string(), "(\"a\", 1)");
        assert_eq!(Element::tuple([Element::Int(1)]).to_string(), "(1,)");
    }
}
