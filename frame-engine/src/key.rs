//! FILENAME: frame-engine/src/key.rs
//! PURPOSE: Positional selectors for one axis of a block store.

use std::ops::Range;

use crate::error::{FrameError, Result};

// ============================================================================
// SLICE
// ============================================================================

/// A start/stop/step selector with the usual clamping and negative-index rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        Slice { start, stop, step }
    }

    pub fn range(start: isize, stop: isize) -> Self {
        Slice::new(Some(start), Some(stop), None)
    }

    /// Concrete `(start, stop, step)` for an axis of length `len`.
    pub fn indices(&self, len: usize) -> Result<(isize, isize, isize)> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(FrameError::ZeroSliceStep);
        }
        let len = len as isize;
        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
        let clamp = |bound: Option<isize>, default: isize| match bound {
            None => default,
            Some(v) if v < 0 => (v + len).max(lower),
            Some(v) => v.min(upper),
        };
        let start = clamp(self.start, if step < 0 { upper } else { lower });
        let stop = clamp(self.stop, if step < 0 { lower } else { upper });
        Ok((start, stop, step))
    }

    pub fn positions(&self, len: usize) -> Result<Vec<usize>> {
        let (start, stop, step) = self.indices(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }

    /// An equivalent slice that walks the same positions in ascending order.
    pub fn to_ascending(&self, len: usize) -> Result<Slice> {
        let step = self.step.unwrap_or(1);
        if step > 0 {
            return Ok(*self);
        }
        let positions = self.positions(len)?;
        Ok(match (positions.last(), positions.first()) {
            (Some(&low), Some(&high)) => Slice::new(
                Some(low as isize),
                Some(high as isize + 1),
                Some(-step),
            ),
            _ => Slice::range(0, 0),
        })
    }
}

// ============================================================================
// KEY
// ============================================================================

/// Selects positions along one axis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Key {
    #[default]
    All,
    Int(usize),
    Slice(Slice),
    Mask(Vec<bool>),
    List(Vec<usize>),
}

impl Key {
    /// True when the key selects a single position and drops the axis.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Key::Int(_))
    }

    /// Resolve to positions on an axis of length `len`.
    pub fn positions(&self, len: usize) -> Result<Vec<usize>> {
        let check = |position: usize| {
            if position < len {
                Ok(position)
            } else {
                Err(FrameError::OutOfBounds { position, len })
            }
        };
        match self {
            Key::All => Ok((0..len).collect()),
            Key::Int(i) => Ok(vec![check(*i)?]),
            Key::Slice(slice) => slice.positions(len),
            Key::Mask(mask) => {
                if mask.len() != len {
                    return Err(FrameError::KeyShapeMismatch {
                        expected: len,
                        found: mask.len(),
                    });
                }
                Ok(mask.iter().enumerate().filter(|(_, m)| **m).map(|(i, _)| i).collect())
            }
            Key::List(list) => list.iter().map(|&i| check(i)).collect(),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i)
    }
}

impl From<Range<usize>> for Key {
    fn from(r: Range<usize>) -> Self {
        Key::Slice(Slice::range(r.start as isize, r.end as isize))
    }
}

impl From<Slice> for Key {
    fn from(s: Slice) -> Self {
        Key::Slice(s)
    }
}

impl From<Vec<usize>> for Key {
    fn from(v: Vec<usize>) -> Self {
        Key::List(v)
    }
}

impl From<Vec<bool>> for Key {
    fn from(v: Vec<bool>) -> Self {
        Key::Mask(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_step_walks_backwards() {
        let s = Slice::new(None, None, Some(-2));
        assert_eq!(s.positions(5).unwrap(), vec![4, 2, 0]);
        assert_eq!(s.to_ascending(5).unwrap().positions(5).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn bounds_clamp() {
        assert_eq!(Slice::range(-2, 100).positions(4).unwrap(), vec![2, 3]);
        assert!(Slice::new(None, None, Some(0)).positions(4).is_err());
    }

    #[test]
    fn key_errors() {
        assert!(matches!(
            Key::Int(3).positions(3),
            Err(FrameError::OutOfBounds { position: 3, len: 3 })
        ));
        assert!(matches!(
            Key::Mask(vec![true]).positions(2),
            Err(FrameError::KeyShapeMismatch { expected: 2, found: 1 })
        ));
        assert_eq!(Key::Mask(vec![false, true]).positions(2).unwrap(), vec![1]);
    }
}
