//! FILENAME: frame-engine/src/group.rs
//! PURPOSE: Group-by over a block store along either axis.
//! CONTEXT: Groups are always yielded in ascending order of the group key and
//! the positions inside a group are always ascending, whichever sort kind is
//! used, so callers such as pivot get deterministic output. Only the key
//! columns are ever compared; the rest of the table is touched only when a
//! group's sub-store or extracted values are built.

use std::cmp::Ordering;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::builder::ColumnBuilder;
use crate::dtype::{resolve_dtype_iter, DType};
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::type_blocks::TypeBlocks;

/// Sorting algorithm used to order group keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKind {
    /// Unstable sort; faster, the default.
    #[default]
    Quick,
    Stable,
}

/// Label and ascending member positions of one group.
pub type Group = (Element, Vec<usize>);

/// Split `order` into runs of equal keys.
fn runs<F>(order: &[usize], same: F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> bool,
{
    let mut out: Vec<Vec<usize>> = Vec::new();
    for &p in order {
        match out.last_mut() {
            Some(run) if same(run[0], p) => run.push(p),
            _ => out.push(vec![p]),
        }
    }
    for run in &mut out {
        run.sort_unstable();
    }
    out
}

fn sort_positions<F>(len: usize, kind: SortKind, cmp: F) -> Vec<usize>
where
    F: Fn(usize, usize) -> Ordering,
{
    let mut order: Vec<usize> = (0..len).collect();
    match kind {
        SortKind::Stable => order.sort_by(|a, b| cmp(*a, *b)),
        SortKind::Quick => order.sort_unstable_by(|a, b| cmp(*a, *b)),
    }
    order
}

impl TypeBlocks {
    fn check_axis_key(&self, axis: usize, key: &[usize]) -> Result<()> {
        if key.is_empty() {
            return Err(FrameError::EmptyGroupKey);
        }
        let len = match axis {
            0 => self.columns(),
            1 => self.rows(),
            _ => return Err(FrameError::AxisInvalid(axis)),
        };
        if let Some(&position) = key.iter().find(|&&k| k >= len) {
            return Err(FrameError::OutOfBounds { position, len });
        }
        Ok(())
    }

    /// Labels and member positions of every group, in ascending key order.
    ///
    /// On axis 0 rows are grouped by the values in the `key` columns; on axis 1
    /// columns are grouped by the values in the `key` rows. A single key
    /// position gives scalar labels, several give tuple labels.
    pub fn group_positions(&self, axis: usize, key: &[usize], kind: SortKind) -> Result<Vec<Group>> {
        self.check_axis_key(axis, key)?;
        let groups: Vec<Group> = match (axis, key) {
            (0, [column]) => {
                let values = self.column_unchecked(*column);
                let order = values.argsort(kind);
                runs(&order, |a, b| values.cmp_at(a, b) == Ordering::Equal)
                    .into_iter()
                    .map(|positions| (values.element(positions[0]), positions))
                    .collect()
            }
            (0, _) => {
                // transient composite of the key columns only
                let composite: Vec<Array> = key.iter().map(|&c| self.column_unchecked(c)).collect();
                let cmp = |a: usize, b: usize| {
                    composite
                        .iter()
                        .map(|col| col.cmp_at(a, b))
                        .find(|o| *o != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                };
                let order = sort_positions(self.rows(), kind, &cmp);
                runs(&order, |a, b| cmp(a, b) == Ordering::Equal)
                    .into_iter()
                    .map(|positions| {
                        let label = Element::tuple(composite.iter().map(|col| col.element(positions[0])));
                        (label, positions)
                    })
                    .collect()
            }
            _ => {
                let labels: Vec<Element> = (0..self.columns())
                    .map(|c| {
                        let column = self.column_unchecked(c);
                        match key {
                            [row] => column.element(*row),
                            _ => Element::tuple(key.iter().map(|&r| column.element(r))),
                        }
                    })
                    .collect();
                let order = sort_positions(labels.len(), kind, |a, b| labels[a].cmp(&labels[b]));
                runs(&order, |a, b| labels[a] == labels[b])
                    .into_iter()
                    .map(|positions| (labels[positions[0]].clone(), positions))
                    .collect()
            }
        };
        trace!("group axis {} key {:?}: {} groups", axis, key, groups.len());
        Ok(groups)
    }

    /// Iterate `(label, positions, sub_store)` per group.
    pub fn group(
        &self,
        axis: usize,
        key: &[usize],
        kind: SortKind,
    ) -> Result<impl Iterator<Item = (Element, Vec<usize>, TypeBlocks)> + '_> {
        let groups = self.group_positions(axis, key, kind)?;
        Ok(groups.into_iter().map(move |(label, positions)| {
            let sub = if axis == 0 {
                self.gather_rows(&positions)
            } else {
                self.gather_columns(&positions)
            };
            (label, positions, sub)
        }))
    }

    /// Iterate `(label, positions, values)` per group, gathering only the
    /// column (axis 0) or row (axis 1) at `extract`.
    pub fn group_extract(
        &self,
        axis: usize,
        key: &[usize],
        extract: usize,
        kind: SortKind,
    ) -> Result<impl Iterator<Item = (Element, Vec<usize>, Array)> + '_> {
        let groups = self.group_positions(axis, key, kind)?;
        let target = if axis == 0 {
            if extract >= self.columns() {
                return Err(FrameError::OutOfBounds {
                    position: extract,
                    len: self.columns(),
                });
            }
            Some(self.column_unchecked(extract))
        } else {
            if extract >= self.rows() {
                return Err(FrameError::OutOfBounds {
                    position: extract,
                    len: self.rows(),
                });
            }
            None
        };
        let row_dtypes = self.dtypes();
        Ok(groups.into_iter().map(move |(label, positions)| {
            let values = match &target {
                Some(column) => column.take(&positions),
                None => self.row_values(extract, &positions, &row_dtypes),
            };
            (label, positions, values)
        }))
    }

    /// Values of row `row` across `columns`, in the promoted dtype of those columns.
    fn row_values(&self, row: usize, columns: &[usize], dtypes: &[DType]) -> Array {
        let dtype = resolve_dtype_iter(columns.iter().map(|&c| dtypes[c])).unwrap_or(DType::Float64);
        let elements: Vec<Element> = columns
            .iter()
            .map(|&c| self.column_unchecked(c).element(row))
            .collect();
        let mut builder = ColumnBuilder::with_capacity(dtype, elements.len());
        for element in &elements {
            if builder.push(element).is_err() {
                return Array::from_objects(elements);
            }
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeBlocks {
        TypeBlocks::from_blocks(vec![
            Array::from_strs(["b", "a", "b", "a", "c"]),
            Array::from_ints(vec![1, 2, 1, 1, 2]),
            Array::from_floats(vec![10.0, 20.0, 30.0, 40.0, 50.0]),
        ])
        .unwrap()
    }

    #[test]
    fn groups_are_sorted_by_key() {
        let tb = table();
        let groups: Vec<_> = tb.group(0, &[0], SortKind::Quick).unwrap().collect();
        let labels: Vec<Element> = groups.iter().map(|g| g.0.clone()).collect();
        assert_eq!(labels, vec![Element::str("a"), Element::str("b"), Element::str("c")]);
        assert_eq!(groups[0].1, vec![1, 3]);
        assert_eq!(groups[0].2.shape(), (2, 3));
    }

    #[test]
    fn multi_column_key_gives_tuples() {
        let tb = table();
        let groups = tb.group_positions(0, &[0, 1], SortKind::Stable).unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].0, Element::tuple([Element::str("a"), Element::Int(1)]));
        assert_eq!(groups[0].1, vec![3]);
        assert_eq!(groups[2].1, vec![0, 2]);
    }

    #[test]
    fn extract_gathers_one_column() {
        let tb = table();
        let sums: Vec<f64> = tb
            .group_extract(0, &[1], 2, SortKind::Quick)
            .unwrap()
            .map(|(_, _, values)| values.to_f64_vec().unwrap().iter().sum())
            .collect();
        assert_eq!(sums, vec![80.0, 70.0]);
    }

    #[test]
    fn group_columns_on_axis_one() {
        let tb = TypeBlocks::from_blocks(vec![Array::from_ints(vec![2, 1, 2]).reshape(&[1, 3]).unwrap()]).unwrap();
        let groups: Vec<_> = tb.group_extract(1, &[0], 0, SortKind::Stable).unwrap().collect();
        assert_eq!(groups[0].0, Element::Int(1));
        assert_eq!(groups[1].1, vec![0, 2]);
        assert_eq!(groups[1].2, Array::from_ints(vec![2, 2]));
    }

    #[test]
    fn usage_errors() {
        let tb = table();
        assert!(matches!(tb.group(0, &[], SortKind::Quick), Err(FrameError::EmptyGroupKey)));
        assert!(matches!(tb.group(2, &[0], SortKind::Quick), Err(FrameError::AxisInvalid(2))));
        assert!(tb.group_extract(0, &[0], 9, SortKind::Quick).is_err());
    }
}
