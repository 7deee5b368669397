//! FILENAME: pivot-engine/src/index_map.rs
//! PURPOSE: Move index depths from one axis to the other.
//! CONTEXT: The depths of the contracting index are split into targets, which
//! move to the expanding axis, and groups, which stay. Every unique group
//! becomes one position on the contracted axis and maps each of its targets
//! back to the source position that held it.

use frame_engine::{
    resolve_dtype, scatter_with_fill, AnyIndex, DType, Element, Frame, FrameError, Index, IndexClass,
    IndexHierarchy, TypeBlocks,
};
use indexmap::IndexMap;

use crate::error::Result;

/// Depth split of one index, with each group's targets and source positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotIndexMap {
    /// Target labels in observed order; scalars at target depth one.
    pub targets_unique: Vec<Element>,
    pub target_depth: usize,
    pub target_select: Vec<bool>,
    /// Group label (`None` when every depth is a target) to target to source position.
    pub group_to_target_map: IndexMap<Option<Element>, IndexMap<Element, usize>>,
    pub group_depth: usize,
    pub group_select: Vec<bool>,
    /// Promoted dtype of the values under each group, when source dtypes are given.
    pub group_to_dtype: IndexMap<Option<Element>, DType>,
}

fn compose(parts: Vec<Element>) -> Element {
    match parts.as_slice() {
        [single] => single.clone(),
        _ => Element::Tuple(parts),
    }
}

/// Split `index` into the depths in `targets` and the remaining group depths.
///
/// `dtypes`, when given, holds one dtype per position of `index`.
pub fn pivot_index_map(index: &AnyIndex, targets: &[usize], dtypes: Option<&[DType]>) -> Result<PivotIndexMap> {
    let depth = index.depth();
    let mut target_select = vec![false; depth];
    for &t in targets {
        match target_select.get_mut(t) {
            Some(slot) => *slot = true,
            None => return Err(FrameError::DepthMapInvalid(format!("depth {} of {}", t, depth)).into()),
        }
    }
    if let Some(dtypes) = dtypes {
        if dtypes.len() != index.len() {
            return Err(FrameError::IndexLength {
                expected: index.len(),
                len: dtypes.len(),
            }
            .into());
        }
    }
    let group_select: Vec<bool> = target_select.iter().map(|t| !t).collect();
    let target_depth = target_select.iter().filter(|t| **t).count();
    let group_depth = depth - target_depth;

    let labels = index.labels();
    let mut group_to_target_map: IndexMap<Option<Element>, IndexMap<Element, usize>> = IndexMap::new();
    let mut group_to_dtype: IndexMap<Option<Element>, DType> = IndexMap::new();
    let mut targets_unique: IndexMap<Element, ()> = IndexMap::new();

    for (position, label) in labels.iter().enumerate() {
        let parts = label.components();
        let (mut group, mut target) = (Vec::new(), Vec::new());
        for (part, is_target) in parts.into_iter().zip(&target_select) {
            if *is_target {
                target.push(part);
            } else {
                group.push(part);
            }
        }
        let group = (group_depth > 0).then(|| compose(group));
        let target = compose(target);
        targets_unique.insert(target.clone(), ());
        group_to_target_map
            .entry(group.clone())
            .or_default()
            .insert(target, position);
        if let Some(dtypes) = dtypes {
            let dtype = dtypes[position];
            group_to_dtype
                .entry(group)
                .and_modify(|d| *d = resolve_dtype(*d, dtype))
                .or_insert(dtype);
        }
    }

    Ok(PivotIndexMap {
        targets_unique: targets_unique.into_keys().collect(),
        target_depth,
        target_select,
        group_to_target_map,
        group_depth,
        group_select,
        group_to_dtype,
    })
}

fn index_of(labels: &[Element], depth: usize, mutability_of: &AnyIndex, name: Option<Element>) -> Result<AnyIndex> {
    let mutability = mutability_of.class().mutability();
    Ok(if depth > 1 {
        IndexHierarchy::from_labels(labels, depth, IndexClass::hierarchy(mutability))?
            .with_name(name)
            .into()
    } else {
        Index::from_labels(labels, IndexClass::flat(mutability))?.with_name(name).into()
    })
}

/// Move the row-index depths in `depths` onto the columns.
///
/// Each source column expands into one column per target label, in the
/// order targets are first seen. Cells with no source row hold `fill`.
pub fn unstack(frame: &Frame, depths: &[usize], fill: &Element) -> Result<Frame> {
    let map = pivot_index_map(frame.index(), depths, None)?;
    let groups: Vec<&Option<Element>> = map.group_to_target_map.keys().collect();
    let rows = groups.len();

    let mut arrays = Vec::with_capacity(frame.shape().1 * map.targets_unique.len());
    let mut labels = Vec::with_capacity(arrays.capacity());
    for (column, label) in frame.blocks().iter_columns().zip(frame.columns().labels()) {
        for target in &map.targets_unique {
            let placed: Vec<(usize, Element)> = map
                .group_to_target_map
                .values()
                .enumerate()
                .filter_map(|(row, targets)| targets.get(target).map(|&source| (row, column.element(source))))
                .collect();
            arrays.push(scatter_with_fill(rows, column.dtype(), fill, &placed)?);
            let mut parts = label.components();
            parts.extend(target.components());
            labels.push(compose(parts));
        }
    }

    let index = if map.group_depth == 0 {
        AnyIndex::auto(rows)
    } else {
        let group_labels: Vec<Element> = groups.into_iter().flatten().cloned().collect();
        index_of(&group_labels, map.group_depth, frame.index(), None)?
    };
    let columns_depth = frame.columns().depth() + map.target_depth;
    let columns = index_of(&labels, columns_depth, frame.columns(), frame.columns().name().cloned())?;
    let blocks = if arrays.is_empty() {
        TypeBlocks::empty(rows)
    } else {
        TypeBlocks::from_blocks(arrays)?
    };
    Ok(Frame::new(blocks, index, columns)?.with_name(frame.name().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_engine::Array;

    fn hierarchy() -> AnyIndex {
        let labels = vec![
            Element::tuple([Element::str("a"), Element::Int(1)]),
            Element::tuple([Element::str("a"), Element::Int(2)]),
            Element::tuple([Element::str("b"), Element::Int(1)]),
        ];
        IndexHierarchy::from_labels(&labels, 2, IndexClass::IndexHierarchy).unwrap().into()
    }

    #[test]
    fn test_map_splits_depths() {
        let dtypes = [DType::Int64, DType::Float64, DType::Int64];
        let map = pivot_index_map(&hierarchy(), &[1], Some(&dtypes)).unwrap();
        assert_eq!(map.target_depth, 1);
        assert_eq!(map.group_select, vec![true, false]);
        assert_eq!(map.targets_unique, vec![Element::Int(1), Element::Int(2)]);
        let a = &map.group_to_target_map[&Some(Element::str("a"))];
        assert_eq!(a.get(&Element::Int(2)), Some(&1));
        assert_eq!(map.group_to_dtype[&Some(Element::str("a"))], DType::Float64);
        assert_eq!(map.group_to_dtype[&Some(Element::str("b"))], DType::Int64);
    }

    #[test]
    fn test_all_depths_targeted() {
        let map = pivot_index_map(&hierarchy(), &[0, 1], None).unwrap();
        assert_eq!(map.group_depth, 0);
        assert_eq!(map.group_to_target_map.len(), 1);
        assert_eq!(map.group_to_target_map[&None].len(), 3);
        assert!(pivot_index_map(&hierarchy(), &[2], None).is_err());
    }

    #[test]
    fn test_unstack_fills_missing() {
        let frame = Frame::from_columns(vec![(Element::str("v"), Array::from_ints(vec![10, 20, 30]))], Some(hierarchy()))
            .unwrap();
        let out = unstack(&frame, &[1], &Element::nan()).unwrap();
        assert_eq!(out.shape(), (2, 2));
        assert_eq!(out.index().labels(), vec![Element::str("a"), Element::str("b")]);
        let one = out.column(&Element::tuple([Element::str("v"), Element::Int(1)])).unwrap();
        assert_eq!(one, Array::from_ints(vec![10, 30]));
        let two = out.column(&Element::tuple([Element::str("v"), Element::Int(2)])).unwrap();
        assert_eq!(two.dtype(), DType::Float64);
        assert_eq!(two.element(0), Element::Float(20.0));
        assert!(two.element(1).is_nan());
    }
}
