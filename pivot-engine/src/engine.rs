//! FILENAME: pivot-engine/src/engine.rs
//! Pivot Engine - regroups a frame's rows by field values into a reshaped frame.
//!
//! Algorithm:
//! 1. Resolve field labels to column positions once
//! 2. Derive the column header name and depth from the field groups
//! 3. Without columns fields, group once by the index fields
//! 4. With columns fields, build the outer row index over the whole table,
//!    group once by the columns fields and scatter each group's aggregates
//!    into fill-initialised columns sized to the outer index
//! 5. Concatenate the columns and wrap them with the two derived indices

use frame_engine::{
    dtype_from_element, dtype_from_elements, index_from_optional_constructor, resolve_dtype, scatter_with_fill,
    AnyIndex, Array, ColumnBuilder, DType, Element, Frame, FrameError, Index, IndexClass, IndexHierarchy,
    IndexInitializer, TypeBlocks,
};
use log::debug;
use rustc_hash::FxHashMap;

use crate::definition::{FuncMode, PivotDefinition};
use crate::error::{PivotError, Result};

// ============================================================================
// FIELD RESOLUTION
// ============================================================================

/// Field groups resolved against the source frame's columns.
#[derive(Debug)]
struct Fields {
    index: Vec<usize>,
    columns: Vec<usize>,
    data: Vec<usize>,
    index_labels: Vec<Element>,
    columns_labels: Vec<Element>,
    data_labels: Vec<Element>,
}

fn resolve_fields(frame: &Frame, definition: &PivotDefinition) -> Result<Fields> {
    if definition.index_fields.is_empty() {
        return Err(PivotError::NoIndexFields);
    }
    let lookup = |labels: &[Element]| -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| -> Result<usize> {
                frame
                    .columns()
                    .loc_to_iloc(label)?
                    .ok_or_else(|| PivotError::FieldNotFound(label.to_string()))
            })
            .collect()
    };
    let index = lookup(&definition.index_fields)?;
    let columns = lookup(&definition.columns_fields)?;

    let (data, data_labels) = if definition.data_fields.is_empty() {
        let used: Vec<usize> = index.iter().chain(columns.iter()).copied().collect();
        let labels = frame.columns().labels();
        (0..labels.len())
            .filter(|p| !used.contains(p))
            .map(|p| (p, labels[p].clone()))
            .unzip()
    } else {
        (lookup(&definition.data_fields)?, definition.data_fields.clone())
    };

    let mut seen: Vec<usize> = Vec::with_capacity(index.len() + columns.len() + data.len());
    for &position in index.iter().chain(columns.iter()).chain(data.iter()) {
        if seen.contains(&position) {
            let label = frame.columns().label_at(position).unwrap_or(Element::Int(position as i64));
            return Err(PivotError::FieldOverlap(label.to_string()));
        }
        seen.push(position);
    }
    if columns.is_empty() && data.is_empty() {
        return Err(PivotError::NoDataFields);
    }
    Ok(Fields {
        index,
        columns,
        data,
        index_labels: definition.index_fields.clone(),
        columns_labels: definition.columns_fields.clone(),
        data_labels,
    })
}

// ============================================================================
// COLUMN LABELS
// ============================================================================

/// Column labels contributed by one group of the columns fields.
///
/// Each label is the group's components, then the data field when there is
/// more than one, then the function label when several are mapped. A label
/// of one component is a scalar.
pub fn extrapolate_column_fields(
    group: &Element,
    data_fields: &[Element],
    func_fields: &[Element],
) -> Vec<Element> {
    let prefix = group.components();
    let compose = |parts: Vec<Element>| match parts.as_slice() {
        [single] => single.clone(),
        _ => Element::Tuple(parts),
    };
    let data: Vec<Option<&Element>> = if data_fields.len() > 1 {
        data_fields.iter().map(Some).collect()
    } else {
        vec![None; data_fields.len()]
    };
    let funcs: Vec<Option<&Element>> = if func_fields.is_empty() {
        vec![None]
    } else {
        func_fields.iter().map(Some).collect()
    };
    let mut labels = Vec::with_capacity(data.len() * funcs.len());
    for field in &data {
        for func in &funcs {
            let mut parts = prefix.clone();
            parts.extend(field.cloned());
            parts.extend(func.cloned());
            labels.push(compose(parts));
        }
    }
    labels
}

fn columns_index(names: &[Element], labels: &[Element]) -> Result<AnyIndex> {
    Ok(match names {
        [name] => Index::from_labels(labels, IndexClass::Index)?
            .with_name(Some(name.clone()))
            .into(),
        _ => IndexHierarchy::from_labels(labels, names.len(), IndexClass::IndexHierarchy)?
            .with_name(Some(Element::tuple(names.iter().cloned())))
            .into(),
    })
}

// ============================================================================
// SCATTER HELPERS
// ============================================================================

/// A column of `len` cells built from `(position, value)` pairs, with `fill`
/// in every uncovered cell.
///
/// A predicted dtype is written directly; when it is unknown, or the values
/// do not fit it, the dtype is inferred from the values instead.
fn fill_column(len: usize, dtype: Option<DType>, fill: &Element, pairs: &[(usize, Element)]) -> Result<Array> {
    if let Some(dtype) = dtype {
        let target = if pairs.len() < len {
            resolve_dtype(dtype, dtype_from_element(fill))
        } else {
            dtype
        };
        if let Some(array) = write_direct(len, target, fill, pairs) {
            return Ok(array);
        }
    }
    let inferred = dtype_from_elements(pairs.iter().map(|(_, value)| value));
    Ok(scatter_with_fill(len, inferred, fill, pairs)?)
}

fn write_direct(len: usize, dtype: DType, fill: &Element, pairs: &[(usize, Element)]) -> Option<Array> {
    let mut builder = match ColumnBuilder::full(dtype, len, fill) {
        Ok(builder) => builder,
        // every cell is overwritten, so any placed value can seed the buffer
        Err(_) if pairs.len() == len => ColumnBuilder::full(dtype, len, &pairs.first()?.1).ok()?,
        Err(_) => return None,
    };
    for (position, value) in pairs {
        builder.set(*position, value).ok()?;
    }
    Some(builder.finish())
}

/// Label of every row: a scalar for one field, a tuple for several.
fn row_labels(blocks: &TypeBlocks, fields: &[usize]) -> Result<Vec<Element>> {
    let columns = fields
        .iter()
        .map(|&c| blocks.extract_array_column(c))
        .collect::<std::result::Result<Vec<_>, FrameError>>()?;
    Ok((0..blocks.rows())
        .map(|row| match columns.as_slice() {
            [single] => single.element(row),
            _ => Element::tuple(columns.iter().map(|c| c.element(row))),
        })
        .collect())
}

fn position(index: &AnyIndex, label: &Element) -> Result<usize> {
    Ok(index
        .loc_to_iloc(label)?
        .ok_or_else(|| FrameError::LabelNotFound(label.to_string()))?)
}

fn ambiguous(labels: &[Element], label: &Element) -> PivotError {
    PivotError::AmbiguousAggregation {
        label: label.to_string(),
        rows: labels.iter().filter(|l| *l == label).count(),
    }
}

// ============================================================================
// PIVOT
// ============================================================================

struct Pivot<'a> {
    frame: &'a Frame,
    definition: &'a PivotDefinition,
    fields: Fields,
    func: FuncMode,
    func_fields: Vec<Element>,
    /// Predicted dtype of each record value: one per data field and function.
    record_dtypes: Vec<Option<DType>>,
}

/// Group-by aggregation of one record per group.
type Record = (Element, Vec<Element>);

impl<'a> Pivot<'a> {
    fn new(frame: &'a Frame, definition: &'a PivotDefinition) -> Result<Self> {
        let fields = resolve_fields(frame, definition)?;
        let func = FuncMode::from(&definition.func);
        let func_fields = func.func_fields();
        let dtypes = frame.blocks().dtypes();
        let record_dtypes = fields
            .data
            .iter()
            .flat_map(|&c| {
                let source = dtypes[c];
                match &func {
                    FuncMode::None => vec![Some(source)],
                    _ => func.aggregators().iter().map(|f| f.result_dtype(source)).collect(),
                }
            })
            .collect();
        Ok(Pivot {
            frame,
            definition,
            fields,
            func,
            func_fields,
            record_dtypes,
        })
    }

    fn fill(&self) -> &Element {
        &self.definition.fill_value
    }

    fn index_name(&self) -> Element {
        match self.fields.index_labels.as_slice() {
            [single] => single.clone(),
            labels => Element::tuple(labels.iter().cloned()),
        }
    }

    /// Names of the column header depths.
    fn columns_name(&self) -> Vec<Element> {
        let mut names = self.fields.columns_labels.clone();
        if self.fields.data.len() > 1 || self.fields.columns.is_empty() {
            names.push(Element::str("values"));
        }
        if self.func_fields.len() > 1 {
            names.push(Element::str("func"));
        }
        names
    }

    /// Group labels in the dtype of the single index field; tuples of several are objects.
    ///
    /// Group labels are looked up again later, so they must not be promoted
    /// away from the values they were read from.
    fn label_array(&self, labels: &[Element]) -> Result<Array> {
        let dtype = match self.fields.index.as_slice() {
            [single] => self.frame.blocks().dtypes()[*single],
            _ => DType::Object,
        };
        Ok(Array::from_elements(labels, Some(dtype))?)
    }

    /// One array per index field holding that component of each tuple label.
    fn label_depths(&self, labels: &[Element]) -> Result<Vec<Array>> {
        let dtypes = self.frame.blocks().dtypes();
        let mut depths = Vec::with_capacity(self.fields.index.len());
        for (d, &field) in self.fields.index.iter().enumerate() {
            let values: Vec<Element> = labels
                .iter()
                .map(|label| label.components().get(d).cloned().unwrap_or(Element::Null))
                .collect();
            depths.push(Array::from_elements(&values, Some(dtypes[field]))?);
        }
        Ok(depths)
    }

    /// Row index of the group labels when grouping by index fields only.
    fn row_index(&self, labels: &[Element]) -> Result<AnyIndex> {
        let depth = self.fields.index.len();
        let name = Some(self.index_name());
        Ok(match self.definition.index_constructor {
            Some(class) if class.is_hierarchy() && depth > 1 => {
                IndexHierarchy::from_depth_arrays(self.label_depths(labels)?, None, class)?
                    .with_name(name)
                    .into()
            }
            Some(class) if class.is_hierarchy() => {
                Index::from_array(self.label_array(labels)?, IndexClass::flat(class.mutability()))?
                    .with_name(name)
                    .into()
            }
            class => Index::from_array(self.label_array(labels)?, class.unwrap_or(IndexClass::Index))?
                .with_name(name)
                .into(),
        })
    }

    /// Sorted unique labels of the index fields over the whole table; always flat.
    fn outer_index(&self) -> Result<AnyIndex> {
        let labels: Vec<Element> = self
            .frame
            .blocks()
            .group_positions(0, &self.fields.index, self.definition.kind)?
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        let name = Some(self.index_name());
        let explicit = self.definition.index_constructor;
        if self.fields.index.len() > 1 {
            if let Some(class) = explicit.filter(IndexClass::is_hierarchy) {
                let ih = IndexHierarchy::from_depth_arrays(self.label_depths(&labels)?, None, class)?;
                return Ok(ih.flat()?.with_name(name).into());
            }
        }
        let explicit = explicit.map(|class| {
            if class.is_hierarchy() {
                IndexClass::flat(class.mutability())
            } else {
                class
            }
        });
        let index = index_from_optional_constructor(
            IndexInitializer::Array(self.label_array(&labels)?),
            IndexClass::Index,
            explicit,
        )?;
        Ok(index.rename(name))
    }

    /// One record per group of the index fields within `blocks`.
    fn records(&self, blocks: &TypeBlocks) -> Result<Vec<Record>> {
        let groups = blocks.group_positions(0, &self.fields.index, self.definition.kind)?;
        let columns = self
            .fields
            .data
            .iter()
            .map(|&c| blocks.extract_array_column(c))
            .collect::<std::result::Result<Vec<_>, FrameError>>()?;
        let aggregators = self.func.aggregators();
        let mut records = Vec::with_capacity(groups.len());
        for (label, positions) in groups {
            let record = if self.func.is_none() {
                if positions.len() != 1 {
                    return Err(PivotError::AmbiguousAggregation {
                        label: label.to_string(),
                        rows: positions.len(),
                    });
                }
                columns.iter().map(|c| c.element(positions[0])).collect()
            } else {
                let mut record = Vec::with_capacity(columns.len() * aggregators.len());
                for column in &columns {
                    let values = column.take(&positions);
                    for func in &aggregators {
                        record.push(func.apply(&values)?);
                    }
                }
                record
            };
            records.push((label, record));
        }
        Ok(records)
    }

    /// Columns of `records` placed at the positions of their labels in `index`.
    fn records_to_columns(&self, records: &[Record], index: &AnyIndex) -> Result<Vec<Array>> {
        let positions = records
            .iter()
            .map(|(label, _)| position(index, label))
            .collect::<Result<Vec<_>>>()?;
        (0..self.record_dtypes.len())
            .map(|j| {
                let pairs: Vec<(usize, Element)> = records
                    .iter()
                    .zip(&positions)
                    .map(|((_, record), p)| (*p, record[j].clone()))
                    .collect();
                fill_column(index.len(), self.record_dtypes[j], self.fill(), &pairs)
            })
            .collect()
    }

    /// The one output column of `blocks`, aligned to `index`.
    fn items_to_block(&self, blocks: &TypeBlocks, index: &AnyIndex) -> Result<Array> {
        let data = self.fields.data[0];
        match &self.func {
            FuncMode::Single(func) => {
                let mut pairs = Vec::new();
                for (label, _, values) in blocks.group_extract(0, &self.fields.index, data, self.definition.kind)? {
                    pairs.push((position(index, &label)?, func.apply(&values)?));
                }
                fill_column(index.len(), self.record_dtypes[0], self.fill(), &pairs)
            }
            _ => {
                let labels = row_labels(blocks, &self.fields.index)?;
                let values = blocks.extract_array_column(data)?;
                let mut placed = vec![false; index.len()];
                let mut pairs = Vec::with_capacity(labels.len());
                for (row, label) in labels.iter().enumerate() {
                    let p = position(index, label)?;
                    if placed[p] {
                        return Err(ambiguous(&labels, label));
                    }
                    placed[p] = true;
                    pairs.push((p, values.element(row)));
                }
                fill_column(index.len(), Some(values.dtype()), self.fill(), &pairs)
            }
        }
    }

    fn blocks_from(arrays: Vec<Array>, rows: usize) -> Result<TypeBlocks> {
        Ok(if arrays.is_empty() {
            TypeBlocks::empty(rows)
        } else {
            TypeBlocks::from_blocks(arrays)?
        })
    }

    /// Group by index fields only.
    fn pivot_index_only(&self) -> Result<Frame> {
        let blocks = self.frame.blocks();
        let columns: Vec<Element> = if self.func_fields.is_empty() {
            self.fields.data_labels.clone()
        } else {
            self.fields
                .data_labels
                .iter()
                .flat_map(|d| self.func_fields.iter().map(move |f| Element::tuple([d.clone(), f.clone()])))
                .collect()
        };
        let columns = columns_index(&self.columns_name(), &columns)?;

        if columns.len() != 1 {
            debug!("pivot: index fields only, {} record columns", columns.len());
            let records = self.records(blocks)?;
            let labels: Vec<Element> = records.iter().map(|(label, _)| label.clone()).collect();
            let index = self.row_index(&labels)?;
            let arrays = self.records_to_columns(&records, &index)?;
            return Ok(Frame::new(Self::blocks_from(arrays, index.len())?, index, columns)?);
        }

        let data = self.fields.data[0];
        let (index, values) = match &self.func {
            FuncMode::Single(func) => {
                debug!("pivot: index fields only, single function");
                let mut labels = Vec::new();
                let mut pairs = Vec::new();
                for (label, _, values) in blocks.group_extract(0, &self.fields.index, data, self.definition.kind)? {
                    pairs.push((labels.len(), func.apply(&values)?));
                    labels.push(label);
                }
                let values = fill_column(labels.len(), self.record_dtypes[0], self.fill(), &pairs)?;
                (self.row_index(&labels)?, values)
            }
            _ => {
                debug!("pivot: index fields only, no function");
                let labels = row_labels(blocks, &self.fields.index)?;
                let mut counts: FxHashMap<&Element, usize> = FxHashMap::default();
                for label in &labels {
                    *counts.entry(label).or_default() += 1;
                }
                if let Some(label) = labels.iter().find(|l| counts.get(l).copied().unwrap_or(0) > 1) {
                    return Err(ambiguous(&labels, label));
                }
                (self.row_index(&labels)?, blocks.extract_array_column(data)?)
            }
        };
        Ok(Frame::new(TypeBlocks::from_blocks(vec![values])?, index, columns)?)
    }

    /// Group by index and columns fields.
    fn pivot_with_columns(&self) -> Result<Frame> {
        let outer = self.outer_index()?;
        debug!(
            "pivot: {} outer rows, grouping by {} columns fields",
            outer.len(),
            self.fields.columns.len()
        );
        let mut arrays: Vec<Array> = Vec::new();
        let mut labels: Vec<Element> = Vec::new();
        for (group, _, sub) in self
            .frame
            .blocks()
            .group(0, &self.fields.columns, self.definition.kind)?
        {
            let sub_columns = extrapolate_column_fields(&group, &self.fields.data_labels, &self.func_fields);
            match sub_columns.len() {
                0 => continue,
                1 => arrays.push(self.items_to_block(&sub, &outer)?),
                _ => {
                    let records = self.records(&sub)?;
                    arrays.extend(self.records_to_columns(&records, &outer)?);
                }
            }
            labels.extend(sub_columns);
        }
        let columns = columns_index(&self.columns_name(), &labels)?;
        Ok(Frame::new(Self::blocks_from(arrays, outer.len())?, outer, columns)?)
    }
}

/// Reshape `frame` by `definition`.
///
/// Row and column labels come out in ascending order of the field values,
/// so the result depends only on the input table and the definition.
pub fn pivot(frame: &Frame, definition: &PivotDefinition) -> Result<Frame> {
    let pivot = Pivot::new(frame, definition)?;
    if pivot.fields.columns.is_empty() {
        pivot.pivot_index_only()
    } else {
        pivot.pivot_with_columns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extrapolate_single_field() {
        let labels = extrapolate_column_fields(&Element::str("Q1"), &[Element::str("sales")], &[]);
        assert_eq!(labels, vec![Element::str("Q1")]);
    }

    #[test]
    fn test_extrapolate_with_data_and_funcs() {
        let data = [Element::str("a"), Element::str("b")];
        let funcs = [Element::str("sum"), Element::str("max")];
        let labels = extrapolate_column_fields(&Element::str("Q1"), &data, &funcs);
        assert_eq!(labels.len(), 4);
        assert_eq!(
            labels[1],
            Element::tuple([Element::str("Q1"), Element::str("a"), Element::str("max")])
        );
    }

    #[test]
    fn test_extrapolate_tuple_group() {
        let group = Element::tuple([Element::Int(1), Element::Int(2)]);
        let labels = extrapolate_column_fields(&group, &[Element::str("v")], &[Element::str("f")]);
        assert_eq!(labels, vec![Element::tuple([Element::Int(1), Element::Int(2), Element::str("f")])]);
        assert!(extrapolate_column_fields(&group, &[], &[]).is_empty());
    }

    #[test]
    fn test_fill_column_promotes_with_fill() {
        let pairs = vec![(0, Element::Int(3))];
        let out = fill_column(2, Some(DType::Int64), &Element::nan(), &pairs).unwrap();
        assert_eq!(out.dtype(), DType::Float64);
        assert!(out.element(1).is_nan());
        let covered = fill_column(1, Some(DType::Int64), &Element::nan(), &pairs).unwrap();
        assert_eq!(covered.dtype(), DType::Int64);
    }

    #[test]
    fn test_fill_column_infers_unknown_dtype() {
        let pairs = vec![(1, Element::str("x"))];
        let out = fill_column(2, None, &Element::str(""), &pairs).unwrap();
        assert_eq!(out.dtype(), DType::Unicode(1));
        assert_eq!(out.element(0), Element::str(""));
    }
}
