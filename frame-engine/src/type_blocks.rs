//! FILENAME: frame-engine/src/type_blocks.rs
//! PURPOSE: The column-block store: a table body held as an ordered run of typed blocks.
//! CONTEXT: Each block is a 1D array (one column) or a 2D array (several adjacent
//! columns of one dtype). A flat column map records, for every table column, the
//! block that holds it and the column within that block, so column access never
//! needs to materialise the whole table.

use crate::array::Array;
use crate::builder::ColumnBuilder;
use crate::dtype::{resolve_dtype_iter, DType};
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::key::Key;

/// Result of [`TypeBlocks::extract`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Both keys were integers.
    Element(Element),
    /// The column key was an integer.
    Column(Array),
    Blocks(TypeBlocks),
}

#[derive(Debug, Clone, Default)]
pub struct TypeBlocks {
    blocks: Vec<Array>,
    /// (block, column within block) for every table column.
    index: Vec<(usize, usize)>,
    rows: usize,
}

impl TypeBlocks {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Build from 0D, 1D or 2D arrays that share a row count.
    pub fn from_blocks<I>(arrays: I) -> Result<Self>
    where
        I: IntoIterator<Item = Array>,
    {
        let mut blocks = Vec::new();
        let mut index = Vec::new();
        let mut rows: Option<usize> = None;
        for array in arrays {
            let array = match array.ndim() {
                0 => array.reshape(&[1])?,
                1 | 2 => array,
                n => return Err(FrameError::UnsupportedDimensionality(n)),
            };
            match rows {
                None => rows = Some(array.len()),
                Some(expected) if expected != array.len() => {
                    return Err(FrameError::RowCountMismatch {
                        expected,
                        found: array.len(),
                    })
                }
                _ => {}
            }
            let b = blocks.len();
            index.extend((0..array.width()).map(|c| (b, c)));
            blocks.push(array);
        }
        Ok(TypeBlocks {
            blocks,
            index,
            rows: rows.unwrap_or(0),
        })
    }

    /// A store with `rows` rows and no columns.
    pub fn empty(rows: usize) -> Self {
        TypeBlocks {
            blocks: Vec::new(),
            index: Vec::new(),
            rows,
        }
    }

    /// Horizontal concatenation; every store must have the same row count.
    pub fn concat<'a, I>(stores: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a TypeBlocks>,
    {
        let mut arrays = Vec::new();
        let mut rows = None;
        for store in stores {
            match rows {
                None => rows = Some(store.rows),
                Some(expected) if expected != store.rows => {
                    return Err(FrameError::RowCountMismatch {
                        expected,
                        found: store.rows,
                    })
                }
                _ => {}
            }
            arrays.extend(store.blocks.iter().cloned());
        }
        if arrays.is_empty() {
            return Ok(TypeBlocks::empty(rows.unwrap_or(0)));
        }
        TypeBlocks::from_blocks(arrays)
    }

    // ========================================================================
    // SHAPE
    // ========================================================================

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.index.len())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.index.len()
    }

    pub fn blocks(&self) -> &[Array] {
        &self.blocks
    }

    /// One dtype per column.
    pub fn dtypes(&self) -> Vec<DType> {
        self.index.iter().map(|&(b, _)| self.blocks[b].dtype()).collect()
    }

    // ========================================================================
    // EXTRACTION
    // ========================================================================

    fn check_column(&self, column: usize) -> Result<()> {
        if column >= self.index.len() {
            return Err(FrameError::OutOfBounds {
                position: column,
                len: self.index.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn column_unchecked(&self, column: usize) -> Array {
        let (b, c) = self.index[column];
        self.blocks[b].column_at(c)
    }

    pub fn extract_array_column(&self, column: usize) -> Result<Array> {
        self.check_column(column)?;
        Ok(self.column_unchecked(column))
    }

    pub fn iter_columns(&self) -> impl Iterator<Item = Array> + '_ {
        (0..self.columns()).map(move |c| self.column_unchecked(c))
    }

    pub fn element(&self, row: usize, column: usize) -> Result<Element> {
        self.check_column(column)?;
        if row >= self.rows {
            return Err(FrameError::OutOfBounds {
                position: row,
                len: self.rows,
            });
        }
        let (b, c) = self.index[column];
        let block = &self.blocks[b];
        Ok(match block.ndim() {
            2 => block.get(&[row, c]),
            _ => block.get(&[row]),
        }
        .unwrap_or(Element::Null))
    }

    pub(crate) fn gather_rows(&self, positions: &[usize]) -> TypeBlocks {
        TypeBlocks {
            blocks: self.blocks.iter().map(|b| b.take(positions)).collect(),
            index: self.index.clone(),
            rows: positions.len(),
        }
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<TypeBlocks> {
        if let Some(&position) = positions.iter().find(|&&p| p >= self.rows) {
            return Err(FrameError::OutOfBounds {
                position,
                len: self.rows,
            });
        }
        Ok(self.gather_rows(positions))
    }

    /// Gather columns, keeping ascending runs within one block as a single block.
    pub(crate) fn gather_columns(&self, columns: &[usize]) -> TypeBlocks {
        let mut blocks: Vec<Array> = Vec::new();
        let mut index = Vec::with_capacity(columns.len());
        let mut run: Vec<usize> = Vec::new();
        let mut run_block: Option<usize> = None;

        // runs are ascending and contiguous, so a full-width run is the whole block
        let flush = |run_block: Option<usize>, run: &mut Vec<usize>, blocks: &mut Vec<Array>| {
            if let Some(b) = run_block {
                let block = &self.blocks[b];
                let array = if block.ndim() == 1 || run.len() == block.width() {
                    block.clone()
                } else if run.len() == 1 {
                    block.column_at(run[0])
                } else {
                    block.take_columns(run)
                };
                blocks.push(array);
            }
            run.clear();
        };

        for &column in columns {
            let (b, c) = self.index[column];
            let extends = run_block == Some(b) && run.last().is_some_and(|&last| last + 1 == c);
            if !extends {
                flush(run_block, &mut run, &mut blocks);
                run_block = Some(b);
            }
            run.push(c);
        }
        flush(run_block, &mut run, &mut blocks);

        for (b, block) in blocks.iter().enumerate() {
            index.extend((0..block.width()).map(|c| (b, c)));
        }
        TypeBlocks {
            blocks,
            index,
            rows: self.rows,
        }
    }

    pub fn select_columns(&self, columns: &[usize]) -> Result<TypeBlocks> {
        for &c in columns {
            self.check_column(c)?;
        }
        Ok(self.gather_columns(columns))
    }

    /// Select by row and column keys.
    pub fn extract(&self, row_key: &Key, column_key: &Key) -> Result<Extraction> {
        let rows = row_key.positions(self.rows)?;
        let columns = column_key.positions(self.columns())?;
        if let (Key::Int(_), Key::Int(_)) = (row_key, column_key) {
            return Ok(Extraction::Element(self.element(rows[0], columns[0])?));
        }
        if column_key.is_scalar() {
            let column = self.column_unchecked(columns[0]);
            return Ok(Extraction::Column(match row_key {
                Key::All => column,
                _ => column.take(&rows),
            }));
        }
        let selected = match column_key {
            Key::All => self.clone(),
            _ => self.gather_columns(&columns),
        };
        Ok(Extraction::Blocks(match row_key {
            Key::All => selected,
            _ => selected.gather_rows(&rows),
        }))
    }

    /// Like [`extract`](Self::extract) but always returns an array.
    pub fn extract_array(&self, row_key: &Key, column_key: &Key) -> Result<Array> {
        match self.extract(row_key, column_key)? {
            Extraction::Element(e) => Array::from_elements(&[e], None)?.reshape(&[]),
            Extraction::Column(a) => Ok(a),
            Extraction::Blocks(tb) => tb.values(),
        }
    }

    /// Values where a 2D boolean key of the same shape is true, in row-major order.
    pub fn extract_bloc(&self, key: &Array) -> Result<Array> {
        if key.dtype() != DType::Bool || key.shape() != [self.rows, self.columns()] {
            return Err(FrameError::BlocShapeMismatch {
                expected: self.shape(),
                found: key.shape().to_vec(),
            });
        }
        let mut hits = Vec::new();
        for r in 0..self.rows {
            for c in 0..self.columns() {
                if key.get(&[r, c]) == Some(Element::Bool(true)) {
                    hits.push((r, c));
                }
            }
        }
        let dtype = resolve_dtype_iter(hits.iter().map(|&(_, c)| self.blocks[self.index[c].0].dtype()))
            .unwrap_or(DType::Float64);
        let mut builder = ColumnBuilder::with_capacity(dtype, hits.len());
        for (r, c) in hits {
            builder.push(&self.element(r, c)?)?;
        }
        Ok(builder.finish())
    }

    /// The whole table as one row-major 2D array of the promoted dtype.
    pub fn values(&self) -> Result<Array> {
        if let [block] = self.blocks.as_slice() {
            if block.ndim() == 2 {
                return block.reshape(block.shape());
            }
        }
        if self.index.is_empty() {
            return Array::from_floats(Vec::new()).reshape(&[self.rows, 0]);
        }
        let columns: Vec<Array> = self.iter_columns().collect();
        Array::from_columns(&columns)
    }

    /// Merge adjacent blocks of identical dtype into 2D blocks.
    pub fn consolidate(&self) -> Result<TypeBlocks> {
        let mut merged: Vec<Array> = Vec::new();
        let mut run: Vec<Array> = Vec::new();
        for block in &self.blocks {
            if run.last().is_some_and(|last| last.dtype() != block.dtype()) {
                merged.push(merge_run(&mut run)?);
            }
            run.push(block.clone());
        }
        if !run.is_empty() {
            merged.push(merge_run(&mut run)?);
        }
        if merged.is_empty() {
            return Ok(TypeBlocks::empty(self.rows));
        }
        TypeBlocks::from_blocks(merged)
    }
}

fn merge_run(run: &mut Vec<Array>) -> Result<Array> {
    let blocks = std::mem::take(run);
    if let [single] = blocks.as_slice() {
        return Ok(single.clone());
    }
    let columns: Vec<Array> = blocks
        .iter()
        .flat_map(|b| (0..b.width()).map(move |c| b.column_at(c)))
        .collect();
    Array::from_columns(&columns)
}

impl PartialEq for TypeBlocks {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.iter_columns().eq(other.iter_columns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TypeBlocks {
        let ints = Array::from_ints(vec![1, 2, 3, 4, 5, 6]).reshape(&[3, 2]).unwrap();
        let strs = Array::from_strs(["a", "b", "c"]);
        let floats = Array::from_floats(vec![0.5, 1.5, 2.5]);
        TypeBlocks::from_blocks(vec![ints, strs, floats]).unwrap()
    }

    #[test]
    fn shape_and_dtypes() {
        let tb = sample();
        assert_eq!(tb.shape(), (3, 4));
        assert_eq!(
            tb.dtypes(),
            vec![DType::Int64, DType::Int64, DType::Unicode(1), DType::Float64]
        );
    }

    #[test]
    fn row_count_mismatch() {
        let err = TypeBlocks::from_blocks(vec![Array::from_ints(vec![1, 2]), Array::from_ints(vec![1])])
            .unwrap_err();
        assert_eq!(err, FrameError::RowCountMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn rejects_3d_and_lifts_0d() {
        let cube = Array::from_ints((0..8).collect()).reshape(&[2, 2, 2]).unwrap();
        assert_eq!(
            TypeBlocks::from_blocks(vec![cube]).unwrap_err(),
            FrameError::UnsupportedDimensionality(3)
        );
        let scalar = Array::from_ints(vec![7]).reshape(&[]).unwrap();
        assert_eq!(TypeBlocks::from_blocks(vec![scalar]).unwrap().shape(), (1, 1));
    }

    #[test]
    fn extract_variants() {
        let tb = sample();
        assert_eq!(
            tb.extract(&Key::Int(2), &Key::Int(1)).unwrap(),
            Extraction::Element(Element::Int(6))
        );
        match tb.extract(&Key::List(vec![2, 0]), &Key::Int(2)).unwrap() {
            Extraction::Column(a) => assert_eq!(a, Array::from_strs(["c", "a"])),
            other => panic!("unexpected {:?}", other),
        }
        match tb.extract(&Key::Mask(vec![true, false, true]), &Key::from(1..3)).unwrap() {
            Extraction::Blocks(sub) => {
                assert_eq!(sub.shape(), (2, 2));
                assert_eq!(sub.element(1, 1).unwrap(), Element::str("c"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(tb.extract(&Key::Int(3), &Key::All).is_err());
        assert!(matches!(
            tb.extract(&Key::Mask(vec![true]), &Key::All),
            Err(FrameError::KeyShapeMismatch { .. })
        ));
    }

    #[test]
    fn values_promote() {
        let tb = TypeBlocks::from_blocks(vec![Array::from_ints(vec![1, 2]), Array::from_floats(vec![0.5, 1.0])])
            .unwrap();
        let values = tb.values().unwrap();
        assert_eq!(values.dtype(), DType::Float64);
        assert_eq!(values.shape(), &[2, 2]);
    }

    #[test]
    fn consolidate_is_not_observable() {
        let tb = TypeBlocks::from_blocks(vec![
            Array::from_ints(vec![1, 2]),
            Array::from_ints(vec![3, 4]),
            Array::from_bools(vec![true, false]),
        ])
        .unwrap();
        let merged = tb.consolidate().unwrap();
        assert_eq!(merged.blocks().len(), 2);
        assert_eq!(merged, tb);
    }

    #[test]
    fn bloc_selection() {
        let tb = sample();
        let key = Array::from_bools(vec![true, false, false, false, false, false, false, true, false, false, false, false])
            .reshape(&[3, 4])
            .unwrap();
        let picked = tb.extract_bloc(&key).unwrap();
        assert_eq!(picked.dtype(), DType::Float64);
        assert_eq!(picked.to_vec(), vec![Element::Float(1.0), Element::Float(1.5)]);
        assert!(tb.extract_bloc(&Array::from_bools(vec![true])).is_err());
    }

    #[test]
    fn concat_columns() {
        let tb = sample();
        let both = TypeBlocks::concat([&tb, &tb]).unwrap();
        assert_eq!(both.shape(), (3, 8));
        assert!(TypeBlocks::concat([&tb, &TypeBlocks::empty(2)]).is_err());
    }
}
