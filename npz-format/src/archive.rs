//! FILENAME: npz-format/src/archive.rs
//! PURPOSE: Write a frame to an NPZ archive and read it back.
//! CONTEXT: Entries are stored uncompressed and written in sequence: index
//! depths, column depths, blocks, then the JSON manifest last. An auto index
//! of depth one is not stored and reads back as an auto index. Object arrays
//! have no NPY form, so they are encoded into the manifest under the name
//! their entry would have had.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use frame_engine::{AnyIndex, Array, DType, Element, Frame, Index, IndexClass, IndexHierarchy, TypeBlocks};
use indexmap::IndexMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::ArchiveConfig;
use crate::element_codec::{decode_array, decode_name, encode_array, encode_name};
use crate::error::{ArchiveError, Result};
use crate::npy::{read_npy_within, write_npy};

// ============================================================================
// LAYOUT
// ============================================================================

pub(crate) const FILE_META: &str = "__meta__.json";

#[derive(Debug, Clone, Copy)]
enum Entry {
    IndexValues,
    ColumnsValues,
    Block,
}

impl Entry {
    fn name(&self, i: usize) -> String {
        match self {
            Entry::IndexValues => format!("__values_index_{}__.npy", i),
            Entry::ColumnsValues => format!("__values_columns_{}__.npy", i),
            Entry::Block => format!("__blocks_{}__.npy", i),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    /// Frame, index and columns names.
    #[serde(rename = "__names__")]
    names: [Value; 3],

    /// Index and columns class names.
    #[serde(rename = "__types__")]
    types: [String; 2],

    /// Block count, index depth and columns depth.
    #[serde(rename = "__depths__")]
    depths: [usize; 3],

    /// Row and column counts; sizes auto indices when no blocks are stored.
    #[serde(rename = "__shape__", default, skip_serializing_if = "Option::is_none")]
    shape: Option<[usize; 2]>,

    #[serde(rename = "__types_index__", default, skip_serializing_if = "Option::is_none")]
    types_index: Option<Vec<String>>,

    #[serde(rename = "__types_columns__", default, skip_serializing_if = "Option::is_none")]
    types_columns: Option<Vec<String>>,

    #[serde(rename = "__object_values__", default, skip_serializing_if = "IndexMap::is_empty")]
    object_values: IndexMap<String, Value>,
}

fn name_value(name: Option<&Element>) -> Result<Value> {
    name.map_or(Ok(Value::Null), encode_name)
}

fn name_element(value: &Value) -> Result<Option<Element>> {
    match value {
        Value::Null => Ok(None),
        other => decode_name(other).map(Some),
    }
}

// ============================================================================
// WRITE
// ============================================================================

/// Queue the depths of `index`; returns per-depth class names for a hierarchy.
fn encode_index(index: &AnyIndex, entry: Entry, include: bool, arrays: &mut Vec<(String, Array)>) -> Option<Vec<String>> {
    if !include || (index.depth() == 1 && index.is_auto()) {
        return None;
    }
    for depth in 0..index.depth() {
        if let Some(values) = index.values_at_depth(depth) {
            arrays.push((entry.name(depth), values));
        }
    }
    index
        .class()
        .is_hierarchy()
        .then(|| index.depth_classes().iter().map(|c| c.name().to_string()).collect())
}

/// Write `frame` as an NPZ archive to any seekable writer.
///
/// The writer is flushed and handed back once the archive is complete.
pub fn write_archive<W: Write + Seek>(writer: W, frame: &Frame, config: &ArchiveConfig) -> Result<W> {
    let blocks = frame.blocks().blocks();
    let (rows, columns) = frame.shape();
    let mut manifest = Manifest {
        names: [
            name_value(frame.name())?,
            name_value(frame.index().name())?,
            name_value(frame.columns().name())?,
        ],
        types: [
            frame.index().class().name().to_string(),
            frame.columns().class().name().to_string(),
        ],
        depths: [blocks.len(), frame.index().depth(), frame.columns().depth()],
        shape: Some([rows, columns]),
        types_index: None,
        types_columns: None,
        object_values: IndexMap::new(),
    };

    let mut arrays: Vec<(String, Array)> = Vec::new();
    manifest.types_index = encode_index(frame.index(), Entry::IndexValues, config.include_index, &mut arrays);
    manifest.types_columns = encode_index(frame.columns(), Entry::ColumnsValues, config.include_columns, &mut arrays);
    arrays.extend(blocks.iter().enumerate().map(|(i, b)| (Entry::Block.name(i), b.clone())));

    debug!(
        "write_archive: {} blocks, index depth {}, columns depth {}",
        blocks.len(),
        frame.index().depth(),
        frame.columns().depth()
    );

    let mut zip = ZipWriter::new(writer);
    let options: FileOptions<'_, ()> = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, array) in &arrays {
        if array.dtype() == DType::Object {
            trace!("write_archive: {} into manifest", name);
            manifest.object_values.insert(name.clone(), encode_array(array)?);
            continue;
        }
        trace!("write_archive: {} {:?}", name, array.shape());
        zip.start_file(name.as_str(), options)?;
        write_npy(&mut zip, array)?;
    }
    zip.start_file(FILE_META, options)?;
    zip.write_all(&serde_json::to_vec(&manifest)?)?;
    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(writer)
}

/// Write `frame` to the archive file at `path`, replacing any file there.
pub fn to_archive(frame: &Frame, path: &Path, config: &ArchiveConfig) -> Result<()> {
    let file = File::create(path)?;
    let file = write_archive(BufWriter::new(file), frame, config)?
        .into_inner()
        .map_err(|e| e.into_error())?;
    file.sync_all()?;
    debug!("to_archive: wrote {}", path.display());
    Ok(())
}

// ============================================================================
// READ
// ============================================================================

struct Reader<R: Read + Seek> {
    zip: ZipArchive<R>,
    manifest: Manifest,
}

impl<R: Read + Seek> Reader<R> {
    fn open(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader)?;
        let manifest = {
            let mut file = zip
                .by_name(FILE_META)
                .map_err(|_| ArchiveError::MissingEntry(FILE_META.to_string()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            serde_json::from_slice(&buf)?
        };
        Ok(Reader { zip, manifest })
    }

    /// The array stored under `name`, from its NPY entry or the manifest.
    fn entry(&mut self, name: &str) -> Result<Option<Array>> {
        if let Some(value) = self.manifest.object_values.get(name) {
            return decode_array(value).map(Some);
        }
        if self.zip.index_for_name(name).is_none() {
            return Ok(None);
        }
        trace!("read_archive: {}", name);
        let mut file = self.zip.by_name(name)?;
        let size = file.size();
        read_npy_within(&mut file, Some(size)).map(Some)
    }

    fn required(&mut self, name: &str) -> Result<Array> {
        self.entry(name)?
            .ok_or_else(|| ArchiveError::MissingEntry(name.to_string()))
    }

    /// Rebuild an index; `len` sizes the auto index used when nothing was stored.
    fn index(
        &mut self,
        entry: Entry,
        depth: usize,
        class: IndexClass,
        types: Option<Vec<String>>,
        name: Option<Element>,
        len: usize,
    ) -> Result<AnyIndex> {
        let first = match self.entry(&entry.name(0))? {
            Some(first) => first,
            None => {
                let flat = if class.is_hierarchy() {
                    IndexClass::flat(class.mutability())
                } else {
                    class
                };
                return Ok(Index::auto(len, flat)?.with_name(name).into());
            }
        };
        if !class.is_hierarchy() {
            return Ok(Index::from_array(first, class)?.with_name(name).into());
        }
        let mut depths = Vec::with_capacity(depth);
        depths.push(first);
        for i in 1..depth {
            depths.push(self.required(&entry.name(i))?);
        }
        let depth_classes = types
            .map(|names| names.iter().map(|n| IndexClass::from_name(n)).collect::<frame_engine::Result<Vec<_>>>())
            .transpose()?;
        Ok(IndexHierarchy::from_depth_arrays(depths, depth_classes, class)?
            .with_name(name)
            .into())
    }
}

/// Read a frame from an NPZ archive held by any seekable reader.
pub fn read_archive<R: Read + Seek>(reader: R) -> Result<Frame> {
    let mut reader = Reader::open(reader)?;
    let [block_count, depth_index, depth_columns] = reader.manifest.depths;
    let [name, name_index, name_columns] = reader.manifest.names.clone();
    let class_index = IndexClass::from_name(&reader.manifest.types[0])?;
    let class_columns = IndexClass::from_name(&reader.manifest.types[1])?;
    debug!(
        "read_archive: {} blocks, index depth {}, columns depth {}",
        block_count, depth_index, depth_columns
    );

    let arrays = (0..block_count)
        .map(|i| reader.required(&Entry::Block.name(i)))
        .collect::<Result<Vec<Array>>>()?;
    let blocks = if arrays.is_empty() {
        None
    } else {
        Some(TypeBlocks::from_blocks(arrays)?)
    };

    let [rows, _] = reader
        .manifest
        .shape
        .unwrap_or([blocks.as_ref().map_or(0, |b| b.rows()), 0]);
    let types_index = reader.manifest.types_index.take();
    let index = reader.index(
        Entry::IndexValues,
        depth_index,
        class_index,
        types_index,
        name_element(&name_index)?,
        rows,
    )?;
    let blocks = blocks.unwrap_or_else(|| TypeBlocks::empty(index.len()));

    let types_columns = reader.manifest.types_columns.take();
    let columns = reader.index(
        Entry::ColumnsValues,
        depth_columns,
        class_columns,
        types_columns,
        name_element(&name_columns)?,
        blocks.columns(),
    )?;
    Ok(Frame::new(blocks, index, columns)?.with_name(name_element(&name)?))
}

/// Read the archive file at `path`.
pub fn from_archive(path: &Path) -> Result<Frame> {
    let file = File::open(path)?;
    debug!("from_archive: reading {}", path.display());
    read_archive(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    fn s(value: &str) -> Element {
        Element::str(value)
    }

    fn sample() -> Frame {
        let index = Index::from_labels(&[s("a"), s("b"), s("c")], IndexClass::Index)
            .unwrap()
            .with_name(Some(s("key")));
        Frame::from_columns(
            vec![
                (s("x"), Array::from_ints(vec![1, 2, 3])),
                (s("y"), Array::from_floats(vec![0.5, f64::NAN, 2.0])),
                (s("z"), Array::from_strs(["p", "q", "r"])),
            ],
            Some(index.into()),
        )
        .unwrap()
        .with_name(Some(s("sample")))
    }

    fn round_trip(frame: &Frame, config: &ArchiveConfig) -> Frame {
        let mut buf = Cursor::new(Vec::new());
        write_archive(&mut buf, frame, config).unwrap();
        buf.set_position(0);
        read_archive(buf).unwrap()
    }

    fn entry_names(frame: &Frame, config: &ArchiveConfig) -> Vec<String> {
        let mut buf = Cursor::new(Vec::new());
        write_archive(&mut buf, frame, config).unwrap();
        let mut zip = ZipArchive::new(buf).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.npz");
        let frame = sample();
        to_archive(&frame, &path, &ArchiveConfig::default()).unwrap();
        let back = from_archive(&path).unwrap();

        assert_eq!(back.name(), Some(&s("sample")));
        assert_eq!(back.index().name(), Some(&s("key")));
        assert_eq!(back.index().labels(), frame.index().labels());
        assert_eq!(back.columns().labels(), vec![s("x"), s("y"), s("z")]);
        assert_eq!(back.column(&s("x")).unwrap(), Array::from_ints(vec![1, 2, 3]));
        assert!(back.column(&s("y")).unwrap().element(1).is_nan());
        assert_eq!(back.column(&s("z")).unwrap().dtype(), DType::Unicode(1));
    }

    #[test]
    fn test_entry_order_and_auto_index() {
        let frame = Frame::from_columns(vec![(s("v"), Array::from_ints(vec![4, 5]))], None).unwrap();
        let names = entry_names(&frame, &ArchiveConfig::default());
        // no index entry for an auto index
        assert_eq!(names, vec!["__values_columns_0__.npy", "__blocks_0__.npy", "__meta__.json"]);

        let back = round_trip(&frame, &ArchiveConfig::default());
        assert!(back.index().is_auto());
        assert_eq!(back.index().len(), 2);
        assert_eq!(back, frame);
    }

    #[test]
    fn test_excluded_axes_read_back_as_auto() {
        let config = ArchiveConfig {
            include_index: false,
            include_columns: false,
        };
        let back = round_trip(&sample(), &config);
        assert!(back.index().is_auto());
        assert!(back.columns().is_auto());
        assert_eq!(back.shape(), (3, 3));
        assert_eq!(back.column(&Element::Int(0)).unwrap(), Array::from_ints(vec![1, 2, 3]));
    }

    #[test]
    fn test_hierarchical_columns_keep_classes() {
        let labels = vec![
            Element::tuple([s("a"), Element::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())]),
            Element::tuple([s("b"), Element::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())]),
        ];
        let columns = IndexHierarchy::from_depth_arrays(
            vec![
                Array::from_strs(["a", "b"]),
                Array::from_dates(vec![
                    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                ]),
            ],
            Some(vec![IndexClass::Index, IndexClass::IndexDate]),
            IndexClass::IndexHierarchyGO,
        )
        .unwrap()
        .with_name(Some(Element::tuple([s("side"), s("day")])));
        let frame = Frame::new(
            TypeBlocks::from_blocks(vec![Array::from_ints(vec![1, 2, 3, 4]).reshape(&[2, 2]).unwrap()]).unwrap(),
            AnyIndex::auto(2),
            columns.into(),
        )
        .unwrap();

        let back = round_trip(&frame, &ArchiveConfig::default());
        assert_eq!(back.columns().class(), IndexClass::IndexHierarchyGO);
        assert_eq!(back.columns().depth_classes(), vec![IndexClass::Index, IndexClass::IndexDate]);
        assert_eq!(back.columns().labels(), labels);
        assert_eq!(back.columns().name(), frame.columns().name());
        assert_eq!(back.blocks().blocks()[0].shape(), &[2, 2]);
    }

    #[test]
    fn test_object_blocks_go_to_manifest() {
        let mixed = Array::from_objects(vec![
            Element::Int(1),
            Element::str("two"),
            Element::Fraction(frame_engine::Fraction::new(3, 4).unwrap()),
        ]);
        let frame = Frame::from_columns(
            vec![(s("n"), Array::from_ints(vec![1, 2, 3])), (s("o"), mixed.clone())],
            None,
        )
        .unwrap();
        let names = entry_names(&frame, &ArchiveConfig::default());
        assert!(names.contains(&"__blocks_0__.npy".to_string()));
        assert!(!names.contains(&"__blocks_1__.npy".to_string()));
        assert_eq!(names.last().map(String::as_str), Some(FILE_META));

        let back = round_trip(&frame, &ArchiveConfig::default());
        assert_eq!(back.column(&s("o")).unwrap(), mixed);
    }

    #[test]
    fn test_zero_column_frame_keeps_rows() {
        let frame = Frame::new(TypeBlocks::empty(4), AnyIndex::auto(4), AnyIndex::auto(0)).unwrap();
        let names = entry_names(&frame, &ArchiveConfig::default());
        assert_eq!(names, vec![FILE_META]);

        let back = round_trip(&frame, &ArchiveConfig::default());
        assert_eq!(back.shape(), (4, 0));
        assert!(back.index().is_auto());
        assert_eq!(back, frame);
    }

    /// Accepts every write but fails to flush.
    struct FlushFails(Cursor<Vec<u8>>);

    impl Write for FlushFails {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
    }

    impl Seek for FlushFails {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    #[test]
    fn test_failed_flush_is_reported() {
        let result = write_archive(FlushFails(Cursor::new(Vec::new())), &sample(), &ArchiveConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_manifest() {
        let mut buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buf);
        let options: FileOptions<'_, ()> = FileOptions::default();
        zip.start_file("__blocks_0__.npy", options).unwrap();
        write_npy(&mut zip, &Array::from_ints(vec![1])).unwrap();
        zip.finish().unwrap();
        buf.set_position(0);
        assert!(matches!(read_archive(buf), Err(ArchiveError::MissingEntry(_))));
    }
}
