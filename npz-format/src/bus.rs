//! FILENAME: npz-format/src/bus.rs
//! PURPOSE: An ordered mapping of labels to frames loaded on first access.
//! CONTEXT: Frames live in a `Store` until asked for. With `max_persist`
//! set, the bus holds at most that many frames and drops the least recently
//! used one when another is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use frame_engine::{Element, Frame, FrameError};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};

use crate::archive::{from_archive, to_archive};
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};

const EXTENSION: &str = "npz";

// ============================================================================
// STORES
// ============================================================================

/// Source of frames addressed by label.
pub trait Store {
    /// Every label the store holds, in a stable order.
    fn labels(&self) -> Result<Vec<Element>>;

    fn read(&self, label: &Element) -> Result<Frame>;

    /// Whether the backing location still exists.
    fn is_available(&self) -> bool {
        true
    }
}

/// A directory holding one archive per label, named `<label>.npz`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    config: ArchiveConfig,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryStore {
            root: root.into(),
            config: ArchiveConfig::default(),
        }
    }

    /// Options used by `write`.
    pub fn with_config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Labels must be plain file stems so every archive stays directly under the root.
    fn path_for(&self, label: &Element) -> Result<PathBuf> {
        match label {
            Element::Str(stem) if !stem.is_empty() && !stem.contains(['/', '\\']) && !stem.contains("..") => {
                Ok(self.root.join(format!("{}.{}", stem, EXTENSION)))
            }
            Element::Str(stem) => Err(ArchiveError::InvalidLabel(stem.clone())),
            other => Err(FrameError::LabelNotFound(other.to_string()).into()),
        }
    }

    /// Write `frame` under `label`, replacing any archive already there.
    pub fn write(&self, label: &Element, frame: &Frame) -> Result<()> {
        to_archive(frame, &self.path_for(label)?, &self.config)
    }
}

impl Store for DirectoryStore {
    fn labels(&self) -> Result<Vec<Element>> {
        let mut stems = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems.into_iter().map(Element::Str).collect())
    }

    fn read(&self, label: &Element) -> Result<Frame> {
        from_archive(&self.path_for(label)?)
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }
}

// ============================================================================
// BUS
// ============================================================================

pub struct Bus<S: Store> {
    store: S,
    labels: IndexSet<Element>,
    /// Realized frames, least recently used first.
    loaded: IndexMap<Element, Frame>,
    max_persist: Option<usize>,
}

impl<S: Store> Bus<S> {
    /// A bus over every label in `store`, with nothing loaded yet.
    pub fn from_store(store: S, max_persist: Option<usize>) -> Result<Self> {
        if max_persist == Some(0) {
            return Err(ArchiveError::InvalidPersist);
        }
        let labels: IndexSet<Element> = store.labels()?.into_iter().collect();
        debug!("Bus::from_store: {} labels, max_persist {:?}", labels.len(), max_persist);
        Ok(Bus {
            store,
            labels,
            loaded: IndexMap::new(),
            max_persist,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in store order.
    pub fn labels(&self) -> impl Iterator<Item = &Element> + '_ {
        self.labels.iter()
    }

    /// Number of frames currently held in memory.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_loaded(&self, label: &Element) -> bool {
        self.loaded.contains_key(label)
    }

    pub fn max_persist(&self) -> Option<usize> {
        self.max_persist
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The frame under `label`, reading it from the store if needed.
    pub fn get(&mut self, label: &Element) -> Result<Frame> {
        if !self.labels.contains(label) {
            return Err(FrameError::LabelNotFound(label.to_string()).into());
        }
        if let Some(frame) = self.loaded.shift_remove(label) {
            self.loaded.insert(label.clone(), frame.clone());
            return Ok(frame);
        }
        let frame = self.store.read(label)?;
        self.loaded.insert(label.clone(), frame.clone());
        self.evict();
        Ok(frame)
    }

    fn evict(&mut self) {
        let Some(max) = self.max_persist else {
            return;
        };
        while self.loaded.len() > max {
            if let Some((label, _)) = self.loaded.shift_remove_index(0) {
                if self.store.is_available() {
                    debug!("Bus: evicted {}", label);
                } else {
                    warn!("Bus: evicted {} but its store is no longer available", label);
                }
            }
        }
    }

    /// Every label with its frame, in label order.
    pub fn items(&mut self) -> Result<Vec<(Element, Frame)>> {
        let labels: Vec<Element> = self.labels.iter().cloned().collect();
        labels
            .into_iter()
            .map(|label| {
                let frame = self.get(&label)?;
                Ok((label, frame))
            })
            .collect()
    }

    pub fn values(&mut self) -> Result<Vec<Frame>> {
        Ok(self.items()?.into_iter().map(|(_, frame)| frame).collect())
    }

    /// Drop every loaded frame; later access reads from the store again.
    pub fn unpersist(&mut self) {
        debug!("Bus::unpersist: dropping {} frames", self.loaded.len());
        self.loaded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_engine::Array;

    fn s(value: &str) -> Element {
        Element::str(value)
    }

    fn frame(value: i64) -> Frame {
        Frame::from_columns(vec![(s("v"), Array::from_ints(vec![value, value + 1]))], None).unwrap()
    }

    fn populated() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        for (i, label) in ["b", "a", "c"].iter().enumerate() {
            store.write(&s(label), &frame(i as i64 * 10)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not an archive").unwrap();
        (dir, store)
    }

    #[test]
    fn test_loads_on_access() {
        let (_dir, store) = populated();
        let mut bus = Bus::from_store(store, None).unwrap();
        assert_eq!(bus.len(), 3);
        assert_eq!(bus.labels().cloned().collect::<Vec<_>>(), vec![s("a"), s("b"), s("c")]);
        assert_eq!(bus.loaded_count(), 0);

        let b = bus.get(&s("b")).unwrap();
        assert_eq!(b, frame(0));
        assert_eq!(bus.loaded_count(), 1);

        let values = bus.values().unwrap();
        assert_eq!(values, vec![frame(10), frame(0), frame(20)]);
        assert_eq!(bus.loaded_count(), 3);

        bus.unpersist();
        assert_eq!(bus.loaded_count(), 0);
        assert!(bus.get(&s("zz")).is_err());
    }

    #[test]
    fn test_max_persist_evicts_least_recent() {
        let (_dir, store) = populated();
        let mut bus = Bus::from_store(store, Some(2)).unwrap();
        bus.get(&s("a")).unwrap();
        bus.get(&s("b")).unwrap();
        // refresh a so b is the oldest
        bus.get(&s("a")).unwrap();
        bus.get(&s("c")).unwrap();
        assert_eq!(bus.loaded_count(), 2);
        assert!(bus.is_loaded(&s("a")));
        assert!(!bus.is_loaded(&s("b")));
        assert!(bus.is_loaded(&s("c")));

        let items = bus.items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], (s("b"), frame(0)));
        assert_eq!(bus.loaded_count(), 2);
    }

    #[test]
    fn test_zero_max_persist_is_rejected() {
        let (_dir, store) = populated();
        assert!(matches!(Bus::from_store(store, Some(0)), Err(ArchiveError::InvalidPersist)));
    }

    #[test]
    fn test_missing_store_fails_on_read() {
        let (dir, store) = populated();
        let mut bus = Bus::from_store(store, Some(1)).unwrap();
        bus.get(&s("a")).unwrap();
        fs::remove_dir_all(dir.path()).unwrap();
        assert!(!bus.store().is_available());
        // loaded frames stay readable
        assert_eq!(bus.get(&s("a")).unwrap(), frame(10));
        assert!(matches!(bus.get(&s("b")), Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_labels_cannot_leave_the_root() {
        let (dir, store) = populated();
        let inner = DirectoryStore::new(dir.path().join("inner"));
        fs::create_dir(inner.root()).unwrap();
        for label in ["../escaped", "a/b", "a\\b", ".."] {
            assert!(matches!(inner.write(&s(label), &frame(1)), Err(ArchiveError::InvalidLabel(_))));
            assert!(matches!(inner.read(&s(label)), Err(ArchiveError::InvalidLabel(_))));
        }
        assert!(!dir.path().join("escaped.npz").exists());
        assert!(matches!(store.read(&Element::Int(1)), Err(ArchiveError::Frame(_))));
        assert!(store.read(&s("a")).is_ok());
    }
}
