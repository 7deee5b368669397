//! FILENAME: frame-engine/src/index/class.rs
//! PURPOSE: The closed set of index classes and the name registry used to
//! rebuild them from archive manifests.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::dtype::DType;
use crate::error::{FrameError, Result};

/// Whether an index may grow after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Static,
    GrowOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexClass {
    Index,
    IndexGO,
    IndexDate,
    IndexDateGO,
    IndexHierarchy,
    IndexHierarchyGO,
}

static REGISTRY: Lazy<FxHashMap<&'static str, IndexClass>> =
    Lazy::new(|| IndexClass::ALL.iter().map(|c| (c.name(), *c)).collect());

impl IndexClass {
    pub const ALL: [IndexClass; 6] = [
        IndexClass::Index,
        IndexClass::IndexGO,
        IndexClass::IndexDate,
        IndexClass::IndexDateGO,
        IndexClass::IndexHierarchy,
        IndexClass::IndexHierarchyGO,
    ];

    /// Name written to archive manifests.
    pub fn name(&self) -> &'static str {
        match self {
            IndexClass::Index => "Index",
            IndexClass::IndexGO => "IndexGO",
            IndexClass::IndexDate => "IndexDate",
            IndexClass::IndexDateGO => "IndexDateGO",
            IndexClass::IndexHierarchy => "IndexHierarchy",
            IndexClass::IndexHierarchyGO => "IndexHierarchyGO",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        REGISTRY
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownIndexClass(name.to_string()))
    }

    /// Default flat class for a mutability.
    pub fn flat(mutability: Mutability) -> Self {
        match mutability {
            Mutability::Static => IndexClass::Index,
            Mutability::GrowOnly => IndexClass::IndexGO,
        }
    }

    /// Default hierarchical class for a mutability.
    pub fn hierarchy(mutability: Mutability) -> Self {
        match mutability {
            Mutability::Static => IndexClass::IndexHierarchy,
            Mutability::GrowOnly => IndexClass::IndexHierarchyGO,
        }
    }

    pub fn mutability(&self) -> Mutability {
        match self {
            IndexClass::IndexGO | IndexClass::IndexDateGO | IndexClass::IndexHierarchyGO => Mutability::GrowOnly,
            _ => Mutability::Static,
        }
    }

    pub fn is_hierarchy(&self) -> bool {
        matches!(self, IndexClass::IndexHierarchy | IndexClass::IndexHierarchyGO)
    }

    /// The same family with the requested mutability.
    pub fn with_mutability(&self, mutability: Mutability) -> Self {
        match (self, mutability) {
            (IndexClass::Index | IndexClass::IndexGO, m) => IndexClass::flat(m),
            (IndexClass::IndexDate | IndexClass::IndexDateGO, Mutability::Static) => IndexClass::IndexDate,
            (IndexClass::IndexDate | IndexClass::IndexDateGO, Mutability::GrowOnly) => IndexClass::IndexDateGO,
            (IndexClass::IndexHierarchy | IndexClass::IndexHierarchyGO, m) => IndexClass::hierarchy(m),
        }
    }

    /// Dtype the labels are converted to, if the class fixes one.
    pub fn required_dtype(&self) -> Option<DType> {
        match self {
            IndexClass::IndexDate | IndexClass::IndexDateGO => Some(DType::Date),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_every_name() {
        for class in IndexClass::ALL {
            assert_eq!(IndexClass::from_name(class.name()).unwrap(), class);
        }
        assert!(matches!(
            IndexClass::from_name("IndexYear"),
            Err(FrameError::UnknownIndexClass(_))
        ));
    }

    #[test]
    fn mutability_conversion_keeps_family() {
        assert_eq!(IndexClass::IndexDate.with_mutability(Mutability::GrowOnly), IndexClass::IndexDateGO);
        assert_eq!(IndexClass::IndexHierarchyGO.with_mutability(Mutability::Static), IndexClass::IndexHierarchy);
        assert!(IndexClass::IndexHierarchyGO.is_hierarchy());
        assert_eq!(IndexClass::IndexGO.mutability(), Mutability::GrowOnly);
    }
}
