//! FILENAME: frame-engine/src/lib.rs
//! PURPOSE: Main library entry point for the column-block engine.
//! CONTEXT: Re-exports public types and modules for use by the pivot and
//! archive crates.

pub mod array;
pub mod builder;
pub mod container_util;
pub mod dtype;
pub mod element;
pub mod error;
pub mod frame;
pub mod group;
pub mod index;
pub mod key;
pub mod matmul;
pub mod type_blocks;

// Re-export commonly used types at the crate root
pub use array::{memory_order, shaped, vector, Array, Layout, Values};
pub use builder::{scatter_with_fill, ColumnBuilder};
pub use container_util::{
    index_from_labels, index_from_optional_constructor, index_many_concat, index_many_set,
    key_from_container_key, key_to_ascending_key, rehierarch_from_index_hierarchy,
    rehierarch_from_type_blocks, sort_index_for_order, Ascending, ContainerKey, IndexInitializer,
    ManyToOneType, SelectionKey,
};
pub use dtype::{dtype_from_element, dtype_from_elements, resolve_dtype, resolve_dtype_iter, DType};
pub use element::{Element, Fraction};
pub use error::{ErrorCategory, FrameError, Result};
pub use frame::{Frame, LabelledArray};
pub use group::{Group, SortKind};
pub use index::{AnyIndex, Index, IndexClass, IndexHierarchy, Mutability};
pub use key::{Key, Slice};
pub use matmul::{matmul, matmul_array, Product};
pub use type_blocks::{Extraction, TypeBlocks};
