//! FILENAME: pivot-engine/src/lib.rs
//! Pivot subsystem over the column-block engine.
//!
//! This crate regroups a frame's rows by the values of its index and columns
//! fields and aggregates the data fields of each group. It depends on
//! `frame-engine` for blocks, indices and grouping.
//!
//! Layers:
//! - `definition`: field groups and functions (what the pivot IS)
//! - `aggregation`: functions applied per group
//! - `engine`: the pivot core (HOW we calculate)
//! - `index_map`: moving index depths between axes

pub mod aggregation;
pub mod definition;
pub mod engine;
pub mod error;
pub mod index_map;

pub use aggregation::{AggregationType, Aggregator, CustomAggregation};
pub use definition::{PivotDefinition, PivotFunc};
pub use engine::{extrapolate_column_fields, pivot};
pub use error::{PivotError, Result};
pub use index_map::{pivot_index_map, unstack, PivotIndexMap};
