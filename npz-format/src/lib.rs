//! FILENAME: npz-format/src/lib.rs
//! NPZ Format - array files and frame archives.
//!
//! Single arrays are written as NPY files. A frame is written as an NPZ
//! archive: one NPY entry per block and per index depth, plus a JSON
//! manifest holding names, index classes and depths. A `Bus` maps labels to
//! frames stored this way and loads each one only when it is first asked for.

mod archive;
mod bus;
mod config;
mod element_codec;
mod error;
mod header;
mod npy;

pub use archive::{from_archive, read_archive, to_archive, write_archive};
pub use bus::{Bus, DirectoryStore, Store};
pub use config::ArchiveConfig;
pub use element_codec::{decode_array, decode_element, decode_name, encode_array, encode_element, encode_name};
pub use error::{ArchiveError, Result};
pub use npy::{read_npy, write_npy};
