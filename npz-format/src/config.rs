//! FILENAME: npz-format/src/config.rs

use serde::{Deserialize, Serialize};

/// Options for writing a frame archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Store the row index; when false it reads back as an auto index.
    pub include_index: bool,
    /// Store the column index; when false it reads back as an auto index.
    pub include_columns: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            include_index: true,
            include_columns: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ArchiveConfig = serde_json::from_str(r#"{"include_index": false}"#).unwrap();
        assert!(!config.include_index);
        assert!(config.include_columns);
    }
}
