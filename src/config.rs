use crate::diff::MergePolicy;
use crate::error::StoreError;
use crate::index::types::{COMPARE_FIELD, COMPARE_IGNORE_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the optional config file in a store root
pub const CONFIG_FILE: &str = "revidx.json";

/// Store configuration, read from `revidx.json` in the store root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub translog: TranslogConfig,

    #[serde(default)]
    pub diff: DiffConfig,

    /// Document types the store accepts. Empty accepts every type.
    #[serde(default)]
    pub document_types: BTreeSet<String>,
}

/// Write-ahead log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslogConfig {
    /// fsync after every appended record
    #[serde(default = "default_sync_on_append")]
    pub sync_on_append: bool,

    /// Generations kept below the committed one after a commit
    #[serde(default)]
    pub retained_generations: u64,

    /// Largest encoded record accepted
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

fn default_sync_on_append() -> bool {
    true
}

fn default_max_record_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for TranslogConfig {
    fn default() -> Self {
        Self {
            sync_on_append: default_sync_on_append(),
            retained_generations: 0,
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

/// Diff and merge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Numeric field carrying the id of a relevant write
    #[serde(default = "default_compare_field")]
    pub compare_field: String,

    /// Numeric field carrying the id of an ignored write
    #[serde(default = "default_ignore_field")]
    pub ignore_field: String,

    #[serde(default)]
    pub merge_policy: MergePolicy,
}

fn default_compare_field() -> String {
    COMPARE_FIELD.to_string()
}

fn default_ignore_field() -> String {
    COMPARE_IGNORE_FIELD.to_string()
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            compare_field: default_compare_field(),
            ignore_field: default_ignore_field(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Load the config of a store root, or defaults if it has none
    pub fn load(root: &Path) -> Result<Self, StoreError> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| StoreError::Config { path, source })
    }

    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        let path = Self::path(root);
        let content = serde_json::to_string_pretty(self)
            .map_err(|source| StoreError::Config { path: path.clone(), source })?;
        fs::write(&path, content)?;
        Ok(())
    }
}
