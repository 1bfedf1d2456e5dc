use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Rows whose index exceeds this value stop the read of their file.
pub const DEFAULT_ROW_CAP: i64 = 1000;

/// Rows buffered in memory before a batch is flushed to the store.
pub const DEFAULT_BATCH_ROWS: usize = 4096;

// ---------------------------------------------------------------------------
// Builder configuration
// ---------------------------------------------------------------------------

/// Everything a run of the dataset builder needs, constructed once by the caller.
///
/// Loaded from JSON; every field is optional and falls back to [`Default`]:
///
/// ```json
/// {
///   "source_dir": "data/saves/test_hot_encode",
///   "store_path": "data/ai/random_ne_processed/short_data",
///   "row_cap": 1000,
///   "bounds": { "label_max": 255, "feature_max": 65535 },
///   "split": { "input": "data/saves/test_random_ne/encoded_games.csv" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Directory of per-game CSV files (non-recursive).
    pub source_dir: PathBuf,
    /// Store directory; created on first run.
    pub store_path: PathBuf,
    /// Inclusive upper bound on the row index read from each file.
    pub row_cap: i64,
    /// Rows per record batch written to a segment.
    pub batch_rows: usize,
    pub bounds: ValueBounds,
    /// Skip files already recorded (same name and content) in the store manifest.
    pub skip_ingested: bool,
    /// Optional pre-step: split a combined log into `source_dir`.
    pub split: Option<SplitConfig>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/saves/test_hot_encode"),
            store_path: PathBuf::from("data/ai/random_ne_processed/short_data"),
            row_cap: DEFAULT_ROW_CAP,
            batch_rows: DEFAULT_BATCH_ROWS,
            bounds: ValueBounds::default(),
            skip_ingested: true,
            split: None,
        }
    }
}

/// Upper bounds applied when coercing labels and features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueBounds {
    pub label_max: u8,
    pub feature_max: u16,
}

impl Default for ValueBounds {
    fn default() -> Self {
        Self {
            label_max: u8::MAX,
            feature_max: u16::MAX,
        }
    }
}

/// Where to find a combined multi-game log and how to split it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub input: PathBuf,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
}

fn default_id_column() -> String {
    "game_id".to_string()
}

fn default_chunk_rows() -> usize {
    100_000
}

impl BuilderConfig {
    /// Read a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: BuilderConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_rows == 0 {
            bail!("batch_rows must be at least 1");
        }
        if self.source_dir == self.store_path {
            bail!(
                "source_dir and store_path must differ (both are {})",
                self.source_dir.display()
            );
        }
        if let Some(split) = &self.split {
            if split.chunk_rows == 0 {
                bail!("split.chunk_rows must be at least 1");
            }
            if split.id_column.is_empty() {
                bail!("split.id_column must not be empty");
            }
        }
        Ok(())
    }
}
