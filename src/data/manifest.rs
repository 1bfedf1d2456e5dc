use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_TAG: &str = "game-dataset-store";
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Manifest – the single source of truth for a store's shape
// ---------------------------------------------------------------------------

/// Persisted description of a store.
///
/// ```json
/// {
///   "format": "game-dataset-store",
///   "version": 1,
///   "columns": 6,
///   "rows": 2002,
///   "next_segment": 2,
///   "segments": [{ "file": "seg-000000.parquet", "source": "game1.csv", "rows": 1001, "columns": 4 }],
///   "ingested": { "game1.csv": { "digest": "ab12...", "rows": 1001 } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    pub version: u32,
    /// Current feature width. Never decreases.
    pub columns: usize,
    pub rows: u64,
    pub next_segment: u64,
    /// In append order.
    pub segments: Vec<SegmentEntry>,
    /// Source file name → identity of the content that was ingested.
    #[serde(default)]
    pub ingested: BTreeMap<String, IngestedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub file: String,
    pub source: String,
    pub rows: u64,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedFile {
    pub digest: String,
    pub rows: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            columns: 0,
            rows: 0,
            next_segment: 0,
            segments: Vec::new(),
            ingested: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn load(store: &Path) -> Result<Self> {
        let path = store.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| DatasetError::storage(&path, format!("reading manifest: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .map_err(|e| DatasetError::storage(&path, format!("parsing manifest: {e}")))?;
        manifest.check().map_err(|msg| DatasetError::storage(&path, msg))?;
        Ok(manifest)
    }

    /// Replace the manifest on disk: write a sibling temp file, then rename.
    pub fn save(&self, store: &Path) -> Result<()> {
        let path = store.join(MANIFEST_FILE);
        let tmp = store.join(format!("{MANIFEST_FILE}.tmp"));
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| DatasetError::storage(&path, format!("encoding manifest: {e}")))?;
        std::fs::write(&tmp, text)
            .map_err(|e| DatasetError::storage(&tmp, format!("writing manifest: {e}")))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| DatasetError::storage(&path, format!("replacing manifest: {e}")))?;
        Ok(())
    }

    /// Structural consistency of a loaded manifest.
    fn check(&self) -> std::result::Result<(), String> {
        if self.format != FORMAT_TAG {
            return Err(format!("not a dataset store (format '{}')", self.format));
        }
        if self.version != FORMAT_VERSION {
            return Err(format!("unsupported store version {}", self.version));
        }
        let rows: u64 = self.segments.iter().map(|s| s.rows).sum();
        if rows != self.rows {
            return Err(format!(
                "row count {} disagrees with segments ({rows})",
                self.rows
            ));
        }
        if let Some(seg) = self.segments.iter().find(|s| s.columns > self.columns) {
            return Err(format!(
                "segment {} has {} columns but store has {}",
                seg.file, seg.columns, self.columns
            ));
        }
        Ok(())
    }

    pub fn segment_file_name(id: u64) -> String {
        format!("seg-{id:06}.parquet")
    }

    pub fn is_ingested(&self, source: &str, digest: &str) -> bool {
        self.ingested
            .get(source)
            .is_some_and(|f| f.digest == digest)
    }
}
