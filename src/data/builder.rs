use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::model::SampleBatch;
use super::source::{file_digest, list_csv_files, SampleReader};
use super::store::{SourceIdentity, Store};
use crate::config::{BuilderConfig, ValueBounds};
use crate::error::{DatasetError, ErrorKind, Result};

// ---------------------------------------------------------------------------
// IngestReport
// ---------------------------------------------------------------------------

/// Summary of one `ingest_directory` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files whose rows were committed (including files with no kept rows).
    pub files_processed: usize,
    /// Files skipped because identical content was already ingested.
    pub files_skipped: usize,
    pub rows_appended: u64,
    /// Store width after the run.
    pub columns: usize,
    pub failures: Vec<FileFailure>,
}

/// A source file that was left out of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DatasetBuilder
// ---------------------------------------------------------------------------

/// Turns a directory of per-game CSV files into rows of a [`Store`].
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    row_cap: i64,
    batch_rows: usize,
    bounds: ValueBounds,
    skip_ingested: bool,
}

impl DatasetBuilder {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            row_cap: config.row_cap,
            batch_rows: config.batch_rows.max(1),
            bounds: config.bounds,
            skip_ingested: config.skip_ingested,
        }
    }

    /// Ingest every `.csv` file directly inside `source_dir`, one at a time.
    ///
    /// Parse and coercion errors are recorded per file and do not stop the
    /// run; any error touching the store aborts it.
    pub fn ingest_directory(&self, store: &mut Store, source_dir: &Path) -> Result<IngestReport> {
        let files = list_csv_files(source_dir)?;
        info!(
            "Ingesting {} CSV files from {} into {}",
            files.len(),
            source_dir.display(),
            store.path().display()
        );

        let mut report = IngestReport::default();
        for path in files {
            match self.ingest_file(store, &path) {
                Ok(FileOutcome::Committed(rows)) => {
                    report.files_processed += 1;
                    report.rows_appended += rows;
                }
                Ok(FileOutcome::Skipped) => report.files_skipped += 1,
                Err(e) if e.is_file_local() => {
                    warn!("Skipping {}: {e}", path.display());
                    report.failures.push(FileFailure {
                        file: path,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        report.columns = store.columns();

        info!(
            "Ingest finished: {} files, {} rows appended, {} skipped, {} failed; store is {} x {}",
            report.files_processed,
            report.rows_appended,
            report.files_skipped,
            report.failures.len(),
            store.len(),
            store.columns()
        );
        Ok(report)
    }

    /// Stream one file into a segment and commit it.
    pub fn ingest_file(&self, store: &mut Store, path: &Path) -> Result<FileOutcome> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let identity = SourceIdentity {
            digest: file_digest(path).map_err(|e| wrap(path, e))?,
            file_name,
        };

        if store.manifest().ingested.contains_key(&identity.file_name) {
            if self.skip_ingested && store.is_ingested(&identity) {
                debug!("Already ingested, skipping {}", path.display());
                return Ok(FileOutcome::Skipped);
            }
            warn!(
                "{} was ingested before; appending its rows again",
                path.display()
            );
        }

        let reader = SampleReader::open(path, self.row_cap, self.bounds).map_err(|e| wrap(path, e))?;
        let mut segment = store.begin_segment(&identity.file_name, self.batch_rows)?;
        let mut batch = SampleBatch::with_capacity(self.batch_rows);

        for sample in reader {
            batch.push(sample.map_err(|e| wrap(path, e))?);
            if batch.len() == self.batch_rows {
                segment.write_batch(&batch)?;
                batch.clear();
            }
        }
        segment.write_batch(&batch)?;

        let outcome = store.commit(segment, identity)?;
        debug!(
            "Committed {} rows from {} ({} columns)",
            outcome.rows,
            path.display(),
            store.columns()
        );
        Ok(FileOutcome::Committed(outcome.rows))
    }
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Committed(u64),
    Skipped,
}

fn wrap(path: &Path, source: DatasetError) -> DatasetError {
    DatasetError::PartialFile {
        file: path.to_path_buf(),
        source: Box::new(source),
    }
}
