use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::StringRecord;
use log::{debug, info};

// ---------------------------------------------------------------------------
// Split a combined multi-game log into per-game CSV files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    /// Header name of the column that identifies a game.
    pub id_column: String,
    /// Rows grouped in memory before they are flushed to their files.
    pub chunk_rows: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            id_column: "game_id".to_string(),
            chunk_rows: 100_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub rows: u64,
    /// Output files written to during this run.
    pub files_touched: usize,
    /// Output files that did not exist before this run.
    pub files_created: usize,
}

/// Stream `input` (a CSV with a header row) and append each row to
/// `<output_dir>/<id>.csv`, where `<id>` is the row's value in the id column.
///
/// Output rows keep every column except the id column and carry no header,
/// which is the layout the dataset builder reads. An output file is
/// truncated the first time a run writes to it and appended to for later
/// chunks, so re-running on the same input reproduces the same files and the
/// builder sees them as already ingested.
pub fn split_by_id(input: &Path, output_dir: &Path, options: &SplitOptions) -> Result<SplitReport> {
    if options.chunk_rows == 0 {
        bail!("chunk_rows must be at least 1");
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let id_idx = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .position(|h| h == options.id_column)
        .with_context(|| format!("CSV missing '{}' column", options.id_column))?;

    let mut report = SplitReport::default();
    let mut touched = BTreeSet::new();
    let mut chunk: BTreeMap<String, Vec<StringRecord>> = BTreeMap::new();
    let mut buffered = 0usize;

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let id = record.get(id_idx).unwrap_or("").trim();
        validate_id(id).with_context(|| format!("CSV row {row_no}"))?;

        let kept: StringRecord = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx)
            .map(|(_, v)| v)
            .collect();
        chunk.entry(id.to_string()).or_default().push(kept);
        buffered += 1;
        report.rows += 1;

        if buffered == options.chunk_rows {
            flush_chunk(&mut chunk, output_dir, &mut touched, &mut report)?;
            buffered = 0;
        }
    }
    flush_chunk(&mut chunk, output_dir, &mut touched, &mut report)?;
    report.files_touched = touched.len();

    info!(
        "Split {} rows from {} into {} files ({} new) under {}",
        report.rows,
        input.display(),
        report.files_touched,
        report.files_created,
        output_dir.display()
    );
    Ok(report)
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("empty game id");
    }
    if id == "." || id == ".." || id.contains(['/', '\\']) || id.contains("..") {
        bail!("game id '{id}' cannot be used as a file name");
    }
    Ok(())
}

fn flush_chunk(
    chunk: &mut BTreeMap<String, Vec<StringRecord>>,
    output_dir: &Path,
    touched: &mut BTreeSet<String>,
    report: &mut SplitReport,
) -> Result<()> {
    for (id, records) in std::mem::take(chunk) {
        let path: PathBuf = output_dir.join(format!("{id}.csv"));
        if !path.exists() {
            report.files_created += 1;
        }
        let first_write = !touched.contains(&id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first_write)
            .append(!first_write)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        for record in &records {
            writer
                .write_record(record)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        debug!("Appended {} rows to {}", records.len(), path.display());
        touched.insert(id);
    }
    Ok(())
}
