use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, ListBuilder, StringArray, UInt16Builder, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, UInt16Type, UInt8Type};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;

use super::manifest::{IngestedFile, Manifest, SegmentEntry};
use super::model::{SampleBatch, StoredDataset};
use crate::error::{DatasetError, Result};

pub const SEGMENTS_DIR: &str = "segments";
const PARTIAL_SUFFIX: &str = ".partial";

/// Value seen in feature columns a row's source file did not have.
pub const FILL_VALUE: u16 = 0;

fn segment_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("label", DataType::UInt8, false),
        Field::new(
            "features",
            DataType::List(Arc::new(Field::new("item", DataType::UInt16, true))),
            false,
        ),
    ]))
}

// ---------------------------------------------------------------------------
// Store – handle on an on-disk dataset store
// ---------------------------------------------------------------------------

/// A growable store of `(name, label, features)` rows.
///
/// On disk this is a directory holding `manifest.json` and one gzip-compressed
/// Parquet segment per committed source file. Appending writes a new segment;
/// widening only raises the manifest's column count, so earlier segments are
/// never rewritten and are padded with [`FILL_VALUE`] when read.
///
/// One writer at a time; no locking is done here.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    manifest: Manifest,
    read_only: bool,
}

/// What a commit changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub rows: u64,
    /// Previous width, when the commit widened the store.
    pub widened_from: Option<usize>,
}

/// Identity of the source file a segment came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub file_name: String,
    pub digest: String,
}

impl Store {
    /// Open a store for appending, creating an empty one (zero rows, zero
    /// columns) if `path` does not exist or is an empty directory.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() || is_empty_dir(&root)? {
            fs::create_dir_all(root.join(SEGMENTS_DIR))
                .map_err(|e| DatasetError::storage(&root, format!("creating store: {e}")))?;
            let manifest = Manifest::default();
            manifest.save(&root)?;
            info!("Created empty dataset store at {}", root.display());
            return Ok(Self {
                root,
                manifest,
                read_only: false,
            });
        }

        let store = Self::open_existing(root, false)?;
        store.remove_stale_partials();
        Ok(store)
    }

    /// Open an existing store for reading only. Never creates anything.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_existing(path.as_ref().to_path_buf(), true)
    }

    fn open_existing(root: PathBuf, read_only: bool) -> Result<Self> {
        if !root.is_dir() {
            return Err(DatasetError::storage(&root, "not a store directory"));
        }
        let manifest = Manifest::load(&root)?;
        let segments = root.join(SEGMENTS_DIR);
        for entry in &manifest.segments {
            if !segments.join(&entry.file).is_file() {
                return Err(DatasetError::storage(
                    &root,
                    format!("segment {} is missing", entry.file),
                ));
            }
        }
        debug!(
            "Opened store {} ({} rows x {} columns, {} segments)",
            root.display(),
            manifest.rows,
            manifest.columns,
            manifest.segments.len()
        );
        Ok(Self {
            root,
            manifest,
            read_only,
        })
    }

    /// Partial segments left behind by a killed writer are never referenced.
    fn remove_stale_partials(&self) {
        let Ok(entries) = fs::read_dir(self.segments_dir()) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                warn!("Removing stale partial segment {}", path.display());
                let _ = fs::remove_file(&path);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    /// Number of rows.
    pub fn len(&self) -> u64 {
        self.manifest.rows
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.rows == 0
    }

    /// Current feature width.
    pub fn columns(&self) -> usize {
        self.manifest.columns
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn is_ingested(&self, source: &SourceIdentity) -> bool {
        self.manifest.is_ingested(&source.file_name, &source.digest)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(DatasetError::storage(&self.root, "store is opened read-only"));
        }
        Ok(())
    }

    // -- Write path --

    /// Start a segment for the rows of one source file. Nothing becomes
    /// visible until [`Store::commit`].
    ///
    /// The writer flushes a row group every `row_group_rows` rows, so memory
    /// held per segment does not grow with the source file.
    pub fn begin_segment(&self, source: &str, row_group_rows: usize) -> Result<SegmentWriter> {
        self.ensure_writable()?;
        let file_name = Manifest::segment_file_name(self.manifest.next_segment);
        let partial_path = self
            .segments_dir()
            .join(format!("{file_name}{PARTIAL_SUFFIX}"));
        let file = File::create(&partial_path)
            .map_err(|e| DatasetError::storage(&partial_path, format!("creating segment: {e}")))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::GZIP(GzipLevel::default()))
            .set_max_row_group_size(row_group_rows.max(1))
            .build();
        let schema = segment_schema();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .map_err(|e| DatasetError::storage(&partial_path, e))?;

        Ok(SegmentWriter {
            writer: Some(writer),
            schema,
            partial_path: Some(partial_path),
            file_name,
            source: source.to_string(),
            rows: 0,
            columns: None,
        })
    }

    /// Make a segment part of the store: widen first if the segment is wider
    /// than the store, then extend the row count. Both happen in a single
    /// manifest replacement.
    ///
    /// The segment file is published before the manifest is replaced. If the
    /// manifest write fails, the published file is unreferenced and the next
    /// commit reuses its name and overwrites it.
    pub fn commit(&mut self, mut segment: SegmentWriter, source: SourceIdentity) -> Result<CommitOutcome> {
        self.ensure_writable()?;
        segment.close()?;

        let mut next = self.manifest.clone();
        let columns = segment.columns.unwrap_or(0);
        let widened_from = (columns > next.columns).then_some(next.columns);
        if let Some(old) = widened_from {
            info!("Widening store from {old} to {columns} feature columns");
            next.columns = columns;
        }

        if segment.rows > 0 {
            let final_path = self.segments_dir().join(&segment.file_name);
            if let Some(partial) = &segment.partial_path {
                fs::rename(partial, &final_path).map_err(|e| {
                    DatasetError::storage(&final_path, format!("publishing segment: {e}"))
                })?;
            }
            segment.partial_path = None;
            next.segments.push(SegmentEntry {
                file: segment.file_name.clone(),
                source: segment.source.clone(),
                rows: segment.rows,
                columns,
            });
            next.rows += segment.rows;
            next.next_segment += 1;
        }
        next.ingested.insert(
            source.file_name,
            IngestedFile {
                digest: source.digest,
                rows: segment.rows,
            },
        );

        next.save(&self.root)?;
        self.manifest = next;

        Ok(CommitOutcome {
            rows: segment.rows,
            widened_from,
        })
    }

    // -- Read path --

    /// Read every row, padding narrower segments to the store width.
    pub fn read_all(&self) -> Result<StoredDataset> {
        let columns = self.manifest.columns;
        let rows = usize::try_from(self.manifest.rows)
            .map_err(|_| DatasetError::storage(&self.root, "store too large to load"))?;
        let mut out = StoredDataset {
            names: Vec::with_capacity(rows),
            labels: Vec::with_capacity(rows),
            features: Vec::with_capacity(rows * columns),
            columns,
        };
        for entry in &self.manifest.segments {
            self.read_segment(entry, &mut out)?;
        }
        Ok(out)
    }

    fn segment_batches(&self, entry: &SegmentEntry) -> Result<Vec<RecordBatch>> {
        let path = self.segments_dir().join(&entry.file);
        let file = File::open(&path).map_err(|e| DatasetError::storage(&path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| DatasetError::storage(&path, format!("reading segment metadata: {e}")))?
            .build()
            .map_err(|e| DatasetError::storage(&path, format!("building segment reader: {e}")))?;
        reader
            .map(|batch| batch.map_err(|e| DatasetError::storage(&path, e)))
            .collect()
    }

    fn read_segment(&self, entry: &SegmentEntry, out: &mut StoredDataset) -> Result<()> {
        let path = self.segments_dir().join(&entry.file);
        let bad = |msg: &str| DatasetError::storage(&path, msg);
        let pad = out.columns - entry.columns;
        let mut rows = 0u64;

        for batch in self.segment_batches(entry)? {
            let names = column(&batch, "name")
                .and_then(|c| c.as_string_opt::<i32>())
                .ok_or_else(|| bad("missing or invalid 'name' column"))?;
            let labels = column(&batch, "label")
                .and_then(|c| c.as_primitive_opt::<UInt8Type>())
                .ok_or_else(|| bad("missing or invalid 'label' column"))?;
            let features = column(&batch, "features")
                .and_then(|c| c.as_list_opt::<i32>())
                .ok_or_else(|| bad("missing or invalid 'features' column"))?;

            for row in 0..batch.num_rows() {
                let values = features.value(row);
                let values = values
                    .as_primitive_opt::<UInt16Type>()
                    .ok_or_else(|| bad("features are not u16"))?;
                if values.len() != entry.columns {
                    return Err(bad("feature row width disagrees with manifest"));
                }
                out.names.push(names.value(row).to_string());
                out.labels.push(labels.value(row));
                out.features.extend(values.values().iter().copied());
                out.features.extend(std::iter::repeat(FILL_VALUE).take(pad));
            }
            rows += batch.num_rows() as u64;
        }

        if rows != entry.rows {
            return Err(bad("segment row count disagrees with manifest"));
        }
        Ok(())
    }

    /// Render the first `limit` rows as a table.
    pub fn preview(&self, limit: usize) -> Result<String> {
        let mut batches = Vec::new();
        let mut remaining = limit;
        for entry in &self.manifest.segments {
            if remaining == 0 {
                break;
            }
            for batch in self.segment_batches(entry)? {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(batch.num_rows());
                batches.push(batch.slice(0, take));
                remaining -= take;
            }
        }
        let table = pretty_format_batches(&batches).map_err(|e| DatasetError::storage(&self.root, e))?;
        Ok(table.to_string())
    }

    /// Release the handle. Every write is already durable once `commit`
    /// returns, so this only drops in-memory state.
    pub fn close(self) -> Result<()> {
        debug!(
            "Closing store {} ({} rows x {} columns)",
            self.root.display(),
            self.manifest.rows,
            self.manifest.columns
        );
        Ok(())
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ArrayRef> {
    let idx = batch.schema().index_of(name).ok()?;
    Some(batch.column(idx))
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(path).map_err(|e| DatasetError::storage(path, e))?;
    Ok(entries.next().is_none())
}

// ---------------------------------------------------------------------------
// SegmentWriter – rows of one source file on their way into the store
// ---------------------------------------------------------------------------

/// Streams record batches into a partial segment file.
///
/// Dropping the writer without committing it deletes the partial file, so a
/// source file that fails half-way leaves no trace in the store.
pub struct SegmentWriter {
    writer: Option<ArrowWriter<File>>,
    schema: SchemaRef,
    partial_path: Option<PathBuf>,
    file_name: String,
    source: String,
    rows: u64,
    columns: Option<usize>,
}

impl SegmentWriter {
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns.unwrap_or(0)
    }

    /// Append a batch. All batches of one segment must share a width.
    pub fn write_batch(&mut self, batch: &SampleBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let path = self.partial_path.clone().unwrap_or_default();
        let width = *self.columns.get_or_insert(batch.width());
        if width != batch.width() {
            return Err(DatasetError::storage(
                &path,
                format!("batch width {} differs from segment width {width}", batch.width()),
            ));
        }

        let record_batch = to_record_batch(&self.schema, batch).map_err(|e| DatasetError::storage(&path, e))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DatasetError::storage(&path, "segment already closed"))?;
        writer
            .write(&record_batch)
            .map_err(|e| DatasetError::storage(&path, format!("writing segment: {e}")))?;
        self.rows += batch.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let path = self.partial_path.clone().unwrap_or_default();
            writer
                .close()
                .map_err(|e| DatasetError::storage(&path, format!("finishing segment: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        // Release the file handle before unlinking.
        drop(self.writer.take());
        if let Some(path) = self.partial_path.take() {
            debug!("Discarding uncommitted segment {}", path.display());
            let _ = fs::remove_file(path);
        }
    }
}

fn to_record_batch(schema: &SchemaRef, batch: &SampleBatch) -> std::result::Result<RecordBatch, arrow::error::ArrowError> {
    let names = StringArray::from_iter_values(batch.names.iter());
    let labels = UInt8Array::from(batch.labels.clone());

    let mut features = ListBuilder::with_capacity(UInt16Builder::with_capacity(batch.features.len()), batch.len());
    for i in 0..batch.len() {
        features.values().append_slice(batch.row(i));
        features.append(true);
    }

    RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(names), Arc::new(labels), Arc::new(features.finish())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BATCH_ROWS;
    use crate::data::model::Sample;
    use tempfile::tempdir;

    fn batch(stem: &str, rows: &[(u8, &[u16])]) -> SampleBatch {
        let mut b = SampleBatch::with_capacity(rows.len());
        for (i, (label, features)) in rows.iter().enumerate() {
            b.push(Sample {
                name: Sample::name_for(stem, i as i64),
                label: *label,
                features: features.to_vec(),
            });
        }
        b
    }

    fn identity(name: &str) -> SourceIdentity {
        SourceIdentity {
            file_name: name.to_string(),
            digest: format!("digest-of-{name}"),
        }
    }

    #[test]
    fn creates_empty_store() {
        let dir = tempdir().unwrap();
        let store = Store::open_or_create(dir.path().join("store")).unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.columns(), 0);
        assert!(store.read_all().unwrap().is_empty());
        store.close().unwrap();
    }

    #[test]
    fn commit_appends_and_reads_back() {
        let dir = tempdir().unwrap();
        let mut store = Store::open_or_create(dir.path().join("store")).unwrap();

        let mut seg = store.begin_segment("a.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("a", &[(1, &[1, 2]), (2, &[3, 4])])).unwrap();
        seg.write_batch(&batch("a", &[(3, &[5, 6])])).unwrap();
        let outcome = store.commit(seg, identity("a.csv")).unwrap();
        assert_eq!(outcome.rows, 3);
        assert_eq!(outcome.widened_from, Some(0));

        let ds = store.read_all().unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.columns, 2);
        assert_eq!(ds.labels, vec![1, 2, 3]);
        assert_eq!(ds.features, vec![1, 2, 3, 4, 5, 6]);
        assert!(store.preview(2).unwrap().contains("a_1"));
    }

    #[test]
    fn narrower_segment_does_not_shrink_store() {
        let dir = tempdir().unwrap();
        let mut store = Store::open_or_create(dir.path().join("store")).unwrap();

        let mut seg = store.begin_segment("wide.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("wide", &[(1, &[1, 2, 3])])).unwrap();
        store.commit(seg, identity("wide.csv")).unwrap();

        let mut seg = store.begin_segment("narrow.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("narrow", &[(2, &[9])])).unwrap();
        let outcome = store.commit(seg, identity("narrow.csv")).unwrap();
        assert_eq!(outcome.widened_from, None);
        assert_eq!(store.columns(), 3);

        let ds = store.read_all().unwrap();
        assert_eq!(ds.get(1).unwrap().features, &[9, FILL_VALUE, FILL_VALUE]);
    }

    #[test]
    fn dropped_segment_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let store = Store::open_or_create(dir.path().join("store")).unwrap();
        {
            let mut seg = store.begin_segment("a.csv", DEFAULT_BATCH_ROWS).unwrap();
            seg.write_batch(&batch("a", &[(1, &[1])])).unwrap();
        }
        let leftovers = fs::read_dir(dir.path().join("store").join(SEGMENTS_DIR))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let mut store = Store::open_or_create(&path).unwrap();
        let mut seg = store.begin_segment("a.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("a", &[(1, &[1])])).unwrap();
        store.commit(seg, identity("a.csv")).unwrap();
        store.close().unwrap();

        let store = Store::open_or_create(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_ingested(&identity("a.csv")));
        let reader = Store::open_read_only(&path).unwrap();
        assert!(reader.begin_segment("b.csv", DEFAULT_BATCH_ROWS).is_err());
        assert_eq!(reader.read_all().unwrap().names, vec!["a_0".to_string()]);
    }

    #[test]
    fn rejects_paths_that_are_not_stores() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "hello").unwrap();
        assert!(Store::open_or_create(&file).is_err());

        let other = dir.path().join("other");
        fs::create_dir(&other).unwrap();
        fs::write(other.join("data.bin"), "x").unwrap();
        let err = Store::open_or_create(&other).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StorageIo);

        assert!(Store::open_read_only(dir.path().join("missing")).is_err());
    }

    #[test]
    fn missing_segment_is_detected_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let mut store = Store::open_or_create(&path).unwrap();
        let mut seg = store.begin_segment("a.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("a", &[(1, &[1])])).unwrap();
        store.commit(seg, identity("a.csv")).unwrap();

        fs::remove_file(path.join(SEGMENTS_DIR).join(Manifest::segment_file_name(0))).unwrap();
        assert!(Store::open_or_create(&path).is_err());
    }
    #[test]
    fn small_row_groups_are_flushed_as_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let mut store = Store::open_or_create(&path).unwrap();

        let mut seg = store.begin_segment("a.csv", 2).unwrap();
        for _ in 0..3 {
            seg.write_batch(&batch("a", &[(1, &[1, 2]), (2, &[3, 4])])).unwrap();
        }
        store.commit(seg, identity("a.csv")).unwrap();

        let file = File::open(path.join(SEGMENTS_DIR).join(Manifest::segment_file_name(0))).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 3);
        assert_eq!(store.read_all().unwrap().len(), 6);
    }

    #[test]
    fn unreferenced_segment_is_overwritten_by_next_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let mut store = Store::open_or_create(&path).unwrap();

        // Left behind by a commit whose manifest write failed.
        let stray = path.join(SEGMENTS_DIR).join(Manifest::segment_file_name(0));
        fs::write(&stray, "not parquet").unwrap();

        let mut seg = store.begin_segment("a.csv", DEFAULT_BATCH_ROWS).unwrap();
        seg.write_batch(&batch("a", &[(7, &[1, 2])])).unwrap();
        store.commit(seg, identity("a.csv")).unwrap();

        let reopened = Store::open_read_only(&path).unwrap();
        let ds = reopened.read_all().unwrap();
        assert_eq!(ds.labels, vec![7]);
        assert_eq!(ds.features, vec![1, 2]);
    }
}
