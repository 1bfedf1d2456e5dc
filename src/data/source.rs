use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use sha2::{Digest, Sha256};

use super::model::Sample;
use crate::config::ValueBounds;
use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// Source discovery
// ---------------------------------------------------------------------------

/// List the `.csv` files directly inside `dir`, sorted by file name so that
/// repeated runs on one machine append in the same order.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| DatasetError::SourceIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| DatasetError::SourceIo {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// File name without its extension; used as the identifier prefix.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Hex SHA-256 of the file's bytes, streamed.
pub fn file_digest(path: &Path) -> Result<String> {
    let io_err = |source| DatasetError::SourceIo {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

// ---------------------------------------------------------------------------
// SampleReader – streaming, capped, typed reader for one per-game CSV
// ---------------------------------------------------------------------------

/// Iterates the kept rows of one headerless per-game CSV.
///
/// Row layout: `row_index, label, feature_0, ..., feature_n`.
/// Reading stops at the first row whose index is greater than `row_cap`;
/// that row and everything after it are dropped.
pub struct SampleReader {
    records: csv::StringRecordsIntoIter<File>,
    stem: String,
    row_cap: i64,
    bounds: ValueBounds,
    line: u64,
    done: bool,
}

impl SampleReader {
    pub fn open(path: &Path, row_cap: i64, bounds: ValueBounds) -> Result<Self> {
        let file = File::open(path).map_err(|source| DatasetError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(file);

        Ok(Self {
            records: reader.into_records(),
            stem: file_stem(path),
            row_cap,
            bounds,
            line: 0,
            done: false,
        })
    }

    fn parse(&self, record: &StringRecord) -> Result<Option<Sample>> {
        if record.len() < 2 {
            return Err(DatasetError::MissingColumns {
                row: self.line,
                found: record.len(),
            });
        }

        let row_index: i64 = coerce(record, 0, self.line, "i64 row index", i64::MAX)?;
        if row_index > self.row_cap {
            return Ok(None);
        }

        let label: u8 = coerce(record, 1, self.line, "u8 label", self.bounds.label_max)?;
        let features = (2..record.len())
            .map(|col| coerce(record, col, self.line, "u16 feature", self.bounds.feature_max))
            .collect::<Result<Vec<u16>>>()?;

        Ok(Some(Sample {
            name: Sample::name_for(&self.stem, row_index),
            label,
            features,
        }))
    }
}

impl Iterator for SampleReader {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };
        let parsed = self.parse(&record);
        self.line += 1;
        match parsed {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Parse cell `col` as an integer and check it against `[0 or MIN, max]`.
fn coerce<T>(record: &StringRecord, col: usize, row: u64, expected: &'static str, max: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let raw = record.get(col).unwrap_or("");
    let err = || DatasetError::TypeCoercion {
        row,
        column: col,
        value: raw.to_string(),
        expected,
    };
    let value: T = raw.parse().map_err(|_| err())?;
    if value > max {
        return Err(err());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn read_all(path: &Path, cap: i64, bounds: ValueBounds) -> Result<Vec<Sample>> {
        SampleReader::open(path, cap, bounds)?.collect()
    }

    #[test]
    fn parses_rows_and_builds_names() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "game42.csv", "6,1,10,20\n7,2,11,21\n");

        let samples = read_all(&path, 1000, ValueBounds::default()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].name, "game42_7");
        assert_eq!(samples[1].label, 2);
        assert_eq!(samples[1].features, vec![11, 21]);
    }

    #[test]
    fn stops_at_first_row_past_cap() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "g.csv", "0,1,1\n5,1,1\n6,1,1\n2,1,1\n");

        let samples = read_all(&path, 5, ValueBounds::default()).unwrap();
        let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["g_0", "g_5"]);
    }

    #[test]
    fn rejects_out_of_range_and_non_numeric_values() {
        let dir = tempdir().unwrap();
        let big_label = write(dir.path(), "a.csv", "0,256,1\n");
        let neg_feature = write(dir.path(), "b.csv", "0,1,-1\n");
        let text_label = write(dir.path(), "c.csv", "0,high,1\n");

        for path in [big_label, neg_feature, text_label] {
            let err = read_all(&path, 1000, ValueBounds::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeCoercion, "{}", path.display());
        }
    }

    #[test]
    fn honours_tighter_bounds() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "0,11,1\n");
        let bounds = ValueBounds {
            label_max: 10,
            feature_max: u16::MAX,
        };
        assert!(read_all(&path, 1000, bounds).is_err());
    }

    #[test]
    fn ragged_and_short_rows_are_malformed() {
        let dir = tempdir().unwrap();
        let ragged = write(dir.path(), "a.csv", "0,1,1,1\n1,1,1\n");
        let short = write(dir.path(), "b.csv", "0\n");

        for path in [ragged, short] {
            let err = read_all(&path, 1000, ValueBounds::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed);
        }
    }

    #[test]
    fn lists_only_csv_files_sorted() {
        let dir = tempdir().unwrap();
        write(dir.path(), "b.csv", "");
        write(dir.path(), "a.CSV", "");
        write(dir.path(), "notes.txt", "");
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let files = list_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| file_stem(p)).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn digest_changes_with_content() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "0,1,1\n");
        let first = file_digest(&path).unwrap();
        assert_eq!(first.len(), 64);
        write(dir.path(), "a.csv", "0,1,2\n");
        assert_ne!(first, file_digest(&path).unwrap());
    }
}
