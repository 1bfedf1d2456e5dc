use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// DatasetError – everything the data layer can fail with
// ---------------------------------------------------------------------------

/// Errors raised while building or reading a dataset store.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The store is missing, corrupt, shape-incompatible or could not be written.
    #[error("store {}: {message}", .path.display())]
    StorageIo { path: PathBuf, message: String },

    /// A CSV cell does not fit the numeric type of its column.
    #[error("row {row}, column {column}: '{value}' is not a valid {expected}")]
    TypeCoercion {
        row: u64,
        column: usize,
        value: String,
        expected: &'static str,
    },

    /// A CSV row is too short to hold a row index and a label.
    #[error("row {row}: expected at least 2 columns, found {found}")]
    MissingColumns { row: u64, found: usize },

    /// The CSV itself is malformed (ragged rows, bad quoting, ...).
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Reading a source file failed.
    #[error("reading {}: {source}", .path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any error raised while processing a single source file.
    #[error("{}: {source}", .file.display())]
    PartialFile {
        file: PathBuf,
        #[source]
        source: Box<DatasetError>,
    },
}

pub type Result<T, E = DatasetError> = std::result::Result<T, E>;

impl DatasetError {
    pub fn storage(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        DatasetError::StorageIo {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is confined to one source file and must not abort
    /// the rest of the batch.
    pub fn is_file_local(&self) -> bool {
        match self {
            DatasetError::TypeCoercion { .. }
            | DatasetError::MissingColumns { .. }
            | DatasetError::Csv(_)
            | DatasetError::SourceIo { .. } => true,
            DatasetError::PartialFile { source, .. } => source.is_file_local(),
            DatasetError::StorageIo { .. } => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DatasetError::StorageIo { .. } => ErrorKind::StorageIo,
            DatasetError::TypeCoercion { .. } => ErrorKind::TypeCoercion,
            DatasetError::MissingColumns { .. } | DatasetError::Csv(_) => ErrorKind::Malformed,
            DatasetError::SourceIo { .. } => ErrorKind::SourceIo,
            DatasetError::PartialFile { source, .. } => source.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind – flat classification used in ingest reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StorageIo,
    TypeCoercion,
    Malformed,
    SourceIo,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::StorageIo => "storage I/O",
            ErrorKind::TypeCoercion => "type coercion",
            ErrorKind::Malformed => "malformed CSV",
            ErrorKind::SourceIo => "source I/O",
        };
        f.write_str(s)
    }
}
