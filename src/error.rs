use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("file has no header row")]
    MissingHeader,

    #[error("unknown encoding label `{0}`")]
    UnknownEncoding(String),

    #[error("unknown comparison operator `{0}` (expected one of = < > <= >=)")]
    UnknownOperator(String),

    #[error("no column named or numbered `{0}`")]
    UnknownColumn(String),

    #[error("pre-processing directive on line {line}: {message}")]
    Directive { line: u64, message: String },
}

impl TableError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TableError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
