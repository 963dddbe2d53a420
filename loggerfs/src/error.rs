use thiserror::Error;

/// Top-level error type for loggerfs.
///
/// Filesystem-adapter code (`fs.rs`) is the only place these get turned into
/// `libc` errno values; every other module returns this type and lets the
/// caller decide how fatal a given failure is (see spec.md §7).
#[derive(Debug, Error)]
pub enum LoggerFsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("connection pool error for {path}: {source}")]
    Pool {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("sql error: {0}")]
    Sql(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoggerFsError>;
