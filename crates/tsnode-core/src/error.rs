use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tsnode setup: configuration loading and pattern compilation.
///
/// Resolution failures use [`crate::resolver::ResolveError`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}
