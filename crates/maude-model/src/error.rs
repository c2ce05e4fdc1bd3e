use std::path::PathBuf;
use thiserror::Error;

/// A batch-links line that looked like a URL but yielded no identifier.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("line {line}: no MDRFOI__ID in {url}")]
    MissingId { line: usize, url: String },

    #[error("line {line}: invalid URL: {source}")]
    InvalidUrl {
        line: usize,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input file '{}' not found; provide a text file with one FDA MAUDE URL per line", .0.display())]
    InputNotFound(PathBuf),

    #[error("no FDA MAUDE URL file found in {}; supported patterns: {}", .0.display(), .1.join(", "))]
    NoInputDetected(PathBuf, Vec<&'static str>),

    #[error("no valid MDRFOI__ID values found in {}", .0.display())]
    NoIdentifiers(PathBuf),

    #[error("extraction failed: no records were retrieved")]
    NothingExtracted,
}
