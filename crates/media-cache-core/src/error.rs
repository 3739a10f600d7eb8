use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Classification for {0} sets signals but names no analyzed feature")]
    UnanalyzedRecord(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of an external collaborator (decoder or classifier) on a single file.
///
/// These never abort a scan: the file is logged, counted and left unanalyzed.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("classifier failed: {0}")]
    Classifier(String),
}
