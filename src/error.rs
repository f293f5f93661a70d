//! Error types for `attempt-throttle`.
//!
//! The limiter itself never fails. These cover the surfaces around it:
//! loading config, parsing replay input and encoding metrics.

use std::path::PathBuf;

/// Problems with a limiter configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Problems with a line of replay input.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("line {line}: invalid timestamp {value:?}")]
    BadTimestamp { line: usize, value: String },

    #[error("line {line}: missing key")]
    MissingKey { line: usize },

    /// Timestamps must never go backwards.
    #[error("line {line}: timestamp {got} is before previous timestamp {previous}")]
    NonMonotonic { line: usize, previous: u64, got: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics encode error: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("metrics output is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}
