//! Error types for the Riemann adapter.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, raised at setup time.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bytes that do not parse as a Riemann message.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// An event that cannot be mapped between representations.
    #[error("translation error: {0}")]
    Translate(#[from] TranslateError),

    /// The stream framing is broken beyond recovery.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The sink refused an event.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The protocol family is neither `tcp` nor `udp`.
    #[error("no handler for protocol family: {0}")]
    UnsupportedFamily(String),

    /// The protocol string is not `family[:host:port]`.
    #[error("invalid protocol '{protocol}': {reason}")]
    InvalidProtocol { protocol: String, reason: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// A text metric that is not a number.
    #[error("metric '{0}' is not numeric")]
    NonNumericMetric(String),

    /// An attribute on the wire without a value.
    #[error("attribute '{0}' has no value")]
    MissingAttributeValue(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A length prefix above the configured limit.
    #[error("frame of {length} bytes exceeds limit of {limit} bytes")]
    TooLarge { length: usize, limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink cannot accept more events right now.
    #[error("sink is full")]
    Full,

    /// The sink has been closed.
    #[error("sink is closed")]
    Closed,
}
