//! Error types for vendor calls and configuration.

use thiserror::Error;

/// Errors raised while talking to the vendor platform.
///
/// These never cross the adapter boundary; the adapter downgrades every one of
/// them to the operation's failure sentinel.
#[derive(Debug, Error)]
pub enum VendorError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// SOAP fault returned by the service
    #[error("vendor fault {code}: {message}")]
    Fault { code: String, message: String },

    /// Non-success HTTP status without a SOAP fault
    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    /// Malformed XML in a request or response
    #[error("XML error: {0}")]
    Xml(String),

    /// A required element was absent from a response
    #[error("missing element <{0}> in vendor response")]
    MissingElement(&'static str),

    /// A timestamp in a response could not be parsed
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        VendorError::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
