//! Error types for request parsing.

use thiserror::Error;

/// Why an inbound byte sequence was rejected as malformed.
///
/// A malformed request is answered with a `400 Bad Request` stock reply and
/// the connection is closed once that reply is on the wire.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The request line or header block is not valid HTTP
    #[error("invalid request head: {reason}")]
    InvalidHead { reason: String },

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Number of headers exceeds the maximum allowed
    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },
}

impl ParseError {
    /// Creates a new InvalidHead error
    pub fn invalid_head<S: ToString>(reason: S) -> Self {
        Self::InvalidHead { reason: reason.to_string() }
    }

    /// Creates a new InvalidContentLength error
    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }
}
