//! HTTP protocol types for the connection core.
//!
//! # Components
//!
//! - [`Request`]: a fully read inbound request, as handed to the request
//!   handler.
//! - [`Reply`] / [`StatusCode`]: the handler-produced response, including
//!   the in-band marker statuses ([`StatusCode::SwitchingProtocols`],
//!   [`StatusCode::DownloadFile`]) that steer the connection instead of
//!   being sent to the wire.
//! - [`RequestParser`]: incremental request parsing with a ternary outcome
//!   (complete, need-more, malformed).
//! - [`ParseError`]: why a buffer was rejected as malformed.

mod error;
mod parser;
mod reply;
mod request;

pub use error::ParseError;
pub use parser::{ParseResult, RequestParser};
pub use reply::{Reply, StatusCode};
pub use request::{Header, Request};
