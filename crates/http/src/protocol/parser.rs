//! Incremental HTTP request parsing.
//!
//! The parser operates on the connection's accumulated read buffer and
//! reports a ternary outcome: a complete request (with the number of bytes
//! it occupied, so the caller can advance the buffer past it), a need for
//! more bytes, or a malformed head. Bodies are gathered by `Content-Length`
//! only; requests are handed out fully read.

use crate::protocol::error::ParseError;
use crate::protocol::request::{Header, Request};

const MAX_HEADERS: usize = 64;

/// Outcome of a parse attempt over the buffered bytes.
#[derive(Debug)]
pub enum ParseResult {
    /// A full request (head and body) is buffered. `consumed` is its total
    /// size in bytes; anything beyond it belongs to the next request.
    Complete { request: Request, consumed: usize },
    /// The buffer holds a valid prefix of a request; read more.
    Partial,
    /// The buffer can never become a valid request.
    Malformed(ParseError),
}

/// Request parser, reset before each request on a connection.
#[derive(Debug, Default)]
pub struct RequestParser;

impl RequestParser {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resets parser state between requests. The parser re-examines the
    /// buffer from the start on every call, so this is currently a no-op
    /// kept for interface stability.
    pub fn reset(&mut self) {}

    /// Attempts to parse one complete request from `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);

        let head_len = match parsed.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return ParseResult::Partial,
            Err(httparse::Error::TooManyHeaders) => {
                return ParseResult::Malformed(ParseError::TooManyHeaders { max_num: MAX_HEADERS })
            }
            Err(e) => return ParseResult::Malformed(ParseError::invalid_head(e)),
        };

        let mut request = Request {
            method: parsed.method.unwrap_or_default().to_string(),
            uri: parsed.path.unwrap_or_default().to_string(),
            http_version_major: 1,
            http_version_minor: parsed.version.unwrap_or(1),
            ..Default::default()
        };
        request.headers = parsed
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.to_string(),
                value: String::from_utf8_lossy(h.value).into_owned(),
            })
            .collect();

        let content_length = match request.header("Content-Length") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    return ParseResult::Malformed(ParseError::invalid_content_length(value))
                }
            },
            None => 0,
        };

        if buf.len() < head_len + content_length {
            return ParseResult::Partial;
        }
        request.content = buf[head_len..head_len + content_length].to_vec();

        ParseResult::Complete { request, consumed: head_len + content_length }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> ParseResult {
        RequestParser::new().parse(bytes)
    }

    #[test]
    fn complete_request_without_body() {
        let bytes = b"GET /path?x=1 HTTP/1.1\r\nHost: h\r\nConnection: Keep-Alive\r\n\r\n";
        match parse(bytes) {
            ParseResult::Complete { request, consumed } => {
                assert_eq!(consumed, bytes.len());
                assert_eq!(request.method, "GET");
                assert_eq!(request.uri, "/path?x=1");
                assert_eq!(request.http_version_major, 1);
                assert_eq!(request.http_version_minor, 1);
                assert_eq!(request.header("connection"), Some("Keep-Alive"));
                assert!(request.content.is_empty());
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn complete_request_with_body_and_trailing_bytes() {
        let bytes = b"POST /submit HTTP/1.1\r\nContent-Length: 4\r\n\r\nbodyGET /next";
        match parse(bytes) {
            ParseResult::Complete { request, consumed } => {
                assert_eq!(request.content, b"body");
                // the pipelined tail is not consumed
                assert_eq!(&bytes[consumed..], b"GET /next");
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(matches!(parse(b"GET / HTTP/1.1\r\nHost:"), ParseResult::Partial));
    }

    #[test]
    fn partial_body_needs_more() {
        let bytes = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(parse(bytes), ParseResult::Partial));
    }

    #[test]
    fn malformed_head_is_rejected() {
        assert!(matches!(
            parse(b"NOT HTTP\r\n\r\n"),
            ParseResult::Malformed(ParseError::InvalidHead { .. })
        ));
    }

    #[test]
    fn malformed_content_length_is_rejected() {
        let bytes = b"POST / HTTP/1.1\r\nContent-Length: banana\r\n\r\n";
        assert!(matches!(
            parse(bytes),
            ParseResult::Malformed(ParseError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn http_10_minor_version() {
        let bytes = b"GET / HTTP/1.0\r\n\r\n";
        match parse(bytes) {
            ParseResult::Complete { request, .. } => {
                assert_eq!(request.http_version_minor, 0);
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }
}
