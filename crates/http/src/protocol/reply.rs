//! Outbound reply representation and serialization.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::request::Header;

const INIT_HEAD_SIZE: usize = 1024;

/// Response statuses known to the connection core.
///
/// Two of these never reach the wire: [`StatusCode::SwitchingProtocols`]
/// serializes normally (the `101` response) but additionally switches the
/// connection into WebSocket mode, and [`StatusCode::DownloadFile`] is a
/// pure in-band marker telling the connection to stream a file whose path
/// and attachment name are carried in the reply content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    SwitchingProtocols,
    Ok,
    Created,
    Accepted,
    NoContent,
    MultipleChoices,
    MovedPermanently,
    MovedTemporarily,
    NotModified,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    DownloadFile,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NoContent => 204,
            StatusCode::MultipleChoices => 300,
            StatusCode::MovedPermanently => 301,
            StatusCode::MovedTemporarily => 302,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::BadGateway => 502,
            // the marker never serializes; the value only shows up in
            // access-log lines for download requests
            StatusCode::DownloadFile => 504,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MultipleChoices => "Multiple Choices",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::DownloadFile => "Internal Server Error",
        }
    }
}

/// The handler-produced response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<Header>,
    pub content: Vec<u8>,
    /// Overrides the `%h` host field in access-log lines when non-empty.
    pub origin_host: String,
}

impl Default for Reply {
    fn default() -> Self {
        Reply {
            status: StatusCode::Ok,
            headers: Vec::new(),
            content: Vec::new(),
            origin_host: String::new(),
        }
    }
}

impl Reply {
    /// Resets the reply for reuse across requests on one connection.
    pub fn reset(&mut self) {
        self.status = StatusCode::Ok;
        self.headers.clear();
        self.content.clear();
        self.origin_host.clear();
    }

    /// A canned response for a standard status code: a small HTML body with
    /// matching `Content-Length` and `Content-Type` headers.
    pub fn stock_reply(status: StatusCode) -> Reply {
        let mut reply = Reply { status, ..Default::default() };
        reply.content = stock_body(status).into_bytes();
        reply.add_header("Content-Length", &reply.content.len().to_string());
        reply.add_header("Content-Type", "text/html");
        reply
    }

    /// Sets a header, replacing any existing value of the same name.
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|h| h.name.eq_ignore_ascii_case(name)) {
            Some(header) => value.clone_into(&mut header.value),
            None => self.headers.push(Header { name: name.to_string(), value: value.to_string() }),
        }
    }

    /// Sets a header only when absent, so the request handler keeps the
    /// last word.
    pub fn add_header_if_absent(&mut self, name: &str, value: &str) {
        if self.header(name).is_none() {
            self.headers.push(Header { name: name.to_string(), value: value.to_string() });
        }
    }

    /// Convenience: sets the body along with `Content-Length` and
    /// `Content-Type` headers.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>, content_type: &str) {
        self.content = content.into();
        self.add_header("Content-Length", &self.content.len().to_string());
        self.add_header("Content-Type", content_type);
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Serializes the reply for the given request method. HEAD responses
    /// carry the full header block but no body.
    pub fn to_bytes(&self, method: &str) -> Bytes {
        let mut dst = BytesMut::with_capacity(INIT_HEAD_SIZE + self.content.len());
        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(self.status.code().to_string().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(self.status.reason().as_bytes());
        dst.put_slice(b"\r\n");
        for header in &self.headers {
            dst.put_slice(header.name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(header.value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        if method != "HEAD" {
            dst.put_slice(&self.content);
        }
        dst.freeze()
    }
}

fn stock_body(status: StatusCode) -> String {
    match status {
        StatusCode::Ok | StatusCode::NoContent | StatusCode::NotModified => String::new(),
        status => format!(
            "<html><head><title>{reason}</title></head><body><h1>{code} {reason}</h1></body></html>",
            code = status.code(),
            reason = status.reason(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_reply_serializes_with_status_line() {
        let reply = Reply::stock_reply(StatusCode::BadRequest);
        let bytes = reply.to_bytes("GET");
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.ends_with("</html>"));
        let length: usize = reply.header("Content-Length").unwrap().parse().unwrap();
        assert_eq!(length, reply.content.len());
    }

    #[test]
    fn head_omits_the_body() {
        let mut reply = Reply::default();
        reply.set_content("abc", "text/plain");
        let bytes = reply.to_bytes("HEAD");
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.ends_with("\r\n\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn add_header_replaces_existing() {
        let mut reply = Reply::default();
        reply.add_header("Content-Length", "0");
        reply.add_header("Content-Length", "42");
        assert_eq!(reply.header("content-length"), Some("42"));
        assert_eq!(reply.headers.len(), 1);
    }

    #[test]
    fn add_header_if_absent_keeps_existing() {
        let mut reply = Reply::default();
        reply.add_header("Connection", "close");
        reply.add_header_if_absent("Connection", "Keep-Alive");
        assert_eq!(reply.header("Connection"), Some("close"));
    }

    #[test]
    fn marker_statuses_have_log_codes() {
        assert_eq!(StatusCode::SwitchingProtocols.code(), 101);
        assert_eq!(StatusCode::DownloadFile.code(), 504);
    }
}
