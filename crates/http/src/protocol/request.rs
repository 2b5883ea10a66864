//! Inbound request representation.

/// A single request header.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A fully read HTTP request, as handed to the request handler.
///
/// Requests are read completely (head and body) before dispatch; there is
/// no streaming body access. The endpoint fields are populated by the
/// connection before the handler runs, with any IPv4-mapped IPv6 prefix
/// already stripped.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub http_version_major: u8,
    pub http_version_minor: u8,
    pub headers: Vec<Header>,
    /// The request body, empty unless a `Content-Length` said otherwise.
    pub content: Vec<u8>,
    /// Whether the client asked for a persistent connection.
    pub keep_alive: bool,
    pub remote_address: String,
    pub remote_port: String,
    pub local_address: String,
    pub local_port: String,
}

impl Request {
    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = Request {
            headers: vec![Header { name: "User-Agent".into(), value: "curl/8".into() }],
            ..Default::default()
        };
        assert_eq!(request.header("user-agent"), Some("curl/8"));
        assert_eq!(request.header("USER-AGENT"), Some("curl/8"));
        assert_eq!(request.header("referer"), None);
    }
}
