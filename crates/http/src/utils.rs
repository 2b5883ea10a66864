//! Utility functions used internally by the connection core.

use std::time::SystemTime;

/// Strips the IPv4-mapped IPv6 prefix so dual-stack listeners report plain
/// IPv4 addresses.
pub(crate) fn strip_ipv4_mapped(address: &str) -> &str {
    address.strip_prefix("::ffff:").unwrap_or(address)
}

/// Formats a timestamp as an RFC 7231 HTTP-date, for `Date` and
/// `Last-Modified` headers.
pub(crate) fn http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn mapped_prefix_is_stripped() {
        assert_eq!(strip_ipv4_mapped("::ffff:192.168.1.2"), "192.168.1.2");
        assert_eq!(strip_ipv4_mapped("192.168.1.2"), "192.168.1.2");
        assert_eq!(strip_ipv4_mapped("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn http_date_round_trips() {
        for secs in [0u64, 1, 784_111_777, 2_000_000_000] {
            let time = UNIX_EPOCH + Duration::from_secs(secs);
            let formatted = http_date(time);
            assert_eq!(httpdate::parse_http_date(&formatted).unwrap(), time);
        }
    }

    #[test]
    fn http_date_shape() {
        let time = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }
}
