//! IPv4 ranges and blacklist line parsing.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::common::error::StoreError;

/// `<range> [# reason]`; group 1 is the range, group 3 the reason.
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9\.\-\/]+)\s*(#\s*(.*\S)?\s*)?$").expect("line pattern is a valid regex")
});

/// Inclusive range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    pub start: u32,
    pub end: u32,
}

impl IpRange {
    pub fn single(ip: Ipv4Addr) -> Self {
        let ip = u32::from(ip);
        Self { start: ip, end: ip }
    }

    /// Parse `a.b.c.d`, `a.b.c.d/n` or `a.b.c.d-e.f.g.h`.
    pub fn parse(range: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidRange {
            range: range.to_string(),
        };
        let range = range.trim();

        if let Some((network, bits)) = range.split_once('/') {
            let network: Ipv4Addr = network.trim().parse().map_err(|_| invalid())?;
            let bits: u32 = bits.trim().parse().map_err(|_| invalid())?;
            if bits > 32 {
                return Err(invalid());
            }
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            let start = u32::from(network) & mask;
            return Ok(Self {
                start,
                end: start | !mask,
            });
        }

        if let Some((first, last)) = range.split_once('-') {
            let start: Ipv4Addr = first.trim().parse().map_err(|_| invalid())?;
            let end: Ipv4Addr = last.trim().parse().map_err(|_| invalid())?;
            let (start, end) = (u32::from(start), u32::from(end));
            if start > end {
                return Err(invalid());
            }
            return Ok(Self { start, end });
        }

        let ip: Ipv4Addr = range.parse().map_err(|_| invalid())?;
        Ok(Self::single(ip))
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", Ipv4Addr::from(self.start))
        } else {
            write!(f, "{}-{}", Ipv4Addr::from(self.start), Ipv4Addr::from(self.end))
        }
    }
}

/// Split a list line into its range text and optional trailing `# reason`.
///
/// Returns `None` for blank lines, comment-only lines and anything else that
/// does not look like a range.
pub fn parse_line(line: &str) -> Option<(&str, Option<&str>)> {
    let captures = LINE_PATTERN.captures(line).ok()??;
    let range = captures.get(1)?.as_str().trim();
    let reason = captures
        .get(3)
        .map(|m| m.as_str().trim())
        .filter(|reason| !reason.is_empty());
    Some((range, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(text: &str) -> u32 {
        u32::from(text.parse::<Ipv4Addr>().unwrap())
    }

    #[test]
    fn test_parse_single_ip() {
        let range = IpRange::parse("1.2.3.4").unwrap();
        assert_eq!(range.start, ip("1.2.3.4"));
        assert_eq!(range.end, ip("1.2.3.4"));
    }

    #[test]
    fn test_parse_cidr_masks_host_bits() {
        let range = IpRange::parse("1.2.3.77/24").unwrap();
        assert_eq!(range.start, ip("1.2.3.0"));
        assert_eq!(range.end, ip("1.2.3.255"));

        let everything = IpRange::parse("0.0.0.0/0").unwrap();
        assert_eq!((everything.start, everything.end), (0, u32::MAX));
    }

    #[test]
    fn test_parse_dash_range() {
        let range = IpRange::parse("10.0.0.1-10.0.0.9").unwrap();
        assert_eq!((range.start, range.end), (ip("10.0.0.1"), ip("10.0.0.9")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for range in ["1.2.3", "1.2.3.4/33", "10.0.0.9-10.0.0.1", "256.0.0.1", "1.2.3.4/", ""] {
            assert!(IpRange::parse(range).is_err(), "{} should be rejected", range);
        }
    }

    #[test]
    fn test_parse_line_with_reason() {
        assert_eq!(
            parse_line("1.2.3.0/24 # suspicious"),
            Some(("1.2.3.0/24", Some("suspicious")))
        );
        assert_eq!(
            parse_line("  5.6.7.8   #   hosting provider  "),
            Some(("5.6.7.8", Some("hosting provider")))
        );
    }

    #[test]
    fn test_parse_line_without_reason() {
        assert_eq!(parse_line("5.6.7.8"), Some(("5.6.7.8", None)));
        assert_eq!(parse_line("5.6.7.8 #"), Some(("5.6.7.8", None)));
        assert_eq!(parse_line("5.6.7.8#   "), Some(("5.6.7.8", None)));
    }

    #[test]
    fn test_parse_line_skips_non_ranges() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# just a comment"), None);
        assert_eq!(parse_line("example.com"), None);
    }
}
