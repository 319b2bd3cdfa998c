//! `/etc/hosts`-style rules: an IP address mapped to one or more hostnames.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::FilterError;
use crate::types::FilterListId;

/// The IP used when a list line is a bare hostname.
pub const UNSPECIFIED_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// A parsed hosts-file rule.
#[derive(Debug, Clone)]
pub struct HostRule {
    text: String,
    filter_list_id: FilterListId,
    ip: IpAddr,
    hostnames: Vec<String>,
}

impl PartialEq for HostRule {
    /// Text is presentation only: the snapshot format stores the IP and
    /// hostnames and reconstructs a canonical line, so identity must not
    /// depend on the original whitespace.
    fn eq(&self, other: &Self) -> bool {
        self.filter_list_id == other.filter_list_id
            && self.ip == other.ip
            && self.hostnames == other.hostnames
    }
}

impl Eq for HostRule {}

impl HostRule {
    /// Parse a hosts line: `IP hostname [hostname...]`, or a single bare
    /// hostname (implicit `0.0.0.0`).
    pub fn new(rule_text: &str, filter_list_id: FilterListId) -> Result<Self, FilterError> {
        let text = rule_text.trim();
        if text.is_empty() {
            return Err(FilterError::Syntax("empty rule".to_string()));
        }
        if text.starts_with('#') || text.starts_with('!') {
            return Err(FilterError::Syntax(format!("not a host rule: {text}")));
        }
        // Filter-list syntax cannot be a hosts line
        if text.contains("||") || text.contains('/') || text.contains('^') || text.contains('$') || text.contains('*') {
            return Err(FilterError::Syntax(format!("not a host rule: {text}")));
        }

        let mut parts = text.split_whitespace();
        let first = parts.next().unwrap();

        let (ip, hostnames) = match first.parse::<IpAddr>() {
            Ok(ip) => {
                let hostnames: Vec<String> = parts.map(parse_hostname).collect::<Result<_, _>>()?;
                if hostnames.is_empty() {
                    return Err(FilterError::Syntax(format!(
                        "no hostnames in the rule: {text}"
                    )));
                }
                (ip, hostnames)
            }
            Err(_) => {
                if parts.next().is_some() {
                    return Err(FilterError::Syntax(format!(
                        "invalid IP address: {first}"
                    )));
                }
                (UNSPECIFIED_IP, vec![parse_hostname(first)?])
            }
        };

        Ok(Self {
            text: text.to_string(),
            filter_list_id,
            ip,
            hostnames,
        })
    }

    /// Build a rule from already-validated parts, reconstructing a
    /// canonical text line. Used when decoding snapshots.
    pub(crate) fn from_parts(
        filter_list_id: FilterListId,
        ip: IpAddr,
        hostnames: Vec<String>,
    ) -> Self {
        let text = format!("{} {}", ip, hostnames.join(" "));
        Self {
            text,
            filter_list_id,
            ip,
            hostnames,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn filter_list_id(&self) -> FilterListId {
        self.filter_list_id
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    /// Exact hostname match against any of the rule's hostnames.
    pub fn matches(&self, hostname: &str) -> bool {
        self.hostnames.iter().any(|h| h == hostname)
    }
}

fn parse_hostname(token: &str) -> Result<String, FilterError> {
    let valid = !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_');
    if !valid {
        return Err(FilterError::Syntax(format!("invalid hostname: {token}")));
    }
    Ok(token.to_lowercase())
}
