//! Canonical structured form of a URL request.

use crate::psl::effective_domain;
use crate::types::RequestType;
use crate::url::extract_hostname;

/// A request being matched. Built once by the caller, immutable afterwards.
///
/// The URL is kept twice: the lowercased copy drives the default
/// case-insensitive matching, the original feeds `$match-case` rules.
#[derive(Debug, Clone)]
pub struct Request {
    /// Original request URL.
    pub url: String,
    /// Lowercased copy of the URL.
    pub url_lower: String,
    /// Hostname from the URL authority, lowercase.
    pub hostname: String,
    /// Effective domain of `hostname`.
    pub domain: String,
    /// Hostname of the referrer URL, lowercase; empty when absent.
    pub source_hostname: String,
    /// Effective domain of `source_hostname`; empty when absent.
    pub source_domain: String,
    /// Request type bit.
    pub request_type: RequestType,
    /// True iff the source is present and its effective domain differs
    /// from the request's.
    pub third_party: bool,
    /// Set for synthetic hostname-only requests (DNS matching); regex
    /// rules then run against the bare hostname instead of the URL.
    pub is_hostname_request: bool,
}

impl Request {
    /// Build a request from a URL, an optional referrer URL (empty string
    /// for none) and a request type.
    pub fn new(url: &str, source_url: &str, request_type: RequestType) -> Self {
        let url_lower = url.to_lowercase();
        let hostname = extract_hostname(&url_lower).unwrap_or("").to_string();
        let domain = effective_domain(&hostname).to_string();

        let (source_hostname, source_domain) = if source_url.is_empty() {
            (String::new(), String::new())
        } else {
            let source_lower = source_url.to_lowercase();
            let sh = extract_hostname(&source_lower).unwrap_or("").to_string();
            let sd = effective_domain(&sh).to_string();
            (sh, sd)
        };

        let third_party = !source_hostname.is_empty() && source_domain != domain;

        Self {
            url: url.to_string(),
            url_lower,
            hostname,
            domain,
            source_hostname,
            source_domain,
            request_type,
            third_party,
            is_hostname_request: false,
        }
    }

    /// Build the synthetic request the DNS engine matches host-level
    /// network rules against.
    pub fn for_hostname(hostname: &str) -> Self {
        let url = format!("http://{}/", hostname.to_lowercase());
        let mut request = Self::new(&url, "", RequestType::DOCUMENT);
        request.is_hostname_request = true;
        request
    }
}
