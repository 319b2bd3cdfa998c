//! Effective-domain (eTLD+1) heuristic and hostname suffix walking.
//!
//! No public-suffix list is embedded. The registrable domain is
//! approximated as the rightmost two labels, or three when the last two
//! labels form a known two-level TLD (`co.uk`, `com.au`, ...). This is the
//! same fallback the matching layer was designed around; third-party
//! classification only needs both sides of a request to agree.

/// Registries that sell names under a second-level label; the heuristic
/// keeps three labels for these. Sorted for readability, not lookup.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "ac.jp", "ac.uk", "co.in", "co.jp", "co.kr", "co.nz", "co.uk", "co.za",
    "com.au", "com.br", "com.cn", "com.hk", "com.mx", "com.tw", "gov.au",
    "gov.uk", "ne.jp", "net.au", "net.nz", "or.jp", "org.au", "org.uk",
];

/// Get the effective domain (registrable portion) of a hostname.
///
/// The input is expected to be lowercase; returns a suffix slice of it.
pub fn effective_domain(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    let n = host.split('.').count();
    if n <= 2 {
        return host;
    }

    // Index of the second-to-last label start
    let mut starts = Vec::with_capacity(n);
    starts.push(0);
    for (i, b) in host.bytes().enumerate() {
        if b == b'.' {
            starts.push(i + 1);
        }
    }

    let last_two = &host[starts[n - 2]..];
    if COMMON_TWO_PART_TLDS.contains(&last_two) {
        &host[starts[n - 3]..]
    } else {
        last_two
    }
}

/// Get the parent domain (strip the leftmost label).
#[inline]
pub fn parent_domain(host: &str) -> Option<&str> {
    let parent = &host[host.find('.')? + 1..];
    (!parent.is_empty()).then_some(parent)
}

/// Iterator over hostname suffixes, from the full hostname down to (and
/// including) its effective domain.
pub struct SuffixIter<'a> {
    current: Option<&'a str>,
    stop_len: usize,
}

impl<'a> Iterator for SuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = match parent_domain(result) {
            Some(parent) if parent.len() >= self.stop_len => Some(parent),
            _ => None,
        };
        Some(result)
    }
}

/// Walk hostname suffixes from most specific to the effective domain.
pub fn walk_suffixes(host: &str) -> SuffixIter<'_> {
    SuffixIter {
        current: if host.is_empty() { None } else { Some(host) },
        stop_len: effective_domain(host).len(),
    }
}
