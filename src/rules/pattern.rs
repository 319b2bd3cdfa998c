//! Compiled matchers for network-rule patterns.
//!
//! Each pattern is classified once at parse time into the cheapest matcher
//! that expresses it. `^` in a pattern matches any byte outside
//! `[a-zA-Z0-9_.%-]`; a trailing `^` also matches end-of-input. `*` matches
//! any run of bytes and is applied left-to-right without backtracking.

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::warn;

use crate::url::{get_host_position, is_separator};

/// Compiled form of a network-rule pattern.
///
/// Literal variants hold lowercased text unless the rule is `$match-case`;
/// the caller passes the matching URL in the corresponding case.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    /// Substring search anywhere in the URL.
    Plain(String),
    /// `|prefix` - must match at the start of the URL.
    LeftAnchored(String),
    /// `suffix|` - must match ending at the end of the URL.
    RightAnchored(String),
    /// `||body` - must match starting at the host start or right after a
    /// dot inside the host.
    AnchoredHost(String),
    /// Pattern containing `*`, or carrying both end anchors.
    Wildcard {
        parts: Vec<String>,
        left_anchor: bool,
        right_anchor: bool,
        host_anchor: bool,
    },
    /// `/regex/` - compiled on first use.
    Regex {
        source: String,
        compiled: OnceCell<Option<Regex>>,
    },
}

/// True for `/.../` patterns (the whole pattern is a regex).
#[inline]
pub fn is_regex_pattern(pattern: &str) -> bool {
    pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/')
}

impl CompiledMatcher {
    /// Classify and compile a pattern.
    pub fn compile(pattern: &str, match_case: bool) -> Self {
        if is_regex_pattern(pattern) {
            return Self::Regex {
                source: pattern[1..pattern.len() - 1].to_string(),
                compiled: OnceCell::new(),
            };
        }

        let text = if match_case {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        };

        let mut body = text.as_str();
        let host_anchor = body.starts_with("||");
        if host_anchor {
            body = &body[2..];
        }
        let left_anchor = !host_anchor && body.starts_with('|');
        if left_anchor {
            body = &body[1..];
        }
        let right_anchor = body.ends_with('|');
        if right_anchor {
            body = &body[..body.len() - 1];
        }

        if body.contains('*') || (right_anchor && (host_anchor || left_anchor)) {
            Self::Wildcard {
                parts: body.split('*').map(str::to_string).collect(),
                left_anchor,
                right_anchor,
                host_anchor,
            }
        } else if host_anchor {
            Self::AnchoredHost(body.to_string())
        } else if left_anchor {
            Self::LeftAnchored(body.to_string())
        } else if right_anchor {
            Self::RightAnchored(body.to_string())
        } else {
            Self::Plain(body.to_string())
        }
    }

    /// Match against a URL (already in the case the rule expects).
    pub fn matches(&self, url: &str) -> bool {
        let bytes = url.as_bytes();
        match self {
            Self::Plain(pat) => find_at_or_after(bytes, 0, pat.as_bytes()).is_some(),
            Self::LeftAnchored(pat) => match_at(bytes, 0, pat.as_bytes()).is_some(),
            Self::RightAnchored(pat) => match_tail_at_end(bytes, 0, pat.as_bytes()),
            Self::AnchoredHost(pat) => host_starts(url)
                .into_iter()
                .any(|pos| match_at(bytes, pos, pat.as_bytes()).is_some()),
            Self::Wildcard {
                parts,
                left_anchor,
                right_anchor,
                host_anchor,
            } => match_wildcard(url, parts, *left_anchor, *right_anchor, *host_anchor),
            Self::Regex { source, compiled } => {
                let re = compiled.get_or_init(|| match Regex::new(source) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        warn!(pattern = %source, %err, "rule regex failed to compile");
                        None
                    }
                });
                re.as_ref().is_some_and(|re| re.is_match(url))
            }
        }
    }
}

/// Match `pat` at a fixed position. Returns the end position on success.
fn match_at(url: &[u8], mut pos: usize, pat: &[u8]) -> Option<usize> {
    for (i, &p) in pat.iter().enumerate() {
        if pos >= url.len() {
            // Only a trailing run of '^' may match end-of-input
            return if p == b'^' && pat[i..].iter().all(|&c| c == b'^') {
                Some(pos)
            } else {
                None
            };
        }
        if p == b'^' {
            if !is_separator(url[pos]) {
                return None;
            }
        } else if url[pos] != p {
            return None;
        }
        pos += 1;
    }
    Some(pos)
}

/// Find the first match of `pat` at or after `from`. Returns the end position.
fn find_at_or_after(url: &[u8], from: usize, pat: &[u8]) -> Option<usize> {
    if pat.is_empty() {
        return Some(from);
    }
    let first = pat[0];
    for pos in from..=url.len() {
        // Cheap first-byte filter for literal heads
        if first != b'^' && pos < url.len() && url[pos] != first {
            continue;
        }
        if let Some(end) = match_at(url, pos, pat) {
            return Some(end);
        }
    }
    None
}

/// Match `pat` so that it ends exactly at end-of-input, starting at or
/// after `from`.
fn match_tail_at_end(url: &[u8], from: usize, pat: &[u8]) -> bool {
    let lo = from.max(url.len().saturating_sub(pat.len()));
    (lo..=url.len()).any(|pos| match_at(url, pos, pat) == Some(url.len()))
}

/// Candidate start positions for a `||` pattern: the host start and every
/// position right after a dot inside the host.
fn host_starts(url: &str) -> Vec<usize> {
    let Some((host_start, host_end)) = get_host_position(url) else {
        return Vec::new();
    };
    if host_start == host_end {
        return Vec::new();
    }
    let bytes = url.as_bytes();
    let mut starts = Vec::with_capacity(4);
    starts.push(host_start);
    for i in host_start..host_end {
        if bytes[i] == b'.' {
            starts.push(i + 1);
        }
    }
    starts
}

fn match_wildcard(
    url: &str,
    parts: &[String],
    left_anchor: bool,
    right_anchor: bool,
    host_anchor: bool,
) -> bool {
    let bytes = url.as_bytes();
    let starts: Vec<usize> = if host_anchor {
        host_starts(url)
    } else if left_anchor {
        vec![0]
    } else {
        // Unanchored: the first segment's earliest occurrence is optimal
        // because later segments only need room to its right.
        match find_at_or_after(bytes, 0, parts[0].as_bytes()) {
            Some(end) => return match_rest(bytes, end, &parts[1..], right_anchor),
            None => return false,
        }
    };

    starts.into_iter().any(|start| {
        match_at(bytes, start, parts[0].as_bytes())
            .is_some_and(|end| match_rest(bytes, end, &parts[1..], right_anchor))
    })
}

fn match_rest(url: &[u8], mut pos: usize, parts: &[String], right_anchor: bool) -> bool {
    if parts.is_empty() {
        return !right_anchor || pos == url.len();
    }
    for part in &parts[..parts.len() - 1] {
        match find_at_or_after(url, pos, part.as_bytes()) {
            Some(end) => pos = end,
            None => return false,
        }
    }
    let last = parts[parts.len() - 1].as_bytes();
    if right_anchor {
        match_tail_at_end(url, pos, last)
    } else {
        find_at_or_after(url, pos, last).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(pattern: &str) -> CompiledMatcher {
        CompiledMatcher::compile(pattern, false)
    }

    #[test]
    fn test_plain_substring() {
        let m = compile("/banner/img");
        assert!(m.matches("http://example.org/banner/img.png"));
        assert!(!m.matches("http://example.org/banners/img.png"));
    }

    #[test]
    fn test_plain_with_separator() {
        let m = compile("/banner^");
        assert!(m.matches("http://example.org/banner/img"));
        assert!(m.matches("http://example.org/banner"));
        assert!(!m.matches("http://example.org/bannerx"));
    }

    #[test]
    fn test_left_anchored() {
        let m = compile("|https://example.org");
        assert!(m.matches("https://example.org/"));
        assert!(!m.matches("http://test.com/?https://example.org"));
    }

    #[test]
    fn test_right_anchored() {
        let m = compile("banner.png|");
        assert!(m.matches("http://example.org/banner.png"));
        assert!(!m.matches("http://example.org/banner.png?x=1"));
    }

    #[test]
    fn test_anchored_host_exact_and_subdomain() {
        let m = compile("||example.org^");
        assert!(m.matches("http://example.org/"));
        assert!(m.matches("https://sub.example.org/path"));
        assert!(m.matches("http://example.org"));
        assert!(!m.matches("http://testexample.org/"));
        assert!(!m.matches("http://example.org-evil.com/"));
        assert!(!m.matches("http://example.org.evil.com/"));
    }

    #[test]
    fn test_anchored_host_open_prefix() {
        // No trailing separator: the pattern continues into the URL freely
        let m = compile("||example.org");
        assert!(m.matches("http://example.org/"));
        assert!(m.matches("http://example.organic.com/"));
        assert!(!m.matches("http://badexample.org/"));
    }

    #[test]
    fn test_anchored_host_with_path() {
        let m = compile("||example.org/ads");
        assert!(m.matches("http://example.org/ads/banner"));
        assert!(!m.matches("http://example.org/video"));
    }

    #[test]
    fn test_wildcard() {
        let m = compile("|https://*examp");
        assert!(m.matches("https://sub.example.org/"));
        assert!(!m.matches("http://sub.example.org/"));

        let m = compile("/ads/*/banner");
        assert!(m.matches("http://x.com/ads/2024/banner.png"));
        assert!(!m.matches("http://x.com/ads/banner"));
    }

    #[test]
    fn test_both_anchors_exact() {
        let m = compile("|http://example.org/|");
        assert!(m.matches("http://example.org/"));
        assert!(!m.matches("http://example.org/x"));
    }

    #[test]
    fn test_regex_matcher() {
        let m = compile("/example\\.org/");
        assert!(m.matches("https://example.org/"));
        assert!(!m.matches("https://examplexorg/"));

        let m = compile("/^stats?\\./");
        assert!(m.matches("stats.test.com"));
        assert!(m.matches("stat.test.com"));
        assert!(!m.matches("mystats.test.com"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let m = compile("/[unclosed/");
        assert!(!m.matches("http://example.org/unclosed"));
    }

    #[test]
    fn test_match_case_keeps_pattern_case() {
        let m = CompiledMatcher::compile("||example.org^", true);
        assert!(m.matches("http://example.org/"));
        assert!(!m.matches("http://EXAMPLE.org/"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        let m = compile("");
        assert!(m.matches("http://example.org/"));
    }
}
