//! Cosmetic (element-hiding) rules. Only parsing and hostname matching are
//! implemented here; applying selectors is the embedder's job.

use crate::error::FilterError;
use crate::types::FilterListId;

/// Marker separating the domain list from the selector, longest first so
/// that `#@?#` is not mistaken for `#@#`.
const MARKERS: &[(&str, bool, bool)] = &[
    // (marker, whitelist, extended css)
    ("#@?#", true, true),
    ("#?#", false, true),
    ("#@#", true, false),
    ("##", false, false),
];

/// Kind of cosmetic rule. Only element hiding is in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosmeticRuleType {
    ElementHiding,
}

/// True when the line carries a cosmetic marker.
pub fn is_cosmetic(line: &str) -> bool {
    MARKERS.iter().any(|&(marker, _, _)| line.contains(marker))
}

/// A parsed cosmetic rule: `example.org,~sub.example.org##.banner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmeticRule {
    text: String,
    filter_list_id: FilterListId,
    rule_type: CosmeticRuleType,
    content: String,
    whitelist: bool,
    extended_css: bool,
    permitted_domains: Vec<String>,
    restricted_domains: Vec<String>,
}

impl CosmeticRule {
    pub fn new(rule_text: &str, filter_list_id: FilterListId) -> Result<Self, FilterError> {
        let (marker_pos, marker, whitelist, extended_css) = MARKERS
            .iter()
            .filter_map(|&(m, wl, ext)| rule_text.find(m).map(|pos| (pos, m, wl, ext)))
            .min_by_key(|&(pos, m, _, _)| (pos, std::cmp::Reverse(m.len())))
            .ok_or_else(|| {
                FilterError::Syntax(format!("not a cosmetic rule: {rule_text}"))
            })?;

        let content = rule_text[marker_pos + marker.len()..].trim();
        if content.is_empty() {
            return Err(FilterError::Syntax(format!(
                "empty selector content: {rule_text}"
            )));
        }

        let mut permitted_domains = Vec::new();
        let mut restricted_domains = Vec::new();
        let domain_list = &rule_text[..marker_pos];
        if !domain_list.is_empty() {
            for segment in domain_list.split(',') {
                let segment = segment.trim();
                let (restricted, domain) = match segment.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, segment),
                };
                if domain.is_empty() {
                    return Err(FilterError::Syntax(format!(
                        "empty domain specified: {rule_text}"
                    )));
                }
                if restricted {
                    restricted_domains.push(domain.to_lowercase());
                } else {
                    permitted_domains.push(domain.to_lowercase());
                }
            }
        }

        Ok(Self {
            text: rule_text.to_string(),
            filter_list_id,
            rule_type: CosmeticRuleType::ElementHiding,
            content: content.to_string(),
            whitelist,
            extended_css,
            permitted_domains,
            restricted_domains,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn filter_list_id(&self) -> FilterListId {
        self.filter_list_id
    }

    pub fn rule_type(&self) -> CosmeticRuleType {
        self.rule_type
    }

    /// The selector body (everything after the marker).
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_whitelist(&self) -> bool {
        self.whitelist
    }

    pub fn is_extended_css(&self) -> bool {
        self.extended_css
    }

    pub fn permitted_domains(&self) -> &[String] {
        &self.permitted_domains
    }

    pub fn restricted_domains(&self) -> &[String] {
        &self.restricted_domains
    }

    /// True when the rule is not limited to specific domains.
    pub fn is_generic(&self) -> bool {
        self.permitted_domains.is_empty()
    }

    /// Whether the rule applies on the given hostname.
    pub fn matches(&self, hostname: &str) -> bool {
        if !self.restricted_domains.is_empty()
            && is_domain_or_subdomain_of_any(hostname, &self.restricted_domains)
        {
            return false;
        }
        if !self.permitted_domains.is_empty()
            && !is_domain_or_subdomain_of_any(hostname, &self.permitted_domains)
        {
            return false;
        }
        true
    }
}

fn is_domain_or_subdomain_of_any(hostname: &str, domains: &[String]) -> bool {
    if hostname.is_empty() {
        return false;
    }
    domains.iter().any(|d| {
        hostname == d
            || (hostname.len() > d.len()
                && hostname.ends_with(d.as_str())
                && hostname.as_bytes()[hostname.len() - d.len() - 1] == b'.')
    })
}
