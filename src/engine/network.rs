//! Network engine: indexes network rules and finds the highest-priority
//! match for a request.
//!
//! Rules are pre-filtered through a shortcut table: a map from the hash of
//! one fixed-size window of each rule's shortcut to the rule ids carrying
//! it. Matching slides the same window over the request URL, so only rules
//! whose literal text appears in the URL are ever materialized. Rules
//! without a usable shortcut fall back to a per-domain table or to the
//! always-scanned tail list.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ScanError;
use crate::hash::hash_chunk;
use crate::psl::walk_suffixes;
use crate::request::Request;
use crate::rules::{NetworkRule, Rule};
use crate::storage::RuleStorage;
use crate::types::RuleId;

/// Default shortcut-window width, in bytes.
const DEFAULT_SHORTCUT_LENGTH: usize = 6;

/// Construction-time tuning for [`NetworkEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Width of the shortcut index window.
    pub shortcut_length: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            shortcut_length: DEFAULT_SHORTCUT_LENGTH,
        }
    }
}

/// Immutable network-rule index over a [`RuleStorage`].
pub struct NetworkEngine {
    storage: Arc<RuleStorage>,
    shortcut_length: usize,
    /// shortcut-window hash → rules carrying that window
    shortcuts: HashMap<u32, Vec<RuleId>>,
    /// permitted domain → rules restricted to it (no usable shortcut)
    domains: HashMap<String, Vec<RuleId>>,
    /// rules with neither a shortcut nor a domain restriction
    other_rules: Vec<RuleId>,
    rules_count: usize,
    scan_errors: Vec<ScanError>,
}

impl NetworkEngine {
    pub fn new(storage: Arc<RuleStorage>) -> Self {
        Self::with_options(storage, EngineOptions::default())
    }

    pub fn with_options(storage: Arc<RuleStorage>, options: EngineOptions) -> Self {
        let mut engine = Self {
            storage: storage.clone(),
            shortcut_length: options.shortcut_length.max(1),
            shortcuts: HashMap::new(),
            domains: HashMap::new(),
            other_rules: Vec::new(),
            rules_count: 0,
            scan_errors: Vec::new(),
        };

        // Window-usage histogram, only needed while building
        let mut histogram: HashMap<u32, usize> = HashMap::new();
        let errors = storage.scan(|id, rule| {
            if let Rule::Network(network) = &rule {
                engine.add_rule(network, id, &mut histogram);
            }
        });
        engine.scan_errors = errors;
        engine
    }

    /// Number of network rules in the index.
    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    /// Lines that failed to parse while building the index.
    pub fn scan_errors(&self) -> &[ScanError] {
        &self.scan_errors
    }

    fn add_rule(
        &mut self,
        rule: &NetworkRule,
        id: RuleId,
        histogram: &mut HashMap<u32, usize>,
    ) {
        if !self.add_to_shortcuts(rule, id, histogram) {
            if !rule.permitted_domains().is_empty() {
                for domain in rule.permitted_domains() {
                    self.domains.entry(domain.clone()).or_default().push(id);
                }
            } else {
                self.other_rules.push(id);
            }
        }
        self.rules_count += 1;
    }

    fn add_to_shortcuts(
        &mut self,
        rule: &NetworkRule,
        id: RuleId,
        histogram: &mut HashMap<u32, usize>,
    ) -> bool {
        let shortcut = rule.shortcut();
        if shortcut.len() < self.shortcut_length || is_any_url_shortcut(shortcut) {
            return false;
        }

        // Pick the least-populated window so hot windows like "://ads"
        // do not collect every rule in the list
        let mut best_hash = 0;
        let mut min_count = usize::MAX;
        for window in shortcut.as_bytes().windows(self.shortcut_length) {
            let hash = hash_chunk(window);
            let count = histogram.get(&hash).copied().unwrap_or(0);
            if count < min_count {
                min_count = count;
                best_hash = hash;
            }
        }

        *histogram.entry(best_hash).or_insert(0) += 1;
        self.shortcuts.entry(best_hash).or_default().push(id);
        true
    }

    /// Find the highest-priority rule matching the request, if any.
    ///
    /// Ties on priority resolve to the lowest rule id, so the winner is
    /// deterministic for a given rule set and request.
    pub fn match_request(&self, request: &Request) -> Option<Arc<Rule>> {
        let mut candidates: Vec<RuleId> = Vec::with_capacity(64);

        let url = request.url_lower.as_bytes();
        if url.len() >= self.shortcut_length {
            for window in url.windows(self.shortcut_length) {
                if let Some(ids) = self.shortcuts.get(&hash_chunk(window)) {
                    candidates.extend_from_slice(ids);
                }
            }
        }

        if !request.source_hostname.is_empty() {
            for suffix in walk_suffixes(&request.source_hostname) {
                if let Some(ids) = self.domains.get(suffix) {
                    candidates.extend_from_slice(ids);
                }
            }
        }

        candidates.extend_from_slice(&self.other_rules);
        candidates.sort_unstable();
        candidates.dedup();

        let mut winner: Option<Arc<Rule>> = None;
        for id in candidates {
            let Ok(rule) = self.storage.retrieve(id) else {
                continue;
            };
            let Some(network) = rule.as_network() else {
                continue;
            };
            if !network.matches(request) {
                continue;
            }
            let outranked = winner
                .as_ref()
                .and_then(|w| w.as_network())
                .is_some_and(|w| !network.is_higher_priority(w));
            if !outranked {
                winner = Some(rule);
            }
        }
        winner
    }
}

/// Shortcuts that only cover a scheme prefix would put the rule on nearly
/// every URL's candidate list.
fn is_any_url_shortcut(shortcut: &str) -> bool {
    (shortcut.len() < 6 && shortcut.starts_with("ws:"))
        || (shortcut.len() < 8 && shortcut.starts_with("http"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StringRuleList;
    use crate::types::RequestType;

    fn engine(rules_text: &str) -> NetworkEngine {
        let storage = Arc::new(
            RuleStorage::new(vec![StringRuleList {
                id: 1,
                text: rules_text.to_string(),
                ignore_cosmetic: false,
            }])
            .unwrap(),
        );
        NetworkEngine::new(storage)
    }

    #[test]
    fn test_empty_engine() {
        let e = engine("");
        let r = Request::new("http://example.org/", "", RequestType::OTHER);
        assert!(e.match_request(&r).is_none());
        assert_eq!(e.rules_count(), 0);
    }

    #[test]
    fn test_basic_match() {
        let e = engine("||example.org^");
        assert_eq!(e.rules_count(), 1);

        let r = Request::new("http://example.org/", "", RequestType::OTHER);
        let winner = e.match_request(&r).unwrap();
        assert_eq!(winner.text(), "||example.org^");

        let r = Request::new("http://example.com/", "", RequestType::OTHER);
        assert!(e.match_request(&r).is_none());
    }

    #[test]
    fn test_short_shortcut_goes_to_domain_table() {
        // Shortcut "ads" is too short for the window index but the rule is
        // domain-restricted, so it must still be found
        let e = engine("ads$domain=example.org");
        let r = Request::new(
            "http://test.com/ads/banner",
            "http://example.org/",
            RequestType::OTHER,
        );
        let winner = e.match_request(&r).unwrap();
        assert_eq!(winner.text(), "ads$domain=example.org");

        let r = Request::new("http://test.com/ads/banner", "", RequestType::OTHER);
        assert!(e.match_request(&r).is_none());
    }

    #[test]
    fn test_wide_domain_rule_matches_via_domain_table() {
        let e = engine("$domain=example.org");
        let r = Request::new(
            "http://whatever.com/",
            "http://sub.example.org/",
            RequestType::SCRIPT,
        );
        assert!(e.match_request(&r).is_some());
    }

    #[test]
    fn test_scheme_only_shortcut_is_always_scanned() {
        // The shortcut of this rule is "http://", which the window index
        // refuses; the rule must land in the tail list and still match
        let e = engine("|http://$third-party");
        let r = Request::new(
            "http://example.org/",
            "https://example.com/",
            RequestType::OTHER,
        );
        assert!(e.match_request(&r).is_some());
    }

    #[test]
    fn test_scan_errors_are_collected() {
        let e = engine("||example.org^\nad$third-party");
        assert_eq!(e.rules_count(), 1);
        assert_eq!(e.scan_errors().len(), 1);
    }

    #[test]
    fn test_shortcut_soundness() {
        // If a rule matched, the URL must contain its shortcut
        let e = engine("||example.org^\n/banner.*ads/\n||test.com^$script");
        let urls = [
            "http://example.org/",
            "http://test.com/script.js",
            "http://banner-farm.net/ads/1",
        ];
        for url in urls {
            let r = Request::new(url, "", RequestType::SCRIPT);
            if let Some(rule) = e.match_request(&r) {
                let shortcut = rule.as_network().unwrap().shortcut();
                assert!(
                    r.url_lower.contains(shortcut),
                    "{url} matched but does not contain {shortcut:?}"
                );
            }
        }
    }
}
