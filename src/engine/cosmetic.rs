//! Cosmetic engine: element-hiding rules indexed by hostname.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ScanError;
use crate::rules::Rule;
use crate::storage::RuleStorage;
use crate::types::RuleId;

/// Immutable cosmetic-rule index over a [`RuleStorage`].
pub struct CosmeticEngine {
    storage: Arc<RuleStorage>,
    /// rules with no permitted domains, applied everywhere
    generic_rules: Vec<RuleId>,
    /// permitted domain → rules limited to it
    specific_rules: HashMap<String, Vec<RuleId>>,
    rules_count: usize,
    scan_errors: Vec<ScanError>,
}

impl CosmeticEngine {
    pub fn new(storage: Arc<RuleStorage>) -> Self {
        let mut generic_rules = Vec::new();
        let mut specific_rules: HashMap<String, Vec<RuleId>> = HashMap::new();
        let mut rules_count = 0usize;

        let scan_errors = storage.scan(|id, rule| {
            if let Rule::Cosmetic(cosmetic) = &rule {
                if cosmetic.is_generic() {
                    generic_rules.push(id);
                } else {
                    for domain in cosmetic.permitted_domains() {
                        specific_rules.entry(domain.clone()).or_default().push(id);
                    }
                }
                rules_count += 1;
            }
        });

        Self {
            storage,
            generic_rules,
            specific_rules,
            rules_count,
            scan_errors,
        }
    }

    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    pub fn scan_errors(&self) -> &[ScanError] {
        &self.scan_errors
    }

    /// All element-hiding rules applying to a hostname, with `#@#`
    /// exceptions already cancelled out.
    pub fn match_hostname(&self, hostname: &str) -> Vec<Arc<Rule>> {
        let hostname = hostname.to_lowercase();

        let mut candidates: Vec<RuleId> = self.generic_rules.clone();
        let mut level = hostname.as_str();
        loop {
            if let Some(ids) = self.specific_rules.get(level) {
                candidates.extend_from_slice(ids);
            }
            match level.find('.') {
                Some(i) => level = &level[i + 1..],
                None => break,
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        let mut matched: Vec<Arc<Rule>> = Vec::new();
        let mut cancelled: HashSet<String> = HashSet::new();
        for id in candidates {
            let Ok(rule) = self.storage.retrieve(id) else {
                continue;
            };
            let Some(cosmetic) = rule.as_cosmetic() else {
                continue;
            };
            if !cosmetic.matches(&hostname) {
                continue;
            }
            if cosmetic.is_whitelist() {
                cancelled.insert(cosmetic.content().to_string());
            } else {
                matched.push(rule);
            }
        }

        matched.retain(|rule| {
            let content = rule.as_cosmetic().map(|c| c.content()).unwrap_or_default();
            !cancelled.contains(content)
        });
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StringRuleList;

    fn engine(rules_text: &str) -> CosmeticEngine {
        let storage = Arc::new(
            RuleStorage::new(vec![StringRuleList {
                id: 1,
                text: rules_text.to_string(),
                ignore_cosmetic: false,
            }])
            .unwrap(),
        );
        CosmeticEngine::new(storage)
    }

    #[test]
    fn test_generic_rule_applies_everywhere() {
        let e = engine("##banner");
        assert_eq!(e.rules_count(), 1);
        assert_eq!(e.match_hostname("example.org").len(), 1);
        assert_eq!(e.match_hostname("whatever.net").len(), 1);
    }

    #[test]
    fn test_specific_rule_limited_to_domain() {
        let e = engine("example.org##banner");
        assert_eq!(e.match_hostname("example.org").len(), 1);
        assert_eq!(e.match_hostname("sub.example.org").len(), 1);
        assert!(e.match_hostname("example.com").is_empty());
    }

    #[test]
    fn test_restricted_domain_excluded() {
        let e = engine("example.org,~sub.example.org##banner");
        assert_eq!(e.match_hostname("example.org").len(), 1);
        assert!(e.match_hostname("sub.example.org").is_empty());
    }

    #[test]
    fn test_whitelist_cancels_selector() {
        let e = engine("##banner\nexample.org#@#banner");
        assert!(e.match_hostname("example.org").is_empty());
        assert_eq!(e.match_hostname("example.com").len(), 1);
    }

    #[test]
    fn test_ignore_cosmetic_lists() {
        let storage = Arc::new(
            RuleStorage::new(vec![StringRuleList {
                id: 1,
                text: "##banner".to_string(),
                ignore_cosmetic: true,
            }])
            .unwrap(),
        );
        let e = CosmeticEngine::new(storage);
        assert_eq!(e.rules_count(), 0);
    }
}
