//! DNS engine: unified hostname matching over host rules and host-level
//! network rules.
//!
//! Only rules that reduce to a hostname make it into this engine; a DNS
//! resolver has no URL, request type or referrer to offer. Network rules
//! outrank host rules: a matching network rule is returned alone, and a
//! whitelist winner tells the caller the hostname is explicitly allowed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ScanError;
use crate::request::Request;
use crate::rules::Rule;
use crate::storage::RuleStorage;
use crate::types::RuleId;

/// Immutable hostname index over a [`RuleStorage`].
pub struct DnsEngine {
    storage: Arc<RuleStorage>,
    /// hostname → rules keyed at it (host rules and `||host^` network rules)
    lookup_table: HashMap<String, Vec<RuleId>>,
    /// host-level regex network rules; no single key, always evaluated
    regex_rules: Vec<RuleId>,
    rules_count: usize,
    scan_errors: Vec<ScanError>,
}

impl DnsEngine {
    pub fn new(storage: Arc<RuleStorage>) -> Self {
        let mut lookup_table: HashMap<String, Vec<RuleId>> = HashMap::new();
        let mut regex_rules = Vec::new();
        let mut rules_count = 0usize;

        let scan_errors = storage.scan(|id, rule| match &rule {
            Rule::Host(host) => {
                for hostname in host.hostnames() {
                    lookup_table.entry(hostname.clone()).or_default().push(id);
                }
                rules_count += 1;
            }
            Rule::Network(network) if network.is_host_level() => {
                if let Some(hostname) = network.dns_lookup_hostname() {
                    lookup_table.entry(hostname.to_string()).or_default().push(id);
                    rules_count += 1;
                } else if network.is_regex_rule() {
                    regex_rules.push(id);
                    rules_count += 1;
                }
            }
            _ => {}
        });

        Self {
            storage,
            lookup_table,
            regex_rules,
            rules_count,
            scan_errors,
        }
    }

    /// Number of rules in the index.
    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    /// Lines that failed to parse while building the index.
    pub fn scan_errors(&self) -> &[ScanError] {
        &self.scan_errors
    }

    /// Find all rules for a hostname. Empty result means no hit.
    ///
    /// The hostname and every suffix made by dropping leading labels are
    /// looked up. A matching network rule (picked by priority) is returned
    /// alone; otherwise all host rules at the most specific matching level
    /// are returned, so one name can yield both its v4 and v6 mappings.
    pub fn match_hostname(&self, hostname: &str) -> Vec<Arc<Rule>> {
        if hostname.is_empty() {
            return Vec::new();
        }
        let hostname = hostname.to_lowercase();
        let request = Request::for_hostname(&hostname);

        let mut network_candidates: Vec<RuleId> = Vec::new();
        let mut host_hits: Vec<Arc<Rule>> = Vec::new();

        let mut level = hostname.as_str();
        loop {
            if let Some(ids) = self.lookup_table.get(level) {
                let mut level_hosts: Vec<Arc<Rule>> = Vec::new();
                for &id in ids {
                    let Ok(rule) = self.storage.retrieve(id) else {
                        continue;
                    };
                    if rule.as_network().is_some() {
                        network_candidates.push(id);
                    } else if rule.as_host().is_some() {
                        level_hosts.push(rule);
                    }
                }
                if host_hits.is_empty() {
                    host_hits = level_hosts;
                }
            }
            match level.find('.') {
                Some(i) => level = &level[i + 1..],
                None => break,
            }
        }

        network_candidates.extend_from_slice(&self.regex_rules);
        network_candidates.sort_unstable();
        network_candidates.dedup();

        let mut winner: Option<Arc<Rule>> = None;
        for id in network_candidates {
            let Ok(rule) = self.storage.retrieve(id) else {
                continue;
            };
            let Some(network) = rule.as_network() else {
                continue;
            };
            if !network.matches(&request) {
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

        if let Some(winner) = winner {
            return vec![winner];
        }
        host_hits
    }
}
