//! End-to-end engine scenarios: storage, indexes and priority resolution
//! working together.

use std::sync::Arc;

use urlfilter::{
    DnsEngine, NetworkEngine, NetworkRule, Request, RequestType, RuleStorage, StringRuleList,
};

fn storage(rules_text: &str) -> Arc<RuleStorage> {
    Arc::new(
        RuleStorage::new(vec![StringRuleList {
            id: 1,
            text: rules_text.to_string(),
            ignore_cosmetic: false,
        }])
        .unwrap(),
    )
}

fn network_engine(rules_text: &str) -> NetworkEngine {
    NetworkEngine::new(storage(rules_text))
}

fn dns_engine(rules_text: &str) -> DnsEngine {
    DnsEngine::new(storage(rules_text))
}

#[test]
fn empty_network_engine() {
    let engine = network_engine("");
    let request = Request::new("http://example.org/", "", RequestType::OTHER);
    assert!(engine.match_request(&request).is_none());
}

#[test]
fn important_and_whitelist_priority() {
    let r1 = "||test2.example.org^$important";
    let r2 = "@@||example.org^";
    let r3 = "||test1.example.org^";
    let engine = network_engine(&[r1, r2, r3].join("\n"));

    let request = Request::new("http://example.org/", "", RequestType::OTHER);
    let winner = engine.match_request(&request).unwrap();
    assert_eq!(winner.text(), r2);

    let request = Request::new("http://test1.example.org/", "", RequestType::OTHER);
    let winner = engine.match_request(&request).unwrap();
    assert_eq!(winner.text(), r2);

    let request = Request::new("http://test2.example.org/", "", RequestType::OTHER);
    let winner = engine.match_request(&request).unwrap();
    assert_eq!(winner.text(), r1);
}

#[test]
fn third_party_modifier() {
    let engine = network_engine("||example.org^$third-party");

    let request = Request::new("https://example.org/", "", RequestType::OTHER);
    assert!(engine.match_request(&request).is_none());

    let request = Request::new(
        "https://sub.example.org/",
        "https://example.org/",
        RequestType::OTHER,
    );
    assert!(engine.match_request(&request).is_none());

    let request = Request::new(
        "https://example.org/",
        "https://example.com",
        RequestType::OTHER,
    );
    assert!(engine.match_request(&request).is_some());
}

#[test]
fn domain_modifier() {
    let engine = network_engine("||example.org^$domain=example.org|~subdomain.example.org");

    let request = Request::new(
        "https://example.org/",
        "https://example.org/",
        RequestType::OTHER,
    );
    assert!(engine.match_request(&request).is_some());

    let request = Request::new(
        "https://example.org/",
        "https://subdomain.example.org/",
        RequestType::OTHER,
    );
    assert!(engine.match_request(&request).is_none());

    let request = Request::new("https://example.org/", "", RequestType::OTHER);
    assert!(engine.match_request(&request).is_none());
}

#[test]
fn dns_engine_network_and_host_rules() {
    let engine = dns_engine("||example.org^\n0.0.0.0 example.com");

    let rules = engine.match_hostname("example.org");
    assert_eq!(rules.len(), 1);
    assert!(rules[0].as_network().is_some());

    let rules = engine.match_hostname("example.com");
    assert_eq!(rules.len(), 1);
    assert!(rules[0].as_host().is_some());

    assert!(engine.match_hostname("example.net").is_empty());
}

#[test]
fn dns_whitelist_regex_wins() {
    let engine = dns_engine("||stats.test.com^\n@@/^stats?\\./");
    let rules = engine.match_hostname("stats.test.com");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].text(), "@@/^stats?\\./");
    assert!(rules[0].as_network().unwrap().is_whitelist());
}

#[test]
fn dns_superset_of_network_engine() {
    // Whatever the network engine blocks for a bare hostname request must
    // be a DNS hit too, as long as the rule is hostname-reducible.
    let rules_text = "||blocked1.example.org^\n||blocked2.example.net^$important";
    let network = network_engine(rules_text);
    let dns = dns_engine(rules_text);

    for hostname in ["blocked1.example.org", "blocked2.example.net", "clean.example.com"] {
        let request = Request::new(&format!("http://{hostname}/"), "", RequestType::OTHER);
        let network_hit = network
            .match_request(&request)
            .map(|r| !r.as_network().unwrap().is_whitelist())
            .unwrap_or(false);
        let dns_hit = !dns.match_hostname(hostname).is_empty();
        assert_eq!(network_hit, dns_hit, "{hostname}");
    }
}

#[test]
fn match_is_case_insensitive_by_default() {
    let engine = network_engine("||example.org^\n/banner/img");

    for (lower, upper) in [
        ("http://example.org/", "HTTP://EXAMPLE.ORG/"),
        (
            "http://test.com/banner/img.png",
            "HTTP://TEST.COM/BANNER/IMG.PNG",
        ),
        ("http://clean.org/", "HTTP://CLEAN.ORG/"),
    ] {
        let lower_hit = engine
            .match_request(&Request::new(lower, "", RequestType::OTHER))
            .map(|r| r.text().to_string());
        let upper_hit = engine
            .match_request(&Request::new(upper, "", RequestType::OTHER))
            .map(|r| r.text().to_string());
        assert_eq!(lower_hit, upper_hit, "{lower}");
    }
}

#[test]
fn priority_is_antisymmetric_and_transitive() {
    let texts = [
        "@@||example.org^$important",
        "||example.org^$important",
        "@@||example.org^",
        "||example.org^$third-party,script",
        "||example.org^$domain=example.com",
        "||example.org^",
    ];
    let rules: Vec<NetworkRule> = texts
        .iter()
        .map(|t| NetworkRule::new(t, 1).unwrap())
        .collect();

    for a in &rules {
        assert!(!a.is_higher_priority(a));
        for b in &rules {
            if a.is_higher_priority(b) {
                assert!(!b.is_higher_priority(a), "{} vs {}", a.text(), b.text());
            }
            for c in &rules {
                if a.is_higher_priority(b) && b.is_higher_priority(c) {
                    assert!(
                        a.is_higher_priority(c),
                        "{} > {} > {}",
                        a.text(),
                        b.text(),
                        c.text()
                    );
                }
            }
        }
    }
}

#[test]
fn winner_is_deterministic_across_lists() {
    // Two identical rules in different lists: the winner must always come
    // from the first list.
    let storage = Arc::new(
        RuleStorage::new(vec![
            StringRuleList {
                id: 1,
                text: "||example.org^".to_string(),
                ignore_cosmetic: false,
            },
            StringRuleList {
                id: 2,
                text: "||example.org^".to_string(),
                ignore_cosmetic: false,
            },
        ])
        .unwrap(),
    );
    let engine = NetworkEngine::new(storage);
    let request = Request::new("http://example.org/", "", RequestType::OTHER);
    for _ in 0..3 {
        let winner = engine.match_request(&request).unwrap();
        assert_eq!(winner.filter_list_id(), 1);
    }
}

#[test]
fn mixed_list_feeds_all_engines() {
    let text = "\
! a comment
||ads.example.org^$script
0.0.0.0 tracker.example.net
example.org##.banner
not a rule $$$ at all
";
    let storage = storage(text);
    let network = NetworkEngine::new(storage.clone());
    let dns = DnsEngine::new(storage.clone());
    let cosmetic = urlfilter::CosmeticEngine::new(storage);

    assert_eq!(network.rules_count(), 1);
    assert_eq!(dns.rules_count(), 1);
    assert_eq!(cosmetic.rules_count(), 1);
    assert_eq!(network.scan_errors().len(), 1);

    let request = Request::new(
        "https://ads.example.org/a.js",
        "https://example.org/",
        RequestType::SCRIPT,
    );
    assert!(network.match_request(&request).is_some());
    assert_eq!(dns.match_hostname("tracker.example.net").len(), 1);
    assert_eq!(cosmetic.match_hostname("example.org").len(), 1);
}

#[test]
fn storage_snapshot_round_trip_through_engines() {
    let text = "||example.org^$important\n0.0.0.0 example.com\n##banner";
    let storage = storage(text);

    let mut rules = Vec::new();
    let errors = storage.scan(|_, rule| rules.push(rule));
    assert!(errors.is_empty());

    let data = urlfilter::snapshot::write_snapshot(&rules);
    let decoded = urlfilter::snapshot::read_snapshot(&data).unwrap();
    assert_eq!(decoded, rules);
}
