//! Network (basic) filtering rules: `||example.org^$third-party` and friends.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FilterError;
use crate::request::Request;
use crate::rules::pattern::{is_regex_pattern, CompiledMatcher};
use crate::types::{FilterListId, NetworkRuleOption, RequestType};

/// Prefix marking an exception (whitelist) rule.
const MASK_WHITELIST: &str = "@@";

/// Non-regex rules whose shortcut is shorter than this and that carry no
/// domain restriction would match half the internet; they are rejected.
const SHORTCUT_MIN_LENGTH: usize = 3;

// =============================================================================
// Rule text splitting
// =============================================================================

/// Split rule text into `(pattern, options, whitelist)`.
///
/// The split point is the last unescaped `$`; a leading `@@` marks the rule
/// as whitelist and is stripped. A pattern that is entirely `/regex/` is
/// never split (unless it carries a `replace=` option, which puts `$` back
/// on the table).
pub fn parse_rule_text(rule_text: &str) -> Result<(String, String, bool), FilterError> {
    let mut start = 0;
    let mut whitelist = false;
    if rule_text.starts_with(MASK_WHITELIST) {
        whitelist = true;
        start = MASK_WHITELIST.len();
    }

    if rule_text.len() <= start {
        return Err(FilterError::Syntax(format!(
            "the rule is too short: {rule_text}"
        )));
    }

    let pattern_full = &rule_text[start..];

    // Avoid looking for the delimiter inside of a regex rule
    if is_regex_pattern(pattern_full) && !pattern_full.contains("replace=") {
        return Ok((pattern_full.to_string(), String::new(), whitelist));
    }

    let bytes = rule_text.as_bytes();
    let mut found_escaped = false;
    for i in (start..rule_text.len().saturating_sub(1)).rev() {
        if bytes[i] != b'$' {
            continue;
        }
        if i > start && bytes[i - 1] == b'\\' {
            found_escaped = true;
            continue;
        }

        let pattern = rule_text[start..i].to_string();
        let mut options = rule_text[i + 1..].to_string();
        if found_escaped {
            options = options.replace("\\$", "$");
        }
        return Ok((pattern, options, whitelist));
    }

    Ok((pattern_full.to_string(), String::new(), whitelist))
}

// =============================================================================
// Shortcuts
// =============================================================================

/// Longest pattern piece free of special characters (`*`, `^`, `|`),
/// lowercased. Ties keep the leftmost piece.
pub fn find_shortcut(pattern: &str) -> String {
    pattern
        .split(['*', '^', '|'])
        .fold("", |longest, part| {
            if part.len() > longest.len() {
                part
            } else {
                longest
            }
        })
        .to_lowercase()
}

static RE_SQUARE_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\\])\[.*[^\\]\]").unwrap());
static RE_ROUND_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\\])\(.*[^\\]\)").unwrap());
static RE_CURLY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\\])\{.*[^\\]\}").unwrap());
static RE_SPECIAL_CHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\^$*+?.()|\[\]{}]").unwrap());

/// Longest literal piece inside a `/regex/` pattern, lowercased.
///
/// Complicated expressions (anything using `?`: lookarounds, lazy
/// quantifiers, optional characters) are discarded right away and yield an
/// empty shortcut.
pub fn find_regex_shortcut(pattern: &str) -> String {
    let text = &pattern[1..pattern.len() - 1];

    if text.contains('?') {
        return String::new();
    }

    // Strip all types of brackets, then knock out the remaining regex
    // metacharacters and keep the longest literal run.
    let text = RE_SQUARE_BRACKETS.replace_all(text, "$1");
    let text = RE_ROUND_BRACKETS.replace_all(&text, "$1");
    let text = RE_CURLY_BRACKETS.replace_all(&text, "$1");
    let text = RE_SPECIAL_CHARACTERS.replace_all(&text, " ");

    text.split(' ')
        .fold("", |longest, part| {
            if part.len() > longest.len() {
                part
            } else {
                longest
            }
        })
        .to_lowercase()
}

// =============================================================================
// Option parsing
// =============================================================================

#[derive(Debug, Default)]
struct ParsedOptions {
    enabled: NetworkRuleOption,
    disabled: NetworkRuleOption,
    permitted_types: RequestType,
    restricted_types: RequestType,
    permitted_domains: Vec<String>,
    restricted_domains: Vec<String>,
}

impl ParsedOptions {
    fn parse(options: &str, whitelist: bool) -> Result<Self, FilterError> {
        let mut parsed = Self::default();
        if options.is_empty() {
            return Ok(parsed);
        }
        for option in options.split(',') {
            let (name, value) = match option.find('=') {
                Some(i) => (&option[..i], &option[i + 1..]),
                None => (option, ""),
            };
            parsed.load_option(name, value, whitelist)?;
        }
        Ok(parsed)
    }

    fn load_option(&mut self, name: &str, value: &str, whitelist: bool) -> Result<(), FilterError> {
        match name {
            "third-party" | "~first-party" => self.set_option(NetworkRuleOption::THIRD_PARTY, true, whitelist),
            "~third-party" | "first-party" => self.set_option(NetworkRuleOption::THIRD_PARTY, false, whitelist),
            "match-case" => self.set_option(NetworkRuleOption::MATCH_CASE, true, whitelist),
            "~match-case" => self.set_option(NetworkRuleOption::MATCH_CASE, false, whitelist),
            "important" => self.set_option(NetworkRuleOption::IMPORTANT, true, whitelist),

            "elemhide" => self.set_option(NetworkRuleOption::ELEMHIDE, true, whitelist),
            "generichide" => self.set_option(NetworkRuleOption::GENERICHIDE, true, whitelist),
            "genericblock" => self.set_option(NetworkRuleOption::GENERICBLOCK, true, whitelist),
            "jsinject" => self.set_option(NetworkRuleOption::JSINJECT, true, whitelist),
            "urlblock" => self.set_option(NetworkRuleOption::URLBLOCK, true, whitelist),
            "content" => self.set_option(NetworkRuleOption::CONTENT, true, whitelist),
            "extension" => self.set_option(NetworkRuleOption::EXTENSION, true, whitelist),
            "stealth" => self.set_option(NetworkRuleOption::STEALTH, true, whitelist),
            "~extension" => {
                // Clears an Extension bit a preceding $document enabled.
                // TODO: make this independent of option order.
                self.enabled.remove(NetworkRuleOption::EXTENSION);
                Ok(())
            }

            "popup" => self.set_option(NetworkRuleOption::POPUP, true, whitelist),
            "empty" => self.set_option(NetworkRuleOption::EMPTY, true, whitelist),
            "mp4" => self.set_option(NetworkRuleOption::MP4, true, whitelist),

            // $document is a macro on whitelist rules and a request type
            // on blacklist rules
            "document" if whitelist => {
                self.set_option(NetworkRuleOption::DOCUMENT_WHITELIST, true, whitelist)
            }

            "domain" => self.load_domains(value),

            _ => self.load_request_type(name),
        }
    }

    fn set_option(
        &mut self,
        option: NetworkRuleOption,
        enable: bool,
        whitelist: bool,
    ) -> Result<(), FilterError> {
        if whitelist && NetworkRuleOption::BLACKLIST_ONLY.contains(option) {
            return Err(FilterError::InvalidRule(format!(
                "modifier cannot be used in a whitelist rule: {option:?}"
            )));
        }
        if !whitelist && NetworkRuleOption::WHITELIST_ONLY.contains(option) {
            return Err(FilterError::InvalidRule(format!(
                "modifier cannot be used in a blacklist rule: {option:?}"
            )));
        }
        if enable {
            self.enabled.insert(option);
        } else {
            self.disabled.insert(option);
        }
        Ok(())
    }

    fn load_request_type(&mut self, name: &str) -> Result<(), FilterError> {
        let (restricted, name) = match name.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let bit = match name {
            "script" => RequestType::SCRIPT,
            "stylesheet" => RequestType::STYLESHEET,
            "subdocument" => RequestType::SUBDOCUMENT,
            "object" => RequestType::OBJECT,
            "image" => RequestType::IMAGE,
            "xmlhttprequest" => RequestType::XMLHTTPREQUEST,
            "object-subrequest" => RequestType::OBJECT_SUBREQUEST,
            "media" => RequestType::MEDIA,
            "font" => RequestType::FONT,
            "websocket" => RequestType::WEBSOCKET,
            "ping" => RequestType::PING,
            "other" => RequestType::OTHER,
            "document" => RequestType::DOCUMENT,
            _ => {
                return Err(FilterError::InvalidRule(format!(
                    "unknown modifier: {name}"
                )))
            }
        };
        if restricted {
            self.restricted_types.insert(bit);
        } else {
            self.permitted_types.insert(bit);
        }
        Ok(())
    }

    fn load_domains(&mut self, value: &str) -> Result<(), FilterError> {
        if value.is_empty() {
            return Err(FilterError::InvalidRule(
                "empty $domain modifier".to_string(),
            ));
        }
        for segment in value.split('|') {
            let (restricted, domain) = match segment.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, segment),
            };
            if domain.is_empty() {
                return Err(FilterError::InvalidRule(format!(
                    "empty domain specified: {value}"
                )));
            }
            let domain = domain.to_lowercase();
            if restricted {
                self.restricted_domains.push(domain);
            } else {
                self.permitted_domains.push(domain);
            }
        }
        if self
            .permitted_domains
            .iter()
            .any(|d| self.restricted_domains.contains(d))
        {
            return Err(FilterError::InvalidRule(format!(
                "permitted and restricted domains overlap: {value}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// NetworkRule
// =============================================================================

/// A parsed network filtering rule.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    text: String,
    filter_list_id: FilterListId,
    pattern: String,
    shortcut: String,
    whitelist: bool,
    enabled_options: NetworkRuleOption,
    disabled_options: NetworkRuleOption,
    permitted_request_types: RequestType,
    restricted_request_types: RequestType,
    permitted_domains: Vec<String>,
    restricted_domains: Vec<String>,
    matcher: CompiledMatcher,
}

impl PartialEq for NetworkRule {
    /// The parsed form is a pure function of the text and the list id.
    fn eq(&self, other: &Self) -> bool {
        self.filter_list_id == other.filter_list_id && self.text == other.text
    }
}

impl Eq for NetworkRule {}

impl NetworkRule {
    pub fn new(rule_text: &str, filter_list_id: FilterListId) -> Result<Self, FilterError> {
        let (pattern, options, whitelist) = parse_rule_text(rule_text)?;
        let opts = ParsedOptions::parse(&options, whitelist)?;

        let is_regex = is_regex_pattern(&pattern);
        let shortcut = if is_regex {
            find_regex_shortcut(&pattern)
        } else {
            find_shortcut(&pattern)
        };
        if !is_regex && shortcut.len() < SHORTCUT_MIN_LENGTH && opts.permitted_domains.is_empty() {
            return Err(FilterError::InvalidRule(format!(
                "the rule is too wide, add domain restrictions or make it more specific: {rule_text}"
            )));
        }

        let matcher = CompiledMatcher::compile(
            &pattern,
            opts.enabled.contains(NetworkRuleOption::MATCH_CASE),
        );

        Ok(Self {
            text: rule_text.to_string(),
            filter_list_id,
            pattern,
            shortcut,
            whitelist,
            enabled_options: opts.enabled,
            disabled_options: opts.disabled,
            permitted_request_types: opts.permitted_types,
            restricted_request_types: opts.restricted_types,
            permitted_domains: opts.permitted_domains,
            restricted_domains: opts.restricted_domains,
            matcher,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn filter_list_id(&self) -> FilterListId {
        self.filter_list_id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Longest literal piece of the pattern; the engine indexes on it.
    pub fn shortcut(&self) -> &str {
        &self.shortcut
    }

    pub fn is_whitelist(&self) -> bool {
        self.whitelist
    }

    pub fn is_regex_rule(&self) -> bool {
        matches!(self.matcher, CompiledMatcher::Regex { .. })
    }

    pub fn is_option_enabled(&self, option: NetworkRuleOption) -> bool {
        self.enabled_options.contains(option)
    }

    pub fn is_option_disabled(&self, option: NetworkRuleOption) -> bool {
        self.disabled_options.contains(option)
    }

    pub fn permitted_domains(&self) -> &[String] {
        &self.permitted_domains
    }

    pub fn restricted_domains(&self) -> &[String] {
        &self.restricted_domains
    }

    pub fn permitted_request_types(&self) -> RequestType {
        self.permitted_request_types
    }

    pub fn restricted_request_types(&self) -> RequestType {
        self.restricted_request_types
    }

    /// Full match predicate: third-party, request type, source domain and
    /// pattern must all agree.
    pub fn matches(&self, request: &Request) -> bool {
        if self.is_option_enabled(NetworkRuleOption::THIRD_PARTY) && !request.third_party {
            return false;
        }
        if self.is_option_disabled(NetworkRuleOption::THIRD_PARTY) && request.third_party {
            return false;
        }
        if !self.match_request_type(request.request_type) {
            return false;
        }
        if !self.match_source_domain(&request.source_hostname) {
            return false;
        }
        self.match_pattern(request)
    }

    fn match_request_type(&self, request_type: RequestType) -> bool {
        if !self.permitted_request_types.is_empty()
            && !self.permitted_request_types.contains(request_type)
        {
            return false;
        }
        if !self.restricted_request_types.is_empty()
            && self.restricted_request_types.contains(request_type)
        {
            return false;
        }
        true
    }

    fn match_source_domain(&self, source_hostname: &str) -> bool {
        if self.permitted_domains.is_empty() && self.restricted_domains.is_empty() {
            return true;
        }
        if !self.restricted_domains.is_empty()
            && is_domain_or_subdomain_of_any(source_hostname, &self.restricted_domains)
        {
            return false;
        }
        if !self.permitted_domains.is_empty()
            && !is_domain_or_subdomain_of_any(source_hostname, &self.permitted_domains)
        {
            return false;
        }
        true
    }

    fn match_pattern(&self, request: &Request) -> bool {
        // A hostname-only query carries a synthetic URL; regex rules such
        // as /^stats?\./ are written against the bare hostname.
        if request.is_hostname_request && self.is_regex_rule() {
            return self.matcher.matches(&request.hostname);
        }
        let url = if self.is_option_enabled(NetworkRuleOption::MATCH_CASE) {
            &request.url
        } else {
            &request.url_lower
        };
        self.matcher.matches(url)
    }

    /// Priority order: `(important && whitelist, important, whitelist,
    /// specificity)` compared lexicographically. Returns true iff `self`
    /// outranks `other`; equal rules rank equal both ways.
    pub fn is_higher_priority(&self, other: &NetworkRule) -> bool {
        self.priority_key() > other.priority_key()
    }

    fn priority_key(&self) -> (bool, bool, bool, u32) {
        let important = self.is_option_enabled(NetworkRuleOption::IMPORTANT);
        let specificity = self.enabled_options.bits().count_ones()
            + u32::from(!self.permitted_domains.is_empty());
        (
            important && self.whitelist,
            important,
            self.whitelist,
            specificity,
        )
    }

    /// True when the rule constrains nothing but hostnames and can serve
    /// DNS queries: no domain or request-type restrictions and no options
    /// beyond `$important` / `$match-case`.
    pub fn is_host_level(&self) -> bool {
        if !self.permitted_domains.is_empty() || !self.restricted_domains.is_empty() {
            return false;
        }
        if !self.permitted_request_types.is_empty() || !self.restricted_request_types.is_empty() {
            return false;
        }
        if !self.disabled_options.is_empty() {
            return false;
        }
        (self.enabled_options
            & !(NetworkRuleOption::IMPORTANT | NetworkRuleOption::MATCH_CASE))
            .is_empty()
    }

    /// The hostname this rule reduces to, when its pattern is a bare
    /// `||host^` / `||host` anchor. Such rules are keyed directly in the
    /// DNS lookup table.
    pub fn dns_lookup_hostname(&self) -> Option<&str> {
        let CompiledMatcher::AnchoredHost(body) = &self.matcher else {
            return None;
        };
        let host = body.strip_suffix('^').unwrap_or(body);
        let valid = !host.is_empty()
            && host
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
        valid.then_some(host)
    }
}

/// `hostname` equals one of `domains` or is a dot-subdomain of one.
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
