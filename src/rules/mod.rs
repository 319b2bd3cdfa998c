//! Rule variants and the line-level parser.
//!
//! Three rule kinds exist: network rules (`||example.org^$third-party`),
//! hosts-file rules (`0.0.0.0 example.com`) and cosmetic rules
//! (`example.org##.banner`). A list line is tried against the parsers in
//! that order - host, cosmetic, network - and the first that accepts wins.

pub mod cosmetic;
pub mod host;
pub mod network;
pub mod pattern;
pub mod scanner;

use crate::error::FilterError;
use crate::types::FilterListId;

pub use cosmetic::{CosmeticRule, CosmeticRuleType};
pub use host::HostRule;
pub use network::NetworkRule;

/// A parsed filtering rule of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Network(NetworkRule),
    Host(HostRule),
    Cosmetic(CosmeticRule),
}

impl Rule {
    /// Original rule text.
    pub fn text(&self) -> &str {
        match self {
            Rule::Network(r) => r.text(),
            Rule::Host(r) => r.text(),
            Rule::Cosmetic(r) => r.text(),
        }
    }

    /// Identifier of the list the rule came from.
    pub fn filter_list_id(&self) -> FilterListId {
        match self {
            Rule::Network(r) => r.filter_list_id(),
            Rule::Host(r) => r.filter_list_id(),
            Rule::Cosmetic(r) => r.filter_list_id(),
        }
    }

    pub fn as_network(&self) -> Option<&NetworkRule> {
        match self {
            Rule::Network(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostRule> {
        match self {
            Rule::Host(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_cosmetic(&self) -> Option<&CosmeticRule> {
        match self {
            Rule::Cosmetic(r) => Some(r),
            _ => None,
        }
    }
}

/// True for lines the scanner drops without trying any parser.
pub fn is_comment(line: &str) -> bool {
    if line.starts_with('!') {
        return true;
    }
    // '#' opens a comment unless it introduces a cosmetic marker
    line.starts_with('#')
        && !["##", "#@#", "#?#", "#@?#"]
            .iter()
            .any(|m| line.starts_with(m))
}

/// Parse one list line, trying host, cosmetic and network syntax in order.
///
/// With `ignore_cosmetic`, a line carrying a cosmetic marker is rejected
/// outright; it must not fall through to the network parser.
pub fn parse_rule(
    line: &str,
    filter_list_id: FilterListId,
    ignore_cosmetic: bool,
) -> Result<Rule, FilterError> {
    if let Ok(rule) = HostRule::new(line, filter_list_id) {
        return Ok(Rule::Host(rule));
    }
    if cosmetic::is_cosmetic(line) {
        if ignore_cosmetic {
            return Err(FilterError::Syntax(format!(
                "cosmetic rules are ignored in this list: {line}"
            )));
        }
        return CosmeticRule::new(line, filter_list_id).map(Rule::Cosmetic);
    }
    NetworkRule::new(line, filter_list_id).map(Rule::Network)
}
