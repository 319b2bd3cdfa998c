//! Line-level scanning of filter lists.
//!
//! A list is one contiguous text buffer; every rule id produced here embeds
//! the byte offset of its raw line so the storage can re-parse the exact
//! same text later.

use tracing::warn;

use crate::error::{FilterError, ScanError};
use crate::rules::{is_comment, parse_rule, Rule};
use crate::types::{FilterListId, RuleId};

/// Walk all lines of a list, parsing each non-comment line and reporting
/// the rest. Parse failures are collected, never fatal.
pub fn scan_lines(
    text: &str,
    list_index: u32,
    filter_list_id: FilterListId,
    ignore_cosmetic: bool,
    visit: &mut dyn FnMut(RuleId, Rule),
    errors: &mut Vec<ScanError>,
) {
    let mut start = 0usize;
    let mut line_no = 0usize;

    loop {
        let end = text[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(text.len());
        line_no += 1;

        let line = text[start..end].trim();
        let skip = line.is_empty()
            || is_comment(line)
            || (ignore_cosmetic && crate::rules::cosmetic::is_cosmetic(line));
        if !skip {
            match parse_rule(line, filter_list_id, ignore_cosmetic) {
                Ok(rule) => visit(RuleId::new(list_index, start as u32), rule),
                Err(error) => {
                    warn!(list = filter_list_id, line_no, text = line, %error, "discarding rule");
                    errors.push(ScanError {
                        line_no,
                        text: line.to_string(),
                        error,
                    });
                }
            }
        }

        if end == text.len() {
            break;
        }
        start = end + 1;
    }
}

/// Re-parse the rule whose raw line starts at `byte_offset` in `text`.
pub fn parse_at(
    text: &str,
    byte_offset: u32,
    filter_list_id: FilterListId,
    ignore_cosmetic: bool,
) -> Result<Rule, FilterError> {
    let start = byte_offset as usize;
    if start >= text.len() {
        return Err(FilterError::Syntax(format!(
            "no rule at offset {byte_offset}"
        )));
    }
    let end = text[start..].find('\n').map(|i| start + i).unwrap_or(text.len());
    parse_rule(text[start..end].trim(), filter_list_id, ignore_cosmetic)
}
