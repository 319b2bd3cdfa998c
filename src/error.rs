//! Error types shared across the crate.

use thiserror::Error;

/// Error type for rule parsing, storage access and snapshot decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Malformed rule line that no parser accepts.
    #[error("cannot parse rule: {0}")]
    Syntax(String),

    /// Syntactically well-formed rule with disallowed semantics
    /// (conflicting options, too-wide pattern, overlapping domain lists).
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Lookup against a storage that has been closed.
    #[error("rule storage is closed")]
    StorageClosed,

    /// Snapshot does not start with the `URF1` magic.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Snapshot record with an unrecognized tag byte.
    #[error("unknown rule tag: {0}")]
    UnknownTag(u8),

    /// Snapshot checksum failure.
    #[error("crc32 mismatch: stored={stored}, computed={computed}")]
    Crc32Mismatch { stored: u32, computed: u32 },

    /// Snapshot ended in the middle of a record.
    #[error("unexpected end of data")]
    Truncated,
}

/// A rule line that failed to parse during a list scan.
///
/// Scan errors are collected and surfaced in aggregate; they never abort
/// engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    /// 1-based line number inside the list.
    pub line_no: usize,
    /// The offending line, trimmed.
    pub text: String,
    /// Why it was rejected.
    pub error: FilterError,
}
