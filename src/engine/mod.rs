//! Matching engines built over a [`crate::storage::RuleStorage`].
//!
//! All three engines are immutable once constructed and can be shared
//! across threads; the storage's rule cache is the only lock they touch.

pub mod cosmetic;
pub mod dns;
pub mod network;

pub use cosmetic::CosmeticEngine;
pub use dns::DnsEngine;
pub use network::{EngineOptions, NetworkEngine};
