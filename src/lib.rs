//! urlfilter
//!
//! A URL filtering engine: given a corpus of declarative filtering rules
//! (tens to hundreds of thousands), it decides whether a web request or a
//! DNS hostname should be blocked, allowed or left alone.
//!
//! # Architecture
//!
//! Rule lists are loaded into a [`storage::RuleStorage`], which owns the
//! raw text, assigns every rule a stable 64-bit id and lazily materializes
//! parsed rules through a small LRU cache. Engines are built over the
//! storage and hold only ids plus index entries:
//!
//! - [`engine::NetworkEngine`] indexes network rules by literal shortcut
//!   windows and permitted domains, and returns the highest-priority match
//!   for a [`request::Request`].
//! - [`engine::DnsEngine`] unifies host rules and hostname-reducible
//!   network rules for hostname-only queries.
//! - [`engine::CosmeticEngine`] serves element-hiding rules by hostname.
//!
//! Everything is immutable after construction; matching does no I/O and
//! takes no locks beyond the storage cache.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use urlfilter::{NetworkEngine, Request, RequestType, RuleStorage, StringRuleList};
//!
//! let storage = Arc::new(RuleStorage::new(vec![StringRuleList {
//!     id: 1,
//!     text: "||ads.example.org^$third-party".to_string(),
//!     ignore_cosmetic: true,
//! }])?);
//! let engine = NetworkEngine::new(storage);
//!
//! let request = Request::new(
//!     "https://ads.example.org/banner.png",
//!     "https://news.example.com/",
//!     RequestType::IMAGE,
//! );
//! assert!(engine.match_request(&request).is_some());
//! # Ok::<(), urlfilter::FilterError>(())
//! ```

pub mod engine;
pub mod error;
pub mod hash;
pub mod psl;
pub mod request;
pub mod rules;
pub mod snapshot;
pub mod storage;
pub mod types;
pub mod url;

pub use engine::{CosmeticEngine, DnsEngine, EngineOptions, NetworkEngine};
pub use error::{FilterError, ScanError};
pub use request::Request;
pub use rules::{CosmeticRule, HostRule, NetworkRule, Rule};
pub use storage::{RuleStorage, StorageOptions, StringRuleList};
pub use types::{FilterListId, NetworkRuleOption, RequestType, RuleId};
