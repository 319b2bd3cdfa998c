//! Rule storage: owns the list text buffers, assigns rule ids and lazily
//! materializes parsed rules through a small LRU cache.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{FilterError, ScanError};
use crate::rules::scanner::{parse_at, scan_lines};
use crate::rules::Rule;
use crate::types::{FilterListId, RuleId};

/// Default capacity of the parsed-rule cache.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// One filter list: an id, the raw rules text, and whether cosmetic rules
/// should be skipped while scanning it.
#[derive(Debug, Clone)]
pub struct StringRuleList {
    pub id: FilterListId,
    pub text: String,
    pub ignore_cosmetic: bool,
}

/// Construction-time tuning for [`RuleStorage`].
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Parsed-rule cache capacity, in entries.
    pub cache_capacity: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

// =============================================================================
// LRU Cache
// =============================================================================

/// Fixed-size cache for parsed rules. Basic LRU with a hashmap + deque.
struct RuleCache {
    capacity: usize,
    entries: HashMap<RuleId, Arc<Rule>>,
    order: VecDeque<RuleId>,
}

impl RuleCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: RuleId) -> Option<Arc<Rule>> {
        let rule = self.entries.get(&key)?.clone();
        self.mark_used(key);
        Some(rule)
    }

    fn insert(&mut self, key: RuleId, value: Arc<Rule>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(coldest) = self.order.pop_front() {
                self.entries.remove(&coldest);
            }
        }
        self.mark_used(key);
        self.entries.insert(key, value);
    }

    // Back of the deque is most recently used
    fn mark_used(&mut self, key: RuleId) {
        self.order.retain(|k| *k != key);
        self.order.push_back(key);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// =============================================================================
// RuleStorage
// =============================================================================

/// Owns the backing text for all rule lists and hands out parsed rules by
/// id. Append-only at construction; immutable afterwards except for the
/// cache, which is a pure optimization.
pub struct RuleStorage {
    // None once closed
    lists: RwLock<Option<Vec<StringRuleList>>>,
    cache: Mutex<RuleCache>,
}

impl RuleStorage {
    /// Create a storage from the given lists. List ids must be unique.
    pub fn new(lists: Vec<StringRuleList>) -> Result<Self, FilterError> {
        Self::with_options(lists, StorageOptions::default())
    }

    pub fn with_options(
        lists: Vec<StringRuleList>,
        options: StorageOptions,
    ) -> Result<Self, FilterError> {
        let mut seen = HashMap::new();
        for (index, list) in lists.iter().enumerate() {
            if let Some(previous) = seen.insert(list.id, index) {
                return Err(FilterError::InvalidRule(format!(
                    "duplicate list id {} (lists {} and {})",
                    list.id, previous, index
                )));
            }
        }

        Ok(Self {
            lists: RwLock::new(Some(lists)),
            cache: Mutex::new(RuleCache::new(options.cache_capacity)),
        })
    }

    /// Scan every list, invoking `visit` for each parsed rule. Returns the
    /// lines that failed to parse; they never abort the scan.
    pub fn scan(&self, mut visit: impl FnMut(RuleId, Rule)) -> Vec<ScanError> {
        let mut errors = Vec::new();
        let guard = self.lists.read();
        let Some(lists) = guard.as_ref() else {
            return errors;
        };
        for (index, list) in lists.iter().enumerate() {
            let before = errors.len();
            scan_lines(
                &list.text,
                index as u32,
                list.id,
                list.ignore_cosmetic,
                &mut visit,
                &mut errors,
            );
            debug!(
                list = list.id,
                bytes = list.text.len(),
                discarded = errors.len() - before,
                "scanned list"
            );
        }
        errors
    }

    /// Get the parsed rule for an id, re-parsing from the backing text on a
    /// cache miss. Racing fills are idempotent: both sides parse the same
    /// bytes.
    pub fn retrieve(&self, id: RuleId) -> Result<Arc<Rule>, FilterError> {
        if let Some(rule) = self.cache.lock().get(id) {
            return Ok(rule);
        }

        let guard = self.lists.read();
        let lists = guard.as_ref().ok_or(FilterError::StorageClosed)?;
        let list = lists
            .get(id.list_index() as usize)
            .ok_or_else(|| FilterError::Syntax(format!("unknown rule id: {id}")))?;

        let rule = Arc::new(parse_at(
            &list.text,
            id.byte_offset(),
            list.id,
            list.ignore_cosmetic,
        )?);
        self.cache.lock().insert(id, rule.clone());
        Ok(rule)
    }

    /// The raw text of the rule at `id`, straight from the list buffer.
    pub fn rule_text(&self, id: RuleId) -> Result<String, FilterError> {
        let guard = self.lists.read();
        let lists = guard.as_ref().ok_or(FilterError::StorageClosed)?;
        let list = lists
            .get(id.list_index() as usize)
            .ok_or_else(|| FilterError::Syntax(format!("unknown rule id: {id}")))?;
        let start = id.byte_offset() as usize;
        if start >= list.text.len() {
            return Err(FilterError::Syntax(format!("unknown rule id: {id}")));
        }
        let end = list.text[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(list.text.len());
        Ok(list.text[start..end].trim().to_string())
    }

    /// Number of cached parsed rules.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Release the backing buffers and drop the cache. Later lookups fail
    /// with [`FilterError::StorageClosed`].
    pub fn close(&self) {
        *self.lists.write() = None;
        self.cache.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lists.read().is_none()
    }
}
