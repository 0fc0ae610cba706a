//! Shared engine context.
//!
//! One `Context` holds everything that used to be process-global: the
//! option table, the listing cache, and the derived rule sets. Drivers get
//! an `Arc<Context>` at request construction; tests build isolated contexts.

use std::path::PathBuf;
use std::sync::RwLock;

use xfer_transport::proxy::BypassRule;

use crate::cache::ListingCache;
use crate::options::{split_escaped, OptionTable, Value};

/// Per-extension transfer rule from the `ext` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRule {
    pub suffix: String,
    /// True for ASCII-mode transfers, false for binary.
    pub ascii: bool,
    pub viewer: String,
}

pub struct Context {
    options: RwLock<OptionTable>,
    cache: ListingCache,
}

impl Context {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            options: RwLock::new(OptionTable::new()),
            cache: ListingCache::new(cache_dir),
        }
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    /// Reads one option under the lock.
    pub fn with_options<T>(&self, f: impl FnOnce(&OptionTable) -> T) -> T {
        f(&self.options.read().unwrap())
    }

    pub fn set_option(&self, name: &str, value: Value) {
        self.options.write().unwrap().set(name, value);
    }

    pub fn set_option_from_str(&self, name: &str, raw: &str) -> bool {
        self.options.write().unwrap().set_from_str(name, raw)
    }

    /// Proxy bypass rules parsed from `dont_use_proxy`.
    pub fn proxy_bypass(&self) -> Vec<BypassRule> {
        self.with_options(|o| o.list("dont_use_proxy"))
            .iter()
            .filter_map(|entry| BypassRule::parse(entry))
            .collect()
    }

    /// Extension rules parsed from `ext` entries of the form
    /// `suffix:icon:A|B:viewer` (colons inside fields escaped as `\:`).
    pub fn extension_rules(&self) -> Vec<ExtensionRule> {
        self.with_options(|o| o.list("ext"))
            .iter()
            .filter_map(|entry| {
                let fields = split_escaped(entry, ':');
                if fields.len() < 3 || fields[0].is_empty() {
                    return None;
                }
                Some(ExtensionRule {
                    suffix: fields[0].clone(),
                    ascii: fields[2].to_ascii_uppercase().starts_with('A'),
                    viewer: fields.get(3).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Looks up the ASCII/binary decision for a file name. `None` when no
    /// rule matches, leaving the `ascii_transfers` default in charge.
    pub fn ascii_by_extension(&self, filename: &str) -> Option<bool> {
        self.extension_rules()
            .into_iter()
            .find(|rule| filename.ends_with(&rule.suffix))
            .map(|rule| rule.ascii)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}
