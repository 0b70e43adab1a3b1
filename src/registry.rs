use std::collections::HashSet;

use crate::util;

/// Ordered set of tracked symbols.
///
/// Symbols keep first-seen order, are stored upper case and never
/// removed. The order is the order they appear in the request target.
#[derive(Debug, Default, Clone)]
pub struct SymbolRegistry {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from an initial list, dropping duplicates
    /// and blank entries.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for symbol in symbols {
            registry.add(symbol.as_ref());
        }
        registry
    }

    pub fn contains(&self, symbol: &str) -> bool {
        util::normalize_symbol(symbol).is_some_and(|s| self.seen.contains(&s))
    }

    /// Appends `symbol` unless an equal (case-insensitive) entry exists.
    ///
    /// Returns `true` only when the set grew.
    pub fn add(&mut self, symbol: &str) -> bool {
        let Some(symbol) = util::normalize_symbol(symbol) else {
            return false;
        };

        if !self.seen.insert(symbol.clone()) {
            return false;
        }
        self.ordered.push(symbol);
        true
    }

    pub fn list(&self) -> &[String] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
