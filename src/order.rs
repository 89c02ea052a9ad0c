//! First-appearance citation order.
//!
//! A citation's number is its 1-based position in the cited order. The order
//! is only ever rebuilt wholesale from a fresh scan or extended by appending
//! a newly inserted id; existing ids are never moved in place.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::library::OrderStore;

/// Deduplicates ids, keeping each at its first occurrence.
///
/// # Examples
///
/// ```
/// use wordref::order::canonical_order;
///
/// assert_eq!(canonical_order(["a", "b", "a", "c", "b"]), vec!["a", "b", "c"]);
/// ```
pub fn canonical_order<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for id in raw {
        let id = id.as_ref();
        if seen.insert(id.to_string()) {
            order.push(id.to_string());
        }
    }
    order
}

/// An immutable view of the cited order with O(1) number lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitedOrder {
    ids: Vec<String>,
    numbers: HashMap<String, usize>,
}

impl CitedOrder {
    pub fn new(ids: Vec<String>) -> Self {
        let ids = canonical_order(&ids);
        let numbers = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i + 1))
            .collect();
        Self { ids, numbers }
    }

    /// 1-based number of `id`, or `None` if it has not been cited.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.numbers.get(id).copied()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reads and writes the cited order through an [`OrderStore`].
#[derive(Clone)]
pub struct OrderTracker {
    store: Arc<dyn OrderStore>,
}

impl OrderTracker {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// The persisted order as it stands.
    pub fn current(&self) -> CitedOrder {
        CitedOrder::new(self.store.get())
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.store.get().iter().position(|seen| seen == id).map(|i| i + 1)
    }

    /// Appends `id` if it has not been cited yet.
    pub fn mark_cited(&self, id: &str) {
        self.store.mark_cited(id);
    }

    /// Replaces the persisted order with the canonical form of `raw`.
    pub fn rebuild(&self, raw: &[String]) -> CitedOrder {
        let order = CitedOrder::new(raw.to_vec());
        debug!(cited = order.len(), "rebuilt cited order");
        self.store.put(order.ids().to_vec());
        order
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryOrder;

    #[test]
    fn test_canonical_order_first_occurrence() {
        assert_eq!(
            canonical_order(["A", "B", "A", "C", "B"]),
            vec!["A", "B", "C"]
        );
    }

    #[test]
    fn test_canonical_order_idempotent() {
        let raw = ["x", "y", "x", "z", "z", "w", "y"];
        let once = canonical_order(raw);
        let twice = canonical_order(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_order_empty() {
        assert!(canonical_order(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_index_of() {
        let order = CitedOrder::new(vec!["a".into(), "b".into(), "a".into(), "c".into()]);
        assert_eq!(order.index_of("a"), Some(1));
        assert_eq!(order.index_of("c"), Some(3));
        assert_eq!(order.index_of("zzz"), None);
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_rebuild_replaces_instead_of_appending() {
        // Given: A stored order from an earlier state of the document
        let store = Arc::new(MemoryOrder::new());
        store.put(vec!["old".into(), "b".into()]);
        let tracker = OrderTracker::new(store.clone());

        // When: We rebuild from a fresh scan
        let raw: Vec<String> = ["b", "a", "b"].iter().map(|s| s.to_string()).collect();
        let order = tracker.rebuild(&raw);

        // Then: The store holds exactly the new canonical order
        assert_eq!(order.ids(), ["b", "a"]);
        assert_eq!(store.get(), vec!["b", "a"]);
    }

    #[test]
    fn test_mark_cited_appends_once() {
        let tracker = OrderTracker::new(Arc::new(MemoryOrder::new()));
        tracker.mark_cited("a");
        tracker.mark_cited("b");
        tracker.mark_cited("a");
        assert_eq!(tracker.index_of("b"), Some(2));
        assert_eq!(tracker.index_of("c"), None);
        assert_eq!(tracker.current().ids(), ["a", "b"]);
    }
}
