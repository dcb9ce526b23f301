// src/registry.rs
//! Keyed entity registry with a materialized sorted view and an optional
//! secondary index.
//!
//! Two independent locks guard each registry: `primary` for the key map and
//! secondary index, `view` for the published sorted sequences. They are never
//! held at the same time. A writer mutates `primary`, releases it, re-reads a
//! snapshot, sorts outside any lock and only then takes `view` to publish.
//! Every mutation bumps `Primary::generation`; a snapshot older than the one
//! already published is dropped, so racing writers always converge on a view
//! matching the final map.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::entity::{Caller, Entity, ViewOrder};
use crate::error::{Error, Result};

struct Primary<V: Entity> {
    entries: HashMap<V::Key, Arc<V>>,
    secondary: HashMap<String, V::Key>,
    generation: u64,
}

impl<V: Entity> Primary<V> {
    fn insert(&mut self, value: Arc<V>) {
        let key = value.key();
        let stale = self
            .entries
            .get(&key)
            .and_then(|prev| secondary_of(&**prev))
            .filter(|prev_id| Some(*prev_id) != secondary_of(&*value))
            .map(str::to_owned);
        if let Some(prev_id) = stale {
            self.unlink(&prev_id, key);
        }
        if let Some(id) = secondary_of(&*value) {
            self.secondary.insert(id.to_owned(), key);
        }
        self.entries.insert(key, value);
    }

    fn remove(&mut self, key: V::Key) -> bool {
        match self.entries.remove(&key) {
            Some(prev) => {
                if let Some(id) = secondary_of(&*prev) {
                    let id = id.to_owned();
                    self.unlink(&id, key);
                }
                true
            }
            None => false,
        }
    }

    // Only drop the mapping if it still belongs to `key`.
    fn unlink(&mut self, id: &str, key: V::Key) {
        if self.secondary.get(id) == Some(&key) {
            self.secondary.remove(id);
        }
    }
}

fn secondary_of<V: Entity>(v: &V) -> Option<&str> {
    v.secondary_key().filter(|id| !id.is_empty())
}

struct SortedView<V> {
    generation: u64,
    all: Arc<[Arc<V>]>,
    visible: Arc<[Arc<V>]>,
}

/// Concurrency-safe mirror of one persisted entity collection.
pub struct Registry<V: Entity, O: ViewOrder<V>> {
    primary: RwLock<Primary<V>>,
    view: RwLock<SortedView<V>>,
    order: O,
}

impl<V: Entity, O: ViewOrder<V>> Registry<V, O> {
    /// Build a registry from a full snapshot. Later duplicates of a key
    /// replace earlier ones.
    pub fn new(order: O, initial: impl IntoIterator<Item = V>) -> Self {
        let mut primary = Primary {
            entries: HashMap::new(),
            secondary: HashMap::new(),
            generation: 0,
        };
        for value in initial {
            primary.insert(Arc::new(value));
        }
        let snapshot: Vec<Arc<V>> = primary.entries.values().cloned().collect();
        let view = sort_snapshot(&order, 0, snapshot);
        Self {
            primary: RwLock::new(primary),
            view: RwLock::new(view),
            order,
        }
    }

    /// Point lookup.
    pub fn get(&self, key: V::Key) -> Option<Arc<V>> {
        self.primary.read().entries.get(&key).cloned()
    }

    /// Copy of the current contents. Not kept in sync with later mutations.
    pub fn get_list(&self) -> HashMap<V::Key, Arc<V>> {
        self.primary.read().entries.clone()
    }

    /// Resolve every key or fail on the first one that is missing.
    pub fn get_many(&self, keys: impl IntoIterator<Item = V::Key>) -> Result<Vec<Arc<V>>> {
        let primary = self.primary.read();
        keys.into_iter()
            .map(|key| {
                primary
                    .entries
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| Error::NotFound(key.into()))
            })
            .collect()
    }

    /// Every entity, ordered by the registry's comparator.
    pub fn sorted_list(&self) -> Arc<[Arc<V>]> {
        self.view.read().all.clone()
    }

    /// The sorted list without entities the order marks as hidden.
    pub fn filtered_sorted_list(&self) -> Arc<[Arc<V>]> {
        self.view.read().visible.clone()
    }

    /// Visit entries under the read lock until `visit` breaks.
    ///
    /// `visit` must not call [`update`](Self::update) or
    /// [`delete`](Self::delete) on this registry; the lock is not reentrant.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(V::Key, &Arc<V>) -> ControlFlow<()>,
    {
        let primary = self.primary.read();
        for (key, value) in primary.entries.iter() {
            if visit(*key, value).is_break() {
                break;
            }
        }
    }

    /// Number of entities currently held.
    pub fn len(&self) -> usize {
        self.primary.read().entries.len()
    }

    /// Whether the registry holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install or replace the entry for `value`'s key, then republish the
    /// sorted view.
    pub fn update(&self, value: impl Into<Arc<V>>) {
        let value = value.into();
        let key = value.key();
        {
            let mut primary = self.primary.write();
            primary.insert(value);
            primary.generation += 1;
        }
        debug!(?key, "registry entry updated");
        self.rebuild();
    }

    /// Remove the given keys. Missing keys are ignored.
    pub fn delete(&self, keys: impl IntoIterator<Item = V::Key>) {
        let removed = {
            let mut primary = self.primary.write();
            let removed = keys.into_iter().filter(|key| primary.remove(*key)).count();
            primary.generation += 1;
            removed
        };
        debug!(removed, "registry entries deleted");
        self.rebuild();
    }

    /// Whether `caller` may act on every listed entity that is currently
    /// present. Keys not in the registry do not deny access.
    pub fn check_permission(
        &self,
        caller: &Caller,
        keys: impl IntoIterator<Item = V::Key>,
    ) -> bool {
        let primary = self.primary.read();
        keys.into_iter().all(|key| {
            primary
                .entries
                .get(&key)
                .map_or(true, |v| v.has_permission(caller))
        })
    }

    /// Key of the entity currently carrying external identifier `id`.
    pub fn lookup_secondary(&self, id: &str) -> Option<V::Key> {
        self.primary.read().secondary.get(id).copied()
    }

    /// Entity currently carrying external identifier `id`.
    pub fn get_by_secondary(&self, id: &str) -> Option<Arc<V>> {
        let primary = self.primary.read();
        primary
            .secondary
            .get(id)
            .and_then(|key| primary.entries.get(key))
            .cloned()
    }

    /// Caller-side uniqueness check to run before writing an entity that
    /// carries `id` under `key`.
    pub fn ensure_secondary_available(&self, id: &str, key: V::Key) -> Result<()> {
        match self.lookup_secondary(id) {
            Some(holder) if holder != key => Err(Error::DuplicateSecondaryKey {
                secondary: id.to_owned(),
                holder: holder.into(),
            }),
            _ => Ok(()),
        }
    }

    fn rebuild(&self) {
        let (generation, snapshot) = {
            let primary = self.primary.read();
            let snapshot: Vec<Arc<V>> = primary.entries.values().cloned().collect();
            (primary.generation, snapshot)
        };
        let fresh = sort_snapshot(&self.order, generation, snapshot);

        let mut view = self.view.write();
        if fresh.generation <= view.generation {
            trace!(generation, published = view.generation, "dropping stale sorted view");
            return;
        }
        *view = fresh;
    }
}

fn sort_snapshot<V: Entity, O: ViewOrder<V>>(
    order: &O,
    generation: u64,
    mut snapshot: Vec<Arc<V>>,
) -> SortedView<V> {
    // Stable sort with the key as final tie-break so map iteration order
    // never leaks into the view.
    snapshot.sort_by(|a, b| order.compare(a, b).then_with(|| a.key().cmp(&b.key())));
    let visible: Vec<Arc<V>> = snapshot.iter().filter(|v| order.visible(v)).cloned().collect();
    SortedView {
        generation,
        all: snapshot.into(),
        visible: visible.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ByKey;
    use std::cmp::Ordering;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u64,
        owner: u64,
        rank: i32,
        tag: String,
        hidden: bool,
    }

    impl Item {
        fn new(id: u64, rank: i32) -> Self {
            Self { id, owner: 1, rank, tag: String::new(), hidden: false }
        }

        fn tagged(id: u64, tag: &str) -> Self {
            Self { tag: tag.to_string(), ..Self::new(id, 0) }
        }
    }

    impl Entity for Item {
        type Key = u64;

        fn key(&self) -> u64 {
            self.id
        }

        fn secondary_key(&self) -> Option<&str> {
            Some(&self.tag)
        }

        fn has_permission(&self, caller: &Caller) -> bool {
            caller.can_access(self.owner)
        }
    }

    struct RankDesc;

    impl ViewOrder<Item> for RankDesc {
        fn compare(&self, a: &Item, b: &Item) -> Ordering {
            b.rank.cmp(&a.rank)
        }

        fn visible(&self, v: &Item) -> bool {
            !v.hidden
        }
    }

    fn ids(list: &[Arc<Item>]) -> Vec<u64> {
        list.iter().map(|i| i.id).collect()
    }

    #[test]
    fn sorts_by_rank_then_key() {
        let reg = Registry::new(RankDesc, vec![Item::new(2, 5), Item::new(1, 5), Item::new(3, 9)]);
        assert_eq!(ids(&reg.sorted_list()), vec![3, 1, 2]);

        reg.update(Item::new(2, 10));
        assert_eq!(ids(&reg.sorted_list()), vec![2, 3, 1]);
    }

    #[test]
    fn filtered_view_skips_hidden() {
        let mut hidden = Item::new(2, 7);
        hidden.hidden = true;
        let reg = Registry::new(RankDesc, vec![Item::new(1, 1), hidden, Item::new(3, 3)]);
        assert_eq!(ids(&reg.sorted_list()), vec![2, 3, 1]);
        assert_eq!(ids(&reg.filtered_sorted_list()), vec![3, 1]);
    }

    #[test]
    fn delete_is_idempotent() {
        let reg = Registry::new(ByKey, vec![Item::new(1, 0), Item::new(2, 0)]);
        reg.delete([1]);
        let once = ids(&reg.sorted_list());
        reg.delete([1]);
        assert_eq!(ids(&reg.sorted_list()), once);
        assert_eq!(reg.len(), 1);
        assert!(reg.get(1).is_none());
    }

    #[test]
    fn previously_read_values_survive_replacement() {
        let reg = Registry::new(ByKey, vec![Item::new(1, 1)]);
        let before = reg.get(1).expect("present");
        reg.update(Item::new(1, 2));
        assert_eq!(before.rank, 1);
        assert_eq!(reg.get(1).map(|i| i.rank), Some(2));
    }

    #[test]
    fn secondary_index_follows_updates() {
        let reg = Registry::new(ByKey, vec![Item::tagged(1, "a")]);
        assert_eq!(reg.lookup_secondary("a"), Some(1));

        reg.update(Item::tagged(1, "b"));
        assert_eq!(reg.lookup_secondary("a"), None);
        assert_eq!(reg.lookup_secondary("b"), Some(1));
        assert_eq!(reg.get_by_secondary("b").map(|i| i.id), Some(1));

        reg.delete([1]);
        assert_eq!(reg.lookup_secondary("b"), None);
    }

    #[test]
    fn empty_secondary_is_not_indexed() {
        let reg = Registry::new(ByKey, vec![Item::new(1, 0)]);
        assert_eq!(reg.lookup_secondary(""), None);
    }

    #[test]
    fn ensure_secondary_available_rejects_other_holder() {
        let reg = Registry::new(ByKey, vec![Item::tagged(1, "a")]);
        assert!(reg.ensure_secondary_available("a", 1).is_ok());
        assert!(reg.ensure_secondary_available("z", 2).is_ok());
        assert_eq!(
            reg.ensure_secondary_available("a", 2),
            Err(Error::DuplicateSecondaryKey { secondary: "a".into(), holder: 1 })
        );
    }

    #[test]
    fn get_many_reports_first_missing_key() {
        let reg = Registry::new(ByKey, vec![Item::new(1, 0), Item::new(2, 0)]);
        assert_eq!(ids(&reg.get_many([2, 1]).unwrap()), vec![2, 1]);
        assert_eq!(reg.get_many([1, 7, 8]).unwrap_err(), Error::NotFound(7));
    }

    #[test]
    fn range_stops_early() {
        let reg = Registry::new(ByKey, (1..=10).map(|i| Item::new(i, 0)));
        let mut seen = 0;
        reg.range(|_, _| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn permission_check_ignores_absent_keys() {
        let mut foreign = Item::new(1, 0);
        foreign.owner = 99;
        let reg = Registry::new(ByKey, vec![foreign, Item::new(2, 0)]);
        let member = Caller::member(1);

        assert!(!reg.check_permission(&member, [1, 42]));
        assert!(reg.check_permission(&member, [2, 42]));
        assert!(reg.check_permission(&Caller::admin(5), [1, 2]));

        reg.delete([1]);
        assert!(reg.check_permission(&member, [1]));
    }
}
