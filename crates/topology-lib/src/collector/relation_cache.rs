//! Deferred relation cache
//!
//! Components and relations arrive from many workers in no particular order.
//! A relation is forwarded as soon as both of its endpoints were emitted;
//! otherwise it waits here until the end of the run.

use crate::models::{Relation, RelationType};
use dashmap::DashSet;
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct RelationCache {
    enabled: bool,
    component_ids: DashSet<String>,
    /// Edges already forwarded, by endpoints and type
    emitted: DashSet<(String, String, RelationType)>,
    deferred: Mutex<Vec<Relation>>,
}

impl RelationCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            component_ids: DashSet::new(),
            emitted: DashSet::new(),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a component id; false when it was already emitted this run
    pub fn register_component(&self, external_id: &str) -> bool {
        self.component_ids.insert(external_id.to_string())
    }

    pub fn is_known(&self, external_id: &str) -> bool {
        self.component_ids.contains(external_id)
    }

    /// Returns the relation when it may be forwarded now, `None` when it was
    /// deferred or is a duplicate.
    pub fn admit(&self, relation: Relation) -> Option<Relation> {
        if self.enabled
            && !(self.is_known(&relation.source_id) && self.is_known(&relation.target_id))
        {
            self.lock_deferred().push(relation);
            return None;
        }
        self.claim(relation)
    }

    /// Split the deferred relations into forwardable and unresolvable ones
    pub fn drain_deferred(&self) -> (Vec<Relation>, Vec<Relation>) {
        let deferred = std::mem::take(&mut *self.lock_deferred());

        let (resolved, unresolved): (Vec<_>, Vec<_>) = deferred
            .into_iter()
            .partition(|r| self.is_known(&r.source_id) && self.is_known(&r.target_id));

        (resolved.into_iter().filter_map(|r| self.claim(r)).collect(), unresolved)
    }

    pub fn deferred_len(&self) -> usize {
        self.lock_deferred().len()
    }

    fn claim(&self, relation: Relation) -> Option<Relation> {
        let key = (
            relation.source_id.clone(),
            relation.target_id.clone(),
            relation.relation_type,
        );
        if self.emitted.insert(key) {
            Some(relation)
        } else {
            None
        }
    }

    fn lock_deferred(&self) -> std::sync::MutexGuard<'_, Vec<Relation>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationType;

    #[test]
    fn test_relation_forwarded_when_both_ends_known() {
        let cache = RelationCache::new(true);
        cache.register_component("a");
        cache.register_component("b");

        let relation = cache.admit(Relation::new("a", "b", RelationType::Uses));
        assert!(relation.is_some());
        assert_eq!(cache.deferred_len(), 0);
    }

    #[test]
    fn test_relation_deferred_until_drain() {
        let cache = RelationCache::new(true);
        cache.register_component("pod");

        assert!(cache
            .admit(Relation::new("pod", "configmap", RelationType::Uses))
            .is_none());
        assert!(cache
            .admit(Relation::new("pod", "secret", RelationType::Uses))
            .is_none());
        assert_eq!(cache.deferred_len(), 2);

        cache.register_component("configmap");
        let (resolved, unresolved) = cache.drain_deferred();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].target_id, "configmap");
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].target_id, "secret");
        assert_eq!(cache.deferred_len(), 0);
    }

    #[test]
    fn test_disabled_cache_forwards_immediately() {
        let cache = RelationCache::new(false);
        let relation = cache.admit(Relation::new("x", "y", RelationType::Routes));

        assert!(relation.is_some());
        assert_eq!(cache.deferred_len(), 0);
    }

    #[test]
    fn test_duplicate_components_and_relations_rejected() {
        let cache = RelationCache::new(true);
        assert!(cache.register_component("a"));
        assert!(!cache.register_component("a"));
        cache.register_component("b");

        assert!(cache.admit(Relation::new("a", "b", RelationType::Controls)).is_some());
        assert!(cache.admit(Relation::new("a", "b", RelationType::Controls)).is_none());
    }

    #[test]
    fn test_same_endpoints_with_different_types_both_forwarded() {
        let cache = RelationCache::new(true);
        cache.register_component("pod");
        cache.register_component("configmap");

        assert!(cache
            .admit(Relation::new("pod", "configmap", RelationType::Uses))
            .is_some());
        assert!(cache
            .admit(Relation::new("pod", "configmap", RelationType::Claims))
            .is_some());
        assert!(cache
            .admit(Relation::new("pod", "configmap", RelationType::Claims))
            .is_none());
    }

    #[test]
    fn test_deferred_edges_of_different_types_survive_drain() {
        let cache = RelationCache::new(true);
        cache.register_component("pod");
        cache.admit(Relation::new("pod", "secret", RelationType::Uses));
        cache.admit(Relation::new("pod", "secret", RelationType::UsesValue));
        cache.register_component("secret");

        let (resolved, unresolved) = cache.drain_deferred();
        let mut types: Vec<_> = resolved.iter().map(|r| r.relation_type).collect();
        types.sort_by_key(|t| t.as_str());
        assert_eq!(types, vec![RelationType::Uses, RelationType::UsesValue]);
        assert!(unresolved.is_empty());
    }
}
