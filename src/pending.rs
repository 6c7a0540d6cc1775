//! Pending-operation queue
//!
//! Node and property writes whose external placement is not known yet.
//! Keyed by identity with last-write-wins semantics: it is a set of
//! outstanding states, not an append log. The persister removes an entry
//! the moment its chain resolves and replays it through the normal store
//! path.

use std::collections::HashMap;

use crate::model::{NodeId, NodeState, PropertyId, PropertyState};

#[derive(Default)]
pub struct PendingQueue {
    nodes: HashMap<NodeId, NodeState>,
    properties: HashMap<PropertyId, PropertyState>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node state, replacing any earlier one for the same identity.
    pub fn enqueue_node(&mut self, state: NodeState) {
        self.nodes.insert(state.id, state);
    }

    /// Queue a property state, replacing any earlier one for the same property.
    pub fn enqueue_property(&mut self, state: PropertyState) {
        self.properties.insert(state.id.clone(), state);
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    pub fn property(&self, id: &PropertyId) -> Option<&PropertyState> {
        self.properties.get(id)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Remove and return the queued state for `id`.
    pub fn take_node(&mut self, id: NodeId) -> Option<NodeState> {
        self.nodes.remove(&id)
    }

    /// Remove and return every queued property owned by `node`.
    pub fn take_properties_of(&mut self, node: NodeId) -> Vec<PropertyState> {
        let keys: Vec<PropertyId> = self
            .properties
            .keys()
            .filter(|k| k.parent == node)
            .cloned()
            .collect();
        let mut taken: Vec<PropertyState> = keys
            .into_iter()
            .filter_map(|k| self.properties.remove(&k))
            .collect();
        // stable replay order
        taken.sort_by(|a, b| a.id.name.cmp(&b.id.name));
        taken
    }

    /// Drop a queued property without replaying it.
    pub fn discard_property(&mut self, id: &PropertyId) -> Option<PropertyState> {
        self.properties.remove(id)
    }

    /// Drop everything queued for `node`, including its properties.
    pub fn discard_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
        self.properties.retain(|k, _| k.parent != node);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.properties.is_empty()
    }

    /// Identities of queued nodes
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }
}

#[cfg(test)]
mod pending_tests {
    use super::*;
    use crate::model::{Name, NodeKind, Value};

    fn node(id: u128, child: Option<u128>) -> NodeState {
        let mut state = NodeState::new(NodeId(id), Some(NodeId::ROOT), NodeKind::Container, Name::nt("folder"));
        if let Some(c) = child {
            state.add_child(Name::local("c"), NodeId(c));
        }
        state
    }

    fn prop(owner: u128, name: &str, v: &str) -> PropertyState {
        PropertyState::single(PropertyId::new(NodeId(owner), Name::local(name)), Value::String(v.into()))
    }

    #[test]
    fn test_last_write_wins_for_nodes() {
        let mut q = PendingQueue::new();
        q.enqueue_node(node(1, None));
        q.enqueue_node(node(1, Some(9)));
        assert_eq!(q.node_count(), 1);
        assert_eq!(q.take_node(NodeId(1)).unwrap().children.len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_last_write_wins_for_properties() {
        let mut q = PendingQueue::new();
        q.enqueue_property(prop(1, "p", "1"));
        q.enqueue_property(prop(1, "p", "2"));
        let taken = q.take_properties_of(NodeId(1));
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].values, vec![Value::String("2".into())]);
    }

    #[test]
    fn test_take_properties_only_for_owner() {
        let mut q = PendingQueue::new();
        q.enqueue_property(prop(1, "b", "x"));
        q.enqueue_property(prop(1, "a", "x"));
        q.enqueue_property(prop(2, "a", "x"));

        let taken = q.take_properties_of(NodeId(1));
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].id.name, Name::local("a"));
        assert_eq!(q.property_count(), 1);
    }

    #[test]
    fn test_discard_node() {
        let mut q = PendingQueue::new();
        q.enqueue_node(node(1, None));
        q.enqueue_property(prop(1, "p", "x"));
        q.discard_node(NodeId(1));
        assert!(q.is_empty());
    }
}
