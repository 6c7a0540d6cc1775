//! Stream registry
//!
//! A named byte stream shows up in the tree as two nodes: a holder (named
//! after the stream) and its single `jcr:content` child. The registry keeps
//! the associations between those nodes, their container and the stream.

use std::collections::HashMap;

use crate::model::NodeId;

/// What is known about the stream behind one holder node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Tree name of the holder
    pub name: String,
    /// Repository stream id
    pub stream_id: String,
    pub label: String,
    pub mime_type: Option<String>,
}

#[derive(Default)]
pub struct StreamRegistry {
    /// holder -> owning container, None while the container is unknown
    holder_owner: HashMap<NodeId, Option<NodeId>>,
    /// content -> holder
    content_holder: HashMap<NodeId, NodeId>,
    /// holder -> content
    holder_content: HashMap<NodeId, NodeId>,
    descriptors: HashMap<NodeId, StreamDescriptor>,
    /// container -> (stream id -> holder), for identity reuse across loads
    by_container: HashMap<NodeId, HashMap<String, NodeId>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `holder` as the node for `stream_id` on `container`.
    pub fn register_holder(&mut self, holder: NodeId, container: NodeId, descriptor: StreamDescriptor) {
        self.by_container
            .entry(container)
            .or_default()
            .insert(descriptor.stream_id.clone(), holder);
        self.holder_owner.insert(holder, Some(container));
        self.descriptors
            .entry(holder)
            .and_modify(|d| {
                d.name = descriptor.name.clone();
                d.stream_id = descriptor.stream_id.clone();
                if !descriptor.label.is_empty() {
                    d.label = descriptor.label.clone();
                }
                if descriptor.mime_type.is_some() {
                    d.mime_type = descriptor.mime_type.clone();
                }
            })
            .or_insert(descriptor);
    }

    /// Mark `holder` as a stream holder whose container is not known yet.
    pub fn mark_holder(&mut self, holder: NodeId) {
        self.holder_owner.entry(holder).or_insert(None);
    }

    pub fn register_content(&mut self, content: NodeId, holder: NodeId) {
        self.content_holder.insert(content, holder);
        self.holder_content.insert(holder, content);
        self.holder_owner.entry(holder).or_insert(None);
    }

    pub fn is_holder(&self, id: NodeId) -> bool {
        self.holder_owner.contains_key(&id)
    }

    pub fn is_content(&self, id: NodeId) -> bool {
        self.content_holder.contains_key(&id)
    }

    pub fn owner(&self, holder: NodeId) -> Option<NodeId> {
        self.holder_owner.get(&holder).copied().flatten()
    }

    pub fn holder_of(&self, content: NodeId) -> Option<NodeId> {
        self.content_holder.get(&content).copied()
    }

    pub fn content_of(&self, holder: NodeId) -> Option<NodeId> {
        self.holder_content.get(&holder).copied()
    }

    /// Previously assigned holder for `stream_id` on `container`
    pub fn holder_for(&self, container: NodeId, stream_id: &str) -> Option<NodeId> {
        self.by_container.get(&container)?.get(stream_id).copied()
    }

    pub fn descriptor(&self, holder: NodeId) -> Option<&StreamDescriptor> {
        self.descriptors.get(&holder)
    }

    pub fn set_mime_type(&mut self, holder: NodeId, mime_type: &str) {
        self.descriptors.entry(holder).or_default().mime_type = Some(mime_type.to_string());
    }

    /// Container and descriptor behind a content node, if the whole chain is known
    pub fn resolve_content(&self, content: NodeId) -> Option<(NodeId, NodeId, &StreamDescriptor)> {
        let holder = self.holder_of(content)?;
        let container = self.owner(holder)?;
        let descriptor = self.descriptors.get(&holder)?;
        if descriptor.stream_id.is_empty() {
            return None;
        }
        Some((container, holder, descriptor))
    }

    /// Forget a holder and its content node.
    pub fn remove_holder(&mut self, holder: NodeId) {
        if let Some(Some(container)) = self.holder_owner.remove(&holder) {
            if let Some(map) = self.by_container.get_mut(&container) {
                map.retain(|_, h| *h != holder);
            }
        }
        if let Some(content) = self.holder_content.remove(&holder) {
            self.content_holder.remove(&content);
        }
        self.descriptors.remove(&holder);
    }

    /// Holders registered for `container`
    pub fn holders_of(&self, container: NodeId) -> Vec<NodeId> {
        self.by_container
            .get(&container)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default()
    }
}
