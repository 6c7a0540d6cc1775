//! Tree persister (store path)
//!
//! Stores run as a worklist: storing a node can make queued children
//! resolvable, and those are pushed onto the same list instead of being
//! written through recursion. Work whose identifier cannot be resolved yet
//! goes to the pending queue and is picked up when its parent is stored or
//! loaded.

use std::collections::VecDeque;
use std::io::Write;

use crate::codec::{self, literal, vocab};
use crate::config::AdapterConfig;
use crate::connector::Connector;
use crate::error::{AdapterError, Result};
use crate::index::streams::StreamDescriptor;
use crate::index::PidClaim;
use crate::model::{Name, NodeId, NodeKind, NodeReferences, NodeState, PropertyId, PropertyState, Value};
use crate::persistence::{AdapterState, DEFAULT_MIME_TYPE};

/// One unit of store work
#[derive(Clone, Debug)]
pub enum Work {
    Node(NodeState),
    Property(PropertyState),
}

pub struct Persister<'a> {
    connector: &'a dyn Connector,
    state: &'a mut AdapterState,
    config: &'a AdapterConfig,
}

fn holder_descriptor(segment: &str) -> StreamDescriptor {
    StreamDescriptor {
        name: segment.to_string(),
        stream_id: codec::stream_id_for(segment),
        label: segment.to_string(),
        mime_type: None,
    }
}

/// Queued properties of one node with stream data last, so a MIME type
/// stored in the same pass is already known at upload time
fn ordered(mut properties: Vec<PropertyState>) -> Vec<PropertyState> {
    properties.sort_by_key(|p| p.id.name == Name::jcr("data"));
    properties
}

impl<'a> Persister<'a> {
    pub fn new(connector: &'a dyn Connector, state: &'a mut AdapterState, config: &'a AdapterConfig) -> Self {
        Persister {
            connector,
            state,
            config,
        }
    }

    /// Process `work` and everything it unblocks.
    pub fn run(&mut self, work: Vec<Work>) -> Result<()> {
        let mut queue: VecDeque<Work> = work.into();
        let mut processed = 0usize;
        while let Some(item) = queue.pop_front() {
            match item {
                Work::Node(node) => self.store_node(node, &mut queue)?,
                Work::Property(property) => self.store_property(property)?,
            }
            processed += 1;
        }
        tracing::trace!(processed, pending = self.state.pending.len(), "store pass finished");
        Ok(())
    }

    /// Record holder/content associations for a batch before anything in it
    /// is written, so batch order does not decide how children are classified.
    pub fn register_streams<'n>(&mut self, nodes: impl IntoIterator<Item = &'n NodeState>) {
        let nodes: Vec<&NodeState> = nodes.into_iter().collect();
        for node in &nodes {
            if node.kind == NodeKind::StreamHolder {
                self.state.streams.mark_holder(node.id);
                for child in &node.children {
                    self.state.streams.register_content(child.id, node.id);
                }
            }
        }
        for node in &nodes {
            if node.kind != NodeKind::Container {
                continue;
            }
            for child in &node.children {
                if self.state.streams.is_holder(child.id) {
                    let segment = child.name.path_segment();
                    self.state
                        .streams
                        .register_holder(child.id, node.id, holder_descriptor(&segment));
                }
            }
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    fn store_node(&mut self, node: NodeState, queue: &mut VecDeque<Work>) -> Result<()> {
        match node.kind {
            NodeKind::Root => self.store_root(node, queue),
            NodeKind::System => {
                tracing::debug!(id = %node.id, "ignoring store of system node");
                Ok(())
            }
            NodeKind::Container => self.store_container(node, queue),
            NodeKind::StreamHolder => self.store_holder(node, queue),
            NodeKind::StreamContent => self.store_content(node, queue),
        }
    }

    fn store_root(&mut self, node: NodeState, queue: &mut VecDeque<Work>) -> Result<()> {
        for child in &node.children {
            if child.id.is_fabricated() {
                continue;
            }
            self.state
                .index
                .register_path(child.id, &child.name.path_segment(), NodeId::ROOT);
            self.push_pending(child.id, queue);
        }
        Ok(())
    }

    fn store_container(&mut self, node: NodeState, queue: &mut VecDeque<Work>) -> Result<()> {
        let pid = match self.state.index.resolve_external_id(node.id) {
            Some(pid) => pid,
            None => {
                tracing::debug!(id = %node.id, "parent not mapped yet, node queued");
                self.state.pending.enqueue_node(node);
                return Ok(());
            }
        };
        self.claim(&pid, node.id)?;
        self.ensure_object(&pid, node.id)?;

        for child in &node.children {
            if child.id.is_fabricated() {
                continue;
            }
            let segment = child.name.path_segment();
            if self.is_holder(child.id) {
                self.state
                    .streams
                    .register_holder(child.id, node.id, holder_descriptor(&segment));
                self.push_pending(child.id, queue);
                if let Some(content) = self.state.streams.content_of(child.id) {
                    self.push_pending(content, queue);
                }
                continue;
            }

            self.state.index.register_path(child.id, &segment, node.id);
            let child_pid = self
                .state
                .index
                .resolve_external_id(child.id)
                .ok_or(AdapterError::Unresolved(child.id))?;
            self.claim(&child_pid, child.id)?;
            self.ensure_object(&child_pid, child.id)?;
            self.connector.add_membership(&pid, &child_pid)?;
            self.push_pending(child.id, queue);
        }

        let type_literal = literal::encode_property(&PropertyState::single(
            PropertyId::new(node.id, Name::jcr("primaryType")),
            Value::Name(node.node_type.clone()),
        ));
        self.connector.delete_property(&pid, vocab::PRIMARY_TYPE_URI)?;
        self.connector.add_property(&pid, vocab::PRIMARY_TYPE_URI, &type_literal)?;

        self.connector.delete_property(&pid, vocab::MIXIN_TYPES_URI)?;
        if !node.mixins.is_empty() {
            self.connector
                .add_property(&pid, vocab::MIXIN_TYPES_URI, &literal::encode_mixins(&node.mixins))?;
        }

        for property in ordered(self.state.pending.take_properties_of(node.id)) {
            queue.push_back(Work::Property(property));
        }
        tracing::debug!(pid = %pid, children = node.children.len(), "container stored");
        Ok(())
    }

    fn store_holder(&mut self, node: NodeState, queue: &mut VecDeque<Work>) -> Result<()> {
        self.state.streams.mark_holder(node.id);
        if let Some(content) = node.child(&Name::jcr("content")) {
            self.state.streams.register_content(content, node.id);
        }
        if self.state.streams.owner(node.id).is_none() {
            tracing::debug!(id = %node.id, "stream holder without container, queued");
            self.state.pending.enqueue_node(node);
            return Ok(());
        }
        if let Some(content) = self.state.streams.content_of(node.id) {
            self.push_pending(content, queue);
        }
        // holders carry nothing but their type
        self.state.pending.take_properties_of(node.id);
        Ok(())
    }

    fn store_content(&mut self, node: NodeState, queue: &mut VecDeque<Work>) -> Result<()> {
        if let Some(holder) = node.parent {
            if !self.state.streams.is_content(node.id) {
                self.state.streams.register_content(node.id, holder);
            }
        }
        if self.state.streams.resolve_content(node.id).is_none() {
            tracing::debug!(id = %node.id, "stream content without holder, queued");
            self.state.pending.enqueue_node(node);
            return Ok(());
        }
        for property in ordered(self.state.pending.take_properties_of(node.id)) {
            queue.push_back(Work::Property(property));
        }
        Ok(())
    }

    /// Queue the pending node `id`, or its pending properties if only those wait.
    fn push_pending(&mut self, id: NodeId, queue: &mut VecDeque<Work>) {
        if let Some(pending) = self.state.pending.take_node(id) {
            queue.push_back(Work::Node(pending));
        } else {
            for property in ordered(self.state.pending.take_properties_of(id)) {
                queue.push_back(Work::Property(property));
            }
        }
    }

    fn is_holder(&self, id: NodeId) -> bool {
        self.state.streams.is_holder(id)
            || self
                .state
                .pending
                .node(id)
                .is_some_and(|n| n.kind == NodeKind::StreamHolder)
    }

    fn is_content(&self, id: NodeId) -> bool {
        self.state.streams.is_content(id)
            || self
                .state
                .pending
                .node(id)
                .is_some_and(|n| n.kind == NodeKind::StreamContent)
    }

    fn claim(&mut self, pid: &str, node: NodeId) -> Result<()> {
        match self.state.index.claim_pid(pid, node) {
            PidClaim::Claimed | PidClaim::Owned => Ok(()),
            PidClaim::Collision(owner) => {
                tracing::error!(pid, %owner, %node, "external identifier collision");
                Err(AdapterError::IdentifierCollision {
                    pid: pid.to_string(),
                    owner,
                    node,
                })
            }
        }
    }

    /// Create the object for `id` unless it is known to exist. New objects
    /// record the node identity so it survives a restart.
    fn ensure_object(&mut self, pid: &str, id: NodeId) -> Result<()> {
        if self.state.confirmed.contains(&id) {
            return Ok(());
        }
        if !self.connector.exists_object(pid)? {
            self.connector.create_object(pid)?;
            let uuid = literal::encode_property(&PropertyState::single(
                PropertyId::new(id, Name::jcr("uuid")),
                Value::String(id.to_string()),
            ));
            self.connector.add_property(pid, vocab::UUID_URI, &uuid)?;
            tracing::debug!(pid, %id, "object created");
        }
        self.state.confirmed.insert(id);
        Ok(())
    }

    fn container_exists(&mut self, id: NodeId, pid: &str) -> Result<bool> {
        if self.state.confirmed.contains(&id) {
            return Ok(true);
        }
        let exists = self.connector.exists_object(pid)?;
        if exists {
            self.state.confirmed.insert(id);
        }
        Ok(exists)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn store_property(&mut self, property: PropertyState) -> Result<()> {
        let owner = property.id.parent;
        if owner.is_fabricated() || owner == NodeId::ROOT {
            return Ok(());
        }
        if self.is_content(owner) {
            return self.store_content_property(property);
        }
        if self.is_holder(owner) {
            return Ok(());
        }

        let resolved = self.state.index.resolve_external_id(owner);
        let pid = match resolved {
            Some(pid) if self.container_exists(owner, &pid)? => pid,
            _ => {
                tracing::debug!(property = %property.id, "owner not stored yet, property queued");
                self.state.pending.enqueue_property(property);
                return Ok(());
            }
        };
        // mixins are written with the node
        if property.id.name == Name::jcr("mixinTypes") {
            return Ok(());
        }
        let uri = codec::property_uri(&property.id.name, &self.config.default_namespace);
        self.connector.delete_property(&pid, &uri)?;
        self.connector
            .add_property(&pid, &uri, &literal::encode_property(&property))?;
        Ok(())
    }

    fn store_content_property(&mut self, property: PropertyState) -> Result<()> {
        let resolved = self
            .state
            .streams
            .resolve_content(property.id.parent)
            .map(|(container, holder, d)| (container, holder, d.clone()));
        let (container, holder, descriptor) = match resolved {
            Some(r) => r,
            None => {
                self.state.pending.enqueue_property(property);
                return Ok(());
            }
        };
        let resolved = self.state.index.resolve_external_id(container);
        let pid = match resolved {
            Some(pid) if self.container_exists(container, &pid)? => pid,
            _ => {
                tracing::debug!(property = %property.id, "container not stored yet, stream property queued");
                self.state.pending.enqueue_property(property);
                return Ok(());
            }
        };

        if property.id.name == Name::jcr("mimeType") {
            let mime_type = match property.first() {
                Some(v) => v.as_text(),
                None => return Ok(()),
            };
            self.state.streams.set_mime_type(holder, &mime_type);
            if descriptor.mime_type.as_deref() != Some(mime_type.as_str())
                && !codec::is_reserved_stream(&descriptor.stream_id)
                && self.connector.exists_stream(&pid, &descriptor.stream_id)?
            {
                let bytes = self.connector.get_stream(&pid, &descriptor.stream_id)?;
                let updated = StreamDescriptor {
                    mime_type: Some(mime_type),
                    ..descriptor
                };
                self.upload(&pid, &updated, &bytes)?;
            }
        } else if property.id.name == Name::jcr("data") {
            if codec::is_reserved_stream(&descriptor.stream_id) || codec::is_resource_fork(&descriptor.name) {
                tracing::debug!(pid = %pid, stream = %descriptor.stream_id, "stream upload skipped");
                return Ok(());
            }
            let bytes = match property.first() {
                Some(Value::Binary(bytes)) => bytes.clone(),
                Some(other) => other.as_text().into_bytes(),
                None => Vec::new(),
            };
            let current = self
                .state
                .streams
                .descriptor(holder)
                .cloned()
                .unwrap_or(descriptor);
            self.upload(&pid, &current, &bytes)?;
        }
        Ok(())
    }

    /// Spool `bytes` to a temporary file and hand it to the repository.
    fn upload(&self, pid: &str, descriptor: &StreamDescriptor, bytes: &[u8]) -> Result<()> {
        let mut spool = tempfile::NamedTempFile::new_in(self.config.spool_dir())?;
        spool.write_all(bytes)?;
        spool.flush()?;
        let label = if descriptor.label.is_empty() {
            &descriptor.name
        } else {
            &descriptor.label
        };
        let mime_type = descriptor.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        self.connector
            .add_stream(pid, &descriptor.stream_id, label, mime_type, spool.path())?;
        tracing::debug!(pid, stream = %descriptor.stream_id, bytes = bytes.len(), mime_type, "stream uploaded");
        Ok(())
    }

    // ========================================================================
    // References
    // ========================================================================

    pub fn store_references(&mut self, refs: &NodeReferences) -> Result<()> {
        let pid = self
            .state
            .index
            .resolve_external_id(refs.target)
            .ok_or(AdapterError::Unresolved(refs.target))?;
        self.connector.delete_property(&pid, vocab::NODE_REFERENCES_URI)?;
        if !refs.references.is_empty() {
            self.connector
                .add_property(&pid, vocab::NODE_REFERENCES_URI, &literal::encode_references(refs))?;
        }
        Ok(())
    }

    pub fn destroy_references(&mut self, refs: &NodeReferences) -> Result<()> {
        if let Some(pid) = self.state.index.resolve_external_id(refs.target) {
            if self.connector.exists_object(&pid)? {
                self.connector.delete_property(&pid, vocab::NODE_REFERENCES_URI)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Destroy
    // ========================================================================

    pub fn destroy_node(&mut self, node: &NodeState) -> Result<()> {
        self.state.pending.discard_node(node.id);

        if node.id.is_fabricated() || node.id == NodeId::ROOT {
            tracing::debug!(id = %node.id, "ignoring destroy of fabricated node");
            return Ok(());
        }
        if self.state.streams.is_holder(node.id) || node.kind == NodeKind::StreamHolder {
            let target = self.state.streams.owner(node.id).and_then(|container| {
                let pid = self.state.index.resolve_external_id(container)?;
                let descriptor = self.state.streams.descriptor(node.id)?;
                Some((pid, descriptor.stream_id.clone()))
            });
            if let Some((pid, stream_id)) = target {
                self.remove_stream(&pid, &stream_id)?;
            }
            self.state.streams.remove_holder(node.id);
            return Ok(());
        }
        if node.kind == NodeKind::StreamContent || self.state.streams.is_content(node.id) {
            // removed together with its holder
            return Ok(());
        }

        if let Some(pid) = self.state.index.resolve_external_id(node.id) {
            if self.connector.exists_object(&pid)? {
                self.connector.delete_object(&pid)?;
                tracing::debug!(pid = %pid, "object deleted");
            }
            self.state.index.release_pid(&pid);
        }
        for holder in self.state.streams.holders_of(node.id) {
            self.state.streams.remove_holder(holder);
        }
        self.state.confirmed.remove(&node.id);
        self.state.index.remove_subtree(node.id);
        Ok(())
    }

    pub fn destroy_property(&mut self, property: &PropertyState) -> Result<()> {
        self.state.pending.discard_property(&property.id);
        let owner = property.id.parent;

        if self.state.streams.is_content(owner) {
            if property.id.name != Name::jcr("data") {
                return Ok(());
            }
            let target = self.state.streams.resolve_content(owner).and_then(|(container, _, d)| {
                let pid = self.state.index.resolve_external_id(container)?;
                Some((pid, d.stream_id.clone()))
            });
            if let Some((pid, stream_id)) = target {
                self.remove_stream(&pid, &stream_id)?;
            }
            return Ok(());
        }
        if owner.is_fabricated() || owner == NodeId::ROOT || self.state.streams.is_holder(owner) {
            return Ok(());
        }

        let pid = match self.state.index.resolve_external_id(owner) {
            Some(pid) => pid,
            None => return Ok(()),
        };
        if !self.connector.exists_object(&pid)? {
            return Ok(());
        }
        let uri = if property.id.name == Name::jcr("mixinTypes") {
            vocab::MIXIN_TYPES_URI.to_string()
        } else {
            codec::property_uri(&property.id.name, &self.config.default_namespace)
        };
        self.connector.delete_property(&pid, &uri)
    }

    /// Delete one stream. Reserved streams, resource forks and streams that
    /// do not exist are left alone and report `false`.
    pub fn remove_stream(&mut self, pid: &str, stream_id: &str) -> Result<bool> {
        if codec::is_reserved_stream(stream_id) {
            tracing::debug!(pid, stream = stream_id, "refusing to delete reserved stream");
            return Ok(false);
        }
        if codec::is_resource_fork(&codec::stream_name_for(stream_id)) {
            return Ok(false);
        }
        if !self.connector.exists_stream(pid, stream_id)? {
            return Ok(false);
        }
        self.connector.delete_stream(pid, stream_id)?;
        tracing::debug!(pid, stream = stream_id, "stream deleted");
        Ok(true)
    }
}
