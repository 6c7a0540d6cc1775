//! Tree materializer (load path)
//!
//! Rebuilds one node's shape on demand from the repository. Kind is decided
//! once, in this order:
//!
//! 1. root and the fabricated system subtree, no repository call
//! 2. identities the index maps to a path: containers
//! 3. known stream holders
//! 4. known stream content nodes
//!
//! Anything else is reported as [`AdapterError::UnknownNode`]. Listing calls
//! that fail degrade to empty results with a warning; single-value reads
//! propagate the failure.

use std::collections::HashMap;

use crate::codec::{self, literal, vocab};
use crate::config::AdapterConfig;
use crate::connector::Connector;
use crate::error::{AdapterError, Result};
use crate::index::streams::StreamDescriptor;
use crate::model::{ns, Name, NodeId, NodeKind, NodeState, PropertyId, PropertyState, PropertyType, Value};
use crate::persistence::{AdapterState, DEFAULT_MIME_TYPE};

pub struct Materializer<'a> {
    connector: &'a dyn Connector,
    state: &'a mut AdapterState,
    config: &'a AdapterConfig,
    /// Children registered during this pass that have queued writes
    flushable: Vec<NodeId>,
}

/// Run a listing call, degrading failures to an empty result
fn degrade<T: Default>(what: &str, pid: &str, result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(pid, error = %e, "{} failed, treating as empty", what);
            T::default()
        }
    }
}

fn rep(local: &str) -> Name {
    Name::new(ns::REP, local)
}

impl<'a> Materializer<'a> {
    pub fn new(connector: &'a dyn Connector, state: &'a mut AdapterState, config: &'a AdapterConfig) -> Self {
        Materializer {
            connector,
            state,
            config,
            flushable: Vec::new(),
        }
    }

    /// Children registered by this pass that have a pending node write
    pub fn take_flushable(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.flushable)
    }

    /// Node kind of `id` as currently known
    pub fn classify(&self, id: NodeId) -> Option<NodeKind> {
        if id == NodeId::ROOT {
            Some(NodeKind::Root)
        } else if id.is_fabricated() {
            Some(NodeKind::System)
        } else if self.state.index.is_registered(id) && self.state.index.resolve_path(id).is_some() {
            Some(NodeKind::Container)
        } else if self.state.streams.is_holder(id) {
            Some(NodeKind::StreamHolder)
        } else if self.state.streams.is_content(id) {
            Some(NodeKind::StreamContent)
        } else {
            None
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn load_node(&mut self, id: NodeId) -> Result<NodeState> {
        if let Some(pending) = self.state.pending.node(id) {
            return Ok(pending.clone());
        }
        match self.classify(id) {
            Some(NodeKind::Root) => Ok(self.load_root()),
            Some(NodeKind::System) => Ok(self.load_system(id)),
            Some(NodeKind::Container) => self.load_container(id),
            Some(NodeKind::StreamHolder) => Ok(self.load_holder(id)),
            Some(NodeKind::StreamContent) => Ok(self.load_content(id)),
            None => Err(AdapterError::UnknownNode(id)),
        }
    }

    fn load_root(&mut self) -> NodeState {
        let mut node = NodeState::new(NodeId::ROOT, None, NodeKind::Root, rep("root"));
        node.properties.insert(Name::jcr("primaryType"));
        node.add_child(Name::jcr("system"), NodeId::SYSTEM);

        let top = degrade("list_top_level", "", self.connector.list_top_level(None));
        self.attach_members(&mut node, top);
        tracing::debug!(children = node.children.len(), "root loaded");
        node
    }

    fn load_system(&self, id: NodeId) -> NodeState {
        let (parent, node_type) = match id {
            NodeId::SYSTEM => (NodeId::ROOT, rep("system")),
            NodeId::VERSION_STORAGE => (NodeId::SYSTEM, rep("versionStorage")),
            _ => (NodeId::SYSTEM, rep("nodeTypes")),
        };
        let mut node = NodeState::new(id, Some(parent), NodeKind::System, node_type);
        node.properties.insert(Name::jcr("primaryType"));
        if id == NodeId::SYSTEM {
            node.add_child(Name::jcr("versionStorage"), NodeId::VERSION_STORAGE);
            node.add_child(Name::jcr("nodeTypes"), NodeId::NODE_TYPES);
        }
        node
    }

    fn load_container(&mut self, id: NodeId) -> Result<NodeState> {
        let pid = self
            .state
            .index
            .resolve_external_id(id)
            .ok_or(AdapterError::Unresolved(id))?;

        let node_type = self.container_type(&pid)?;
        let mut node = NodeState::new(id, self.state.index.parent(id), NodeKind::Container, node_type);
        node.properties.insert(Name::jcr("primaryType"));

        // mixins
        if let Some(text) = degrade("get_property", &pid, self.connector.get_property(&pid, vocab::MIXIN_TYPES_URI)) {
            match literal::decode_mixins(&text) {
                Ok(mixins) => node.mixins = mixins,
                Err(e) => tracing::warn!(pid = %pid, error = %e, "ignoring malformed mixin list"),
            }
        }
        if !node.mixins.is_empty() {
            node.properties.insert(Name::jcr("mixinTypes"));
        }

        // streams
        for info in degrade("list_streams", &pid, self.connector.list_streams(&pid)) {
            if codec::is_reserved_stream(&info.stream_id) {
                continue;
            }
            let name = codec::stream_name_for(&info.stream_id);
            if codec::is_resource_fork(&name) {
                continue;
            }
            let holder = match self.state.streams.holder_for(id, &info.stream_id) {
                Some(h) => h,
                None => self.state.index.mint(),
            };
            self.state.streams.register_holder(
                holder,
                id,
                StreamDescriptor {
                    name: name.clone(),
                    stream_id: info.stream_id.clone(),
                    label: info.label.clone(),
                    mime_type: Some(info.mime_type.clone()),
                },
            );
            if self.state.streams.content_of(holder).is_none() {
                let content = self.state.index.mint();
                self.state.streams.register_content(content, holder);
            }
            node.add_child(Name::from_segment(&name), holder);
        }

        // child containers
        let members = degrade("list_members", &pid, self.connector.list_members(&pid, None));
        self.attach_members(&mut node, members);

        // properties
        for uri in degrade("list_properties", &pid, self.connector.list_properties(&pid)) {
            if uri == vocab::MIXIN_TYPES_URI || uri == vocab::NODE_REFERENCES_URI {
                continue;
            }
            node.properties.insert(codec::property_name(&uri, &self.config.default_namespace));
        }

        self.state.confirmed.insert(id);
        tracing::debug!(pid = %pid, children = node.children.len(), "container loaded");
        Ok(node)
    }

    /// Register and attach member objects as children of `node`.
    ///
    /// Identity, in order of preference: already known under this parent,
    /// the object's own `jcr:uuid`, derived from a native identifier, minted.
    fn attach_members(&mut self, node: &mut NodeState, members: Vec<String>) {
        let known: HashMap<String, NodeId> = self.state.index.children_of(node.id);
        for member in members {
            let segment = codec::path_segment(&member);
            if segment.is_empty() {
                tracing::warn!(pid = %member, "member identifier has no path segment, skipped");
                continue;
            }
            let native = !codec::is_synthetic_identifier(&member);
            let child = match known.get(&segment) {
                Some(id) => *id,
                None => self.declared_identity(&member).unwrap_or_else(|| {
                    if native {
                        NodeId::derive(member.as_bytes())
                    } else {
                        self.state.index.mint()
                    }
                }),
            };
            if native {
                self.state.index.mark_native(&segment);
            }
            self.state.index.register_path(child, &segment, node.id);
            if self.state.index.parent(child) == Some(node.id)
                && self.state.index.resolve_external_id(child).as_deref() != Some(member.as_str())
            {
                tracing::debug!(pid = %member, id = %child, "member identifier differs from its path, recorded");
                self.state.index.record_external_id(child, &member);
            }
            if self.state.pending.has_node(child) {
                self.flushable.push(child);
            }
            node.add_child(Name::from_segment(&segment), child);
        }
    }

    fn declared_identity(&self, pid: &str) -> Option<NodeId> {
        let text = degrade("get_property", pid, self.connector.get_property(pid, vocab::UUID_URI))?;
        literal::decode_uuid(&text)
    }

    /// Stored primary type, else `nt:resource` for objects with data, else
    /// `nt:unstructured`
    fn container_type(&self, pid: &str) -> Result<Name> {
        if let Some(text) = degrade("get_property", pid, self.connector.get_property(pid, vocab::PRIMARY_TYPE_URI)) {
            let id = PropertyId::new(NodeId::ROOT, Name::jcr("primaryType"));
            match literal::decode_property(id, &text).map(|s| s.values.into_iter().next()) {
                Ok(Some(Value::Name(name))) => return Ok(name),
                Ok(Some(other)) => return Ok(Name::parse_expanded(&other.as_text())?),
                Ok(None) => {}
                Err(e) => tracing::warn!(pid, error = %e, "ignoring malformed primary type"),
            }
        }
        if degrade("exists_property", pid, self.connector.exists_property(pid, vocab::DATA_URI)) {
            return Ok(Name::nt("resource"));
        }
        Ok(Name::nt("unstructured"))
    }

    fn load_holder(&mut self, id: NodeId) -> NodeState {
        let content = match self.state.streams.content_of(id) {
            Some(c) => c,
            None => {
                let c = self.state.index.mint();
                self.state.streams.register_content(c, id);
                c
            }
        };
        let mut node = NodeState::new(id, self.state.streams.owner(id), NodeKind::StreamHolder, Name::nt("file"));
        node.properties.insert(Name::jcr("primaryType"));
        node.add_child(Name::jcr("content"), content);
        node
    }

    fn load_content(&self, id: NodeId) -> NodeState {
        let mut node = NodeState::new(
            id,
            self.state.streams.holder_of(id),
            NodeKind::StreamContent,
            Name::nt("resource"),
        );
        node.properties.insert(Name::jcr("data"));
        node.properties.insert(Name::jcr("encoding"));
        node.properties.insert(Name::jcr("mimeType"));
        node
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub fn load_property(&mut self, id: &PropertyId) -> Result<PropertyState> {
        if let Some(pending) = self.state.pending.property(id) {
            return Ok(pending.clone());
        }
        let owner = id.parent;
        let missing = || AdapterError::NoSuchProperty(id.to_string());

        match self.classify(owner) {
            Some(NodeKind::Root) | Some(NodeKind::System) => {
                if id.name != Name::jcr("primaryType") {
                    return Err(missing());
                }
                let node_type = match owner {
                    NodeId::ROOT => rep("root"),
                    other => self.load_system(other).node_type,
                };
                Ok(PropertyState::single(id.clone(), Value::Name(node_type)))
            }
            Some(NodeKind::StreamHolder) => {
                if id.name == Name::jcr("primaryType") {
                    Ok(PropertyState::single(id.clone(), Value::Name(Name::nt("file"))))
                } else {
                    Err(missing())
                }
            }
            Some(NodeKind::StreamContent) => self.load_content_property(id),
            Some(NodeKind::Container) => self.load_container_property(id),
            None => Err(AdapterError::UnknownNode(owner)),
        }
    }

    fn load_content_property(&self, id: &PropertyId) -> Result<PropertyState> {
        let (container, _, descriptor) = self
            .state
            .streams
            .resolve_content(id.parent)
            .ok_or(AdapterError::UnknownNode(id.parent))?;
        let mime_type = descriptor
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let is_text = mime_type.starts_with("text/");

        if id.name == Name::jcr("data") {
            let pid = self
                .state
                .index
                .resolve_external_id(container)
                .ok_or(AdapterError::Unresolved(container))?;
            let bytes = self.connector.get_stream(&pid, &descriptor.stream_id)?;
            let value = if is_text {
                match String::from_utf8(bytes) {
                    Ok(text) => Value::String(text),
                    Err(e) => Value::Binary(e.into_bytes()),
                }
            } else {
                Value::Binary(bytes)
            };
            Ok(PropertyState::single(id.clone(), value))
        } else if id.name == Name::jcr("mimeType") {
            Ok(PropertyState::single(id.clone(), Value::String(mime_type)))
        } else if id.name == Name::jcr("encoding") {
            Ok(PropertyState::single(id.clone(), Value::String("UTF-8".to_string())))
        } else if id.name == Name::jcr("primaryType") {
            Ok(PropertyState::single(id.clone(), Value::Name(Name::nt("resource"))))
        } else {
            Err(AdapterError::NoSuchProperty(id.to_string()))
        }
    }

    fn load_container_property(&self, id: &PropertyId) -> Result<PropertyState> {
        let pid = self
            .state
            .index
            .resolve_external_id(id.parent)
            .ok_or(AdapterError::Unresolved(id.parent))?;

        if id.name == Name::jcr("mixinTypes") {
            let mixins = match self.connector.get_property(&pid, vocab::MIXIN_TYPES_URI)? {
                Some(text) => literal::decode_mixins(&text)?,
                None => Default::default(),
            };
            let values = mixins.into_iter().map(Value::Name).collect();
            return Ok(PropertyState::multi(id.clone(), PropertyType::Name, values));
        }

        let uri = codec::property_uri(&id.name, &self.config.default_namespace);
        match self.connector.get_property(&pid, &uri)? {
            Some(text) => literal::decode_property(id.clone(), &text),
            None if id.name == Name::jcr("primaryType") => {
                Ok(PropertyState::single(id.clone(), Value::Name(self.container_type(&pid)?)))
            }
            None => Err(AdapterError::NoSuchProperty(id.to_string())),
        }
    }

    // ========================================================================
    // Exists
    // ========================================================================

    pub fn exists_property(&self, id: &PropertyId) -> Result<bool> {
        if self.state.pending.property(id).is_some() {
            return Ok(true);
        }
        let uri = codec::property_uri(&id.name, &self.config.default_namespace);
        if uri == vocab::NODE_REFERENCES_URI {
            return Ok(false);
        }
        let primary = id.name == Name::jcr("primaryType");
        match self.classify(id.parent) {
            Some(NodeKind::Root) | Some(NodeKind::System) | Some(NodeKind::StreamHolder) => Ok(primary),
            Some(NodeKind::StreamContent) => Ok(id.name == Name::jcr("data")
                || id.name == Name::jcr("encoding")
                || id.name == Name::jcr("mimeType")),
            Some(NodeKind::Container) => {
                if primary {
                    return Ok(true);
                }
                let pid = match self.state.index.resolve_external_id(id.parent) {
                    Some(pid) => pid,
                    None => return Ok(false),
                };
                if id.name == Name::jcr("mixinTypes") {
                    return self.connector.exists_property(&pid, vocab::MIXIN_TYPES_URI);
                }
                self.connector.exists_property(&pid, &uri)
            }
            None => Ok(false),
        }
    }
}
