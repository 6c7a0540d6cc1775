//! PersistenceManager - the host-facing contract
//!
//! One manager owns one [`AdapterState`] (path index, stream registry,
//! pending queue) and a shared connector. Independent managers never share
//! state, so several can run side by side, e.g. one per test.
//!
//! # Architecture
//!
//! - Loads go through the [`materializer`], stores and destroys through the
//!   [`persister`]'s worklist
//! - A single coarse `Mutex` guards the state for the duration of each
//!   operation; the repository round-trips dominate, not the lock
//! - Store requests for nodes whose parent is not mapped yet return `Ok`
//!   after queueing the work
//!
//! # Usage
//!
//! ```no_run
//! use flattree::{AdapterConfig, PersistenceManager};
//!
//! let manager = PersistenceManager::open(AdapterConfig::default()).unwrap();
//! manager.init().unwrap();
//! let root = manager.load_node(flattree::NodeId::ROOT).unwrap();
//! println!("{} top-level children", root.children.len());
//! manager.close().unwrap();
//! ```

pub mod materializer;
pub mod persister;

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{literal, vocab};
use crate::config::AdapterConfig;
use crate::connector::Connector;
use crate::error::{AdapterError, Result};
use crate::index::streams::StreamRegistry;
use crate::index::PathIndex;
use crate::model::{
    ChangeLog, Name, NodeId, NodeKind, NodeReferences, NodeState, PropertyId, PropertyState,
};
use crate::pending::PendingQueue;
use crate::query::{self, QueryHit, QueryRoot};

use materializer::Materializer;
use persister::{Persister, Work};

/// MIME type of streams that never had one set
pub(crate) const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Mutable mapping state of one adapter instance
pub struct AdapterState {
    pub index: PathIndex,
    pub streams: StreamRegistry,
    pub pending: PendingQueue,
    /// Containers whose external object is known to exist
    pub confirmed: HashSet<NodeId>,
}

impl AdapterState {
    pub fn new() -> Self {
        AdapterState {
            index: PathIndex::with_seed(instance_seed()),
            streams: StreamRegistry::new(),
            pending: PendingQueue::new(),
            confirmed: HashSet::new(),
        }
    }
}

impl Default for AdapterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Distinct seed per adapter instance so minted identities never repeat
fn instance_seed() -> NodeId {
    static INSTANCES: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let n = INSTANCES.fetch_add(1, Ordering::SeqCst);
    let mut seed = nanos.to_be_bytes().to_vec();
    seed.extend_from_slice(&n.to_be_bytes());
    seed.extend_from_slice(&std::process::id().to_be_bytes());
    NodeId::derive(&seed)
}

pub struct PersistenceManager {
    connector: Arc<dyn Connector>,
    config: AdapterConfig,
    state: Mutex<AdapterState>,
    initialized: AtomicBool,
}

impl PersistenceManager {
    pub fn new(connector: Arc<dyn Connector>, config: AdapterConfig) -> Self {
        PersistenceManager {
            connector,
            config,
            state: Mutex::new(AdapterState::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Open the backend named by `config` and wrap it.
    pub fn open(config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let connector = config.open_connector()?;
        Ok(Self::new(connector, config))
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn init(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::AlreadyInitialized);
        }
        tracing::info!(backend = ?self.config.backend, "persistence manager initialized");
        Ok(())
    }

    /// Release the instance. Entries still queued are reported and dropped.
    pub fn close(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Err(AdapterError::NotInitialized);
        }
        let mut state = self.state.lock()?;
        if !state.pending.is_empty() {
            tracing::warn!(
                nodes = state.pending.node_count(),
                properties = state.pending.property_count(),
                "closing with unresolved pending entries"
            );
        }
        *state = AdapterState::new();
        tracing::info!("persistence manager closed");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AdapterState>> {
        if !self.is_initialized() {
            return Err(AdapterError::NotInitialized);
        }
        Ok(self.state.lock()?)
    }

    /// Number of queued node and property writes
    pub fn pending_len(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    // ========================================================================
    // Load
    // ========================================================================

    pub fn load_node(&self, id: NodeId) -> Result<NodeState> {
        let mut state = self.lock()?;
        let (node, flushable) = {
            let mut m = Materializer::new(self.connector.as_ref(), &mut state, &self.config);
            let node = m.load_node(id)?;
            (node, m.take_flushable())
        };
        if !flushable.is_empty() {
            let work = flushable
                .into_iter()
                .filter_map(|child| state.pending.take_node(child))
                .map(Work::Node)
                .collect();
            Persister::new(self.connector.as_ref(), &mut state, &self.config).run(work)?;
        }
        Ok(node)
    }

    pub fn load_property(&self, id: &PropertyId) -> Result<PropertyState> {
        let mut state = self.lock()?;
        Materializer::new(self.connector.as_ref(), &mut state, &self.config).load_property(id)
    }

    /// Reference manifest of `target`
    pub fn load_references_to(&self, target: NodeId) -> Result<NodeReferences> {
        let state = self.lock()?;
        let pid = state
            .index
            .resolve_external_id(target)
            .ok_or(AdapterError::NoReferences(target))?;
        match self.connector.get_property(&pid, vocab::NODE_REFERENCES_URI)? {
            Some(text) => literal::decode_references(target, &text),
            None => Err(AdapterError::NoReferences(target)),
        }
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn store_node(&self, node: &NodeState) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).run(vec![Work::Node(node.clone())])
    }

    pub fn store_property(&self, property: &PropertyState) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config)
            .run(vec![Work::Property(property.clone())])
    }

    pub fn store_references(&self, refs: &NodeReferences) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).store_references(refs)
    }

    /// Store a whole change log under one lock.
    ///
    /// Stream holder/content associations of every node in the batch are
    /// recorded first, then nodes, properties (stream data after MIME types),
    /// reference manifests and finally deletions.
    pub fn store_changes(&self, changes: &ChangeLog) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self.lock()?;
        // deepest first so descendants are still resolvable when deleted
        let mut deleted: Vec<(usize, &NodeState)> = changes
            .deleted_nodes
            .iter()
            .map(|n| (state.index.level(n.id).unwrap_or(0), n))
            .collect();
        deleted.sort_by_key(|(level, _)| Reverse(*level));

        let mut persister = Persister::new(self.connector.as_ref(), &mut state, &self.config);

        let stored = changes.stored_nodes();
        persister.register_streams(stored.values().copied());

        let mut work: Vec<Work> = changes
            .added_nodes
            .iter()
            .chain(changes.modified_nodes.iter())
            .map(|n| Work::Node(n.clone()))
            .collect();

        let mut properties: Vec<&PropertyState> = changes
            .added_properties
            .iter()
            .chain(changes.modified_properties.iter())
            .collect();
        properties.sort_by_key(|p| p.id.name == Name::jcr("data"));
        work.extend(properties.into_iter().map(|p| Work::Property(p.clone())));
        persister.run(work)?;

        for refs in &changes.modified_references {
            persister.store_references(refs)?;
        }
        for property in &changes.deleted_properties {
            persister.destroy_property(property)?;
        }
        for (_, node) in deleted {
            persister.destroy_node(node)?;
        }
        tracing::debug!(
            added = changes.added_nodes.len(),
            modified = changes.modified_nodes.len(),
            deleted = changes.deleted_nodes.len(),
            "change log stored"
        );
        Ok(())
    }

    // ========================================================================
    // Destroy
    // ========================================================================

    pub fn destroy_node(&self, node: &NodeState) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).destroy_node(node)
    }

    pub fn destroy_property(&self, property: &PropertyState) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).destroy_property(property)
    }

    pub fn destroy_references(&self, refs: &NodeReferences) -> Result<()> {
        let mut state = self.lock()?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).destroy_references(refs)
    }

    /// Delete stream `stream_id` of `container`. Reserved streams are left
    /// untouched and report `false`.
    pub fn destroy_stream(&self, container: NodeId, stream_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let pid = state
            .index
            .resolve_external_id(container)
            .ok_or(AdapterError::Unresolved(container))?;
        Persister::new(self.connector.as_ref(), &mut state, &self.config).remove_stream(&pid, stream_id)
    }

    // ========================================================================
    // Exists
    // ========================================================================

    pub fn exists_node(&self, id: NodeId) -> Result<bool> {
        let mut state = self.lock()?;
        if id.is_fabricated() || state.pending.has_node(id) {
            return Ok(true);
        }
        if state.streams.is_holder(id) || state.streams.is_content(id) {
            return Ok(true);
        }
        if state.confirmed.contains(&id) {
            return Ok(true);
        }
        match state.index.resolve_external_id(id) {
            Some(pid) => {
                let exists = self.connector.exists_object(&pid)?;
                if exists {
                    state.confirmed.insert(id);
                }
                Ok(exists)
            }
            None => Ok(false),
        }
    }

    pub fn exists_property(&self, id: &PropertyId) -> Result<bool> {
        let mut state = self.lock()?;
        Materializer::new(self.connector.as_ref(), &mut state, &self.config).exists_property(id)
    }

    pub fn exists_references_to(&self, target: NodeId) -> Result<bool> {
        let state = self.lock()?;
        match state.index.resolve_external_id(target) {
            Some(pid) => Ok(self.connector.exists_object(&pid)?
                && self.connector.exists_property(&pid, vocab::NODE_REFERENCES_URI)?),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Parse and run a path query.
    pub fn query(&self, text: &str) -> Result<Vec<QueryHit>> {
        let parsed = query::parse(text)?;
        self.execute_query(&parsed)
    }

    pub fn execute_query(&self, root: &QueryRoot) -> Result<Vec<QueryHit>> {
        let _state = self.lock()?;
        query::QueryBuilder::new(self.connector.as_ref(), &self.config.default_namespace).execute(root)
    }

    /// Node identity of a hit, if its path is mapped.
    ///
    /// Loads along the hit's path so identities get assigned on first use.
    pub fn resolve_hit(&self, hit: &QueryHit) -> Result<Option<NodeId>> {
        let mut current = NodeId::ROOT;
        for segment in hit.segments() {
            let known = self.lock()?.index.child(current, segment);
            current = match known {
                Some(id) => id,
                None => {
                    let node = self.load_node(current)?;
                    if node.kind != NodeKind::Root && node.kind != NodeKind::Container {
                        return Ok(None);
                    }
                    match self.lock()?.index.child(current, segment) {
                        Some(id) => id,
                        None => return Ok(None),
                    }
                }
            };
        }
        Ok(Some(current))
    }
}
