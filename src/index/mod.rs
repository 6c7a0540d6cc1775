//! Path/identity index
//!
//! Owns the identity -> (parent, local name) edges the tree is made of and
//! answers path and external-identifier questions from them alone. Nothing
//! here talks to the repository, so every lookup is safe to repeat while the
//! pending queue drains.
//!
//! Secondary structures (`paths`, `children`) are caches over the edge map
//! and can be rebuilt from it at any time with [`PathIndex::rebuild`].

pub mod streams;

use std::collections::{HashMap, HashSet};

use crate::codec;
use crate::model::{Name, NodeId};

/// Parent edge of a registered node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub parent: NodeId,
    pub name: String,
}

/// Outcome of checking an external identifier against its current owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PidClaim {
    /// Nobody owned it, now `node` does
    Claimed,
    /// Already owned by the same node
    Owned,
    /// Owned by a different node
    Collision(NodeId),
}

pub struct PathIndex {
    edges: HashMap<NodeId, Edge>,
    /// identity -> full path, filled lazily
    paths: HashMap<NodeId, String>,
    /// parent -> (segment -> child)
    children: HashMap<NodeId, HashMap<String, NodeId>>,
    /// path segments known to stand for native repository objects
    native: HashSet<String>,
    /// external identifier -> identity that first resolved to it
    pid_owner: HashMap<String, NodeId>,
    /// identity -> external identifier observed in the repository, where the
    /// edge alone would compute a different one (truncated names)
    observed: HashMap<NodeId, String>,
    minted: u64,
    seed: NodeId,
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PathIndex {
    pub fn new() -> Self {
        Self::with_seed(NodeId::ROOT)
    }

    /// Index whose minted identities are derived from `seed`
    pub fn with_seed(seed: NodeId) -> Self {
        let mut paths = HashMap::new();
        paths.insert(NodeId::ROOT, String::new());
        PathIndex {
            edges: HashMap::new(),
            paths,
            children: HashMap::new(),
            native: HashSet::new(),
            pid_owner: HashMap::new(),
            observed: HashMap::new(),
            minted: 0,
            seed,
        }
    }

    /// Number of registered edges (the root has none)
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Record that `id` is called `name` under `parent`.
    ///
    /// First registration wins: returns false and changes nothing if `id`
    /// already has an edge. The root never gets one.
    pub fn register_path(&mut self, id: NodeId, name: &str, parent: NodeId) -> bool {
        if id == NodeId::ROOT || self.edges.contains_key(&id) {
            return false;
        }
        self.edges.insert(
            id,
            Edge {
                parent,
                name: name.to_string(),
            },
        );
        self.children
            .entry(parent)
            .or_default()
            .insert(name.to_string(), id);
        if let Some(parent_path) = self.paths.get(&parent).cloned() {
            self.paths.insert(id, join_path(&parent_path, name));
        }
        true
    }

    /// Mark a path segment as denoting a native repository object.
    pub fn mark_native(&mut self, segment: &str) {
        self.native.insert(segment.to_string());
    }

    pub fn is_native(&self, segment: &str) -> bool {
        self.native.contains(segment)
    }

    /// Pin the external identifier of `id` to one seen in the repository.
    ///
    /// Only needed when the registered edge would compute something else,
    /// which happens once a stored name was cut by identifier truncation.
    pub fn record_external_id(&mut self, id: NodeId, pid: &str) {
        if id != NodeId::ROOT {
            self.observed.insert(id, pid.to_string());
        }
    }

    /// Mint a fresh identity.
    pub fn mint(&mut self) -> NodeId {
        loop {
            self.minted += 1;
            let mut seed = self.seed.0.to_be_bytes().to_vec();
            seed.extend_from_slice(&self.minted.to_be_bytes());
            let id = NodeId::derive(&seed);
            if !id.is_fabricated() && !self.edges.contains_key(&id) {
                return id;
            }
        }
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn edge(&self, id: NodeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.edges.get(&id).map(|e| e.parent)
    }

    pub fn is_registered(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.edges.contains_key(&id)
    }

    /// Full path of `id`, or None if any edge up to the root is missing.
    ///
    /// The root's path is the empty string.
    pub fn resolve_path(&self, id: NodeId) -> Option<String> {
        if let Some(path) = self.paths.get(&id) {
            return Some(path.clone());
        }
        let mut segments = Vec::new();
        let mut current = id;
        let mut guard = 0usize;
        while current != NodeId::ROOT {
            let edge = self.edges.get(&current)?;
            segments.push(edge.name.as_str());
            current = edge.parent;
            guard += 1;
            if guard > self.edges.len() {
                // cycle in the edge map
                return None;
            }
        }
        segments.reverse();
        let mut path = String::new();
        for segment in segments {
            path = join_path(&path, segment);
        }
        Some(path)
    }

    /// Same as [`resolve_path`](Self::resolve_path) but fills the path cache.
    pub fn resolve_path_cached(&mut self, id: NodeId) -> Option<String> {
        let path = self.resolve_path(id)?;
        self.paths.insert(id, path.clone());
        Some(path)
    }

    /// Number of edges from the root. None if unresolved.
    pub fn level(&self, id: NodeId) -> Option<usize> {
        let mut depth = 0;
        let mut current = id;
        while current != NodeId::ROOT {
            current = self.edges.get(&current)?.parent;
            depth += 1;
            if depth > self.edges.len() {
                return None;
            }
        }
        Some(depth)
    }

    /// External identifier of `id`.
    ///
    /// An identifier recorded with [`record_external_id`](Self::record_external_id)
    /// wins. Otherwise native segments decode back to their repository
    /// identifier and all others get a synthetic identifier from depth and
    /// full path. The root has none.
    pub fn resolve_external_id(&self, id: NodeId) -> Option<String> {
        if id == NodeId::ROOT {
            return None;
        }
        if let Some(pid) = self.observed.get(&id) {
            return Some(pid.clone());
        }
        let edge = self.edges.get(&id)?;
        let path = self.resolve_path(id)?;
        if self.native.contains(&edge.name) {
            return Some(codec::decode_native(&edge.name));
        }
        let level = self.level(id)?;
        Some(codec::encode_synthetic(level, &path, &edge.name))
    }

    /// Identity registered at `path` ("/a/b"), walking segment by segment.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = *self.children.get(&current)?.get(segment)?;
        }
        Some(current)
    }

    /// Child of `parent` registered under `segment`
    pub fn child(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        self.children.get(&parent)?.get(segment).copied()
    }

    /// Snapshot of the segment -> identity map for one parent.
    ///
    /// Used for a single materialization pass and then dropped.
    pub fn children_of(&self, parent: NodeId) -> HashMap<String, NodeId> {
        self.children.get(&parent).cloned().unwrap_or_default()
    }

    /// Identity whose path ends in the node named `name` under `parent`
    pub fn child_by_name(&self, parent: NodeId, name: &Name) -> Option<NodeId> {
        self.child(parent, &name.path_segment())
    }

    // ========================================================================
    // Collision tracking
    // ========================================================================

    /// Record `node` as owner of `pid` unless somebody else already is.
    pub fn claim_pid(&mut self, pid: &str, node: NodeId) -> PidClaim {
        match self.pid_owner.get(pid) {
            Some(owner) if *owner == node => PidClaim::Owned,
            Some(owner) => PidClaim::Collision(*owner),
            None => {
                self.pid_owner.insert(pid.to_string(), node);
                PidClaim::Claimed
            }
        }
    }

    pub fn pid_owner(&self, pid: &str) -> Option<NodeId> {
        self.pid_owner.get(pid).copied()
    }

    pub fn release_pid(&mut self, pid: &str) {
        self.pid_owner.remove(pid);
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop `id` and every registered descendant.
    pub fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(kids) = self.children.remove(&current) {
                stack.extend(kids.into_values());
            }
            if let Some(edge) = self.edges.remove(&current) {
                if let Some(siblings) = self.children.get_mut(&edge.parent) {
                    siblings.remove(&edge.name);
                }
            }
            self.paths.remove(&current);
            self.observed.remove(&current);
            self.pid_owner.retain(|_, owner| *owner != current);
        }
        self.paths.insert(NodeId::ROOT, String::new());
    }

    /// Rebuild the path cache and child map from the edge map.
    pub fn rebuild(&mut self) {
        self.children.clear();
        for (id, edge) in &self.edges {
            self.children
                .entry(edge.parent)
                .or_default()
                .insert(edge.name.clone(), *id);
        }
        self.paths.clear();
        self.paths.insert(NodeId::ROOT, String::new());
    }
}

/// `/a` + `b` -> `/a/b`; the root's empty path yields `/b`
pub fn join_path(parent: &str, segment: &str) -> String {
    format!("{}/{}", parent, segment)
}

/// Last segment of a path
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests;
