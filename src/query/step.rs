//! Location step evaluator
//!
//! Executes one step against the repository given the hits of the steps
//! before it. Every hit carries the full identifier chain from its
//! top-level object down, so a later step can both continue from the hit
//! and check ancestry without another round-trip.

use std::collections::HashSet;

use crate::codec::{self, literal, vocab};
use crate::connector::{regex_escape, Connector, ObjectFilter};
use crate::error::Result;
use crate::index::join_path;
use crate::model::{Name, NodeId, PropertyId};
use crate::query::ast::{Axis, LocationStep, QueryHit};

pub struct StepEvaluator<'a> {
    connector: &'a dyn Connector,
    default_ns: &'a str,
}

/// `hit` extended by the identifiers in `chain`
fn extend_hit(hit: &QueryHit, chain: &[String]) -> QueryHit {
    let mut next = hit.clone();
    for pid in chain {
        next.path = join_path(&next.path, &codec::path_segment(pid));
        next.pids.push(pid.clone());
    }
    next
}

/// Keep the first occurrence of every hit
fn dedup(hits: Vec<QueryHit>) -> Vec<QueryHit> {
    let mut seen = HashSet::new();
    hits.into_iter().filter(|h| seen.insert(h.pids.clone())).collect()
}

fn combine(base: ObjectFilter, filter: Option<&ObjectFilter>) -> ObjectFilter {
    match filter {
        Some(f) => base.and(f.clone()),
        None => base,
    }
}

/// Identifier pattern for a node name in either identifier scheme
fn name_filter(segment: &str) -> ObjectFilter {
    ObjectFilter::identifier_matches(&format!(
        "{}{}$|^{}$",
        regex_escape(codec::SEP),
        regex_escape(&codec::escape_segment(segment)),
        regex_escape(&codec::decode_native(segment))
    ))
}

impl<'a> StepEvaluator<'a> {
    pub fn new(connector: &'a dyn Connector, default_ns: &'a str) -> Self {
        StepEvaluator { connector, default_ns }
    }

    /// Evaluate `step` from every hit in `current`.
    pub fn evaluate(
        &self,
        step: &LocationStep,
        filter: Option<&ObjectFilter>,
        current: &[QueryHit],
    ) -> Result<Vec<QueryHit>> {
        let hits = match (&step.axis, &step.name) {
            (Axis::Exact, Some(name)) => self.exact(&name.path_segment(), filter, current)?,
            (Axis::Exact, None) | (Axis::Children, _) => self.children(filter, current)?,
            (Axis::Descendants, None) => self.descendants(filter, current)?,
            (Axis::Descendants, Some(name)) => self.descendants_named(&name.path_segment(), filter, current)?,
            (Axis::Deref { property }, name) => self.deref(property, name.as_ref(), filter, current)?,
        };
        let hits = dedup(hits);
        tracing::debug!(axis = ?step.axis, from = current.len(), to = hits.len(), "step evaluated");
        Ok(hits)
    }

    fn members(&self, hit: &QueryHit, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        match hit.pid() {
            None => self.connector.list_top_level(filter),
            Some(pid) => self.connector.list_members(pid, filter),
        }
    }

    /// The child called `segment`, matched by its synthetic identifier for
    /// this exact path or by the native identifier the segment decodes to.
    fn exact(&self, segment: &str, filter: Option<&ObjectFilter>, current: &[QueryHit]) -> Result<Vec<QueryHit>> {
        let mut hits = Vec::new();
        for hit in current {
            let full_path = join_path(&hit.path, segment);
            let candidates = vec![
                codec::encode_synthetic(hit.depth() + 1, &full_path, segment),
                codec::decode_native(segment),
            ];
            let f = combine(ObjectFilter::identifier_in(&candidates), filter);
            if let Some(member) = self.members(hit, Some(&f))?.into_iter().next() {
                hits.push(extend_hit(hit, &[member]));
            }
        }
        Ok(hits)
    }

    fn children(&self, filter: Option<&ObjectFilter>, current: &[QueryHit]) -> Result<Vec<QueryHit>> {
        let mut hits = Vec::new();
        for hit in current {
            for member in self.members(hit, filter)? {
                hits.push(extend_hit(hit, &[member]));
            }
        }
        Ok(hits)
    }

    fn descendants(&self, filter: Option<&ObjectFilter>, current: &[QueryHit]) -> Result<Vec<QueryHit>> {
        let mut hits = Vec::new();
        for hit in current {
            match hit.pid() {
                Some(pid) => {
                    for chain in self.connector.list_descendants(pid, filter)? {
                        hits.push(extend_hit(hit, &chain));
                    }
                }
                None => {
                    // everything below the root: top-level objects and their subtrees
                    let mut chains = Vec::new();
                    for top in self.connector.list_top_level(None)? {
                        for below in self.connector.list_descendants(&top, None)? {
                            let mut chain = vec![top.clone()];
                            chain.extend(below);
                            chains.push(chain);
                        }
                        chains.push(vec![top]);
                    }
                    if let Some(f) = filter.filter(|f| !f.is_empty()) {
                        let lasts: Vec<String> = chains.iter().filter_map(|c| c.last().cloned()).collect();
                        let passing: HashSet<String> = self.connector.filter_objects(&lasts, f)?.into_iter().collect();
                        chains.retain(|c| c.last().is_some_and(|l| passing.contains(l)));
                    }
                    chains.sort();
                    for chain in chains {
                        hits.push(extend_hit(hit, &chain));
                    }
                }
            }
        }
        Ok(hits)
    }

    /// Descendants called `segment`: find candidates by identifier, then
    /// keep those whose ancestor chain passes through a current hit.
    fn descendants_named(
        &self,
        segment: &str,
        filter: Option<&ObjectFilter>,
        current: &[QueryHit],
    ) -> Result<Vec<QueryHit>> {
        let glob = format!("*{}{}", codec::SEP, codec::escape_segment(segment));
        let mut candidates: Vec<String> = self
            .connector
            .list_objects(&glob)?
            .into_iter()
            .filter(|pid| codec::synthetic_segment(pid) == segment)
            .collect();
        let native = codec::decode_native(segment);
        if native.contains(':') && self.connector.exists_object(&native)? {
            candidates.push(native);
        }
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            candidates = self.connector.filter_objects(&candidates, f)?;
        }

        let mut hits = Vec::new();
        for candidate in candidates {
            let chain = self.connector.get_path(&candidate)?;
            for hit in current {
                if chain.len() > hit.depth() && chain.starts_with(&hit.pids) {
                    hits.push(extend_hit(&QueryHit::root(), &chain));
                    break;
                }
            }
        }
        Ok(hits)
    }

    /// Follow the reference property `property` of each hit to the nodes
    /// whose `jcr:uuid` it names.
    fn deref(
        &self,
        property: &Name,
        name: Option<&Name>,
        filter: Option<&ObjectFilter>,
        current: &[QueryHit],
    ) -> Result<Vec<QueryHit>> {
        let uri = codec::property_uri(property, self.default_ns);
        let target_filter = match name {
            Some(n) => Some(combine(name_filter(&n.path_segment()), filter)),
            None => filter.cloned(),
        };

        let mut hits = Vec::new();
        for hit in current {
            let pid = match hit.pid() {
                Some(pid) => pid,
                None => continue,
            };
            let text = match self.connector.get_property(pid, &uri)? {
                Some(text) => text,
                None => continue,
            };
            let state = match literal::decode_property(PropertyId::new(NodeId::ROOT, property.clone()), &text) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(pid, property = %property, error = %e, "reference literal unreadable");
                    continue;
                }
            };
            for value in &state.values {
                let targets = self.connector.find_by_property_value(
                    vocab::UUID_URI,
                    &value.as_text(),
                    target_filter.as_ref(),
                )?;
                for target in targets {
                    let chain = self.connector.get_path(&target)?;
                    hits.push(extend_hit(&QueryHit::root(), &chain));
                }
            }
        }
        Ok(hits)
    }
}
