//! Repository connector
//!
//! The capability surface the adapter needs from the flat object
//! repository. Two backends implement it:
//!
//! - [`MemoryConnector`]: ephemeral, everything lives in process memory
//! - [`FileConnector`]: same model, saved to a data directory after every
//!   mutation and reloaded on open
//!
//! Listing helpers (members, descendants, top-level objects, parents) are
//! provided methods that lower into [`Connector::search_graph`], so a
//! backend only has to answer pattern queries.

mod file;
mod memory;
mod repository;

pub use file::FileConnector;
pub use memory::MemoryConnector;
pub use repository::{Repository, StoredObject, StoredStream};

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use crate::codec::{self, vocab};
use crate::config::{AdapterConfig, BackendKind};
use crate::error::Result;
use crate::pattern::{Expr, GraphQuery, QueryLanguage, ResultRow, Term, TriplePattern};

/// Variable every listing helper binds the candidate object to
pub const SUBJECT_VAR: &str = "s";

/// Variable bound to the candidate's identifier literal
pub const ID_VAR: &str = "id";

/// Metadata of one stream on an object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_id: String,
    pub label: String,
    pub mime_type: String,
}

/// Extra constraints on candidate objects, expressed over [`SUBJECT_VAR`]
/// and [`ID_VAR`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    pub patterns: Vec<TriplePattern>,
    pub optional: Vec<Vec<TriplePattern>>,
    pub expr: Option<Expr>,
}

impl ObjectFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.optional.is_empty() && self.expr.is_none()
    }

    /// Only objects whose identifier is one of `pids`
    pub fn identifier_in(pids: &[String]) -> Self {
        let alternatives = pids
            .iter()
            .map(|p| Expr::Eq(ID_VAR.to_string(), Term::literal(p)))
            .collect();
        ObjectFilter {
            expr: Some(Expr::or(alternatives)),
            ..Default::default()
        }
    }

    /// Only objects whose identifier matches `regex`
    pub fn identifier_matches(regex: &str) -> Self {
        ObjectFilter {
            expr: Some(Expr::regex(ID_VAR, regex)),
            ..Default::default()
        }
    }

    /// Conjunction of two filters
    pub fn and(mut self, other: ObjectFilter) -> Self {
        self.patterns.extend(other.patterns);
        self.optional.extend(other.optional);
        self.expr = match (self.expr.take(), other.expr) {
            (Some(a), Some(b)) => Some(Expr::and(vec![a, b])),
            (a, b) => a.or(b),
        };
        self
    }

    /// Add this filter's patterns and condition to `query`
    pub fn apply(&self, mut query: GraphQuery) -> GraphQuery {
        query.patterns.extend(self.patterns.iter().cloned());
        query.optional.extend(self.optional.iter().cloned());
        if let Some(expr) = &self.expr {
            query.filters.push(expr.clone());
        }
        query
    }
}

/// Base query binding every object to `?s` and its identifier to `?id`
fn objects_query() -> GraphQuery {
    GraphQuery::select(&[SUBJECT_VAR]).triple(
        Term::var(SUBJECT_VAR),
        Term::iri(vocab::DC_IDENTIFIER),
        Term::var(ID_VAR),
    )
}

fn subjects(rows: Vec<ResultRow>) -> Vec<String> {
    let mut out: Vec<String> = rows
        .iter()
        .filter_map(|r| r.get_str(SUBJECT_VAR))
        .map(|iri| vocab::pid_of_iri(iri).to_string())
        .collect();
    out.sort();
    out.dedup();
    out
}

pub trait Connector: Send + Sync {
    // Objects
    fn create_object(&self, pid: &str) -> Result<()>;
    fn delete_object(&self, pid: &str) -> Result<()>;
    fn exists_object(&self, pid: &str) -> Result<bool>;
    /// Identifiers matching a glob with `*` wildcards
    fn list_objects(&self, glob: &str) -> Result<Vec<String>>;
    fn add_membership(&self, parent: &str, child: &str) -> Result<()>;

    // Properties
    fn add_property(&self, pid: &str, uri: &str, literal: &str) -> Result<()>;
    /// First literal stored for `uri`, None if there is none
    fn get_property(&self, pid: &str, uri: &str) -> Result<Option<String>>;
    fn delete_property(&self, pid: &str, uri: &str) -> Result<()>;
    fn list_properties(&self, pid: &str) -> Result<Vec<String>>;
    fn exists_property(&self, pid: &str, uri: &str) -> Result<bool>;

    // Streams
    fn list_streams(&self, pid: &str) -> Result<Vec<StreamInfo>>;
    fn get_stream(&self, pid: &str, stream_id: &str) -> Result<Vec<u8>>;
    fn exists_stream(&self, pid: &str, stream_id: &str) -> Result<bool>;
    /// Upload the file at `path` as `stream_id`, replacing an existing stream
    fn add_stream(&self, pid: &str, stream_id: &str, label: &str, mime_type: &str, path: &Path) -> Result<()>;
    fn delete_stream(&self, pid: &str, stream_id: &str) -> Result<()>;

    /// Answer a pattern query against the relationship graph
    fn search_graph(&self, query: &GraphQuery, language: QueryLanguage) -> Result<Vec<ResultRow>>;

    /// Dialect used when rendering queries for this backend
    fn query_language(&self) -> QueryLanguage {
        QueryLanguage::Sparql
    }

    // ========================================================================
    // Provided listing helpers
    // ========================================================================

    /// Direct members of `pid`
    fn list_members(&self, pid: &str, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        let mut query = objects_query().triple(
            Term::var(SUBJECT_VAR),
            Term::iri(vocab::MEMBER_OF),
            Term::iri(&vocab::object_iri(pid)),
        );
        if let Some(f) = filter {
            query = f.apply(query);
        }
        tracing::debug!(query = %query, "list_members");
        Ok(subjects(self.search_graph(&query, self.query_language())?))
    }

    /// Objects that are nobody's member
    fn list_top_level(&self, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        let mut query = objects_query()
            .optional(vec![TriplePattern::new(
                Term::var(SUBJECT_VAR),
                Term::iri(vocab::MEMBER_OF),
                Term::var("parent"),
            )])
            .filter(Expr::Not(Box::new(Expr::Bound("parent".into()))));
        if let Some(f) = filter {
            query = f.apply(query);
        }
        tracing::debug!(query = %query, "list_top_level");
        Ok(subjects(self.search_graph(&query, self.query_language())?))
    }

    /// Every descendant of `pid` as the chain of identifiers below `pid`,
    /// ending at the descendant. The filter applies to the last element only.
    fn list_descendants(&self, pid: &str, filter: Option<&ObjectFilter>) -> Result<Vec<Vec<String>>> {
        let mut chains = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(pid.to_string());
        let mut queue: VecDeque<Vec<String>> = VecDeque::new();
        queue.push_back(Vec::new());

        while let Some(chain) = queue.pop_front() {
            let parent = chain.last().map(String::as_str).unwrap_or(pid);
            for member in self.list_members(parent, None)? {
                if !seen.insert(member.clone()) {
                    continue;
                }
                let mut next = chain.clone();
                next.push(member);
                chains.push(next.clone());
                queue.push_back(next);
            }
        }

        match filter {
            Some(f) if !f.is_empty() => {
                let candidates: Vec<String> = chains.iter().filter_map(|c| c.last().cloned()).collect();
                let passing: HashSet<String> = self.filter_objects(&candidates, f)?.into_iter().collect();
                chains.retain(|c| c.last().is_some_and(|last| passing.contains(last)));
                Ok(chains)
            }
            _ => Ok(chains),
        }
    }

    /// The subset of `pids` passing `filter`
    fn filter_objects(&self, pids: &[String], filter: &ObjectFilter) -> Result<Vec<String>> {
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let query = ObjectFilter::identifier_in(pids).and(filter.clone()).apply(objects_query());
        tracing::debug!(query = %query, "filter_objects");
        Ok(subjects(self.search_graph(&query, self.query_language())?))
    }

    /// Collection `pid` is a member of
    fn get_parent(&self, pid: &str) -> Result<Option<String>> {
        let query = GraphQuery::select(&["parent"]).triple(
            Term::iri(&vocab::object_iri(pid)),
            Term::iri(vocab::MEMBER_OF),
            Term::var("parent"),
        );
        let rows = self.search_graph(&query, self.query_language())?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("parent"))
            .map(|iri| vocab::pid_of_iri(iri).to_string())
            .min())
    }

    /// Ancestor chain of `pid`, top-level object first, `pid` last
    fn get_path(&self, pid: &str) -> Result<Vec<String>> {
        let mut chain = vec![pid.to_string()];
        let mut seen: HashSet<String> = chain.iter().cloned().collect();
        let mut current = pid.to_string();
        while let Some(parent) = self.get_parent(&current)? {
            if !seen.insert(parent.clone()) {
                break;
            }
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Objects carrying a literal for `uri` that ends with `SEP + value`
    fn find_by_property_value(&self, uri: &str, value: &str, filter: Option<&ObjectFilter>) -> Result<Vec<String>> {
        let pattern = format!("{}{}$", regex_escape(codec::SEP), regex_escape(value));
        let mut query = objects_query()
            .triple(Term::var(SUBJECT_VAR), Term::iri(uri), Term::var("value"))
            .filter(Expr::regex("value", &pattern));
        if let Some(f) = filter {
            query = f.apply(query);
        }
        tracing::debug!(query = %query, "find_by_property_value");
        Ok(subjects(self.search_graph(&query, self.query_language())?))
    }
}

/// Escape text for literal use inside a pattern regex
pub fn regex_escape(text: &str) -> String {
    regex_lite::escape(text)
}

/// Open the backend selected by `config`.
pub fn open_connector(config: &AdapterConfig) -> Result<Arc<dyn Connector>> {
    match config.backend {
        BackendKind::Memory => {
            tracing::info!("using in-memory repository");
            Ok(Arc::new(MemoryConnector::new()))
        }
        BackendKind::File => {
            let dir = config.data_dir()?;
            tracing::info!(path = %dir.display(), "using file repository");
            Ok(Arc::new(FileConnector::open(&dir)?))
        }
    }
}

#[cfg(test)]
mod tests;
