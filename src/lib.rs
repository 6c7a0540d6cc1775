//! flattree - a hierarchical content tree over a flat object repository
//!
//! The repository only knows flat objects with identifiers, property facts,
//! membership relations and named byte streams. This crate presents it as a
//! tree of nodes and properties:
//!
//! - **mapping**: identifier codec, path/identity index, pending queue,
//!   materializer (load) and persister (store), driven through
//!   [`PersistenceManager`]
//! - **query**: path queries lowered step by step into the repository's
//!   graph pattern language
//!
//! The repository itself sits behind the [`connector::Connector`] trait,
//! with an in-memory and a file-backed implementation.

pub mod codec;
pub mod config;
pub mod connector;
pub mod error;
pub mod index;
pub mod model;
pub mod pattern;
pub mod pending;
pub mod persistence;
pub mod query;

pub use config::{AdapterConfig, BackendKind};
pub use connector::{Connector, FileConnector, MemoryConnector};
pub use error::{AdapterError, Result};
pub use model::{
    ChangeLog, ChildEntry, Name, NodeId, NodeKind, NodeReferences, NodeState, PropertyId,
    PropertyState, PropertyType, Value,
};
pub use persistence::PersistenceManager;
pub use query::{parse as parse_query, QueryHit, QueryRoot};
