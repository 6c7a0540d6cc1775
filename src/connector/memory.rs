//! Ephemeral in-memory backend

use std::path::Path;
use std::sync::RwLock;

use crate::connector::{Connector, Repository, StreamInfo};
use crate::error::Result;
use crate::pattern::{render, Evaluator, GraphQuery, QueryLanguage, ResultRow};

/// Repository held entirely in process memory; gone when dropped.
#[derive(Default)]
pub struct MemoryConnector {
    repo: RwLock<Repository>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_repository(repo: Repository) -> Self {
        MemoryConnector {
            repo: RwLock::new(repo),
        }
    }

    /// Copy of the current repository contents
    pub fn snapshot(&self) -> Result<Repository> {
        Ok(self.repo.read()?.clone())
    }

    /// Every literal stored for `uri` on `pid`
    pub fn property_values(&self, pid: &str, uri: &str) -> Result<Vec<String>> {
        Ok(self.repo.read()?.property_values(pid, uri))
    }

    pub fn object_count(&self) -> Result<usize> {
        Ok(self.repo.read()?.object_count())
    }

    /// Run `f` with exclusive access to the repository
    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut Repository) -> Result<T>) -> Result<T> {
        let mut repo = self.repo.write()?;
        f(&mut repo)
    }
}

impl Connector for MemoryConnector {
    fn create_object(&self, pid: &str) -> Result<()> {
        self.write(|r| r.create_object(pid))
    }

    fn delete_object(&self, pid: &str) -> Result<()> {
        self.write(|r| r.delete_object(pid))
    }

    fn exists_object(&self, pid: &str) -> Result<bool> {
        Ok(self.repo.read()?.exists_object(pid))
    }

    fn list_objects(&self, glob: &str) -> Result<Vec<String>> {
        self.repo.read()?.list_objects(glob)
    }

    fn add_membership(&self, parent: &str, child: &str) -> Result<()> {
        self.write(|r| r.add_membership(parent, child))
    }

    fn add_property(&self, pid: &str, uri: &str, literal: &str) -> Result<()> {
        self.write(|r| r.add_property(pid, uri, literal))
    }

    fn get_property(&self, pid: &str, uri: &str) -> Result<Option<String>> {
        self.repo.read()?.get_property(pid, uri)
    }

    fn delete_property(&self, pid: &str, uri: &str) -> Result<()> {
        self.write(|r| r.delete_property(pid, uri))
    }

    fn list_properties(&self, pid: &str) -> Result<Vec<String>> {
        self.repo.read()?.list_properties(pid)
    }

    fn exists_property(&self, pid: &str, uri: &str) -> Result<bool> {
        self.repo.read()?.exists_property(pid, uri)
    }

    fn list_streams(&self, pid: &str) -> Result<Vec<StreamInfo>> {
        self.repo.read()?.list_streams(pid)
    }

    fn get_stream(&self, pid: &str, stream_id: &str) -> Result<Vec<u8>> {
        self.repo.read()?.get_stream(pid, stream_id)
    }

    fn exists_stream(&self, pid: &str, stream_id: &str) -> Result<bool> {
        self.repo.read()?.exists_stream(pid, stream_id)
    }

    fn add_stream(&self, pid: &str, stream_id: &str, label: &str, mime_type: &str, path: &Path) -> Result<()> {
        self.write(|r| r.add_stream(pid, stream_id, label, mime_type, path))
    }

    fn delete_stream(&self, pid: &str, stream_id: &str) -> Result<()> {
        self.write(|r| r.delete_stream(pid, stream_id))
    }

    fn search_graph(&self, query: &GraphQuery, language: QueryLanguage) -> Result<Vec<ResultRow>> {
        tracing::trace!(query = %render(query, language), "search_graph");
        let repo = self.repo.read()?;
        Evaluator::new(&*repo).eval_query(query)
    }
}
