//! Persistent backend: the in-memory model saved under a data directory.
//!
//! The whole repository is written with bincode to `repository.bin` after
//! each successful mutation (temp file, fsync, rename) and read back on
//! open.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::connector::{Connector, MemoryConnector, Repository, StreamInfo};
use crate::error::Result;
use crate::pattern::{GraphQuery, QueryLanguage, ResultRow};

const REPOSITORY_FILE: &str = "repository.bin";

pub struct FileConnector {
    inner: MemoryConnector,
    path: PathBuf,
}

impl FileConnector {
    /// Open the repository stored in `dir`, creating an empty one if absent.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPOSITORY_FILE);
        let repo = match fs::read(&path) {
            Ok(bytes) => bincode::deserialize::<Repository>(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Repository::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), objects = repo.object_count(), "opened file repository");
        Ok(FileConnector {
            inner: MemoryConnector::from_repository(repo),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a mutation and save the result.
    fn mutate(&self, f: impl FnOnce(&mut Repository) -> Result<()>) -> Result<()> {
        self.inner.write(|repo| {
            f(repo)?;
            persist(&self.path, repo)
        })
    }

    /// Every literal stored for `uri` on `pid`
    pub fn property_values(&self, pid: &str, uri: &str) -> Result<Vec<String>> {
        self.inner.property_values(pid, uri)
    }
}

fn persist(path: &Path, repo: &Repository) -> Result<()> {
    let bytes = bincode::serialize(repo)?;
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl Connector for FileConnector {
    fn create_object(&self, pid: &str) -> Result<()> {
        self.mutate(|r| r.create_object(pid))
    }

    fn delete_object(&self, pid: &str) -> Result<()> {
        self.mutate(|r| r.delete_object(pid))
    }

    fn exists_object(&self, pid: &str) -> Result<bool> {
        self.inner.exists_object(pid)
    }

    fn list_objects(&self, glob: &str) -> Result<Vec<String>> {
        self.inner.list_objects(glob)
    }

    fn add_membership(&self, parent: &str, child: &str) -> Result<()> {
        self.mutate(|r| r.add_membership(parent, child))
    }

    fn add_property(&self, pid: &str, uri: &str, literal: &str) -> Result<()> {
        self.mutate(|r| r.add_property(pid, uri, literal))
    }

    fn get_property(&self, pid: &str, uri: &str) -> Result<Option<String>> {
        self.inner.get_property(pid, uri)
    }

    fn delete_property(&self, pid: &str, uri: &str) -> Result<()> {
        self.mutate(|r| r.delete_property(pid, uri))
    }

    fn list_properties(&self, pid: &str) -> Result<Vec<String>> {
        self.inner.list_properties(pid)
    }

    fn exists_property(&self, pid: &str, uri: &str) -> Result<bool> {
        self.inner.exists_property(pid, uri)
    }

    fn list_streams(&self, pid: &str) -> Result<Vec<StreamInfo>> {
        self.inner.list_streams(pid)
    }

    fn get_stream(&self, pid: &str, stream_id: &str) -> Result<Vec<u8>> {
        self.inner.get_stream(pid, stream_id)
    }

    fn exists_stream(&self, pid: &str, stream_id: &str) -> Result<bool> {
        self.inner.exists_stream(pid, stream_id)
    }

    fn add_stream(&self, pid: &str, stream_id: &str, label: &str, mime_type: &str, path: &Path) -> Result<()> {
        self.mutate(|r| r.add_stream(pid, stream_id, label, mime_type, path))
    }

    fn delete_stream(&self, pid: &str, stream_id: &str) -> Result<()> {
        self.mutate(|r| r.delete_stream(pid, stream_id))
    }

    fn search_graph(&self, query: &GraphQuery, language: QueryLanguage) -> Result<Vec<ResultRow>> {
        self.inner.search_graph(query, language)
    }

    fn query_language(&self) -> QueryLanguage {
        QueryLanguage::Itql
    }
}
