//! Adapter configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! `{}` is a valid configuration (in-memory backend).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::vocab;
use crate::connector::{self, Connector};
use crate::error::{AdapterError, Result};

/// Which repository backend to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterConfig {
    pub backend: BackendKind,
    /// Repository directory, required by the file backend
    pub data_dir: Option<PathBuf>,
    /// Where upload spool files are created; system temp dir if unset
    pub spool_dir: Option<PathBuf>,
    /// Namespace URI used for property names without a namespace
    pub default_namespace: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            backend: BackendKind::Memory,
            data_dir: None,
            spool_dir: None,
            default_namespace: vocab::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl AdapterConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AdapterConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::File && self.data_dir.is_none() {
            return Err(AdapterError::InvalidConfig(
                "file backend requires dataDir".to_string(),
            ));
        }
        if self.default_namespace.is_empty() || self.default_namespace.ends_with('/') {
            return Err(AdapterError::InvalidConfig(format!(
                "invalid defaultNamespace '{}'",
                self.default_namespace
            )));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        self.data_dir
            .clone()
            .ok_or_else(|| AdapterError::InvalidConfig("file backend requires dataDir".to_string()))
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Open the backend this configuration selects.
    pub fn open_connector(&self) -> Result<Arc<dyn Connector>> {
        connector::open_connector(self)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_json_is_default() {
        let config: AdapterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AdapterConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file_backend() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"backend": "file", "dataDir": "/tmp/flattree-data"}}"#).unwrap();
        let config = AdapterConfig::load(f.path()).unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/flattree-data"));
    }

    #[test]
    fn test_file_backend_without_dir_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"backend": "file"}}"#).unwrap();
        let err = AdapterConfig::load(f.path()).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_bad_namespace_rejected() {
        let config = AdapterConfig {
            default_namespace: "http://x/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
