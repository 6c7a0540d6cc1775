//! In-process repository model shared by both backends.
//!
//! Objects carry a set of property facts (URI -> literals), the collections
//! they are a member of, and named streams. Every object gets the two
//! reserved streams on creation; the relationship manifest is rewritten
//! whenever membership changes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{self, vocab};
use crate::connector::StreamInfo;
use crate::error::{AdapterError, Result};
use crate::pattern::{Triple, TripleSource, Value};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStream {
    pub label: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub properties: BTreeMap<String, BTreeSet<String>>,
    pub member_of: BTreeSet<String>,
    pub streams: BTreeMap<String, StoredStream>,
}

impl StoredObject {
    fn new(pid: &str) -> Self {
        let mut object = StoredObject::default();
        object.streams.insert(
            vocab::DC_STREAM.to_string(),
            StoredStream {
                label: "Dublin Core Record".to_string(),
                mime_type: "text/xml".to_string(),
                content: dc_record(pid).into_bytes(),
            },
        );
        object.refresh_relations(pid);
        object
    }

    /// Rewrite the relationship manifest stream from `member_of`
    fn refresh_relations(&mut self, pid: &str) {
        let mut xml = format!(
            "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n  <rdf:Description rdf:about=\"{}\">\n",
            vocab::object_iri(pid)
        );
        for parent in &self.member_of {
            xml.push_str(&format!(
                "    <isMemberOfCollection rdf:resource=\"{}\"/>\n",
                vocab::object_iri(parent)
            ));
        }
        xml.push_str("  </rdf:Description>\n</rdf:RDF>\n");
        self.streams.insert(
            vocab::RELS_EXT_STREAM.to_string(),
            StoredStream {
                label: "Relationships".to_string(),
                mime_type: "application/rdf+xml".to_string(),
                content: xml.into_bytes(),
            },
        );
    }
}

fn dc_record(pid: &str) -> String {
    format!(
        "<oai_dc:dc xmlns:oai_dc=\"http://www.openarchives.org/OAI/2.0/oai_dc/\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n  <dc:identifier>{}</dc:identifier>\n</oai_dc:dc>\n",
        pid
    )
}

/// Identifiers must have a namespace part and fit the length limit
pub fn validate_pid(pid: &str) -> Result<()> {
    let valid = pid.contains(':')
        && !pid.starts_with(':')
        && pid.chars().count() <= codec::MAX_PID_LEN
        && !pid.chars().any(|c| c.is_whitespace() || c == '/');
    if valid {
        Ok(())
    } else {
        Err(AdapterError::InvalidIdentifier(pid.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    objects: BTreeMap<String, StoredObject>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, pid: &str) -> Option<&StoredObject> {
        self.objects.get(pid)
    }

    fn object_mut(&mut self, pid: &str) -> Result<&mut StoredObject> {
        self.objects
            .get_mut(pid)
            .ok_or_else(|| AdapterError::ObjectNotFound(pid.to_string()))
    }

    fn existing(&self, pid: &str) -> Result<&StoredObject> {
        self.objects
            .get(pid)
            .ok_or_else(|| AdapterError::ObjectNotFound(pid.to_string()))
    }

    // ========================================================================
    // Objects
    // ========================================================================

    pub fn create_object(&mut self, pid: &str) -> Result<()> {
        validate_pid(pid)?;
        if self.objects.contains_key(pid) {
            return Err(AdapterError::ObjectExists(pid.to_string()));
        }
        self.objects.insert(pid.to_string(), StoredObject::new(pid));
        Ok(())
    }

    pub fn delete_object(&mut self, pid: &str) -> Result<()> {
        self.objects
            .remove(pid)
            .map(|_| ())
            .ok_or_else(|| AdapterError::ObjectNotFound(pid.to_string()))
    }

    pub fn exists_object(&self, pid: &str) -> bool {
        self.objects.contains_key(pid)
    }

    pub fn list_objects(&self, glob: &str) -> Result<Vec<String>> {
        let re = regex_lite::Regex::new(&crate::pattern::glob_to_regex(glob))
            .map_err(|e| AdapterError::InvalidIdentifier(format!("{}: {}", glob, e)))?;
        Ok(self.objects.keys().filter(|pid| re.is_match(pid)).cloned().collect())
    }

    pub fn add_membership(&mut self, parent: &str, child: &str) -> Result<()> {
        self.existing(parent)?;
        let object = self.object_mut(child)?;
        if object.member_of.insert(parent.to_string()) {
            object.refresh_relations(child);
        }
        Ok(())
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub fn add_property(&mut self, pid: &str, uri: &str, literal: &str) -> Result<()> {
        self.object_mut(pid)?
            .properties
            .entry(uri.to_string())
            .or_default()
            .insert(literal.to_string());
        Ok(())
    }

    pub fn get_property(&self, pid: &str, uri: &str) -> Result<Option<String>> {
        Ok(self
            .existing(pid)?
            .properties
            .get(uri)
            .and_then(|values| values.iter().next().cloned()))
    }

    /// All literals for `uri`
    pub fn property_values(&self, pid: &str, uri: &str) -> Vec<String> {
        self.objects
            .get(pid)
            .and_then(|o| o.properties.get(uri))
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn delete_property(&mut self, pid: &str, uri: &str) -> Result<()> {
        self.object_mut(pid)?.properties.remove(uri);
        Ok(())
    }

    pub fn list_properties(&self, pid: &str) -> Result<Vec<String>> {
        Ok(self
            .existing(pid)?
            .properties
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(uri, _)| uri.clone())
            .collect())
    }

    pub fn exists_property(&self, pid: &str, uri: &str) -> Result<bool> {
        Ok(self
            .existing(pid)?
            .properties
            .get(uri)
            .is_some_and(|values| !values.is_empty()))
    }

    // ========================================================================
    // Streams
    // ========================================================================

    pub fn list_streams(&self, pid: &str) -> Result<Vec<StreamInfo>> {
        Ok(self
            .existing(pid)?
            .streams
            .iter()
            .map(|(id, s)| StreamInfo {
                stream_id: id.clone(),
                label: s.label.clone(),
                mime_type: s.mime_type.clone(),
            })
            .collect())
    }

    pub fn get_stream(&self, pid: &str, stream_id: &str) -> Result<Vec<u8>> {
        self.existing(pid)?
            .streams
            .get(stream_id)
            .map(|s| s.content.clone())
            .ok_or_else(|| AdapterError::StreamNotFound {
                pid: pid.to_string(),
                stream: stream_id.to_string(),
            })
    }

    pub fn exists_stream(&self, pid: &str, stream_id: &str) -> Result<bool> {
        Ok(self.existing(pid)?.streams.contains_key(stream_id))
    }

    pub fn add_stream(&mut self, pid: &str, stream_id: &str, label: &str, mime_type: &str, path: &Path) -> Result<()> {
        let content = std::fs::read(path)?;
        self.object_mut(pid)?.streams.insert(
            stream_id.to_string(),
            StoredStream {
                label: label.to_string(),
                mime_type: mime_type.to_string(),
                content,
            },
        );
        Ok(())
    }

    pub fn delete_stream(&mut self, pid: &str, stream_id: &str) -> Result<()> {
        self.object_mut(pid)?
            .streams
            .remove(stream_id)
            .map(|_| ())
            .ok_or_else(|| AdapterError::StreamNotFound {
                pid: pid.to_string(),
                stream: stream_id.to_string(),
            })
    }

    // ========================================================================
    // Graph view
    // ========================================================================

    fn object_triples(&self, pid: &str, object: &StoredObject, out: &mut Vec<Triple>) {
        let subject = vocab::object_iri(pid);
        out.push(Triple {
            subject: subject.clone(),
            predicate: vocab::DC_IDENTIFIER.to_string(),
            object: Value::Literal(pid.to_string()),
        });
        for parent in &object.member_of {
            out.push(Triple {
                subject: subject.clone(),
                predicate: vocab::MEMBER_OF.to_string(),
                object: Value::Iri(vocab::object_iri(parent)),
            });
        }
        for (uri, values) in &object.properties {
            for literal in values {
                out.push(Triple {
                    subject: subject.clone(),
                    predicate: uri.clone(),
                    object: Value::Literal(literal.clone()),
                });
            }
        }
    }
}

impl TripleSource for Repository {
    fn triples(&self, subject: Option<&str>, predicate: Option<&str>, object: Option<&Value>) -> Vec<Triple> {
        let mut all = Vec::new();
        match subject {
            Some(s) => {
                let pid = vocab::pid_of_iri(s);
                if let Some(obj) = self.objects.get(pid) {
                    self.object_triples(pid, obj, &mut all);
                }
            }
            None => {
                for (pid, obj) in &self.objects {
                    self.object_triples(pid, obj, &mut all);
                }
            }
        }
        all.retain(|t| {
            predicate.map_or(true, |p| t.predicate == p) && object.map_or(true, |o| &t.object == o)
        });
        all
    }
}
