//! Tests for the connector backends and listing helpers

use super::*;
use crate::error::AdapterError;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn tree() -> MemoryConnector {
    let c = MemoryConnector::new();
    for pid in ["demo:root", "demo:a", "demo:b", "demo:a1", "demo:a2", "demo:lonely"] {
        c.create_object(pid).unwrap();
    }
    c.add_membership("demo:root", "demo:a").unwrap();
    c.add_membership("demo:root", "demo:b").unwrap();
    c.add_membership("demo:a", "demo:a1").unwrap();
    c.add_membership("demo:a1", "demo:a2").unwrap();
    c
}

fn spool(bytes: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f
}

// ============================================================================
// Objects
// ============================================================================

#[test]
fn test_create_synthesizes_reserved_streams() {
    let c = MemoryConnector::new();
    c.create_object("demo:1").unwrap();
    assert!(c.exists_stream("demo:1", vocab::DC_STREAM).unwrap());
    assert!(c.exists_stream("demo:1", vocab::RELS_EXT_STREAM).unwrap());
    let dc = String::from_utf8(c.get_stream("demo:1", vocab::DC_STREAM).unwrap()).unwrap();
    assert!(dc.contains("<dc:identifier>demo:1</dc:identifier>"));
}

#[test]
fn test_create_validates_identifier() {
    let c = MemoryConnector::new();
    assert!(matches!(c.create_object("nocolon"), Err(AdapterError::InvalidIdentifier(_))));
    let long = format!("demo:{}", "x".repeat(80));
    assert!(c.create_object(&long).is_err());
    c.create_object("demo:1").unwrap();
    assert!(matches!(c.create_object("demo:1"), Err(AdapterError::ObjectExists(_))));
}

#[test]
fn test_membership_rewrites_relations_stream() {
    let c = tree();
    let rels = String::from_utf8(c.get_stream("demo:a", vocab::RELS_EXT_STREAM).unwrap()).unwrap();
    assert!(rels.contains("info:fedora/demo:root"));
}

#[test]
fn test_list_objects_glob() {
    let c = tree();
    assert_eq!(c.list_objects("demo:a*").unwrap(), vec!["demo:a", "demo:a1", "demo:a2"]);
    assert_eq!(c.list_objects("*2").unwrap(), vec!["demo:a2"]);
}

// ============================================================================
// Properties and Streams
// ============================================================================

#[test]
fn test_property_facts_accumulate_until_deleted() {
    let c = tree();
    c.add_property("demo:a", "urn:p", "1").unwrap();
    c.add_property("demo:a", "urn:p", "2").unwrap();
    assert_eq!(c.property_values("demo:a", "urn:p").unwrap().len(), 2);

    c.delete_property("demo:a", "urn:p").unwrap();
    assert!(!c.exists_property("demo:a", "urn:p").unwrap());
    assert_eq!(c.get_property("demo:a", "urn:p").unwrap(), None);
}

#[test]
fn test_missing_object_is_connector_failure() {
    let c = MemoryConnector::new();
    let err = c.list_properties("demo:none").unwrap_err();
    assert!(err.is_connector_failure());
}

#[test]
fn test_stream_upload_replaces() {
    let c = tree();
    c.add_stream("demo:a", "DSimg", "img", "image/png", spool(b"one").path()).unwrap();
    c.add_stream("demo:a", "DSimg", "img", "image/jpeg", spool(b"two").path()).unwrap();
    assert_eq!(c.get_stream("demo:a", "DSimg").unwrap(), b"two");
    let info = c.list_streams("demo:a").unwrap();
    let img = info.iter().find(|s| s.stream_id == "DSimg").unwrap();
    assert_eq!(img.mime_type, "image/jpeg");

    c.delete_stream("demo:a", "DSimg").unwrap();
    assert!(!c.exists_stream("demo:a", "DSimg").unwrap());
}

// ============================================================================
// Listing Helpers
// ============================================================================

#[test]
fn test_list_members() {
    let c = tree();
    assert_eq!(c.list_members("demo:root", None).unwrap(), vec!["demo:a", "demo:b"]);
    assert!(c.list_members("demo:b", None).unwrap().is_empty());
}

#[test]
fn test_list_members_with_filter() {
    let c = tree();
    let f = ObjectFilter::identifier_matches("b$");
    assert_eq!(c.list_members("demo:root", Some(&f)).unwrap(), vec!["demo:b"]);
}

#[test]
fn test_list_top_level() {
    let c = tree();
    assert_eq!(c.list_top_level(None).unwrap(), vec!["demo:lonely", "demo:root"]);
}

#[test]
fn test_list_descendants_chains() {
    let c = tree();
    let chains = c.list_descendants("demo:a", None).unwrap();
    assert_eq!(
        chains,
        vec![vec!["demo:a1".to_string()], vec!["demo:a1".to_string(), "demo:a2".to_string()]]
    );

    let f = ObjectFilter::identifier_matches("a2$");
    let filtered = c.list_descendants("demo:root", Some(&f)).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0], vec!["demo:a", "demo:a1", "demo:a2"]);
}

#[test]
fn test_get_parent_and_path() {
    let c = tree();
    assert_eq!(c.get_parent("demo:a2").unwrap(), Some("demo:a1".to_string()));
    assert_eq!(c.get_parent("demo:root").unwrap(), None);
    assert_eq!(c.get_path("demo:a2").unwrap(), vec!["demo:root", "demo:a", "demo:a1", "demo:a2"]);
}

#[test]
fn test_filter_objects() {
    let c = tree();
    c.add_property("demo:a", "urn:color", "1%571%57%570%57red").unwrap();
    c.add_property("demo:b", "urn:color", "1%571%57%570%57blue").unwrap();
    let f = ObjectFilter {
        patterns: vec![TriplePattern::new(Term::var(SUBJECT_VAR), Term::iri("urn:color"), Term::var("c"))],
        optional: vec![],
        expr: Some(Expr::regex("c", "%57red$")),
    };
    let pids = vec!["demo:a".to_string(), "demo:b".to_string(), "demo:root".to_string()];
    assert_eq!(c.filter_objects(&pids, &f).unwrap(), vec!["demo:a"]);
    assert!(c.filter_objects(&[], &f).unwrap().is_empty());
}

#[test]
fn test_find_by_property_value() {
    let c = tree();
    c.add_property("demo:a1", vocab::UUID_URI, "1%571%57%570%57abc-123").unwrap();
    let found = c.find_by_property_value(vocab::UUID_URI, "abc-123", None).unwrap();
    assert_eq!(found, vec!["demo:a1"]);
    assert!(c.find_by_property_value(vocab::UUID_URI, "bc-123x", None).unwrap().is_empty());
}

// ============================================================================
// File Backend
// ============================================================================

#[test]
fn test_file_backend_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let c = FileConnector::open(dir.path()).unwrap();
        c.create_object("demo:p").unwrap();
        c.create_object("demo:c").unwrap();
        c.add_membership("demo:p", "demo:c").unwrap();
        c.add_property("demo:c", "urn:p", "v").unwrap();
        c.add_stream("demo:c", "DSx", "x", "text/plain", spool(b"hello").path()).unwrap();
    }
    let c = FileConnector::open(dir.path()).unwrap();
    assert!(c.exists_object("demo:p").unwrap());
    assert_eq!(c.list_members("demo:p", None).unwrap(), vec!["demo:c"]);
    assert_eq!(c.get_property("demo:c", "urn:p").unwrap(), Some("v".to_string()));
    assert_eq!(c.get_stream("demo:c", "DSx").unwrap(), b"hello");
}

#[test]
fn test_open_connector_by_config() {
    let dir = tempdir().unwrap();
    let mut config = AdapterConfig::default();
    let memory = open_connector(&config).unwrap();
    memory.create_object("demo:1").unwrap();

    config.backend = BackendKind::File;
    config.data_dir = Some(dir.path().to_path_buf());
    let file = open_connector(&config).unwrap();
    file.create_object("demo:1").unwrap();
    assert!(dir.path().join("repository.bin").exists());
}
