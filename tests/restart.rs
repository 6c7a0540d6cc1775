//! Integration test: trees stored through the file backend survive a restart.
//!
//! Validates that:
//! - Node identities come back through the stored uuid facts
//! - Properties, mixins and streams reload with their values
//! - A second instance can keep writing to the reloaded tree

use std::path::Path;

use flattree::{
    AdapterConfig, BackendKind, ChangeLog, Name, NodeId, NodeKind, NodeState, PersistenceManager,
    PropertyId, PropertyState, Value,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn file_config(dir: &Path) -> AdapterConfig {
    AdapterConfig {
        backend: BackendKind::File,
        data_dir: Some(dir.join("repo")),
        spool_dir: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

fn open(dir: &Path) -> PersistenceManager {
    let m = PersistenceManager::open(file_config(dir)).unwrap();
    m.init().unwrap();
    m
}

fn container(id: NodeId, parent: NodeId, node_type: Name) -> NodeState {
    NodeState::new(id, Some(parent), NodeKind::Container, node_type)
}

fn prop(owner: NodeId, name: Name, value: Value) -> PropertyState {
    PropertyState::single(PropertyId::new(owner, name), value)
}

/// Walk `path` from the root, loading every node on the way
fn walk(m: &PersistenceManager, path: &[&str]) -> NodeId {
    let mut current = NodeId::ROOT;
    for segment in path {
        let node = m.load_node(current).unwrap();
        current = node
            .child(&Name::from_segment(segment))
            .unwrap_or_else(|| panic!("no child {} under {}", segment, current));
    }
    current
}

const SITE: NodeId = NodeId(0x1000);
const PAGE: NodeId = NodeId(0x1001);
const LOGO: NodeId = NodeId(0x1002);
const LOGO_CONTENT: NodeId = NodeId(0x1003);

fn store_site(m: &PersistenceManager) {
    let mut root = NodeState::new(NodeId::ROOT, None, NodeKind::Root, Name::local("root"));
    root.add_child(Name::local("site"), SITE);

    let mut site = container(SITE, NodeId::ROOT, Name::nt("folder"));
    site.add_child(Name::local("home page"), PAGE);
    site.add_child(Name::local("logo.png"), LOGO);
    site.mixins.insert(Name::new("http://www.jcp.org/jcr/mix/1.0", "referenceable"));

    let page = container(PAGE, SITE, Name::nt("unstructured"));
    let mut logo = NodeState::new(LOGO, Some(SITE), NodeKind::StreamHolder, Name::nt("file"));
    logo.add_child(Name::jcr("content"), LOGO_CONTENT);
    let logo_content = NodeState::new(LOGO_CONTENT, Some(LOGO), NodeKind::StreamContent, Name::nt("resource"));

    let mut changes = ChangeLog::new();
    changes.modified_nodes.push(root);
    // children listed before their parents
    changes.added_nodes.extend([logo_content, logo, page, site]);
    changes.added_properties.extend([
        prop(PAGE, Name::local("title"), Value::String("Welcome, 100% fresh".into())),
        prop(PAGE, Name::local("views"), Value::Long(42)),
        prop(PAGE, Name::local("site"), Value::Reference(SITE)),
        prop(LOGO_CONTENT, Name::jcr("mimeType"), Value::String("image/png".into())),
        prop(LOGO_CONTENT, Name::jcr("data"), Value::Binary(vec![0x89, b'P', b'N', b'G', 0, 1, 2])),
    ]);
    m.store_changes(&changes).unwrap();
    assert_eq!(m.pending_len().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn tree_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let m = open(dir.path());
        store_site(&m);
        m.close().unwrap();
    }

    let m = open(dir.path());
    assert_eq!(walk(&m, &["site"]), SITE);
    assert_eq!(walk(&m, &["site", "home page"]), PAGE);

    let site = m.load_node(SITE).unwrap();
    assert_eq!(site.node_type, Name::nt("folder"));
    assert_eq!(site.mixins.len(), 1);

    let title = m.load_property(&PropertyId::new(PAGE, Name::local("title"))).unwrap();
    assert_eq!(title.first(), Some(&Value::String("Welcome, 100% fresh".into())));
    let views = m.load_property(&PropertyId::new(PAGE, Name::local("views"))).unwrap();
    assert_eq!(views.first(), Some(&Value::Long(42)));
    let link = m.load_property(&PropertyId::new(PAGE, Name::local("site"))).unwrap();
    assert_eq!(link.first(), Some(&Value::Reference(SITE)));
}

#[test]
fn streams_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let m = open(dir.path());
        store_site(&m);
    }

    let m = open(dir.path());
    let holder = walk(&m, &["site", "logo.png"]);
    // holders get fresh identities on every load; the stream is what persists
    assert_ne!(holder, LOGO);
    let file = m.load_node(holder).unwrap();
    assert_eq!(file.kind, NodeKind::StreamHolder);

    let content = file.child(&Name::jcr("content")).unwrap();
    let data = m.load_property(&PropertyId::new(content, Name::jcr("data"))).unwrap();
    assert_eq!(data.first(), Some(&Value::Binary(vec![0x89, b'P', b'N', b'G', 0, 1, 2])));
    let mime = m.load_property(&PropertyId::new(content, Name::jcr("mimeType"))).unwrap();
    assert_eq!(mime.first(), Some(&Value::String("image/png".into())));
}

#[test]
fn reloaded_tree_accepts_writes() {
    let dir = TempDir::new().unwrap();
    {
        let m = open(dir.path());
        store_site(&m);
    }
    {
        let m = open(dir.path());
        walk(&m, &["site", "home page"]);
        m.store_property(&prop(PAGE, Name::local("views"), Value::Long(43))).unwrap();

        let page = m.load_node(PAGE).unwrap();
        m.destroy_property(&prop(PAGE, Name::local("site"), Value::Reference(SITE))).unwrap();
        assert!(page.properties.contains(&Name::local("site")));
    }

    let m = open(dir.path());
    walk(&m, &["site", "home page"]);
    let views = m.load_property(&PropertyId::new(PAGE, Name::local("views"))).unwrap();
    assert_eq!(views.first(), Some(&Value::Long(43)));
    assert!(!m.exists_property(&PropertyId::new(PAGE, Name::local("site"))).unwrap());
}

#[test]
fn long_names_survive_restart() {
    const REPORT: NodeId = NodeId(0x2000);
    const NOTES: NodeId = NodeId(0x2001);
    let long_name = "quarterly-financial-report-for-the-board-2026-final.pdf";
    assert!(long_name.len() > 43);

    let dir = TempDir::new().unwrap();
    {
        let m = open(dir.path());
        let mut root = NodeState::new(NodeId::ROOT, None, NodeKind::Root, Name::local("root"));
        root.add_child(Name::local(long_name), REPORT);
        let mut report = container(REPORT, NodeId::ROOT, Name::nt("unstructured"));
        report.add_child(Name::local("notes"), NOTES);

        let mut changes = ChangeLog::new();
        changes.modified_nodes.push(root);
        changes.added_nodes.extend([report, container(NOTES, REPORT, Name::nt("unstructured"))]);
        changes.added_properties.extend([
            prop(REPORT, Name::local("title"), Value::String("hello".into())),
            prop(NOTES, Name::local("title"), Value::String("notes".into())),
        ]);
        m.store_changes(&changes).unwrap();
    }

    let m = open(dir.path());
    let root = m.load_node(NodeId::ROOT).unwrap();
    let entry = root.children.iter().find(|c| c.id == REPORT).expect("report listed");
    // the stored identifier only kept a prefix of the name
    assert!(long_name.starts_with(&entry.name.local));
    assert_ne!(entry.name.local, long_name);

    let title = m.load_property(&PropertyId::new(REPORT, Name::local("title"))).unwrap();
    assert_eq!(title.first(), Some(&Value::String("hello".into())));

    let report = m.load_node(REPORT).unwrap();
    assert_eq!(report.child(&Name::local("notes")), Some(NOTES));
    let notes = m.load_property(&PropertyId::new(NOTES, Name::local("title"))).unwrap();
    assert_eq!(notes.first(), Some(&Value::String("notes".into())));

    m.store_property(&prop(REPORT, Name::local("title"), Value::String("again".into()))).unwrap();
    let title = m.load_property(&PropertyId::new(REPORT, Name::local("title"))).unwrap();
    assert_eq!(title.first(), Some(&Value::String("again".into())));
}
