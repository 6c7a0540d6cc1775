//! Query engine tests against an in-memory repository laid out the way the
//! persister lays it out.
//!
//! ```text
//! /a          color=red
//! /a/x        color=red   rank=2   nt:file
//! /a/x/deep
//! /a/y        color=blue  rank=10  (jcr:uuid)
//! /a/z                    rank=1
//! /b          ref -> /a/y
//! /b/x        color=red
//! ```

use super::*;
use crate::codec::{self, literal, vocab};
use crate::connector::{Connector, MemoryConnector};
use crate::index::join_path;
use crate::model::{ns, Name, NodeId, PropertyId, PropertyState, Value};

#[derive(Clone)]
struct Node {
    pid: String,
    path: String,
    depth: usize,
}

fn node(c: &MemoryConnector, parent: Option<&Node>, name: &str) -> Node {
    let (depth, path) = match parent {
        Some(p) => (p.depth + 1, join_path(&p.path, name)),
        None => (1, join_path("", name)),
    };
    let pid = codec::encode_synthetic(depth, &path, name);
    c.create_object(&pid).unwrap();
    if let Some(p) = parent {
        c.add_membership(&p.pid, &pid).unwrap();
    }
    Node { pid, path, depth }
}

fn set(c: &MemoryConnector, n: &Node, name: Name, value: Value) {
    let uri = codec::property_uri(&name, ns::SLING);
    let state = PropertyState::single(PropertyId::new(NodeId::ROOT, name), value);
    c.add_property(&n.pid, &uri, &literal::encode_property(&state)).unwrap();
}

struct Fixture {
    c: MemoryConnector,
    a: Node,
    ax: Node,
    ay: Node,
    b: Node,
    bx: Node,
}

fn fixture() -> Fixture {
    let c = MemoryConnector::new();
    let a = node(&c, None, "a");
    let b = node(&c, None, "b");
    let ax = node(&c, Some(&a), "x");
    let ay = node(&c, Some(&a), "y");
    let az = node(&c, Some(&a), "z");
    let bx = node(&c, Some(&b), "x");
    node(&c, Some(&ax), "deep");

    let color = || Name::local("color");
    let rank = || Name::local("rank");
    set(&c, &a, color(), Value::String("red".into()));
    set(&c, &ax, color(), Value::String("red".into()));
    set(&c, &ay, color(), Value::String("blue".into()));
    set(&c, &bx, color(), Value::String("red".into()));
    set(&c, &ax, rank(), Value::Long(2));
    set(&c, &ay, rank(), Value::Long(10));
    set(&c, &az, rank(), Value::Long(1));
    set(&c, &ax, Name::jcr("primaryType"), Value::Name(Name::nt("file")));

    let target = NodeId::derive(b"a/y");
    set(&c, &ay, Name::jcr("uuid"), Value::String(target.to_string()));
    set(&c, &b, Name::local("ref"), Value::Reference(target));

    Fixture { c, a, ax, ay, b, bx }
}

fn run(f: &Fixture, text: &str) -> Vec<String> {
    let root = parse(text).unwrap();
    QueryBuilder::new(&f.c, ns::SLING)
        .execute(&root)
        .unwrap()
        .into_iter()
        .map(|h| h.path)
        .collect()
}

/// Hit paths in path order, for steps whose result order is unspecified
fn run_sorted(f: &Fixture, text: &str) -> Vec<String> {
    let mut paths = run(f, text);
    paths.sort();
    paths
}

// ============================================================================
// Steps
// ============================================================================

#[test]
fn test_exact_path() {
    let f = fixture();
    let root = parse("/jcr:root/a/x").unwrap();
    let hits = QueryBuilder::new(&f.c, ns::SLING).execute(&root).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/a/x");
    assert_eq!(hits[0].pids, vec![f.a.pid.clone(), f.ax.pid.clone()]);
    assert_eq!(hits[0].segments().collect::<Vec<_>>(), vec!["a", "x"]);
}

#[test]
fn test_exact_miss_stops_pipeline() {
    let f = fixture();
    assert!(run(&f, "/jcr:root/nope/x").is_empty());
    assert!(run(&f, "/jcr:root/a/deep").is_empty());
}

#[test]
fn test_children_with_predicate() {
    let f = fixture();
    // /a/y is blue, /a/z has no color, /b/x is red but not below /a
    assert_eq!(run(&f, "/jcr:root/a/*[@color = 'red']"), vec!["/a/x"]);
}

#[test]
fn test_top_level_children() {
    let f = fixture();
    assert_eq!(run_sorted(&f, "/jcr:root/*"), vec!["/a", "/b"]);
}

#[test]
fn test_not_equal_requires_property() {
    let f = fixture();
    assert_eq!(run(&f, "/jcr:root/a/*[@color != 'red']"), vec!["/a/y"]);
}

#[test]
fn test_not_null_and_negation() {
    let f = fixture();
    assert_eq!(run_sorted(&f, "/jcr:root/a/*[@color]"), vec!["/a/x", "/a/y"]);
    assert_eq!(run(&f, "/jcr:root/a/*[not(@color)]"), vec!["/a/z"]);
    assert_eq!(
        run_sorted(&f, "/jcr:root/a/*[@color = 'blue' or @rank = '1']"),
        vec!["/a/y", "/a/z"]
    );
}

#[test]
fn test_like_predicate() {
    let f = fixture();
    assert_eq!(run(&f, "/jcr:root/a/*[jcr:like(@color, 'bl%')]"), vec!["/a/y"]);
}

#[test]
fn test_node_type_test() {
    let f = fixture();
    assert_eq!(run(&f, "/jcr:root/a/element(*, nt:file)"), vec!["/a/x"]);
}

#[test]
fn test_descendants_named() {
    let f = fixture();
    assert_eq!(run_sorted(&f, "//x"), vec!["/a/x", "/b/x"]);
    assert_eq!(run(&f, "/jcr:root/a//x"), vec!["/a/x"]);
    assert_eq!(run(&f, "/jcr:root/b//x[@color = 'red']"), vec![f.bx.path.clone()]);
}

#[test]
fn test_descendants_wildcard() {
    let f = fixture();
    assert_eq!(run_sorted(&f, "/jcr:root/a//*"), vec!["/a/x", "/a/x/deep", "/a/y", "/a/z"]);
    assert_eq!(run(&f, "//*").len(), 7);
}

#[test]
fn test_deref() {
    let f = fixture();
    assert_eq!(run(&f, "/jcr:root/b/jcr:deref(@ref, '*')"), vec![f.ay.path.clone()]);
    assert_eq!(run(&f, "/jcr:root/b/jcr:deref(@ref, 'y')"), vec!["/a/y"]);
    assert!(run(&f, "/jcr:root/b/jcr:deref(@ref, 'q')").is_empty());
    // /a has no ref property
    assert!(run(&f, "/jcr:root/a/jcr:deref(@ref, '*')").is_empty());
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_order_numeric_missing_last() {
    let f = fixture();
    assert_eq!(run(&f, "/jcr:root/a/* order by @rank"), vec!["/a/z", "/a/x", "/a/y"]);
    assert_eq!(
        run(&f, "/jcr:root/a/* order by @rank descending"),
        vec!["/a/y", "/a/x", "/a/z"]
    );
    // /a/z has no color and sorts last either way
    assert_eq!(
        run(&f, "/jcr:root/a/* order by @color descending"),
        vec!["/a/x", "/a/y", "/a/z"]
    );
}

#[test]
fn test_hits_carry_identifier_chain() {
    let f = fixture();
    let root = parse("/jcr:root/a//x").unwrap();
    let hits = QueryBuilder::new(&f.c, ns::SLING).execute(&root).unwrap();
    assert_eq!(hits[0].pid(), Some(f.ax.pid.as_str()));
    assert_eq!(hits[0].depth(), 2);
    assert!(f.c.exists_property(&f.b.pid, &codec::property_uri(&Name::local("ref"), ns::SLING)).unwrap());
    assert!(f.c.exists_property(&f.ay.pid, vocab::UUID_URI).unwrap());
}
