//! Tests for the path/identity index

use super::*;

fn id(n: u128) -> NodeId {
    NodeId(n)
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_root_resolves_to_empty_path() {
    let index = PathIndex::new();
    assert_eq!(index.resolve_path(NodeId::ROOT), Some(String::new()));
    assert_eq!(index.level(NodeId::ROOT), Some(0));
    assert_eq!(index.resolve_external_id(NodeId::ROOT), None);
}

#[test]
fn test_root_cannot_be_registered() {
    let mut index = PathIndex::new();
    assert!(!index.register_path(NodeId::ROOT, "x", id(5)));
    assert!(index.is_empty());
}

#[test]
fn test_register_path_first_wins() {
    let mut index = PathIndex::new();
    index.register_path(id(10), "x", NodeId::ROOT);
    index.register_path(id(11), "y", NodeId::ROOT);

    assert!(index.register_path(id(1), "a", id(10)));
    assert!(!index.register_path(id(1), "a", id(11)));

    assert_eq!(index.resolve_path(id(1)), Some("/x/a".to_string()));
    assert_eq!(index.parent(id(1)), Some(id(10)));
}

#[test]
fn test_unresolved_when_ancestor_missing() {
    let mut index = PathIndex::new();
    index.register_path(id(2), "child", id(1));
    assert_eq!(index.resolve_path(id(2)), None);
    assert_eq!(index.resolve_external_id(id(2)), None);
    assert_eq!(index.level(id(2)), None);

    index.register_path(id(1), "parent", NodeId::ROOT);
    assert_eq!(index.resolve_path(id(2)), Some("/parent/child".to_string()));
    assert_eq!(index.level(id(2)), Some(2));
}

// ============================================================================
// External Identifiers
// ============================================================================

#[test]
fn test_external_id_synthetic_embeds_level() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "a", NodeId::ROOT);
    index.register_path(id(2), "a", id(1));

    let top = index.resolve_external_id(id(1)).unwrap();
    let nested = index.resolve_external_id(id(2)).unwrap();
    assert!(top.starts_with("level1:"));
    assert!(nested.starts_with("level2:"));
    assert_ne!(top, nested);
}

#[test]
fn test_external_id_native_is_decoded() {
    let mut index = PathIndex::new();
    index.mark_native("demo_12");
    index.register_path(id(1), "demo_12", NodeId::ROOT);
    assert_eq!(index.resolve_external_id(id(1)), Some("demo:12".to_string()));
}

#[test]
fn test_resolve_external_id_is_stable() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "a", NodeId::ROOT);
    let first = index.resolve_external_id(id(1));
    let second = index.resolve_external_id(id(1));
    assert_eq!(first, second);
}

#[test]
fn test_recorded_external_id_wins() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "cut-name", NodeId::ROOT);
    index.register_path(id(2), "b", id(1));
    let computed = index.resolve_external_id(id(1)).unwrap();

    index.record_external_id(id(1), "level1:0123456789ab%57cut-name-but-longer");
    assert_eq!(
        index.resolve_external_id(id(1)),
        Some("level1:0123456789ab%57cut-name-but-longer".to_string())
    );
    assert_ne!(index.resolve_external_id(id(1)), Some(computed));
    // descendants still compute from the path
    assert!(index.resolve_external_id(id(2)).unwrap().starts_with("level2:"));

    index.remove_subtree(id(1));
    index.register_path(id(1), "cut-name", NodeId::ROOT);
    assert_ne!(
        index.resolve_external_id(id(1)),
        Some("level1:0123456789ab%57cut-name-but-longer".to_string())
    );
}

// ============================================================================
// Lookups and Maintenance
// ============================================================================

#[test]
fn test_find_by_path_and_children() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "a", NodeId::ROOT);
    index.register_path(id(2), "b", id(1));

    assert_eq!(index.find_by_path("/a/b"), Some(id(2)));
    assert_eq!(index.find_by_path("/"), Some(NodeId::ROOT));
    assert_eq!(index.find_by_path("/a/zzz"), None);
    assert_eq!(index.children_of(id(1)).get("b"), Some(&id(2)));
}

#[test]
fn test_mint_is_unique() {
    let mut index = PathIndex::new();
    let a = index.mint();
    let b = index.mint();
    assert_ne!(a, b);
    assert!(!a.is_fabricated());
}

#[test]
fn test_claim_pid_detects_collision() {
    let mut index = PathIndex::new();
    assert_eq!(index.claim_pid("level1:x", id(1)), PidClaim::Claimed);
    assert_eq!(index.claim_pid("level1:x", id(1)), PidClaim::Owned);
    assert_eq!(index.claim_pid("level1:x", id(2)), PidClaim::Collision(id(1)));
}

#[test]
fn test_remove_subtree() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "a", NodeId::ROOT);
    index.register_path(id(2), "b", id(1));
    index.register_path(id(3), "c", NodeId::ROOT);
    index.claim_pid("p2", id(2));

    index.remove_subtree(id(1));

    assert!(!index.is_registered(id(1)));
    assert!(!index.is_registered(id(2)));
    assert!(index.is_registered(id(3)));
    assert_eq!(index.pid_owner("p2"), None);
    assert_eq!(index.find_by_path("/a"), None);

    // re-registration after removal is allowed
    assert!(index.register_path(id(1), "a2", NodeId::ROOT));
    assert_eq!(index.resolve_path(id(1)), Some("/a2".to_string()));
}

#[test]
fn test_rebuild_preserves_lookups() {
    let mut index = PathIndex::new();
    index.register_path(id(1), "a", NodeId::ROOT);
    index.register_path(id(2), "b", id(1));
    index.rebuild();
    assert_eq!(index.find_by_path("/a/b"), Some(id(2)));
    assert_eq!(index.resolve_path_cached(id(2)), Some("/a/b".to_string()));
}
