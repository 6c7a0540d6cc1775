//! Identifier codec
//!
//! Pure conversions between external flat identifiers and tree path
//! segments. Two schemes coexist:
//!
//! - **native**: identifiers that already exist in the repository
//!   (`demo:12_a`). Escaped reversibly into a path segment (`demo_12__a`).
//! - **synthetic**: identifiers minted for nodes created through the tree
//!   (`level2:3fa9c1d2e4b7%57my_file`). They embed the depth and a hash of
//!   the full path and are never decoded back into a path; the index is
//!   authoritative for that.
//!
//! Nothing in here fails: malformed input yields an empty segment, which
//! callers treat as unresolvable.

pub mod literal;
pub mod vocab;

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::model::Name;

/// Field separator used inside synthetic identifiers and literals
pub const SEP: &str = "%57";

/// Maximum length of an external identifier
pub const MAX_PID_LEN: usize = 64;

/// Prefix for synthetic identifiers
pub const SYNTHETIC_PREFIX: &str = "level";

/// Number of hex digits of the path hash embedded in synthetic identifiers
const PATH_HASH_LEN: usize = 12;

fn synthetic_guard() -> &'static Regex {
    static GUARD: OnceLock<Regex> = OnceLock::new();
    GUARD.get_or_init(|| Regex::new(r"^level\d+:").expect("static pattern"))
}

/// True if `pid` was minted by the adapter.
pub fn is_synthetic_identifier(pid: &str) -> bool {
    synthetic_guard().is_match(pid)
}

// ============================================================================
// Native scheme
// ============================================================================

/// Escape a native external identifier into a path segment.
///
/// `_` becomes `__`, then `:` becomes `_`.
pub fn encode_native(pid: &str) -> String {
    pid.replace('_', "__").replace(':', "_")
}

/// Inverse of [`encode_native`].
///
/// Splits on `__`; the first single `_` found scanning left to right is the
/// colon, every other fragment is kept as is. Fragments are rejoined with `_`.
///
/// Not a true inverse when the local part starts with `_`: `demo:_x`
/// encodes to `demo___x`, which decodes to `demo_:x`. Listed objects keep
/// their real identifier through `PathIndex::record_external_id`.
pub fn decode_native(segment: &str) -> String {
    let mut seen_colon = false;
    segment
        .split("__")
        .map(|fragment| {
            if !seen_colon && fragment.contains('_') {
                seen_colon = true;
                fragment.replacen('_', ":", 1)
            } else {
                fragment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

// ============================================================================
// Synthetic scheme
// ============================================================================

/// Escape a synthetic payload: `_` doubled, whitespace runs collapsed to `_`.
pub fn escape_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
                in_space = true;
            }
            continue;
        }
        in_space = false;
        if c == '_' {
            out.push_str("__");
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`escape_segment`]; collapsed whitespace comes back as one space.
pub fn unescape_segment(s: &str) -> String {
    s.split("__")
        .map(|fragment| fragment.replace('_', " "))
        .collect::<Vec<_>>()
        .join("_")
}

/// Short hex digest of a full tree path
pub fn path_hash(full_path: &str) -> String {
    let hash = blake3::hash(full_path.as_bytes());
    hash.to_hex().as_str()[..PATH_HASH_LEN].to_string()
}

/// Build a synthetic identifier for a node named `segment` at `depth`.
///
/// Hard-truncated to [`MAX_PID_LEN`] characters.
pub fn encode_synthetic(depth: usize, full_path: &str, segment: &str) -> String {
    let payload = format!("{}{}{}", path_hash(full_path), SEP, segment);
    let pid = format!("{}{}:{}", SYNTHETIC_PREFIX, depth, escape_segment(&payload));
    truncate_pid(pid)
}

/// Hard truncation to the external identifier limit, on a char boundary.
pub fn truncate_pid(pid: String) -> String {
    match pid.char_indices().nth(MAX_PID_LEN) {
        Some((cut, _)) => pid[..cut].to_string(),
        None => pid,
    }
}

/// Recover the node-name part of a synthetic identifier.
///
/// Returns an empty string when the prefix or the separator is missing.
pub fn synthetic_segment(pid: &str) -> String {
    if !is_synthetic_identifier(pid) {
        return String::new();
    }
    let rest = match pid.split_once(':') {
        Some((_, rest)) => rest,
        None => return String::new(),
    };
    match rest.rfind(SEP) {
        Some(i) => unescape_segment(&rest[i + SEP.len()..]),
        None => String::new(),
    }
}

/// Path segment for any external identifier, choosing the scheme by prefix.
pub fn path_segment(pid: &str) -> String {
    if is_synthetic_identifier(pid) {
        synthetic_segment(pid)
    } else {
        encode_native(pid)
    }
}

/// Depth tag of a synthetic identifier
pub fn synthetic_level(pid: &str) -> Option<usize> {
    if !is_synthetic_identifier(pid) {
        return None;
    }
    pid[SYNTHETIC_PREFIX.len()..]
        .split(':')
        .next()
        .and_then(|digits| digits.parse().ok())
}

// ============================================================================
// Streams
// ============================================================================

/// Prefix of every stream id created from a tree name
pub const STREAM_PREFIX: &str = "DS";

/// Stream id for a tree child name: `foo_bar.jpg` -> `DSfoo__bar_jpg`
pub fn stream_id_for(name: &str) -> String {
    format!("{}{}", STREAM_PREFIX, name.replace('_', "__").replace('.', "_"))
}

/// Tree child name for a stream id. Ids without the prefix keep their text.
pub fn stream_name_for(stream_id: &str) -> String {
    let body = stream_id.strip_prefix(STREAM_PREFIX).unwrap_or(stream_id);
    body.split("__")
        .map(|fragment| fragment.replace('_', "."))
        .collect::<Vec<_>>()
        .join("_")
}

/// Repository-managed streams that never appear in the tree
pub fn is_reserved_stream(stream_id: &str) -> bool {
    vocab::RESERVED_STREAMS.contains(&stream_id)
}

/// Resource-fork names (`._foo`) are skipped on upload and delete
pub fn is_resource_fork(name: &str) -> bool {
    name.starts_with("._")
}

// ============================================================================
// Properties
// ============================================================================

/// Relationship URI for a property name: `{ns}local` -> `ns/local`.
///
/// An empty namespace maps to `default_ns`.
pub fn property_uri(name: &Name, default_ns: &str) -> String {
    let namespace = if name.namespace.is_empty() {
        default_ns
    } else {
        name.namespace.as_str()
    };
    format!("{}/{}", namespace, name.local)
}

/// Inverse of [`property_uri`]; `default_ns` maps back to the empty namespace.
pub fn property_name(uri: &str, default_ns: &str) -> Name {
    match uri.rfind('/') {
        Some(i) => {
            let namespace = &uri[..i];
            let namespace = if namespace == default_ns { "" } else { namespace };
            Name::new(namespace, &uri[i + 1..])
        }
        None => Name::local(uri),
    }
}
