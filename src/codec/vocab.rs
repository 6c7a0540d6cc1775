//! Relationship URIs and reserved names used on the repository side.

use crate::model::ns;

/// Namespace used for un-prefixed property names
pub const DEFAULT_NAMESPACE: &str = ns::SLING;

/// Subject prefix of every object in the relationship graph
pub const OBJECT_PREFIX: &str = "info:fedora/";

/// Tree membership: `child MEMBER_OF parent`
pub const MEMBER_OF: &str =
    "info:fedora/fedora-system:def/relations-external#isMemberOfCollection";

/// Identifier fact carried by every object
pub const DC_IDENTIFIER: &str = "http://purl.org/dc/elements/1.1/identifier";

/// Self-declared node identity of an object
pub const UUID_URI: &str = "http://www.jcp.org/jcr/1.0/uuid";

pub const PRIMARY_TYPE_URI: &str = "http://www.jcp.org/jcr/1.0/primaryType";

pub const DATA_URI: &str = "http://www.jcp.org/jcr/1.0/data";

/// Mixin list of a container, stored as one literal
pub const MIXIN_TYPES_URI: &str = "http://sling.apache.org/jcr/sling/1.0/MixinTypes";

/// Reference manifest of a container, stored as one literal
pub const NODE_REFERENCES_URI: &str = "http://sling.apache.org/jcr/sling/1.0/NodeReferences";

/// Descriptive metadata stream
pub const DC_STREAM: &str = "DC";

/// Relationship manifest stream
pub const RELS_EXT_STREAM: &str = "RELS-EXT";

pub const RESERVED_STREAMS: [&str; 2] = [DC_STREAM, RELS_EXT_STREAM];

/// Subject IRI for an external identifier
pub fn object_iri(pid: &str) -> String {
    format!("{}{}", OBJECT_PREFIX, pid)
}

/// External identifier for a subject IRI; plain identifiers pass through
pub fn pid_of_iri(iri: &str) -> &str {
    iri.strip_prefix(OBJECT_PREFIX).unwrap_or(iri)
}
