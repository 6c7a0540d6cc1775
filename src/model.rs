//! Tree-side data model: identities, qualified names, node and property states.
//!
//! These are the shapes exchanged with the host tree runtime. Nothing here
//! knows about the external repository; the codec maps between the two.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

/// Well-known namespace URIs
pub mod ns {
    pub const JCR: &str = "http://www.jcp.org/jcr/1.0";
    pub const NT: &str = "http://www.jcp.org/jcr/nt/1.0";
    pub const MIX: &str = "http://www.jcp.org/jcr/mix/1.0";
    pub const SLING: &str = "http://sling.apache.org/jcr/sling/1.0";
    pub const REP: &str = "internal";

    /// Map a short prefix to its namespace URI. Unknown prefixes yield None.
    pub fn resolve_prefix(prefix: &str) -> Option<&'static str> {
        match prefix {
            "" => Some(""),
            "jcr" => Some(JCR),
            "nt" => Some(NT),
            "mix" => Some(MIX),
            "sling" => Some(SLING),
            "rep" => Some(REP),
            _ => None,
        }
    }
}

// ============================================================================
// Node identity
// ============================================================================

/// Stable 128-bit node identity, rendered in the usual 8-4-4-4-12 hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u128);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0xcafebabe_cafe_babe_cafe_babecafebabe);
    pub const SYSTEM: NodeId = NodeId(0xdeadbeef_cafe_babe_cafe_babecafebabe);
    pub const VERSION_STORAGE: NodeId = NodeId(0xdeadbeef_face_babe_cafe_babecafebabe);
    pub const NODE_TYPES: NodeId = NodeId(0xdeadbeef_cafe_cafe_cafe_babecafebabe);

    /// Derive an identity from arbitrary bytes (first 16 bytes of a blake3 hash)
    pub fn derive(seed: &[u8]) -> Self {
        let hash = blake3::hash(seed);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        NodeId(u128::from_be_bytes(bytes))
    }

    /// True for the root and the fabricated system subtree
    pub fn is_fabricated(&self) -> bool {
        matches!(
            *self,
            NodeId::ROOT | NodeId::SYSTEM | NodeId::VERSION_STORAGE | NodeId::NODE_TYPES
        )
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{:032x}", self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl FromStr for NodeId {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.trim().chars().filter(|c| *c != '-').collect();
        if compact.len() != 32 {
            return Err(AdapterError::InvalidIdentifier(s.to_string()));
        }
        u128::from_str_radix(&compact, 16)
            .map(NodeId)
            .map_err(|_| AdapterError::InvalidIdentifier(s.to_string()))
    }
}

// ============================================================================
// Qualified names
// ============================================================================

/// Namespace-qualified name, written `{namespace}local`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    pub namespace: String,
    pub local: String,
}

impl Name {
    pub fn new(namespace: &str, local: &str) -> Self {
        Name {
            namespace: namespace.to_string(),
            local: local.to_string(),
        }
    }

    /// Name without a namespace
    pub fn local(local: &str) -> Self {
        Name::new("", local)
    }

    pub fn jcr(local: &str) -> Self {
        Name::new(ns::JCR, local)
    }

    pub fn nt(local: &str) -> Self {
        Name::new(ns::NT, local)
    }

    /// Parse the expanded form `{ns}local` (or a bare local name).
    pub fn parse_expanded(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix('{') {
            let (namespace, local) = rest
                .split_once('}')
                .ok_or_else(|| AdapterError::InvalidIdentifier(s.to_string()))?;
            Ok(Name::new(namespace, local))
        } else {
            Ok(Name::local(s))
        }
    }

    /// Parse the prefixed form `jcr:content`. The expanded form is accepted too.
    pub fn parse_prefixed(s: &str) -> Result<Self> {
        if s.starts_with('{') {
            return Name::parse_expanded(s);
        }
        match s.split_once(':') {
            Some((prefix, local)) => {
                let namespace = ns::resolve_prefix(prefix)
                    .ok_or_else(|| AdapterError::InvalidIdentifier(s.to_string()))?;
                Ok(Name::new(namespace, local))
            }
            None => Ok(Name::local(s)),
        }
    }

    /// Name for a path segment; unknown prefixes stay part of the local name
    pub fn from_segment(segment: &str) -> Self {
        Name::parse_prefixed(segment).unwrap_or_else(|_| Name::local(segment))
    }

    /// Path segment form: `prefix:local` for well-known namespaces
    pub fn to_prefixed(&self) -> String {
        let prefix = match self.namespace.as_str() {
            "" => return self.local.clone(),
            ns::JCR => "jcr",
            ns::NT => "nt",
            ns::MIX => "mix",
            ns::SLING => "sling",
            ns::REP => "rep",
            _ => return self.to_string(),
        };
        format!("{}:{}", prefix, self.local)
    }

    /// Tree path segment: the prefixed form for well-known namespaces, the
    /// bare local part for any other. The result never contains `{` or `/`.
    pub fn path_segment(&self) -> String {
        match self.to_prefixed() {
            s if s.starts_with('{') => self.local.clone(),
            s => s,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

/// Identity of one property: owning node plus name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct PropertyId {
    pub parent: NodeId,
    pub name: Name,
}

impl PropertyId {
    pub fn new(parent: NodeId, name: Name) -> Self {
        PropertyId { parent, name }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.name)
    }
}

impl FromStr for PropertyId {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        let (parent, name) = s
            .split_once('/')
            .ok_or_else(|| AdapterError::InvalidIdentifier(s.to_string()))?;
        Ok(PropertyId::new(parent.parse()?, Name::parse_expanded(name)?))
    }
}

// ============================================================================
// Node shapes
// ============================================================================

/// Closed set of node kinds the adapter can materialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    System,
    /// Maps 1:1 to an external object
    Container,
    /// Represents one named byte stream of its parent container
    StreamHolder,
    /// The single `jcr:content` child of a stream holder
    StreamContent,
}

/// One (name, identity) child edge in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: Name,
    pub id: NodeId,
}

/// Shape of one node as materialized or as handed over for storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub node_type: Name,
    pub mixins: BTreeSet<Name>,
    pub children: Vec<ChildEntry>,
    pub properties: BTreeSet<Name>,
    pub mod_count: u16,
}

impl NodeState {
    pub fn new(id: NodeId, parent: Option<NodeId>, kind: NodeKind, node_type: Name) -> Self {
        NodeState {
            id,
            parent,
            kind,
            node_type,
            mixins: BTreeSet::new(),
            children: Vec::new(),
            properties: BTreeSet::new(),
            mod_count: 0,
        }
    }

    pub fn add_child(&mut self, name: Name, id: NodeId) {
        if !self.children.iter().any(|c| c.id == id) {
            self.children.push(ChildEntry { name, id });
        }
    }

    pub fn child(&self, name: &Name) -> Option<NodeId> {
        self.children.iter().find(|c| &c.name == name).map(|c| c.id)
    }
}

// ============================================================================
// Property values
// ============================================================================

/// Property type codes shared with the host runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Binary,
    Long,
    Double,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Decimal,
}

impl PropertyType {
    pub fn code(&self) -> u8 {
        match self {
            PropertyType::String => 1,
            PropertyType::Binary => 2,
            PropertyType::Long => 3,
            PropertyType::Double => 4,
            PropertyType::Date => 5,
            PropertyType::Boolean => 6,
            PropertyType::Name => 7,
            PropertyType::Path => 8,
            PropertyType::Reference => 9,
            PropertyType::WeakReference => 10,
            PropertyType::Uri => 11,
            PropertyType::Decimal => 12,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => PropertyType::String,
            2 => PropertyType::Binary,
            3 => PropertyType::Long,
            4 => PropertyType::Double,
            5 => PropertyType::Date,
            6 => PropertyType::Boolean,
            7 => PropertyType::Name,
            8 => PropertyType::Path,
            9 => PropertyType::Reference,
            10 => PropertyType::WeakReference,
            11 => PropertyType::Uri,
            12 => PropertyType::Decimal,
            _ => return None,
        })
    }
}

/// One typed property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Binary(Vec<u8>),
    Long(i64),
    Double(f64),
    Boolean(bool),
    /// String-encoded types: dates, decimals, URIs and paths keep their text form
    Text(PropertyType, String),
    Name(Name),
    Reference(NodeId),
    WeakReference(NodeId),
}

impl Value {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::String(_) => PropertyType::String,
            Value::Binary(_) => PropertyType::Binary,
            Value::Long(_) => PropertyType::Long,
            Value::Double(_) => PropertyType::Double,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::Text(ty, _) => *ty,
            Value::Name(_) => PropertyType::Name,
            Value::Reference(_) => PropertyType::Reference,
            Value::WeakReference(_) => PropertyType::WeakReference,
        }
    }

    /// Textual form used for comparisons and query filters
    pub fn as_text(&self) -> String {
        match self {
            Value::String(s) | Value::Text(_, s) => s.clone(),
            Value::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Long(n) => n.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Name(n) => n.to_string(),
            Value::Reference(id) | Value::WeakReference(id) => id.to_string(),
        }
    }

    /// Parse the textual form of a value of the given type.
    pub fn parse(ty: PropertyType, text: &str) -> Result<Self> {
        let bad = || AdapterError::MalformedLiteral(format!("{:?} value '{}'", ty, text));
        Ok(match ty {
            PropertyType::String => Value::String(text.to_string()),
            PropertyType::Binary => Value::Binary(text.as_bytes().to_vec()),
            PropertyType::Long => Value::Long(text.parse().map_err(|_| bad())?),
            PropertyType::Double => Value::Double(text.parse().map_err(|_| bad())?),
            PropertyType::Boolean => Value::Boolean(text.parse().map_err(|_| bad())?),
            PropertyType::Name => Value::Name(Name::parse_expanded(text)?),
            PropertyType::Reference => Value::Reference(text.parse()?),
            PropertyType::WeakReference => Value::WeakReference(text.parse()?),
            PropertyType::Date
            | PropertyType::Path
            | PropertyType::Uri
            | PropertyType::Decimal => Value::Text(ty, text.to_string()),
        })
    }
}

/// Full state of one property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyState {
    pub id: PropertyId,
    pub ty: PropertyType,
    pub multi_valued: bool,
    pub mod_count: u16,
    pub values: Vec<Value>,
}

impl PropertyState {
    pub fn new(id: PropertyId, ty: PropertyType) -> Self {
        PropertyState {
            id,
            ty,
            multi_valued: false,
            mod_count: 0,
            values: Vec::new(),
        }
    }

    /// Single-valued property
    pub fn single(id: PropertyId, value: Value) -> Self {
        let mut state = PropertyState::new(id, value.property_type());
        state.values.push(value);
        state
    }

    /// Multi-valued property of the given type
    pub fn multi(id: PropertyId, ty: PropertyType, values: Vec<Value>) -> Self {
        let mut state = PropertyState::new(id, ty);
        state.multi_valued = true;
        state.values = values;
        state
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}

/// Set of properties referring to one target node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReferences {
    pub target: NodeId,
    pub references: Vec<PropertyId>,
}

impl NodeReferences {
    pub fn new(target: NodeId) -> Self {
        NodeReferences {
            target,
            references: Vec::new(),
        }
    }
}

/// A batch of mutations handed over by the host in one save.
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    pub added_nodes: Vec<NodeState>,
    pub modified_nodes: Vec<NodeState>,
    pub deleted_nodes: Vec<NodeState>,
    pub added_properties: Vec<PropertyState>,
    pub modified_properties: Vec<PropertyState>,
    pub deleted_properties: Vec<PropertyState>,
    pub modified_references: Vec<NodeReferences>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.modified_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.added_properties.is_empty()
            && self.modified_properties.is_empty()
            && self.deleted_properties.is_empty()
            && self.modified_references.is_empty()
    }

    /// Node states that are to be written, keyed by identity (later entries win)
    pub fn stored_nodes(&self) -> HashMap<NodeId, &NodeState> {
        self.added_nodes
            .iter()
            .chain(self.modified_nodes.iter())
            .map(|n| (n.id, n))
            .collect()
    }
}
