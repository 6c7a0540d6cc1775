//! Parsed path-query tree.

use crate::model::Name;

/// How a location step selects nodes relative to the current results
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    /// `/name`: the child with exactly this name
    Exact,
    /// `/*`: every child
    Children,
    /// `//name` or `//*`: descendants, optionally restricted by name
    Descendants,
    /// `/jcr:deref(@property, 'name')`: nodes whose identity is held by `property`
    Deref { property: Name },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationStep {
    pub axis: Axis,
    /// None for `*`
    pub name: Option<Name>,
    /// Conditions that must all hold, in source order
    pub predicates: Vec<QueryNode>,
}

impl LocationStep {
    pub fn new(axis: Axis, name: Option<Name>) -> Self {
        LocationStep {
            axis,
            name,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: QueryNode) -> Self {
        self.predicates.push(predicate);
        self
    }
}

/// Comparison operators of a relation predicate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `@p` on its own
    NotNull,
    /// `jcr:like(@p, 'pattern')`
    Like,
}

impl RelationOp {
    pub fn from_symbol(op: &str) -> Option<Self> {
        match op {
            "=" => Some(RelationOp::Eq),
            "!=" => Some(RelationOp::Ne),
            "<" => Some(RelationOp::Lt),
            "<=" => Some(RelationOp::Le),
            ">" => Some(RelationOp::Gt),
            ">=" => Some(RelationOp::Ge),
            _ => None,
        }
    }
}

/// Predicate tree of one location step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryNode {
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    Relation {
        property: Name,
        op: RelationOp,
        value: Option<String>,
    },
    /// `element(*, type)`
    NodeType(Name),
    /// `jcr:contains(., 'text')`
    TextSearch(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderSpec {
    pub property: Name,
    pub ascending: bool,
}

/// A whole parsed query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRoot {
    pub steps: Vec<LocationStep>,
    pub order: Vec<OrderSpec>,
}

/// One query result: the identifiers from the top-level object down to the
/// hit, and the hierarchical path they spell out.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryHit {
    pub pids: Vec<String>,
    pub path: String,
}

impl QueryHit {
    /// The starting point of every query
    pub fn root() -> Self {
        QueryHit {
            pids: Vec::new(),
            path: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.pids.is_empty()
    }

    /// Identifier of the hit itself
    pub fn pid(&self) -> Option<&str> {
        self.pids.last().map(String::as_str)
    }

    /// Path segments from the root down
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Level below the root
    pub fn depth(&self) -> usize {
        self.pids.len()
    }
}
