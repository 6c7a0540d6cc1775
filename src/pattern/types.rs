//! Graph pattern query types
//!
//! The small pattern language the repository answers: triple patterns over
//! (subject, predicate, object), optional groups, filter expressions and a
//! projection. Shaped after SPARQL's basic graph patterns.

use serde::{Deserialize, Serialize};

/// A term in a triple pattern
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Variable, written without the leading `?`
    Var(String),
    Iri(String),
    Literal(String),
}

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Var(name.to_string())
    }

    pub fn iri(iri: &str) -> Self {
        Term::Iri(iri.to_string())
    }

    pub fn literal(text: &str) -> Self {
        Term::Literal(text.to_string())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn var_name(&self) -> Option<&str> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        TriplePattern {
            subject,
            predicate,
            object,
        }
    }

    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Variables mentioned by this pattern
    pub fn vars(&self) -> Vec<&str> {
        self.terms().iter().filter_map(|t| t.var_name()).collect()
    }
}

/// Filter expression over bound variables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// `regex(?var, 'pattern')`
    Regex { var: String, pattern: String },
    /// `!regex(?var, 'pattern')`
    NotRegex { var: String, pattern: String },
    /// `bound(?var)`
    Bound(String),
    /// `?var = term`
    Eq(String, Term),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn regex(var: &str, pattern: &str) -> Self {
        Expr::Regex {
            var: var.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn not_regex(var: &str, pattern: &str) -> Self {
        Expr::NotRegex {
            var: var.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Conjunction, flattening nested ands
    pub fn and(parts: Vec<Expr>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::And(flat)
        }
    }

    /// Disjunction, flattening nested ors
    pub fn or(parts: Vec<Expr>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::Or(flat)
        }
    }
}

/// Ordering key: variable plus direction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub var: String,
    pub descending: bool,
}

/// Dialect tag, only affects how a query is rendered for logs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryLanguage {
    #[default]
    Sparql,
    Itql,
}

/// One complete pattern query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQuery {
    /// Projected variables; empty projects everything
    pub select: Vec<String>,
    pub distinct: bool,
    pub patterns: Vec<TriplePattern>,
    /// Each group is left-joined onto the required patterns
    pub optional: Vec<Vec<TriplePattern>>,
    pub filters: Vec<Expr>,
    pub order_by: Vec<OrderKey>,
}

impl GraphQuery {
    pub fn select(vars: &[&str]) -> Self {
        GraphQuery {
            select: vars.iter().map(|v| v.to_string()).collect(),
            distinct: true,
            ..Default::default()
        }
    }

    pub fn triple(mut self, s: Term, p: Term, o: Term) -> Self {
        self.patterns.push(TriplePattern::new(s, p, o));
        self
    }

    pub fn optional(mut self, group: Vec<TriplePattern>) -> Self {
        self.optional.push(group);
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn order(mut self, var: &str, descending: bool) -> Self {
        self.order_by.push(OrderKey {
            var: var.to_string(),
            descending,
        });
        self
    }
}
