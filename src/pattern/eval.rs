//! Pattern evaluator
//!
//! Evaluates a [`GraphQuery`] against any [`TripleSource`]. Required
//! patterns are joined left to right over a set of partial bindings,
//! optional groups are left-joined, then filters, ordering and projection
//! are applied.

use std::collections::HashMap;

use regex_lite::Regex;

use super::types::*;
use super::utils::reorder_patterns;
use crate::error::{AdapterError, Result};

/// A bound value
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Iri(String),
    Literal(String),
}

impl Value {
    pub fn as_str(&self) -> &str {
        match self {
            Value::Iri(s) | Value::Literal(s) => s,
        }
    }

    fn from_term(term: &Term) -> Option<Value> {
        match term {
            Term::Iri(s) => Some(Value::Iri(s.clone())),
            Term::Literal(s) => Some(Value::Literal(s.clone())),
            Term::Var(_) => None,
        }
    }

    fn to_term(&self) -> Term {
        match self {
            Value::Iri(s) => Term::Iri(s.clone()),
            Value::Literal(s) => Term::Literal(s.clone()),
        }
    }
}

/// One fact in the source graph
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Value,
}

/// Anything that can enumerate triples. Subjects are always IRIs.
pub trait TripleSource {
    /// Triples matching the given constant positions; None is a wildcard.
    fn triples(&self, subject: Option<&str>, predicate: Option<&str>, object: Option<&Value>) -> Vec<Triple>;
}

/// Variable bindings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    map: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings { map: HashMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: &str) -> Option<&Value> {
        self.map.get(var)
    }

    /// String form of a binding
    pub fn get_str(&self, var: &str) -> Option<&str> {
        self.map.get(var).map(|v| v.as_str())
    }

    pub fn set(&mut self, var: &str, value: Value) {
        self.map.insert(var.to_string(), value);
    }

    /// Extend with another bindings, returning None on conflict
    pub fn extend(&self, other: &Bindings) -> Option<Bindings> {
        let mut result = self.clone();
        for (k, v) in &other.map {
            if let Some(existing) = result.map.get(k) {
                if existing != v {
                    return None;
                }
            } else {
                result.map.insert(k.clone(), v.clone());
            }
        }
        Some(result)
    }

    /// Keep only the listed variables
    pub fn project(&self, vars: &[String]) -> Bindings {
        let map = vars
            .iter()
            .filter_map(|v| self.map.get(v).map(|val| (v.clone(), val.clone())))
            .collect();
        Bindings { map }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }
}

/// Rows returned by a pattern query
pub type ResultRow = Bindings;

pub struct Evaluator<'a> {
    source: &'a dyn TripleSource,
    regex_cache: std::cell::RefCell<HashMap<String, Regex>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(source: &'a dyn TripleSource) -> Self {
        Evaluator {
            source,
            regex_cache: std::cell::RefCell::new(HashMap::new()),
        }
    }

    /// Evaluate a whole query.
    pub fn eval_query(&self, query: &GraphQuery) -> Result<Vec<Bindings>> {
        for expr in &query.filters {
            self.check_patterns(expr)?;
        }

        let ordered = reorder_patterns(&query.patterns);
        let mut current = vec![Bindings::new()];

        for pattern in &ordered {
            let mut next = vec![];
            for bindings in &current {
                let substituted = substitute(pattern, bindings);
                for result in self.eval_pattern(&substituted) {
                    if let Some(merged) = bindings.extend(&result) {
                        next.push(merged);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        for group in &query.optional {
            current = current
                .into_iter()
                .flat_map(|b| {
                    let joined = self.eval_group(group, &b);
                    if joined.is_empty() {
                        vec![b]
                    } else {
                        joined
                    }
                })
                .collect();
        }

        current.retain(|b| query.filters.iter().all(|f| self.eval_expr(f, b) == Some(true)));

        if !query.order_by.is_empty() {
            current.sort_by(|a, b| {
                for key in &query.order_by {
                    let ord = a.get_str(&key.var).cmp(&b.get_str(&key.var));
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let mut rows: Vec<Bindings> = if query.select.is_empty() {
            current
        } else {
            current.iter().map(|b| b.project(&query.select)).collect()
        };

        if query.distinct {
            let mut unique: Vec<Bindings> = Vec::with_capacity(rows.len());
            for row in rows.drain(..) {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        Ok(rows)
    }

    /// Join a group of patterns starting from existing bindings
    fn eval_group(&self, group: &[TriplePattern], start: &Bindings) -> Vec<Bindings> {
        let mut current = vec![start.clone()];
        for pattern in group {
            let mut next = vec![];
            for bindings in &current {
                let substituted = substitute(pattern, bindings);
                for result in self.eval_pattern(&substituted) {
                    if let Some(merged) = bindings.extend(&result) {
                        next.push(merged);
                    }
                }
            }
            current = next;
        }
        current
    }

    /// Evaluate one pattern whose bound variables were already substituted
    fn eval_pattern(&self, pattern: &TriplePattern) -> Vec<Bindings> {
        let subject = match &pattern.subject {
            Term::Iri(s) | Term::Literal(s) => Some(s.as_str()),
            Term::Var(_) => None,
        };
        let predicate = match &pattern.predicate {
            Term::Iri(p) | Term::Literal(p) => Some(p.as_str()),
            Term::Var(_) => None,
        };
        let object = Value::from_term(&pattern.object);

        self.source
            .triples(subject, predicate, object.as_ref())
            .into_iter()
            .filter_map(|t| {
                let mut b = Bindings::new();
                if let Term::Var(v) = &pattern.subject {
                    b.set(v, Value::Iri(t.subject.clone()));
                }
                if let Term::Var(v) = &pattern.predicate {
                    let value = Value::Iri(t.predicate.clone());
                    if b.get(v).is_some_and(|existing| existing != &value) {
                        return None;
                    }
                    b.set(v, value);
                }
                if let Term::Var(v) = &pattern.object {
                    if b.get(v).is_some_and(|existing| existing != &t.object) {
                        return None;
                    }
                    b.set(v, t.object.clone());
                }
                Some(b)
            })
            .collect()
    }

    /// Three-valued filter evaluation: None means the expression errored
    /// (unbound variable), which a filter treats as false.
    fn eval_expr(&self, expr: &Expr, bindings: &Bindings) -> Option<bool> {
        match expr {
            Expr::Regex { var, pattern } => {
                let value = bindings.get_str(var)?;
                Some(self.regex_match(pattern, value))
            }
            Expr::NotRegex { var, pattern } => {
                let value = bindings.get_str(var)?;
                Some(!self.regex_match(pattern, value))
            }
            Expr::Bound(var) => Some(bindings.get(var).is_some()),
            Expr::Eq(var, term) => {
                let value = bindings.get(var)?;
                match term {
                    Term::Var(other) => Some(Some(value) == bindings.get(other)),
                    constant => Some(Value::from_term(constant).as_ref() == Some(value)),
                }
            }
            Expr::Not(inner) => self.eval_expr(inner, bindings).map(|b| !b),
            Expr::And(parts) => {
                let mut errored = false;
                for part in parts {
                    match self.eval_expr(part, bindings) {
                        Some(false) => return Some(false),
                        None => errored = true,
                        Some(true) => {}
                    }
                }
                if errored {
                    None
                } else {
                    Some(true)
                }
            }
            Expr::Or(parts) => {
                let mut errored = false;
                for part in parts {
                    match self.eval_expr(part, bindings) {
                        Some(true) => return Some(true),
                        None => errored = true,
                        Some(false) => {}
                    }
                }
                if errored {
                    None
                } else {
                    Some(false)
                }
            }
        }
    }

    fn regex_match(&self, pattern: &str, value: &str) -> bool {
        let cache = self.regex_cache.borrow();
        match cache.get(pattern) {
            Some(re) => re.is_match(value),
            // patterns were validated up front by check_patterns
            None => false,
        }
    }

    /// Compile every regex in `expr` once, failing on invalid syntax
    fn check_patterns(&self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Regex { pattern, .. } | Expr::NotRegex { pattern, .. } => {
                let mut cache = self.regex_cache.borrow_mut();
                if !cache.contains_key(pattern) {
                    let re = Regex::new(pattern).map_err(|e| {
                        AdapterError::QueryTranslation(vec![format!("bad regex '{}': {}", pattern, e)])
                    })?;
                    cache.insert(pattern.clone(), re);
                }
                Ok(())
            }
            Expr::Not(inner) => self.check_patterns(inner),
            Expr::And(parts) | Expr::Or(parts) => parts.iter().try_for_each(|p| self.check_patterns(p)),
            Expr::Bound(_) | Expr::Eq(..) => Ok(()),
        }
    }
}

/// Replace bound variables in a pattern with their values
fn substitute(pattern: &TriplePattern, bindings: &Bindings) -> TriplePattern {
    let sub = |term: &Term| match term {
        Term::Var(v) => bindings.get(v).map(|val| val.to_term()).unwrap_or_else(|| term.clone()),
        other => other.clone(),
    };
    TriplePattern::new(sub(&pattern.subject), sub(&pattern.predicate), sub(&pattern.object))
}
