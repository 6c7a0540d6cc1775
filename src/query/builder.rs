//! Query lowering
//!
//! Walks a parsed query once. Each step's predicates become an
//! [`ObjectFilter`]: every property a predicate mentions is bound through
//! an optional triple pattern to its own variable, and the predicate tree
//! becomes a filter expression over those variables. Steps then run one at
//! a time through the [`StepEvaluator`], and the final hits are ordered.
//!
//! Unsupported constructs do not stop the walk; they are collected and
//! reported together before anything is sent to the repository.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::codec::{self, literal, vocab};
use crate::connector::{regex_escape, Connector, ObjectFilter, SUBJECT_VAR};
use crate::error::{AdapterError, Result};
use crate::model::Name;
use crate::pattern::{Expr, Term, TriplePattern};
use crate::query::ast::{LocationStep, OrderSpec, QueryHit, QueryNode, QueryRoot, RelationOp};
use crate::query::step::StepEvaluator;

pub struct QueryBuilder<'a> {
    connector: &'a dyn Connector,
    default_ns: &'a str,
    errors: Vec<String>,
}

/// Property URI -> filter variable, in first-use order
#[derive(Default)]
struct PropertyVars {
    vars: HashMap<String, String>,
    order: Vec<String>,
}

impl PropertyVars {
    fn var_for(&mut self, uri: &str) -> String {
        if let Some(var) = self.vars.get(uri) {
            return var.clone();
        }
        let var = format!("v{}", self.order.len());
        self.vars.insert(uri.to_string(), var.clone());
        self.order.push(uri.to_string());
        var
    }

    /// One optional group per property so objects lacking it still bind
    fn groups(&self) -> Vec<Vec<TriplePattern>> {
        self.order
            .iter()
            .map(|uri| {
                vec![TriplePattern::new(
                    Term::var(SUBJECT_VAR),
                    Term::iri(uri),
                    Term::var(&self.vars[uri]),
                )]
            })
            .collect()
    }
}

/// `jcr:like` pattern to a regex: `%` any run, `_` any char, `\` escapes
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex_escape(&literal_text(&next.to_string())));
                }
            }
            other => out.push_str(&regex_escape(&other.to_string())),
        }
    }
    out
}

/// Value text as it appears inside a stored literal
fn literal_text(value: &str) -> String {
    value.replace('%', "%25")
}

/// Compare two optional sort values: numeric when both parse, missing last
fn compare_values(a: &Option<String>, b: &Option<String>, ascending: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(p), Ok(q)) => p.partial_cmp(&q).unwrap_or(Ordering::Equal),
                _ => x.cmp(y),
            };
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

impl<'a> QueryBuilder<'a> {
    pub fn new(connector: &'a dyn Connector, default_ns: &'a str) -> Self {
        QueryBuilder {
            connector,
            default_ns,
            errors: Vec::new(),
        }
    }

    /// Run the whole query and return ordered hits.
    pub fn execute(mut self, root: &QueryRoot) -> Result<Vec<QueryHit>> {
        let filters: Vec<Option<ObjectFilter>> = root.steps.iter().map(|s| self.lower_step(s)).collect();
        if !self.errors.is_empty() {
            tracing::warn!(errors = ?self.errors, "query translation failed");
            return Err(AdapterError::QueryTranslation(self.errors));
        }

        let evaluator = StepEvaluator::new(self.connector, self.default_ns);
        let mut current = vec![QueryHit::root()];
        for (step, filter) in root.steps.iter().zip(filters.iter()) {
            current = evaluator.evaluate(step, filter.as_ref(), &current)?;
            if current.is_empty() {
                break;
            }
        }
        self.order(&mut current, &root.order);
        tracing::debug!(hits = current.len(), "query executed");
        Ok(current)
    }

    // ========================================================================
    // Predicate lowering
    // ========================================================================

    /// Filter for one step, None when the step has no predicates.
    pub fn lower_step(&mut self, step: &LocationStep) -> Option<ObjectFilter> {
        if step.predicates.is_empty() {
            return None;
        }
        let mut vars = PropertyVars::default();
        let mut parts = Vec::new();
        for predicate in &step.predicates {
            if let Some(expr) = self.lower(predicate, &mut vars) {
                parts.push(expr);
            }
        }
        if parts.len() != step.predicates.len() {
            return None;
        }
        Some(ObjectFilter {
            patterns: Vec::new(),
            optional: vars.groups(),
            expr: Some(Expr::and(parts)),
        })
    }

    fn property_uri(&self, property: &Name) -> String {
        if *property == Name::jcr("mixinTypes") {
            vocab::MIXIN_TYPES_URI.to_string()
        } else {
            codec::property_uri(property, self.default_ns)
        }
    }

    fn lower(&mut self, node: &QueryNode, vars: &mut PropertyVars) -> Option<Expr> {
        match node {
            QueryNode::And(operands) => {
                let lowered: Vec<Option<Expr>> = operands.iter().map(|o| self.lower(o, vars)).collect();
                lowered.into_iter().collect::<Option<Vec<_>>>().map(Expr::and)
            }
            QueryNode::Or(operands) => {
                let lowered: Vec<Option<Expr>> = operands.iter().map(|o| self.lower(o, vars)).collect();
                lowered.into_iter().collect::<Option<Vec<_>>>().map(Expr::or)
            }
            QueryNode::Not(inner) => self.lower(inner, vars).map(|e| Expr::Not(Box::new(e))),
            QueryNode::NodeType(node_type) => {
                let var = vars.var_for(vocab::PRIMARY_TYPE_URI);
                let pattern = format!(
                    "{}{}$",
                    regex_escape(codec::SEP),
                    regex_escape(&literal_text(&node_type.to_string()))
                );
                Some(Expr::and(vec![Expr::Bound(var.clone()), Expr::regex(&var, &pattern)]))
            }
            QueryNode::Relation { property, op, value } => self.lower_relation(property, *op, value.as_deref(), vars),
            QueryNode::TextSearch(text) => {
                self.errors.push(format!("full-text search is not supported ('{}')", text));
                None
            }
        }
    }

    fn lower_relation(
        &mut self,
        property: &Name,
        op: RelationOp,
        value: Option<&str>,
        vars: &mut PropertyVars,
    ) -> Option<Expr> {
        let uri = self.property_uri(property);
        let is_name_valued = *property == Name::jcr("primaryType") || *property == Name::jcr("mixinTypes");
        // name values are stored expanded
        let stored = |v: &str| {
            if is_name_valued {
                literal_text(&Name::from_segment(v).to_string())
            } else {
                literal_text(v)
            }
        };
        // mixin lists hold several names, any position matches
        let tail = if *property == Name::jcr("mixinTypes") {
            format!("({}|$)", regex_escape(codec::SEP))
        } else {
            "$".to_string()
        };

        match (op, value) {
            (RelationOp::NotNull, _) => Some(Expr::Bound(vars.var_for(&uri))),
            (RelationOp::Eq, Some(v)) => {
                let var = vars.var_for(&uri);
                let pattern = format!("{}{}{}", regex_escape(codec::SEP), regex_escape(&stored(v)), tail);
                Some(Expr::and(vec![Expr::Bound(var.clone()), Expr::regex(&var, &pattern)]))
            }
            (RelationOp::Ne, Some(v)) => {
                let var = vars.var_for(&uri);
                let pattern = format!("{}{}{}", regex_escape(codec::SEP), regex_escape(&stored(v)), tail);
                Some(Expr::and(vec![Expr::Bound(var.clone()), Expr::not_regex(&var, &pattern)]))
            }
            (RelationOp::Like, Some(v)) => {
                let var = vars.var_for(&uri);
                let pattern = format!("{}{}{}", regex_escape(codec::SEP), like_to_regex(v), tail);
                Some(Expr::and(vec![Expr::Bound(var.clone()), Expr::regex(&var, &pattern)]))
            }
            (other, _) => {
                self.errors
                    .push(format!("operator {:?} on {} is not supported", other, property));
                None
            }
        }
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    fn sort_value(&self, hit: &QueryHit, property: &Name) -> Option<String> {
        let pid = hit.pid()?;
        match self.connector.get_property(pid, &self.property_uri(property)) {
            Ok(Some(text)) => literal::first_value_text(&text),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(pid, property = %property, error = %e, "sort value unavailable");
                None
            }
        }
    }

    fn order(&self, hits: &mut Vec<QueryHit>, specs: &[OrderSpec]) {
        if specs.is_empty() || hits.len() < 2 {
            return;
        }
        let mut keyed: Vec<(Vec<Option<String>>, QueryHit)> = hits
            .drain(..)
            .map(|hit| {
                let keys = specs.iter().map(|s| self.sort_value(&hit, &s.property)).collect();
                (keys, hit)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, spec) in specs.iter().enumerate() {
                let ord = compare_values(&a[i], &b[i], spec.ascending);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        hits.extend(keyed.into_iter().map(|(_, hit)| hit));
    }
}

#[cfg(test)]
mod builder_tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::model::ns;
    use crate::query::ast::Axis;

    #[test]
    fn test_like_to_regex() {
        assert_eq!(like_to_regex("Re%"), "Re.*");
        assert_eq!(like_to_regex("a_c"), "a.c");
        assert_eq!(like_to_regex(r"100\%"), "100%25");
    }

    #[test]
    fn test_compare_values_numeric_and_missing() {
        let a = Some("9".to_string());
        let b = Some("10".to_string());
        assert_eq!(compare_values(&a, &b, true), Ordering::Less);
        assert_eq!(compare_values(&a, &b, false), Ordering::Greater);
        assert_eq!(compare_values(&None, &b, true), Ordering::Greater);
        assert_eq!(compare_values(&None, &b, false), Ordering::Greater);
        let x = Some("apple".to_string());
        let y = Some("banana".to_string());
        assert_eq!(compare_values(&x, &y, true), Ordering::Less);
    }

    #[test]
    fn test_lower_step_shares_property_vars() {
        let c = MemoryConnector::new();
        let mut builder = QueryBuilder::new(&c, ns::SLING);
        let step = LocationStep::new(Axis::Children, None)
            .with_predicate(QueryNode::Relation {
                property: Name::local("color"),
                op: RelationOp::Eq,
                value: Some("red".into()),
            })
            .with_predicate(QueryNode::Not(Box::new(QueryNode::Relation {
                property: Name::local("color"),
                op: RelationOp::NotNull,
                value: None,
            })));
        let filter = builder.lower_step(&step).unwrap();
        assert_eq!(filter.optional.len(), 1);
        assert_eq!(filter.optional[0][0].predicate, Term::iri("http://sling.apache.org/jcr/sling/1.0/color"));
        assert!(builder.errors.is_empty());
    }

    #[test]
    fn test_unsupported_constructs_collected() {
        let c = MemoryConnector::new();
        let root = QueryRoot {
            steps: vec![
                LocationStep::new(Axis::Children, None).with_predicate(QueryNode::Relation {
                    property: Name::local("n"),
                    op: RelationOp::Gt,
                    value: Some("3".into()),
                }),
                LocationStep::new(Axis::Children, None).with_predicate(QueryNode::TextSearch("hello".into())),
            ],
            order: vec![],
        };
        match QueryBuilder::new(&c, ns::SLING).execute(&root) {
            Err(AdapterError::QueryTranslation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected translation error, got {:?}", other),
        }
    }
}
