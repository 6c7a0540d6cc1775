//! Tests for pattern evaluation

use super::*;

/// Flat list of triples
struct Facts(Vec<Triple>);

impl TripleSource for Facts {
    fn triples(&self, subject: Option<&str>, predicate: Option<&str>, object: Option<&Value>) -> Vec<Triple> {
        self.0
            .iter()
            .filter(|t| subject.map_or(true, |s| t.subject == s))
            .filter(|t| predicate.map_or(true, |p| t.predicate == p))
            .filter(|t| object.map_or(true, |o| &t.object == o))
            .cloned()
            .collect()
    }
}

fn iri(s: &str, p: &str, o: &str) -> Triple {
    Triple {
        subject: s.to_string(),
        predicate: p.to_string(),
        object: Value::Iri(o.to_string()),
    }
}

fn lit(s: &str, p: &str, o: &str) -> Triple {
    Triple {
        subject: s.to_string(),
        predicate: p.to_string(),
        object: Value::Literal(o.to_string()),
    }
}

const MEMBER: &str = "urn:member";
const TITLE: &str = "urn:title";

fn fixture() -> Facts {
    Facts(vec![
        iri("a", MEMBER, "root"),
        iri("b", MEMBER, "root"),
        iri("c", MEMBER, "a"),
        lit("a", TITLE, "1%57%57%570%57alpha"),
        lit("b", TITLE, "1%57%57%570%57beta"),
    ])
}

fn subjects(rows: &[Bindings], var: &str) -> Vec<String> {
    let mut out: Vec<String> = rows.iter().filter_map(|r| r.get_str(var).map(String::from)).collect();
    out.sort();
    out
}

// ============================================================================
// Basic Joins
// ============================================================================

#[test]
fn test_single_pattern() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"]).triple(Term::var("s"), Term::iri(MEMBER), Term::iri("root"));
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&rows, "s"), vec!["a", "b"]);
}

#[test]
fn test_join_two_patterns() {
    let facts = fixture();
    // grandchildren of root
    let q = GraphQuery::select(&["g"])
        .triple(Term::var("c"), Term::iri(MEMBER), Term::iri("root"))
        .triple(Term::var("g"), Term::iri(MEMBER), Term::var("c"));
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&rows, "g"), vec!["c"]);
}

#[test]
fn test_no_match_is_empty() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"]).triple(Term::var("s"), Term::iri(MEMBER), Term::iri("nowhere"));
    assert!(Evaluator::new(&facts).eval_query(&q).unwrap().is_empty());
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_regex_filter() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(TITLE), Term::var("t"))
        .filter(Expr::regex("t", "%57alpha$"));
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&rows, "s"), vec!["a"]);
}

#[test]
fn test_not_regex_and_or() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(MEMBER), Term::iri("root"))
        .triple(Term::var("s"), Term::iri(TITLE), Term::var("t"))
        .filter(Expr::or(vec![Expr::not_regex("t", "alpha"), Expr::regex("t", "zzz")]));
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&rows, "s"), vec!["b"]);
}

#[test]
fn test_optional_and_bound() {
    let facts = fixture();
    // members of root with no title bound are kept by the optional, then
    // `bound` keeps only titled ones
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(MEMBER), Term::var("p"))
        .optional(vec![TriplePattern::new(Term::var("s"), Term::iri(TITLE), Term::var("t"))]);
    let all = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&all, "s"), vec!["a", "b", "c"]);

    let titled = Evaluator::new(&facts)
        .eval_query(&q.clone().filter(Expr::Bound("t".into())))
        .unwrap();
    assert_eq!(subjects(&titled, "s"), vec!["a", "b"]);

    let untitled = Evaluator::new(&facts)
        .eval_query(&q.filter(Expr::Not(Box::new(Expr::Bound("t".into())))))
        .unwrap();
    assert_eq!(subjects(&untitled, "s"), vec!["c"]);
}

#[test]
fn test_unbound_regex_is_false() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(MEMBER), Term::iri("a"))
        .filter(Expr::not_regex("missing", "x"));
    assert!(Evaluator::new(&facts).eval_query(&q).unwrap().is_empty());
}

#[test]
fn test_bad_regex_is_error() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(TITLE), Term::var("t"))
        .filter(Expr::regex("t", "(unclosed"));
    assert!(Evaluator::new(&facts).eval_query(&q).is_err());
}

// ============================================================================
// Ordering and Projection
// ============================================================================

#[test]
fn test_order_descending_and_distinct() {
    let facts = fixture();
    let q = GraphQuery::select(&["o"])
        .triple(Term::var("s"), Term::iri(MEMBER), Term::var("o"))
        .order("o", true);
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    let values: Vec<&str> = rows.iter().filter_map(|r| r.get_str("o")).collect();
    assert_eq!(values, vec!["root", "a"]);
}

#[test]
fn test_eq_filter() {
    let facts = fixture();
    let q = GraphQuery::select(&["s"])
        .triple(Term::var("s"), Term::iri(MEMBER), Term::var("p"))
        .filter(Expr::Eq("p".into(), Term::iri("a")));
    let rows = Evaluator::new(&facts).eval_query(&q).unwrap();
    assert_eq!(subjects(&rows, "s"), vec!["c"]);
}
