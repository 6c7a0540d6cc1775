//! Text rendering of pattern queries, used for debug logging.

use std::fmt::{self, Write};

use super::types::*;

fn term(t: &Term, lang: QueryLanguage) -> String {
    match (t, lang) {
        (Term::Var(v), QueryLanguage::Sparql) => format!("?{}", v),
        (Term::Var(v), QueryLanguage::Itql) => format!("${}", v),
        (Term::Iri(i), _) => format!("<{}>", i),
        (Term::Literal(l), _) => format!("'{}'", l.replace('\'', "\\'")),
    }
}

fn expr(e: &Expr, lang: QueryLanguage) -> String {
    let v = |name: &str| term(&Term::var(name), lang);
    match e {
        Expr::Regex { var, pattern } => format!("regex({}, '{}')", v(var), pattern),
        Expr::NotRegex { var, pattern } => format!("!regex({}, '{}')", v(var), pattern),
        Expr::Bound(var) => format!("bound({})", v(var)),
        Expr::Eq(var, t) => format!("{} = {}", v(var), term(t, lang)),
        Expr::Not(inner) => format!("!({})", expr(inner, lang)),
        Expr::And(parts) => join(parts, " && ", lang),
        Expr::Or(parts) => join(parts, " || ", lang),
    }
}

fn join(parts: &[Expr], sep: &str, lang: QueryLanguage) -> String {
    let inner: Vec<String> = parts.iter().map(|p| expr(p, lang)).collect();
    format!("({})", inner.join(sep))
}

fn pattern(p: &TriplePattern, lang: QueryLanguage) -> String {
    format!(
        "{} {} {}",
        term(&p.subject, lang),
        term(&p.predicate, lang),
        term(&p.object, lang)
    )
}

/// Render `query` in the given dialect.
pub fn render(query: &GraphQuery, lang: QueryLanguage) -> String {
    let mut out = String::from("select ");
    if query.distinct && lang == QueryLanguage::Sparql {
        out.push_str("distinct ");
    }
    if query.select.is_empty() {
        out.push('*');
    } else {
        let vars: Vec<String> = query.select.iter().map(|s| term(&Term::var(s), lang)).collect();
        out.push_str(&vars.join(" "));
    }

    match lang {
        QueryLanguage::Sparql => {
            out.push_str(" where { ");
            for p in &query.patterns {
                let _ = write!(out, "{} . ", pattern(p, lang));
            }
            for group in &query.optional {
                out.push_str("optional { ");
                for p in group {
                    let _ = write!(out, "{} . ", pattern(p, lang));
                }
                out.push_str("} ");
            }
            for f in &query.filters {
                let _ = write!(out, "filter({}) ", expr(f, lang));
            }
            out.push('}');
        }
        QueryLanguage::Itql => {
            out.push_str(" from <#ri> where ");
            let clauses: Vec<String> = query.patterns.iter().map(|p| pattern(p, lang)).collect();
            out.push_str(&clauses.join(" and "));
            for group in &query.optional {
                let inner: Vec<String> = group.iter().map(|p| pattern(p, lang)).collect();
                let _ = write!(out, " and ({} or true)", inner.join(" and "));
            }
            for f in &query.filters {
                let _ = write!(out, " having {}", expr(f, lang));
            }
        }
    }

    if !query.order_by.is_empty() {
        let keys: Vec<String> = query
            .order_by
            .iter()
            .map(|k| {
                let t = term(&Term::var(&k.var), lang);
                if k.descending {
                    format!("desc({})", t)
                } else {
                    t
                }
            })
            .collect();
        let _ = write!(out, " order by {}", keys.join(" "));
    }
    out
}

impl fmt::Display for GraphQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self, QueryLanguage::Sparql))
    }
}
