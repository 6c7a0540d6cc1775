//! Shared helpers for pattern evaluation

use std::collections::HashSet;

use super::types::{Term, TriplePattern};

/// Order patterns so each one is as constrained as possible when it runs.
///
/// Greedy: repeatedly pick the pattern with the most positions that are
/// either constants or variables bound by earlier patterns. Ties keep the
/// original order.
pub(crate) fn reorder_patterns(patterns: &[TriplePattern]) -> Vec<TriplePattern> {
    let mut remaining: Vec<&TriplePattern> = patterns.iter().collect();
    let mut bound: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(patterns.len());

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = -1i32;
        for (i, pattern) in remaining.iter().enumerate() {
            let score = selectivity(pattern, &bound);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        let chosen = remaining.remove(best);
        for var in chosen.vars() {
            bound.insert(var);
        }
        ordered.push(chosen.clone());
    }
    ordered
}

fn selectivity(pattern: &TriplePattern, bound: &HashSet<&str>) -> i32 {
    pattern
        .terms()
        .iter()
        .enumerate()
        .map(|(pos, term)| {
            let fixed = match term {
                Term::Var(v) => bound.contains(v.as_str()),
                _ => true,
            };
            // a fixed subject narrows more than a fixed object, which
            // narrows more than a fixed predicate
            match (fixed, pos) {
                (false, _) => 0,
                (true, 0) => 4,
                (true, 2) => 3,
                (true, _) => 1,
            }
        })
        .sum()
}

/// Translate an identifier glob (`*` wildcard only) into an anchored regex.
pub fn glob_to_regex(glob: &str) -> String {
    let body = glob
        .split('*')
        .map(regex_lite::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{}$", body)
}
