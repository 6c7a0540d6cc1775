//! Path-query parser
//!
//! Accepts the XPath subset hosts send:
//!
//! ```text
//! /jcr:root/a//b/*[@p = 'v' and (@q or not(@r != 'x'))]
//! //element(*, nt:file)[jcr:like(@title, 'Re%')]/jcr:deref(@ref, 'target')
//! //* order by @rank descending, @title
//! ```
//!
//! Names use the well-known prefixes (`jcr`, `nt`, `mix`, `sling`, `rep`);
//! anything else is a plain local name.

use crate::error::{AdapterError, Result};
use crate::model::Name;
use crate::query::ast::{Axis, LocationStep, OrderSpec, QueryNode, QueryRoot, RelationOp};

/// Parse a whole query.
pub fn parse(text: &str) -> Result<QueryRoot> {
    let mut parser = Parser::new(text);
    let root = parser.query()?;
    tracing::debug!(steps = root.steps.len(), order = root.order.len(), "query parsed");
    Ok(root)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser { src, pos: 0 }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(AdapterError::QueryParse {
            pos: self.pos,
            message: message.into(),
        })
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.src.len()
    }

    /// Consume `token` if the input continues with it.
    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consume a keyword, which must not run on into a longer name.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with(keyword) {
            return false;
        }
        let next = rest[keyword.len()..].chars().next();
        if next.is_some_and(is_name_char) {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            self.error(format!("expected '{}'", token))
        }
    }

    fn raw_name(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        let rest = self.rest();
        let len = if rest.starts_with('{') {
            // expanded form, namespace may contain anything but '}'
            match rest.find('}') {
                Some(close) => {
                    close + 1
                        + rest[close + 1..]
                            .find(|c: char| !is_name_char(c))
                            .unwrap_or(rest.len() - close - 1)
                }
                None => return self.error("unterminated '{'"),
            }
        } else {
            rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len())
        };
        if len == 0 {
            return self.error("expected a name");
        }
        self.pos = start + len;
        Ok(self.src[start..self.pos].to_string())
    }

    fn name(&mut self) -> Result<Name> {
        let raw = self.raw_name()?;
        Ok(Name::from_segment(&raw))
    }

    fn string_literal(&mut self) -> Result<String> {
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return self.error("expected a quoted string"),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return self.error("unterminated string"),
            };
            self.pos += c.len_utf8();
            if c == quote {
                // doubled quote is an escaped quote
                if self.peek() == Some(quote) {
                    self.pos += 1;
                    out.push(quote);
                    continue;
                }
                return Ok(out);
            }
            out.push(c);
        }
    }

    fn literal(&mut self) -> Result<String> {
        self.skip_ws();
        match self.peek() {
            Some('\'' | '"') => self.string_literal(),
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let rest = self.rest();
                let len = rest
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                let text = rest[..len].to_string();
                self.pos += len;
                Ok(text)
            }
            _ => self.error("expected a literal"),
        }
    }

    // ========================================================================
    // Path
    // ========================================================================

    fn query(&mut self) -> Result<QueryRoot> {
        let mut root = QueryRoot::default();
        // every query is rooted, the explicit form adds nothing
        self.eat("/jcr:root");
        loop {
            self.skip_ws();
            if self.eat("//") {
                root.steps.push(self.step(true)?);
            } else if self.eat("/") {
                root.steps.push(self.step(false)?);
            } else {
                break;
            }
        }
        if self.eat_keyword("order") {
            if !self.eat_keyword("by") {
                return self.error("expected 'by' after 'order'");
            }
            root.order = self.order_specs()?;
        }
        if !self.at_end() {
            return self.error("unexpected input");
        }
        if root.steps.is_empty() {
            return self.error("query has no location steps");
        }
        Ok(root)
    }

    fn step(&mut self, descendants: bool) -> Result<LocationStep> {
        self.skip_ws();
        let mut step = if self.eat("jcr:deref(") {
            self.expect("@")?;
            let property = self.name()?;
            self.expect(",")?;
            let target = self.string_literal()?;
            self.expect(")")?;
            let name = if target == "*" { None } else { Some(Name::from_segment(&target)) };
            LocationStep::new(Axis::Deref { property }, name)
        } else if self.eat("element(") {
            let name = if self.eat("*") { None } else { Some(self.name()?) };
            let node_type = if self.eat(",") { Some(self.name()?) } else { None };
            self.expect(")")?;
            let mut step = LocationStep::new(Self::axis_for(descendants, &name), name);
            if let Some(node_type) = node_type {
                step.predicates.push(QueryNode::NodeType(node_type));
            }
            step
        } else if self.eat("*") {
            LocationStep::new(Self::axis_for(descendants, &None), None)
        } else {
            let name = Some(self.name()?);
            LocationStep::new(Self::axis_for(descendants, &name), name)
        };

        while self.eat("[") {
            let predicate = self.or_expr()?;
            self.expect("]")?;
            step.predicates.push(predicate);
        }
        Ok(step)
    }

    fn axis_for(descendants: bool, name: &Option<Name>) -> Axis {
        match (descendants, name) {
            (true, _) => Axis::Descendants,
            (false, Some(_)) => Axis::Exact,
            (false, None) => Axis::Children,
        }
    }

    fn order_specs(&mut self) -> Result<Vec<OrderSpec>> {
        let mut specs = Vec::new();
        loop {
            self.expect("@")?;
            let property = self.name()?;
            let ascending = if self.eat_keyword("descending") {
                false
            } else {
                self.eat_keyword("ascending");
                true
            };
            specs.push(OrderSpec { property, ascending });
            if !self.eat(",") {
                return Ok(specs);
            }
        }
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn or_expr(&mut self) -> Result<QueryNode> {
        let mut operands = vec![self.and_expr()?];
        while self.eat_keyword("or") {
            operands.push(self.and_expr()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            QueryNode::Or(operands)
        })
    }

    fn and_expr(&mut self) -> Result<QueryNode> {
        let mut operands = vec![self.unary()?];
        while self.eat_keyword("and") {
            operands.push(self.unary()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            QueryNode::And(operands)
        })
    }

    fn unary(&mut self) -> Result<QueryNode> {
        self.skip_ws();
        if self.eat("fn:not(") || self.eat("not(") {
            let inner = self.or_expr()?;
            self.expect(")")?;
            return Ok(QueryNode::Not(Box::new(inner)));
        }
        if self.eat("jcr:like(") {
            self.expect("@")?;
            let property = self.name()?;
            self.expect(",")?;
            let pattern = self.string_literal()?;
            self.expect(")")?;
            return Ok(QueryNode::Relation {
                property,
                op: RelationOp::Like,
                value: Some(pattern),
            });
        }
        if self.eat("jcr:contains(") {
            // scope is ignored, only the text matters
            while !self.eat(",") {
                if self.at_end() {
                    return self.error("unterminated jcr:contains");
                }
                self.pos += self.peek().map_or(1, char::len_utf8);
            }
            let text = self.string_literal()?;
            self.expect(")")?;
            return Ok(QueryNode::TextSearch(text));
        }
        if self.eat("(") {
            let inner = self.or_expr()?;
            self.expect(")")?;
            return Ok(inner);
        }
        self.expect("@")?;
        let property = self.name()?;
        self.skip_ws();
        for symbol in ["!=", "<=", ">=", "=", "<", ">"] {
            if self.eat(symbol) {
                let value = self.literal()?;
                let op = match RelationOp::from_symbol(symbol) {
                    Some(op) => op,
                    None => return self.error(format!("unknown operator '{}'", symbol)),
                };
                return Ok(QueryNode::Relation {
                    property,
                    op,
                    value: Some(value),
                });
            }
        }
        Ok(QueryNode::Relation {
            property,
            op: RelationOp::NotNull,
            value: None,
        })
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use crate::model::ns;

    #[test]
    fn test_rooted_exact_steps() {
        let q = parse("/jcr:root/a/b").unwrap();
        assert_eq!(q.steps.len(), 2);
        assert_eq!(q.steps[0].axis, Axis::Exact);
        assert_eq!(q.steps[0].name, Some(Name::local("a")));
        assert_eq!(q.steps[1].name, Some(Name::local("b")));
        assert!(q.order.is_empty());
    }

    #[test]
    fn test_wildcards_and_descendants() {
        let q = parse("/jcr:root/a/*//c//*").unwrap();
        let axes: Vec<&Axis> = q.steps.iter().map(|s| &s.axis).collect();
        assert_eq!(axes, vec![&Axis::Exact, &Axis::Children, &Axis::Descendants, &Axis::Descendants]);
        assert_eq!(q.steps[2].name, Some(Name::local("c")));
        assert_eq!(q.steps[3].name, None);
    }

    #[test]
    fn test_predicate_precedence() {
        let q = parse("/jcr:root/a[@p = 'v' and (@q or not(@r != 'x'))]").unwrap();
        let pred = &q.steps[0].predicates[0];
        match pred {
            QueryNode::And(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(
                    parts[0],
                    QueryNode::Relation {
                        property: Name::local("p"),
                        op: RelationOp::Eq,
                        value: Some("v".into())
                    }
                );
                assert!(matches!(&parts[1], QueryNode::Or(inner) if inner.len() == 2));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_element_and_like() {
        let q = parse("//element(*, nt:file)[jcr:like(@jcr:title, 'Re%')]").unwrap();
        let step = &q.steps[0];
        assert_eq!(step.axis, Axis::Descendants);
        assert_eq!(step.predicates[0], QueryNode::NodeType(Name::nt("file")));
        assert_eq!(
            step.predicates[1],
            QueryNode::Relation {
                property: Name::new(ns::JCR, "title"),
                op: RelationOp::Like,
                value: Some("Re%".into())
            }
        );
    }

    #[test]
    fn test_deref_step() {
        let q = parse("/jcr:root/a/jcr:deref(@ref, 'target')").unwrap();
        assert_eq!(q.steps[1].axis, Axis::Deref { property: Name::local("ref") });
        assert_eq!(q.steps[1].name, Some(Name::local("target")));
    }

    #[test]
    fn test_order_by() {
        let q = parse("//* order by @rank descending, @title").unwrap();
        assert_eq!(
            q.order,
            vec![
                OrderSpec { property: Name::local("rank"), ascending: false },
                OrderSpec { property: Name::local("title"), ascending: true },
            ]
        );
    }

    #[test]
    fn test_numeric_literal_and_quotes() {
        let q = parse(r#"/jcr:root/a[@n >= 10 and @s = "it's"]"#).unwrap();
        match &q.steps[0].predicates[0] {
            QueryNode::And(parts) => {
                assert!(matches!(&parts[0], QueryNode::Relation { op: RelationOp::Ge, value: Some(v), .. } if v == "10"));
                assert!(matches!(&parts[1], QueryNode::Relation { value: Some(v), .. } if v == "it's"));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_errors_carry_position() {
        match parse("/jcr:root/a[@p = ") {
            Err(AdapterError::QueryParse { pos, .. }) => assert!(pos > 10),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(parse("").is_err());
        assert!(parse("/jcr:root/a extra").is_err());
    }
}
