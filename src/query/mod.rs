//! Structural path queries
//!
//! Parsed queries are lowered step by step into the repository's graph
//! pattern language; results thread the identifier chain and hierarchical
//! path of every hit from step to step.

mod ast;
mod builder;
mod parser;
mod step;

pub use ast::{Axis, LocationStep, OrderSpec, QueryHit, QueryNode, QueryRoot, RelationOp};
pub use builder::QueryBuilder;
pub use parser::parse;
pub use step::StepEvaluator;

#[cfg(test)]
mod tests;
