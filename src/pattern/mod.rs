//! Graph pattern queries
//!
//! The repository's own query facility: the step evaluator and the
//! connector helpers lower everything they need into [`GraphQuery`] values,
//! and the in-process backends answer them with [`Evaluator`].

mod eval;
mod render;
mod types;
pub(crate) mod utils;

pub use eval::{Bindings, Evaluator, ResultRow, Triple, TripleSource, Value};
pub use render::render;
pub use types::*;
pub use utils::glob_to_regex;

#[cfg(test)]
mod tests;
