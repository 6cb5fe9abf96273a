//! Tree walking evaluator
//!
//! `value` holds the runtime representation of script values, `ops` the operator semantics
//! and `eval` the statement and expression walker itself.

#[allow(clippy::module_inception)]
mod eval;
pub mod ops;
pub mod value;

pub use self::eval::{Eval, DEFAULT_MAX_CALL_DEPTH};
