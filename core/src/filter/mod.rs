//! Query matcher: the typed document-filter tree and its evaluator.

mod compare;
pub mod expr;
pub mod matcher;
pub mod parse;

pub use expr::{Condition, FilterExpr, Pattern};
pub use matcher::test;
pub use parse::parse_filter;
