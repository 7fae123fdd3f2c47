//! Per-entity access rules and their evaluation.

pub mod evaluator;
pub mod registry;
pub mod rule;

pub use evaluator::RuleEvaluator;
pub use registry::{RuleProvider, RuleRegistry};
pub use rule::{AccessRule, FnRule, Operation, RuleOutcome, StaticRule};
