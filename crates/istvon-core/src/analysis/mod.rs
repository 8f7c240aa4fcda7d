//! Prompt analysis: context profiling and COSTAR gap scoring.

pub mod context;
pub mod gaps;

pub use context::{
    Complexity, ContextAnalyzer, ContextProfile, DomainRegistry, Specificity, GENERAL_DOMAIN,
};
pub use gaps::{Dimension, GapAnalyzer, GapReport, Rubric, RubricFile};
