//! istvon-core: the ISTVON decision pipeline.
//!
//! A prompt is length-checked, classified by the safety broker (ALLOW, NEEDS_FIX, BLOCK),
//! sanitized when needed, profiled, scored against the COSTAR rubric, and mapped into the
//! six-slot ISTVON schema by deterministic rules. An optional enhancer may add to the
//! rule-based map; it is never required for a valid result.

pub mod analysis;
pub mod audit;
mod config;
pub mod enhance;
mod engine;
mod error;
pub mod mapping;
pub mod policy;
pub mod samples;
pub mod security;
mod text;

// Engine
pub use engine::{IstvonEngine, ProcessOutcome};

// Configuration and errors
pub use config::{ComplexityThresholds, EngineSettings, SpecificityThresholds};
pub use error::{ConfigurationError, EngineError, EngineResult, EnhancementError};

// Pipeline types
pub use analysis::{Complexity, ContextProfile, Dimension, GapReport, Specificity};
pub use audit::{AuditRecord, AuditSink, TracingAuditSink};
pub use enhance::{DisabledEnhancer, EnhancementRequest, Enhancer, OpenRouterEnhancer};
pub use mapping::{IstvonMap, MilestoneStatus, Outcome, Slot, SlotMapping, SlotSource};
pub use policy::Policy;
pub use security::{CategoryMatch, SafetyResult, Severity, Verdict};
