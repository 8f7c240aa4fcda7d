//! Safety layer: pattern registry, redaction, and the verdict broker.

pub mod broker;
pub mod patterns;
pub mod redaction;

pub use broker::{SafetyBroker, SafetyResult, Verdict};
pub use patterns::{CategoryMatch, CategorySpec, PatternRegistry, SafetyPolicyFile, Severity};
pub use redaction::{Redactor, MAX_REDACTION_PASSES, REDACTED_PLACEHOLDER};
