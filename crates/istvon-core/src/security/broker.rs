//! Safety broker: turns pattern hits into a verdict.
//!
//! The verdict is a fixed function of the matched categories:
//!
//! 1. any always-block category matched → `BLOCK` with that category's message;
//! 2. highest severity `>=` block threshold → `BLOCK`;
//! 3. highest severity `>=` fix threshold → `NEEDS_FIX`, qualifying spans redacted;
//! 4. otherwise `ALLOW`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::security::patterns::{CategoryMatch, PatternRegistry, Severity};
use crate::security::redaction::Redactor;

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "ALLOW")]
    Allow,
    #[serde(rename = "BLOCK")]
    Block,
    #[serde(rename = "NEEDS_FIX")]
    NeedsFix,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "ALLOW",
            Verdict::Block => "BLOCK",
            Verdict::NeedsFix => "NEEDS_FIX",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker output. `reason` is set for every verdict except `ALLOW`; `sanitized_text` only for
/// `NEEDS_FIX`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyResult {
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub sanitized_text: Option<String>,
    pub matched_categories: Vec<CategoryMatch>,
}

impl SafetyResult {
    pub fn max_severity(&self) -> Option<Severity> {
        self.matched_categories.iter().map(|m| m.severity).max()
    }
}

/// Classifies prompts against a compiled registry.
#[derive(Debug, Clone)]
pub struct SafetyBroker<'a> {
    registry: &'a PatternRegistry,
    redactor: &'a Redactor,
    fix_threshold: Severity,
    block_threshold: Severity,
}

impl<'a> SafetyBroker<'a> {
    pub fn new(
        registry: &'a PatternRegistry,
        redactor: &'a Redactor,
        fix_threshold: Severity,
        block_threshold: Severity,
    ) -> Self {
        Self {
            registry,
            redactor,
            fix_threshold,
            block_threshold,
        }
    }

    pub fn classify(&self, text: &str) -> SafetyResult {
        let matches = self.registry.scan(text);
        tracing::debug!(
            target: "istvon::broker",
            hits = matches.len(),
            categories = ?matches.iter().map(|m| m.category.as_str()).collect::<Vec<_>>(),
            "Scanned prompt"
        );

        let verdict = self.decide(text, matches);
        tracing::info!(
            target: "istvon::broker",
            verdict = %verdict.verdict,
            max_severity = ?verdict.max_severity(),
            "Classified prompt"
        );
        verdict
    }

    /// Classify a fragment of generated text: `None` when it would be blocked, the sanitized
    /// text when it needs a fix, otherwise the text unchanged. Logs only at `debug`.
    pub fn screen(&self, text: &str) -> Option<String> {
        let result = self.decide(text, self.registry.scan(text));
        if result.verdict != Verdict::Allow {
            tracing::debug!(
                target: "istvon::broker",
                verdict = %result.verdict,
                "Screened fragment"
            );
        }
        match result.verdict {
            Verdict::Block => None,
            Verdict::NeedsFix => result.sanitized_text,
            Verdict::Allow => Some(text.to_string()),
        }
    }

    fn decide(&self, text: &str, matches: Vec<CategoryMatch>) -> SafetyResult {
        let always_block = matches.iter().find_map(|m| {
            self.registry
                .category(&m.category)
                .filter(|c| c.always_block())
        });
        if let Some(category) = always_block {
            return SafetyResult {
                verdict: Verdict::Block,
                reason: Some(category.reason().to_string()),
                sanitized_text: None,
                matched_categories: matches,
            };
        }

        let Some(max) = matches.iter().map(|m| m.severity).max() else {
            return SafetyResult {
                verdict: Verdict::Allow,
                reason: None,
                sanitized_text: None,
                matched_categories: matches,
            };
        };

        if max >= self.block_threshold {
            let reason = matches
                .iter()
                .find(|m| m.severity >= self.block_threshold)
                .and_then(|m| self.registry.category(&m.category))
                .map(|c| c.reason().to_string())
                .unwrap_or_else(|| format!("Blocked: {} severity content", max));
            return SafetyResult {
                verdict: Verdict::Block,
                reason: Some(reason),
                sanitized_text: None,
                matched_categories: matches,
            };
        }

        if max >= self.fix_threshold {
            let qualifying: Vec<&str> = matches
                .iter()
                .filter(|m| m.severity >= self.fix_threshold)
                .map(|m| m.category.as_str())
                .collect();
            let sanitized = self.redactor.sanitize(self.registry, text, &qualifying);
            let reason = format!(
                "Sanitized: removed content matching {}",
                qualifying.join(", ")
            );
            return SafetyResult {
                verdict: Verdict::NeedsFix,
                reason: Some(reason),
                sanitized_text: Some(sanitized),
                matched_categories: matches,
            };
        }

        SafetyResult {
            verdict: Verdict::Allow,
            reason: None,
            sanitized_text: None,
            matched_categories: matches,
        }
    }
}
