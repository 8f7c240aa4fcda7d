//! Redaction of matched spans: every span of a qualifying category is replaced with a neutral
//! placeholder, leaving the surrounding text untouched.
//!
//! Redaction repeats until no qualifying span remains, so sanitizing already-sanitized text is
//! a no-op. The policy loader rejects registries whose patterns match the placeholder itself;
//! patterns that only match across a placeholder boundary are cut off after
//! [`MAX_REDACTION_PASSES`].

use std::ops::Range;

use crate::error::ConfigurationError;
use crate::security::patterns::{merge_overlapping, PatternRegistry};

/// Placeholder used in place of any redacted span unless settings override it.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Upper bound on redaction passes over one text. The built-in policy settles in two.
pub const MAX_REDACTION_PASSES: usize = 8;

/// Replaces category spans with a placeholder.
#[derive(Debug, Clone)]
pub struct Redactor {
    placeholder: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(REDACTED_PLACEHOLDER)
    }
}

impl Redactor {
    pub fn new(placeholder: &str) -> Self {
        Self {
            placeholder: placeholder.to_string(),
        }
    }

    /// Build a redactor after checking that no category in `registry` matches the placeholder,
    /// which would make redaction loop forever.
    pub fn checked(placeholder: &str, registry: &PatternRegistry) -> Result<Self, ConfigurationError> {
        if let Some(category) = registry.first_matching_category(placeholder) {
            return Err(ConfigurationError::PlaceholderMatches {
                placeholder: placeholder.to_string(),
                category: category.to_string(),
            });
        }
        Ok(Self::new(placeholder))
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Redact every span of `categories` in `text` until none remain, or until
    /// [`MAX_REDACTION_PASSES`] passes have run.
    pub fn sanitize(&self, registry: &PatternRegistry, text: &str, categories: &[&str]) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_REDACTION_PASSES {
            let spans = collect_spans(registry, &current, categories);
            if spans.is_empty() {
                return current;
            }
            current = self.replace_spans(&current, &spans);
        }
        tracing::warn!(
            target: "istvon::broker",
            passes = MAX_REDACTION_PASSES,
            categories = ?categories,
            "Redaction did not settle; a pattern matches across placeholder boundaries"
        );
        current
    }

    fn replace_spans(&self, text: &str, spans: &[Range<usize>]) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in spans {
            out.push_str(&text[cursor..span.start]);
            out.push_str(&self.placeholder);
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

// Spans from several categories may overlap; merge them so each region is replaced once.
fn collect_spans(registry: &PatternRegistry, text: &str, categories: &[&str]) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = categories
        .iter()
        .flat_map(|c| registry.spans(text, c))
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    merge_overlapping(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::patterns::SafetyPolicyFile;

    fn registry() -> PatternRegistry {
        let file: SafetyPolicyFile = toml::from_str(
            r#"
            [[categories]]
            name = "pii"
            severity = "medium"
            reason = "pii"
            phrases = ["credit card", "credit card number", "password"]

            [[categories]]
            name = "violence"
            severity = "medium"
            reason = "violence"
            phrases = ["weapon"]
            "#,
        )
        .expect("parse policy");
        PatternRegistry::compile(&file).expect("compile policy")
    }

    #[test]
    fn no_categories_returns_unchanged() {
        let r = Redactor::default();
        assert_eq!(
            r.sanitize(&registry(), "Share my password.", &[]),
            "Share my password."
        );
    }

    #[test]
    fn replaces_spans_and_preserves_surroundings() {
        let r = Redactor::default();
        assert_eq!(
            r.sanitize(&registry(), "Email my Password, please.", &["pii"]),
            "Email my [REDACTED], please."
        );
    }

    #[test]
    fn overlapping_rules_collapse_to_one_placeholder() {
        let r = Redactor::default();
        assert_eq!(
            r.sanitize(&registry(), "my credit card number is here", &["pii"]),
            "my [REDACTED] is here"
        );
    }

    #[test]
    fn only_listed_categories_are_redacted() {
        let r = Redactor::default();
        assert_eq!(
            r.sanitize(&registry(), "weapon and password", &["violence"]),
            "[REDACTED] and password"
        );
    }

    #[test]
    fn sanitize_is_idempotent() {
        let r = Redactor::default();
        let reg = registry();
        let once = r.sanitize(&reg, "password, weapon, credit card", &["pii", "violence"]);
        let twice = r.sanitize(&reg, &once, &["pii", "violence"]);
        assert_eq!(once, twice);
        assert_eq!(once, "[REDACTED], [REDACTED], [REDACTED]");
    }

    #[test]
    fn placeholder_matched_by_a_category_is_rejected() {
        let reg = registry();
        assert!(Redactor::checked("[REDACTED]", &reg).is_ok());
        assert!(matches!(
            Redactor::checked("[weapon]", &reg),
            Err(ConfigurationError::PlaceholderMatches { category, .. }) if category == "violence"
        ));
    }

    #[test]
    fn self_feeding_patterns_stop_after_bounded_passes() {
        // Neither rule matches "<a>" alone, but each replacement creates a new match for the other.
        let file: SafetyPolicyFile = toml::from_str(
            r#"
            [[categories]]
            name = "edges"
            severity = "medium"
            reason = "edges"
            regexes = ['>[a-z]', '[a-z]<']
            "#,
        )
        .expect("parse policy");
        let reg = PatternRegistry::compile(&file).expect("compile policy");
        let r = Redactor::checked("<a>", &reg).expect("placeholder accepted");

        let out = r.sanitize(&reg, "<a>b", &["edges"]);
        assert!(out.len() <= "<a>b".len() + MAX_REDACTION_PASSES * "<a>".len());
        assert!(!reg.spans(&out, "edges").is_empty());
    }

    #[test]
    fn custom_placeholder() {
        let r = Redactor::new("<removed>");
        assert_eq!(r.sanitize(&registry(), "a weapon", &["violence"]), "a <removed>");
    }
}
