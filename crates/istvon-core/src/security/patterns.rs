//! Pattern matchers: a fixed registry of safety categories, each a set of case-insensitive
//! phrase, wildcard, or regex rules carrying a severity.
//!
//! The registry is compiled once from `policy/safety.toml` and is read-only afterwards.
//! Adding a category is a data change; the broker never names categories.

use std::fmt;
use std::ops::Range;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Ordered severity scale. Thresholds compare with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category hit, deduplicated per category (highest severity wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category: String,
    pub severity: Severity,
    /// Byte range of the first occurrence of the highest-severity rule in the scanned text.
    pub span: Range<usize>,
    pub matched: String,
}

/// Pattern lists as written in the policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSet {
    pub phrases: Vec<String>,
    pub wildcards: Vec<String>,
    pub regexes: Vec<String>,
}

impl PatternSet {
    fn is_empty(&self) -> bool {
        self.phrases.is_empty() && self.wildcards.is_empty() && self.regexes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSpec {
    pub severity: Severity,
    #[serde(flatten)]
    pub patterns: PatternSet,
}

/// A category as written in the policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub severity: Severity,
    #[serde(default)]
    pub always_block: bool,
    pub reason: String,
    #[serde(flatten)]
    pub patterns: PatternSet,
    #[serde(default)]
    pub escalations: Vec<EscalationSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyPolicyFile {
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
}

#[derive(Debug, Clone)]
struct Rule {
    regex: Regex,
    severity: Severity,
}

/// A compiled category.
#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    always_block: bool,
    reason: String,
    rules: Vec<Rule>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn always_block(&self) -> bool {
        self.always_block
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Highest-severity hit in `text`, earliest occurrence on ties.
    fn best_match(&self, text: &str) -> Option<(Severity, Range<usize>)> {
        let mut best: Option<(Severity, Range<usize>)> = None;
        for rule in &self.rules {
            if let Some(m) = rule.regex.find(text) {
                let better = match &best {
                    None => true,
                    Some((sev, span)) => {
                        rule.severity > *sev || (rule.severity == *sev && m.start() < span.start)
                    }
                };
                if better {
                    best = Some((rule.severity, m.range()));
                }
            }
        }
        best
    }
}

/// Compiled, validated category registry.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    categories: Vec<Category>,
}

impl PatternRegistry {
    /// Compile every category. Fails on empty or duplicate names, categories with no
    /// patterns, and patterns that do not compile.
    pub fn compile(file: &SafetyPolicyFile) -> Result<Self, ConfigurationError> {
        let mut categories: Vec<Category> = Vec::with_capacity(file.categories.len());
        for spec in &file.categories {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(ConfigurationError::Unnamed { kind: "category" });
            }
            if categories.iter().any(|c| c.name == name) {
                return Err(ConfigurationError::Duplicate {
                    kind: "category",
                    name: name.to_string(),
                });
            }
            if spec.patterns.is_empty() && spec.escalations.iter().all(|e| e.patterns.is_empty()) {
                return Err(ConfigurationError::Empty {
                    kind: "category",
                    name: name.to_string(),
                });
            }

            let mut rules = compile_set(name, &spec.patterns, spec.severity)?;
            for escalation in &spec.escalations {
                rules.extend(compile_set(name, &escalation.patterns, escalation.severity)?);
            }

            categories.push(Category {
                name: name.to_string(),
                always_block: spec.always_block,
                reason: spec.reason.trim().to_string(),
                rules,
            });
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Scan `text` and return one match per hit category, in declaration order.
    pub fn scan(&self, text: &str) -> Vec<CategoryMatch> {
        self.categories
            .iter()
            .filter_map(|category| {
                category.best_match(text).map(|(severity, span)| CategoryMatch {
                    category: category.name.clone(),
                    severity,
                    matched: text[span.clone()].to_string(),
                    span,
                })
            })
            .collect()
    }

    /// Every non-overlapping match span of `category` in `text`, sorted by start.
    pub fn spans(&self, text: &str, category: &str) -> Vec<Range<usize>> {
        let Some(category) = self.category(category) else {
            return Vec::new();
        };
        let mut spans: Vec<Range<usize>> = category
            .rules
            .iter()
            .flat_map(|rule| rule.regex.find_iter(text).map(|m| m.range()))
            .collect();
        spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        merge_overlapping(spans)
    }

    /// Name of the first category whose patterns match `text`, if any.
    pub fn first_matching_category(&self, text: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.rules.iter().any(|r| r.regex.is_match(text)))
            .map(|c| c.name.as_str())
    }
}

pub(crate) fn merge_overlapping(spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start < last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

fn compile_set(
    owner: &str,
    set: &PatternSet,
    severity: Severity,
) -> Result<Vec<Rule>, ConfigurationError> {
    let sources = set
        .phrases
        .iter()
        .map(|p| (p, phrase_to_regex(p)))
        .chain(set.wildcards.iter().map(|w| (w, wildcard_to_regex(w))))
        .chain(set.regexes.iter().map(|r| (r, r.clone())));

    let mut rules = Vec::new();
    for (original, source) in sources {
        if original.trim().is_empty() {
            continue;
        }
        let regex = compile_case_insensitive(&source).map_err(|source| {
            ConfigurationError::InvalidPattern {
                owner: format!("category `{}`", owner),
                pattern: original.clone(),
                source,
            }
        })?;
        rules.push(Rule { regex, severity });
    }
    Ok(rules)
}

pub(crate) fn compile_case_insensitive(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source).case_insensitive(true).build()
}

/// Literal phrase: escaped words joined by flexible whitespace, bounded on word edges.
pub(crate) fn phrase_to_regex(phrase: &str) -> String {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    bounded(phrase.trim(), &words.join(r"\s+"))
}

/// Wildcard rule: `*` is any run of word characters, `?` one word character.
pub(crate) fn wildcard_to_regex(pattern: &str) -> String {
    let words: Vec<String> = pattern
        .split_whitespace()
        .map(|word| {
            let mut out = String::new();
            for ch in word.chars() {
                match ch {
                    '*' => out.push_str(r"\w*"),
                    '?' => out.push_str(r"\w"),
                    c => out.push_str(&regex::escape(&c.to_string())),
                }
            }
            out
        })
        .collect();
    bounded(pattern.trim(), &words.join(r"\s+"))
}

// `\b` is only added on edges that are word characters, so "c++" still matches.
fn bounded(original: &str, body: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '*' | '?'));
    let lead = if is_word(original.chars().next()) { r"\b" } else { "" };
    let tail = if is_word(original.chars().last()) { r"\b" } else { "" };
    format!("{}(?:{}){}", lead, body, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(toml_src: &str) -> PatternRegistry {
        let file: SafetyPolicyFile = toml::from_str(toml_src).expect("parse policy");
        PatternRegistry::compile(&file).expect("compile policy")
    }

    const SAMPLE: &str = r#"
        [[categories]]
        name = "weapons"
        severity = "medium"
        reason = "weapons"
        phrases = ["hand gun", "knife"]
        wildcards = ["grenade*"]

        [[categories.escalations]]
        severity = "high"
        regexes = ['\bmass\s+shooting\b']

        [[categories]]
        name = "rude"
        severity = "low"
        reason = "rude"
        phrases = ["idiot"]
    "#;

    #[test]
    fn phrase_matching_is_case_insensitive_and_whitespace_flexible() {
        let r = registry(SAMPLE);
        let hits = r.scan("Bring a HAND   Gun to the range");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, "weapons");
        assert_eq!(hits[0].severity, Severity::Medium);
        assert_eq!(hits[0].matched, "HAND   Gun");
    }

    #[test]
    fn phrases_respect_word_boundaries() {
        let r = registry(SAMPLE);
        assert!(r.scan("the knifefish swims").is_empty());
        assert!(r.scan("an idiotic plan").is_empty());
    }

    #[test]
    fn wildcard_expands_within_word() {
        let r = registry(SAMPLE);
        let hits = r.scan("they found grenades");
        assert_eq!(hits[0].matched, "grenades");
    }

    #[test]
    fn dedupes_per_category_keeping_highest_severity() {
        let r = registry(SAMPLE);
        let hits = r.scan("a knife and then a mass shooting");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::High);
        assert_eq!(hits[0].matched, "mass shooting");
    }

    #[test]
    fn results_follow_declaration_order() {
        let r = registry(SAMPLE);
        let hits = r.scan("you idiot, drop the knife");
        let names: Vec<&str> = hits.iter().map(|h| h.category.as_str()).collect();
        assert_eq!(names, vec!["weapons", "rude"]);
    }

    #[test]
    fn spans_cover_every_occurrence() {
        let r = registry(SAMPLE);
        let text = "knife, knife, hand gun";
        let spans = r.spans(text, "weapons");
        let found: Vec<&str> = spans.iter().map(|s| &text[s.clone()]).collect();
        assert_eq!(found, vec!["knife", "knife", "hand gun"]);
    }

    #[test]
    fn malformed_regex_is_a_configuration_error() {
        let file: SafetyPolicyFile = toml::from_str(
            r#"
            [[categories]]
            name = "broken"
            severity = "low"
            reason = "broken"
            regexes = ['(unclosed']
            "#,
        )
        .expect("parse policy");
        assert!(matches!(
            PatternRegistry::compile(&file),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn duplicate_and_empty_categories_rejected() {
        let dup: SafetyPolicyFile = toml::from_str(
            r#"
            [[categories]]
            name = "a"
            severity = "low"
            reason = "a"
            phrases = ["x"]
            [[categories]]
            name = "a"
            severity = "low"
            reason = "a"
            phrases = ["y"]
            "#,
        )
        .expect("parse policy");
        assert!(matches!(
            PatternRegistry::compile(&dup),
            Err(ConfigurationError::Duplicate { .. })
        ));

        let empty: SafetyPolicyFile = toml::from_str(
            r#"
            [[categories]]
            name = "hollow"
            severity = "low"
            reason = "hollow"
            "#,
        )
        .expect("parse policy");
        assert!(matches!(
            PatternRegistry::compile(&empty),
            Err(ConfigurationError::Empty { .. })
        ));
    }

    #[test]
    fn severity_scale_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }
}
