//! Context analyzer: domain, complexity, and specificity of a prompt.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ComplexityThresholds, SpecificityThresholds};
use crate::error::ConfigurationError;
use crate::mapping::templates::{DomainTemplate, DomainsFile};
use crate::security::patterns::{compile_case_insensitive, phrase_to_regex};
use crate::text;

/// Name of the fallback domain when no keyword matches.
pub const GENERAL_DOMAIN: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specificity {
    Vague,
    Moderate,
    Specific,
}

impl Specificity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specificity::Vague => "vague",
            Specificity::Moderate => "moderate",
            Specificity::Specific => "specific",
        }
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextProfile {
    pub domain: String,
    pub complexity: Complexity,
    pub specificity: Specificity,
}

#[derive(Debug, Clone)]
struct Domain {
    name: String,
    keywords: Vec<Regex>,
    template: DomainTemplate,
}

/// Compiled domain registry: keyword detectors plus the slot template of each domain.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    domains: Vec<Domain>,
    general: DomainTemplate,
}

impl DomainRegistry {
    pub fn compile(file: &DomainsFile) -> Result<Self, ConfigurationError> {
        let mut domains: Vec<Domain> = Vec::with_capacity(file.domains.len());
        for spec in &file.domains {
            let name = spec.name.trim();
            if name.is_empty() {
                return Err(ConfigurationError::Unnamed { kind: "domain" });
            }
            if name == GENERAL_DOMAIN || domains.iter().any(|d| d.name == name) {
                return Err(ConfigurationError::Duplicate {
                    kind: "domain",
                    name: name.to_string(),
                });
            }
            let mut keywords = Vec::with_capacity(spec.keywords.len());
            for keyword in spec.keywords.iter().filter(|k| !k.trim().is_empty()) {
                let regex = compile_case_insensitive(&phrase_to_regex(keyword)).map_err(|source| {
                    ConfigurationError::InvalidPattern {
                        owner: format!("domain `{}`", name),
                        pattern: keyword.clone(),
                        source,
                    }
                })?;
                keywords.push(regex);
            }
            if keywords.is_empty() {
                return Err(ConfigurationError::Empty {
                    kind: "domain",
                    name: name.to_string(),
                });
            }
            domains.push(Domain {
                name: name.to_string(),
                keywords,
                template: spec.template.clone(),
            });
        }
        Ok(Self {
            domains,
            general: file.general.clone(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|d| d.name.as_str())
    }

    /// Template for `domain`; unknown names and `general` get the general template.
    pub fn template(&self, domain: &str) -> &DomainTemplate {
        self.domains
            .iter()
            .find(|d| d.name == domain)
            .map(|d| &d.template)
            .unwrap_or(&self.general)
    }

    /// Domain with the most distinct keyword hits; ties keep declaration order.
    pub fn detect(&self, normalized: &str) -> &str {
        let mut best: Option<(&str, usize)> = None;
        for domain in &self.domains {
            let hits = domain.keywords.iter().filter(|k| k.is_match(normalized)).count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((&domain.name, hits));
            }
        }
        best.map_or(GENERAL_DOMAIN, |(name, _)| name)
    }
}

/// Compiled specificity markers.
#[derive(Debug, Clone)]
pub struct SpecificityMarkers {
    constraints: Vec<Regex>,
}

impl SpecificityMarkers {
    pub fn compile(phrases: &[String]) -> Result<Self, ConfigurationError> {
        let mut constraints = Vec::with_capacity(phrases.len());
        for phrase in phrases.iter().filter(|p| !p.trim().is_empty()) {
            let regex = compile_case_insensitive(&phrase_to_regex(phrase)).map_err(|source| {
                ConfigurationError::InvalidPattern {
                    owner: "specificity markers".to_string(),
                    pattern: phrase.clone(),
                    source,
                }
            })?;
            constraints.push(regex);
        }
        Ok(Self { constraints })
    }

    /// Numeric tokens, quoted strings, capitalized names past the first word of a sentence,
    /// and distinct constraint phrases.
    pub fn count(&self, text: &str) -> usize {
        let numeric = text::words(text)
            .iter()
            .filter(|w| w.chars().any(|c| c.is_ascii_digit()))
            .count();
        let quoted = quoted_strings(text);
        let names: usize = text::sentences(text)
            .iter()
            .map(|sentence| {
                text::words(sentence)
                    .iter()
                    .skip(1)
                    .filter(|w| is_name(w))
                    .count()
            })
            .sum();
        let constraints = self.constraints.iter().filter(|r| r.is_match(text)).count();
        numeric + quoted + names + constraints
    }
}

fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => word != "I" && !word.starts_with("I'"),
        _ => false,
    }
}

fn quoted_strings(text: &str) -> usize {
    let mut count = 0;
    let mut open: Option<char> = None;
    for c in text.chars() {
        match (open, c) {
            (None, '"') => open = Some('"'),
            (None, '\u{201C}') => open = Some('\u{201D}'),
            (Some(close), c) if c == close => {
                count += 1;
                open = None;
            }
            _ => {}
        }
    }
    count
}

/// Derives a [`ContextProfile`] from a prompt.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer<'a> {
    domains: &'a DomainRegistry,
    markers: &'a SpecificityMarkers,
    complexity: &'a ComplexityThresholds,
    specificity: &'a SpecificityThresholds,
}

impl<'a> ContextAnalyzer<'a> {
    pub fn new(
        domains: &'a DomainRegistry,
        markers: &'a SpecificityMarkers,
        complexity: &'a ComplexityThresholds,
        specificity: &'a SpecificityThresholds,
    ) -> Self {
        Self {
            domains,
            markers,
            complexity,
            specificity,
        }
    }

    pub fn analyze(&self, text: &str) -> ContextProfile {
        ContextProfile {
            domain: self.domains.detect(&text::normalize(text)).to_string(),
            complexity: self.complexity_of(text),
            specificity: self.specificity_of(text),
        }
    }

    fn complexity_of(&self, text: &str) -> Complexity {
        let sentences = text::sentences(text);
        let words: usize = sentences.iter().map(|s| text::words(s).len()).sum();
        let average = if sentences.is_empty() {
            0.0
        } else {
            words as f64 / sentences.len() as f64
        };

        let t = self.complexity;
        if sentences.len() >= t.high_sentence_count || average >= t.high_average_words {
            Complexity::High
        } else if sentences.len() <= t.low_sentence_count && average <= t.low_average_words {
            Complexity::Low
        } else {
            Complexity::Medium
        }
    }

    fn specificity_of(&self, text: &str) -> Specificity {
        let markers = self.markers.count(text);
        if markers >= self.specificity.specific {
            Specificity::Specific
        } else if markers >= self.specificity.moderate {
            Specificity::Moderate
        } else {
            Specificity::Vague
        }
    }
}
