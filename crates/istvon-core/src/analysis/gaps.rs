//! COSTAR gap analysis: which of the six prompt dimensions are missing.
//!
//! Each dimension has its own ordered detector list from `policy/rubric.toml`. A dimension is
//! present when any of its patterns matches; detectors never consult each other, so adding
//! text can only add dimensions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::context::{ContextProfile, Specificity, SpecificityMarkers};
use crate::error::ConfigurationError;
use crate::security::patterns::compile_case_insensitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Context,
    Objective,
    Success,
    Timeline,
    Audience,
    Resources,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Context,
        Dimension::Objective,
        Dimension::Success,
        Dimension::Timeline,
        Dimension::Audience,
        Dimension::Resources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Context => "context",
            Dimension::Objective => "objective",
            Dimension::Success => "success",
            Dimension::Timeline => "timeline",
            Dimension::Audience => "audience",
            Dimension::Resources => "resources",
        }
    }

    /// Sentence asking the user to supply this dimension.
    pub fn guidance(&self) -> &'static str {
        match self {
            Dimension::Context => "Please provide context and background information.",
            Dimension::Objective => "Please specify your goal or objective.",
            Dimension::Success => "Please define what success looks like.",
            Dimension::Timeline => "Please specify any time constraints or deadlines.",
            Dimension::Audience => "Please specify your target audience.",
            Dimension::Resources => "Please specify any tools or resources to use.",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigurationError::UnknownDimension(s.to_string()))
    }
}

/// Missing dimensions plus the share present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub missing_dimensions: BTreeSet<Dimension>,
    pub completeness_score: f64,
}

impl GapReport {
    pub fn from_missing(missing_dimensions: BTreeSet<Dimension>) -> Self {
        let total = Dimension::ALL.len();
        let present = total - missing_dimensions.len();
        Self {
            completeness_score: present as f64 / total as f64,
            missing_dimensions,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_dimensions.is_empty()
    }

    pub fn is_missing(&self, dimension: Dimension) -> bool {
        self.missing_dimensions.contains(&dimension)
    }

    /// One guidance sentence per missing dimension, in canonical order.
    pub fn guidance(&self) -> Vec<&'static str> {
        self.missing_dimensions.iter().map(Dimension::guidance).collect()
    }

    /// `text` followed by the guidance for every missing dimension, or `text` unchanged when
    /// nothing is missing.
    pub fn guided_prompt(&self, text: &str) -> String {
        if self.is_complete() {
            return text.to_string();
        }
        format!("{}\n\nAdditional guidance: {}", text, self.guidance().join(" "))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecificitySection {
    #[serde(default)]
    pub constraint_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub patterns: Vec<String>,
}

/// `policy/rubric.toml` as written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RubricFile {
    #[serde(default)]
    pub specificity: SpecificitySection,
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
}

/// Compiled rubric: one detector per dimension, plus the specificity markers.
#[derive(Debug, Clone)]
pub struct Rubric {
    detectors: Vec<(Dimension, Vec<Regex>)>,
    markers: SpecificityMarkers,
}

impl Rubric {
    /// Every dimension must be declared exactly once with at least one pattern.
    pub fn compile(file: &RubricFile) -> Result<Self, ConfigurationError> {
        let mut detectors: Vec<(Dimension, Vec<Regex>)> = Vec::with_capacity(Dimension::ALL.len());
        for spec in &file.dimensions {
            let dimension: Dimension = spec.name.parse()?;
            if detectors.iter().any(|(d, _)| *d == dimension) {
                return Err(ConfigurationError::Duplicate {
                    kind: "dimension",
                    name: dimension.to_string(),
                });
            }
            let mut patterns = Vec::with_capacity(spec.patterns.len());
            for pattern in spec.patterns.iter().filter(|p| !p.trim().is_empty()) {
                let regex = compile_case_insensitive(pattern).map_err(|source| {
                    ConfigurationError::InvalidPattern {
                        owner: format!("dimension `{}`", dimension),
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                patterns.push(regex);
            }
            if patterns.is_empty() {
                return Err(ConfigurationError::Empty {
                    kind: "dimension",
                    name: dimension.to_string(),
                });
            }
            detectors.push((dimension, patterns));
        }

        if let Some(absent) = Dimension::ALL
            .iter()
            .find(|d| !detectors.iter().any(|(have, _)| have == *d))
        {
            return Err(ConfigurationError::MissingDimension(absent.to_string()));
        }
        detectors.sort_by_key(|(d, _)| *d);

        Ok(Self {
            detectors,
            markers: SpecificityMarkers::compile(&file.specificity.constraint_markers)?,
        })
    }

    pub fn markers(&self) -> &SpecificityMarkers {
        &self.markers
    }

    fn detects(&self, dimension: Dimension, text: &str) -> bool {
        self.detectors
            .iter()
            .find(|(d, _)| *d == dimension)
            .is_some_and(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
    }
}

/// Scores prompts against a [`Rubric`].
#[derive(Debug, Clone, Copy)]
pub struct GapAnalyzer<'a> {
    rubric: &'a Rubric,
}

impl<'a> GapAnalyzer<'a> {
    pub fn new(rubric: &'a Rubric) -> Self {
        Self { rubric }
    }

    pub fn analyze_gaps(&self, text: &str, context: &ContextProfile) -> GapReport {
        let missing = Dimension::ALL
            .into_iter()
            .filter(|d| !self.present(*d, text, context))
            .collect();
        GapReport::from_missing(missing)
    }

    fn present(&self, dimension: Dimension, text: &str, context: &ContextProfile) -> bool {
        // A specific prompt carries its own background.
        if dimension == Dimension::Context && context.specificity == Specificity::Specific {
            return true;
        }
        self.rubric.detects(dimension, text)
    }
}
