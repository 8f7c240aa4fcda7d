//! Slot mapper: extracted content first, then the domain template, then an empty container.
//!
//! Sequence slots (`I`, `T`) take the extracted list when there is one and the template list
//! otherwise. Map slots (`S`, `V`, `O`, `N`) are completed key by key: extracted keys win and
//! template keys fill the rest. The mapper never calls an enhancer; dimensions it could not
//! cover are reported in [`SlotMapping::unresolved`] for the caller to act on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analysis::context::{Complexity, ContextProfile, DomainRegistry, Specificity};
use crate::analysis::gaps::{Dimension, GapReport};
use crate::mapping::rules::ExtractionRules;
use crate::mapping::schema::{IstvonMap, Outcome, Slot};

/// Where a slot's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSource {
    Extracted,
    Template,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMapping {
    pub map: IstvonMap,
    pub sources: BTreeMap<Slot, SlotSource>,
    /// Missing COSTAR dimensions the extracted content did not cover either.
    pub unresolved: BTreeSet<Dimension>,
}

impl SlotMapping {
    pub fn source(&self, slot: Slot) -> SlotSource {
        self.sources.get(&slot).copied().unwrap_or(SlotSource::Empty)
    }

    /// Whether an enhancement pass is worth attempting: instructions had to come from a
    /// template, the prompt is complex or vague, or gaps remain.
    pub fn needs_enhancement(&self, profile: &ContextProfile) -> bool {
        self.source(Slot::Instructions) != SlotSource::Extracted
            || profile.complexity == Complexity::High
            || profile.specificity == Specificity::Vague
            || !self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlotMapper<'a> {
    rules: &'a ExtractionRules,
    domains: &'a DomainRegistry,
}

impl<'a> SlotMapper<'a> {
    pub fn new(rules: &'a ExtractionRules, domains: &'a DomainRegistry) -> Self {
        Self { rules, domains }
    }

    pub fn map_to_istvon(&self, text: &str, context: &ContextProfile, gaps: &GapReport) -> SlotMapping {
        let extracted = self.rules.extract(text);
        let template = self.domains.template(&context.domain).populate(context);

        let mut sources = BTreeMap::new();
        for slot in Slot::ALL {
            let source = if !extracted.is_slot_empty(slot) {
                SlotSource::Extracted
            } else if !template.is_slot_empty(slot) {
                SlotSource::Template
            } else {
                SlotSource::Empty
            };
            sources.insert(slot, source);
        }

        let unresolved = gaps
            .missing_dimensions
            .iter()
            .copied()
            .filter(|d| !covered_by(&extracted, *d))
            .collect();

        let map = IstvonMap {
            instructions: first_non_empty(extracted.instructions, template.instructions),
            sources: merge_keys(extracted.sources, template.sources),
            tools: first_non_empty(extracted.tools, template.tools),
            variables: merge_keys(extracted.variables, template.variables),
            outcome: merge_outcome(extracted.outcome, template.outcome),
            notifications: merge_keys(extracted.notifications, template.notifications),
        };

        SlotMapping {
            map,
            sources,
            unresolved,
        }
    }
}

// Extracted content that answers a COSTAR dimension the rubric did not see.
fn covered_by(extracted: &IstvonMap, dimension: Dimension) -> bool {
    match dimension {
        Dimension::Audience => extracted.variables.contains_key("audience"),
        Dimension::Timeline => extracted.variables.contains_key("deadline"),
        Dimension::Success => !extracted.outcome.success_criteria.is_empty(),
        Dimension::Resources => {
            !extracted.is_slot_empty(Slot::Sources) || !extracted.is_slot_empty(Slot::Tools)
        }
        Dimension::Context | Dimension::Objective => false,
    }
}

fn first_non_empty(extracted: Vec<String>, template: Vec<String>) -> Vec<String> {
    if extracted.is_empty() {
        template
    } else {
        extracted
    }
}

fn merge_keys<V>(extracted: BTreeMap<String, V>, template: BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut merged = template;
    merged.extend(extracted);
    merged
}

fn merge_outcome(extracted: Outcome, template: Outcome) -> Outcome {
    Outcome {
        format: if extracted.format.is_empty() {
            template.format
        } else {
            extracted.format
        },
        success_criteria: first_non_empty(extracted.success_criteria, template.success_criteria),
        details: merge_keys(extracted.details, template.details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::rules::Lexicon;
    use crate::mapping::schema::MilestoneStatus;
    use crate::mapping::templates::DomainsFile;

    struct Fixture {
        rules: ExtractionRules,
        domains: DomainRegistry,
    }

    fn fixture() -> Fixture {
        let lexicon: Lexicon =
            toml::from_str(include_str!("../../policy/lexicon.toml")).expect("parse lexicon");
        let domains: DomainsFile = toml::from_str(
            r#"
            [general]
            instructions = ["Execute the requested task effectively"]
            variables = { tone = "neutral" }
            [general.outcome]
            format = "Text response"
            success_criteria = ["Meets user requirements"]

            [[domains]]
            name = "communication"
            keywords = ["email"]
            [domains.template]
            instructions = ["Ensure clarity"]
            tools = ["Communication templates"]
            variables = { tone = "Appropriate", length = "Concise" }
            notifications = { review = "planned" }
            [domains.template.outcome]
            format = "Communication document"
            delivery = "Direct delivery"
            success_criteria = ["Clear communication"]
            "#,
        )
        .expect("parse domains");
        Fixture {
            rules: ExtractionRules::compile(&lexicon).expect("compile rules"),
            domains: DomainRegistry::compile(&domains).expect("compile domains"),
        }
    }

    fn profile(domain: &str) -> ContextProfile {
        ContextProfile {
            domain: domain.to_string(),
            complexity: Complexity::Low,
            specificity: Specificity::Moderate,
        }
    }

    fn all_missing() -> GapReport {
        GapReport::from_missing(Dimension::ALL.into_iter().collect())
    }

    #[test]
    fn extracted_content_wins_and_template_fills_the_rest() {
        let f = fixture();
        let mapper = SlotMapper::new(&f.rules, &f.domains);
        let m = mapper.map_to_istvon(
            "Write a friendly email to the team",
            &profile("communication"),
            &all_missing(),
        );

        assert_eq!(m.map.instructions, vec!["Write a friendly email to the team"]);
        assert_eq!(m.source(Slot::Instructions), SlotSource::Extracted);
        assert_eq!(m.map.tools, vec!["Communication templates"]);
        assert_eq!(m.source(Slot::Tools), SlotSource::Template);
        assert_eq!(m.map.variables["tone"], "Friendly");
        assert_eq!(m.map.variables["length"], "Concise");
        assert_eq!(m.map.outcome.format, "Email");
        assert_eq!(m.map.outcome.details["delivery"], "Direct delivery");
        assert_eq!(m.map.outcome.success_criteria, vec!["Clear communication"]);
        assert_eq!(m.map.notifications["review"], MilestoneStatus::Planned);
        assert!(m.map.sources.is_empty());
        assert_eq!(m.source(Slot::Sources), SlotSource::Empty);
    }

    #[test]
    fn unknown_domain_falls_back_to_general_template() {
        let f = fixture();
        let mapper = SlotMapper::new(&f.rules, &f.domains);
        let m = mapper.map_to_istvon("the weather today", &profile("general"), &all_missing());
        assert_eq!(m.map.instructions, vec!["Execute the requested task effectively"]);
        assert_eq!(m.source(Slot::Instructions), SlotSource::Template);
        assert_eq!(m.map.outcome.format, "Text response");
        assert!(m.map.tools.is_empty());
        assert!(m.needs_enhancement(&profile("general")));
    }

    #[test]
    fn extracted_content_resolves_gaps() {
        let f = fixture();
        let mapper = SlotMapper::new(&f.rules, &f.domains);
        let m = mapper.map_to_istvon(
            "Write an email for beginners by Friday using Markdown",
            &profile("communication"),
            &all_missing(),
        );
        assert!(!m.unresolved.contains(&Dimension::Audience));
        assert!(!m.unresolved.contains(&Dimension::Timeline));
        assert!(!m.unresolved.contains(&Dimension::Resources));
        assert!(m.unresolved.contains(&Dimension::Objective));
    }

    #[test]
    fn complete_extraction_needs_no_enhancement() {
        let f = fixture();
        let mapper = SlotMapper::new(&f.rules, &f.domains);
        let m = mapper.map_to_istvon(
            "Write an email",
            &profile("communication"),
            &GapReport::from_missing(BTreeSet::new()),
        );
        assert!(m.unresolved.is_empty());
        assert!(!m.needs_enhancement(&profile("communication")));
    }

    #[test]
    fn every_slot_has_a_source() {
        let f = fixture();
        let mapper = SlotMapper::new(&f.rules, &f.domains);
        let m = mapper.map_to_istvon("", &profile("general"), &all_missing());
        assert_eq!(m.sources.len(), 6);
    }
}
