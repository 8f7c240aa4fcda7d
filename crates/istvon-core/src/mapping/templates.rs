//! Domain slot templates (`policy/domains.toml`).
//!
//! Template strings may reference `{domain}`, `{complexity}` and `{specificity}`; they are
//! filled from the request's [`ContextProfile`] when the template is applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::context::ContextProfile;
use crate::mapping::schema::{IstvonMap, MilestoneStatus, Outcome};

/// Slot defaults for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainTemplate {
    pub instructions: Vec<String>,
    pub sources: BTreeMap<String, Vec<String>>,
    pub tools: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub outcome: Outcome,
    pub notifications: BTreeMap<String, MilestoneStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub template: DomainTemplate,
}

/// `policy/domains.toml` as written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainsFile {
    #[serde(default)]
    pub general: DomainTemplate,
    #[serde(default)]
    pub domains: Vec<DomainSpec>,
}

impl DomainTemplate {
    /// Materialize the template for `profile`.
    pub fn populate(&self, profile: &ContextProfile) -> IstvonMap {
        let fill = |s: &String| {
            s.replace("{domain}", &profile.domain)
                .replace("{complexity}", profile.complexity.as_str())
                .replace("{specificity}", profile.specificity.as_str())
        };
        let fill_all = |items: &[String]| items.iter().map(fill).collect::<Vec<_>>();
        let fill_map = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(k, v)| (k.clone(), fill(v)))
                .collect::<BTreeMap<_, _>>()
        };

        IstvonMap {
            instructions: fill_all(&self.instructions),
            sources: self
                .sources
                .iter()
                .map(|(k, v)| (k.clone(), fill_all(v)))
                .collect(),
            tools: fill_all(&self.tools),
            variables: fill_map(&self.variables),
            outcome: Outcome {
                format: fill(&self.outcome.format),
                success_criteria: fill_all(&self.outcome.success_criteria),
                details: fill_map(&self.outcome.details),
            },
            notifications: self.notifications.clone(),
        }
    }
}
