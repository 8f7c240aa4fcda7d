//! The decision pipeline: length check, safety broker, context, gaps, slot mapping, and the
//! optional enhancement pass.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analysis::context::{ContextAnalyzer, ContextProfile};
use crate::analysis::gaps::{Dimension, GapAnalyzer, GapReport};
use crate::audit::AuditRecord;
use crate::config::EngineSettings;
use crate::enhance::{self, EnhancementRequest, Enhancer};
use crate::error::{ConfigurationError, EngineError, EngineResult, EnhancementError};
use crate::mapping::mapper::{SlotMapper, SlotSource};
use crate::mapping::schema::{IstvonMap, Slot};
use crate::policy::Policy;
use crate::security::{CategoryMatch, SafetyBroker, SafetyResult, Verdict};
use crate::text;

/// Completeness below which an allowed prompt gets a "add more detail" hint.
const DETAIL_HINT_BELOW: f64 = 0.8;

/// Result of one pass through the pipeline. A blocked prompt carries only the verdict, the
/// reason and the matched categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub original_prompt: String,
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub sanitized_prompt: Option<String>,
    pub matched_categories: Vec<CategoryMatch>,
    pub context: Option<ContextProfile>,
    pub gaps: Option<GapReport>,
    pub istvon_map: Option<IstvonMap>,
    pub slot_sources: BTreeMap<Slot, SlotSource>,
    pub unresolved: BTreeSet<Dimension>,
    pub needs_enhancement: bool,
    pub enhanced: bool,
    pub recommendations: Vec<String>,
}

impl ProcessOutcome {
    /// The text that was analyzed and mapped: the sanitized prompt for `NEEDS_FIX`, otherwise
    /// the original.
    pub fn effective_prompt(&self) -> &str {
        self.sanitized_prompt.as_deref().unwrap_or(&self.original_prompt)
    }

    /// Effective prompt with guidance for every missing COSTAR dimension appended.
    pub fn guided_prompt(&self) -> Option<String> {
        self.gaps
            .as_ref()
            .map(|gaps| gaps.guided_prompt(self.effective_prompt()))
    }

    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            verdict: self.verdict,
            original_prompt: self.original_prompt.clone(),
            reason: self.reason.clone(),
            sanitized_prompt: self.sanitized_prompt.clone(),
            istvon_map: self.istvon_map.clone(),
        }
    }
}

/// Cheap to clone; every clone shares the same compiled policy.
#[derive(Debug, Clone)]
pub struct IstvonEngine {
    policy: Arc<Policy>,
    settings: Arc<EngineSettings>,
}

impl IstvonEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let policy = Policy::load(&settings)?;
        Ok(Self {
            policy,
            settings: Arc::new(settings),
        })
    }

    /// Built-in policy and default settings.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::new(EngineSettings::default())
    }

    /// Settings from `ISTVON_CONFIG` and `ISTVON__*` variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::new(EngineSettings::load()?)
    }

    /// Use an already compiled policy. The policy's own placeholder applies.
    pub fn with_policy(policy: Arc<Policy>, settings: EngineSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        Ok(Self {
            policy,
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn classify(&self, prompt: &str) -> EngineResult<SafetyResult> {
        self.check_length(prompt)?;
        Ok(self.broker().classify(prompt))
    }

    pub fn analyze(&self, text: &str) -> ContextProfile {
        ContextAnalyzer::new(
            self.policy.domains(),
            self.policy.rubric().markers(),
            &self.settings.complexity,
            &self.settings.specificity,
        )
        .analyze(text)
    }

    pub fn analyze_gaps(&self, text: &str, context: &ContextProfile) -> GapReport {
        GapAnalyzer::new(self.policy.rubric()).analyze_gaps(text, context)
    }

    /// Run the deterministic pipeline. Fails only on oversized input.
    pub fn process(&self, prompt: &str) -> EngineResult<ProcessOutcome> {
        let safety = self.classify(prompt)?;

        if safety.verdict == Verdict::Block {
            tracing::info!(
                target: "istvon::engine",
                verdict = %safety.verdict,
                reason = safety.reason.as_deref().unwrap_or(""),
                "Prompt blocked"
            );
            return Ok(ProcessOutcome {
                original_prompt: prompt.to_string(),
                verdict: safety.verdict,
                recommendations: recommendations(Verdict::Block, None),
                reason: safety.reason,
                sanitized_prompt: None,
                matched_categories: safety.matched_categories,
                context: None,
                gaps: None,
                istvon_map: None,
                slot_sources: BTreeMap::new(),
                unresolved: BTreeSet::new(),
                needs_enhancement: false,
                enhanced: false,
            });
        }

        let text = safety.sanitized_text.as_deref().unwrap_or(prompt);
        let context = self.analyze(text);
        let gaps = self.analyze_gaps(text, &context);
        let mapping = SlotMapper::new(self.policy.rules(), self.policy.domains())
            .map_to_istvon(text, &context, &gaps);
        let needs_enhancement = mapping.needs_enhancement(&context);

        tracing::info!(
            target: "istvon::engine",
            verdict = %safety.verdict,
            domain = %context.domain,
            complexity = %context.complexity,
            specificity = %context.specificity,
            completeness = gaps.completeness_score,
            needs_enhancement,
            "Prompt processed"
        );

        Ok(ProcessOutcome {
            original_prompt: prompt.to_string(),
            verdict: safety.verdict,
            recommendations: recommendations(safety.verdict, Some(&gaps)),
            reason: safety.reason,
            sanitized_prompt: safety.sanitized_text,
            matched_categories: safety.matched_categories,
            context: Some(context),
            gaps: Some(gaps),
            istvon_map: Some(mapping.map),
            slot_sources: mapping.sources,
            unresolved: mapping.unresolved,
            needs_enhancement,
            enhanced: false,
        })
    }

    /// [`process`](Self::process), then offer the map to `enhancer` when the rules left
    /// something to improve. The enhancer's output is screened by the safety broker before it
    /// is merged. Enhancer failures and timeouts are logged and the rule-based map is returned
    /// unchanged.
    pub async fn process_with_enhancer(
        &self,
        prompt: &str,
        enhancer: &dyn Enhancer,
    ) -> EngineResult<ProcessOutcome> {
        let mut outcome = self.process(prompt)?;
        if !outcome.needs_enhancement {
            return Ok(outcome);
        }

        let merged = match (&outcome.istvon_map, &outcome.context, &outcome.gaps) {
            (Some(map), Some(context), Some(gaps)) => {
                let request = EnhancementRequest {
                    text: outcome.effective_prompt(),
                    context,
                    gaps,
                    partial: map,
                };
                match self.enhance_with_timeout(enhancer, request).await {
                    Ok(addition) => {
                        let addition = enhance::screen(addition, &self.broker());
                        Some(enhance::merge(map, addition))
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "istvon::enhance",
                            enhancer = enhancer.name(),
                            error = %e,
                            "Enhancement unavailable, keeping rule-based map"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(merged) = merged {
            outcome.enhanced = outcome.istvon_map.as_ref() != Some(&merged);
            outcome.istvon_map = Some(merged);
            tracing::info!(
                target: "istvon::enhance",
                enhancer = enhancer.name(),
                changed = outcome.enhanced,
                "Enhancement merged"
            );
        }
        Ok(outcome)
    }

    async fn enhance_with_timeout(
        &self,
        enhancer: &dyn Enhancer,
        request: EnhancementRequest<'_>,
    ) -> Result<IstvonMap, EnhancementError> {
        let limit = self.settings.enhancement_timeout();
        tokio::time::timeout(limit, enhancer.enhance(request))
            .await
            .map_err(|_| EnhancementError::Timeout(limit))?
    }

    fn broker(&self) -> SafetyBroker<'_> {
        SafetyBroker::new(
            self.policy.registry(),
            self.policy.redactor(),
            self.settings.fix_threshold,
            self.settings.block_threshold,
        )
    }

    fn check_length(&self, prompt: &str) -> EngineResult<()> {
        let length = prompt.chars().count();
        if length > self.settings.max_prompt_length {
            return Err(EngineError::InputTooLong {
                length,
                max: self.settings.max_prompt_length,
            });
        }
        Ok(())
    }
}

/// Next steps for the caller, by verdict.
fn recommendations(verdict: Verdict, gaps: Option<&GapReport>) -> Vec<String> {
    let mut out = Vec::new();
    match verdict {
        Verdict::Block => {
            out.push("Blocked: content contains high-risk elements".to_string());
            out.push("Please revise your prompt to remove unsafe content".to_string());
        }
        Verdict::NeedsFix => {
            out.push("Contains potentially unsafe content; sensitive terms were redacted".to_string());
            out.push("Consider removing or rephrasing sensitive terms".to_string());
            if let Some(gaps) = gaps.filter(|g| !g.is_complete()) {
                let missing: Vec<String> = gaps
                    .missing_dimensions
                    .iter()
                    .map(|d| text::capitalize(d.as_str()))
                    .collect();
                out.push(format!("Missing critical elements: {}", missing.join(", ")));
                out.push("Consider adding more context and details".to_string());
            }
        }
        Verdict::Allow => {
            out.push("Safe to proceed with ISTVON enhancement".to_string());
            if gaps.is_some_and(|g| g.completeness_score < DETAIL_HINT_BELOW) {
                out.push("Consider adding more details for better results".to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> IstvonEngine {
        IstvonEngine::builtin().expect("builtin engine")
    }

    #[test]
    fn oversized_prompt_is_rejected_before_classification() {
        let engine = IstvonEngine::new(EngineSettings {
            max_prompt_length: 10,
            ..Default::default()
        })
        .expect("engine");
        assert!(matches!(
            engine.process("kill myself and more words"),
            Err(EngineError::InputTooLong { length: 26, max: 10 })
        ));
        assert!(engine.process("ten chars!").is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let engine = IstvonEngine::new(EngineSettings {
            max_prompt_length: 4,
            ..Default::default()
        })
        .expect("engine");
        assert!(engine.process("éééé").is_ok());
    }

    #[test]
    fn blocked_outcome_has_no_structure() {
        let outcome = engine()
            .process("I want to blast an entire building into pieces")
            .expect("process");
        assert_eq!(outcome.verdict, Verdict::Block);
        assert!(outcome.reason.is_some());
        assert!(outcome.istvon_map.is_none());
        assert!(outcome.context.is_none());
        assert!(outcome.slot_sources.is_empty());
        assert_eq!(outcome.audit_record().istvon_map, None);
    }

    #[test]
    fn recommendations_follow_verdict() {
        let all: BTreeSet<Dimension> = Dimension::ALL.into_iter().collect();
        let gaps = GapReport::from_missing(all);
        let fix = recommendations(Verdict::NeedsFix, Some(&gaps));
        assert!(fix.iter().any(|r| r.starts_with("Missing critical elements: Context")));
        let allow = recommendations(Verdict::Allow, Some(&gaps));
        assert_eq!(allow.len(), 2);
        let complete = GapReport::from_missing(BTreeSet::new());
        assert_eq!(recommendations(Verdict::Allow, Some(&complete)).len(), 1);
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<IstvonEngine>();
    }
}
