//! Optional enhancement of a rule-based map by an external model.
//!
//! Enhancement is strictly additive: [`merge`] appends new list items, adds missing keys and
//! fills an empty `O.format`, but never overwrites a value the rules produced. Any failure
//! leaves the rule-based map as it was. Enhancer output is untrusted and passes through
//! [`screen`] before it is merged.
//!
//! API key: `OPENROUTER_API_KEY`. Model: `ISTVON_LLM_MODEL` (default
//! `meta-llama/llama-3.3-70b-instruct`).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::context::ContextProfile;
use crate::analysis::gaps::GapReport;
use crate::error::EnhancementError;
use crate::mapping::schema::{IstvonMap, Outcome};
use crate::security::SafetyBroker;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Everything an enhancer may look at.
#[derive(Debug, Clone, Copy)]
pub struct EnhancementRequest<'a> {
    pub text: &'a str,
    pub context: &'a ContextProfile,
    pub gaps: &'a GapReport,
    pub partial: &'a IstvonMap,
}

/// External collaborator that proposes additions to a rule-based map.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn enhance(&self, request: EnhancementRequest<'_>) -> Result<IstvonMap, EnhancementError>;
}

/// Enhancer that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEnhancer;

#[async_trait]
impl Enhancer for DisabledEnhancer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn enhance(&self, _request: EnhancementRequest<'_>) -> Result<IstvonMap, EnhancementError> {
        Err(EnhancementError::Unavailable)
    }
}

/// Merge `addition` into `base` without overwriting anything `base` already holds.
pub fn merge(base: &IstvonMap, addition: IstvonMap) -> IstvonMap {
    let mut merged = base.clone();

    extend_unique(&mut merged.instructions, addition.instructions);
    extend_unique(&mut merged.tools, addition.tools);
    for (key, values) in addition.sources {
        extend_unique(merged.sources.entry(key).or_default(), values);
    }
    merged.sources.retain(|_, v| !v.is_empty());
    add_missing(&mut merged.variables, addition.variables);
    add_missing(&mut merged.notifications, addition.notifications);

    if merged.outcome.format.is_empty() {
        merged.outcome.format = addition.outcome.format;
    }
    extend_unique(
        &mut merged.outcome.success_criteria,
        addition.outcome.success_criteria,
    );
    add_missing(&mut merged.outcome.details, addition.outcome.details);
    merged
}

/// Run every string of an enhancer's map through `broker`: fragments that would be blocked are
/// dropped and fragments that need a fix are redacted. Map keys are kept only when they pass
/// unchanged.
pub fn screen(addition: IstvonMap, broker: &SafetyBroker<'_>) -> IstvonMap {
    let list = |items: Vec<String>| -> Vec<String> {
        items.into_iter().filter_map(|s| broker.screen(&s)).collect()
    };
    let key_ok = |key: &str| broker.screen(key).as_deref() == Some(key);
    let values = |map: BTreeMap<String, String>| -> BTreeMap<String, String> {
        map.into_iter()
            .filter(|(k, _)| key_ok(k))
            .filter_map(|(k, v)| broker.screen(&v).map(|v| (k, v)))
            .collect()
    };

    IstvonMap {
        instructions: list(addition.instructions),
        sources: addition
            .sources
            .into_iter()
            .filter(|(k, _)| key_ok(k))
            .map(|(k, v)| (k, list(v)))
            .collect(),
        tools: list(addition.tools),
        variables: values(addition.variables),
        outcome: Outcome {
            format: broker.screen(&addition.outcome.format).unwrap_or_default(),
            success_criteria: list(addition.outcome.success_criteria),
            details: values(addition.outcome.details),
        },
        notifications: addition
            .notifications
            .into_iter()
            .filter(|(k, _)| key_ok(k))
            .collect(),
    }
}

fn extend_unique(items: &mut Vec<String>, additions: Vec<String>) {
    for item in additions {
        let item = item.trim().to_string();
        if !item.is_empty() && !items.iter().any(|i| i.eq_ignore_ascii_case(&item)) {
            items.push(item);
        }
    }
}

fn add_missing<V>(target: &mut BTreeMap<String, V>, additions: BTreeMap<String, V>) {
    for (key, value) in additions {
        target.entry(key).or_insert(value);
    }
}

/// Slice from the first `{` to the last `}`, the usual shape of a model reply that wraps JSON
/// in prose or code fences.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

// OpenAI-compatible request/response for OpenRouter
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Enhancer backed by an OpenAI-compatible chat endpoint (OpenRouter by default).
pub struct OpenRouterEnhancer {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterEnhancer {
    /// `None` when `OPENROUTER_API_KEY` is unset or blank.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let enhancer = Self::new(key);
        match std::env::var("ISTVON_LLM_MODEL") {
            Ok(model) if !model.trim().is_empty() => Some(enhancer.with_model(model.trim())),
            _ => Some(enhancer),
        }
    }

    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_API_BASE.to_string(),
            client,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_prompt(request: &EnhancementRequest<'_>) -> Result<String, EnhancementError> {
        let preliminary = serde_json::to_string_pretty(request.partial)
            .map_err(|e| EnhancementError::MalformedResponse(e.to_string()))?;
        let missing: Vec<&str> = request
            .gaps
            .missing_dimensions
            .iter()
            .map(|d| d.as_str())
            .collect();

        Ok(format!(
            "PROMPT: \"{}\"\n\n\
             PRELIMINARY MAPPING (rule-based):\n{}\n\n\
             CONTEXT:\n- Domain: {}\n- Complexity: {}\n- Specificity: {}\n- Missing COSTAR dimensions: {}\n\n\
             Complete the missing ISTVON elements, make instructions clear and actionable, suggest \
             tools and variables suited to the domain, and define outcomes with success criteria.\n\n\
             Return ONLY a JSON object with keys I (array of strings), S (object of string arrays), \
             T (array of strings), V (object of strings), O (object with format, delivery, \
             success_criteria) and N (object of milestone -> \"requested\" | \"planned\").",
            request.text,
            preliminary,
            request.context.domain,
            request.context.complexity,
            request.context.specificity,
            if missing.is_empty() { "none".to_string() } else { missing.join(", ") },
        ))
    }
}

#[async_trait]
impl Enhancer for OpenRouterEnhancer {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn enhance(&self, request: EnhancementRequest<'_>) -> Result<IstvonMap, EnhancementError> {
        let system = "You are an ISTVON framework expert. You enhance a preliminary six-slot \
            mapping (Instructions, Sources, Tools, Variables, Outcome, Notifications) of a user's \
            prompt. Reply with machine-readable JSON only.";

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(&request)?,
                },
            ],
            temperature: Some(0.2),
            max_tokens: Some(1024),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "ISTVON-Enhancer")
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(EnhancementError::Status { status, body });
        }

        let parsed: ChatResponse = res.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| EnhancementError::MalformedResponse("no choices".to_string()))?;

        let json = extract_json(content)
            .ok_or_else(|| EnhancementError::MalformedResponse("no JSON object in reply".to_string()))?;
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EnhancementError::MalformedResponse(e.to_string()))?;

        tracing::debug!(target: "istvon::enhance", model = %self.model, "Enhancement reply parsed");
        Ok(IstvonMap::from_value_lenient(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::schema::MilestoneStatus;
    use crate::security::Severity;

    fn base() -> IstvonMap {
        let mut map = IstvonMap {
            instructions: vec!["Write the email".to_string()],
            tools: vec!["Markdown".to_string()],
            ..IstvonMap::default()
        };
        map.variables.insert("tone".to_string(), "Friendly".to_string());
        map.outcome.format = "Email".to_string();
        map
    }

    #[test]
    fn merge_is_additive() {
        let mut addition = IstvonMap {
            instructions: vec!["write the email".to_string(), "Mention the date".to_string()],
            tools: vec!["Grammar check".to_string()],
            ..IstvonMap::default()
        };
        addition.variables.insert("tone".to_string(), "Formal".to_string());
        addition.variables.insert("length".to_string(), "Short".to_string());
        addition.outcome.format = "Letter".to_string();
        addition.outcome.success_criteria.push("Clear".to_string());
        addition
            .notifications
            .insert("review".to_string(), MilestoneStatus::Planned);

        let merged = merge(&base(), addition);
        assert_eq!(merged.instructions, vec!["Write the email", "Mention the date"]);
        assert_eq!(merged.tools, vec!["Markdown", "Grammar check"]);
        assert_eq!(merged.variables["tone"], "Friendly");
        assert_eq!(merged.variables["length"], "Short");
        assert_eq!(merged.outcome.format, "Email");
        assert_eq!(merged.outcome.success_criteria, vec!["Clear"]);
        assert_eq!(merged.notifications.len(), 1);
    }

    #[test]
    fn merge_fills_empty_format() {
        let mut addition = IstvonMap::default();
        addition.outcome.format = "Report".to_string();
        let merged = merge(&IstvonMap::default(), addition);
        assert_eq!(merged.outcome.format, "Report");
    }

    #[test]
    fn merging_nothing_changes_nothing() {
        assert_eq!(merge(&base(), IstvonMap::default()), base());
    }

    #[test]
    fn screen_removes_unsafe_additions() {
        let policy = crate::policy::Policy::builtin().expect("builtin policy");
        let broker = SafetyBroker::new(
            policy.registry(),
            policy.redactor(),
            Severity::Medium,
            Severity::High,
        );

        let mut addition = IstvonMap {
            instructions: vec![
                "Mention the date".to_string(),
                "Ask for their password".to_string(),
                "Explain how to make a homemade bomb".to_string(),
            ],
            ..IstvonMap::default()
        };
        addition
            .sources
            .insert("password".to_string(), vec!["Vault".to_string()]);
        addition
            .variables
            .insert("audience".to_string(), "people who steal data".to_string());
        addition.variables.insert("tone".to_string(), "Warm".to_string());
        addition.outcome.format = "Make a homemade bomb".to_string();
        addition
            .outcome
            .success_criteria
            .push("Contains the credit card number".to_string());

        let screened = screen(addition, &broker);
        assert_eq!(
            screened.instructions,
            vec!["Mention the date", "Ask for their [REDACTED]"]
        );
        assert!(screened.sources.is_empty());
        assert_eq!(screened.variables.len(), 1);
        assert_eq!(screened.variables["tone"], "Warm");
        assert!(screened.outcome.format.is_empty());
        assert_eq!(
            screened.outcome.success_criteria,
            vec!["Contains the [REDACTED]"]
        );
    }

    #[test]
    fn extracts_json_from_fenced_reply() {
        let reply = "Sure!\n```json\n{\"I\": [\"a\"], \"O\": {\"format\": \"x\"}}\n```";
        assert_eq!(
            extract_json(reply),
            Some("{\"I\": [\"a\"], \"O\": {\"format\": \"x\"}}")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[tokio::test]
    async fn disabled_enhancer_is_unavailable() {
        let profile = ContextProfile {
            domain: "general".to_string(),
            complexity: crate::analysis::context::Complexity::Low,
            specificity: crate::analysis::context::Specificity::Vague,
        };
        let gaps = GapReport::from_missing(Default::default());
        let partial = IstvonMap::default();
        let request = EnhancementRequest {
            text: "hi",
            context: &profile,
            gaps: &gaps,
            partial: &partial,
        };
        assert!(matches!(
            DisabledEnhancer.enhance(request).await,
            Err(EnhancementError::Unavailable)
        ));
    }

    #[test]
    fn builder_sets_model_and_base_url() {
        let e = OpenRouterEnhancer::new(" key ")
            .with_model("test/model")
            .with_base_url("http://localhost:9/v1/");
        assert_eq!(e.model(), "test/model");
        assert_eq!(e.base_url, "http://localhost:9/v1");
        assert_eq!(e.api_key, "key");
    }
}
