//! Extraction rules: what can be read directly out of the prompt for each slot.
//!
//! Rules are ordered tables compiled once from `policy/lexicon.toml` plus a fixed set of
//! structural patterns (URLs, lengths, deadlines). Extraction only reports what the text says;
//! filling gaps from templates is the mapper's job.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::mapping::schema::{IstvonMap, MilestoneStatus};
use crate::security::patterns::{compile_case_insensitive, phrase_to_regex};
use crate::text;

/// `policy/lexicon.toml` as written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    pub action_verbs: Vec<String>,
    pub request_preambles: Vec<String>,
    pub deliverables: Vec<String>,
    pub tones: Vec<String>,
    pub frameworks: Vec<String>,
    pub technologies: Vec<String>,
    pub audiences: Vec<String>,
}

const URL: &str = r#"\bhttps?://[^\s<>"')\]]+"#;
const DOCUMENT: &str = r"\b(?:based on|using|from|according to|per)\s+((?:the|this|that|our|my|your|attached|provided|\s)*(?:document|report|file|spreadsheet|dataset|paper|article|transcript|notes|slides|survey|study)s?)\b";
const FILE_REF: &str = r"\bfile:\s*([\w./-]+)";
const DATA: &str = r"\b(?:data\s+points?|statistics|survey\s+results|sales\s+data|figures|dataset)\b";
const STYLE: &str = r"\bin\s+(?:the\s+)?style\s+of\s+([\w-]+)|\bin\s+(?:an?\s+)?([\w-]+)\s+style\b";
const TONE_KEYED: &str = r"\btone\s*(?::|of|should\s+be|is|=)\s*([\w-]+)";
const LENGTH: &str = r"\b(?:under|at\s+most|no\s+more\s+than|about|around|at\s+least|exactly|max(?:imum)?)?\s*\d+\s*(?:words?|pages?|paragraphs?|sentences?|bullet\s+points?|bullets|slides?|minutes?|lines?|points?|characters?)\b";
const LENGTH_WORD: &str = r"\b(?:brief|short|concise|detailed|comprehensive|in-depth|long-form)\b";
const AUDIENCE_KEYED: &str = r"\b(?:targeting|aimed\s+at|audience\s*(?::|is|are))\s+(?:the\s+|our\s+|my\s+)?([\w-]+(?:\s+[\w-]+)?)";
const DEADLINE: &str = r"\b(?:by|before|due|until|no\s+later\s+than)\s+((?:the\s+)?(?:end\s+of\s+)?(?:next\s+|this\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|tonight|today|week|month|quarter|year|\d{4}-\d{2}-\d{2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?))\b";
const WITHIN: &str = r"\b(?:within|in\s+the\s+next|over\s+the\s+next)\s+(\d+\s+(?:hours?|days?|weeks?|months?))\b";
const FORMAT_AS: &str = r"\b(?:as|in)\s+(?:an?\s+)?(json|xml|html|markdown|csv|yaml|pdf|table|bulleted\s+list|numbered\s+list)\b";
const DELIVERY: &str = r"\b(?:send|deliver|share|post|publish|save|export|upload)\s+(?:it\s+|this\s+|them\s+|the\s+\w+\s+)?(?:to|as|via|on|into)\s+((?:the\s+|a\s+|an\s+|my\s+|our\s+)?[\w-]+(?:\s+[\w-]+)?)";
const SUCCESS: &str = r"\b(?:success\s+(?:means|is|looks\s+like|will\s+be)|successful\s+(?:if|when)|done\s+when|complete\s+when|measured\s+by|should\s+result\s+in|so\s+that)\b";

const NOTIFICATIONS: &[(&str, &str)] = &[
    ("updates", r"\b(?:notify|alert|ping|update)\s+me\b|\bsend\s+(?:me\s+)?updates\b|\bkeep\s+me\s+(?:informed|posted|updated)\b"),
    ("completion", r"\bwhen\s+(?:it\s+is\s+|it's\s+)?(?:done|finished|complete)\b|\bupon\s+completion\b"),
    ("progress_report", r"\bprogress\s+reports?\b"),
    ("each_step", r"\bafter\s+each\s+(?:step|stage|phase|milestone)\b"),
    ("reminder", r"\bremind\s+me\b"),
];

/// A compiled term list that reports the canonical spelling of whatever it matched.
#[derive(Debug, Clone)]
struct TermList {
    terms: Vec<(String, Regex)>,
}

impl TermList {
    fn compile(owner: &str, terms: &[String]) -> Result<Self, ConfigurationError> {
        let mut compiled = Vec::with_capacity(terms.len());
        for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let source = phrase_to_regex(term);
            // All-caps acronyms (SWOT, SMART) only match when written in caps.
            let acronym = term.len() > 1 && term.chars().all(|c| c.is_ascii_uppercase());
            let regex = if acronym {
                Regex::new(&source)
            } else {
                compile_case_insensitive(&source)
            }
            .map_err(|source| invalid(owner, term, source))?;
            compiled.push((term.to_string(), regex));
        }
        Ok(Self { terms: compiled })
    }

    /// Canonical terms present, in order of first appearance in `text`.
    fn found(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &str)> = self
            .terms
            .iter()
            .filter_map(|(term, regex)| regex.find(text).map(|m| (m.start(), term.as_str())))
            .collect();
        hits.sort_by_key(|(start, _)| *start);
        hits.into_iter().map(|(_, term)| term.to_string()).collect()
    }

    /// Earliest match; on equal starts the longest wins ("study plan" over "plan").
    fn first(&self, text: &str) -> Option<String> {
        self.terms
            .iter()
            .filter_map(|(_, regex)| regex.find(text))
            .min_by(|a, b| a.start().cmp(&b.start()).then(b.end().cmp(&a.end())))
            .map(|m| m.as_str().to_string())
    }

    /// Alternation of every term, longest first, for embedding in a larger pattern.
    fn alternation(&self) -> String {
        let mut terms: Vec<&str> = self.terms.iter().map(|(t, _)| t.as_str()).collect();
        terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
        terms
            .iter()
            .map(|t| t.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Compiled extraction rules.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    action_verbs: Vec<String>,
    preamble: Option<Regex>,
    deliverables: TermList,
    frameworks: TermList,
    technologies: TermList,
    url: Regex,
    document: Regex,
    file_ref: Regex,
    data: Regex,
    style: Regex,
    tone_keyed: Regex,
    tone_adjective: Option<Regex>,
    length: Regex,
    length_word: Regex,
    audience_for: Option<Regex>,
    audience_keyed: Regex,
    deadline: Regex,
    within: Regex,
    format_as: Regex,
    delivery: Regex,
    success: Regex,
    notifications: Vec<(String, Regex)>,
}

impl ExtractionRules {
    pub fn compile(lexicon: &Lexicon) -> Result<Self, ConfigurationError> {
        let fixed = |name: &str, source: &str| {
            compile_case_insensitive(source).map_err(|e| invalid(name, source, e))
        };

        let tones = TermList::compile("tones", &lexicon.tones)?;
        let deliverables = TermList::compile("deliverables", &lexicon.deliverables)?;
        let audiences = TermList::compile("audiences", &lexicon.audiences)?;
        let preambles = TermList::compile("request_preambles", &lexicon.request_preambles)?;

        let preamble = optional(&preambles, |alt| {
            format!(r"^(?:(?:{})\b[\s,]*)+", alt)
        })
        .map(|source| fixed("request_preambles", &source))
        .transpose()?;
        let tone_adjective = (!tones.terms.is_empty() && !deliverables.terms.is_empty())
            .then(|| {
                format!(
                    r"\b({})\s+(?:(?:tone|voice|manner|style)\b|(?:{})\b)",
                    tones.alternation(),
                    deliverables.alternation()
                )
            })
            .map(|source| fixed("tones", &source))
            .transpose()?;
        let audience_for = optional(&audiences, |alt| {
            format!(
                r"\b(?:for|to)\s+(?:a\s+|an\s+|the\s+|our\s+|my\s+|your\s+)?(?:[\w-]+\s+)?({})\b",
                alt
            )
        })
        .map(|source| fixed("audiences", &source))
        .transpose()?;

        let mut notifications = Vec::with_capacity(NOTIFICATIONS.len());
        for (key, source) in NOTIFICATIONS {
            notifications.push((key.to_string(), fixed("notifications", source)?));
        }

        Ok(Self {
            action_verbs: lexicon
                .action_verbs
                .iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect(),
            preamble,
            deliverables,
            frameworks: TermList::compile("frameworks", &lexicon.frameworks)?,
            technologies: TermList::compile("technologies", &lexicon.technologies)?,
            url: fixed("urls", URL)?,
            document: fixed("documents", DOCUMENT)?,
            file_ref: fixed("files", FILE_REF)?,
            data: fixed("data", DATA)?,
            style: fixed("styles", STYLE)?,
            tone_keyed: fixed("tone", TONE_KEYED)?,
            tone_adjective,
            length: fixed("length", LENGTH)?,
            length_word: fixed("length", LENGTH_WORD)?,
            audience_for,
            audience_keyed: fixed("audience", AUDIENCE_KEYED)?,
            deadline: fixed("deadline", DEADLINE)?,
            within: fixed("deadline", WITHIN)?,
            format_as: fixed("format", FORMAT_AS)?,
            delivery: fixed("delivery", DELIVERY)?,
            success: fixed("success", SUCCESS)?,
            notifications,
        })
    }

    /// Everything the text states directly. Slots with nothing to report stay empty.
    pub fn extract(&self, text: &str) -> IstvonMap {
        let mut map = IstvonMap {
            instructions: self.instructions(text),
            sources: self.sources(text),
            tools: self.tools(text),
            variables: self.variables(text),
            notifications: self.notifications(text),
            ..IstvonMap::default()
        };

        if let Some(format) = self.deliverables.first(text) {
            map.outcome.format = title_case(&format);
        } else if let Some(c) = self.format_as.captures(text) {
            map.outcome.format = title_case(&c[1]);
        }
        if let Some(c) = self.delivery.captures(text) {
            map.outcome
                .details
                .insert("delivery".to_string(), text::capitalize(c[1].trim()));
        }
        map.outcome.success_criteria = text::sentences(text)
            .into_iter()
            .filter(|s| self.success.is_match(s))
            .map(|s| text::capitalize(text::trim_sentence(s)))
            .collect();
        map
    }

    /// Imperative sentences, after dropping request preambles such as "please" or
    /// "I want to".
    fn instructions(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for sentence in text::sentences(text) {
            let stripped = match &self.preamble {
                Some(p) => p.replace(sentence, ""),
                None => sentence.into(),
            };
            let stripped = text::trim_sentence(&stripped);
            let Some(first) = text::words(stripped).first().map(|w| w.to_lowercase()) else {
                continue;
            };
            if self.action_verbs.contains(&first) {
                push_unique(&mut out, text::capitalize(stripped));
            }
        }
        out
    }

    fn sources(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let mut sources: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut add = |key: &str, value: &str| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            if !value.is_empty() {
                push_unique(sources.entry(key.to_string()).or_default(), value);
            }
        };

        for m in self.url.find_iter(text) {
            add("urls", m.as_str().trim_end_matches(['.', ',', ';', ':']));
        }
        for c in self.document.captures_iter(text) {
            add("documents", &c[1]);
        }
        for c in self.file_ref.captures_iter(text) {
            add("files", &c[1]);
        }
        for m in self.data.find_iter(text) {
            add("data", &m.as_str().to_lowercase());
        }
        sources
    }

    fn tools(&self, text: &str) -> Vec<String> {
        let mut tools = Vec::new();
        for term in self
            .frameworks
            .found(text)
            .into_iter()
            .chain(self.technologies.found(text))
        {
            push_unique(&mut tools, term);
        }
        for c in self.style.captures_iter(text) {
            if let Some(style) = c.get(1).or_else(|| c.get(2)) {
                push_unique(&mut tools, format!("{} style", text::capitalize(style.as_str())));
            }
        }
        tools
    }

    fn variables(&self, text: &str) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();

        let tone = self
            .tone_keyed
            .captures(text)
            .or_else(|| self.tone_adjective.as_ref().and_then(|r| r.captures(text)))
            .map(|c| text::capitalize(&c[1].to_lowercase()));
        if let Some(tone) = tone {
            vars.insert("tone".to_string(), tone);
        }

        let length = self
            .length
            .find(text)
            .or_else(|| self.length_word.find(text))
            .map(|m| normalize_spaces(m.as_str()).to_lowercase());
        if let Some(length) = length {
            vars.insert("length".to_string(), length);
        }

        let audience = self
            .audience_for
            .as_ref()
            .and_then(|r| r.captures(text))
            .or_else(|| self.audience_keyed.captures(text))
            .map(|c| normalize_spaces(&c[1]).to_lowercase());
        if let Some(audience) = audience {
            vars.insert("audience".to_string(), audience);
        }

        let deadline = self
            .deadline
            .captures(text)
            .or_else(|| self.within.captures(text))
            .map(|c| normalize_spaces(&c[1]));
        if let Some(deadline) = deadline {
            vars.insert("deadline".to_string(), deadline);
        }
        vars
    }

    fn notifications(&self, text: &str) -> BTreeMap<String, MilestoneStatus> {
        self.notifications
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(key, _)| (key.clone(), MilestoneStatus::Requested))
            .collect()
    }
}

fn optional(list: &TermList, build: impl FnOnce(String) -> String) -> Option<String> {
    (!list.terms.is_empty()).then(|| build(list.alternation()))
}

fn invalid(owner: &str, pattern: &str, source: regex::Error) -> ConfigurationError {
    ConfigurationError::InvalidPattern {
        owner: format!("extraction rule `{}`", owner),
        pattern: pattern.to_string(),
        source,
    }
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.iter().any(|existing| existing.eq_ignore_ascii_case(&item)) {
        items.push(item);
    }
}

fn normalize_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(s: &str) -> String {
    let lower = normalize_spaces(s).to_lowercase();
    match lower.as_str() {
        "json" | "xml" | "html" | "csv" | "yaml" | "pdf" => lower.to_uppercase(),
        _ => text::capitalize(&lower),
    }
}
