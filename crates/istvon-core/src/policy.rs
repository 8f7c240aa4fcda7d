//! Policy: the immutable registries every request reads.
//!
//! Four TOML files make up a policy. Built-in copies are compiled into the binary; when
//! `policy_dir` is set, any of the files present there replace the built-in copy.
//!
//! | File | Contents |
//! |------|----------|
//! | safety.toml | Safety categories, severities, always-block flags |
//! | rubric.toml | COSTAR dimension detectors and specificity markers |
//! | domains.toml | Domain keywords and slot templates |
//! | lexicon.toml | Vocabulary for the extraction rules |

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;

use crate::analysis::context::DomainRegistry;
use crate::analysis::gaps::{Rubric, RubricFile};
use crate::config::EngineSettings;
use crate::error::ConfigurationError;
use crate::mapping::rules::{ExtractionRules, Lexicon};
use crate::mapping::templates::DomainsFile;
use crate::security::patterns::{PatternRegistry, SafetyPolicyFile};
use crate::security::redaction::{Redactor, REDACTED_PLACEHOLDER};

pub const SAFETY_FILE: &str = "safety.toml";
pub const RUBRIC_FILE: &str = "rubric.toml";
pub const DOMAINS_FILE: &str = "domains.toml";
pub const LEXICON_FILE: &str = "lexicon.toml";

static BUILTIN: OnceCell<Arc<Policy>> = OnceCell::new();

/// Raw policy file contents.
#[derive(Debug, Clone)]
pub struct PolicySources {
    pub safety: Cow<'static, str>,
    pub rubric: Cow<'static, str>,
    pub domains: Cow<'static, str>,
    pub lexicon: Cow<'static, str>,
}

impl PolicySources {
    pub fn builtin() -> Self {
        Self {
            safety: Cow::Borrowed(include_str!("../policy/safety.toml")),
            rubric: Cow::Borrowed(include_str!("../policy/rubric.toml")),
            domains: Cow::Borrowed(include_str!("../policy/domains.toml")),
            lexicon: Cow::Borrowed(include_str!("../policy/lexicon.toml")),
        }
    }

    /// Replace every file that exists in `dir`.
    pub fn overlay_dir(&mut self, dir: &Path) -> Result<(), ConfigurationError> {
        for (name, slot) in [
            (SAFETY_FILE, &mut self.safety),
            (RUBRIC_FILE, &mut self.rubric),
            (DOMAINS_FILE, &mut self.domains),
            (LEXICON_FILE, &mut self.lexicon),
        ] {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            let contents = std::fs::read_to_string(&path)
                .map_err(|source| ConfigurationError::Io { path: path.clone(), source })?;
            tracing::debug!(target: "istvon::policy", path = %path.display(), "Policy file override");
            *slot = Cow::Owned(contents);
        }
        Ok(())
    }
}

/// Compiled policy. Shared read-only across requests.
#[derive(Debug)]
pub struct Policy {
    registry: PatternRegistry,
    redactor: Redactor,
    domains: DomainRegistry,
    rubric: Rubric,
    rules: ExtractionRules,
}

impl Policy {
    /// The built-in policy with the default placeholder, compiled once per process.
    pub fn builtin() -> Result<Arc<Policy>, ConfigurationError> {
        BUILTIN
            .get_or_try_init(|| {
                Self::from_sources(&PolicySources::builtin(), REDACTED_PLACEHOLDER).map(Arc::new)
            })
            .cloned()
    }

    /// Policy for `settings`: the cached built-in one unless a policy directory or a custom
    /// placeholder is configured.
    pub fn load(settings: &EngineSettings) -> Result<Arc<Policy>, ConfigurationError> {
        if settings.policy_dir.is_none() && settings.placeholder == REDACTED_PLACEHOLDER {
            return Self::builtin();
        }
        let mut sources = PolicySources::builtin();
        if let Some(dir) = &settings.policy_dir {
            sources.overlay_dir(dir)?;
        }
        Self::from_sources(&sources, &settings.placeholder).map(Arc::new)
    }

    pub fn from_sources(sources: &PolicySources, placeholder: &str) -> Result<Self, ConfigurationError> {
        let safety: SafetyPolicyFile = parse(SAFETY_FILE, &sources.safety)?;
        let rubric: RubricFile = parse(RUBRIC_FILE, &sources.rubric)?;
        let domains: DomainsFile = parse(DOMAINS_FILE, &sources.domains)?;
        let lexicon: Lexicon = parse(LEXICON_FILE, &sources.lexicon)?;

        let registry = PatternRegistry::compile(&safety)?;
        let redactor = Redactor::checked(placeholder, &registry)?;
        let policy = Self {
            domains: DomainRegistry::compile(&domains)?,
            rubric: Rubric::compile(&rubric)?,
            rules: ExtractionRules::compile(&lexicon)?,
            registry,
            redactor,
        };

        tracing::info!(
            target: "istvon::policy",
            categories = policy.registry.categories().len(),
            domains = policy.domains.names().count(),
            "Policy loaded"
        );
        Ok(policy)
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }
}

fn parse<T: DeserializeOwned>(file: &str, contents: &str) -> Result<T, ConfigurationError> {
    toml::from_str(contents).map_err(|source| ConfigurationError::Parse {
        file: file.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_compiles() {
        let policy = Policy::builtin().expect("builtin policy");
        let names: Vec<&str> = policy.registry().categories().iter().map(|c| c.name()).collect();
        assert!(names.contains(&"destructive_intent"));
        assert!(names.contains(&"self_harm"));
        assert!(policy.registry().category("self_harm").is_some_and(|c| c.always_block()));
        let domains: Vec<&str> = policy.domains().names().collect();
        assert_eq!(
            domains,
            vec!["technical", "business", "creative", "academic", "communication"]
        );
    }

    #[test]
    fn builtin_policy_is_shared() {
        let a = Policy::builtin().expect("builtin policy");
        let b = Policy::builtin().expect("builtin policy");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn policy_dir_overrides_present_files_only() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            dir.path().join(SAFETY_FILE),
            "[[categories]]\nname = \"custom\"\nseverity = \"high\"\nreason = \"custom\"\nphrases = [\"forbidden word\"]\n",
        )
        .expect("write safety file");

        let settings = EngineSettings {
            policy_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let policy = Policy::load(&settings).expect("load policy");
        assert_eq!(policy.registry().categories().len(), 1);
        assert_eq!(policy.domains().names().count(), 5);
    }

    #[test]
    fn invalid_override_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join(RUBRIC_FILE), "dimensions = 3").expect("write rubric");
        let settings = EngineSettings {
            policy_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            Policy::load(&settings),
            Err(ConfigurationError::Parse { file, .. }) if file == RUBRIC_FILE
        ));
    }

    #[test]
    fn placeholder_matching_a_category_is_rejected() {
        let settings = EngineSettings {
            placeholder: "[password]".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Policy::load(&settings),
            Err(ConfigurationError::PlaceholderMatches { .. })
        ));
    }
}
