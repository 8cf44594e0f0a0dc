//! Gatekeeper configuration

use anyhow::Context;
use rodalex_classifiers::{
    default_models_dir, ClassificationCascade, LexicalPolicy, OpenAiCompletions,
    OpenAiEmbeddings, ProviderConfig, RulesetConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Gatekeeper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Ruleset file; the embedded ruleset is used when absent
    #[serde(default)]
    pub ruleset_path: Option<PathBuf>,

    /// Directory holding the statistical model artifact
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// Overrides the ruleset's lexical escalation policy
    #[serde(default)]
    pub lexical_policy: Option<LexicalPolicy>,

    /// Deadline for each fallback tier
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,

    /// Enable the statistical tier
    #[serde(default = "default_true")]
    pub statistical: bool,

    /// Embedding provider for the semantic tier
    #[serde(default)]
    pub embeddings: Option<ProviderConfig>,

    /// Completion provider for the remote tier
    #[serde(default)]
    pub completions: Option<ProviderConfig>,

    /// Prior turns remembered when reading queries from stdin
    #[serde(default = "default_session_turns")]
    pub session_turns: usize,
}

impl GateConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {config_path}"))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {config_path}"))?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ruleset) = &cli.ruleset {
            config.ruleset_path = Some(ruleset.clone());
        }

        if let Some(dir) = &cli.models_dir {
            config.models_dir = Some(dir.clone());
        }

        if let Some(policy) = cli.policy {
            config.lexical_policy = Some(policy.into());
        }

        if let Some(timeout) = cli.timeout_ms {
            config.tier_timeout_ms = timeout;
        }

        if cli.no_statistical {
            config.statistical = false;
        }

        Ok(config)
    }

    /// The configured ruleset, or the embedded one
    pub fn ruleset(&self) -> anyhow::Result<RulesetConfig> {
        let ruleset = match &self.ruleset_path {
            Some(path) => RulesetConfig::from_file(path)?,
            None => RulesetConfig::embedded()?,
        };
        Ok(ruleset)
    }

    /// Statistical artifact directory, falling back to the user cache dir
    pub fn models_dir(&self) -> Option<PathBuf> {
        self.models_dir.clone().or_else(default_models_dir)
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }

    /// Build the cascade with every configured tier
    pub fn build_cascade(&self) -> anyhow::Result<ClassificationCascade> {
        let mut builder = ClassificationCascade::builder(self.ruleset()?)
            .tier_timeout(self.tier_timeout());

        if let Some(policy) = self.lexical_policy {
            builder = builder.lexical_policy(policy);
        }

        if self.statistical {
            let models_dir = self.models_dir();
            if models_dir.is_none() {
                warn!("No cache directory available; statistical model will not be persisted");
            }
            builder = builder.with_statistical(models_dir);
        }

        if let Some(provider) = &self.embeddings {
            let client = OpenAiEmbeddings::new(provider.clone())?;
            builder = builder.with_semantic(Arc::new(client));
        }

        if let Some(provider) = &self.completions {
            let client = OpenAiCompletions::new(provider.clone())?;
            builder = builder.with_remote(Arc::new(client));
        }

        Ok(builder.build()?)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ruleset_path: None,
            models_dir: None,
            lexical_policy: None,
            tier_timeout_ms: default_tier_timeout_ms(),
            statistical: true,
            embeddings: None,
            completions: None,
            session_turns: default_session_turns(),
        }
    }
}

fn default_tier_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_session_turns() -> usize {
    3
}
