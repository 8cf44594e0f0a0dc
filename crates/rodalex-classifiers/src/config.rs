//! Versioned ruleset configuration
//!
//! Everything the lexical tier scores with (lexicon, idiom patterns,
//! substitutions, override templates, false-positive rules) and the
//! thresholds of the later tiers live in one YAML document. The default
//! ruleset for Bolivian traffic law is embedded in the binary.

use crate::normalizer::Normalizer;
use rodalex_core::{Category, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_RULESET: &str = include_str!("../rulesets/transito_bo.yaml");

/// Complete static configuration of the gatekeeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesetConfig {
    /// Ruleset version; statistical artifacts trained on another version are discarded
    pub version: String,

    /// Ruleset description
    pub description: Option<String>,

    /// Decision threshold for the lexical score
    #[serde(default)]
    pub threshold: f32,

    /// Distance from the threshold that yields full confidence
    #[serde(default = "default_confidence_scale")]
    pub confidence_scale: f32,

    /// Queries with fewer whitespace tokens are rejected outright
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    /// Idiom/slang rewrites, applied once each in order
    #[serde(default)]
    pub substitutions: Vec<SubstitutionSpec>,

    /// Basic-question templates that force acceptance
    pub overrides: OverrideSpec,

    /// Weighted terms grouped by category
    pub lexicon: BTreeMap<Category, Vec<WeightedTerm>>,

    /// Idiomatic multi-word regex patterns
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,

    /// False-positive corrections in priority order
    #[serde(default)]
    pub false_positive_rules: Vec<FalsePositiveRuleSpec>,

    /// Whether the lexical tier may defer to later tiers
    #[serde(default)]
    pub lexical_policy: LexicalPolicy,

    /// Prior-turn smoothing
    #[serde(default)]
    pub session: SessionSpec,

    /// Statistical tier settings and training corpus
    pub statistical: StatisticalSpec,

    /// Semantic tier settings
    pub semantic: SemanticSpec,

    /// Remote tier settings
    pub remote: RemoteSpec,
}

/// A whole-word rewrite rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionSpec {
    pub from: String,
    pub to: String,
}

/// Override templates and the result they force
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideSpec {
    #[serde(default = "default_override_score")]
    pub score: f32,

    #[serde(default = "default_override_confidence")]
    pub confidence: f32,

    /// Regexes evaluated against the canonical text
    pub templates: Vec<String>,
}

/// A lexicon term and its weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: i32,
}

/// A named idiomatic regex pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub pattern: String,
    pub weight: i32,
}

/// A false-positive correction rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalsePositiveRuleSpec {
    pub name: String,

    /// Whole words, at least one of which must be present
    pub triggers: Vec<String>,

    /// Optional second vocabulary, at least one of which must also be present
    #[serde(default)]
    pub co_occurs_with: Vec<String>,

    /// Condition on the lexical breakdown
    pub condition: RuleCondition,

    /// Factor applied to the lexical score
    pub multiplier: f32,
}

/// Condition a false-positive rule places on the lexical breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// At least `count` domain-keyword matches
    DomainKeywordsAtLeast { count: usize },

    /// Fewer than `count` domain-keyword matches
    DomainKeywordsBelow { count: usize },

    /// No regional-vocabulary or idiom matches
    NoRegionSpecificTerms,

    /// No further condition
    Always,
}

/// Escalation policy for the lexical tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalPolicy {
    /// The lexical score always decides
    #[default]
    Decisive,

    /// Defer when no lexicon term or pattern matched at all
    WithholdWithoutEvidence,

    /// Always defer to the later tiers
    Withheld,
}

/// Bounded bias from the caller's prior-turn scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Fraction of the mean prior score added to the current one
    #[serde(default = "default_session_weight")]
    pub weight: f32,

    /// Absolute bound on the smoothing term
    #[serde(default = "default_session_cap")]
    pub cap: f32,
}

impl Default for SessionSpec {
    fn default() -> Self {
        Self {
            weight: default_session_weight(),
            cap: default_session_cap(),
        }
    }
}

/// Statistical tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalSpec {
    /// Positive probability above which the tier accepts
    #[serde(default = "default_in_threshold")]
    pub in_threshold: f64,

    /// Positive probability below which the tier rejects
    #[serde(default = "default_out_threshold")]
    pub out_threshold: f64,

    /// Largest n-gram order
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,

    /// Vocabulary size limit
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    /// Additive smoothing for Naive Bayes
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default)]
    pub stop_words: Vec<String>,

    /// Labeled training corpus
    pub examples: Vec<TrainingExample>,
}

/// A labeled training query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    pub in_domain: bool,
}

/// Semantic tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSpec {
    /// Similarity above which the tier accepts
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Canonical in-domain reference queries
    pub references: Vec<String>,
}

/// Remote tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSpec {
    /// Prompt template; `{query}` is replaced by the user query
    pub prompt: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl RulesetConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::lexicon(format!("invalid ruleset: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::lexicon(format!("cannot read ruleset {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// The embedded Bolivian traffic-law ruleset
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(DEFAULT_RULESET)
    }

    /// All lexicon entries, flattened in category order
    pub fn entries(&self) -> impl Iterator<Item = (Category, &WeightedTerm)> {
        self.lexicon
            .iter()
            .flat_map(|(category, terms)| terms.iter().map(move |t| (*category, t)))
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::lexicon("ruleset version is empty"));
        }
        if self.entries().next().is_none() {
            return Err(Error::lexicon("lexicon is empty"));
        }
        if let Some((category, term)) = self.entries().find(|(_, t)| t.term.trim().is_empty()) {
            return Err(Error::lexicon(format!(
                "empty term in category {} (weight {})",
                category.label(),
                term.weight
            )));
        }
        if self.confidence_scale <= 0.0 {
            return Err(Error::lexicon("confidence_scale must be positive"));
        }
        if self.statistical.out_threshold > self.statistical.in_threshold {
            return Err(Error::lexicon(
                "statistical out_threshold must not exceed in_threshold",
            ));
        }
        if self.statistical.ngram_max == 0 {
            return Err(Error::lexicon("statistical ngram_max must be at least 1"));
        }
        if self.session.cap < 0.0 {
            return Err(Error::lexicon("session cap must not be negative"));
        }

        // Targets must not reintroduce a source word, or normalization
        // would stop being a fixed point.
        let sources: Vec<String> = self
            .substitutions
            .iter()
            .map(|s| Normalizer::fold(&s.from))
            .collect();
        for sub in &self.substitutions {
            let folded = Normalizer::fold(&sub.to);
            if let Some(src) = folded
                .split_whitespace()
                .find(|word| sources.iter().any(|s| s == word))
            {
                return Err(Error::lexicon(format!(
                    "substitution '{}' -> '{}' produces source term '{}'",
                    sub.from, sub.to, src
                )));
            }
        }
        Ok(())
    }
}

fn default_confidence_scale() -> f32 {
    5.0
}

fn default_min_tokens() -> usize {
    4
}

fn default_override_score() -> f32 {
    10.0
}

fn default_override_confidence() -> f32 {
    0.9
}

fn default_session_weight() -> f32 {
    0.2
}

fn default_session_cap() -> f32 {
    1.0
}

fn default_in_threshold() -> f64 {
    0.6
}

fn default_out_threshold() -> f64 {
    0.3
}

fn default_ngram_max() -> usize {
    2
}

fn default_max_features() -> usize {
    1000
}

fn default_alpha() -> f64 {
    1.0
}

fn default_similarity_threshold() -> f32 {
    0.65
}

fn default_max_tokens() -> u32 {
    50
}
