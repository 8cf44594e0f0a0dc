//! Rodalex Classifiers
//!
//! Domain gatekeeping for Bolivian traffic-law queries written in regional
//! dialect.
//!
//! A query flows through a fixed cascade, and the first conclusive stage decides:
//! - Gates: basic-question override templates and a minimum-length check
//! - Tier A (lexical): weighted lexicon, idiomatic patterns, false-positive correction
//! - Tier B (statistical): TF-IDF features with a Naive Bayes model trained once and cached
//! - Tier C (semantic): embedding similarity to reference queries
//! - Remote: yes/no answer from a completion model, failing open
//!
//! The lexicon, patterns and thresholds live in one versioned YAML ruleset.

pub mod cascade;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod false_positive;
pub mod lexical;
pub mod lexicon;
pub mod normalizer;
pub mod patterns;
pub mod providers;
pub mod remote;
pub mod semantic;
pub mod statistical;

pub use cascade::{CascadeBuilder, ClassificationCascade, DEFAULT_TIER_TIMEOUT};
pub use classifier::TierClassifier;
pub use confidence::ConfidenceEstimator;
pub use config::{
    FalsePositiveRuleSpec, LexicalPolicy, PatternSpec, RuleCondition, RulesetConfig,
    SubstitutionSpec,
};
pub use false_positive::FalsePositiveAdjuster;
pub use lexical::{LexicalTier, LexicalVerdict};
pub use lexicon::{Lexicon, LexiconEntry};
pub use normalizer::Normalizer;
pub use patterns::{GateDecision, Gates, IdiomPatterns};
pub use providers::{
    CompletionProvider, DisabledCompletions, DisabledEmbeddings, EmbeddingProvider,
    OpenAiCompletions, OpenAiEmbeddings, ProviderConfig, SharedCompletions, SharedEmbeddings,
};
pub use remote::RemoteTier;
pub use semantic::SemanticTier;
pub use statistical::{default_models_dir, StatisticalModel, StatisticalTier, ARTIFACT_FILE};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cascade::{CascadeBuilder, ClassificationCascade};
    pub use crate::classifier::TierClassifier;
    pub use crate::config::{LexicalPolicy, RulesetConfig};
    pub use crate::providers::{CompletionProvider, EmbeddingProvider};
    pub use rodalex_core::prelude::*;
}
