//! Classification cascade
//!
//! Normalization, then the override and length gates, then the lexical
//! tier, then every configured fallback tier in cascade order. The first
//! conclusive outcome decides. Fallback tiers run under a deadline, and an
//! error or timeout is replaced by the tier's failure outcome. When nothing
//! is conclusive the cascade fails closed.

use crate::classifier::TierClassifier;
use crate::config::{LexicalPolicy, RulesetConfig};
use crate::lexical::LexicalTier;
use crate::normalizer::Normalizer;
use crate::patterns::{GateDecision, Gates};
use crate::providers::{SharedCompletions, SharedEmbeddings};
use crate::remote::RemoteTier;
use crate::semantic::SemanticTier;
use crate::statistical::StatisticalTier;
use metrics::{counter, histogram};
use rodalex_core::{
    ClassificationResult, Error, NormalizedQuery, Result, SessionContext, Tier, TierOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default deadline for a single fallback tier
pub const DEFAULT_TIER_TIMEOUT: Duration = Duration::from_secs(5);

/// The domain gatekeeper
pub struct ClassificationCascade {
    ruleset_version: String,
    normalizer: Normalizer,
    gates: Gates,
    lexical: LexicalTier,
    tiers: Vec<Arc<dyn TierClassifier>>,
    tier_timeout: Duration,
}

impl ClassificationCascade {
    pub fn builder(config: RulesetConfig) -> CascadeBuilder {
        CascadeBuilder::new(config)
    }

    /// Gates and lexical tier only
    pub fn from_config(config: RulesetConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    pub fn lexical_policy(&self) -> LexicalPolicy {
        self.lexical.policy()
    }

    /// Names of the fallback tiers in evaluation order
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn normalize(&self, text: &str) -> NormalizedQuery {
        self.normalizer.normalize(text)
    }

    /// Classify a standalone query
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        self.run(text, None).await
    }

    /// Classify a query, biased by the caller's prior turns
    pub async fn classify_with_session(
        &self,
        text: &str,
        session: &SessionContext,
    ) -> ClassificationResult {
        self.run(text, Some(session)).await
    }

    /// Classify a conversational turn and record its score in the session
    pub async fn classify_turn(
        &self,
        text: &str,
        session: &mut SessionContext,
    ) -> ClassificationResult {
        let result = self.run(text, Some(session)).await;
        session.push(result.score);
        result
    }

    /// Load every fallback tier's lazy state; returns the tiers that failed
    pub async fn warm_up(&self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            let outcome = match tokio::time::timeout(self.tier_timeout, tier.warm_up()).await {
                Ok(result) => result,
                Err(_) => Err(Error::ProviderTimeout(self.timeout_ms())),
            };
            match outcome {
                Ok(()) => info!(tier = tier.name(), "Tier ready"),
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Tier warm-up failed");
                    failures.push((tier.name().to_string(), e));
                }
            }
        }
        failures
    }

    async fn run(&self, text: &str, session: Option<&SessionContext>) -> ClassificationResult {
        let start = Instant::now();
        let query = self.normalizer.normalize(text);

        let mut result = self.decide(&query, session).await;
        result.latency_us = start.elapsed().as_micros() as u64;

        let decision = if result.in_domain {
            "in_domain"
        } else {
            "out_of_domain"
        };
        counter!(
            "rodalex_classifications_total",
            "tier" => result.decided_at.label(),
            "decision" => decision
        )
        .increment(1);
        histogram!("rodalex_classification_latency_us").record(result.latency_us as f64);

        debug!(
            in_domain = result.in_domain,
            score = result.score,
            confidence = result.confidence,
            tier = %result.decided_at,
            latency_us = result.latency_us,
            "Classified query"
        );
        result
    }

    async fn decide(
        &self,
        query: &NormalizedQuery,
        session: Option<&SessionContext>,
    ) -> ClassificationResult {
        match self.gates.check(query) {
            Some(GateDecision::Override { score, confidence }) => {
                return ClassificationResult::new(true, score, confidence, Tier::Override);
            }
            Some(GateDecision::TooShort { tokens }) => {
                debug!(tokens, "Query below minimum length");
                return ClassificationResult::new(false, 0.0, 0.0, Tier::LengthGate);
            }
            None => {}
        }

        let verdict = self.lexical.evaluate(query, session);
        if let Some(in_domain) = verdict.outcome.in_domain() {
            return ClassificationResult::new(
                in_domain,
                verdict.score,
                verdict.outcome.confidence(),
                Tier::Lexical,
            )
            .with_breakdown(verdict.breakdown);
        }

        for tier in &self.tiers {
            let outcome = self.consult(tier.as_ref(), query).await;
            if let Some(in_domain) = outcome.in_domain() {
                return ClassificationResult::new(
                    in_domain,
                    verdict.score,
                    outcome.confidence(),
                    tier.tier(),
                )
                .with_breakdown(verdict.breakdown);
            }
        }

        warn!(tiers = self.tiers.len(), "No tier was conclusive, failing closed");
        ClassificationResult::new(false, verdict.score, 0.0, Tier::Exhausted)
            .with_breakdown(verdict.breakdown)
    }

    async fn consult(&self, tier: &dyn TierClassifier, query: &NormalizedQuery) -> TierOutcome {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.tier_timeout, tier.evaluate(query)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let fallback = tier.failure_outcome();
                warn!(tier = tier.name(), error = %e, ?fallback, "Tier failed");
                counter!("rodalex_tier_failures_total", "tier" => tier.tier().label()).increment(1);
                fallback
            }
            Err(_) => {
                let fallback = tier.failure_outcome();
                warn!(
                    tier = tier.name(),
                    timeout_ms = self.timeout_ms(),
                    ?fallback,
                    "Tier timed out"
                );
                counter!("rodalex_tier_failures_total", "tier" => tier.tier().label()).increment(1);
                fallback
            }
        };
        debug!(
            tier = tier.name(),
            latency_us = start.elapsed().as_micros() as u64,
            ?outcome,
            "Tier consulted"
        );
        outcome
    }

    fn timeout_ms(&self) -> u64 {
        self.tier_timeout.as_millis() as u64
    }
}

/// Builder for [`ClassificationCascade`]
pub struct CascadeBuilder {
    config: RulesetConfig,
    policy: Option<LexicalPolicy>,
    models_dir: Option<Option<PathBuf>>,
    embeddings: Option<SharedEmbeddings>,
    completions: Option<SharedCompletions>,
    custom: Vec<Arc<dyn TierClassifier>>,
    tier_timeout: Duration,
}

impl CascadeBuilder {
    pub fn new(config: RulesetConfig) -> Self {
        Self {
            config,
            policy: None,
            models_dir: None,
            embeddings: None,
            completions: None,
            custom: Vec::new(),
            tier_timeout: DEFAULT_TIER_TIMEOUT,
        }
    }

    /// Override the ruleset's lexical escalation policy
    pub fn lexical_policy(mut self, policy: LexicalPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Enable the statistical tier; `None` keeps the model in memory only
    pub fn with_statistical(mut self, models_dir: Option<PathBuf>) -> Self {
        self.models_dir = Some(models_dir);
        self
    }

    pub fn with_semantic(mut self, provider: SharedEmbeddings) -> Self {
        self.embeddings = Some(provider);
        self
    }

    pub fn with_remote(mut self, provider: SharedCompletions) -> Self {
        self.completions = Some(provider);
        self
    }

    /// Add a custom fallback tier, placed by its [`Tier`]
    pub fn with_tier(mut self, tier: Arc<dyn TierClassifier>) -> Self {
        self.custom.push(tier);
        self
    }

    pub fn tier_timeout(mut self, timeout: Duration) -> Self {
        self.tier_timeout = timeout;
        self
    }

    /// Compile the ruleset; any error here is fatal
    pub fn build(self) -> Result<ClassificationCascade> {
        let config = self.config;
        config.validate()?;
        if self.tier_timeout.is_zero() {
            return Err(Error::config("tier timeout must be positive"));
        }

        let normalizer = Normalizer::new(&config.substitutions)?;
        let gates = Gates::from_config(&config)?;
        let mut lexical = LexicalTier::from_config(&config)?;
        if let Some(policy) = self.policy {
            lexical = lexical.with_policy(policy);
        }

        let mut tiers: Vec<Arc<dyn TierClassifier>> = Vec::new();
        if let Some(models_dir) = self.models_dir {
            tiers.push(Arc::new(StatisticalTier::from_config(&config, models_dir)?));
        }
        if let Some(provider) = self.embeddings {
            tiers.push(Arc::new(SemanticTier::new(&config.semantic, &normalizer, provider)));
        }
        if let Some(provider) = self.completions {
            tiers.push(Arc::new(RemoteTier::from_config(&config, provider)));
        }
        tiers.extend(self.custom);
        tiers.sort_by_key(|t| t.tier());

        if !tiers.is_empty() && lexical.policy() == LexicalPolicy::Decisive {
            debug!("Lexical tier is decisive; fallback tiers will not be consulted");
        }
        info!(
            ruleset = %config.version,
            lexical_policy = ?lexical.policy(),
            tiers = ?tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "Classification cascade ready"
        );

        Ok(ClassificationCascade {
            ruleset_version: config.version,
            normalizer,
            gates,
            lexical,
            tiers,
            tier_timeout: self.tier_timeout,
        })
    }
}
