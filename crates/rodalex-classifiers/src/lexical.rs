//! Lexical tier (Tier A)
//!
//! Combines lexicon scoring, idiomatic patterns, the false-positive
//! correction and optional session smoothing into a single decision.

use crate::confidence::ConfidenceEstimator;
use crate::config::{LexicalPolicy, RulesetConfig, SessionSpec};
use crate::false_positive::FalsePositiveAdjuster;
use crate::lexicon::Lexicon;
use crate::patterns::IdiomPatterns;
use rodalex_core::{NormalizedQuery, Result, ScoreBreakdown, SessionContext, TierOutcome};
use tracing::debug;

/// Scored result of the lexical tier
#[derive(Debug, Clone)]
pub struct LexicalVerdict {
    /// Decision, or `Inconclusive` when the policy withholds it
    pub outcome: TierOutcome,

    /// Final score after correction and smoothing
    pub score: f32,

    pub breakdown: ScoreBreakdown,
}

pub struct LexicalTier {
    lexicon: Lexicon,
    patterns: IdiomPatterns,
    adjuster: FalsePositiveAdjuster,
    estimator: ConfidenceEstimator,
    session: SessionSpec,
    policy: LexicalPolicy,
}

impl LexicalTier {
    pub fn from_config(config: &RulesetConfig) -> Result<Self> {
        Ok(Self {
            lexicon: Lexicon::from_config(config)?,
            patterns: IdiomPatterns::new(&config.patterns)?,
            adjuster: FalsePositiveAdjuster::from_config(config)?,
            estimator: ConfidenceEstimator::from_config(config),
            session: config.session.clone(),
            policy: config.lexical_policy,
        })
    }

    /// Override the escalation policy
    pub fn with_policy(mut self, policy: LexicalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> LexicalPolicy {
        self.policy
    }

    /// Score a query
    ///
    /// The false-positive rule sees the raw lexicon and pattern score;
    /// session smoothing is added afterwards and bounded by the configured cap.
    pub fn evaluate(
        &self,
        query: &NormalizedQuery,
        session: Option<&SessionContext>,
    ) -> LexicalVerdict {
        let mut breakdown = ScoreBreakdown::default();
        self.lexicon.score(&query.canonical, &mut breakdown);
        self.patterns.score(&query.canonical, &mut breakdown);

        let raw = breakdown.raw_score();
        breakdown.adjustment = self.adjuster.adjust(&query.canonical, raw, &breakdown);
        breakdown.smoothing = session
            .and_then(SessionContext::mean)
            .map_or(0.0, |mean| self.smoothing(mean));

        let score = breakdown.total();
        let (in_domain, confidence) = self.estimator.estimate(score);

        let withheld = match self.policy {
            LexicalPolicy::Decisive => false,
            LexicalPolicy::WithholdWithoutEvidence => !breakdown.has_evidence(),
            LexicalPolicy::Withheld => true,
        };
        let outcome = if withheld {
            TierOutcome::Inconclusive
        } else if in_domain {
            TierOutcome::InDomain { confidence }
        } else {
            TierOutcome::OutOfDomain { confidence }
        };

        debug!(
            score,
            confidence,
            withheld,
            diagnosis = %breakdown.diagnosis(),
            "Lexical tier scored query"
        );

        LexicalVerdict {
            outcome,
            score,
            breakdown,
        }
    }

    fn smoothing(&self, mean: f32) -> f32 {
        let cap = self.session.cap;
        (mean * self.session.weight).clamp(-cap, cap)
    }
}
