//! Tier classifier trait

use async_trait::async_trait;
use rodalex_core::{NormalizedQuery, Result, Tier, TierOutcome};

/// A fallback tier consulted after the lexical tier withholds its decision
#[async_trait]
pub trait TierClassifier: Send + Sync {
    /// Classify the given query
    async fn evaluate(&self, query: &NormalizedQuery) -> Result<TierOutcome>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Get the cascade position
    fn tier(&self) -> Tier;

    /// Outcome used when `evaluate` errors or times out
    fn failure_outcome(&self) -> TierOutcome {
        TierOutcome::Inconclusive
    }

    /// Initialize lazily-loaded state ahead of the first query
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
