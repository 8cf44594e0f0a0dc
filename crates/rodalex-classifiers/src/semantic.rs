//! Semantic tier (Tier C): embedding similarity to reference queries

use crate::classifier::TierClassifier;
use crate::config::{RulesetConfig, SemanticSpec};
use crate::normalizer::Normalizer;
use crate::providers::SharedEmbeddings;
use async_trait::async_trait;
use rodalex_core::{Error, NormalizedQuery, Result, Tier, TierOutcome};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Cosine similarity; zero when either vector has no magnitude or the dimensions differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct SemanticTier {
    name: String,
    reference_queries: Vec<String>,
    threshold: f32,
    provider: SharedEmbeddings,
    reference_embeddings: OnceCell<Vec<Vec<f32>>>,
}

impl SemanticTier {
    pub fn new(spec: &SemanticSpec, normalizer: &Normalizer, provider: SharedEmbeddings) -> Self {
        Self {
            name: format!("semantic:{}", provider.model_name()),
            reference_queries: spec
                .references
                .iter()
                .map(|r| normalizer.normalize(r).canonical)
                .collect(),
            threshold: spec.threshold,
            provider,
            reference_embeddings: OnceCell::new(),
        }
    }

    pub fn from_config(config: &RulesetConfig, provider: SharedEmbeddings) -> Result<Self> {
        let normalizer = Normalizer::new(&config.substitutions)?;
        Ok(Self::new(&config.semantic, &normalizer, provider))
    }

    async fn references(&self) -> Result<&Vec<Vec<f32>>> {
        self.reference_embeddings
            .get_or_try_init(|| async {
                if self.reference_queries.is_empty() {
                    return Err(Error::config("semantic tier has no reference queries"));
                }
                let mut embeddings = Vec::with_capacity(self.reference_queries.len());
                for reference in &self.reference_queries {
                    embeddings.push(self.provider.embed(reference).await?);
                }
                info!(
                    count = embeddings.len(),
                    model = self.provider.model_name(),
                    "Embedded semantic reference queries"
                );
                Ok(embeddings)
            })
            .await
    }
}

#[async_trait]
impl TierClassifier for SemanticTier {
    async fn evaluate(&self, query: &NormalizedQuery) -> Result<TierOutcome> {
        let references = self.references().await?;
        let embedding = self.provider.embed(&query.canonical).await?;

        let similarity = references
            .iter()
            .map(|r| cosine_similarity(&embedding, r))
            .fold(f32::MIN, f32::max);
        debug!(similarity, threshold = self.threshold, "Semantic tier evaluated query");

        let confidence = similarity.clamp(0.0, 1.0);
        Ok(if similarity > self.threshold {
            TierOutcome::InDomain { confidence }
        } else {
            TierOutcome::OutOfDomain {
                confidence: 1.0 - confidence,
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        Tier::Semantic
    }

    async fn warm_up(&self) -> Result<()> {
        self.references().await.map(|_| ())
    }
}
