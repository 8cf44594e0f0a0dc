//! Remote tier: yes/no classification by a completion model
//!
//! This is the last tier, and it fails open. A provider error, a timeout or
//! an unparseable reply all accept the query.

use crate::classifier::TierClassifier;
use crate::config::{RemoteSpec, RulesetConfig};
use crate::normalizer::Normalizer;
use crate::providers::SharedCompletions;
use async_trait::async_trait;
use rodalex_core::{NormalizedQuery, Result, Tier, TierOutcome};
use tracing::{debug, warn};

const AFFIRMATIVE: &[&str] = &["si", "yes"];
const NEGATIVE: &[&str] = &["no"];

/// Interpret a completion as a yes/no answer
pub fn parse_reply(reply: &str) -> Option<bool> {
    let folded = Normalizer::fold(reply);
    let first = folded
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())?;
    if AFFIRMATIVE.contains(&first) {
        Some(true)
    } else if NEGATIVE.contains(&first) {
        Some(false)
    } else {
        None
    }
}

pub struct RemoteTier {
    name: String,
    spec: RemoteSpec,
    provider: SharedCompletions,
}

impl RemoteTier {
    pub fn new(spec: RemoteSpec, provider: SharedCompletions) -> Self {
        Self {
            name: format!("remote:{}", provider.model_name()),
            spec,
            provider,
        }
    }

    pub fn from_config(config: &RulesetConfig, provider: SharedCompletions) -> Self {
        Self::new(config.remote.clone(), provider)
    }

    /// The prompt sent for a query
    pub fn prompt(&self, query: &NormalizedQuery) -> String {
        self.spec.prompt.replace("{query}", &query.original)
    }
}

#[async_trait]
impl TierClassifier for RemoteTier {
    async fn evaluate(&self, query: &NormalizedQuery) -> Result<TierOutcome> {
        let reply = self
            .provider
            .complete(&self.prompt(query), self.spec.temperature, self.spec.max_tokens)
            .await?;

        let outcome = match parse_reply(&reply) {
            Some(true) => TierOutcome::InDomain { confidence: 1.0 },
            Some(false) => TierOutcome::OutOfDomain { confidence: 1.0 },
            None => {
                warn!(reply = %reply.trim(), "Ambiguous remote reply, failing open");
                self.failure_outcome()
            }
        };
        debug!(?outcome, "Remote tier evaluated query");
        Ok(outcome)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        Tier::Remote
    }

    fn failure_outcome(&self) -> TierOutcome {
        TierOutcome::InDomain { confidence: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionProvider, DisabledCompletions};
    use rodalex_core::Error;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<(String, f32, u32)>>,
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn complete(
            &self,
            prompt: &str,
            temperature: f32,
            max_tokens: u32,
        ) -> Result<String> {
            self.prompts
                .lock()
                .map_err(|_| Error::internal("poisoned"))?
                .push((prompt.to_string(), temperature, max_tokens));
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn scripted(reply: &str) -> Arc<Scripted> {
        Arc::new(Scripted {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn query(text: &str) -> NormalizedQuery {
        Normalizer::plain().normalize(text)
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply("SI"), Some(true));
        assert_eq!(parse_reply("  Sí, está relacionada."), Some(true));
        assert_eq!(parse_reply("yes"), Some(true));
        assert_eq!(parse_reply("NO."), Some(false));
        assert_eq!(parse_reply("No lo está"), Some(false));
        assert_eq!(parse_reply("Tal vez"), None);
        assert_eq!(parse_reply(""), None);
    }

    #[tokio::test]
    async fn test_prompt_carries_original_query() {
        let provider = scripted("NO");
        let config = RulesetConfig::embedded().unwrap();
        let tier = RemoteTier::from_config(&config, provider.clone());

        let outcome = tier.evaluate(&query("¿Cómo cocino un majadito?")).await.unwrap();
        assert_eq!(outcome, TierOutcome::OutOfDomain { confidence: 1.0 });

        let prompts = provider.prompts.lock().unwrap();
        let (prompt, temperature, max_tokens) = &prompts[0];
        assert!(prompt.contains("Consulta: ¿Cómo cocino un majadito?"));
        assert_eq!(*temperature, 0.0);
        assert_eq!(*max_tokens, 50);
    }

    #[tokio::test]
    async fn test_ambiguous_reply_fails_open() {
        let config = RulesetConfig::embedded().unwrap();
        let tier = RemoteTier::from_config(&config, scripted("No estoy seguro, depende"));
        // Only the first word counts
        assert!(matches!(
            tier.evaluate(&query("algo")).await.unwrap(),
            TierOutcome::OutOfDomain { .. }
        ));

        let tier = RemoteTier::from_config(&config, scripted("Depende del caso"));
        assert_eq!(
            tier.evaluate(&query("algo")).await.unwrap(),
            TierOutcome::InDomain { confidence: 0.0 }
        );
    }

    #[tokio::test]
    async fn test_provider_error_propagates_with_open_fallback() {
        let config = RulesetConfig::embedded().unwrap();
        let tier = RemoteTier::from_config(&config, Arc::new(DisabledCompletions));
        assert!(tier.evaluate(&query("algo")).await.is_err());
        assert_eq!(tier.failure_outcome(), TierOutcome::InDomain { confidence: 0.0 });
    }
}
