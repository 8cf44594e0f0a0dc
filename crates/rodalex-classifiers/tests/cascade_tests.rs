//! Cascade integration tests
//!
//! End-to-end behavior of the gatekeeper: gates, lexical decisions, fallback
//! ordering, failure and timeout handling, and statistical persistence.


use mock_providers::{MockCompletions, MockEmbeddings, MockTier};
use proptest::prelude::*;
use rodalex_classifiers::{
    ClassificationCascade, DisabledCompletions, DisabledEmbeddings, LexicalPolicy, RulesetConfig,
    ARTIFACT_FILE,
};
use rodalex_core::{SessionContext, Tier, TierOutcome, OUT_OF_DOMAIN_MESSAGE};
use std::sync::Arc;
use std::time::Duration;

fn ruleset() -> RulesetConfig {
    RulesetConfig::embedded().expect("embedded ruleset")
}

fn lexical_only() -> ClassificationCascade {
    ClassificationCascade::from_config(ruleset()).unwrap()
}

#[tokio::test]
async fn test_e2e_dialect_query_accepted_lexically() {
    let cascade = lexical_only();
    let result = cascade
        .classify("me pararon los verdes en la tranca por exceso de velocidad")
        .await;

    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Lexical);
    assert!(result.confidence > 0.6);
    assert!(result.breakdown.patterns.iter().any(|p| p.term == "checkpoint"));
    assert_eq!(
        cascade
            .normalize("me pararon los verdes en la tranca")
            .canonical,
        "me pararon los policias en la control"
    );
}

#[tokio::test]
async fn test_e2e_greeting_rejected_by_length_gate() {
    let result = lexical_only().classify("hola").await;
    assert!(!result.in_domain);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.decided_at, Tier::LengthGate);
    assert_eq!(result.fallback_message(), Some(OUT_OF_DOMAIN_MESSAGE));
}

#[tokio::test]
async fn test_e2e_creation_intent_rejected() {
    let result = lexical_only()
        .classify("quiero crear un sistema de multas de transito")
        .await;
    assert!(!result.in_domain);
    assert!(result.score < 0.0);
    assert_eq!(result.decided_at, Tier::Lexical);
    let adjustment = result.breakdown.adjustment.as_ref().unwrap();
    assert_eq!(adjustment.rule, "creation_intent");
}

#[tokio::test]
async fn test_override_ignores_negative_terms() {
    let cascade = lexical_only();
    for text in [
        "que pasa si no tengo licencia",
        "Qué pasa si no tengo licencia de programación para mi software",
    ] {
        let result = cascade.classify(text).await;
        assert!(result.in_domain, "{text}");
        assert_eq!(result.score, 10.0);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.decided_at, Tier::Override);
    }
}

#[tokio::test]
async fn test_length_gate_applies_to_domain_words() {
    let result = lexical_only().classify("multa de transito").await;
    assert!(!result.in_domain);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.decided_at, Tier::LengthGate);
}

#[tokio::test]
async fn test_negative_terms_dominate() {
    let cascade = lexical_only();

    // Three tokens: rejected before scoring
    let short = cascade.classify("quiero aprender programacion").await;
    assert!(!short.in_domain);

    let result = cascade.classify("quiero aprender programacion web").await;
    assert!(!result.in_domain);
    assert!(result.score < 0.0);
    assert_eq!(result.decided_at, Tier::Lexical);
}

#[tokio::test]
async fn test_classify_is_idempotent() {
    let cascade = lexical_only();
    let q = "el tombo me pidio coima en el segundo anillo de santa cruz";
    let first = cascade.classify(q).await;
    let second = cascade.classify(q).await;
    assert_eq!(first.in_domain, second.in_domain);
    assert_eq!(first.score, second.score);
    assert_eq!(first.breakdown, second.breakdown);
}

#[tokio::test]
async fn test_remote_failure_fails_open() {
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_semantic(Arc::new(DisabledEmbeddings))
        .with_remote(Arc::new(DisabledCompletions))
        .build()
        .unwrap();

    let result = cascade.classify("como preparo un buen majadito cruceno").await;
    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Remote);
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn test_exhausted_cascade_fails_closed() {
    let inconclusive = Arc::new(MockTier::new("undecided", Tier::Statistical));
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_tier(inconclusive.clone())
        .build()
        .unwrap();

    let result = cascade.classify("me pusieron una multa ayer").await;
    assert!(!result.in_domain);
    assert_eq!(result.decided_at, Tier::Exhausted);
    assert_eq!(inconclusive.call_count(), 1);
    // The lexical score is still reported
    assert!(result.score > 0.0);
}

#[tokio::test]
async fn test_first_conclusive_tier_short_circuits() {
    let statistical = Arc::new(
        MockTier::new("stat", Tier::Statistical)
            .with_outcome(TierOutcome::OutOfDomain { confidence: 0.75 }),
    );
    let semantic = Arc::new(
        MockTier::new("sem", Tier::Semantic)
            .with_outcome(TierOutcome::InDomain { confidence: 0.9 }),
    );
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_tier(semantic.clone())
        .with_tier(statistical.clone())
        .build()
        .unwrap();

    let result = cascade.classify("me pusieron una multa ayer").await;
    assert!(!result.in_domain);
    assert_eq!(result.decided_at, Tier::Statistical);
    assert_eq!(result.confidence, 0.75);
    assert_eq!(statistical.call_count(), 1);
    assert_eq!(semantic.call_count(), 0);
}

#[tokio::test]
async fn test_tier_error_falls_through() {
    let broken = Arc::new(MockTier::new("stat", Tier::Statistical).failing());
    let semantic = Arc::new(
        MockTier::new("sem", Tier::Semantic)
            .with_outcome(TierOutcome::InDomain { confidence: 0.8 }),
    );
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_tier(broken.clone())
        .with_tier(semantic)
        .build()
        .unwrap();

    let result = cascade.classify("me pusieron una multa ayer").await;
    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Semantic);
    assert_eq!(broken.call_count(), 1);
}

#[tokio::test]
async fn test_timeout_treated_as_failure() {
    let slow = Arc::new(
        MockTier::new("slow-stat", Tier::Statistical)
            .with_outcome(TierOutcome::InDomain { confidence: 0.9 })
            .with_latency(Duration::from_millis(500)),
    );
    let semantic = Arc::new(
        MockTier::new("sem", Tier::Semantic)
            .with_outcome(TierOutcome::OutOfDomain { confidence: 0.6 }),
    );
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_tier(slow.clone())
        .with_tier(semantic)
        .tier_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let result = cascade.classify("me pusieron una multa ayer").await;
    assert!(!result.in_domain);
    assert_eq!(result.decided_at, Tier::Semantic);
    assert_eq!(slow.call_count(), 1);
}

#[tokio::test]
async fn test_remote_timeout_fails_open() {
    let remote = Arc::new(MockCompletions::replying("NO").with_latency(Duration::from_millis(500)));
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_remote(remote.clone())
        .tier_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let result = cascade.classify("como preparo un buen majadito cruceno").await;
    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Remote);
    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn test_remote_rejection() {
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_remote(Arc::new(MockCompletions::replying("NO")))
        .build()
        .unwrap();

    let result = cascade.classify("como preparo un buen majadito cruceno").await;
    assert!(!result.in_domain);
    assert_eq!(result.decided_at, Tier::Remote);
    assert_eq!(result.fallback_message(), Some(OUT_OF_DOMAIN_MESSAGE));
}

#[tokio::test]
async fn test_semantic_tier_with_embeddings() {
    let embeddings = Arc::new(MockEmbeddings::new());
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_semantic(embeddings.clone())
        .build()
        .unwrap();

    let inside = cascade.classify("me pusieron una multa de transito").await;
    assert!(inside.in_domain);
    assert_eq!(inside.decided_at, Tier::Semantic);

    let outside = cascade.classify("como preparo una receta de majadito").await;
    assert!(!outside.in_domain);
    assert_eq!(outside.decided_at, Tier::Semantic);

    // Six reference queries embedded once, then one call per query
    assert_eq!(embeddings.call_count(), 6 + 2);
}

#[tokio::test]
async fn test_unreachable_semantic_provider_escalates() {
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_semantic(Arc::new(MockEmbeddings::new().failing()))
        .with_remote(Arc::new(MockCompletions::replying("SI")))
        .build()
        .unwrap();

    let result = cascade.classify("me pusieron una multa de transito").await;
    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Remote);
    assert_eq!(result.confidence, 1.0);
}

#[tokio::test]
async fn test_withhold_without_evidence_escalates_only_empty_scores() {
    let remote = Arc::new(MockCompletions::replying("NO"));
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::WithholdWithoutEvidence)
        .with_remote(remote.clone())
        .build()
        .unwrap();

    let lexical = cascade.classify("me multaron por exceso de velocidad").await;
    assert_eq!(lexical.decided_at, Tier::Lexical);
    assert_eq!(remote.call_count(), 0);

    let escalated = cascade.classify("cual es la capital de francia").await;
    assert!(!escalated.in_domain);
    assert_eq!(escalated.decided_at, Tier::Remote);
    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn test_statistical_tier_trains_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let cascade = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_statistical(Some(dir.path().to_path_buf()))
        .build()
        .unwrap();
    assert!(cascade.warm_up().await.is_empty());
    assert!(dir.path().join(ARTIFACT_FILE).exists());

    let result = cascade.classify("me pararon por exceso de velocidad").await;
    assert!(result.in_domain);
    assert_eq!(result.decided_at, Tier::Statistical);
    assert!(result.confidence > 0.6);

    // A second cascade reloads the same artifact
    let reloaded = ClassificationCascade::builder(ruleset())
        .lexical_policy(LexicalPolicy::Withheld)
        .with_statistical(Some(dir.path().to_path_buf()))
        .build()
        .unwrap();
    let again = reloaded.classify("me pararon por exceso de velocidad").await;
    assert_eq!(again.decided_at, Tier::Statistical);
    assert!((again.confidence - result.confidence).abs() < 1e-5);
}

#[tokio::test]
async fn test_warm_up_reports_failures() {
    let cascade = ClassificationCascade::builder(ruleset())
        .with_semantic(Arc::new(DisabledEmbeddings))
        .with_statistical(None)
        .build()
        .unwrap();
    let failures = cascade.warm_up().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "semantic:disabled");
}

#[tokio::test]
async fn test_session_smoothing_across_turns() {
    let cascade = lexical_only();
    let mut session = SessionContext::default();

    let first = cascade
        .classify_turn("me pararon en la tranca por exceso de velocidad", &mut session)
        .await;
    assert!(first.in_domain);

    let follow_up = cascade
        .classify_with_session("y si no pago a tiempo que pasa", &session)
        .await;
    let standalone = cascade.classify("y si no pago a tiempo que pasa").await;

    assert_eq!(follow_up.breakdown.smoothing, 1.0);
    assert_eq!(follow_up.score, standalone.score + 1.0);
    assert!(follow_up.confidence > standalone.confidence);
}

#[tokio::test]
async fn test_negative_session_is_bounded() {
    let cascade = lexical_only();
    let mut session = SessionContext::default();
    for text in [
        "quiero aprender programacion web",
        "curso de programacion y software en la universidad",
    ] {
        cascade.classify_turn(text, &mut session).await;
    }
    let result = cascade
        .classify_with_session("me multaron por exceso de velocidad", &session)
        .await;
    assert_eq!(result.breakdown.smoothing, -1.0);
    assert!(result.in_domain);
}

const POSITIVE_PHRASES: &[&str] = &[
    "por exceso de velocidad",
    "con licencia vencida",
    "en la caminera",
    "con vidrios polarizados",
    "sin papeles",
    "en el cuarto anillo",
    "en doble fila",
    "y me quitaron la licencia",
];

#[tokio::test]
async fn test_creation_intent_fires_once_a_domain_keyword_appears() {
    let cascade = lexical_only();
    let base = "quiero crear un sistema para trufi en montero";

    let before = cascade.classify(base).await;
    assert!(before.in_domain);
    assert_eq!(before.score, 2.0);
    assert!(before.breakdown.adjustment.is_none());

    // "velocidad" is the first domain keyword, which arms the creation-intent rule
    let after = cascade
        .classify(&format!("{base} por exceso de velocidad"))
        .await;
    assert!(!after.in_domain);
    assert_eq!(after.breakdown.raw_score(), 7.0);
    let adjustment = after.breakdown.adjustment.as_ref().unwrap();
    assert_eq!(adjustment.rule, "creation_intent");
    assert!((adjustment.delta + 12.6).abs() < 1e-4);
    assert!((after.score + 5.6).abs() < 1e-4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_positive_phrase_never_lowers_score_under_same_rule(
        base in prop::sample::select(vec![
            "me pusieron una multa en santa cruz",
            "me pararon los verdes en la tranca",
            "el oficial de transito me detuvo",
            "quiero crear un sistema para trufi en montero",
            "voy a crear una app para el trufi de la caminera",
        ]),
        extra in prop::sample::select(POSITIVE_PHRASES.to_vec()),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cascade = lexical_only();
        let (before, after) = runtime.block_on(async {
            let before = cascade.classify(base).await;
            let after = cascade.classify(&format!("{base} {extra}")).await;
            (before, after)
        });
        prop_assert!(before.in_domain);
        prop_assert!(after.breakdown.raw_score() >= before.breakdown.raw_score());

        let rule = |r: &rodalex_core::ClassificationResult| {
            r.breakdown.adjustment.as_ref().map(|a| (a.rule.clone(), a.multiplier))
        };
        let (rule_before, rule_after) = (rule(&before), rule(&after));
        match (&rule_before, &rule_after) {
            (None, None) => prop_assert!(after.score >= before.score),
            (Some((a, m)), Some((b, _))) if a == b => {
                // Same multiplier on a larger raw score
                prop_assert!(after.score * m.signum() >= before.score * m.signum() - 1e-4);
            }
            _ => {
                // Only the first domain keyword can arm a rule
                prop_assert!(rule_before.is_none());
                prop_assert_eq!(
                    rule_after.map(|(name, _)| name),
                    Some("creation_intent".to_string())
                );
            }
        }
    }

    #[test]
    fn prop_classification_is_deterministic(
        words in prop::collection::vec("[a-z]{2,9}", 0..10),
        slang in prop::sample::select(vec!["tombo", "tranca", "brevete", "coima", "trufi", ""]),
    ) {
        let text = format!("{} {slang}", words.join(" "));
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let cascade = lexical_only();
        let (a, b) = runtime.block_on(async {
            (cascade.classify(&text).await, cascade.classify(&text).await)
        });
        prop_assert_eq!(a.in_domain, b.in_domain);
        prop_assert_eq!(a.score, b.score);
        prop_assert!((0.0..=1.0).contains(&a.confidence));
    }
}
