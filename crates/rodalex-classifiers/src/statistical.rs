//! Statistical tier (Tier B)
//!
//! TF-IDF n-gram features feeding a two-class multinomial Naive Bayes model.
//! The model is trained once from the ruleset's labeled corpus, persisted as
//! a JSON artifact, and reloaded on later startups. An artifact that cannot
//! be read, or that was trained for another ruleset version, is discarded
//! and the model is retrained.

use crate::classifier::TierClassifier;
use crate::config::{RulesetConfig, StatisticalSpec};
use crate::normalizer::Normalizer;
use async_trait::async_trait;
use rodalex_core::{Error, NormalizedQuery, Result, Tier, TierOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// File name of the persisted model inside the models directory
pub const ARTIFACT_FILE: &str = "context_classifier.json";

const MODEL_FORMAT_VERSION: u32 = 1;

/// Default models directory under the user cache dir
pub fn default_models_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("rodalex"))
}

/// Word n-gram TF-IDF vectorizer with smoothed idf and l2 row normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    ngram_max: usize,
    stop_words: BTreeSet<String>,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fit the vocabulary and idf weights, returning the transformed corpus
    pub fn fit_transform(
        docs: &[String],
        ngram_max: usize,
        stop_words: &[String],
        max_features: usize,
    ) -> (Self, Vec<Vec<(usize, f64)>>) {
        let stop_words: BTreeSet<String> = stop_words.iter().map(|w| Normalizer::fold(w)).collect();
        let analyzed: Vec<Vec<String>> = docs
            .iter()
            .map(|doc| analyze(doc, ngram_max, &stop_words))
            .collect();

        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            let mut seen = BTreeSet::new();
            for term in terms {
                *term_freq.entry(term.as_str()).or_default() += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_default() += 1;
                }
            }
        }

        // Keep the most frequent terms, then index them alphabetically
        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);
        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n_docs = docs.len() as f64;
        let vocabulary: BTreeMap<String, usize> = kept
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();
        let idf = kept
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let vectorizer = Self {
            ngram_max,
            stop_words,
            vocabulary,
            idf,
        };
        let rows = analyzed.iter().map(|terms| vectorizer.weigh(terms)).collect();
        (vectorizer, rows)
    }

    /// Sparse, l2-normalized feature vector sorted by feature index
    pub fn transform(&self, text: &str) -> Vec<(usize, f64)> {
        self.weigh(&analyze(text, self.ngram_max, &self.stop_words))
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    fn weigh(&self, terms: &[String]) -> Vec<(usize, f64)> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms {
            if let Some(&idx) = self.vocabulary.get(term) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        let mut row: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|(_, v)| *v /= norm);
        }
        row
    }
}

/// Tokens of two or more word characters, stop words removed, joined into n-grams
fn analyze(text: &str, ngram_max: usize, stop_words: &BTreeSet<String>) -> Vec<String> {
    let tokens: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2 && !stop_words.contains(*t))
        .collect();

    let mut terms = Vec::new();
    for n in 1..=ngram_max {
        terms.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    terms
}

/// Two-class multinomial Naive Bayes; index 0 is out-of-domain, 1 is in-domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayes {
    class_log_prior: [f64; 2],
    feature_log_prob: [Vec<f64>; 2],
}

impl NaiveBayes {
    pub fn fit(
        rows: &[Vec<(usize, f64)>],
        labels: &[bool],
        n_features: usize,
        alpha: f64,
    ) -> Result<Self> {
        let mut class_count = [0usize; 2];
        let mut feature_count = [vec![0.0; n_features], vec![0.0; n_features]];
        for (row, &label) in rows.iter().zip(labels) {
            let class = usize::from(label);
            class_count[class] += 1;
            for &(idx, value) in row {
                feature_count[class][idx] += value;
            }
        }
        if class_count.contains(&0) {
            return Err(Error::classifier_load(
                "training corpus must contain both in-domain and out-of-domain examples",
            ));
        }

        let total = (class_count[0] + class_count[1]) as f64;
        let class_log_prior = class_count.map(|count| (count as f64 / total).ln());
        let feature_log_prob = feature_count.map(|counts| {
            let denominator = counts.iter().sum::<f64>() + alpha * n_features as f64;
            counts
                .iter()
                .map(|c| ((c + alpha) / denominator).ln())
                .collect::<Vec<f64>>()
        });

        Ok(Self {
            class_log_prior,
            feature_log_prob,
        })
    }

    /// Posterior probability of the in-domain class
    pub fn predict_in_domain(&self, row: &[(usize, f64)]) -> f64 {
        let [out, inside] = [0, 1].map(|class| {
            self.class_log_prior[class]
                + row
                    .iter()
                    .map(|&(idx, v)| v * self.feature_log_prob[class][idx])
                    .sum::<f64>()
        });
        let max = out.max(inside);
        let log_norm = max + ((out - max).exp() + (inside - max).exp()).ln();
        (inside - log_norm).exp()
    }
}

/// Persisted statistical model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalModel {
    format_version: u32,
    ruleset_version: String,
    vectorizer: TfidfVectorizer,
    classifier: NaiveBayes,
}

impl StatisticalModel {
    /// Train on the corpus of a statistical spec; examples are normalized first
    pub fn train(
        spec: &StatisticalSpec,
        ruleset_version: &str,
        normalizer: &Normalizer,
    ) -> Result<Self> {
        if spec.examples.is_empty() {
            return Err(Error::classifier_load("statistical training corpus is empty"));
        }
        let docs: Vec<String> = spec
            .examples
            .iter()
            .map(|ex| normalizer.normalize(&ex.text).canonical)
            .collect();
        let labels: Vec<bool> = spec.examples.iter().map(|ex| ex.in_domain).collect();

        let (vectorizer, rows) = TfidfVectorizer::fit_transform(
            &docs,
            spec.ngram_max,
            &spec.stop_words,
            spec.max_features,
        );
        let classifier = NaiveBayes::fit(&rows, &labels, vectorizer.len(), spec.alpha)?;

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            ruleset_version: ruleset_version.to_string(),
            vectorizer,
            classifier,
        })
    }

    /// Posterior probability that a canonical query is in the domain
    pub fn predict(&self, canonical: &str) -> f64 {
        self.classifier
            .predict_in_domain(&self.vectorizer.transform(canonical))
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vectorizer.len()
    }

    /// Read an artifact, rejecting a different format or ruleset version
    pub async fn load(path: &Path, ruleset_version: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::classifier_load(format!("cannot read {}: {e}", path.display()))
        })?;
        let model: Self = serde_json::from_str(&content).map_err(|e| {
            Error::classifier_load(format!("corrupt artifact {}: {e}", path.display()))
        })?;

        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::classifier_load(format!(
                "artifact format {} does not match {MODEL_FORMAT_VERSION}",
                model.format_version
            )));
        }
        if model.ruleset_version != ruleset_version {
            return Err(Error::classifier_load(format!(
                "artifact trained for ruleset '{}', current is '{ruleset_version}'",
                model.ruleset_version
            )));
        }
        let features = model.vectorizer.len();
        if model.vectorizer.idf.len() != features
            || model.classifier.feature_log_prob.iter().any(|p| p.len() != features)
        {
            return Err(Error::classifier_load("artifact feature dimensions disagree"));
        }
        if model.vectorizer.vocabulary.values().any(|&idx| idx >= features) {
            return Err(Error::classifier_load("artifact vocabulary index out of range"));
        }
        Ok(model)
    }

    /// Write the artifact, creating the parent directory if needed
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Statistical tier with a lazily loaded model
pub struct StatisticalTier {
    name: String,
    spec: StatisticalSpec,
    ruleset_version: String,
    normalizer: Normalizer,
    artifact_path: Option<PathBuf>,
    model: OnceCell<StatisticalModel>,
}

impl StatisticalTier {
    /// Create the tier; without a models directory the model is kept in memory only
    pub fn from_config(config: &RulesetConfig, models_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            name: "statistical".to_string(),
            spec: config.statistical.clone(),
            ruleset_version: config.version.clone(),
            normalizer: Normalizer::new(&config.substitutions)?,
            artifact_path: models_dir.map(|dir| dir.join(ARTIFACT_FILE)),
            model: OnceCell::new(),
        })
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    /// The shared model, loaded or trained on first access
    pub async fn model(&self) -> Result<&StatisticalModel> {
        self.model.get_or_try_init(|| self.load_or_train()).await
    }

    /// Train from scratch and overwrite the artifact
    pub async fn retrain(&self) -> Result<StatisticalModel> {
        let model = StatisticalModel::train(&self.spec, &self.ruleset_version, &self.normalizer)?;
        if let Some(path) = &self.artifact_path {
            model.save(path).await?;
            info!(
                path = %path.display(),
                features = model.vocabulary_len(),
                "Statistical model retrained"
            );
        }
        Ok(model)
    }

    async fn load_or_train(&self) -> Result<StatisticalModel> {
        if let Some(path) = &self.artifact_path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                match StatisticalModel::load(path, &self.ruleset_version).await {
                    Ok(model) => {
                        info!(path = %path.display(), "Loaded statistical model");
                        return Ok(model);
                    }
                    Err(e) => {
                        warn!(error = %e, "Discarding statistical artifact, retraining");
                    }
                }
            }
        }

        let model = StatisticalModel::train(&self.spec, &self.ruleset_version, &self.normalizer)?;
        info!(
            examples = self.spec.examples.len(),
            features = model.vocabulary_len(),
            "Trained statistical model"
        );

        if let Some(path) = &self.artifact_path {
            if let Err(e) = model.save(path).await {
                warn!(error = %e, path = %path.display(), "Failed to persist statistical model");
            }
        }
        Ok(model)
    }

    /// Map a posterior probability onto the three-state outcome
    pub fn band(&self, p_in: f64) -> TierOutcome {
        if p_in > self.spec.in_threshold {
            TierOutcome::InDomain {
                confidence: p_in as f32,
            }
        } else if p_in < self.spec.out_threshold {
            TierOutcome::OutOfDomain {
                confidence: (1.0 - p_in) as f32,
            }
        } else {
            TierOutcome::Inconclusive
        }
    }
}

#[async_trait]
impl TierClassifier for StatisticalTier {
    async fn evaluate(&self, query: &NormalizedQuery) -> Result<TierOutcome> {
        let model = self.model().await?;
        let p_in = model.predict(&query.canonical);
        let outcome = self.band(p_in);
        debug!(p_in, ?outcome, "Statistical tier evaluated query");
        Ok(outcome)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        Tier::Statistical
    }

    async fn warm_up(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }
}
