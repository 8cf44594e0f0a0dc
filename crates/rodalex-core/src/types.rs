//! Core types for Rodalex

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

/// Message shown downstream when a query is rejected
pub const OUT_OF_DOMAIN_MESSAGE: &str =
    "Como tu amigo legal no tengo ese conocimiento esta fuera de mi contexto.";

/// Lexicon category a term belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Vocabulary that only appears in the target region's traffic context
    RegionalHigh,
    /// Idiomatic expressions, in their canonical (post-substitution) form
    Idiom,
    /// Places, roads, municipalities
    Geography,
    /// Single domain words
    DomainKeyword,
    /// Multi-word domain expressions
    DomainPhrase,
    /// Vocabulary of unrelated domains; subtracts
    Negative,
}

impl Category {
    /// All categories in scoring order
    pub const ALL: [Category; 6] = [
        Self::RegionalHigh,
        Self::Idiom,
        Self::Geography,
        Self::DomainKeyword,
        Self::DomainPhrase,
        Self::Negative,
    ];

    /// Get a human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::RegionalHigh => "regional_high",
            Self::Idiom => "idiom",
            Self::Geography => "geography",
            Self::DomainKeyword => "domain_keyword",
            Self::DomainPhrase => "domain_phrase",
            Self::Negative => "negative",
        }
    }

    /// Signed contribution of a configured weight in this category
    pub fn contribution(&self, weight: i32) -> i32 {
        match self {
            Self::Negative => -weight.abs(),
            _ => weight,
        }
    }

    /// Whether matches in this category count as region-specific evidence
    pub fn is_region_specific(&self) -> bool {
        matches!(self, Self::RegionalHigh | Self::Idiom)
    }
}

/// A query after canonicalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    /// Text as received
    pub original: String,

    /// Lowercased, diacritic-free, whitespace-collapsed, idioms rewritten
    pub canonical: String,
}

impl NormalizedQuery {
    /// Number of whitespace-delimited tokens in the canonical text
    pub fn token_count(&self) -> usize {
        self.canonical.split_whitespace().count()
    }
}

/// One matched term and its signed contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMatch {
    /// Term, pattern label or plural variant that matched
    pub term: String,

    /// Signed contribution to the score
    pub weight: i32,
}

/// The single false-positive correction applied to a lexical score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    /// Rule name
    pub rule: String,

    /// Multiplier the rule applies to the lexical score
    pub multiplier: f32,

    /// Additive form of the correction: `score * multiplier - score`
    pub delta: f32,
}

/// Per-category diagnostic record of how a score was built
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Lexicon matches by category, in match order
    pub categories: BTreeMap<Category, Vec<TermMatch>>,

    /// Idiomatic regex pattern hits
    pub patterns: Vec<TermMatch>,

    /// False-positive correction, if any rule fired
    pub adjustment: Option<Adjustment>,

    /// Bounded bias contributed by the caller's session context
    pub smoothing: f32,
}

impl ScoreBreakdown {
    /// Record a lexicon match
    pub fn record(&mut self, category: Category, term: impl Into<String>, weight: i32) {
        self.categories.entry(category).or_default().push(TermMatch {
            term: term.into(),
            weight,
        });
    }

    /// Record an idiomatic pattern hit
    pub fn record_pattern(&mut self, label: impl Into<String>, weight: i32) {
        self.patterns.push(TermMatch {
            term: label.into(),
            weight,
        });
    }

    /// Matches recorded for one category
    pub fn matches(&self, category: Category) -> &[TermMatch] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of matches recorded for one category
    pub fn count(&self, category: Category) -> usize {
        self.matches(category).len()
    }

    /// Number of region-specific matches (regional vocabulary and idioms)
    pub fn region_specific_count(&self) -> usize {
        Category::ALL
            .iter()
            .filter(|c| c.is_region_specific())
            .map(|c| self.count(*c))
            .sum()
    }

    /// Whether anything at all matched
    pub fn has_evidence(&self) -> bool {
        !self.patterns.is_empty() || self.categories.values().any(|m| !m.is_empty())
    }

    /// Sum of lexicon and pattern contributions, before any correction
    pub fn raw_score(&self) -> f32 {
        let lexicon: i32 = self
            .categories
            .values()
            .flat_map(|m| m.iter().map(|t| t.weight))
            .sum();
        let patterns: i32 = self.patterns.iter().map(|t| t.weight).sum();
        (lexicon + patterns) as f32
    }

    /// Aggregate score: raw contributions, correction and session smoothing
    pub fn total(&self) -> f32 {
        let delta = self.adjustment.as_ref().map_or(0.0, |a| a.delta);
        self.raw_score() + delta + self.smoothing
    }

    /// Human-readable summary of every contribution
    pub fn diagnosis(&self) -> String {
        let mut out = String::new();
        for (category, matches) in &self.categories {
            if matches.is_empty() {
                continue;
            }
            let _ = write!(out, "{}: {}; ", category.label(), render(matches));
        }
        if !self.patterns.is_empty() {
            let _ = write!(out, "patterns: {}; ", render(&self.patterns));
        }
        if let Some(adj) = &self.adjustment {
            let _ = write!(
                out,
                "adjustment: {} x{:.1} ({:+.1}); ",
                adj.rule, adj.multiplier, adj.delta
            );
        }
        if self.smoothing != 0.0 {
            let _ = write!(out, "session: {:+.2}; ", self.smoothing);
        }
        let _ = write!(out, "total: {:.2}", self.total());
        out
    }
}

fn render(matches: &[TermMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("{}({:+})", m.term, m.weight))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cascade stage that produced a decision, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Matched a basic-question override template
    Override,
    /// Rejected for being too short
    LengthGate,
    /// Weighted lexicon, patterns and false-positive correction
    Lexical,
    /// Trained TF-IDF / Naive Bayes model
    Statistical,
    /// Embedding similarity to reference queries
    Semantic,
    /// Remote completion model
    Remote,
    /// No tier was conclusive; failed closed
    Exhausted,
}

impl Tier {
    /// Get a human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::LengthGate => "length_gate",
            Self::Lexical => "lexical",
            Self::Statistical => "statistical",
            Self::Semantic => "semantic",
            Self::Remote => "remote",
            Self::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of a single cascade tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TierOutcome {
    /// Query belongs to the domain
    InDomain { confidence: f32 },
    /// Query is outside the domain
    OutOfDomain { confidence: f32 },
    /// Tier cannot decide; escalate
    Inconclusive,
}

impl TierOutcome {
    /// Whether this outcome ends the cascade
    pub fn is_conclusive(&self) -> bool {
        !matches!(self, Self::Inconclusive)
    }

    /// The decision, if any
    pub fn in_domain(&self) -> Option<bool> {
        match self {
            Self::InDomain { .. } => Some(true),
            Self::OutOfDomain { .. } => Some(false),
            Self::Inconclusive => None,
        }
    }

    /// Confidence attached to a conclusive outcome
    pub fn confidence(&self) -> f32 {
        match self {
            Self::InDomain { confidence } | Self::OutOfDomain { confidence } => *confidence,
            Self::Inconclusive => 0.0,
        }
    }
}

/// Final decision returned by the gatekeeper
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    /// Whether the query may reach the generation pipeline
    pub in_domain: bool,

    /// Lexical score (0 when decided before scoring)
    pub score: f32,

    /// Confidence in the decision (0.0-1.0)
    pub confidence: f32,

    /// Tier that produced the decision
    pub decided_at: Tier,

    /// Diagnostic trail; never forwarded downstream
    pub breakdown: ScoreBreakdown,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(in_domain: bool, score: f32, confidence: f32, decided_at: Tier) -> Self {
        Self {
            in_domain,
            score,
            confidence: confidence.clamp(0.0, 1.0),
            decided_at,
            breakdown: ScoreBreakdown::default(),
            latency_us: 0,
        }
    }

    /// Fail-closed default used when the cascade cannot produce an answer
    pub fn fail_closed() -> Self {
        Self::new(false, 0.0, 0.0, Tier::Exhausted)
    }

    /// Attach a breakdown
    pub fn with_breakdown(mut self, breakdown: ScoreBreakdown) -> Self {
        self.breakdown = breakdown;
        self
    }

    /// Message for the downstream caller when the query is rejected
    pub fn fallback_message(&self) -> Option<&'static str> {
        (!self.in_domain).then_some(OUT_OF_DOMAIN_MESSAGE)
    }
}

/// Caller-owned record of prior-turn scores within one conversation
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    recent_scores: VecDeque<f32>,
    capacity: usize,
}

impl SessionContext {
    /// Create an empty context keeping at most `capacity` scores
    pub fn new(capacity: usize) -> Self {
        Self {
            recent_scores: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Remember the score of a completed turn, evicting the oldest
    pub fn push(&mut self, score: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.recent_scores.len() == self.capacity {
            self.recent_scores.pop_front();
        }
        self.recent_scores.push_back(score);
    }

    /// Mean of remembered scores, if any
    pub fn mean(&self) -> Option<f32> {
        if self.recent_scores.is_empty() {
            return None;
        }
        Some(self.recent_scores.iter().sum::<f32>() / self.recent_scores.len() as f32)
    }

    /// Whether no turns are recorded
    pub fn is_empty(&self) -> bool {
        self.recent_scores.is_empty()
    }

    /// Number of remembered turns
    pub fn len(&self) -> usize {
        self.recent_scores.len()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(3)
    }
}
