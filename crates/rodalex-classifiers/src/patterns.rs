//! Pattern gates and idiomatic pattern scoring (Tier A)
//!
//! [`Gates`] run before any scoring: an override template forces acceptance,
//! and queries shorter than the minimum token count are rejected.
//! [`IdiomPatterns`] contribute to the lexical score; every pattern is tested
//! independently.

use crate::config::{PatternSpec, RulesetConfig};
use regex::{Regex, RegexSet};
use rodalex_core::{Error, NormalizedQuery, Result, ScoreBreakdown};

/// Result of a gate that short-circuits the cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Matched a basic-question template
    Override { score: f32, confidence: f32 },
    /// Fewer tokens than the minimum
    TooShort { tokens: usize },
}

/// Override templates and the minimum-length gate
#[derive(Debug, Clone)]
pub struct Gates {
    overrides: RegexSet,
    override_score: f32,
    override_confidence: f32,
    min_tokens: usize,
}

impl Gates {
    pub fn new(
        templates: &[String],
        override_score: f32,
        override_confidence: f32,
        min_tokens: usize,
    ) -> Result<Self> {
        let overrides = RegexSet::new(templates)
            .map_err(|e| Error::lexicon(format!("Failed to build override templates: {e}")))?;
        Ok(Self {
            overrides,
            override_score,
            override_confidence,
            min_tokens,
        })
    }

    pub fn from_config(config: &RulesetConfig) -> Result<Self> {
        Self::new(
            &config.overrides.templates,
            config.overrides.score,
            config.overrides.confidence,
            config.min_tokens,
        )
    }

    /// Evaluate the override check, then the length gate
    pub fn check(&self, query: &NormalizedQuery) -> Option<GateDecision> {
        if self.overrides.is_match(&query.canonical) {
            return Some(GateDecision::Override {
                score: self.override_score,
                confidence: self.override_confidence,
            });
        }

        let tokens = query.token_count();
        if tokens < self.min_tokens {
            return Some(GateDecision::TooShort { tokens });
        }
        None
    }
}

/// Named, weighted idiomatic regex patterns
#[derive(Debug, Clone)]
pub struct IdiomPatterns {
    patterns: Vec<(String, Regex, i32)>,
}

impl IdiomPatterns {
    pub fn new(specs: &[PatternSpec]) -> Result<Self> {
        let patterns = specs
            .iter()
            .map(|spec| {
                let re = Regex::new(&spec.pattern).map_err(|e| {
                    Error::lexicon(format!("Failed to compile pattern '{}': {e}", spec.name))
                })?;
                Ok((spec.name.clone(), re, spec.weight))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Record every matching pattern and return the summed weight
    pub fn score(&self, canonical: &str, breakdown: &mut ScoreBreakdown) -> i32 {
        let mut total = 0;
        for (name, re, weight) in &self.patterns {
            if re.is_match(canonical) {
                breakdown.record_pattern(name.clone(), *weight);
                total += weight;
            }
        }
        total
    }
}
