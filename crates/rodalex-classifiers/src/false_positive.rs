//! False-positive correction for the lexical score
//!
//! Domain keywords show up in queries that are not about the domain at all:
//! "build an app for traffic fines", a homework essay about licences, a job
//! posting for drivers. Rules are evaluated in priority order and only the
//! first matching rule is applied.

use crate::config::{FalsePositiveRuleSpec, RuleCondition, RulesetConfig};
use crate::normalizer::Normalizer;
use regex::Regex;
use rodalex_core::{Adjustment, Category, Error, Result, ScoreBreakdown};

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    triggers: Regex,
    co_occurs_with: Option<Regex>,
    condition: RuleCondition,
    multiplier: f32,
}

impl Rule {
    fn compile(spec: &FalsePositiveRuleSpec) -> Result<Self> {
        if spec.triggers.is_empty() {
            return Err(Error::lexicon(format!(
                "false-positive rule '{}' has no triggers",
                spec.name
            )));
        }
        let co_occurs_with = if spec.co_occurs_with.is_empty() {
            None
        } else {
            Some(vocabulary(&spec.name, &spec.co_occurs_with)?)
        };
        Ok(Self {
            name: spec.name.clone(),
            triggers: vocabulary(&spec.name, &spec.triggers)?,
            co_occurs_with,
            condition: spec.condition.clone(),
            multiplier: spec.multiplier,
        })
    }

    fn applies(&self, canonical: &str, breakdown: &ScoreBreakdown) -> bool {
        if !self.triggers.is_match(canonical) {
            return false;
        }
        if let Some(co) = &self.co_occurs_with {
            if !co.is_match(canonical) {
                return false;
            }
        }
        let keywords = breakdown.count(Category::DomainKeyword);
        match self.condition {
            RuleCondition::DomainKeywordsAtLeast { count } => keywords >= count,
            RuleCondition::DomainKeywordsBelow { count } => keywords < count,
            RuleCondition::NoRegionSpecificTerms => breakdown.region_specific_count() == 0,
            RuleCondition::Always => true,
        }
    }
}

/// Whole-word alternation over a folded vocabulary
fn vocabulary(rule: &str, words: &[String]) -> Result<Regex> {
    let alternation = words
        .iter()
        .map(|w| regex::escape(&Normalizer::fold(w)))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map_err(|e| Error::lexicon(format!("Failed to build vocabulary for rule '{rule}': {e}")))
}

/// Ordered, first-match-wins false-positive rules
#[derive(Debug, Clone)]
pub struct FalsePositiveAdjuster {
    rules: Vec<Rule>,
}

impl FalsePositiveAdjuster {
    pub fn new(specs: &[FalsePositiveRuleSpec]) -> Result<Self> {
        let rules = specs.iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_config(config: &RulesetConfig) -> Result<Self> {
        Self::new(&config.false_positive_rules)
    }

    /// Find the first applicable rule for a positive lexical score
    ///
    /// The rule multiplies `score`; the returned [`Adjustment`] carries the
    /// equivalent additive delta. Non-positive scores are left alone since a
    /// negative multiplier would turn a rejection into an acceptance.
    pub fn adjust(
        &self,
        canonical: &str,
        score: f32,
        breakdown: &ScoreBreakdown,
    ) -> Option<Adjustment> {
        if score <= 0.0 {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.applies(canonical, breakdown))
            .map(|rule| Adjustment {
                rule: rule.name.clone(),
                multiplier: rule.multiplier,
                delta: score * rule.multiplier - score,
            })
    }
}
