//! Weighted multi-category lexicon scoring
//!
//! Single-word entries match on word boundaries, together with a naive "+s"
//! plural that is recorded as its own hit. Multi-word entries match as plain
//! substrings via Aho-Corasick. Every entry contributes at most once per
//! variant; there is no deduplication across categories and overlapping
//! spans are not removed.

use crate::config::RulesetConfig;
use crate::normalizer::Normalizer;
use aho_corasick::AhoCorasick;
use regex::RegexSet;
use rodalex_core::{Category, Error, Result, ScoreBreakdown};
use std::collections::HashSet;

/// A weighted term in one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub term: String,
    pub weight: i32,
    pub category: Category,
}

impl LexiconEntry {
    pub fn new(term: impl Into<String>, weight: i32, category: Category) -> Self {
        Self {
            term: term.into(),
            weight,
            category,
        }
    }

    fn is_phrase(&self) -> bool {
        self.term.contains(' ')
    }
}

#[derive(Debug, Clone, Copy)]
enum EntryMatcher {
    /// Indices of the singular and plural patterns in the word set
    Word { singular: usize, plural: usize },
    /// Index of the phrase in the Aho-Corasick automaton
    Phrase(usize),
}

/// Compiled lexicon
#[derive(Debug, Clone)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    matchers: Vec<EntryMatcher>,
    words: RegexSet,
    phrases: AhoCorasick,
}

impl Lexicon {
    /// Compile a list of entries; terms are folded to canonical form
    pub fn new(entries: Vec<LexiconEntry>) -> Result<Self> {
        let entries: Vec<LexiconEntry> = entries
            .into_iter()
            .map(|e| LexiconEntry {
                term: Normalizer::fold(&e.term),
                ..e
            })
            .collect();

        let mut word_patterns = Vec::new();
        let mut phrase_patterns = Vec::new();
        let mut matchers = Vec::with_capacity(entries.len());

        for entry in &entries {
            if entry.is_phrase() {
                matchers.push(EntryMatcher::Phrase(phrase_patterns.len()));
                phrase_patterns.push(entry.term.clone());
            } else {
                let escaped = regex::escape(&entry.term);
                let singular = word_patterns.len();
                word_patterns.push(format!(r"\b{escaped}\b"));
                word_patterns.push(format!(r"\b{escaped}s\b"));
                matchers.push(EntryMatcher::Word {
                    singular,
                    plural: singular + 1,
                });
            }
        }

        let words = RegexSet::new(&word_patterns)
            .map_err(|e| Error::lexicon(format!("Failed to build word matcher: {e}")))?;
        let phrases = AhoCorasick::builder()
            .build(&phrase_patterns)
            .map_err(|e| Error::lexicon(format!("Failed to build phrase matcher: {e}")))?;

        Ok(Self {
            entries,
            matchers,
            words,
            phrases,
        })
    }

    /// Compile the lexicon section of a ruleset
    pub fn from_config(config: &RulesetConfig) -> Result<Self> {
        let entries = config
            .entries()
            .map(|(category, t)| LexiconEntry::new(t.term.clone(), t.weight, category))
            .collect();
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record every matching entry into `breakdown` and return the summed contribution
    pub fn score(&self, canonical: &str, breakdown: &mut ScoreBreakdown) -> i32 {
        let word_hits = self.words.matches(canonical);
        let phrase_hits: HashSet<usize> = self
            .phrases
            .find_overlapping_iter(canonical)
            .map(|m| m.pattern().as_usize())
            .collect();

        let mut total = 0;
        for (entry, matcher) in self.entries.iter().zip(&self.matchers) {
            let contribution = entry.category.contribution(entry.weight);
            match *matcher {
                EntryMatcher::Word { singular, plural } => {
                    if word_hits.matched(singular) {
                        breakdown.record(entry.category, entry.term.clone(), contribution);
                        total += contribution;
                    }
                    if word_hits.matched(plural) {
                        breakdown.record(entry.category, format!("{}s", entry.term), contribution);
                        total += contribution;
                    }
                }
                EntryMatcher::Phrase(idx) => {
                    if phrase_hits.contains(&idx) {
                        breakdown.record(entry.category, entry.term.clone(), contribution);
                        total += contribution;
                    }
                }
            }
        }
        total
    }
}
