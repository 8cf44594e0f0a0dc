//! Query canonicalization
//!
//! Lowercases, strips diacritics, collapses whitespace and rewrites regional
//! slang to canonical domain terms. Each substitution runs once, in table
//! order, on whole-word boundaries.

use crate::config::SubstitutionSpec;
use regex::Regex;
use rodalex_core::{Error, NormalizedQuery, Result};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Compiled substitution table
#[derive(Debug, Clone)]
pub struct Normalizer {
    substitutions: Vec<(Regex, String)>,
}

impl Normalizer {
    /// Compile a substitution table
    pub fn new(table: &[SubstitutionSpec]) -> Result<Self> {
        let substitutions = table
            .iter()
            .map(|sub| {
                let from = Self::fold(&sub.from);
                let re = Regex::new(&format!(r"\b{}\b", regex::escape(&from))).map_err(|e| {
                    Error::lexicon(format!("bad substitution '{}': {e}", sub.from))
                })?;
                Ok((re, Self::fold(&sub.to)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { substitutions })
    }

    /// Normalizer without a substitution table
    pub fn plain() -> Self {
        Self {
            substitutions: Vec::new(),
        }
    }

    /// Lowercase, strip combining marks and collapse whitespace
    pub fn fold(text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Canonicalize a raw query
    pub fn normalize(&self, text: &str) -> NormalizedQuery {
        let mut canonical = Self::fold(text);
        for (re, replacement) in &self.substitutions {
            if re.is_match(&canonical) {
                canonical = re
                    .replace_all(&canonical, regex::NoExpand(replacement))
                    .into_owned();
            }
        }

        NormalizedQuery {
            original: text.to_string(),
            canonical,
        }
    }
}
