//! Rodalex Core
//!
//! Core types and error handling shared across the Rodalex gatekeeper.
//!
//! This crate provides:
//! - The lexicon category taxonomy and per-request score breakdown
//! - The three-state tier outcome and the final classification result
//! - The caller-owned session context used to bias consecutive turns
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Adjustment, Category, ClassificationResult, NormalizedQuery, ScoreBreakdown, SessionContext,
    TermMatch, Tier, TierOutcome, OUT_OF_DOMAIN_MESSAGE,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        Category, ClassificationResult, NormalizedQuery, ScoreBreakdown, SessionContext, Tier,
        TierOutcome,
    };
}
