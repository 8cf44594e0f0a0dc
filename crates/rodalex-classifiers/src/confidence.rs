//! Score-to-decision mapping

use crate::config::RulesetConfig;

/// Maps a final lexical score to a decision and a confidence in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceEstimator {
    threshold: f32,
    scale: f32,
}

impl ConfidenceEstimator {
    /// `scale` must be positive; [`RulesetConfig::validate`] enforces this
    pub fn new(threshold: f32, scale: f32) -> Self {
        Self { threshold, scale }
    }

    pub fn from_config(config: &RulesetConfig) -> Self {
        Self::new(config.threshold, config.confidence_scale)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns `(in_domain, confidence)`; a score equal to the threshold is accepted
    pub fn estimate(&self, score: f32) -> (bool, f32) {
        let in_domain = score >= self.threshold;
        let confidence = ((score - self.threshold).abs() / self.scale).min(1.0);
        (in_domain, confidence)
    }
}

impl Default for ConfidenceEstimator {
    fn default() -> Self {
        Self::new(0.0, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let est = ConfidenceEstimator::default();
        assert_eq!(est.estimate(0.0), (true, 0.0));
    }

    #[test]
    fn test_confidence_scales_and_saturates() {
        let est = ConfidenceEstimator::default();
        assert_eq!(est.estimate(2.5), (true, 0.5));
        assert_eq!(est.estimate(-4.0), (false, 0.8));
        assert_eq!(est.estimate(13.0), (true, 1.0));
        assert_eq!(est.estimate(-50.0), (false, 1.0));
    }

    #[test]
    fn test_custom_threshold() {
        let est = ConfidenceEstimator::new(2.0, 4.0);
        assert_eq!(est.estimate(1.0), (false, 0.25));
        assert_eq!(est.estimate(6.0), (true, 1.0));
    }
}
