//! Threshold checks over a toxicity classifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::ContentFilter;
use crate::collab::ToxicityScorer;

/// Label thresholds used when a bot configures none.
pub fn default_thresholds() -> BTreeMap<String, f64> {
    [
        ("toxicity", 0.7),
        ("severe_toxicity", 0.05),
        ("obscene", 0.7),
        ("identity_attack", 0.7),
        ("insult", 0.7),
        ("threat", 0.4),
        ("sexual_explicit", 0.7),
    ]
    .into_iter()
    .map(|(label, threshold)| (label.to_string(), threshold))
    .collect()
}

/// Rejects text the scorer rates above any label's threshold.
///
/// Text that cannot be scored is rejected too, as is a result missing one
/// of the configured labels.
#[derive(Clone)]
pub struct ToxicityFilter {
    scorer: Arc<dyn ToxicityScorer>,
    thresholds: BTreeMap<String, f64>,
}

impl ToxicityFilter {
    pub fn new(scorer: Arc<dyn ToxicityScorer>) -> Self {
        Self {
            scorer,
            thresholds: default_thresholds(),
        }
    }

    /// Overrides individual thresholds; labels not given keep their default.
    pub fn with_thresholds(mut self, overrides: &BTreeMap<String, f64>) -> Self {
        for (label, threshold) in overrides {
            self.thresholds.insert(label.clone(), *threshold);
        }
        self
    }

    pub fn thresholds(&self) -> &BTreeMap<String, f64> {
        &self.thresholds
    }
}

impl ContentFilter for ToxicityFilter {
    fn check(&self, text: &str) -> Option<String> {
        let scores = match self.scorer.score(text) {
            Ok(scores) => scores,
            Err(e) => {
                log::warn!("Toxicity scoring failed: {}", e);
                return Some(format!("toxicity unknown: {}", e));
            }
        };

        for (label, threshold) in &self.thresholds {
            match scores.get(label) {
                None => return Some(format!("toxicity unknown: no '{}' score", label)),
                Some(score) if score > threshold => {
                    log::debug!("Text scored {:.3} for {} (limit {})", score, label, threshold);
                    return Some(format!("{} {:.2} above {:.2}", label, score, threshold));
                }
                Some(_) => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{CollabError, CollabResult};
    use std::collections::HashMap;

    struct Fixed(Result<HashMap<String, f64>, CollabError>);

    impl ToxicityScorer for Fixed {
        fn score(&self, _text: &str) -> CollabResult<HashMap<String, f64>> {
            self.0.clone()
        }
    }

    fn calm() -> HashMap<String, f64> {
        default_thresholds()
            .into_keys()
            .map(|label| (label, 0.01))
            .collect()
    }

    #[test]
    fn test_calm_text_passes() {
        let filter = ToxicityFilter::new(Arc::new(Fixed(Ok(calm()))));
        assert_eq!(filter.check("hello"), None);
    }

    #[test]
    fn test_label_above_threshold_rejects() {
        let mut scores = calm();
        scores.insert("threat".into(), 0.5);
        let filter = ToxicityFilter::new(Arc::new(Fixed(Ok(scores))));
        let reason = filter.check("hello").unwrap();
        assert!(reason.starts_with("threat"));
    }

    #[test]
    fn test_missing_label_rejects() {
        let mut scores = calm();
        scores.remove("insult");
        let filter = ToxicityFilter::new(Arc::new(Fixed(Ok(scores))));
        assert!(filter.is_rejected("hello"));
    }

    #[test]
    fn test_scorer_error_rejects() {
        let filter = ToxicityFilter::new(Arc::new(Fixed(Err(CollabError::Unavailable(
            "model not loaded".into(),
        )))));
        assert!(filter.check("hello").unwrap().contains("model not loaded"));
    }

    #[test]
    fn test_threshold_overrides() {
        let mut scores = calm();
        scores.insert("threat".into(), 0.5);
        let overrides = BTreeMap::from([("threat".to_string(), 0.9)]);
        let filter = ToxicityFilter::new(Arc::new(Fixed(Ok(scores)))).with_thresholds(&overrides);
        assert_eq!(filter.thresholds()["threat"], 0.9);
        assert_eq!(filter.thresholds()["severe_toxicity"], 0.05);
        assert!(!filter.is_rejected("hello"));
    }
}
