//! Content filters consulted before generated text or image prompts are
//! accepted.

pub mod keyword;
pub mod toxicity;

use std::sync::Arc;

pub use keyword::KeywordFilter;
pub use toxicity::ToxicityFilter;

/// Decides whether a piece of text may be published.
pub trait ContentFilter: Send + Sync {
    /// The rejection reason, or `None` when the text passes.
    fn check(&self, text: &str) -> Option<String>;

    fn is_rejected(&self, text: &str) -> bool {
        self.check(text).is_some()
    }
}

/// Runs filters in order and reports the first rejection.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ContentFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl ContentFilter for FilterChain {
    fn check(&self, text: &str) -> Option<String> {
        self.filters.iter().find_map(|f| f.check(text))
    }
}
