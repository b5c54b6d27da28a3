//! Per-stage attempt budgets.

use serde::{Deserialize, Serialize};

use super::StageKind;

/// Maximum number of attempts each stage may make before the job fails.
///
/// Budgets belong to the stage, not the job. Publishing gets a single try
/// because the venue does not deduplicate posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudgets {
    pub text: u32,
    pub image: u32,
    pub post: u32,
}

impl RetryBudgets {
    pub const TEXT: u32 = 3;
    pub const IMAGE: u32 = 3;
    pub const POST: u32 = 1;

    pub const DEFAULT: RetryBudgets = RetryBudgets {
        text: Self::TEXT,
        image: Self::IMAGE,
        post: Self::POST,
    };

    pub fn for_stage(&self, stage: StageKind) -> u32 {
        match stage {
            StageKind::Text => self.text,
            StageKind::Image => self.image,
            StageKind::Publish => self.post,
        }
    }

    /// True once `attempts` has used up the stage's budget.
    pub fn exhausted(&self, stage: StageKind, attempts: u32) -> bool {
        attempts >= self.for_stage(stage)
    }
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self::DEFAULT
    }
}
