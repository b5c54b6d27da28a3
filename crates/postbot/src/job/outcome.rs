use serde::{Deserialize, Serialize};

/// What a stage produced for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageOutput {
    Text(String),
    Image(String),
    Posted(String),
}

/// Result of one successful stage attempt.
///
/// `Empty` means the backend legitimately found nothing; it still counts as
/// an attempt. `Rejected` fails the job outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome {
    Produced(StageOutput),
    Empty,
    Rejected(String),
}

impl StageOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        StageOutcome::Produced(StageOutput::Text(text.into()))
    }

    pub fn image(image_ref: impl Into<String>) -> Self {
        StageOutcome::Produced(StageOutput::Image(image_ref.into()))
    }

    pub fn posted(posted_id: impl Into<String>) -> Self {
        StageOutcome::Produced(StageOutput::Posted(posted_id.into()))
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        StageOutcome::Rejected(reason.into())
    }
}
