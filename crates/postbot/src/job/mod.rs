//! The pipeline record and everything that decides where it sits.
//!
//! A [`Job`] tracks one piece of content through text generation, image
//! acquisition and publishing. Its [`JobStatus`] is never assigned by
//! callers; [`derive`] recomputes it from the fields on every save.

pub mod budget;
pub mod outcome;
pub mod query;
pub mod request;
pub mod status;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use budget::RetryBudgets;
pub use outcome::{StageOutcome, StageOutput};
pub use query::StageQuery;
pub use request::{ImageRequest, TextParams, TextRequest};
pub use status::{derive, derive_with, exhausted_stage, JobStatus};

/// Persisted value of [`SourceId::NewContent`].
pub const NEW_CONTENT_SENTINEL: &str = "new_content";

/// Monotonic job identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The content item a job answers, or the marker for brand-new content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SourceId {
    NewContent,
    Item(String),
}

impl SourceId {
    pub fn item(id: impl Into<String>) -> Self {
        Self::from(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceId::NewContent => NEW_CONTENT_SENTINEL,
            SourceId::Item(id) => id,
        }
    }

    pub fn is_new_content(&self) -> bool {
        matches!(self, SourceId::NewContent)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        if value == NEW_CONTENT_SENTINEL {
            SourceId::NewContent
        } else {
            SourceId::Item(value)
        }
    }
}

impl From<SourceId> for String {
    fn from(value: SourceId) -> Self {
        match value {
            SourceId::NewContent => NEW_CONTENT_SENTINEL.to_string(),
            SourceId::Item(id) => id,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stride of the pipeline, each with its own attempt counter and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Text,
    Image,
    Publish,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Text => write!(f, "text"),
            StageKind::Image => write!(f, "image"),
            StageKind::Publish => write!(f, "publish"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub(crate) status: JobStatus,
    /// Bot account the job belongs to. Not the author of the source item.
    pub owner: String,
    pub source_id: SourceId,
    /// Target venue. Always present for new-content jobs.
    pub origin_subject: Option<String>,
    pub text_request: Option<TextRequest>,
    pub text_attempts: u32,
    pub generated_text: Option<String>,
    pub image_request: Option<ImageRequest>,
    pub image_attempts: u32,
    /// URL or filesystem path of the acquired image.
    pub generated_image_ref: Option<String>,
    pub post_attempts: u32,
    /// Venue id of the published item. Set at most once.
    pub posted_id: Option<String>,
    /// Why the content filter or the venue refused this job.
    pub rejection: Option<String>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn attempts(&self, stage: StageKind) -> u32 {
        match stage {
            StageKind::Text => self.text_attempts,
            StageKind::Image => self.image_attempts,
            StageKind::Publish => self.post_attempts,
        }
    }

    /// Counts one processing attempt of `stage`.
    ///
    /// Terminal jobs are left untouched and `false` is returned.
    pub fn record_attempt(&mut self, stage: StageKind) -> bool {
        if self.status.is_terminal() {
            log::warn!(
                "Refusing to count a {} attempt on job {} ({})",
                stage,
                self.id,
                self.status
            );
            return false;
        }

        let counter = match stage {
            StageKind::Text => &mut self.text_attempts,
            StageKind::Image => &mut self.image_attempts,
            StageKind::Publish => &mut self.post_attempts,
        };
        *counter = counter.saturating_add(1);
        true
    }

    /// Writes a stage result into the job's fields.
    pub fn apply(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Produced(StageOutput::Text(text)) => self.generated_text = Some(text),
            StageOutcome::Produced(StageOutput::Image(image_ref)) => {
                self.generated_image_ref = Some(image_ref)
            }
            StageOutcome::Produced(StageOutput::Posted(posted_id)) => match &self.posted_id {
                None => self.posted_id = Some(posted_id),
                Some(existing) => log::warn!(
                    "Job {} already posted as {}, ignoring {}",
                    self.id,
                    existing,
                    posted_id
                ),
            },
            StageOutcome::Empty => {}
            StageOutcome::Rejected(reason) => {
                if self.rejection.is_none() {
                    self.rejection = Some(reason);
                }
            }
        }
    }

    pub fn is_new_content(&self) -> bool {
        self.source_id.is_new_content()
    }
}

/// Fields supplied by a producer when it creates a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner: String,
    pub source_id: SourceId,
    pub origin_subject: Option<String>,
    pub text_request: Option<TextRequest>,
    pub image_request: Option<ImageRequest>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewJob {
    /// A job keyed by an existing content item. Without a text request it
    /// only records that the item has been seen.
    pub fn for_item(owner: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            source_id: SourceId::item(item_id),
            origin_subject: None,
            text_request: None,
            image_request: None,
            created_at: None,
        }
    }

    /// A job that publishes brand-new content on `subject`.
    pub fn new_content(owner: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            source_id: SourceId::NewContent,
            origin_subject: Some(subject.into()),
            text_request: None,
            image_request: None,
            created_at: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.origin_subject = Some(subject.into());
        self
    }

    pub fn with_text_request(mut self, request: TextRequest) -> Self {
        self.text_request = Some(request);
        self
    }

    pub fn with_image_request(mut self, request: ImageRequest) -> Self {
        self.image_request = Some(request);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Builds the unsaved job. The id is assigned on insert.
    pub(crate) fn into_job(self) -> Job {
        Job {
            id: JobId(0),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            status: JobStatus::New,
            owner: self.owner,
            source_id: self.source_id,
            origin_subject: self.origin_subject,
            text_request: self.text_request,
            text_attempts: 0,
            generated_text: None,
            image_request: self.image_request,
            image_attempts: 0,
            generated_image_ref: None,
            post_attempts: 0,
            posted_id: None,
            rejection: None,
        }
    }
}
