//! The slice of the job table each stage worker pulls.

use serde::Serialize;

use super::{Job, JobStatus, StageKind};

/// Filter for "pending jobs of one stage for one bot".
///
/// Results are always ordered oldest first. Failed and complete jobs never
/// match because their status is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageQuery {
    Text { owner: String },
    /// Only jobs whose image request names `backend`.
    Image { owner: String, backend: String },
    PublishReplies { owner: String },
    PublishNewContent { owner: String },
}

impl StageQuery {
    pub fn text(owner: impl Into<String>) -> Self {
        StageQuery::Text {
            owner: owner.into(),
        }
    }

    pub fn image(owner: impl Into<String>, backend: impl Into<String>) -> Self {
        StageQuery::Image {
            owner: owner.into(),
            backend: backend.into(),
        }
    }

    pub fn publish_replies(owner: impl Into<String>) -> Self {
        StageQuery::PublishReplies {
            owner: owner.into(),
        }
    }

    pub fn publish_new_content(owner: impl Into<String>) -> Self {
        StageQuery::PublishNewContent {
            owner: owner.into(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            StageQuery::Text { .. } => JobStatus::NeedsText,
            StageQuery::Image { .. } => JobStatus::NeedsImage,
            StageQuery::PublishReplies { .. } | StageQuery::PublishNewContent { .. } => {
                JobStatus::ReadyToPublish
            }
        }
    }

    pub fn stage(&self) -> StageKind {
        match self {
            StageQuery::Text { .. } => StageKind::Text,
            StageQuery::Image { .. } => StageKind::Image,
            StageQuery::PublishReplies { .. } | StageQuery::PublishNewContent { .. } => {
                StageKind::Publish
            }
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            StageQuery::Text { owner }
            | StageQuery::Image { owner, .. }
            | StageQuery::PublishReplies { owner }
            | StageQuery::PublishNewContent { owner } => owner,
        }
    }

    /// In-memory form of the predicate `job_repo::pending` runs in SQL.
    pub fn matches(&self, job: &Job) -> bool {
        if job.status() != self.status() || job.owner != self.owner() {
            return false;
        }

        match self {
            StageQuery::Text { .. } => true,
            StageQuery::Image { backend, .. } => job
                .image_request
                .as_ref()
                .is_some_and(|request| &request.backend == backend),
            StageQuery::PublishReplies { .. } => !job.is_new_content(),
            StageQuery::PublishNewContent { .. } => job.is_new_content(),
        }
    }
}
