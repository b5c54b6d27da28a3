//! Status derivation.
//!
//! A job's status is a pure function of its fields. [`derive_with`] is run
//! by the store before every write, so the label a worker queries on is
//! always consistent with the data, whatever order the stages finish in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Job, RetryBudgets, StageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not yet saved.
    New,
    NeedsText,
    NeedsImage,
    ReadyToPublish,
    Complete,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::New,
        JobStatus::NeedsText,
        JobStatus::NeedsImage,
        JobStatus::ReadyToPublish,
        JobStatus::Complete,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::NeedsText => "needs_text",
            JobStatus::NeedsImage => "needs_image",
            JobStatus::ReadyToPublish => "ready_to_publish",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Progress of an optional stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    NotRequested,
    Pending,
    Done,
}

impl Progress {
    fn of(requested: bool, produced: bool) -> Self {
        match (requested, produced) {
            (false, _) => Progress::NotRequested,
            (true, false) => Progress::Pending,
            (true, true) => Progress::Done,
        }
    }
}

/// Snapshot of the fields that decide a live job's stage.
#[derive(Debug, Clone, Copy)]
struct StageFacts {
    text: Progress,
    image: Progress,
    posted: bool,
}

impl StageFacts {
    fn of(job: &Job) -> Self {
        Self {
            text: Progress::of(job.text_request.is_some(), job.generated_text.is_some()),
            image: Progress::of(
                job.image_request.is_some(),
                job.generated_image_ref.is_some(),
            ),
            posted: job.posted_id.is_some(),
        }
    }

    fn status(self) -> JobStatus {
        match (self.text, self.image, self.posted) {
            (_, _, true) | (Progress::NotRequested, _, false) => JobStatus::Complete,
            (Progress::Pending, _, false) => JobStatus::NeedsText,
            (Progress::Done, Progress::Pending, false) => JobStatus::NeedsImage,
            (Progress::Done, Progress::NotRequested | Progress::Done, false) => {
                JobStatus::ReadyToPublish
            }
        }
    }
}

/// Returns the first stage that used its whole budget without producing
/// its output.
pub fn exhausted_stage(job: &Job, budgets: &RetryBudgets) -> Option<StageKind> {
    if budgets.exhausted(StageKind::Text, job.text_attempts) && job.generated_text.is_none() {
        Some(StageKind::Text)
    } else if budgets.exhausted(StageKind::Image, job.image_attempts)
        && job.generated_image_ref.is_none()
    {
        Some(StageKind::Image)
    } else if budgets.exhausted(StageKind::Publish, job.post_attempts) && job.posted_id.is_none()
    {
        Some(StageKind::Publish)
    } else {
        None
    }
}

/// Derives the status of `job` with the default budgets.
pub fn derive(job: &Job) -> JobStatus {
    derive_with(job, &RetryBudgets::DEFAULT)
}

/// Derives the status of `job`.
///
/// Terminal statuses are sticky: a finished job keeps its label even if a
/// stale writer hands back older field values.
pub fn derive_with(job: &Job, budgets: &RetryBudgets) -> JobStatus {
    if job.status.is_terminal() {
        return job.status;
    }

    if job.rejection.is_some() || exhausted_stage(job, budgets).is_some() {
        return JobStatus::Failed;
    }

    StageFacts::of(job).status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::test_support::{reply_job, with_status};
    use crate::job::{ImageRequest, NewJob, TextRequest};
    use proptest::prelude::*;

    fn apply_derive(job: &mut Job) -> JobStatus {
        job.status = derive(job);
        job.status
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("pending".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::ReadyToPublish.is_terminal());
        assert!(!JobStatus::New.is_terminal());
    }

    #[test]
    fn test_no_text_request_is_complete() {
        let mut job = NewJob::for_item("testbot", "t1_seen").into_job();
        assert_eq!(apply_derive(&mut job), JobStatus::Complete);
    }

    #[test]
    fn test_text_request_needs_text() {
        let mut job = reply_job();
        assert_eq!(apply_derive(&mut job), JobStatus::NeedsText);
    }

    #[test]
    fn test_reply_flow_without_image() {
        let mut job = reply_job();
        apply_derive(&mut job);

        job.generated_text = Some("<|sor|>hello<|eor|><|sor|>hi<|eor|>".into());
        job.text_attempts += 1;
        assert_eq!(apply_derive(&mut job), JobStatus::ReadyToPublish);

        job.posted_id = Some("t1_reply".into());
        job.post_attempts += 1;
        assert_eq!(apply_derive(&mut job), JobStatus::Complete);
    }

    #[test]
    fn test_text_budget_exhaustion_fails() {
        let mut job = reply_job();
        apply_derive(&mut job);
        for attempt in 1..=3 {
            job.text_attempts += 1;
            let status = apply_derive(&mut job);
            if attempt < 3 {
                assert_eq!(status, JobStatus::NeedsText);
            } else {
                assert_eq!(status, JobStatus::Failed);
            }
        }
    }

    #[test]
    fn test_text_then_image() {
        let mut job = reply_job();
        job.image_request = Some(ImageRequest::new("scraper"));
        assert_eq!(apply_derive(&mut job), JobStatus::NeedsText);

        job.generated_text = Some("text".into());
        assert_eq!(apply_derive(&mut job), JobStatus::NeedsImage);

        job.generated_image_ref = Some("https://example.com/a.png".into());
        assert_eq!(apply_derive(&mut job), JobStatus::ReadyToPublish);
    }

    #[test]
    fn test_image_before_text_still_needs_text() {
        let mut job = reply_job();
        job.image_request = Some(ImageRequest::new("scraper"));
        job.generated_image_ref = Some("/tmp/a.png".into());
        assert_eq!(apply_derive(&mut job), JobStatus::NeedsText);

        job.generated_text = Some("text".into());
        assert_eq!(apply_derive(&mut job), JobStatus::ReadyToPublish);
    }

    #[test]
    fn test_image_budget_exhaustion_fails() {
        let mut job = reply_job();
        job.image_request = Some(ImageRequest::new("scraper"));
        job.generated_text = Some("text".into());
        job.image_attempts = 3;
        assert_eq!(apply_derive(&mut job), JobStatus::Failed);
    }

    #[test]
    fn test_single_publish_attempt_then_failed() {
        let mut job = reply_job();
        job.generated_text = Some("text".into());
        assert_eq!(apply_derive(&mut job), JobStatus::ReadyToPublish);

        job.post_attempts = 1;
        assert_eq!(apply_derive(&mut job), JobStatus::Failed);
    }

    #[test]
    fn test_rejection_fails_before_budget() {
        let mut job = reply_job();
        job.text_attempts = 1;
        job.rejection = Some("negative keyword".into());
        assert_eq!(apply_derive(&mut job), JobStatus::Failed);
    }

    #[test]
    fn test_terminal_status_short_circuits() {
        let mut job = with_status(reply_job(), JobStatus::Complete);
        job.text_attempts = 5;
        assert_eq!(apply_derive(&mut job), JobStatus::Complete);

        let mut job = with_status(reply_job(), JobStatus::Failed);
        job.generated_text = Some("late".into());
        assert_eq!(apply_derive(&mut job), JobStatus::Failed);
    }

    #[test]
    fn test_exhausted_stage_names_the_stage() {
        let mut job = reply_job();
        assert_eq!(exhausted_stage(&job, &RetryBudgets::DEFAULT), None);
        job.text_attempts = 3;
        assert_eq!(
            exhausted_stage(&job, &RetryBudgets::DEFAULT),
            Some(StageKind::Text)
        );
        job.generated_text = Some("text".into());
        job.post_attempts = 1;
        assert_eq!(
            exhausted_stage(&job, &RetryBudgets::DEFAULT),
            Some(StageKind::Publish)
        );
    }

    #[test]
    fn test_custom_budgets() {
        let budgets = RetryBudgets {
            text: 1,
            image: 1,
            post: 2,
        };
        let mut job = reply_job();
        job.text_attempts = 1;
        assert_eq!(derive_with(&job, &budgets), JobStatus::Failed);

        job.generated_text = Some("text".into());
        job.post_attempts = 1;
        assert_eq!(derive_with(&job, &budgets), JobStatus::ReadyToPublish);
    }

    #[test]
    fn test_new_content_is_source_agnostic() {
        let mut job = NewJob::new_content("testbot", "test")
            .with_text_request(TextRequest::new("<|soss|><|sot|>"))
            .into_job();
        assert_eq!(apply_derive(&mut job), JobStatus::NeedsText);
        job.generated_text = Some("<|soss|><|sot|>Title<|eot|>".into());
        assert_eq!(apply_derive(&mut job), JobStatus::ReadyToPublish);
        job.posted_id = Some("t3_new".into());
        assert_eq!(apply_derive(&mut job), JobStatus::Complete);
    }

    /// One field mutation a worker or operator could make before a save.
    #[derive(Debug, Clone)]
    enum Mutation {
        TextAttempt,
        ImageAttempt,
        PostAttempt,
        SetText,
        ClearText,
        SetImage,
        ClearImage,
        Post,
        Reject,
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        prop_oneof![
            Just(Mutation::TextAttempt),
            Just(Mutation::ImageAttempt),
            Just(Mutation::PostAttempt),
            Just(Mutation::SetText),
            Just(Mutation::ClearText),
            Just(Mutation::SetImage),
            Just(Mutation::ClearImage),
            Just(Mutation::Post),
            Just(Mutation::Reject),
        ]
    }

    fn mutate(job: &mut Job, mutation: &Mutation) {
        match mutation {
            Mutation::TextAttempt => job.text_attempts += 1,
            Mutation::ImageAttempt => job.image_attempts += 1,
            Mutation::PostAttempt => job.post_attempts += 1,
            Mutation::SetText => job.generated_text = Some("text".into()),
            Mutation::ClearText => job.generated_text = None,
            Mutation::SetImage => job.generated_image_ref = Some("/tmp/i.png".into()),
            Mutation::ClearImage => job.generated_image_ref = None,
            Mutation::Post => {
                if job.posted_id.is_none() {
                    job.posted_id = Some("t1_posted".into())
                }
            }
            Mutation::Reject => job.rejection = Some("rejected".into()),
        }
    }

    fn arbitrary_job() -> impl Strategy<Value = Job> {
        (
            any::<bool>(),
            any::<bool>(),
            0u32..5,
            0u32..5,
            0u32..3,
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(wants_text, wants_image, text, image, post, has_text, has_image, posted)| {
                    let mut job = NewJob::for_item("testbot", "t1_parent").into_job();
                    if wants_text {
                        job.text_request = Some(TextRequest::new("prompt"));
                    }
                    if wants_image {
                        job.image_request = Some(ImageRequest::new("scraper"));
                    }
                    job.text_attempts = text;
                    job.image_attempts = image;
                    job.post_attempts = post;
                    job.generated_text = has_text.then(|| "text".to_string());
                    job.generated_image_ref = has_image.then(|| "/tmp/i.png".to_string());
                    job.posted_id = posted.then(|| "t1_posted".to_string());
                    job
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: deriving twice gives the same status as deriving once.
        #[test]
        fn derive_is_idempotent(job in arbitrary_job()) {
            let mut job = job;
            let first = apply_derive(&mut job);
            prop_assert_eq!(derive(&job), first);
        }

        /// Property: a job without a text request is complete or failed,
        /// never waiting for text.
        #[test]
        fn no_text_request_never_needs_text(job in arbitrary_job()) {
            let mut job = job;
            job.text_request = None;
            let status = apply_derive(&mut job);
            prop_assert_ne!(status, JobStatus::NeedsText);
            prop_assert!(status.is_terminal());
        }

        /// Property: an exhausted text budget without text fails the job
        /// whatever the image and post fields hold.
        #[test]
        fn exhausted_text_budget_fails(job in arbitrary_job(), extra in 0u32..3) {
            let mut job = job;
            job.text_request = Some(TextRequest::new("prompt"));
            job.generated_text = None;
            job.text_attempts = RetryBudgets::TEXT + extra;
            prop_assert_eq!(apply_derive(&mut job), JobStatus::Failed);
        }

        /// Property: once terminal, no sequence of mutations brings a job
        /// back into the pipeline.
        #[test]
        fn terminal_never_regresses(
            job in arbitrary_job(),
            mutations in prop::collection::vec(mutation(), 0..20),
        ) {
            let mut job = job;
            let mut terminal: Option<JobStatus> = None;
            apply_derive(&mut job);
            for m in &mutations {
                mutate(&mut job, m);
                let status = apply_derive(&mut job);
                if let Some(previous) = terminal {
                    prop_assert_eq!(status, previous);
                } else if status.is_terminal() {
                    terminal = Some(status);
                }
            }
        }
    }
}
