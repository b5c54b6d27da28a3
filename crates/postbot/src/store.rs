//! The job store: every write to the `jobs` table goes through here.
//!
//! `create` and `save` re-derive the job's status before touching SQL, so a
//! stored status is always the one the fields imply.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::db::job_repo::{self, JobFilter, StatusCount};
use crate::db::Database;
use crate::error::StoreError;
use crate::job::{derive_with, Job, JobId, JobStatus, NewJob, RetryBudgets, StageQuery};

#[derive(Clone)]
pub struct JobStore {
    db: Database,
    budgets: RetryBudgets,
    events: JobEventBroadcaster,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            budgets: RetryBudgets::DEFAULT,
            events: JobEventBroadcaster::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: RetryBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_events(mut self, events: JobEventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn budgets(&self) -> &RetryBudgets {
        &self.budgets
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Inserts a new job with its derived status.
    ///
    /// New-content jobs must name a subject. A second job for the same
    /// `(owner, source item)` is refused with [`StoreError::Duplicate`].
    pub fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let blank_subject = new
            .origin_subject
            .as_deref()
            .map_or(true, |s| s.trim().is_empty());
        if new.source_id.is_new_content() && blank_subject {
            return Err(StoreError::MissingSubject { owner: new.owner });
        }

        let mut job = new.into_job();
        job.status = derive_with(&job, &self.budgets);

        job.id = job_repo::insert(&self.db, &job).map_err(|e| {
            if e.is_unique_violation() {
                StoreError::Duplicate {
                    owner: job.owner.clone(),
                    source_id: job.source_id.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        log::debug!(
            "Created job {} for {} ({}) as {}",
            job.id,
            job.owner,
            job.source_id,
            job.status
        );
        self.events.send(JobEvent::transition(&job, JobStatus::New));

        Ok(job)
    }

    /// Records a content item as seen without asking for any work.
    ///
    /// Returns false when the item was already in the ledger.
    pub fn record_seen(&self, owner: &str, item_id: &str) -> Result<bool, StoreError> {
        if self.find_by_source(owner, item_id)?.is_some() {
            return Ok(false);
        }
        match self.create(NewJob::for_item(owner, item_id)) {
            Ok(_) => Ok(true),
            Err(StoreError::Duplicate { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Re-derives the status of `job` and writes all mutable fields.
    ///
    /// Derivation sees the stored row: a `posted_id` or terminal status
    /// already on disk is carried onto `job` first, so a stale copy can
    /// neither lose a publication nor revive a finished job. Returns the
    /// new status.
    pub fn save(&self, job: &mut Job) -> Result<JobStatus, StoreError> {
        let budgets = self.budgets;
        let derive = |job: &Job| derive_with(job, &budgets);
        let Some(previous) = job_repo::update(&self.db, job, derive)? else {
            return Err(StoreError::NotFound(job.id.0));
        };

        if job.status != previous {
            if job.status == JobStatus::Failed {
                log::warn!(
                    "Job {} for {} failed (text {}, image {}, post {}){}",
                    job.id,
                    job.owner,
                    job.text_attempts,
                    job.image_attempts,
                    job.post_attempts,
                    job.rejection
                        .as_deref()
                        .map(|r| format!(": {}", r))
                        .unwrap_or_default()
                );
            } else {
                log::info!("Job {} moved {} -> {}", job.id, previous, job.status);
            }
            self.events.send(JobEvent::transition(job, previous));
        }

        Ok(job.status)
    }

    pub fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(job_repo::find_by_id(&self.db, id)?)
    }

    pub fn find_by_source(&self, owner: &str, source_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(job_repo::find_by_source(&self.db, owner, source_id)?)
    }

    /// Oldest-first batch of jobs waiting on one stage.
    pub fn pending(&self, query: &StageQuery, limit: u32) -> Result<Vec<Job>, StoreError> {
        Ok(job_repo::pending(&self.db, query, limit)?)
    }

    pub fn recent_new_content(
        &self,
        owner: &str,
        subject: &str,
        since: &DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        Ok(job_repo::recent_new_content(&self.db, owner, subject, since)?)
    }

    pub fn list(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), StoreError> {
        Ok(job_repo::query(&self.db, filter)?)
    }

    pub fn status_counts(&self, owner: Option<&str>) -> Result<Vec<StatusCount>, StoreError> {
        Ok(job_repo::status_counts(&self.db, owner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ImageRequest, StageKind, StageOutcome, StageOutput, TextRequest};

    fn store() -> JobStore {
        JobStore::new(Database::open_in_memory().unwrap())
    }

    fn reply(owner: &str, item: &str) -> NewJob {
        NewJob::for_item(owner, item).with_text_request(TextRequest::new("<|sor|>hi<|eor|><|sor|>"))
    }

    #[test]
    fn test_create_derives_status() {
        let store = store();
        let job = store.create(reply("bot", "t1_a")).unwrap();
        assert_eq!(job.status(), JobStatus::NeedsText);
        assert!(job.id.0 > 0);

        let ledger = store.create(NewJob::for_item("bot", "t1_b")).unwrap();
        assert_eq!(ledger.status(), JobStatus::Complete);
    }

    #[test]
    fn test_create_new_content_requires_subject() {
        let store = store();
        let mut new = NewJob::new_content("bot", "test");
        new.origin_subject = None;
        assert!(matches!(
            store.create(new),
            Err(StoreError::MissingSubject { .. })
        ));

        let blank = NewJob::new_content("bot", "  ");
        assert!(matches!(
            store.create(blank),
            Err(StoreError::MissingSubject { .. })
        ));
    }

    #[test]
    fn test_create_duplicate_source_refused() {
        let store = store();
        store.create(reply("bot", "t1_a")).unwrap();
        assert!(matches!(
            store.create(reply("bot", "t1_a")),
            Err(StoreError::Duplicate { .. })
        ));
        store.create(reply("other", "t1_a")).unwrap();
    }

    #[test]
    fn test_many_new_content_jobs_allowed() {
        let store = store();
        store.create(NewJob::new_content("bot", "test")).unwrap();
        store.create(NewJob::new_content("bot", "test")).unwrap();
    }

    #[test]
    fn test_record_seen_only_once() {
        let store = store();
        assert!(store.record_seen("bot", "t1_a").unwrap());
        assert!(!store.record_seen("bot", "t1_a").unwrap());
        let job = store.find_by_source("bot", "t1_a").unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Complete);
    }

    #[test]
    fn test_save_rederives_and_persists() {
        let store = store();
        let mut job = store.create(reply("bot", "t1_a")).unwrap();

        job.apply(StageOutcome::Produced(StageOutput::Text("hello".into())));
        job.record_attempt(StageKind::Text);
        assert_eq!(store.save(&mut job).unwrap(), JobStatus::ReadyToPublish);

        let stored = store.find(job.id).unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::ReadyToPublish);
        assert_eq!(stored.text_attempts, 1);
        assert_eq!(stored.generated_text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_save_missing_job_is_not_found() {
        let store = store();
        let mut job = store.create(reply("bot", "t1_a")).unwrap();
        job.id = JobId(999);
        assert!(matches!(store.save(&mut job), Err(StoreError::NotFound(999))));
    }

    #[test]
    fn test_save_broadcasts_transitions_only() {
        let store = store();
        let mut rx = store.subscribe();
        let mut job = store.create(reply("bot", "t1_a")).unwrap();

        let created = rx.try_recv().unwrap();
        assert_eq!(created.from, JobStatus::New);
        assert_eq!(created.to, JobStatus::NeedsText);

        job.record_attempt(StageKind::Text);
        store.save(&mut job).unwrap();
        assert!(rx.try_recv().is_err());

        job.record_attempt(StageKind::Text);
        job.record_attempt(StageKind::Text);
        store.save(&mut job).unwrap();
        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.from, JobStatus::NeedsText);
        assert_eq!(failed.to, JobStatus::Failed);
    }

    #[test]
    fn test_custom_budgets_apply_on_save() {
        let store = store().with_budgets(RetryBudgets {
            text: 1,
            image: 1,
            post: 1,
        });
        let mut job = store.create(reply("bot", "t1_a")).unwrap();
        job.record_attempt(StageKind::Text);
        assert_eq!(store.save(&mut job).unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_failed_job_ignores_late_output() {
        let store = store();
        let mut job = store.create(reply("bot", "t1_a")).unwrap();

        job.apply(StageOutcome::Rejected("negative keyword".into()));
        job.record_attempt(StageKind::Text);
        assert_eq!(store.save(&mut job).unwrap(), JobStatus::Failed);

        let mut reloaded = store.find(job.id).unwrap().unwrap();
        reloaded.generated_text = Some("late".into());
        assert!(!reloaded.record_attempt(StageKind::Text));
        assert_eq!(store.save(&mut reloaded).unwrap(), JobStatus::Failed);
        assert_eq!(reloaded.text_attempts, 1);
    }

    #[test]
    fn test_stale_copy_cannot_undo_publication() {
        let store = store();
        let mut job = store.create(reply("bot", "t1_a")).unwrap();
        job.apply(StageOutcome::text("hello"));
        job.record_attempt(StageKind::Text);
        store.save(&mut job).unwrap();
        let mut stale = job.clone();

        job.apply(StageOutcome::posted("t1_out"));
        job.record_attempt(StageKind::Publish);
        assert_eq!(store.save(&mut job).unwrap(), JobStatus::Complete);

        let mut rx = store.subscribe();
        stale.record_attempt(StageKind::Publish);
        assert_eq!(store.save(&mut stale).unwrap(), JobStatus::Complete);
        assert_eq!(stale.posted_id.as_deref(), Some("t1_out"));
        assert!(rx.try_recv().is_err());

        let stored = store.find(job.id).unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Complete);
        assert_eq!(stored.posted_id.as_deref(), Some("t1_out"));
    }

    #[test]
    fn test_pending_uses_stage_query() {
        let store = store();
        let text = store.create(reply("bot", "t1_a")).unwrap();
        store
            .create(
                NewJob::new_content("bot", "test")
                    .with_image_request(ImageRequest::new("scraper"))
                    .with_text_request(TextRequest::new("<|soss|><|sot|>")),
            )
            .unwrap();

        let jobs = store.pending(&StageQuery::text("bot"), 10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, text.id);
        assert!(store
            .pending(&StageQuery::image("bot", "scraper"), 10)
            .unwrap()
            .is_empty());
    }
}
