//! The last stride: turning finished jobs into venue posts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{Stage, StageError};
use crate::collab::{ContentVenue, NewPost, PostBody};
use crate::job::{Job, SourceId, StageOutcome, StageQuery};
use crate::store::JobStore;
use crate::tagging::{extract_reply, extract_submission};

/// Replies at least this similar to their parent are not posted.
pub const DUPLICATE_SIMILARITY: f64 = 0.95;

/// Posts generated replies under the item each job answers.
pub struct ReplyPublisher {
    query: StageQuery,
    venue: Arc<dyn ContentVenue>,
    store: JobStore,
}

impl ReplyPublisher {
    pub fn new(owner: &str, venue: Arc<dyn ContentVenue>, store: JobStore) -> Self {
        Self {
            query: StageQuery::publish_replies(owner),
            venue,
            store,
        }
    }
}

impl Stage for ReplyPublisher {
    fn query(&self) -> &StageQuery {
        &self.query
    }

    fn label(&self) -> String {
        format!("reply-{}", self.query.owner())
    }

    fn process(&self, job: &mut Job) -> Result<StageOutcome, StageError> {
        let SourceId::Item(parent_id) = &job.source_id else {
            return Err(StageError::InvalidJob(format!("job {} is not a reply", job.id)));
        };
        let (Some(request), Some(generated)) = (&job.text_request, &job.generated_text) else {
            return Err(StageError::InvalidJob(format!("job {} has no generated text", job.id)));
        };

        let parent = self.venue.fetch_thread(parent_id)?;
        if !parent.can_reply() {
            return Ok(StageOutcome::rejected(format!(
                "{} can no longer be replied to",
                parent_id
            )));
        }

        let Some(body) = extract_reply(&request.prompt, generated) else {
            log::info!("No reply body in generated text for job {}", job.id);
            return Ok(StageOutcome::Empty);
        };

        let ratio = similarity(&body, parent.comparable_text());
        if ratio >= DUPLICATE_SIMILARITY {
            return Ok(StageOutcome::rejected(format!(
                "reply duplicates {} ({:.0}% similar)",
                parent_id,
                ratio * 100.0
            )));
        }

        let posted_id = self.venue.create_reply(parent_id, &body)?;
        log::info!("Job {} replied to {} as {}", job.id, parent_id, posted_id);
        remember(&self.store, &job.owner, &posted_id);

        Ok(StageOutcome::posted(posted_id))
    }
}

/// Publishes new posts from new-content jobs.
pub struct SubmissionPublisher {
    query: StageQuery,
    venue: Arc<dyn ContentVenue>,
    store: JobStore,
    flair_ids: HashMap<String, String>,
    nsfw: bool,
}

impl SubmissionPublisher {
    pub fn new(owner: &str, venue: Arc<dyn ContentVenue>, store: JobStore) -> Self {
        Self {
            query: StageQuery::publish_new_content(owner),
            venue,
            store,
            flair_ids: HashMap::new(),
            nsfw: false,
        }
    }

    /// Flair per subject. Subjects match case-insensitively.
    pub fn with_flair_ids(mut self, flair_ids: &HashMap<String, String>) -> Self {
        self.flair_ids = flair_ids
            .iter()
            .map(|(subject, id)| (subject.to_lowercase(), id.clone()))
            .collect();
        self
    }

    pub fn with_nsfw(mut self, nsfw: bool) -> Self {
        self.nsfw = nsfw;
        self
    }
}

impl Stage for SubmissionPublisher {
    fn query(&self) -> &StageQuery {
        &self.query
    }

    fn label(&self) -> String {
        format!("post-{}", self.query.owner())
    }

    fn process(&self, job: &mut Job) -> Result<StageOutcome, StageError> {
        let subject = job
            .origin_subject
            .clone()
            .ok_or_else(|| StageError::InvalidJob(format!("job {} has no subject", job.id)))?;
        let generated = job
            .generated_text
            .as_deref()
            .ok_or_else(|| StageError::InvalidJob(format!("job {} has no generated text", job.id)))?;

        let Some(submission) = extract_submission(generated) else {
            log::info!("No title in generated text for job {}", job.id);
            return Ok(StageOutcome::Empty);
        };

        let body = match job.generated_image_ref.as_deref() {
            Some(image) if image.starts_with("http") => PostBody::Link(image.to_string()),
            Some(image) => PostBody::Image(PathBuf::from(image)),
            None => PostBody::SelfText(submission.selftext.unwrap_or_default()),
        };

        let post = NewPost {
            flair_id: self.flair_ids.get(&subject.to_lowercase()).cloned(),
            subject,
            title: submission.title,
            body,
            nsfw: self.nsfw,
        };

        let posted_id = self.venue.create_post(&post)?;
        log::info!("Job {} posted to {} as {}", job.id, post.subject, posted_id);
        remember(&self.store, &job.owner, &posted_id);

        Ok(StageOutcome::posted(posted_id))
    }
}

/// Adds the bot's own new item to the ledger so it is never answered.
fn remember(store: &JobStore, owner: &str, posted_id: &str) {
    if let Err(e) = store.record_seen(owner, posted_id) {
        log::warn!("Failed to record posted item {}: {}", posted_id, e);
    }
}

/// Normalized edit similarity of two texts, case-insensitive. 1.0 means equal.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }

    1.0 - row[b.len()] as f64 / longest as f64
}
