use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::NewPostSchedule;
use crate::error::StoreError;
use crate::job::{ImageRequest, Job, NewJob, TextParams, TextRequest};
use crate::store::JobStore;
use crate::tagging::TagFormatter;
use crate::worker::Ticker;

/// New posts may run longer than replies.
pub const NEW_POST_MAX_LENGTH: u32 = 1500;

/// Creates new-content jobs on a per-subject schedule.
pub struct SubmissionScheduler {
    owner: String,
    store: JobStore,
    schedule: Vec<NewPostSchedule>,
    tags: TagFormatter,
    text_params: TextParams,
    image_post_frequency: f64,
    image_backend: String,
    image_search_prefix: Option<String>,
    rng: StdRng,
    ticker: Ticker,
}

impl SubmissionScheduler {
    pub fn new(
        owner: impl Into<String>,
        store: JobStore,
        schedule: Vec<NewPostSchedule>,
        ticker: Ticker,
    ) -> Self {
        Self {
            owner: owner.into(),
            store,
            schedule,
            tags: TagFormatter::default(),
            text_params: TextParams::default(),
            image_post_frequency: 0.0,
            image_backend: "scraper".to_string(),
            image_search_prefix: None,
            rng: StdRng::from_entropy(),
            ticker,
        }
    }

    pub fn with_tags(mut self, tags: TagFormatter) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_text_params(mut self, params: TextParams) -> Self {
        self.text_params = params;
        self
    }

    /// Share of new posts that are link posts carrying an image.
    pub fn with_images(
        mut self,
        frequency: f64,
        backend: impl Into<String>,
        search_prefix: Option<String>,
    ) -> Self {
        self.image_post_frequency = frequency.clamp(0.0, 1.0);
        self.image_backend = backend.into();
        self.image_search_prefix = search_prefix;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Schedules a post for every subject without a live or completed
    /// new-content job inside its window.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let mut created = Vec::new();

        for entry in &self.schedule {
            let Some(since) = window_start(now, entry.every_hours) else {
                log::warn!(
                    "{}: schedule for {} every {}h is out of range, skipping",
                    self.owner,
                    entry.subject,
                    entry.every_hours
                );
                continue;
            };
            if let Some(existing) =
                self.store
                    .recent_new_content(&self.owner, &entry.subject, &since)?
            {
                log::debug!(
                    "{}: job {} already covers {} ({})",
                    self.owner,
                    existing.id,
                    entry.subject,
                    existing.status()
                );
                continue;
            }

            let link = self.rng.gen_bool(self.image_post_frequency);
            let prompt = self.tags.new_submission_tag(&entry.subject, link);
            let request = TextRequest::new(prompt)
                .with_params(self.text_params.clone())
                .with_max_length(NEW_POST_MAX_LENGTH);

            let mut new = NewJob::new_content(&self.owner, &entry.subject)
                .with_text_request(request)
                .created_at(now);
            if link {
                new = new.with_image_request(
                    ImageRequest::new(&self.image_backend)
                        .with_search_prefix(self.image_search_prefix.clone()),
                );
            }

            let job = self.store.create(new)?;
            log::info!(
                "{}: scheduled {} post {} on {}",
                self.owner,
                if link { "link" } else { "text" },
                job.id,
                entry.subject
            );
            created.push(job);
        }

        Ok(created)
    }

    pub fn run(mut self) {
        let span = tracing::info_span!("schedule", owner = self.owner.as_str());
        let _entered = span.enter();

        loop {
            if let Err(e) = self.tick(Utc::now()) {
                log::error!("{}: failed to schedule new posts: {}", self.owner, e);
            }
            if !self.ticker.wait_poll() {
                break;
            }
        }

        log::info!("{} scheduler stopped", self.owner);
    }
}

/// Start of the window an existing post covers, or `None` when it falls
/// outside the representable date range.
fn window_start(now: DateTime<Utc>, every_hours: u32) -> Option<DateTime<Utc>> {
    Duration::try_hours(i64::from(every_hours)).and_then(|window| now.checked_sub_signed(window))
}
