use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collab::{FixedProbability, ReplyScorer};
use crate::db::expand_home;
use crate::filter::KeywordFilter;
use crate::ingest::HeuristicReplyScorer;
use crate::job::{RetryBudgets, TextParams};
use crate::tagging::TagFormatter;
use crate::worker::{FailurePolicy, PollSchedule, DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retry_budgets: RetryBudgets,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

fn default_database_path() -> String {
    "~/.postbot/data/postbot.db".to_string()
}

impl Config {
    /// Database location with `~/` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database_path)
    }

    pub fn bot(&self, username: &str) -> Option<&BotConfig> {
        self.bots
            .iter()
            .find(|b| b.username.eq_ignore_ascii_case(username))
    }
}

/// Polling of the stage workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub idle_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub failure_backoff_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    PollSchedule::DEFAULT_SECS
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

impl WorkerConfig {
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::from_secs(self.poll_interval_secs, self.idle_interval_secs)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::with_backoff(Duration::from_secs(self.failure_backoff_secs))
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            idle_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            failure_backoff_secs: 0,
        }
    }
}

/// Polling of the incoming feed and the new-post scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_ingest_interval_secs() -> u64 {
    120
}

impl IngestConfig {
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::from_secs(self.poll_interval_secs, self.poll_interval_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_ingest_interval_secs(),
        }
    }
}

/// Longest allowed gap between scheduled posts: one year.
pub const MAX_SCHEDULE_HOURS: u32 = 8760;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPostSchedule {
    pub subject: String,
    pub every_hours: u32,
}

/// Everything that makes one bot account behave the way it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub username: String,
    /// Subjects the incoming feed watches.
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub new_post_schedule: Vec<NewPostSchedule>,
    #[serde(default)]
    pub image_post_frequency: f64,
    #[serde(default = "default_image_backend")]
    pub image_backend: String,
    #[serde(default)]
    pub image_search_prefix: Option<String>,
    #[serde(default)]
    pub flair_ids: HashMap<String, String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub inbox_replies: bool,
    /// Tag replies with who is speaking. The model must be trained for it.
    #[serde(default)]
    pub use_reply_sense: bool,
    /// Fixed chance of answering any item. Without it every item is scored
    /// by [`HeuristicReplyScorer`].
    #[serde(default)]
    pub reply_probability: Option<f64>,
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    #[serde(default)]
    pub positive_keywords: Vec<String>,
    /// Overrides of the default toxicity thresholds, by label.
    #[serde(default)]
    pub toxicity_thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub text_params: TextParams,
}

fn default_image_backend() -> String {
    "scraper".to_string()
}

impl BotConfig {
    /// A bot with every option at its default.
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            subjects: Vec::new(),
            new_post_schedule: Vec::new(),
            image_post_frequency: 0.0,
            image_backend: default_image_backend(),
            image_search_prefix: None,
            flair_ids: HashMap::new(),
            nsfw: false,
            inbox_replies: false,
            use_reply_sense: false,
            reply_probability: None,
            negative_keywords: Vec::new(),
            positive_keywords: Vec::new(),
            toxicity_thresholds: BTreeMap::new(),
            text_params: TextParams::default(),
        }
    }

    pub fn tag_formatter(&self) -> TagFormatter {
        TagFormatter::new(self.use_reply_sense)
    }

    pub fn keyword_filter(&self) -> KeywordFilter {
        KeywordFilter::new(&self.negative_keywords, &self.positive_keywords)
    }

    pub fn reply_scorer(&self) -> Arc<dyn ReplyScorer> {
        match self.reply_probability {
            Some(p) => Arc::new(FixedProbability(p)),
            None => Arc::new(HeuristicReplyScorer::new(
                self.username.clone(),
                self.keyword_filter(),
            )),
        }
    }
}
