//! Boundaries to the outside world.
//!
//! Workers and producers only see these traits. Concrete venue clients,
//! language models, image scrapers and toxicity classifiers live outside
//! the crate and are handed in at start-up.

pub mod thread;

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::job::{ImageRequest, TextParams};

pub use thread::{ItemKind, ThreadNode};

/// Errors returned by collaborators. All of them are treated as transient by
/// the stage workers: the attempt is counted and the job retried within its
/// budget.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollabError {
    #[error("Venue request failed: {0}")]
    Venue(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

pub type CollabResult<T> = Result<T, CollabError>;

/// Body of a new top-level post.
#[derive(Debug, Clone, PartialEq)]
pub enum PostBody {
    SelfText(String),
    Link(String),
    /// A local image uploaded with the post.
    Image(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub subject: String,
    pub title: String,
    pub body: PostBody,
    pub flair_id: Option<String>,
    pub nsfw: bool,
}

/// The site the bot reads from and posts to.
pub trait ContentVenue: Send + Sync {
    /// Publishes a new post and returns its venue id.
    fn create_post(&self, post: &NewPost) -> CollabResult<String>;

    /// Replies to `parent_id` and returns the id of the reply.
    fn create_reply(&self, parent_id: &str, body: &str) -> CollabResult<String>;

    /// Loads an item with its ancestors.
    fn fetch_thread(&self, id: &str) -> CollabResult<ThreadNode>;
}

/// Stream of items the bot may want to answer.
pub trait IncomingFeed: Send + Sync {
    /// New comments, submissions and inbox items since the last call.
    fn poll_incoming(&self) -> CollabResult<Vec<ThreadNode>>;

    /// The bot's own recent posts and replies, with their parents.
    fn own_recent(&self) -> CollabResult<Vec<ThreadNode>>;
}

pub trait TextGenerator: Send + Sync {
    /// Continues `prompt`.
    ///
    /// The returned text must start with `prompt` itself, followed by what
    /// the model wrote. Text that does not start with the prompt is
    /// discarded as empty output. `Ok(None)` means the model produced
    /// nothing usable.
    fn generate(&self, prompt: &str, params: &TextParams) -> CollabResult<Option<String>>;
}

pub trait ImageBackend: Send + Sync {
    /// Name matched against `ImageRequest::backend`.
    fn name(&self) -> &str;

    /// Returns a URL or a local path. `attempt` is zero-based so backends
    /// can pick a different result on each retry.
    fn find_or_make_image(&self, request: &ImageRequest, attempt: u32)
        -> CollabResult<Option<String>>;
}

/// Scores text per label (`toxicity`, `insult`, ...) in `[0, 1]`.
pub trait ToxicityScorer: Send + Sync {
    fn score(&self, text: &str) -> CollabResult<HashMap<String, f64>>;
}

/// Decides how likely the bot is to answer an item.
pub trait ReplyScorer: Send + Sync {
    /// Probability in `[0, 1]`.
    fn reply_probability(&self, node: &ThreadNode) -> f64;
}

/// Answers every item with the same probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedProbability(pub f64);

impl ReplyScorer for FixedProbability {
    fn reply_probability(&self, _node: &ThreadNode) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}
