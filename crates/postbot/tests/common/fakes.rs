//! In-process stand-ins for the outside collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use postbot::collab::{
    CollabError, CollabResult, ContentVenue, ImageBackend, IncomingFeed, NewPost, TextGenerator,
    ThreadNode, ToxicityScorer,
};
use postbot::filter::toxicity::default_thresholds;
use postbot::{ImageRequest, TextParams};

/// A venue holding threads in memory and recording what was posted.
#[derive(Default)]
pub struct FakeVenue {
    threads: Mutex<HashMap<String, ThreadNode>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub posts: Mutex<Vec<NewPost>>,
    pub fail_posting: bool,
    next_id: AtomicUsize,
}

impl FakeVenue {
    pub fn with_thread(self, node: ThreadNode) -> Self {
        self.threads.lock().unwrap().insert(node.id.clone(), node);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_posting: true,
            ..Self::default()
        }
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}_out{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl ContentVenue for FakeVenue {
    fn create_post(&self, post: &NewPost) -> CollabResult<String> {
        if self.fail_posting {
            return Err(CollabError::Venue("rate limited".into()));
        }
        self.posts.lock().unwrap().push(post.clone());
        Ok(self.next("t3"))
    }

    fn create_reply(&self, parent_id: &str, body: &str) -> CollabResult<String> {
        if self.fail_posting {
            return Err(CollabError::Venue("rate limited".into()));
        }
        self.replies
            .lock()
            .unwrap()
            .push((parent_id.to_string(), body.to_string()));
        Ok(self.next("t1"))
    }

    fn fetch_thread(&self, id: &str) -> CollabResult<ThreadNode> {
        self.threads
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CollabError::Venue(format!("{} not found", id)))
    }
}

/// Hands out queued items once.
#[derive(Default)]
pub struct FakeFeed {
    pub incoming: Mutex<Vec<ThreadNode>>,
    pub own: Vec<ThreadNode>,
}

impl FakeFeed {
    pub fn with_incoming(items: Vec<ThreadNode>) -> Self {
        Self {
            incoming: Mutex::new(items),
            own: Vec::new(),
        }
    }
}

impl IncomingFeed for FakeFeed {
    fn poll_incoming(&self) -> CollabResult<Vec<ThreadNode>> {
        Ok(std::mem::take(&mut *self.incoming.lock().unwrap()))
    }

    fn own_recent(&self) -> CollabResult<Vec<ThreadNode>> {
        Ok(self.own.clone())
    }
}

/// Echoes the prompt followed by the next scripted continuation.
/// `None` entries model a model that produced nothing.
#[derive(Default)]
pub struct ScriptedGenerator {
    continuations: Mutex<VecDeque<Option<String>>>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new<I, S>(continuations: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            continuations: Mutex::new(
                continuations
                    .into_iter()
                    .map(|c| c.map(Into::into))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str, _params: &TextParams) -> CollabResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.continuations.lock().unwrap().pop_front();
        match next {
            Some(Some(continuation)) => Ok(Some(format!("{}{}", prompt, continuation))),
            Some(None) => Ok(None),
            None => Err(CollabError::Generation("script exhausted".into())),
        }
    }
}

/// Returns one image per prompt, recording the prompts it saw.
pub struct FakeImageBackend {
    name: String,
    pub image_ref: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeImageBackend {
    pub fn new(name: &str, image_ref: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            image_ref: image_ref.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ImageBackend for FakeImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_or_make_image(
        &self,
        request: &ImageRequest,
        _attempt: u32,
    ) -> CollabResult<Option<String>> {
        self.prompts
            .lock()
            .unwrap()
            .push(request.prompt.clone().unwrap_or_default());
        Ok(self.image_ref.clone())
    }
}

/// Scores every label at zero unless the text contains the trigger word.
pub struct KeywordToxicity {
    pub trigger: String,
}

impl ToxicityScorer for KeywordToxicity {
    fn score(&self, text: &str) -> CollabResult<HashMap<String, f64>> {
        let toxic = text.to_lowercase().contains(&self.trigger);
        Ok(default_thresholds()
            .into_keys()
            .map(|label| {
                let score = if toxic && label == "toxicity" { 0.99 } else { 0.0 };
                (label, score)
            })
            .collect())
    }
}
