//! Structured requests stored in the job's JSON columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling parameters handed to the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
    #[serde(default = "default_stop_token")]
    pub stop_token: String,
}

fn default_max_length() -> u32 {
    1000
}

fn default_num_return_sequences() -> u32 {
    1
}

fn default_temperature() -> f64 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_repetition_penalty() -> f64 {
    1.008
}

fn default_stop_token() -> String {
    "<|endoftext|>".to_string()
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            num_return_sequences: default_num_return_sequences(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            repetition_penalty: default_repetition_penalty(),
            stop_token: default_stop_token(),
        }
    }
}

/// A request for text: the tagged prompt plus sampling parameters.
///
/// Serialized flat, so the column reads
/// `{"prompt": "...", "max_length": 1000, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub params: TextParams,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: TextParams::default(),
        }
    }

    pub fn with_params(mut self, params: TextParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.params.max_length = max_length;
        self
    }
}

/// A request for an image from a named backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Backend that should serve this request, e.g. `scraper`.
    #[serde(rename = "type")]
    pub backend: String,
    /// Search or generation prompt. When empty the image stage falls back to
    /// the title of the generated text.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, rename = "image_post_search_prefix")]
    pub search_prefix: Option<String>,
    /// Backend-specific parameters, passed through untouched.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ImageRequest {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            prompt: None,
            search_prefix: None,
            params: Map::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_search_prefix(mut self, prefix: Option<String>) -> Self {
        self.search_prefix = prefix;
        self
    }

    pub fn has_prompt(&self) -> bool {
        self.prompt.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}
