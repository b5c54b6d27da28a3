//! Keyword matching on word boundaries.

use regex::Regex;

use super::ContentFilter;

/// Always-on negative keywords. A coarse guard; operators extend it per bot.
pub const DEFAULT_NEGATIVE_KEYWORDS: &[&str] = &[
    "auschwitz",
    "child porn",
    "concentration camp",
    "hitler",
    "holocaust",
    "incest",
    "kkk",
    "master race",
    "nazi",
    "paedo",
    "pedo",
    "racist",
    "rape",
    "raping",
    "swastika",
];

#[derive(Debug, Clone)]
struct Keyword {
    text: String,
    pattern: Regex,
}

/// Case-insensitive whole-word keyword matcher with negative and positive
/// lists.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    negative: Vec<Keyword>,
    positive: Vec<Keyword>,
}

impl KeywordFilter {
    /// Builds a filter from the default negative list plus the given
    /// keywords. Keywords that are not valid patterns are skipped.
    pub fn new(negative: &[String], positive: &[String]) -> Self {
        let defaults = DEFAULT_NEGATIVE_KEYWORDS.iter().map(|k| k.to_string());
        let negative = defaults.chain(negative.iter().cloned()).collect::<Vec<_>>();
        Self {
            negative: compile_all(&negative),
            positive: compile_all(positive),
        }
    }

    /// Compiles the pattern used for `keyword`.
    pub fn pattern(keyword: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!(r"(?i)\b{}\b", keyword.trim()))
    }

    pub fn negative_matches(&self, text: &str) -> Vec<&str> {
        matches(&self.negative, text)
    }

    pub fn positive_matches(&self, text: &str) -> Vec<&str> {
        matches(&self.positive, text)
    }
}

impl ContentFilter for KeywordFilter {
    fn check(&self, text: &str) -> Option<String> {
        let found = self.negative_matches(text);
        if found.is_empty() {
            None
        } else {
            Some(format!("negative keywords: {}", found.join(", ")))
        }
    }
}

fn compile_all(keywords: &[String]) -> Vec<Keyword> {
    let mut compiled = Vec::new();
    for keyword in keywords {
        let text = keyword.trim().to_lowercase();
        if text.is_empty() || compiled.iter().any(|k: &Keyword| k.text == text) {
            continue;
        }
        match KeywordFilter::pattern(&text) {
            Ok(pattern) => compiled.push(Keyword { text, pattern }),
            Err(e) => log::warn!("Skipping keyword '{}': {}", keyword, e),
        }
    }
    compiled
}

fn matches<'a>(keywords: &'a [Keyword], text: &str) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|k| k.pattern.is_match(text))
        .map(|k| k.text.as_str())
        .collect()
}
