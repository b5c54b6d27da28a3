//! How likely the bot is to answer an incoming item.

use chrono::{DateTime, Utc};

use crate::collab::{ItemKind, ReplyScorer, ThreadNode};
use crate::filter::KeywordFilter;

/// Comments nested deeper than this are never answered.
pub const MAX_REPLY_DEPTH: usize = 9;

/// Interest in a thread fades to zero over this many hours.
pub const DECAY_HOURS: f64 = 48.0;

const BOT_AUTHOR_WEIGHT: f64 = 0.01;
const HUMAN_AUTHOR_WEIGHT: f64 = 0.2;
const POSITIVE_KEYWORD_WEIGHT: f64 = 0.3;
const SUBMISSION_WEIGHT: f64 = 0.2;
const OWN_PARENT_WEIGHT: f64 = 0.1;
const QUESTION_WEIGHT: f64 = 0.3;
const OWN_SUBMISSION_WEIGHT: f64 = 0.1;

/// Scores items by author, keywords, mentions, depth and thread age.
#[derive(Debug, Clone)]
pub struct HeuristicReplyScorer {
    bot: String,
    keywords: KeywordFilter,
}

impl HeuristicReplyScorer {
    pub fn new(bot: impl Into<String>, keywords: KeywordFilter) -> Self {
        Self {
            bot: bot.into(),
            keywords,
        }
    }

    /// The reply probability as of `now`.
    pub fn probability_at(&self, node: &ThreadNode, now: DateTime<Utc>) -> f64 {
        let Some(author) = node.author.as_deref() else {
            return 0.0;
        };
        if node.is_by(&self.bot) {
            return 0.0;
        }

        let text = node.text_content();
        if !self.keywords.negative_matches(&text).is_empty() {
            return 0.0;
        }

        let submission = node.submission_node();
        let announcement = submission
            .and_then(|s| s.link_flair.as_deref())
            .is_some_and(|flair| flair.eq_ignore_ascii_case("announcement"));
        if announcement {
            return 0.0;
        }

        let decay = decay(submission.unwrap_or(node).created_at, now);
        let mentioned = text.to_lowercase().contains(&self.bot.to_lowercase());
        if mentioned || node.kind == ItemKind::Message {
            return decay;
        }

        if node.kind == ItemKind::Comment && node.depth() > MAX_REPLY_DEPTH {
            return 0.0;
        }

        let mut probability = if looks_like_bot(author, node.author_flair.as_deref()) {
            BOT_AUTHOR_WEIGHT
        } else {
            HUMAN_AUTHOR_WEIGHT
        };

        if !self.keywords.positive_matches(&text).is_empty() {
            probability += POSITIVE_KEYWORD_WEIGHT;
        }

        match node.kind {
            ItemKind::Submission => probability += SUBMISSION_WEIGHT,
            ItemKind::Comment => {
                if node.parent().is_some_and(|p| p.is_by(&self.bot)) {
                    probability += OWN_PARENT_WEIGHT;
                }
                if node.body.contains('?') || node.body.contains(" you") {
                    probability += QUESTION_WEIGHT;
                }
                if submission.is_some_and(|s| s.is_by(&self.bot)) {
                    probability += OWN_SUBMISSION_WEIGHT;
                }
            }
            ItemKind::Message => {}
        }

        probability.min(1.0) * decay
    }
}

impl ReplyScorer for HeuristicReplyScorer {
    fn reply_probability(&self, node: &ThreadNode) -> f64 {
        self.probability_at(node, Utc::now())
    }
}

/// Other model-driven accounts carry a flair or a telltale name suffix.
fn looks_like_bot(author: &str, flair: Option<&str>) -> bool {
    let author = author.to_lowercase();
    flair.is_some_and(|f| f.to_lowercase().contains("gpt-2"))
        || author.ends_with("ssi")
        || author.ends_with("bot")
}

fn decay(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - created_at).num_seconds() as f64 / 3600.0;
    (1.0 - age_hours / DECAY_HOURS).clamp(0.0, 1.0)
}
