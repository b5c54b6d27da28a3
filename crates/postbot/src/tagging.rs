//! The tag markup the text model was fine-tuned on.
//!
//! Prompts are built by tagging a thread's history the same way the
//! training data was tagged, and the model's continuation is parsed back
//! out by looking for the same tags.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::collab::{ItemKind, ThreadNode};

/// Any tag opener. The model ends a segment by starting the next tag.
pub const END_TAG: &str = "<|";

const REPLY_START: &str = "<|sor|>";
const TITLE_START: &str = "<|sot|>";
const TITLE_END: &str = "<|eot|>";
const SELFTEXT_START: &str = "<|sost|>";
const SELFTEXT_END: &str = "<|eost|>";
const LINK_START: &str = "<|sol|>";
const LINK_END: &str = "<|eol|>";

/// Escaped zero-width space the venue leaves in exported text.
const CRUFT: &str = "&amp;#x200B;\n";

/// Titles must be shorter than this many characters.
pub const MAX_TITLE_CHARS: usize = 300;

pub const DEFAULT_MAX_DEPTH: usize = 6;
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 3000;

static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\|[^|<>]*\|?>").unwrap());

/// Title and optional body parsed from generated new-post text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionText {
    pub title: String,
    pub selftext: Option<String>,
}

/// Reply segments with "reply sense" distinguish who is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Voice {
    /// Plain reply.
    Reply,
    /// Reply by the submission's author.
    OriginalPoster,
    /// Reply by the author of the comment two levels up.
    OwnComment,
}

impl Voice {
    fn name(self) -> &'static str {
        match self {
            Voice::Reply => "r",
            Voice::OriginalPoster => "opr",
            Voice::OwnComment => "ocr",
        }
    }

    fn open(self, author: Option<&str>) -> String {
        match author {
            Some(author) => format!("<|so{} u/{}|>", self.name(), author),
            None => format!("<|so{}|>", self.name()),
        }
    }

    fn close(self) -> String {
        format!("<|eo{}|>", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagFormatter {
    reply_sense: bool,
    max_depth: usize,
    max_prompt_chars: usize,
}

impl Default for TagFormatter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TagFormatter {
    pub fn new(reply_sense: bool) -> Self {
        Self {
            reply_sense,
            max_depth: DEFAULT_MAX_DEPTH,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_limits(mut self, max_depth: usize, max_prompt_chars: usize) -> Self {
        self.max_depth = max_depth;
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    pub fn reply_sense(&self) -> bool {
        self.reply_sense
    }

    pub fn tag(&self, node: &ThreadNode) -> String {
        match node.kind {
            ItemKind::Submission => self.tag_submission(node),
            ItemKind::Comment => self.tag_comment(node),
            ItemKind::Message => self.tag_message(node),
        }
    }

    pub fn tag_submission(&self, node: &ThreadNode) -> String {
        let kind = if node.is_self_post() { "ss" } else { "ls" };
        let open = if self.reply_sense {
            format!("<|so{} r/{}|>", kind, node.subject)
        } else {
            format!("<|so{}|>", kind)
        };
        let title = node.title.as_deref().unwrap_or("");

        if node.is_self_post() {
            format!(
                "{}{}{}{}{}{}{}",
                open, TITLE_START, title, TITLE_END, SELFTEXT_START, node.body, SELFTEXT_END
            )
        } else {
            format!(
                "{}{}{}{}{}{}{}",
                open, TITLE_START, title, TITLE_END, LINK_START, node.body, LINK_END
            )
        }
    }

    pub fn tag_comment(&self, node: &ThreadNode) -> String {
        if !self.reply_sense {
            return format!("{}{}{}", REPLY_START, node.body, Voice::Reply.close());
        }

        let voice = comment_voice(node);
        format!(
            "{}{}{}",
            voice.open(node.author.as_deref()),
            node.body,
            voice.close()
        )
    }

    /// Private messages. The first message of a conversation carries its
    /// subject line as a title.
    pub fn tag_message(&self, node: &ThreadNode) -> String {
        let title = match (&node.parent, &node.title) {
            (None, Some(title)) => format!("{}{}{}", TITLE_START, title, TITLE_END),
            _ => String::new(),
        };
        let voice = if self.reply_sense {
            Voice::OwnComment
        } else {
            Voice::Reply
        };
        format!("{}{}{}{}", title, voice.open(None), node.body, voice.close())
    }

    /// Tags `node` and its ancestors, oldest first, up to the submission.
    ///
    /// Stops early rather than exceed the prompt length limit.
    pub fn collate_history(&self, node: &ThreadNode) -> String {
        let mut prefix = String::new();
        let mut prefix_chars = 0;

        for current in node.lineage().take(self.max_depth) {
            let tagged = self.tag(current);
            let tagged_chars = tagged.chars().count();
            if tagged_chars + prefix_chars > self.max_prompt_chars {
                break;
            }
            prefix.insert_str(0, &tagged);
            prefix_chars += tagged_chars;

            if current.kind == ItemKind::Submission {
                break;
            }
        }

        prefix
    }

    /// The tag the model continues after when `bot` answers `node`.
    pub fn reply_tag(&self, node: &ThreadNode, bot: &str) -> String {
        if !self.reply_sense {
            return REPLY_START.to_string();
        }

        let voice = if node.kind == ItemKind::Message {
            Voice::OwnComment
        } else if node.submission_node().is_some_and(|s| s.is_by(bot)) {
            Voice::OriginalPoster
        } else if node.kind == ItemKind::Comment
            && node
                .parent()
                .is_some_and(|p| p.kind == ItemKind::Comment && p.is_by(bot))
        {
            Voice::OwnComment
        } else {
            Voice::Reply
        };
        voice.open(None)
    }

    /// Opening tags for a brand-new post on `subject`.
    pub fn new_submission_tag(&self, subject: &str, link: bool) -> String {
        let kind = if link { "ls" } else { "ss" };
        if self.reply_sense {
            format!("<|so{} r/{}|>{}", kind, subject, TITLE_START)
        } else {
            format!("<|so{}|>{}", kind, TITLE_START)
        }
    }
}

fn comment_voice(node: &ThreadNode) -> Voice {
    let Some(author) = node.author.as_deref() else {
        return Voice::Reply;
    };

    if node.submission_node().is_some_and(|s| s.is_by(author)) {
        return Voice::OriginalPoster;
    }

    let grandparent = node.parent().and_then(|p| p.parent());
    if grandparent.is_some_and(|g| g.kind == ItemKind::Comment && g.is_by(author)) {
        Voice::OwnComment
    } else {
        Voice::Reply
    }
}

/// The part of `generated` after the prompt, or nothing if the model did
/// not echo the prompt.
pub fn continuation<'a>(prompt: &str, generated: &'a str) -> &'a str {
    generated.get(prompt.len()..).unwrap_or("")
}

/// True when the model closed its segment after the prompt.
pub fn has_end_tag_after(prompt: &str, generated: &str) -> bool {
    continuation(prompt, generated).contains(END_TAG)
}

/// Extracts the reply body the model wrote after `prompt`.
///
/// The body ends at the first tag after the prompt, else at the last
/// escaped line break, else at a run of exclamation marks.
pub fn extract_reply(prompt: &str, generated: &str) -> Option<String> {
    let text = generated.replace(CRUFT, "");
    let start = prompt.len();

    let cut = text
        .get(start..)
        .and_then(|rest| rest.find(END_TAG))
        .map(|i| i + start)
        .or_else(|| text.rfind("\\n"))
        .or_else(|| text.find("!!!!"));

    let Some(cut) = cut else {
        log::debug!("No truncation point in generated text");
        return None;
    };

    text.get(start..cut)
        .filter(|body| !body.is_empty())
        .map(str::to_string)
}

/// The first title in `generated`, if it is complete and of a valid length.
pub fn extract_title(generated: &str) -> Option<String> {
    let title = segment(generated, TITLE_START)?;
    let chars = title.chars().count();
    (chars > 0 && chars < MAX_TITLE_CHARS).then(|| title.to_string())
}

pub fn extract_selftext(generated: &str) -> Option<String> {
    segment(generated, SELFTEXT_START).map(str::to_string)
}

/// Title and body of a generated new post. A title is required.
pub fn extract_submission(generated: &str) -> Option<SubmissionText> {
    let text = generated.replace(CRUFT, "");
    let title = extract_title(&text)?;
    let selftext = extract_selftext(&text).filter(|s| !s.is_empty());
    Some(SubmissionText { title, selftext })
}

/// Text between `start_tag` and the next tag opener.
fn segment<'a>(text: &'a str, start_tag: &str) -> Option<&'a str> {
    let start = text.find(start_tag)? + start_tag.len();
    let end = text[start..].find(END_TAG)? + start;
    Some(&text[start..end])
}

/// Removes `u/<username>` mentions from text, leaving speaker tags such as
/// `<|sor u/<username>|>` intact.
pub fn remove_username_mentions(text: &str, username: &str) -> String {
    let pattern = format!(r"(?i)u/{}(\|>)?", regex::escape(username));
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(e) => {
            log::warn!("Cannot build mention pattern for '{}': {}", username, e);
            return text.to_string();
        }
    };

    regex
        .replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Removes all tags, leaving only the human-readable text.
pub fn strip_tags(text: &str) -> String {
    RE_TAG.replace_all(text, "").into_owned()
}
