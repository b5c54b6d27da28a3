//! Content items as the venue hands them over, with their ancestry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of content item a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Submission,
    Comment,
    /// A private inbox message.
    Message,
}

/// Bodies the venue shows for deleted or removed comments.
const TOMBSTONES: [&str; 2] = ["[removed]", "[deleted]"];

/// One content item plus the chain of items it replies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadNode {
    /// Venue-wide id, e.g. `t1_abc` for a comment.
    pub id: String,
    pub kind: ItemKind,
    /// `None` once the author deleted their account or the item.
    pub author: Option<String>,
    #[serde(default)]
    pub author_flair: Option<String>,
    pub subject: String,
    /// Submission title. Empty for comments and messages.
    #[serde(default)]
    pub title: Option<String>,
    /// Comment body, message body or submission self text.
    #[serde(default)]
    pub body: String,
    /// Target of a link submission.
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub link_flair: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub parent: Option<Box<ThreadNode>>,
}

impl ThreadNode {
    fn bare(id: &str, kind: ItemKind, author: &str, subject: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            author: Some(author.to_string()),
            author_flair: None,
            subject: subject.to_string(),
            title: None,
            body: String::new(),
            link_url: None,
            link_flair: None,
            created_at: Utc::now(),
            removed: false,
            locked: false,
            parent: None,
        }
    }

    /// A self-text submission.
    pub fn submission(id: &str, author: &str, subject: &str, title: &str) -> Self {
        let mut node = Self::bare(id, ItemKind::Submission, author, subject);
        node.title = Some(title.to_string());
        node
    }

    /// A comment replying to `parent`. The subject is inherited.
    pub fn comment(id: &str, author: &str, body: &str, parent: ThreadNode) -> Self {
        let mut node = Self::bare(id, ItemKind::Comment, author, &parent.subject);
        node.body = body.to_string();
        node.parent = Some(Box::new(parent));
        node
    }

    pub fn message(id: &str, author: &str, body: &str) -> Self {
        let mut node = Self::bare(id, ItemKind::Message, author, "");
        node.body = body.to_string();
        node
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_link(mut self, url: &str) -> Self {
        self.link_url = Some(url.to_string());
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn parent(&self) -> Option<&ThreadNode> {
        self.parent.as_deref()
    }

    /// This node followed by each ancestor, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &ThreadNode> {
        std::iter::successors(Some(self), |node| node.parent())
    }

    /// The topmost known ancestor.
    pub fn root(&self) -> &ThreadNode {
        self.lineage().last().unwrap_or(self)
    }

    /// The submission this node belongs to, if it is known.
    pub fn submission_node(&self) -> Option<&ThreadNode> {
        self.lineage().find(|n| n.kind == ItemKind::Submission)
    }

    /// Number of comments between this node and its submission.
    pub fn depth(&self) -> usize {
        self.lineage()
            .skip(1)
            .take_while(|n| n.kind == ItemKind::Comment)
            .count()
    }

    pub fn is_self_post(&self) -> bool {
        self.kind == ItemKind::Submission && self.link_url.is_none()
    }

    pub fn is_by(&self, username: &str) -> bool {
        self.author
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(username))
    }

    /// True when nothing stops a reply: the item still exists and its
    /// submission is not locked.
    pub fn can_reply(&self) -> bool {
        if self.removed {
            return false;
        }
        match self.kind {
            ItemKind::Comment => {
                if self.author.is_none() || TOMBSTONES.contains(&self.body.as_str()) {
                    return false;
                }
            }
            ItemKind::Submission | ItemKind::Message => {}
        }
        !self
            .lineage()
            .any(|n| n.kind == ItemKind::Submission && (n.locked || n.removed))
    }

    /// Text a generated reply is compared against for duplication: the
    /// title for submissions, the body otherwise.
    pub fn comparable_text(&self) -> &str {
        match self.kind {
            ItemKind::Submission => self.title.as_deref().unwrap_or(""),
            ItemKind::Comment | ItemKind::Message => &self.body,
        }
    }

    /// All human-written text of the item, used for keyword scoring.
    pub fn text_content(&self) -> String {
        match (self.kind, &self.title) {
            (ItemKind::Submission, Some(title)) => format!("{} {}", title, self.body),
            _ => self.body.clone(),
        }
    }
}
