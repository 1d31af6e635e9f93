use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub thread_count: i64,
    pub last_post_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub topic_id: String,
    pub title: String,
    /// Rich-text HTML produced by the editor.
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub author_image_url: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub reply_count: i64,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRecord {
    pub id: String,
    pub thread_id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub author_image_url: Option<String>,
    pub likes: i64,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPostRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub author_id: String,
    pub author_name: String,
    pub author_image_url: Option<String>,
    pub published: bool,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub image_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub author_image_url: Option<String>,
    pub like_count: i64,
    pub created_at: i64,
}

/// The kinds of entity an actor can like. One table holds every reaction,
/// keyed by `(actor_id, target_kind, target_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Thread,
    Reply,
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Thread => "thread",
            TargetKind::Reply => "reply",
            TargetKind::Post => "post",
            TargetKind::Comment => "comment",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "thread" => Ok(TargetKind::Thread),
            "reply" => Ok(TargetKind::Reply),
            "post" => Ok(TargetKind::Post),
            "comment" => Ok(TargetKind::Comment),
            other => Err(anyhow::anyhow!("unknown reaction target kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTarget {
    pub kind: TargetKind,
    pub id: String,
}

impl ReactionTarget {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub actor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(anyhow::anyhow!("unknown role {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub bio: Option<String>,
    pub joined_at: i64,
    pub post_count: i64,
    pub role: Role,
    pub last_active_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub thread_id: String,
    pub from_user_id: String,
    pub from_user_name: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlobRecord {
    pub id: String,
    pub path: String,
    pub mime: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub storage_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub alt_text: String,
    pub uploaded_at: i64,
}
