mod comments;
mod files;
mod notifications;
mod posts;
mod profiles;
mod reactions;
mod replies;
mod threads;
mod topics;

use super::models::{
    BlogPostRecord, CommentRecord, ImageRecord, NotificationRecord, ProfileRecord,
    ReactionRecord, ReactionTarget, ReplyRecord, Role, StoredBlobRecord, ThreadRecord,
    TopicRecord,
};
use anyhow::Result;
use rusqlite::Connection;

/// Mutating methods that return `usize` report the number of rows touched,
/// so callers can turn `0` into a not-found condition.
pub trait TopicRepository {
    fn create(&self, record: &TopicRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<TopicRecord>>;
    fn list(&self) -> Result<Vec<TopicRecord>>;
    fn count(&self) -> Result<usize>;
    fn record_new_thread(&self, id: &str, at: i64) -> Result<usize>;
    fn record_removed_thread(&self, id: &str) -> Result<usize>;
    fn touch_last_post(&self, id: &str, at: i64) -> Result<usize>;
}

pub trait ThreadRepository {
    fn create(&self, record: &ThreadRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<ThreadRecord>>;
    fn list_for_topic(&self, topic_id: &str) -> Result<Vec<ThreadRecord>>;
    fn list_all(&self) -> Result<Vec<ThreadRecord>>;
    fn list_recent(&self, limit: usize) -> Result<Vec<ThreadRecord>>;
    fn list_by_author(&self, author_id: &str) -> Result<Vec<ThreadRecord>>;
    fn increment_views(&self, id: &str) -> Result<usize>;
    fn set_views(&self, id: &str, views: i64) -> Result<usize>;
    fn record_new_reply(&self, id: &str, at: i64) -> Result<usize>;
    fn record_removed_reply(&self, id: &str) -> Result<usize>;
    fn set_pinned(&self, id: &str, pinned: bool) -> Result<usize>;
    fn set_locked(&self, id: &str, locked: bool) -> Result<usize>;
    fn delete(&self, id: &str) -> Result<usize>;
}

pub trait ReplyRepository {
    fn create(&self, record: &ReplyRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<ReplyRecord>>;
    fn list_for_thread(&self, thread_id: &str) -> Result<Vec<ReplyRecord>>;
    /// Flags a live reply as deleted; already-deleted replies are untouched.
    fn mark_deleted(&self, id: &str, at: i64) -> Result<usize>;
}

pub trait PostRepository {
    fn create(&self, record: &BlogPostRecord) -> Result<()>;
    fn update(&self, record: &BlogPostRecord) -> Result<usize>;
    fn get(&self, id: &str) -> Result<Option<BlogPostRecord>>;
    fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPostRecord>>;
    fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> Result<bool>;
    /// Every post, drafts included, newest first.
    fn list_all(&self) -> Result<Vec<BlogPostRecord>>;
    /// Published posts in insertion order, narrowed by the filters the
    /// store can answer from columns alone.
    fn list_published(
        &self,
        category: Option<&str>,
        date_from: Option<i64>,
    ) -> Result<Vec<BlogPostRecord>>;
    fn list_most_viewed(&self, limit: usize) -> Result<Vec<BlogPostRecord>>;
    fn record_new_comment(&self, id: &str) -> Result<usize>;
    fn increment_views(&self, id: &str) -> Result<usize>;
    fn delete(&self, id: &str) -> Result<usize>;
}

pub trait CommentRepository {
    fn create(&self, record: &CommentRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<CommentRecord>>;
    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>>;
}

pub trait ReactionRepository {
    fn get(&self, actor_id: &str, target: &ReactionTarget) -> Result<Option<ReactionRecord>>;
    fn add(&self, record: &ReactionRecord) -> Result<()>;
    fn remove(&self, actor_id: &str, target: &ReactionTarget) -> Result<usize>;
    fn list_for_actor(&self, actor_id: &str) -> Result<Vec<ReactionRecord>>;
    /// Reads the denormalized counter stored on the target row; `None` when
    /// the target does not exist or is a soft-deleted reply.
    fn stored_like_count(&self, target: &ReactionTarget) -> Result<Option<i64>>;
    /// Adds `delta` to the stored counter in place, never going below zero.
    fn adjust_like_count(&self, target: &ReactionTarget, delta: i64) -> Result<usize>;
    /// Drops reactions on a thread and on every reply inside it.
    fn remove_for_thread(&self, thread_id: &str) -> Result<usize>;
    /// Drops reactions on a blog post and on every comment under it.
    fn remove_for_post(&self, post_id: &str) -> Result<usize>;
}

pub trait ProfileRepository {
    fn create(&self, record: &ProfileRecord) -> Result<()>;
    fn get_by_user(&self, user_id: &str) -> Result<Option<ProfileRecord>>;
    fn update(
        &self,
        user_id: &str,
        username: Option<&str>,
        bio: Option<&str>,
        at: i64,
    ) -> Result<usize>;
    fn set_role(&self, user_id: &str, role: Role) -> Result<usize>;
    /// Bumps `post_count` and `last_active_at`; a missing profile is a no-op.
    fn record_activity(&self, user_id: &str, at: i64) -> Result<usize>;
}

pub trait NotificationRepository {
    fn create(&self, record: &NotificationRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<NotificationRecord>>;
    fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>>;
    fn count_unread(&self, user_id: &str) -> Result<usize>;
    fn mark_read(&self, id: &str) -> Result<usize>;
    fn mark_all_read(&self, user_id: &str) -> Result<usize>;
}

pub trait FileRepository {
    fn issue_upload_token(&self, token: &str, issued_at: i64) -> Result<()>;
    /// Marks an unused token as consumed; returns `0` for unknown or spent tokens.
    fn consume_upload_token(&self, token: &str, at: i64) -> Result<usize>;
    fn insert_blob(&self, record: &StoredBlobRecord) -> Result<()>;
    fn get_blob(&self, id: &str) -> Result<Option<StoredBlobRecord>>;
    fn insert_image(&self, record: &ImageRecord) -> Result<()>;
    fn images_for_blob(&self, storage_id: &str) -> Result<Vec<ImageRecord>>;
}

/// Hands out rusqlite-backed repositories that share one borrowed connection
/// (or open transaction).
pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn topics(&self) -> impl TopicRepository + '_ {
        topics::SqliteTopicRepository { conn: self.conn }
    }

    pub fn threads(&self) -> impl ThreadRepository + '_ {
        threads::SqliteThreadRepository { conn: self.conn }
    }

    pub fn replies(&self) -> impl ReplyRepository + '_ {
        replies::SqliteReplyRepository { conn: self.conn }
    }

    pub fn posts(&self) -> impl PostRepository + '_ {
        posts::SqlitePostRepository { conn: self.conn }
    }

    pub fn comments(&self) -> impl CommentRepository + '_ {
        comments::SqliteCommentRepository { conn: self.conn }
    }

    pub fn reactions(&self) -> impl ReactionRepository + '_ {
        reactions::SqliteReactionRepository { conn: self.conn }
    }

    pub fn profiles(&self) -> impl ProfileRepository + '_ {
        profiles::SqliteProfileRepository { conn: self.conn }
    }

    pub fn notifications(&self) -> impl NotificationRepository + '_ {
        notifications::SqliteNotificationRepository { conn: self.conn }
    }

    pub fn files(&self) -> impl FileRepository + '_ {
        files::SqliteFileRepository { conn: self.conn }
    }

    pub fn conn(&self) -> &Connection {
        self.conn
    }
}
