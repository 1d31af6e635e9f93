pub mod models;
pub mod repositories;

use crate::config::DojoPaths;
use anyhow::{anyhow, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS topics (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        icon TEXT NOT NULL,
        color TEXT NOT NULL,
        thread_count INTEGER NOT NULL DEFAULT 0,
        last_post_at INTEGER,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS threads (
        id TEXT PRIMARY KEY,
        topic_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_image_url TEXT,
        views INTEGER NOT NULL DEFAULT 0,
        likes INTEGER NOT NULL DEFAULT 0,
        reply_count INTEGER NOT NULL DEFAULT 0,
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_locked INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER,
        FOREIGN KEY (topic_id) REFERENCES topics(id)
    );

    CREATE TABLE IF NOT EXISTS replies (
        id TEXT PRIMARY KEY,
        thread_id TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_image_url TEXT,
        likes INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER,
        FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS user_profiles (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        bio TEXT,
        joined_at INTEGER NOT NULL,
        post_count INTEGER NOT NULL DEFAULT 0,
        role TEXT NOT NULL DEFAULT 'user',
        last_active_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        content TEXT NOT NULL,
        category TEXT NOT NULL,
        slug TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_image_url TEXT,
        published INTEGER NOT NULL DEFAULT 1,
        like_count INTEGER NOT NULL DEFAULT 0,
        comment_count INTEGER NOT NULL DEFAULT 0,
        image_id TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        parent_id TEXT,
        content TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_image_url TEXT,
        like_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
        FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS reactions (
        actor_id TEXT NOT NULL,
        target_kind TEXT NOT NULL,
        target_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (actor_id, target_kind, target_id)
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        thread_id TEXT NOT NULL,
        from_user_id TEXT NOT NULL,
        from_user_name TEXT NOT NULL,
        message TEXT NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS stored_blobs (
        id TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        mime TEXT,
        size_bytes INTEGER NOT NULL,
        checksum TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS upload_tokens (
        token TEXT PRIMARY KEY,
        issued_at INTEGER NOT NULL,
        consumed_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS images (
        id TEXT PRIMARY KEY,
        storage_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        file_type TEXT NOT NULL,
        width INTEGER,
        height INTEGER,
        alt_text TEXT NOT NULL DEFAULT '',
        uploaded_at INTEGER NOT NULL,
        FOREIGN KEY (storage_id) REFERENCES stored_blobs(id)
    );

    CREATE INDEX IF NOT EXISTS idx_threads_topic ON threads(topic_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_threads_author ON threads(author_id);
    CREATE INDEX IF NOT EXISTS idx_replies_thread ON replies(thread_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_posts_slug ON posts(slug);
    CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
    CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
    CREATE INDEX IF NOT EXISTS idx_reactions_target ON reactions(target_kind, target_id);
    CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_images_storage ON images(storage_id);
"#;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    newly_created: bool,
}

impl Database {
    pub fn connect(paths: &DojoPaths) -> Result<Self> {
        let newly_created = !paths.db_path.exists();
        let conn = Connection::open(&paths.db_path)?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            newly_created,
        }
    }

    pub fn ensure_migrations(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            ensure_column(conn, "posts", "tags", "TEXT NOT NULL DEFAULT '[]'")?;
            ensure_column(conn, "posts", "view_count", "INTEGER NOT NULL DEFAULT 0")?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    pub fn with_repositories<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    /// Like [`Database::with_repositories`], but every statement issued by `f`
    /// commits together or not at all. Returning `Err` rolls back.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let value = f(repositories::SqliteRepositories::new(&tx))?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Recomputes every denormalized counter from the child rows it caches
    /// and returns how many parent rows were out of date.
    pub fn reconcile_counters(&self) -> Result<ReconcileReport> {
        self.with_transaction(|repos| {
            let conn = repos.conn();
            let topics = conn.execute(
                r#"
                UPDATE topics SET thread_count = (
                    SELECT COUNT(*) FROM threads WHERE threads.topic_id = topics.id
                )
                WHERE thread_count != (
                    SELECT COUNT(*) FROM threads WHERE threads.topic_id = topics.id
                )
                "#,
                [],
            )?;
            let thread_replies = conn.execute(
                r#"
                UPDATE threads SET reply_count = (
                    SELECT COUNT(*) FROM replies
                    WHERE replies.thread_id = threads.id AND replies.is_deleted = 0
                )
                WHERE reply_count != (
                    SELECT COUNT(*) FROM replies
                    WHERE replies.thread_id = threads.id AND replies.is_deleted = 0
                )
                "#,
                [],
            )?;
            let post_comments = conn.execute(
                r#"
                UPDATE posts SET comment_count = (
                    SELECT COUNT(*) FROM comments WHERE comments.post_id = posts.id
                )
                WHERE comment_count != (
                    SELECT COUNT(*) FROM comments WHERE comments.post_id = posts.id
                )
                "#,
                [],
            )?;
            let mut likes = 0;
            for (table, column, kind) in LIKE_COUNTERS {
                let sql = format!(
                    r#"
                    UPDATE {table} SET {column} = (
                        SELECT COUNT(*) FROM reactions
                        WHERE reactions.target_kind = '{kind}' AND reactions.target_id = {table}.id
                    )
                    WHERE {column} != (
                        SELECT COUNT(*) FROM reactions
                        WHERE reactions.target_kind = '{kind}' AND reactions.target_id = {table}.id
                    )
                    "#
                );
                likes += conn.execute(&sql, [])?;
            }
            Ok(ReconcileReport {
                topics,
                thread_replies,
                post_comments,
                likes,
            })
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        f(&guard)
    }
}

/// `(table, like column, reaction target kind)` for every likeable entity.
pub(crate) const LIKE_COUNTERS: [(&str, &str, &str); 4] = [
    ("threads", "likes", "thread"),
    ("replies", "likes", "reply"),
    ("posts", "like_count", "post"),
    ("comments", "like_count", "comment"),
];

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub topics: usize,
    pub thread_replies: usize,
    pub post_comments: usize,
    pub likes: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.topics + self.thread_replies + self.post_comments + self.likes
    }
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(1)?;
        Ok(name)
    })?;
    for row in rows {
        if row?.eq_ignore_ascii_case(column) {
            return Ok(());
        }
    }
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    Ok(())
}
