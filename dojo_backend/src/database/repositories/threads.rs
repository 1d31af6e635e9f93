use crate::database::models::ThreadRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteThreadRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const THREAD_COLUMNS: &str = r#"
    id, topic_id, title, content, author_id, author_name, author_image_url,
    views, likes, reply_count, is_pinned, is_locked, created_at, updated_at
"#;

fn map_thread(row: &Row<'_>) -> rusqlite::Result<ThreadRecord> {
    Ok(ThreadRecord {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        author_id: row.get(4)?,
        author_name: row.get(5)?,
        author_image_url: row.get(6)?,
        views: row.get(7)?,
        likes: row.get(8)?,
        reply_count: row.get(9)?,
        is_pinned: row.get::<_, i64>(10)? != 0,
        is_locked: row.get::<_, i64>(11)? != 0,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl<'conn> SqliteThreadRepository<'conn> {
    fn query_threads(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ThreadRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let threads = stmt
            .query_map(args, map_thread)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(threads)
    }
}

impl<'conn> super::ThreadRepository for SqliteThreadRepository<'conn> {
    fn create(&self, record: &ThreadRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO threads (id, topic_id, title, content, author_id, author_name, author_image_url,
                                 views, likes, reply_count, is_pinned, is_locked, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                record.id,
                record.topic_id,
                record.title,
                record.content,
                record.author_id,
                record.author_name,
                record.author_image_url,
                record.views,
                record.likes,
                record.reply_count,
                if record.is_pinned { 1 } else { 0 },
                if record.is_locked { 1 } else { 0 },
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ThreadRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![id],
                map_thread,
            )
            .optional()?;
        Ok(row)
    }

    fn list_for_topic(&self, topic_id: &str) -> Result<Vec<ThreadRecord>> {
        self.query_threads(
            &format!(
                r#"
                SELECT {THREAD_COLUMNS}
                FROM threads
                WHERE topic_id = ?1
                ORDER BY created_at DESC, rowid DESC
                "#
            ),
            params![topic_id],
        )
    }

    fn list_all(&self) -> Result<Vec<ThreadRecord>> {
        self.query_threads(
            &format!("SELECT {THREAD_COLUMNS} FROM threads ORDER BY created_at DESC, rowid DESC"),
            [],
        )
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<ThreadRecord>> {
        self.query_threads(
            &format!(
                r#"
                SELECT {THREAD_COLUMNS}
                FROM threads
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?1
                "#
            ),
            params![limit as i64],
        )
    }

    fn list_by_author(&self, author_id: &str) -> Result<Vec<ThreadRecord>> {
        self.query_threads(
            &format!(
                r#"
                SELECT {THREAD_COLUMNS}
                FROM threads
                WHERE author_id = ?1
                ORDER BY created_at DESC, rowid DESC
                "#
            ),
            params![author_id],
        )
    }

    fn increment_views(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE threads SET views = views + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn set_views(&self, id: &str, views: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE threads SET views = ?2 WHERE id = ?1",
            params![id, views],
        )?;
        Ok(changed)
    }

    fn record_new_reply(&self, id: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE threads
            SET reply_count = reply_count + 1, updated_at = ?2
            WHERE id = ?1
            "#,
            params![id, at],
        )?;
        Ok(changed)
    }

    fn record_removed_reply(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE threads SET reply_count = MAX(0, reply_count - 1) WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn set_pinned(&self, id: &str, pinned: bool) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE threads SET is_pinned = ?2 WHERE id = ?1",
            params![id, if pinned { 1 } else { 0 }],
        )?;
        Ok(changed)
    }

    fn set_locked(&self, id: &str, locked: bool) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE threads SET is_locked = ?2 WHERE id = ?1",
            params![id, if locked { 1 } else { 0 }],
        )?;
        Ok(changed)
    }

    fn delete(&self, id: &str) -> Result<usize> {
        // Replies and notifications go with it through ON DELETE CASCADE.
        let deleted = self
            .conn
            .execute("DELETE FROM threads WHERE id = ?1", params![id])?;
        tracing::debug!(thread_id = %id, deleted, "thread row deleted");
        Ok(deleted)
    }
}
