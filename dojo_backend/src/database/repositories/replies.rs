use crate::database::models::ReplyRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteReplyRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const REPLY_COLUMNS: &str = r#"
    id, thread_id, content, author_id, author_name, author_image_url,
    likes, is_deleted, created_at, updated_at
"#;

fn map_reply(row: &Row<'_>) -> rusqlite::Result<ReplyRecord> {
    Ok(ReplyRecord {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        author_name: row.get(4)?,
        author_image_url: row.get(5)?,
        likes: row.get(6)?,
        is_deleted: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl<'conn> super::ReplyRepository for SqliteReplyRepository<'conn> {
    fn create(&self, record: &ReplyRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO replies (id, thread_id, content, author_id, author_name, author_image_url,
                                 likes, is_deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.id,
                record.thread_id,
                record.content,
                record.author_id,
                record.author_name,
                record.author_image_url,
                record.likes,
                if record.is_deleted { 1 } else { 0 },
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ReplyRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {REPLY_COLUMNS} FROM replies WHERE id = ?1"),
                params![id],
                map_reply,
            )
            .optional()?;
        Ok(row)
    }

    fn list_for_thread(&self, thread_id: &str) -> Result<Vec<ReplyRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {REPLY_COLUMNS}
            FROM replies
            WHERE thread_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#
        ))?;
        let replies = stmt
            .query_map(params![thread_id], map_reply)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(replies)
    }

    fn mark_deleted(&self, id: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE replies
            SET is_deleted = 1, updated_at = ?2
            WHERE id = ?1 AND is_deleted = 0
            "#,
            params![id, at],
        )?;
        Ok(changed)
    }
}
