use crate::database::models::TopicRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteTopicRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const TOPIC_COLUMNS: &str =
    "id, name, description, icon, color, thread_count, last_post_at, created_at";

fn map_topic(row: &Row<'_>) -> rusqlite::Result<TopicRecord> {
    Ok(TopicRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        color: row.get(4)?,
        thread_count: row.get(5)?,
        last_post_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl<'conn> super::TopicRepository for SqliteTopicRepository<'conn> {
    fn create(&self, record: &TopicRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO topics (id, name, description, icon, color, thread_count, last_post_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.name,
                record.description,
                record.icon,
                record.color,
                record.thread_count,
                record.last_post_at,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<TopicRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
                params![id],
                map_topic,
            )
            .optional()?;
        Ok(row)
    }

    fn list(&self) -> Result<Vec<TopicRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TOPIC_COLUMNS} FROM topics ORDER BY rowid ASC"))?;
        let topics = stmt
            .query_map([], map_topic)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn record_new_thread(&self, id: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE topics
            SET thread_count = thread_count + 1, last_post_at = ?2
            WHERE id = ?1
            "#,
            params![id, at],
        )?;
        Ok(changed)
    }

    fn record_removed_thread(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE topics SET thread_count = MAX(0, thread_count - 1) WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn touch_last_post(&self, id: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE topics SET last_post_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(changed)
    }
}
