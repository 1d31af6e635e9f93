use crate::database::models::NotificationRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteNotificationRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, kind, thread_id, from_user_id, from_user_name, message, is_read, created_at
"#;

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        thread_id: row.get(3)?,
        from_user_id: row.get(4)?,
        from_user_name: row.get(5)?,
        message: row.get(6)?,
        is_read: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
    })
}

impl<'conn> super::NotificationRepository for SqliteNotificationRepository<'conn> {
    fn create(&self, record: &NotificationRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (id, user_id, kind, thread_id, from_user_id, from_user_name,
                                       message, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.user_id,
                record.kind,
                record.thread_id,
                record.from_user_id,
                record.from_user_name,
                record.message,
                if record.is_read { 1 } else { 0 },
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<NotificationRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id],
                map_notification,
            )
            .optional()?;
        Ok(row)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#
        ))?;
        let notifications = stmt
            .query_map(params![user_id], map_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn count_unread(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn mark_read(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
        )?;
        Ok(changed)
    }
}
