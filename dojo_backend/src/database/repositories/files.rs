use crate::database::models::{ImageRecord, StoredBlobRecord};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteFileRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::FileRepository for SqliteFileRepository<'conn> {
    fn issue_upload_token(&self, token: &str, issued_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO upload_tokens (token, issued_at, consumed_at) VALUES (?1, ?2, NULL)",
            params![token, issued_at],
        )?;
        Ok(())
    }

    fn consume_upload_token(&self, token: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE upload_tokens
            SET consumed_at = ?2
            WHERE token = ?1 AND consumed_at IS NULL
            "#,
            params![token, at],
        )?;
        Ok(changed)
    }

    fn insert_blob(&self, record: &StoredBlobRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO stored_blobs (id, path, mime, size_bytes, checksum, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                record.path,
                record.mime,
                record.size_bytes,
                record.checksum,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_blob(&self, id: &str) -> Result<Option<StoredBlobRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, path, mime, size_bytes, checksum, created_at
                FROM stored_blobs
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(StoredBlobRecord {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        mime: row.get(2)?,
                        size_bytes: row.get(3)?,
                        checksum: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn insert_image(&self, record: &ImageRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO images (id, storage_id, file_name, file_size, file_type, width, height,
                                alt_text, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.storage_id,
                record.file_name,
                record.file_size,
                record.file_type,
                record.width,
                record.height,
                record.alt_text,
                record.uploaded_at,
            ],
        )?;
        Ok(())
    }

    fn images_for_blob(&self, storage_id: &str) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, storage_id, file_name, file_size, file_type, width, height, alt_text, uploaded_at
            FROM images
            WHERE storage_id = ?1
            ORDER BY uploaded_at ASC
            "#,
        )?;
        let rows = stmt.query_map(params![storage_id], |row| {
            Ok(ImageRecord {
                id: row.get(0)?,
                storage_id: row.get(1)?,
                file_name: row.get(2)?,
                file_size: row.get(3)?,
                file_type: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
                alt_text: row.get(7)?,
                uploaded_at: row.get(8)?,
            })
        })?;

        let mut images = Vec::new();
        for row in rows {
            images.push(row?);
        }
        Ok(images)
    }
}
