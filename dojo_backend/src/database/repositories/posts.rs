use crate::database::models::BlogPostRecord;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

pub(super) struct SqlitePostRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const POST_COLUMNS: &str = r#"
    id, title, description, content, category, slug, tags, author_id, author_name,
    author_image_url, published, like_count, comment_count, view_count, image_id,
    created_at, updated_at
"#;

fn map_post(row: &Row<'_>) -> rusqlite::Result<BlogPostRecord> {
    let raw_tags: String = row.get(6)?;
    let tags = serde_json::from_str(&raw_tags).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(BlogPostRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        slug: row.get(5)?,
        tags,
        author_id: row.get(7)?,
        author_name: row.get(8)?,
        author_image_url: row.get(9)?,
        published: row.get::<_, i64>(10)? != 0,
        like_count: row.get(11)?,
        comment_count: row.get(12)?,
        view_count: row.get(13)?,
        image_id: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl<'conn> SqlitePostRepository<'conn> {
    fn query_posts(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<BlogPostRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let posts = stmt
            .query_map(args, map_post)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

impl<'conn> super::PostRepository for SqlitePostRepository<'conn> {
    fn create(&self, record: &BlogPostRecord) -> Result<()> {
        let tags = serde_json::to_string(&record.tags)?;
        self.conn.execute(
            r#"
            INSERT INTO posts (id, title, description, content, category, slug, tags, author_id,
                               author_name, author_image_url, published, like_count, comment_count,
                               view_count, image_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                record.id,
                record.title,
                record.description,
                record.content,
                record.category,
                record.slug,
                tags,
                record.author_id,
                record.author_name,
                record.author_image_url,
                if record.published { 1 } else { 0 },
                record.like_count,
                record.comment_count,
                record.view_count,
                record.image_id,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update(&self, record: &BlogPostRecord) -> Result<usize> {
        // Counters are owned by their own write paths and are left alone here.
        let tags = serde_json::to_string(&record.tags)?;
        let changed = self.conn.execute(
            r#"
            UPDATE posts
            SET title = ?2, description = ?3, content = ?4, category = ?5, slug = ?6,
                tags = ?7, published = ?8, image_id = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                record.id,
                record.title,
                record.description,
                record.content,
                record.category,
                record.slug,
                tags,
                if record.published { 1 } else { 0 },
                record.image_id,
                record.updated_at,
            ],
        )?;
        Ok(changed)
    }

    fn get(&self, id: &str) -> Result<Option<BlogPostRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                map_post,
            )
            .optional()?;
        Ok(row)
    }

    fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPostRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = ?1 ORDER BY rowid ASC LIMIT 1"),
                params![slug],
                map_post,
            )
            .optional()?;
        Ok(row)
    }

    fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE slug = ?1 AND (?2 IS NULL OR id != ?2)",
            params![slug, except_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_all(&self) -> Result<Vec<BlogPostRecord>> {
        self.query_posts(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, rowid DESC"),
            [],
        )
    }

    fn list_published(
        &self,
        category: Option<&str>,
        date_from: Option<i64>,
    ) -> Result<Vec<BlogPostRecord>> {
        let mut sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE published = 1");
        let mut args: Vec<Value> = Vec::new();
        if let Some(category) = category {
            args.push(Value::Text(category.to_string()));
            sql.push_str(&format!(" AND category = ?{}", args.len()));
        }
        if let Some(date_from) = date_from {
            args.push(Value::Integer(date_from));
            sql.push_str(&format!(" AND created_at >= ?{}", args.len()));
        }
        sql.push_str(" ORDER BY rowid ASC");
        self.query_posts(&sql, params_from_iter(args))
    }

    fn list_most_viewed(&self, limit: usize) -> Result<Vec<BlogPostRecord>> {
        self.query_posts(
            &format!(
                r#"
                SELECT {POST_COLUMNS}
                FROM posts
                WHERE published = 1
                ORDER BY view_count DESC, created_at DESC
                LIMIT ?1
                "#
            ),
            params![limit as i64],
        )
    }

    fn record_new_comment(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn increment_views(&self, id: &str) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed)
    }

    fn delete(&self, id: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(deleted)
    }
}
