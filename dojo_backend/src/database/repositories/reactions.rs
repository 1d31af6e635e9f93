use crate::database::models::{ReactionRecord, ReactionTarget, TargetKind};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteReactionRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

/// Table and counter column that cache the like total for a target kind.
fn counter_column(kind: TargetKind) -> (&'static str, &'static str) {
    match kind {
        TargetKind::Thread => ("threads", "likes"),
        TargetKind::Reply => ("replies", "likes"),
        TargetKind::Post => ("posts", "like_count"),
        TargetKind::Comment => ("comments", "like_count"),
    }
}

impl<'conn> super::ReactionRepository for SqliteReactionRepository<'conn> {
    fn get(&self, actor_id: &str, target: &ReactionTarget) -> Result<Option<ReactionRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT actor_id, target_kind, target_id, created_at
                FROM reactions
                WHERE actor_id = ?1 AND target_kind = ?2 AND target_id = ?3
                "#,
                params![actor_id, target.kind.as_str(), target.id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(actor_id, kind, target_id, created_at)| {
            Ok::<_, anyhow::Error>(ReactionRecord {
                actor_id,
                target_kind: kind.parse()?,
                target_id,
                created_at,
            })
        })
        .transpose()
    }

    fn add(&self, record: &ReactionRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO reactions (actor_id, target_kind, target_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.actor_id,
                record.target_kind.as_str(),
                record.target_id,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, actor_id: &str, target: &ReactionTarget) -> Result<usize> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM reactions
            WHERE actor_id = ?1 AND target_kind = ?2 AND target_id = ?3
            "#,
            params![actor_id, target.kind.as_str(), target.id],
        )?;
        Ok(removed)
    }

    fn list_for_actor(&self, actor_id: &str) -> Result<Vec<ReactionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT actor_id, target_kind, target_id, created_at
            FROM reactions
            WHERE actor_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![actor_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            let (actor_id, kind, target_id, created_at) = row?;
            reactions.push(ReactionRecord {
                actor_id,
                target_kind: kind.parse()?,
                target_id,
                created_at,
            });
        }
        Ok(reactions)
    }

    fn stored_like_count(&self, target: &ReactionTarget) -> Result<Option<i64>> {
        let (table, column) = counter_column(target.kind);
        // Soft-deleted replies read as missing.
        let live = match target.kind {
            TargetKind::Reply => " AND is_deleted = 0",
            _ => "",
        };
        let count = self
            .conn
            .query_row(
                &format!("SELECT {column} FROM {table} WHERE id = ?1{live}"),
                params![target.id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    fn adjust_like_count(&self, target: &ReactionTarget, delta: i64) -> Result<usize> {
        let (table, column) = counter_column(target.kind);
        let changed = self.conn.execute(
            &format!("UPDATE {table} SET {column} = MAX(0, {column} + ?2) WHERE id = ?1"),
            params![target.id, delta],
        )?;
        Ok(changed)
    }

    fn remove_for_thread(&self, thread_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM reactions
            WHERE (target_kind = 'thread' AND target_id = ?1)
               OR (target_kind = 'reply' AND target_id IN (
                       SELECT id FROM replies WHERE thread_id = ?1
                   ))
            "#,
            params![thread_id],
        )?;
        Ok(removed)
    }

    fn remove_for_post(&self, post_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM reactions
            WHERE (target_kind = 'post' AND target_id = ?1)
               OR (target_kind = 'comment' AND target_id IN (
                       SELECT id FROM comments WHERE post_id = ?1
                   ))
            "#,
            params![post_id],
        )?;
        Ok(removed)
    }
}
