use crate::database::models::{ProfileRecord, Role};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteProfileRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::ProfileRepository for SqliteProfileRepository<'conn> {
    fn create(&self, record: &ProfileRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO user_profiles (id, user_id, username, bio, joined_at, post_count, role, last_active_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.user_id,
                record.username,
                record.bio,
                record.joined_at,
                record.post_count,
                record.role.as_str(),
                record.last_active_at,
            ],
        )?;
        Ok(())
    }

    fn get_by_user(&self, user_id: &str) -> Result<Option<ProfileRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, user_id, username, bio, joined_at, post_count, role, last_active_at
                FROM user_profiles
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok((
                        ProfileRecord {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            username: row.get(2)?,
                            bio: row.get(3)?,
                            joined_at: row.get(4)?,
                            post_count: row.get(5)?,
                            role: Role::User,
                            last_active_at: row.get(7)?,
                        },
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((mut profile, role)) = row else {
            return Ok(None);
        };
        profile.role = role.parse()?;
        Ok(Some(profile))
    }

    fn update(
        &self,
        user_id: &str,
        username: Option<&str>,
        bio: Option<&str>,
        at: i64,
    ) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE user_profiles
            SET username = COALESCE(?2, username),
                bio = COALESCE(?3, bio),
                last_active_at = ?4
            WHERE user_id = ?1
            "#,
            params![user_id, username, bio, at],
        )?;
        Ok(changed)
    }

    fn set_role(&self, user_id: &str, role: Role) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE user_profiles SET role = ?2 WHERE user_id = ?1",
            params![user_id, role.as_str()],
        )?;
        Ok(changed)
    }

    fn record_activity(&self, user_id: &str, at: i64) -> Result<usize> {
        let changed = self.conn.execute(
            r#"
            UPDATE user_profiles
            SET post_count = post_count + 1, last_active_at = ?2
            WHERE user_id = ?1
            "#,
            params![user_id, at],
        )?;
        Ok(changed)
    }
}
