use crate::database::models::{ProfileRecord, Role};
use crate::database::repositories::{ProfileRepository, SqliteRepositories};
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The caller of an operation, as vouched for by the identity provider.
/// Display fields are copied onto the rows the actor authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Fails with `Unauthorized` unless `actor_id` owns a profile whose role is
/// at least `min_role`. Usable inside an open transaction.
pub(crate) fn require_role(
    repos: &SqliteRepositories<'_>,
    actor_id: &str,
    min_role: Role,
) -> anyhow::Result<ProfileRecord> {
    if actor_id.trim().is_empty() {
        return Err(ForumError::Unauthenticated.into());
    }
    let Some(profile) = repos.profiles().get_by_user(actor_id)? else {
        return Err(ForumError::Unauthorized(format!("{min_role} role required")).into());
    };
    if profile.role < min_role {
        tracing::warn!(
            actor_id = %actor_id,
            role = %profile.role,
            required = %min_role,
            "role check rejected"
        );
        return Err(ForumError::Unauthorized(format!("{min_role} role required")).into());
    }
    Ok(profile)
}

#[derive(Clone)]
pub struct ProfileService {
    database: Database,
}

impl ProfileService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn get_profile(&self, user_id: &str) -> ForumResult<Option<ProfileRecord>> {
        let profile = self.database.with_repositories(|repos| {
            let profile = repos.profiles().get_by_user(user_id)?;
            Ok(profile)
        })?;
        Ok(profile)
    }

    /// Creates a `user`-role profile, or returns the existing one untouched.
    pub fn create_profile(&self, input: CreateProfileInput) -> ForumResult<ProfileRecord> {
        if input.user_id.trim().is_empty() {
            return Err(ForumError::Unauthenticated);
        }
        if input.username.trim().is_empty() {
            return Err(ForumError::invalid("username may not be empty"));
        }
        let profile = self.database.with_repositories(|repos| {
            let profiles = repos.profiles();
            if let Some(existing) = profiles.get_by_user(&input.user_id)? {
                return Ok(existing);
            }
            let now = now_millis();
            let record = ProfileRecord {
                id: Uuid::new_v4().to_string(),
                user_id: input.user_id.clone(),
                username: input.username.trim().to_string(),
                bio: input.bio.clone(),
                joined_at: now,
                post_count: 0,
                role: Role::User,
                last_active_at: Some(now),
            };
            profiles.create(&record)?;
            tracing::info!(user_id = %record.user_id, username = %record.username, "profile created");
            Ok(record)
        })?;
        Ok(profile)
    }

    pub fn update_profile(&self, input: UpdateProfileInput) -> ForumResult<ProfileRecord> {
        if let Some(username) = &input.username {
            if username.trim().is_empty() {
                return Err(ForumError::invalid("username may not be empty"));
            }
        }
        let profile = self.database.with_repositories(|repos| {
            let profiles = repos.profiles();
            let changed = profiles.update(
                &input.user_id,
                input.username.as_deref().map(str::trim),
                input.bio.as_deref(),
                now_millis(),
            )?;
            if changed == 0 {
                return Err(ForumError::not_found("profile not found").into());
            }
            profiles
                .get_by_user(&input.user_id)?
                .ok_or_else(|| ForumError::not_found("profile not found").into())
        })?;
        Ok(profile)
    }

    /// Admin-only role assignment.
    pub fn set_role(&self, actor: &Actor, user_id: &str, role: Role) -> ForumResult<ProfileRecord> {
        let profile = self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            let profiles = repos.profiles();
            if profiles.set_role(user_id, role)? == 0 {
                return Err(ForumError::not_found("profile not found").into());
            }
            profiles
                .get_by_user(user_id)?
                .ok_or_else(|| ForumError::not_found("profile not found").into())
        })?;
        tracing::info!(actor_id = %actor.id, user_id = %user_id, role = %role, "role changed");
        Ok(profile)
    }

    pub fn require_role(&self, actor_id: &str, min_role: Role) -> ForumResult<ProfileRecord> {
        Ok(self
            .database
            .with_repositories(|repos| require_role(&repos, actor_id, min_role))?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfileInput {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileInput {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_service() -> (Database, ProfileService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        (db.clone(), ProfileService::new(db))
    }

    fn create(service: &ProfileService, user_id: &str, username: &str) -> ProfileRecord {
        service
            .create_profile(CreateProfileInput {
                user_id: user_id.into(),
                username: username.into(),
                bio: None,
            })
            .expect("create profile")
    }

    fn promote(db: &Database, user_id: &str, role: Role) {
        db.with_repositories(|repos| {
            repos.profiles().set_role(user_id, role)?;
            Ok(())
        })
        .expect("promote");
    }

    #[test]
    fn create_profile_is_idempotent() {
        let (_, service) = setup_service();
        let first = create(&service, "u1", "Ronda");
        let second = create(&service, "u1", "SomeoneElse");
        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "Ronda");
        assert_eq!(second.role, Role::User);
        assert_eq!(second.post_count, 0);
    }

    #[test]
    fn update_missing_profile_is_not_found() {
        let (_, service) = setup_service();
        let err = service
            .update_profile(UpdateProfileInput {
                user_id: "ghost".into(),
                username: Some("Ghost".into()),
                bio: None,
            })
            .unwrap_err();
        assert!(matches!(err, ForumError::NotFound(_)));
    }

    #[test]
    fn update_profile_keeps_unset_fields() {
        let (_, service) = setup_service();
        service
            .create_profile(CreateProfileInput {
                user_id: "u1".into(),
                username: "Ronda".into(),
                bio: Some("judoka".into()),
            })
            .unwrap();
        let updated = service
            .update_profile(UpdateProfileInput {
                user_id: "u1".into(),
                username: Some("Rowdy".into()),
                bio: None,
            })
            .unwrap();
        assert_eq!(updated.username, "Rowdy");
        assert_eq!(updated.bio.as_deref(), Some("judoka"));
    }

    #[test]
    fn set_role_requires_admin() {
        let (db, service) = setup_service();
        create(&service, "boss", "Boss");
        create(&service, "u1", "Member");

        let attempt = service.set_role(&Actor::new("u1", "Member"), "u1", Role::Admin);
        assert!(matches!(attempt, Err(ForumError::Unauthorized(_))));

        promote(&db, "boss", Role::Admin);
        let changed = service
            .set_role(&Actor::new("boss", "Boss"), "u1", Role::Moderator)
            .unwrap();
        assert_eq!(changed.role, Role::Moderator);
    }

    #[test]
    fn require_role_orders_roles() {
        let (db, service) = setup_service();
        create(&service, "mod", "Mod");
        promote(&db, "mod", Role::Moderator);

        assert!(service.require_role("mod", Role::User).is_ok());
        assert!(service.require_role("mod", Role::Moderator).is_ok());
        assert!(matches!(
            service.require_role("mod", Role::Admin),
            Err(ForumError::Unauthorized(_))
        ));
        assert!(matches!(
            service.require_role("nobody", Role::User),
            Err(ForumError::Unauthorized(_))
        ));
        assert!(matches!(
            service.require_role("", Role::User),
            Err(ForumError::Unauthenticated)
        ));
    }
}
