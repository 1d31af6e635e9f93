//! Mirrors identity-provider users into local profiles.
//!
//! The provider reaches us two ways: webhook events (`user.created`,
//! `user.updated`, `user.deleted`) and an on-demand REST lookup used to sync a
//! profile for a signed-in user who has none yet.

use crate::config::IdentityConfig;
use crate::database::models::ProfileRecord;
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::profiles::{CreateProfileInput, ProfileService, UpdateProfileInput};
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User attributes carried by the provider's events and REST responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl IdentityUser {
    /// `username`, else first and last name run together, else `User` plus a
    /// random number below 10000.
    pub fn display_name(&self) -> String {
        if let Some(username) = self.username.as_deref().map(str::trim) {
            if !username.is_empty() {
                return username.to_string();
            }
        }
        let full = format!(
            "{}{}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        format!("User{}", rand::rng().random_range(0..10_000))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedUser {
    #[serde(default)]
    pub id: Option<String>,
}

/// The closed set of webhook events we accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IdentityEvent {
    #[serde(rename = "user.created")]
    UserCreated(IdentityUser),
    #[serde(rename = "user.updated")]
    UserUpdated(IdentityUser),
    #[serde(rename = "user.deleted")]
    UserDeleted(DeletedUser),
}

impl IdentityEvent {
    /// Parses a raw webhook payload; unknown event types are rejected.
    pub fn from_json(payload: serde_json::Value) -> ForumResult<Self> {
        serde_json::from_value(payload)
            .map_err(|err| ForumError::invalid(format!("unsupported identity event: {err}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IdentityEvent::UserCreated(_) => "user.created",
            IdentityEvent::UserUpdated(_) => "user.updated",
            IdentityEvent::UserDeleted(_) => "user.deleted",
        }
    }
}

/// REST client for the identity provider's user API.
#[derive(Clone)]
pub struct IdentityClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dojo_backend/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build identity provider HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Option<Self>> {
        match &config.api_url {
            Some(url) => Ok(Some(Self::new(url.clone(), config.api_key.clone())?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<IdentityUser> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let user = request
            .send()
            .await
            .with_context(|| format!("failed to reach identity provider for user {user_id}"))?
            .error_for_status()
            .with_context(|| format!("identity provider rejected lookup of user {user_id}"))?
            .json::<IdentityUser>()
            .await
            .context("failed to parse identity provider user")?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct IdentityService {
    profiles: ProfileService,
    client: Option<IdentityClient>,
}

impl IdentityService {
    pub fn new(database: Database, client: Option<IdentityClient>) -> Self {
        Self {
            profiles: ProfileService::new(database),
            client,
        }
    }

    /// Applies a webhook event. Created and updated users end up with a
    /// profile; deletions are only logged and leave authored content alone.
    pub fn process_event(&self, event: IdentityEvent) -> ForumResult<Option<ProfileRecord>> {
        tracing::info!(event = event.kind(), "identity event received");
        match event {
            IdentityEvent::UserCreated(user) => {
                let profile = self.profiles.create_profile(CreateProfileInput {
                    username: user.display_name(),
                    user_id: user.id,
                    bio: None,
                })?;
                Ok(Some(profile))
            }
            IdentityEvent::UserUpdated(user) => {
                let username = user.display_name();
                if self.profiles.get_profile(&user.id)?.is_none() {
                    let profile = self.profiles.create_profile(CreateProfileInput {
                        user_id: user.id,
                        username,
                        bio: None,
                    })?;
                    return Ok(Some(profile));
                }
                let profile = self.profiles.update_profile(UpdateProfileInput {
                    user_id: user.id,
                    username: Some(username),
                    bio: None,
                })?;
                Ok(Some(profile))
            }
            IdentityEvent::UserDeleted(user) => {
                tracing::info!(
                    user_id = user.id.as_deref().unwrap_or("<unknown>"),
                    "identity user deleted; profile kept"
                );
                Ok(None)
            }
        }
    }

    /// Looks the user up with the identity provider and creates a profile
    /// when none exists.
    pub async fn sync_profile(&self, user_id: &str) -> ForumResult<ProfileRecord> {
        if user_id.trim().is_empty() {
            return Err(ForumError::Unauthenticated);
        }
        let Some(client) = &self.client else {
            return Err(ForumError::Upstream(
                "identity provider is not configured".into(),
            ));
        };
        let user = client.fetch_user(user_id).await.map_err(|err| {
            tracing::warn!(user_id = %user_id, error = ?err, "identity sync failed");
            ForumError::Upstream(format!("{err:#}"))
        })?;
        if let Some(existing) = self.profiles.get_profile(user_id)? {
            return Ok(existing);
        }
        self.profiles.create_profile(CreateProfileInput {
            user_id: user_id.to_string(),
            username: user.display_name(),
            bio: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::routing::get;
    use axum::{Json, Router};
    use rusqlite::Connection;
    use serde_json::json;

    fn setup(client: Option<IdentityClient>) -> IdentityService {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        IdentityService::new(db, client)
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        let err = IdentityEvent::from_json(json!({
            "type": "session.created",
            "data": { "id": "sess_1" }
        }))
        .unwrap_err();
        assert!(matches!(err, ForumError::InvalidInput(_)));
    }

    #[test]
    fn display_name_falls_back_in_order() {
        let named = IdentityUser {
            id: "u".into(),
            username: Some("kimura".into()),
            first_name: Some("Masahiko".into()),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "kimura");

        let full = IdentityUser {
            id: "u".into(),
            first_name: Some("Helio".into()),
            last_name: Some("Gracie".into()),
            ..Default::default()
        };
        assert_eq!(full.display_name(), "HelioGracie");

        let anonymous = IdentityUser {
            id: "u".into(),
            ..Default::default()
        };
        let generated = anonymous.display_name();
        let digits = generated.strip_prefix("User").expect("User prefix");
        assert!(digits.parse::<u32>().expect("numeric suffix") < 10_000);
    }

    #[test]
    fn created_then_updated_mirrors_profile() {
        let service = setup(None);
        let created = IdentityEvent::from_json(json!({
            "type": "user.created",
            "data": { "id": "user_1", "username": "tkd_fan" }
        }))
        .unwrap();
        let profile = service.process_event(created).unwrap().expect("profile");
        assert_eq!(profile.username, "tkd_fan");

        let updated = IdentityEvent::from_json(json!({
            "type": "user.updated",
            "data": { "id": "user_1", "username": "tkd_master" }
        }))
        .unwrap();
        let profile = service.process_event(updated).unwrap().expect("profile");
        assert_eq!(profile.username, "tkd_master");
    }

    #[test]
    fn update_for_unknown_user_creates_profile() {
        let service = setup(None);
        let event = IdentityEvent::UserUpdated(IdentityUser {
            id: "user_2".into(),
            first_name: Some("Ronda".into()),
            ..Default::default()
        });
        let profile = service.process_event(event).unwrap().expect("profile");
        assert_eq!(profile.user_id, "user_2");
        assert_eq!(profile.username, "Ronda");
    }

    #[test]
    fn deleted_users_keep_their_profile() {
        let service = setup(None);
        service
            .process_event(IdentityEvent::UserCreated(IdentityUser {
                id: "user_3".into(),
                username: Some("gone".into()),
                ..Default::default()
            }))
            .unwrap();
        let outcome = service
            .process_event(IdentityEvent::UserDeleted(DeletedUser {
                id: Some("user_3".into()),
            }))
            .unwrap();
        assert!(outcome.is_none());
        assert!(service.profiles.get_profile("user_3").unwrap().is_some());
    }

    #[tokio::test]
    async fn sync_without_provider_is_upstream_failure() {
        let service = setup(None);
        let err = service.sync_profile("user_1").await.unwrap_err();
        assert!(matches!(err, ForumError::Upstream(_)));
    }

    #[tokio::test]
    async fn sync_creates_profile_from_provider() {
        let app = Router::new().route(
            "/users/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({ "id": id, "username": null, "first_name": "Royce", "last_name": "Gracie" }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = IdentityClient::new(format!("http://{addr}"), Some("sk_test".into())).unwrap();
        let service = setup(Some(client));
        let profile = service.sync_profile("user_9").await.unwrap();
        assert_eq!(profile.user_id, "user_9");
        assert_eq!(profile.username, "RoyceGracie");

        let again = service.sync_profile("user_9").await.unwrap();
        assert_eq!(again.id, profile.id);
    }
}
