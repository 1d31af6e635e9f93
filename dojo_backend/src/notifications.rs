use crate::database::models::NotificationRecord;
use crate::database::repositories::{NotificationRepository, SqliteRepositories};
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::profiles::Actor;
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reply,
    Like,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reply => "reply",
            NotificationKind::Like => "like",
        }
    }
}

/// Records a notification for `recipient` about activity on one of their
/// threads. Nothing is written when the actor is the recipient.
pub(crate) fn notify(
    repos: &SqliteRepositories<'_>,
    recipient: &str,
    from: &Actor,
    thread_id: &str,
    kind: NotificationKind,
    message: String,
) -> anyhow::Result<Option<NotificationRecord>> {
    if recipient == from.id {
        return Ok(None);
    }
    let record = NotificationRecord {
        id: Uuid::new_v4().to_string(),
        user_id: recipient.to_string(),
        kind: kind.as_str().to_string(),
        thread_id: thread_id.to_string(),
        from_user_id: from.id.clone(),
        from_user_name: from.name.clone(),
        message,
        is_read: false,
        created_at: now_millis(),
    };
    repos.notifications().create(&record)?;
    tracing::debug!(
        recipient = %recipient,
        kind = kind.as_str(),
        thread_id = %thread_id,
        "notification queued"
    );
    Ok(Some(record))
}

#[derive(Clone)]
pub struct NotificationService {
    database: Database,
}

impl NotificationService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Notifications addressed to `user_id`, newest first.
    pub fn list(&self, user_id: &str) -> ForumResult<Vec<NotificationRecord>> {
        ensure_actor(user_id)?;
        let notifications = self.database.with_repositories(|repos| {
            let notifications = repos.notifications().list_for_user(user_id)?;
            Ok(notifications)
        })?;
        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: &str) -> ForumResult<usize> {
        ensure_actor(user_id)?;
        let count = self.database.with_repositories(|repos| {
            let count = repos.notifications().count_unread(user_id)?;
            Ok(count)
        })?;
        Ok(count)
    }

    /// Only the recipient may mark a notification as read.
    pub fn mark_as_read(&self, actor_id: &str, notification_id: &str) -> ForumResult<()> {
        ensure_actor(actor_id)?;
        self.database.with_transaction(|repos| {
            let notifications = repos.notifications();
            let Some(existing) = notifications.get(notification_id)? else {
                return Err(ForumError::not_found("notification not found").into());
            };
            if existing.user_id != actor_id {
                return Err(ForumError::Unauthorized(
                    "notification belongs to another user".into(),
                )
                .into());
            }
            notifications.mark_read(notification_id)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Returns how many notifications flipped from unread to read.
    pub fn mark_all_as_read(&self, user_id: &str) -> ForumResult<usize> {
        ensure_actor(user_id)?;
        let changed = self.database.with_repositories(|repos| {
            let changed = repos.notifications().mark_all_read(user_id)?;
            Ok(changed)
        })?;
        tracing::debug!(user_id = %user_id, changed, "notifications marked read");
        Ok(changed)
    }
}

fn ensure_actor(actor_id: &str) -> ForumResult<()> {
    if actor_id.trim().is_empty() {
        return Err(ForumError::Unauthenticated);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ThreadRecord, TopicRecord};
    use crate::database::repositories::{ThreadRepository, TopicRepository};
    use rusqlite::Connection;

    fn setup() -> (Database, NotificationService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        db.with_repositories(|repos| {
            repos.topics().create(&TopicRecord {
                id: "topic".into(),
                name: "Judo".into(),
                description: "Throws".into(),
                icon: "users".into(),
                color: "border-purple-500".into(),
                thread_count: 0,
                last_post_at: None,
                created_at: 1,
            })?;
            repos.threads().create(&ThreadRecord {
                id: "thread".into(),
                topic_id: "topic".into(),
                title: "Uchi mata".into(),
                content: "<p>?</p>".into(),
                author_id: "owner".into(),
                author_name: "Owner".into(),
                author_image_url: None,
                views: 0,
                likes: 0,
                reply_count: 0,
                is_pinned: false,
                is_locked: false,
                created_at: 1,
                updated_at: None,
            })?;
            Ok(())
        })
        .expect("fixture");
        (db.clone(), NotificationService::new(db))
    }

    fn send(db: &Database, recipient: &str, from: &Actor) -> Option<NotificationRecord> {
        db.with_repositories(|repos| {
            notify(
                &repos,
                recipient,
                from,
                "thread",
                NotificationKind::Reply,
                format!("{} replied", from.name),
            )
        })
        .expect("notify")
    }

    #[test]
    fn self_activity_is_not_notified() {
        let (db, service) = setup();
        assert!(send(&db, "owner", &Actor::new("owner", "Owner")).is_none());
        assert!(service.list("owner").unwrap().is_empty());
    }

    #[test]
    fn mark_as_read_is_restricted_to_recipient() {
        let (db, service) = setup();
        let sent = send(&db, "owner", &Actor::new("fan", "Fan")).expect("sent");
        assert_eq!(service.unread_count("owner").unwrap(), 1);

        let stranger = service.mark_as_read("fan", &sent.id);
        assert!(matches!(stranger, Err(ForumError::Unauthorized(_))));
        assert!(matches!(
            service.mark_as_read("owner", "missing"),
            Err(ForumError::NotFound(_))
        ));

        service.mark_as_read("owner", &sent.id).unwrap();
        assert_eq!(service.unread_count("owner").unwrap(), 0);
    }

    #[test]
    fn mark_all_as_read_touches_only_recipient() {
        let (db, service) = setup();
        send(&db, "owner", &Actor::new("a", "A"));
        send(&db, "owner", &Actor::new("b", "B"));
        send(&db, "other", &Actor::new("a", "A"));

        assert_eq!(service.mark_all_as_read("owner").unwrap(), 2);
        assert_eq!(service.unread_count("owner").unwrap(), 0);
        assert_eq!(service.unread_count("other").unwrap(), 1);

        let listed = service.list("owner").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].from_user_id, "b");
        assert!(listed.iter().all(|n| n.is_read));
    }

    #[test]
    fn missing_actor_is_unauthenticated() {
        let (_, service) = setup();
        assert!(matches!(service.list(""), Err(ForumError::Unauthenticated)));
    }
}
