use crate::database::models::{ReplyRecord, Role, ThreadRecord, TopicRecord};
use crate::database::repositories::{
    ProfileRepository, ReactionRepository, ReplyRepository, SqliteRepositories, ThreadRepository,
    TopicRepository,
};
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::notifications::{notify, NotificationKind};
use crate::profiles::{require_role, Actor};
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// Topics, threads and replies. Every write that touches a denormalized
/// counter runs in one transaction with the child row it counts.
#[derive(Clone)]
pub struct ForumService {
    database: Database,
}

impl ForumService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn list_topics(&self) -> ForumResult<Vec<TopicRecord>> {
        let topics = self.database.with_repositories(|repos| {
            let topics = repos.topics().list()?;
            Ok(topics)
        })?;
        Ok(topics)
    }

    pub fn get_topic(&self, topic_id: &str) -> ForumResult<TopicRecord> {
        let topic = self.database.with_repositories(|repos| {
            let topic = repos.topics().get(topic_id)?;
            Ok(topic)
        })?;
        topic.ok_or_else(|| ForumError::not_found("topic not found"))
    }

    /// Admin-only outside of seeding.
    pub fn create_topic(&self, actor: &Actor, input: CreateTopicInput) -> ForumResult<TopicRecord> {
        let topic = self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Admin)?;
            let record = topic_record(input)?;
            repos.topics().create(&record)?;
            Ok(record)
        })?;
        tracing::info!(topic_id = %topic.id, name = %topic.name, "topic created");
        Ok(topic)
    }

    /// Inserts a topic without a role check.
    #[cfg(test)]
    pub(crate) fn insert_topic(&self, input: CreateTopicInput) -> ForumResult<TopicRecord> {
        let topic = self.database.with_repositories(|repos| {
            let record = topic_record(input)?;
            repos.topics().create(&record)?;
            Ok(record)
        })?;
        Ok(topic)
    }

    pub fn create_thread(&self, actor: &Actor, input: CreateThreadInput) -> ForumResult<ThreadRecord> {
        let now = now_millis();
        let record = thread_record(actor, input, now)?;
        self.database
            .with_transaction(|repos| insert_thread(&repos, actor, &record, now))?;

        tracing::info!(
            thread_id = %record.id,
            topic_id = %record.topic_id,
            author_id = %record.author_id,
            "thread created"
        );
        Ok(record)
    }

    /// Adds a reply, bumps the thread's `reply_count`, the topic's
    /// `last_post_at` and the author's `post_count`, and notifies the thread
    /// author. A missing thread leaves no trace.
    pub fn create_reply(&self, actor: &Actor, input: CreateReplyInput) -> ForumResult<ReplyRecord> {
        let now = now_millis();
        let record = reply_record(actor, input, now)?;
        self.database
            .with_transaction(|repos| insert_reply(&repos, actor, &record, now))?;

        tracing::info!(
            reply_id = %record.id,
            thread_id = %record.thread_id,
            author_id = %record.author_id,
            "reply created"
        );
        Ok(record)
    }

    /// Threads of a topic, newest first.
    pub fn list_threads(&self, topic_id: &str) -> ForumResult<Vec<ThreadRecord>> {
        let threads = self.database.with_repositories(|repos| {
            let threads = repos.threads().list_for_topic(topic_id)?;
            Ok(threads)
        })?;
        Ok(threads)
    }

    pub fn list_all_threads(&self) -> ForumResult<Vec<ThreadRecord>> {
        let threads = self.database.with_repositories(|repos| {
            let threads = repos.threads().list_all()?;
            Ok(threads)
        })?;
        Ok(threads)
    }

    pub fn recent_threads(&self, limit: Option<usize>) -> ForumResult<Vec<ThreadRecord>> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_RECENT_LIMIT);
        let threads = self.database.with_repositories(|repos| {
            let threads = repos.threads().list_recent(limit)?;
            Ok(threads)
        })?;
        Ok(threads)
    }

    pub fn threads_by_author(&self, author_id: &str) -> ForumResult<Vec<ThreadRecord>> {
        let threads = self.database.with_repositories(|repos| {
            let threads = repos.threads().list_by_author(author_id)?;
            Ok(threads)
        })?;
        Ok(threads)
    }

    pub fn get_thread(&self, thread_id: &str) -> ForumResult<ThreadDetails> {
        let details = self.database.with_repositories(|repos| {
            let Some(thread) = repos.threads().get(thread_id)? else {
                return Ok(None);
            };
            let replies = live_replies(repos.replies().list_for_thread(thread_id)?);
            Ok(Some(ThreadDetails { thread, replies }))
        })?;
        details.ok_or_else(|| ForumError::not_found("thread not found"))
    }

    /// Replies of a thread, oldest first, soft-deleted ones left out.
    pub fn list_replies(&self, thread_id: &str) -> ForumResult<Vec<ReplyRecord>> {
        let replies = self.database.with_repositories(|repos| {
            let replies = repos.replies().list_for_thread(thread_id)?;
            Ok(replies)
        })?;
        Ok(live_replies(replies))
    }

    pub fn increment_views(&self, thread_id: &str) -> ForumResult<()> {
        let changed = self.database.with_repositories(|repos| {
            let changed = repos.threads().increment_views(thread_id)?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(ForumError::not_found("thread not found"));
        }
        Ok(())
    }

    pub fn set_pinned(&self, actor: &Actor, thread_id: &str, pinned: bool) -> ForumResult<()> {
        self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Moderator)?;
            if repos.threads().set_pinned(thread_id, pinned)? == 0 {
                return Err(ForumError::not_found("thread not found").into());
            }
            Ok(())
        })?;
        tracing::info!(thread_id = %thread_id, pinned, moderator = %actor.id, "thread pin changed");
        Ok(())
    }

    pub fn set_locked(&self, actor: &Actor, thread_id: &str, locked: bool) -> ForumResult<()> {
        self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Moderator)?;
            if repos.threads().set_locked(thread_id, locked)? == 0 {
                return Err(ForumError::not_found("thread not found").into());
            }
            Ok(())
        })?;
        tracing::info!(thread_id = %thread_id, locked, moderator = %actor.id, "thread lock changed");
        Ok(())
    }

    /// Removes a thread with its replies, reactions and notifications, and
    /// gives the slot back on the topic's `thread_count`.
    pub fn delete_thread(&self, actor: &Actor, thread_id: &str) -> ForumResult<()> {
        self.database.with_transaction(|repos| {
            require_role(&repos, &actor.id, Role::Moderator)?;
            let Some(thread) = repos.threads().get(thread_id)? else {
                return Err(ForumError::not_found("thread not found").into());
            };
            repos.reactions().remove_for_thread(&thread.id)?;
            repos.threads().delete(&thread.id)?;
            repos.topics().record_removed_thread(&thread.topic_id)?;
            Ok(())
        })?;
        tracing::info!(thread_id = %thread_id, moderator = %actor.id, "thread deleted");
        Ok(())
    }

    /// Soft-deletes a reply. The author may delete their own reply; anyone
    /// else needs the moderator role. `reply_count` drops exactly once.
    pub fn delete_reply(&self, actor: &Actor, reply_id: &str) -> ForumResult<()> {
        ensure_actor(actor)?;
        self.database.with_transaction(|repos| {
            let reply = match repos.replies().get(reply_id)? {
                Some(reply) if !reply.is_deleted => reply,
                _ => return Err(ForumError::not_found("reply not found").into()),
            };
            if reply.author_id != actor.id {
                require_role(&repos, &actor.id, Role::Moderator)?;
            }
            if repos.replies().mark_deleted(&reply.id, now_millis())? == 1 {
                repos.threads().record_removed_reply(&reply.thread_id)?;
            }
            Ok(())
        })?;
        tracing::info!(reply_id = %reply_id, actor_id = %actor.id, "reply deleted");
        Ok(())
    }
}

fn ensure_actor(actor: &Actor) -> ForumResult<()> {
    if actor.id.trim().is_empty() {
        return Err(ForumError::Unauthenticated);
    }
    Ok(())
}

fn live_replies(replies: Vec<ReplyRecord>) -> Vec<ReplyRecord> {
    replies.into_iter().filter(|reply| !reply.is_deleted).collect()
}

/// Validates thread input and builds the row. Nothing is written.
pub(crate) fn thread_record(
    actor: &Actor,
    input: CreateThreadInput,
    now: i64,
) -> ForumResult<ThreadRecord> {
    ensure_actor(actor)?;
    if input.title.trim().is_empty() {
        return Err(ForumError::invalid("thread title may not be empty"));
    }
    if input.content.trim().is_empty() {
        return Err(ForumError::invalid("thread content may not be empty"));
    }
    Ok(ThreadRecord {
        id: Uuid::new_v4().to_string(),
        topic_id: input.topic_id,
        title: input.title.trim().to_string(),
        content: input.content,
        author_id: actor.id.clone(),
        author_name: actor.name.clone(),
        author_image_url: actor.image_url.clone(),
        views: 0,
        likes: 0,
        reply_count: 0,
        is_pinned: false,
        is_locked: false,
        created_at: input.created_at.unwrap_or(now),
        updated_at: None,
    })
}

/// Writes a thread and bumps the topic's `thread_count` and the author's
/// `post_count`. Runs inside the caller's transaction.
pub(crate) fn insert_thread(
    repos: &SqliteRepositories<'_>,
    actor: &Actor,
    record: &ThreadRecord,
    now: i64,
) -> anyhow::Result<()> {
    if repos.topics().get(&record.topic_id)?.is_none() {
        return Err(ForumError::not_found("topic not found").into());
    }
    repos.threads().create(record)?;
    repos.topics().record_new_thread(&record.topic_id, now)?;
    repos.profiles().record_activity(&actor.id, now)?;
    Ok(())
}

pub(crate) fn reply_record(
    actor: &Actor,
    input: CreateReplyInput,
    now: i64,
) -> ForumResult<ReplyRecord> {
    ensure_actor(actor)?;
    if input.content.trim().is_empty() {
        return Err(ForumError::invalid("reply content may not be empty"));
    }
    Ok(ReplyRecord {
        id: Uuid::new_v4().to_string(),
        thread_id: input.thread_id,
        content: input.content,
        author_id: actor.id.clone(),
        author_name: actor.name.clone(),
        author_image_url: actor.image_url.clone(),
        likes: 0,
        is_deleted: false,
        created_at: input.created_at.unwrap_or(now),
        updated_at: None,
    })
}

/// Writes a reply, bumps the thread's `reply_count`, the topic's
/// `last_post_at` and the author's `post_count`, and notifies the thread
/// author. A missing or locked thread fails before anything is written.
pub(crate) fn insert_reply(
    repos: &SqliteRepositories<'_>,
    actor: &Actor,
    record: &ReplyRecord,
    now: i64,
) -> anyhow::Result<()> {
    let Some(thread) = repos.threads().get(&record.thread_id)? else {
        return Err(ForumError::not_found("thread not found").into());
    };
    if thread.is_locked {
        return Err(ForumError::invalid("thread is locked").into());
    }
    repos.replies().create(record)?;
    if repos.threads().record_new_reply(&thread.id, now)? == 0 {
        return Err(ForumError::not_found("thread not found").into());
    }
    repos.topics().touch_last_post(&thread.topic_id, now)?;
    repos.profiles().record_activity(&actor.id, now)?;
    notify(
        repos,
        &thread.author_id,
        actor,
        &thread.id,
        NotificationKind::Reply,
        format!("{} replied to your thread \"{}\"", actor.name, thread.title),
    )?;
    Ok(())
}

pub(crate) fn topic_record(input: CreateTopicInput) -> anyhow::Result<TopicRecord> {
    if input.name.trim().is_empty() {
        return Err(ForumError::invalid("topic name may not be empty").into());
    }
    Ok(TopicRecord {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        description: input.description,
        icon: input.icon,
        color: input.color,
        thread_count: 0,
        last_post_at: None,
        created_at: now_millis(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDetails {
    pub thread: ThreadRecord,
    pub replies: Vec<ReplyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateThreadInput {
    pub topic_id: String,
    pub title: String,
    pub content: String,
    /// Backdated creation time for seeded threads. If None, uses current time.
    #[serde(default, skip_deserializing)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReplyInput {
    pub thread_id: String,
    pub content: String,
    #[serde(default, skip_deserializing)]
    pub created_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ProfileRecord;
    use crate::database::repositories::NotificationRepository;
    use rusqlite::Connection;

    fn setup_service() -> (Database, ForumService) {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        (db.clone(), ForumService::new(db))
    }

    fn add_profile(db: &Database, user_id: &str, role: Role) {
        db.with_repositories(|repos| {
            repos.profiles().create(&ProfileRecord {
                id: format!("profile-{user_id}"),
                user_id: user_id.into(),
                username: user_id.to_uppercase(),
                bio: None,
                joined_at: 0,
                post_count: 0,
                role,
                last_active_at: None,
            })?;
            Ok(())
        })
        .expect("profile");
    }

    fn post_count(db: &Database, user_id: &str) -> i64 {
        db.with_repositories(|repos| {
            let profile = repos.profiles().get_by_user(user_id)?;
            Ok(profile.map(|p| p.post_count).unwrap_or_default())
        })
        .expect("profile lookup")
    }

    fn boxing_thread(service: &ForumService, author: &Actor) -> (TopicRecord, ThreadRecord) {
        let topic = service
            .insert_topic(CreateTopicInput {
                name: "Boxing".into(),
                description: "Sweet science".into(),
                icon: "dumbbell".into(),
                color: "border-yellow-500".into(),
            })
            .expect("topic");
        let thread = service
            .create_thread(
                author,
                CreateThreadInput {
                    topic_id: topic.id.clone(),
                    title: "Jab drills".into(),
                    content: "<p>What do you drill?</p>".into(),
                    created_at: None,
                },
            )
            .expect("thread");
        (topic, thread)
    }

    #[test]
    fn create_thread_updates_topic_and_author() {
        let (db, service) = setup_service();
        add_profile(&db, "u1", Role::User);
        let author = Actor::new("u1", "U1");
        let (topic, thread) = boxing_thread(&service, &author);

        let topic = service.get_topic(&topic.id).unwrap();
        assert_eq!(topic.thread_count, 1);
        assert!(topic.last_post_at.is_some());
        assert_eq!(post_count(&db, "u1"), 1);
        assert_eq!(service.list_threads(&topic.id).unwrap()[0].id, thread.id);
    }

    #[test]
    fn create_thread_on_missing_topic_leaves_nothing() {
        let (_, service) = setup_service();
        let err = service
            .create_thread(
                &Actor::new("u1", "U1"),
                CreateThreadInput {
                    topic_id: "nope".into(),
                    title: "Lost".into(),
                    content: "<p>hello</p>".into(),
                    created_at: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ForumError::NotFound(_)));
        assert!(service.list_all_threads().unwrap().is_empty());
    }

    #[test]
    fn create_reply_bumps_counters_once() {
        let (db, service) = setup_service();
        add_profile(&db, "owner", Role::User);
        add_profile(&db, "u2", Role::User);
        let (_, thread) = boxing_thread(&service, &Actor::new("owner", "Owner"));
        let before = post_count(&db, "u2");

        service
            .create_reply(
                &Actor::new("u2", "U2"),
                CreateReplyInput {
                    thread_id: thread.id.clone(),
                    content: "<p>Double jab, then cross.</p>".into(),
                    created_at: None,
                },
            )
            .unwrap();

        let details = service.get_thread(&thread.id).unwrap();
        assert_eq!(details.thread.reply_count, 1);
        assert!(details.thread.updated_at.is_some());
        assert_eq!(details.replies.len(), 1);
        assert_eq!(post_count(&db, "u2"), before + 1);

        let inbox = db
            .with_repositories(|repos| {
                let list = repos.notifications().list_for_user("owner")?;
                Ok(list)
            })
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, "reply");
        assert_eq!(inbox[0].from_user_id, "u2");
    }

    #[test]
    fn create_reply_on_missing_thread_is_not_found_without_orphan() {
        let (db, service) = setup_service();
        add_profile(&db, "u1", Role::User);
        let err = service
            .create_reply(
                &Actor::new("u1", "U1"),
                CreateReplyInput {
                    thread_id: "missing".into(),
                    content: "<p>anyone?</p>".into(),
                    created_at: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ForumError::NotFound(_)));

        let orphans: i64 = db
            .with_repositories(|repos| {
                let count = repos
                    .conn()
                    .query_row("SELECT COUNT(*) FROM replies", [], |row| row.get(0))?;
                Ok(count)
            })
            .unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(post_count(&db, "u1"), 0);
    }

    #[test]
    fn locked_threads_reject_replies() {
        let (db, service) = setup_service();
        add_profile(&db, "mod", Role::Moderator);
        let (_, thread) = boxing_thread(&service, &Actor::new("u1", "U1"));
        let moderator = Actor::new("mod", "Mod");

        service.set_locked(&moderator, &thread.id, true).unwrap();
        let err = service
            .create_reply(
                &Actor::new("u2", "U2"),
                CreateReplyInput {
                    thread_id: thread.id.clone(),
                    content: "<p>late</p>".into(),
                    created_at: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ForumError::InvalidInput(_)));
        assert_eq!(service.get_thread(&thread.id).unwrap().thread.reply_count, 0);
    }

    #[test]
    fn moderation_requires_role() {
        let (db, service) = setup_service();
        add_profile(&db, "u1", Role::User);
        let (_, thread) = boxing_thread(&service, &Actor::new("u1", "U1"));

        let err = service
            .set_pinned(&Actor::new("u1", "U1"), &thread.id, true)
            .unwrap_err();
        assert!(matches!(err, ForumError::Unauthorized(_)));
        let err = service
            .delete_thread(&Actor::new("stranger", "S"), &thread.id)
            .unwrap_err();
        assert!(matches!(err, ForumError::Unauthorized(_)));
        assert!(!service.get_thread(&thread.id).unwrap().thread.is_pinned);
    }

    #[test]
    fn delete_thread_cascades_and_decrements_topic() {
        let (db, service) = setup_service();
        add_profile(&db, "mod", Role::Moderator);
        let (topic, thread) = boxing_thread(&service, &Actor::new("u1", "U1"));
        service
            .create_reply(
                &Actor::new("u2", "U2"),
                CreateReplyInput {
                    thread_id: thread.id.clone(),
                    content: "<p>hi</p>".into(),
                    created_at: None,
                },
            )
            .unwrap();

        service
            .delete_thread(&Actor::new("mod", "Mod"), &thread.id)
            .unwrap();

        assert!(matches!(
            service.get_thread(&thread.id),
            Err(ForumError::NotFound(_))
        ));
        assert_eq!(service.get_topic(&topic.id).unwrap().thread_count, 0);
        let leftovers: i64 = db
            .with_repositories(|repos| {
                let count = repos.conn().query_row(
                    "SELECT COUNT(*) FROM replies WHERE thread_id = ?1",
                    [&thread.id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn delete_reply_decrements_once() {
        let (db, service) = setup_service();
        add_profile(&db, "mod", Role::Moderator);
        let (_, thread) = boxing_thread(&service, &Actor::new("u1", "U1"));
        let author = Actor::new("u2", "U2");
        let reply = service
            .create_reply(
                &author,
                CreateReplyInput {
                    thread_id: thread.id.clone(),
                    content: "<p>oops</p>".into(),
                    created_at: None,
                },
            )
            .unwrap();

        let err = service
            .delete_reply(&Actor::new("u3", "U3"), &reply.id)
            .unwrap_err();
        assert!(matches!(err, ForumError::Unauthorized(_)));

        service.delete_reply(&author, &reply.id).unwrap();
        let again = service.delete_reply(&Actor::new("mod", "Mod"), &reply.id);
        assert!(matches!(again, Err(ForumError::NotFound(_))));

        let details = service.get_thread(&thread.id).unwrap();
        assert_eq!(details.thread.reply_count, 0);
        assert!(details.replies.is_empty());
    }

    #[test]
    fn increment_views_counts_every_call() {
        let (_, service) = setup_service();
        let (_, thread) = boxing_thread(&service, &Actor::new("u1", "U1"));
        service.increment_views(&thread.id).unwrap();
        service.increment_views(&thread.id).unwrap();
        assert_eq!(service.get_thread(&thread.id).unwrap().thread.views, 2);
        assert!(matches!(
            service.increment_views("missing"),
            Err(ForumError::NotFound(_))
        ));
    }

    #[test]
    fn recent_threads_defaults_to_five() {
        let (_, service) = setup_service();
        let (topic, _) = boxing_thread(&service, &Actor::new("u1", "U1"));
        for i in 0..6 {
            service
                .create_thread(
                    &Actor::new("u1", "U1"),
                    CreateThreadInput {
                        topic_id: topic.id.clone(),
                        title: format!("Thread {i}"),
                        content: "<p>x</p>".into(),
                        created_at: None,
                    },
                )
                .unwrap();
        }
        let recent = service.recent_threads(None).unwrap();
        assert_eq!(recent.len(), DEFAULT_RECENT_LIMIT);
        assert_eq!(recent[0].title, "Thread 5");
        assert_eq!(service.threads_by_author("u1").unwrap().len(), 7);
    }
}
