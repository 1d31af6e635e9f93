use crate::database::models::{ReactionRecord, ReactionTarget, TargetKind};
use crate::database::repositories::{ReactionRepository, ThreadRepository};
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use crate::notifications::{notify, NotificationKind};
use crate::profiles::Actor;
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct ReactionService {
    database: Database,
}

impl ReactionService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Likes `target` if `actor` has not, unlikes it otherwise, and returns
    /// whether the actor likes it afterwards. The reaction row and the
    /// target's stored counter change in one transaction.
    pub fn toggle_like(&self, actor: &Actor, target: &ReactionTarget) -> ForumResult<bool> {
        if actor.id.trim().is_empty() {
            return Err(ForumError::Unauthenticated);
        }
        let liked = self.database.with_transaction(|repos| {
            let reactions = repos.reactions();
            if reactions.stored_like_count(target)?.is_none() {
                return Err(ForumError::not_found(format!("{} not found", target.kind)).into());
            }

            if reactions.get(&actor.id, target)?.is_some() {
                reactions.remove(&actor.id, target)?;
                reactions.adjust_like_count(target, -1)?;
                return Ok(false);
            }

            reactions.add(&ReactionRecord {
                actor_id: actor.id.clone(),
                target_kind: target.kind,
                target_id: target.id.clone(),
                created_at: now_millis(),
            })?;
            reactions.adjust_like_count(target, 1)?;

            if target.kind == TargetKind::Thread {
                if let Some(thread) = repos.threads().get(&target.id)? {
                    notify(
                        &repos,
                        &thread.author_id,
                        actor,
                        &thread.id,
                        NotificationKind::Like,
                        format!("{} liked your thread \"{}\"", actor.name, thread.title),
                    )?;
                }
            }
            Ok(true)
        })?;

        tracing::info!(
            actor_id = %actor.id,
            target_kind = %target.kind,
            target_id = %target.id,
            liked,
            "like toggled"
        );
        Ok(liked)
    }

    pub fn has_liked(&self, actor_id: &str, target: &ReactionTarget) -> ForumResult<bool> {
        let existing = self.database.with_repositories(|repos| {
            let existing = repos.reactions().get(actor_id, target)?;
            Ok(existing)
        })?;
        Ok(existing.is_some())
    }

    /// The counter stored on the target row.
    pub fn like_count(&self, target: &ReactionTarget) -> ForumResult<i64> {
        let count = self.database.with_repositories(|repos| {
            let count = repos.reactions().stored_like_count(target)?;
            Ok(count)
        })?;
        count.ok_or_else(|| ForumError::not_found(format!("{} not found", target.kind)))
    }

    /// Everything `actor_id` currently likes, grouped by target kind.
    pub fn likes_by_actor(&self, actor_id: &str) -> ForumResult<ActorLikes> {
        let reactions = self.database.with_repositories(|repos| {
            let reactions = repos.reactions().list_for_actor(actor_id)?;
            Ok(reactions)
        })?;
        let mut likes = ActorLikes::default();
        for reaction in reactions {
            let bucket = match reaction.target_kind {
                TargetKind::Thread => &mut likes.threads,
                TargetKind::Reply => &mut likes.replies,
                TargetKind::Post => &mut likes.posts,
                TargetKind::Comment => &mut likes.comments,
            };
            bucket.push(reaction.target_id);
        }
        Ok(likes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorLikes {
    pub threads: Vec<String>,
    pub replies: Vec<String>,
    pub posts: Vec<String>,
    pub comments: Vec<String>,
}
