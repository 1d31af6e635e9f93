//! Sample data for a fresh forum: the martial-arts topics, three profiles of
//! increasing rank, and a handful of threads with replies per topic.

use crate::database::models::{ProfileRecord, Role};
use crate::database::repositories::{ProfileRepository, ThreadRepository, TopicRepository};
use crate::database::Database;
use crate::error::ForumResult;
use crate::forum::{
    insert_reply, insert_thread, reply_record, thread_record, topic_record, CreateReplyInput,
    CreateThreadInput, CreateTopicInput,
};
use crate::profiles::Actor;
use crate::utils::now_millis;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const AVATAR_PLACEHOLDER: &str = "/placeholder.svg?height=40&width=40";

const TOPICS: [(&str, &str, &str, &str); 8] = [
    (
        "MMA",
        "Mixed Martial Arts discussions, UFC events, and fighter analysis",
        "trending-up",
        "border-red-500",
    ),
    (
        "Brazilian Jiu-Jitsu",
        "BJJ techniques, competitions, belt progression, and training",
        "shield",
        "border-blue-500",
    ),
    (
        "Boxing",
        "Boxing techniques, professional bouts, training methods, and equipment",
        "dumbbell",
        "border-yellow-500",
    ),
    (
        "Taekwondo",
        "Taekwondo forms, competitions, belt advancement, and training",
        "flame",
        "border-green-500",
    ),
    (
        "Judo",
        "Judo throws, competitions, training methods, and philosophy",
        "users",
        "border-purple-500",
    ),
    (
        "Karate",
        "Various Karate styles, kata, kumite, and dojo training",
        "award",
        "border-orange-500",
    ),
    (
        "Muay Thai",
        "Muay Thai techniques, fights, training camps, and equipment",
        "swords",
        "border-pink-500",
    ),
    (
        "Wrestling",
        "Freestyle and Greco-Roman wrestling, techniques, and competitions",
        "users",
        "border-indigo-500",
    ),
];

/// `(user_id, username, bio, days since joining, role)`
const PROFILES: [(&str, &str, &str, i64, Role); 3] = [
    (
        "sample-user-1",
        "MartialArtist42",
        "Passionate about martial arts for over 5 years",
        90,
        Role::User,
    ),
    (
        "sample-user-2",
        "BlackBelt2023",
        "BJJ black belt and MMA enthusiast",
        180,
        Role::Moderator,
    ),
    (
        "sample-user-3",
        "CoachMike",
        "Professional martial arts coach with 15+ years of experience",
        365,
        Role::Admin,
    ),
];

const THREAD_TITLES: [&str; 10] = [
    "Best {} techniques for beginners",
    "{} competition preparation tips",
    "Recommended {} schools in New York",
    "{} vs Traditional Karate - Differences and Similarities",
    "Dealing with injuries in {}",
    "How to improve your {} skills quickly",
    "{} training routine for busy professionals",
    "Essential equipment for {} practitioners",
    "Famous {} fighters and their techniques",
    "{} for self-defense: What works and what doesn't",
];

const THREAD_BODIES: [&str; 3] = [
    "<p>I've been practicing {} for about 3 months now and I'm looking for advice on the most \
     effective techniques to focus on as a beginner.</p><p>Which moves build a solid foundation \
     and proper body mechanics?</p>",
    "<p>I have my first {} competition coming up in a month. What should I focus on in my \
     training?</p><ul><li>Pre-competition routines</li><li>Mental preparation</li>\
     <li>Competition day tips</li></ul>",
    "<p>I'm looking to improve my {} conditioning. What exercises do you recommend?</p>\
     <p>I get tired quickly during longer sessions and want more stamina.</p>",
];

const REPLY_BODIES: [&str; 4] = [
    "<p>Welcome to {}! Focus on stance and balance, basic footwork, and core strength before \
     anything flashy.</p>",
    "<p>I've taught {} for 15 years. Consistency beats complexity: drill the fundamentals \
     daily and don't neglect flexibility.</p>",
    "<p>In {}, train with purpose. Think about the mechanics, the application, and what could \
     go wrong every time you drill.</p>",
    "<p>What helped my {} the most: recording my sessions, rotating partners, and studying \
     high-level competition footage.</p>",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedOutcome {
    pub seeded: bool,
    pub message: String,
    pub topics: usize,
    pub threads: usize,
    pub replies: usize,
}

/// Fills an empty forum. Does nothing once any topic exists. The emptiness
/// check and every insert share one transaction; a failure leaves the forum
/// empty.
pub fn seed(database: &Database) -> ForumResult<SeedOutcome> {
    let now = now_millis();
    let mut rng = rand::rng();

    let seeded = database.with_transaction(|repos| {
        let existing = repos.topics().count()?;
        if existing > 0 {
            tracing::info!(topics = existing, "seed skipped; topics already present");
            return Ok(None);
        }

        let profiles = repos.profiles();
        for (user_id, username, bio, days, role) in PROFILES {
            if profiles.get_by_user(user_id)?.is_none() {
                profiles.create(&ProfileRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.into(),
                    username: username.into(),
                    bio: Some(bio.into()),
                    joined_at: now - days * DAY_MS,
                    post_count: 0,
                    role,
                    last_active_at: Some(now),
                })?;
            }
        }
        let authors: Vec<Actor> = PROFILES
            .iter()
            .map(|(user_id, username, ..)| {
                Actor::new(*user_id, *username).with_image(AVATAR_PLACEHOLDER)
            })
            .collect();

        let mut threads = 0;
        let mut replies = 0;
        for (name, description, icon, color) in TOPICS {
            let topic = topic_record(CreateTopicInput {
                name: name.into(),
                description: description.into(),
                icon: icon.into(),
                color: color.into(),
            })?;
            repos.topics().create(&topic)?;

            for _ in 0..rng.random_range(3..=5) {
                let author = pick(&mut rng, &authors);
                let thread = thread_record(
                    author,
                    CreateThreadInput {
                        topic_id: topic.id.clone(),
                        title: fill(*pick(&mut rng, &THREAD_TITLES), name),
                        content: fill(*pick(&mut rng, &THREAD_BODIES), name),
                        created_at: Some(now - rng.random_range(0..7 * DAY_MS)),
                    },
                    now,
                )?;
                insert_thread(&repos, author, &thread, now)?;
                repos
                    .threads()
                    .set_views(&thread.id, rng.random_range(50..250))?;
                threads += 1;

                for _ in 0..rng.random_range(2..=6) {
                    let author = pick(&mut rng, &authors);
                    let reply = reply_record(
                        author,
                        CreateReplyInput {
                            thread_id: thread.id.clone(),
                            content: fill(*pick(&mut rng, &REPLY_BODIES), name),
                            created_at: Some(now - rng.random_range(0..3 * DAY_MS)),
                        },
                        now,
                    )?;
                    insert_reply(&repos, author, &reply, now)?;
                    replies += 1;
                }
            }
        }
        Ok(Some((threads, replies)))
    })?;

    let Some((threads, replies)) = seeded else {
        return Ok(SeedOutcome {
            seeded: false,
            message: "Database already seeded".into(),
            topics: 0,
            threads: 0,
            replies: 0,
        });
    };
    tracing::info!(topics = TOPICS.len(), threads, replies, "database seeded");
    Ok(SeedOutcome {
        seeded: true,
        message: "Database seeded successfully".into(),
        topics: TOPICS.len(),
        threads,
        replies,
    })
}

fn pick<'a, T>(rng: &mut impl Rng, items: &'a [T]) -> &'a T {
    // Every table above is non-empty.
    items.choose(rng).unwrap_or(&items[0])
}

fn fill(template: &str, topic: &str) -> String {
    template.replace("{}", topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn database() -> Database {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let db = Database::from_connection(conn, true);
        db.ensure_migrations().expect("migrations");
        db
    }

    #[test]
    fn seed_populates_then_skips() {
        let db = database();
        let outcome = seed(&db).unwrap();
        assert!(outcome.seeded);
        assert_eq!(outcome.topics, 8);
        assert!((24..=40).contains(&outcome.threads));
        assert!(outcome.replies >= outcome.threads * 2);

        let again = seed(&db).unwrap();
        assert!(!again.seeded);
        assert_eq!(again.message, "Database already seeded");
    }

    #[test]
    fn seeded_counters_match_rows() {
        let db = database();
        let outcome = seed(&db).unwrap();

        let topics = db
            .with_repositories(|repos| {
                let topics = repos.topics().list()?;
                Ok(topics)
            })
            .unwrap();
        let thread_total: i64 = topics.iter().map(|t| t.thread_count).sum();
        assert_eq!(thread_total as usize, outcome.threads);

        let (reply_total, views_ok) = db
            .with_repositories(|repos| {
                let threads = repos.threads().list_all()?;
                let replies: i64 = threads.iter().map(|t| t.reply_count).sum();
                let views_ok = threads.iter().all(|t| (50..250).contains(&t.views));
                Ok((replies, views_ok))
            })
            .unwrap();
        assert_eq!(reply_total as usize, outcome.replies);
        assert!(views_ok);

        let posts: i64 = db
            .with_repositories(|repos| {
                let total = repos.conn().query_row(
                    "SELECT SUM(post_count) FROM user_profiles",
                    [],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .unwrap();
        assert_eq!(posts as usize, outcome.threads + outcome.replies);
        assert_eq!(db.reconcile_counters().unwrap().total(), 0);
    }

    #[test]
    fn failed_seed_leaves_forum_empty() {
        let db = database();
        db.with_repositories(|repos| {
            repos.conn().execute_batch(
                "CREATE TRIGGER replies_frozen BEFORE INSERT ON replies
                 BEGIN SELECT RAISE(ABORT, 'replies frozen'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        assert!(seed(&db).is_err());
        let (topics, threads, profiles) = db
            .with_repositories(|repos| {
                let conn = repos.conn();
                let count = |table: &str| -> rusqlite::Result<i64> {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                };
                Ok((count("topics")?, count("threads")?, count("user_profiles")?))
            })
            .unwrap();
        assert_eq!((topics, threads, profiles), (0, 0, 0));

        db.with_repositories(|repos| {
            repos.conn().execute_batch("DROP TRIGGER replies_frozen;")?;
            Ok(())
        })
        .unwrap();
        let outcome = seed(&db).unwrap();
        assert!(outcome.seeded);
        assert_eq!(db.reconcile_counters().unwrap().total(), 0);
    }
}
