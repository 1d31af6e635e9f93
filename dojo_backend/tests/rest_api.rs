use dojo_backend::api::{self, AppState};
use dojo_backend::bootstrap;
use dojo_backend::config::{DojoConfig, DojoPaths};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

/// Seeded sample accounts, one per role.
const MEMBER: (&str, &str) = ("sample-user-1", "MartialArtist42");
const MODERATOR: (&str, &str) = ("sample-user-2", "BlackBelt2023");
const ADMIN: (&str, &str) = ("sample-user-3", "CoachMike");

struct TestServer {
    _dir: TempDir,
    server: tokio::task::JoinHandle<()>,
    base_url: String,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempdir().expect("tempdir");
        let config = DojoConfig::new(0, DojoPaths::from_base_dir(dir.path()).expect("paths"));
        let resources = bootstrap::initialize(&config).expect("bootstrap");
        let state = AppState::new(config, resources.database).expect("state");
        let router = api::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service()).await;
        });

        let server = Self {
            _dir: dir,
            server,
            base_url: format!("http://{addr}"),
            client: Client::new(),
        };
        server.wait_for_health().await;
        server
    }

    async fn wait_for_health(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("server did not become healthy in time");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    async fn shutdown(self) {
        self.server.abort();
        let _ = self.server.await;
    }
}

trait AsUser {
    fn as_user(self, user: (&str, &str)) -> Self;
}

impl AsUser for RequestBuilder {
    fn as_user(self, (id, name): (&str, &str)) -> Self {
        self.header("x-user-id", id).header("x-user-name", name)
    }
}

async fn json_body(resp: reqwest::Response) -> Value {
    resp.json().await.expect("json body")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forum_flow_keeps_counters_and_roles() {
    let server = TestServer::start().await;

    let seeded = json_body(server.post("/seed").send().await.unwrap()).await;
    assert_eq!(seeded["seeded"], true);
    assert_eq!(seeded["topics"], 8);
    let again = json_body(server.post("/seed").send().await.unwrap()).await;
    assert_eq!(again["seeded"], false);
    assert_eq!(again["message"], "Database already seeded");

    let topic_body = json!({ "name": "Sambo", "description": "Soviet grappling" });
    let anonymous = server.post("/topics").json(&topic_body).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    let member = server
        .post("/topics")
        .as_user(MEMBER)
        .json(&topic_body)
        .send()
        .await
        .unwrap();
    assert_eq!(member.status(), StatusCode::FORBIDDEN);
    let created = server
        .post("/topics")
        .as_user(ADMIN)
        .json(&topic_body)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let topic_id = json_body(created).await["id"].as_str().unwrap().to_string();

    let thread = server
        .post("/threads")
        .as_user(("fan-1", "Fan One"))
        .json(&json!({
            "topic_id": topic_id,
            "title": "Leg locks in sambo",
            "content": "<p>How legal are heel hooks?</p>"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(thread.status(), StatusCode::CREATED);
    let thread_id = json_body(thread).await["id"].as_str().unwrap().to_string();

    let topic = json_body(server.get(&format!("/topics/{topic_id}")).send().await.unwrap()).await;
    assert_eq!(topic["thread_count"], 1);

    let reply = server
        .post(&format!("/threads/{thread_id}/replies"))
        .as_user(("fan-2", "Fan Two"))
        .json(&json!({ "content": "<p>Banned in most rule sets.</p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(reply.status(), StatusCode::CREATED);

    let details = json_body(server.get(&format!("/threads/{thread_id}")).send().await.unwrap()).await;
    assert_eq!(details["thread"]["reply_count"], 1);
    assert_eq!(details["replies"].as_array().unwrap().len(), 1);

    let unread = json_body(
        server
            .get("/notifications/unread-count")
            .as_user(("fan-1", "Fan One"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(unread["unread"], 1);

    let like_path = format!("/likes/thread/{thread_id}");
    let liked = json_body(
        server
            .post(&like_path)
            .as_user(("fan-2", "Fan Two"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(liked, json!({ "liked": true, "like_count": 1 }));
    let unliked = json_body(
        server
            .post(&like_path)
            .as_user(("fan-2", "Fan Two"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(unliked, json!({ "liked": false, "like_count": 0 }));

    let bad_kind = server
        .post(&format!("/likes/banana/{thread_id}"))
        .as_user(MEMBER)
        .send()
        .await
        .unwrap();
    assert_eq!(bad_kind.status(), StatusCode::BAD_REQUEST);

    let orphan = server
        .post("/threads/missing/replies")
        .as_user(MEMBER)
        .json(&json!({ "content": "<p>hello?</p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(orphan.status(), StatusCode::NOT_FOUND);

    let member_lock = server
        .post(&format!("/threads/{thread_id}/lock"))
        .as_user(MEMBER)
        .json(&json!({ "locked": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(member_lock.status(), StatusCode::FORBIDDEN);
    let lock = server
        .post(&format!("/threads/{thread_id}/lock"))
        .as_user(MODERATOR)
        .json(&json!({ "locked": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(lock.status(), StatusCode::NO_CONTENT);
    let locked_reply = server
        .post(&format!("/threads/{thread_id}/replies"))
        .as_user(("fan-2", "Fan Two"))
        .json(&json!({ "content": "<p>One more thing</p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(locked_reply.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blog_posts_with_uploaded_images() {
    let server = TestServer::start().await;
    server.post("/seed").send().await.unwrap();

    let ticket = json_body(server.post("/storage/upload-url").send().await.unwrap()).await;
    let upload_url = ticket["upload_url"].as_str().unwrap().to_string();
    let uploaded = server
        .post(&upload_url)
        .header("content-type", "image/png")
        .body(PNG_BYTES.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(uploaded.status(), StatusCode::CREATED);
    let storage_id = json_body(uploaded).await["storage_id"]
        .as_str()
        .unwrap()
        .to_string();

    let reused = server
        .post(&upload_url)
        .body(PNG_BYTES.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(reused.status(), StatusCode::NOT_FOUND);

    let download = server
        .get(&format!("/storage/{storage_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(download.headers()["content-type"], "image/png");
    assert_eq!(download.headers()["cache-control"], "public, max-age=31536000");
    assert_eq!(download.bytes().await.unwrap().as_ref(), PNG_BYTES);

    let post_body = json!({
        "title": "My First Kata",
        "description": "Heian Shodan notes",
        "content": "<p>Twenty-one moves.</p>",
        "category": "Karate",
        "tags": ["kata", "shotokan"],
        "image_id": storage_id
    });
    let forbidden = server
        .post("/posts")
        .as_user(MEMBER)
        .json(&post_body)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let first = server
        .post("/posts")
        .as_user(ADMIN)
        .json(&post_body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = json_body(first).await;
    assert_eq!(first["slug"], "my-first-kata");
    assert!(first["image_url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/storage/{storage_id}")));
    let post_id = first["id"].as_str().unwrap().to_string();

    let second = json_body(
        server
            .post("/posts")
            .as_user(ADMIN)
            .json(&post_body)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["slug"], "my-first-kata-2");

    let karate = json_body(server.get("/posts?category=Karate").send().await.unwrap()).await;
    assert_eq!(karate["posts"].as_array().unwrap().len(), 2);
    let by_slug = json_body(server.get("/posts/slug/my-first-kata").send().await.unwrap()).await;
    assert_eq!(by_slug["id"], post_id.as_str());

    let comment = server
        .post(&format!("/posts/{post_id}/comments"))
        .as_user(MEMBER)
        .json(&json!({ "content": "Great breakdown" }))
        .send()
        .await
        .unwrap();
    assert_eq!(comment.status(), StatusCode::CREATED);
    let post = json_body(server.get(&format!("/posts/{post_id}")).send().await.unwrap()).await;
    assert_eq!(post["comment_count"], 1);

    let categories = json_body(server.get("/blog/categories").send().await.unwrap()).await;
    assert_eq!(categories["items"], json!([{ "name": "Karate", "count": 2 }]));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identity_webhook_and_sync_errors() {
    let server = TestServer::start().await;

    let created = server
        .post("/webhooks/identity")
        .json(&json!({
            "type": "user.created",
            "data": { "id": "user_42", "first_name": "Anderson", "last_name": "Silva" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let created = json_body(created).await;
    assert_eq!(created["event"], "user.created");
    assert_eq!(created["profile"]["username"], "AndersonSilva");

    let profile = json_body(server.get("/profiles/user_42").send().await.unwrap()).await;
    assert_eq!(profile["role"], "user");

    let unknown = server
        .post("/webhooks/identity")
        .json(&json!({ "type": "session.ended", "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let missing = server.get("/profiles/nobody").send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let sync = server
        .post("/profiles/sync")
        .as_user(("user_42", "Spider"))
        .send()
        .await
        .unwrap();
    assert_eq!(sync.status(), StatusCode::BAD_GATEWAY);

    server.shutdown().await;
}
