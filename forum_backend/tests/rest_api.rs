use forum_backend::api;
use forum_backend::bootstrap;
use forum_backend::config::{ForumConfig, ForumPaths, StorageBackend};
use forum_backend::votes::VoteBook;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::time::{sleep, Duration};

struct TestNode {
    _dir: TempDir,
    server: tokio::task::JoinHandle<()>,
    base_url: String,
    client: reqwest::Client,
}

impl TestNode {
    async fn shutdown(self) {
        self.server.abort();
        let _ = self.server.await;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str, viewer: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .header(api::VIEWER_HEADER, viewer)
            .send()
            .await
            .expect("get response");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }

    async fn post(&self, path: &str, viewer: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .header(api::VIEWER_HEADER, viewer)
            .json(&body)
            .send()
            .await
            .expect("post response");
        let status = resp.status();
        (status, resp.json().await.expect("json body"))
    }
}

fn next_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .unwrap()
        .port()
}

async fn wait_for_health(base_url: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{base_url}/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("server did not become healthy in time");
}

async fn spawn_node(storage: StorageBackend) -> TestNode {
    let dir = tempdir().expect("tempdir");
    let port = next_port();
    let paths = ForumPaths::from_base_dir(dir.path()).expect("paths");
    let config = ForumConfig::new(port, storage, paths);
    let resources = bootstrap::initialize(&config).expect("bootstrap");

    let database = resources.database.clone();
    let server = tokio::spawn(async move {
        let _ = api::serve_http(config, database, VoteBook::default()).await;
    });

    let base_url = format!("http://127.0.0.1:{port}");
    wait_for_health(&base_url).await;

    TestNode {
        _dir: dir,
        server,
        base_url,
        client: reqwest::Client::new(),
    }
}

/// Registers, verifies and logs in a user; returns the user id.
async fn sign_up(node: &TestNode, username: &str) -> String {
    let email = format!("{username}@example.com");
    let (status, _) = node
        .post(
            "/auth/register",
            "anonymous",
            json!({ "username": username, "email": email, "password": "longenough" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = node
        .post(
            "/auth/login",
            "anonymous",
            json!({ "email": email, "password": "longenough" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "unverified login: {body}");

    let (status, body) = node
        .post("/auth/verify", "anonymous", json!({ "email": email }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = node
        .post(
            "/auth/login",
            "anonymous",
            json!({ "email": email, "password": "longenough" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("credential").is_none());
    body["id"].as_str().expect("user id").to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rest_roundtrip_posts_comments_and_votes() {
    let node = spawn_node(StorageBackend::Sqlite).await;

    let (_, health) = node.get("/health", "anonymous").await;
    assert_eq!(health["storage"], "sqlite");

    let (status, communities) = node.get("/communities", "anonymous").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(communities.as_array().map(Vec::len), Some(4));

    let alice = sign_up(&node, "alice").await;

    let (status, post) = node
        .post(
            "/posts",
            &alice,
            json!({
                "title": "Hello",
                "community": "Pics",
                "kind": "text",
                "content": "first",
                "created_at": "2999-01-01T00:00:00Z"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{post}");
    assert_eq!(post["community"], "pics");
    assert_ne!(post["created_at"], "2999-01-01T00:00:00Z");
    let post_id = post["id"].as_str().unwrap().to_string();

    let (status, root) = node
        .post(
            &format!("/posts/{post_id}/comments"),
            &alice,
            json!({ "content": "root" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["id"].as_str().unwrap().to_string();
    let (_, reply) = node
        .post(
            &format!("/posts/{post_id}/comments"),
            "alice",
            json!({ "content": "reply", "parent_id": root_id }),
        )
        .await;
    assert_eq!(reply["level"], 1);

    let (status, vote) = node
        .post(
            &format!("/posts/{post_id}/vote"),
            "bob",
            json!({ "direction": "down" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vote["score"], -1);
    assert_eq!(vote["vote"], -1);

    let (_, seen_by_bob) = node.get(&format!("/posts/{post_id}"), "bob").await;
    assert_eq!(seen_by_bob["post"]["score"], -1);
    assert_eq!(seen_by_bob["post"]["downvotes"], 0);
    assert_eq!(seen_by_bob["post"]["comment_count"], 2);
    assert_eq!(seen_by_bob["comments"][0]["children"][0]["content"], "reply");
    assert_eq!(seen_by_bob["comments"][0]["children"][0]["depth"], 1);

    let (_, report) = node.post("/votes/sync", "bob", json!({})).await;
    assert_eq!(report["applied"], 1);

    let (_, seen_by_carol) = node.get(&format!("/posts/{post_id}"), "carol").await;
    assert_eq!(seen_by_carol["post"]["downvotes"], 1);
    assert_eq!(seen_by_carol["post"]["score"], -1);

    let (_, profile) = node.get("/users/alice", "anonymous").await;
    assert_eq!(profile["user"]["karma"], -1);
    assert_eq!(profile["comments"].as_array().map(Vec::len), Some(2));

    let (status, listing) = node.get("/communities/pics/posts?sort=new", "anonymous").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing[0]["id"], post_id.as_str());

    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rest_errors_map_to_status_codes() {
    let node = spawn_node(StorageBackend::Memory).await;
    let alice = sign_up(&node, "alice").await;

    let (status, _) = node.get("/posts?sort=sideways", "anonymous").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node.get("/posts/post-missing", "anonymous").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = node
        .post(
            "/posts/post-missing/comments",
            &alice,
            json!({ "content": "hello?" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = node
        .post(
            "/posts",
            &alice,
            json!({ "title": "Hi", "community": "nowhere", "kind": "link", "url": "https://x.test" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node
        .post(
            "/posts",
            "anonymous",
            json!({ "title": "Hi", "community": "pics", "kind": "text", "content": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = node
        .post(
            "/auth/register",
            "anonymous",
            json!({ "username": "alice", "email": "other@example.com", "password": "longenough" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "username or email already exists");

    let (status, _) = node
        .post("/communities", "anonymous", json!({ "name": "PICS" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = node
        .post(
            "/auth/magic-link",
            "anonymous",
            json!({ "email": "ghost@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, _) = node
        .post("/comments/nope/vote", "bob", json!({ "direction": "up" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = node
        .post("/posts/post-any/vote", "anonymous", json!({ "direction": "up" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = node
        .post(
            "/auth/register",
            "anonymous",
            json!({ "username": "eve", "email": "eve@example.com", "password": "longenough" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = node
        .post(
            "/posts",
            "eve",
            json!({ "title": "Hi", "community": "pics", "kind": "text", "content": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    node.shutdown().await;
}
