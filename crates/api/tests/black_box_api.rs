use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as ChronoDuration, Utc};
use devbook_api::app::{AppServices, build_router};
use devbook_auth::{Argon2Credentials, CredentialError, Credentials};
use devbook_core::PasswordDigest;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, cheap hashing, ephemeral port.
        Self::spawn_with(Arc::new(Argon2Credentials::with_cost(1024, 1).unwrap())).await
    }

    async fn spawn_with(credentials: Arc<dyn Credentials>) -> Self {
        let services = Arc::new(AppServices::in_memory(SECRET.as_bytes(), credentials).unwrap());
        let app = build_router(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, name: &str, nick: &str, email: &str, password: &str) -> Value {
        let res = self
            .client
            .post(self.url("/users"))
            .json(&json!({ "name": name, "nick": nick, "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register and log in; returns (user id, token).
    async fn sign_up(&self, name: &str, nick: &str, email: &str) -> (u64, String) {
        let user = self.register(name, nick, email, "secret").await;
        let res = self.login(email, "secret").await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["id"], user["id"]);
        (
            user["id"].as_u64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn publish(&self, token: &str, title: &str, content: &str) -> Value {
        let res = self
            .client
            .post(self.url("/publications"))
            .bearer_auth(token)
            .json(&json!({ "title": title, "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, algorithm: Algorithm, user_id: u64, exp_offset: ChronoDuration) -> String {
    let claims = json!({
        "user_id": user_id,
        "exp": (Utc::now() + exp_offset).timestamp(),
        "authorized": true,
    });

    jsonwebtoken::encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].is_string(), "error body: {body}");
    body["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    for path in ["/whoami", "/users", "/users/1", "/publications"] {
        let res = srv.client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(error_code(res).await, "unauthenticated");
    }

    // Header without the Bearer scheme.
    let res = srv
        .client
        .get(srv.url("/whoami"))
        .header("Authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let (ann, token) = srv.sign_up("Ann", "ann1", "a@x.com").await;

    let res = srv.get(&token, "/whoami").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"].as_u64().unwrap(), ann);
}

#[tokio::test]
async fn forged_foreign_and_expired_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let (ann, _) = srv.sign_up("Ann", "ann1", "a@x.com").await;

    let good = mint_jwt(SECRET, Algorithm::HS256, ann, ChronoDuration::minutes(10));
    assert_eq!(srv.get(&good, "/whoami").await.status(), StatusCode::OK);

    let forged = mint_jwt("other-secret", Algorithm::HS256, ann, ChronoDuration::minutes(10));
    let other_alg = mint_jwt(SECRET, Algorithm::HS512, ann, ChronoDuration::minutes(10));
    let expired = mint_jwt(SECRET, Algorithm::HS256, ann, ChronoDuration::seconds(-1));

    for token in [forged, other_alg, expired, "garbage".to_string()] {
        let res = srv.get(&token, "/whoami").await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn registration_hides_password_and_normalizes() {
    let srv = TestServer::spawn().await;
    let user = srv.register("  Ann ", " ann1", " a@x.com ", "secret").await;

    assert_eq!(user["name"], "Ann");
    assert_eq!(user["nick"], "ann1");
    assert_eq!(user["email"], "a@x.com");
    assert!(user.get("password").is_none());
    assert!(user["created_at"].is_string());
}

#[tokio::test]
async fn registration_validation_errors() {
    let srv = TestServer::spawn().await;

    for body in [
        json!({ "name": "Ann", "nick": "ann1", "password": "pw" }),
        json!({ "name": "Ann", "nick": "ann1", "email": "invalid-email", "password": "pw" }),
        json!({ "name": " ", "nick": "ann1", "email": "a@x.com", "password": "pw" }),
        json!({ "name": "Ann", "nick": "ann1", "email": "a@x.com" }),
    ] {
        let res = srv.client.post(srv.url("/users")).json(&body).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error_code(res).await, "validation_error");
    }

    let res = srv
        .client
        .post(srv.url("/users"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let srv = TestServer::spawn().await;
    srv.register("Ann", "ann1", "a@x.com", "pw").await;

    let res = srv
        .client
        .post(srv.url("/users"))
        .json(&json!({ "name": "Other", "nick": "other", "email": "a@x.com", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(res).await, "conflict");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let srv = TestServer::spawn().await;
    srv.register("Ann", "ann1", "a@x.com", "secret").await;

    let res = srv.login("a@x.com", "wrong").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");

    let res = srv.login("nobody@x.com", "secret").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.login("", "").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

/// Counts `verify` calls and delegates to cheap Argon2.
struct CountingCredentials {
    inner: Argon2Credentials,
    verifies: AtomicUsize,
}

impl Credentials for CountingCredentials {
    fn hash(&self, plaintext: &str) -> Result<PasswordDigest, CredentialError> {
        self.inner.hash(plaintext)
    }

    fn verify(&self, digest: &PasswordDigest, candidate: &str) -> bool {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(digest, candidate)
    }
}

#[tokio::test]
async fn unknown_email_costs_a_verification_like_a_wrong_password() {
    let credentials = Arc::new(CountingCredentials {
        inner: Argon2Credentials::with_cost(1024, 1).unwrap(),
        verifies: AtomicUsize::new(0),
    });
    let srv = TestServer::spawn_with(credentials.clone()).await;
    srv.register("Ann", "ann1", "a@x.com", "secret").await;

    let before = credentials.verifies.load(Ordering::SeqCst);
    let res = srv.login("a@x.com", "wrong").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = credentials.verifies.load(Ordering::SeqCst) - before;

    let before = credentials.verifies.load(Ordering::SeqCst);
    let res = srv.login("nobody@x.com", "secret").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = credentials.verifies.load(Ordering::SeqCst) - before;

    assert_eq!(wrong_password, 1);
    assert_eq!(unknown_email, 1);

    // The decoy never authenticates, even with its own password.
    let res = srv.login("nobody@x.com", "devbook-decoy-password").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ann_publishes_and_only_ann_may_edit() {
    let srv = TestServer::spawn().await;
    let (ann, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (bob, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;

    // Client-supplied author is ignored; title trimmed, content verbatim.
    let res = srv
        .client
        .post(srv.url("/publications"))
        .bearer_auth(&ann_token)
        .json(&json!({ "title": " Hello ", "content": " body ", "author_id": bob }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["title"], "Hello");
    assert_eq!(created["content"], " body ");
    assert_eq!(created["author_id"].as_u64().unwrap(), ann);
    assert_eq!(created["author_nick"], "ann1");
    assert_eq!(created["likes"], 0);
    let id = created["id"].as_u64().unwrap();

    let res = srv
        .client
        .put(srv.url(&format!("/publications/{id}")))
        .bearer_auth(&bob_token)
        .json(&json!({ "title": "Hijacked", "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    // Ownership is decided before the body is looked at.
    let res = srv
        .client
        .put(srv.url(&format!("/publications/{id}")))
        .bearer_auth(&bob_token)
        .header("content-type", "application/json")
        .body("{bad")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .delete(srv.url(&format!("/publications/{id}")))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .put(srv.url(&format!("/publications/{id}")))
        .bearer_auth(&ann_token)
        .json(&json!({ "title": " Edited ", "content": "new body" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let body: Value = srv
        .get(&bob_token, &format!("/publications/{id}"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["title"], "Edited");
    assert_eq!(body["content"], "new body");

    let res = srv
        .client
        .delete(srv.url(&format!("/publications/{id}")))
        .bearer_auth(&ann_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv.get(&ann_token, &format!("/publications/{id}")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn publication_validation_and_absent_ids() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.sign_up("Ann", "ann1", "a@x.com").await;

    let res = srv
        .client
        .post(srv.url("/publications"))
        .bearer_auth(&token)
        .json(&json!({ "title": "   ", "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv.get(&token, "/publications/abc").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_id");

    let res = srv.get(&token, "/publications/999").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(res).await, "not_found");

    let res = srv.post(&token, "/publications/999/like").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn likes_never_go_negative() {
    let srv = TestServer::spawn().await;
    let (_, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (_, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;
    let id = srv.publish(&ann_token, "t", "c").await["id"].as_u64().unwrap();

    let path = |action: &str| format!("/publications/{id}/{action}");

    assert_eq!(srv.post(&bob_token, &path("unlike")).await.status(), StatusCode::NO_CONTENT);
    let body: Value = srv.get(&bob_token, &format!("/publications/{id}")).await.json().await.unwrap();
    assert_eq!(body["likes"], 0);

    // Anyone may like, including the author.
    assert_eq!(srv.post(&bob_token, &path("like")).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.post(&ann_token, &path("like")).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.post(&bob_token, &path("unlike")).await.status(), StatusCode::NO_CONTENT);

    let body: Value = srv.get(&bob_token, &format!("/publications/{id}")).await.json().await.unwrap();
    assert_eq!(body["likes"], 1);
}

#[tokio::test]
async fn follow_rules_and_feed() {
    let srv = TestServer::spawn().await;
    let (ann, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (bob, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;
    let (_, carl_token) = srv.sign_up("Carl", "carl", "c@x.com").await;

    assert_eq!(
        srv.post(&ann_token, &format!("/users/{ann}/follow")).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        srv.post(&ann_token, "/users/999/follow").await.status(),
        StatusCode::NOT_FOUND
    );

    // Following twice keeps a single edge.
    for _ in 0..2 {
        assert_eq!(
            srv.post(&ann_token, &format!("/users/{bob}/follow")).await.status(),
            StatusCode::NO_CONTENT
        );
    }

    let followers: Value = srv.get(&ann_token, &format!("/users/{bob}/followers")).await.json().await.unwrap();
    let ids: Vec<u64> = followers.as_array().unwrap().iter().map(|u| u["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![ann]);

    let following: Value = srv.get(&bob_token, &format!("/users/{ann}/following")).await.json().await.unwrap();
    assert_eq!(following[0]["id"].as_u64().unwrap(), bob);

    let own = srv.publish(&ann_token, "mine", "c").await["id"].as_u64().unwrap();
    let bobs = srv.publish(&bob_token, "bob's", "c").await["id"].as_u64().unwrap();
    srv.publish(&carl_token, "carl's", "c").await;

    let feed: Value = srv.get(&ann_token, "/publications").await.json().await.unwrap();
    let ids: Vec<u64> = feed.as_array().unwrap().iter().map(|p| p["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![bobs, own]);

    let by_bob: Value = srv.get(&ann_token, &format!("/users/{bob}/publications")).await.json().await.unwrap();
    assert_eq!(by_bob.as_array().unwrap().len(), 1);

    assert_eq!(
        srv.post(&ann_token, &format!("/users/{bob}/unfollow")).await.status(),
        StatusCode::NO_CONTENT
    );
    let feed: Value = srv.get(&ann_token, "/publications").await.json().await.unwrap();
    assert_eq!(feed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn users_may_only_modify_themselves() {
    let srv = TestServer::spawn().await;
    let (ann, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (_, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;

    let update = json!({ "name": " Annie ", "nick": "annie", "email": "annie@x.com" });

    let res = srv
        .client
        .put(srv.url(&format!("/users/{ann}")))
        .bearer_auth(&bob_token)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .put(srv.url(&format!("/users/{ann}")))
        .bearer_auth(&bob_token)
        .json(&json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    let res = srv
        .client
        .delete(srv.url(&format!("/users/{ann}")))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .put(srv.url(&format!("/users/{ann}")))
        .bearer_auth(&ann_token)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let user: Value = srv.get(&bob_token, &format!("/users/{ann}")).await.json().await.unwrap();
    assert_eq!(user["name"], "Annie");
    assert_eq!(user["nick"], "annie");

    let found: Value = srv.get(&bob_token, "/users?user=ANN").await.json().await.unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);
    let all: Value = srv.get(&bob_token, "/users").await.json().await.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deleting_an_account_removes_its_publications() {
    let srv = TestServer::spawn().await;
    let (ann, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (_, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;
    let id = srv.publish(&ann_token, "t", "c").await["id"].as_u64().unwrap();

    let res = srv
        .client
        .delete(srv.url(&format!("/users/{ann}")))
        .bearer_auth(&ann_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    assert_eq!(srv.get(&bob_token, &format!("/users/{ann}")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        srv.get(&bob_token, &format!("/publications/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let srv = TestServer::spawn().await;
    let (ann, ann_token) = srv.sign_up("Ann", "ann1", "a@x.com").await;
    let (_, bob_token) = srv.sign_up("Bob", "bob", "b@x.com").await;
    let path = format!("/users/{ann}/update-password");

    let res = srv
        .client
        .post(srv.url(&path))
        .bearer_auth(&bob_token)
        .json(&json!({ "current": "secret", "new": "hijack" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .post(srv.url(&path))
        .bearer_auth(&ann_token)
        .json(&json!({ "current": "wrong", "new": "fresh" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .post(srv.url(&path))
        .bearer_auth(&ann_token)
        .json(&json!({ "current": "secret", "new": "fresh" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(srv.login("a@x.com", "secret").await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.login("a@x.com", "fresh").await.status(), StatusCode::OK);
}
