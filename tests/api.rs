//! Router-level tests: the full middleware stack driven with `oneshot`.
//!
//! The first group runs over in-memory repositories; the `sqlx::test` group
//! runs the same surface against a migrated Postgres database.

mod support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use storytell::application::auth::TokenService;
use storytell::application::repos::Repositories;
use storytell::cache::{CacheConfig, MemoryCacheStore};
use storytell::infra::db::PostgresRepositories;
use storytell::infra::http::{self, ApiRateLimiter, ApiState};

use support::{JWT_SECRET, memory_api_state, memory_api_state_with_limit, settle};

struct TestApp {
    router: Router,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new(state: ApiState) -> Self {
        Self {
            router: http::build_router(state),
        }
    }

    fn memory() -> Self {
        Self::new(memory_api_state().0)
    }

    fn postgres(pool: PgPool) -> Self {
        let repos = Arc::new(PostgresRepositories::new(pool));
        let config = CacheConfig::default();
        let state = ApiState::new(
            Repositories::from_backend(repos.clone()),
            Arc::new(MemoryCacheStore::new(&config)),
            &config,
            TokenService::new(JWT_SECRET, Duration::from_secs(3600)),
            ApiRateLimiter::new(Duration::from_secs(60), 1000),
        )
        .with_database(repos);
        Self::new(state)
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    /// Register and log in; returns the bearer token and user id.
    async fn sign_up(&self, username: &str) -> (String, Uuid) {
        let password = "correct horse battery";
        let registered = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{:?}", registered.body);

        let login = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK);
        let token = login.body["token"].as_str().expect("token").to_string();
        let id = login.body["user"]["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("user id");
        (token, id)
    }

    async fn create_story(&self, token: &str, title: &str, is_private: bool) -> Uuid {
        let reply = self
            .send(
                Method::POST,
                "/story",
                Some(token),
                Some(json!({ "title": title, "description": "Told in parts", "isPrivate": is_private })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        id_of(&reply.body)
    }

    async fn create_chapter(&self, token: &str, story_id: Uuid, title: &str) -> Uuid {
        let reply = self
            .send(
                Method::POST,
                "/chapter",
                Some(token),
                Some(json!({
                    "storyId": story_id,
                    "title": title,
                    "content": format!("{title}.\n\nThe tide turned."),
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        id_of(&reply.body)
    }
}

fn id_of(body: &Value) -> Uuid {
    body["id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("id field")
}

#[tokio::test]
async fn health_without_database_is_no_content() {
    let app = TestApp::memory();
    let reply = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let app = TestApp::memory();
    let reply = app.send(Method::GET, "/nowhere", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "Route not found");
}

#[tokio::test]
async fn request_id_is_minted_or_echoed() {
    let app = TestApp::memory();
    let reply = app.send(Method::GET, "/health", None, None).await;
    assert!(reply.headers.contains_key("x-request-id"));

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-42")
    );
}

#[tokio::test]
async fn writes_require_a_valid_token() {
    let app = TestApp::memory();

    let anonymous = app
        .send(Method::POST, "/story", None, Some(json!({ "title": "Nope" })))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forged = app
        .send(Method::GET, "/story", Some("not-a-token"), None)
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.body["message"], "invalid or expired token");
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let app = TestApp::memory();
    app.sign_up("mara").await;

    let again = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "mara", "password": "another password" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let wrong = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "mara", "password": "wrong password" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn story_view_aggregates_chapters_in_order() {
    let app = TestApp::memory();
    let (token, author_id) = app.sign_up("mara").await;
    let story_id = app.create_story(&token, "The Salt Road", false).await;
    app.create_chapter(&token, story_id, "Dunes").await;
    app.create_chapter(&token, story_id, "Oasis").await;
    settle().await;

    let view = app
        .send(Method::GET, &format!("/story/{story_id}"), None, None)
        .await;
    assert_eq!(view.status, StatusCode::OK);
    assert_eq!(view.body["authorId"], json!(author_id));
    assert_eq!(view.body["authorUsername"], "mara");
    let chapters = view.body["chapters"].as_array().expect("chapters");
    let titles: Vec<&str> = chapters
        .iter()
        .filter_map(|chapter| chapter["title"].as_str())
        .collect();
    assert_eq!(titles, ["Dunes", "Oasis"]);
    assert_eq!(chapters[1]["order"], 2);
}

#[tokio::test]
async fn private_story_rejects_anonymous_and_strangers() {
    let app = TestApp::memory();
    let (author, _) = app.sign_up("mara").await;
    let (stranger, _) = app.sign_up("tomas").await;
    let story_id = app.create_story(&author, "Diary", true).await;
    settle().await;

    let uri = format!("/story/{story_id}");
    assert_eq!(
        app.send(Method::GET, &uri, None, None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.send(Method::GET, &uri, Some(&stranger), None).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.send(Method::GET, &uri, Some(&author), None).await.status,
        StatusCode::OK
    );

    let listing = app.send(Method::GET, "/story", None, None).await;
    assert_eq!(listing.body["meta"]["total"], 0);
}

#[tokio::test]
async fn ratings_reject_duplicates_and_self_rating() {
    let app = TestApp::memory();
    let (author, _) = app.sign_up("mara").await;
    let (reader, _) = app.sign_up("tomas").await;
    let story_id = app.create_story(&author, "The Salt Road", false).await;

    let body = json!({ "storyId": story_id, "rate": 8 });
    let first = app
        .send(Method::POST, "/rating", Some(&reader), Some(body.clone()))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    let second = app
        .send(Method::POST, "/rating", Some(&reader), Some(body.clone()))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["message"], "story already rated");

    let own = app
        .send(Method::POST, "/rating", Some(&author), Some(body))
        .await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);

    let out_of_range = app
        .send(
            Method::POST,
            "/rating",
            Some(&reader),
            Some(json!({ "storyId": story_id, "rate": 11 })),
        )
        .await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn followers_see_public_activity_only() {
    let app = TestApp::memory();
    let (author, author_id) = app.sign_up("mara").await;
    let (reader, _) = app.sign_up("tomas").await;

    let follow = app
        .send(Method::POST, &format!("/follow/{author_id}"), Some(&reader), None)
        .await;
    assert_eq!(follow.status, StatusCode::CREATED);

    app.create_story(&author, "Public tale", false).await;
    app.create_story(&author, "Secret tale", true).await;
    settle().await;

    let feed = app
        .send(Method::GET, "/follow/feed", Some(&reader), None)
        .await;
    assert_eq!(feed.status, StatusCode::OK);
    let entries = feed.body["data"].as_array().expect("feed data");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["activityType"], "NEW_STORY");
    assert_eq!(entries[0]["storyTitle"], "Public tale");

    let check = app
        .send(
            Method::GET,
            &format!("/follow/{author_id}/check"),
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(check.body["isFollowing"], true);
}

#[tokio::test]
async fn export_sets_download_headers() {
    let app = TestApp::memory();
    let (token, _) = app.sign_up("mara").await;
    let story_id = app.create_story(&token, "The Salt Road", false).await;
    app.create_chapter(&token, story_id, "Dunes").await;

    let reply = app
        .send(
            Method::GET,
            &format!("/story/{story_id}/export?format=txt"),
            None,
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(
        reply
            .headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok()),
        Some("attachment; filename=\"the-salt-road.txt\"")
    );
    let text = reply.body.as_str().expect("plain text body");
    assert!(text.contains("Chapter 1: Dunes"));
}

#[tokio::test]
async fn rate_limit_answers_too_many_requests() {
    let (state, _backend) = memory_api_state_with_limit(2);
    let app = TestApp::new(state);

    for _ in 0..2 {
        let reply = app.send(Method::GET, "/story", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
    }
    let limited = app.send(Method::GET, "/story", None, None).await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        limited
            .headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("60")
    );
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_limit() {
    let (state, _backend) = memory_api_state_with_limit(2);
    let router = http::build_router(state);
    let peer: SocketAddr = "198.51.100.4:50123".parse().expect("socket addr");

    let mut statuses = Vec::new();
    for n in 0..3 {
        let mut request = Request::builder()
            .uri("/story")
            .header("x-forwarded-for", format!("203.0.113.{n}"))
            .body(Body::empty())
            .expect("request");
        request.extensions_mut().insert(ConnectInfo(peer));
        let response = router.clone().oneshot(request).await.expect("response");
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn postgres_story_lifecycle(pool: PgPool) {
    let app = TestApp::postgres(pool);
    let (author, _) = app.sign_up("mara").await;
    let (reader, _) = app.sign_up("tomas").await;

    let story_id = app.create_story(&author, "The Salt Road", false).await;
    let chapter_id = app.create_chapter(&author, story_id, "Dunes").await;
    settle().await;

    let chapter = app
        .send(Method::GET, &format!("/chapter/{chapter_id}"), Some(&reader), None)
        .await;
    assert_eq!(chapter.status, StatusCode::OK);
    assert_eq!(chapter.body["order"], 1);

    let history = app
        .send(
            Method::GET,
            &format!("/read-history/{story_id}"),
            Some(&reader),
            None,
        )
        .await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body["chapterId"], json!(chapter_id));

    let updated = app
        .send(
            Method::PUT,
            &format!("/story/{story_id}"),
            Some(&author),
            Some(json!({ "isPrivate": true })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);

    let hidden = app
        .send(Method::GET, &format!("/chapter/{chapter_id}"), Some(&reader), None)
        .await;
    assert_eq!(hidden.status, StatusCode::FORBIDDEN);

    let deleted = app
        .send(Method::DELETE, &format!("/story/{story_id}"), Some(&author), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app
        .send(Method::GET, &format!("/story/{story_id}"), Some(&author), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
async fn postgres_rating_uniqueness_is_enforced_by_the_store(pool: PgPool) {
    let app = TestApp::postgres(pool);
    let (author, _) = app.sign_up("mara").await;
    let (reader, _) = app.sign_up("tomas").await;
    let story_id = app.create_story(&author, "The Salt Road", false).await;

    let body = json!({ "storyId": story_id, "rate": 7 });
    let (first, second) = tokio::join!(
        app.send(Method::POST, "/rating", Some(&reader), Some(body.clone())),
        app.send(Method::POST, "/rating", Some(&reader), Some(body)),
    );
    let mut statuses = [first.status, second.status];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);

    let stats = app
        .send(
            Method::GET,
            &format!("/rating/story/{story_id}/stats"),
            None,
            None,
        )
        .await;
    assert_eq!(stats.body["count"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn postgres_collection_add_is_idempotent(pool: PgPool) {
    let app = TestApp::postgres(pool);
    let (owner, _) = app.sign_up("mara").await;
    let story_id = app.create_story(&owner, "The Salt Road", false).await;

    let collection = app
        .send(
            Method::POST,
            "/collection",
            Some(&owner),
            Some(json!({ "name": "Desert reads" })),
        )
        .await;
    assert_eq!(collection.status, StatusCode::CREATED);
    assert_eq!(collection.body["isPublic"], true);
    let collection_id = id_of(&collection.body);

    let uri = format!("/collection/{collection_id}/stories/{story_id}");
    let added = app.send(Method::POST, &uri, Some(&owner), None).await;
    assert_eq!(added.status, StatusCode::CREATED);
    let again = app.send(Method::POST, &uri, Some(&owner), None).await;
    assert_eq!(again.status, StatusCode::OK);

    let listing = app
        .send(Method::GET, &format!("/collection/{collection_id}"), None, None)
        .await;
    assert_eq!(listing.body["stories"].as_array().map(Vec::len), Some(1));
}

#[sqlx::test(migrations = "./migrations")]
async fn postgres_health_reports_no_content(pool: PgPool) {
    let app = TestApp::postgres(pool);
    let reply = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}
