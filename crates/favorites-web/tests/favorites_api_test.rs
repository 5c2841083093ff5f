//! Favorites API tests
//!
//! Drive the full router (identity gateway, validation, catalog check and
//! repository) with `tower::ServiceExt::oneshot`. The catalog is an
//! in-memory broker; identities come from a fixed token table.

#![forbid(unsafe_code)]
#![allow(clippy::expect_used)] // Tests are allowed to use expect

use article_rpc::{ArticleValidator, InMemoryBroker, ScriptedReply, ValidatorConfig};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use favorites_web::{
    AppState, AuthError, CurrentUser, IdentityProvider, InMemoryFavoriteRepository,
    ServerConfig, create_router,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const ALICE: &str = "token-alice";
const BOB: &str = "token-bob";

/// Token table standing in for the auth service.
struct StaticIdentities;

#[async_trait]
impl IdentityProvider for StaticIdentities {
    async fn current_user(&self, token: &str) -> Result<CurrentUser, AuthError> {
        match token {
            ALICE => CurrentUser::from_profile(json!({"id": "alice", "name": "Alice"})),
            BOB => CurrentUser::from_profile(json!({"_id": 1002, "name": "Bob"})),
            "token-anonymous" => CurrentUser::from_profile(json!({"name": "Nobody"})),
            "token-auth-down" => Err(AuthError::Unavailable("connection refused".to_string())),
            _ => Err(AuthError::Rejected { status: 401 }),
        }
    }
}

struct TestApp {
    router: Router,
    broker: InMemoryBroker,
}

impl TestApp {
    fn new(broker: InMemoryBroker) -> Self {
        let validator = ArticleValidator::new(Arc::new(broker.clone()), &ValidatorConfig::default());
        let state = AppState::new(
            Arc::new(InMemoryFavoriteRepository::new()),
            Arc::new(validator),
            Arc::new(StaticIdentities),
        );
        let router =
            create_router(state, &ServerConfig::default()).expect("Router creation failed");
        Self { router, broker }
    }

    fn confirming() -> Self {
        Self::new(InMemoryBroker::confirming())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Failed to parse JSON")
        };
        (status, json)
    }

    async fn add(&self, token: &str, product_id: &str) -> Value {
        let (status, json) = self
            .send(
                Method::POST,
                "/favorites/",
                Some(token),
                Some(json!({"product_id": product_id})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "adding {product_id}: {json}");
        json
    }
}

#[tokio::test]
async fn test_add_favorite_validates_article_and_creates() {
    let app = TestApp::confirming();

    let (status, json) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "P-100", "notes": "birthday"})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["product_id"], "P-100");
    assert_eq!(json["user_id"], "alice");
    assert_eq!(json["notes"], "birthday");
    assert!(json["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(json["created_at"].is_string());
    assert!(json["updated_at"].is_string());

    // The catalog was asked about this product on behalf of this user.
    let published = app.broker.published();
    assert_eq!(published.len(), 1);
    let envelope = published[0].envelope().expect("Request envelope");
    assert_eq!(envelope.message.article_id, "P-100");
    assert_eq!(envelope.message.reference_id, "alice");
}

#[tokio::test]
async fn test_add_existing_favorite_updates_notes_without_catalog_call() {
    let app = TestApp::confirming();
    let created = app.add(ALICE, "P-1").await;

    let (status, json) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "P-1", "notes": "actually for me"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["id"]);
    assert_eq!(json["notes"], "actually for me");
    assert_eq!(app.broker.published().len(), 1);

    // Empty notes leave the record untouched.
    let (status, json) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "P-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["notes"], "actually for me");
}

#[tokio::test]
async fn test_add_unknown_article_is_unprocessable() {
    let app = TestApp::new(InMemoryBroker::new(|request| {
        vec![ScriptedReply::to(request, &json!({"message": {"valid": false}}))]
    }));

    let (status, json) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "GHOST"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["status"], 422);
    assert!(json["detail"].as_str().is_some_and(|d| d.contains("GHOST")));

    let (_, check) = app
        .send(Method::GET, "/favorites/product/GHOST/", Some(ALICE), None)
        .await;
    assert_eq!(check["is_favorite"], false);
}

#[tokio::test(start_paused = true)]
async fn test_silent_catalog_is_service_unavailable() {
    let app = TestApp::new(InMemoryBroker::silent());

    let (status, json) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "P-1"})),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["title"], "Service Unavailable");
}

#[tokio::test]
async fn test_unreachable_broker_is_service_unavailable() {
    let app = TestApp::new(InMemoryBroker::confirming().failing_connects(2));

    let (status, _) = app
        .send(
            Method::POST,
            "/favorites/",
            Some(ALICE),
            Some(json!({"product_id": "P-1"})),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.broker.connect_attempts(), 2);
}

#[tokio::test]
async fn test_invalid_bodies_are_bad_requests() {
    let app = TestApp::confirming();
    let too_long = "p".repeat(256);

    for body in [
        json!({}),
        json!({"product_id": ""}),
        json!({"product_id": 42}),
        json!({"product_id": too_long}),
    ] {
        let (status, _) = app
            .send(Method::POST, "/favorites/", Some(ALICE), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
    }
    assert!(app.broker.published().is_empty());
}

#[tokio::test]
async fn test_list_paginates_newest_first() {
    let app = TestApp::confirming();
    for product in ["P-1", "P-2", "P-3"] {
        app.add(ALICE, product).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    app.add(BOB, "P-9").await;

    let (status, json) = app
        .send(Method::GET, "/favorites/?page=1&limit=2", Some(ALICE), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["page"], 1);
    assert_eq!(json["limit"], 2);
    assert_eq!(json["total_pages"], 2);
    let products: Vec<&str> = json["results"]
        .as_array()
        .expect("results array")
        .iter()
        .filter_map(|favorite| favorite["product_id"].as_str())
        .collect();
    assert_eq!(products, vec!["P-3", "P-2"]);

    let (_, second) = app
        .send(Method::GET, "/favorites/?page=2&limit=2", Some(ALICE), None)
        .await;
    assert_eq!(second["results"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_list_without_limit_and_invalid_paging() {
    let app = TestApp::confirming();
    app.add(ALICE, "P-1").await;
    app.add(ALICE, "P-2").await;

    let (status, json) = app
        .send(Method::GET, "/favorites/?limit=0", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_pages"], 1);
    assert_eq!(json["results"].as_array().map(Vec::len), Some(2));

    for uri in ["/favorites/?page=0", "/favorites/?page=abc", "/favorites/?limit=-5"] {
        let (status, _) = app.send(Method::GET, uri, Some(ALICE), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_check_favorite() {
    let app = TestApp::confirming();
    app.add(ALICE, "P-1").await;

    let (status, json) = app
        .send(Method::GET, "/favorites/product/P-1/", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_favorite"], true);
    assert_eq!(json["favorite"]["product_id"], "P-1");

    let (_, json) = app
        .send(Method::GET, "/favorites/product/P-1/", Some(BOB), None)
        .await;
    assert_eq!(json, json!({"is_favorite": false}));
}

#[tokio::test]
async fn test_remove_by_product() {
    let app = TestApp::confirming();
    app.add(ALICE, "P-1").await;

    let (status, body) = app
        .send(Method::DELETE, "/favorites/product/P-1/", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = app
        .send(Method::DELETE, "/favorites/product/P-1/", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_product_routes_reject_overlong_ids() {
    let app = TestApp::confirming();
    let uri = format!("/favorites/product/{}/", "P".repeat(256));

    let (status, json) = app.send(Method::DELETE, &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);

    let (status, _) = app.send(Method::GET, &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_by_id() {
    let app = TestApp::confirming();
    let created = app.add(ALICE, "P-1").await;
    let id = created["id"].as_str().expect("id");
    let uri = format!("/favorites/{id}/");

    let (status, _) = app
        .send(Method::DELETE, "/favorites/not-an-id/", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Someone else's favorite is invisible.
    let (status, _) = app.send(Method::DELETE, &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(Method::DELETE, &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats() {
    let app = TestApp::confirming();
    for product in ["P-1", "P-2", "P-3", "P-4", "P-5", "P-6"] {
        app.add(ALICE, product).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (status, json) = app
        .send(Method::GET, "/favorites/stats/", Some(ALICE), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_favorites"], 6);
    assert_eq!(json["recent_count"], 6);
    let recent = json["most_recent"].as_array().expect("most_recent array");
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0]["product_id"], "P-6");
    assert!(recent[0]["created_at"].is_string());
}

#[tokio::test]
async fn test_popular_products_across_users() {
    let app = TestApp::confirming();
    app.add(ALICE, "P-1").await;
    app.add(BOB, "P-1").await;
    app.add(ALICE, "P-2").await;

    let (status, json) = app
        .send(Method::GET, "/favorites/admin/popular/?limit=1", Some(ALICE), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let popular = json["popular_products"].as_array().expect("popular array");
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0]["product_id"], "P-1");
    assert_eq!(popular[0]["favorite_count"], 2);
    assert!(popular[0]["last_added"].is_string());

    let (status, _) = app
        .send(Method::GET, "/favorites/admin/popular/?limit=lots", Some(ALICE), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_numeric_identity_ids_are_strings() {
    let app = TestApp::confirming();

    let created = app.add(BOB, "P-1").await;

    assert_eq!(created["user_id"], "1002");
}

#[tokio::test]
async fn test_identity_gateway_rejections() {
    let app = TestApp::confirming();

    let cases = [
        (None, StatusCode::UNAUTHORIZED),
        (Some("token-unknown"), StatusCode::UNAUTHORIZED),
        (Some("token-anonymous"), StatusCode::UNAUTHORIZED),
        (Some("token-auth-down"), StatusCode::SERVICE_UNAVAILABLE),
    ];
    for (token, expected) in cases {
        let (status, json) = app.send(Method::GET, "/favorites/", token, None).await;
        assert_eq!(status, expected, "token {token:?}");
        assert_eq!(json["status"], expected.as_u16());
    }
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let app = TestApp::confirming();

    let (status, json) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["broker"], "disconnected");
}
