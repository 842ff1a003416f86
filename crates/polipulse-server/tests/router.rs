//! End-to-end flows through the assembled router: auth, messaging with
//! targeted realtime delivery, and the compliance review cycle.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use polipulse_api::auth::{AppState, AppStateInner};
use polipulse_db::Database;
use polipulse_gateway::Dispatcher;
use polipulse_server::build_router;
use polipulse_types::events::RealtimeEvent;

struct TestApp {
    router: Router,
    state: AppState,
}

struct Account {
    id: Uuid,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "router-test-secret".into(),
            dispatcher: Dispatcher::new(),
            token_ttl_days: 1,
        });
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, email: &str, name: &str, role: &str) -> Account {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct horse battery",
                    "display_name": name,
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        Account {
            id: body["user_id"].as_str().unwrap().parse().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// PAC admin with one campaign, plus a registered creator.
    async fn seed(&self) -> (Account, Account, Uuid) {
        let admin = self.register("admin@civic.org", "Civic Admin", "pac").await;
        let creator = self.register("dana@creators.io", "Dana", "influencer").await;

        let (status, pac) = self
            .call(Method::POST, "/pacs", Some(&admin.token), Some(json!({ "name": "Civic PAC" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/pacs/{}/campaigns", pac["id"].as_str().unwrap());
        let (status, campaign) = self
            .call(Method::POST, &uri, Some(&admin.token), Some(json!({ "name": "Get Out The Vote" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = self.call(Method::POST, "/influencers", Some(&creator.token), None).await;
        assert_eq!(status, StatusCode::OK);

        let campaign_id = campaign["id"].as_str().unwrap().parse().unwrap();
        (admin, creator, campaign_id)
    }
}

#[tokio::test]
async fn health_and_auth_guard() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.call(Method::GET, "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_authenticated");

    let (status, _) = app.call(Method::GET, "/conversations", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_checks_the_password() {
    let app = TestApp::new();
    let account = app.register("dana@creators.io", "Dana", "influencer").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "Dana@Creators.io", "password": "correct horse battery" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], account.id.to_string());

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "dana@creators.io", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn messages_reach_only_the_two_participants() {
    let app = TestApp::new();
    let (admin, creator, campaign_id) = app.seed().await;
    let outsider = app.register("eve@elsewhere.net", "Eve", "influencer").await;

    let dispatcher = &app.state.dispatcher;
    let (_, mut admin_rx) = dispatcher.register_user_channel(admin.id).await;
    let (_, mut creator_rx) = dispatcher.register_user_channel(creator.id).await;
    let (_, mut outsider_rx) = dispatcher.register_user_channel(outsider.id).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/messages",
            Some(&admin.token),
            Some(json!({
                "recipient_id": creator.id,
                "campaign_id": campaign_id,
                "content": "Welcome aboard",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let message_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    for rx in [&mut admin_rx, &mut creator_rx] {
        match rx.try_recv() {
            Ok(RealtimeEvent::MessageCreate { message, .. }) => assert_eq!(message.message.id, message_id),
            other => panic!("expected MessageCreate, got {:?}", other),
        }
    }
    assert!(outsider_rx.try_recv().is_err());

    let (status, list) = app.call(Method::GET, "/conversations", Some(&creator.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["unread_count"], 1);
    assert_eq!(list[0]["campaign_name"], "Get Out The Vote");
    let conversation_id = list[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/conversations/{}/messages", conversation_id);
    let (status, _) = app.call(Method::GET, &uri, Some(&outsider.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, thread) = app.call(Method::GET, &uri, Some(&creator.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread[0]["content"], "Welcome aboard");
    assert_eq!(thread[0]["sender_profile"]["display_name"], "Civic Admin");

    // Sender cannot mark; recipient can, once.
    let read_uri = format!("/messages/{}/read", message_id);
    let (status, _) = app.call(Method::POST, &read_uri, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, first) = app.call(Method::POST, &read_uri, Some(&creator.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = app.call(Method::POST, &read_uri, Some(&creator.token), None).await;
    assert_eq!(first["read_at"], second["read_at"]);

    assert!(matches!(admin_rx.try_recv(), Ok(RealtimeEvent::MessageRead { .. })));
    assert!(admin_rx.try_recv().is_err());
    assert!(outsider_rx.try_recv().is_err());
}

#[tokio::test]
async fn blank_messages_are_rejected_without_side_effects() {
    let app = TestApp::new();
    let (admin, creator, campaign_id) = app.seed().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/messages",
            Some(&admin.token),
            Some(json!({
                "recipient_id": creator.id,
                "campaign_id": campaign_id,
                "content": "   ",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    let (_, list) = app.call(Method::GET, "/conversations", Some(&admin.token), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn conversation_read_marks_everything_incoming() {
    let app = TestApp::new();
    let (admin, creator, campaign_id) = app.seed().await;

    for content in ["one", "two"] {
        let (status, _) = app
            .call(
                Method::POST,
                "/messages",
                Some(&admin.token),
                Some(json!({ "recipient_id": creator.id, "campaign_id": campaign_id, "content": content })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, resolved) = app
        .call(
            Method::POST,
            "/conversations",
            Some(&creator.token),
            Some(json!({ "campaign_id": campaign_id, "counterpart_id": admin.id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/conversations/{}/read", resolved["conversation_id"].as_str().unwrap());
    let (status, body) = app.call(Method::POST, &uri, Some(&creator.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 2);

    let (_, list) = app.call(Method::GET, "/conversations", Some(&creator.token), None).await;
    assert_eq!(list[0]["unread_count"], 0);
}

#[tokio::test]
async fn review_cycle_is_audited() {
    let app = TestApp::new();
    let (admin, creator, campaign_id) = app.seed().await;

    let (status, stats) = app.call(Method::GET, "/compliance/stats", Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["compliance_rate"], 0);

    let uri = format!("/campaigns/{}/submissions", campaign_id);
    let (status, submission) = app
        .call(
            Method::POST,
            &uri,
            Some(&creator.token),
            Some(json!({ "platform": "instagram", "content_type": "reel", "caption": "Vote!" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", submission);
    let id = submission["id"].as_str().unwrap().to_string();
    assert_eq!(submission["status"], "pending");

    let revision = format!("/submissions/{}/revision", id);
    let (status, _) = app
        .call(Method::POST, &revision, Some(&admin.token), Some(json!({ "notes": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, flagged) = app
        .call(Method::POST, &revision, Some(&admin.token), Some(json!({ "notes": "Add disclosure tag" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flagged["status"], "revision_requested");
    assert_eq!(flagged["compliance_checked"], false);

    let (_, queue) = app.call(Method::GET, "/compliance/queue", Some(&admin.token), None).await;
    assert_eq!(queue[0]["priority"], "high");
    assert_eq!(queue[0]["type"], "submission");

    // Creators cannot approve their own work.
    let approve = format!("/submissions/{}/approve", id);
    let (status, _) = app
        .call(Method::POST, &approve, Some(&creator.token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app
        .call(Method::POST, &approve, Some(&admin.token), Some(json!({ "notes": "Looks good" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["compliance_checked"], true);

    let (status, body) = app
        .call(Method::POST, &approve, Some(&admin.token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "validation_failed");

    let (_, audit) = app.call(Method::GET, "/compliance/audit", Some(&admin.token), None).await;
    let audit = audit.as_array().unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0]["action"], "submission_approved");
    assert_eq!(audit[0]["display"]["label"], "Approved");
    assert_eq!(audit[0]["display"]["icon"], "check-circle");
    assert_eq!(audit[1]["action"], "revision_requested");

    let (_, stats) = app.call(Method::GET, "/compliance/stats", Some(&admin.token), None).await;
    assert_eq!(stats["total_submissions"], 1);
    assert_eq!(stats["compliance_rate"], 100);

    let (status, _) = app
        .call(Method::GET, "/compliance/report?start=2030-01-02T00:00:00Z&end=2030-01-01T00:00:00Z", Some(&admin.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, report) = app.call(Method::GET, "/compliance/report", Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report[0]["pac_name"], "Civic PAC");
}
