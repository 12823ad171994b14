use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use futures_util::{SinkExt, StreamExt};
use huddle_sdk::client::{ApiClient, ChatClient, ChatClientConfig, ClientError, ConnectionState};
use huddle_sdk::objects::ws::WsServerMessage;
use huddle_sdk::objects::{ApiErrorKind, CreateActivityRequest, LocationDto, Tier};
use huddle_sdk::signature::{SESSION_HEADER, sign_session_token, sign_session_token_at};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;
use url::Url;

use crate::config::LoadedConfig;
use crate::config::runtime::{AuthConfig, ChatConfig, ServerConfig};
use crate::server::build_router;
use crate::state::AppState;

const SECRET: &[u8] = b"test-secret";

fn test_router() -> Router {
    build_router(test_state(3600))
}

fn test_state(token_ttl_secs: i64) -> AppState {
    let loaded = LoadedConfig {
        server: ServerConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        },
        auth: AuthConfig::new(SECRET.to_vec().into_boxed_slice(), token_ttl_secs),
        chat: ChatConfig {
            typing_timeout: Duration::from_secs(3),
            history_page_max: 100,
            lock_wait: Duration::from_secs(2),
            broadcast_capacity: 256,
        },
    };
    AppState::new(loaded.into_shared())
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(SESSION_HEADER, sign_session_token(user, SECRET));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn activity_body(radius_km: f64) -> Value {
    json!({
        "title": "Sunday run",
        "category": "sports",
        "location": { "name": "Park", "lat": 52.52, "lng": 13.405 },
        "starts_at": 1_900_000_000,
        "max_participants": 3,
        "radius_km": radius_km,
        "creator_name": "Alice"
    })
}

async fn create_activity(router: &Router, user: &str) -> String {
    let (status, body) = call(
        router,
        Method::POST,
        "/api/v1/activities",
        Some(user),
        Some(activity_body(5.0)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_owned()
}

/// Alice creates an activity, Bob asks to join and Alice accepts.
async fn activity_with_bob(router: &Router) -> String {
    let id = create_activity(router, "alice").await;
    let (status, request) = call(
        router,
        Method::POST,
        &format!("/api/v1/activities/{id}/requests"),
        Some("bob"),
        Some(json!({ "user_name": "Bob", "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["id"].as_str().unwrap();
    let (status, resolved) = call(
        router,
        Method::POST,
        &format!("/api/v1/requests/{request_id}/resolve"),
        Some("alice"),
        Some(json!({ "decision": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "accepted");
    id
}

#[tokio::test]
async fn test_health_needs_no_session() {
    let router = test_router();
    let (status, body) = call(&router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_session_required() {
    let router = test_router();
    let (status, body) = call(&router, Method::GET, "/api/v1/me/usage", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");

    let forged = sign_session_token("alice", b"wrong-secret");
    let request = Request::builder()
        .uri("/api/v1/me/usage")
        .header(SESSION_HEADER, forged)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_discover() {
    let router = test_router();
    let id = create_activity(&router, "alice").await;

    let (status, found) = call(
        &router,
        Method::GET,
        "/api/v1/activities?lat=52.52&lng=13.4&radius_km=10",
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["activity"]["id"], id.as_str());
    assert_eq!(found[0]["activity"]["participant_count"], 1);
    assert!(found[0]["distance_km"].as_f64().unwrap() < 1.0);

    let (status, activity) = call(
        &router,
        Method::GET,
        &format!("/api/v1/activities/{id}"),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activity["creator_id"], "alice");
    assert_eq!(activity["creator_name"], "Alice");
}

#[tokio::test]
async fn test_quota_rejection_names_tier_and_limit() {
    let router = test_router();
    for _ in 0..3 {
        create_activity(&router, "alice").await;
    }
    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v1/activities",
        Some("alice"),
        Some(activity_body(5.0)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "quota_exceeded");
    assert_eq!(body["tier"], "free");
    assert_eq!(body["limit"], 3.0);
}

#[tokio::test]
async fn test_radius_gate_and_upgrade() {
    let router = test_router();
    let uri = "/api/v1/activities?lat=52.52&lng=13.4&radius_km=30";
    let (status, body) = call(&router, Method::GET, uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "radius_not_allowed");
    assert_eq!(body["limit"], 10.0);

    let (status, usage) = call(
        &router,
        Method::POST,
        "/api/v1/me/tier",
        Some("bob"),
        Some(json!({ "tier": "gold" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["tier"], "gold");
    assert_eq!(usage["max_radius_km"], 50);

    let (status, _) = call(&router, Method::GET, uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_join_flow_permissions() {
    let router = test_router();
    let id = create_activity(&router, "alice").await;
    let requests = format!("/api/v1/activities/{id}/requests");
    let join = json!({ "user_name": "Bob", "message": "" });

    let (status, request) = call(&router, Method::POST, &requests, Some("bob"), Some(join.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    let (status, body) = call(&router, Method::POST, &requests, Some("bob"), Some(join)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, _) = call(&router, Method::GET, &requests, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, pending) = call(&router, Method::GET, &requests, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let resolve = format!(
        "/api/v1/requests/{}/resolve",
        request["id"].as_str().unwrap()
    );
    let (status, _) = call(
        &router,
        Method::POST,
        &resolve,
        Some("bob"),
        Some(json!({ "decision": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(
        &router,
        Method::POST,
        &resolve,
        Some("alice"),
        Some(json!({ "decision": "reject" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(
        &router,
        Method::POST,
        &resolve,
        Some("alice"),
        Some(json!({ "decision": "accept" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    let (status, body) = call(
        &router,
        Method::GET,
        &format!("/api/v1/activities/{}", uuid::Uuid::now_v7()),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_chat_over_rest() {
    let router = test_router();
    let id = activity_with_bob(&router).await;
    let messages = format!("/api/v1/activities/{id}/messages");

    let (status, sent) = call(
        &router,
        Method::POST,
        &messages,
        Some("bob"),
        Some(json!({ "text": "  see you there  " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["seq"], 1);
    assert_eq!(sent["text"], "see you there");

    let (status, body) = call(
        &router,
        Method::POST,
        &messages,
        Some("carol"),
        Some(json!({ "text": "let me in" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, body) = call(
        &router,
        Method::POST,
        &messages,
        Some("alice"),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid_message");

    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/activities/{id}/read"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/activities/{id}/typing"),
        Some("alice"),
        Some(json!({ "is_typing": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, page) = call(
        &router,
        Method::GET,
        &format!("{messages}?cursor=start&page_size=10"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page_messages = page["messages"].as_array().unwrap();
    assert_eq!(page_messages.len(), 1);
    assert_eq!(page_messages[0]["read_by"], json!(["alice"]));

    let (status, _) = call(
        &router,
        Method::GET,
        &format!("{messages}?cursor=sideways"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = call(&router, Method::GET, &messages, Some("carol"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_account_endpoints() {
    let router = test_router();
    let (status, usage) = call(&router, Method::GET, "/api/v1/me/usage", Some("dave"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["tier"], "free");
    assert_eq!(usage["days_used"], 0);
    assert_eq!(usage["max_activities"], 3);

    let (status, hints) = call(&router, Method::GET, "/api/v1/me/hints", Some("dave"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        hints,
        json!({ "prompt_upgrade": false, "show_daily_suggestions": false })
    );

    let (status, tiers) = call(&router, Method::GET, "/api/v1/tiers", Some("dave"), None).await;
    assert_eq!(status, StatusCode::OK);
    let tiers = tiers.as_array().unwrap();
    assert_eq!(tiers.len(), 4);
    assert_eq!(tiers[3]["tier"], "platinum");
    assert_eq!(tiers[3]["max_activities"], -1);
}

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn ws_connect(addr: SocketAddr, user: Option<&str>) -> Client {
    let token = match user {
        Some(user) => sign_session_token(user, SECRET),
        None => "nobody.0.AAAA".to_owned(),
    };
    ws_connect_with(addr, &token).await
}

async fn ws_connect_with(addr: SocketAddr, token: &str) -> Client {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/ws"))
        .await
        .unwrap();
    let frame = json!({ "type": "authenticate", "token": token });
    ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
    ws
}

/// Next text frame as JSON, or the close code if the server closed.
async fn ws_next(ws: &mut Client) -> Result<Value, Option<u16>> {
    ws_next_within(ws, Duration::from_secs(2)).await
}

async fn ws_next_within(ws: &mut Client, wait: Duration) -> Result<Value, Option<u16>> {
    loop {
        let frame = tokio::time::timeout(wait, ws.next())
            .await
            .expect("no frame in time");
        match frame {
            Some(Ok(WsMessage::Text(text))) => return Ok(serde_json::from_str(&text).unwrap()),
            Some(Ok(WsMessage::Close(frame))) => return Err(frame.map(|f| u16::from(f.code))),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Err(None),
        }
    }
}

#[tokio::test]
async fn test_ws_rejects_bad_credential() {
    let addr = spawn_server(test_router()).await;
    let mut ws = ws_connect(addr, None).await;
    assert_eq!(ws_next(&mut ws).await, Err(Some(4001)));
}

#[tokio::test]
async fn test_ws_streams_activity_events() {
    let router = test_router();
    let addr = spawn_server(router.clone()).await;

    let mut alice = ws_connect(addr, Some("alice")).await;
    let greeting = ws_next(&mut alice).await.unwrap();
    assert_eq!(greeting, json!({ "type": "authenticated", "user_id": "alice" }));

    // Created after connecting, so the subscription comes from the membership grant.
    let id = activity_with_bob(&router).await;
    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/activities/{id}/messages"),
        Some("bob"),
        Some(json!({ "text": "on my way" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let frame = ws_next(&mut alice).await.unwrap();
    assert_eq!(frame["type"], "new_message");
    assert_eq!(frame["message"]["text"], "on my way");
    assert_eq!(frame["message"]["sender_id"], "bob");

    let foreign = json!({
        "type": "typing",
        "event_id": uuid::Uuid::now_v7(),
        "is_typing": true
    });
    alice
        .send(WsMessage::Text(foreign.to_string()))
        .await
        .unwrap();
    let frame = ws_next(&mut alice).await.unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], 4403);

    alice
        .send(WsMessage::Text("not json".to_owned()))
        .await
        .unwrap();
    let frame = ws_next(&mut alice).await.unwrap();
    assert_eq!(frame["code"], 4400);
}

#[tokio::test]
async fn test_ws_closes_when_token_lapses() {
    let router = build_router(test_state(2));
    let id = activity_with_bob(&router).await;
    let addr = spawn_server(router.clone()).await;

    let issued = OffsetDateTime::now_utc().unix_timestamp() - 1;
    let mut alice = ws_connect_with(addr, &sign_session_token_at("alice", issued, SECRET)).await;
    let greeting = ws_next(&mut alice).await.unwrap();
    assert_eq!(greeting["type"], "authenticated");

    assert_eq!(
        ws_next_within(&mut alice, Duration::from_secs(5)).await,
        Err(Some(4001))
    );

    // Traffic after the close never reaches the lapsed session.
    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/activities/{id}/messages"),
        Some("bob"),
        Some(json!({ "text": "secret plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(ws_next(&mut alice).await.is_err());
}

#[tokio::test]
async fn test_ws_rechecks_tokens_after_auth_reload() {
    let state = test_state(3600);
    let addr = spawn_server(build_router(state.clone())).await;

    let mut alice = ws_connect(addr, Some("alice")).await;
    assert_eq!(ws_next(&mut alice).await.unwrap()["type"], "authenticated");

    const ROTATED: &[u8] = b"rotated-secret";
    *state.config.auth.write().await = AuthConfig::new(ROTATED.to_vec().into_boxed_slice(), 3600);
    state.notify_auth_reloaded();
    assert_eq!(ws_next(&mut alice).await, Err(Some(4001)));

    // A token signed with the new secret survives the next reload.
    let mut bob = ws_connect_with(addr, &sign_session_token("bob", ROTATED)).await;
    assert_eq!(ws_next(&mut bob).await.unwrap()["type"], "authenticated");
    state.notify_auth_reloaded();
    bob.send(WsMessage::Text("not json".to_owned()))
        .await
        .unwrap();
    let frame = ws_next(&mut bob).await.unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], 4400);
}

fn ws_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/api/v1/ws")).unwrap()
}

#[tokio::test]
async fn test_chat_client_stops_after_auth_rejection() {
    let addr = spawn_server(test_router()).await;
    let forged = sign_session_token("alice", b"wrong-secret");
    let (client, _events) = ChatClient::connect(ChatClientConfig::new(ws_url(addr)), forged);

    let mut state = client.state_watcher();
    let last = *tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last, ConnectionState::AuthRejected);

    // Longer than the first backoff delay: no reconnect happened and the
    // supervisor is gone.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.state(), ConnectionState::AuthRejected);
    assert!(state.has_changed().is_err());
}

#[tokio::test]
async fn test_chat_client_receives_pushes_until_logout() {
    let router = test_router();
    let addr = spawn_server(router.clone()).await;
    let (client, mut events) = ChatClient::connect(
        ChatClientConfig::new(ws_url(addr)),
        sign_session_token("alice", SECRET),
    );
    let mut state = client.state_watcher();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let id = activity_with_bob(&router).await;
    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/activities/{id}/messages"),
        Some("bob"),
        Some(json!({ "text": "on my way" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let pushed = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match pushed {
        WsServerMessage::NewMessage { message } => assert_eq!(message.text, "on my way"),
        other => panic!("unexpected {other:?}"),
    }

    client.logout().await;
    assert_eq!(*state.borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_api_client_round_trip() {
    let addr = spawn_server(test_router()).await;
    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let alice = ApiClient::new(base.clone(), sign_session_token("alice", SECRET));

    let created = alice
        .create_activity(&CreateActivityRequest {
            title: "Sunday run".to_owned(),
            category: "sports".to_owned(),
            description: String::new(),
            location: LocationDto {
                name: "Park".to_owned(),
                lat: 52.52,
                lng: 13.405,
            },
            starts_at: 1_900_000_000,
            max_participants: 3,
            radius_km: 5.0,
            creator_name: "Alice".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(created.creator_id, "alice");
    assert_eq!(alice.get_activity(created.id).await.unwrap(), created);

    let err = alice.discover(52.52, 13.4, 30.0).await.unwrap_err();
    match &err {
        ClientError::Api { status, .. } => assert_eq!(status.as_u16(), 403),
        other => panic!("unexpected {other:?}"),
    }
    let body = err.api_body().unwrap();
    assert_eq!(body.kind, ApiErrorKind::RadiusNotAllowed);
    assert_eq!(body.tier, Some(Tier::Free));
    assert_eq!(body.limit, Some(10.0));

    let stranger = ApiClient::new(base, sign_session_token("alice", b"wrong-secret"));
    let err = stranger.usage().await.unwrap_err();
    assert_eq!(err.api_body().unwrap().kind, ApiErrorKind::Unauthorized);
}
