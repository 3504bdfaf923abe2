use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::{BufMut, BytesMut};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use pibble_api::media::MediaStorage;
use pibble_api::state::{AppState, AppStateInner, DEFAULT_MAX_UPLOAD_BYTES};
use pibble_db::Database;
use pibble_gateway::dispatcher::Dispatcher;
use pibble_gateway::identity::{AdminCredential, IdentityResolver};
use pibble_gateway::rooms::RoomId;
use pibble_types::events::ServerEvent;
use pibble_types::models::{FriendStatus, NewPrivateMessage};

const BOUNDARY: &str = "pibble-test-boundary";
const MIB: usize = 1024 * 1024;
const UPLOAD_CHUNK: usize = 64 * 1024;

struct TestApp {
    app: Router,
    db: Arc<Database>,
    state: AppState,
    upload_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

async fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_user("k1", "ann", None, None, None).unwrap();
    db.create_user("k2", "bob", None, None, None).unwrap();
    db.create_user("k3", "cat", None, None, None).unwrap();

    let upload_dir = std::env::temp_dir().join(format!("pibble-test-{}", uuid::Uuid::new_v4()));
    let state: AppState = Arc::new(AppStateInner {
        identity: IdentityResolver::new(db.clone(), AdminCredential::defaults()),
        dispatcher: Dispatcher::new(),
        media: MediaStorage::new(upload_dir.clone()).await.unwrap(),
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    });

    TestApp {
        app: pibble_api::router(state.clone()),
        db,
        state,
        upload_dir,
    }
}

impl TestApp {
    fn befriend(&self, a: &str, b: &str) {
        let now = Utc::now();
        self.db.insert_friend_request(a, b, &now).unwrap();
        assert!(self.db.update_friend_status(a, b, FriendStatus::Accepted, &now).unwrap());
    }

    /// A live connection sitting in the private room of `a` and `b`.
    async fn watch_room(&self, a: &str, b: &str) -> UnboundedReceiver<ServerEvent> {
        let (id, rx) = self.state.dispatcher.register().await;
        self.state.dispatcher.join(id, RoomId::private(a, b)).await;
        rx
    }

    fn stored_files(&self) -> usize {
        std::fs::read_dir(&self.upload_dir).unwrap().count()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn history(&self, user: &str, friend: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(format!("/chat-history?userKey={}&friendKey={}", user, friend))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn upload(&self, fields: &[(&str, &str)], file: Option<(&str, &str, usize)>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/upload-chat-media")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(chunked(multipart_body(fields, file)))
            .unwrap();
        self.send(req).await
    }
}

/// Stream a request body in fixed-size frames, the way a browser sends a form.
fn chunked(bytes: bytes::Bytes) -> Body {
    let len = bytes.len();
    let frames = (0..len)
        .step_by(UPLOAD_CHUNK)
        .map(move |start| Ok::<_, Infallible>(bytes.slice(start..(start + UPLOAD_CHUNK).min(len))));
    Body::from_stream(futures_util::stream::iter(frames))
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, usize)>) -> bytes::Bytes {
    let mut body = BytesMut::new();
    for (name, value) in fields {
        body.put_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, size)) = file {
        body.put_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"media\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.put_bytes(0xAB, size);
        body.put_slice(b"\r\n");
    }
    body.put_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body.freeze()
}

const PAIR: &[(&str, &str)] = &[("senderKey", "k1"), ("receiverKey", "k2")];

#[tokio::test]
async fn oversized_upload_is_rejected_without_a_row() {
    let t = test_app().await;
    let mut room = t.watch_room("k1", "k2").await;

    let (status, body) = t.upload(PAIR, Some(("huge.mp4", "video/mp4", 60 * MIB))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("limit"));
    assert_eq!(t.db.count_private_messages().unwrap(), 0);
    assert_eq!(t.stored_files(), 0);
    assert!(room.try_recv().is_err());
}

#[tokio::test]
async fn oversized_key_field_is_rejected_without_a_row() {
    let t = test_app().await;
    let mut room = t.watch_room("k1", "k2").await;
    let huge_key = "k".repeat(60 * MIB);

    let (status, body) = t
        .upload(
            &[("senderKey", huge_key.as_str()), ("receiverKey", "k2")],
            Some(("a.png", "image/png", 16)),
        )
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Field senderKey is too large");
    assert_eq!(t.db.count_private_messages().unwrap(), 0);
    assert_eq!(t.stored_files(), 0);
    assert!(room.try_recv().is_err());

    // Just past the field cap is refused too
    let long_key = "k".repeat(257);
    let (status, _) = t
        .upload(
            &[("senderKey", "k1"), ("receiverKey", long_key.as_str())],
            Some(("a.png", "image/png", 16)),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(t.stored_files(), 0);
}

#[tokio::test]
async fn oversized_form_is_cut_off_by_the_body_limit() {
    let t = test_app().await;
    let padding = "p".repeat(60 * MIB);

    let (status, body) = t
        .upload(
            &[("senderKey", "k1"), ("receiverKey", "k2"), ("notes", padding.as_str())],
            Some(("a.png", "image/png", 16)),
        )
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["message"], "Upload exceeds the size limit");
    assert_eq!(t.db.count_private_messages().unwrap(), 0);
    assert_eq!(t.stored_files(), 0);
}

#[tokio::test]
async fn video_upload_creates_one_row_and_one_event() {
    let t = test_app().await;
    let mut room = t.watch_room("k2", "k1").await;

    let (status, body) = t.upload(PAIR, Some(("clip.mp4", "video/mp4", 10 * MIB))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let message_id = body["messageId"].as_i64().unwrap();
    let media_path = body["mediaPath"].as_str().unwrap().to_string();
    assert!(media_path.starts_with("uploads/") && media_path.ends_with(".mp4"));

    let rows = t.db.get_messages_between("k1", "k2").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, message_id);
    assert_eq!(rows[0].image_path.as_deref(), Some(media_path.as_str()));
    assert!(rows[0].text.is_none());

    match room.try_recv() {
        Ok(ServerEvent::PrivateMessage { id, image_path, text, .. }) => {
            assert_eq!(id, message_id);
            assert_eq!(image_path.as_deref(), Some(media_path.as_str()));
            assert!(text.is_none());
        }
        other => panic!("expected private_message, got {:?}", other),
    }
    assert!(room.try_recv().is_err());

    let stored = std::fs::metadata(t.upload_dir.join(media_path.trim_start_matches("uploads/"))).unwrap();
    assert_eq!(stored.len() as usize, 10 * MIB);
}

#[tokio::test]
async fn upload_validation_failures_are_structured() {
    let t = test_app().await;

    let (status, body) = t.upload(PAIR, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");

    let (status, _) = t
        .upload(&[("senderKey", "k1")], Some(("a.png", "image/png", 16)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.upload(PAIR, Some(("notes.txt", "text/plain", 16))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .upload(&[("senderKey", "nobody"), ("receiverKey", "k2")], Some(("a.png", "image/png", 16)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(t.db.count_private_messages().unwrap(), 0);
    assert_eq!(t.stored_files(), 0);
}

#[tokio::test]
async fn history_marks_read_once() {
    let t = test_app().await;
    t.befriend("k1", "k2");

    let now = Utc::now();
    for text in ["one", "two"] {
        let msg = NewPrivateMessage {
            sender: "k2".into(),
            receiver: "k1".into(),
            text: Some(text.into()),
            ..Default::default()
        };
        t.db.insert_private_message(&msg, &now).unwrap();
    }
    let reply = NewPrivateMessage {
        sender: "k1".into(),
        receiver: "k2".into(),
        text: Some("three".into()),
        ..Default::default()
    };
    t.db.insert_private_message(&reply, &now).unwrap();

    let (status, first) = t.history("k1", "k2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    let messages = first["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["text"], "one");

    // only messages addressed to the caller are marked
    for msg in messages {
        if msg["receiver"] == "k1" {
            assert!(msg["readAt"].is_string());
        } else {
            assert!(msg["readAt"].is_null());
        }
    }

    let (_, second) = t.history("k1", "k2").await;
    for (a, b) in messages.iter().zip(second["messages"].as_array().unwrap()) {
        assert_eq!(a["readAt"], b["readAt"]);
    }
}

#[tokio::test]
async fn history_requires_friendship() {
    let t = test_app().await;

    let (status, body) = t.history("k1", "k3").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    // admins may read any conversation
    let (status, _) = t.history("1pibble", "k3").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.history("bogus", "k3").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.history("k1", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signup_issues_a_working_key() {
    let t = test_app().await;

    let (status, body) = t.post_json("/signup", json!({ "username": "dot" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["postKey"].as_str().unwrap().to_string();
    assert_eq!(key.len(), 12);
    assert_eq!(body["username"], "dot");

    let user = t.state.identity.require(&key).await.unwrap();
    assert_eq!(user.display_name, "dot");

    let (status, _) = t.post_json("/signup", json!({ "username": "dot" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .post_json("/signup", json!({ "username": "eve", "customPostKey": "eve-key" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["postKey"], "eve-key");

    let (status, _) = t
        .post_json("/signup", json!({ "username": "fay", "customPostKey": "eve-key" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.post_json("/signup", json!({ "username": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signups_for_one_name_yield_one_account() {
    let t = test_app().await;

    let attempts: Vec<_> = (0..12)
        .map(|_| {
            let app = t.app.clone();
            tokio::spawn(async move {
                let req = Request::builder()
                    .method("POST")
                    .uri("/signup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "username": "dot" }).to_string()))
                    .unwrap();
                let resp = app.oneshot(req).await.unwrap();
                let status = resp.status();
                let body = resp.into_body().collect().await.unwrap().to_bytes();
                (status, serde_json::from_slice::<Value>(&body).unwrap())
            })
        })
        .collect();

    let mut created = 0;
    for handle in attempts {
        let (status, body) = handle.await.unwrap();
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => assert_eq!(body["message"], "Username already taken"),
            other => panic!("unexpected {} {}", other, body),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn friend_request_lifecycle_unlocks_history() {
    let t = test_app().await;

    let (status, _) = t
        .post_json("/friends/request", json!({ "postKey": "k1", "username": "cat" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .post_json("/friends/request", json!({ "postKey": "k1", "username": "cat" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.history("k1", "k3").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // only the addressee can answer
    let (status, _) = t
        .post_json("/friends/respond", json!({ "postKey": "k1", "username": "cat", "accept": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t
        .post_json("/friends/respond", json!({ "postKey": "k3", "username": "ann", "accept": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Friend request accepted");

    let (status, _) = t.history("k3", "k1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn friend_request_edge_cases() {
    let t = test_app().await;

    let (status, _) = t
        .post_json("/friends/request", json!({ "postKey": "k1", "username": "ann" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .post_json("/friends/request", json!({ "postKey": "k1", "username": "nobody" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .post_json("/friends/request", json!({ "postKey": "wrong", "username": "bob" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/friends/request")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = t.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
