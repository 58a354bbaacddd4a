//! Integration tests running the client against an in-process fake chat API.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use comlink_client::{
    ChannelHandler, ChatClient, ClientError, ClientEvent, ConnectionState, ServerConfig, Token,
    codec,
};

const CHAT_ID: &str = "85cca390-8a85-42f7-b122-262d0c924675";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// base64("alice:secret")
const ALICE_BASIC: &str = "Basic YWxpY2U6c2VjcmV0";

/// Shared state of the fake server
#[derive(Default)]
struct FakeState {
    login_hits: AtomicUsize,
    me_hits: AtomicUsize,
    socket_hits: AtomicUsize,
    close_frames: AtomicUsize,
    socket_token: Mutex<Option<String>>,
    frames: Mutex<Vec<String>>,
}

/// Helper struct to manage the fake chat API lifecycle
struct FakeChatServer {
    addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeChatServer {
    /// Start the fake server on an ephemeral port
    async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/api/v1/auth/login", get(login))
            .route("/api/v1/auth/me", get(me))
            .route("/api/v1/chats", get(chats))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake server");
        let addr = listener.local_addr().expect("Failed to read local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake server failed");
        });

        FakeChatServer { addr, state }
    }

    fn config(&self) -> ServerConfig {
        ServerConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    fn hits(&self) -> (usize, usize, usize) {
        (
            self.state.login_hits.load(Ordering::SeqCst),
            self.state.me_hits.load(Ordering::SeqCst),
            self.state.socket_hits.load(Ordering::SeqCst),
        )
    }
}

async fn login(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.login_hits.fetch_add(1, Ordering::SeqCst);

    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(ALICE_BASIC) => Json(json!({ "token": "t1" })).into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn me(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    state.me_hits.fetch_add(1, Ordering::SeqCst);

    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer t1") => Json(json!({
            "user": { "id": "u1", "name": "Alice" },
            "profile": null
        }))
        .into_response(),
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn chats(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<FakeState>>,
) -> Response {
    state.socket_hits.fetch_add(1, Ordering::SeqCst);

    let token = params.get("token").cloned();
    *state.socket_token.lock().unwrap() = token.clone();
    if token.as_deref() != Some("t1") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Echo every envelope back as a full message.
///
/// Two bodies act as commands: `/close` makes the server close with 1001 and
/// `/garbage` makes it answer with a non-JSON frame.
async fn handle_socket(mut socket: WebSocket, state: Arc<FakeState>) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            WsMessage::Text(text) => {
                state.frames.lock().unwrap().push(text.as_str().to_owned());
                let Ok(envelope) = codec::decode_envelope(text.as_str()) else {
                    continue;
                };

                let reply = match envelope.inner.body.as_str() {
                    "/close" => WsMessage::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "going away".into(),
                    })),
                    "/garbage" => WsMessage::Text("not json".into()),
                    body => {
                        let echoed = json!({
                            "id": Uuid::new_v4().to_string(),
                            "body": body,
                            "chat": {
                                "id": envelope.inner.chat_id,
                                "messages": [],
                                "participants_ids": [envelope.inner.author_id]
                            },
                            "author": { "id": envelope.inner.author_id, "name": "Alice" },
                            "created_at": envelope.inner.created_at
                        });
                        WsMessage::Text(echoed.to_string().into())
                    }
                };

                if socket.send(reply).await.is_err() {
                    break;
                }
            }
            WsMessage::Close(_) => {
                state.close_frames.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

fn new_client(server: &FakeChatServer) -> (ChatClient, mpsc::UnboundedReceiver<ClientEvent>) {
    let (handler, events) = ChannelHandler::new();
    (ChatClient::new(server.config(), Arc::new(handler)), events)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(RECV_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for client event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_connect_resolves_user_and_opens_socket_with_token() {
    // テスト項目: ログイン → /me → ソケット接続の順に進み、on_connect が一度だけ呼ばれる
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);

    // when (操作):
    let user = client.connect("alice", "secret").await.unwrap();

    // then (期待する結果):
    assert_eq!(user.id, "u1");
    assert_eq!(user.name, "Alice");
    assert_eq!(client.user(), Some(&user));
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(server.hits(), (1, 1, 1));
    assert_eq!(
        server.state.socket_token.lock().unwrap().as_deref(),
        Some("t1")
    );
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(u, _) if u == user));

    client.send_utf8(CHAT_ID, "ping").unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Message(_)));
}

#[tokio::test]
async fn test_connected_event_carries_usable_sender() {
    // テスト項目: on_connect で渡される送信ハンドルからフレームを送ると、サーバーに届きエコーが返る
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    let user = client.connect("alice", "secret").await.unwrap();
    let sender = match next_event(&mut events).await {
        ClientEvent::Connected(_, sender) => sender,
        other => panic!("expected connected, got {:?}", other),
    };

    // when (操作):
    let envelope = codec::encode(&user, CHAT_ID, "via handle", chrono::Utc::now());
    sender.send_text(codec::to_frame(&envelope).unwrap()).unwrap();

    // then (期待する結果):
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Message(m) if m.body == "via handle"
    ));
    client.disconnect();
    assert!(matches!(sender.send_text("late"), Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_login_rejection_makes_no_further_calls() {
    // テスト項目: ログインが 401 の場合、AuthError になり /me とソケットは呼ばれない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, _events) = new_client(&server);

    // when (操作):
    let result = client.connect("alice", "wrong").await;

    // then (期待する結果):
    let error = result.unwrap_err();
    assert!(matches!(error, ClientError::Auth { status: 401, .. }));
    assert_eq!(error.status(), Some(401));
    assert_eq!(server.hits(), (1, 0, 0));
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_empty_credentials_make_no_calls() {
    // テスト項目: 認証情報が空の場合、ネットワーク呼び出しは一切行われない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, _events) = new_client(&server);

    // when (操作):
    let result = client.connect("", "secret").await;

    // then (期待する結果):
    assert!(matches!(result, Err(ClientError::Config(_))));
    assert_eq!(server.hits(), (0, 0, 0));
}

#[tokio::test]
async fn test_connect_with_token_skips_login() {
    // テスト項目: トークン指定での接続はログインを呼ばずに /me とソケットだけを使う
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);

    // when (操作):
    let user = client.connect_with_token(Token::new("t1")).await.unwrap();

    // then (期待する結果):
    assert_eq!(user.id, "u1");
    assert_eq!(server.hits(), (0, 1, 1));
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));
}

#[tokio::test]
async fn test_send_and_receive_are_logged() {
    // テスト項目: 送信メッセージが封筒形式で届き、エコーが受信ログとハンドラに届く
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));

    // when (操作):
    client.send_utf8(CHAT_ID, "hello").unwrap();

    // then (期待する結果):
    let received = match next_event(&mut events).await {
        ClientEvent::Message(message) => message,
        other => panic!("expected message, got {:?}", other),
    };
    assert_eq!(received.body, "hello");
    assert_eq!(received.author.id, "u1");
    assert_eq!(received.chat.id, CHAT_ID);

    let sent = client.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].inner.author_id, "u1");
    assert_eq!(sent[0].inner.chat_id, CHAT_ID);
    assert_eq!(received.created_at, sent[0].inner.created_at);
    assert_eq!(client.received_messages(), vec![received]);

    let frames = server.state.frames.lock().unwrap().clone();
    let envelope = codec::decode_envelope(&frames[0]).unwrap();
    assert_eq!(envelope, sent[0]);
}

#[tokio::test]
async fn test_server_close_is_reported_with_its_code() {
    // テスト項目: サーバーがコード 1001 で切断すると on_disconnect(1001) が届き、以降メッセージは届かない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));

    // when (操作):
    client.send_utf8(CHAT_ID, "/close").unwrap();

    // then (期待する結果):
    assert!(matches!(next_event(&mut events).await, ClientEvent::Disconnected(1001)));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send_utf8(CHAT_ID, "too late"),
        Err(ClientError::NotConnected)
    ));
    let after = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
    assert!(!matches!(after, Ok(Some(ClientEvent::Message(_)))));
    assert_eq!(client.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_disconnect_twice_sends_single_close_frame() {
    // テスト項目: disconnect を 2 回呼んでもクローズフレームは 1 回だけで、エラーにならない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));

    // when (操作):
    client.disconnect();
    client.disconnect();

    // then (期待する結果):
    assert!(matches!(next_event(&mut events).await, ClientEvent::Disconnected(1000)));
    assert_eq!(server.state.close_frames.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.user().is_none());
    assert!(matches!(
        client.send_utf8(CHAT_ID, "hello"),
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn test_malformed_frame_is_reported_without_closing() {
    // テスト項目: 不正なフレームは MalformedMessage として通知され、接続は維持される
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));

    // when (操作):
    client.send_utf8(CHAT_ID, "/garbage").unwrap();

    // then (期待する結果):
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Error(ClientError::MalformedMessage(_))
    ));
    assert_eq!(client.state(), ConnectionState::Open);
    assert!(client.received_messages().is_empty());

    client.send_utf8(CHAT_ID, "still here").unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Message(m) if m.body == "still here"
    ));
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    // テスト項目: 接続中に再度 connect すると AlreadyConnected になり、ネットワーク呼び出しは増えない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, _events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();

    // when (操作):
    let result = client.connect("alice", "secret").await;

    // then (期待する結果):
    assert!(matches!(result, Err(ClientError::AlreadyConnected)));
    assert_eq!(server.hits(), (1, 1, 1));
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_is_caller_driven() {
    // テスト項目: 切断後に呼び出し側が connect すれば新しいソケットが開かれる
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, mut events) = new_client(&server);
    client.connect("alice", "secret").await.unwrap();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));
    client.disconnect();
    assert!(matches!(next_event(&mut events).await, ClientEvent::Disconnected(1000)));

    // when (操作):
    let user = client.connect("alice", "secret").await.unwrap();

    // then (期待する結果):
    assert_eq!(user.id, "u1");
    assert_eq!(server.hits(), (2, 2, 2));
    assert!(matches!(next_event(&mut events).await, ClientEvent::Connected(..)));
}

#[tokio::test]
async fn test_send_before_connect_transmits_nothing() {
    // テスト項目: 接続前の send_utf8 は NotConnected を返し、サーバーには何も届かない
    // given (前提条件):
    let server = FakeChatServer::start().await;
    let (mut client, _events) = new_client(&server);

    // when (操作):
    let result = client.send_utf8(CHAT_ID, "hello");

    // then (期待する結果):
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(server.hits(), (0, 0, 0));
    assert!(server.state.frames.lock().unwrap().is_empty());
}
