//! Integration tests for presence: online broadcast on first connect,
//! reconnect suppression, debounced offline, and the process-wide broadcast
//! entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use rivulet_server::auth::cache::{CredentialCache, MemoryCredentialCache};
use rivulet_server::auth::token;
use rivulet_server::chat::broadcast::broadcast_room_event;
use rivulet_server::directory::{MembershipDirectory, MemoryDirectory};
use rivulet_server::routes;
use rivulet_server::state::AppState;
use rivulet_server::store::{MemoryMessageStore, MessageStore};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsReader = futures_util::stream::SplitStream<WsClient>;
type WsWriter = futures_util::stream::SplitSink<WsClient, Message>;

struct TestServer {
    addr: SocketAddr,
    jwt_secret: Vec<u8>,
    state: AppState,
    store: Arc<MemoryMessageStore>,
    directory: Arc<MemoryDirectory>,
    tokens: Arc<MemoryCredentialCache>,
    _tmp: tempfile::TempDir,
}

async fn start_server(debounce: Duration) -> TestServer {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp.path().to_str().unwrap().to_string();
    let jwt_secret =
        token::load_or_generate_signing_key(&data_dir).expect("Failed to generate signing key");

    let store = Arc::new(MemoryMessageStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let tokens = Arc::new(MemoryCredentialCache::new());

    let store_dyn: Arc<dyn MessageStore> = store.clone();
    let directory_dyn: Arc<dyn MembershipDirectory> = directory.clone();
    let tokens_dyn: Arc<dyn CredentialCache> = tokens.clone();

    let state = AppState::new(
        jwt_secret.clone(),
        store_dyn,
        directory_dyn,
        tokens_dyn,
        debounce,
    );

    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        jwt_secret,
        state,
        store,
        directory,
        tokens,
        _tmp: tmp,
    }
}

fn login(server: &TestServer, user_id: i64, identity: &str) -> String {
    let tok = token::issue_access_token(&server.jwt_secret, user_id, identity).unwrap();
    server.tokens.store_token(user_id, tok.clone());
    tok
}

async fn connect(addr: SocketAddr, credential: &str) -> WsClient {
    let url = format!("ws://{}/ws/{}", addr, credential);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

async fn next_envelope(read: &mut WsReader, window: Duration) -> Option<Value> {
    loop {
        match tokio::time::timeout(window, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                    return Some(value);
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

async fn drain(read: &mut WsReader) {
    while next_envelope(read, Duration::from_millis(200)).await.is_some() {}
}

/// Heartbeat round trip: proves the server-side actor for this connection is
/// running (and therefore registered) before the test drives traffic at it.
async fn hello(write: &mut WsWriter, read: &mut WsReader) {
    write.send(Message::Text("ping".into())).await.unwrap();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) if text.as_str() == "pong" => return,
            Ok(Some(Ok(_))) => continue,
            other => panic!("heartbeat went unanswered: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_first_connect_broadcasts_online_to_room_members() {
    let server = start_server(Duration::from_secs(30)).await;
    server.directory.join_room("R1", 1);
    server.directory.join_room("R1", 2);

    let tok_a = login(&server, 1, "alice");
    let tok_b = login(&server, 2, "bob");

    let ws_b = connect(server.addr, &tok_b).await;
    let (mut write_b, mut read_b) = ws_b.split();
    hello(&mut write_b, &mut read_b).await;
    drain(&mut read_b).await;

    let _ws_a = connect(server.addr, &tok_a).await;

    let presence = next_envelope(&mut read_b, Duration::from_secs(2))
        .await
        .expect("Bob should see Alice come online");
    assert_eq!(presence["statusCode"], 2001);
    assert_eq!(presence["type"], "PRESENCE");
    assert_eq!(presence["payload"]["userIdentity"], "alice");
    assert_eq!(presence["payload"]["isOnline"], true);
}

#[tokio::test]
async fn test_reconnect_within_window_is_silent() {
    let server = start_server(Duration::from_millis(400)).await;
    server.directory.join_room("R1", 1);
    server.directory.join_room("R1", 2);

    let tok_a = login(&server, 1, "alice");
    let tok_b = login(&server, 2, "bob");

    let ws_b = connect(server.addr, &tok_b).await;
    let (mut write_b, mut read_b) = ws_b.split();
    hello(&mut write_b, &mut read_b).await;

    let ws_a = connect(server.addr, &tok_a).await;
    drain(&mut read_b).await;

    // Alice drops and comes back well inside the window.
    drop(ws_a);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ws_a2 = connect(server.addr, &tok_a).await;

    // No offline record, and no second online record either: continuity.
    assert!(
        next_envelope(&mut read_b, Duration::from_millis(900)).await.is_none(),
        "reconnect inside the window must not produce presence churn"
    );
    assert_eq!(
        server.store.last_seen_calls(1),
        0,
        "no last-seen write for a suppressed offline"
    );
}

#[tokio::test]
async fn test_unreconnected_disconnect_fires_offline_once() {
    let server = start_server(Duration::from_millis(300)).await;
    server.directory.join_room("R1", 1);
    server.directory.join_room("R1", 2);

    let tok_a = login(&server, 1, "alice");
    let tok_b = login(&server, 2, "bob");

    let ws_b = connect(server.addr, &tok_b).await;
    let (mut write_b, mut read_b) = ws_b.split();
    hello(&mut write_b, &mut read_b).await;

    let ws_a = connect(server.addr, &tok_a).await;
    let (mut write_a, mut read_a) = ws_a.split();

    // Report the active room via a heartbeat, then drop the transport.
    write_a.send(Message::Text("pingR1".into())).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), read_a.next())
        .await
        .expect("heartbeat answered")
        .unwrap()
        .unwrap();
    drain(&mut read_b).await;
    drop(write_a);
    drop(read_a);

    let offline = next_envelope(&mut read_b, Duration::from_secs(2))
        .await
        .expect("Bob should see Alice go offline after the window");
    assert_eq!(offline["statusCode"], 2001);
    assert_eq!(offline["payload"]["userIdentity"], "alice");
    assert_eq!(offline["payload"]["isOnline"], false);

    assert_eq!(server.store.last_seen_calls(1), 1);
    assert_eq!(server.store.last_seen(1).unwrap().0, "R1");

    // The worker removes the tracking entry right after the broadcast; give
    // it a beat before checking.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !server.state.presence.has_pending(1),
        "the pending-offline entry self-removes after firing"
    );

    assert!(
        next_envelope(&mut read_b, Duration::from_millis(500)).await.is_none(),
        "offline fires exactly once"
    );
}

#[tokio::test]
async fn test_room_events_flow_through_the_shared_broadcaster() {
    let server = start_server(Duration::from_secs(30)).await;

    let tok_b = login(&server, 2, "bob");
    let ws_b = connect(server.addr, &tok_b).await;
    let (mut write_b, mut read_b) = ws_b.split();
    hello(&mut write_b, &mut read_b).await;
    drain(&mut read_b).await;

    // Non-connection code (e.g. the room CRUD service) pushes a 3xxx event
    // through the same engine.
    broadcast_room_event(
        &server.state.broadcaster,
        "ROOM_MEMBER_JOINED",
        serde_json::json!({"room": "R1", "userIdentity": "carol"}),
        [2].into_iter().collect(),
    );

    let event = next_envelope(&mut read_b, Duration::from_secs(2))
        .await
        .expect("room event delivered");
    assert_eq!(event["statusCode"], 3001);
    assert_eq!(event["type"], "ROOM_MEMBER_JOINED");
    assert_eq!(event["payload"]["userIdentity"], "carol");
}
