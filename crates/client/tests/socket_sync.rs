//! End-to-end sync against an in-process Socket.IO stub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use wadash_client::{
    ClientError, ConnectionConfig, ConnectionStatus, DashboardState, Notification, Notifier,
    Severity, SocketManager, StoreHandle,
};
use wadash_protocol::SessionStatus;

const WAIT: Duration = Duration::from_secs(5);
const CLOSE: &str = "__close__";
const DROP: &str = "__drop__";

#[derive(Clone, Copy)]
enum Mode {
    Accept,
    Refuse,
    /// Accept with a 100ms + 100ms ping window and never ping.
    Quiet,
}

impl Mode {
    fn ping_window(self) -> (u64, u64) {
        match self {
            Mode::Quiet => (100, 100),
            Mode::Accept | Mode::Refuse => (25_000, 20_000),
        }
    }
}

struct Stub {
    url: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
    accepted: Arc<AtomicUsize>,
}

impl Stub {
    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, push_rx) = mpsc::unbounded_channel();
        let push_rx = Arc::new(Mutex::new(push_rx));
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(stream, mode, n, client_tx.clone(), push_rx.clone()));
            }
        });

        Stub {
            url: format!("http://{addr}"),
            from_client,
            to_client,
            accepted,
        }
    }

    fn push(&self, frame: &str) {
        self.to_client.send(frame.to_string()).expect("stub alive");
    }

    async fn next_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("frame within timeout")
            .expect("stub alive")
    }
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn serve(
    stream: TcpStream,
    mode: Mode,
    n: usize,
    from_client: mpsc::UnboundedSender<String>,
    push_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
) {
    let mut ws = accept_async(stream).await.expect("ws handshake");
    let (interval, ping_timeout) = mode.ping_window();
    ws.send(Message::text(format!(
        r#"0{{"sid":"eio-{n}","upgrades":[],"pingInterval":{interval},"pingTimeout":{ping_timeout},"maxPayload":1000000}}"#
    )))
    .await
    .expect("send open");

    let Some(connect) = next_text(&mut ws).await else {
        return;
    };
    let _ = from_client.send(connect);

    if let Mode::Refuse = mode {
        let _ = ws
            .send(Message::text(r#"44/whatsapp,{"message":"Not authorized"}"#))
            .await;
        return;
    }

    ws.send(Message::text(format!(r#"40/whatsapp,{{"sid":"ns-{n}"}}"#)))
        .await
        .expect("send connect ack");
    ws.send(Message::text(
        r#"42/whatsapp,["initial-state",[{"id":"alpha","status":"ready"},{"id":"beta","status":"qr-received","qr":"2@beta"}]]"#,
    ))
    .await
    .expect("send initial state");

    let mut outgoing = push_rx.lock().await;
    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = from_client.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            push = outgoing.recv() => match push {
                // Hang up without a close handshake.
                Some(frame) if frame == DROP => return,
                Some(frame) if frame == CLOSE => {
                    let _ = ws.send(Message::text("1")).await;
                    let _ = ws.close(None).await;
                    break;
                }
                Some(frame) => {
                    if ws.send(Message::text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn wait_for_state<F>(store: &StoreHandle, pred: F) -> Arc<DashboardState>
where
    F: Fn(&DashboardState) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let snap = store.snapshot();
        if pred(&snap) {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "state condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn initial_state_and_updates_flow_into_store() {
    let mut stub = Stub::start(Mode::Accept).await;
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), Notifier::default());
    let (store, _task) = StoreHandle::spawn(manager.subscribe(), 100);

    manager.connect().await.expect("connect");
    assert!(manager.is_connected());
    assert_eq!(manager.sid(), Some("ns-1"));
    assert_eq!(stub.next_frame().await, "40/whatsapp,");

    let snap = wait_for_state(&store, |s| s.sessions().len() == 2).await;
    assert_eq!(
        snap.sessions().get("beta").and_then(|s| s.qr.clone()).as_deref(),
        Some("2@beta")
    );

    stub.push(r#"42/whatsapp,["session-update",{"id":"beta","status":"ready","qr":null}]"#);
    stub.push(r#"42/whatsapp,["session-removed",{"id":"alpha"}]"#);
    stub.push(r#"42/whatsapp,["new-message",{"chatId":"628222@c.us","message":{"id":"m1","body":"halo"}}]"#);
    stub.push(r#"42/whatsapp,["new-message",{"chatId":"628222@c.us","message":{"id":"m1","body":"halo"}}]"#);
    stub.push(r#"42/whatsapp,["log-message",{"id":"beta","message":"done"}]"#);

    let snap = wait_for_state(&store, |s| {
        s.sessions()
            .logs("beta")
            .is_some_and(|logs| logs.latest() == Some("done"))
    })
    .await;

    let beta = snap.sessions().get("beta").expect("beta");
    assert_eq!(beta.status, SessionStatus::Ready);
    assert_eq!(beta.qr, None);
    assert!(!snap.sessions().contains("alpha"));
    assert_eq!(snap.inbox().messages("628222@c.us").len(), 1);
}

#[tokio::test]
async fn engine_ping_gets_pong() {
    let mut stub = Stub::start(Mode::Accept).await;
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), Notifier::default());
    manager.connect().await.expect("connect");
    assert_eq!(stub.next_frame().await, "40/whatsapp,");

    stub.push("2");
    assert_eq!(stub.next_frame().await, "3");
}

#[tokio::test]
async fn emitters_send_only_while_connected() {
    let mut stub = Stub::start(Mode::Accept).await;
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), Notifier::default());
    let emitter = manager.emitter();

    assert!(!emitter.add_new_session("early"));

    manager.connect().await.expect("connect");
    assert_eq!(stub.next_frame().await, "40/whatsapp,");

    assert!(emitter.add_new_session("sales-2"));
    assert_eq!(
        stub.next_frame().await,
        r#"42/whatsapp,["add-new-session",{"id":"sales-2"}]"#
    );

    assert!(emitter.request_login_code("sales-2", "628111"));
    let frame = stub.next_frame().await;
    assert!(frame.starts_with(r#"42/whatsapp,["request-login-code","#));
    assert!(frame.contains(r#""phoneNumber":"628111""#));

    manager.disconnect().await;
    assert_eq!(stub.next_frame().await, "41/whatsapp,");
    assert!(!manager.is_connected());
    assert!(!emitter.logout_session("sales-2"));
}

#[tokio::test]
async fn connect_reuses_and_reconnect_rebuilds() {
    let mut stub = Stub::start(Mode::Accept).await;
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), Notifier::default());

    manager.connect().await.expect("connect");
    manager.connect().await.expect("reuse");
    assert_eq!(stub.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(stub.next_frame().await, "40/whatsapp,");

    manager.reconnect().await.expect("reconnect");
    let mut frames = vec![stub.next_frame().await, stub.next_frame().await];
    frames.sort();
    assert_eq!(frames, vec!["40/whatsapp,", "41/whatsapp,"]);
    assert_eq!(stub.accepted.load(Ordering::SeqCst), 2);
    assert_eq!(manager.sid(), Some("ns-2"));
}

#[tokio::test]
async fn token_is_sent_in_namespace_auth() {
    let mut stub = Stub::start(Mode::Accept).await;
    let config = ConnectionConfig::new(stub.url.clone()).with_token(Some("tok-9".into()));
    let mut manager = SocketManager::new(config, Notifier::default());
    manager.connect().await.expect("connect");
    assert_eq!(stub.next_frame().await, r#"40/whatsapp,{"token":"tok-9"}"#);
}

#[tokio::test]
async fn refused_namespace_is_reported() {
    let stub = Stub::start(Mode::Refuse).await;
    let notifier = Notifier::default();
    let mut notes = notifier.subscribe();
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), notifier);

    match manager.connect().await {
        Err(ClientError::ConnectRefused { namespace, message }) => {
            assert_eq!(namespace, "/whatsapp");
            assert_eq!(message, "Not authorized");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!manager.is_connected());

    let note = tokio::time::timeout(WAIT, notes.recv())
        .await
        .expect("notification in time")
        .expect("notification");
    assert_eq!(note.severity, Severity::Error);
}

#[tokio::test]
async fn server_close_marks_disconnected_and_warns() {
    let mut stub = Stub::start(Mode::Accept).await;
    let notifier = Notifier::default();
    let mut notes = notifier.subscribe();
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), notifier);
    let mut status = manager.status();

    manager.connect().await.expect("connect");
    assert_eq!(stub.next_frame().await, "40/whatsapp,");

    stub.push(CLOSE);
    tokio::time::timeout(WAIT, async {
        while *status.borrow_and_update() != ConnectionStatus::Disconnected {
            status.changed().await.expect("status sender alive");
        }
    })
    .await
    .expect("disconnect observed");

    assert!(!manager.is_connected());
    assert!(!manager.emitter().request_chats("alpha"));

    let note = tokio::time::timeout(WAIT, notes.recv())
        .await
        .expect("notification in time")
        .expect("notification");
    assert_eq!(note.severity, Severity::Warning);
    assert_eq!(note.title, "Disconnected from backend");
    assert_eq!(note.detail.as_deref(), Some("server closed the session"));

    // A dead connection is replaced on the next connect.
    manager.connect().await.expect("fresh connect");
    assert!(manager.is_connected());
    assert_eq!(manager.sid(), Some("ns-2"));
}

async fn lost_connection_note(stub_mode: Mode, trigger: Option<&str>) -> Notification {
    let mut stub = Stub::start(stub_mode).await;
    let notifier = Notifier::default();
    let mut notes = notifier.subscribe();
    let mut manager = SocketManager::new(ConnectionConfig::new(stub.url.clone()), notifier);

    manager.connect().await.expect("connect");
    assert_eq!(stub.next_frame().await, "40/whatsapp,");
    if let Some(frame) = trigger {
        stub.push(frame);
    }

    let note = tokio::time::timeout(WAIT, notes.recv())
        .await
        .expect("notification in time")
        .expect("notification");
    assert!(!manager.is_connected());
    note
}

#[tokio::test]
async fn transport_error_detail_reaches_notification() {
    let note = lost_connection_note(Mode::Accept, Some(DROP)).await;
    assert_eq!(note.title, "Disconnected from backend");
    let detail = note.detail.expect("detail");
    assert!(detail.starts_with("transport error: "), "detail was {detail:?}");
    assert!(detail.len() > "transport error: ".len());
}

#[tokio::test]
async fn silent_server_hits_ping_timeout() {
    let note = lost_connection_note(Mode::Quiet, None).await;
    assert_eq!(
        note.detail.as_deref(),
        Some("ping timeout: no frame for 200ms")
    );
}
