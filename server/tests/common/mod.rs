#![allow(dead_code)]

use std::future::pending;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use chatd::config::Config;
use chatd::credentials::hash_password;
use chatd::delivery::CodeDelivery;
use chatd::protocol::{Frame, FrameCodec, MsgKind};
use chatd::server;
use chatd::state::AppState;
use chatd::store::{DirectoryStore, MemoryStore};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Records every code it is asked to deliver.
#[derive(Default)]
pub struct CapturingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CodeDelivery for CapturingDelivery {
    async fn deliver(&self, email: &str, code: &str) {
        self.sent.lock().unwrap().push((email.to_owned(), code.to_owned()));
    }
}

impl CapturingDelivery {
    pub fn code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| e == email)
            .map(|(_, c)| c.clone())
    }
}

/// A chat server on an ephemeral port backed by the memory store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<CapturingDelivery>,
}

impl TestServer {
    pub async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let delivery = Arc::new(CapturingDelivery::default());
        let config = Config {
            push_timeout: Duration::from_millis(500),
            ..Config::default()
        };
        let state = AppState::new(config, store.clone(), delivery.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, Arc::clone(&state), pending::<()>()));

        Self {
            addr,
            state,
            store,
            delivery,
        }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        TestClient {
            framed: Framed::new(stream, FrameCodec::default()),
        }
    }

    /// Create an account directly in the store.
    pub async fn seed_user(&self, username: &str, password: &str) {
        let created = self
            .store
            .create_user(&format!("{username}@x.com"), username, &hash_password(password))
            .await
            .unwrap();
        assert!(created, "seed user {username}");
    }

    pub async fn befriend(&self, a: &str, b: &str) {
        assert!(self.store.create_friend_request(a, b).await.unwrap());
        assert!(self.store.accept_friend_request(b, a).await.unwrap());
    }

    /// Connect and log in, consuming the three login frames.
    pub async fn login(&self, username: &str, password: &str) -> TestClient {
        let mut client = self.connect().await;
        client
            .send(MsgKind::LoginRequest, serde_json::json!({"username": username, "password": password}))
            .await;
        let ack = client.expect(MsgKind::LoginResponse).await;
        assert_eq!(ack["ok"], true, "login {username}: {ack:?}");
        client.expect(MsgKind::FriendList).await;
        client.expect(MsgKind::ServerInfo).await;
        client
    }

    /// Wait until `username` shows up in (or vanishes from) the registry.
    pub async fn wait_online(&self, username: &str, online: bool) {
        for _ in 0..100 {
            if self.state.sessions.is_online(username) == online {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{username} never became online={online}");
    }
}

pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestClient {
    pub async fn send(&mut self, kind: MsgKind, body: Value) {
        let Value::Object(payload) = body else {
            panic!("payload must be an object");
        };
        self.send_frame(Frame::new(kind, payload)).await;
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.framed.send(frame).await.unwrap();
    }

    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("frame within timeout")
            .expect("connection open")
            .expect("decodable frame")
    }

    /// Next frame, which must be of `kind`. Returns its payload.
    pub async fn expect(&mut self, kind: MsgKind) -> Value {
        let frame = self.recv().await;
        assert_eq!(
            frame.msg_kind(),
            Some(kind),
            "expected {kind:?}, got {:?} {:?}",
            frame.msg_kind(),
            frame.payload
        );
        Value::Object(frame.payload)
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(200), self.framed.next()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    /// True once the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        match tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(None) | Ok(Some(Err(_))) => true,
            Ok(Some(Ok(_))) | Err(_) => false,
        }
    }
}
