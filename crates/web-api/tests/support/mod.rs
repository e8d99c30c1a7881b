#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config::{AppConfig, StoreBackend};
use domain::{BusinessId, UserId, UserIdentity, UserRole};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{InMemoryChatStore, Infrastructure, JwtService};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, Message as TungsteniteMessage},
    MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// 基于内存存储运行的完整服务
pub struct TestApp {
    pub addr: SocketAddr,
    pub http: Client,
    pub store: Arc<InMemoryChatStore>,
    pub jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.jwt.secret = "integration-test-secret-that-is-long-enough".to_string();
        config.relay.connect_timeout_secs = 2;

        let infra = Infrastructure::connect(&config).await.expect("infrastructure");
        let store = infra.memory.clone().expect("memory store");
        let jwt = infra.jwt.clone();
        let state = AppState::assemble(&infra, &config);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // allow server to start
        sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            http: Client::new(),
            store,
            jwt,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn user(&self, role: UserRole) -> TestUser {
        self.seed_user(role, true).await
    }

    pub async fn inactive_user(&self) -> TestUser {
        self.seed_user(UserRole::User, false).await
    }

    async fn seed_user(&self, role: UserRole, is_active: bool) -> TestUser {
        let id = UserId::generate();
        self.store
            .put_user(UserIdentity {
                id,
                role,
                is_active,
            })
            .await;
        let token = self.jwt.generate_token(id, role).expect("token");
        TestUser { id, token }
    }

    pub async fn business(&self, owner: &TestUser) -> BusinessId {
        let id = BusinessId::generate();
        self.store.put_business(id, owner.id).await;
        id
    }

    pub fn get(&self, user: &TestUser, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&user.token)
    }

    pub fn post(&self, user: &TestUser, path: &str) -> RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&user.token)
    }

    /// 发起会话并返回会话 ID
    pub async fn initiate_chat(&self, user: &TestUser, business: BusinessId) -> String {
        let response = self
            .post(user, &format!("/api/chat/business/{business}"))
            .send()
            .await
            .expect("initiate chat");
        assert_eq!(response.status(), 201);
        let room: Value = response.json().await.expect("room json");
        room["id"].as_str().expect("room id").to_string()
    }

    pub async fn send_http(&self, user: &TestUser, room: &str, receiver: UserId, content: &str) -> reqwest::Response {
        self.post(user, &format!("/api/chat/rooms/{room}/messages"))
            .json(&json!({ "content": content, "receiverId": receiver }))
            .send()
            .await
            .expect("send message")
    }

    pub async fn stats(&self, admin: &TestUser) -> Value {
        self.get(admin, "/api/admin/relay/stats")
            .send()
            .await
            .expect("stats")
            .json()
            .await
            .expect("stats json")
    }

    pub async fn ws(&self, user: &TestUser) -> WsClient {
        let url = format!("ws://{}/ws?token={}", self.addr, user.token);
        let (stream, _) = connect_async(url).await.expect("ws connect");
        WsClient {
            stream,
            pending: VecDeque::new(),
            next_request_id: 1,
        }
    }

    pub async fn ws_with_header(&self, token: &str) -> Result<WsClient, tungstenite::Error> {
        let mut request = format!("ws://{}/ws", self.addr)
            .into_client_request()
            .expect("request");
        request.headers_mut().insert(
            "authorization",
            format!("Bearer {token}").parse().expect("header"),
        );
        let (stream, _) = connect_async(request).await?;
        Ok(WsClient {
            stream,
            pending: VecDeque::new(),
            next_request_id: 1,
        })
    }

    /// 不带任何凭证或带指定 query token 建立连接
    pub async fn ws_raw(&self, query: &str) -> Result<WsClient, tungstenite::Error> {
        let (stream, _) = connect_async(format!("ws://{}/ws{}", self.addr, query)).await?;
        Ok(WsClient {
            stream,
            pending: VecDeque::new(),
            next_request_id: 1,
        })
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// 等待应答时读到的推送事件
    pending: VecDeque<Value>,
    next_request_id: u64,
}

impl WsClient {
    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(TungsteniteMessage::Text(text.to_string().into()))
            .await
            .expect("ws send");
    }

    /// 发送带 requestId 的请求，返回对应的 ack / error 帧
    pub async fn request(&mut self, event: &str, data: Value) -> Value {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.send_text(
            &json!({ "event": event, "data": data, "requestId": request_id }).to_string(),
        )
        .await;

        loop {
            let frame = self.read_frame().await.expect("reply frame");
            if frame["requestId"] == json!(request_id) {
                return frame;
            }
            self.pending.push_back(frame);
        }
    }

    pub async fn join(&mut self, room: &str) -> Value {
        self.request("joinRoom", json!({ "room": room })).await
    }

    /// 下一条推送事件
    pub async fn next_event(&mut self) -> Value {
        if let Some(frame) = self.pending.pop_front() {
            return frame;
        }
        self.read_frame().await.expect("event frame")
    }

    /// 断言在给定时间内没有收到任何帧
    pub async fn expect_silence(&mut self, window: Duration) {
        assert!(self.pending.is_empty(), "unexpected frame: {:?}", self.pending);
        if let Ok(frame) = timeout(window, self.read_frame_inner()).await {
            panic!("unexpected frame: {frame:?}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    async fn read_frame(&mut self) -> Option<Value> {
        timeout(RECV_TIMEOUT, self.read_frame_inner())
            .await
            .expect("timed out waiting for frame")
    }

    async fn read_frame_inner(&mut self) -> Option<Value> {
        while let Some(message) = self.stream.next().await {
            match message.ok()? {
                TungsteniteMessage::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("json frame"))
                }
                TungsteniteMessage::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }
}

/// 轮询直到条件成立
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..60 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met in time");
}
