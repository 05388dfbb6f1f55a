use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    Clock, MessageService, MessageServiceDependencies, PresenceHub, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use futures_util::StreamExt;
use infrastructure::Infrastructure;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 运行在随机端口上的完整服务，使用内存存储
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    _shutdown: oneshot::Sender<()>,
}

pub struct SignedUp {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = AppConfig::default();
        let infrastructure = Infrastructure::in_memory(Some(4));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (hub, _hub_task) = PresenceHub::spawn(clock.clone());

        let user_service = UserService::new(UserServiceDependencies {
            user_repository: infrastructure.user_repository.clone(),
            password_hasher: infrastructure.password_hasher.clone(),
            image_store: infrastructure.image_store.clone(),
            clock: clock.clone(),
        });
        let message_service = MessageService::new(MessageServiceDependencies {
            user_repository: infrastructure.user_repository.clone(),
            message_repository: infrastructure.message_repository.clone(),
            image_store: infrastructure.image_store.clone(),
            clock,
            hub: hub.clone(),
        });
        let state = AppState::new(
            Arc::new(user_service),
            Arc::new(message_service),
            hub,
            Arc::new(JwtService::new(config.jwt.clone())),
        );
        let app = router(state, &config.server);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::new(),
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn signup(&self, name: &str) -> SignedUp {
        let response = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({
                "email": format!("{name}@example.com"),
                "fullName": name,
                "password": "correct horse",
                "bio": format!("hi, I am {name}"),
            }))
            .send()
            .await
            .expect("signup request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        let body: Value = response.json().await.expect("signup json");
        SignedUp {
            id: body["user"]["id"].as_str().expect("user id").to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    /// 以注册用户的身份连接；`None` 为匿名连接
    pub async fn connect(&self, user: Option<&SignedUp>) -> WsClient {
        match user {
            Some(user) => {
                self.connect_query(&format!("userId={}&token={}", user.id, user.token))
                    .await
            }
            None => self.connect_query("").await,
        }
    }

    /// 使用原始查询串握手
    pub async fn connect_query(&self, query: &str) -> WsClient {
        let url = if query.is_empty() {
            format!("ws://{}/ws", self.addr)
        } else {
            format!("ws://{}/ws?{}", self.addr, query)
        };
        let (socket, _) = connect_async(url).await.expect("websocket connect");
        socket
    }
}

/// 读取下一个 JSON 事件
pub async fn next_event(socket: &mut WsClient) -> Value {
    try_next_event(socket, Duration::from_secs(2))
        .await
        .expect("timed out waiting for websocket event")
}

pub async fn try_next_event(socket: &mut WsClient, wait: Duration) -> Option<Value> {
    loop {
        let frame = timeout(wait, socket.next()).await.ok()??.ok()?;
        if let Message::Text(text) = frame {
            return Some(serde_json::from_str(text.as_str()).expect("event json"));
        }
    }
}

/// 读完当前积压的事件，确认其中没有指定名称的事件
pub async fn assert_never_receives(socket: &mut WsClient, name: &str) {
    while let Some(event) = try_next_event(socket, Duration::from_millis(300)).await {
        assert_ne!(event["event"], name, "unexpected event: {event}");
    }
}

/// 跳过其它事件，直到出现指定名称的事件
pub async fn next_named(socket: &mut WsClient, name: &str) -> Value {
    loop {
        let event = next_event(socket).await;
        if event["event"] == name {
            return event;
        }
    }
}

pub fn sorted(ids: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids
}

pub fn online_ids(event: &Value) -> Vec<String> {
    assert_eq!(event["event"], "online-users");
    let mut ids: Vec<String> = event["data"]
        .as_array()
        .expect("online users array")
        .iter()
        .map(|id| id.as_str().expect("id").to_string())
        .collect();
    ids.sort();
    ids
}
