//! 实时通道
//!
//! 握手时通过 `?token=<jwt>` 证明身份，可以附带 `userId` 声明期望的身份，
//! 二者不一致、token 缺失或无效时一律按匿名连接处理。
//! 随后拆分为写任务和读任务：写任务把事件循环推送的事件编码为
//! `{"event": .., "data": ..}` 文本帧，读任务只负责感知客户端关闭。
//! 任一任务结束即视为连接关闭，向事件循环发送且只发送一次断开通知。

use application::{HubHandle, ServerEvent};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{auth::JwtService, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    user_id: Option<String>,
    token: Option<String>,
}

impl HandshakeQuery {
    /// 只有通过校验的 token 才能让连接进入在线注册表
    fn identity(&self, jwt: &JwtService) -> Option<UserId> {
        let token = self.token.as_deref().map(str::trim).filter(|token| !token.is_empty());
        let Some(token) = token else {
            if self.user_id.is_some() {
                tracing::debug!("握手未携带 token，按匿名连接处理");
            }
            return None;
        };

        let verified = match jwt.verify_token(token) {
            Ok(claims) => UserId::from(claims.user_id),
            Err(_) => {
                tracing::warn!("握手 token 无效，按匿名连接处理");
                return None;
            }
        };

        let claimed = self.user_id.as_deref().map(str::trim).filter(|raw| !raw.is_empty());
        match claimed.map(str::parse::<UserId>) {
            None => Some(verified),
            Some(Ok(user_id)) if user_id == verified => Some(verified),
            Some(_) => {
                tracing::warn!(user_id = %verified, "握手声明的身份与 token 不符，按匿名连接处理");
                None
            }
        }
    }
}

pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = query.identity(&state.jwt_service);
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| run_session(socket, hub, user_id))
}

async fn run_session(socket: WebSocket, hub: HubHandle, user_id: Option<UserId>) {
    let (connection_id, events) = match hub.connect(user_id) {
        Ok(registered) => registered,
        Err(err) => {
            tracing::warn!(error = %err, "在线状态事件循环不可用，关闭连接");
            return;
        }
    };
    tracing::info!(connection_id = %connection_id, user_id = ?user_id, "WebSocket 连接已建立");

    let (sender, mut incoming) = socket.split();
    let mut send_task = tokio::spawn(forward_events(events, sender));

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if matches!(message, WsMessage::Close(_)) {
                break;
            }
        }
    });

    // 等待任意一个任务完成（连接断开）
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(err) = hub.disconnect(connection_id) {
        tracing::warn!(connection_id = %connection_id, error = %err, "断开通知未送达");
    }
    tracing::info!(connection_id = %connection_id, "WebSocket 连接已关闭");
}

async fn forward_events<S>(mut events: mpsc::UnboundedReceiver<ServerEvent>, mut sender: S)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    while let Some(event) = events.recv().await {
        let payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, event = event.name(), "failed to serialize websocket payload");
                continue;
            }
        };
        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
            break;
        }
    }
}
