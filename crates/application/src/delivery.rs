//! 消息路由：已持久化的消息按注册表查找收件人的当前连接并推送一次。
//! 离线收件人不排队，不补发；重连后由客户端拉取历史。

use domain::{ConnectionId, Message};

use crate::events::{EventSink, ServerEvent};
use crate::presence::PresenceRegistry;

/// 一次路由的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 已推送到收件人当前连接
    Pushed(ConnectionId),
    /// 注册表指向的连接已经失效，推送被丢弃
    Stale(ConnectionId),
    /// 收件人不在线
    Offline,
}

impl RouteOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, RouteOutcome::Pushed(_))
    }
}

pub fn route<S: EventSink>(registry: &PresenceRegistry, sink: &mut S, message: &Message) -> RouteOutcome {
    let Some(connection_id) = registry.connection_of(message.recipient_id) else {
        tracing::debug!(
            message_id = %message.id,
            recipient_id = %message.recipient_id,
            "收件人离线，跳过实时推送"
        );
        return RouteOutcome::Offline;
    };

    if sink.push(connection_id, ServerEvent::NewMessage(message.clone())) {
        tracing::debug!(
            message_id = %message.id,
            recipient_id = %message.recipient_id,
            connection_id = %connection_id,
            "消息已推送"
        );
        RouteOutcome::Pushed(connection_id)
    } else {
        tracing::warn!(
            message_id = %message.id,
            connection_id = %connection_id,
            "收件人连接已失效，丢弃推送"
        );
        RouteOutcome::Stale(connection_id)
    }
}
