//! 服务器推送给实时连接的事件，以及推送目标的抽象。

use domain::{ConnectionId, Message, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 已读回执，推送给原消息的发送者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenAck {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub seen_by: UserId,
    pub seen_at: Timestamp,
}

impl SeenAck {
    pub fn for_message(message: &Message, seen_at: Timestamp) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            seen_by: message.recipient_id,
            seen_at,
        }
    }
}

/// 线上格式：`{"event": "<name>", "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// 在线用户快照
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<UserId>),
    #[serde(rename = "newMessage")]
    NewMessage(Message),
    #[serde(rename = "messageSeen")]
    MessageSeen(SeenAck),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::MessageSeen(_) => "messageSeen",
        }
    }
}

/// 推送目标。推送是即发即弃的：连接已经失效时返回 false，绝不向上抛错。
pub trait EventSink {
    fn push(&mut self, connection_id: ConnectionId, event: ServerEvent) -> bool;

    /// 推送给所有打开的连接，返回成功推送的数量
    fn broadcast(&mut self, event: &ServerEvent) -> usize;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;

    /// 记录所有推送的测试用 sink
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub open: HashSet<ConnectionId>,
        pub pushed: Vec<(ConnectionId, ServerEvent)>,
    }

    impl RecordingSink {
        pub fn with_open(ids: &[ConnectionId]) -> Self {
            Self {
                open: ids.iter().copied().collect(),
                pushed: Vec::new(),
            }
        }

        pub fn events_for(&self, connection_id: ConnectionId) -> Vec<&ServerEvent> {
            self.pushed
                .iter()
                .filter(|(id, _)| *id == connection_id)
                .map(|(_, event)| event)
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn push(&mut self, connection_id: ConnectionId, event: ServerEvent) -> bool {
            if !self.open.contains(&connection_id) {
                return false;
            }
            self.pushed.push((connection_id, event));
            true
        }

        fn broadcast(&mut self, event: &ServerEvent) -> usize {
            let mut targets: Vec<_> = self.open.iter().copied().collect();
            targets.sort();
            for id in &targets {
                self.pushed.push((*id, event.clone()));
            }
            targets.len()
        }
    }
}
