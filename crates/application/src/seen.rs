//! 已读状态同步
//!
//! 收件人读到消息后，持久化的投递状态推进到 seen，并在状态真正发生变化时
//! 给在线的发送者推送一次回执。重复标记不会产生第二次回执。

use std::sync::Arc;

use domain::{DeliveryState, DomainError, Message, MessageId, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::events::{EventSink, SeenAck, ServerEvent};
use crate::hub::HubHandle;
use crate::presence::PresenceRegistry;
use crate::repository::MessageRepository;

/// 把回执推给原消息发送者的当前连接；发送者离线时直接丢弃
pub fn acknowledge<S: EventSink>(registry: &PresenceRegistry, sink: &mut S, ack: SeenAck) -> bool {
    let Some(connection_id) = registry.connection_of(ack.sender_id) else {
        tracing::debug!(message_id = %ack.message_id, sender_id = %ack.sender_id, "发送者离线，丢弃已读回执");
        return false;
    };
    sink.push(connection_id, ServerEvent::MessageSeen(ack))
}

#[derive(Clone)]
pub struct SeenStateReconciler {
    messages: Arc<dyn MessageRepository>,
    hub: HubHandle,
    clock: Arc<dyn Clock>,
}

impl SeenStateReconciler {
    pub fn new(messages: Arc<dyn MessageRepository>, hub: HubHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            messages,
            hub,
            clock,
        }
    }

    /// 收件人把单条消息标记为已读
    pub async fn mark_seen(&self, reader: UserId, message_id: MessageId) -> Result<Message, ApplicationError> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound)?;

        if message.recipient_id != reader {
            tracing::warn!(message_id = %message_id, reader = %reader, "非收件人尝试标记已读");
            return Err(ApplicationError::Authorization);
        }

        let transition = self
            .messages
            .advance_delivery_state(message_id, DeliveryState::Seen)
            .await?;
        if transition.changed {
            self.notify(&transition.message);
        }
        Ok(transition.message)
    }

    /// 打开与 peer 的对话时，把 peer 发来的未读消息全部标记为已读
    pub async fn mark_conversation_seen(
        &self,
        reader: UserId,
        peer: UserId,
    ) -> Result<Vec<Message>, ApplicationError> {
        let changed = self.messages.mark_conversation_seen(peer, reader).await?;
        for message in &changed {
            self.notify(message);
        }
        if !changed.is_empty() {
            tracing::debug!(reader = %reader, peer = %peer, count = changed.len(), "对话已读");
        }
        Ok(changed)
    }

    fn notify(&self, message: &Message) {
        let ack = SeenAck::for_message(message, self.clock.now());
        if let Err(error) = self.hub.acknowledge(ack) {
            // 持久化已经成功，回执只是尽力而为
            tracing::warn!(message_id = %message.id, error = %error, "已读回执未能投递");
        }
    }
}
