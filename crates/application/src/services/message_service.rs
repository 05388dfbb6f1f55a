use std::collections::HashMap;
use std::sync::Arc;

use domain::{DeliveryState, DomainError, Message, MessageBody, MessageId, User, UserId};
use serde::Serialize;

use crate::{
    clock::Clock,
    delivery::RouteOutcome,
    error::ApplicationError,
    hub::HubHandle,
    images::ImageStore,
    repository::{MessageRepository, UserRepository},
    seen::SeenStateReconciler,
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub recipient_id: UserId,
    pub text: Option<String>,
    pub image: Option<String>,
}

/// 侧边栏：其他用户以及每个发送者的未读数
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidebar {
    pub users: Vec<User>,
    pub unseen_messages: HashMap<UserId, u64>,
}

pub struct MessageServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub image_store: Arc<dyn ImageStore>,
    pub clock: Arc<dyn Clock>,
    pub hub: HubHandle,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
    seen: SeenStateReconciler,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        let seen = SeenStateReconciler::new(
            deps.message_repository.clone(),
            deps.hub.clone(),
            deps.clock.clone(),
        );
        Self { deps, seen }
    }

    pub async fn sidebar(&self, user_id: UserId) -> Result<Sidebar, ApplicationError> {
        let users = self.deps.user_repository.list_except(user_id).await?;
        let mut unseen_messages = self.deps.message_repository.unseen_counts(user_id).await?;
        unseen_messages.retain(|sender, count| *count > 0 && users.iter().any(|user| user.id == *sender));
        Ok(Sidebar {
            users,
            unseen_messages,
        })
    }

    /// 读取与 peer 的完整对话，同时把 peer 发来的未读消息标记为已读
    pub async fn conversation(&self, reader: UserId, peer: UserId) -> Result<Vec<Message>, ApplicationError> {
        self.ensure_user_exists(peer).await?;
        self.seen.mark_conversation_seen(reader, peer).await?;
        let messages = self.deps.message_repository.conversation(reader, peer).await?;
        Ok(messages)
    }

    /// 先持久化，再交给事件循环实时推送；推送成功时状态推进为 delivered
    pub async fn send(&self, sender: UserId, request: SendMessageRequest) -> Result<Message, ApplicationError> {
        let body = MessageBody::new(request.text, request.image)?;
        self.ensure_user_exists(request.recipient_id).await?;

        // 消息本身合法之后才上传图片
        let mut message = Message::new(
            MessageId::generate(),
            sender,
            request.recipient_id,
            body,
            self.deps.clock.now(),
        )?;
        if let Some(payload) = message.image.take() {
            message.image = Some(self.deps.image_store.upload(&payload).await?);
        }
        let saved = self.deps.message_repository.save(message).await?;

        let outcome = match self.deps.hub.route(saved.clone()).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(message_id = %saved.id, error = %error, "实时推送不可用，消息仅持久化");
                RouteOutcome::Offline
            }
        };
        if !outcome.is_live() {
            return Ok(saved);
        }

        match self
            .deps
            .message_repository
            .advance_delivery_state(saved.id, DeliveryState::Delivered)
            .await
        {
            Ok(transition) => Ok(transition.message),
            Err(error) => {
                tracing::warn!(message_id = %saved.id, error = %error, "投递状态更新失败");
                Ok(saved)
            }
        }
    }

    pub async fn mark_seen(&self, reader: UserId, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.seen.mark_seen(reader, message_id).await
    }

    pub async fn online_users(&self) -> Result<Vec<UserId>, ApplicationError> {
        self.deps.hub.online_users().await
    }

    async fn ensure_user_exists(&self, user_id: UserId) -> Result<(), ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .map(|_| ())
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))
    }
}
