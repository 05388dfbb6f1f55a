use std::collections::HashMap;

use async_trait::async_trait;
use domain::{DeliveryState, Message, MessageId, RepositoryError, User, UserEmail, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError>;

    // 侧边栏联系人：除自己以外的全部用户
    async fn list_except(&self, id: UserId) -> Result<Vec<User>, RepositoryError>;
}

/// 一次投递状态推进的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTransition {
    /// 推进后（或未变化时）的消息
    pub message: Message,
    /// 状态是否真的发生了变化
    pub changed: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 持久化消息，路由只会在这一步成功之后发生
    async fn save(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    // 两个用户之间的完整对话，按时间升序
    async fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError>;

    // 单调推进投递状态；目标不高于当前状态时返回 changed = false，消息不存在返回 NotFound
    async fn advance_delivery_state(
        &self,
        id: MessageId,
        to: DeliveryState,
    ) -> Result<DeliveryTransition, RepositoryError>;

    // 把 sender 发给 recipient 的未读消息全部标记为已读，返回真正发生变化的消息
    async fn mark_conversation_seen(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<Vec<Message>, RepositoryError>;

    // recipient 的未读消息数，按发送者分组
    async fn unseen_counts(&self, recipient: UserId)
        -> Result<HashMap<UserId, u64>, RepositoryError>;
}
