//! 进程内仓储，用于开发环境和测试。

use std::collections::HashMap;

use application::{DeliveryTransition, MessageRepository, UserRepository};
use async_trait::async_trait;
use domain::{DeliveryState, Message, MessageId, RepositoryError, User, UserEmail, UserId};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) || users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let slot = users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        *slot = user.clone();
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn list_except(&self, id: UserId) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut others: Vec<User> = users.values().filter(|user| user.id != id).cloned().collect();
        others.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(others)
    }
}

/// 按写入顺序保存消息
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|message| message.id == id).cloned())
    }

    async fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut between: Vec<Message> = messages
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect();
        // 稳定排序，同一时刻的消息保持写入顺序
        between.sort_by_key(|message| message.created_at);
        Ok(between)
    }

    async fn advance_delivery_state(
        &self,
        id: MessageId,
        to: DeliveryState,
    ) -> Result<DeliveryTransition, RepositoryError> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(RepositoryError::NotFound)?;
        let changed = message.advance(to);
        Ok(DeliveryTransition {
            message: message.clone(),
            changed,
        })
    }

    async fn mark_conversation_seen(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut messages = self.messages.write().await;
        let mut changed: Vec<Message> = messages
            .iter_mut()
            .filter(|message| message.sender_id == sender && message.recipient_id == recipient)
            .filter_map(|message| message.advance(DeliveryState::Seen).then(|| message.clone()))
            .collect();
        changed.sort_by_key(|message| message.created_at);
        Ok(changed)
    }

    async fn unseen_counts(&self, recipient: UserId) -> Result<HashMap<UserId, u64>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut counts = HashMap::new();
        for message in messages
            .iter()
            .filter(|message| message.recipient_id == recipient && !message.is_seen())
        {
            *counts.entry(message.sender_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
