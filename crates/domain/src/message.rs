use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 消息投递状态，只能向前推进：sent -> delivered -> seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Seen,
}

impl DeliveryState {
    /// 持久化时使用的序号，数据库按序号比较实现单调更新
    pub fn rank(self) -> i16 {
        match self {
            DeliveryState::Sent => 0,
            DeliveryState::Delivered => 1,
            DeliveryState::Seen => 2,
        }
    }

    pub fn from_rank(rank: i16) -> Result<Self, DomainError> {
        match rank {
            0 => Ok(DeliveryState::Sent),
            1 => Ok(DeliveryState::Delivered),
            2 => Ok(DeliveryState::Seen),
            other => Err(DomainError::invalid_argument(
                "delivery_state",
                format!("unknown rank {other}"),
            )),
        }
    }
}

/// 消息正文：文字和图片至少有一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    text: Option<String>,
    image: Option<String>,
}

impl MessageBody {
    pub fn new(text: Option<String>, image: Option<String>) -> Result<Self, DomainError> {
        let text = text
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let image = image.filter(|value| !value.trim().is_empty());

        if text.is_none() && image.is_none() {
            return Err(DomainError::invalid_argument(
                "message",
                "text or image is required",
            ));
        }
        Ok(Self { text, image })
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: Timestamp,
    pub delivery_state: DeliveryState,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        recipient_id: UserId,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender_id == recipient_id {
            return Err(DomainError::invalid_argument(
                "recipient_id",
                "cannot send a message to yourself",
            ));
        }
        Ok(Self {
            id,
            sender_id,
            recipient_id,
            text: body.text,
            image: body.image,
            created_at,
            delivery_state: DeliveryState::Sent,
        })
    }

    /// 推进投递状态；目标不高于当前状态时保持不变并返回 false
    pub fn advance(&mut self, to: DeliveryState) -> bool {
        if to <= self.delivery_state {
            return false;
        }
        self.delivery_state = to;
        true
    }

    pub fn is_seen(&self) -> bool {
        self.delivery_state == DeliveryState::Seen
    }

    /// 两个用户之间的消息（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }
}
