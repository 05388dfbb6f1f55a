//! 聊天系统核心领域模型
//!
//! 包含用户、私信消息、实时连接等核心实体，以及投递状态的单调推进规则。

pub mod connection;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use connection::{Connection, ConnectionState};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{DeliveryState, Message, MessageBody};
pub use user::User;
pub use value_objects::{
    Bio, ConnectionId, FullName, MessageId, PasswordHash, Timestamp, UserEmail, UserId,
};
