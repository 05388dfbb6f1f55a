//! 应用层实现。
//!
//! 围绕领域模型提供用例服务，以及实时在线状态与消息投递的协调核心：
//! 在线注册表、连接生命周期、消息路由、已读回执，全部由单个事件循环驱动。

pub mod clock;
pub mod delivery;
pub mod error;
pub mod events;
pub mod hub;
pub mod images;
pub mod lifecycle;
pub mod password;
pub mod presence;
pub mod repository;
pub mod seen;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use delivery::RouteOutcome;
pub use error::ApplicationError;
pub use events::{EventSink, SeenAck, ServerEvent};
pub use hub::{HubHandle, PresenceHub};
pub use images::{ImageStore, ImageStoreError};
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::PresenceRegistry;
pub use repository::{DeliveryTransition, MessageRepository, UserRepository};
pub use seen::SeenStateReconciler;
pub use services::{
    LoginRequest, MessageService, MessageServiceDependencies, SendMessageRequest, Sidebar,
    SignupRequest, UpdateProfileRequest, UserService, UserServiceDependencies,
};
