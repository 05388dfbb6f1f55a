//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP 请求委托给应用层的用例服务，并把 WebSocket 连接接入在线状态事件循环。

mod auth;
mod error;
mod routes;
mod state;
mod websocket;

pub use auth::{AuthResponse, AuthUser, Claims, JwtService};
pub use config::{JwtConfig, ServerConfig};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
