//! 基础设施层实现。
//!
//! 提供内存与 PostgreSQL 两套仓储、bcrypt 密码哈希和内联图片存储，
//! 实现应用层定义的接口。

pub mod builder;
pub mod images;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use images::InlineImageStore;
pub use memory::{InMemoryMessageRepository, InMemoryUserRepository};
pub use migrations::MIGRATOR;
pub use password::{BcryptPasswordHasher, DEFAULT_BCRYPT_COST};
pub use repository::{create_pg_pool, PgMessageRepository, PgStorage, PgUserRepository};
