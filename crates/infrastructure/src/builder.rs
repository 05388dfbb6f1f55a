use std::sync::Arc;

use application::{ImageStore, MessageRepository, PasswordHasher, UserRepository};
use thiserror::Error;

use crate::{
    images::InlineImageStore,
    memory::{InMemoryMessageRepository, InMemoryUserRepository},
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    /// 为空时使用进程内存储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
    pub max_image_bytes: usize,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            bcrypt_cost: None,
            max_image_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 装配好的适配器集合，以 trait 对象形式交给应用层
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub image_store: Arc<dyn ImageStore>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let password_hasher = Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost));
        let image_store = Arc::new(InlineImageStore::new(config.max_image_bytes));

        let Some(database_url) = config.database_url.as_deref() else {
            tracing::info!("使用内存存储");
            return Ok(Self::in_memory_with(password_hasher, image_store));
        };

        let pool = create_pg_pool(database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "PostgreSQL 存储已就绪");

        let storage = PgStorage::new(pool);
        Ok(Self {
            user_repository: Arc::new(storage.user_repository),
            message_repository: Arc::new(storage.message_repository),
            password_hasher,
            image_store,
        })
    }

    /// 全部使用进程内实现，测试常用
    pub fn in_memory(bcrypt_cost: Option<u32>) -> Self {
        Self::in_memory_with(
            Arc::new(BcryptPasswordHasher::new(bcrypt_cost)),
            Arc::new(InlineImageStore::default()),
        )
    }

    fn in_memory_with(
        password_hasher: Arc<BcryptPasswordHasher>,
        image_store: Arc<InlineImageStore>,
    ) -> Self {
        Self {
            user_repository: Arc::new(InMemoryUserRepository::new()),
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            password_hasher,
            image_store,
        }
    }
}
