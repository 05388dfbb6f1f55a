//! 密码凭证端口
//!
//! 注册时把明文换成哈希，登录时比对；明文不离开这一层，
//! 具体算法（bcrypt 及其工作因子）由基础设施层决定。

use std::fmt;

use async_trait::async_trait;
use domain::PasswordHash;
use thiserror::Error;

/// 哈希实现自身出错；密码不匹配不属于错误，由 `verify` 返回 `false`
#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password verification failed: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hashing(cause: impl fmt::Display) -> Self {
        Self::Hash(cause.to_string())
    }

    pub fn verifying(cause: impl fmt::Display) -> Self {
        Self::Verify(cause.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// 生成带盐哈希，同一明文每次结果不同
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError>;

    async fn verify(&self, plaintext: &str, hashed: &PasswordHash) -> Result<bool, PasswordHasherError>;
}
