//! 头像与图片消息的对象存储抽象。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("unsupported image payload: {0}")]
    Unsupported(String),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("upload failed: {0}")]
    Upload(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// 上传客户端提交的图片（通常是 data URL），返回可公开访问的地址
    async fn upload(&self, payload: &str) -> Result<String, ImageStoreError>;
}
