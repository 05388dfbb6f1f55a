use application::{ImageStore, ImageStoreError};
use async_trait::async_trait;

const DATA_IMAGE_PREFIX: &str = "data:image/";

/// 不依赖外部对象存储的图片存储：只接受 `data:image/...;base64,` 形式的载荷并原样返回。
#[derive(Debug, Clone)]
pub struct InlineImageStore {
    max_bytes: usize,
}

impl InlineImageStore {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for InlineImageStore {
    fn default() -> Self {
        Self::new(4 * 1024 * 1024)
    }
}

#[async_trait]
impl ImageStore for InlineImageStore {
    async fn upload(&self, payload: &str) -> Result<String, ImageStoreError> {
        let payload = payload.trim();
        if !payload.starts_with(DATA_IMAGE_PREFIX) || !payload.contains(";base64,") {
            return Err(ImageStoreError::Unsupported(
                "expected a base64 data:image URL".into(),
            ));
        }
        if payload.len() > self.max_bytes {
            return Err(ImageStoreError::TooLarge {
                limit: self.max_bytes,
            });
        }
        tracing::debug!(bytes = payload.len(), "内联图片已接收");
        Ok(payload.to_owned())
    }
}
