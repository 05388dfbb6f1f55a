use application::{password::PasswordHasherError, PasswordHasher};
use async_trait::async_trait;
use bcrypt::{hash, verify};
use domain::PasswordHash;

/// 默认工作因子，与注册时 `genSalt(10)` 的强度一致
pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        // bcrypt 是 CPU 密集型操作，放到阻塞线程池
        let hashed = tokio::task::spawn_blocking(move || hash(plaintext, cost))
            .await
            .map_err(PasswordHasherError::hashing)?
            .map_err(PasswordHasherError::hashing)?;

        PasswordHash::new(hashed).map_err(PasswordHasherError::hashing)
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        tokio::task::spawn_blocking(move || verify(plaintext, &hashed))
            .await
            .map_err(PasswordHasherError::verifying)?
            .map_err(PasswordHasherError::verifying)
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let hashed = hasher.hash("correct horse").await.unwrap();

        assert_ne!(hashed.as_str(), "correct horse");
        assert!(hasher.verify("correct horse", &hashed).await.unwrap());
        assert!(!hasher.verify("battery staple", &hashed).await.unwrap());
    }

    #[test]
    fn default_cost_is_ten() {
        assert_eq!(BcryptPasswordHasher::default().cost(), 10);
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let bogus = PasswordHash::new("not-a-bcrypt-hash").unwrap();
        assert!(hasher.verify("anything", &bogus).await.is_err());
    }
}
