use std::sync::Arc;

use domain::{Bio, DomainError, FullName, RepositoryError, User, UserEmail, UserId};

use crate::{
    clock::Clock, error::ApplicationError, images::ImageStore, password::PasswordHasher,
    repository::UserRepository,
};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub bio: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    /// 客户端提交的图片数据，交给 ImageStore 换成地址
    pub profile_pic: Option<String>,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub image_store: Arc<dyn ImageStore>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email)?;
        let full_name = FullName::parse(request.full_name)?;
        let bio = Bio::parse(request.bio)?;
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::invalid_argument(
                "password",
                format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
            )
            .into());
        }

        if self
            .deps
            .user_repository
            .find_by_email(email.clone())
            .await?
            .is_some()
        {
            return Err(ApplicationError::Domain(DomainError::UserAlreadyExists));
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = User::register(
            UserId::generate(),
            email,
            full_name,
            password_hash,
            bio,
            self.deps.clock.now(),
        );

        // 并发注册同一邮箱时由存储层的唯一约束兜底
        let stored = self
            .deps
            .user_repository
            .create(user)
            .await
            .map_err(|error| match error {
                RepositoryError::Conflict => ApplicationError::Domain(DomainError::UserAlreadyExists),
                other => other.into(),
            })?;
        tracing::info!(user_id = %stored.id, "新用户注册");
        Ok(stored)
    }

    /// 邮箱不存在和密码错误返回同一个错误
    pub async fn login(&self, request: LoginRequest) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_email(email)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(user)
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: UpdateProfileRequest,
    ) -> Result<User, ApplicationError> {
        let full_name = request.full_name.map(FullName::parse).transpose()?;
        let bio = request.bio.map(Bio::parse).transpose()?;
        let mut user = self.get_user(user_id).await?;

        let profile_pic = match request.profile_pic.as_deref() {
            Some(payload) if !payload.trim().is_empty() => {
                Some(self.deps.image_store.upload(payload).await?)
            }
            _ => None,
        };

        user.update_profile(full_name, bio, profile_pic, self.deps.clock.now());
        let updated = self.deps.user_repository.update(user).await?;
        tracing::debug!(user_id = %updated.id, "资料已更新");
        Ok(updated)
    }
}
