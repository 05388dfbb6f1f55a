use std::collections::HashMap;

use application::{DeliveryTransition, MessageRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Bio, DeliveryState, FullName, Message, MessageId, PasswordHash, RepositoryError, User,
    UserEmail, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

const USER_COLUMNS: &str = "id, email, full_name, password_hash, bio, profile_pic, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, text, image, delivery_state, created_at";

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    full_name: String,
    password_hash: String,
    bio: String,
    profile_pic: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from(value.id),
            email: UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?,
            full_name: FullName::parse(value.full_name).map_err(|err| invalid_data(err.to_string()))?,
            password: PasswordHash::new(value.password_hash)
                .map_err(|err| invalid_data(err.to_string()))?,
            bio: Bio::parse(value.bio).map_err(|err| invalid_data(err.to_string()))?,
            profile_pic: value.profile_pic,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    text: Option<String>,
    image: Option<String>,
    delivery_state: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(value.id),
            sender_id: UserId::from(value.sender_id),
            recipient_id: UserId::from(value.recipient_id),
            text: value.text,
            image: value.image,
            delivery_state: DeliveryState::from_rank(value.delivery_state)
                .map_err(|err| invalid_data(err.to_string()))?,
            created_at: value.created_at,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    records.into_iter().map(Message::try_from).collect()
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, bio, profile_pic, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(user.id))
        .bind(user.email.as_str())
        .bind(user.full_name.as_str())
        .bind(user.password.as_str())
        .bind(user.bio.as_str())
        .bind(user.profile_pic.as_deref())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users
            SET full_name = $2, bio = $3, profile_pic = $4, updated_at = $5
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(user.id))
        .bind(user.full_name.as_str())
        .bind(user.bio.as_str())
        .bind(user.profile_pic.as_deref())
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn list_except(&self, id: UserId) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id <> $1 ORDER BY created_at, id"
        ))
        .bind(Uuid::from(id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, text, image, delivery_state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.sender_id))
        .bind(Uuid::from(message.recipient_id))
        .bind(message.text.as_deref())
        .bind(message.image.as_deref())
        .bind(message.delivery_state.rank())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at ASC
            "#
        ))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        into_messages(records)
    }

    async fn advance_delivery_state(
        &self,
        id: MessageId,
        to: DeliveryState,
    ) -> Result<DeliveryTransition, RepositoryError> {
        // 条件更新保证状态只增不减，并发推进时只有一个调用者看到 changed = true
        let updated = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages SET delivery_state = $2
            WHERE id = $1 AND delivery_state < $2
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(to.rank())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(record) = updated {
            return Ok(DeliveryTransition {
                message: Message::try_from(record)?,
                changed: true,
            });
        }

        let current = self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)?;
        Ok(DeliveryTransition {
            message: current,
            changed: false,
        })
    }

    async fn mark_conversation_seen(
        &self,
        sender: UserId,
        recipient: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages SET delivery_state = $3
            WHERE sender_id = $1 AND recipient_id = $2 AND delivery_state < $3
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(sender))
        .bind(Uuid::from(recipient))
        .bind(DeliveryState::Seen.rank())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut changed = into_messages(records)?;
        changed.sort_by_key(|message| message.created_at);
        Ok(changed)
    }

    async fn unseen_counts(&self, recipient: UserId) -> Result<HashMap<UserId, u64>, RepositoryError> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT sender_id, COUNT(*) FROM messages
            WHERE recipient_id = $1 AND delivery_state < $2
            GROUP BY sender_id
            "#,
        )
        .bind(Uuid::from(recipient))
        .bind(DeliveryState::Seen.rank())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|(sender, count)| (UserId::from(sender), count.max(0) as u64))
            .collect())
    }
}

/// PostgreSQL 存储集合
#[derive(Clone)]
pub struct PgStorage {
    pub user_repository: PgUserRepository,
    pub message_repository: PgMessageRepository,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: PgUserRepository::new(pool.clone()),
            message_repository: PgMessageRepository::new(pool),
        }
    }
}
