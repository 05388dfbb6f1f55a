use serde::{Deserialize, Serialize};

use crate::value_objects::{Bio, FullName, PasswordHash, Timestamp, UserEmail, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: UserEmail,
    pub full_name: FullName,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub bio: Bio,
    pub profile_pic: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(
        id: UserId,
        email: UserEmail,
        full_name: FullName,
        password: PasswordHash,
        bio: Bio,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            email,
            full_name,
            password,
            bio,
            profile_pic: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_profile(
        &mut self,
        full_name: Option<FullName>,
        bio: Option<Bio>,
        profile_pic: Option<String>,
        now: Timestamp,
    ) {
        if let Some(full_name) = full_name {
            self.full_name = full_name;
        }
        if let Some(bio) = bio {
            self.bio = bio;
        }
        if let Some(url) = profile_pic {
            self.profile_pic = Some(url);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user() -> User {
        User::register(
            UserId::generate(),
            UserEmail::parse("bob@example.com").unwrap(),
            FullName::parse("Bob").unwrap(),
            PasswordHash::new("$2b$10$hash").unwrap(),
            Bio::parse("hello there").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn password_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["fullName"], "Bob");
    }

    #[test]
    fn profile_update_keeps_untouched_fields() {
        let mut user = sample_user();
        let later = user.created_at + chrono::Duration::seconds(5);
        user.update_profile(None, Some(Bio::parse("new bio").unwrap()), None, later);

        assert_eq!(user.full_name.as_str(), "Bob");
        assert_eq!(user.bio.as_str(), "new bio");
        assert!(user.profile_pic.is_none());
        assert_eq!(user.updated_at, later);
    }
}
