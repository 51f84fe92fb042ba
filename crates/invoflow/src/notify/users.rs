use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::UserConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub email: String,
    pub first_name: String,
}

/// Looks up folder owners.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Option<UserContact>;
}

/// In-memory directory, loaded from config.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserContact>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        let mut directory = Self::new();
        for user in users {
            directory.insert(&user.id, &user.email, &user.first_name);
        }
        directory
    }

    pub fn insert(&mut self, user_id: &str, email: &str, first_name: &str) {
        self.users.insert(
            user_id.to_string(),
            UserContact {
                email: email.to_string(),
                first_name: first_name.to_string(),
            },
        );
    }

    pub fn with_user(mut self, user_id: &str, email: &str, first_name: &str) -> Self {
        self.insert(user_id, email, first_name);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_by_id(&self, user_id: &str) -> Option<UserContact> {
        self.users.get(user_id).cloned()
    }
}
