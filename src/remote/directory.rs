//! In-memory user directory
//!
//! A [`CapabilityHandler`] for local development and tests. Recognition is an
//! exact match on the enrolled image bytes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

use super::protocol::{Reply, Request};
use super::server::CapabilityHandler;

struct UserRecord {
    name: String,
    image: Vec<u8>,
}

#[derive(Default)]
struct DirectoryState {
    users: BTreeMap<String, UserRecord>,
    next_id: u64,
}

/// Users kept in process memory
pub struct MemoryDirectory {
    token: Option<String>,
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    /// Directory that accepts any token
    pub fn new() -> Self {
        Self {
            token: None,
            state: RwLock::new(DirectoryState::default()),
        }
    }

    /// Directory that rejects requests without `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new()
        }
    }

    /// Enroll a user directly, returning the new id
    pub async fn enroll(&self, name: &str, image: Vec<u8>) -> String {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let user_id = format!("user-{}", state.next_id);
        state.users.insert(
            user_id.clone(),
            UserRecord {
                name: name.to_string(),
                image,
            },
        );
        user_id
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.state.read().await.users.contains_key(user_id)
    }

    pub async fn name_of(&self, user_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .map(|u| u.name.clone())
    }

    fn authorized(&self, token: &str) -> bool {
        self.token.as_deref().map_or(true, |expected| expected == token)
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for MemoryDirectory {
    async fn handle(&self, request: Request) -> Reply {
        match request {
            Request::Health => {
                let users = self.state.read().await.users.len();
                Reply::success().with("users", users)
            }

            Request::Recognize { token, .. }
            | Request::Register { token, .. }
            | Request::Update { token, .. }
            | Request::Delete { token, .. }
            | Request::List { token, .. }
                if !self.authorized(&token) =>
            {
                Reply::error("unauthorized")
            }

            Request::Recognize { image, .. } => {
                let state = self.state.read().await;
                match state.users.iter().find(|(_, u)| u.image == image) {
                    Some((user_id, user)) => Reply::success()
                        .with("user_id", user_id.as_str())
                        .with("name", user.name.as_str())
                        .with("confidence", 1.0),
                    None => Reply::error("no match"),
                }
            }

            Request::Register { name, image, .. } => {
                let user_id = self.enroll(&name, image).await;
                info!(%user_id, %name, "user registered");
                Reply::success().with("user_id", user_id)
            }

            Request::Update { user_id, name, .. } => {
                let mut state = self.state.write().await;
                match state.users.get_mut(&user_id) {
                    Some(user) => {
                        user.name = name;
                        info!(%user_id, "user updated");
                        Reply::success().with("user_id", user_id)
                    }
                    None => Reply::error("not found"),
                }
            }

            Request::Delete { user_id, .. } => {
                let mut state = self.state.write().await;
                match state.users.remove(&user_id) {
                    Some(_) => {
                        info!(%user_id, "user deleted");
                        Reply::success().with("user_id", user_id)
                    }
                    None => Reply::error("not found"),
                }
            }

            Request::List { limit, offset, .. } => {
                let state = self.state.read().await;
                let users: Vec<_> = state
                    .users
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .map(|(id, u)| json!({ "user_id": id, "name": u.name }))
                    .collect();
                Reply::success()
                    .with("users", users)
                    .with("total", state.users.len())
            }
        }
    }
}
