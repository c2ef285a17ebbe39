//! Speaker identity and remote resolution

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::collaborators::IdentityResolver;
use crate::remote::{CapabilityFacade, Reply};

/// A recognized person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            confidence: None,
        }
    }

    /// Extract an identity from a successful `recognize` reply
    pub fn from_reply(reply: &Reply) -> Option<Self> {
        if !reply.is_success() {
            return None;
        }
        Some(Self {
            user_id: reply.str_field("user_id")?.to_string(),
            name: reply.str_field("name")?.to_string(),
            confidence: reply.data.get("confidence").and_then(|v| v.as_f64()),
        })
    }
}

/// Resolves the speaker by sending a camera snapshot to `recognize`
pub struct RemoteIdentityResolver {
    facade: Arc<CapabilityFacade>,
    token: String,
    snapshot_path: PathBuf,
}

impl RemoteIdentityResolver {
    pub fn new(facade: Arc<CapabilityFacade>, token: impl Into<String>, snapshot_path: PathBuf) -> Self {
        Self {
            facade,
            token: token.into(),
            snapshot_path,
        }
    }
}

impl IdentityResolver for RemoteIdentityResolver {
    fn resolve(&mut self) -> Result<Option<Identity>> {
        let image = std::fs::read(&self.snapshot_path)
            .with_context(|| format!("failed to read snapshot {}", self.snapshot_path.display()))?;

        debug!(bytes = image.len(), "sending snapshot for recognition");
        let reply = self.facade.recognize(&self.token, image)?;

        match Identity::from_reply(&reply) {
            Some(identity) => {
                info!(user_id = %identity.user_id, "speaker recognized");
                Ok(Some(identity))
            }
            None => {
                info!(message = ?reply.message, "speaker not recognized");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reply() {
        let reply = Reply::success()
            .with("user_id", "u-1")
            .with("name", "Ada")
            .with("confidence", 0.91);
        let identity = Identity::from_reply(&reply).unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.name, "Ada");
        assert_eq!(identity.confidence, Some(0.91));
    }

    #[test]
    fn test_from_reply_requires_fields() {
        assert!(Identity::from_reply(&Reply::success().with("name", "Ada")).is_none());
        assert!(Identity::from_reply(&Reply::error("no match")).is_none());
    }
}
