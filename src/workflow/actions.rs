//! Concrete workflows: what gets said, and what runs on confirmation

use super::identity::Identity;
use crate::remote::{CapabilityFacade, FacadeError, Reply};

/// The parts of a confirmation workflow that differ per action
pub trait WorkflowAction: Send {
    /// Short name used in logs and events
    fn name(&self) -> &'static str;

    fn identity_question(&self, identity: &Identity) -> String {
        format!("I think you are {}. Is that right?", identity.name)
    }

    /// Spoken in the Explain state
    fn explanation(&self, identity: &Identity) -> String;

    fn final_question(&self, identity: &Identity) -> String;

    /// The remote call made once everything is confirmed
    fn execute(
        &self,
        facade: &CapabilityFacade,
        token: &str,
        identity: &Identity,
    ) -> Result<Reply, FacadeError>;

    fn completion_message(&self, identity: &Identity) -> String;
}

/// Permanently remove the speaker's profile
#[derive(Debug, Clone, Default)]
pub struct DeleteUser;

impl WorkflowAction for DeleteUser {
    fn name(&self) -> &'static str {
        "delete_user"
    }

    fn explanation(&self, _identity: &Identity) -> String {
        "Deleting your profile removes your face data and your account. This cannot be undone."
            .to_string()
    }

    fn final_question(&self, identity: &Identity) -> String {
        format!(
            "Are you sure you want to permanently delete the profile for {}?",
            identity.name
        )
    }

    fn execute(
        &self,
        facade: &CapabilityFacade,
        token: &str,
        identity: &Identity,
    ) -> Result<Reply, FacadeError> {
        facade.delete(token, &identity.user_id)
    }

    fn completion_message(&self, identity: &Identity) -> String {
        format!("Your profile has been deleted. Goodbye, {}.", identity.name)
    }
}

/// Change the display name on the speaker's profile
#[derive(Debug, Clone)]
pub struct UpdateProfile {
    pub new_name: String,
}

impl UpdateProfile {
    pub fn new(new_name: impl Into<String>) -> Self {
        Self {
            new_name: new_name.into(),
        }
    }
}

impl WorkflowAction for UpdateProfile {
    fn name(&self) -> &'static str {
        "update_profile"
    }

    fn explanation(&self, identity: &Identity) -> String {
        format!(
            "I will change the name on your profile from {} to {}.",
            identity.name, self.new_name
        )
    }

    fn final_question(&self, _identity: &Identity) -> String {
        format!("Should I save the new name {}?", self.new_name)
    }

    fn execute(
        &self,
        facade: &CapabilityFacade,
        token: &str,
        identity: &Identity,
    ) -> Result<Reply, FacadeError> {
        facade.update(token, &identity.user_id, &self.new_name)
    }

    fn completion_message(&self, _identity: &Identity) -> String {
        format!("Done. I'll call you {} from now on.", self.new_name)
    }
}
