//! Workflow states and the transitions allowed between them

use serde::{Deserialize, Serialize};

/// States of a confirmation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Created or reset, not started
    #[default]
    Idle,
    /// Resolving who is speaking
    Identify,
    /// Asking the speaker to confirm who they are
    ConfirmIdentity,
    /// Describing what the action will do
    Explain,
    /// Last yes/no before acting
    FinalConfirmation,
    /// Calling the remote capability
    Execute,
    /// Remote action succeeded
    Completed,
    /// User declined, was not recognized, or never answered clearly
    Cancelled,
    /// Remote action failed
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Cancelled | WorkflowState::Failed
        )
    }

    /// Whether `self -> next` is an edge of the workflow graph.
    ///
    /// Every active state may cancel; `reset` is handled separately.
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;

        match (self, next) {
            (Idle, Identify) => true,
            (Identify, ConfirmIdentity) => true,
            (ConfirmIdentity, Explain) => true,
            (Explain, FinalConfirmation) => true,
            (FinalConfirmation, Execute) => true,
            (Execute, Completed) | (Execute, Failed) => true,
            (Identify | ConfirmIdentity | Explain | FinalConfirmation | Execute, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "Idle"),
            WorkflowState::Identify => write!(f, "Identify"),
            WorkflowState::ConfirmIdentity => write!(f, "ConfirmIdentity"),
            WorkflowState::Explain => write!(f, "Explain"),
            WorkflowState::FinalConfirmation => write!(f, "FinalConfirmation"),
            WorkflowState::Execute => write!(f, "Execute"),
            WorkflowState::Completed => write!(f, "Completed"),
            WorkflowState::Cancelled => write!(f, "Cancelled"),
            WorkflowState::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowState::*;

    const ALL: [WorkflowState; 9] = [
        Idle,
        Identify,
        ConfirmIdentity,
        Explain,
        FinalConfirmation,
        Execute,
        Completed,
        Cancelled,
        Failed,
    ];

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            Idle,
            Identify,
            ConfirmIdentity,
            Explain,
            FinalConfirmation,
            Execute,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_dead_ends() {
        for from in [Completed, Cancelled, Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_confirmation() {
        assert!(!Identify.can_transition_to(Explain));
        assert!(!ConfirmIdentity.can_transition_to(Execute));
        assert!(!Explain.can_transition_to(Execute));
        assert!(!Idle.can_transition_to(Cancelled));
        assert!(!FinalConfirmation.can_transition_to(Failed));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&FinalConfirmation).unwrap();
        assert_eq!(json, r#""final_confirmation""#);
    }
}
