//! Events emitted by running workflows
//!
//! Observers (a UI, a log tail) subscribe to a broadcast channel; the
//! workflow never waits on them.

use serde::{Deserialize, Serialize};

use crate::classify::Verdict;
use crate::workflow::WorkflowState;

/// Events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The workflow moved between states
    StateChanged {
        workflow: String,
        from: WorkflowState,
        to: WorkflowState,
        /// Milliseconds spent in `from`
        duration_ms: u64,
    },

    /// The assistant spoke
    Prompted { text: String },

    /// The user answered a confirmation question
    Heard {
        /// `None` when the listen step timed out or transcription failed
        transcript: Option<String>,
        verdict: Verdict,
        attempt: u32,
    },

    /// The workflow reached a terminal state
    Finished {
        workflow: String,
        state: WorkflowState,
        summary: String,
    },
}

impl std::fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowEvent::StateChanged { workflow, from, to, duration_ms } => {
                write!(f, "{workflow}: {from} -> {to} ({duration_ms}ms)")
            }
            WorkflowEvent::Prompted { text } => write!(f, "PROMPTED {text:?}"),
            WorkflowEvent::Heard { transcript, verdict, attempt } => match transcript {
                Some(t) => write!(f, "HEARD {t:?} => {verdict} (attempt {attempt})"),
                None => write!(f, "HEARD nothing => {verdict} (attempt {attempt})"),
            },
            WorkflowEvent::Finished { workflow, state, summary } => {
                write!(f, "{workflow} FINISHED {state}: {summary}")
            }
        }
    }
}
