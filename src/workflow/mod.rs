//! Voice-driven confirmation workflows
//!
//! A workflow identifies the speaker, confirms who they are, explains the
//! action, asks for a final yes, then calls the remote capability:
//! - Completed: the remote call succeeded
//! - Cancelled: the user declined or never answered clearly
//! - Failed: the remote call did not succeed

mod actions;
mod collaborators;
mod engine;
mod identity;
mod state;

pub use actions::{DeleteUser, UpdateProfile, WorkflowAction};
pub use collaborators::{
    AudioClip, Collaborators, IdentityResolver, Microphone, SpeechToText, TextToSpeech,
    Transcription,
};
pub use engine::{
    CancelReason, ConfirmationAttempt, ConfirmationWorkflow, DialogueSettings, ExecuteFailure,
    WorkflowContext, WorkflowError, WorkflowOutcome, REPROMPT,
};
pub use identity::{Identity, RemoteIdentityResolver};
pub use state::WorkflowState;
