//! Confirmation workflow engine
//!
//! Drives one dialogue from Idle to a terminal state:
//!
//! Idle -> Identify -> ConfirmIdentity -> Explain -> FinalConfirmation
//!      -> Execute -> Completed | Failed
//!
//! Any active state may end in Cancelled. Each audio step claims the
//! arbiter only for the duration of that I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::actions::WorkflowAction;
use super::collaborators::Collaborators;
use super::identity::Identity;
use super::state::WorkflowState;
use crate::audio::{ArbiterError, AudioDeviceArbiter};
use crate::classify::{ConfirmationClassifier, Verdict};
use crate::config::Config;
use crate::events::WorkflowEvent;
use crate::remote::{CapabilityFacade, FacadeError, Reply};

/// Spoken before every retry of a confirmation question
pub const REPROMPT: &str = "Sorry, I didn't catch that. Please answer yes or no.";

const CANCELLED_MESSAGE: &str = "Okay, I've cancelled that.";

/// Errors that abort a workflow step
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid workflow transition {from} -> {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("workflow already finished in {0}; call reset() first")]
    AlreadyFinished(WorkflowState),

    #[error("workflow can only be started from Idle, not {0}")]
    NotIdle(WorkflowState),

    #[error("no identity resolved before {0}")]
    MissingIdentity(WorkflowState),

    #[error(transparent)]
    Device(#[from] ArbiterError),

    #[error("audio i/o failed: {0:#}")]
    Audio(anyhow::Error),
}

/// Per-dialogue settings
#[derive(Debug, Clone)]
pub struct DialogueSettings {
    pub listen_timeout: Duration,
    /// Re-prompts per confirmation question; a question is asked at most
    /// `retry_limit + 1` times
    pub retry_limit: u32,
    pub auth_token: String,
}

impl DialogueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen_timeout: config.listen_timeout(),
            retry_limit: config.retry_limit,
            auth_token: config.auth_token.clone(),
        }
    }
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(5),
            retry_limit: 2,
            auth_token: String::new(),
        }
    }
}

/// Shared services a workflow runs against
#[derive(Clone)]
pub struct WorkflowContext {
    pub arbiter: Arc<AudioDeviceArbiter>,
    pub facade: Arc<CapabilityFacade>,
    pub classifier: Arc<ConfirmationClassifier>,
}

/// One listen-and-classify round of a confirmation question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationAttempt {
    pub transcript: Option<String>,
    pub verdict: Verdict,
    pub attempt: u32,
}

/// Why a workflow ended in Cancelled
#[derive(Debug, Clone, PartialEq)]
pub enum CancelReason {
    /// The identity resolver found nobody it knows
    NotRecognized,
    /// The identity resolver itself failed
    IdentificationFailed(String),
    /// The user said the resolved identity is wrong
    IdentityRejected,
    /// The user said no to the final question
    Declined,
    /// No clear yes/no within the retry limit
    NoClearAnswer { step: WorkflowState, attempts: u32 },
    /// The cancellation flag was raised
    Interrupted,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::NotRecognized => write!(f, "speaker not recognized"),
            CancelReason::IdentificationFailed(e) => write!(f, "identification failed: {e}"),
            CancelReason::IdentityRejected => write!(f, "speaker rejected the identity"),
            CancelReason::Declined => write!(f, "speaker declined"),
            CancelReason::NoClearAnswer { step, attempts } => {
                write!(f, "no clear answer in {step} after {attempts} attempts")
            }
            CancelReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Why the remote action did not succeed
#[derive(Debug, Clone)]
pub enum ExecuteFailure {
    /// The server answered with `status: error`
    Rejected(Reply),
    /// The call itself failed
    Transport(Arc<FacadeError>),
}

impl ExecuteFailure {
    pub fn message(&self) -> String {
        match self {
            ExecuteFailure::Rejected(reply) => reply
                .message
                .clone()
                .unwrap_or_else(|| "remote error".to_string()),
            ExecuteFailure::Transport(e) => format!("{:#}", anyhow::Error::from(Arc::clone(e))),
        }
    }
}

/// Terminal result of a workflow
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed { identity: Identity, reply: Reply },
    Cancelled { reason: CancelReason },
    Failed { identity: Identity, failure: ExecuteFailure },
}

impl WorkflowOutcome {
    pub fn state(&self) -> WorkflowState {
        match self {
            WorkflowOutcome::Completed { .. } => WorkflowState::Completed,
            WorkflowOutcome::Cancelled { .. } => WorkflowState::Cancelled,
            WorkflowOutcome::Failed { .. } => WorkflowState::Failed,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            WorkflowOutcome::Completed { identity, .. } => format!("completed for {}", identity.user_id),
            WorkflowOutcome::Cancelled { reason } => reason.to_string(),
            WorkflowOutcome::Failed { failure, .. } => failure.message(),
        }
    }
}

/// What a state handler decided
enum Next {
    Go(WorkflowState),
    Cancel(CancelReason),
    Complete(Identity, Reply),
    Fail(Identity, ExecuteFailure),
}

/// Result of asking a yes/no question
enum Answer {
    Yes,
    No,
    Unclear { attempts: u32 },
}

/// Finite state machine running one voice-confirmed action
pub struct ConfirmationWorkflow<A: WorkflowAction> {
    action: A,
    state: WorkflowState,
    /// Time when the current state was entered
    state_entered_at: Instant,
    context: WorkflowContext,
    io: Collaborators,
    settings: DialogueSettings,
    cancel: Arc<AtomicBool>,
    events: Option<broadcast::Sender<WorkflowEvent>>,
    identity: Option<Identity>,
    outcome: Option<WorkflowOutcome>,
}

impl<A: WorkflowAction> ConfirmationWorkflow<A> {
    /// Create a workflow in the Idle state
    pub fn new(action: A, context: WorkflowContext, io: Collaborators, settings: DialogueSettings) -> Self {
        Self {
            action,
            state: WorkflowState::Idle,
            state_entered_at: Instant::now(),
            context,
            io,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
            events: None,
            identity: None,
            outcome: None,
        }
    }

    /// Share a cancellation flag, checked at every state boundary
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Publish [`WorkflowEvent`]s to `events`
    pub fn with_events(mut self, events: broadcast::Sender<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Get the current state
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Set once a terminal state is reached
    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        self.outcome.as_ref()
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    /// Run from Idle until a terminal state
    pub fn run(&mut self) -> Result<WorkflowOutcome, WorkflowError> {
        if self.state != WorkflowState::Idle {
            return Err(WorkflowError::NotIdle(self.state));
        }

        info!(workflow = self.action.name(), "workflow started");

        loop {
            self.step()?;
            if let Some(outcome) = &self.outcome {
                return Ok(outcome.clone());
            }
        }
    }

    /// Perform the current state's work and advance one state
    pub fn step(&mut self) -> Result<WorkflowState, WorkflowError> {
        if self.state.is_terminal() {
            return Err(WorkflowError::AlreadyFinished(self.state));
        }

        let next = if self.state != WorkflowState::Idle && self.cancel.load(Ordering::SeqCst) {
            info!(workflow = self.action.name(), state = %self.state, "cancellation requested");
            Next::Cancel(CancelReason::Interrupted)
        } else {
            match self.state {
                WorkflowState::Idle => Next::Go(WorkflowState::Identify),
                WorkflowState::Identify => self.identify(),
                WorkflowState::ConfirmIdentity => self.confirm_identity()?,
                WorkflowState::Explain => self.explain()?,
                WorkflowState::FinalConfirmation => self.final_confirmation()?,
                WorkflowState::Execute => self.execute()?,
                terminal => return Err(WorkflowError::AlreadyFinished(terminal)),
            }
        };

        match next {
            Next::Go(state) => self.transition_to(state)?,
            Next::Cancel(reason) => self.finish(WorkflowOutcome::Cancelled { reason })?,
            Next::Complete(identity, reply) => {
                self.finish(WorkflowOutcome::Completed { identity, reply })?
            }
            Next::Fail(identity, failure) => {
                self.finish(WorkflowOutcome::Failed { identity, failure })?
            }
        }

        Ok(self.state)
    }

    /// Return a finished (or never started) workflow to Idle
    pub fn reset(&mut self) -> Result<(), WorkflowError> {
        if !(self.state.is_terminal() || self.state == WorkflowState::Idle) {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to: WorkflowState::Idle,
            });
        }

        debug!(workflow = self.action.name(), from = %self.state, "workflow reset");
        self.state = WorkflowState::Idle;
        self.state_entered_at = Instant::now();
        self.identity = None;
        self.outcome = None;
        Ok(())
    }

    fn identify(&mut self) -> Next {
        match self.io.identity.resolve() {
            Ok(Some(identity)) => {
                info!(user_id = %identity.user_id, "identity resolved");
                self.identity = Some(identity);
                Next::Go(WorkflowState::ConfirmIdentity)
            }
            Ok(None) => Next::Cancel(CancelReason::NotRecognized),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "identity resolution failed");
                Next::Cancel(CancelReason::IdentificationFailed(format!("{e:#}")))
            }
        }
    }

    fn confirm_identity(&mut self) -> Result<Next, WorkflowError> {
        let identity = self.current_identity()?;
        let question = self.action.identity_question(&identity);

        Ok(match self.ask(&question)? {
            Answer::Yes => Next::Go(WorkflowState::Explain),
            Answer::No => Next::Cancel(CancelReason::IdentityRejected),
            Answer::Unclear { attempts } => Next::Cancel(CancelReason::NoClearAnswer {
                step: WorkflowState::ConfirmIdentity,
                attempts,
            }),
        })
    }

    fn explain(&mut self) -> Result<Next, WorkflowError> {
        let identity = self.current_identity()?;
        let explanation = self.action.explanation(&identity);
        self.say(&explanation)?;
        Ok(Next::Go(WorkflowState::FinalConfirmation))
    }

    fn final_confirmation(&mut self) -> Result<Next, WorkflowError> {
        let identity = self.current_identity()?;
        let question = self.action.final_question(&identity);

        Ok(match self.ask(&question)? {
            Answer::Yes => Next::Go(WorkflowState::Execute),
            Answer::No => Next::Cancel(CancelReason::Declined),
            Answer::Unclear { attempts } => Next::Cancel(CancelReason::NoClearAnswer {
                step: WorkflowState::FinalConfirmation,
                attempts,
            }),
        })
    }

    fn execute(&mut self) -> Result<Next, WorkflowError> {
        let identity = self.current_identity()?;
        info!(
            workflow = self.action.name(),
            user_id = %identity.user_id,
            "executing remote action"
        );

        let result = self
            .action
            .execute(&self.context.facade, &self.settings.auth_token, &identity);

        Ok(match result {
            Ok(reply) if reply.is_success() => Next::Complete(identity, reply),
            Ok(reply) => {
                warn!(message = ?reply.message, "remote action rejected");
                Next::Fail(identity, ExecuteFailure::Rejected(reply))
            }
            Err(e) => {
                warn!(error = %e, "remote action failed");
                Next::Fail(identity, ExecuteFailure::Transport(Arc::new(e)))
            }
        })
    }

    /// Ask a yes/no question, re-prompting on unclear answers
    fn ask(&mut self, question: &str) -> Result<Answer, WorkflowError> {
        self.say(question)?;

        let max_attempts = self.settings.retry_limit.saturating_add(1);
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.say(REPROMPT)?;
            }

            let transcript = self.listen()?;
            let verdict = transcript
                .as_deref()
                .map_or(Verdict::Ambiguous, |text| self.context.classifier.classify(text));

            let record = ConfirmationAttempt {
                transcript,
                verdict,
                attempt,
            };
            info!(
                state = %self.state,
                attempt,
                %verdict,
                transcript = ?record.transcript,
                "confirmation answer"
            );
            self.emit(WorkflowEvent::Heard {
                transcript: record.transcript,
                verdict: record.verdict,
                attempt: record.attempt,
            });

            match verdict {
                Verdict::Affirmative => return Ok(Answer::Yes),
                Verdict::Negative => return Ok(Answer::No),
                Verdict::Ambiguous => continue,
            }
        }

        Ok(Answer::Unclear {
            attempts: max_attempts,
        })
    }

    /// Record one utterance and transcribe it; `None` means nothing usable
    fn listen(&mut self) -> Result<Option<String>, WorkflowError> {
        let clip = {
            let _lease = self.context.arbiter.acquire_for_listening()?;
            self.io
                .microphone
                .record(self.settings.listen_timeout)
                .map_err(WorkflowError::Audio)?
        };

        let Some(clip) = clip else {
            debug!("listen timed out");
            return Ok(None);
        };

        let transcription = self
            .io
            .transcriber
            .transcribe(&clip)
            .map_err(WorkflowError::Audio)?;

        if !transcription.success || transcription.text.trim().is_empty() {
            debug!("nothing intelligible heard");
            return Ok(None);
        }

        Ok(Some(transcription.text))
    }

    fn say(&mut self, text: &str) -> Result<(), WorkflowError> {
        self.emit(WorkflowEvent::Prompted {
            text: text.to_string(),
        });

        let _lease = self.context.arbiter.acquire_for_speaking()?;
        self.io.speaker.speak(text).map_err(WorkflowError::Audio)
    }

    fn current_identity(&self) -> Result<Identity, WorkflowError> {
        self.identity
            .clone()
            .ok_or(WorkflowError::MissingIdentity(self.state))
    }

    /// Enter a terminal state and tell the user how it ended
    fn finish(&mut self, outcome: WorkflowOutcome) -> Result<(), WorkflowError> {
        self.transition_to(outcome.state())?;

        info!(
            workflow = self.action.name(),
            state = %self.state,
            summary = %outcome.summary(),
            "workflow finished"
        );

        let announcement = match &outcome {
            WorkflowOutcome::Completed { identity, .. } => {
                Some(self.action.completion_message(identity))
            }
            WorkflowOutcome::Cancelled {
                reason: CancelReason::Interrupted,
            } => None,
            WorkflowOutcome::Cancelled { .. } => Some(CANCELLED_MESSAGE.to_string()),
            WorkflowOutcome::Failed { failure, .. } => Some(format!(
                "Sorry, that didn't work: {}.",
                failure.message()
            )),
        };

        // The outcome is already decided; a failed announcement must not mask it.
        if let Some(text) = announcement {
            if let Err(e) = self.say(&text) {
                warn!(error = %e, "failed to announce workflow outcome");
            }
        }

        self.emit(WorkflowEvent::Finished {
            workflow: self.action.name().to_string(),
            state: self.state,
            summary: outcome.summary(),
        });
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: WorkflowState) -> Result<(), WorkflowError> {
        let old_state = self.state;
        if !old_state.can_transition_to(new_state) {
            return Err(WorkflowError::InvalidTransition {
                from: old_state,
                to: new_state,
            });
        }

        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;

        info!(
            workflow = self.action.name(),
            from = %old_state,
            to = %new_state,
            duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Instant::now();

        self.emit(WorkflowEvent::StateChanged {
            workflow: self.action.name().to_string(),
            from: old_state,
            to: new_state,
            duration_ms,
        });
        Ok(())
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            debug!(%event, "emitting workflow event");
            let _ = tx.send(event);
        }
    }
}
