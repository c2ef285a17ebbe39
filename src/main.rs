//! voice-steward daemon
//!
//! Waits for trigger lines on the console and runs voice-confirmed
//! workflows against the remote capability server:
//! - `delete` removes the speaker's profile
//! - `update <name>` renames it
//! - `health` and `list` query the server directly
//!
//! While a workflow runs, console lines are its spoken answers.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_steward::audio::AudioDeviceArbiter;
use voice_steward::classify::{ConfirmationClassifier, PhraseLexicon};
use voice_steward::config::Config;
use voice_steward::console::{ConsoleMicrophone, ConsoleSpeaker, TypedTranscriber};
use voice_steward::events::WorkflowEvent;
use voice_steward::lifecycle::ShutdownSignal;
use voice_steward::remote::{CapabilityFacade, Reply, SocketClient};
use voice_steward::trigger::{ConsoleListener, TriggerCommand, USAGE};
use voice_steward::workflow::{
    Collaborators, ConfirmationWorkflow, DeleteUser, DialogueSettings, RemoteIdentityResolver,
    UpdateProfile, WorkflowAction, WorkflowContext,
};

/// How often the idle loop checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Page size for the `list` trigger
const LIST_PAGE: u32 = 20;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voice-steward starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.snapshot_path, "configuration loaded");

    let shutdown = ShutdownSignal::new();
    shutdown
        .install()
        .context("failed to install signal handlers")?;

    let arbiter = Arc::new(AudioDeviceArbiter::new(config.settle_interval()));
    let facade = Arc::new(CapabilityFacade::new(SocketClient::new(&config.socket_path)));
    if let Err(e) = facade.connect() {
        warn!(error = %e, "capability server unavailable, will retry on demand");
    }

    let mut classifier = ConfirmationClassifier::from_config(&config);
    if config.semantic_fallback {
        classifier =
            classifier.with_fallback(Arc::new(PhraseLexicon::new()), config.semantic_timeout());
    }

    let context = WorkflowContext {
        arbiter,
        facade: Arc::clone(&facade),
        classifier: Arc::new(classifier),
    };
    let settings = DialogueSettings::from_config(&config);

    let (event_tx, event_rx) = broadcast::channel::<WorkflowEvent>(64);
    spawn_event_logger(event_rx)?;

    let (line_tx, line_rx) = mpsc::channel();
    let lines = Arc::new(Mutex::new(line_rx));
    let listener = ConsoleListener::new(line_tx);
    listener.start()?;

    println!("{USAGE}");
    info!("daemon initialized, waiting for triggers");

    let daemon = Daemon {
        config: &config,
        context,
        settings,
        events: event_tx,
        lines: Arc::clone(&lines),
        shutdown: shutdown.clone(),
    };

    while !shutdown.is_triggered() {
        let line = {
            let rx = lines.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv_timeout(POLL_INTERVAL)
        };

        let line = match line {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                if !listener.is_running() {
                    info!("console input closed");
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let Some(command) = TriggerCommand::parse(&line) else {
            if !line.trim().is_empty() {
                println!("{USAGE}");
            }
            continue;
        };

        debug!(?command, "trigger received");
        match command {
            TriggerCommand::Quit => break,
            TriggerCommand::Delete => daemon.run_workflow(DeleteUser),
            TriggerCommand::Update { new_name } => daemon.run_workflow(UpdateProfile::new(new_name)),
            TriggerCommand::Health => daemon.query(|f| f.health()),
            TriggerCommand::List => daemon.query(|f| f.list(&config.auth_token, LIST_PAGE, 0)),
        }
    }

    // Cleanup
    info!("shutting down...");

    listener.stop();
    facade.disconnect();

    info!("voice-steward stopped");

    Ok(())
}

/// Everything a trigger needs
struct Daemon<'a> {
    config: &'a Config,
    context: WorkflowContext,
    settings: DialogueSettings,
    events: broadcast::Sender<WorkflowEvent>,
    lines: Arc<Mutex<Receiver<String>>>,
    shutdown: ShutdownSignal,
}

impl Daemon<'_> {
    fn ensure_connected(&self) -> bool {
        match self.context.facade.connect() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "capability server unavailable");
                println!("capability server unavailable: {e}");
                false
            }
        }
    }

    fn run_workflow<A: WorkflowAction>(&self, action: A) {
        let Some(snapshot_path) = self.config.snapshot_path.clone() else {
            warn!("no snapshot path configured, cannot identify the speaker");
            println!("set VOICE_STEWARD_SNAPSHOT to a camera snapshot to run workflows");
            return;
        };

        if !self.ensure_connected() {
            return;
        }

        let io = Collaborators {
            microphone: Box::new(ConsoleMicrophone::new(Arc::clone(&self.lines))),
            transcriber: Box::new(TypedTranscriber),
            speaker: Box::new(ConsoleSpeaker::stdout()),
            identity: Box::new(RemoteIdentityResolver::new(
                Arc::clone(&self.context.facade),
                self.config.auth_token.clone(),
                snapshot_path,
            )),
        };

        let mut workflow =
            ConfirmationWorkflow::new(action, self.context.clone(), io, self.settings.clone())
                .with_cancel_flag(self.shutdown.flag())
                .with_events(self.events.clone());

        match workflow.run() {
            Ok(outcome) => info!(
                workflow = workflow.action().name(),
                state = %outcome.state(),
                summary = %outcome.summary(),
                "workflow done"
            ),
            Err(e) => {
                error!(workflow = workflow.action().name(), error = %e, "workflow aborted");
                self.context.arbiter.force_reset();
            }
        }
    }

    fn query<F>(&self, call: F)
    where
        F: FnOnce(&CapabilityFacade) -> Result<Reply, voice_steward::remote::FacadeError>,
    {
        if !self.ensure_connected() {
            return;
        }

        match call(&self.context.facade) {
            Ok(reply) => match serde_json::to_string_pretty(&reply) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(?e, "failed to render reply"),
            },
            Err(e) => {
                error!(error = %e, "remote call failed");
                println!("remote call failed: {e}");
            }
        }
    }
}

/// Log workflow events on a background thread
fn spawn_event_logger(mut rx: broadcast::Receiver<WorkflowEvent>) -> Result<()> {
    thread::Builder::new()
        .name("event-logger".to_string())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => info!(%event, "workflow event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "workflow event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        })
        .context("failed to spawn event logger")?;
    Ok(())
}
