//! The blocking facade talking to a real capability server over a Unix socket.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::runtime::Runtime;

use voice_steward::audio::AudioDeviceArbiter;
use voice_steward::classify::ConfirmationClassifier;
use voice_steward::config::Config;
use voice_steward::console::{ConsoleSpeaker, TypedTranscriber};
use voice_steward::remote::{
    CapabilityFacade, CapabilityServer, FacadeError, MemoryDirectory, SocketClient,
};
use voice_steward::workflow::{
    AudioClip, Collaborators, ConfirmationWorkflow, DeleteUser, DialogueSettings, Microphone,
    RemoteIdentityResolver, WorkflowContext, WorkflowOutcome,
};

const TOKEN: &str = "s3cret";

/// Server on its own runtime, torn down with the test
struct Fixture {
    dir: TempDir,
    runtime: Runtime,
    server: Arc<CapabilityServer>,
    directory: Arc<MemoryDirectory>,
}

impl Fixture {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let directory = Arc::new(MemoryDirectory::with_token(TOKEN));

        let socket = dir.path().join("capability.sock");
        let server = runtime
            .block_on(async { CapabilityServer::bind(&socket, directory.clone()) })
            .unwrap();
        let server = Arc::new(server);

        let running = Arc::clone(&server);
        runtime.spawn(async move { running.run().await });

        Self {
            dir,
            runtime,
            server,
            directory,
        }
    }

    fn socket(&self) -> &Path {
        self.server.socket_path()
    }

    fn facade(&self) -> CapabilityFacade {
        let client = SocketClient::new(self.socket()).with_request_timeout(Duration::from_secs(5));
        let facade = CapabilityFacade::new(client);
        facade.connect().unwrap();
        facade
    }

    fn stop(self) {
        self.server.shutdown();
        self.runtime.shutdown_timeout(Duration::from_secs(1));
    }
}

#[test]
fn capabilities_round_trip() {
    let fixture = Fixture::start();
    let facade = fixture.facade();

    let health = facade.health().unwrap();
    assert!(health.is_success());
    assert_eq!(health.data["users"], 0);

    let registered = facade.register(TOKEN, "Ada", vec![7, 7, 7]).unwrap();
    let user_id = registered.str_field("user_id").unwrap().to_string();

    let seen = facade.recognize(TOKEN, vec![7, 7, 7]).unwrap();
    assert_eq!(seen.str_field("user_id"), Some(user_id.as_str()));
    assert_eq!(seen.str_field("name"), Some("Ada"));

    let stranger = facade.recognize(TOKEN, vec![1]).unwrap();
    assert!(!stranger.is_success());
    assert_eq!(stranger.message.as_deref(), Some("no match"));

    assert!(facade.update(TOKEN, &user_id, "Ada L.").unwrap().is_success());
    let listed = facade.list(TOKEN, 10, 0).unwrap();
    assert_eq!(listed.data["total"], 1);
    assert_eq!(listed.data["users"][0]["name"], "Ada L.");

    assert!(facade.delete(TOKEN, &user_id).unwrap().is_success());
    let again = facade.delete(TOKEN, &user_id).unwrap();
    assert_eq!(again.message.as_deref(), Some("not found"));

    facade.disconnect();
    fixture.stop();
}

#[test]
fn wrong_token_is_rejected_by_server() {
    let fixture = Fixture::start();
    let facade = fixture.facade();

    let reply = facade.list("guess", 10, 0).unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("unauthorized"));

    drop(facade);
    fixture.stop();
}

#[test]
fn scoped_session_reconnects() {
    let fixture = Fixture::start();
    let facade = CapabilityFacade::new(SocketClient::new(fixture.socket()));

    {
        let session = facade.session().unwrap();
        assert!(session.health().unwrap().is_success());
    }
    assert!(!facade.is_connected());
    assert!(matches!(facade.health(), Err(FacadeError::NotConnected)));

    let session = facade.session().unwrap();
    assert!(session.health().unwrap().is_success());
    drop(session);

    fixture.stop();
}

#[test]
fn server_gone_surfaces_remote_error() {
    let fixture = Fixture::start();
    let facade = fixture.facade();
    assert!(facade.health().unwrap().is_success());

    fixture.stop();

    assert!(matches!(
        facade.health(),
        Err(FacadeError::Remote {
            capability: "health",
            ..
        })
    ));
}

#[test]
fn connect_without_server_fails_and_can_retry() {
    let dir = tempfile::tempdir().unwrap();
    let facade = CapabilityFacade::new(SocketClient::new(&dir.path().join("absent.sock")));

    assert!(matches!(facade.connect(), Err(FacadeError::Connect(_))));
    assert!(!facade.is_connected());
    assert!(matches!(facade.connect(), Err(FacadeError::Connect(_))));
}

/// Replays typed answers as clips
struct Answers(Vec<&'static str>);

impl Microphone for Answers {
    fn record(&mut self, _timeout: Duration) -> anyhow::Result<Option<AudioClip>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(AudioClip {
            data: self.0.remove(0).as_bytes().to_vec(),
            sample_rate: 0,
        }))
    }
}

#[test]
fn delete_workflow_removes_enrolled_user() {
    let fixture = Fixture::start();
    let face = b"grace-face".to_vec();
    let user_id = fixture
        .runtime
        .block_on(fixture.directory.enroll("Grace", face.clone()));

    let snapshot = fixture.dir.path().join("snapshot.jpg");
    std::fs::write(&snapshot, &face).unwrap();

    let facade = Arc::new(fixture.facade());
    let config = Config::with_data_dir(fixture.dir.path());
    let context = WorkflowContext {
        arbiter: Arc::new(AudioDeviceArbiter::new(Duration::from_millis(5))),
        facade: Arc::clone(&facade),
        classifier: Arc::new(ConfirmationClassifier::from_config(&config)),
    };
    let io = Collaborators {
        microphone: Box::new(Answers(vec!["yes it's me", "yes"])),
        transcriber: Box::new(TypedTranscriber),
        speaker: Box::new(ConsoleSpeaker::new(std::io::sink())),
        identity: Box::new(RemoteIdentityResolver::new(
            Arc::clone(&facade),
            TOKEN,
            snapshot,
        )),
    };
    let settings = DialogueSettings {
        auth_token: TOKEN.to_string(),
        ..DialogueSettings::default()
    };

    let mut workflow = ConfirmationWorkflow::new(DeleteUser, context, io, settings);
    let outcome = workflow.run().unwrap();

    match outcome {
        WorkflowOutcome::Completed { identity, reply } => {
            assert_eq!(identity.user_id, user_id);
            assert_eq!(reply.str_field("user_id"), Some(user_id.as_str()));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(!fixture.runtime.block_on(fixture.directory.contains(&user_id)));

    facade.disconnect();
    fixture.stop();
}

#[test]
fn unknown_face_cancels_delete_workflow() {
    let fixture = Fixture::start();
    fixture
        .runtime
        .block_on(fixture.directory.enroll("Grace", b"grace-face".to_vec()));

    let snapshot = fixture.dir.path().join("snapshot.jpg");
    std::fs::write(&snapshot, b"someone-else").unwrap();

    let facade = Arc::new(fixture.facade());
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let context = WorkflowContext {
        arbiter: Arc::new(AudioDeviceArbiter::default()),
        facade: Arc::clone(&facade),
        classifier: Arc::new(ConfirmationClassifier::from_config(&Config::with_data_dir(
            fixture.dir.path(),
        ))),
    };
    let io = Collaborators {
        microphone: Box::new(Answers(vec![])),
        transcriber: Box::new(TypedTranscriber),
        speaker: Box::new(ConsoleSpeaker::new(SharedBuf(Arc::clone(&spoken)))),
        identity: Box::new(RemoteIdentityResolver::new(
            Arc::clone(&facade),
            TOKEN,
            snapshot,
        )),
    };

    let mut workflow = ConfirmationWorkflow::new(
        DeleteUser,
        context,
        io,
        DialogueSettings {
            auth_token: TOKEN.to_string(),
            ..DialogueSettings::default()
        },
    );
    let outcome = workflow.run().unwrap();

    assert_eq!(outcome.summary(), "speaker not recognized");
    let spoken = String::from_utf8(spoken.lock().unwrap().clone()).unwrap();
    assert!(spoken.contains("cancelled"));

    facade.disconnect();
    fixture.stop();
}

struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
