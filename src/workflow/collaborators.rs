//! Interfaces to the speech, audio and identity engines
//!
//! The workflow only sees these traits; concrete engines are injected at
//! construction time.

use std::time::Duration;

use anyhow::Result;

use super::identity::Identity;

/// A captured utterance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio as produced by the microphone
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

/// Result of speech-to-text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcription {
    /// `false` for silence or noise
    pub success: bool,
    pub text: String,
}

impl Transcription {
    pub fn heard(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn nothing() -> Self {
        Self::default()
    }
}

/// Records one utterance
pub trait Microphone: Send {
    /// Block for at most `timeout`; `Ok(None)` if nobody spoke
    fn record(&mut self, timeout: Duration) -> Result<Option<AudioClip>>;
}

/// Speech-to-text engine. Ordinary non-speech audio yields an unsuccessful
/// [`Transcription`], not an error.
pub trait SpeechToText: Send {
    fn transcribe(&self, clip: &AudioClip) -> Result<Transcription>;
}

/// Text-to-speech engine
pub trait TextToSpeech: Send {
    /// Block until playback finishes
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Works out who is in front of the device
pub trait IdentityResolver: Send {
    fn resolve(&mut self) -> Result<Option<Identity>>;
}

/// The engines one workflow talks to
pub struct Collaborators {
    pub microphone: Box<dyn Microphone>,
    pub transcriber: Box<dyn SpeechToText>,
    pub speaker: Box<dyn TextToSpeech>,
    pub identity: Box<dyn IdentityResolver>,
}
