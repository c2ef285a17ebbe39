//! Console stand-ins for the audio engines
//!
//! Typed lines play the part of recorded speech and printed lines the part
//! of synthesized speech, so workflows can be driven from a terminal.

use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::workflow::{AudioClip, Microphone, SpeechToText, TextToSpeech, Transcription};

/// "Records" the next console line
pub struct ConsoleMicrophone {
    lines: Arc<Mutex<Receiver<String>>>,
}

impl ConsoleMicrophone {
    pub fn new(lines: Arc<Mutex<Receiver<String>>>) -> Self {
        Self { lines }
    }
}

impl Microphone for ConsoleMicrophone {
    fn record(&mut self, timeout: Duration) -> Result<Option<AudioClip>> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        match lines.recv_timeout(timeout) {
            Ok(line) => Ok(Some(AudioClip {
                data: line.into_bytes(),
                sample_rate: 0,
            })),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("console input closed")),
        }
    }
}

/// Reads console clips back as UTF-8 text
#[derive(Debug, Default)]
pub struct TypedTranscriber;

impl SpeechToText for TypedTranscriber {
    fn transcribe(&self, clip: &AudioClip) -> Result<Transcription> {
        Ok(match std::str::from_utf8(&clip.data) {
            Ok(text) if !text.trim().is_empty() => Transcription::heard(text.trim()),
            _ => Transcription::nothing(),
        })
    }
}

/// Prints what the assistant says
pub struct ConsoleSpeaker<W: Write + Send> {
    out: W,
}

impl ConsoleSpeaker<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleSpeaker<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TextToSpeech for ConsoleSpeaker<W> {
    fn speak(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "assistant> {text}")?;
        self.out.flush()?;
        Ok(())
    }
}
