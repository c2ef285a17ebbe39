//! voice-steward: voice-confirmed account workflows
//!
//! - `audio`: one-claimant arbitration of the shared audio device
//! - `classify`: yes/no/unclear classification of spoken answers
//! - `remote`: blocking facade over the async capability client
//! - `workflow`: the identify/confirm/explain/execute state machine

pub mod audio;
pub mod classify;
pub mod config;
pub mod console;
pub mod events;
pub mod lifecycle;
pub mod remote;
pub mod trigger;
pub mod workflow;
