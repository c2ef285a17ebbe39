//! Audio device arbitration
//!
//! One arbiter guards the shared microphone/speaker pair:
//! - Idle: nobody holds the device
//! - Listening: the microphone is claimed
//! - Speaking: the speaker is claimed

mod arbiter;

pub use arbiter::{ArbiterError, AudioDeviceArbiter, AudioLease, DeviceState};
