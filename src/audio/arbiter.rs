//! Mutual exclusion between microphone and speaker
//!
//! Acquisition never queues: a claim against a non-Idle device fails with
//! [`ArbiterError::DeviceBusy`]. A successful claim first waits out the
//! settle interval since the previous release, then returns an
//! [`AudioLease`] which puts the device back to Idle when dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Logical state of the shared audio hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Nothing holds the device
    #[default]
    Idle,
    /// Microphone is recording
    Listening,
    /// Speaker is playing
    Speaking,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Idle => write!(f, "Idle"),
            DeviceState::Listening => write!(f, "Listening"),
            DeviceState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Errors raised by the arbiter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbiterError {
    #[error("audio device is busy ({current}), cannot start {requested}")]
    DeviceBusy {
        current: DeviceState,
        requested: DeviceState,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

struct ArbiterState {
    device: DeviceState,
    /// When the device last went back to Idle
    last_release: Option<Instant>,
    settle_interval: Duration,
    /// Bumped on every claim so stale leases cannot release a newer one
    generation: u64,
}

/// Process-wide owner of the microphone/speaker state
///
/// Construct one per physical audio subsystem and share it with `Arc`.
pub struct AudioDeviceArbiter {
    state: Mutex<ArbiterState>,
}

impl AudioDeviceArbiter {
    /// Create an arbiter in the Idle state
    pub fn new(settle_interval: Duration) -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                device: DeviceState::Idle,
                last_release: None,
                settle_interval,
                generation: 0,
            }),
        }
    }

    /// Claim the microphone
    pub fn acquire_for_listening(&self) -> Result<AudioLease<'_>, ArbiterError> {
        self.acquire(DeviceState::Listening)
    }

    /// Claim the speaker
    pub fn acquire_for_speaking(&self) -> Result<AudioLease<'_>, ArbiterError> {
        self.acquire(DeviceState::Speaking)
    }

    /// Run `work` while holding the microphone
    pub fn with_listening<T>(&self, work: impl FnOnce() -> T) -> Result<T, ArbiterError> {
        let _lease = self.acquire_for_listening()?;
        Ok(work())
    }

    /// Run `work` while holding the speaker
    pub fn with_speaking<T>(&self, work: impl FnOnce() -> T) -> Result<T, ArbiterError> {
        let _lease = self.acquire_for_speaking()?;
        Ok(work())
    }

    /// Get the current state
    pub fn current_state(&self) -> DeviceState {
        self.lock().device
    }

    /// Unconditionally return to Idle.
    ///
    /// Error recovery only. Outstanding leases become inert.
    pub fn force_reset(&self) {
        let mut state = self.lock();
        if state.device != DeviceState::Idle {
            warn!(from = %state.device, "audio device force-reset to Idle");
            state.device = DeviceState::Idle;
            state.last_release = Some(Instant::now());
        }
    }

    /// Change the minimum quiet time between release and the next claim
    pub fn set_settle_interval(&self, seconds: f64) -> Result<(), ArbiterError> {
        let interval = Duration::try_from_secs_f64(seconds).map_err(|_| {
            ArbiterError::InvalidArgument(format!(
                "settle interval must be a non-negative, representable number of seconds, got {seconds}"
            ))
        })?;
        self.lock().settle_interval = interval;
        Ok(())
    }

    pub fn settle_interval(&self) -> Duration {
        self.lock().settle_interval
    }

    fn acquire(&self, requested: DeviceState) -> Result<AudioLease<'_>, ArbiterError> {
        let wait = {
            let state = self.lock();
            Self::ensure_idle(&state, requested)?;
            Self::remaining_settle(&state)
        };

        // Sleep without holding the lock so `current_state` stays readable.
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, %requested, "waiting for audio device to settle");
            std::thread::sleep(wait);
        }

        let mut state = self.lock();
        Self::ensure_idle(&state, requested)?;
        state.device = requested;
        state.generation += 1;
        debug!(to = %requested, "audio device acquired");

        Ok(AudioLease {
            arbiter: self,
            held: requested,
            generation: state.generation,
        })
    }

    fn ensure_idle(state: &ArbiterState, requested: DeviceState) -> Result<(), ArbiterError> {
        if state.device != DeviceState::Idle {
            debug!(current = %state.device, %requested, "audio device busy");
            return Err(ArbiterError::DeviceBusy {
                current: state.device,
                requested,
            });
        }
        Ok(())
    }

    fn remaining_settle(state: &ArbiterState) -> Duration {
        state
            .last_release
            .map(|at| state.settle_interval.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    fn release(&self, held: DeviceState, generation: u64) {
        let mut state = self.lock();
        // A force_reset may already have cleared this claim.
        if state.device == held && state.generation == generation {
            state.device = DeviceState::Idle;
            state.last_release = Some(Instant::now());
            debug!(from = %held, "audio device released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AudioDeviceArbiter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// Scoped claim on the audio device; releases on drop, including unwinds
#[must_use = "the device is released as soon as the lease is dropped"]
pub struct AudioLease<'a> {
    arbiter: &'a AudioDeviceArbiter,
    held: DeviceState,
    generation: u64,
}

impl AudioLease<'_> {
    pub fn state(&self) -> DeviceState {
        self.held
    }
}

impl std::fmt::Debug for AudioLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioLease")
            .field("held", &self.held)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for AudioLease<'_> {
    fn drop(&mut self) {
        self.arbiter.release(self.held, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_initial_state() {
        let arbiter = AudioDeviceArbiter::default();
        assert_eq!(arbiter.current_state(), DeviceState::Idle);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let arbiter = AudioDeviceArbiter::default();
        {
            let lease = arbiter.acquire_for_listening().unwrap();
            assert_eq!(lease.state(), DeviceState::Listening);
            assert_eq!(arbiter.current_state(), DeviceState::Listening);
        }
        assert_eq!(arbiter.current_state(), DeviceState::Idle);
    }

    #[test]
    fn test_release_on_panic() {
        let arbiter = AudioDeviceArbiter::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            arbiter
                .with_speaking(|| panic!("tts crashed"))
                .unwrap();
        }));
        assert!(result.is_err());
        assert_eq!(arbiter.current_state(), DeviceState::Idle);
    }

    #[test]
    fn test_release_on_error() {
        let arbiter = AudioDeviceArbiter::default();
        let result: Result<Result<(), &str>, _> =
            arbiter.with_listening(|| Err("microphone unplugged"));
        assert_eq!(result.unwrap(), Err("microphone unplugged"));
        assert_eq!(arbiter.current_state(), DeviceState::Idle);
    }

    #[test]
    fn test_speak_while_listening_is_busy() {
        let arbiter = AudioDeviceArbiter::default();
        let _lease = arbiter.acquire_for_listening().unwrap();

        let err = arbiter.acquire_for_speaking().unwrap_err();
        assert_eq!(
            err,
            ArbiterError::DeviceBusy {
                current: DeviceState::Listening,
                requested: DeviceState::Speaking,
            }
        );
        assert_eq!(arbiter.current_state(), DeviceState::Listening);
    }

    #[test]
    fn test_listen_while_speaking_is_busy() {
        let arbiter = AudioDeviceArbiter::default();
        let _lease = arbiter.acquire_for_speaking().unwrap();

        assert!(matches!(
            arbiter.acquire_for_listening(),
            Err(ArbiterError::DeviceBusy { .. })
        ));
        assert!(matches!(
            arbiter.acquire_for_speaking(),
            Err(ArbiterError::DeviceBusy { .. })
        ));
        assert_eq!(arbiter.current_state(), DeviceState::Speaking);
    }

    #[test]
    fn test_settle_interval_blocks() {
        let arbiter = AudioDeviceArbiter::new(Duration::from_millis(150));
        drop(arbiter.acquire_for_listening().unwrap());

        let started = Instant::now();
        let _lease = arbiter.acquire_for_speaking().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(140));
    }

    #[test]
    fn test_no_wait_after_interval_elapsed() {
        let arbiter = AudioDeviceArbiter::new(Duration::from_millis(50));
        drop(arbiter.acquire_for_listening().unwrap());
        std::thread::sleep(Duration::from_millis(80));

        let started = Instant::now();
        let _lease = arbiter.acquire_for_speaking().unwrap();
        assert!(started.elapsed() < Duration::from_millis(40));
    }

    #[test]
    fn test_first_acquire_does_not_wait() {
        let arbiter = AudioDeviceArbiter::new(Duration::from_secs(5));
        let started = Instant::now();
        let _lease = arbiter.acquire_for_listening().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_negative_settle_interval() {
        let arbiter = AudioDeviceArbiter::default();
        assert!(matches!(
            arbiter.set_settle_interval(-0.1),
            Err(ArbiterError::InvalidArgument(_))
        ));
        assert!(arbiter.set_settle_interval(f64::NAN).is_err());

        arbiter.set_settle_interval(0.2).unwrap();
        assert_eq!(arbiter.settle_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_oversized_settle_interval_rejected() {
        let arbiter = AudioDeviceArbiter::new(Duration::from_millis(10));
        assert!(matches!(
            arbiter.set_settle_interval(1e20),
            Err(ArbiterError::InvalidArgument(_))
        ));
        assert!(arbiter.set_settle_interval(f64::INFINITY).is_err());
        assert_eq!(arbiter.settle_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_lease_debug_shows_claim() {
        let arbiter = AudioDeviceArbiter::default();
        let lease = arbiter.acquire_for_listening().unwrap();
        assert!(format!("{lease:?}").contains("Listening"));
    }

    #[test]
    fn test_force_reset() {
        let arbiter = AudioDeviceArbiter::default();
        let lease = arbiter.acquire_for_speaking().unwrap();

        arbiter.force_reset();
        assert_eq!(arbiter.current_state(), DeviceState::Idle);

        // A fresh claim must not be clobbered by the stale lease.
        let speak_again = arbiter.acquire_for_speaking().unwrap();
        drop(lease);
        assert_eq!(arbiter.current_state(), DeviceState::Speaking);

        drop(speak_again);
        assert_eq!(arbiter.current_state(), DeviceState::Idle);
    }
}
