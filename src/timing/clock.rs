use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Suspended,
    /// Resumption was requested but has not completed yet
    Resuming,
    Running,
}

/// The audio-capable clock that note triggers are timed against.
///
/// Resuming is asynchronous: `resume()` only requests it, and the clock reports
/// `Running` once the host has actually started it.
pub trait AudioClock {
    /// Seconds since the clock was created.
    fn now(&self) -> f64;

    fn state(&self) -> ClockState;

    fn resume(&mut self);

    fn is_running(&self) -> bool {
        self.state() == ClockState::Running
    }
}

/// Host-driven clock. Time only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: f64,
    state: ClockState,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            state: ClockState::Suspended,
        }
    }

    pub fn running() -> Self {
        Self {
            now: 0.0,
            state: ClockState::Running,
        }
    }

    pub fn advance(&mut self, seconds: f64) {
        self.now += seconds.max(0.0);
    }

    pub fn set_time(&mut self, seconds: f64) {
        self.now = seconds.max(self.now);
    }

    /// Completes a pending `resume()`.
    pub fn finish_resume(&mut self) {
        if self.state == ClockState::Resuming {
            self.state = ClockState::Running;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self) {
        if self.state == ClockState::Suspended {
            self.state = ClockState::Resuming;
        }
    }
}

/// Monotonic wall clock standing in for an audio device clock.
///
/// Like a browser audio context it starts suspended and needs `resume()` from
/// a user gesture; it becomes `Running` after `resume_latency`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    resume_latency: Duration,
    running_from: Option<Instant>,
}

impl SystemClock {
    pub fn new(resume_latency: Duration) -> Self {
        Self {
            origin: Instant::now(),
            resume_latency,
            running_from: None,
        }
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn state(&self) -> ClockState {
        match self.running_from {
            None => ClockState::Suspended,
            Some(at) if Instant::now() >= at => ClockState::Running,
            Some(_) => ClockState::Resuming,
        }
    }

    fn resume(&mut self) {
        if self.running_from.is_none() {
            debug!(latency_ms = self.resume_latency.as_millis() as u64, "Resuming audio clock");
            self.running_from = Some(Instant::now() + self.resume_latency);
        }
    }
}
