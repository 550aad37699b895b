use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AudioClock, DEFAULT_BPM};
use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub status: TransportStatus,
    /// Seconds
    pub position: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// Playback ran past the end; the transport is stopped and rewound.
    ReachedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekOutcome {
    /// The clamped target
    pub position: f64,
    /// The transport was playing, so armed events are now stale.
    pub rearm: bool,
}

/// Single source of truth for playback position and state.
///
/// While playing, the position is extrapolated from an anchor pair
/// `(clock time at start, position at start)` rather than accumulated, so it
/// cannot drift from the audio clock.
#[derive(Debug, Clone)]
pub struct TransportClock {
    status: TransportStatus,
    duration: f64,
    bpm: f64,
    /// Position at the anchor; the frozen position when not playing
    anchor_position: f64,
    anchor_clock_time: f64,
}

impl TransportClock {
    pub fn new(duration: f64, bpm: f64) -> Self {
        Self {
            status: TransportStatus::Stopped,
            duration: duration.max(0.0),
            bpm,
            anchor_position: 0.0,
            anchor_clock_time: 0.0,
        }
    }

    /// Resets to a stopped transport at 0 for a new note set.
    pub fn load(&mut self, duration: f64, bpm: f64) {
        *self = Self::new(duration, bpm);
    }

    pub fn status(&self) -> TransportStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == TransportStatus::Playing
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn play(&mut self, clock: &dyn AudioClock) -> Result<(), PlaybackError> {
        if self.status == TransportStatus::Playing {
            return Ok(());
        }
        if !clock.is_running() {
            return Err(PlaybackError::AudioNotReady);
        }

        self.anchor_clock_time = clock.now();
        self.status = TransportStatus::Playing;
        info!(position = self.anchor_position, "Transport playing");
        Ok(())
    }

    pub fn pause(&mut self, now: f64) {
        if self.status != TransportStatus::Playing {
            return;
        }
        self.anchor_position = self.position_at(now);
        self.status = TransportStatus::Paused;
        info!(position = self.anchor_position, "Transport paused");
    }

    pub fn stop(&mut self) {
        self.status = TransportStatus::Stopped;
        self.anchor_position = 0.0;
        info!("Transport stopped");
    }

    pub fn seek(&mut self, target: f64, now: f64) -> SeekOutcome {
        let position = if target.is_nan() {
            0.0
        } else {
            target.clamp(0.0, self.duration)
        };
        if position != target {
            debug!(target, clamped = position, "Seek target outside the timeline, clamped");
        }

        self.anchor_position = position;
        self.anchor_clock_time = now;

        SeekOutcome {
            position,
            rearm: self.is_playing(),
        }
    }

    /// Position at clock time `now`, clamped to `[0, duration]`.
    pub fn position_at(&self, now: f64) -> f64 {
        match self.status {
            TransportStatus::Playing => {
                let elapsed = now - self.anchor_clock_time;
                (self.anchor_position + elapsed).clamp(0.0, self.duration)
            }
            _ => self.anchor_position,
        }
    }

    /// Applies the end-of-timeline transition. Call before reading the
    /// position on every host tick.
    pub fn update(&mut self, now: f64) -> Option<TransportEvent> {
        if self.status != TransportStatus::Playing {
            return None;
        }
        let unclamped = self.anchor_position + (now - self.anchor_clock_time);
        if unclamped < self.duration {
            return None;
        }

        self.status = TransportStatus::Stopped;
        self.anchor_position = 0.0;
        info!(duration = self.duration, "Reached end of timeline");
        Some(TransportEvent::ReachedEnd)
    }

    pub fn state(&self, now: f64) -> TransportState {
        TransportState {
            status: self.status,
            position: self.position_at(now),
            bpm: self.bpm,
        }
    }
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(0.0, DEFAULT_BPM)
    }
}
