use std::path::PathBuf;

use thiserror::Error;

use crate::timing::TrackId;

/// Errors surfaced by the playback controls.
///
/// None of these are fatal. `AudioNotReady` is retried by the caller after the
/// audio clock has been resumed from a user gesture, `MissingVoice` is
/// recovered locally by skipping the track's notes.
///
/// Two conditions are handled by policy and never show up here: seek targets
/// outside `[0, duration]` are clamped, and a full voice pool steals its
/// oldest voice.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio clock is not running, resume it from a user gesture and retry")]
    AudioNotReady,

    #[error("track {track} has no voice")]
    MissingVoice { track: TrackId },

    #[error("unknown track '{0}'")]
    UnknownTrack(String),

    #[error("timbre for track {track} cannot be played, its sample is not in the library")]
    UnplayableTimbre { track: TrackId },
}

/// Errors raised while reading note data or configuration files.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON write error: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}
