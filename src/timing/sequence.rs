use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LoadError;

pub type TrackId = usize;

pub const DEFAULT_BPM: f64 = 120.0;
const FALLBACK_DURATION: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    /// Seconds
    pub start: f64,
    /// Seconds, always greater than `start`
    pub end: f64,
    pub velocity: u8,
    pub track: TrackId,
}

impl Note {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Closed interval: a note sounds at both its start and its end.
    pub fn is_sounding_at(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub notes: Vec<Note>,
    /// 0.0 -> 1.0
    pub volume: f32,
    pub muted: bool,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        for note in &mut notes {
            note.track = id;
        }

        Self {
            id,
            name: name.into(),
            notes,
            volume: 1.0,
            muted: false,
        }
    }

    /// Index of the first note starting at or after `time`.
    pub fn first_note_from(&self, time: f64) -> usize {
        self.notes.partition_point(|n| n.start < time)
    }
}

/// A loaded multi-track sequence, the unit the session and the view reset on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSet {
    /// Seconds
    pub duration: f64,
    pub bpm: f64,
    pub tracks: Vec<Track>,
}

impl Default for NoteSet {
    fn default() -> Self {
        Self {
            duration: 0.0,
            bpm: DEFAULT_BPM,
            tracks: Vec::new(),
        }
    }
}

impl NoteSet {
    pub fn from_data(data: NoteData) -> Self {
        let mut latest_end: f64 = 0.0;

        let tracks: Vec<Track> = data
            .tracks
            .into_iter()
            .enumerate()
            .map(|(track_id, track)| {
                let notes: Vec<Note> = track
                    .notes
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, input)| match input.to_note(track_id) {
                        Some(note) => Some(note),
                        None => {
                            warn!(
                                track = %track.name,
                                index = idx,
                                ?input,
                                "Skipping invalid note"
                            );
                            None
                        }
                    })
                    .collect();

                if let Some(end) = notes.iter().map(|n| n.end).reduce(f64::max) {
                    latest_end = latest_end.max(end);
                }

                Track::new(track_id, track.name, notes)
            })
            .collect();

        let duration = if data.duration > 0.0 {
            data.duration
        } else if latest_end > 0.0 {
            latest_end
        } else {
            FALLBACK_DURATION
        };

        let bpm = if data.bpm > 0.0 { data.bpm } else { DEFAULT_BPM };

        Self {
            duration,
            bpm,
            tracks,
        }
    }

    /// Reads JSON or RON note data, picked by file extension.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path)?;
        let data: NoteData = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("ron") => ron::from_str(&content)?,
            _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        };

        let set = Self::from_data(data);
        info!(
            path = %path.display(),
            tracks = set.tracks.len(),
            notes = set.note_count(),
            duration = set.duration,
            "Loaded note set"
        );
        Ok(set)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn track_by_name(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn track_index(&self, name: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.name == name)
    }

    /// Lowest and highest pitch across every track.
    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let mut pitches = self.tracks.iter().flat_map(|t| t.notes.iter().map(|n| n.pitch));
        let first = pitches.next()?;
        Some(pitches.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }
}

/// Note data as handed over by the transcription collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteData {
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    pub tracks: Vec<TrackData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    pub name: String,
    #[serde(default)]
    pub notes: Vec<NoteInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteInput {
    #[serde(alias = "midi")]
    pub pitch: i64,
    /// Seconds
    pub time: f64,
    /// Seconds
    pub duration: f64,
    #[serde(default = "default_velocity")]
    pub velocity: i64,
}

impl NoteInput {
    fn to_note(&self, track: TrackId) -> Option<Note> {
        let pitch = u8::try_from(self.pitch).ok().filter(|p| *p <= 127)?;
        if !self.time.is_finite() || self.time < 0.0 {
            return None;
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return None;
        }

        Some(Note {
            pitch,
            start: self.time,
            end: self.time + self.duration,
            velocity: self.velocity.clamp(1, 127) as u8,
            track,
        })
    }
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

fn default_velocity() -> i64 {
    100
}

pub fn midi_to_note_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}
