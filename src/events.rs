use crate::timing::TrackId;

pub type Generation = u64;
pub type VoiceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(pub(crate) u64);

/// Points back at a note inside the loaded note set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteRef {
    pub track_id: TrackId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Trigger {
    // Declaration order matters: a note-off sorts before a note-on due at the
    // same instant.
    NoteOff,
    NoteOn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub note: NoteRef,
    pub trigger: Trigger,
    /// Audio clock time, seconds
    pub fire_at: f64,
    pub handle: EventHandle,
    pub generation: Generation,
}

/// What the synthesis collaborator consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthEvent {
    /// Audio clock time, seconds
    pub clock_time: f64,
    pub track_id: TrackId,
    pub message: SynthMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn {
        voice: VoiceId,
        pitch: u8,
        velocity: u8,
        frequency: f32,
        duration: f64,
    },
    NoteOff {
        voice: VoiceId,
        pitch: u8,
    },
    AllNotesOff,
}
