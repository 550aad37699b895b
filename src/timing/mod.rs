mod clock;
mod scheduler;
mod sequence;
mod transport;

pub use clock::{AudioClock, ClockState, ManualClock, SystemClock};
pub use scheduler::{ArmReport, LookAheadScheduler};
pub use sequence::{
    DEFAULT_BPM, Note, NoteData, NoteInput, NoteSet, Track, TrackData, TrackId, midi_to_note_name,
};
pub use transport::{SeekOutcome, TransportClock, TransportEvent, TransportState, TransportStatus};
