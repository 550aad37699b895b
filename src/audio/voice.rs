use crate::events::VoiceId;

/// One sounding note inside a track's pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: VoiceId,
    pub pitch: u8,
    pub velocity: u8,
    /// Audio clock time the voice was triggered at
    pub started_at: f64,
    /// Audio clock time the voice releases on its own
    pub release_at: f64,
    /// Global trigger order, used to pick the voice to steal
    pub age: u64,
}

impl Voice {
    pub fn is_expired(&self, now: f64) -> bool {
        self.release_at <= now
    }
}
