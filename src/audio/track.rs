use tracing::debug;

use super::{Timbre, Voice};
use crate::events::VoiceId;
use crate::timing::TrackId;

/// A track's polyphonic voice pool and mix settings.
#[derive(Debug, Clone)]
pub struct TrackVoices {
    pub id: TrackId,
    pub name: String,
    pub timbre: Timbre,
    pub volume: f32,
    pub muted: bool,
    max_voices: usize,
    voices: Vec<Voice>,
}

impl TrackVoices {
    pub fn new(id: TrackId, name: impl Into<String>, timbre: Timbre, max_voices: usize) -> Self {
        Self {
            id,
            name: name.into(),
            timbre,
            volume: 1.0,
            muted: false,
            max_voices: max_voices.max(1),
            voices: Vec::new(),
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// Adds a voice. When the pool is full the oldest-triggered voice is
    /// stolen first and returned so its note-off can be sent.
    pub fn start(&mut self, voice: Voice) -> Option<Voice> {
        let stolen = if self.voices.len() >= self.max_voices {
            let oldest = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.age)
                .map(|(idx, _)| idx);
            oldest.map(|idx| self.voices.remove(idx))
        } else {
            None
        };

        if let Some(stolen) = &stolen {
            debug!(
                track = %self.name,
                pitch = stolen.pitch,
                cap = self.max_voices,
                "Voice pool full, stealing oldest voice"
            );
        }

        self.voices.push(voice);
        stolen
    }

    /// Releases the voice with this id, if it is still sounding.
    pub fn release(&mut self, voice: VoiceId) -> Option<Voice> {
        let idx = self.voices.iter().position(|v| v.id == voice)?;
        Some(self.voices.remove(idx))
    }

    pub fn release_expired(&mut self, now: f64) -> Vec<Voice> {
        let (expired, kept): (Vec<Voice>, Vec<Voice>) =
            self.voices.drain(..).partition(|v| v.is_expired(now));
        self.voices = kept;
        expired
    }

    pub fn release_all(&mut self) -> Vec<Voice> {
        std::mem::take(&mut self.voices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: u64, pitch: u8, age: u64, release_at: f64) -> Voice {
        Voice {
            id,
            pitch,
            velocity: 100,
            started_at: 0.0,
            release_at,
            age,
        }
    }

    #[test]
    fn full_pool_steals_the_oldest_voice() {
        let mut pool = TrackVoices::new(0, "Piano", Timbre::default(), 2);
        assert_eq!(pool.start(voice(1, 60, 5, 1.0)), None);
        assert_eq!(pool.start(voice(2, 62, 3, 1.0)), None);

        let stolen = pool.start(voice(3, 64, 7, 1.0)).unwrap();
        assert_eq!(stolen.id, 2);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn release_targets_one_voice_even_when_pitches_overlap() {
        let mut pool = TrackVoices::new(0, "Piano", Timbre::default(), 8);
        pool.start(voice(1, 60, 0, 2.0));
        pool.start(voice(2, 60, 1, 1.5));
        pool.start(voice(3, 64, 2, 1.0));

        assert_eq!(pool.release(2).map(|v| v.id), Some(2));
        assert_eq!(pool.release(2), None);
        assert_eq!(pool.voices()[0].id, 1);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn expired_voices_are_released() {
        let mut pool = TrackVoices::new(0, "Piano", Timbre::default(), 8);
        pool.start(voice(1, 60, 0, 1.0));
        pool.start(voice(2, 62, 1, 2.0));

        let expired = pool.release_expired(1.0);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, 1);
        assert_eq!(pool.voices()[0].id, 2);
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        let pool = TrackVoices::new(0, "Piano", Timbre::default(), 0);
        assert_eq!(pool.max_voices(), 1);
    }
}
