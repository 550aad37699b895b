use std::sync::Arc;

use arc_swap::ArcSwap;
use ringbuf::traits::Producer;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{Timbre, TrackVoices, Voice, midi_to_freq};
use crate::config::{AudioConfig, SynthConfig};
use crate::error::PlaybackError;
use crate::events::{SynthEvent, SynthMessage, VoiceId};
use crate::timing::{Track, TrackId};

pub type EventProducer = ringbuf::HeapProd<SynthEvent>;
pub type EventConsumer = ringbuf::HeapCons<SynthEvent>;

/// Where voice events go. A full sink hands the event back.
pub trait SynthSink {
    fn send(&mut self, event: SynthEvent) -> Result<(), SynthEvent>;
}

impl SynthSink for EventProducer {
    fn send(&mut self, event: SynthEvent) -> Result<(), SynthEvent> {
        self.try_push(event)
    }
}

impl SynthSink for Vec<SynthEvent> {
    fn send(&mut self, event: SynthEvent) -> Result<(), SynthEvent> {
        self.push(event);
        Ok(())
    }
}

/// The note `test()` auditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewNote {
    pub pitch: u8,
    pub velocity: u8,
    /// Seconds
    pub duration: f64,
}

impl Default for PreviewNote {
    fn default() -> Self {
        Self {
            pitch: 60,
            velocity: 100,
            duration: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackMix {
    pub track_id: TrackId,
    pub name: String,
    /// 0.0 -> 1.0
    pub volume: f32,
    pub muted: bool,
    pub timbre: Timbre,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MixSnapshot {
    pub master_gain_db: f32,
    pub tracks: Vec<TrackMix>,
}

impl MixSnapshot {
    /// Linear output gain for a track, master gain included.
    pub fn gain(&self, track_id: TrackId) -> Option<f32> {
        let master = 10f32.powf(self.master_gain_db / 20.0);
        self.tracks
            .iter()
            .find(|t| t.track_id == track_id)
            .map(|t| t.volume * master)
    }
}

/// Lock-free view of the current mix for the synthesis side.
#[derive(Debug, Clone)]
pub struct MixerHandle(Arc<ArcSwap<MixSnapshot>>);

impl MixerHandle {
    fn new(snapshot: MixSnapshot) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(snapshot)))
    }

    pub fn snapshot(&self) -> Arc<MixSnapshot> {
        self.0.load_full()
    }

    fn store(&self, snapshot: MixSnapshot) {
        self.0.store(Arc::new(snapshot));
    }
}

/// Owns one voice pool per track and turns triggers into synth events.
pub struct VoiceManager<S: SynthSink> {
    pools: Vec<Option<TrackVoices>>,
    sink: S,
    mixer: MixerHandle,
    synth: SynthConfig,
    max_voices: usize,
    preview: PreviewNote,
    next_voice: VoiceId,
    next_age: u64,
}

impl<S: SynthSink> VoiceManager<S> {
    pub fn new(sink: S, audio: &AudioConfig, synth: &SynthConfig) -> Self {
        Self {
            pools: Vec::new(),
            sink,
            mixer: MixerHandle::new(MixSnapshot {
                master_gain_db: synth.master_gain_db,
                tracks: Vec::new(),
            }),
            synth: synth.clone(),
            max_voices: audio.max_voices_per_track,
            preview: audio.preview.clone(),
            next_voice: 0,
            next_age: 0,
        }
    }

    /// Drops every pool and builds one per track. Tracks whose timbre cannot
    /// be played get no voice.
    pub fn rebuild(&mut self, tracks: &[Track], at: f64) {
        for pool in self.pools.iter().flatten() {
            emit(
                &mut self.sink,
                SynthEvent {
                    clock_time: at,
                    track_id: pool.id,
                    message: SynthMessage::AllNotesOff,
                },
            );
        }

        self.pools = tracks
            .iter()
            .map(|track| {
                let timbre = self.synth.timbre_for(&track.name);
                if !timbre.is_playable(&self.synth.sample_library) {
                    warn!(
                        track = %track.name,
                        ?timbre.instrument,
                        "Instrument unavailable, track has no voice"
                    );
                    return None;
                }
                let mut pool = TrackVoices::new(track.id, &track.name, timbre, self.max_voices);
                pool.volume = track.volume;
                pool.muted = track.muted;
                Some(pool)
            })
            .collect();

        self.publish_mix();
    }

    pub fn has_voice(&self, track_id: TrackId) -> bool {
        self.pool(track_id).is_some()
    }

    pub fn mixer(&self) -> MixerHandle {
        self.mixer.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn active_voices(&self, track_id: TrackId) -> usize {
        self.pool(track_id).map_or(0, |p| p.active_count())
    }

    pub fn is_muted(&self, track_id: TrackId) -> bool {
        self.pool(track_id).is_some_and(|p| p.muted)
    }

    /// Starts a voice that releases itself after `duration`. Returns `None`
    /// when the track is muted.
    pub fn trigger(
        &mut self,
        track_id: TrackId,
        pitch: u8,
        velocity: u8,
        duration: f64,
        at: f64,
    ) -> Result<Option<VoiceId>, PlaybackError> {
        if self.pool(track_id).ok_or(PlaybackError::MissingVoice { track: track_id })?.muted {
            trace!(track_id, pitch, "Track muted, trigger suppressed");
            return Ok(None);
        }
        self.start_voice(track_id, pitch, velocity, duration, at).map(Some)
    }

    /// Plays the preview note on a track, muted or not.
    pub fn test(&mut self, track_id: TrackId, at: f64) -> Result<VoiceId, PlaybackError> {
        let PreviewNote {
            pitch,
            velocity,
            duration,
        } = self.preview.clone();
        self.start_voice(track_id, pitch, velocity, duration, at)
    }

    /// Releases one voice started by `trigger`. False if it already ended,
    /// was stolen or was released with its track.
    pub fn release(&mut self, track_id: TrackId, voice: VoiceId, at: f64) -> bool {
        let Some(pool) = self.pools.get_mut(track_id).and_then(Option::as_mut) else {
            return false;
        };
        match pool.release(voice) {
            Some(voice) => {
                emit(&mut self.sink, note_off(track_id, &voice, at));
                true
            }
            None => false,
        }
    }

    pub fn release_track(&mut self, track_id: TrackId, at: f64) -> usize {
        let Some(pool) = self.pools.get_mut(track_id).and_then(Option::as_mut) else {
            return 0;
        };
        let released = pool.release_all();
        for voice in &released {
            emit(&mut self.sink, note_off(track_id, voice, at));
        }
        released.len()
    }

    pub fn release_all(&mut self, at: f64) -> usize {
        (0..self.pools.len())
            .map(|track_id| self.release_track(track_id, at))
            .sum()
    }

    /// Releases voices whose own duration has run out.
    pub fn advance(&mut self, now: f64) -> usize {
        let mut released = 0;
        for pool in self.pools.iter_mut().flatten() {
            for voice in pool.release_expired(now) {
                emit(&mut self.sink, note_off(pool.id, &voice, voice.release_at));
                released += 1;
            }
        }
        released
    }

    pub fn set_volume(&mut self, track: &mut Track, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        track.volume = volume;
        if let Some(pool) = self.pools.get_mut(track.id).and_then(Option::as_mut) {
            pool.volume = volume;
        }
        debug!(track = %track.name, volume, "Track volume");
        self.publish_mix();
    }

    pub fn set_mute(&mut self, track: &mut Track, muted: bool) {
        track.muted = muted;
        if let Some(pool) = self.pools.get_mut(track.id).and_then(Option::as_mut) {
            pool.muted = muted;
        }
        debug!(track = %track.name, muted, "Track mute");
        self.publish_mix();
    }

    /// Swaps a track's timbre. Sounding voices keep their note; the
    /// synthesis side picks the new timbre up from the next snapshot.
    pub fn set_timbre(&mut self, track_id: TrackId, timbre: Timbre) -> Result<(), PlaybackError> {
        if !timbre.is_playable(&self.synth.sample_library) {
            warn!(track_id, ?timbre.instrument, "Instrument unavailable, timbre unchanged");
            return Err(PlaybackError::UnplayableTimbre { track: track_id });
        }
        let pool = self
            .pools
            .get_mut(track_id)
            .and_then(Option::as_mut)
            .ok_or(PlaybackError::MissingVoice { track: track_id })?;
        debug!(track = %pool.name, ?timbre.instrument, "Track timbre");
        pool.timbre = timbre;
        self.publish_mix();
        Ok(())
    }

    fn pool(&self, track_id: TrackId) -> Option<&TrackVoices> {
        self.pools.get(track_id).and_then(Option::as_ref)
    }

    fn start_voice(
        &mut self,
        track_id: TrackId,
        pitch: u8,
        velocity: u8,
        duration: f64,
        at: f64,
    ) -> Result<VoiceId, PlaybackError> {
        let pool = self
            .pools
            .get_mut(track_id)
            .and_then(Option::as_mut)
            .ok_or(PlaybackError::MissingVoice { track: track_id })?;

        let voice = Voice {
            id: self.next_voice,
            pitch,
            velocity,
            started_at: at,
            release_at: at + duration.max(0.0),
            age: self.next_age,
        };
        self.next_voice += 1;
        self.next_age += 1;

        if let Some(stolen) = pool.start(voice.clone()) {
            emit(&mut self.sink, note_off(track_id, &stolen, at));
        }

        emit(
            &mut self.sink,
            SynthEvent {
                clock_time: at,
                track_id,
                message: SynthMessage::NoteOn {
                    voice: voice.id,
                    pitch,
                    velocity,
                    frequency: midi_to_freq(pitch),
                    duration,
                },
            },
        );
        Ok(voice.id)
    }

    fn publish_mix(&self) {
        let tracks = self
            .pools
            .iter()
            .flatten()
            .map(|pool| TrackMix {
                track_id: pool.id,
                name: pool.name.clone(),
                volume: pool.volume,
                muted: pool.muted,
                timbre: pool.timbre.clone(),
            })
            .collect();

        self.mixer.store(MixSnapshot {
            master_gain_db: self.synth.master_gain_db,
            tracks,
        });
    }
}

fn note_off(track_id: TrackId, voice: &Voice, at: f64) -> SynthEvent {
    SynthEvent {
        clock_time: at,
        track_id,
        message: SynthMessage::NoteOff {
            voice: voice.id,
            pitch: voice.pitch,
        },
    }
}

fn emit<S: SynthSink>(sink: &mut S, event: SynthEvent) {
    if let Err(event) = sink.send(event) {
        warn!(?event, "Synth event buffer full, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Instrument;
    use crate::timing::Note;
    use ringbuf::HeapRb;
    use ringbuf::traits::{Consumer, Split};

    fn tracks() -> Vec<Track> {
        let note = Note {
            pitch: 60,
            start: 0.0,
            end: 1.0,
            velocity: 100,
            track: 0,
        };
        vec![
            Track::new(0, "Piano", vec![note]),
            Track::new(1, "Drums", vec![note]),
        ]
    }

    fn manager(max_voices: usize) -> VoiceManager<Vec<SynthEvent>> {
        let audio = AudioConfig {
            max_voices_per_track: max_voices,
            ..AudioConfig::default()
        };
        let mut voices = VoiceManager::new(Vec::new(), &audio, &SynthConfig::default());
        voices.rebuild(&tracks(), 0.0);
        voices
    }

    fn note_ons(events: &[SynthEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e.message, SynthMessage::NoteOn { .. }))
            .count()
    }

    #[test]
    fn trigger_emits_note_on_with_frequency() {
        let mut voices = manager(4);
        let id = voices.trigger(0, 69, 90, 0.5, 1.0).unwrap();
        assert!(id.is_some());

        let event = voices.sink().last().unwrap();
        assert_eq!(event.clock_time, 1.0);
        match &event.message {
            SynthMessage::NoteOn {
                pitch, frequency, ..
            } => {
                assert_eq!(*pitch, 69);
                assert!((frequency - 440.0).abs() < 1e-3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cap_steals_oldest_voice() {
        let mut voices = manager(2);
        let first = voices.trigger(0, 60, 100, 10.0, 0.0).unwrap().unwrap();
        voices.trigger(0, 62, 100, 10.0, 0.1).unwrap();
        voices.trigger(0, 64, 100, 10.0, 0.2).unwrap();

        assert_eq!(voices.active_voices(0), 2);
        let stolen = voices
            .sink()
            .iter()
            .find(|e| matches!(e.message, SynthMessage::NoteOff { .. }))
            .unwrap();
        assert_eq!(
            stolen.message,
            SynthMessage::NoteOff {
                voice: first,
                pitch: 60
            }
        );
    }

    #[test]
    fn mute_suppresses_new_triggers_only() {
        let mut voices = manager(8);
        let mut tracks = tracks();
        voices.trigger(1, 36, 100, 5.0, 0.0).unwrap();

        voices.set_mute(&mut tracks[1], true);
        assert!(tracks[1].muted);
        assert!(voices.is_muted(1));
        assert_eq!(voices.trigger(1, 38, 100, 5.0, 0.1).unwrap(), None);
        assert_eq!(voices.active_voices(1), 1);
        assert_eq!(note_ons(voices.sink()), 1);
    }

    #[test]
    fn test_plays_the_preview_note_even_when_muted() {
        let mut voices = manager(8);
        let mut tracks = tracks();
        voices.set_mute(&mut tracks[0], true);

        voices.test(0, 2.0).unwrap();
        assert_eq!(voices.active_voices(0), 1);
        assert_eq!(voices.advance(2.49), 0);
        assert_eq!(voices.advance(2.5), 1);
        assert_eq!(voices.active_voices(0), 0);
    }

    #[test]
    fn volume_is_clamped_and_published() {
        let mut voices = manager(8);
        let mut tracks = tracks();
        let mixer = voices.mixer();

        voices.set_volume(&mut tracks[0], 1.7);
        assert_eq!(tracks[0].volume, 1.0);

        voices.set_volume(&mut tracks[0], 0.25);
        let snapshot = mixer.snapshot();
        assert_eq!(snapshot.tracks[0].volume, 0.25);
        let expected = 0.25 * 10f32.powf(snapshot.master_gain_db / 20.0);
        assert!((snapshot.gain(0).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn unplayable_timbre_leaves_track_without_voice() {
        let mut synth = SynthConfig::default();
        synth.track_timbres.insert(
            "Drums".into(),
            Timbre {
                instrument: Instrument::Sampler {
                    sample_id: "missing".into(),
                    root_pitch: 36,
                },
                adsr: Default::default(),
            },
        );
        let mut voices = VoiceManager::new(Vec::new(), &AudioConfig::default(), &synth);
        voices.rebuild(&tracks(), 0.0);

        assert!(voices.has_voice(0));
        assert!(!voices.has_voice(1));
        assert_eq!(
            voices.trigger(1, 36, 100, 0.1, 0.0),
            Err(PlaybackError::MissingVoice { track: 1 })
        );
        assert_eq!(voices.mixer().snapshot().tracks.len(), 1);
    }

    #[test]
    fn release_all_sends_one_note_off_per_voice() {
        let mut voices = manager(8);
        let piano = voices.trigger(0, 60, 100, 5.0, 0.0).unwrap().unwrap();
        voices.trigger(1, 36, 100, 5.0, 0.0).unwrap();
        voices.sink_mut().clear();

        assert_eq!(voices.release_all(1.0), 2);
        assert_eq!(voices.sink().len(), 2);
        assert!(!voices.release(0, piano, 1.0));
    }

    #[test]
    fn release_stops_only_the_given_voice() {
        let mut voices = manager(8);
        let long = voices.trigger(0, 60, 100, 2.0, 0.0).unwrap().unwrap();
        let short = voices.trigger(0, 60, 100, 0.5, 1.0).unwrap().unwrap();
        voices.sink_mut().clear();

        assert!(voices.release(0, short, 1.5));
        assert_eq!(
            voices.sink()[0].message,
            SynthMessage::NoteOff {
                voice: short,
                pitch: 60
            }
        );
        assert_eq!(voices.active_voices(0), 1);
        assert!(!voices.release(0, short, 1.6));
        assert!(voices.release(0, long, 2.0));
    }

    #[test]
    fn set_timbre_publishes_and_rejects_missing_samples() {
        let mut voices = manager(8);
        let sampler = Timbre {
            instrument: Instrument::Sampler {
                sample_id: "kick".into(),
                root_pitch: 36,
            },
            adsr: Default::default(),
        };
        assert_eq!(
            voices.set_timbre(1, sampler),
            Err(PlaybackError::UnplayableTimbre { track: 1 })
        );
        assert_eq!(voices.mixer().snapshot().tracks[1].timbre, Timbre::default());

        let square = Timbre {
            instrument: Instrument::MultiOsc {
                oscillators: vec![crate::audio::OscConfig {
                    wave: crate::audio::Wave::Square,
                    gain: 0.5,
                    semitone: 0,
                }],
            },
            adsr: Default::default(),
        };
        voices.set_timbre(1, square.clone()).unwrap();
        assert_eq!(voices.mixer().snapshot().tracks[1].timbre, square);
    }

    #[test]
    fn ring_buffer_sink_drops_when_full() {
        let (producer, mut consumer) = HeapRb::<SynthEvent>::new(1).split();
        let mut voices =
            VoiceManager::new(producer, &AudioConfig::default(), &SynthConfig::default());
        voices.rebuild(&tracks(), 0.0);

        voices.trigger(0, 60, 100, 1.0, 0.0).unwrap();
        voices.trigger(0, 62, 100, 1.0, 0.0).unwrap();

        assert!(consumer.try_pop().is_some());
        assert!(consumer.try_pop().is_none());
        assert_eq!(voices.active_voices(0), 2);
    }
}
