use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, trace, warn};

use crate::audio::{SynthSink, Timbre, VoiceManager};
use crate::error::PlaybackError;
use crate::events::{NoteRef, ScheduledEvent, Trigger, VoiceId};
use crate::timing::{
    AudioClock, LookAheadScheduler, NoteSet, Track, TrackId, TransportClock, TransportEvent,
    TransportState,
};
use crate::ui::active_notes;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub note_ons: usize,
    pub note_offs: usize,
    /// Voices that ran out on their own
    pub expired: usize,
    pub reached_end: bool,
    pub position: f64,
}

/// The playback controls: transport, scheduler and voices kept in step.
pub struct PlaybackSession<S: SynthSink> {
    notes: NoteSet,
    transport: TransportClock,
    scheduler: LookAheadScheduler,
    voices: VoiceManager<S>,
    /// Voice each armed note-on started, so its note-off releases that voice
    sounding: HashMap<NoteRef, VoiceId>,
}

impl<S: SynthSink> PlaybackSession<S> {
    pub fn new(notes: NoteSet, mut voices: VoiceManager<S>, now: f64) -> Self {
        voices.rebuild(&notes.tracks, now);
        Self {
            transport: TransportClock::new(notes.duration, notes.bpm),
            notes,
            scheduler: LookAheadScheduler::new(),
            voices,
            sounding: HashMap::new(),
        }
    }

    /// Replaces the note set. Playback stops.
    pub fn load(&mut self, notes: NoteSet, now: f64) {
        self.silence(now);
        self.transport.load(notes.duration, notes.bpm);
        self.voices.rebuild(&notes.tracks, now);
        info!(
            tracks = notes.tracks.len(),
            notes = notes.note_count(),
            "Session loaded"
        );
        self.notes = notes;
    }

    pub fn notes(&self) -> &NoteSet {
        &self.notes
    }

    pub fn tracks(&self) -> &[Track] {
        &self.notes.tracks
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn scheduler(&self) -> &LookAheadScheduler {
        &self.scheduler
    }

    pub fn voices(&self) -> &VoiceManager<S> {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceManager<S> {
        &mut self.voices
    }

    pub fn play(&mut self, clock: &dyn AudioClock) -> Result<(), PlaybackError> {
        if self.transport.is_playing() {
            return Ok(());
        }
        self.transport.play(clock)?;
        self.arm(clock.now());
        Ok(())
    }

    pub fn pause(&mut self, now: f64) {
        self.transport.pause(now);
        self.silence(now);
    }

    pub fn stop(&mut self, now: f64) {
        self.transport.stop();
        self.silence(now);
    }

    /// Moves the playhead. Returns the clamped position.
    pub fn seek(&mut self, target: f64, now: f64) -> f64 {
        let outcome = self.transport.seek(target, now);
        if outcome.rearm {
            // their note-offs are about to be cancelled
            self.voices.release_all(now);
            self.arm(now);
        }
        outcome.position
    }

    pub fn seek_by(&mut self, delta: f64, now: f64) -> f64 {
        let target = self.transport.position_at(now) + delta;
        self.seek(target, now)
    }

    pub fn set_track_volume(&mut self, name: &str, volume: f32) -> Result<(), PlaybackError> {
        let idx = self.track_index(name)?;
        self.voices.set_volume(&mut self.notes.tracks[idx], volume);
        Ok(())
    }

    pub fn set_track_mute(
        &mut self,
        name: &str,
        muted: bool,
        now: f64,
    ) -> Result<(), PlaybackError> {
        let idx = self.track_index(name)?;
        if self.notes.tracks[idx].muted == muted {
            return Ok(());
        }
        let playing = self.transport.is_playing();
        if playing {
            // events due before the toggle still belong to the old mix
            let report = self.dispatch(now);
            trace!(
                note_ons = report.note_ons,
                note_offs = report.note_offs,
                "Dispatched before mute"
            );
        }
        self.voices.set_mute(&mut self.notes.tracks[idx], muted);

        if playing {
            if muted {
                self.voices.release_track(idx, now);
            }
            self.sounding.clear();
            let from = self.transport.position_at(now);
            let report = self.scheduler.rearm_for_track(&self.notes.tracks, idx, from, now, |id| {
                self.voices.has_voice(id)
            });
            debug!(
                track = name,
                muted,
                generation = report.generation,
                scheduled = report.scheduled,
                "Session re-armed for mute"
            );
        }
        Ok(())
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_track_mute(&mut self, name: &str, now: f64) -> Result<bool, PlaybackError> {
        let idx = self.track_index(name)?;
        let muted = !self.notes.tracks[idx].muted;
        self.set_track_mute(name, muted, now)?;
        Ok(muted)
    }

    pub fn test_track(&mut self, name: &str, now: f64) -> Result<VoiceId, PlaybackError> {
        let idx = self.track_index(name)?;
        self.voices.test(idx, now)
    }

    pub fn set_track_timbre(&mut self, name: &str, timbre: Timbre) -> Result<(), PlaybackError> {
        let idx = self.track_index(name)?;
        self.voices.set_timbre(idx, timbre)
    }

    pub fn position(&self, now: f64) -> f64 {
        self.transport.position_at(now)
    }

    pub fn transport_state(&self, now: f64) -> TransportState {
        self.transport.state(now)
    }

    /// Pitches to highlight; nothing is highlighted unless playing.
    pub fn active_notes(&self, now: f64) -> BTreeSet<u8> {
        if !self.transport.is_playing() {
            return BTreeSet::new();
        }
        active_notes(&self.notes.tracks, self.transport.position_at(now))
    }

    /// Fires due events, expires voices and applies the end-of-timeline stop.
    pub fn tick(&mut self, now: f64) -> TickReport {
        let mut report = self.dispatch(now);
        report.expired = self.voices.advance(now);

        if let Some(TransportEvent::ReachedEnd) = self.transport.update(now) {
            self.silence(now);
            report.reached_end = true;
        }
        report.position = self.transport.position_at(now);
        report
    }

    fn dispatch(&mut self, now: f64) -> TickReport {
        let mut report = TickReport::default();
        for event in self.scheduler.poll(now) {
            match event.trigger {
                Trigger::NoteOn if self.note_on(&event) => report.note_ons += 1,
                Trigger::NoteOff if self.note_off(&event) => report.note_offs += 1,
                _ => {}
            }
        }
        report
    }

    fn note_on(&mut self, event: &ScheduledEvent) -> bool {
        let track_id = event.note.track_id;
        let Some(note) = self
            .notes
            .tracks
            .get(track_id)
            .and_then(|t| t.notes.get(event.note.index))
        else {
            return false;
        };

        match self
            .voices
            .trigger(track_id, note.pitch, note.velocity, note.duration(), event.fire_at)
        {
            Ok(Some(voice)) => {
                self.sounding.insert(event.note, voice);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(%err, "Dropping note-on");
                false
            }
        }
    }

    fn note_off(&mut self, event: &ScheduledEvent) -> bool {
        self.sounding
            .remove(&event.note)
            .is_some_and(|voice| self.voices.release(event.note.track_id, voice, event.fire_at))
    }

    fn track_index(&self, name: &str) -> Result<TrackId, PlaybackError> {
        self.notes
            .track_index(name)
            .ok_or_else(|| PlaybackError::UnknownTrack(name.to_string()))
    }

    fn arm(&mut self, now: f64) {
        self.sounding.clear();
        let from = self.transport.position_at(now);
        let report = self
            .scheduler
            .arm(&self.notes.tracks, from, now, |id| self.voices.has_voice(id));
        debug!(
            generation = report.generation,
            scheduled = report.scheduled,
            skipped = report.skipped.len(),
            "Session armed"
        );
    }

    fn silence(&mut self, now: f64) {
        self.scheduler.disarm();
        self.sounding.clear();
        self.voices.release_all(now);
    }
}
