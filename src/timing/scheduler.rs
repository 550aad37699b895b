use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{Track, TrackId};
use crate::error::PlaybackError;
use crate::events::{EventHandle, Generation, NoteRef, ScheduledEvent, Trigger};

/// Timer queue ordering: microsecond fire time, note-offs first, then
/// insertion order.
type TimerKey = (u64, Trigger, u64);

fn micros(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1_000_000.0).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArmReport {
    pub generation: Generation,
    pub scheduled: usize,
    /// Tracks skipped because they have no voice
    pub skipped: Vec<TrackId>,
}

/// Turns a note list plus a transport position into timed trigger events.
///
/// Every `arm` opens a new generation and every event belongs to exactly one.
/// The previous generation is cancelled before any handle of the next one is
/// created, and since the queue only ever holds the live generation, nothing
/// stale can come out of `poll`.
#[derive(Debug, Default)]
pub struct LookAheadScheduler {
    generation: Generation,
    next_handle: u64,
    queue: BTreeMap<TimerKey, ScheduledEvent>,
}

impl LookAheadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_armed(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn live_events(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.queue.values()
    }

    /// Schedules every note of every unmuted track starting at or after
    /// `from_time`, relative to the audio clock reading `clock_now`.
    pub fn arm(
        &mut self,
        tracks: &[Track],
        from_time: f64,
        clock_now: f64,
        has_voice: impl Fn(TrackId) -> bool,
    ) -> ArmReport {
        self.arm_inner(tracks, from_time, clock_now, None, has_voice)
    }

    /// Re-arms after `toggled` changed mute state, once every event due at
    /// `clock_now` has been polled. Other tracks only get notes firing
    /// strictly after `clock_now`, so nothing already dispatched comes back;
    /// `toggled` is armed from `from_time` inclusive like `arm`.
    pub fn rearm_for_track(
        &mut self,
        tracks: &[Track],
        toggled: TrackId,
        from_time: f64,
        clock_now: f64,
        has_voice: impl Fn(TrackId) -> bool,
    ) -> ArmReport {
        self.arm_inner(tracks, from_time, clock_now, Some(toggled), has_voice)
    }

    fn arm_inner(
        &mut self,
        tracks: &[Track],
        from_time: f64,
        clock_now: f64,
        toggled: Option<TrackId>,
        has_voice: impl Fn(TrackId) -> bool,
    ) -> ArmReport {
        self.disarm();
        self.generation += 1;

        let polled_through = micros(clock_now);
        let mut skipped = Vec::new();
        for track in tracks.iter().filter(|t| !t.muted) {
            if !has_voice(track.id) {
                let err = PlaybackError::MissingVoice { track: track.id };
                warn!(track = %track.name, "{err}, skipping its notes");
                skipped.push(track.id);
                continue;
            }

            let continuing = toggled.is_some_and(|id| id != track.id);
            let first = track.first_note_from(from_time);
            for (index, note) in track.notes.iter().enumerate().skip(first) {
                let on_at = clock_now + (note.start - from_time);
                if continuing && micros(on_at) <= polled_through {
                    continue;
                }
                let note_ref = NoteRef {
                    track_id: track.id,
                    index,
                };
                self.push(note_ref, Trigger::NoteOn, on_at);
                self.push(note_ref, Trigger::NoteOff, clock_now + (note.end - from_time));
            }
        }

        debug!(
            generation = self.generation,
            from_time,
            events = self.queue.len(),
            "Armed scheduler"
        );

        ArmReport {
            generation: self.generation,
            scheduled: self.queue.len(),
            skipped,
        }
    }

    /// Cancels every live event. Returns how many were dropped.
    pub fn disarm(&mut self) -> usize {
        let cancelled = self.queue.len();
        self.queue.clear();
        if cancelled > 0 {
            debug!(generation = self.generation, cancelled, "Disarmed scheduler");
        }
        cancelled
    }

    /// Removes and returns every event due at or before `now`, in firing order.
    pub fn poll(&mut self, now: f64) -> Vec<ScheduledEvent> {
        let not_due = self.queue.split_off(&(micros(now) + 1, Trigger::NoteOff, 0));
        let due = std::mem::replace(&mut self.queue, not_due);

        due.into_values()
            .inspect(|event| debug_assert_eq!(event.generation, self.generation))
            .collect()
    }

    fn push(&mut self, note: NoteRef, trigger: Trigger, fire_at: f64) {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;

        self.queue.insert(
            (micros(fire_at), trigger, handle.0),
            ScheduledEvent {
                note,
                trigger,
                fire_at,
                handle,
                generation: self.generation,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Note;

    fn note(pitch: u8, start: f64, end: f64) -> Note {
        Note {
            pitch,
            start,
            end,
            velocity: 100,
            track: 0,
        }
    }

    fn tracks() -> Vec<Track> {
        vec![
            Track::new(0, "Piano", vec![note(60, 0.0, 1.0), note(64, 1.0, 2.0)]),
            Track::new(1, "Drums", vec![note(36, 0.5, 0.6), note(38, 1.5, 1.6)]),
        ]
    }

    #[test]
    fn arms_note_on_and_off_for_every_note() {
        let mut scheduler = LookAheadScheduler::new();
        let report = scheduler.arm(&tracks(), 0.0, 10.0, |_| true);

        assert_eq!(report.generation, 1);
        assert_eq!(report.scheduled, 8);
        assert!(report.skipped.is_empty());

        let first = scheduler.poll(10.0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].trigger, Trigger::NoteOn);
        assert_eq!(first[0].note, NoteRef { track_id: 0, index: 0 });
    }

    #[test]
    fn arming_mid_sequence_skips_earlier_starts() {
        let mut scheduler = LookAheadScheduler::new();
        scheduler.arm(&tracks(), 1.0, 0.0, |_| true);

        let events: Vec<_> = scheduler.poll(100.0);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.note.index == 1));
        // 64 starts exactly at the arm position
        assert_eq!(events[0].fire_at, 0.0);
    }

    #[test]
    fn note_off_fires_before_note_on_at_the_same_instant() {
        let mut scheduler = LookAheadScheduler::new();
        scheduler.arm(&tracks()[..1], 0.0, 0.0, |_| true);

        let events = scheduler.poll(1.0);
        let triggers: Vec<_> = events.iter().map(|e| (e.note.index, e.trigger)).collect();
        assert_eq!(
            triggers,
            vec![(0, Trigger::NoteOn), (0, Trigger::NoteOff), (1, Trigger::NoteOn)]
        );
    }

    #[test]
    fn rearming_invalidates_the_previous_generation() {
        let mut scheduler = LookAheadScheduler::new();
        scheduler.arm(&tracks(), 0.0, 0.0, |_| true);
        let report = scheduler.arm(&tracks(), 1.5, 0.0, |_| true);
        assert_eq!(report.generation, 2);

        let events = scheduler.poll(100.0);
        assert!(events.iter().all(|e| e.generation == 2));
        // only the drum hit at 1.5 is left
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn disarm_cancels_everything() {
        let mut scheduler = LookAheadScheduler::new();
        scheduler.arm(&tracks(), 0.0, 0.0, |_| true);
        assert_eq!(scheduler.disarm(), 8);
        assert!(!scheduler.is_armed());
        assert!(scheduler.poll(100.0).is_empty());
    }

    #[test]
    fn muted_tracks_and_missing_voices_are_skipped() {
        let mut tracks = tracks();
        tracks[1].muted = true;

        let mut scheduler = LookAheadScheduler::new();
        let report = scheduler.arm(&tracks, 0.0, 0.0, |_| true);
        assert_eq!(report.scheduled, 4);
        assert!(scheduler.live_events().all(|e| e.note.track_id == 0));

        tracks[1].muted = false;
        let report = scheduler.arm(&tracks, 0.0, 0.0, |id| id != 0);
        assert_eq!(report.skipped, vec![0]);
        assert!(scheduler.live_events().all(|e| e.note.track_id == 1));
    }

    #[test]
    fn rearm_for_track_keeps_dispatched_notes_out() {
        let mut scheduler = LookAheadScheduler::new();
        let mut tracks = vec![
            Track::new(0, "Piano", vec![note(60, 0.0, 1.0), note(64, 1.0, 2.0)]),
            Track::new(1, "Drums", vec![note(36, 1.0, 1.1), note(38, 1.5, 1.6)]),
        ];
        tracks[1].muted = true;
        scheduler.arm(&tracks, 0.0, 0.0, |_| true);
        assert_eq!(scheduler.poll(1.0).len(), 3);

        // the piano note at 1.0 already fired; the unmuted drums start from 1.0
        tracks[1].muted = false;
        let report = scheduler.rearm_for_track(&tracks, 1, 1.0, 1.0, |_| true);
        assert_eq!(report.generation, 2);
        let events: Vec<_> = scheduler.live_events().map(|e| (e.note, e.trigger)).collect();
        assert_eq!(
            events,
            vec![
                (NoteRef { track_id: 1, index: 0 }, Trigger::NoteOn),
                (NoteRef { track_id: 1, index: 0 }, Trigger::NoteOff),
                (NoteRef { track_id: 1, index: 1 }, Trigger::NoteOn),
                (NoteRef { track_id: 1, index: 1 }, Trigger::NoteOff),
            ]
        );
    }

    #[test]
    fn poll_leaves_future_events_queued() {
        let mut scheduler = LookAheadScheduler::new();
        scheduler.arm(&tracks(), 0.0, 0.0, |_| true);

        assert_eq!(scheduler.poll(0.55).len(), 2);
        assert_eq!(scheduler.pending(), 6);
        assert!(scheduler.poll(0.55).is_empty());
    }
}
