use std::collections::BTreeSet;

use crate::timing::Track;

/// Pitches sounding at `time`, merged across tracks. Muted tracks still
/// count: this is what the roll highlights, not what is audible.
pub fn active_notes(tracks: &[Track], time: f64) -> BTreeSet<u8> {
    let mut active = BTreeSet::new();
    for track in tracks {
        for note in &track.notes {
            if note.start > time {
                break;
            }
            if note.is_sounding_at(time) {
                active.insert(note.pitch);
            }
        }
    }
    active
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

    #[test]
    fn boundaries_are_inclusive() {
        let tracks = vec![Track::new(0, "Piano", vec![note(60, 0.0, 1.0), note(64, 1.0, 2.0)])];

        assert_eq!(active_notes(&tracks, 0.5), BTreeSet::from([60]));
        assert_eq!(active_notes(&tracks, 1.0), BTreeSet::from([60, 64]));
        assert_eq!(active_notes(&tracks, 1.5), BTreeSet::from([64]));
        assert!(active_notes(&tracks, 2.5).is_empty());
        assert!(active_notes(&tracks, -0.1).is_empty());
    }

    #[test]
    fn merges_tracks() {
        let tracks = vec![
            Track::new(0, "Piano", vec![note(60, 0.0, 4.0)]),
            Track::new(1, "Bass", vec![note(36, 0.0, 4.0), note(60, 1.0, 2.0)]),
        ];
        assert_eq!(active_notes(&tracks, 1.5), BTreeSet::from([36, 60]));
    }

    #[test]
    fn long_note_before_short_ones_is_still_found() {
        let tracks = vec![Track::new(
            0,
            "Pad",
            vec![note(48, 0.0, 10.0), note(72, 1.0, 1.1), note(74, 2.0, 2.1)],
        )];
        assert_eq!(active_notes(&tracks, 5.0), BTreeSet::from([48]));
    }
}
