use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timing::{DEFAULT_BPM, NoteSet};

pub const PITCH_COUNT: u8 = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f64,
    pub height: f64,
    pub key_column_width: f64,
    pub row_height: f64,
    pub beats_per_bar: u32,
    pub bars_visible: u32,
    pub default_zoom: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    /// Side of the square playhead grab handle
    pub handle_size: f64,
    pub min_note_width: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 600.0,
            key_column_width: 400.0,
            row_height: 20.0,
            beats_per_bar: 4,
            bars_visible: 16,
            default_zoom: 1.95,
            zoom_min: 0.1,
            zoom_max: 10.0,
            handle_size: 12.0,
            min_note_width: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub zoom: f64,
    /// Always <= 0
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// What sits under the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerTarget {
    Playhead,
    KeyColumn { pitch: u8 },
    Grid { time: f64, pitch: u8 },
}

/// Maps between seconds/pitches and viewport pixels.
#[derive(Debug, Clone)]
pub struct ViewportMapper {
    config: ViewportConfig,
    state: ViewportState,
    seconds_per_beat: f64,
    duration: f64,
}

impl ViewportMapper {
    pub fn new(config: ViewportConfig) -> Self {
        let state = ViewportState {
            zoom: config.default_zoom.clamp(config.zoom_min, config.zoom_max),
            scroll_x: 0.0,
            scroll_y: 0.0,
        };
        Self {
            config,
            state,
            seconds_per_beat: 60.0 / DEFAULT_BPM,
            duration: 0.0,
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn seconds_per_beat(&self) -> f64 {
        self.seconds_per_beat
    }

    /// Resets scrolling for a new note set and centres its pitch range.
    /// Zoom is kept.
    pub fn load(&mut self, notes: &NoteSet) {
        self.seconds_per_beat = notes.seconds_per_beat();
        self.duration = notes.duration;
        self.state.scroll_x = 0.0;
        self.center_on_notes(notes);

        debug!(
            scroll_y = self.state.scroll_y,
            zoom = self.state.zoom,
            "Viewport reset for new notes"
        );
    }

    /// Scrolls vertically so the notes' pitch midpoint sits mid-viewport.
    /// Clamping happens after centering.
    pub fn center_on_notes(&mut self, notes: &NoteSet) {
        self.state.scroll_y = match notes.pitch_range() {
            Some((low, high)) => {
                let mid = (low as f64 + high as f64) / 2.0;
                (127.0 - mid) * self.config.row_height - self.config.height / 2.0
            }
            None => 0.0,
        };
        self.clamp_scroll();
    }

    pub fn pixels_per_beat(&self) -> f64 {
        let beats = (self.config.bars_visible.max(1) * self.config.beats_per_bar.max(1)) as f64;
        self.grid_width() * self.state.zoom / beats
    }

    pub fn time_to_x(&self, time: f64) -> f64 {
        (time / self.seconds_per_beat) * self.pixels_per_beat()
            + self.state.scroll_x
            + self.config.key_column_width
    }

    pub fn x_to_time(&self, x: f64) -> f64 {
        (x - self.state.scroll_x - self.config.key_column_width) / self.pixels_per_beat()
            * self.seconds_per_beat
    }

    /// Top edge of the pitch's row.
    pub fn pitch_to_y(&self, pitch: u8) -> f64 {
        (127.0 - pitch as f64) * self.config.row_height - self.state.scroll_y
    }

    pub fn y_to_pitch(&self, y: f64) -> u8 {
        let pitch = 127.0 - (y + self.state.scroll_y) / self.config.row_height;
        pitch.round().clamp(0.0, 127.0) as u8
    }

    /// Multiplies the zoom, clamped to the configured range. Returns the new
    /// zoom.
    pub fn set_zoom(&mut self, factor: f64) -> f64 {
        if !factor.is_finite() || factor <= 0.0 {
            debug!(factor, "Ignoring zoom factor");
            return self.state.zoom;
        }

        let wanted = self.state.zoom * factor;
        self.state.zoom = wanted.clamp(self.config.zoom_min, self.config.zoom_max);
        if self.state.zoom != wanted {
            debug!(wanted, zoom = self.state.zoom, "Zoom clamped");
        }
        self.clamp_scroll();
        self.state.zoom
    }

    pub fn reset_zoom(&mut self) {
        self.state.zoom = 1.0_f64.clamp(self.config.zoom_min, self.config.zoom_max);
        self.clamp_scroll();
    }

    /// Moves the view by a pixel delta. Dragging right (positive `dx`) shows
    /// later time; positive `dy` shows lower pitches.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() {
            self.state.scroll_x -= dx;
        }
        if dy.is_finite() {
            self.state.scroll_y += dy;
        }
        self.clamp_scroll();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.config.width = width.max(self.config.key_column_width + 1.0);
        self.config.height = height.max(self.config.row_height);
        self.clamp_scroll();
    }

    /// Time under the pointer, clamped to the note set.
    pub fn pointer_to_time(&self, px: f64) -> f64 {
        self.x_to_time(px).clamp(0.0, self.duration.max(0.0))
    }

    pub fn pointer_to_pitch(&self, py: f64) -> u8 {
        self.y_to_pitch(py)
    }

    pub fn hit_test(&self, px: f64, py: f64, playhead: f64) -> PointerTarget {
        let handle = self.config.handle_size;
        let playhead_x = self.time_to_x(playhead);
        if (px - playhead_x).abs() <= handle / 2.0 && (0.0..=handle).contains(&py) {
            return PointerTarget::Playhead;
        }

        let pitch = self.pointer_to_pitch(py);
        if px < self.config.key_column_width {
            PointerTarget::KeyColumn { pitch }
        } else {
            PointerTarget::Grid {
                time: self.pointer_to_time(px),
                pitch,
            }
        }
    }

    pub fn grid_width(&self) -> f64 {
        (self.config.width - self.config.key_column_width).max(0.0)
    }

    pub fn content_width(&self) -> f64 {
        let shown = (self.config.bars_visible * self.config.beats_per_bar) as f64;
        let beats = shown.max(self.duration / self.seconds_per_beat);
        beats * self.pixels_per_beat()
    }

    pub fn min_scroll_x(&self) -> f64 {
        (self.grid_width() - self.content_width()).min(0.0)
    }

    pub fn max_scroll_y(&self) -> f64 {
        (PITCH_COUNT as f64 * self.config.row_height - self.config.height).max(0.0)
    }

    /// Seconds shown between the key column and the right edge.
    pub fn visible_time_range(&self) -> (f64, f64) {
        (
            self.x_to_time(self.config.key_column_width),
            self.x_to_time(self.config.width),
        )
    }

    /// Lowest and highest pitch with any part of their row on screen.
    pub fn visible_pitch_range(&self) -> (u8, u8) {
        let row = self.config.row_height;
        let top = 127.0 - (self.state.scroll_y / row).floor();
        let bottom = 127.0 - ((self.state.scroll_y + self.config.height) / row).ceil() + 1.0;
        (
            bottom.clamp(0.0, 127.0) as u8,
            top.clamp(0.0, 127.0) as u8,
        )
    }

    fn clamp_scroll(&mut self) {
        self.state.scroll_x = self.state.scroll_x.clamp(self.min_scroll_x(), 0.0);
        self.state.scroll_y = self.state.scroll_y.clamp(0.0, self.max_scroll_y());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{Note, Track};

    fn notes(pitches: &[u8], duration: f64) -> NoteSet {
        let notes = pitches
            .iter()
            .enumerate()
            .map(|(i, &pitch)| Note {
                pitch,
                start: i as f64,
                end: i as f64 + 1.0,
                velocity: 100,
                track: 0,
            })
            .collect();
        NoteSet {
            duration,
            bpm: 120.0,
            tracks: vec![Track::new(0, "Piano", notes)],
        }
    }

    fn mapper() -> ViewportMapper {
        ViewportMapper::new(ViewportConfig::default())
    }

    #[test]
    fn time_and_x_are_inverse() {
        let mut view = mapper();
        view.load(&notes(&[60], 120.0));
        view.pan_by(350.0, 0.0);
        view.set_zoom(1.3);

        for t in [0.0, 0.25, 3.7, 59.9] {
            assert!((view.x_to_time(view.time_to_x(t)) - t).abs() < 1e-9);
        }
    }

    #[test]
    fn pitch_and_y_are_inverse() {
        let mut view = mapper();
        view.pan_by(0.0, 123.0);
        for p in 0..=127u8 {
            assert_eq!(view.y_to_pitch(view.pitch_to_y(p)), p);
        }
        assert_eq!(view.y_to_pitch(-10_000.0), 127);
        assert_eq!(view.y_to_pitch(10_000.0), 0);
    }

    #[test]
    fn default_layout_matches_the_classic_roll() {
        let view = mapper();
        // (2000 - 400) * 1.95 / 64
        assert!((view.pixels_per_beat() - 48.75).abs() < 1e-9);
        assert_eq!(view.time_to_x(0.0), 400.0);
        assert_eq!(view.pitch_to_y(127), 0.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut view = mapper();
        assert_eq!(view.set_zoom(50.0 / 1.95), 10.0);
        assert_eq!(view.set_zoom(1e-6), 0.1);
        assert_eq!(view.set_zoom(f64::NAN), 0.1);
        view.reset_zoom();
        assert_eq!(view.state().zoom, 1.0);
    }

    #[test]
    fn pan_keeps_scroll_in_bounds() {
        let mut view = mapper();
        view.load(&notes(&[60], 300.0));

        view.pan_by(-500.0, 0.0);
        assert_eq!(view.state().scroll_x, 0.0);

        view.pan_by(1e9, 1e9);
        assert_eq!(view.state().scroll_x, view.min_scroll_x());
        assert!(view.state().scroll_x <= 0.0);
        assert_eq!(view.state().scroll_y, 128.0 * 20.0 - 600.0);

        view.pan_by(0.0, -1e9);
        assert_eq!(view.state().scroll_y, 0.0);
    }

    #[test]
    fn zooming_out_pulls_scroll_back() {
        let mut view = mapper();
        view.load(&notes(&[60], 300.0));
        view.pan_by(1e9, 0.0);
        let far = view.state().scroll_x;

        view.set_zoom(0.1);
        assert!(view.state().scroll_x > far);
        assert!(view.state().scroll_x >= view.min_scroll_x());
    }

    #[test]
    fn load_centres_pitch_range_and_keeps_zoom() {
        let mut view = mapper();
        view.set_zoom(2.0);
        let zoom = view.state().zoom;
        view.pan_by(100.0, 0.0);

        view.load(&notes(&[48, 72], 10.0));
        // (127 - 60) * 20 - 300
        assert_eq!(view.state().scroll_y, 1040.0);
        assert_eq!(view.state().scroll_x, 0.0);
        assert_eq!(view.state().zoom, zoom);

        view.load(&notes(&[127], 10.0));
        assert_eq!(view.state().scroll_y, 0.0);

        view.load(&NoteSet::default());
        assert_eq!(view.state().scroll_y, 0.0);
    }

    #[test]
    fn center_on_notes_recentres_without_touching_time_or_zoom() {
        let mut view = mapper();
        let set = notes(&[48, 72], 60.0);
        view.load(&set);
        view.set_zoom(3.0);
        view.pan_by(400.0, 500.0);
        let state = view.state();
        assert!(state.scroll_x < 0.0);
        assert_ne!(state.scroll_y, 1040.0);

        view.center_on_notes(&set);
        assert_eq!(view.state().scroll_y, 1040.0);
        assert_eq!(view.state().scroll_x, state.scroll_x);
        assert_eq!(view.state().zoom, state.zoom);

        // the bottom of the range clamps to the last scrollable row
        view.center_on_notes(&notes(&[0], 60.0));
        assert_eq!(view.state().scroll_y, view.max_scroll_y());
    }

    #[test]
    fn pointer_time_is_clamped_to_duration() {
        let mut view = mapper();
        view.load(&notes(&[60], 4.0));
        assert_eq!(view.pointer_to_time(0.0), 0.0);
        assert_eq!(view.pointer_to_time(1999.0), 4.0);
        let x = view.time_to_x(1.5);
        assert!((view.pointer_to_time(x) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn hit_test_finds_handle_keys_and_grid() {
        let mut view = mapper();
        view.load(&notes(&[60], 8.0));
        let playhead_x = view.time_to_x(2.0);

        assert_eq!(view.hit_test(playhead_x + 5.0, 4.0, 2.0), PointerTarget::Playhead);
        assert!(matches!(
            view.hit_test(playhead_x + 5.0, 40.0, 2.0),
            PointerTarget::Grid { .. }
        ));

        let y = view.pitch_to_y(64);
        assert_eq!(view.hit_test(10.0, y, 2.0), PointerTarget::KeyColumn { pitch: 64 });
    }

    #[test]
    fn resize_reclamps_vertical_scroll() {
        let mut view = mapper();
        view.pan_by(0.0, 1e9);
        view.resize(2000.0, 2000.0);
        assert_eq!(view.state().scroll_y, 560.0);
        view.resize(2000.0, 5000.0);
        assert_eq!(view.state().scroll_y, 0.0);
    }

    #[test]
    fn visible_pitch_range_follows_scroll() {
        let mut view = mapper();
        assert_eq!(view.visible_pitch_range(), (98, 127));
        view.pan_by(0.0, 40.0);
        assert_eq!(view.visible_pitch_range(), (96, 125));
    }
}
