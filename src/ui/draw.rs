use std::collections::BTreeSet;
use std::ops::{BitOr, BitOrAssign};

use tracing::trace;

use super::{PlayheadFrame, ViewportMapper, ViewportState};
use crate::timing::{Track, TrackId, midi_to_note_name};

/// Parts of the roll that need repainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    pub const NONE: Self = Self(0);
    pub const NOTES: Self = Self(1);
    pub const PLAYHEAD: Self = Self(1 << 1);
    pub const KEYS: Self = Self(1 << 2);
    pub const GRID: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Collects redraw requests and hands them out at most once per frame.
#[derive(Debug, Default)]
pub struct DrawScheduler {
    pending: DirtyFlags,
    last_frame: Option<u64>,
}

impl DrawScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, flags: DirtyFlags) {
        self.pending |= flags;
    }

    pub fn pending(&self) -> DirtyFlags {
        self.pending
    }

    /// Returns everything marked since the last redraw. A second call within
    /// the same frame gets nothing; its marks wait for the next frame.
    pub fn take(&mut self, frame: u64) -> Option<DirtyFlags> {
        if self.pending.is_empty() || self.last_frame == Some(frame) {
            return None;
        }
        self.last_frame = Some(frame);
        Some(std::mem::take(&mut self.pending))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Hsl {
    /// Pitch picks the hue, velocity brightens.
    pub fn for_note(pitch: u8, velocity: u8) -> Self {
        Self {
            hue: (pitch as f64 * 2.8) % 360.0,
            saturation: 90.0,
            lightness: 50.0 + 20.0 * velocity as f64 / 127.0,
        }
    }

    pub fn to_rgb(self) -> (u8, u8, u8) {
        let s = self.saturation / 100.0;
        let l = self.lightness / 100.0;
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = self.hue / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        (channel(r), channel(g), channel(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridLineKind {
    Bar,
    Beat,
    Sixteenth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLine {
    pub x: f64,
    pub kind: GridLineKind,
    /// Bar number, 1-based
    pub label: Option<String>,
    /// `m:ss` at bars and beats
    pub time_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyRow {
    pub pitch: u8,
    pub y: f64,
    pub height: f64,
    pub black: bool,
    pub active: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRect {
    pub track_id: TrackId,
    pub pitch: u8,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Hsl,
    pub active: bool,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayheadMarker {
    pub x: f64,
    pub position: f64,
    pub handle_size: f64,
    pub label: String,
}

/// Everything needed to paint one frame, already culled to the viewport.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawList {
    pub width: f64,
    pub height: f64,
    pub key_column_width: f64,
    pub viewport: Option<ViewportState>,
    pub grid: Vec<GridLine>,
    pub keys: Vec<KeyRow>,
    pub notes: Vec<NoteRect>,
    pub playhead: Option<PlayheadMarker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub frame: u64,
    pub dirty: DirtyFlags,
    pub playhead: PlayheadFrame,
    pub draw: DrawList,
}

/// Sixteenth lines are left out when they would be closer than this.
const MIN_SIXTEENTH_SPACING: f64 = 6.0;

pub fn build_draw_list(
    mapper: &ViewportMapper,
    tracks: &[Track],
    active: &BTreeSet<u8>,
    playhead: f64,
) -> DrawList {
    let config = mapper.config();
    let mut list = DrawList {
        width: config.width,
        height: config.height,
        key_column_width: config.key_column_width,
        viewport: Some(mapper.state()),
        ..DrawList::default()
    };

    grid_lines(mapper, &mut list.grid);

    let (low, high) = mapper.visible_pitch_range();
    list.keys = (low..=high)
        .rev()
        .map(|pitch| KeyRow {
            pitch,
            y: mapper.pitch_to_y(pitch),
            height: config.row_height,
            black: is_black_key(pitch),
            active: active.contains(&pitch),
            label: (pitch % 12 == 0).then(|| midi_to_note_name(pitch)),
        })
        .collect();

    for track in tracks {
        for note in &track.notes {
            let x = mapper.time_to_x(note.start);
            if x >= config.width {
                break;
            }
            let width = (mapper.time_to_x(note.end) - x).max(config.min_note_width);
            let y = mapper.pitch_to_y(note.pitch);
            if x + width <= config.key_column_width
                || y + config.row_height <= 0.0
                || y >= config.height
            {
                continue;
            }
            list.notes.push(NoteRect {
                track_id: track.id,
                pitch: note.pitch,
                x,
                y,
                width,
                height: config.row_height,
                color: Hsl::for_note(note.pitch, note.velocity),
                active: note.is_sounding_at(playhead),
                muted: track.muted,
            });
        }
    }

    let x = mapper.time_to_x(playhead);
    if (config.key_column_width..=config.width).contains(&x) {
        list.playhead = Some(PlayheadMarker {
            x,
            position: playhead,
            handle_size: config.handle_size,
            label: format!("{:.1}s", (playhead * 10.0).floor() / 10.0),
        });
    }

    trace!(
        grid = list.grid.len(),
        keys = list.keys.len(),
        notes = list.notes.len(),
        "Built draw list"
    );
    list
}

fn grid_lines(mapper: &ViewportMapper, out: &mut Vec<GridLine>) {
    let config = mapper.config();
    let beats_per_bar = config.beats_per_bar.max(1) as i64;
    let ppb = mapper.pixels_per_beat();
    if ppb <= 0.0 {
        return;
    }

    let spb = mapper.seconds_per_beat();
    let (start, end) = mapper.visible_time_range();
    let content_beats = (mapper.content_width() / ppb).ceil() as i64;
    let first = ((start / spb).floor() as i64).max(0);
    let last = ((end / spb).ceil() as i64).min(content_beats);
    let sixteenths = ppb / 4.0 >= MIN_SIXTEENTH_SPACING;

    for beat in first..=last {
        let time = beat as f64 * spb;
        let x = mapper.time_to_x(time);
        let on_bar = beat % beats_per_bar == 0;

        if (config.key_column_width..=config.width).contains(&x) {
            out.push(GridLine {
                x,
                kind: if on_bar { GridLineKind::Bar } else { GridLineKind::Beat },
                label: on_bar.then(|| format!("{}", beat / beats_per_bar + 1)),
                time_label: Some(format_clock(time)),
            });
        }

        if sixteenths && beat < last {
            for step in 1..4 {
                let x = x + step as f64 * ppb / 4.0;
                if (config.key_column_width..=config.width).contains(&x) {
                    out.push(GridLine {
                        x,
                        kind: GridLineKind::Sixteenth,
                        label: None,
                        time_label: None,
                    });
                }
            }
        }
    }
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
