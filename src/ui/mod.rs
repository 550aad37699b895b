mod active;
mod draw;
mod piano_roll;
mod sync;
pub mod terminal;

use std::collections::BTreeSet;

use tracing::debug;

pub use active::active_notes;
pub use draw::{
    DirtyFlags, DrawList, DrawScheduler, GridLine, GridLineKind, Hsl, KeyRow, NoteRect,
    PlayheadMarker, RenderFrame, build_draw_list, format_clock, is_black_key,
};
pub use piano_roll::{PITCH_COUNT, PointerTarget, ViewportConfig, ViewportMapper, ViewportState};
pub use sync::{PlayheadFeed, PlayheadFrame, SyncLoop};

use crate::timing::{NoteSet, Track, TransportState};

/// Pointer travel below this still counts as a click.
const CLICK_SLOP: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Playhead { preview: f64 },
    Grid { origin: (f64, f64), last: (f64, f64), moved: bool },
}

/// The viewport controls plus pointer gestures, producing one render frame
/// per display frame when something changed.
pub struct PianoRollView {
    mapper: ViewportMapper,
    sync: SyncLoop,
    draw: DrawScheduler,
    gesture: Option<Gesture>,
    frame: u64,
    last_active: BTreeSet<u8>,
}

impl PianoRollView {
    pub fn new(config: ViewportConfig, feed: PlayheadFeed) -> Self {
        let mut draw = DrawScheduler::new();
        draw.mark(DirtyFlags::ALL);
        Self {
            mapper: ViewportMapper::new(config),
            sync: SyncLoop::new(feed),
            draw,
            gesture: None,
            frame: 0,
            last_active: BTreeSet::new(),
        }
    }

    pub fn mapper(&self) -> &ViewportMapper {
        &self.mapper
    }

    pub fn feed(&self) -> &PlayheadFeed {
        self.sync.feed()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_running()
    }

    pub fn load(&mut self, notes: &NoteSet) {
        self.mapper.load(notes);
        self.gesture = None;
        self.sync.set_dragging(false);
        self.sync.start();
        self.draw.mark(DirtyFlags::ALL);
    }

    /// Call after any transport change so the playhead gets republished.
    pub fn transport_changed(&mut self) {
        self.sync.start();
        self.draw.mark(DirtyFlags::PLAYHEAD | DirtyFlags::KEYS);
    }

    pub fn set_zoom(&mut self, factor: f64) -> f64 {
        let zoom = self.mapper.set_zoom(factor);
        self.draw.mark(DirtyFlags::GRID | DirtyFlags::NOTES | DirtyFlags::PLAYHEAD);
        zoom
    }

    pub fn reset_zoom(&mut self) {
        self.mapper.reset_zoom();
        self.draw.mark(DirtyFlags::GRID | DirtyFlags::NOTES | DirtyFlags::PLAYHEAD);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.mapper.pan_by(dx, dy);
        self.draw.mark(DirtyFlags::ALL);
    }

    pub fn center_on_notes(&mut self, notes: &NoteSet) {
        self.mapper.center_on_notes(notes);
        self.draw.mark(DirtyFlags::NOTES | DirtyFlags::KEYS | DirtyFlags::PLAYHEAD);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.mapper.resize(width, height);
        self.draw.mark(DirtyFlags::ALL);
    }

    pub fn pointer_to_time(&self, px: f64) -> f64 {
        self.mapper.pointer_to_time(px)
    }

    pub fn pointer_to_pitch(&self, py: f64) -> u8 {
        self.mapper.pointer_to_pitch(py)
    }

    pub fn pointer_down(&mut self, px: f64, py: f64, playhead: f64) -> PointerTarget {
        let target = self.mapper.hit_test(px, py, playhead);
        self.gesture = match target {
            PointerTarget::Playhead => {
                self.sync.set_dragging(true);
                Some(Gesture::Playhead { preview: playhead })
            }
            PointerTarget::Grid { .. } => Some(Gesture::Grid {
                origin: (px, py),
                last: (px, py),
                moved: false,
            }),
            PointerTarget::KeyColumn { .. } => None,
        };
        debug!(?target, "Pointer down");
        target
    }

    pub fn pointer_move(&mut self, px: f64, py: f64) {
        match &mut self.gesture {
            Some(Gesture::Playhead { preview }) => {
                *preview = self.mapper.pointer_to_time(px);
                self.draw.mark(DirtyFlags::PLAYHEAD);
            }
            Some(Gesture::Grid {
                origin,
                last,
                moved,
            }) => {
                if !*moved && (px - origin.0).hypot(py - origin.1) < CLICK_SLOP {
                    return;
                }
                *moved = true;
                let (dx, dy) = (px - last.0, py - last.1);
                *last = (px, py);
                // content follows the pointer
                self.mapper.pan_by(-dx, -dy);
                self.draw.mark(DirtyFlags::ALL);
            }
            None => {}
        }
    }

    /// Ends a gesture. Returns the position to seek to, if the gesture was a
    /// playhead drag or a click on the grid.
    pub fn pointer_up(&mut self, px: f64, _py: f64) -> Option<f64> {
        match self.gesture.take()? {
            Gesture::Playhead { preview } => {
                self.sync.set_dragging(false);
                self.draw.mark(DirtyFlags::PLAYHEAD);
                Some(preview)
            }
            Gesture::Grid { moved: false, .. } => Some(self.mapper.pointer_to_time(px)),
            Gesture::Grid { moved: true, .. } => None,
        }
    }

    /// Runs one display frame.
    pub fn frame(
        &mut self,
        transport: TransportState,
        tracks: &[Track],
        active: &BTreeSet<u8>,
    ) -> Option<RenderFrame> {
        self.frame += 1;

        let position = match self.gesture {
            Some(Gesture::Playhead { preview }) => preview,
            _ => transport.position,
        };
        if self.sync.on_frame(position, transport.status).is_some() {
            self.draw.mark(DirtyFlags::PLAYHEAD);
        }
        if *active != self.last_active {
            self.last_active = active.clone();
            self.draw.mark(DirtyFlags::KEYS | DirtyFlags::NOTES);
        }

        let dirty = self.draw.take(self.frame)?;
        let playhead = self.sync.feed().read();
        Some(RenderFrame {
            frame: self.frame,
            dirty,
            playhead,
            draw: build_draw_list(&self.mapper, tracks, active, playhead.position),
        })
    }
}
