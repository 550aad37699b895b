use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::timing::TransportStatus;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayheadFrame {
    /// Seconds
    pub position: f64,
    pub status: TransportStatus,
    pub frame: u64,
}

impl Default for PlayheadFrame {
    fn default() -> Self {
        Self {
            position: 0.0,
            status: TransportStatus::Stopped,
            frame: 0,
        }
    }
}

/// Latest playhead, shared with whoever paints it.
#[derive(Debug, Clone, Default)]
pub struct PlayheadFeed(Arc<RwLock<PlayheadFrame>>);

impl PlayheadFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> PlayheadFrame {
        *self.0.read()
    }

    fn publish(&self, frame: PlayheadFrame) {
        *self.0.write() = frame;
    }
}

/// Republishes the transport position once per display frame while playing
/// or while the playhead is dragged, then goes idle.
#[derive(Debug)]
pub struct SyncLoop {
    feed: PlayheadFeed,
    running: bool,
    dragging: bool,
    frame: u64,
}

impl SyncLoop {
    pub fn new(feed: PlayheadFeed) -> Self {
        Self {
            feed,
            running: false,
            dragging: false,
            frame: 0,
        }
    }

    pub fn feed(&self) -> &PlayheadFeed {
        &self.feed
    }

    pub fn start(&mut self) {
        if !self.running {
            trace!(frame = self.frame, "Sync loop started");
            self.running = true;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
        if dragging {
            self.start();
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Publishes one frame. The first frame that sees neither playback nor a
    /// drag is published too, and is the last one until `start()`.
    pub fn on_frame(&mut self, position: f64, status: TransportStatus) -> Option<PlayheadFrame> {
        if !self.running {
            return None;
        }

        self.frame += 1;
        let published = PlayheadFrame {
            position,
            status,
            frame: self.frame,
        };
        self.feed.publish(published);

        if status != TransportStatus::Playing && !self.dragging {
            trace!(frame = self.frame, ?status, "Sync loop stopped");
            self.running = false;
        }
        Some(published)
    }
}
