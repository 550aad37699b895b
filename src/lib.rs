pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod timing;
pub mod ui;

pub use config::Config;
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, TrackStatus, spawn_engine};
pub use error::{LoadError, PlaybackError};
pub use session::{PlaybackSession, TickReport};
pub use ui::PianoRollView;
pub use ui::terminal::TerminalApp;
