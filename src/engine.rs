use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::audio::{MixerHandle, SynthSink, Timbre, VoiceManager};
use crate::config::Config;
use crate::error::PlaybackError;
use crate::session::PlaybackSession;
use crate::timing::{AudioClock, NoteSet, TransportState};
use crate::ui::{PianoRollView, PlayheadFeed, RenderFrame};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    ResumeAudio,
    Play,
    Pause,
    TogglePlay,
    Stop,
    Seek(f64),
    SeekBy(f64),
    SetTrackVolume { track: String, volume: f32 },
    SetTrackMute { track: String, muted: bool },
    ToggleTrackMute(String),
    TestTrack(String),
    SetTrackTimbre { track: String, timbre: Timbre },
    SetZoom(f64),
    ResetZoom,
    PanBy { dx: f64, dy: f64 },
    /// Scrolls the pitch range of the loaded notes back into the middle
    CenterView,
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    Resize { width: f64, height: f64 },
    LoadNotes(PathBuf),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackStatus {
    pub name: String,
    pub notes: usize,
    pub volume: f32,
    pub muted: bool,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    Loaded {
        tracks: Vec<TrackStatus>,
        duration: f64,
        bpm: f64,
    },
    Tracks(Vec<TrackStatus>),
    PlaybackState(TransportState),
    Redraw(RenderFrame),
    Warning { message: String },
    Error { message: String },
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    pub playhead: PlayheadFeed,
    /// Current volume, mute and timbre per track, for the synthesis side
    pub mixer: MixerHandle,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Engine thread is gone, command dropped");
        }
    }

    /// Stops the engine thread and waits for it.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Engine thread panicked");
            }
        }
    }
}

pub fn spawn_engine<C, S>(config: &Config, notes: NoteSet, clock: C, sink: S) -> EngineHandle
where
    C: AudioClock + Send + 'static,
    S: SynthSink + Send + 'static,
{
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let playhead = PlayheadFeed::new();
    let voices = VoiceManager::new(sink, &config.audio, &config.synth);
    let mixer = voices.mixer();

    let mut view = PianoRollView::new(config.viewport.clone(), playhead.clone());
    view.load(&notes);
    let session = PlaybackSession::new(notes, voices, clock.now());

    let state = EngineState {
        session,
        view,
        clock,
        update_tx,
        tick_interval: config.audio.tick_interval(),
        frame_interval: config.audio.frame_interval(),
    };

    let thread = std::thread::Builder::new()
        .name("midiroll-engine".into())
        .spawn(move || engine_thread(state, command_rx));

    let thread = match thread {
        Ok(thread) => Some(thread),
        Err(e) => {
            error!("Failed to spawn engine thread: {e}");
            None
        }
    };

    EngineHandle {
        command_tx,
        update_rx,
        playhead,
        mixer,
        thread,
    }
}

struct EngineState<C, S: SynthSink> {
    session: PlaybackSession<S>,
    view: PianoRollView,
    clock: C,
    update_tx: Sender<EngineUpdate>,
    tick_interval: Duration,
    frame_interval: Duration,
}

fn engine_thread<C: AudioClock, S: SynthSink>(
    mut state: EngineState<C, S>,
    command_rx: Receiver<EngineCommand>,
) {
    state.announce_load();
    let mut next_frame = Instant::now();

    loop {
        match command_rx.recv_timeout(state.tick_interval) {
            Ok(EngineCommand::Shutdown) => break,
            Ok(command) => {
                state.handle(command);
                let mut shutdown = false;
                for command in command_rx.try_iter() {
                    if matches!(command, EngineCommand::Shutdown) {
                        shutdown = true;
                        break;
                    }
                    state.handle(command);
                }
                if shutdown {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        state.tick();

        let now = Instant::now();
        if now >= next_frame {
            state.frame();
            next_frame = now + state.frame_interval;
        }
    }

    let now = state.clock.now();
    state.session.stop(now);
    info!("Engine stopped");
}

impl<C: AudioClock, S: SynthSink> EngineState<C, S> {
    fn handle(&mut self, command: EngineCommand) {
        debug!(?command, "Engine command");
        let now = self.clock.now();

        match command {
            EngineCommand::ResumeAudio => self.clock.resume(),
            EngineCommand::Play => self.play(),
            EngineCommand::TogglePlay => {
                if self.session.transport().is_playing() {
                    self.session.pause(now);
                    self.transport_changed(now);
                } else {
                    self.play();
                }
            }
            EngineCommand::Pause => {
                self.session.pause(now);
                self.transport_changed(now);
            }
            EngineCommand::Stop => {
                self.session.stop(now);
                self.transport_changed(now);
            }
            EngineCommand::Seek(target) => {
                self.session.seek(target, now);
                self.transport_changed(now);
            }
            EngineCommand::SeekBy(delta) => {
                self.session.seek_by(delta, now);
                self.transport_changed(now);
            }
            EngineCommand::SetTrackVolume { track, volume } => {
                let result = self.session.set_track_volume(&track, volume);
                self.after_track_change(result);
            }
            EngineCommand::SetTrackMute { track, muted } => {
                let result = self.session.set_track_mute(&track, muted, now);
                self.after_track_change(result);
            }
            EngineCommand::ToggleTrackMute(track) => {
                let result = self.session.toggle_track_mute(&track, now).map(|_| ());
                self.after_track_change(result);
            }
            EngineCommand::TestTrack(track) => {
                if let Err(e) = self.session.test_track(&track, now) {
                    self.report_error(e);
                }
            }
            EngineCommand::SetTrackTimbre { track, timbre } => {
                let result = self.session.set_track_timbre(&track, timbre);
                self.after_track_change(result);
            }
            EngineCommand::SetZoom(factor) => {
                self.view.set_zoom(factor);
            }
            EngineCommand::ResetZoom => self.view.reset_zoom(),
            EngineCommand::PanBy { dx, dy } => self.view.pan_by(dx, dy),
            EngineCommand::CenterView => self.view.center_on_notes(self.session.notes()),
            EngineCommand::PointerDown { x, y } => {
                let playhead = self.session.position(now);
                self.view.pointer_down(x, y, playhead);
            }
            EngineCommand::PointerMove { x, y } => self.view.pointer_move(x, y),
            EngineCommand::PointerUp { x, y } => {
                if let Some(target) = self.view.pointer_up(x, y) {
                    self.session.seek(target, now);
                    self.transport_changed(now);
                }
            }
            EngineCommand::Resize { width, height } => self.view.resize(width, height),
            EngineCommand::LoadNotes(path) => match NoteSet::load(&path) {
                Ok(notes) => {
                    self.view.load(&notes);
                    self.session.load(notes, now);
                    self.announce_load();
                    self.transport_changed(now);
                }
                Err(e) => self.send(EngineUpdate::Error {
                    message: format!("Failed to load {}: {e}", path.display()),
                }),
            },
            EngineCommand::Shutdown => {}
        }
    }

    fn play(&mut self) {
        match self.session.play(&self.clock) {
            Ok(()) => self.transport_changed(self.clock.now()),
            Err(e) => self.report_error(e),
        }
    }

    fn tick(&mut self) {
        let report = self.session.tick(self.clock.now());
        if report.reached_end {
            self.transport_changed(self.clock.now());
        }
    }

    fn frame(&mut self) {
        let now = self.clock.now();
        let transport = self.session.transport_state(now);
        let active = self.session.active_notes(now);
        if let Some(frame) = self.view.frame(transport, self.session.tracks(), &active) {
            self.send(EngineUpdate::Redraw(frame));
        }
    }

    fn transport_changed(&mut self, now: f64) {
        self.view.transport_changed();
        self.send(EngineUpdate::PlaybackState(self.session.transport_state(now)));
    }

    fn after_track_change(&mut self, result: Result<(), PlaybackError>) {
        match result {
            Ok(()) => {
                let tracks = self.track_statuses();
                self.send(EngineUpdate::Tracks(tracks));
            }
            Err(e) => self.report_error(e),
        }
    }

    fn announce_load(&self) {
        let missing: Vec<String> = self
            .session
            .tracks()
            .iter()
            .filter(|t| !self.session.voices().has_voice(t.id))
            .map(|t| format!("{} ({})", PlaybackError::MissingVoice { track: t.id }, t.name))
            .collect();
        for message in missing {
            self.send(EngineUpdate::Warning { message });
        }

        let notes = self.session.notes();
        self.send(EngineUpdate::Loaded {
            tracks: self.track_statuses(),
            duration: notes.duration,
            bpm: notes.bpm,
        });
    }

    fn track_statuses(&self) -> Vec<TrackStatus> {
        self.session
            .tracks()
            .iter()
            .map(|t| TrackStatus {
                name: t.name.clone(),
                notes: t.notes.len(),
                volume: t.volume,
                muted: t.muted,
            })
            .collect()
    }

    fn report_error(&self, e: PlaybackError) {
        warn!("{e}");
        self.send(EngineUpdate::Error {
            message: e.to_string(),
        });
    }

    fn send(&self, update: EngineUpdate) {
        let _ = self.update_tx.send(update);
    }
}
