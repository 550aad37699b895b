use std::io::{self, Write, stdout};
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{cursor, execute, queue};
use tracing::{info, warn};

use super::{DrawList, GridLineKind, RenderFrame, format_clock};
use crate::engine::{EngineCommand, EngineHandle, EngineUpdate, TrackStatus};
use crate::timing::{TransportState, TransportStatus};

/// Viewport pixels per terminal column
pub const CELL_WIDTH: f64 = 16.0;
/// Viewport pixels per terminal row, one pitch per row with the default layout
pub const CELL_HEIGHT: f64 = 20.0;

const SEEK_STEP: f64 = 5.0;
const ZOOM_IN: f64 = 1.25;
const ZOOM_OUT: f64 = 0.8;
const PAN_X: f64 = 80.0;
const PAN_Y: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Engine(Vec<EngineCommand>),
    Quit,
    Ignore,
}

/// Key bindings. The first key press also resumes audio, since the audio
/// clock only starts from a user gesture.
pub fn key_action(code: KeyCode, tracks: &[TrackStatus], audio_resumed: bool) -> InputAction {
    let command = match code {
        KeyCode::Char('q') | KeyCode::Esc => return InputAction::Quit,
        KeyCode::Char(' ') => EngineCommand::TogglePlay,
        KeyCode::Char('s') => EngineCommand::Stop,
        KeyCode::Left => EngineCommand::SeekBy(-SEEK_STEP),
        KeyCode::Right => EngineCommand::SeekBy(SEEK_STEP),
        KeyCode::Char('+') | KeyCode::Char('=') => EngineCommand::SetZoom(ZOOM_IN),
        KeyCode::Char('-') => EngineCommand::SetZoom(ZOOM_OUT),
        KeyCode::Char('0') => EngineCommand::ResetZoom,
        KeyCode::Char('c') => EngineCommand::CenterView,
        KeyCode::Char('h') => EngineCommand::PanBy { dx: -PAN_X, dy: 0.0 },
        KeyCode::Char('l') => EngineCommand::PanBy { dx: PAN_X, dy: 0.0 },
        KeyCode::Char('j') => EngineCommand::PanBy { dx: 0.0, dy: PAN_Y },
        KeyCode::Char('k') => EngineCommand::PanBy { dx: 0.0, dy: -PAN_Y },
        KeyCode::Char(c @ '1'..='9') => {
            let idx = c as usize - '1' as usize;
            match tracks.get(idx) {
                Some(track) => EngineCommand::ToggleTrackMute(track.name.clone()),
                None => return InputAction::Ignore,
            }
        }
        KeyCode::Char('t') => match tracks.first() {
            Some(track) => EngineCommand::TestTrack(track.name.clone()),
            None => return InputAction::Ignore,
        },
        _ => return InputAction::Ignore,
    };

    if audio_resumed {
        InputAction::Engine(vec![command])
    } else {
        InputAction::Engine(vec![EngineCommand::ResumeAudio, command])
    }
}

/// Terminal cell to the viewport pixel at its centre. Row 0 is the status
/// line.
pub fn cell_to_pixel(column: u16, row: u16) -> (f64, f64) {
    let x = column as f64 * CELL_WIDTH + CELL_WIDTH / 2.0;
    let y = row.saturating_sub(1) as f64 * CELL_HEIGHT + CELL_HEIGHT / 4.0;
    (x, y)
}

pub fn mouse_command(mouse: MouseEvent) -> Option<EngineCommand> {
    if mouse.row == 0 {
        return None;
    }
    let (x, y) = cell_to_pixel(mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => Some(EngineCommand::PointerDown { x, y }),
        MouseEventKind::Drag(MouseButton::Left) => Some(EngineCommand::PointerMove { x, y }),
        MouseEventKind::Up(MouseButton::Left) => Some(EngineCommand::PointerUp { x, y }),
        MouseEventKind::ScrollDown => Some(EngineCommand::PanBy { dx: 0.0, dy: CELL_HEIGHT }),
        MouseEventKind::ScrollUp => Some(EngineCommand::PanBy { dx: 0.0, dy: -CELL_HEIGHT }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
}

const BLANK: Cell = Cell {
    ch: ' ',
    fg: Color::Grey,
    bg: Color::Rgb { r: 30, g: 30, b: 30 },
};

/// Character grid the draw list is rasterised into.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub cols: u16,
    pub rows: u16,
    cells: Vec<Cell>,
}

impl Canvas {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            cells: vec![BLANK; cols as usize * rows as usize],
        }
    }

    pub fn get(&self, col: u16, row: u16) -> Option<&Cell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }

    fn set(&mut self, col: i64, row: i64, cell: Cell) {
        if col < 0 || row < 0 || col >= self.cols as i64 || row >= self.rows as i64 {
            return;
        }
        let idx = row as usize * self.cols as usize + col as usize;
        self.cells[idx] = cell;
    }

    fn text(&mut self, col: i64, row: i64, text: &str, fg: Color, bg: Color) {
        for (i, ch) in text.chars().enumerate() {
            self.set(col + i as i64, row, Cell { ch, fg, bg });
        }
    }

    pub fn row_text(&self, row: u16) -> String {
        (0..self.cols)
            .filter_map(|col| self.get(col, row).map(|c| c.ch))
            .collect()
    }

    /// Rasterises the draw list below the status line.
    pub fn paint(&mut self, draw: &DrawList) {
        self.cells.fill(BLANK);
        let column = |x: f64| (x / CELL_WIDTH).floor() as i64;
        let row = |y: f64| (y / CELL_HEIGHT).floor() as i64 + 1;
        let key_cols = column(draw.key_column_width);

        for line in &draw.grid {
            let (ch, fg) = match line.kind {
                GridLineKind::Bar => ('│', Color::Rgb { r: 102, g: 102, b: 102 }),
                GridLineKind::Beat => ('┊', Color::Rgb { r: 68, g: 68, b: 68 }),
                GridLineKind::Sixteenth => continue,
            };
            let col = column(line.x);
            for r in 1..self.rows as i64 {
                self.set(col, r, Cell { ch, fg, bg: BLANK.bg });
            }
            if let Some(label) = &line.label {
                self.text(col + 1, 1, label, Color::Rgb { r: 136, g: 136, b: 136 }, BLANK.bg);
            }
        }

        for note in &draw.notes {
            let (r, g, b) = note.color.to_rgb();
            let fg = if note.muted {
                Color::Rgb { r: r / 3, g: g / 3, b: b / 3 }
            } else {
                Color::Rgb { r, g, b }
            };
            let ch = if note.active { '▓' } else { '█' };
            let first = column(note.x).max(key_cols);
            let last = column(note.x + note.width - 0.001).max(first);
            for col in first..=last {
                self.set(col, row(note.y), Cell { ch, fg, bg: BLANK.bg });
            }
        }

        for key in &draw.keys {
            let bg = match (key.active, key.black) {
                (true, _) => Color::Rgb { r: 255, g: 200, b: 60 },
                (false, true) => Color::Rgb { r: 20, g: 20, b: 20 },
                (false, false) => Color::Rgb { r: 200, g: 200, b: 200 },
            };
            let fg = if key.black && !key.active { Color::White } else { Color::Black };
            let r = row(key.y);
            for col in 0..key_cols {
                self.set(col, r, Cell { ch: ' ', fg, bg });
            }
            if let Some(label) = &key.label {
                self.text(key_cols - label.len() as i64 - 1, r, label, fg, bg);
            }
        }

        if let Some(playhead) = &draw.playhead {
            let col = column(playhead.x);
            let red = Color::Rgb { r: 255, g: 68, b: 68 };
            self.set(col, 1, Cell { ch: '▼', fg: red, bg: BLANK.bg });
            for r in 2..self.rows as i64 {
                self.set(col, r, Cell { ch: '│', fg: red, bg: BLANK.bg });
            }
        }
    }

    pub fn status(&mut self, line: &str) {
        let bg = Color::Rgb { r: 50, g: 50, b: 70 };
        for col in 0..self.cols as i64 {
            self.set(col, 0, Cell { ch: ' ', fg: Color::White, bg });
        }
        self.text(0, 0, line, Color::White, bg);
    }

    pub fn flush(&self, out: &mut impl Write) -> io::Result<()> {
        for row in 0..self.rows {
            queue!(out, cursor::MoveTo(0, row))?;
            for col in 0..self.cols {
                if let Some(cell) = self.get(col, row) {
                    queue!(
                        out,
                        SetForegroundColor(cell.fg),
                        SetBackgroundColor(cell.bg),
                        Print(cell.ch)
                    )?;
                }
            }
        }
        queue!(out, ResetColor)?;
        out.flush()
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(stdout(), DisableMouseCapture, cursor::Show, LeaveAlternateScreen);
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Full-screen piano roll driven by an engine.
pub struct TerminalApp {
    engine: EngineHandle,
    tracks: Vec<TrackStatus>,
    transport: Option<TransportState>,
    duration: f64,
    zoom: f64,
    frame: Option<RenderFrame>,
    message: Option<String>,
    audio_resumed: bool,
    canvas: Canvas,
}

impl TerminalApp {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            tracks: Vec::new(),
            transport: None,
            duration: 0.0,
            zoom: 1.0,
            frame: None,
            message: None,
            audio_resumed: false,
            canvas: Canvas::new(0, 0),
        }
    }

    pub fn run(mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let _guard = TerminalGuard;
        let mut out = stdout();
        execute!(
            out,
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide,
            Clear(ClearType::All)
        )?;

        let (cols, rows) = crossterm::terminal::size()?;
        self.resize(cols, rows);

        loop {
            let redraw = self.drain_updates();
            if redraw {
                self.render(&mut out)?;
            }

            if !event::poll(Duration::from_millis(10))? {
                continue;
            }
            match event::read()? {
                Event::Key(KeyEvent {
                    code,
                    kind: KeyEventKind::Press,
                    ..
                }) => match key_action(code, &self.tracks, self.audio_resumed) {
                    InputAction::Quit => break,
                    InputAction::Engine(commands) => {
                        self.audio_resumed = true;
                        for command in commands {
                            self.engine.send(command);
                        }
                    }
                    InputAction::Ignore => {}
                },
                Event::Mouse(mouse) => {
                    if let Some(command) = mouse_command(mouse) {
                        self.engine.send(command);
                    }
                }
                Event::Resize(cols, rows) => self.resize(cols, rows),
                _ => {}
            }
        }

        info!("Leaving terminal front end");
        self.engine.shutdown();
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.canvas = Canvas::new(cols, rows);
        self.engine.send(EngineCommand::Resize {
            width: cols as f64 * CELL_WIDTH,
            height: rows.saturating_sub(1) as f64 * CELL_HEIGHT,
        });
    }

    /// Applies pending engine updates. True when the screen needs repainting.
    fn drain_updates(&mut self) -> bool {
        let mut redraw = false;
        while let Ok(update) = self.engine.update_rx.try_recv() {
            match update {
                EngineUpdate::Loaded {
                    tracks, duration, ..
                } => {
                    self.tracks = tracks;
                    self.duration = duration;
                    self.message = None;
                }
                EngineUpdate::Tracks(tracks) => self.tracks = tracks,
                EngineUpdate::PlaybackState(state) => self.transport = Some(state),
                EngineUpdate::Redraw(frame) => {
                    if let Some(viewport) = frame.draw.viewport {
                        self.zoom = viewport.zoom;
                    }
                    self.frame = Some(frame);
                }
                EngineUpdate::Warning { message } => {
                    warn!("{message}");
                    self.message = Some(message);
                }
                EngineUpdate::Error { message } => self.message = Some(message),
            }
            redraw = true;
        }
        redraw
    }

    fn status_line(&self) -> String {
        let position = self.engine.playhead.read();
        let status = match self.transport.map(|t| t.status) {
            Some(TransportStatus::Playing) => "▶",
            Some(TransportStatus::Paused) => "❚❚",
            _ => "■",
        };
        let tracks: Vec<String> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}:{}{}", i + 1, t.name, if t.muted { "(m)" } else { "" }))
            .collect();

        let mut line = format!(
            " {status} {} / {}  zoom {:.2}  {}",
            format_clock(position.position),
            format_clock(self.duration),
            self.zoom,
            tracks.join(" ")
        );
        if let Some(message) = &self.message {
            line.push_str("  | ");
            line.push_str(message);
        }
        line
    }

    fn render(&mut self, out: &mut impl Write) -> io::Result<()> {
        if let Some(frame) = &self.frame {
            self.canvas.paint(&frame.draw);
        }
        let status = self.status_line();
        self.canvas.status(&status);
        self.canvas.flush(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{Note, NoteSet, Track};
    use crate::ui::{ViewportConfig, ViewportMapper, build_draw_list};
    use crossterm::event::KeyModifiers;
    use std::collections::BTreeSet;

    fn tracks() -> Vec<TrackStatus> {
        ["Piano", "Drums"]
            .into_iter()
            .map(|name| TrackStatus {
                name: name.into(),
                notes: 1,
                volume: 1.0,
                muted: false,
            })
            .collect()
    }

    #[test]
    fn first_key_resumes_audio() {
        assert_eq!(
            key_action(KeyCode::Char(' '), &tracks(), false),
            InputAction::Engine(vec![EngineCommand::ResumeAudio, EngineCommand::TogglePlay])
        );
        assert_eq!(
            key_action(KeyCode::Char(' '), &tracks(), true),
            InputAction::Engine(vec![EngineCommand::TogglePlay])
        );
    }

    #[test]
    fn number_keys_toggle_track_mute() {
        assert_eq!(
            key_action(KeyCode::Char('2'), &tracks(), true),
            InputAction::Engine(vec![EngineCommand::ToggleTrackMute("Drums".into())])
        );
        assert_eq!(key_action(KeyCode::Char('3'), &tracks(), true), InputAction::Ignore);
        assert_eq!(key_action(KeyCode::Char('q'), &tracks(), true), InputAction::Quit);
    }

    #[test]
    fn c_recentres_the_view() {
        assert_eq!(
            key_action(KeyCode::Char('c'), &tracks(), true),
            InputAction::Engine(vec![EngineCommand::CenterView])
        );
    }

    #[test]
    fn mouse_maps_to_pointer_gestures() {
        let mouse = |kind, column, row| MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(
            mouse_command(mouse(MouseEventKind::Down(MouseButton::Left), 25, 1)),
            Some(EngineCommand::PointerDown { x: 408.0, y: 5.0 })
        );
        assert_eq!(mouse_command(mouse(MouseEventKind::Down(MouseButton::Left), 25, 0)), None);
        assert!(matches!(
            mouse_command(mouse(MouseEventKind::Up(MouseButton::Left), 3, 4)),
            Some(EngineCommand::PointerUp { .. })
        ));
    }

    #[test]
    fn canvas_paints_keys_notes_and_playhead() {
        let note = Note {
            pitch: 127,
            start: 0.0,
            end: 2.0,
            velocity: 100,
            track: 0,
        };
        let set = NoteSet {
            duration: 8.0,
            bpm: 120.0,
            tracks: vec![Track::new(0, "Piano", vec![note])],
        };
        let mut mapper = ViewportMapper::new(ViewportConfig::default());
        mapper.resize(100.0 * CELL_WIDTH, 10.0 * CELL_HEIGHT);
        mapper.load(&set);
        let draw = build_draw_list(&mapper, &set.tracks, &BTreeSet::new(), 1.0);

        let mut canvas = Canvas::new(100, 11);
        canvas.paint(&draw);
        canvas.status("hello");

        assert!(canvas.row_text(0).starts_with("hello"));
        // pitch 127 is the first roll row; the note starts right after the keys
        assert_eq!(canvas.get(26, 1).map(|c| c.ch), Some('█'));
        let playhead_col = (mapper.time_to_x(1.0) / CELL_WIDTH).floor() as u16;
        assert_eq!(canvas.get(playhead_col, 1).map(|c| c.ch), Some('▼'));
        assert_eq!(canvas.get(playhead_col, 5).map(|c| c.ch), Some('│'));
    }
}
