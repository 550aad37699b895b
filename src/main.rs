use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use midiroll::audio::{EventConsumer, MixerHandle};
use midiroll::events::SynthEvent;
use midiroll::timing::{NoteSet, SystemClock};
use midiroll::{Config, EngineCommand, TerminalApp, logging, spawn_engine};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Split};
use tracing::{debug, error, info};

const DEFAULT_CONFIG: &str = "midiroll.ron";
const DEFAULT_LOG: &str = "midiroll.log";

struct Args {
    notes: PathBuf,
    config: PathBuf,
    watch: bool,
}

fn parse_args() -> Option<Args> {
    let mut notes = None;
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut watch = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = PathBuf::from(args.next()?),
            "--watch" => watch = true,
            _ if notes.is_none() && !arg.starts_with("--") => notes = Some(PathBuf::from(arg)),
            _ => return None,
        }
    }

    Some(Args {
        notes: notes?,
        config,
        watch,
    })
}

/// Stands in for the synthesis collaborator: drains the event buffer and logs
/// what would have been played, at the gain the mixer currently holds.
fn spawn_monitor(
    mut consumer: EventConsumer,
    mixer: MixerHandle,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            let mix = mixer.snapshot();
            while let Some(event) = consumer.try_pop() {
                debug!(?event, gain = ?mix.gain(event.track_id), "Synth event");
            }
            thread::sleep(Duration::from_millis(5));
        }
    })
}

fn watch_notes(
    path: &Path,
    commands: crossbeam::channel::Sender<EngineCommand>,
) -> notify::Result<RecommendedWatcher> {
    let reload_path = path.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if event.kind.is_modify() {
                    info!(path = %reload_path.display(), "Note file changed, reloading");
                    let _ = commands.send(EngineCommand::LoadNotes(reload_path.clone()));
                }
            }
            Err(e) => error!("Watch error: {e}"),
        },
        notify::Config::default(),
    )?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn run(args: &Args, config: &Config, notes: NoteSet) -> Result<(), Box<dyn Error + Send + Sync>> {
    let capacity = config.audio.event_buffer_capacity.max(1);
    let (producer, consumer) = HeapRb::<SynthEvent>::new(capacity).split();

    let clock = SystemClock::new(config.audio.resume_latency());
    let engine = spawn_engine(config, notes, clock, producer);
    let running = Arc::new(AtomicBool::new(true));
    let monitor = spawn_monitor(consumer, engine.mixer.clone(), running.clone());

    let watcher = if args.watch {
        watch_notes(&args.notes, engine.command_tx.clone()).map(Some)
    } else {
        Ok(None)
    };
    let result: Result<(), Box<dyn Error + Send + Sync>> = match watcher {
        Ok(_watcher) => TerminalApp::new(engine).run().map_err(Into::into),
        Err(e) => {
            engine.shutdown();
            Err(e.into())
        }
    };

    running.store(false, Ordering::Relaxed);
    if monitor.join().is_err() {
        error!("Monitor thread panicked");
    }
    result
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(args) = parse_args() else {
        eprintln!("Usage: midiroll <notes.json|notes.ron> [--config <path>] [--watch]");
        std::process::exit(2);
    };

    let mut config = Config::load_or_default(&args.config)?;
    if config.logging.file.is_none() {
        config.logging.file = Some(PathBuf::from(DEFAULT_LOG));
    }
    logging::init(&config.logging)?;

    let notes = NoteSet::load(&args.notes)?;
    run(&args, &config, notes)
}
