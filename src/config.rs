use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::audio::{PreviewNote, SampleRef, Timbre};
use crate::error::LoadError;
use crate::ui::ViewportConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub max_voices_per_track: usize,
    /// Slots in the synth event ring buffer
    pub event_buffer_capacity: usize,
    /// How long the system clock takes to leave `Resuming`
    pub resume_latency_ms: u64,
    pub tick_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub preview: PreviewNote,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_voices_per_track: 128,
            event_buffer_capacity: 4096,
            resume_latency_ms: 100,
            tick_interval_ms: 5,
            frame_interval_ms: 16,
            preview: PreviewNote::default(),
        }
    }
}

impl AudioConfig {
    pub fn resume_latency(&self) -> Duration {
        Duration::from_millis(self.resume_latency_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub master_gain_db: f32,
    pub default_timbre: Timbre,
    /// Per-track overrides, keyed by track name
    pub track_timbres: HashMap<String, Timbre>,
    pub sample_library: Vec<SampleRef>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            master_gain_db: -6.0,
            default_timbre: Timbre::default(),
            track_timbres: HashMap::new(),
            sample_library: Vec::new(),
        }
    }
}

impl SynthConfig {
    pub fn timbre_for(&self, track_name: &str) -> Timbre {
        self.track_timbres
            .get(track_name)
            .unwrap_or(&self.default_timbre)
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    /// Log file; stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub viewport: ViewportConfig,
    pub synth: SynthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let ron_string = fs::read_to_string(path)?;
        let config: Config = ron::from_str(&ron_string)?;

        Ok(config)
    }

    /// Falls back to the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
