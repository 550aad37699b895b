use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Square,
    Saw,
    Triangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f32,
    pub semitone: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instrument {
    MultiOsc { oscillators: Vec<OscConfig> },
    Sampler { sample_id: String, root_pitch: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ADSRConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for ADSRConfig {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.2,
            sustain: 0.5,
            release: 0.8,
        }
    }
}

/// How a track should sound. The synthesis collaborator reads it from the
/// mixer snapshot; nothing in this crate renders audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timbre {
    pub instrument: Instrument,
    pub adsr: ADSRConfig,
}

impl Default for Timbre {
    fn default() -> Self {
        Self {
            instrument: Instrument::MultiOsc {
                oscillators: vec![OscConfig {
                    wave: Wave::Sine,
                    gain: 1.0,
                    semitone: 0,
                }],
            },
            adsr: ADSRConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRef {
    pub id: String,
    pub path: String,
}

impl Timbre {
    /// A sampler needs its sample in the library; oscillators always work.
    pub fn is_playable(&self, library: &[SampleRef]) -> bool {
        match &self.instrument {
            Instrument::MultiOsc { oscillators } => !oscillators.is_empty(),
            Instrument::Sampler { sample_id, .. } => library.iter().any(|s| &s.id == sample_id),
        }
    }
}
