mod instrument;
mod manager;
mod track;
mod voice;

pub use instrument::{ADSRConfig, Instrument, OscConfig, SampleRef, Timbre, Wave};
pub use manager::{
    EventConsumer, EventProducer, MixSnapshot, MixerHandle, PreviewNote, SynthSink, TrackMix,
    VoiceManager,
};
pub use track::TrackVoices;
pub use voice::Voice;

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
