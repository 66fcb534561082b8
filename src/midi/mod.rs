pub mod midi_builder;
pub mod midi_event;
pub mod smf_writer;

pub use crate::parser::kseq_types::PPQN;

/// First tick of a song
pub const FIRST_TICK: u32 = 0;

/// Tempo used when the song tempo cannot be encoded
pub const DEFAULT_BPM: f64 = 120.0;
