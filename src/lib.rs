//! kseq2midi - Yamaha SY77/SY99 sequencer dump to Standard MIDI File converter
//!
//! This library provides:
//! - Detection of standalone KSEQ and full AllData dumps
//! - Decoding of the linear tracks and of the pattern chain
//! - Assembly of a multi-track sequence and its SMF encoding
//!
//! # Example
//!
//! ```no_run
//! use kseq2midi::{convert_kseq_data, NoopSink};
//! use std::path::Path;
//!
//! let file_data = std::fs::read("SONG.KSEQ").unwrap();
//! let sequence = convert_kseq_data(&file_data, &mut NoopSink).unwrap();
//! sequence.save(Path::new("SONG.KSEQ.mid")).unwrap();
//! ```

pub mod diagnostics;
pub mod error;
pub mod midi;
pub mod parser;

// Re-export main types for convenience
pub use diagnostics::{CollectingSink, DiagnosticSink, LogSink, NoopSink};
pub use error::{Anomaly, KseqError};
pub use midi::{
    midi_builder::{write_sequence, MidiBuilder, SequenceSink},
    midi_event::{MidiEvent, MidiEventType},
    smf_writer::SmfSequence,
    FIRST_TICK, PPQN,
};
pub use parser::{
    event_decoder::SongTrack,
    kseq_types::{FileLayout, FileVariant},
    song_parser::{parse_kseq_data, Song, SongHeader, PATTERN_TRACK_CHANNEL, PATTERN_TRACK_NUMBER},
    time_signature::{TimeSignature, TimeSignatureChange},
};

/// Decode a KSEQ or AllData dump into a finished SMF sequence.
pub fn convert_kseq_data(
    data: &[u8],
    sink: &mut dyn DiagnosticSink,
) -> Result<SmfSequence, KseqError> {
    let song = parse_kseq_data(data, sink)?;
    let mut sequence = SmfSequence::new();
    write_sequence(&song, &mut sequence, sink);
    Ok(sequence)
}
