//! Error types for the kseq2midi library

use std::io;

/// Library error type for kseq2midi operations
#[derive(Debug, thiserror::Error)]
pub enum KseqError {
    /// The input is not a KSEQ/AllData dump or its anchor marker is missing
    #[error("format error: {0}")]
    FormatError(String),

    /// The decoded sequence could not be encoded as a MIDI file
    #[error("MIDI error: {0}")]
    MidiError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<io::Error> for KseqError {
    fn from(error: io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}

/// Recoverable irregularities met while decoding.
///
/// None of them stops the conversion, the offending unit (one byte or one
/// chain reference) is skipped and decoding carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Anomaly {
    #[error("pattern chain @0x{position:X} references unused pattern slot {index}")]
    UnusedPatternSlot { index: usize, position: usize },

    #[error("pattern chain @0x{position:X} references pattern {index} out of bounds (table size {table_size})")]
    PatternIndexOutOfBounds {
        index: usize,
        position: usize,
        table_size: usize,
    },

    #[error("pattern chain @0x{position:X} has a repeat end without an open repeat")]
    UnmatchedRepeatEnd { position: usize },

    #[error("pattern chain @0x{position:X} nests more repeats than the chain window can hold")]
    RepeatStackOverflow { position: usize },

    #[error("pattern chain resolution stopped after {limit} {what}")]
    ChainBudgetExhausted { what: &'static str, limit: usize },

    #[error("pattern table record {index} is truncated by the end of the file")]
    TruncatedPatternRecord { index: usize },

    #[error("unknown event byte 0x{byte:02X} @0x{offset:X}")]
    UnknownEventByte { byte: u8, offset: usize },

    #[error("track {next} starts @0x{offset:X} while track {current} is still active")]
    TrackRestart {
        current: usize,
        next: usize,
        offset: usize,
    },

    #[error("track {track} has invalid MIDI channel {channel}, using channel 1")]
    InvalidChannel { track: usize, channel: usize },

    #[error("tempo {bpm:.2} BPM cannot be encoded, using 120 BPM")]
    InvalidTempo { bpm: f64 },
}
