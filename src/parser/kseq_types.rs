//! KSEQ (Yamaha SY77/SY99 sequencer dump) layout and data structures
//!
//! Every fixed offset below is given for a plain KSEQ dump whose anchor marker
//! sits at 0x400. Use [`FileLayout::offset`] to apply the detected shift.

use std::fmt;

/// Identifier of a standalone sequencer dump
pub const HEADER_ID_KSEQ: &str = "SY1_SEQALL";
/// Identifier of a full "all data" dump (voices + sequencer)
pub const HEADER_ID_ALL_DATA: &str = "SY1 ALL";
pub const HEADER_ID_LENGTH: usize = 10;

/// Marker locating the song data block
pub const ANCHOR_MARKER: &[u8] = b"COM-KSEQ";
pub const KSEQ_ANCHOR_OFFSET: usize = 0x400;
pub const ALL_DATA_ANCHOR_OFFSET: usize = 0x800;

pub const TEMPO_OFFSET: usize = 0x041C;
pub const SONG_TITLE_OFFSET: usize = 0x0422;
pub const SONG_TITLE_LENGTH: usize = 8;
/// Usage bits for tracks 1-8, the next byte holds tracks 9-16
pub const TRACK_USAGE_OFFSET: usize = 0x042A;
/// One 0-based MIDI channel byte per track
pub const TRACK_CHANNELS_OFFSET: usize = 0x042C;
pub const SONG_TRACK_COUNT: usize = 16;

/// One time signature code per bar, fills the gap up to the pattern table
pub const TIME_SIGNATURE_TABLE_OFFSET: usize = 0x0440;
pub const TIME_SIGNATURE_TABLE_LENGTH: usize = PATTERN_TABLE_OFFSET - TIME_SIGNATURE_TABLE_OFFSET;

pub const PATTERN_TABLE_OFFSET: usize = 0x0826;
pub const PATTERN_SLOT_COUNT: usize = 99;
pub const PATTERN_RECORD_SIZE: usize = 9;

pub const PATTERN_CHAIN_OFFSET: usize = 0x0BA1;
pub const PATTERN_CHAIN_LENGTH: usize = LINEAR_TRACK_DATA_OFFSET - PATTERN_CHAIN_OFFSET;

pub const LINEAR_TRACK_DATA_OFFSET: usize = 0x1000;

// track framing
pub const MARKER_TRACK_START: u8 = 0xF0;
pub const MARKER_SEQUENCE_END: u8 = 0xF1;
pub const MARKER_TRACK_END: u8 = 0xF2;
/// Follows `MARKER_TRACK_START` instead of a track number at a pattern start
pub const MARKER_PATTERN: u8 = 0x0F;

// events
pub const MARKER_TEMPO_CHANGE: u8 = 0xF3;
pub const MARKER_MEASURE_MARK: u8 = 0xF5;
pub const MARKER_NO_OPERATION: u8 = 0xF8;
pub const MARKER_POLY_PRESSURE: u8 = 0xFA;
pub const MARKER_CONTROL_CHANGE: u8 = 0xFB;
pub const MARKER_PROGRAM_CHANGE: u8 = 0xFC;
pub const MARKER_CHANNEL_PRESSURE: u8 = 0xFD;
pub const MARKER_PITCH_BEND: u8 = 0xFE;

pub const MASK_DELTA_EVENT: u8 = 0xE0;
pub const TYPE_DELTA_SHORT: u8 = 0x80; // 100xxxxx
pub const TYPE_DELTA_LONG: u8 = 0xA0; // 101xxxxx
pub const MASK_NOTE_EVENT: u8 = 0xF0;
pub const TYPE_NOTE_SHORT: u8 = 0xC0; // 1100xxxx
pub const TYPE_NOTE_LONG: u8 = 0xD0; // 1101xxxx

/// Note durations are stored in units of 4 ticks at 96 PPQN
pub const NOTE_DURATION_UNIT: u32 = 4;

// pattern chain program
pub const CHAIN_END: u8 = 0xFF;
pub const CHAIN_REPEAT_BEGIN: u8 = 0x80;
pub const CHAIN_REPEAT_END_FIRST: u8 = 0x81;
pub const CHAIN_REPEAT_END_LAST: u8 = 0xE3;
pub const CHAIN_PATTERN_FIRST: u8 = 0x01;
pub const CHAIN_PATTERN_LAST: u8 = 0x99;

/// Output resolution, ticks per quarter note
pub const PPQN: u32 = 96;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileVariant {
    /// Standalone sequencer dump
    Kseq,
    /// Full dump, the sequencer block comes after the voice data
    AllData,
}

impl FileVariant {
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier {
            HEADER_ID_KSEQ => Some(Self::Kseq),
            HEADER_ID_ALL_DATA => Some(Self::AllData),
            _ => None,
        }
    }

    /// Where the anchor marker is expected
    pub const fn default_anchor_offset(self) -> usize {
        match self {
            Self::Kseq => KSEQ_ANCHOR_OFFSET,
            Self::AllData => ALL_DATA_ANCHOR_OFFSET,
        }
    }
}

impl fmt::Display for FileVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kseq => write!(f, "KSEQ"),
            Self::AllData => write!(f, "AllData"),
        }
    }
}

/// Detected variant and the shift applied to every fixed offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileLayout {
    pub variant: FileVariant,
    pub shift: isize,
}

impl FileLayout {
    pub const fn new(variant: FileVariant, shift: isize) -> Self {
        Self { variant, shift }
    }

    /// Absolute position of a fixed structural offset, `None` if the shift
    /// moves it before the start of the file.
    pub const fn offset(&self, base: usize) -> Option<usize> {
        base.checked_add_signed(self.shift)
    }
}

/// 3-byte packed pointer of the pattern table, relative to the first
/// pattern marker of the file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PatternPointer {
    pub msb: u8,
    pub mid: u8,
    pub lsb: u8,
}

impl PatternPointer {
    pub const fn new(msb: u8, mid: u8, lsb: u8) -> Self {
        Self { msb, mid, lsb }
    }

    pub const fn value(&self) -> usize {
        ((self.msb as usize) << 9) | ((self.mid as usize) << 8) | self.lsb as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PatternRecord {
    pub bar_count: u8,
    pub time_signature_code: u8,
    pub start: PatternPointer,
    pub end: PatternPointer,
}

impl PatternRecord {
    pub fn length_in_ticks(&self) -> u32 {
        u32::from(self.bar_count) * super::time_signature::ticks_per_bar(self.time_signature_code)
    }
}

/// The 99 pattern slots, unused slots are kept as `None` so chain
/// references keep the slot numbering of the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternTable {
    pub slots: Vec<Option<PatternRecord>>,
}

impl PatternTable {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn used_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// One resolved playback instance of a pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    /// Absolute file offset of the first byte
    pub start: usize,
    /// Absolute file offset one past the last byte
    pub end: usize,
    /// Output tick the instance starts at
    pub tick_offset: u32,
}

impl ByteRange {
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lengths() {
        assert_eq!(
            PATTERN_TABLE_OFFSET + PATTERN_SLOT_COUNT * PATTERN_RECORD_SIZE,
            PATTERN_CHAIN_OFFSET
        );
        assert_eq!(PATTERN_CHAIN_LENGTH, 0x45F);
        assert_eq!(TIME_SIGNATURE_TABLE_LENGTH, 998);
        // the header block is read in one pass
        assert_eq!(TEMPO_OFFSET + 6, SONG_TITLE_OFFSET);
        assert_eq!(SONG_TITLE_OFFSET + SONG_TITLE_LENGTH, TRACK_USAGE_OFFSET);
        assert_eq!(TRACK_USAGE_OFFSET + 2, TRACK_CHANNELS_OFFSET);
    }

    #[test]
    fn test_pointer_packing() {
        assert_eq!(PatternPointer::new(0, 0, 0x10).value(), 0x10);
        assert_eq!(PatternPointer::new(0, 1, 0x10).value(), 0x110);
        assert_eq!(PatternPointer::new(1, 0, 0x10).value(), 0x210);
        assert_eq!(PatternPointer::new(1, 1, 0xFF).value(), 0x3FF);
    }

    #[test]
    fn test_layout_offset() {
        let layout = FileLayout::new(FileVariant::Kseq, 0x20);
        assert_eq!(layout.offset(TEMPO_OFFSET), Some(0x043C));
        let layout = FileLayout::new(FileVariant::Kseq, -0x500);
        assert_eq!(layout.offset(TEMPO_OFFSET), None);
        assert_eq!(layout.offset(LINEAR_TRACK_DATA_OFFSET), Some(0xB00));
    }

    #[test]
    fn test_variant_from_identifier() {
        assert_eq!(FileVariant::from_identifier("SY1_SEQALL"), Some(FileVariant::Kseq));
        assert_eq!(FileVariant::from_identifier("SY1 ALL"), Some(FileVariant::AllData));
        assert_eq!(FileVariant::from_identifier("SY1"), None);
        assert_eq!(FileVariant::AllData.to_string(), "AllData");
    }
}
