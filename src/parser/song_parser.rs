use crate::diagnostics::DiagnosticSink;
use crate::error::Anomaly;
use crate::parser::event_decoder::{EventStreamDecoder, SongTrack};
use crate::parser::format_detector::detect_format;
use crate::parser::kseq_types::{
    FileLayout, PatternTable, LINEAR_TRACK_DATA_OFFSET, PATTERN_CHAIN_OFFSET, SONG_TITLE_LENGTH,
    SONG_TRACK_COUNT, TEMPO_OFFSET, TIME_SIGNATURE_TABLE_LENGTH, TIME_SIGNATURE_TABLE_OFFSET,
};
use crate::parser::pattern_chain::{
    chain_window, dump_pattern_markers, find_first_pattern_marker, resolve_pattern_chain,
    ResolvedChain,
};
use crate::parser::pattern_table::{dump_pattern_table, read_pattern_table};
use crate::parser::primitive_parser::{parse_text_field, parse_u8};
use crate::parser::time_signature::{resolve_time_signature_changes, TimeSignatureChange};
use crate::KseqError;
use nom::bytes::complete::take;
use nom::multi::count;
use nom::{IResult, Parser};
use std::collections::BTreeMap;

/// Track number of the synthetic track holding the unfolded patterns
pub const PATTERN_TRACK_NUMBER: usize = SONG_TRACK_COUNT + 1;
/// 0-based MIDI channel of the pattern track
pub const PATTERN_TRACK_CHANNEL: u8 = 15;

pub const DEFAULT_TEMPO: u8 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongHeader {
    /// Initial tempo in BPM
    pub tempo: u8,
    pub title: String,
    /// Bit n set when track n+1 is used
    pub track_usage: u16,
    /// Raw 0-based MIDI channel per track
    pub track_channels: Vec<u8>,
}

impl Default for SongHeader {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            title: String::new(),
            track_usage: 0,
            track_channels: vec![0; SONG_TRACK_COUNT],
        }
    }
}

impl SongHeader {
    pub const fn is_track_used(&self, index: usize) -> bool {
        index < SONG_TRACK_COUNT && self.track_usage & (1 << index) != 0
    }
}

/// Fully decoded KSEQ song.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub layout: FileLayout,
    pub header: SongHeader,
    /// Song tracks by ascending number
    pub tracks: Vec<SongTrack>,
    /// Unfolded pattern content, absent when the chain resolved to nothing
    pub pattern_track: Option<SongTrack>,
    pub time_signatures: Vec<TimeSignatureChange>,
    pub pattern_table: PatternTable,
    pub pattern_chain: ResolvedChain,
}

/// Parse the header block: tempo, title, track usage and channels.
pub fn parse_song_header(i: &[u8]) -> IResult<&[u8], SongHeader> {
    let (i, (tempo, _unknown, title, usage_low, usage_high, track_channels)) = (
        parse_u8,                            // tempo
        take(5usize),                        // unknown
        parse_text_field(SONG_TITLE_LENGTH), // title
        parse_u8,                            // tracks 1-8
        parse_u8,                            // tracks 9-16
        count(parse_u8, SONG_TRACK_COUNT),   // channels
    )
        .parse(i)?;
    Ok((
        i,
        SongHeader {
            tempo,
            title,
            track_usage: u16::from_le_bytes([usage_low, usage_high]),
            track_channels,
        },
    ))
}

fn read_song_header(data: &[u8], layout: &FileLayout) -> SongHeader {
    let header = layout
        .offset(TEMPO_OFFSET)
        .and_then(|offset| data.get(offset..))
        .and_then(|input| parse_song_header(input).ok())
        .map(|(_rest, header)| header);
    header.unwrap_or_else(|| {
        log::warn!("Song header is truncated, using defaults");
        SongHeader::default()
    })
}

/// Create the tracks flagged in the header with their MIDI channel.
fn used_tracks(header: &SongHeader, sink: &mut dyn DiagnosticSink) -> BTreeMap<usize, SongTrack> {
    let mut tracks = BTreeMap::new();
    for index in (0..SONG_TRACK_COUNT).filter(|&i| header.is_track_used(i)) {
        let number = index + 1;
        let raw = header.track_channels[index];
        let channel = if usize::from(raw) < 16 {
            raw
        } else {
            sink.anomaly(&Anomaly::InvalidChannel {
                track: number,
                channel: usize::from(raw) + 1,
            });
            0
        };
        log::debug!("Track {number} uses MIDI channel {}", channel + 1);
        tracks.insert(number, SongTrack::new(number, channel));
    }
    tracks
}

fn read_time_signature_table<'a>(data: &'a [u8], layout: &FileLayout) -> Option<&'a [u8]> {
    let start = layout.offset(TIME_SIGNATURE_TABLE_OFFSET)?;
    data.get(start..start + TIME_SIGNATURE_TABLE_LENGTH)
}

/// Decode a KSEQ or AllData dump.
///
/// Only an unrecognised identifier or a missing anchor marker fail, every
/// other irregularity is reported to `sink` and skipped.
pub fn parse_kseq_data(data: &[u8], sink: &mut dyn DiagnosticSink) -> Result<Song, KseqError> {
    let layout = detect_format(data)?;
    log::info!("Detected {} file (shift {})", layout.variant, layout.shift);

    let header = read_song_header(data, &layout);
    log::info!("Song {:?} at {} BPM", header.title, header.tempo);

    let time_signatures = match read_time_signature_table(data, &layout) {
        Some(table) => resolve_time_signature_changes(table),
        None => {
            sink.line("Time signature table not present or file too short.");
            resolve_time_signature_changes(&[])
        }
    };
    for change in &time_signatures {
        sink.line(&format!(
            "Time signature change at bar {} tick {}: {} (0x{:02X})",
            change.bar + 1,
            change.tick,
            change.signature,
            change.signature.code
        ));
    }

    let mut tracks = used_tracks(&header, sink);
    let mut decoder = EventStreamDecoder::new(data, f64::from(header.tempo));
    if let Some(start) = layout.offset(LINEAR_TRACK_DATA_OFFSET) {
        decoder.decode_linear_tracks(start, &mut tracks, sink);
    }

    let pattern_table = read_pattern_table(data, &layout, sink);
    let mut pattern_chain = ResolvedChain::default();
    let mut pattern_track = None;
    if let Some(first_marker) = find_first_pattern_marker(data, &layout) {
        let chain = chain_window(data, &layout);
        let chain_base = layout.offset(PATTERN_CHAIN_OFFSET).unwrap_or_default();
        sink.line(&format!(
            "Pattern chain area @0x{chain_base:X}: {}",
            chain
                .iter()
                .take(99)
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        ));
        dump_pattern_markers(data, &layout, first_marker, sink);
        dump_pattern_table(&pattern_table, sink);

        pattern_chain = resolve_pattern_chain(chain, chain_base, &pattern_table, first_marker, sink);
        if !pattern_chain.ranges.is_empty() {
            let mut track = SongTrack::new(PATTERN_TRACK_NUMBER, PATTERN_TRACK_CHANNEL);
            for range in &pattern_chain.ranges {
                decoder.decode_range(range, &mut track, sink);
            }
            pattern_track = Some(track);
        }
    } else {
        log::debug!("No pattern marker found, song has no pattern data");
    }

    let tracks: Vec<SongTrack> = tracks.into_values().collect();
    log::info!(
        "Decoded {} tracks and {} pattern instances",
        tracks.len(),
        pattern_chain.ranges.len()
    );
    Ok(Song {
        layout,
        header,
        tracks,
        pattern_track,
        time_signatures,
        pattern_table,
        pattern_chain,
    })
}
