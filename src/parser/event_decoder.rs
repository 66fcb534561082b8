//! KSEQ event stream decoding
//!
//! Events are bit packed: the high bits of the first byte select the kind,
//! data bytes carry 7 significant bits each. [`parse_event`] decodes a single
//! event without any state, [`EventStreamDecoder`] walks byte ranges, keeps the
//! running tick and tempo and produces MIDI events.

use crate::diagnostics::DiagnosticSink;
use crate::error::Anomaly;
use crate::midi::midi_event::{MidiEvent, MidiEventType};
use crate::parser::kseq_types::{
    ByteRange, MARKER_CHANNEL_PRESSURE, MARKER_CONTROL_CHANGE, MARKER_MEASURE_MARK,
    MARKER_NO_OPERATION, MARKER_PATTERN, MARKER_PITCH_BEND, MARKER_POLY_PRESSURE,
    MARKER_PROGRAM_CHANGE, MARKER_SEQUENCE_END, MARKER_TEMPO_CHANGE, MARKER_TRACK_END,
    MARKER_TRACK_START, MASK_DELTA_EVENT, MASK_NOTE_EVENT, NOTE_DURATION_UNIT, TYPE_DELTA_LONG,
    TYPE_DELTA_SHORT, TYPE_NOTE_LONG, TYPE_NOTE_SHORT,
};
use crate::parser::primitive_parser::{
    parse_marker, parse_masked, parse_u14_lsb_first, parse_u14_msb_first, parse_u7, parse_u8,
};
use nom::branch::alt;
use nom::combinator::map;
use nom::sequence::preceded;
use nom::{IResult, Parser};
use std::collections::BTreeMap;

pub const SHARP_NOTES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One decoded unit of the event stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KseqEvent {
    /// Advance the running tick
    Delta(u16),
    /// Note with its duration already converted to ticks
    Note {
        duration: u32,
        key: u8,
        velocity: u8,
    },
    PolyPressure {
        key: u8,
        pressure: u8,
    },
    PitchBend(u16),
    ControlChange {
        controller: u8,
        value: u8,
    },
    ProgramChange(u8),
    ChannelPressure(u8),
    /// Raw tempo value, tenths of a percent of the song's initial tempo
    TempoChange(u16),
    MeasureMark,
    NoOp,
    Unknown(u8),
}

fn parse_delta_short(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(parse_masked(MASK_DELTA_EVENT, TYPE_DELTA_SHORT), |b| {
        KseqEvent::Delta(u16::from(b & 0x1F))
    })
    .parse(i)
}

fn parse_delta_long(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        (parse_masked(MASK_DELTA_EVENT, TYPE_DELTA_LONG), parse_u7),
        |(b, lo)| KseqEvent::Delta((u16::from(b & 0x1F) << 7) | u16::from(lo)),
    )
    .parse(i)
}

fn parse_note_short(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        (
            parse_masked(MASK_NOTE_EVENT, TYPE_NOTE_SHORT),
            parse_u7, // note
            parse_u7, // velocity
        ),
        |(b, key, velocity)| KseqEvent::Note {
            duration: u32::from(b & 0x0F) * NOTE_DURATION_UNIT,
            key,
            velocity,
        },
    )
    .parse(i)
}

fn parse_note_long(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        (
            parse_masked(MASK_NOTE_EVENT, TYPE_NOTE_LONG),
            parse_u7, // duration low bits
            parse_u7, // note
            parse_u7, // velocity
        ),
        |(b, lo, key, velocity)| KseqEvent::Note {
            duration: ((u32::from(b & 0x0F) << 7) | u32::from(lo)) * NOTE_DURATION_UNIT,
            key,
            velocity,
        },
    )
    .parse(i)
}

fn parse_poly_pressure(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_POLY_PRESSURE), (parse_u7, parse_u7)),
        |(key, pressure)| KseqEvent::PolyPressure { key, pressure },
    )
    .parse(i)
}

fn parse_pitch_bend(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_PITCH_BEND), parse_u14_lsb_first),
        KseqEvent::PitchBend,
    )
    .parse(i)
}

fn parse_control_change(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_CONTROL_CHANGE), (parse_u7, parse_u7)),
        |(controller, value)| KseqEvent::ControlChange { controller, value },
    )
    .parse(i)
}

fn parse_program_change(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_PROGRAM_CHANGE), parse_u7),
        KseqEvent::ProgramChange,
    )
    .parse(i)
}

fn parse_channel_pressure(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_CHANNEL_PRESSURE), parse_u7),
        KseqEvent::ChannelPressure,
    )
    .parse(i)
}

fn parse_tempo_change(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    map(
        preceded(parse_marker(MARKER_TEMPO_CHANGE), parse_u14_msb_first),
        KseqEvent::TempoChange,
    )
    .parse(i)
}

/// Decode the event at the start of `i`.
///
/// Kinds are tried in a fixed order, a byte matching none of them (or a
/// multi-byte event cut by the end of input) is `Unknown` and consumes one
/// byte. Only fails on empty input.
pub fn parse_event(i: &[u8]) -> IResult<&[u8], KseqEvent> {
    alt((
        parse_delta_short,
        parse_delta_long,
        parse_note_short,
        parse_note_long,
        parse_poly_pressure,
        parse_pitch_bend,
        parse_control_change,
        parse_program_change,
        parse_channel_pressure,
        map(parse_marker(MARKER_MEASURE_MARK), |_| KseqEvent::MeasureMark),
        map(parse_marker(MARKER_NO_OPERATION), |_| KseqEvent::NoOp),
        parse_tempo_change,
        map(parse_u8, KseqEvent::Unknown),
    ))
    .parse(i)
}

/// Decode the event at `cursor`, returns it with the number of bytes consumed.
pub fn decode_event(data: &[u8], cursor: usize) -> Option<(KseqEvent, usize)> {
    let input = data.get(cursor..)?;
    let (rest, event) = parse_event(input).ok()?;
    Some((event, input.len() - rest.len()))
}

/// Tempo changes are relative to the song's initial tempo, never to the
/// running one.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TempoState {
    pub initial_bpm: f64,
    pub current_bpm: f64,
}

impl TempoState {
    pub fn new(initial_bpm: f64) -> Self {
        Self {
            initial_bpm,
            current_bpm: initial_bpm,
        }
    }

    /// Apply a raw tempo change and return the new BPM
    pub fn apply(&mut self, raw: u16) -> f64 {
        let percentage = f64::from(raw) / 10.0;
        self.current_bpm = self.initial_bpm * (percentage / 100.0);
        self.current_bpm
    }
}

/// Decoded events of one destination track.
#[derive(Debug, Clone, PartialEq)]
pub struct SongTrack {
    /// 1-based track number
    pub number: usize,
    /// 0-based MIDI channel
    pub channel: u8,
    pub events: Vec<MidiEvent>,
}

impl SongTrack {
    pub const fn new(number: usize, channel: u8) -> Self {
        Self {
            number,
            channel,
            events: Vec::new(),
        }
    }
}

pub struct EventStreamDecoder<'a> {
    data: &'a [u8],
    tempo: TempoState,
}

impl<'a> EventStreamDecoder<'a> {
    pub fn new(data: &'a [u8], initial_bpm: f64) -> Self {
        Self {
            data,
            tempo: TempoState::new(initial_bpm),
        }
    }

    pub const fn tempo(&self) -> &TempoState {
        &self.tempo
    }

    /// Decode the linear (non pattern) region starting at `start`.
    ///
    /// Each track of the region starts with `F0 <track>` and restarts at tick
    /// 0. Decoding stops at the end of sequence byte or at the first pattern
    /// start (`F0 0F`). Tracks met here but missing from `tracks` are created
    /// on channel 1.
    pub fn decode_linear_tracks(
        &mut self,
        start: usize,
        tracks: &mut BTreeMap<usize, SongTrack>,
        sink: &mut dyn DiagnosticSink,
    ) {
        let mut ptr = start;
        let mut tick: u32 = 0;
        let mut active: Option<usize> = None;

        while let Some(&b) = self.data.get(ptr) {
            if b == MARKER_SEQUENCE_END {
                sink.line(&format!("{}END_OF_SEQUENCE", trace_header(tick, active, b)));
                break;
            }
            if b == MARKER_TRACK_START {
                let Some(&next) = self.data.get(ptr + 1) else {
                    break;
                };
                if next == MARKER_PATTERN {
                    sink.line(&format!(
                        "Linear track data ends at 0x{ptr:X}, pattern data follows"
                    ));
                    break;
                }
                let number = usize::from(next) + 1;
                if let Some(current) = active {
                    sink.anomaly(&Anomaly::TrackRestart {
                        current,
                        next: number,
                        offset: ptr,
                    });
                }
                active = Some(number);
                tick = 0;
                tracks
                    .entry(number)
                    .or_insert_with(|| SongTrack::new(number, 0));
                sink.line(&format!(
                    "{}TRACK_START @0x{ptr:X}",
                    trace_header(tick, active, b)
                ));
                ptr += 2;
                continue;
            }
            if b == MARKER_TRACK_END {
                sink.line(&format!("{}TRACK_END", trace_header(tick, active, b)));
                active = None;
                ptr += 1;
                continue;
            }
            match active.and_then(|number| tracks.get_mut(&number)) {
                Some(track) => {
                    let (consumed, delta) = self.decode_into(ptr, tick, track, sink);
                    tick = tick.saturating_add(delta);
                    ptr += consumed;
                }
                None => {
                    sink.line(&format!("{}STRAY", trace_header(tick, None, b)));
                    ptr += 1;
                }
            }
        }
    }

    /// Decode one resolved pattern instance into `track`, returns the number
    /// of MIDI events added.
    ///
    /// The last event may read data bytes past `range.end`, only its first
    /// byte has to lie inside the range.
    pub fn decode_range(
        &mut self,
        range: &ByteRange,
        track: &mut SongTrack,
        sink: &mut dyn DiagnosticSink,
    ) -> usize {
        let events_before = track.events.len();
        let end = range.end.min(self.data.len());
        let mut ptr = range.start;
        let mut tick = range.tick_offset;
        while ptr < end {
            let (consumed, delta) = self.decode_into(ptr, tick, track, sink);
            tick = tick.saturating_add(delta);
            ptr += consumed;
        }
        let added = track.events.len() - events_before;
        sink.line(&format!(
            "Pattern range 0x{:X}..0x{:X} tickOffset={} eventsAdded={added}",
            range.start, range.end, range.tick_offset
        ));
        added
    }

    /// Decode the event at `ptr` into `track`, returns (bytes consumed, tick delta).
    fn decode_into(
        &mut self,
        ptr: usize,
        tick: u32,
        track: &mut SongTrack,
        sink: &mut dyn DiagnosticSink,
    ) -> (usize, u32) {
        let Some((event, consumed)) = decode_event(self.data, ptr) else {
            return (1, 0);
        };
        let b = self.data[ptr];
        let head = trace_header(tick, Some(track.number), b);
        let channel = track.channel;
        let mut delta = 0;
        let emitted = match event {
            KseqEvent::Delta(d) => {
                sink.line(&format!("{head}Δ {d}"));
                delta = u32::from(d);
                None
            }
            KseqEvent::Note {
                duration,
                key,
                velocity,
            } => {
                sink.line(&format!(
                    "{head}{:<13} {} vel={velocity} len={duration}",
                    if consumed == 4 { "NOTE_LONG" } else { "NOTE_SHORT" },
                    note_name(key)
                ));
                track
                    .events
                    .push(MidiEvent::new_note_on(tick, channel, key, velocity));
                Some(MidiEvent::new_note_off(
                    tick.saturating_add(duration),
                    channel,
                    key,
                    velocity,
                ))
            }
            KseqEvent::PolyPressure { key, pressure } => {
                sink.line(&format!("{head}POLY_AT       {} pr={pressure}", note_name(key)));
                Some(MidiEvent::new(
                    tick,
                    MidiEventType::PolyPressure(channel, key, pressure),
                ))
            }
            KseqEvent::PitchBend(value) => {
                sink.line(&format!("{head}PITCH_BEND    val={value}"));
                Some(MidiEvent::new(tick, MidiEventType::PitchBend(channel, value)))
            }
            KseqEvent::ControlChange { controller, value } => {
                sink.line(&format!("{head}CONTROL_CHG   ctl={controller} val={value}"));
                Some(MidiEvent::new(
                    tick,
                    MidiEventType::ControlChange(channel, controller, value),
                ))
            }
            KseqEvent::ProgramChange(program) => {
                sink.line(&format!("{head}PROGRAM_CHG   pgm={program}"));
                Some(MidiEvent::new(
                    tick,
                    MidiEventType::ProgramChange(channel, program),
                ))
            }
            KseqEvent::ChannelPressure(pressure) => {
                sink.line(&format!("{head}CHANNEL_AT    pr={pressure}"));
                Some(MidiEvent::new(
                    tick,
                    MidiEventType::ChannelPressure(channel, pressure),
                ))
            }
            KseqEvent::TempoChange(raw) => {
                let previous = self.tempo.current_bpm;
                let bpm = self.tempo.apply(raw);
                sink.line(&format!(
                    "{head}TEMPO_CHG_P   val={raw} ({:.1}%) {previous:.2} -> {bpm:.2} BPM",
                    f64::from(raw) / 10.0
                ));
                Some(MidiEvent::new_tempo_change(tick, bpm))
            }
            KseqEvent::MeasureMark => {
                sink.line(&format!("{head}MEASURE_MARK"));
                None
            }
            KseqEvent::NoOp => {
                sink.line(&format!("{head}NOP"));
                None
            }
            KseqEvent::Unknown(byte) => {
                sink.anomaly(&Anomaly::UnknownEventByte { byte, offset: ptr });
                None
            }
        };
        if let Some(event) = emitted {
            track.events.push(event);
        }
        (consumed, delta)
    }
}

/// Note name with the SY77 octave numbering (middle C is C3)
pub fn note_name(key: u8) -> String {
    if key > 127 {
        return "???".to_string();
    }
    let octave = i32::from(key / 12) - 2;
    format!("{}{octave}", SHARP_NOTES[usize::from(key % 12)])
}

/// Common prefix of every trace line
fn trace_header(tick: u32, track: Option<usize>, first_byte: u8) -> String {
    format!(
        "[t={tick:06}]  Trk{:02} 0x{first_byte:02X} {:<15} ",
        track.unwrap_or(0),
        mnemonic(first_byte)
    )
}

fn mnemonic(b: u8) -> &'static str {
    match b {
        MARKER_PROGRAM_CHANGE => "PROGRAM_CHG",
        MARKER_CONTROL_CHANGE => "CONTROL_CHG",
        MARKER_POLY_PRESSURE => "POLY_PRESS",
        MARKER_CHANNEL_PRESSURE => "CHANNEL_AT",
        MARKER_PITCH_BEND => "PITCH_BEND",
        MARKER_TRACK_START => "TRACK_START",
        MARKER_TRACK_END => "TRACK_END",
        MARKER_SEQUENCE_END => "SEQUENCE_END",
        MARKER_MEASURE_MARK => "MEASURE_MRK",
        MARKER_NO_OPERATION => "NOP",
        MARKER_TEMPO_CHANGE => "TEMPO_CHG_P",
        _ if b & MASK_NOTE_EVENT == TYPE_NOTE_SHORT => "NOTE_SHORT",
        _ if b & MASK_NOTE_EVENT == TYPE_NOTE_LONG => "NOTE_LONG",
        _ if b & MASK_DELTA_EVENT == TYPE_DELTA_SHORT => "DELTA_SHORT",
        _ if b & MASK_DELTA_EVENT == TYPE_DELTA_LONG => "DELTA_LONG",
        _ => "UNKNOWN",
    }
}
