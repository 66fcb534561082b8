//! Pattern chain resolution
//!
//! The chain is a small byte program: pattern references played one after the
//! other, possibly wrapped in (nested) repeat loops. Resolving it yields the
//! linear playback order as byte ranges of the pattern data area.

use crate::diagnostics::DiagnosticSink;
use crate::error::Anomaly;
use crate::parser::kseq_types::{
    ByteRange, FileLayout, PatternTable, CHAIN_END, CHAIN_PATTERN_FIRST, CHAIN_PATTERN_LAST,
    CHAIN_REPEAT_BEGIN, CHAIN_REPEAT_END_FIRST, CHAIN_REPEAT_END_LAST, LINEAR_TRACK_DATA_OFFSET,
    MARKER_PATTERN, MARKER_TRACK_START, PATTERN_CHAIN_LENGTH, PATTERN_CHAIN_OFFSET,
};

/// Upper bound on interpreted chain bytes, replays included
const MAX_CHAIN_STEPS: usize = 1_000_000;

/// Upper bound on resolved pattern instances
const MAX_RESOLVED_RANGES: usize = 65_536;

/// Open repeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RepeatFrame {
    /// Chain position right after the repeat begin byte
    return_position: usize,
    /// Total number of passes, known once the matching repeat end is read
    target: Option<usize>,
    completed: usize,
}

impl RepeatFrame {
    const fn new(return_position: usize) -> Self {
        Self {
            return_position,
            target: None,
            completed: 0,
        }
    }
}

/// Playback order of the song patterns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedChain {
    pub ranges: Vec<ByteRange>,
    pub total_ticks: u32,
    pub total_bars: u32,
}

/// Position of the first pattern start (`F0 0F`) at or after the linear track
/// data, every pattern pointer is relative to it.
pub fn find_first_pattern_marker(data: &[u8], layout: &FileLayout) -> Option<usize> {
    let start = layout.offset(LINEAR_TRACK_DATA_OFFSET)?;
    data.get(start..)?
        .windows(2)
        .position(|w| w == [MARKER_TRACK_START, MARKER_PATTERN])
        .map(|position| start + position)
}

/// Trace every pattern start marker of the file.
pub fn dump_pattern_markers(
    data: &[u8],
    layout: &FileLayout,
    first_marker: usize,
    sink: &mut dyn DiagnosticSink,
) {
    let Some(track_start) = layout.offset(LINEAR_TRACK_DATA_OFFSET) else {
        return;
    };
    for (position, w) in data.windows(2).enumerate().skip(track_start) {
        if w == [MARKER_TRACK_START, MARKER_PATTERN] {
            sink.line(&format!(
                "Found pattern marker F0 0F at file offset 0x{position:X}, rel to track start: 0x{:X}, rel to first pattern: 0x{:X}",
                position - track_start,
                position - first_marker
            ));
        }
    }
}

/// The chain program bytes, cut at the end of the file.
pub fn chain_window<'a>(data: &'a [u8], layout: &FileLayout) -> &'a [u8] {
    layout
        .offset(PATTERN_CHAIN_OFFSET)
        .and_then(|start| {
            let end = (start + PATTERN_CHAIN_LENGTH).min(data.len());
            data.get(start..end)
        })
        .unwrap_or_default()
}

/// Interpret the chain program.
///
/// `chain` holds the program bytes, `chain_base` their absolute offset (only
/// used to report positions). Ranges are absolute file offsets computed from
/// `first_marker`.
pub fn resolve_pattern_chain(
    chain: &[u8],
    chain_base: usize,
    table: &PatternTable,
    first_marker: usize,
    sink: &mut dyn DiagnosticSink,
) -> ResolvedChain {
    let mut resolved = ResolvedChain::default();
    let mut repeats: Vec<RepeatFrame> = Vec::new();
    let mut position = 0;
    let mut steps = 0;

    while position < chain.len() {
        steps += 1;
        if steps > MAX_CHAIN_STEPS {
            sink.anomaly(&Anomaly::ChainBudgetExhausted {
                what: "chain steps",
                limit: MAX_CHAIN_STEPS,
            });
            break;
        }
        let b = chain[position];
        let absolute = chain_base + position;
        match b {
            CHAIN_END => {
                sink.line(&format!("chainPtr=0x{absolute:X} END"));
                break;
            }
            CHAIN_REPEAT_BEGIN => {
                if repeats.len() >= PATTERN_CHAIN_LENGTH {
                    sink.anomaly(&Anomaly::RepeatStackOverflow { position: absolute });
                } else {
                    repeats.push(RepeatFrame::new(position + 1));
                }
                position += 1;
            }
            CHAIN_REPEAT_END_FIRST..=CHAIN_REPEAT_END_LAST => {
                let count = usize::from(b - CHAIN_REPEAT_BEGIN);
                match repeats.last_mut() {
                    Some(frame) => {
                        let target = *frame.target.get_or_insert(count + 1);
                        frame.completed += 1;
                        if frame.completed < target {
                            sink.line(&format!(
                                "chainPtr=0x{absolute:X} repeat pass {}/{target}",
                                frame.completed + 1
                            ));
                            position = frame.return_position;
                        } else {
                            repeats.pop();
                            position += 1;
                        }
                    }
                    None => {
                        sink.anomaly(&Anomaly::UnmatchedRepeatEnd { position: absolute });
                        position += 1;
                    }
                }
            }
            CHAIN_PATTERN_FIRST..=CHAIN_PATTERN_LAST => {
                let index = usize::from(b - CHAIN_PATTERN_FIRST);
                match table.slots.get(index) {
                    None => sink.anomaly(&Anomaly::PatternIndexOutOfBounds {
                        index,
                        position: absolute,
                        table_size: table.len(),
                    }),
                    Some(None) => sink.anomaly(&Anomaly::UnusedPatternSlot {
                        index,
                        position: absolute,
                    }),
                    Some(Some(pattern)) => {
                        if resolved.ranges.len() >= MAX_RESOLVED_RANGES {
                            sink.anomaly(&Anomaly::ChainBudgetExhausted {
                                what: "pattern instances",
                                limit: MAX_RESOLVED_RANGES,
                            });
                            break;
                        }
                        let range = ByteRange {
                            start: first_marker + pattern.start.value(),
                            end: first_marker + pattern.end.value(),
                            tick_offset: resolved.total_ticks,
                        };
                        sink.line(&format!(
                            "Unrolled pattern idx={index} bars={} timeSig=0x{:02X} absStart=0x{:X} absEnd=0x{:X} tickOffset={} bar={} empty={}",
                            pattern.bar_count,
                            pattern.time_signature_code,
                            range.start,
                            range.end,
                            range.tick_offset,
                            resolved.total_bars,
                            range.is_empty()
                        ));
                        resolved.ranges.push(range);
                        resolved.total_ticks =
                            resolved.total_ticks.saturating_add(pattern.length_in_ticks());
                        resolved.total_bars += u32::from(pattern.bar_count);
                    }
                }
                position += 1;
            }
            _ => position += 1,
        }
    }

    log::debug!(
        "Pattern chain resolved into {} ranges, {} bars, {} ticks",
        resolved.ranges.len(),
        resolved.total_bars,
        resolved.total_ticks
    );
    resolved
}
