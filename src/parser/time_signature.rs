use crate::parser::kseq_types::PPQN;
use std::fmt;

/// Code of 4/4, also what unknown codes fall back to
pub const DEFAULT_TIME_SIGNATURE_CODE: u8 = 0x1C;

/// Known time signature codes: (code, numerator, denominator).
///
/// The bit layout of the codes does not follow a formula, lookups are exact.
const TIME_SIGNATURES: [(u8, u8, u8); 39] = [
    (0x04, 1, 4),
    (0x0C, 2, 4),
    (0x14, 3, 4),
    (0x1C, 4, 4),
    (0x24, 5, 4),
    (0x2C, 6, 4),
    (0x34, 7, 4),
    (0x3C, 8, 4),
    (0x44, 9, 4),
    (0x4C, 10, 4),
    (0x54, 11, 4),
    (0x5C, 12, 4),
    (0x02, 1, 8),
    (0x0A, 2, 8),
    (0x12, 3, 8),
    (0x1A, 4, 8),
    (0x22, 5, 8),
    (0x2A, 6, 8),
    (0x32, 7, 8),
    (0x3A, 8, 8),
    (0x42, 9, 8),
    (0x4A, 10, 8),
    (0x52, 11, 8),
    (0x5A, 12, 8),
    (0x06, 1, 2),
    (0x0E, 2, 2),
    (0x16, 3, 2),
    (0x1E, 4, 2),
    (0x01, 1, 16),
    (0x09, 2, 16),
    (0x11, 3, 16),
    (0x19, 4, 16),
    (0x21, 5, 16),
    (0x29, 6, 16),
    (0x31, 7, 16),
    (0x41, 9, 16),
    (0x59, 12, 16),
    (0x71, 15, 16),
    (0xA1, 21, 16),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeSignature {
    pub code: u8,
    pub numerator: u8,
    pub denominator: u8,
    /// False when the code is not in the table and 4/4 was substituted
    pub known: bool,
}

impl TimeSignature {
    pub fn from_code(code: u8) -> Self {
        TIME_SIGNATURES
            .iter()
            .find(|(c, _, _)| *c == code)
            .map_or(
                Self {
                    code,
                    numerator: 4,
                    denominator: 4,
                    known: false,
                },
                |&(code, numerator, denominator)| Self {
                    code,
                    numerator,
                    denominator,
                    known: true,
                },
            )
    }

    pub fn ticks_per_bar(&self) -> u32 {
        u32::from(self.numerator) * 4 * PPQN / u32::from(self.denominator)
    }

    /// Denominator as the power of two used by MIDI meta events
    pub const fn denominator_power(&self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.known {
            write!(f, "{}/{}", self.numerator, self.denominator)
        } else {
            write!(f, "unknown(0x{:02X})", self.code)
        }
    }
}

/// Bar length for a time signature code, shared by the pattern chain and the
/// song level bar table.
pub fn ticks_per_bar(code: u8) -> u32 {
    TimeSignature::from_code(code).ticks_per_bar()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeSignatureChange {
    pub tick: u32,
    /// 0-based bar index
    pub bar: usize,
    pub signature: TimeSignature,
}

/// Turn the per-bar code table into change points.
///
/// A change is emitted for the first bar and for every bar whose code differs
/// from the previous one. Each bar lasts according to its own signature.
pub fn resolve_time_signature_changes(table: &[u8]) -> Vec<TimeSignatureChange> {
    let mut changes = Vec::new();
    let mut tick: u32 = 0;
    let mut previous_code = None;
    for (bar, &code) in table.iter().enumerate() {
        let signature = TimeSignature::from_code(code);
        if previous_code != Some(code) {
            log::debug!("Time signature change at bar {}: {signature} (0x{code:02X})", bar + 1);
            changes.push(TimeSignatureChange {
                tick,
                bar,
                signature,
            });
            previous_code = Some(code);
        }
        tick = tick.saturating_add(signature.ticks_per_bar());
    }
    if changes.is_empty() {
        changes.push(TimeSignatureChange {
            tick: 0,
            bar: 0,
            signature: TimeSignature::from_code(DEFAULT_TIME_SIGNATURE_CODE),
        });
    }
    changes
}
