use crate::parser::time_signature::TimeSignature;

#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    /// The tick at which the event occurs.
    pub tick: u32,
    /// The type of the event.
    pub event: MidiEventType,
}

impl MidiEvent {
    pub const fn new(tick: u32, event: MidiEventType) -> Self {
        Self { tick, event }
    }

    pub const fn new_note_on(tick: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(tick, MidiEventType::NoteOn(channel, key, velocity))
    }

    pub const fn new_note_off(tick: u32, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(tick, MidiEventType::NoteOff(channel, key, velocity))
    }

    pub fn new_tempo_change(tick: u32, bpm: f64) -> Self {
        Self::new(tick, MidiEventType::TempoChange(bpm))
    }

    pub const fn is_note_event(&self) -> bool {
        matches!(
            self.event,
            MidiEventType::NoteOn(..) | MidiEventType::NoteOff(..)
        )
    }
}

/// Channels are 0-based (0-15).
#[derive(Clone, Debug, PartialEq)]
pub enum MidiEventType {
    NoteOn(u8, u8, u8),          // channel, note, velocity
    NoteOff(u8, u8, u8),         // channel, note, velocity
    PolyPressure(u8, u8, u8),    // channel, note, pressure
    ControlChange(u8, u8, u8),   // channel, controller, value
    ProgramChange(u8, u8),       // channel, program
    ChannelPressure(u8, u8),     // channel, pressure
    PitchBend(u8, u16),          // channel, 14 bit value
    TempoChange(f64),            // tempo in BPM
    TimeSignature(TimeSignature),
    TrackName(String),
}
