//! Standard MIDI File output backed by `midly`

use crate::midi::midi_builder::SequenceSink;
use crate::midi::midi_event::{MidiEvent, MidiEventType};
use crate::midi::{DEFAULT_BPM, PPQN};
use crate::KseqError;
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::path::Path;

const MAX_DELTA: u32 = (1 << 28) - 1;
const MAX_TEMPO: u32 = (1 << 24) - 1;

/// Multi-track sequence written as an SMF format 1 file.
#[derive(Debug, Clone, PartialEq)]
pub struct SmfSequence {
    tracks: Vec<Vec<MidiEvent>>,
    ppqn: u16,
    finished: bool,
}

impl SmfSequence {
    pub const fn new() -> Self {
        Self {
            tracks: Vec::new(),
            ppqn: PPQN as u16,
            finished: false,
        }
    }

    pub fn tracks(&self) -> &[Vec<MidiEvent>] {
        &self.tracks
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    fn to_smf(&self) -> Smf<'_> {
        let header = Header::new(Format::Parallel, Timing::Metrical(u15::new(self.ppqn)));
        let mut smf = Smf::new(header);
        for events in &self.tracks {
            let mut track = Vec::with_capacity(events.len() + 1);
            let mut last_tick = 0;
            for event in events {
                let delta = event.tick.saturating_sub(last_tick).min(MAX_DELTA);
                last_tick = last_tick.max(event.tick);
                track.push(TrackEvent {
                    delta: u28::new(delta),
                    kind: track_event_kind(&event.event),
                });
            }
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        smf
    }

    /// Encode the whole file in memory
    pub fn to_bytes(&self) -> Result<Vec<u8>, KseqError> {
        if !self.finished {
            return Err(KseqError::MidiError(
                "sequence written before being finished".to_string(),
            ));
        }
        let mut bytes = Vec::new();
        self.to_smf()
            .write_std(&mut bytes)
            .map_err(|err| KseqError::MidiError(format!("could not encode MIDI file {err}")))?;
        Ok(bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), KseqError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        log::info!(
            "Wrote {} tracks to {}",
            self.tracks.len(),
            path.display()
        );
        Ok(())
    }
}

impl Default for SmfSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceSink for SmfSequence {
    fn create_track(&mut self) -> usize {
        self.tracks.push(Vec::new());
        self.tracks.len() - 1
    }

    fn push_event(&mut self, track: usize, event: MidiEvent) {
        match self.tracks.get_mut(track) {
            Some(events) => events.push(event),
            None => log::warn!("Dropping event for missing track {track}"),
        }
    }

    fn finish(&mut self, ppqn: u32) {
        self.ppqn = u16::try_from(ppqn).unwrap_or(PPQN as u16);
        self.finished = true;
    }
}

/// Microseconds per quarter note, `60_000_000 / round(bpm)`.
pub fn micros_per_quarter(bpm: f64) -> u32 {
    let rounded = bpm.round();
    let bpm = if rounded >= 1.0 {
        rounded
    } else {
        log::warn!("Tempo {bpm:.2} BPM cannot be encoded, using {DEFAULT_BPM} BPM");
        DEFAULT_BPM
    };
    ((60_000_000.0 / bpm) as u32).min(MAX_TEMPO)
}

fn track_event_kind(event: &MidiEventType) -> TrackEventKind<'_> {
    let midi = |channel: u8, message: MidiMessage| TrackEventKind::Midi {
        channel: u4::new(channel & 0x0F),
        message,
    };
    match event {
        MidiEventType::NoteOn(channel, key, velocity) => midi(
            *channel,
            MidiMessage::NoteOn {
                key: u7::new(*key & 0x7F),
                vel: u7::new(*velocity & 0x7F),
            },
        ),
        MidiEventType::NoteOff(channel, key, velocity) => midi(
            *channel,
            MidiMessage::NoteOff {
                key: u7::new(*key & 0x7F),
                vel: u7::new(*velocity & 0x7F),
            },
        ),
        MidiEventType::PolyPressure(channel, key, pressure) => midi(
            *channel,
            MidiMessage::Aftertouch {
                key: u7::new(*key & 0x7F),
                vel: u7::new(*pressure & 0x7F),
            },
        ),
        MidiEventType::ControlChange(channel, controller, value) => midi(
            *channel,
            MidiMessage::Controller {
                controller: u7::new(*controller & 0x7F),
                value: u7::new(*value & 0x7F),
            },
        ),
        MidiEventType::ProgramChange(channel, program) => midi(
            *channel,
            MidiMessage::ProgramChange {
                program: u7::new(*program & 0x7F),
            },
        ),
        MidiEventType::ChannelPressure(channel, pressure) => midi(
            *channel,
            MidiMessage::ChannelAftertouch {
                vel: u7::new(*pressure & 0x7F),
            },
        ),
        MidiEventType::PitchBend(channel, value) => midi(
            *channel,
            MidiMessage::PitchBend {
                bend: PitchBend(u14::new(*value & 0x3FFF)),
            },
        ),
        MidiEventType::TempoChange(bpm) => {
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_quarter(*bpm))))
        }
        MidiEventType::TimeSignature(signature) => TrackEventKind::Meta(MetaMessage::TimeSignature(
            signature.numerator,
            signature.denominator_power(),
            24,
            8,
        )),
        MidiEventType::TrackName(name) => {
            TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::time_signature::TimeSignature;

    fn finished_sequence(tracks: Vec<Vec<MidiEvent>>) -> SmfSequence {
        let mut sequence = SmfSequence::new();
        for events in tracks {
            let track = sequence.create_track();
            for event in events {
                sequence.push_event(track, event);
            }
        }
        sequence.finish(PPQN);
        sequence
    }

    #[test]
    fn test_micros_per_quarter() {
        assert_eq!(micros_per_quarter(120.0), 500_000);
        assert_eq!(micros_per_quarter(60.0), 1_000_000);
        assert_eq!(micros_per_quarter(99.6), 600_000);
        assert_eq!(micros_per_quarter(0.0), 500_000);
        assert_eq!(micros_per_quarter(0.4), 500_000);
        // longest encodable tempo
        assert_eq!(micros_per_quarter(1.0), MAX_TEMPO);
    }

    #[test]
    fn test_unfinished_sequence_is_rejected() {
        let sequence = SmfSequence::new();
        assert!(matches!(sequence.to_bytes(), Err(KseqError::MidiError(_))));
    }

    #[test]
    fn test_written_file() {
        let sequence = finished_sequence(vec![
            vec![
                MidiEvent::new(0, MidiEventType::TrackName("DEMO".to_string())),
                MidiEvent::new_tempo_change(0, 100.0),
            ],
            vec![MidiEvent::new(
                0,
                MidiEventType::TimeSignature(TimeSignature::from_code(0x2A)),
            )],
            vec![
                MidiEvent::new_note_on(5, 9, 60, 100),
                MidiEvent::new(5, MidiEventType::PitchBend(9, 0x2000)),
                MidiEvent::new_note_off(13, 9, 60, 100),
            ],
        ]);
        assert!(sequence.is_finished());
        let bytes = sequence.to_bytes().unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(96)));
        assert_eq!(smf.tracks.len(), 3);

        let meta = &smf.tracks[0];
        assert_eq!(
            meta[0].kind,
            TrackEventKind::Meta(MetaMessage::TrackName(b"DEMO"))
        );
        assert_eq!(
            meta[1].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(600_000)))
        );
        assert_eq!(
            meta[2].kind,
            TrackEventKind::Meta(MetaMessage::EndOfTrack)
        );
        assert_eq!(
            smf.tracks[1][0].kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(6, 3, 24, 8))
        );

        let notes = &smf.tracks[2];
        let deltas: Vec<u32> = notes.iter().map(|e| e.delta.as_int()).collect();
        assert_eq!(deltas, vec![5, 0, 8, 0]);
        assert_eq!(
            notes[0].kind,
            TrackEventKind::Midi {
                channel: u4::new(9),
                message: MidiMessage::NoteOn {
                    key: u7::new(60),
                    vel: u7::new(100)
                }
            }
        );
        assert_eq!(
            notes[1].kind,
            TrackEventKind::Midi {
                channel: u4::new(9),
                message: MidiMessage::PitchBend {
                    bend: PitchBend(u14::new(0x2000))
                }
            }
        );
        assert_eq!(
            notes[2].kind,
            TrackEventKind::Midi {
                channel: u4::new(9),
                message: MidiMessage::NoteOff {
                    key: u7::new(60),
                    vel: u7::new(100)
                }
            }
        );
    }

    #[test]
    fn test_empty_track_has_end_of_track() {
        let bytes = finished_sequence(vec![vec![]]).to_bytes().unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks[0].len(), 1);
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::EndOfTrack)
        );
    }

    #[test]
    fn test_event_for_missing_track_is_dropped() {
        let mut sequence = SmfSequence::new();
        sequence.push_event(3, MidiEvent::new_note_on(0, 0, 60, 100));
        assert!(sequence.tracks().is_empty());
    }
}
