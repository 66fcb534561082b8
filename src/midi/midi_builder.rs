use crate::diagnostics::DiagnosticSink;
use crate::error::Anomaly;
use crate::midi::midi_event::{MidiEvent, MidiEventType};
use crate::midi::{DEFAULT_BPM, FIRST_TICK, PPQN};
use crate::parser::event_decoder::SongTrack;
use crate::parser::song_parser::Song;

/// Destination of an assembled multi-track sequence.
pub trait SequenceSink {
    /// Append an empty track and return its index
    fn create_track(&mut self) -> usize;
    fn push_event(&mut self, track: usize, event: MidiEvent);
    /// Close the sequence, no event is pushed afterwards
    fn finish(&mut self, ppqn: u32);
}

pub struct MidiBuilder {
    tracks: Vec<Vec<MidiEvent>>, // tracks accumulated during build
}

impl MidiBuilder {
    pub const fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Lay out the song as MIDI tracks.
    ///
    /// Order: tempo and title, time signatures, song tracks by number, pattern
    /// track. Events of each track are stably sorted by tick.
    pub fn build_for_song(
        mut self,
        song: &Song,
        sink: &mut dyn DiagnosticSink,
    ) -> Vec<Vec<MidiEvent>> {
        self.add_tempo_track(song, sink);
        self.add_time_signature_track(song);
        for track in song.tracks.iter().chain(song.pattern_track.as_ref()) {
            log::debug!(
                "building events for track {} on channel {} ({} note events)",
                track.number,
                track.channel + 1,
                track.events.iter().filter(|e| e.is_note_event()).count()
            );
            self.add_song_track(track, sink);
        }
        for events in &mut self.tracks {
            events.sort_by_key(|event| event.tick);
        }
        self.tracks
    }

    fn add_tempo_track(&mut self, song: &Song, sink: &mut dyn DiagnosticSink) {
        let mut events = Vec::with_capacity(2);
        if !song.header.title.is_empty() {
            events.push(MidiEvent::new(
                FIRST_TICK,
                MidiEventType::TrackName(song.header.title.clone()),
            ));
        }
        let bpm = checked_tempo(f64::from(song.header.tempo), sink);
        events.push(MidiEvent::new_tempo_change(FIRST_TICK, bpm));
        self.tracks.push(events);
    }

    fn add_time_signature_track(&mut self, song: &Song) {
        let events = song
            .time_signatures
            .iter()
            .map(|change| {
                MidiEvent::new(change.tick, MidiEventType::TimeSignature(change.signature))
            })
            .collect();
        self.tracks.push(events);
    }

    fn add_song_track(&mut self, track: &SongTrack, sink: &mut dyn DiagnosticSink) {
        let events = track
            .events
            .iter()
            .map(|event| match event.event {
                MidiEventType::TempoChange(bpm) => {
                    MidiEvent::new_tempo_change(event.tick, checked_tempo(bpm, sink))
                }
                _ => event.clone(),
            })
            .collect();
        self.tracks.push(events);
    }
}

impl Default for MidiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tempos rounding below 1 BPM cannot be encoded and fall back to the default.
fn checked_tempo(bpm: f64, sink: &mut dyn DiagnosticSink) -> f64 {
    if bpm.round() >= 1.0 {
        bpm
    } else {
        sink.anomaly(&Anomaly::InvalidTempo { bpm });
        DEFAULT_BPM
    }
}

/// Build the song tracks and hand them over to `output`.
pub fn write_sequence(
    song: &Song,
    output: &mut dyn SequenceSink,
    sink: &mut dyn DiagnosticSink,
) {
    let tracks = MidiBuilder::new().build_for_song(song, sink);
    for events in tracks {
        let track = output.create_track();
        for event in events {
            output.push_event(track, event);
        }
    }
    output.finish(PPQN);
}
