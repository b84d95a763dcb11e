use crate::note::{Instrument, Note};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Microseconds per quarter note assumed until the first tempo event (120 BPM).
const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub microseconds_per_beat: u32,
    pub bpm: f64,
}

/// Knobs for [`parse_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Ignore tempo events found on tracks other than the first.
    pub first_track_tempo_only: bool,
}

/// A parsed MIDI file: instruments with seconds-timed notes plus the tempo map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiScore {
    /// Ticks per quarter note, or 0 for SMPTE-timed files.
    pub resolution: u16,
    pub format: u8,
    pub track_count: usize,
    pub tempo_changes: Vec<TempoChange>,
    pub instruments: Vec<Instrument>,
    /// Tempo, key or time signature events appeared on a track other than the first.
    pub nonzero_track_meta: bool,
}

impl MidiScore {
    pub fn note_count(&self) -> usize {
        self.instruments.iter().map(|i| i.notes.len()).sum()
    }

    /// Every note of every instrument (drums included), ordered by start time.
    pub fn all_notes_sorted(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .instruments
            .iter()
            .flat_map(|i| i.notes.iter().copied())
            .collect();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        notes
    }

    /// Time of the last note offset, in seconds.
    pub fn end_time(&self) -> f64 {
        self.instruments
            .iter()
            .flat_map(|i| i.notes.iter())
            .map(|n| n.end)
            .fold(0.0, f64::max)
    }

    pub fn pitched_instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter().filter(|i| !i.is_drum)
    }
}

/// Converts absolute ticks into seconds.
enum Clock {
    Metrical {
        /// (tick, seconds at tick, seconds per tick from here on)
        segments: Vec<(u64, f64, f64)>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl Clock {
    fn metrical(ppq: u16, tempo_changes: &[TempoChange]) -> Self {
        let ppq = ppq.max(1) as f64;
        let spt = |usec: u32| usec as f64 / 1_000_000.0 / ppq;

        let mut segments = vec![(0u64, 0.0f64, spt(DEFAULT_MICROSECONDS_PER_BEAT))];
        for change in tempo_changes {
            let (tick, secs, rate) = *segments.last().unwrap_or(&(0, 0.0, 0.0));
            if change.tick == tick {
                segments.pop();
                segments.push((tick, secs, spt(change.microseconds_per_beat)));
            } else {
                let at = secs + (change.tick - tick) as f64 * rate;
                segments.push((change.tick, at, spt(change.microseconds_per_beat)));
            }
        }
        Clock::Metrical { segments }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            Clock::Metrical { segments } => {
                let idx = segments.partition_point(|(t, _, _)| *t <= tick);
                let (t, secs, rate) = segments[idx.saturating_sub(1)];
                secs + tick.saturating_sub(t) as f64 * rate
            }
            Clock::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

/// Parse MIDI bytes with default options.
pub fn parse(midi_bytes: &[u8]) -> crate::Result<MidiScore> {
    parse_with(midi_bytes, ParseOptions::default())
}

/// Parse MIDI bytes into instruments with seconds-timed notes.
pub fn parse_with(midi_bytes: &[u8], options: ParseOptions) -> crate::Result<MidiScore> {
    let smf = Smf::parse(midi_bytes).map_err(|e| crate::Error::MidiParse(e.to_string()))?;

    let format = match smf.header.format {
        midly::Format::SingleTrack => 0,
        midly::Format::Parallel => 1,
        midly::Format::Sequential => 2,
    };

    let (tempo_changes, nonzero_track_meta) = collect_tempo_map(&smf, options);

    let (resolution, clock) = match smf.header.timing {
        Timing::Metrical(ticks) => {
            let ppq = ticks.as_int();
            (ppq, Clock::metrical(ppq, &tempo_changes))
        }
        Timing::Timecode(fps, subframes) => (
            0,
            Clock::Timecode {
                ticks_per_second: (fps.as_f32() as f64 * subframes.max(1) as f64).max(1.0),
            },
        ),
    };

    let mut instruments: Vec<Instrument> = Vec::new();
    let mut instrument_index: HashMap<(usize, u8, u8), usize> = HashMap::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        let mut programs = [0u8; 16];
        // (channel, key) -> open notes as (onset_tick, velocity)
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let ch = channel.as_int();
            match message {
                MidiMessage::ProgramChange { program } => {
                    programs[ch as usize] = program.as_int();
                }
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    pending
                        .entry((ch, key.as_int()))
                        .or_default()
                        .push((current_tick, vel.as_int()));
                }
                MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                    // vel=0 NoteOn is NoteOff
                    let pitch = key.as_int();
                    let Some(open) = pending.remove(&(ch, pitch)) else {
                        continue;
                    };

                    // One release ends every open note of the pitch, except
                    // those struck on this same tick
                    let (same_tick, to_close): (Vec<_>, Vec<_>) = open
                        .into_iter()
                        .partition(|&(onset, _)| onset == current_tick);

                    if !to_close.is_empty() {
                        let program = programs[ch as usize];
                        let idx = *instrument_index
                            .entry((track_index, ch, program))
                            .or_insert_with(|| {
                                instruments.push(Instrument::new(program, ch, track_index));
                                instruments.len() - 1
                            });
                        let end = clock.seconds(current_tick);
                        for (onset, velocity) in to_close {
                            instruments[idx].notes.push(Note::new(
                                pitch,
                                velocity,
                                clock.seconds(onset),
                                end,
                            ));
                        }
                        if !same_tick.is_empty() {
                            pending.insert((ch, pitch), same_tick);
                        }
                    }
                }
                _ => {}
            }
        }
        // Notes never released are dropped
    }

    Ok(MidiScore {
        resolution,
        format,
        track_count: smf.tracks.len(),
        tempo_changes,
        instruments,
        nonzero_track_meta,
    })
}

fn collect_tempo_map(smf: &Smf, options: ParseOptions) -> (Vec<TempoChange>, bool) {
    let mut tempo_changes = Vec::new();
    let mut nonzero_track_meta = false;

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        for event in track {
            current_tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    if track_index > 0 {
                        nonzero_track_meta = true;
                        if options.first_track_tempo_only {
                            continue;
                        }
                    }
                    let usec = tempo.as_int().max(1);
                    tempo_changes.push(TempoChange {
                        tick: current_tick,
                        microseconds_per_beat: usec,
                        bpm: 60_000_000.0 / usec as f64,
                    });
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(..))
                | TrackEventKind::Meta(MetaMessage::TimeSignature(..))
                    if track_index > 0 =>
                {
                    nonzero_track_meta = true;
                }
                _ => {}
            }
        }
    }

    // Stable sort keeps the later of two same-tick events last
    tempo_changes.sort_by_key(|t| t.tick);
    tempo_changes.dedup_by(|later, earlier| {
        if later.tick == earlier.tick {
            *earlier = *later;
            true
        } else {
            false
        }
    });

    (tempo_changes, nonzero_track_meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{score_to_midi, WriterTrack};

    fn make_test_midi_format1() -> Vec<u8> {
        // Build a minimal format-1 MIDI with 2 tracks
        let mut buf = Vec::new();

        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
        buf.extend_from_slice(&2u16.to_be_bytes()); // 2 tracks
        buf.extend_from_slice(&480u16.to_be_bytes()); // 480 ppq

        // Track 0: 120 BPM (500000 usec/beat), then end of track
        let mut track0 = Vec::new();
        track0.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        track0.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track0.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track0);

        // Track 1: program 40, then C4 E4 G4, one beat each
        let mut track1 = Vec::new();
        track1.extend_from_slice(&[0x00, 0xC0, 40]);
        track1.extend_from_slice(&[0x00, 0x90, 60, 100]);
        track1.extend_from_slice(&[0x83, 0x60, 0x80, 60, 0]);
        track1.extend_from_slice(&[0x00, 0x90, 64, 70]);
        track1.extend_from_slice(&[0x83, 0x60, 0x90, 64, 0]); // vel 0 note-on
        track1.extend_from_slice(&[0x00, 0x90, 67, 100]);
        track1.extend_from_slice(&[0x83, 0x60, 0x80, 67, 0]);
        track1.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track1.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track1);

        buf
    }

    #[test]
    fn notes_are_timed_in_seconds() {
        let score = parse(&make_test_midi_format1()).unwrap();

        assert_eq!(score.resolution, 480);
        assert_eq!(score.format, 1);
        assert_eq!(score.track_count, 2);
        assert_eq!(score.instruments.len(), 1);

        let inst = &score.instruments[0];
        assert_eq!(inst.program, 40);
        assert_eq!(inst.track_index, 1);
        assert!(!inst.is_drum);

        let starts: Vec<f64> = inst.notes.iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0.0, 0.5, 1.0]);
        assert!((inst.notes[1].duration() - 0.5).abs() < 1e-9);
        assert_eq!(inst.notes[1].velocity, 70);
        assert!(!score.nonzero_track_meta);
    }

    #[test]
    fn tempo_change_mid_file() {
        // One beat at 120 BPM, then 60 BPM
        let mut track = WriterTrack::new(0, 0);
        track.tempo(0, 500_000);
        track.tempo(480, 1_000_000);
        track.note(0, 480, 60, 90);
        track.note(480, 960, 62, 90);
        let bytes = score_to_midi(480, &[track]);

        let score = parse(&bytes).unwrap();
        let notes = &score.instruments[0].notes;
        assert!((notes[0].end - 0.5).abs() < 1e-9);
        assert!((notes[1].start - 0.5).abs() < 1e-9);
        assert!((notes[1].end - 1.5).abs() < 1e-9);
        assert_eq!(score.tempo_changes.len(), 2);
    }

    /// A single-track format-0 file at 480 ppq and 120 BPM around raw track events.
    fn single_track(events: &[u8]) -> Vec<u8> {
        let mut track = events.to_vec();
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&480u16.to_be_bytes());
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track);
        buf
    }

    fn spans(score: &MidiScore) -> Vec<(f64, f64)> {
        score.instruments[0]
            .notes
            .iter()
            .map(|n| (n.start, n.end))
            .collect()
    }

    #[test]
    fn first_release_ends_every_open_note_of_the_pitch() {
        let mut track = WriterTrack::new(0, 0);
        track.note(0, 960, 60, 80);
        track.note(480, 1440, 60, 100);
        let score = parse(&score_to_midi(480, &[track])).unwrap();

        assert_eq!(spans(&score), vec![(0.0, 1.0), (0.5, 1.0)]);
        assert_eq!(score.instruments[0].notes[0].velocity, 80);
        assert_eq!(score.instruments[0].notes[1].velocity, 100);
    }

    #[test]
    fn release_on_the_strike_tick_keeps_the_new_note_open() {
        // on C4 @0, on C4 @480, off C4 @480, off C4 @960
        let score = parse(&single_track(&[
            0x00, 0x90, 60, 90, //
            0x83, 0x60, 0x90, 60, 70, //
            0x00, 0x80, 60, 0, //
            0x83, 0x60, 0x80, 60, 0,
        ]))
        .unwrap();

        assert_eq!(spans(&score), vec![(0.0, 0.5), (0.5, 1.0)]);
    }

    #[test]
    fn unreleased_notes_are_dropped() {
        // Ten released notes, then one note-on that never ends
        let mut events = Vec::new();
        for i in 0..10u8 {
            events.extend_from_slice(&[0x00, 0x90, 60 + i, 90, 0x83, 0x60, 0x80, 60 + i, 0]);
        }
        events.extend_from_slice(&[0x00, 0x90, 72, 90, 0x83, 0x60, 0xB0, 7, 100]);
        let score = parse(&single_track(&events)).unwrap();

        assert_eq!(score.note_count(), 10);
        assert!(score.instruments[0].notes.iter().all(|n| n.pitch != 72));
    }

    #[test]
    fn zero_length_notes_are_dropped() {
        let score = parse(&single_track(&[
            0x00, 0x90, 60, 90, //
            0x00, 0x80, 60, 0, //
            0x00, 0x90, 62, 90, //
            0x83, 0x60, 0x80, 62, 0,
        ]))
        .unwrap();

        assert_eq!(score.note_count(), 1);
        assert_eq!(score.instruments[0].notes[0].pitch, 62);
    }

    #[test]
    fn simultaneous_onsets_keep_release_order() {
        let mut track = WriterTrack::new(0, 0);
        track.note(0, 480, 67, 90);
        track.note(0, 480, 64, 90);
        track.note(0, 480, 60, 90);
        let score = parse(&score_to_midi(480, &[track])).unwrap();

        let pitches: Vec<u8> = score.instruments[0]
            .sorted_notes()
            .iter()
            .map(|n| n.pitch)
            .collect();
        assert_eq!(pitches, vec![67, 64, 60]);
    }

    #[test]
    fn program_at_release_picks_the_instrument() {
        let mut track = WriterTrack::new(0, 0);
        track.note(0, 960, 60, 90);
        track.program_change(480, 40);
        let score = parse(&score_to_midi(480, &[track])).unwrap();

        assert_eq!(score.instruments.len(), 1);
        assert_eq!(score.instruments[0].program, 40);
    }

    #[test]
    fn drum_channel_and_program_split_instruments() {
        let mut piano = WriterTrack::new(0, 0);
        piano.note(0, 480, 60, 90);
        let mut drums = WriterTrack::new(9, 0);
        drums.note(0, 120, 36, 110);

        let score = parse(&score_to_midi(480, &[piano, drums])).unwrap();
        assert_eq!(score.instruments.len(), 2);
        assert_eq!(score.pitched_instruments().count(), 1);
        assert_eq!(score.all_notes_sorted().len(), 2);
    }

    #[test]
    fn nonzero_track_tempo_is_flagged_and_can_be_ignored() {
        let conductor = WriterTrack::new(0, 0);
        let mut melody = WriterTrack::new(0, 0);
        melody.tempo(0, 1_000_000);
        melody.note(0, 480, 60, 90);
        let bytes = score_to_midi(480, &[conductor, melody]);

        let score = parse(&bytes).unwrap();
        assert!(score.nonzero_track_meta);
        assert!((score.end_time() - 1.0).abs() < 1e-9);

        let fixed = parse_with(
            &bytes,
            ParseOptions {
                first_track_tempo_only: true,
            },
        )
        .unwrap();
        assert!((fixed.end_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse(b"not a midi file").unwrap_err();
        assert!(matches!(err, crate::Error::MidiParse(_)));
    }
}
