//! Minimal Standard MIDI File writer.
//!
//! Used to build fixture files and to re-encode small scores. Each
//! [`WriterTrack`] becomes one format-1 track on a single channel.

/// One track's worth of events on a single channel.
#[derive(Debug, Clone)]
pub struct WriterTrack {
    channel: u8,
    events: Vec<(u64, Vec<u8>)>,
}

impl WriterTrack {
    /// A track on `channel` that opens with a program change.
    pub fn new(channel: u8, program: u8) -> Self {
        let channel = channel.min(15);
        Self {
            channel,
            events: vec![(0, vec![0xC0 | channel, program & 0x7F])],
        }
    }

    pub fn tempo(&mut self, tick: u64, microseconds_per_beat: u32) -> &mut Self {
        let usec = microseconds_per_beat;
        self.events.push((
            tick,
            vec![
                0xFF,
                0x51,
                0x03,
                (usec >> 16) as u8,
                (usec >> 8) as u8,
                usec as u8,
            ],
        ));
        self
    }

    pub fn program_change(&mut self, tick: u64, program: u8) -> &mut Self {
        self.events
            .push((tick, vec![0xC0 | self.channel, program & 0x7F]));
        self
    }

    pub fn note(&mut self, onset: u64, offset: u64, pitch: u8, velocity: u8) -> &mut Self {
        self.events.push((
            onset,
            vec![0x90 | self.channel, pitch & 0x7F, velocity.clamp(1, 127)],
        ));
        self.events
            .push((offset, vec![0x80 | self.channel, pitch & 0x7F, 0]));
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut events = self.events.clone();

        // Sort by tick, with note-offs before note-ons at the same tick
        events.sort_by(|a, b| {
            a.0.cmp(&b.0).then_with(|| {
                let a_is_off = a.1.first().is_some_and(|b| b & 0xF0 == 0x80);
                let b_is_off = b.1.first().is_some_and(|b| b & 0xF0 == 0x80);
                b_is_off.cmp(&a_is_off)
            })
        });

        let mut track_data = Vec::new();
        let mut last_tick = 0u64;

        for (tick, data) in events {
            let delta = tick.saturating_sub(last_tick);
            write_vlq(&mut track_data, delta as u32);
            track_data.extend_from_slice(&data);
            last_tick = tick;
        }

        // End of track
        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

        track_data
    }
}

/// Assemble a format-1 MIDI file from tracks.
pub fn score_to_midi(ppq: u16, tracks: &[WriterTrack]) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&ppq.to_be_bytes());

    for track in tracks {
        let track_data = track.encode();
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track_data);
    }

    buf
}

/// Build a single-instrument file of `count` back-to-back notes, one beat each
/// at 120 BPM, cycling through `pitches`.
pub fn monophonic_midi(count: usize, pitches: &[u8], program: u8) -> Vec<u8> {
    let mut track = WriterTrack::new(0, program);
    track.tempo(0, 500_000);
    let ppq = 480u64;
    for i in 0..count {
        let pitch = pitches.get(i % pitches.len().max(1)).copied().unwrap_or(60);
        let velocity = if i % 4 == 0 { 100 } else { 64 };
        track.note(i as u64 * ppq, (i as u64 + 1) * ppq, pitch, velocity);
    }
    score_to_midi(ppq as u16, &[track])
}

/// Write a variable-length quantity to a byte buffer.
fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut bytes = Vec::new();
    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}
