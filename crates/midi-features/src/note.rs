use serde::{Deserialize, Serialize};

/// General MIDI percussion channel (channel 10, zero-based 9).
pub const DRUM_CHANNEL: u8 = 9;

/// A single note with absolute timing in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start: f64, end: f64) -> Self {
        Self {
            pitch,
            velocity,
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Notes played by one (track, channel, program) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub program: u8,
    pub is_drum: bool,
    pub channel: u8,
    pub track_index: usize,
    pub notes: Vec<Note>,
}

impl Instrument {
    pub fn new(program: u8, channel: u8, track_index: usize) -> Self {
        Self {
            program,
            is_drum: channel == DRUM_CHANNEL,
            channel,
            track_index,
            notes: Vec::new(),
        }
    }

    /// Notes ordered by start time. Equal starts keep their parse order.
    pub fn sorted_notes(&self) -> Vec<Note> {
        let mut notes = self.notes.clone();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        notes
    }
}
