//! Audio previews: render uploaded MIDI through a SoundFont into a WAV data URL.

use anyhow::{Context, Result};
use base64::Engine as _;
use hound::{WavSpec, WavWriter};
use rustysynth::{MidiFile, MidiFileSequencer, SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

/// Seconds rendered past the end of the file so releases can ring out.
const DECAY_SECONDS: f64 = 3.0;

/// A loaded SoundFont plus output settings.
#[derive(Clone)]
pub struct Previewer {
    sound_font: Arc<SoundFont>,
    sample_rate: u32,
}

impl Previewer {
    pub fn load(soundfont_path: &Path, sample_rate: u32) -> Result<Self> {
        let bytes = std::fs::read(soundfont_path)
            .with_context(|| format!("Failed to read SoundFont {}", soundfont_path.display()))?;
        let sound_font = SoundFont::new(&mut Cursor::new(bytes)).map_err(|e| {
            let error_msg = format!("{:?}", e);
            if error_msg.contains("SanityCheckFailed") {
                anyhow::anyhow!(
                    "SoundFont failed compatibility check (RustySynth SanityCheckFailed). \
                    Try a simpler SoundFont like GeneralUser GS or FluidR3."
                )
            } else {
                anyhow::anyhow!("Failed to load SoundFont: {}", e)
            }
        })?;

        Ok(Self {
            sound_font: Arc::new(sound_font),
            sample_rate,
        })
    }

    /// Render a MIDI file to a 16-bit stereo WAV.
    pub fn render_wav(&self, midi_path: &Path) -> Result<Vec<u8>> {
        let file = File::open(midi_path)
            .with_context(|| format!("Failed to open {}", midi_path.display()))?;
        let midi = Arc::new(
            MidiFile::new(&mut BufReader::new(file))
                .map_err(|e| anyhow::anyhow!("Failed to parse MIDI file: {}", e))?,
        );

        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        let synthesizer = Synthesizer::new(&self.sound_font, &settings)
            .map_err(|e| anyhow::anyhow!("Failed to create synthesizer: {}", e))?;

        let mut sequencer = MidiFileSequencer::new(synthesizer);
        sequencer.play(&midi, false);

        let total_time = midi.get_length() + DECAY_SECONDS;
        let sample_count = (self.sample_rate as f64 * total_time) as usize;

        let mut left = vec![0f32; sample_count];
        let mut right = vec![0f32; sample_count];
        sequencer.render(&mut left[..], &mut right[..]);

        samples_to_wav(&left, &right, self.sample_rate).context("Failed to encode WAV")
    }

    /// `data:audio/wav;base64,…` for the rendered file, or `None` when
    /// rendering fails. Failures are logged, never propagated.
    pub fn data_url(&self, midi_path: &Path) -> Option<String> {
        match self.render_wav(midi_path) {
            Ok(wav) => Some(wav_data_url(&wav)),
            Err(e) => {
                tracing::warn!("Audio render failed: {:#}", e);
                None
            }
        }
    }
}

pub fn wav_data_url(wav: &[u8]) -> String {
    format!(
        "data:audio/wav;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(wav)
    )
}

/// Interleave stereo float samples into 16-bit PCM WAV bytes.
fn samples_to_wav(left: &[f32], right: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;

    for (&l, &r) in left.iter().zip(right.iter()) {
        writer.write_sample((l.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        writer.write_sample((r.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }

    writer.finalize().context("Failed to finalize WAV")?;

    Ok(cursor.into_inner())
}
