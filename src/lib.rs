//! A diphone concatenative singing-voice synthesizer.
//! A precompiled voice (pitch-synchronous wavetable frames extracted from
//! recorded phonemes and diphone transitions) is loaded into a VoiceDatabase,
//! a Synth plays queued segments as overlap-added grains at the requested
//! pitch, and sing() renders a whole prepared score to a mono float buffer.
//! write_wav() persists rendered audio to a .wav file.
//! load_voice() loads a compiled voice file from disk.
#![warn(missing_docs)]

pub mod error;
pub mod grain;
pub mod interpolators;
pub mod pitch;
pub mod score;
pub mod sing;
pub mod synth;
pub mod voice;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::SynthResult;
use crate::voice::VoiceDatabase;

/// Loads a compiled voice file from disk.
/// # Returns
/// * A result containing either the parsed voice or the error the reader
///   stopped on
/// # Parameters
/// * `path`: Path to the voice file
pub fn load_voice(path: impl AsRef<Path>) -> SynthResult<VoiceDatabase> {
    let file = File::open(path)?;
    VoiceDatabase::load(BufReader::new(file))
}

/// Writes mono float samples to a wav file at string path
/// # Parameters
/// * `path`: A string containing the relative path to the file to be written to (must include .wav file extension)
/// * `samples`: The mono f32 samples to write
/// * `sample_rate`: The sample rate the audio was rendered at
pub fn write_wav(path: &str, samples: &[f32], sample_rate: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).expect("could not create writer");

    for sample in samples {
        writer
            .write_sample(*sample)
            .expect("error occurred while writing sample");
    }
    writer.finalize().expect("issue with finalization")
}
