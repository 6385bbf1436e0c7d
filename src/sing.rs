//! The driver loop that renders a whole score through a synth.

use log::debug;

use crate::error::SynthResult;
use crate::score::Score;
use crate::synth::Synth;

/// Renders `score` through `synth` and returns the mono output buffer at
/// the synth's output rate.
///
/// The segment sequence is resolved and enqueued up front; each note then
/// holds the gate for `duration - trim` seconds and releases it for the
/// remaining `trim` seconds, letting vowels release into the phrase's
/// trailing transitions. Sample counts are rounded per note.
pub fn sing(synth: &mut Synth, score: &Score) -> SynthResult<Vec<f32>> {
    score.validate()?;
    for segment in score.resolve_segments(synth.voice())? {
        synth.enqueue(segment);
    }

    let output_rate = synth.output_rate();
    let total_samples: usize = score
        .notes
        .iter()
        .map(|note| {
            ((note.duration - note.trim) * output_rate).round() as usize
                + (note.trim * output_rate).round() as usize
        })
        .sum();
    let mut result = Vec::with_capacity(total_samples);

    for note in &score.notes {
        synth.set_formant_shift(note.formant_shift.unwrap_or(1.0));
        synth.set_phoneme_speed(note.phoneme_speed.unwrap_or(1.0));

        synth.note_on(note.frequency);
        for _ in 0..((note.duration - note.trim) * output_rate).round() as usize {
            result.push(synth.process());
        }
        synth.note_off();
        for _ in 0..(note.trim * output_rate).round() as usize {
            result.push(synth.process());
        }
    }

    debug!(
        "rendered {} notes to {} samples at {} Hz",
        score.notes.len(),
        result.len(),
        output_rate
    );
    Ok(result)
}
