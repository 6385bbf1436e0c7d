//! Frequency conversion helpers for callers preparing scores from
//! MIDI-style pitch data.

/// Converts a MIDI note number to a frequency in Hertz (A4 = 69 = 440 Hz).
pub fn midi_note_to_hertz(midi_note: f64) -> f64 {
    440.0 * 2.0_f64.powf((midi_note - 69.0) / 12.0)
}

/// Converts a frequency in Hertz to a (possibly fractional) MIDI note number.
pub fn hertz_to_midi_note(hertz: f64) -> f64 {
    (hertz / 440.0).log2() * 12.0 + 69.0
}

/// Returns the frequency ratio of the note `step` semitones above a root.
/// Example:
///
/// ` semitone_to_hz_ratio(12) -> 2.0 `
/// ` semitone_to_hz_ratio(-12) -> 0.5 `
pub fn semitone_to_hz_ratio(step: i8) -> f32 {
    2.0_f32.powf(step as f32 / 12.0)
}
