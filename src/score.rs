//! Driver input: a prepared music score.
//!
//! Score preparation (trim computation, phoneme-to-segment resolution,
//! MIDI or JSON parsing) happens upstream; this module only carries the
//! prepared values, validates them, and resolves integer segment indices
//! against a loaded voice.

use crate::error::{SynthError, SynthResult};
use crate::synth::SegmentId;
use crate::voice::VoiceDatabase;

/// Index value encoding the silence segment in a score's segment sequence.
pub const SILENCE_INDEX: i32 = -1;

/// One note of a score.
#[derive(Clone, Copy, Debug)]
pub struct Note {
    /// Pitch in Hertz.
    pub frequency: f64,
    /// Nominal duration in seconds.
    pub duration: f64,
    /// Tail portion of the duration during which note-off is active,
    /// letting vowels release into the following transitions.
    pub trim: f64,
    /// Per-note formant shift; `None` plays at 1.0.
    pub formant_shift: Option<f64>,
    /// Per-note phoneme speed; `None` plays at 1.0.
    pub phoneme_speed: Option<f64>,
}

impl Note {
    /// A plain note with no formant shift or phoneme speed adjustment.
    pub fn new(frequency: f64, duration: f64, trim: f64) -> Self {
        Self {
            frequency,
            duration,
            trim,
            formant_shift: None,
            phoneme_speed: None,
        }
    }
}

/// A prepared score: the segment sequence to sing and the notes to sing
/// it on.
#[derive(Clone, Debug, Default)]
pub struct Score {
    /// Segment indices into the voice's segment list, with
    /// [`SILENCE_INDEX`] encoding the silence placeholder.
    pub segments: Vec<i32>,
    /// Notes in playback order.
    pub notes: Vec<Note>,
}

impl Score {
    /// Checks every note for values playback cannot interpret: negative
    /// frequency or duration, negative trim, or trim exceeding duration.
    pub fn validate(&self) -> SynthResult<()> {
        for (i, note) in self.notes.iter().enumerate() {
            if note.frequency < 0.0 {
                return Err(SynthError::InvalidScore {
                    message: format!("note {} has negative frequency {}", i, note.frequency),
                });
            }
            if note.duration < 0.0 {
                return Err(SynthError::InvalidScore {
                    message: format!("note {} has negative duration {}", i, note.duration),
                });
            }
            if note.trim < 0.0 || note.trim > note.duration {
                return Err(SynthError::InvalidScore {
                    message: format!(
                        "note {} has trim {} outside [0, {}]",
                        i, note.trim, note.duration
                    ),
                });
            }
        }
        Ok(())
    }

    /// Resolves the integer segment sequence against a voice, mapping
    /// [`SILENCE_INDEX`] to silence and every other value to a segment id.
    /// Fails with [`SynthError::UnknownSegment`] on out-of-range indices.
    pub fn resolve_segments(&self, voice: &VoiceDatabase) -> SynthResult<Vec<SegmentId>> {
        self.segments
            .iter()
            .map(|&index| {
                if index == SILENCE_INDEX {
                    Ok(SegmentId::Silence)
                } else if index >= 0 && (index as usize) < voice.num_segments() {
                    Ok(SegmentId::Segment(index as usize))
                } else {
                    Err(SynthError::UnknownSegment {
                        index,
                        segment_count: voice.num_segments(),
                    })
                }
            })
            .collect()
    }
}
