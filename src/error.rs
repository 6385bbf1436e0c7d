//! Error types for voice loading and score playback.

use thiserror::Error;

/// Result type for fallible synthesizer operations.
pub type SynthResult<T> = Result<T, SynthError>;

/// Errors reported by the voice reader and the score driver.
///
/// The per-sample path never returns an error: `Synth::process` produces
/// silence on an empty queue instead of failing.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Malformed voice file: bad magic word, unterminated or over-long
    /// name string, non-positive header field, or truncated sample payload.
    #[error("invalid voice file: {reason}")]
    InvalidVoice {
        /// What the reader objected to.
        reason: String,
    },

    /// A synth was constructed with a non-positive or non-finite output
    /// sample rate.
    #[error("invalid output sample rate: {rate}")]
    InvalidSampleRate {
        /// The rejected rate in Hertz.
        rate: f64,
    },

    /// A score referenced a segment index outside the voice's segment list.
    #[error("unknown segment index {index} (voice has {segment_count} segments)")]
    UnknownSegment {
        /// The offending index as it appeared in the score.
        index: i32,
        /// Number of segments in the loaded voice.
        segment_count: usize,
    },

    /// A score failed validation before playback started.
    #[error("invalid score: {message}")]
    InvalidScore {
        /// Which note or field was rejected.
        message: String,
    },

    /// I/O error while reading or writing a voice file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
