//! A module containing the Grain struct, one scheduled playback of a
//! pitch-synchronous wavetable frame.
//!
//! The synth spawns a grain at every phase wrap of its pitch accumulator.
//! Each grain reads one frame of the current segment (and, while a segment
//! transition is still audible, one frame of the outgoing segment) with a
//! fractional read head, then dies when the head crosses the end of the
//! frame. Grains know nothing about segments or the synth; they are purely
//! interpolating polyphonic voices that are mixed by summation.

use crate::interpolators::read_fractional;

/// Normalization factor from 16-bit PCM to float output.
const PCM_SCALE: f32 = 1.0 / 32767.0;

/// One active playback of one (or two crossfaded) wavetable frames.
/// ## Attributes
/// * `frame`: The frame of the current segment being played back
///
/// * `old_frame`: The frame of the outgoing segment, present only while a
///   segment transition is audible
///
/// * `grain_length`: Length of every frame in samples; the grain dies once
///   the read head has consumed position `grain_length - 1`
///
/// * `crossfade`: Mix weight of the outgoing frame, fixed at spawn time.
///   The time-varying transition curve emerges from successive grains
///   capturing successively smaller values
///
/// * `read_pos`: Fractional read head, advanced by `sample_step` per call
///
/// * `sample_step`: Per-sample read increment: the database/output rate
///   ratio, scaled by the formant shift in effect at spawn time
#[derive(Debug)]
pub struct Grain<'a> {
    frame: &'a [i16],
    old_frame: Option<&'a [i16]>,
    grain_length: usize,
    crossfade: f32,
    read_pos: f64,
    sample_step: f64,
    playing: bool,
}

impl<'a> Grain<'a> {
    /// Constructor for a grain over borrowed frame rows of the voice's
    /// frame table. `crossfade` is the outgoing-frame weight in [0, 1];
    /// pass `old_frame = None` when the outgoing segment is silence.
    pub fn new(
        frame: &'a [i16],
        old_frame: Option<&'a [i16]>,
        grain_length: usize,
        crossfade: f32,
        sample_step: f64,
    ) -> Self {
        Self {
            frame,
            old_frame,
            grain_length,
            crossfade,
            read_pos: 0.0,
            sample_step,
            playing: true,
        }
    }

    /// Returns the next sample of playback and advances the read head.
    ///
    /// The current frame is weighted by `1 - crossfade` and the outgoing
    /// frame by `crossfade`, both linearly interpolated at the read head
    /// and scaled down from 16-bit PCM. Every read position up to and
    /// including `grain_length - 1` is consumed; the grain dies once the
    /// head has moved past the final sample, and returns 0 thereafter.
    pub fn process(&mut self) -> f32 {
        if !self.playing {
            return 0.0;
        }

        let mut result = read_fractional(self.frame, self.read_pos) * (1.0 - self.crossfade);
        if self.crossfade != 0.0 {
            if let Some(old_frame) = self.old_frame {
                result += read_fractional(old_frame, self.read_pos) * self.crossfade;
            }
        }

        self.read_pos += self.sample_step;
        if self.read_pos > (self.grain_length - 1) as f64 {
            self.playing = false;
        }

        result * PCM_SCALE
    }

    /// Whether the grain still has samples to contribute.
    pub fn playing(&self) -> bool {
        self.playing
    }
}
