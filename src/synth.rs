//! The per-sample diphone synthesis engine.
//!
//! A `Synth` consumes a queue of segment ids together with note-on/note-off
//! events and produces one output sample per `process` call. A phase
//! accumulator running at the note frequency schedules overlap-added
//! pitch-synchronous grains drawn from the voice's frame table; segment
//! transitions install a 30 ms linear crossfade that successive grains
//! capture at spawn time. Long segments (vowels) sustain by looping until a
//! note-off advances the queue; short segments play through at their
//! natural length. The per-sample path never allocates outside the grain
//! list and never fails: an empty queue produces silence.

use std::collections::VecDeque;

use crate::error::{SynthError, SynthResult};
use crate::grain::Grain;
use crate::voice::VoiceDatabase;

/// Duration of the linear crossfade between successive segments, seconds.
const CROSSFADE_LENGTH: f64 = 0.03;

/// Identifies one entry of the segment queue: either the silence
/// placeholder that separates phrases, or an index into the voice's
/// segment list.
///
/// Silence emits no grains but still consumes time and queue slots; at the
/// head of the queue it gates consumption of the next note-on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SegmentId {
    /// The silence placeholder.
    Silence,
    /// A segment, by index into the voice's segment list.
    Segment(usize),
}

/// Playback position within the current segment, plus the outgoing
/// segment's identity and clock for as long as a transition is audible.
#[derive(Debug)]
struct SegmentCursor {
    current: SegmentId,
    time: f64,
    length: f64,
    long: bool,
    old: Option<SegmentId>,
    old_time: f64,
}

impl SegmentCursor {
    fn new() -> Self {
        Self {
            current: SegmentId::Silence,
            time: 0.0,
            length: 0.0,
            long: false,
            old: None,
            old_time: 0.0,
        }
    }

    /// Swaps the current segment into the outgoing slot and installs
    /// `next`. Returns true when this is the first installation since
    /// construction, in which case the caller starts without a crossfade.
    fn begin_new(&mut self, next: SegmentId, voice: &VoiceDatabase) -> bool {
        let first = self.old.is_none();
        self.old = Some(self.current);
        self.old_time = self.time;
        self.current = next;
        self.time = 0.0;
        match next {
            SegmentId::Silence => {
                self.length = 0.0;
                self.long = false;
            }
            SegmentId::Segment(index) => {
                let segment = voice.segment_by_index(index);
                self.length = segment.num_frames() as f64 / voice.expected_f0();
                self.long = segment.is_long();
            }
        }
        first
    }

    /// Parks the cursor on silence when the queue has drained. The
    /// outgoing slot is left untouched.
    fn clear(&mut self) {
        self.current = SegmentId::Silence;
        self.length = 0.0;
        self.long = false;
    }
}

/// The sample-accurate synthesis state machine.
///
/// Borrows an immutable [`VoiceDatabase`] for its whole lifetime; grains
/// hold frame slices borrowed from the same voice, so no frame data is
/// copied on the hot path.
#[derive(Debug)]
pub struct Synth<'a> {
    voice: &'a VoiceDatabase,
    output_rate: f64,
    sample_step_base: f64,
    expected_f0: f64,

    cursor: SegmentCursor,
    crossfade: f32,
    crossfade_ramp: f32,

    note_ons: u32,
    note_offs: u32,
    frequency: f64,
    phase: f64,

    formant_shift: f64,
    phoneme_speed: f64,

    segment_queue: VecDeque<SegmentId>,
    grains: Vec<Grain<'a>>,
}

impl<'a> Synth<'a> {
    /// Constructor producing output at the voice's own sample rate.
    pub fn new(voice: &'a VoiceDatabase) -> Self {
        // The voice constructor already rejected non-positive rates.
        Self::build(voice, voice.database_rate() as f64)
    }

    /// Constructor producing output at an arbitrary sample rate. Grains
    /// compensate by stepping through the wavetables at the database/output
    /// rate ratio, so pitch and timing are independent of the output rate.
    /// Fails with [`SynthError::InvalidSampleRate`] on a non-positive or
    /// non-finite rate.
    pub fn with_output_rate(voice: &'a VoiceDatabase, output_rate: f64) -> SynthResult<Self> {
        if !output_rate.is_finite() || output_rate <= 0.0 {
            return Err(SynthError::InvalidSampleRate { rate: output_rate });
        }
        Ok(Self::build(voice, output_rate))
    }

    fn build(voice: &'a VoiceDatabase, output_rate: f64) -> Self {
        Self {
            voice,
            output_rate,
            sample_step_base: voice.database_rate() as f64 / output_rate,
            expected_f0: voice.expected_f0(),
            cursor: SegmentCursor::new(),
            crossfade: 0.0,
            crossfade_ramp: 0.0,
            note_ons: 0,
            note_offs: 0,
            frequency: 0.0,
            // Seeded past the wrap point so the first active tick spawns a
            // grain immediately instead of waiting out one pitch period.
            phase: 1.0,
            formant_shift: 1.0,
            phoneme_speed: 1.0,
            segment_queue: VecDeque::new(),
            grains: Vec::new(),
        }
    }

    /// The voice this synth plays.
    pub fn voice(&self) -> &'a VoiceDatabase {
        self.voice
    }

    /// The output sample rate in Hertz.
    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    /// Appends a segment to the playback queue.
    pub fn enqueue(&mut self, segment: SegmentId) {
        self.segment_queue.push_back(segment);
    }

    /// Registers a pending note-on and sets the note frequency in Hertz.
    /// The event is consumed by a later `process` call.
    pub fn note_on(&mut self, frequency: f64) {
        self.note_ons += 1;
        self.frequency = frequency;
    }

    /// Registers a pending note-off. Long segments advance on it; short
    /// segments ignore it and advance at their natural length.
    pub fn note_off(&mut self) {
        self.note_offs += 1;
    }

    /// Scales the wavetable read rate of grains spawned from now on,
    /// moving formants without changing pitch. Default 1.0.
    pub fn set_formant_shift(&mut self, formant_shift: f64) {
        self.formant_shift = formant_shift;
    }

    /// Scales how fast playback moves through segments, without changing
    /// pitch or formants. Default 1.0.
    pub fn set_phoneme_speed(&mut self, phoneme_speed: f64) {
        self.phoneme_speed = phoneme_speed;
    }

    /// Whether a non-silence segment is currently playing.
    pub fn is_active(&self) -> bool {
        self.cursor.current != SegmentId::Silence
    }

    /// A segment's natural duration in seconds (`num_frames / expected_f0`;
    /// silence has length zero). External trim computation builds on this.
    pub fn segment_length(&self, segment: SegmentId) -> f64 {
        match segment {
            SegmentId::Silence => 0.0,
            SegmentId::Segment(index) => {
                self.voice.segment_by_index(index).num_frames() as f64 / self.expected_f0
            }
        }
    }

    /// Produces one output sample and advances the engine by one tick of
    /// the output clock.
    ///
    /// The branch order is load-bearing: events and segment advancement are
    /// handled first against the previous tick's clocks, then a grain may
    /// spawn, then the clocks advance, and finally the grain mix is taken.
    pub fn process(&mut self) -> f32 {
        if !self.is_active() && self.note_ons == 0 {
            // Idle: exact silence. Grain tails, clocks, and the queue are
            // all frozen, so a silence at the queue head keeps gating the
            // next note-on and leftover grains only resume on reactivation.
            return 0.0;
        }

        if !self.is_active() && self.note_ons > 0 {
            if self.segment_queue.is_empty() {
                return 0.0;
            }
            self.note_ons -= 1;
            self.next_segment();
        }

        if self.is_active() && self.note_offs > 0 && self.cursor.long {
            self.note_offs -= 1;
            self.next_segment();
        }

        if self.cursor.time >= self.cursor.length - CROSSFADE_LENGTH {
            if self.cursor.long {
                // Sustain loop: wrap the segment clock so frame indexing
                // stays in range while the note is held.
                self.cursor.time = 0.0;
            } else {
                self.next_segment();
            }
        }

        if self.phase >= 1.0 {
            if self.is_active() {
                self.spawn_grain();
            }
            self.phase -= 1.0;
        }

        self.cursor.old_time += 1.0 / self.output_rate;
        self.cursor.time += self.phoneme_speed / self.output_rate;
        self.crossfade = (self.crossfade + self.crossfade_ramp).max(0.0);
        self.phase += self.frequency / self.output_rate;

        self.mix()
    }

    /// Installs the next queued segment, or parks on silence when the
    /// queue has drained.
    fn next_segment(&mut self) {
        let Some(next) = self.segment_queue.pop_front() else {
            self.cursor.clear();
            return;
        };
        if self.cursor.begin_new(next, self.voice) {
            self.crossfade = 0.0;
            self.crossfade_ramp = 0.0;
        } else {
            self.crossfade = 1.0;
            self.crossfade_ramp = -(1.0 / (CROSSFADE_LENGTH * self.output_rate)) as f32;
        }
    }

    /// Spawns one grain sampling the current (and, while a transition is
    /// audible, the outgoing) segment at the spawn-time clocks.
    fn spawn_grain(&mut self) {
        let voice = self.voice;
        let SegmentId::Segment(index) = self.cursor.current else {
            return;
        };
        let segment = voice.segment_by_index(index);
        let frame_index = (self.cursor.time * self.expected_f0) as usize % segment.num_frames();
        let frame = segment.frame(frame_index);

        let old_frame = if let Some(SegmentId::Segment(old_index)) = self.cursor.old {
            let old_segment = voice.segment_by_index(old_index);
            let old_frame_index =
                (self.cursor.old_time * self.expected_f0) as usize % old_segment.num_frames();
            Some(old_segment.frame(old_frame_index))
        } else {
            None
        };

        self.grains.push(Grain::new(
            frame,
            old_frame,
            voice.grain_length(),
            self.crossfade,
            self.sample_step_base * self.formant_shift,
        ));
    }

    /// Drops dead grains and sums the survivors into one output sample.
    fn mix(&mut self) -> f32 {
        self.grains.retain(Grain::playing);
        self.grains.iter_mut().map(Grain::process).sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SynthError;
    use crate::synth::{SegmentId, Synth};
    use crate::voice::test_support::sine_voice;
    use crate::voice::VoiceDatabase;

    /// A voice slow enough (expected_f0 = 25 Hz) that even a one-frame
    /// segment outlasts the 30 ms crossfade window.
    fn slow_voice() -> VoiceDatabase {
        sine_voice(8000, 640, &[("pu", 1, false, 2, 12000)])
    }

    #[test]
    fn silence_only_renders_exact_zeros() {
        let voice = sine_voice(48000, 480, &[("a", 10, true, 1, 12000)]);
        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Silence);
        synth.note_on(100.0);
        for _ in 0..480 {
            assert_eq!(synth.process(), 0.0);
        }
    }

    #[test]
    fn note_on_with_empty_queue_stays_silent() {
        let voice = slow_voice();
        let mut synth = Synth::new(&voice);
        synth.note_on(100.0);
        for _ in 0..100 {
            assert_eq!(synth.process(), 0.0);
        }
        assert!(!synth.is_active());
    }

    #[test]
    fn short_transient_plays_its_frame_while_active_then_idles_silent() {
        let voice = slow_voice();
        let frame: Vec<i16> = voice.segment_by_index(0).frame(0).to_vec();

        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Segment(0));
        synth.note_on(voice.expected_f0());

        let output: Vec<f32> = (0..2000).map(|_| synth.process()).collect();

        // One grain spawns on the first tick and plays the frame through
        // at full level. The segment reaches its end at 10 ms (its 40 ms
        // length minus the crossfade window) and the engine goes idle on
        // the following tick, freezing the grain: exact silence after.
        for (i, sample) in output.iter().take(81).enumerate() {
            let expected = frame[i] as f32 / 32767.0;
            assert!(
                (sample - expected).abs() < 1e-6,
                "sample {} was {}, expected {}",
                i,
                sample,
                expected
            );
        }
        for sample in &output[81..] {
            assert_eq!(*sample, 0.0);
        }
        assert!(!synth.is_active());
    }

    #[test]
    fn silence_in_queue_gates_the_next_phrase() {
        let voice = sine_voice(
            8000,
            320,
            &[("he", 3, false, 2, 12000), ("e", 4, true, 3, 12000)],
        );
        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Segment(0));
        synth.enqueue(SegmentId::Silence);
        synth.enqueue(SegmentId::Segment(1));
        synth.note_on(50.0);

        // The transient ends at 30 ms (its 60 ms length minus the
        // crossfade window); the engine then idles, frozen.
        let mut first_phrase: Vec<f32> = (0..800).map(|_| synth.process()).collect();
        assert!(!synth.is_active());
        assert!(first_phrase.iter().any(|s| *s != 0.0));

        // The queued vowel must wait for the next note-on.
        first_phrase.clear();
        for _ in 0..800 {
            assert_eq!(synth.process(), 0.0);
        }
        assert!(!synth.is_active());

        synth.note_on(50.0);
        let second_phrase: Vec<f32> = (0..800).map(|_| synth.process()).collect();
        assert!(synth.is_active());
        assert!(second_phrase.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn long_segment_sustains_past_its_natural_length() {
        let voice = sine_voice(8000, 320, &[("o", 4, true, 2, 12000)]);
        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Segment(0));
        synth.note_on(50.0);

        // Natural length is 80 ms; sustain for 2 s and expect the loop to
        // keep producing signal the whole way through.
        let output: Vec<f32> = (0..16000).map(|_| synth.process()).collect();
        assert!(synth.is_active());
        let tail_peak = output[8000..]
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        assert!(tail_peak > 0.01);
    }

    #[test]
    fn note_off_releases_a_long_segment() {
        let voice = sine_voice(8000, 320, &[("o", 4, true, 2, 12000)]);
        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Segment(0));
        synth.note_on(50.0);
        for _ in 0..4000 {
            synth.process();
        }
        assert!(synth.is_active());

        synth.note_off();
        let release: Vec<f32> = (0..4000).map(|_| synth.process()).collect();
        assert!(!synth.is_active());
        // The queue drains on the note-off tick; every tick after it is
        // idle and exactly silent.
        assert!(release[1..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn short_segment_ignores_note_off() {
        let voice = sine_voice(
            8000,
            320,
            &[("he", 3, false, 2, 12000), ("eh", 3, false, 3, 9000)],
        );
        let mut synth = Synth::new(&voice);
        synth.enqueue(SegmentId::Segment(0));
        synth.enqueue(SegmentId::Segment(1));
        synth.note_on(50.0);
        synth.note_off();

        // Both transients play through at natural length despite the
        // pending note-off: the first advances into the second, not out of
        // the phrase.
        for _ in 0..400 {
            synth.process();
        }
        assert!(synth.is_active());
    }

    #[test]
    fn phoneme_speed_scales_segment_advancement() {
        let ticks_until_idle = |phoneme_speed: f64| {
            let voice = sine_voice(
                8000,
                320,
                &[("he", 3, false, 2, 12000), ("eh", 3, false, 3, 12000)],
            );
            let mut synth = Synth::new(&voice);
            synth.set_phoneme_speed(phoneme_speed);
            synth.enqueue(SegmentId::Segment(0));
            synth.enqueue(SegmentId::Segment(1));
            synth.note_on(50.0);
            let mut ticks = 0u32;
            loop {
                synth.process();
                ticks += 1;
                if !synth.is_active() {
                    break;
                }
                assert!(ticks < 10000);
            }
            ticks
        };

        let normal = ticks_until_idle(1.0);
        let double = ticks_until_idle(2.0);
        // Twice the phoneme speed moves through the two transients in half
        // the wall time; pitch is untouched.
        assert!((normal as i64 - 2 * double as i64).abs() <= 4);
    }

    #[test]
    fn segment_length_is_frames_over_expected_f0() {
        let voice = sine_voice(8000, 320, &[("o", 4, true, 2, 12000)]);
        let synth = Synth::new(&voice);
        assert_eq!(synth.segment_length(SegmentId::Silence), 0.0);
        assert!((synth.segment_length(SegmentId::Segment(0)) - 4.0 / 50.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_a_non_positive_output_rate() {
        let voice = sine_voice(8000, 320, &[("o", 4, true, 2, 12000)]);
        for rate in [0.0, -48000.0, f64::NAN] {
            assert!(matches!(
                Synth::with_output_rate(&voice, rate).unwrap_err(),
                SynthError::InvalidSampleRate { .. }
            ));
        }
    }
}
