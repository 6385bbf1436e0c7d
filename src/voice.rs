//! In-memory form of a compiled voice and its binary file format.
//!
//! A voice is a set of recorded speech segments (isolated phonemes and
//! diphone transitions) analyzed offline into pitch-synchronous wavetables.
//! Each segment stores a row-major table of `num_frames` frames, every frame
//! exactly `grain_length` signed 16-bit samples long. The file layout is:
//!
//! ```text
//! [12 bytes]   magic = "ODDVOICES\0\0\0"
//! [4 bytes]    int32 rate (little-endian)
//! [4 bytes]    int32 grain_length
//! phoneme names, zero-terminated, until an empty string
//! (segment name, int32 num_frames, int32 long_flag) until an empty name
//! raw int16 samples for every segment in listed order
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Write};

use log::debug;

use crate::error::{SynthError, SynthResult};

/// Magic word opening every voice file.
const MAGIC_WORD: &[u8; 12] = b"ODDVOICES\0\0\0";

/// Longest allowed phoneme or segment name, in bytes.
const MAX_NAME_LENGTH: usize = 255;

/// One recorded speech segment: an isolated phoneme or a diphone transition.
///
/// Long segments (vowels and other sustainable nuclei) loop while a note is
/// held; short segments play through once at their natural length.
#[derive(Debug)]
pub struct Segment {
    name: String,
    long: bool,
    grain_length: usize,
    frames: Vec<i16>,
}

impl Segment {
    /// Builds a segment from its flattened frame table.
    ///
    /// `frames` holds `num_frames` rows of `grain_length` samples each, so
    /// its length must be a positive multiple of `grain_length`.
    pub fn new(
        name: impl Into<String>,
        long: bool,
        grain_length: usize,
        frames: Vec<i16>,
    ) -> SynthResult<Self> {
        let name = name.into();
        if grain_length == 0 {
            return Err(SynthError::InvalidVoice {
                reason: "grain length must be positive".to_string(),
            });
        }
        if frames.is_empty() || frames.len() % grain_length != 0 {
            return Err(SynthError::InvalidVoice {
                reason: format!(
                    "segment \"{}\" frame table has {} samples, not a positive multiple of {}",
                    name,
                    frames.len(),
                    grain_length
                ),
            });
        }
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(SynthError::InvalidVoice {
                reason: format!("segment name \"{}\" has invalid length", name),
            });
        }
        Ok(Self {
            name,
            long,
            grain_length,
            frames,
        })
    }

    /// The segment's name, e.g. `"h"`, `"hE"`, `"_h"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the segment sustains by looping while a note is held.
    pub fn is_long(&self) -> bool {
        self.long
    }

    /// Number of pitch-synchronous frames in the table.
    pub fn num_frames(&self) -> usize {
        self.frames.len() / self.grain_length
    }

    /// Row `index` of the frame table.
    pub fn frame(&self, index: usize) -> &[i16] {
        let start = index * self.grain_length;
        &self.frames[start..start + self.grain_length]
    }

    /// The flattened frame table, row-major.
    pub fn raw_frames(&self) -> &[i16] {
        &self.frames
    }
}

/// A complete voice: ordered segment list with name lookup, the phoneme
/// inventory, and the analysis parameters the frames were extracted with.
///
/// Built once from a voice file (or in memory) and immutable thereafter;
/// any number of synths may borrow it concurrently.
#[derive(Debug)]
pub struct VoiceDatabase {
    rate: i32,
    grain_length: usize,
    phonemes: Vec<String>,
    segments: Vec<Segment>,
    index: HashMap<String, usize>,
}

impl VoiceDatabase {
    /// Assembles a voice from already-analyzed segments, validating the
    /// invariants the synth relies on: positive rate and grain length,
    /// unique names, and frame tables of matching width.
    pub fn new(
        rate: i32,
        grain_length: usize,
        phonemes: Vec<String>,
        segments: Vec<Segment>,
    ) -> SynthResult<Self> {
        if rate <= 0 {
            return Err(SynthError::InvalidVoice {
                reason: format!("non-positive sample rate {}", rate),
            });
        }
        if grain_length == 0 {
            return Err(SynthError::InvalidVoice {
                reason: "zero grain length".to_string(),
            });
        }
        let mut index = HashMap::new();
        for (i, segment) in segments.iter().enumerate() {
            if segment.grain_length != grain_length {
                return Err(SynthError::InvalidVoice {
                    reason: format!(
                        "segment \"{}\" grain length {} does not match voice grain length {}",
                        segment.name, segment.grain_length, grain_length
                    ),
                });
            }
            if index.insert(segment.name.clone(), i).is_some() {
                return Err(SynthError::InvalidVoice {
                    reason: format!("duplicate segment name \"{}\"", segment.name),
                });
            }
        }
        Ok(Self {
            rate,
            grain_length,
            phonemes,
            segments,
            index,
        })
    }

    /// Parses a voice file from a reader.
    ///
    /// Fails with [`SynthError::InvalidVoice`] when the magic word
    /// mismatches, a name string exceeds 255 bytes or is unterminated, a
    /// header field is non-positive, or the sample payload is truncated.
    pub fn load<R: Read>(mut reader: R) -> SynthResult<Self> {
        let mut magic = [0u8; 12];
        read_or_truncated(&mut reader, &mut magic, "magic word")?;
        if &magic != MAGIC_WORD {
            return Err(SynthError::InvalidVoice {
                reason: "magic word mismatch".to_string(),
            });
        }

        let rate = read_i32(&mut reader, "sample rate")?;
        let grain_length = read_i32(&mut reader, "grain length")?;
        if rate <= 0 || grain_length <= 0 {
            return Err(SynthError::InvalidVoice {
                reason: format!(
                    "non-positive header field (rate {}, grain length {})",
                    rate, grain_length
                ),
            });
        }
        let grain_length = grain_length as usize;

        let mut phonemes = Vec::new();
        loop {
            let phoneme = read_name(&mut reader)?;
            if phoneme.is_empty() {
                break;
            }
            phonemes.push(phoneme);
        }

        // Segment headers come first; the sample payload follows in the
        // same order.
        let mut headers: Vec<(String, usize, bool)> = Vec::new();
        loop {
            let name = read_name(&mut reader)?;
            if name.is_empty() {
                break;
            }
            let num_frames = read_i32(&mut reader, "frame count")?;
            let long_flag = read_i32(&mut reader, "long flag")?;
            if num_frames <= 0 {
                return Err(SynthError::InvalidVoice {
                    reason: format!("segment \"{}\" has frame count {}", name, num_frames),
                });
            }
            headers.push((name, num_frames as usize, long_flag != 0));
        }

        let mut segments = Vec::with_capacity(headers.len());
        for (name, num_frames, long) in headers {
            let num_samples = num_frames * grain_length;
            let mut raw = vec![0u8; num_samples * 2];
            read_or_truncated(&mut reader, &mut raw, "sample payload")?;
            let frames: Vec<i16> = raw
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            segments.push(Segment::new(name, long, grain_length, frames)?);
        }

        let voice = Self::new(rate, grain_length, phonemes, segments)?;
        debug!(
            "loaded voice: {} segments, {} phonemes, rate {} Hz, grain length {}",
            voice.segments.len(),
            voice.phonemes.len(),
            voice.rate,
            voice.grain_length
        );
        Ok(voice)
    }

    /// Writes the voice in the binary file format, the exact inverse of
    /// [`VoiceDatabase::load`].
    pub fn write<W: Write>(&self, mut writer: W) -> SynthResult<()> {
        writer.write_all(MAGIC_WORD)?;
        writer.write_all(&self.rate.to_le_bytes())?;
        writer.write_all(&(self.grain_length as i32).to_le_bytes())?;

        for phoneme in &self.phonemes {
            writer.write_all(phoneme.as_bytes())?;
            writer.write_all(&[0])?;
        }
        writer.write_all(&[0])?;

        for segment in &self.segments {
            writer.write_all(segment.name.as_bytes())?;
            writer.write_all(&[0])?;
            writer.write_all(&(segment.num_frames() as i32).to_le_bytes())?;
            writer.write_all(&i32::from(segment.long).to_le_bytes())?;
        }
        writer.write_all(&[0])?;

        for segment in &self.segments {
            for sample in &segment.frames {
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Index of the named segment in the segment list, if present.
    pub fn segment_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// The segment at `index` in listed order.
    ///
    /// Panics if `index` is out of range; score resolution rejects unknown
    /// indices before they reach the engine.
    pub fn segment_by_index(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    /// Looks a segment up by name.
    pub fn segment_by_name(&self, name: &str) -> Option<&Segment> {
        self.segment_index(name).map(|i| &self.segments[i])
    }

    /// Number of segments in the voice.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// The phoneme inventory recorded in the voice header.
    pub fn phonemes(&self) -> &[String] {
        &self.phonemes
    }

    /// Length of every frame in samples.
    pub fn grain_length(&self) -> usize {
        self.grain_length
    }

    /// The sample rate the frames were extracted at.
    pub fn database_rate(&self) -> i32 {
        self.rate
    }

    /// The fundamental the frames were analyzed at: one frame spans two
    /// periods, so `expected_f0 = rate / (grain_length / 2)`.
    pub fn expected_f0(&self) -> f64 {
        self.rate as f64 / (0.5 * self.grain_length as f64)
    }
}

/// Reads exactly `buf.len()` bytes, mapping EOF to `InvalidVoice`.
fn read_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> SynthResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SynthError::InvalidVoice {
            reason: format!("truncated {}", what),
        }),
        Err(e) => Err(SynthError::Io(e)),
    }
}

fn read_i32<R: Read>(reader: &mut R, what: &str) -> SynthResult<i32> {
    let mut bytes = [0u8; 4];
    read_or_truncated(reader, &mut bytes, what)?;
    Ok(i32::from_le_bytes(bytes))
}

/// Reads a zero-terminated name of at most 255 bytes.
fn read_name<R: Read>(reader: &mut R) -> SynthResult<String> {
    let mut bytes = Vec::new();
    loop {
        let mut c = [0u8; 1];
        read_or_truncated(reader, &mut c, "name string")?;
        if c[0] == 0 {
            break;
        }
        if bytes.len() >= MAX_NAME_LENGTH {
            return Err(SynthError::InvalidVoice {
                reason: "name string longer than 255 bytes".to_string(),
            });
        }
        bytes.push(c[0]);
    }
    String::from_utf8(bytes).map_err(|_| SynthError::InvalidVoice {
        reason: "name string is not valid UTF-8".to_string(),
    })
}
