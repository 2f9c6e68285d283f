//! Sample data types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Natural rate of an untuned Amiga sample at C-5.
pub const DEFAULT_BASE_RATE: u32 = 8363;

/// A sample definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<32>,
    /// Audio data
    pub data: SampleData,
    /// Loop start position (in frames)
    pub loop_start: u32,
    /// Loop end position (in frames, exclusive)
    pub loop_end: u32,
    /// Loop type
    pub loop_type: LoopType,
    /// Default volume (0-64)
    pub default_volume: u8,
    /// Sample global volume (0-64)
    pub global_volume: u8,
    /// Default panning (-64 to +64), applied on trigger when present
    pub default_pan: Option<i8>,
    /// Playback rate in Hz at C-5
    pub base_rate: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Mono8(Vec::new()),
            loop_start: 0,
            loop_end: 0,
            loop_type: LoopType::None,
            default_volume: 64,
            global_volume: 64,
            default_pan: None,
            base_rate: DEFAULT_BASE_RATE,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        push_truncated(&mut sample.name, name);
        sample
    }

    /// Sample name as shown to the user.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a loop.
    pub fn has_loop(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_end > self.loop_start
    }

    /// Clamp loop points to the data length, disabling loops that end up empty.
    pub fn sanitize_loop(&mut self) {
        let len = self.len() as u32;
        self.loop_end = self.loop_end.min(len);
        self.loop_start = self.loop_start.min(self.loop_end);
        if self.loop_end <= self.loop_start {
            self.loop_type = LoopType::None;
        }
        if self.loop_type == LoopType::None {
            self.loop_start = 0;
            self.loop_end = 0;
        }
    }

    /// Drop the payload so the sample plays as silence.
    pub fn silence(&mut self) {
        self.data = SampleData::Mono8(Vec::new());
        self.loop_type = LoopType::None;
        self.loop_start = 0;
        self.loop_end = 0;
    }
}

/// Copy as much of `s` as fits into a fixed-capacity name buffer.
pub fn push_truncated<const N: usize>(dst: &mut ArrayString<N>, s: &str) {
    for ch in s.chars() {
        if dst.try_push(ch).is_err() {
            break;
        }
    }
}

/// Sample audio data, always linear signed PCM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleData {
    /// 8-bit mono samples
    Mono8(Vec<i8>),
    /// 16-bit mono samples
    Mono16(Vec<i16>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample value at `pos` scaled to 16 bits, or 0 past the end.
    #[inline]
    pub fn get(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Mono16(v) => v.get(pos).copied().unwrap_or(0),
        }
    }

    /// Blend two frames with a 32-bit fraction (0 = `a`, 2^32 = `b`).
    #[inline]
    pub fn lerp(&self, a: usize, b: usize, frac: u32) -> i32 {
        let a = self.get(a) as i64;
        let b = self.get(b) as i64;
        (a + (((b - a) * frac as i64) >> 32)) as i32
    }
}

/// Sample loop type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopType {
    /// No loop
    #[default]
    None,
    /// Forward loop
    Forward,
    /// Ping-pong (bidirectional) loop
    PingPong,
}
