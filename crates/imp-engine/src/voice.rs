//! Voice: the sample-reading half of a channel.

use imp_ir::{LoopType, Sample};

/// Unity gain in Q12.
pub const UNITY_GAIN: i32 = 1 << 12;

/// One playing sample: a 32.32 cursor, a step and a pair of gains.
#[derive(Clone, Debug, Default)]
pub struct Voice {
    /// Index into the module's sample list.
    pub sample: usize,
    /// Is the voice producing audio?
    pub active: bool,
    /// Read position in frames (32.32 fixed-point).
    pub cursor: u64,
    /// Cursor advance per output frame (32.32 fixed-point).
    pub step: u64,
    /// Ping-pong direction (true = forward).
    pub forward: bool,
    /// Left gain, Q12.
    pub gain_left: i32,
    /// Right gain, Q12.
    pub gain_right: i32,
}

impl Voice {
    /// Start `sample` from frame `offset`.
    pub fn trigger(&mut self, sample: usize, offset: u32) {
        self.sample = sample;
        self.cursor = (offset as u64) << 32;
        self.forward = true;
        self.active = true;
    }

    /// Stop immediately.
    pub fn cut(&mut self) {
        self.active = false;
    }

    /// Integer frame under the cursor.
    pub fn position(&self) -> u32 {
        (self.cursor >> 32) as u32
    }

    /// Add `acc.len() / 2` interleaved stereo frames of this voice into `acc`.
    pub fn mix(&mut self, sample: &Sample, acc: &mut [i32]) {
        if !self.active {
            return;
        }
        let len = sample.len() as u64;
        if len == 0 || self.step == 0 {
            self.active = len != 0 && self.active;
            return;
        }
        let loop_type = if sample.has_loop() { sample.loop_type } else { LoopType::None };
        let loop_start = sample.loop_start as u64;
        let loop_end = sample.loop_end as u64;

        for frame in acc.chunks_exact_mut(2) {
            let pos = self.cursor >> 32;
            let next = match loop_type {
                LoopType::Forward if pos + 1 >= loop_end => loop_start,
                LoopType::PingPong => (pos + 1).min(loop_end - 1),
                _ => pos + 1,
            };
            let s = sample.data.lerp(pos as usize, next as usize, self.cursor as u32);
            frame[0] += (s * self.gain_left) >> 12;
            frame[1] += (s * self.gain_right) >> 12;

            match loop_type {
                LoopType::None => {
                    self.cursor += self.step;
                    if self.cursor >> 32 >= len {
                        self.active = false;
                        return;
                    }
                }
                LoopType::Forward => {
                    self.cursor += self.step;
                    self.wrap_forward(loop_start, loop_end);
                }
                LoopType::PingPong if self.forward => {
                    self.cursor += self.step;
                    self.reflect_at_end(loop_start, loop_end);
                }
                LoopType::PingPong => self.step_backward(loop_start, loop_end),
            }
        }
    }

    fn wrap_forward(&mut self, loop_start: u64, loop_end: u64) {
        let end = loop_end << 32;
        if self.cursor >= end {
            let loop_len = (loop_end - loop_start) << 32;
            self.cursor = (loop_start << 32) + (self.cursor - end) % loop_len;
        }
    }

    fn reflect_at_end(&mut self, loop_start: u64, loop_end: u64) {
        let end = loop_end << 32;
        if self.cursor < end {
            return;
        }
        let loop_len = (loop_end - loop_start) << 32;
        let over = (self.cursor - end) % (2 * loop_len);
        if over < loop_len {
            self.cursor = end - 1 - over;
            self.forward = false;
        } else {
            self.cursor = (loop_start << 32) + (over - loop_len);
        }
    }

    fn step_backward(&mut self, loop_start: u64, loop_end: u64) {
        let start = loop_start << 32;
        if self.cursor >= start + self.step {
            self.cursor -= self.step;
            return;
        }
        let loop_len = (loop_end - loop_start) << 32;
        let under = (start + self.step - self.cursor) % (2 * loop_len);
        if under < loop_len {
            self.cursor = start + under;
            self.forward = true;
        } else {
            self.cursor = (loop_end << 32) - 1 - (under - loop_len);
        }
    }
}
