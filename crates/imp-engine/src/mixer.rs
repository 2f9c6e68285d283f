//! Pull-model renderer: turns sequencer ticks into interleaved PCM.

use crate::control::{Command, CommandSource, StateSink};
use crate::sequencer::Sequencer;

/// Largest chunk mixed in one pass.
pub const MIX_FRAMES: usize = 512;

const FRAME_ONE: i64 = 1 << 32;

/// Drives a [`Sequencer`] from an output callback.
///
/// Tick boundaries fall on the same output frame whatever block size the
/// caller pulls with: a chunk never straddles a tick.
pub struct Mixer {
    sequencer: Sequencer,
    channels: usize,
    /// Output frames until the next tick, 32.32 fixed-point
    frames_until_tick: i64,
    accum: [i32; MIX_FRAMES * 2],
    frames_rendered: u64,
}

impl Mixer {
    /// `channels` is the output layout: 1 (mono) or 2 (stereo).
    pub fn new(sequencer: Sequencer, channels: u16) -> Self {
        Self {
            sequencer,
            channels: if channels == 1 { 1 } else { 2 },
            frames_until_tick: 0,
            accum: [0; MIX_FRAMES * 2],
            frames_rendered: 0,
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    /// Frames written so far, silence included.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.sequencer.ticks_elapsed()
    }

    /// Fill `out` with `out.len() / channels` interleaved frames.
    ///
    /// Commands are taken at tick boundaries while playing, and at the start
    /// of the call otherwise. Never blocks or allocates.
    ///
    /// Returns how many frames were produced while playing; the frames
    /// after them are silence.
    pub fn render<C: CommandSource, S: StateSink>(
        &mut self,
        out: &mut [i16],
        commands: &mut C,
        sink: &mut S,
    ) -> usize {
        #[cfg(feature = "alloc_check")]
        return assert_no_alloc::assert_no_alloc(|| self.render_inner(out, commands, sink));
        #[cfg(not(feature = "alloc_check"))]
        self.render_inner(out, commands, sink)
    }

    fn render_inner<C: CommandSource, S: StateSink>(
        &mut self,
        out: &mut [i16],
        commands: &mut C,
        sink: &mut S,
    ) -> usize {
        let channels = self.channels;
        let total = out.len() / channels;
        let mut done = 0;

        if !self.sequencer.is_playing() {
            self.apply_commands(commands, sink);
        }

        while done < total {
            if !self.sequencer.is_playing() {
                break;
            }
            if self.frames_until_tick <= 0 {
                self.apply_commands(commands, sink);
                if !self.sequencer.tick(sink) {
                    break;
                }
                self.frames_until_tick += self.sequencer.tick_length();
                continue;
            }
            let until_tick = ((self.frames_until_tick + FRAME_ONE - 1) >> 32) as usize;
            let chunk = until_tick.min(total - done).min(MIX_FRAMES);
            self.mix_chunk(&mut out[done * channels..(done + chunk) * channels]);
            self.frames_until_tick -= (chunk as i64) << 32;
            done += chunk;
        }

        out[done * channels..].fill(0);
        self.frames_rendered += total as u64;
        done
    }

    fn apply_commands<C: CommandSource, S: StateSink>(&mut self, commands: &mut C, sink: &mut S) {
        while let Some(command) = commands.next_command() {
            if command == Command::Stop {
                self.frames_until_tick = 0;
            }
            // Invalid seeks are dropped; the control side validates first.
            let _ = self.sequencer.apply(command, sink);
        }
    }

    fn mix_chunk(&mut self, out: &mut [i16]) {
        let frames = out.len() / self.channels;
        let acc = &mut self.accum[..frames * 2];
        acc.fill(0);
        self.sequencer.mix_voices(acc);

        if self.channels == 2 {
            for (dst, &src) in out.iter_mut().zip(acc.iter()) {
                *dst = src.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        } else {
            for (dst, lr) in out.iter_mut().zip(acc.chunks_exact(2)) {
                let mono = (lr[0] + lr[1]) / 2;
                *dst = mono.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        }
    }
}
