//! Tick-driven sequencer: walks the order list and drives the channels.

use alloc::sync::Arc;

use heapless::Vec as FixedVec;
use imp_ir::{Cell, Module, OrderEntry, MAX_CHANNELS};

use crate::channel::{Channel, TickContext};
use crate::control::{Command, PlaybackPosition, SeekError, StateSink, StateUpdate, Transport};
use crate::effects::{Effect, Slide};

/// Master volume at unity, Q8.
pub const UNITY_MASTER: u16 = 256;

/// Flow-control effects seen on the current row.
#[derive(Clone, Copy, Debug, Default)]
struct RowControl {
    jump: Option<u16>,
    break_row: Option<u16>,
    loop_to: Option<u16>,
}

/// Playback state for one module.
///
/// Owns every mutable piece of playback; the module itself is shared and
/// read-only. Nothing here allocates after construction.
pub struct Sequencer {
    module: Arc<Module>,
    sample_rate: u32,
    channels: FixedVec<Channel, MAX_CHANNELS>,
    transport: Transport,
    order: u16,
    pattern: u8,
    row: u16,
    tick: u8,
    speed: u8,
    tempo: u8,
    global_volume: u8,
    master: u16,
    /// Repeats left for the current row
    pattern_delay: u8,
    /// The current row is a pattern-delay repeat
    repeating: bool,
    control: RowControl,
    /// The song ran out; the next tick finishes playback
    finish_pending: bool,
    ticks: u64,
}

impl Sequencer {
    /// Create a stopped sequencer positioned at the start of the song.
    pub fn new(module: Arc<Module>, sample_rate: u32) -> Self {
        let mut channels = FixedVec::new();
        for (i, settings) in module.channels.iter().take(MAX_CHANNELS).enumerate() {
            let _ = channels.push(Channel::new(settings, i as u8));
        }
        let mut sequencer = Self {
            speed: module.initial_speed.max(1),
            tempo: module.initial_tempo.max(32),
            global_volume: module.global_volume.min(128),
            module,
            sample_rate,
            channels,
            transport: Transport::Stopped,
            order: 0,
            pattern: 0,
            row: 0,
            tick: 0,
            master: UNITY_MASTER,
            pattern_delay: 0,
            repeating: false,
            control: RowControl::default(),
            finish_pending: false,
            ticks: 0,
        };
        sequencer.go_to_order(0, 0);
        sequencer
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition { order: self.order, pattern: self.pattern, row: self.row }
    }

    /// Tick within the current row.
    pub fn current_tick(&self) -> u8 {
        self.tick
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume
    }

    /// Total ticks processed since construction.
    pub fn ticks_elapsed(&self) -> u64 {
        self.ticks
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Set the master volume, Q8 (256 = unity).
    pub fn set_master_volume(&mut self, master: u16) {
        self.master = master;
    }

    /// Output frames in one tick at the current tempo, 32.32 fixed-point.
    pub fn tick_length(&self) -> i64 {
        // 2.5 / tempo seconds.
        ((self.sample_rate as i64 * 5) << 32) / (2 * self.tempo.max(1) as i64)
    }

    /// Apply a transport command.
    pub fn apply<S: StateSink>(&mut self, command: Command, sink: &mut S) -> Result<(), SeekError> {
        match command {
            Command::Play => self.play(sink),
            Command::Pause => self.pause(sink),
            Command::Stop => self.stop(sink),
            Command::Seek { order, row } => return self.seek(order, row),
        }
        Ok(())
    }

    /// Stopped or Paused to Playing. Ignored once finished.
    pub fn play<S: StateSink>(&mut self, sink: &mut S) {
        if matches!(self.transport, Transport::Stopped | Transport::Paused) {
            self.set_transport(Transport::Playing, sink);
        }
    }

    pub fn pause<S: StateSink>(&mut self, sink: &mut S) {
        if self.transport == Transport::Playing {
            self.set_transport(Transport::Paused, sink);
        }
    }

    /// Rewind to the start of the song with the initial settings.
    pub fn stop<S: StateSink>(&mut self, sink: &mut S) {
        let module = &*self.module;
        self.speed = module.initial_speed.max(1);
        self.tempo = module.initial_tempo.max(32);
        self.global_volume = module.global_volume.min(128);
        for (channel, settings) in self.channels.iter_mut().zip(&module.channels) {
            channel.reset(settings);
        }
        self.tick = 0;
        self.pattern_delay = 0;
        self.repeating = false;
        self.control = RowControl::default();
        self.finish_pending = false;
        self.go_to_order(0, 0);
        if self.transport != Transport::Stopped {
            self.set_transport(Transport::Stopped, sink);
        }
    }

    /// Jump to `row` of order entry `order`. Playing or Paused only.
    ///
    /// Every voice is cut and effect memory is cleared; the transport is
    /// unchanged. The new row is published when its first tick runs.
    pub fn seek(&mut self, order: u16, row: u16) -> Result<(), SeekError> {
        if !matches!(self.transport, Transport::Playing | Transport::Paused) {
            return Err(SeekError::InvalidState);
        }
        let out_of_range = SeekError::OutOfRange { order, row };
        let (pattern, rows) = self
            .module
            .pattern_at(order as usize)
            .map(|(p, pat)| (p, pat.rows))
            .ok_or(out_of_range)?;
        if row >= rows {
            return Err(out_of_range);
        }
        for channel in self.channels.iter_mut() {
            channel.cut();
        }
        self.order = order;
        self.pattern = pattern;
        self.row = row;
        self.tick = 0;
        self.pattern_delay = 0;
        self.repeating = false;
        self.control = RowControl::default();
        self.finish_pending = false;
        Ok(())
    }

    /// Run one tick. Returns false, doing nothing, unless playing.
    pub fn tick<S: StateSink>(&mut self, sink: &mut S) -> bool {
        if self.transport != Transport::Playing {
            return false;
        }
        if self.finish_pending {
            for channel in self.channels.iter_mut() {
                channel.voice.cut();
            }
            self.set_transport(Transport::Finished, sink);
            return false;
        }

        if self.tick == 0 && !self.repeating {
            self.enter_row(sink);
        } else {
            self.run_tick_effects();
        }

        let module = &*self.module;
        for channel in self.channels.iter_mut() {
            channel.update(module, self.sample_rate, self.global_volume, self.master);
        }
        self.ticks += 1;
        self.advance();
        true
    }

    /// Mix every active voice into `acc` (interleaved stereo).
    pub fn mix_voices(&mut self, acc: &mut [i32]) {
        let module = &*self.module;
        for channel in self.channels.iter_mut() {
            if let Some(sample) = module.samples.get(channel.voice.sample) {
                channel.voice.mix(sample, acc);
            }
        }
    }

    fn set_transport<S: StateSink>(&mut self, transport: Transport, sink: &mut S) {
        self.transport = transport;
        sink.publish(StateUpdate::Transport(transport));
    }

    fn enter_row<S: StateSink>(&mut self, sink: &mut S) {
        sink.publish(StateUpdate::Position(self.position()));

        let module = &*self.module;
        let ctx = TickContext { module, tick: 0, speed: self.speed };
        if let Some(pattern) = module.patterns.get(self.pattern as usize) {
            for (i, channel) in self.channels.iter_mut().enumerate() {
                match pattern.get(self.row, i as u8) {
                    Some(cell) => channel.row(cell, &ctx),
                    None => channel.row(&Cell::empty(), &ctx),
                }
            }
        }

        let mut control = RowControl::default();
        let mut delay = None;
        for channel in self.channels.iter_mut() {
            match channel.effect() {
                Effect::SetSpeed(s) if s > 0 => self.speed = s,
                Effect::SetTempo(t) => self.tempo = t.max(32),
                Effect::SetGlobalVolume(v) => self.global_volume = v.min(128),
                Effect::GlobalVolumeSlide(p) => {
                    self.global_volume = global_slide(self.global_volume, p, 0);
                }
                Effect::PositionJump(order) => control.jump = Some(order as u16),
                Effect::PatternBreak(row) => control.break_row = Some(row as u16),
                Effect::PatternLoop(count) => {
                    if let Some(target) = channel.pattern_loop(count, self.row) {
                        control.loop_to = Some(target);
                    }
                }
                Effect::PatternDelay(n) if delay.is_none() => delay = Some(n),
                _ => {}
            }
        }
        self.control = control;
        self.pattern_delay = delay.unwrap_or(0);
    }

    fn run_tick_effects(&mut self) {
        let module = &*self.module;
        let tick = self.tick;
        let ctx = TickContext { module, tick, speed: self.speed };
        for channel in self.channels.iter_mut() {
            channel.tick(&ctx);
            match channel.effect() {
                Effect::TempoSlide(p) if tick > 0 => {
                    let delta = (p & 0x0F) as i16;
                    let tempo = if p >> 4 == 0 {
                        self.tempo as i16 - delta
                    } else {
                        self.tempo as i16 + delta
                    };
                    self.tempo = tempo.clamp(32, 255) as u8;
                }
                Effect::GlobalVolumeSlide(p) => {
                    self.global_volume = global_slide(self.global_volume, p, tick);
                }
                _ => {}
            }
        }
    }

    fn advance(&mut self) {
        self.tick += 1;
        if self.tick < self.speed {
            return;
        }
        self.tick = 0;
        if self.pattern_delay > 0 {
            self.pattern_delay -= 1;
            self.repeating = true;
            return;
        }
        self.repeating = false;
        self.next_row();
    }

    fn next_row(&mut self) {
        let control = core::mem::take(&mut self.control);
        if let Some(row) = control.loop_to {
            self.row = row;
            return;
        }
        if control.jump.is_some() || control.break_row.is_some() {
            let order = control.jump.unwrap_or(self.order + 1);
            self.go_to_order(order, control.break_row.unwrap_or(0));
            return;
        }
        self.row += 1;
        let rows = self.module.num_rows(self.pattern as usize).unwrap_or(0);
        if self.row >= rows {
            self.go_to_order(self.order + 1, 0);
        }
    }

    /// Move to the first playable entry at or after `order`.
    fn go_to_order(&mut self, order: u16, row: u16) {
        let module = &*self.module;
        let mut index = order as usize;
        // Each entry is visited at most once, even through Loop cycles.
        for _ in 0..=module.order.len() {
            match module.order.get(index) {
                Some(&OrderEntry::Pattern(p)) => {
                    let rows = module.num_rows(p as usize).unwrap_or(0);
                    if rows == 0 {
                        index += 1;
                        continue;
                    }
                    if index != self.order as usize {
                        for channel in self.channels.iter_mut() {
                            channel.loop_row = 0;
                            channel.loop_count = 0;
                        }
                    }
                    self.order = index as u16;
                    self.pattern = p;
                    self.row = if row < rows { row } else { 0 };
                    return;
                }
                Some(OrderEntry::Skip) => index += 1,
                Some(&OrderEntry::Loop(target)) => index = target as usize,
                Some(OrderEntry::End) | None => break,
            }
        }
        self.finish_pending = true;
    }
}

/// Global volume after a `Wxy` slide on `tick`.
fn global_slide(volume: u8, param: u8, tick: u8) -> u8 {
    match Slide::decode(param).and_then(|s| s.amount_on(tick)) {
        Some(d) => (volume as i16 + d as i16).clamp(0, 128) as u8,
        None => volume,
    }
}
