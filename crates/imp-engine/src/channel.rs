//! Channel state for tracker playback.
//!
//! A channel reads one cell per row, keeps the effect state between ticks
//! and converts it into a step and a pair of gains for its [`Voice`] once
//! per tick.

use imp_ir::{Cell, ChannelSettings, Format, Module, Note, Sample, VolumeCommand};

use crate::effects::{Effect, EffectMemory, MemorySlot, Slide};
use crate::frequency::{
    clamp_period, note_to_period, period_to_step, slide_period, transpose_period, PERIOD_MAX,
    PERIOD_MIN,
};
use crate::voice::Voice;

/// ProTracker vibrato table, first half of the cycle.
const SINE_TABLE: [u8; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253, 255, 253, 250, 244,
    235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

/// Tone portamento speeds selected by the IT volume column.
const VOLUME_PORTA_SPEEDS: [u8; 10] = [0, 1, 4, 8, 16, 32, 64, 96, 128, 255];

/// What a channel needs to know about the tick being processed.
#[derive(Clone, Copy, Debug)]
pub struct TickContext<'a> {
    pub module: &'a Module,
    /// Tick within the row; 0 is the row tick.
    pub tick: u8,
    /// Ticks per row.
    pub speed: u8,
}

impl TickContext<'_> {
    fn format(&self) -> Format {
        self.module.format
    }

    fn linear(&self) -> bool {
        self.module.linear_slides
    }
}

/// Vibrato or tremolo phase and waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Oscillator {
    /// Phase, 64 steps per cycle.
    pub position: u8,
    /// 0 sine, 1 ramp down, 2 square, 3 random; bit 2 keeps the phase on new notes.
    pub waveform: u8,
}

impl Oscillator {
    /// Current value in -255..=255.
    pub fn value(&self, rng: &mut u32) -> i32 {
        let pos = self.position & 63;
        match self.waveform & 3 {
            0 => {
                let v = SINE_TABLE[(pos & 31) as usize] as i32;
                if pos >= 32 {
                    -v
                } else {
                    v
                }
            }
            1 => 255 - (pos as i32 * 255) / 32,
            2 if pos < 32 => 255,
            2 => -255,
            _ => (next_random(rng) % 511) as i32 - 255,
        }
    }

    fn advance(&mut self, speed: u8) {
        self.position = self.position.wrapping_add(speed) & 63;
    }

    fn retrigger(&mut self) {
        if self.waveform & 4 == 0 {
            self.position = 0;
        }
    }
}

fn next_random(state: &mut u32) -> u32 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *state = x;
    x
}

fn add_clamped(value: u8, delta: i8, max: u8) -> u8 {
    (value as i16 + delta as i16).clamp(0, max as i16) as u8
}

/// Volume after a retrigger with volume-change nibble `x`.
fn retrigger_volume(volume: u8, x: u8) -> u8 {
    let v = volume as i16;
    let v = match x {
        1..=5 => v - (1 << (x - 1)),
        6 => v * 2 / 3,
        7 => v / 2,
        9..=0xD => v + (1 << (x - 9)),
        0xE => v * 3 / 2,
        0xF => v * 2,
        _ => v,
    };
    v.clamp(0, 64) as u8
}

/// Period delta of a portamento parameter on `tick`, in fine units.
fn porta_amount(param: u8, tick: u8, format: Format) -> Option<i32> {
    if format == Format::ProTracker {
        return (tick > 0).then_some(param as i32 * 4);
    }
    match param {
        0xF0..=0xFF => (tick == 0).then_some((param & 0x0F) as i32 * 4),
        0xE0..=0xEF => (tick == 0).then_some((param & 0x0F) as i32),
        _ => (tick > 0).then_some(param as i32 * 4),
    }
}

/// Mixing and effect state for a single tracker channel.
#[derive(Clone, Debug)]
pub struct Channel {
    pub voice: Voice,
    /// Last triggered note, after keyboard mapping
    pub note: u8,
    /// Current instrument (1-based, 0 = none)
    pub instrument: u8,
    /// C-5 rate of the sounding sample
    pub base_rate: u32,
    /// Base period, without vibrato or arpeggio
    pub period: u32,
    /// Tone portamento target
    pub target_period: u32,
    /// Note volume (0-64)
    pub volume: u8,
    /// Channel volume (0-64)
    pub channel_volume: u8,
    /// Panning (-64 to +64)
    pub pan: i8,
    pub muted: bool,
    pub memory: EffectMemory,
    /// Pattern loop start row
    pub loop_row: u16,
    /// Remaining pattern loop iterations
    pub loop_count: u8,

    index: u8,
    effect: Effect,
    volume_command: VolumeCommand,
    vibrato: Oscillator,
    tremolo: Oscillator,
    delayed: Option<Cell>,
    retrigger_count: u8,
    tremor_count: u8,
    sample_global: u8,
    instrument_global: u8,
    rng: u32,

    // Recomputed every tick
    arpeggio: u8,
    vibrato_delta: i32,
    volume_offset: i16,
    tremor_mute: bool,
}

impl Channel {
    /// Create a channel with its module-defined initial settings.
    pub fn new(settings: &ChannelSettings, index: u8) -> Self {
        Self {
            voice: Voice::default(),
            note: 0,
            instrument: 0,
            base_rate: 0,
            period: 0,
            target_period: 0,
            volume: 64,
            channel_volume: settings.initial_vol.min(64),
            pan: settings.initial_pan.clamp(-64, 64),
            muted: settings.muted,
            memory: EffectMemory::default(),
            loop_row: 0,
            loop_count: 0,
            index,
            effect: Effect::None,
            volume_command: VolumeCommand::None,
            vibrato: Oscillator::default(),
            tremolo: Oscillator::default(),
            delayed: None,
            retrigger_count: 0,
            tremor_count: 0,
            sample_global: 64,
            instrument_global: 128,
            rng: 0x9E37_79B9 ^ (index as u32 + 1),
            arpeggio: 0,
            vibrato_delta: 0,
            volume_offset: 0,
            tremor_mute: false,
        }
    }

    /// Return to the initial settings, as after construction.
    pub fn reset(&mut self, settings: &ChannelSettings) {
        *self = Self::new(settings, self.index);
    }

    /// Silence the voice and forget all effect state.
    pub fn cut(&mut self) {
        self.voice.cut();
        self.memory.clear();
        self.effect = Effect::None;
        self.volume_command = VolumeCommand::None;
        self.delayed = None;
        self.loop_row = 0;
        self.loop_count = 0;
    }

    /// Effect active on the current row, with memory applied.
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// True while a delayed note is waiting for its tick.
    pub fn has_delayed_note(&self) -> bool {
        self.delayed.is_some()
    }

    /// Process the row tick for `cell`.
    pub fn row(&mut self, cell: &Cell, ctx: &TickContext<'_>) {
        self.begin_tick();
        let format = ctx.format();
        let decoded = Effect::decode(format, cell.effect, cell.param);
        self.effect = self.memory.resolve(decoded, format).unwrap_or_default();
        if !matches!(self.effect, Effect::Tremor(_)) {
            self.tremor_count = 0;
        }
        self.delayed = None;
        self.volume_command = VolumeCommand::None;

        if let Effect::NoteDelay(delay) = self.effect {
            if delay > 0 {
                // A delay past the end of the row drops the note.
                if delay < ctx.speed {
                    self.delayed = Some(*cell);
                }
                return;
            }
        }

        let triggered = self.apply_note(cell, ctx);
        self.apply_row_effect(triggered, ctx);
        self.apply_tick(ctx);
    }

    /// Process a tick after the row tick, or a repeated row tick.
    pub fn tick(&mut self, ctx: &TickContext<'_>) {
        self.begin_tick();
        self.apply_tick(ctx);
    }

    /// Pattern loop bookkeeping for `SBx`/`E6x` on `row`. Returns the row to
    /// jump back to, if any.
    pub fn pattern_loop(&mut self, count: u8, row: u16) -> Option<u16> {
        if count == 0 {
            self.loop_row = row;
            return None;
        }
        if self.loop_count == 0 {
            self.loop_count = count;
            return Some(self.loop_row);
        }
        self.loop_count -= 1;
        if self.loop_count > 0 {
            Some(self.loop_row)
        } else {
            self.loop_row = row + 1;
            None
        }
    }

    /// Recompute the voice step and gains for this tick.
    ///
    /// `global_volume` is 0-128, `master` is Q8 (256 = unity).
    pub fn update(&mut self, module: &Module, sample_rate: u32, global_volume: u8, master: u16) {
        if !self.voice.active {
            return;
        }
        self.voice.step = if self.period == 0 {
            0
        } else {
            let mut period = transpose_period(self.period, self.arpeggio);
            period = slide_period(period, self.vibrato_delta, module.linear_slides);
            period_to_step(period.clamp(PERIOD_MIN, PERIOD_MAX), sample_rate)
        };

        let volume = if self.muted || self.tremor_mute {
            0
        } else {
            (self.volume as i16 + self.volume_offset).clamp(0, 64) as u64
        };
        let product = volume
            * self.channel_volume as u64
            * self.sample_global as u64
            * self.instrument_global as u64
            * global_volume.min(128) as u64
            * master as u64;
        // Full scale (2^40) maps to half of unity so a hard pan reaches unity.
        let gain = (product >> 29).min(i32::MAX as u64 >> 7) as i32;
        let pan = self.pan as i32;
        self.voice.gain_left = (gain * (64 - pan)) >> 6;
        self.voice.gain_right = (gain * (64 + pan)) >> 6;
    }

    fn begin_tick(&mut self) {
        self.arpeggio = 0;
        self.vibrato_delta = 0;
        self.volume_offset = 0;
        self.tremor_mute = false;
    }

    /// Instrument and sample for a played note on the current instrument.
    fn lookup<'m>(&self, module: &'m Module, note: u8) -> Option<(u8, usize, &'m Sample)> {
        let instrument = module.instruments.get((self.instrument as usize).checked_sub(1)?)?;
        let (mapped, index) = instrument.resolve(note)?;
        Some((mapped, index, module.samples.get(index)?))
    }

    /// Apply the note, instrument and volume columns. Returns true if a new
    /// note was triggered.
    fn apply_note(&mut self, cell: &Cell, ctx: &TickContext<'_>) -> bool {
        let module = ctx.module;
        let tone_porta = matches!(self.effect, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
            || matches!(cell.volume, VolumeCommand::TonePorta(_));

        if cell.instrument != 0 {
            self.instrument = cell.instrument;
            let key = match cell.note {
                Note::On(n) => n,
                _ => self.note,
            };
            if let Some(instrument) = module.instruments.get(cell.instrument as usize - 1) {
                self.instrument_global = instrument.global_volume.min(128);
                if let Some((_, _, sample)) = self.lookup(module, key) {
                    self.volume = sample.default_volume.min(64);
                    self.sample_global = sample.global_volume.min(64);
                    if let Some(pan) = instrument.default_pan.or(sample.default_pan) {
                        self.pan = pan.clamp(-64, 64);
                    }
                }
            }
        }

        let mut triggered = false;
        match cell.note {
            Note::On(n) => {
                if let Some((note, index, sample)) = self.lookup(module, n) {
                    let period = clamp_period(note_to_period(note, sample.base_rate), ctx.format());
                    if tone_porta && self.voice.active {
                        self.target_period = period;
                    } else {
                        self.note = note;
                        self.base_rate = sample.base_rate;
                        self.period = period;
                        self.target_period = period;
                        self.sample_global = sample.global_volume.min(64);
                        self.voice.trigger(index, 0);
                        self.vibrato.retrigger();
                        self.tremolo.retrigger();
                        self.retrigger_count = 0;
                        triggered = true;
                    }
                }
            }
            n if n.is_release() => self.voice.cut(),
            _ => {}
        }

        self.volume_command = cell.volume;
        match cell.volume {
            VolumeCommand::Volume(v) => self.volume = v.min(64),
            VolumeCommand::Panning(p) => self.pan = (p.min(64) as i16 * 2 - 64) as i8,
            _ => {}
        }
        triggered
    }

    /// Effects whose only action is on the row tick.
    fn apply_row_effect(&mut self, triggered: bool, ctx: &TickContext<'_>) {
        match self.effect {
            Effect::SetVolume(v) => self.volume = v.min(64),
            Effect::SetChannelVolume(v) => self.channel_volume = v.min(64),
            Effect::SetPan(p) => self.pan = (p as i16 * 128 / 255 - 64) as i8,
            Effect::SetPanPosition(x) => self.pan = (x.min(15) as i16 * 128 / 15 - 64) as i8,
            Effect::SampleOffset(p) if triggered => self.apply_sample_offset(p, ctx.module),
            Effect::SetVibratoWaveform(w) => self.vibrato.waveform = w & 7,
            Effect::SetTremoloWaveform(w) => self.tremolo.waveform = w & 7,
            _ => {}
        }
    }

    fn apply_sample_offset(&mut self, param: u8, module: &Module) {
        let Some(sample) = module.samples.get(self.voice.sample) else {
            return;
        };
        let offset = param as u64 * 256;
        if offset < sample.len() as u64 {
            self.voice.cursor = offset << 32;
        } else if sample.has_loop() {
            self.voice.cursor = (sample.loop_start as u64) << 32;
        } else {
            self.voice.cut();
        }
    }

    fn apply_tick(&mut self, ctx: &TickContext<'_>) {
        let tick = ctx.tick;
        let format = ctx.format();
        let linear = ctx.linear();

        if let (Some(cell), Effect::NoteDelay(delay)) = (self.delayed, self.effect) {
            if tick == delay {
                self.delayed = None;
                self.apply_note(&cell, ctx);
            }
        }

        let effect = if tick > 0 && self.effect.is_row_effect() {
            Effect::None
        } else {
            self.effect
        };
        match effect {
            Effect::Arpeggio(p) => {
                self.arpeggio = match tick % 3 {
                    0 => 0,
                    1 => p >> 4,
                    _ => p & 0x0F,
                };
            }
            Effect::PortaUp(p) => {
                if let Some(d) = porta_amount(p, tick, format) {
                    self.slide_pitch(-d, ctx);
                }
            }
            Effect::PortaDown(p) => {
                if let Some(d) = porta_amount(p, tick, format) {
                    self.slide_pitch(d, ctx);
                }
            }
            Effect::FinePortaUp(x) => self.slide_pitch(-(x as i32 * 4), ctx),
            Effect::FinePortaDown(x) => self.slide_pitch(x as i32 * 4, ctx),
            Effect::TonePorta(p) if tick > 0 => self.tone_porta(p as i32 * 4, linear),
            Effect::Vibrato(p) if tick > 0 => self.vibrato(p, 5),
            Effect::FineVibrato(p) if tick > 0 => self.vibrato(p, 7),
            Effect::TonePortaVolSlide(p) => {
                if tick > 0 {
                    let speed = self.memory.get(MemorySlot::TonePorta);
                    self.tone_porta(speed as i32 * 4, linear);
                }
                self.volume_slide(p, tick, format);
            }
            Effect::VibratoVolSlide(p) => {
                if tick > 0 {
                    self.vibrato(self.memory.get(MemorySlot::Vibrato), 5);
                }
                self.volume_slide(p, tick, format);
            }
            Effect::Tremolo(p) if tick > 0 => {
                let depth = (p & 0x0F) as i32;
                self.volume_offset = ((self.tremolo.value(&mut self.rng) * depth) >> 6) as i16;
                self.tremolo.advance(p >> 4);
            }
            Effect::Tremor(p) => {
                let on = (p >> 4).max(1);
                let off = (p & 0x0F).max(1);
                self.tremor_mute = self.tremor_count % (on + off) >= on;
                self.tremor_count = (self.tremor_count + 1) % (on + off);
            }
            Effect::PanningSlide(p) => {
                if let Some(d) = Slide::decode(p).and_then(|s| s.amount_on(tick)) {
                    self.pan = (self.pan as i16 - d as i16 * 2).clamp(-64, 64) as i8;
                }
            }
            Effect::VolumeSlide(p) => self.volume_slide(p, tick, format),
            Effect::FineVolumeSlideUp(x) => self.volume = add_clamped(self.volume, x as i8, 64),
            Effect::FineVolumeSlideDown(x) => {
                self.volume = add_clamped(self.volume, -(x as i8), 64);
            }
            Effect::ChannelVolumeSlide(p) => {
                if let Some(d) = Slide::decode(p).and_then(|s| s.amount_on(tick)) {
                    self.channel_volume = add_clamped(self.channel_volume, d, 64);
                }
            }
            Effect::Retrigger(p) if tick > 0 => self.retrigger(p),
            Effect::NoteCut(x) if tick == x => self.volume = 0,
            _ => {}
        }

        self.apply_volume_column_tick(tick, linear, ctx);
    }

    fn apply_volume_column_tick(&mut self, tick: u8, linear: bool, ctx: &TickContext<'_>) {
        match self.volume_command {
            VolumeCommand::FineVolSlideUp(x) if tick == 0 => {
                self.volume = add_clamped(self.volume, x as i8, 64);
            }
            VolumeCommand::FineVolSlideDown(x) if tick == 0 => {
                self.volume = add_clamped(self.volume, -(x as i8), 64);
            }
            VolumeCommand::VolumeSlideUp(x) if tick > 0 => {
                self.volume = add_clamped(self.volume, x as i8, 64);
            }
            VolumeCommand::VolumeSlideDown(x) if tick > 0 => {
                self.volume = add_clamped(self.volume, -(x as i8), 64);
            }
            VolumeCommand::PortaUp(x) if tick > 0 => self.slide_pitch(-(x as i32 * 16), ctx),
            VolumeCommand::PortaDown(x) if tick > 0 => self.slide_pitch(x as i32 * 16, ctx),
            VolumeCommand::TonePorta(i) if tick > 0 => {
                let speed = match VOLUME_PORTA_SPEEDS.get(i as usize) {
                    Some(&s) if s != 0 => s,
                    _ => self.memory.get(MemorySlot::TonePorta),
                };
                self.tone_porta(speed as i32 * 4, linear);
            }
            VolumeCommand::Vibrato(depth) if tick > 0 => {
                let speed = self.memory.get(MemorySlot::Vibrato) & 0xF0;
                self.vibrato(speed | depth.min(15), 5);
            }
            _ => {}
        }
    }

    fn slide_pitch(&mut self, delta: i32, ctx: &TickContext<'_>) {
        if self.period == 0 {
            return;
        }
        self.period = clamp_period(slide_period(self.period, delta, ctx.linear()), ctx.format());
    }

    fn tone_porta(&mut self, speed: i32, linear: bool) {
        if self.period == 0 || self.target_period == 0 || speed == 0 {
            return;
        }
        if self.period < self.target_period {
            self.period = slide_period(self.period, speed, linear).min(self.target_period);
        } else if self.period > self.target_period {
            self.period = slide_period(self.period, -speed, linear).max(self.target_period);
        }
    }

    fn vibrato(&mut self, param: u8, shift: u32) {
        let depth = (param & 0x0F) as i32;
        self.vibrato_delta = (self.vibrato.value(&mut self.rng) * depth) >> shift;
        self.vibrato.advance(param >> 4);
    }

    fn volume_slide(&mut self, param: u8, tick: u8, format: Format) {
        if let Some(d) = Slide::for_format(param, format).and_then(|s| s.amount_on(tick)) {
            self.volume = add_clamped(self.volume, d, 64);
        }
    }

    fn retrigger(&mut self, param: u8) {
        let interval = param & 0x0F;
        if interval == 0 || self.period == 0 {
            return;
        }
        self.retrigger_count += 1;
        if self.retrigger_count >= interval {
            self.retrigger_count = 0;
            self.voice.trigger(self.voice.sample, 0);
            self.volume = retrigger_volume(self.volume, param >> 4);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imp_ir::{Instrument, SampleData};

    fn make_module(format: Format) -> Module {
        let mut module = Module::with_channels("test", format, 1);
        let mut sample = Sample::new("square");
        sample.data = SampleData::Mono8(vec![64; 4096]);
        sample.default_volume = 48;
        module.samples.push(sample);
        module.instruments.push(Instrument::single_sample("square", 1));
        module
    }

    fn make_channel(module: &Module) -> Channel {
        Channel::new(&module.channels[0], 0)
    }

    fn cell(note: Note, instrument: u8, effect: u8, param: u8) -> Cell {
        Cell { note, instrument, effect, param, ..Cell::empty() }
    }

    fn note_on(note: u8) -> Cell {
        cell(Note::On(note), 1, 0, 0)
    }

    fn ctx(module: &Module, tick: u8) -> TickContext<'_> {
        TickContext { module, tick, speed: 6 }
    }

    /// Run a whole row of `speed` ticks.
    fn play_row(ch: &mut Channel, module: &Module, cell: &Cell) {
        ch.row(cell, &ctx(module, 0));
        for tick in 1..6 {
            ch.tick(&ctx(module, tick));
        }
    }

    #[test]
    fn note_triggers_voice() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        assert!(ch.voice.active);
        assert_eq!(ch.period, 1712);
        assert_eq!(ch.volume, 48);
        assert_eq!(ch.voice.cursor, 0);
    }

    #[test]
    fn note_without_instrument_is_ignored() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 0, 0, 0), &ctx(&module, 0));
        assert!(!ch.voice.active);
    }

    #[test]
    fn instrument_alone_resets_volume() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        ch.volume = 10;
        ch.voice.cursor = 100 << 32;
        ch.row(&cell(Note::None, 1, 0, 0), &ctx(&module, 0));
        assert_eq!(ch.volume, 48);
        assert_eq!(ch.voice.cursor, 100 << 32);
    }

    #[test]
    fn note_off_and_cut_stop_voice() {
        let module = make_module(Format::ImpulseTracker);
        for release in [Note::Off, Note::Cut, Note::Fade] {
            let mut ch = make_channel(&module);
            ch.row(&note_on(60), &ctx(&module, 0));
            ch.row(&cell(release, 0, 0, 0), &ctx(&module, 0));
            assert!(!ch.voice.active);
        }
    }

    #[test]
    fn volume_column_sets_volume_and_pan() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        let mut c = note_on(60);
        c.volume = VolumeCommand::Volume(20);
        ch.row(&c, &ctx(&module, 0));
        assert_eq!(ch.volume, 20);
        ch.row(&Cell { volume: VolumeCommand::Panning(64), ..Cell::empty() }, &ctx(&module, 0));
        assert_eq!(ch.pan, 64);
    }

    #[test]
    fn volume_slide_runs_on_later_ticks() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 4, 0x02));
        assert_eq!(ch.volume, 48 - 5 * 2);
    }

    #[test]
    fn fine_volume_slide_runs_once() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 4, 0x3F));
        assert_eq!(ch.volume, 51);
    }

    #[test]
    fn volume_slide_remembers_parameter() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 4, 0x01));
        play_row(&mut ch, &module, &cell(Note::None, 0, 4, 0x00));
        assert_eq!(ch.volume, 48 - 10);
    }

    #[test]
    fn volume_slide_clamps() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 0xA, 0xF0));
        assert_eq!(ch.volume, 64);
        play_row(&mut ch, &module, &cell(Note::None, 0, 0xA, 0x0F));
        assert_eq!(ch.volume, 0);
    }

    #[test]
    fn mod_porta_up_per_tick() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 0x1, 0x04), &ctx(&module, 0));
        assert_eq!(ch.period, 1712);
        ch.tick(&ctx(&module, 1));
        assert_eq!(ch.period, 1712 - 16);
    }

    #[test]
    fn mod_slides_reuse_last_parameter() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 0x1, 0x04));
        assert_eq!(ch.period, 1632);
        play_row(&mut ch, &module, &cell(Note::None, 0, 0x1, 0x00));
        assert_eq!(ch.period, 1552);

        play_row(&mut ch, &module, &cell(Note::None, 0, 0xA, 0x01));
        play_row(&mut ch, &module, &cell(Note::None, 0, 0xA, 0x00));
        assert_eq!(ch.volume, 48 - 10);
    }

    #[test]
    fn mod_porta_clamps_to_amiga_range() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        for _ in 0..20 {
            play_row(&mut ch, &module, &cell(Note::None, 0, 0x1, 0xFF));
        }
        assert_eq!(ch.period, crate::frequency::MOD_PERIOD_MIN);
    }

    #[test]
    fn s3m_fine_porta_on_row_tick_only() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 5, 0xF2));
        assert_eq!(ch.period, 1712 + 8);
        play_row(&mut ch, &module, &cell(Note::None, 0, 6, 0xE3));
        assert_eq!(ch.period, 1712 + 8 - 3);
    }

    #[test]
    fn tone_porta_glides_without_retrigger() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        ch.voice.cursor = 10 << 32;
        ch.row(&cell(Note::On(72), 1, 0x3, 0x40), &ctx(&module, 0));
        assert_eq!(ch.period, 1712);
        assert_eq!(ch.target_period, 856);
        assert_eq!(ch.voice.cursor, 10 << 32);
        for (tick, expected) in [(1, 1456), (2, 1200), (3, 944), (4, 856), (5, 856)] {
            ch.tick(&ctx(&module, tick));
            assert_eq!(ch.period, expected);
        }
    }

    #[test]
    fn tone_porta_without_voice_triggers() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(72), 1, 0x3, 0x40), &ctx(&module, 0));
        assert!(ch.voice.active);
        assert_eq!(ch.period, 856);
    }

    #[test]
    fn arpeggio_cycles_semitones() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 0x0, 0x37), &ctx(&module, 0));
        ch.update(&module, 44100, 128, 256);
        assert_eq!(ch.voice.step, period_to_step(1712, 44100));
        ch.tick(&ctx(&module, 1));
        ch.update(&module, 44100, 128, 256);
        assert_eq!(ch.voice.step, period_to_step(transpose_period(1712, 3), 44100));
        ch.tick(&ctx(&module, 2));
        ch.update(&module, 44100, 128, 256);
        assert_eq!(ch.voice.step, period_to_step(transpose_period(1712, 7), 44100));
        assert_eq!(ch.period, 1712);
    }

    #[test]
    fn vibrato_leaves_base_period() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 0x4, 0x8F), &ctx(&module, 0));
        ch.tick(&ctx(&module, 1));
        ch.tick(&ctx(&module, 2));
        ch.update(&module, 44100, 128, 256);
        assert_eq!(ch.period, 1712);
        assert_ne!(ch.voice.step, period_to_step(1712, 44100));
    }

    #[test]
    fn note_delay_defers_trigger() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 19, 0xD2), &ctx(&module, 0));
        assert!(!ch.voice.active);
        assert!(ch.has_delayed_note());
        ch.tick(&ctx(&module, 1));
        assert!(!ch.voice.active);
        ch.tick(&ctx(&module, 2));
        assert!(ch.voice.active);
        assert!(!ch.has_delayed_note());
    }

    #[test]
    fn note_delay_past_row_never_plays() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 19, 0xD6));
        assert!(!ch.voice.active);
    }

    #[test]
    fn note_cut_at_tick() {
        let module = make_module(Format::ProTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 0xE, 0xC2), &ctx(&module, 0));
        ch.tick(&ctx(&module, 1));
        assert_eq!(ch.volume, 48);
        ch.tick(&ctx(&module, 2));
        assert_eq!(ch.volume, 0);
    }

    #[test]
    fn sample_offset_moves_cursor() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 15, 0x02), &ctx(&module, 0));
        assert_eq!(ch.voice.position(), 512);
    }

    #[test]
    fn sample_offset_past_end_cuts() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 15, 0x20), &ctx(&module, 0));
        assert!(!ch.voice.active);
    }

    #[test]
    fn sample_offset_past_end_of_looping_sample_starts_loop() {
        let mut module = make_module(Format::ImpulseTracker);
        module.samples[0].loop_type = imp_ir::LoopType::Forward;
        module.samples[0].loop_start = 1000;
        module.samples[0].loop_end = 4096;
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 15, 0x20), &ctx(&module, 0));
        assert!(ch.voice.active);
        assert_eq!(ch.voice.position(), 1000);
    }

    #[test]
    fn retrigger_restarts_sample() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::On(60), 1, 17, 0x72), &ctx(&module, 0));
        ch.voice.cursor = 100 << 32;
        ch.tick(&ctx(&module, 1));
        assert_eq!(ch.voice.cursor, 100 << 32);
        ch.tick(&ctx(&module, 2));
        assert_eq!(ch.voice.cursor, 0);
        assert_eq!(ch.volume, 24);
    }

    #[test]
    fn retrigger_volume_table() {
        assert_eq!(retrigger_volume(32, 0), 32);
        assert_eq!(retrigger_volume(32, 8), 32);
        assert_eq!(retrigger_volume(32, 3), 28);
        assert_eq!(retrigger_volume(32, 5), 16);
        assert_eq!(retrigger_volume(30, 6), 20);
        assert_eq!(retrigger_volume(32, 0xB), 36);
        assert_eq!(retrigger_volume(32, 0xE), 48);
        assert_eq!(retrigger_volume(40, 0xF), 64);
        assert_eq!(retrigger_volume(3, 4), 0);
    }

    #[test]
    fn tremor_mutes_off_ticks() {
        let module = make_module(Format::ScreamTracker3);
        let mut ch = make_channel(&module);
        ch.pan = 0;
        ch.row(&cell(Note::On(60), 1, 9, 0x21), &ctx(&module, 0));
        ch.update(&module, 44100, 128, 256);
        assert!(ch.voice.gain_left > 0);
        ch.tick(&ctx(&module, 1));
        ch.update(&module, 44100, 128, 256);
        assert!(ch.voice.gain_left > 0);
        ch.tick(&ctx(&module, 2));
        ch.update(&module, 44100, 128, 256);
        assert_eq!(ch.voice.gain_left, 0);
    }

    #[test]
    fn gains_follow_pan_law() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        ch.volume = 64;
        ch.pan = 0;
        ch.update(&module, 44100, 128, 256);
        assert_eq!((ch.voice.gain_left, ch.voice.gain_right), (2048, 2048));
        ch.pan = -64;
        ch.update(&module, 44100, 128, 256);
        assert_eq!((ch.voice.gain_left, ch.voice.gain_right), (4096, 0));
        ch.muted = true;
        ch.update(&module, 44100, 128, 256);
        assert_eq!((ch.voice.gain_left, ch.voice.gain_right), (0, 0));
    }

    #[test]
    fn global_and_master_volume_scale_gain() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&note_on(60), &ctx(&module, 0));
        ch.volume = 64;
        ch.pan = 0;
        ch.update(&module, 44100, 64, 256);
        assert_eq!(ch.voice.gain_left, 1024);
        ch.update(&module, 44100, 128, 128);
        assert_eq!(ch.voice.gain_left, 1024);
    }

    #[test]
    fn set_pan_effects() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        ch.row(&cell(Note::None, 0, 24, 0), &ctx(&module, 0));
        assert_eq!(ch.pan, -64);
        ch.row(&cell(Note::None, 0, 24, 255), &ctx(&module, 0));
        assert_eq!(ch.pan, 64);
        ch.row(&cell(Note::None, 0, 19, 0x80), &ctx(&module, 0));
        assert_eq!(ch.pan, -64);
    }

    #[test]
    fn pattern_loop_counts() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        assert_eq!(ch.pattern_loop(0, 4), None);
        assert_eq!(ch.pattern_loop(2, 7), Some(4));
        assert_eq!(ch.pattern_loop(2, 7), Some(4));
        assert_eq!(ch.pattern_loop(2, 7), None);
        assert_eq!(ch.loop_row, 8);
    }

    #[test]
    fn cut_clears_memory() {
        let module = make_module(Format::ImpulseTracker);
        let mut ch = make_channel(&module);
        play_row(&mut ch, &module, &cell(Note::On(60), 1, 4, 0x01));
        ch.cut();
        assert!(!ch.voice.active);
        assert_eq!(ch.memory, EffectMemory::default());
    }

    #[test]
    fn waveforms() {
        let mut rng = 1;
        let sine = Oscillator { position: 16, waveform: 0 };
        assert_eq!(sine.value(&mut rng), 255);
        let sine = Oscillator { position: 48, waveform: 0 };
        assert_eq!(sine.value(&mut rng), -255);
        let ramp = Oscillator { position: 0, waveform: 1 };
        assert_eq!(ramp.value(&mut rng), 255);
        let square = Oscillator { position: 40, waveform: 2 };
        assert_eq!(square.value(&mut rng), -255);
        let random = Oscillator { position: 0, waveform: 3 };
        for _ in 0..100 {
            assert!((-255..=255).contains(&random.value(&mut rng)));
        }
    }

    #[test]
    fn waveform_bit_two_keeps_phase() {
        let mut osc = Oscillator { position: 10, waveform: 4 };
        osc.retrigger();
        assert_eq!(osc.position, 10);
        osc.waveform = 0;
        osc.retrigger();
        assert_eq!(osc.position, 0);
    }
}
