//! Effect decoding and per-channel parameter memory.
//!
//! Pattern cells keep the raw dialect opcode. [`Effect::decode`] turns it
//! into a dialect-independent variant once per row, and [`EffectMemory`]
//! substitutes remembered parameters for zero ones.

use imp_ir::Format;

/// A decoded effect command. Each variant carries its parameter byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    None,
    Arpeggio(u8),
    /// `xx` per tick; for S3M/IT `Fx`/`Ex` are fine and extra-fine slides on tick 0.
    PortaUp(u8),
    PortaDown(u8),
    /// ProTracker `E1x`/`E2x`, once on tick 0.
    FinePortaUp(u8),
    FinePortaDown(u8),
    TonePorta(u8),
    Vibrato(u8),
    FineVibrato(u8),
    TonePortaVolSlide(u8),
    VibratoVolSlide(u8),
    Tremolo(u8),
    Tremor(u8),
    /// 0 = hard left, 255 = hard right.
    SetPan(u8),
    /// 0 = hard left, 15 = hard right.
    SetPanPosition(u8),
    PanningSlide(u8),
    SampleOffset(u8),
    VolumeSlide(u8),
    /// ProTracker `EAx`/`EBx`.
    FineVolumeSlideUp(u8),
    FineVolumeSlideDown(u8),
    SetVolume(u8),
    SetChannelVolume(u8),
    ChannelVolumeSlide(u8),
    PositionJump(u8),
    /// Decoded target row.
    PatternBreak(u8),
    PatternLoop(u8),
    PatternDelay(u8),
    NoteCut(u8),
    NoteDelay(u8),
    /// `xy`: volume change `x`, interval `y` ticks.
    Retrigger(u8),
    SetVibratoWaveform(u8),
    SetTremoloWaveform(u8),
    SetSpeed(u8),
    SetTempo(u8),
    /// IT `T0x` slides down, `T1x` slides up.
    TempoSlide(u8),
    SetGlobalVolume(u8),
    GlobalVolumeSlide(u8),
}

/// Memory banks an effect can read from and write to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemorySlot {
    Porta,
    TonePorta,
    Vibrato,
    Tremolo,
    VolumeSlide,
    ChannelVolumeSlide,
    GlobalVolumeSlide,
    PanningSlide,
    SampleOffset,
    Retrigger,
    Tremor,
    Arpeggio,
    TempoSlide,
}

const NUM_SLOTS: usize = 13;

/// How a zero parameter is filled in from memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Memory {
    /// The parameter is used as written.
    None,
    /// A zero parameter reuses the whole remembered byte.
    Whole(MemorySlot),
    /// Each zero nibble reuses the remembered nibble.
    Nibbles(MemorySlot),
}

/// Binary-coded-decimal row number used by ProTracker and S3M breaks.
fn bcd(param: u8) -> u8 {
    (param >> 4) * 10 + (param & 0x0F)
}

impl Effect {
    /// Decode a raw cell opcode and parameter for the given dialect.
    ///
    /// ProTracker opcodes are the hex digits 0-F. S3M and IT opcodes are the
    /// letters A-Z numbered from 1. Anything unknown decodes to `None`.
    pub fn decode(format: Format, opcode: u8, param: u8) -> Effect {
        match format {
            Format::ProTracker => Self::decode_mod(opcode, param),
            Format::ScreamTracker3 | Format::ImpulseTracker => {
                Self::decode_letter(format, opcode, param)
            }
        }
    }

    fn decode_mod(opcode: u8, param: u8) -> Effect {
        let x = param >> 4;
        let y = param & 0x0F;
        match opcode {
            0x0 if param != 0 => Effect::Arpeggio(param),
            0x1 => Effect::PortaUp(param),
            0x2 => Effect::PortaDown(param),
            0x3 => Effect::TonePorta(param),
            0x4 => Effect::Vibrato(param),
            0x5 => Effect::TonePortaVolSlide(param),
            0x6 => Effect::VibratoVolSlide(param),
            0x7 => Effect::Tremolo(param),
            0x8 => Effect::SetPan(param),
            0x9 => Effect::SampleOffset(param),
            0xA => Effect::VolumeSlide(param),
            0xB => Effect::PositionJump(param),
            0xC => Effect::SetVolume(param.min(64)),
            0xD => Effect::PatternBreak(bcd(param)),
            0xE => match x {
                0x1 => Effect::FinePortaUp(y),
                0x2 => Effect::FinePortaDown(y),
                0x4 => Effect::SetVibratoWaveform(y),
                0x6 => Effect::PatternLoop(y),
                0x7 => Effect::SetTremoloWaveform(y),
                0x8 => Effect::SetPanPosition(y),
                // Interval only; the high nibble stays 0 so the volume is kept.
                0x9 => Effect::Retrigger(y),
                0xA => Effect::FineVolumeSlideUp(y),
                0xB => Effect::FineVolumeSlideDown(y),
                0xC => Effect::NoteCut(y),
                0xD => Effect::NoteDelay(y),
                0xE => Effect::PatternDelay(y),
                _ => Effect::None,
            },
            0xF if param == 0 => Effect::None,
            0xF if param < 32 => Effect::SetSpeed(param),
            0xF => Effect::SetTempo(param),
            _ => Effect::None,
        }
    }

    fn decode_letter(format: Format, opcode: u8, param: u8) -> Effect {
        let it = format == Format::ImpulseTracker;
        let x = param >> 4;
        let y = param & 0x0F;
        match opcode {
            1 if param != 0 => Effect::SetSpeed(param),
            2 => Effect::PositionJump(param),
            3 if it => Effect::PatternBreak(param),
            3 => Effect::PatternBreak(bcd(param)),
            4 => Effect::VolumeSlide(param),
            5 => Effect::PortaDown(param),
            6 => Effect::PortaUp(param),
            7 => Effect::TonePorta(param),
            8 => Effect::Vibrato(param),
            9 => Effect::Tremor(param),
            10 => Effect::Arpeggio(param),
            11 => Effect::VibratoVolSlide(param),
            12 => Effect::TonePortaVolSlide(param),
            13 => Effect::SetChannelVolume(param.min(64)),
            14 => Effect::ChannelVolumeSlide(param),
            15 => Effect::SampleOffset(param),
            16 => Effect::PanningSlide(param),
            17 => Effect::Retrigger(param),
            18 => Effect::Tremolo(param),
            19 => match x {
                0x3 => Effect::SetVibratoWaveform(y),
                0x4 => Effect::SetTremoloWaveform(y),
                0x8 => Effect::SetPanPosition(y),
                0xB => Effect::PatternLoop(y),
                0xC => Effect::NoteCut(y),
                0xD => Effect::NoteDelay(y),
                0xE => Effect::PatternDelay(y),
                _ => Effect::None,
            },
            20 if param >= 0x20 => Effect::SetTempo(param),
            20 if it => Effect::TempoSlide(param),
            21 => Effect::FineVibrato(param),
            22 if it => Effect::SetGlobalVolume(param.min(128)),
            22 => Effect::SetGlobalVolume(param.min(64) * 2),
            23 => Effect::GlobalVolumeSlide(param),
            24 if it => Effect::SetPan(param),
            // S3M panning runs 0..=0x80; 0xA4 (surround) is treated as centre.
            24 if param <= 0x80 => Effect::SetPan((param as u16 * 255 / 128) as u8),
            24 => Effect::SetPan(128),
            _ => Effect::None,
        }
    }

    /// Memory rule for this effect under `format`.
    pub fn memory(self, format: Format) -> Memory {
        use MemorySlot as S;
        if format == Format::ProTracker {
            return match self {
                Effect::PortaUp(_) | Effect::PortaDown(_) => Memory::Whole(S::Porta),
                Effect::TonePorta(_) => Memory::Whole(S::TonePorta),
                Effect::Vibrato(_) => Memory::Nibbles(S::Vibrato),
                Effect::Tremolo(_) => Memory::Nibbles(S::Tremolo),
                Effect::VolumeSlide(_) => Memory::Whole(S::VolumeSlide),
                Effect::SampleOffset(_) => Memory::Whole(S::SampleOffset),
                _ => Memory::None,
            };
        }
        match self {
            Effect::Arpeggio(_) => Memory::Whole(S::Arpeggio),
            Effect::PortaUp(_) | Effect::PortaDown(_) => Memory::Whole(S::Porta),
            Effect::TonePorta(_) => Memory::Whole(S::TonePorta),
            Effect::Vibrato(_) | Effect::FineVibrato(_) => Memory::Nibbles(S::Vibrato),
            Effect::Tremolo(_) => Memory::Nibbles(S::Tremolo),
            Effect::VolumeSlide(_) | Effect::TonePortaVolSlide(_) | Effect::VibratoVolSlide(_) => {
                Memory::Whole(S::VolumeSlide)
            }
            Effect::ChannelVolumeSlide(_) => Memory::Whole(S::ChannelVolumeSlide),
            Effect::GlobalVolumeSlide(_) => Memory::Whole(S::GlobalVolumeSlide),
            Effect::PanningSlide(_) => Memory::Whole(S::PanningSlide),
            Effect::SampleOffset(_) => Memory::Whole(S::SampleOffset),
            Effect::Retrigger(_) => Memory::Whole(S::Retrigger),
            Effect::Tremor(_) => Memory::Whole(S::Tremor),
            Effect::TempoSlide(_) => Memory::Whole(S::TempoSlide),
            _ => Memory::None,
        }
    }

    /// Parameter of a remembering effect.
    fn param(self) -> u8 {
        match self {
            Effect::Arpeggio(p)
            | Effect::PortaUp(p)
            | Effect::PortaDown(p)
            | Effect::TonePorta(p)
            | Effect::Vibrato(p)
            | Effect::FineVibrato(p)
            | Effect::TonePortaVolSlide(p)
            | Effect::VibratoVolSlide(p)
            | Effect::Tremolo(p)
            | Effect::Tremor(p)
            | Effect::PanningSlide(p)
            | Effect::SampleOffset(p)
            | Effect::VolumeSlide(p)
            | Effect::ChannelVolumeSlide(p)
            | Effect::Retrigger(p)
            | Effect::TempoSlide(p)
            | Effect::GlobalVolumeSlide(p) => p,
            _ => 0,
        }
    }

    fn with_param(self, p: u8) -> Effect {
        match self {
            Effect::Arpeggio(_) => Effect::Arpeggio(p),
            Effect::PortaUp(_) => Effect::PortaUp(p),
            Effect::PortaDown(_) => Effect::PortaDown(p),
            Effect::TonePorta(_) => Effect::TonePorta(p),
            Effect::Vibrato(_) => Effect::Vibrato(p),
            Effect::FineVibrato(_) => Effect::FineVibrato(p),
            Effect::TonePortaVolSlide(_) => Effect::TonePortaVolSlide(p),
            Effect::VibratoVolSlide(_) => Effect::VibratoVolSlide(p),
            Effect::Tremolo(_) => Effect::Tremolo(p),
            Effect::Tremor(_) => Effect::Tremor(p),
            Effect::PanningSlide(_) => Effect::PanningSlide(p),
            Effect::SampleOffset(_) => Effect::SampleOffset(p),
            Effect::VolumeSlide(_) => Effect::VolumeSlide(p),
            Effect::ChannelVolumeSlide(_) => Effect::ChannelVolumeSlide(p),
            Effect::Retrigger(_) => Effect::Retrigger(p),
            Effect::TempoSlide(_) => Effect::TempoSlide(p),
            Effect::GlobalVolumeSlide(_) => Effect::GlobalVolumeSlide(p),
            other => other,
        }
    }

    /// True for effects that act only on the first tick of a row.
    pub fn is_row_effect(self) -> bool {
        matches!(
            self,
            Effect::FinePortaUp(_)
                | Effect::FinePortaDown(_)
                | Effect::SetPan(_)
                | Effect::SetPanPosition(_)
                | Effect::SampleOffset(_)
                | Effect::FineVolumeSlideUp(_)
                | Effect::FineVolumeSlideDown(_)
                | Effect::SetVolume(_)
                | Effect::SetChannelVolume(_)
                | Effect::PositionJump(_)
                | Effect::PatternBreak(_)
                | Effect::PatternLoop(_)
                | Effect::PatternDelay(_)
                | Effect::SetVibratoWaveform(_)
                | Effect::SetTremoloWaveform(_)
                | Effect::SetSpeed(_)
                | Effect::SetTempo(_)
                | Effect::SetGlobalVolume(_)
        )
    }
}

/// Last nonzero parameter per memory slot for one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectMemory {
    slots: [u8; NUM_SLOTS],
}

impl EffectMemory {
    /// Fill a zero parameter from memory and remember nonzero ones.
    ///
    /// Returns `None` when the parameter is zero and nothing is remembered
    /// yet; the effect is then a no-op.
    pub fn resolve(&mut self, effect: Effect, format: Format) -> Option<Effect> {
        match effect.memory(format) {
            Memory::None => Some(effect),
            Memory::Whole(slot) => {
                let stored = &mut self.slots[slot as usize];
                let p = effect.param();
                if p != 0 {
                    *stored = p;
                    Some(effect)
                } else if *stored != 0 {
                    Some(effect.with_param(*stored))
                } else {
                    None
                }
            }
            Memory::Nibbles(slot) => {
                let stored = &mut self.slots[slot as usize];
                let p = effect.param();
                let hi = if p & 0xF0 != 0 { p & 0xF0 } else { *stored & 0xF0 };
                let lo = if p & 0x0F != 0 { p & 0x0F } else { *stored & 0x0F };
                let merged = hi | lo;
                if merged == 0 {
                    return None;
                }
                *stored = merged;
                Some(effect.with_param(merged))
            }
        }
    }

    /// Last value stored for `slot`.
    pub fn get(&self, slot: MemorySlot) -> u8 {
        self.slots[slot as usize]
    }

    /// Forget every remembered parameter.
    pub fn clear(&mut self) {
        self.slots = [0; NUM_SLOTS];
    }
}

/// A volume-style slide decoded from an `xy` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slide {
    /// Applied on every tick after the first.
    PerTick(i8),
    /// Applied once, on the first tick.
    Fine(i8),
}

impl Slide {
    /// Decode `xy` the S3M/IT way: `xF`/`Fy` are fine, `x0` up, `0y` down.
    pub fn decode(param: u8) -> Option<Slide> {
        let x = (param >> 4) as i8;
        let y = (param & 0x0F) as i8;
        if y == 0xF && x != 0 {
            Some(Slide::Fine(x))
        } else if x == 0xF && y != 0 {
            Some(Slide::Fine(-y))
        } else if y == 0 && x != 0 {
            Some(Slide::PerTick(x))
        } else if x == 0 && y != 0 {
            Some(Slide::PerTick(-y))
        } else {
            None
        }
    }

    /// Decode `xy` the ProTracker way: no fine variants, `x` wins over `y`.
    pub fn decode_mod(param: u8) -> Option<Slide> {
        let x = (param >> 4) as i8;
        let y = (param & 0x0F) as i8;
        match (x, y) {
            (0, 0) => None,
            (0, y) => Some(Slide::PerTick(-y)),
            (x, _) => Some(Slide::PerTick(x)),
        }
    }

    /// Decode for the given dialect.
    pub fn for_format(param: u8, format: Format) -> Option<Slide> {
        match format {
            Format::ProTracker => Self::decode_mod(param),
            _ => Self::decode(param),
        }
    }

    /// Amount to apply on `tick`, if any.
    pub fn amount_on(self, tick: u8) -> Option<i8> {
        match self {
            Slide::PerTick(d) if tick > 0 => Some(d),
            Slide::Fine(d) if tick == 0 => Some(d),
            _ => None,
        }
    }
}
