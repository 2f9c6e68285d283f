//! Playback engine for the impulse module player.
//!
//! A [`Sequencer`] walks a shared [`imp_ir::Module`] tick by tick, and a
//! [`Mixer`] pulls it from an audio callback into interleaved PCM.

extern crate alloc;

mod channel;
pub mod control;
pub mod effects;
pub mod frequency;
mod mixer;
mod sequencer;
mod voice;

pub use channel::{Channel, Oscillator, TickContext};
pub use control::{
    Command, CommandSource, NoCommands, PlaybackPosition, SeekError, StateSink, StateUpdate,
    Transport,
};
pub use effects::{Effect, EffectMemory, Memory, MemorySlot};
pub use mixer::{Mixer, MIX_FRAMES};
pub use sequencer::{Sequencer, UNITY_MASTER};
pub use voice::{Voice, UNITY_GAIN};
