//! Score data model for the impulse module player.
//!
//! Every format parser emits a [`Module`], and the playback engine
//! consumes it read-only.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod instrument;
mod module;
mod pattern;
mod sample;

pub use effects::VolumeCommand;
pub use instrument::Instrument;
pub use module::{ChannelSettings, Format, ModelError, Module, OrderEntry, MAX_CHANNELS};
pub use pattern::{Cell, Note, Pattern, MAX_NOTE, MAX_ROWS};
pub use sample::{push_truncated, LoopType, Sample, SampleData, DEFAULT_BASE_RATE};
