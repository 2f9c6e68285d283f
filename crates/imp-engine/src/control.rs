//! Transport commands in, position and transport updates out.
//!
//! The sequencer never talks to a queue directly. It pulls commands from a
//! [`CommandSource`] and pushes updates into a [`StateSink`], so the same
//! code runs behind lock-free rings on the audio thread and behind plain
//! vectors in tests.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Playback transport state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// The song reached an end marker or ran off the order list.
    Finished,
}

/// Where playback is in the song.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlaybackPosition {
    pub order: u16,
    pub pattern: u8,
    pub row: u16,
}

impl PlaybackPosition {
    /// Pack into one word for an atomic mailbox.
    pub fn pack(self) -> u64 {
        ((self.order as u64) << 32) | ((self.pattern as u64) << 16) | self.row as u64
    }

    /// Inverse of [`PlaybackPosition::pack`].
    pub fn unpack(word: u64) -> Self {
        Self {
            order: (word >> 32) as u16,
            pattern: (word >> 16) as u8,
            row: word as u16,
        }
    }
}

/// A request from the control side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Seek { order: u16, row: u16 },
}

/// An event published by the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateUpdate {
    /// A new row started.
    Position(PlaybackPosition),
    /// The transport changed.
    Transport(Transport),
}

/// Why a seek was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("seek is only possible while playing or paused")]
    InvalidState,
    #[error("no row {row} at order {order}")]
    OutOfRange { order: u16, row: u16 },
}

/// Supplies pending commands, oldest first.
pub trait CommandSource {
    fn next_command(&mut self) -> Option<Command>;
}

/// Receives state updates. Must not block.
pub trait StateSink {
    fn publish(&mut self, update: StateUpdate);
}

/// A command source that is always empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCommands;

impl CommandSource for NoCommands {
    fn next_command(&mut self) -> Option<Command> {
        None
    }
}

impl CommandSource for VecDeque<Command> {
    fn next_command(&mut self) -> Option<Command> {
        self.pop_front()
    }
}

/// Discards every update.
impl StateSink for () {
    fn publish(&mut self, _update: StateUpdate) {}
}

impl StateSink for Vec<StateUpdate> {
    fn publish(&mut self, update: StateUpdate) {
        self.push(update);
    }
}
