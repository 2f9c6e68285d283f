//! Pattern and cell types for tracker sequences.

use alloc::vec::Vec;
use core::fmt;

use crate::effects::VolumeCommand;

/// Upper bound on rows per pattern across all supported dialects.
pub const MAX_ROWS: u16 = 256;

/// Highest playable note number (B-9).
pub const MAX_NOTE: u8 = 119;

const NOTE_NAMES: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

/// A note value in a pattern cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on (0-119, where 60 = C-5 = the sample's base rate)
    On(u8),
    /// Note off / key release
    Off,
    /// Note cut (S3M `^^`, IT 254)
    Cut,
    /// Note fade (IT-specific)
    Fade,
}

impl Note {
    /// Create a note from octave (0-9) and semitone (0-11).
    pub const fn from_octave_semitone(octave: u8, semitone: u8) -> Self {
        Note::On(octave * 12 + semitone)
    }

    /// Get the octave (0-9) if this is a note on.
    pub const fn octave(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n / 12),
            _ => None,
        }
    }

    /// Get the semitone (0-11) if this is a note on.
    pub const fn semitone(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n % 12),
            _ => None,
        }
    }

    /// True for the sentinels that stop the sounding voice.
    pub const fn is_release(self) -> bool {
        matches!(self, Note::Off | Note::Cut | Note::Fade)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Note::None => f.write_str("..."),
            Note::On(n) => write!(f, "{}{}", NOTE_NAMES[(n % 12) as usize], n / 12),
            Note::Off => f.write_str("==="),
            Note::Cut => f.write_str("^^^"),
            Note::Fade => f.write_str("~~~"),
        }
    }
}

/// A single cell in a pattern.
///
/// The effect column is kept as the raw dialect opcode and parameter byte.
/// Decoding it is the playback engine's job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Note value
    pub note: Note,
    /// Instrument number (0 = none, 1-255 = instrument index + 1)
    pub instrument: u8,
    /// Volume column command
    pub volume: VolumeCommand,
    /// Effect opcode in the module's own numbering (0 = none)
    pub effect: u8,
    /// Effect parameter byte
    pub param: u8,
}

impl Cell {
    /// Create an empty cell.
    pub const fn empty() -> Self {
        Self {
            note: Note::None,
            instrument: 0,
            volume: VolumeCommand::None,
            effect: 0,
            param: 0,
        }
    }

    /// Returns true if the cell is completely empty.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

/// A pattern containing rows of cells across channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    /// Number of rows (1-256)
    pub rows: u16,
    /// Number of channels
    pub channels: u8,
    /// Pattern data, stored row-major: data[row * channels + channel]
    pub data: Vec<Cell>,
}

impl Pattern {
    /// Create a new pattern with empty cells.
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            data: alloc::vec![Cell::empty(); rows as usize * channels as usize],
        }
    }

    /// Get a reference to a cell, or `None` when out of range.
    pub fn get(&self, row: u16, channel: u8) -> Option<&Cell> {
        if row >= self.rows || channel >= self.channels {
            return None;
        }
        self.data.get(row as usize * self.channels as usize + channel as usize)
    }

    /// Get a reference to a cell.
    pub fn cell(&self, row: u16, channel: u8) -> &Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Get a mutable reference to a cell.
    pub fn cell_mut(&mut self, row: u16, channel: u8) -> &mut Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &mut self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// All cells in a row.
    pub fn row(&self, row: u16) -> &[Cell] {
        let start = row as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }

    /// Returns true if no cell in the pattern carries any data.
    pub fn is_silent(&self) -> bool {
        self.data.iter().all(Cell::is_empty)
    }
}
