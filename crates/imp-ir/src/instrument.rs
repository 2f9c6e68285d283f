//! Instrument keyboard mapping.

use arrayvec::ArrayString;

use crate::pattern::MAX_NOTE;
use crate::sample::push_truncated;

/// An instrument definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<32>,
    /// Keyboard: played note (0-119) -> (note to play, sample number; 0 = none)
    pub keyboard: [(u8, u8); 120],
    /// Instrument global volume (0-128)
    pub global_volume: u8,
    /// Default panning (-64 to +64), applied on trigger when present
    pub default_pan: Option<i8>,
}

impl Default for Instrument {
    fn default() -> Self {
        let mut keyboard = [(0u8, 0u8); 120];
        for (note, entry) in keyboard.iter_mut().enumerate() {
            entry.0 = note as u8;
        }
        Self {
            name: ArrayString::new(),
            keyboard,
            global_volume: 128,
            default_pan: None,
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        let mut inst = Self::default();
        push_truncated(&mut inst.name, name);
        inst
    }

    /// Instrument that plays one sample unchanged across the keyboard.
    pub fn single_sample(name: &str, sample_number: u8) -> Self {
        let mut inst = Self::new(name);
        inst.set_single_sample(sample_number);
        inst
    }

    /// Set all notes to map to a single sample (1-based, 0 = none).
    pub fn set_single_sample(&mut self, sample_number: u8) {
        for (note, entry) in self.keyboard.iter_mut().enumerate() {
            *entry = (note as u8, sample_number);
        }
    }

    /// Resolve a played note to (note to play, sample index).
    pub fn resolve(&self, note: u8) -> Option<(u8, usize)> {
        let (mapped, sample) = *self.keyboard.get(note as usize)?;
        if sample == 0 {
            return None;
        }
        Some((mapped.min(MAX_NOTE), sample as usize - 1))
    }
}
