//! Module structure and its query surface.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use core::fmt;

use crate::instrument::Instrument;
use crate::pattern::{Cell, Pattern};
use crate::sample::{push_truncated, Sample};

/// Maximum number of channels a module may declare.
pub const MAX_CHANNELS: usize = 64;

/// Module dialect, chosen by signature sniffing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// ProTracker-family MOD
    ProTracker,
    /// Scream Tracker 3 S3M
    ScreamTracker3,
    /// Impulse Tracker IT
    ImpulseTracker,
}

impl Format {
    /// Human readable dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            Format::ProTracker => "ProTracker MOD",
            Format::ScreamTracker3 => "Scream Tracker 3",
            Format::ImpulseTracker => "Impulse Tracker",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed module. Never mutated once a parser hands it out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    /// Song title
    pub title: ArrayString<32>,
    /// Dialect the module was decoded from
    pub format: Format,
    /// Initial tempo in BPM (32-255 typical)
    pub initial_tempo: u8,
    /// Initial speed (ticks per row, 1-255)
    pub initial_speed: u8,
    /// Global volume (0-128)
    pub global_volume: u8,
    /// Pitch slides work in linear frequency space instead of Amiga periods
    pub linear_slides: bool,
    /// Per-channel settings; `channels.len()` is the channel count
    pub channels: Vec<ChannelSettings>,
    /// Instruments
    pub instruments: Vec<Instrument>,
    /// Samples
    pub samples: Vec<Sample>,
    /// Patterns
    pub patterns: Vec<Pattern>,
    /// Song arrangement
    pub order: Vec<OrderEntry>,
}

impl Module {
    /// Create an empty module with the given channel count.
    ///
    /// Channels get the classic Amiga L R R L panning.
    pub fn with_channels(title: &str, format: Format, num_channels: u8) -> Self {
        let mut module = Self {
            title: ArrayString::new(),
            format,
            initial_tempo: 125,
            initial_speed: 6,
            global_volume: 128,
            linear_slides: false,
            channels: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
            patterns: Vec::new(),
            order: Vec::new(),
        };
        push_truncated(&mut module.title, title);

        for i in 0..num_channels {
            module.channels.push(ChannelSettings {
                initial_pan: if i % 4 == 0 || i % 4 == 3 { -64 } else { 64 },
                ..ChannelSettings::default()
            });
        }
        module
    }

    /// Song title.
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Dialect tag.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Number of order entries before the first end or loop marker.
    pub fn song_length(&self) -> usize {
        self.order
            .iter()
            .position(|e| matches!(e, OrderEntry::End | OrderEntry::Loop(_)))
            .unwrap_or(self.order.len())
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of patterns.
    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    /// Row count of a pattern, or `None` for an unknown index.
    pub fn num_rows(&self, pattern: usize) -> Option<u16> {
        self.patterns.get(pattern).map(|p| p.rows)
    }

    /// The cell at (pattern, row, channel).
    pub fn cell(&self, pattern: usize, row: u16, channel: usize) -> Option<&Cell> {
        let channel = u8::try_from(channel).ok()?;
        self.patterns.get(pattern)?.get(row, channel)
    }

    /// Pattern played at an order position, if that entry is a pattern.
    pub fn pattern_at(&self, order: usize) -> Option<(u8, &Pattern)> {
        match self.order.get(order)? {
            OrderEntry::Pattern(p) => self.patterns.get(*p as usize).map(|pat| (*p, pat)),
            _ => None,
        }
    }

    /// Check the structural invariants every parser must uphold.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(ModelError::ChannelCount(self.channels.len()));
        }
        for (i, entry) in self.order.iter().enumerate() {
            match *entry {
                OrderEntry::Pattern(p) if p as usize >= self.patterns.len() => {
                    return Err(ModelError::OrderPattern { order: i, pattern: p });
                }
                OrderEntry::Loop(target) if target as usize >= self.order.len() => {
                    return Err(ModelError::LoopTarget { order: i, target });
                }
                _ => {}
            }
        }
        for (i, pattern) in self.patterns.iter().enumerate() {
            if pattern.rows == 0 || pattern.rows > crate::pattern::MAX_ROWS {
                return Err(ModelError::RowCount { pattern: i, rows: pattern.rows });
            }
            if let Some(cell) = pattern
                .data
                .iter()
                .find(|c| c.instrument as usize > self.instruments.len())
            {
                return Err(ModelError::Instrument { pattern: i, instrument: cell.instrument });
            }
        }
        for (i, sample) in self.samples.iter().enumerate() {
            if sample.loop_type != crate::LoopType::None
                && (sample.loop_start >= sample.loop_end || sample.loop_end as usize > sample.len())
            {
                return Err(ModelError::Loop { sample: i });
            }
        }
        Ok(())
    }
}

/// An entry in the order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderEntry {
    /// Play pattern with this index
    Pattern(u8),
    /// Skip marker (+++), continue to next
    Skip,
    /// End of song marker (---)
    End,
    /// Continue playback at this order position
    Loop(u16),
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Initial panning (-64 to +64, 0 = center)
    pub initial_pan: i8,
    /// Initial channel volume (0-64)
    pub initial_vol: u8,
    /// Is the channel muted?
    pub muted: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            initial_pan: 0,
            initial_vol: 64,
            muted: false,
        }
    }
}

/// A broken structural invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelError {
    ChannelCount(usize),
    OrderPattern { order: usize, pattern: u8 },
    LoopTarget { order: usize, target: u16 },
    RowCount { pattern: usize, rows: u16 },
    Instrument { pattern: usize, instrument: u8 },
    Loop { sample: usize },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::ChannelCount(n) => write!(f, "invalid channel count {n}"),
            ModelError::OrderPattern { order, pattern } => {
                write!(f, "order {order} references missing pattern {pattern}")
            }
            ModelError::LoopTarget { order, target } => {
                write!(f, "order {order} loops to missing position {target}")
            }
            ModelError::RowCount { pattern, rows } => {
                write!(f, "pattern {pattern} has invalid row count {rows}")
            }
            ModelError::Instrument { pattern, instrument } => {
                write!(f, "pattern {pattern} references missing instrument {instrument}")
            }
            ModelError::Loop { sample } => write!(f, "sample {sample} has an invalid loop"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ModelError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Note;

    fn make_test_module() -> Module {
        let mut module = Module::with_channels("Test", Format::ProTracker, 4);
        module.instruments.push(Instrument::single_sample("lead", 1));
        module.samples.push(Sample::new("lead"));
        let mut pat = Pattern::new(64, 4);
        pat.cell_mut(0, 0).note = Note::On(60);
        pat.cell_mut(0, 0).instrument = 1;
        module.patterns.push(pat);
        module.patterns.push(Pattern::new(32, 4));
        module.order = vec![
            OrderEntry::Pattern(0),
            OrderEntry::Skip,
            OrderEntry::Pattern(1),
            OrderEntry::End,
            OrderEntry::Pattern(0),
        ];
        module
    }

    #[test]
    fn amiga_panning() {
        let module = make_test_module();
        let pans: Vec<i8> = module.channels.iter().map(|c| c.initial_pan).collect();
        assert_eq!(pans, vec![-64, 64, 64, -64]);
    }

    #[test]
    fn song_length_stops_at_end_marker() {
        let module = make_test_module();
        assert_eq!(module.song_length(), 3);
    }

    #[test]
    fn query_surface() {
        let module = make_test_module();
        assert_eq!(module.num_channels(), 4);
        assert_eq!(module.num_patterns(), 2);
        assert_eq!(module.num_rows(1), Some(32));
        assert_eq!(module.num_rows(2), None);
        assert_eq!(module.cell(0, 0, 0).map(|c| c.note), Some(Note::On(60)));
        assert!(module.cell(0, 64, 0).is_none());
        assert!(module.cell(0, 0, 300).is_none());
        assert_eq!(module.pattern_at(2).map(|(i, _)| i), Some(1));
        assert!(module.pattern_at(1).is_none());
    }

    #[test]
    fn validate_accepts_well_formed_module() {
        assert_eq!(make_test_module().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_dangling_order() {
        let mut module = make_test_module();
        module.order.push(OrderEntry::Pattern(9));
        assert_eq!(
            module.validate(),
            Err(ModelError::OrderPattern { order: 5, pattern: 9 })
        );
    }

    #[test]
    fn validate_rejects_dangling_instrument() {
        let mut module = make_test_module();
        module.patterns[1].cell_mut(3, 1).instrument = 5;
        assert_eq!(
            module.validate(),
            Err(ModelError::Instrument { pattern: 1, instrument: 5 })
        );
    }
}
