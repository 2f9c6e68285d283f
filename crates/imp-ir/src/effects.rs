//! Volume column commands.
//!
//! The volume column is decoded by the parsers because its byte layout is
//! different in every dialect. The effect column stays raw on the cell.

/// Volume column command (S3M/IT style).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VolumeCommand {
    #[default]
    None,
    /// Set volume (0-64)
    Volume(u8),
    VolumeSlideDown(u8),
    VolumeSlideUp(u8),
    FineVolSlideDown(u8),
    FineVolSlideUp(u8),
    /// Set panning (0-64, 32 = center)
    Panning(u8),
    PortaDown(u8),
    PortaUp(u8),
    /// Tone portamento, index into the IT speed table (0-9)
    TonePorta(u8),
    /// Vibrato depth (0-9), speed comes from effect memory
    Vibrato(u8),
}

impl VolumeCommand {
    /// Returns the variant name as a static string (ignoring parameters).
    pub fn name(&self) -> &'static str {
        match self {
            VolumeCommand::None => "None",
            VolumeCommand::Volume(_) => "Volume",
            VolumeCommand::VolumeSlideDown(_) => "VolumeSlideDown",
            VolumeCommand::VolumeSlideUp(_) => "VolumeSlideUp",
            VolumeCommand::FineVolSlideDown(_) => "FineVolSlideDown",
            VolumeCommand::FineVolSlideUp(_) => "FineVolSlideUp",
            VolumeCommand::Panning(_) => "Panning",
            VolumeCommand::PortaDown(_) => "PortaDown",
            VolumeCommand::PortaUp(_) => "PortaUp",
            VolumeCommand::TonePorta(_) => "TonePorta",
            VolumeCommand::Vibrato(_) => "Vibrato",
        }
    }

    /// Decode an IT volume column byte.
    pub fn from_it(v: u8) -> Self {
        match v {
            0..=64 => VolumeCommand::Volume(v),
            65..=74 => VolumeCommand::FineVolSlideUp(v - 65),
            75..=84 => VolumeCommand::FineVolSlideDown(v - 75),
            85..=94 => VolumeCommand::VolumeSlideUp(v - 85),
            95..=104 => VolumeCommand::VolumeSlideDown(v - 95),
            105..=114 => VolumeCommand::PortaDown(v - 105),
            115..=124 => VolumeCommand::PortaUp(v - 115),
            128..=192 => VolumeCommand::Panning(v - 128),
            193..=202 => VolumeCommand::TonePorta(v - 193),
            203..=212 => VolumeCommand::Vibrato(v - 203),
            _ => VolumeCommand::None,
        }
    }
}
