//! Format parsers for the impulse module player.
//!
//! Parses MOD, S3M and IT files into the [`imp_ir::Module`] shape. The
//! dialect is picked by signature sniffing and every parser returns the
//! same structure, so the engine never needs to know where a module came
//! from.

mod helpers;
mod it_compression;
mod it_format;
mod mod_format;
mod s3m_format;

use imp_ir::{Format, Module};
use thiserror::Error;

pub use it_compression::{decompress_16bit, decompress_8bit};
pub use it_format::load_it;
pub use mod_format::load_mod;
pub use s3m_format::load_s3m;

/// Error type for format parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// No known signature at any of the dialect offsets
    #[error("unsupported module format")]
    UnsupportedFormat,
    /// A declared count or table reaches past the end of the buffer
    #[error("file truncated while reading {what}")]
    Truncated { what: &'static str },
    /// A sample payload could not be decoded
    #[error("sample {index} is corrupt: {reason}")]
    CorruptSample { index: usize, reason: &'static str },
    /// A packed pattern could not be decoded
    #[error("pattern {index} is corrupt: {reason}")]
    CorruptPattern { index: usize, reason: &'static str },
}

/// Damage that was repaired while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The sample was loaded silent, or its payload was cut short and padded.
    Sample(FormatError),
    /// The pattern was replaced by an empty one.
    Pattern(FormatError),
    /// Sample payload ran past the end of the file and was zero-padded.
    ShortSample { index: usize, missing: usize },
}

/// A loaded module together with everything that had to be repaired.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub module: Module,
    pub warnings: Vec<LoadWarning>,
}

/// Identify the dialect of a module from its signature.
pub fn detect(data: &[u8]) -> Option<Format> {
    if data.get(0..4) == Some(b"IMPM") {
        return Some(Format::ImpulseTracker);
    }
    if data.get(0x2C..0x30) == Some(b"SCRM") {
        return Some(Format::ScreamTracker3);
    }
    let sig = data.get(1080..1084)?;
    mod_format::channels_for_signature(sig).map(|_| Format::ProTracker)
}

/// Load a module of any supported dialect.
pub fn load(data: &[u8]) -> Result<Module, FormatError> {
    load_with_report(data).map(|report| report.module)
}

/// Load a module and return the warnings collected on the way.
pub fn load_with_report(data: &[u8]) -> Result<LoadReport, FormatError> {
    let format = detect(data).ok_or(FormatError::UnsupportedFormat)?;
    tracing::debug!(format = format.name(), bytes = data.len(), "detected module format");
    let mut warnings = Vec::new();
    let module = match format {
        Format::ProTracker => mod_format::parse(data, &mut warnings)?,
        Format::ScreamTracker3 => s3m_format::parse(data, &mut warnings)?,
        Format::ImpulseTracker => it_format::parse(data, &mut warnings)?,
    };
    debug_assert_eq!(module.validate(), Ok(()));
    Ok(LoadReport { module, warnings })
}
