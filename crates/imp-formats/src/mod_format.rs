//! ProTracker MOD format parser.

use imp_ir::{
    Cell, Format, Instrument, LoopType, Module, Note, OrderEntry, Pattern, Sample, SampleData,
    DEFAULT_BASE_RATE, MAX_NOTE,
};

use crate::helpers::{payload, read_string, sanitize_instruments, slice, warn};
use crate::{FormatError, LoadWarning};

const NUM_SAMPLES: usize = 31;
const ROWS: u16 = 64;
const HEADER_LEN: usize = 1084;
const SONG_LENGTH: usize = 950;
const RESTART: usize = 951;
const ORDERS: usize = 952;

/// Channel count announced by the four-byte tag at offset 1080.
pub(crate) fn channels_for_signature(sig: &[u8]) -> Option<u8> {
    match sig {
        b"M.K." | b"M!K!" | b"M&K!" | b"FLT4" | b"4CHN" => Some(4),
        b"6CHN" => Some(6),
        b"8CHN" | b"OCTA" | b"FLT8" | b"CD81" => Some(8),
        [d, b'C', b'H', b'N'] if d.is_ascii_digit() && *d != b'0' => Some(d - b'0'),
        [d1, d2, b'C', b'H' | b'N'] if d1.is_ascii_digit() && d2.is_ascii_digit() => {
            let n = (d1 - b'0') * 10 + (d2 - b'0');
            (1..=32).contains(&n).then_some(n)
        }
        _ => None,
    }
}

/// Load a MOD file from bytes.
pub fn load_mod(data: &[u8]) -> Result<Module, FormatError> {
    parse(data, &mut Vec::new())
}

pub(crate) fn parse(data: &[u8], warnings: &mut Vec<LoadWarning>) -> Result<Module, FormatError> {
    let header = slice(data, 0, HEADER_LEN, "song header")?;
    let num_channels =
        channels_for_signature(&header[1080..1084]).ok_or(FormatError::UnsupportedFormat)?;

    let title = read_string(&header[0..20]);
    let mut module = Module::with_channels(&title, Format::ProTracker, num_channels);

    let mut lengths = [0usize; NUM_SAMPLES];
    for (i, len) in lengths.iter_mut().enumerate() {
        let offset = 20 + i * 30;
        let (sample, byte_len) = parse_sample_header(&header[offset..offset + 30]);
        *len = byte_len;
        module
            .instruments
            .push(Instrument::single_sample(sample.name(), (i + 1) as u8));
        module.samples.push(sample);
    }

    let song_length = (header[SONG_LENGTH] as usize).clamp(1, 128);
    let orders = &header[ORDERS..ORDERS + 128];
    // Every order slot counts, including the ones past the song length.
    let num_patterns = orders.iter().copied().max().unwrap_or(0) as usize + 1;

    let pattern_size = ROWS as usize * num_channels as usize * 4;
    for p in 0..num_patterns {
        let bytes = slice(data, HEADER_LEN + p * pattern_size, pattern_size, "pattern data")?;
        module.patterns.push(parse_pattern(bytes, num_channels));
    }
    sanitize_instruments(&mut module.patterns, module.instruments.len());

    module.order = orders[..song_length]
        .iter()
        .map(|&p| OrderEntry::Pattern(p))
        .collect();
    let restart = header[RESTART] as usize;
    if restart > 0 && restart < song_length && restart != 0x7F && restart != 0x78 {
        module.order.push(OrderEntry::Loop(restart as u16));
    }

    let mut offset = HEADER_LEN + num_patterns * pattern_size;
    for (index, (sample, &len)) in module.samples.iter_mut().zip(&lengths).enumerate() {
        let (bytes, missing) = payload(data, offset, len);
        let mut pcm: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
        pcm.resize(len, 0);
        sample.data = SampleData::Mono8(pcm);
        sample.sanitize_loop();
        if missing > 0 {
            warn(warnings, LoadWarning::ShortSample { index, missing });
        }
        offset += len;
    }

    tracing::debug!(
        channels = num_channels,
        patterns = num_patterns,
        orders = module.song_length(),
        "parsed MOD module"
    );
    Ok(module)
}

/// Parse a 30-byte sample header. Also returns the payload length in bytes.
fn parse_sample_header(data: &[u8]) -> (Sample, usize) {
    let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]) as u32 * 2;
    let length = word(22);
    let finetune = ((data[24] & 0x0F) << 4) as i8 >> 4;
    let loop_start = word(26);
    let loop_length = word(28);

    let mut sample = Sample::new(&read_string(&data[0..22]));
    sample.default_volume = data[25].min(64);
    sample.base_rate = finetuned_rate(finetune);
    if loop_length > 2 {
        sample.loop_type = LoopType::Forward;
        sample.loop_start = loop_start;
        sample.loop_end = loop_start + loop_length;
    }
    (sample, length as usize)
}

/// Base rate for a signed finetune in eighths of a semitone.
fn finetuned_rate(finetune: i8) -> u32 {
    let factor = libm::exp2(finetune as f64 / 96.0);
    libm::round(DEFAULT_BASE_RATE as f64 * factor) as u32
}

fn parse_pattern(data: &[u8], num_channels: u8) -> Pattern {
    let mut pattern = Pattern::new(ROWS, num_channels);
    for (i, raw) in data.chunks_exact(4).enumerate() {
        let row = (i / num_channels as usize) as u16;
        let ch = (i % num_channels as usize) as u8;
        *pattern.cell_mut(row, ch) = parse_cell(raw);
    }
    pattern
}

/// Decode one 4-byte cell:
/// `iiii pppp` `pppp pppp` `iiii eeee` `xxxx xxxx`.
fn parse_cell(data: &[u8]) -> Cell {
    let period = (((data[0] & 0x0F) as u16) << 8) | data[1] as u16;
    Cell {
        note: period_to_note(period),
        instrument: (data[0] & 0xF0) | (data[2] >> 4),
        effect: data[2] & 0x0F,
        param: data[3],
        ..Cell::empty()
    }
}

/// Nearest note for an Amiga period; 428 is C-5.
fn period_to_note(period: u16) -> Note {
    if period == 0 {
        return Note::None;
    }
    let semitones = libm::round(12.0 * libm::log2(428.0 / period as f64)) as i32;
    Note::On((60 + semitones).clamp(0, MAX_NOTE as i32) as u8)
}
