//! Scream Tracker 3 S3M format parser.

use binrw::BinRead;
use imp_ir::{
    ChannelSettings, Format, Instrument, LoopType, Module, OrderEntry, Pattern, Sample, SampleData,
    VolumeCommand, DEFAULT_BASE_RATE,
};

use crate::helpers::{
    densify, downmix16, downmix8, header_error, le_u16, octave_note, order_entry, payload, pcm16,
    pcm8, read_header, read_string, sanitize_instruments, slice, warn, SparseCell,
};
use crate::{FormatError, LoadWarning};

const ROWS: u16 = 64;
const SMP_LOOP: u8 = 0x01;
const SMP_STEREO: u8 = 0x02;
const SMP_16BIT: u8 = 0x04;

/// Song header up to and including the channel settings.
#[derive(BinRead, Debug)]
#[br(little)]
struct S3mHeader {
    name: [u8; 28],
    _eof: u8,
    _kind: u8,
    _reserved: u16,
    order_count: u16,
    instrument_count: u16,
    pattern_count: u16,
    _flags: u16,
    _created_with: u16,
    sample_format: u16,
    #[br(magic = b"SCRM")]
    global_volume: u8,
    initial_speed: u8,
    initial_tempo: u8,
    master_volume: u8,
    _ultraclick: u8,
    default_pan: u8,
    _reserved2: [u8; 8],
    _special: u16,
    channel_settings: [u8; 32],
    #[br(count = order_count)]
    orders: Vec<u8>,
    #[br(count = instrument_count)]
    instrument_pointers: Vec<u16>,
    #[br(count = pattern_count)]
    pattern_pointers: Vec<u16>,
}

/// Sample ("instrument") header.
#[derive(BinRead, Debug)]
#[br(little)]
struct S3mSampleHeader {
    kind: u8,
    _filename: [u8; 12],
    memseg_hi: u8,
    memseg_lo: u16,
    length: u32,
    loop_begin: u32,
    loop_end: u32,
    volume: u8,
    _reserved: u8,
    pack: u8,
    flags: u8,
    c2_speed: u32,
    _internal: [u8; 12],
    name: [u8; 28],
}

/// Load an S3M file from bytes.
pub fn load_s3m(data: &[u8]) -> Result<Module, FormatError> {
    parse(data, &mut Vec::new())
}

pub(crate) fn parse(data: &[u8], warnings: &mut Vec<LoadWarning>) -> Result<Module, FormatError> {
    let header: S3mHeader = read_header(data, 0).map_err(|e| header_error(e, "song header"))?;
    let signed = header.sample_format == 1;

    let mut samples = Vec::with_capacity(header.instrument_pointers.len());
    for (index, &para) in header.instrument_pointers.iter().enumerate() {
        let (sample, warning) = parse_sample(data, index, para as usize * 16, signed);
        if let Some(w) = warning {
            warn(warnings, w);
        }
        samples.push(sample);
    }
    let instruments: Vec<Instrument> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| Instrument::single_sample(s.name(), (i + 1) as u8))
        .collect();

    // Channels are addressed by slot; the count is the highest enabled slot + 1.
    let num_channels = header
        .channel_settings
        .iter()
        .rposition(|&c| c < 16)
        .map_or(1, |i| i + 1) as u8;

    let mut patterns = Vec::with_capacity(header.pattern_pointers.len());
    for (index, &para) in header.pattern_pointers.iter().enumerate() {
        match parse_pattern(data, index, para as usize * 16) {
            Ok(cells) => patterns.push(densify(ROWS, num_channels, &cells)),
            Err(err) => {
                warn(warnings, LoadWarning::Pattern(err));
                patterns.push(Pattern::new(ROWS, num_channels));
            }
        }
    }
    sanitize_instruments(&mut patterns, instruments.len());

    let title = read_string(&header.name);
    let mut module = Module::with_channels(&title, Format::ScreamTracker3, num_channels);
    module.initial_speed = if header.initial_speed == 0 || header.initial_speed == 255 {
        6
    } else {
        header.initial_speed
    };
    module.initial_tempo = if header.initial_tempo < 33 { 125 } else { header.initial_tempo };
    module.global_volume = (header.global_volume.min(64)) * 2;

    let stereo = header.master_volume & 0x80 != 0;
    let pan_table = if header.default_pan == 252 {
        let offset = 0x60
            + header.orders.len()
            + header.instrument_pointers.len() * 2
            + header.pattern_pointers.len() * 2;
        data.get(offset..offset + 32)
    } else {
        None
    };
    for (i, settings) in module.channels.iter_mut().enumerate() {
        let raw = header.channel_settings[i];
        let custom = pan_table.and_then(|t| (t[i] & 0x20 != 0).then_some(t[i] & 0x0F));
        *settings = channel_settings(raw, custom, stereo);
    }

    module.order = header
        .orders
        .iter()
        .map(|&b| order_entry(b, patterns.len()))
        .collect();
    if module.order.is_empty() {
        module.order.push(OrderEntry::End);
    }
    module.samples = samples;
    module.instruments = instruments;
    module.patterns = patterns;

    tracing::debug!(
        channels = module.num_channels(),
        patterns = module.num_patterns(),
        samples = module.samples.len(),
        "parsed S3M module"
    );
    Ok(module)
}

/// Settings for one channel slot; `custom_pan` comes from the optional pan table (0-15).
fn channel_settings(raw: u8, custom_pan: Option<u8>, stereo: bool) -> ChannelSettings {
    let enabled = raw < 16;
    let pan15 = match custom_pan {
        Some(p) => p,
        None if raw < 8 => 0x3,
        None if raw < 16 => 0xC,
        None => 0x7,
    };
    let initial_pan = if stereo {
        (pan15 as i16 * 128 / 15 - 64) as i8
    } else {
        0
    };
    ChannelSettings { initial_pan, initial_vol: 64, muted: !enabled }
}

fn parse_sample(
    data: &[u8],
    index: usize,
    offset: usize,
    signed: bool,
) -> (Sample, Option<LoadWarning>) {
    let header: S3mSampleHeader = match read_header(data, offset) {
        Ok(h) => h,
        Err(_) => {
            let err = FormatError::CorruptSample { index, reason: "unreadable sample header" };
            return (Sample::default(), Some(LoadWarning::Sample(err)));
        }
    };

    let mut sample = Sample::new(&read_string(&header.name));
    if header.kind != 1 {
        // Empty slot or AdLib instrument.
        sample.silence();
        return (sample, None);
    }
    sample.default_volume = header.volume.min(64);
    sample.base_rate = if header.c2_speed == 0 { DEFAULT_BASE_RATE } else { header.c2_speed };
    if header.flags & SMP_LOOP != 0 {
        sample.loop_type = LoopType::Forward;
        sample.loop_start = header.loop_begin;
        sample.loop_end = header.loop_end;
    }
    if header.pack != 0 {
        let err = FormatError::CorruptSample { index, reason: "packed samples are not supported" };
        sample.silence();
        return (sample, Some(LoadWarning::Sample(err)));
    }

    let len = header.length as usize;
    let wide = header.flags & SMP_16BIT != 0;
    let stereo = header.flags & SMP_STEREO != 0;
    let byte_len = len * if wide { 2 } else { 1 } * if stereo { 2 } else { 1 };
    let data_offset = (((header.memseg_hi as usize) << 16) | header.memseg_lo as usize) * 16;
    let (bytes, missing) = payload(data, data_offset, byte_len);
    if missing > bytes.len() {
        let err = FormatError::CorruptSample { index, reason: "sample data mostly missing" };
        sample.silence();
        return (sample, Some(LoadWarning::Sample(err)));
    }
    let mut padded = bytes.to_vec();
    padded.resize(byte_len, 0);

    sample.data = match (wide, stereo) {
        (false, false) => SampleData::Mono8(pcm8(&padded, signed, false)),
        (false, true) => {
            let (l, r) = padded.split_at(len);
            SampleData::Mono8(downmix8(&pcm8(l, signed, false), &pcm8(r, signed, false)))
        }
        (true, false) => SampleData::Mono16(pcm16(&padded, signed, false)),
        (true, true) => {
            let (l, r) = padded.split_at(len * 2);
            SampleData::Mono16(downmix16(&pcm16(l, signed, false), &pcm16(r, signed, false)))
        }
    };
    sample.sanitize_loop();

    let warning = (missing > 0).then_some(LoadWarning::ShortSample { index, missing });
    (sample, warning)
}

/// Unpack one 64-row pattern into sparse cells.
fn parse_pattern(data: &[u8], index: usize, offset: usize) -> Result<Vec<SparseCell>, FormatError> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let corrupt = |reason: &'static str| FormatError::CorruptPattern { index, reason };
    let packed_len =
        le_u16(data, offset).ok_or(corrupt("pattern header past end of file"))? as usize;
    let packed = slice(data, offset + 2, packed_len.saturating_sub(2), "pattern")
        .map_err(|_| corrupt("packed data past end of file"))?;

    let mut cells = Vec::new();
    let mut row = 0u16;
    let mut pos = 0usize;
    let mut next = || -> Result<u8, FormatError> {
        let b = packed.get(pos).copied().ok_or(corrupt("packed data past end of file"));
        pos += 1;
        b
    };

    while row < ROWS {
        let Ok(what) = next() else { break };
        if what == 0 {
            row += 1;
            continue;
        }
        let mut cell = imp_ir::Cell::empty();
        if what & 0x20 != 0 {
            cell.note = octave_note(next()?);
            cell.instrument = next()?;
        }
        if what & 0x40 != 0 {
            let v = next()?;
            if v != 255 {
                cell.volume = VolumeCommand::Volume(v.min(64));
            }
        }
        if what & 0x80 != 0 {
            cell.effect = next()?;
            cell.param = next()?;
        }
        cells.push((row, what & 0x1F, cell));
    }
    Ok(cells)
}
