//! Impulse Tracker IT format parser.

use binrw::BinRead;
use imp_ir::{
    push_truncated, Cell, ChannelSettings, Format, Instrument, LoopType, Module, Note, OrderEntry,
    Pattern, Sample, SampleData, VolumeCommand, DEFAULT_BASE_RATE, MAX_CHANNELS, MAX_ROWS,
};

use crate::helpers::{
    densify, downmix16, downmix8, fallback_rows, header_error, le_u16, order_entry, payload, pcm16,
    pcm8, read_header, read_string, sanitize_instruments, slice, warn, SparseCell,
};
use crate::it_compression::{decompress_16bit, decompress_8bit};
use crate::{FormatError, LoadWarning};

const FLAG_STEREO: u16 = 0x01;
const FLAG_INSTRUMENTS: u16 = 0x04;
const FLAG_LINEAR_SLIDES: u16 = 0x08;

const SMP_PRESENT: u8 = 0x01;
const SMP_16BIT: u8 = 0x02;
const SMP_STEREO: u8 = 0x04;
const SMP_COMPRESSED: u8 = 0x08;
const SMP_LOOP: u8 = 0x10;
const SMP_PINGPONG: u8 = 0x40;

const CVT_SIGNED: u8 = 0x01;
const CVT_DELTA: u8 = 0x04;

/// Song header, including the order list and the offset tables after it.
#[derive(BinRead, Debug)]
#[br(little, magic = b"IMPM")]
struct ItHeader {
    name: [u8; 26],
    _highlight: u16,
    order_count: u16,
    instrument_count: u16,
    sample_count: u16,
    pattern_count: u16,
    _created_with: u16,
    compatible_with: u16,
    flags: u16,
    _special: u16,
    global_volume: u8,
    _mix_volume: u8,
    initial_speed: u8,
    initial_tempo: u8,
    _separation: u8,
    _pitch_wheel_depth: u8,
    _message_length: u16,
    _message_offset: u32,
    _reserved: u32,
    channel_pan: [u8; 64],
    channel_volume: [u8; 64],
    #[br(count = order_count)]
    orders: Vec<u8>,
    #[br(count = instrument_count)]
    instrument_offsets: Vec<u32>,
    #[br(count = sample_count)]
    sample_offsets: Vec<u32>,
    #[br(count = pattern_count)]
    pattern_offsets: Vec<u32>,
}

/// Sample header (0x50 bytes).
#[derive(BinRead, Debug)]
#[br(little, magic = b"IMPS")]
struct ItSampleHeader {
    _filename: [u8; 12],
    _zero: u8,
    global_volume: u8,
    flags: u8,
    volume: u8,
    name: [u8; 26],
    convert: u8,
    default_pan: u8,
    length: u32,
    loop_begin: u32,
    loop_end: u32,
    c5_speed: u32,
    _sustain_begin: u32,
    _sustain_end: u32,
    data_offset: u32,
    _vibrato: [u8; 4],
}

/// The parts of an instrument header shared by the old and new layouts.
#[derive(BinRead, Debug)]
#[br(little, magic = b"IMPI")]
struct ItInstrumentHeader {
    _filename: [u8; 12],
    _zero: u8,
    _actions: [u8; 7],
    global_volume: u8,
    default_pan: u8,
    _random: [u8; 6],
    name: [u8; 26],
    _filter_midi: [u8; 6],
    keyboard: [u8; 240],
}

/// Load an IT file from bytes.
pub fn load_it(data: &[u8]) -> Result<Module, FormatError> {
    parse(data, &mut Vec::new())
}

pub(crate) fn parse(data: &[u8], warnings: &mut Vec<LoadWarning>) -> Result<Module, FormatError> {
    let header: ItHeader = read_header(data, 0).map_err(|e| header_error(e, "song header"))?;

    let instrument_mode = header.flags & FLAG_INSTRUMENTS != 0;
    let mut samples = Vec::with_capacity(header.sample_offsets.len());
    for (index, &offset) in header.sample_offsets.iter().enumerate() {
        let (sample, warning) = parse_sample(data, index, offset as usize);
        if let Some(w) = warning {
            warn(warnings, w);
        }
        samples.push(sample);
    }

    let instruments = if instrument_mode {
        header
            .instrument_offsets
            .iter()
            .map(|&offset| parse_instrument(data, offset as usize, header.compatible_with))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        samples
            .iter()
            .enumerate()
            .map(|(i, s)| Instrument::single_sample(s.name(), (i + 1) as u8))
            .collect()
    };

    let mut sparse = Vec::with_capacity(header.pattern_offsets.len());
    let mut highest_channel = 0u8;
    for (index, &offset) in header.pattern_offsets.iter().enumerate() {
        match parse_pattern(data, index, offset as usize) {
            Ok((rows, cells)) => {
                if let Some(max) = cells.iter().map(|&(_, ch, _)| ch).max() {
                    highest_channel = highest_channel.max(max);
                }
                sparse.push((rows, cells));
            }
            Err((rows, err)) => {
                warn(warnings, LoadWarning::Pattern(err));
                sparse.push((rows, Vec::new()));
            }
        }
    }

    let num_channels = highest_channel + 1;
    let mut patterns: Vec<Pattern> = sparse
        .iter()
        .map(|(rows, cells)| densify(*rows, num_channels, cells))
        .collect();
    sanitize_instruments(&mut patterns, instruments.len());

    let title = read_string(&header.name);
    let mut module = Module::with_channels(&title, Format::ImpulseTracker, num_channels);
    module.initial_speed = if header.initial_speed == 0 { 6 } else { header.initial_speed };
    module.initial_tempo = if header.initial_tempo < 32 { 125 } else { header.initial_tempo };
    module.global_volume = header.global_volume.min(128);
    module.linear_slides = header.flags & FLAG_LINEAR_SLIDES != 0;
    let stereo = header.flags & FLAG_STEREO != 0;
    for (i, settings) in module.channels.iter_mut().enumerate() {
        *settings = channel_settings(header.channel_pan[i], header.channel_volume[i], stereo);
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
        instrument_mode,
        "parsed IT module"
    );
    Ok(module)
}

fn channel_settings(pan: u8, volume: u8, stereo: bool) -> ChannelSettings {
    let muted = pan & 0x80 != 0;
    let pan = pan & 0x7F;
    let initial_pan = if !stereo || pan > 64 {
        0
    } else {
        (pan as i16 * 2 - 64) as i8
    };
    ChannelSettings { initial_pan, initial_vol: volume.min(64), muted }
}

fn parse_instrument(
    data: &[u8],
    offset: usize,
    compatible_with: u16,
) -> Result<Instrument, FormatError> {
    if offset == 0 {
        return Ok(Instrument::new(""));
    }
    let header: ItInstrumentHeader = read_header(data, offset)
        .map_err(|_| FormatError::Truncated { what: "instrument header" })?;

    let mut inst = Instrument::new("");
    push_truncated(&mut inst.name, &read_string(&header.name));
    for (note, pair) in header.keyboard.chunks_exact(2).enumerate() {
        inst.keyboard[note] = (pair[0].min(119), pair[1]);
    }
    if compatible_with >= 0x200 {
        inst.global_volume = header.global_volume.min(128);
        if header.default_pan & 0x80 == 0 {
            inst.default_pan = Some((header.default_pan.min(64) as i16 * 2 - 64) as i8);
        }
    }
    Ok(inst)
}

/// Decode a sample; corrupt payloads yield a silent sample plus a warning.
fn parse_sample(data: &[u8], index: usize, offset: usize) -> (Sample, Option<LoadWarning>) {
    if offset == 0 {
        return (Sample::default(), None);
    }
    let header: ItSampleHeader = match read_header(data, offset) {
        Ok(h) => h,
        Err(_) => {
            let err = FormatError::CorruptSample { index, reason: "unreadable sample header" };
            return (Sample::default(), Some(LoadWarning::Sample(err)));
        }
    };

    let mut sample = Sample::new(&read_string(&header.name));
    sample.global_volume = header.global_volume.min(64);
    sample.default_volume = header.volume.min(64);
    sample.base_rate = if header.c5_speed == 0 { DEFAULT_BASE_RATE } else { header.c5_speed };
    if header.default_pan & 0x80 != 0 {
        sample.default_pan = Some(((header.default_pan & 0x7F).min(64) as i16 * 2 - 64) as i8);
    }
    if header.flags & SMP_LOOP != 0 {
        sample.loop_type = if header.flags & SMP_PINGPONG != 0 {
            LoopType::PingPong
        } else {
            LoopType::Forward
        };
        sample.loop_start = header.loop_begin;
        sample.loop_end = header.loop_end;
    }

    if header.flags & SMP_PRESENT == 0 || header.length == 0 {
        sample.silence();
        return (sample, None);
    }

    let mut warning = None;
    match decode_payload(data, &header) {
        Ok((pcm, missing)) => {
            sample.data = pcm;
            if missing > 0 {
                warning = Some(LoadWarning::ShortSample { index, missing });
            }
        }
        Err(reason) => {
            sample.silence();
            warning = Some(LoadWarning::Sample(FormatError::CorruptSample { index, reason }));
        }
    }
    sample.sanitize_loop();
    (sample, warning)
}

/// Decode a sample payload into linear PCM; also returns how many bytes were missing.
fn decode_payload(
    data: &[u8],
    header: &ItSampleHeader,
) -> Result<(SampleData, usize), &'static str> {
    let len = header.length as usize;
    let offset = header.data_offset as usize;
    let wide = header.flags & SMP_16BIT != 0;
    let stereo = header.flags & SMP_STEREO != 0;
    let input = data.get(offset..).ok_or("sample data offset past end of file")?;

    if header.flags & SMP_COMPRESSED != 0 {
        let it215 = header.convert & CVT_DELTA != 0;
        return if wide {
            let (left, used) = decompress_16bit(input, len, it215)?;
            let pcm = if stereo {
                let (right, _) = decompress_16bit(&input[used..], len, it215)?;
                downmix16(&left, &right)
            } else {
                left
            };
            Ok((SampleData::Mono16(pcm), 0))
        } else {
            let (left, used) = decompress_8bit(input, len, it215)?;
            let pcm = if stereo {
                let (right, _) = decompress_8bit(&input[used..], len, it215)?;
                downmix8(&left, &right)
            } else {
                left
            };
            Ok((SampleData::Mono8(pcm), 0))
        };
    }

    let signed = header.convert & CVT_SIGNED != 0;
    let delta = header.convert & CVT_DELTA != 0;
    let width = if wide { 2 } else { 1 };
    let channels = if stereo { 2 } else { 1 };
    let (bytes, missing) = payload(data, offset, len * width * channels);
    if missing > bytes.len() {
        return Err("sample data mostly missing");
    }
    let mut padded = bytes.to_vec();
    padded.resize(len * width * channels, 0);

    let pcm = match (wide, stereo) {
        (false, false) => SampleData::Mono8(pcm8(&padded, signed, delta)),
        (false, true) => {
            let (l, r) = padded.split_at(len);
            SampleData::Mono8(downmix8(&pcm8(l, signed, delta), &pcm8(r, signed, delta)))
        }
        (true, false) => SampleData::Mono16(pcm16(&padded, signed, delta)),
        (true, true) => {
            let (l, r) = padded.split_at(len * 2);
            SampleData::Mono16(downmix16(&pcm16(l, signed, delta), &pcm16(r, signed, delta)))
        }
    };
    Ok((pcm, missing))
}

/// Unpack one pattern into sparse cells.
///
/// On failure returns the row count to use for the empty replacement.
fn parse_pattern(
    data: &[u8],
    index: usize,
    offset: usize,
) -> Result<(u16, Vec<SparseCell>), (u16, FormatError)> {
    if offset == 0 {
        return Ok((64, Vec::new()));
    }
    let corrupt =
        |rows: u16, reason: &'static str| (rows, FormatError::CorruptPattern { index, reason });

    let (Some(packed_len), Some(rows)) = (le_u16(data, offset), le_u16(data, offset + 2)) else {
        return Err(corrupt(64, "pattern header past end of file"));
    };
    if rows == 0 || rows > MAX_ROWS {
        return Err(corrupt(fallback_rows(rows), "invalid row count"));
    }
    let packed = slice(data, offset + 8, packed_len as usize, "pattern")
        .map_err(|_| corrupt(rows, "packed data past end of file"))?;

    let mut cells = Vec::new();
    let mut last_mask = [0u8; MAX_CHANNELS];
    let mut last_cell = [Cell::empty(); MAX_CHANNELS];
    let mut last_effect = [(0u8, 0u8); MAX_CHANNELS];
    let mut row = 0u16;
    let mut pos = 0usize;
    let mut next = || -> Result<u8, (u16, FormatError)> {
        let b = packed
            .get(pos)
            .copied()
            .ok_or_else(|| corrupt(rows, "packed data past end of file"));
        pos += 1;
        b
    };

    while row < rows {
        let marker = match next() {
            Ok(b) => b,
            // Trailing empty rows are often left out entirely.
            Err(_) => break,
        };
        if marker == 0 {
            row += 1;
            continue;
        }
        let ch = ((marker - 1) & 63) as usize;
        if marker & 0x80 != 0 {
            last_mask[ch] = next()?;
        }
        let mask = last_mask[ch];
        let mut cell = Cell::empty();

        if mask & 0x01 != 0 {
            last_cell[ch].note = it_note(next()?);
        }
        if mask & 0x02 != 0 {
            last_cell[ch].instrument = next()?;
        }
        if mask & 0x04 != 0 {
            last_cell[ch].volume = VolumeCommand::from_it(next()?);
        }
        if mask & 0x08 != 0 {
            last_effect[ch] = (next()?, next()?);
        }
        if mask & 0x11 != 0 {
            cell.note = last_cell[ch].note;
        }
        if mask & 0x22 != 0 {
            cell.instrument = last_cell[ch].instrument;
        }
        if mask & 0x44 != 0 {
            cell.volume = last_cell[ch].volume;
        }
        if mask & 0x88 != 0 {
            (cell.effect, cell.param) = last_effect[ch];
        }
        cells.push((row, ch as u8, cell));
    }

    // Anything left after the last declared row is an overrun.
    if row >= rows && packed[pos.min(packed.len())..].iter().any(|&b| b != 0) {
        return Err(corrupt(rows, "row count overrun"));
    }
    Ok((rows, cells))
}

fn it_note(b: u8) -> Note {
    match b {
        0..=119 => Note::On(b),
        255 => Note::Off,
        254 => Note::Cut,
        _ => Note::Fade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_note_sentinels() {
        assert_eq!(it_note(60), Note::On(60));
        assert_eq!(it_note(255), Note::Off);
        assert_eq!(it_note(254), Note::Cut);
        assert_eq!(it_note(200), Note::Fade);
    }

    #[test]
    fn channel_pan_mapping() {
        assert_eq!(channel_settings(32, 64, true).initial_pan, 0);
        assert_eq!(channel_settings(0, 64, true).initial_pan, -64);
        assert_eq!(channel_settings(64, 64, true).initial_pan, 64);
        assert_eq!(channel_settings(100, 64, true).initial_pan, 0);
        assert_eq!(channel_settings(0, 64, false).initial_pan, 0);
        assert!(channel_settings(128 + 32, 64, true).muted);
        assert_eq!(channel_settings(32, 90, true).initial_vol, 64);
    }

    fn pattern_bytes(rows: u16, packed: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 4];
        out.extend_from_slice(&(packed.len() as u16).to_le_bytes());
        out.extend_from_slice(&rows.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(packed);
        out
    }

    #[test]
    fn unpacks_with_mask_memory() {
        // ch0: mask 0x0F note C-5 ins 1 vol 32 effect A06; next row reuses the mask,
        // then 0x80 "last effect" only
        let packed = [
            0x81, 0x0F, 60, 1, 32, 1, 6, 0, // row 0
            0x01, 62, 1, 40, 1, 3, 0, // row 1, same mask
            0x81, 0x80, 0, // row 2, last effect only
        ];
        let data = pattern_bytes(4, &packed);
        let (rows, cells) = parse_pattern(&data, 0, 4).unwrap();
        assert_eq!(rows, 4);
        assert_eq!(cells.len(), 3);
        let (r, ch, c) = cells[0];
        assert_eq!((r, ch), (0, 0));
        assert_eq!(c.note, Note::On(60));
        assert_eq!(c.instrument, 1);
        assert_eq!(c.volume, VolumeCommand::Volume(32));
        assert_eq!((c.effect, c.param), (1, 6));
        assert_eq!(cells[1].2.note, Note::On(62));
        assert_eq!((cells[1].2.effect, cells[1].2.param), (1, 3));
        let (r, _, c) = cells[2];
        assert_eq!(r, 2);
        assert_eq!(c.note, Note::None);
        assert_eq!((c.effect, c.param), (1, 3));
    }

    #[test]
    fn overrun_marks_pattern_corrupt() {
        let packed = [0, 0, 0x81, 0x01, 60, 0];
        let data = pattern_bytes(2, &packed);
        let err = parse_pattern(&data, 3, 4).unwrap_err();
        assert_eq!(err.0, 2);
        assert!(matches!(err.1, FormatError::CorruptPattern { index: 3, .. }));
    }

    #[test]
    fn truncated_packed_data_is_corrupt() {
        let mut data = pattern_bytes(64, &[0x81, 0x0F, 60]);
        data[4] = 200;
        let err = parse_pattern(&data, 0, 4).unwrap_err();
        assert_eq!(err.0, 64);
    }

    #[test]
    fn bad_row_count_falls_back_to_64() {
        let data = pattern_bytes(0, &[]);
        let err = parse_pattern(&data, 0, 4).unwrap_err();
        assert_eq!(err.0, 64);
    }
}
