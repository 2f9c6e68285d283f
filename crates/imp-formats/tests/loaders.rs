//! Integration tests for the MOD, S3M and IT loaders against synthetic files.

use imp_formats::{
    detect, load, load_it, load_mod, load_s3m, load_with_report, FormatError, LoadWarning,
};
use imp_ir::{Format, LoopType, Module, Note, OrderEntry, SampleData, VolumeCommand};

fn assert_model_invariants(module: &Module) {
    assert_eq!(module.validate(), Ok(()));
    for (i, sample) in module.samples.iter().enumerate() {
        if sample.has_loop() {
            assert!(sample.loop_start < sample.loop_end, "Sample {} loop bounds", i);
            assert!(sample.loop_end <= sample.len() as u32, "Sample {} loop_end overflow", i);
        }
    }
}

// --- MOD ---

struct ModFile {
    bytes: Vec<u8>,
}

impl ModFile {
    /// Four-channel M.K. file with `patterns` empty patterns and the given order list.
    fn new(orders: &[u8], patterns: usize) -> Self {
        let mut bytes = vec![0u8; 1084];
        bytes[..9].copy_from_slice(b"test song");
        bytes[950] = orders.len() as u8;
        bytes[952..952 + orders.len()].copy_from_slice(orders);
        bytes[1080..1084].copy_from_slice(b"M.K.");
        bytes.resize(1084 + patterns * 1024, 0);
        Self { bytes }
    }

    fn sample(&mut self, slot: usize, name: &str, words: u16, volume: u8, loop_words: (u16, u16)) {
        let h = 20 + slot * 30;
        self.bytes[h..h + name.len()].copy_from_slice(name.as_bytes());
        self.bytes[h + 22..h + 24].copy_from_slice(&words.to_be_bytes());
        self.bytes[h + 25] = volume;
        self.bytes[h + 26..h + 28].copy_from_slice(&loop_words.0.to_be_bytes());
        self.bytes[h + 28..h + 30].copy_from_slice(&loop_words.1.to_be_bytes());
    }

    #[allow(clippy::too_many_arguments)]
    fn cell(
        &mut self,
        pattern: usize,
        row: usize,
        ch: usize,
        period: u16,
        instrument: u8,
        effect: u8,
        param: u8,
    ) {
        let at = 1084 + pattern * 1024 + (row * 4 + ch) * 4;
        self.bytes[at] = (instrument & 0xF0) | ((period >> 8) as u8 & 0x0F);
        self.bytes[at + 1] = period as u8;
        self.bytes[at + 2] = ((instrument & 0x0F) << 4) | (effect & 0x0F);
        self.bytes[at + 3] = param;
    }
}

#[test]
fn mod_structure() {
    let mut file = ModFile::new(&[0, 1, 0], 2);
    file.sample(0, "lead", 4, 48, (1, 2));
    file.cell(0, 0, 0, 428, 1, 0xF, 0x06);
    file.cell(1, 63, 3, 856, 1, 0xC, 0x20);
    file.bytes.extend_from_slice(&[0, 10, 20, 30, 40, 50, 60, 70]);

    let module = load_mod(&file.bytes).unwrap();
    assert_model_invariants(&module);
    assert_eq!(module.format, Format::ProTracker);
    assert_eq!(module.title(), "test song");
    assert_eq!(module.num_channels(), 4);
    assert_eq!(module.samples.len(), 31);
    assert_eq!(module.instruments.len(), 31);
    assert_eq!((module.initial_speed, module.initial_tempo), (6, 125));
    assert_eq!(
        module.order,
        vec![OrderEntry::Pattern(0), OrderEntry::Pattern(1), OrderEntry::Pattern(0)]
    );

    let pans: Vec<i8> = module.channels.iter().map(|c| c.initial_pan).collect();
    assert_eq!(pans, vec![-64, 64, 64, -64]);

    let cell = module.cell(0, 0, 0).unwrap();
    assert_eq!(cell.note, Note::On(60));
    assert_eq!(cell.instrument, 1);
    assert_eq!((cell.effect, cell.param), (0xF, 0x06));
    assert_eq!(module.cell(1, 63, 3).unwrap().note, Note::On(48));

    let sample = &module.samples[0];
    assert_eq!(sample.name(), "lead");
    assert_eq!(sample.default_volume, 48);
    assert_eq!(sample.data, SampleData::Mono8(vec![0, 10, 20, 30, 40, 50, 60, 70]));
    assert_eq!(sample.loop_type, LoopType::Forward);
    assert_eq!((sample.loop_start, sample.loop_end), (2, 6));
}

#[test]
fn mod_restart_position_becomes_loop_entry() {
    let mut file = ModFile::new(&[0, 0, 0], 1);
    file.bytes[951] = 1;
    let module = load_mod(&file.bytes).unwrap();
    assert_eq!(module.order.last(), Some(&OrderEntry::Loop(1)));
    assert_model_invariants(&module);

    // 0x7F is the "no restart" marker many trackers write.
    file.bytes[951] = 0x7F;
    let module = load_mod(&file.bytes).unwrap();
    assert_eq!(module.order.len(), 3);
}

#[test]
fn mod_loop_past_end_is_clamped() {
    let mut file = ModFile::new(&[0], 1);
    file.sample(0, "s", 4, 64, (2, 10));
    file.bytes.extend_from_slice(&[1; 8]);
    let module = load_mod(&file.bytes).unwrap();
    let sample = &module.samples[0];
    assert_eq!((sample.loop_start, sample.loop_end), (4, 8));
    assert_model_invariants(&module);
}

#[test]
fn mod_short_sample_is_padded() {
    let mut file = ModFile::new(&[0], 1);
    file.sample(0, "s", 8, 64, (0, 0));
    file.bytes.extend_from_slice(&[5; 10]);
    let report = load_with_report(&file.bytes).unwrap();
    assert_eq!(report.module.samples[0].len(), 16);
    assert_eq!(report.module.samples[0].data.get(9), 5 * 256);
    assert_eq!(report.module.samples[0].data.get(10), 0);
    assert_eq!(report.warnings, vec![LoadWarning::ShortSample { index: 0, missing: 6 }]);
}

#[test]
fn mod_missing_pattern_data_is_truncated() {
    let mut file = ModFile::new(&[0, 2], 3);
    file.bytes.truncate(1084 + 2 * 1024 + 100);
    assert_eq!(load_mod(&file.bytes), Err(FormatError::Truncated { what: "pattern data" }));
}

#[test]
fn mod_instrument_past_31_is_cleared() {
    let mut file = ModFile::new(&[0], 1);
    file.cell(0, 0, 0, 428, 0x40, 0, 0);
    file.cell(0, 1, 1, 428, 31, 0, 0);
    let report = load_with_report(&file.bytes).unwrap();
    let module = &report.module;
    assert_model_invariants(module);
    let cell = module.cell(0, 0, 0).unwrap();
    assert_eq!((cell.note, cell.instrument), (Note::On(60), 0));
    assert_eq!(module.cell(0, 1, 1).unwrap().instrument, 31);
}

#[test]
fn mod_signature_sets_channel_count() {
    let mut file = ModFile::new(&[0], 0);
    file.bytes[1080..1084].copy_from_slice(b"8CHN");
    file.bytes.resize(1084 + 64 * 8 * 4, 0);
    assert_eq!(load_mod(&file.bytes).unwrap().num_channels(), 8);
}

// --- S3M ---

fn pad16(bytes: &mut Vec<u8>) {
    while bytes.len() % 16 != 0 {
        bytes.push(0);
    }
}

/// Build an S3M with one looped 8-bit sample and one pattern.
fn s3m_file(orders: &[u8], packed_pattern: &[u8], pattern_para_override: Option<u16>) -> Vec<u8> {
    let mut b = vec![0u8; 0x60];
    b[..5].copy_from_slice(b"s3m!\0");
    b[0x1C] = 0x1A;
    b[0x1D] = 16;
    b[0x20..0x22].copy_from_slice(&(orders.len() as u16).to_le_bytes());
    b[0x22..0x24].copy_from_slice(&1u16.to_le_bytes());
    b[0x24..0x26].copy_from_slice(&1u16.to_le_bytes());
    b[0x2A..0x2C].copy_from_slice(&2u16.to_le_bytes()); // unsigned samples
    b[0x2C..0x30].copy_from_slice(b"SCRM");
    b[0x30] = 64;
    b[0x31] = 4;
    b[0x32] = 140;
    b[0x33] = 0x80 | 48;
    for (i, c) in b[0x40..0x60].iter_mut().enumerate() {
        *c = match i {
            0 => 0,
            1 => 8,
            _ => 255,
        };
    }
    b.extend_from_slice(orders);
    let ptrs = b.len();
    b.extend_from_slice(&[0; 4]);
    pad16(&mut b);

    let smp_para = (b.len() / 16) as u16;
    let smp = b.len();
    b.resize(smp + 0x50, 0);
    pad16(&mut b);

    let pat_para = (b.len() / 16) as u16;
    b.extend_from_slice(&((packed_pattern.len() + 2) as u16).to_le_bytes());
    b.extend_from_slice(packed_pattern);
    pad16(&mut b);

    let data_para = b.len() / 16;
    b.extend_from_slice(&[0x80, 0x90, 0xA0, 0xB0, 0x70, 0x60, 0x50, 0x40]);

    b[ptrs..ptrs + 2].copy_from_slice(&smp_para.to_le_bytes());
    b[ptrs + 2..ptrs + 4].copy_from_slice(&pattern_para_override.unwrap_or(pat_para).to_le_bytes());
    b[smp] = 1;
    b[smp + 0x0D] = (data_para >> 16) as u8;
    b[smp + 0x0E..smp + 0x10].copy_from_slice(&(data_para as u16).to_le_bytes());
    b[smp + 0x10..smp + 0x14].copy_from_slice(&8u32.to_le_bytes());
    b[smp + 0x14..smp + 0x18].copy_from_slice(&2u32.to_le_bytes());
    b[smp + 0x18..smp + 0x1C].copy_from_slice(&100u32.to_le_bytes());
    b[smp + 0x1C] = 50;
    b[smp + 0x1F] = 1; // loop
    b[smp + 0x20..smp + 0x24].copy_from_slice(&16726u32.to_le_bytes());
    b[smp + 0x30..smp + 0x35].copy_from_slice(b"piano");
    b[smp + 0x4C..smp + 0x50].copy_from_slice(b"SCRS");
    b
}

#[test]
fn s3m_structure() {
    let packed = [
        0x20 | 0x40 | 0x80, 0x40, 1, 32, 1, 3, 0, // row 0, ch0: C-5 ins 1 vol 32 A03
        0,
        0x20 | 1, 0x51, 1, 0, // row 2, ch1: C#6
    ];
    let data = s3m_file(&[0, 254, 255], &packed, None);
    assert_eq!(detect(&data), Some(Format::ScreamTracker3));

    let module = load_s3m(&data).unwrap();
    assert_model_invariants(&module);
    assert_eq!(module.format, Format::ScreamTracker3);
    assert_eq!(module.title(), "s3m!");
    assert_eq!(module.num_channels(), 2);
    assert_eq!((module.initial_speed, module.initial_tempo), (4, 140));
    assert_eq!(module.global_volume, 128);
    assert_eq!(
        module.order,
        vec![OrderEntry::Pattern(0), OrderEntry::Skip, OrderEntry::End]
    );
    assert_eq!(module.channels[0].initial_pan, -39);
    assert_eq!(module.channels[1].initial_pan, 38);

    let cell = module.cell(0, 0, 0).unwrap();
    assert_eq!(cell.note, Note::On(60));
    assert_eq!(cell.volume, VolumeCommand::Volume(32));
    assert_eq!((cell.effect, cell.param), (1, 3));
    assert_eq!(module.cell(0, 2, 1).unwrap().note, Note::On(73));

    let sample = &module.samples[0];
    assert_eq!(sample.name(), "piano");
    assert_eq!(sample.default_volume, 50);
    assert_eq!(sample.base_rate, 16726);
    assert_eq!(sample.data.get(0), 0);
    assert_eq!(sample.data.get(1), 0x10 * 256);
    assert_eq!(sample.data.get(7), -0x40 * 256);
    assert_eq!((sample.loop_start, sample.loop_end), (2, 8));
    assert_eq!(module.instruments[0].resolve(60), Some((60, 0)));
}

#[test]
fn s3m_corrupt_pattern_is_replaced() {
    let data = s3m_file(&[0], &[], Some(0x7000));
    let report = load_with_report(&data).unwrap();
    assert_model_invariants(&report.module);
    assert!(report.module.patterns[0].is_silent());
    assert_eq!(report.module.patterns[0].rows, 64);
    assert!(matches!(
        report.warnings.as_slice(),
        [LoadWarning::Pattern(FormatError::CorruptPattern { index: 0, .. })]
    ));
}

#[test]
fn s3m_truncated_header() {
    let data = s3m_file(&[0], &[], None);
    assert_eq!(
        load_s3m(&data[..0x50]),
        Err(FormatError::Truncated { what: "song header" })
    );
}

// --- IT ---

struct ItFile {
    bytes: Vec<u8>,
}

impl ItFile {
    /// Header with one sample slot and one pattern slot; offsets are filled in later.
    fn new(orders: &[u8], flags: u16) -> Self {
        let mut b = vec![0u8; 0xC0];
        b[..4].copy_from_slice(b"IMPM");
        b[4..11].copy_from_slice(b"it song");
        b[0x20..0x22].copy_from_slice(&(orders.len() as u16).to_le_bytes());
        b[0x24..0x26].copy_from_slice(&1u16.to_le_bytes());
        b[0x26..0x28].copy_from_slice(&1u16.to_le_bytes());
        b[0x2A..0x2C].copy_from_slice(&0x214u16.to_le_bytes());
        b[0x2C..0x2E].copy_from_slice(&flags.to_le_bytes());
        b[0x30] = 100;
        b[0x32] = 3;
        b[0x33] = 150;
        for ch in 0..64 {
            b[0x40 + ch] = 32;
            b[0x80 + ch] = 64;
        }
        b[0x40] = 0;
        b[0x41] = 64;
        b.extend_from_slice(orders);
        b.extend_from_slice(&[0; 8]);
        Self { bytes: b }
    }

    fn offsets_at(&self) -> usize {
        0xC0 + self.bytes[0x20] as usize
    }

    fn sample(&mut self, flags: u8, convert: u8, length: u32, payload: &[u8]) {
        let at = self.bytes.len();
        let slot = self.offsets_at();
        self.bytes[slot..slot + 4].copy_from_slice(&(at as u32).to_le_bytes());
        let mut h = vec![0u8; 0x50];
        h[..4].copy_from_slice(b"IMPS");
        h[0x11] = 64;
        h[0x12] = flags;
        h[0x13] = 40;
        h[0x14..0x18].copy_from_slice(b"bass");
        h[0x2E] = convert;
        h[0x30..0x34].copy_from_slice(&length.to_le_bytes());
        h[0x34..0x38].copy_from_slice(&1u32.to_le_bytes());
        h[0x38..0x3C].copy_from_slice(&3u32.to_le_bytes());
        h[0x3C..0x40].copy_from_slice(&22050u32.to_le_bytes());
        h[0x48..0x4C].copy_from_slice(&((at + 0x50) as u32).to_le_bytes());
        self.bytes.extend_from_slice(&h);
        self.bytes.extend_from_slice(payload);
    }

    fn pattern(&mut self, rows: u16, packed: &[u8]) {
        let at = self.bytes.len();
        let slot = self.offsets_at() + 4;
        self.bytes[slot..slot + 4].copy_from_slice(&(at as u32).to_le_bytes());
        self.bytes.extend_from_slice(&(packed.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(&rows.to_le_bytes());
        self.bytes.extend_from_slice(&[0; 4]);
        self.bytes.extend_from_slice(packed);
    }
}

#[test]
fn it_structure() {
    let mut file = ItFile::new(&[0, 254, 0, 255], 0x01 | 0x08);
    file.sample(0x01 | 0x10 | 0x40, 0x01, 4, &[0, 64, 0x80, 0xC0]);
    file.pattern(
        8,
        &[
            0x83, 0x0F, 60, 1, 0x80, 7, 0x20, 0, // row 0, ch2: C-5, ins 1, pan 0, G20
            0, 0x81, 0x01, 255, 0, // row 2, ch0: note off
        ],
    );

    let data = file.bytes;
    assert_eq!(detect(&data), Some(Format::ImpulseTracker));
    let module = load(&data).unwrap();
    assert_model_invariants(&module);
    assert_eq!(load_it(&data).unwrap(), module);
    assert_eq!(module.format, Format::ImpulseTracker);
    assert_eq!(module.title(), "it song");
    assert!(module.linear_slides);
    assert_eq!(module.num_channels(), 3);
    assert_eq!(module.global_volume, 100);
    assert_eq!((module.initial_speed, module.initial_tempo), (3, 150));
    assert_eq!(module.channels[0].initial_pan, -64);
    assert_eq!(module.channels[1].initial_pan, 64);
    assert_eq!(module.channels[2].initial_pan, 0);
    assert_eq!(
        module.order,
        vec![OrderEntry::Pattern(0), OrderEntry::Skip, OrderEntry::Pattern(0), OrderEntry::End]
    );

    assert_eq!(module.num_rows(0), Some(8));
    let cell = module.cell(0, 0, 2).unwrap();
    assert_eq!(cell.note, Note::On(60));
    assert_eq!(cell.instrument, 1);
    assert_eq!(cell.volume, VolumeCommand::Panning(0));
    assert_eq!((cell.effect, cell.param), (7, 0x20));
    assert_eq!(module.cell(0, 2, 0).unwrap().note, Note::Off);

    let sample = &module.samples[0];
    assert_eq!(sample.name(), "bass");
    assert_eq!(sample.base_rate, 22050);
    assert_eq!(sample.default_volume, 40);
    assert_eq!(sample.loop_type, LoopType::PingPong);
    assert_eq!((sample.loop_start, sample.loop_end), (1, 3));
    assert_eq!(sample.data, SampleData::Mono8(vec![0, 64, -128, -64]));
}

#[test]
fn it_corrupt_compressed_sample_loads_silent() {
    let mut file = ItFile::new(&[0], 0);
    file.pattern(4, &[]);
    // Compressed flag set but the block header is cut off.
    file.sample(0x01 | 0x08, 0x01, 100, &[0x05]);
    let report = load_with_report(&file.bytes).unwrap();
    assert_model_invariants(&report.module);
    assert!(report.module.samples[0].is_empty());
    assert!(matches!(
        report.warnings.as_slice(),
        [LoadWarning::Sample(FormatError::CorruptSample { index: 0, .. })]
    ));
}

#[test]
fn it_pattern_overrun_is_reported() {
    let mut file = ItFile::new(&[0], 0);
    file.sample(0x01, 0x01, 2, &[1, 2]);
    file.pattern(1, &[0, 0x81, 0x01, 60, 0]);
    let report = load_with_report(&file.bytes).unwrap();
    assert_model_invariants(&report.module);
    assert!(report.module.patterns[0].is_silent());
    assert_eq!(report.module.patterns[0].rows, 1);
    assert_eq!(report.warnings.len(), 1);
}

// --- Dispatch ---

#[test]
fn unknown_data_is_unsupported() {
    assert_eq!(detect(b"not a module"), None);
    assert_eq!(load(&[0u8; 2000]), Err(FormatError::UnsupportedFormat));
    assert_eq!(load(&[]), Err(FormatError::UnsupportedFormat));
}

#[test]
fn loading_is_deterministic() {
    let mut file = ModFile::new(&[0], 1);
    file.sample(0, "s", 2, 64, (0, 0));
    file.cell(0, 0, 0, 428, 1, 0, 0);
    file.bytes.extend_from_slice(&[1, 2, 3, 4]);
    assert_eq!(load(&file.bytes).unwrap(), load(&file.bytes).unwrap());
}
