//! WAV encoding for interleaved 16-bit PCM.

use std::io::Write;

const BITS_PER_SAMPLE: u16 = 16;

pub fn write_wav(
    w: &mut impl Write,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let data_size = (samples.len() * 2) as u32;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, channels, sample_rate, block_align)?;
    write_data_chunk(w, samples, data_size)
}

pub fn samples_to_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    write_wav(&mut buf, samples, channels, sample_rate).expect("Vec<u8> write cannot fail");
    buf
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())
}

fn write_data_chunk(w: &mut impl Write, samples: &[i16], data_size: u32) -> std::io::Result<()> {
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    w.write_all(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    fn u32_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn stereo_header() {
        let wav = samples_to_wav(&[1, -1, 2, -2], 2, 44100);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 8);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 44100 * 4);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 8);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[44..48], &[1, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn mono_block_align() {
        let wav = samples_to_wav(&[0; 10], 1, 22050);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 28), 22050 * 2);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u32_at(&wav, 40), 20);
    }
}
