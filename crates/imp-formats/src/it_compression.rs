//! IT 2.14 / 2.15 sample decompression.
//!
//! Compressed samples are stored as blocks. Each block starts with a
//! little-endian u16 byte count and holds a bit stream (LSB first) of
//! variable-width deltas. The width changes in-band through reserved
//! values. IT 2.15 integrates the deltas twice.

/// Why a compressed stream could not be decoded.
pub type CompressionError = &'static str;

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Read `n` bits (1..=32), LSB first. Bits past the end read as zero.
    fn read(&mut self, n: u32) -> u32 {
        let mut value = 0u32;
        for i in 0..n {
            let byte = self.data.get(self.bit_pos >> 3).copied().unwrap_or(0);
            let bit = (byte >> (self.bit_pos & 7)) & 1;
            value |= (bit as u32) << i;
            self.bit_pos += 1;
        }
        value
    }

    fn overrun(&self) -> bool {
        self.bit_pos > self.data.len() * 8
    }
}

/// Split the next block off `input`, returning its bit stream and the rest.
fn next_block(input: &[u8]) -> Result<(&[u8], &[u8]), CompressionError> {
    let header = input.get(0..2).ok_or("block header past end of data")?;
    let len = u16::from_le_bytes([header[0], header[1]]) as usize;
    let body = &input[2..];
    let len = len.min(body.len());
    Ok((&body[..len], &body[len..]))
}

/// Width selected by a 3- or 4-bit escape value.
fn escaped_width(value: u32, width: u32) -> u32 {
    if value < width {
        value
    } else {
        value + 1
    }
}

/// Decompress an 8-bit sample. Returns the samples and the bytes consumed.
pub fn decompress_8bit(
    input: &[u8],
    len: usize,
    it215: bool,
) -> Result<(Vec<i8>, usize), CompressionError> {
    let mut out = Vec::with_capacity(len.min(input.len().saturating_mul(8)));
    let mut rest = input;

    while out.len() < len {
        let (block, tail) = next_block(rest)?;
        rest = tail;
        let mut bits = BitReader::new(block);
        let block_len = (len - out.len()).min(0x8000);
        let mut width = 9u32;
        let (mut d1, mut d2) = (0i8, 0i8);
        let mut produced = 0;

        while produced < block_len {
            if width == 0 || width > 9 {
                return Err("invalid bit width");
            }
            let mut value = bits.read(width);
            if bits.overrun() {
                return Err("compressed block ends early");
            }

            if width < 7 {
                if value == 1 << (width - 1) {
                    width = escaped_width(bits.read(3) + 1, width);
                    continue;
                }
            } else if width < 9 {
                let border = (0xFFu32 >> (9 - width)) - 4;
                if value > border && value <= border + 8 {
                    width = escaped_width(value - border, width);
                    continue;
                }
            } else if value & 0x100 != 0 {
                width = (value + 1) & 0xFF;
                continue;
            }

            if width < 8 {
                let shift = 8 - width;
                value = (((value << shift) as u8 as i8) >> shift) as u8 as u32;
            }
            d1 = d1.wrapping_add(value as u8 as i8);
            d2 = d2.wrapping_add(d1);
            out.push(if it215 { d2 } else { d1 });
            produced += 1;
        }
    }

    Ok((out, input.len() - rest.len()))
}

/// Decompress a 16-bit sample. Returns the samples and the bytes consumed.
pub fn decompress_16bit(
    input: &[u8],
    len: usize,
    it215: bool,
) -> Result<(Vec<i16>, usize), CompressionError> {
    let mut out = Vec::with_capacity(len.min(input.len().saturating_mul(8)));
    let mut rest = input;

    while out.len() < len {
        let (block, tail) = next_block(rest)?;
        rest = tail;
        let mut bits = BitReader::new(block);
        let block_len = (len - out.len()).min(0x4000);
        let mut width = 17u32;
        let (mut d1, mut d2) = (0i16, 0i16);
        let mut produced = 0;

        while produced < block_len {
            if width == 0 || width > 17 {
                return Err("invalid bit width");
            }
            let mut value = bits.read(width);
            if bits.overrun() {
                return Err("compressed block ends early");
            }

            if width < 7 {
                if value == 1 << (width - 1) {
                    width = escaped_width(bits.read(4) + 1, width);
                    continue;
                }
            } else if width < 17 {
                let border = (0xFFFFu32 >> (17 - width)) - 8;
                if value > border && value <= border + 16 {
                    width = escaped_width(value - border, width);
                    continue;
                }
            } else if value & 0x10000 != 0 {
                width = (value + 1) & 0xFF;
                continue;
            }

            if width < 16 {
                let shift = 16 - width;
                value = (((value << shift) as u16 as i16) >> shift) as u16 as u32;
            }
            d1 = d1.wrapping_add(value as u16 as i16);
            d2 = d2.wrapping_add(d1);
            out.push(if it215 { d2 } else { d1 });
            produced += 1;
        }
    }

    Ok((out, input.len() - rest.len()))
}
