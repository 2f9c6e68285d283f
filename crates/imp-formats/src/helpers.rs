//! Byte-level helpers shared by the dialect parsers.

use std::io::Cursor;

use binrw::{BinRead, Endian};
use imp_ir::{Cell, Note, OrderEntry, Pattern, MAX_ROWS};

use crate::{FormatError, LoadWarning};

/// Parse a fixed-width, null-padded string.
pub(crate) fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    data[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Borrow `len` bytes at `offset`, failing with `Truncated` if they are not all there.
pub(crate) fn slice<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], FormatError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(FormatError::Truncated { what })
}

/// Borrow up to `len` bytes at `offset`; also returns how many were missing.
pub(crate) fn payload(data: &[u8], offset: usize, len: usize) -> (&[u8], usize) {
    let start = offset.min(data.len());
    let end = offset.saturating_add(len).min(data.len());
    let got = &data[start..end];
    (got, len - got.len())
}

/// Decode a little-endian header struct at `offset`.
pub(crate) fn read_header<T>(data: &[u8], offset: usize) -> binrw::BinResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    T::read_options(&mut cursor, Endian::Little, ())
}

/// Map a binrw failure on a file header to the loader's error taxonomy.
pub(crate) fn header_error(err: binrw::Error, what: &'static str) -> FormatError {
    match err {
        binrw::Error::BadMagic { .. } => FormatError::UnsupportedFormat,
        _ => FormatError::Truncated { what },
    }
}

/// Log a repaired problem and keep it for the load report.
pub(crate) fn warn(warnings: &mut Vec<LoadWarning>, warning: LoadWarning) {
    tracing::warn!(?warning, "recovered from damaged module data");
    warnings.push(warning);
}

/// Read a u16 little-endian parapointer table entry.
pub(crate) fn le_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Read a u32 little-endian value.
pub(crate) fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Convert 8-bit PCM to signed, optionally integrating delta-coded data.
pub(crate) fn pcm8(bytes: &[u8], signed: bool, delta: bool) -> Vec<i8> {
    let mut acc: i8 = 0;
    bytes
        .iter()
        .map(|&b| {
            let v = if signed { b as i8 } else { (b ^ 0x80) as i8 };
            if delta {
                acc = acc.wrapping_add(v);
                acc
            } else {
                v
            }
        })
        .collect()
}

/// Convert little-endian 16-bit PCM to signed, optionally integrating deltas.
pub(crate) fn pcm16(bytes: &[u8], signed: bool, delta: bool) -> Vec<i16> {
    let mut acc: i16 = 0;
    bytes
        .chunks_exact(2)
        .map(|b| {
            let raw = u16::from_le_bytes([b[0], b[1]]);
            let v = if signed { raw as i16 } else { (raw ^ 0x8000) as i16 };
            if delta {
                acc = acc.wrapping_add(v);
                acc
            } else {
                v
            }
        })
        .collect()
}

/// Average two channels into one.
pub(crate) fn downmix8(left: &[i8], right: &[i8]) -> Vec<i8> {
    left.iter()
        .zip(right)
        .map(|(&l, &r)| ((l as i16 + r as i16) / 2) as i8)
        .collect()
}

/// Average two channels into one.
pub(crate) fn downmix16(left: &[i16], right: &[i16]) -> Vec<i16> {
    left.iter()
        .zip(right)
        .map(|(&l, &r)| ((l as i32 + r as i32) / 2) as i16)
        .collect()
}

/// Map a raw order byte; 254 and 255 are the S3M/IT skip and end markers.
pub(crate) fn order_entry(byte: u8, num_patterns: usize) -> OrderEntry {
    match byte {
        255 => OrderEntry::End,
        254 => OrderEntry::Skip,
        p if (p as usize) < num_patterns => OrderEntry::Pattern(p),
        _ => OrderEntry::Skip,
    }
}

/// A cell at (row, channel) decoded from a sparse pattern stream.
pub(crate) type SparseCell = (u16, u8, Cell);

/// Expand sparse cells into a dense pattern, dropping channels past `channels`.
pub(crate) fn densify(rows: u16, channels: u8, cells: &[SparseCell]) -> Pattern {
    let mut pattern = Pattern::new(rows, channels);
    for &(row, ch, cell) in cells {
        if row < rows && ch < channels {
            *pattern.cell_mut(row, ch) = cell;
        }
    }
    pattern
}

/// Row count to use for a pattern whose header cannot be trusted.
pub(crate) fn fallback_rows(declared: u16) -> u16 {
    if declared == 0 || declared > MAX_ROWS {
        64
    } else {
        declared
    }
}

/// Clear instrument numbers that point past the instrument list.
pub(crate) fn sanitize_instruments(patterns: &mut [Pattern], instruments: usize) {
    for cell in patterns.iter_mut().flat_map(|p| p.data.iter_mut()) {
        if cell.instrument as usize > instruments {
            cell.instrument = 0;
        }
    }
}

/// Unified note number for an S3M-style octave/semitone byte.
pub(crate) fn octave_note(byte: u8) -> Note {
    match byte {
        255 => Note::None,
        254 => Note::Cut,
        b => {
            let octave = b >> 4;
            let semitone = b & 0x0F;
            if semitone > 11 || octave > 8 {
                Note::None
            } else {
                Note::On((octave + 1) * 12 + semitone)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_stop_at_nul_and_trim() {
        assert_eq!(read_string(b"Hello  \0junk"), "Hello");
        assert_eq!(read_string(b"no terminator"), "no terminator");
        assert_eq!(read_string(&[b'a', 0x07, b'b']), "a b");
    }

    #[test]
    fn slice_reports_truncation() {
        let data = [0u8; 8];
        assert!(slice(&data, 4, 4, "x").is_ok());
        assert_eq!(
            slice(&data, 6, 4, "orders"),
            Err(FormatError::Truncated { what: "orders" })
        );
        assert!(slice(&data, usize::MAX, 2, "x").is_err());
    }

    #[test]
    fn payload_counts_missing_bytes() {
        let data = [1u8, 2, 3];
        let (got, missing) = payload(&data, 1, 5);
        assert_eq!(got, &[2, 3]);
        assert_eq!(missing, 3);
        let (got, missing) = payload(&data, 10, 2);
        assert!(got.is_empty());
        assert_eq!(missing, 2);
    }

    #[test]
    fn unsigned_pcm_is_recentred() {
        assert_eq!(pcm8(&[0x80, 0x00, 0xFF], false, false), vec![0, -128, 127]);
        assert_eq!(pcm16(&[0x00, 0x80], false, false), vec![0]);
    }

    #[test]
    fn delta_pcm_integrates() {
        assert_eq!(pcm8(&[10, 5, 0xFB], true, true), vec![10, 15, 10]);
        assert_eq!(pcm16(&[100, 0, 156, 255], true, true), vec![100, 0]);
    }

    #[test]
    fn order_markers() {
        assert_eq!(order_entry(255, 4), OrderEntry::End);
        assert_eq!(order_entry(254, 4), OrderEntry::Skip);
        assert_eq!(order_entry(3, 4), OrderEntry::Pattern(3));
        assert_eq!(order_entry(4, 4), OrderEntry::Skip);
    }

    #[test]
    fn octave_notes_line_up_with_c5() {
        assert_eq!(octave_note(0x40), Note::On(60));
        assert_eq!(octave_note(0x4B), Note::On(71));
        assert_eq!(octave_note(0x4C), Note::None);
        assert_eq!(octave_note(254), Note::Cut);
        assert_eq!(octave_note(255), Note::None);
    }

    #[test]
    fn densify_drops_out_of_range_cells() {
        let cell = Cell { instrument: 1, ..Cell::empty() };
        let pattern = densify(4, 2, &[(0, 0, cell), (3, 1, cell), (4, 0, cell), (0, 5, cell)]);
        assert_eq!(pattern.cell(0, 0).instrument, 1);
        assert_eq!(pattern.cell(3, 1).instrument, 1);
        assert_eq!(pattern.data.iter().filter(|c| c.instrument == 1).count(), 2);
    }
}
