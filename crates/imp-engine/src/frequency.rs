//! Period and resampling-step arithmetic.
//!
//! Pitch is carried as a period in Amiga units ×4, so fine slides and
//! vibrato have a quarter-period resolution. Note 60 (C-5) at a sample's
//! base rate has period 1712; frequency = `PERIOD_CLOCK / period`.

use imp_ir::Format;

/// Period × frequency product shared by every note: 8363 Hz × 1712.
pub const PERIOD_CLOCK: u64 = 8363 * 1712;

/// Narrowest and widest periods any dialect may reach.
pub const PERIOD_MIN: u32 = 56;
pub const PERIOD_MAX: u32 = 1 << 20;

/// ProTracker clamps to B-3..C-1 in its own notation (113..856 Amiga units).
pub const MOD_PERIOD_MIN: u32 = 113 * 4;
pub const MOD_PERIOD_MAX: u32 = 856 * 4;

/// Periods for the twelve semitones of octave 5 at 8363 Hz.
const OCTAVE5_PERIODS: [u32; 12] = [
    1712, 1616, 1524, 1440, 1356, 1280, 1208, 1140, 1076, 1016, 960, 907,
];

/// Period for a note played on a sample whose C-5 rate is `base_rate`.
///
/// Returns 0 for a zero base rate (a voice that never advances).
pub fn note_to_period(note: u8, base_rate: u32) -> u32 {
    if base_rate == 0 {
        return 0;
    }
    let semitone = (note % 12) as usize;
    let octave = (note / 12) as u32;
    let scaled = OCTAVE5_PERIODS[semitone] as u64 * 32 * 8363 / base_rate as u64;
    (scaled >> octave).min(u32::MAX as u64) as u32
}

/// 32.32 fixed-point frames of source per output frame.
pub fn period_to_step(period: u32, sample_rate: u32) -> u64 {
    if period == 0 || sample_rate == 0 {
        return 0;
    }
    (PERIOD_CLOCK << 32) / (period as u64 * sample_rate as u64)
}

/// Move a period by `delta` fine units; positive lowers the pitch.
///
/// With Amiga slides a fine unit is a quarter period. With linear slides
/// it is 1/64 semitone, so 768 units make an octave.
pub fn slide_period(period: u32, delta: i32, linear: bool) -> u32 {
    if delta == 0 {
        return period;
    }
    if linear {
        let factor = libm::exp2(delta as f64 / 768.0);
        let slid = libm::round(period as f64 * factor) as u32;
        // Short periods would otherwise round back to themselves.
        if slid == period {
            (period as i64 + delta.signum() as i64).max(1) as u32
        } else {
            slid.max(1)
        }
    } else {
        (period as i64 + delta as i64).max(1) as u32
    }
}

/// Period `semitones` above `period`, as used by arpeggio.
pub fn transpose_period(period: u32, semitones: u8) -> u32 {
    if semitones == 0 {
        return period;
    }
    libm::round(period as f64 * libm::exp2(-(semitones as f64) / 12.0)) as u32
}

/// Clamp a period to the range the dialect allows.
pub fn clamp_period(period: u32, format: Format) -> u32 {
    match format {
        Format::ProTracker => period.clamp(MOD_PERIOD_MIN, MOD_PERIOD_MAX),
        _ => period.clamp(PERIOD_MIN, PERIOD_MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_RATE: u32 = 8363;
    const SAMPLE_RATE: u32 = 44100;

    #[test]
    fn c5_at_base_rate_is_1712() {
        assert_eq!(note_to_period(60, BASE_RATE), 1712);
        assert_eq!(note_to_period(61, BASE_RATE), 1616);
        assert_eq!(note_to_period(71, BASE_RATE), 907);
    }

    #[test]
    fn octaves_halve_and_double() {
        assert_eq!(note_to_period(48, BASE_RATE), 3424);
        assert_eq!(note_to_period(72, BASE_RATE), 856);
        assert_eq!(note_to_period(36, BASE_RATE), 6848);
    }

    #[test]
    fn base_rate_scales_period_inversely() {
        assert_eq!(note_to_period(60, BASE_RATE * 2), 856);
        assert_eq!(note_to_period(60, 0), 0);
    }

    #[test]
    fn highest_note_stays_above_minimum() {
        assert!(note_to_period(119, BASE_RATE) >= PERIOD_MIN);
    }

    #[test]
    fn step_at_base_rate_plays_base_frequency() {
        let step = period_to_step(1712, SAMPLE_RATE);
        let expected = ((8363u64) << 32) / SAMPLE_RATE as u64;
        assert!(step.abs_diff(expected) <= 1);
    }

    #[test]
    fn step_for_octave_up_doubles() {
        let base = period_to_step(1712, SAMPLE_RATE);
        let up = period_to_step(856, SAMPLE_RATE);
        assert!(up.abs_diff(base * 2) <= 2);
    }

    #[test]
    fn zero_period_or_rate_gives_zero_step() {
        assert_eq!(period_to_step(0, SAMPLE_RATE), 0);
        assert_eq!(period_to_step(1712, 0), 0);
    }

    #[test]
    fn amiga_slide_adds_fine_units() {
        assert_eq!(slide_period(1712, -16, false), 1696);
        assert_eq!(slide_period(1712, 8, false), 1720);
        assert_eq!(slide_period(4, -100, false), 1);
    }

    #[test]
    fn linear_slide_of_768_units_is_an_octave() {
        assert_eq!(slide_period(1712, -768, true), 856);
        assert_eq!(slide_period(1712, 768, true), 3424);
        assert_eq!(slide_period(1712, 0, true), 1712);
    }

    #[test]
    fn linear_slide_always_moves() {
        assert_eq!(slide_period(56, 1, true), 57);
        assert_eq!(slide_period(56, -1, true), 55);
    }

    #[test]
    fn transpose_by_octave() {
        assert_eq!(transpose_period(1712, 12), 856);
        assert_eq!(transpose_period(1712, 0), 1712);
        assert_eq!(transpose_period(1712, 7), 1143);
    }

    #[test]
    fn clamp_depends_on_dialect() {
        assert_eq!(clamp_period(100, Format::ProTracker), MOD_PERIOD_MIN);
        assert_eq!(clamp_period(5000, Format::ProTracker), MOD_PERIOD_MAX);
        assert_eq!(clamp_period(100, Format::ImpulseTracker), 100);
        assert_eq!(clamp_period(10, Format::ScreamTracker3), PERIOD_MIN);
    }
}
