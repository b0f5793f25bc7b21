//! Shared 8-byte UtcTime encoding used by both the GOOSE `t` field and the
//! SV ASDU `timestamp` field (spec §4.5.4).

use chrono::{DateTime, Utc};

/// Quality byte fixed by this profile: 10 bits of claimed accuracy,
/// leap-second-unknown = 0, clock-failure = 0, clock-synchronised = 0.
pub const QUALITY_BYTE: u8 = 0x0A;

/// Encodes a point in time as the 8-byte UtcTime: 4 bytes seconds-since-epoch
/// (BE), 3 bytes fraction-of-second as a binary fixed-point in units of
/// 2^-24 (BE), 1 quality byte.
pub fn encode_utc_time(t: DateTime<Utc>) -> [u8; 8] {
    let secs = t.timestamp().max(0) as u32;
    let nanos = t.timestamp_subsec_nanos();
    let frac = ((nanos as u64 * (1u64 << 24)) / 1_000_000_000) as u32;

    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&secs.to_be_bytes());
    let frac_bytes = frac.to_be_bytes();
    out[4..7].copy_from_slice(&frac_bytes[1..4]);
    out[7] = QUALITY_BYTE;
    out
}

/// Encodes the current wall-clock time.
pub fn encode_utc_time_now() -> [u8; 8] {
    encode_utc_time(Utc::now())
}

/// Decodes an 8-byte UtcTime back into seconds-since-epoch and the
/// fraction-of-second (as a value in `[0, 1)`), ignoring the quality byte.
pub fn decode_utc_time(bytes: [u8; 8]) -> (u32, f64) {
    let secs = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let frac_raw = u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]]);
    let frac = frac_raw as f64 / (1u64 << 24) as f64;
    (secs, frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encodes_fixed_quality_byte() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let bytes = encode_utc_time(t);
        assert_eq!(bytes[7], QUALITY_BYTE);
    }

    #[test]
    fn round_trips_whole_seconds() {
        let t = Utc.timestamp_opt(1_700_000_123, 0).unwrap();
        let bytes = encode_utc_time(t);
        let (secs, frac) = decode_utc_time(bytes);
        assert_eq!(secs, 1_700_000_123);
        assert_eq!(frac, 0.0);
    }

    #[test]
    fn encodes_subsecond_fraction_within_tolerance() {
        let t = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        let bytes = encode_utc_time(t);
        let (_, frac) = decode_utc_time(bytes);
        assert!((frac - 0.5).abs() < 1.0e-6);
    }
}
