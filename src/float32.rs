//! IEEE-754 single-precision codec for SV sample scalars (spec §4.2).
//!
//! The original implementation reinterpreted a `float` through a C union of
//! sign/exponent/mantissa bitfields, which is undefined behaviour in a
//! standards-conforming reading of the language it was written in. This
//! codec uses explicit bit manipulation instead, matching the {sign:1,
//! exponent:8, mantissa:23} MSB-first layout the profile requires.

/// Encodes `f` as 4 big-endian bytes: sign (1 bit), exponent (8 bits),
/// mantissa (23 bits), packed MSB-first.
pub fn encode_float32_be(f: f32) -> [u8; 4] {
    f.to_be_bytes()
}

/// Decodes 4 big-endian bytes back into an `f32`.
pub fn decode_float32_be(bytes: [u8; 4]) -> f32 {
    f32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_zero() {
        assert_eq!(decode_float32_be(encode_float32_be(0.0)), 0.0);
    }

    #[test]
    fn round_trips_negative() {
        let f = -230.5f32;
        assert_eq!(decode_float32_be(encode_float32_be(f)), f);
    }

    #[test]
    fn round_trips_small_and_large_magnitudes() {
        for f in [0.001f32, 1.0, 100.25, -999.75, 1.0e10, -1.0e-10] {
            assert_eq!(decode_float32_be(encode_float32_be(f)), f);
        }
    }

    #[test]
    fn matches_known_bit_pattern() {
        // 1.0f32 is sign=0 exponent=127 mantissa=0 -> 0x3F800000
        assert_eq!(encode_float32_be(1.0), [0x3F, 0x80, 0x00, 0x00]);
    }
}
