pub mod dhash;

use crate::error::{Error, Result};

/// The fingerprint is a difference hash over a 9x8 grayscale grid:
/// each row of 9 pixels yields 8 left/right comparisons.
pub const WIDTH: usize = 9;
pub const HEIGHT: usize = 8;
pub const BITS: u32 = 64;

/// Number of hex characters in a textual fingerprint.
pub const HEX_LEN: usize = (BITS / 4) as usize;

/// Validate a textual fingerprint and return it lowercased.
///
/// Exactly 16 ASCII hex digits are accepted, in either case. Signs, whitespace
/// and `0x` prefixes are rejected.
pub fn normalize(hex: &str) -> Result<String> {
    if hex.len() != HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidFingerprint(hex.to_string()));
    }
    Ok(hex.to_ascii_lowercase())
}

/// Encode a 16-hex-char fingerprint as a signed 64-bit integer.
///
/// The hex value is parsed as `u64` and its bit pattern reinterpreted as `i64`,
/// so it fits a signed INTEGER column without losing a bit.
pub fn encode(hex: &str) -> Result<i64> {
    let hex = normalize(hex)?;
    let value =
        u64::from_str_radix(&hex, 16).map_err(|_| Error::InvalidFingerprint(hex.clone()))?;
    Ok(value as i64)
}

/// Inverse of [`encode`]: 16 lowercase, zero-padded hex digits.
pub fn decode(value: i64) -> String {
    format!("{:016x}", value as u64)
}

/// Number of differing bits between two encoded fingerprints.
pub fn hamming_distance(a: i64, b: i64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode("0000000000000000").unwrap(), 0);
        assert_eq!(encode("0000000000000001").unwrap(), 1);
        assert_eq!(encode("7fffffffffffffff").unwrap(), i64::MAX);
        assert_eq!(encode("8000000000000000").unwrap(), i64::MIN);
        assert_eq!(encode("ffffffffffffffff").unwrap(), -1);
        assert_eq!(encode("0123456789abcdef").unwrap(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn test_encode_is_case_insensitive() {
        assert_eq!(
            encode("0123456789ABCDEF").unwrap(),
            encode("0123456789abcdef").unwrap()
        );
    }

    #[test]
    fn test_encode_rejects_wrong_length() {
        for input in ["", "0", "0123456789abcde", "0123456789abcdef0"] {
            let err = encode(input).unwrap_err();
            assert!(matches!(err, Error::InvalidFingerprint(_)), "accepted {input:?}");
        }
    }

    #[test]
    fn test_encode_rejects_non_hex() {
        for input in [
            "0123456789abcdeg",
            "+123456789abcdef",
            "-123456789abcdef",
            "0x23456789abcdef",
            " 123456789abcdef",
            "0123456789abcdé",
        ] {
            let err = encode(input).unwrap_err();
            assert!(matches!(err, Error::InvalidFingerprint(_)), "accepted {input:?}");
        }
    }

    #[test]
    fn test_decode_zero_pads() {
        assert_eq!(decode(0), "0000000000000000");
        assert_eq!(decode(255), "00000000000000ff");
        assert_eq!(decode(-1), "ffffffffffffffff");
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0, 1), 1);
        assert_eq!(hamming_distance(0, 3), 2);
        assert_eq!(hamming_distance(0, -1), 64);
        assert_eq!(hamming_distance(i64::MIN, 0), 1);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(hex in "[0-9a-fA-F]{16}") {
            let value = encode(&hex).unwrap();
            prop_assert_eq!(decode(value), hex.to_ascii_lowercase());
        }

        #[test]
        fn prop_decode_then_encode(value in any::<i64>()) {
            prop_assert_eq!(encode(&decode(value)).unwrap(), value);
        }

        #[test]
        fn prop_wrong_length_rejected(hex in "[0-9a-f]{0,15}|[0-9a-f]{17,24}") {
            prop_assert!(encode(&hex).is_err());
        }

        #[test]
        fn prop_non_hex_rejected(
            prefix in "[0-9a-f]{0,15}",
            bad in "[g-zG-Z_ .+-]",
        ) {
            let mut hex = prefix.clone();
            hex.push_str(&bad);
            while hex.len() < HEX_LEN {
                hex.push('0');
            }
            prop_assert!(encode(&hex).is_err());
        }
    }
}
