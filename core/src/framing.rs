use crate::config::PhyConfig;
use crate::error::{PhyError, Result};
use crate::redundancy::{decode_repetition, encode_repetition, RepetitionMode};
use crate::CRC_BITS;

/// Bitwise CRC-8 over a bit sequence
///
/// Each set bit is folded into the top of the register, followed by eight shift steps
/// against `polynomial`. With an odd polynomial every step is invertible, so any
/// single-bit error changes the result.
pub fn crc8_bits(bits: &[bool], polynomial: u8) -> u8 {
    let mut crc = 0u8;
    for &bit in bits {
        if bit {
            crc ^= 0x80;
        }
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// MSB-first bits of a byte
pub fn byte_to_bits(byte: u8) -> [bool; 8] {
    let mut bits = [false; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (byte >> (7 - i)) & 1 == 1;
    }
    bits
}

/// Packs up to 8 MSB-first bits into a byte
pub fn bits_to_byte(bits: &[bool]) -> u8 {
    bits.iter()
        .take(8)
        .fold(0u8, |acc, &bit| (acc << 1) | bit as u8)
}

/// Parses a '0'/'1' text payload; every other character is skipped.
pub fn parse_bit_string(text: &str) -> Vec<bool> {
    text.chars()
        .filter_map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect()
}

pub fn format_bits(bits: &[bool]) -> String {
    bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

/// Builds the on-air bit sequence: payload and CRC trailer, then repetition coding.
///
/// The CRC covers the source payload. Repetition wraps both, so the trailer is protected
/// the same way as the payload.
pub fn build_frame_bits(payload: &[bool], config: &PhyConfig) -> Result<Vec<bool>> {
    if payload.len() != config.payload_bits {
        return Err(PhyError::InvalidInputSize {
            expected: config.payload_bits,
            actual: payload.len(),
        });
    }

    let crc = crc8_bits(payload, config.crc_polynomial);
    let mut source = Vec::with_capacity(config.source_frame_bits());
    source.extend_from_slice(payload);
    source.extend_from_slice(&byte_to_bits(crc));
    Ok(encode_repetition(&source, config.repetition))
}

/// A frame whose checksum matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFrame {
    pub payload: Vec<bool>,
    pub crc: u8,
    /// Repetition groups that needed a majority decision
    pub repaired_groups: usize,
}

/// Majority-decodes demodulated frame bits, then splits payload and CRC and checks them
#[derive(Debug, Clone)]
pub struct FrameValidator {
    payload_bits: usize,
    repetition: RepetitionMode,
    polynomial: u8,
}

impl FrameValidator {
    pub fn new(config: &PhyConfig) -> Self {
        Self {
            payload_bits: config.payload_bits,
            repetition: config.repetition,
            polynomial: config.crc_polynomial,
        }
    }

    pub fn frame_bits(&self) -> usize {
        (self.payload_bits + CRC_BITS) * self.repetition.factor()
    }

    pub fn validate(&self, bits: &[bool]) -> Result<ValidatedFrame> {
        if bits.len() != self.frame_bits() {
            return Err(PhyError::InvalidFrameSize {
                expected: self.frame_bits(),
                actual: bits.len(),
            });
        }

        let decoded = decode_repetition(bits, self.repetition)?;
        let (payload, trailer) = decoded.bits.split_at(self.payload_bits);
        let received = bits_to_byte(trailer);
        let computed = crc8_bits(payload, self.polynomial);

        if received != computed {
            return Err(PhyError::ChecksumMismatch { received, computed });
        }

        Ok(ValidatedFrame {
            payload: payload.to_vec(),
            crc: received,
            repaired_groups: decoded.repaired_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(payload_bits: usize) -> PhyConfig {
        PhyConfig::default().with_payload_bits(payload_bits)
    }

    #[test]
    fn test_crc8_known_values() {
        assert_eq!(crc8_bits(&[], 0xD7), 0);
        assert_eq!(crc8_bits(&[false; 16], 0xD7), 0);
        assert_eq!(crc8_bits(&[true], 0xD7), 0x9E);
        assert_eq!(crc8_bits(&parse_bit_string("10000000"), 0xD7), 0x08);
        assert_eq!(crc8_bits(&parse_bit_string("11111111"), 0xD7), 0x03);
        assert_eq!(crc8_bits(&parse_bit_string("10110100"), 0xD7), 0x9B);
        assert_eq!(crc8_bits(&[true; 100], 0xD7), 0x6B);
        assert_eq!(crc8_bits(&parse_bit_string(&"01".repeat(50)), 0xD7), 0xEB);
        // Leading zeros do not change the register
        assert_eq!(crc8_bits(&[false, true], 0xD7), crc8_bits(&[true], 0xD7));
    }

    #[test]
    fn test_crc8_detects_every_single_bit_error() {
        let payload = parse_bit_string("1011001011110000101011001110001");
        let reference = crc8_bits(&payload, 0xD7);
        for i in 0..payload.len() {
            let mut corrupted = payload.clone();
            corrupted[i] = !corrupted[i];
            assert_ne!(
                crc8_bits(&corrupted, 0xD7),
                reference,
                "flip at bit {} went undetected",
                i
            );
        }
    }

    #[test]
    fn test_byte_bit_conversion_is_msb_first() {
        assert_eq!(
            byte_to_bits(0xA5),
            [true, false, true, false, false, true, false, true]
        );
        assert_eq!(bits_to_byte(&byte_to_bits(0x3C)), 0x3C);
    }

    #[test]
    fn test_parse_bit_string_skips_other_characters() {
        let bits = parse_bit_string("10 1x1\n0\r\n");
        assert_eq!(bits, vec![true, false, true, true, false]);
        assert_eq!(format_bits(&bits), "10110");
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = parse_bit_string("10110010");
        let config = config_for(payload.len());
        let bits = build_frame_bits(&payload, &config).unwrap();
        assert_eq!(bits.len(), 16);

        let frame = FrameValidator::new(&config).validate(&bits).unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.crc, crc8_bits(&payload, config.crc_polynomial));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let payload = parse_bit_string("10110010");
        let config = config_for(payload.len());
        let mut bits = build_frame_bits(&payload, &config).unwrap();
        bits[3] = !bits[3];

        let result = FrameValidator::new(&config).validate(&bits);
        assert!(matches!(result, Err(PhyError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_corrupted_trailer_rejected() {
        let payload = parse_bit_string("0001110001");
        let config = config_for(payload.len());
        let mut bits = build_frame_bits(&payload, &config).unwrap();
        let last = bits.len() - 1;
        bits[last] = !bits[last];

        match FrameValidator::new(&config).validate(&bits) {
            Err(PhyError::ChecksumMismatch { received, computed }) => {
                assert_eq!(received ^ computed, 0x01);
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_triple_repetition_frame_repairs_errors() {
        let payload = parse_bit_string("1100101");
        let config = config_for(payload.len()).with_repetition(RepetitionMode::Triple);
        let mut bits = build_frame_bits(&payload, &config).unwrap();
        assert_eq!(bits.len(), (7 + CRC_BITS) * 3);

        bits[1] = !bits[1];
        bits[11] = !bits[11];

        let frame = FrameValidator::new(&config).validate(&bits).unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.repaired_groups, 2);
    }

    #[test]
    fn test_triple_repetition_protects_the_trailer() {
        let payload = parse_bit_string("10110010");
        let config = config_for(payload.len()).with_repetition(RepetitionMode::Triple);
        let mut bits = build_frame_bits(&payload, &config).unwrap();
        assert_eq!(bits.len(), 48);

        // One copy of the last CRC bit
        let last = bits.len() - 1;
        bits[last] = !bits[last];

        let frame = FrameValidator::new(&config).validate(&bits).unwrap();
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.crc, crc8_bits(&payload, config.crc_polynomial));
        assert_eq!(frame.repaired_groups, 1);
    }

    #[test]
    fn test_payload_length_must_match_config() {
        let config = config_for(12);
        let result = build_frame_bits(&[true; 8], &config);
        assert_eq!(
            result,
            Err(PhyError::InvalidInputSize {
                expected: 12,
                actual: 8
            })
        );
    }

    #[test]
    fn test_wrong_frame_length_rejected() {
        let config = config_for(8);
        let result = FrameValidator::new(&config).validate(&[false; 10]);
        assert!(matches!(result, Err(PhyError::InvalidFrameSize { .. })));
    }
}
