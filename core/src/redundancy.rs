use crate::error::{PhyError, Result};
use std::fmt;
use std::str::FromStr;

/// Bit-level repetition coding applied to the whole frame, CRC trailer included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepetitionMode {
    #[default]
    None,
    /// Every frame bit is sent three times and majority-decoded
    Triple,
}

impl RepetitionMode {
    pub fn factor(self) -> usize {
        match self {
            RepetitionMode::None => 1,
            RepetitionMode::Triple => 3,
        }
    }
}

/// Result of majority-decoding a repeated bit sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepetitionDecode {
    pub bits: Vec<bool>,
    /// Groups whose copies disagreed and were settled by the majority
    pub repaired_groups: usize,
}

pub fn encode_repetition(bits: &[bool], mode: RepetitionMode) -> Vec<bool> {
    let factor = mode.factor();
    let mut output = Vec::with_capacity(bits.len() * factor);
    for &bit in bits {
        output.extend(std::iter::repeat(bit).take(factor));
    }
    output
}

pub fn decode_repetition(bits: &[bool], mode: RepetitionMode) -> Result<RepetitionDecode> {
    match mode {
        RepetitionMode::None => Ok(RepetitionDecode {
            bits: bits.to_vec(),
            repaired_groups: 0,
        }),
        RepetitionMode::Triple => decode_triple(bits),
    }
}

fn decode_triple(bits: &[bool]) -> Result<RepetitionDecode> {
    if bits.len() % 3 != 0 {
        return Err(PhyError::InvalidInputSize {
            expected: bits.len() - bits.len() % 3,
            actual: bits.len(),
        });
    }

    let mut decoded = Vec::with_capacity(bits.len() / 3);
    let mut repaired_groups = 0;
    for group in bits.chunks_exact(3) {
        let ones = group.iter().filter(|&&b| b).count();
        if ones != 0 && ones != 3 {
            repaired_groups += 1;
        }
        decoded.push(ones >= 2);
    }

    Ok(RepetitionDecode {
        bits: decoded,
        repaired_groups,
    })
}

impl FromStr for RepetitionMode {
    type Err = PhyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "1" => Ok(RepetitionMode::None),
            "triple" | "3" => Ok(RepetitionMode::Triple),
            other => Err(PhyError::InvalidConfig(format!(
                "unknown repetition mode '{}' (none, triple)",
                other
            ))),
        }
    }
}

impl fmt::Display for RepetitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepetitionMode::None => "none",
            RepetitionMode::Triple => "triple",
        })
    }
}
