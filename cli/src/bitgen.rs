use crate::config::CliError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

/// Payload test patterns
///
/// Accepted forms: `random`, `alternating`, `pattern:1101` (repeated), `blocks:N`
/// (N ones, N zeros, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitPattern {
    Random,
    Alternating,
    Repeat(Vec<bool>),
    Blocks(usize),
}

impl BitPattern {
    pub fn generate(&self, count: usize, seed: u64) -> Vec<bool> {
        match self {
            BitPattern::Random => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..count).map(|_| rng.gen_bool(0.5)).collect()
            }
            BitPattern::Alternating => (0..count).map(|i| i % 2 == 0).collect(),
            BitPattern::Repeat(unit) => unit.iter().copied().cycle().take(count).collect(),
            BitPattern::Blocks(run) => (0..count).map(|i| (i / run) % 2 == 0).collect(),
        }
    }
}

impl FromStr for BitPattern {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, CliError> {
        let invalid = || CliError::InvalidPattern(s.to_string());
        match s.split_once(':') {
            None => match s {
                "random" => Ok(BitPattern::Random),
                "alternating" => Ok(BitPattern::Alternating),
                _ => Err(invalid()),
            },
            Some(("pattern", bits)) => {
                if bits.is_empty() || !bits.chars().all(|c| c == '0' || c == '1') {
                    return Err(invalid());
                }
                Ok(BitPattern::Repeat(bits.chars().map(|c| c == '1').collect()))
            }
            Some(("blocks", run)) => match run.parse::<usize>() {
                Ok(run) if run > 0 => Ok(BitPattern::Blocks(run)),
                _ => Err(invalid()),
            },
            Some(_) => Err(invalid()),
        }
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitPattern::Random => f.write_str("random"),
            BitPattern::Alternating => f.write_str("alternating"),
            BitPattern::Repeat(unit) => {
                f.write_str("pattern:")?;
                for &bit in unit {
                    f.write_str(if bit { "1" } else { "0" })?;
                }
                Ok(())
            }
            BitPattern::Blocks(run) => write!(f, "blocks:{}", run),
        }
    }
}
