use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhyError {
    /// No correlation peak was confirmed anywhere in the scanned samples.
    #[error("Failed to detect preamble")]
    SynchronizationFailure,

    /// The capture ended before the frame's data region was complete.
    #[error("Insufficient samples: frame at {start} needs {needed} samples, only {available} available")]
    InsufficientSamples {
        start: usize,
        needed: usize,
        available: usize,
    },

    #[error("CRC mismatch: received {received:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { received: u8, computed: u8 },

    #[error("Invalid frame size: expected {expected} bits, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("Invalid input size: expected {expected}, got {actual}")]
    InvalidInputSize { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT error: {0}")]
    FftError(String),
}

pub type Result<T> = std::result::Result<T, PhyError>;
