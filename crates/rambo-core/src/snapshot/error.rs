//! Snapshot error types.

use thiserror::Error;

/// Snapshot restore failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Container does not start with the RAMBO signature.
    #[error("invalid snapshot magic")]
    InvalidMagic,

    /// Snapshot written by an incompatible format version.
    #[error("unsupported snapshot version: {0} (current: {CURRENT_VERSION})")]
    UnsupportedVersion(u32),

    /// Payload checksum does not match (corruption or truncation).
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the container.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },

    /// Payload ended before all component state was read.
    #[error("snapshot data truncated: need {needed} bytes, got {available}")]
    TruncatedData {
        /// Bytes the decoder needed to proceed.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// Snapshot carries cartridge state but the loaded cartridge differs
    /// (or none is loaded).
    #[error("snapshot cartridge does not match the loaded cartridge")]
    CartridgeMismatch,
}

const CURRENT_VERSION: u32 = super::SNAPSHOT_VERSION;
