//! Snapshot container format.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Magic: "RAMBO\0\0\0" (8 bytes)   │
//! │ Version: u32 LE                  │
//! │ Checksum: CRC32 of payload, LE   │
//! ├──────────────────────────────────┤
//! │ Payload (fixed-order LE fields   │
//! │ from every component)            │
//! └──────────────────────────────────┘
//! ```
//!
//! The payload layout is defined by the `save_state` methods of the
//! components, composed in `EmulationState::snapshot`. Restores verify
//! magic, version, and checksum before touching any state, so a failed
//! restore leaves the machine unchanged.

mod error;

pub use error::SnapshotError;

use crc::{Crc, CRC_32_ISO_HDLC};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Container signature.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"RAMBO\0\0\0";

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Wrap a payload in the versioned, checksummed container.
#[must_use]
pub fn write_container(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + payload.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    out.extend_from_slice(&CRC32.checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate a container and return its payload.
///
/// # Errors
///
/// Returns the matching [`SnapshotError`] for a bad magic, an unknown
/// version, or a checksum mismatch.
pub fn read_container(data: &[u8]) -> Result<&[u8], SnapshotError> {
    if data.len() < 16 {
        return Err(SnapshotError::TruncatedData {
            needed: 16,
            available: data.len(),
        });
    }
    if &data[0..8] != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }

    let version = u32::from_le_bytes(data[8..12].try_into().unwrap_or_default());
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let expected = u32::from_le_bytes(data[12..16].try_into().unwrap_or_default());
    let payload = &data[16..];
    let actual = CRC32.checksum(payload);
    if expected != actual {
        return Err(SnapshotError::ChecksumMismatch { expected, actual });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = vec![1u8, 2, 3, 4, 5];
        let container = write_container(&payload);
        assert_eq!(read_container(&container).unwrap(), &payload[..]);
    }

    #[test]
    fn test_magic_rejected() {
        let mut container = write_container(&[1, 2, 3]);
        container[0] = b'X';
        assert!(matches!(
            read_container(&container),
            Err(SnapshotError::InvalidMagic)
        ));
    }

    #[test]
    fn test_version_rejected() {
        let mut container = write_container(&[1, 2, 3]);
        container[8] = 0xFF;
        assert!(matches!(
            read_container(&container),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_corruption_detected() {
        let mut container = write_container(&[1, 2, 3, 4]);
        let last = container.len() - 1;
        container[last] ^= 0x01;
        assert!(matches!(
            read_container(&container),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncation_detected() {
        let container = write_container(&[1, 2, 3, 4]);
        // Cut into the payload: the checksum no longer matches.
        let result = read_container(&container[..container.len() - 2]);
        assert!(matches!(
            result,
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
        // Cut into the header: outright truncated, with the diagnostics
        // carried along.
        assert!(matches!(
            read_container(&container[..10]),
            Err(SnapshotError::TruncatedData {
                needed: 16,
                available: 10,
            })
        ));
    }
}
