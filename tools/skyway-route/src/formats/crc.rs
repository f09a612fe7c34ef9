///! CRC-64 footer handling for hierarchy files

use crc::{Crc, CRC_64_GO_ISO};

use crate::error::FormatError;

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Footer width: one little-endian CRC-64
pub const FOOTER_SIZE: usize = 8;

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 over a file streamed in chunks
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Append the checksum of everything written so far
pub fn append_footer(buf: &mut Vec<u8>) {
    let crc = checksum(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Compare the stored footer against a checksum of the preceding bytes
pub fn verify_footer(bytes: &[u8], computed: u64) -> Result<(), FormatError> {
    let stored = stored_footer(bytes)?;
    if stored != computed {
        return Err(FormatError::ChecksumMismatch { stored, computed });
    }
    Ok(())
}

pub fn stored_footer(bytes: &[u8]) -> Result<u64, FormatError> {
    let start = bytes
        .len()
        .checked_sub(FOOTER_SIZE)
        .ok_or(FormatError::TruncatedFile {
            needed: FOOTER_SIZE as u64,
            found: bytes.len() as u64,
        })?;
    let mut footer = [0u8; FOOTER_SIZE];
    footer.copy_from_slice(&bytes[start..]);
    Ok(u64::from_le_bytes(footer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_oneshot() {
        let data = b"highway hierarchy";
        let mut digest = Digest::new();
        digest.update(&data[..7]);
        digest.update(&data[7..]);
        assert_eq!(digest.finalize(), checksum(data));
    }

    #[test]
    fn test_footer_roundtrip_and_tamper() {
        let mut buf = b"level slices".to_vec();
        append_footer(&mut buf);
        let body = buf.len() - FOOTER_SIZE;
        assert!(verify_footer(&buf, checksum(&buf[..body])).is_ok());

        buf[0] ^= 0xff;
        assert!(matches!(
            verify_footer(&buf, checksum(&buf[..body])),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_footer_on_short_input() {
        assert!(matches!(
            stored_footer(&[1, 2, 3]),
            Err(FormatError::TruncatedFile { needed: 8, found: 3 })
        ));
    }
}
