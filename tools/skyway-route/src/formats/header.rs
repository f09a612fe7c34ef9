///! Hierarchy file header: magic, version, level table and section offsets

use chrono::{DateTime, Utc};
use skyway_common::BoundingBox;

use super::crc::FOOTER_SIZE;
use super::records::{EDGE_RECORD_SIZE, GEOMETRY_POINT_SIZE, VERTEX_RECORD_SIZE};
use super::{le_i32, le_u16, le_u32, le_u64};
use crate::error::FormatError;
use crate::graph::MAX_LEVELS;

pub const MAGIC: u32 = 0x4848_4746; // "HHGF"
pub const VERSION: u16 = 1;

const LEVEL_ENTRY_SIZE: usize = 16;
const LEVEL_TABLE_OFFSET: usize = 64;
pub const HEADER_SIZE: usize = LEVEL_TABLE_OFFSET + MAX_LEVELS * LEVEL_ENTRY_SIZE; // 320

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelEntry {
    pub vertex_count: u32,
    pub edge_count: u32,
    pub body_offset: u64,
}

impl LevelEntry {
    /// Byte length of the vertex table followed by the edge table
    pub fn body_len(&self) -> Option<u64> {
        let vertices = (self.vertex_count as u64).checked_mul(VERTEX_RECORD_SIZE as u64)?;
        let edges = (self.edge_count as u64).checked_mul(EDGE_RECORD_SIZE as u64)?;
        vertices.checked_add(edges)
    }

    pub fn edge_table_offset(&self) -> u64 {
        self.body_offset + self.vertex_count as u64 * VERTEX_RECORD_SIZE as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub n_levels: u16,
    pub created_unix: u64,
    pub bbox: BoundingBox,
    pub geometry_offset: u64,
    pub geometry_points: u64,
    pub names_offset: u64,
    pub names_bytes: u64,
    pub levels: [LevelEntry; MAX_LEVELS],
}

impl Header {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&self.n_levels.to_le_bytes());
        bytes.extend_from_slice(&self.created_unix.to_le_bytes());
        bytes.extend_from_slice(&self.bbox.min_lat.to_le_bytes());
        bytes.extend_from_slice(&self.bbox.min_lon.to_le_bytes());
        bytes.extend_from_slice(&self.bbox.max_lat.to_le_bytes());
        bytes.extend_from_slice(&self.bbox.max_lon.to_le_bytes());
        bytes.extend_from_slice(&self.geometry_offset.to_le_bytes());
        bytes.extend_from_slice(&self.geometry_points.to_le_bytes());
        bytes.extend_from_slice(&self.names_offset.to_le_bytes());
        bytes.extend_from_slice(&self.names_bytes.to_le_bytes());
        for entry in &self.levels {
            bytes.extend_from_slice(&entry.vertex_count.to_le_bytes());
            bytes.extend_from_slice(&entry.edge_count.to_le_bytes());
            bytes.extend_from_slice(&entry.body_offset.to_le_bytes());
        }
        debug_assert_eq!(bytes.len(), HEADER_SIZE);
        bytes
    }

    /// Entries for the levels actually present
    pub fn level_entries(&self) -> &[LevelEntry] {
        &self.levels[..self.n_levels as usize]
    }

    pub fn vertex_count(&self) -> u64 {
        self.level_entries().iter().map(|e| e.vertex_count as u64).sum()
    }

    pub fn edge_count(&self) -> u64 {
        self.level_entries().iter().map(|e| e.edge_count as u64).sum()
    }

    /// Global id of the first vertex stored in `level`'s slice
    pub fn first_vertex(&self, level: usize) -> u64 {
        self.levels[..level].iter().map(|e| e.vertex_count as u64).sum()
    }

    pub fn first_edge(&self, level: usize) -> u64 {
        self.levels[..level].iter().map(|e| e.edge_count as u64).sum()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.created_unix).ok()?, 0)
    }
}

/// Decode and validate the header against the full file length.
///
/// Checks run in order: size, magic, version, level count, then section
/// bounds. The sections must tile the body exactly: every level body, then
/// the geometry pool, then the string table, then the footer.
pub fn read_header(bytes: &[u8]) -> Result<Header, FormatError> {
    let needed = (HEADER_SIZE + FOOTER_SIZE) as u64;
    if (bytes.len() as u64) < needed {
        return Err(FormatError::TruncatedFile {
            needed,
            found: bytes.len() as u64,
        });
    }

    let magic = le_u32(bytes, 0);
    if magic != MAGIC {
        return Err(FormatError::BadMagic { found: magic });
    }
    let version = le_u16(bytes, 4);
    if version != VERSION {
        return Err(FormatError::VersionMismatch {
            expected: VERSION,
            found: version,
        });
    }
    let n_levels = le_u16(bytes, 6);
    if n_levels == 0 || n_levels as usize > MAX_LEVELS {
        return Err(FormatError::InconsistentCounts(format!(
            "level count {n_levels} not in 1..={MAX_LEVELS}"
        )));
    }

    let mut levels = [LevelEntry::default(); MAX_LEVELS];
    for (k, entry) in levels.iter_mut().enumerate() {
        let at = LEVEL_TABLE_OFFSET + k * LEVEL_ENTRY_SIZE;
        *entry = LevelEntry {
            vertex_count: le_u32(bytes, at),
            edge_count: le_u32(bytes, at + 4),
            body_offset: le_u64(bytes, at + 8),
        };
    }

    let header = Header {
        n_levels,
        created_unix: le_u64(bytes, 8),
        bbox: BoundingBox {
            min_lat: le_i32(bytes, 16),
            min_lon: le_i32(bytes, 20),
            max_lat: le_i32(bytes, 24),
            max_lon: le_i32(bytes, 28),
        },
        geometry_offset: le_u64(bytes, 32),
        geometry_points: le_u64(bytes, 40),
        names_offset: le_u64(bytes, 48),
        names_bytes: le_u64(bytes, 56),
        levels,
    };

    validate_layout(&header, (bytes.len() - FOOTER_SIZE) as u64)?;
    Ok(header)
}

fn validate_layout(header: &Header, body_end: u64) -> Result<(), FormatError> {
    let mut cursor = HEADER_SIZE as u64;
    let mut place = |section: &'static str, offset: u64, len: Option<u64>| {
        let end = len.and_then(|l| offset.checked_add(l));
        match end {
            Some(end) if end <= body_end => {}
            _ => {
                return Err(FormatError::OffsetOutOfBounds {
                    section,
                    offset,
                    len: len.unwrap_or(u64::MAX),
                    limit: body_end,
                })
            }
        }
        if offset != cursor {
            return Err(FormatError::InconsistentCounts(format!(
                "{section} starts at {offset}, expected {cursor}"
            )));
        }
        cursor = end.unwrap_or(cursor);
        Ok(())
    };

    for entry in header.level_entries() {
        place("level body", entry.body_offset, entry.body_len())?;
    }
    place(
        "geometry pool",
        header.geometry_offset,
        header.geometry_points.checked_mul(GEOMETRY_POINT_SIZE as u64),
    )?;
    place("string table", header.names_offset, Some(header.names_bytes))?;
    if cursor != body_end {
        return Err(FormatError::InconsistentCounts(format!(
            "{} unaccounted bytes before the footer",
            body_end - cursor
        )));
    }

    if header.levels[header.n_levels as usize..]
        .iter()
        .any(|e| *e != LevelEntry::default())
    {
        return Err(FormatError::InconsistentCounts(
            "unused level entries must be zero".to_string(),
        ));
    }
    if header.vertex_count() > u32::MAX as u64 || header.edge_count() > u32::MAX as u64 {
        return Err(FormatError::InconsistentCounts(format!(
            "{} vertices / {} edges exceed 32-bit ids",
            header.vertex_count(),
            header.edge_count()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One level with two vertices and one edge, empty pools
    fn sample() -> (Header, Vec<u8>) {
        let mut levels = [LevelEntry::default(); MAX_LEVELS];
        levels[0] = LevelEntry {
            vertex_count: 2,
            edge_count: 1,
            body_offset: HEADER_SIZE as u64,
        };
        let body = 2 * VERTEX_RECORD_SIZE + EDGE_RECORD_SIZE;
        let pools = (HEADER_SIZE + body) as u64;
        let header = Header {
            n_levels: 1,
            created_unix: 1_700_000_000,
            bbox: BoundingBox::empty(),
            geometry_offset: pools,
            geometry_points: 0,
            names_offset: pools,
            names_bytes: 0,
            levels,
        };
        let mut bytes = header.to_bytes();
        bytes.resize(HEADER_SIZE + body + FOOTER_SIZE, 0);
        (header, bytes)
    }

    #[test]
    fn test_header_roundtrip() {
        let (header, bytes) = sample();
        assert_eq!(header.to_bytes().len(), HEADER_SIZE);
        let parsed = read_header(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.vertex_count(), 2);
        assert_eq!(parsed.first_edge(1), 1);
        assert_eq!(
            parsed.created().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let (_, mut bytes) = sample();
        bytes[0] = b'X';
        assert!(matches!(read_header(&bytes), Err(FormatError::BadMagic { .. })));

        let (_, mut bytes) = sample();
        bytes[4..6].copy_from_slice(&(VERSION + 1).to_le_bytes());
        assert!(matches!(
            read_header(&bytes),
            Err(FormatError::VersionMismatch { expected: VERSION, found }) if found == VERSION + 1
        ));
    }

    #[test]
    fn test_rejects_truncation() {
        let (_, bytes) = sample();
        assert!(matches!(
            read_header(&bytes[..100]),
            Err(FormatError::TruncatedFile { .. })
        ));
        // Header intact but body cut short
        assert!(matches!(
            read_header(&bytes[..bytes.len() - 10]),
            Err(FormatError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_overlapping_sections() {
        let (mut header, mut bytes) = sample();
        header.geometry_offset -= 8;
        bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        assert!(matches!(
            read_header(&bytes),
            Err(FormatError::InconsistentCounts(_))
        ));
    }

    #[test]
    fn test_rejects_huge_counts() {
        let (mut header, mut bytes) = sample();
        header.levels[0].edge_count = u32::MAX;
        bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        assert!(matches!(
            read_header(&bytes),
            Err(FormatError::OffsetOutOfBounds { section: "level body", .. })
        ));
    }
}
