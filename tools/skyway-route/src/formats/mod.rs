//! Binary hierarchy file format
//!
//! Layout: fixed header, one body per level (vertex table then edge table),
//! shared geometry pool, shared string table, CRC-64 footer. All integers
//! are little-endian.

pub mod crc;
pub mod graph_file;
pub mod header;
pub mod records;

pub use graph_file::{GraphFile, LoadOptions};
pub use header::{read_header, Header, LevelEntry, HEADER_SIZE, MAGIC, VERSION};
pub use records::{read_geometry, read_level, read_names};

// Fixed-width readers. Callers bounds-check the section first.

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&bytes[at..at + 2]);
    u16::from_le_bytes(b)
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn le_i32(bytes: &[u8], at: usize) -> i32 {
    le_u32(bytes, at) as i32
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(b)
}
