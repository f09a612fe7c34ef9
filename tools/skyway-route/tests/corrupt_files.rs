mod common;

use common::{toy, write_temp};
use skyway_route::formats::{crc, HEADER_SIZE};
use skyway_route::{FormatError, GraphFile, LoadOptions, OpenError, Router};

fn encoded() -> Vec<u8> {
    GraphFile::encode_at(&toy().graph, 1_700_000_000)
}

/// Recompute the footer after an edit
fn reseal(bytes: &mut Vec<u8>) {
    bytes.truncate(bytes.len() - crc::FOOTER_SIZE);
    crc::append_footer(bytes);
}

#[test]
fn test_bad_magic() {
    let mut bytes = encoded();
    bytes[0] ^= 0xFF;
    assert!(matches!(GraphFile::decode(&bytes), Err(FormatError::BadMagic { .. })));
}

#[test]
fn test_version_mismatch() {
    let mut bytes = encoded();
    bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
    assert!(matches!(
        GraphFile::decode(&bytes),
        Err(FormatError::VersionMismatch { expected: 1, found: 2 })
    ));
}

#[test]
fn test_truncated() {
    let bytes = encoded();
    assert!(matches!(
        GraphFile::decode(&bytes[..100]),
        Err(FormatError::TruncatedFile { .. })
    ));
    assert!(matches!(
        GraphFile::decode(&bytes[..bytes.len() - 20]),
        Err(FormatError::OffsetOutOfBounds { .. } | FormatError::InconsistentCounts(_))
    ));
}

#[test]
fn test_level_offset_out_of_bounds() {
    let mut bytes = encoded();
    // level 0 entry: vertex_count u32, edge_count u32, body_offset u64 at 64
    bytes[72..80].copy_from_slice(&u64::MAX.to_le_bytes());
    assert!(matches!(
        GraphFile::decode(&bytes),
        Err(FormatError::OffsetOutOfBounds { section: "level body", .. })
    ));
}

#[test]
fn test_inflated_edge_count() {
    let mut bytes = encoded();
    bytes[68..72].copy_from_slice(&1_000u32.to_le_bytes());
    assert!(matches!(
        GraphFile::decode(&bytes),
        Err(FormatError::OffsetOutOfBounds { .. } | FormatError::InconsistentCounts(_))
    ));
}

#[test]
fn test_checksum_mismatch() {
    let mut bytes = encoded();
    // first vertex latitude
    bytes[HEADER_SIZE] ^= 0x01;
    assert!(matches!(
        GraphFile::decode(&bytes),
        Err(FormatError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_invalid_edge_record() {
    let mut bytes = encoded();
    // level 0 has four vertices, so its edge table starts 64 bytes in
    let first_edge = HEADER_SIZE + 4 * 16;
    bytes[first_edge..first_edge + 4].copy_from_slice(&999u32.to_le_bytes());
    reseal(&mut bytes);
    assert!(matches!(
        GraphFile::decode(&bytes),
        Err(FormatError::InvalidRecord { section: "edge", index: 0, .. })
    ));
}

#[test]
fn test_skip_checksum_on_request() {
    let mut bytes = encoded();
    let len = bytes.len();
    bytes[len - 1] ^= 0xFF;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.hh");
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        GraphFile::read(&path, &LoadOptions::default()),
        Err(FormatError::ChecksumMismatch { .. })
    ));
    let options = LoadOptions {
        verify_checksum: false,
        ..Default::default()
    };
    assert_eq!(GraphFile::read(&path, &options).unwrap().vertex_count(), 6);
}

#[test]
fn test_router_open_reports_format_error() {
    let (_dir, path) = write_temp(&toy().graph);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = b'X';
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Router::open(&path, 4096),
        Err(OpenError::Format(FormatError::BadMagic { .. }))
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Router::open(dir.path().join("absent.hh"), 4096),
        Err(OpenError::Format(FormatError::Io(_)))
    ));
}
