///! Whole-file encode/decode for hierarchy files

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use super::crc::{self, Digest, FOOTER_SIZE};
use super::header::{read_header, Header, LevelEntry, HEADER_SIZE};
use super::records::{
    encode_edge, encode_geometry, encode_names, encode_vertex, read_geometry, read_level,
    read_names, EDGE_RECORD_SIZE, GEOMETRY_POINT_SIZE, VERTEX_RECORD_SIZE,
};
use crate::error::FormatError;
use crate::graph::{HighwayHierarchyGraph, Level, MAX_LEVELS};

/// Smallest read chunk used when streaming a file in
const MIN_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Read buffer size for the single sequential load
    pub cache_size_bytes: usize,
    pub verify_checksum: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cache_size_bytes: 4 * 1024 * 1024,
            verify_checksum: true,
        }
    }
}

pub struct GraphFile;

impl GraphFile {
    /// Serialize a graph, stamped with the current time
    pub fn encode(graph: &HighwayHierarchyGraph) -> Vec<u8> {
        Self::encode_at(graph, chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn encode_at(graph: &HighwayHierarchyGraph, created_unix: u64) -> Vec<u8> {
        let mut levels = [LevelEntry::default(); MAX_LEVELS];
        let mut cursor = HEADER_SIZE as u64;
        for (entry, lg) in levels.iter_mut().zip(graph.levels()) {
            *entry = LevelEntry {
                vertex_count: lg.vertices().len() as u32,
                edge_count: lg.edges().len() as u32,
                body_offset: cursor,
            };
            cursor += lg.vertices().len() as u64 * VERTEX_RECORD_SIZE as u64
                + lg.edges().len() as u64 * EDGE_RECORD_SIZE as u64;
        }

        let mut names = Vec::new();
        encode_names(graph.names(), &mut names);
        let geometry_offset = cursor;
        let names_offset =
            geometry_offset + graph.geometry().len() as u64 * GEOMETRY_POINT_SIZE as u64;

        let header = Header {
            n_levels: graph.level_count() as u16,
            created_unix,
            bbox: graph.bounding_box(),
            geometry_offset,
            geometry_points: graph.geometry().len() as u64,
            names_offset,
            names_bytes: names.len() as u64,
            levels,
        };

        let total = names_offset as usize + names.len() + FOOTER_SIZE;
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&header.to_bytes());
        for lg in graph.levels() {
            for v in lg.vertices() {
                encode_vertex(v, &mut buf);
            }
            for e in lg.edges() {
                encode_edge(e, &mut buf);
            }
        }
        encode_geometry(graph.geometry(), &mut buf);
        buf.extend_from_slice(&names);
        crc::append_footer(&mut buf);
        debug_assert_eq!(buf.len(), total);
        buf
    }

    pub fn write<P: AsRef<Path>>(path: P, graph: &HighwayHierarchyGraph) -> Result<(), FormatError> {
        let bytes = Self::encode(graph);
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        tracing::debug!(
            path = %path.as_ref().display(),
            bytes = bytes.len(),
            "wrote hierarchy file"
        );
        Ok(())
    }

    /// Decode an in-memory file image, verifying the checksum
    pub fn decode(bytes: &[u8]) -> Result<HighwayHierarchyGraph, FormatError> {
        let body = bytes.len().saturating_sub(FOOTER_SIZE);
        Self::decode_with(bytes, Some(crc::checksum(&bytes[..body])))
    }

    /// `computed` is the checksum of everything before the footer, or `None`
    /// to skip verification.
    fn decode_with(bytes: &[u8], computed: Option<u64>) -> Result<HighwayHierarchyGraph, FormatError> {
        let header = read_header(bytes)?;
        if let Some(computed) = computed {
            crc::verify_footer(bytes, computed)?;
        }

        let levels = (0..header.n_levels)
            .map(|k| read_level(bytes, &header, k as Level))
            .collect::<Result<Vec<_>, _>>()?;
        let geometry = read_geometry(bytes, &header);
        let names = read_names(bytes, &header)?;

        Ok(HighwayHierarchyGraph::from_levels(levels, geometry, names)?)
    }

    /// Read a file with one sequential pass, `cache_size_bytes` at a time.
    pub fn read<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<HighwayHierarchyGraph, FormatError> {
        let start = Instant::now();
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        let body_end = len.saturating_sub(FOOTER_SIZE);

        let chunk = options.cache_size_bytes.max(MIN_CHUNK);
        let mut bytes = vec![0u8; len];
        let mut digest = Digest::new();
        let mut pos = 0;
        while pos < len {
            let end = (pos + chunk).min(len);
            file.read_exact(&mut bytes[pos..end])?;
            if pos < body_end {
                digest.update(&bytes[pos..end.min(body_end)]);
            }
            pos = end;
        }

        let computed = options.verify_checksum.then(|| digest.finalize());
        let graph = Self::decode_with(&bytes, computed)?;
        tracing::debug!(
            path = %path.display(),
            bytes = len,
            levels = graph.level_count(),
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded hierarchy file"
        );
        Ok(graph)
    }

    /// Header only, for inspection
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header, FormatError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        read_header(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{HierarchyBuilder, InputEdge};
    use skyway_common::Coordinate;

    fn sample_graph() -> HighwayHierarchyGraph {
        let mut b = HierarchyBuilder::new();
        for i in 0..4 {
            b.add_vertex(Coordinate::from_fixed(100 * i, -100 * i));
        }
        b.add_two_way(InputEdge::new(0, 1, 5).named("A").with_waypoints(vec![Coordinate::from_fixed(50, -50)]));
        b.add_two_way(InputEdge::new(1, 2, 6).with_ref("R1"));
        b.add_two_way(InputEdge::new(2, 3, 7).motorway_link());
        b.with_levels(vec![0, 1, 0, 1]).build().unwrap().graph
    }

    #[test]
    fn test_encode_decode_preserves_graph() {
        let graph = sample_graph();
        let bytes = GraphFile::encode_at(&graph, 42);
        let decoded = GraphFile::decode(&bytes).unwrap();

        assert_eq!(decoded.level_count(), graph.level_count());
        assert!(decoded.vertices().eq(graph.vertices()));
        assert!(decoded.edges().eq(graph.edges()));
        assert_eq!(decoded.geometry(), graph.geometry());
        assert_eq!(decoded.names(), graph.names());
        assert_eq!(decoded.bounding_box(), graph.bounding_box());
    }

    #[test]
    fn test_decode_detects_bit_flip() {
        let mut bytes = GraphFile::encode_at(&sample_graph(), 42);
        let mid = HEADER_SIZE + 3;
        bytes[mid] ^= 0x01;
        assert!(matches!(
            GraphFile::decode(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert!(matches!(
            GraphFile::decode(&[]),
            Err(FormatError::TruncatedFile { .. })
        ));
    }
}
