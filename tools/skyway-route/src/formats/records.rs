///! Fixed-size vertex/edge records and the shared pools

use skyway_common::Coordinate;

use super::header::Header;
use super::{le_i32, le_u16, le_u32};
use crate::error::{FormatError, GraphError};
use crate::graph::{Edge, EdgeFlags, Level, LevelGraph, Vertex, VertexId, Waypoints};

pub const VERTEX_RECORD_SIZE: usize = 16;
pub const EDGE_RECORD_SIZE: usize = 40;
pub const GEOMETRY_POINT_SIZE: usize = 8;

/// Sentinel for absent ids (bypass, name, ref)
const NONE: u32 = u32::MAX;

pub fn encode_vertex(v: &Vertex, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.coordinate.lat_fxp.to_le_bytes());
    out.extend_from_slice(&v.coordinate.lon_fxp.to_le_bytes());
    out.extend_from_slice(&v.neighborhood_radius.to_le_bytes());
    out.push(v.level);
    out.extend_from_slice(&[0u8; 3]);
}

pub fn encode_edge(e: &Edge, out: &mut Vec<u8>) {
    let [bypass_a, bypass_b] = e.bypassed.unwrap_or([NONE, NONE]);
    out.extend_from_slice(&e.source.to_le_bytes());
    out.extend_from_slice(&e.target.to_le_bytes());
    out.extend_from_slice(&e.weight.to_le_bytes());
    out.extend_from_slice(&bypass_a.to_le_bytes());
    out.extend_from_slice(&bypass_b.to_le_bytes());
    out.extend_from_slice(&e.waypoints.offset.to_le_bytes());
    out.extend_from_slice(&e.waypoints.len.to_le_bytes());
    out.push(e.level);
    out.push(e.flags.bits());
    out.extend_from_slice(&e.name.unwrap_or(NONE).to_le_bytes());
    out.extend_from_slice(&e.reference.unwrap_or(NONE).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
}

fn optional(id: u32) -> Option<u32> {
    (id != NONE).then_some(id)
}

fn invalid(section: &'static str, index: u64, reason: String) -> FormatError {
    FormatError::InvalidRecord {
        section,
        index,
        reason,
    }
}

/// Decode level `level`'s slice into a [`LevelGraph`].
///
/// The header must come from [`super::read_header`] on the same bytes, which
/// guarantees the slice lies inside the file.
pub fn read_level(bytes: &[u8], header: &Header, level: Level) -> Result<LevelGraph, FormatError> {
    let entry = header
        .level_entries()
        .get(level as usize)
        .ok_or(GraphError::LevelOutOfRange {
            level,
            count: header.n_levels as usize,
        })?;
    let first_vertex = header.first_vertex(level as usize) as VertexId;
    let first_edge = header.first_edge(level as usize) as u32;
    let vertex_end = header.vertex_count() as VertexId;

    let mut vertices = Vec::with_capacity(entry.vertex_count as usize);
    for i in 0..entry.vertex_count {
        let at = entry.body_offset as usize + i as usize * VERTEX_RECORD_SIZE;
        let id = first_vertex + i;
        let record_level = bytes[at + 12];
        if record_level != level {
            return Err(invalid(
                "vertex",
                id as u64,
                format!("level byte {record_level} in level {level} slice"),
            ));
        }
        vertices.push(Vertex {
            id,
            coordinate: Coordinate::from_fixed(le_i32(bytes, at), le_i32(bytes, at + 4)),
            level,
            neighborhood_radius: le_u32(bytes, at + 8),
        });
    }

    let table = entry.edge_table_offset() as usize;
    let mut edges = Vec::with_capacity(entry.edge_count as usize);
    for i in 0..entry.edge_count {
        let at = table + i as usize * EDGE_RECORD_SIZE;
        edges.push(decode_edge(
            &bytes[at..at + EDGE_RECORD_SIZE],
            first_edge + i,
            level,
            first_vertex..vertex_end,
            header.geometry_points,
        )?);
    }

    Ok(LevelGraph::new(
        level,
        first_vertex,
        vertex_end,
        first_edge,
        vertices,
        edges,
    )?)
}

fn decode_edge(
    rec: &[u8],
    id: u32,
    level: Level,
    endpoints: std::ops::Range<VertexId>,
    geometry_points: u64,
) -> Result<Edge, FormatError> {
    let index = id as u64;
    let source = le_u32(rec, 0);
    let target = le_u32(rec, 4);
    if !endpoints.contains(&source) || !endpoints.contains(&target) {
        return Err(invalid(
            "edge",
            index,
            format!("endpoints {source} -> {target} outside {endpoints:?}"),
        ));
    }

    let record_level = rec[26];
    if record_level != level {
        return Err(invalid(
            "edge",
            index,
            format!("level byte {record_level} in level {level} slice"),
        ));
    }
    let flags = EdgeFlags::from_bits(rec[27])
        .ok_or_else(|| invalid("edge", index, format!("unknown flag bits {:#04x}", rec[27])))?;

    let bypassed = match (optional(le_u32(rec, 12)), optional(le_u32(rec, 16))) {
        (Some(a), Some(b)) => Some([a, b]),
        (None, None) => None,
        _ => return Err(invalid("edge", index, "half-specified bypass pair".to_string())),
    };
    if bypassed.is_some() != flags.contains(EdgeFlags::SHORTCUT) {
        return Err(invalid(
            "edge",
            index,
            "shortcut flag disagrees with bypass ids".to_string(),
        ));
    }

    let waypoints = Waypoints {
        offset: le_u32(rec, 20),
        len: le_u16(rec, 24),
    };
    if waypoints.end() > geometry_points {
        return Err(FormatError::OffsetOutOfBounds {
            section: "edge waypoints",
            offset: waypoints.offset as u64,
            len: waypoints.len as u64,
            limit: geometry_points,
        });
    }

    Ok(Edge {
        id,
        source,
        target,
        weight: le_u32(rec, 8),
        level,
        flags,
        bypassed,
        waypoints,
        name: optional(le_u32(rec, 28)),
        reference: optional(le_u32(rec, 32)),
    })
}

pub fn encode_geometry(points: &[Coordinate], out: &mut Vec<u8>) {
    for p in points {
        out.extend_from_slice(&p.lat_fxp.to_le_bytes());
        out.extend_from_slice(&p.lon_fxp.to_le_bytes());
    }
}

pub fn read_geometry(bytes: &[u8], header: &Header) -> Vec<Coordinate> {
    let start = header.geometry_offset as usize;
    (0..header.geometry_points as usize)
        .map(|i| {
            let at = start + i * GEOMETRY_POINT_SIZE;
            Coordinate::from_fixed(le_i32(bytes, at), le_i32(bytes, at + 4))
        })
        .collect()
}

/// String table: count, (offset, len) pairs relative to the text block, text
pub fn encode_names(names: &[String], out: &mut Vec<u8>) {
    out.extend_from_slice(&(names.len() as u32).to_le_bytes());
    let mut offset = 0u32;
    for name in names {
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        offset += name.len() as u32;
    }
    for name in names {
        out.extend_from_slice(name.as_bytes());
    }
}

pub fn read_names(bytes: &[u8], header: &Header) -> Result<Vec<String>, FormatError> {
    if header.names_bytes == 0 {
        return Ok(Vec::new());
    }
    let start = header.names_offset as usize;
    let table = &bytes[start..start + header.names_bytes as usize];
    if table.len() < 4 {
        return Err(FormatError::InconsistentCounts(
            "string table shorter than its count".to_string(),
        ));
    }

    let count = le_u32(table, 0) as usize;
    let index_end = count
        .checked_mul(8)
        .and_then(|n| n.checked_add(4))
        .filter(|&end| end <= table.len())
        .ok_or_else(|| {
            FormatError::InconsistentCounts(format!(
                "string table of {} bytes cannot index {count} strings",
                table.len()
            ))
        })?;
    let text = &table[index_end..];

    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let offset = le_u32(table, 4 + i * 8) as u64;
        let len = le_u32(table, 8 + i * 8) as u64;
        if offset + len > text.len() as u64 {
            return Err(FormatError::OffsetOutOfBounds {
                section: "string",
                offset,
                len,
                limit: text.len() as u64,
            });
        }
        let raw = &text[offset as usize..(offset + len) as usize];
        let s = std::str::from_utf8(raw)
            .map_err(|e| invalid("string", i as u64, e.to_string()))?;
        names.push(s.to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::header::LevelEntry;
    use crate::graph::MAX_LEVELS;
    use skyway_common::BoundingBox;

    fn sample_edge() -> Edge {
        Edge {
            id: 0,
            source: 0,
            target: 1,
            weight: 42,
            level: 0,
            flags: EdgeFlags::ROUNDABOUT,
            bypassed: None,
            waypoints: Waypoints { offset: 0, len: 2 },
            name: Some(0),
            reference: None,
        }
    }

    #[test]
    fn test_record_sizes() {
        let mut buf = Vec::new();
        encode_vertex(&Vertex::default(), &mut buf);
        assert_eq!(buf.len(), VERTEX_RECORD_SIZE);

        buf.clear();
        encode_edge(&sample_edge(), &mut buf);
        assert_eq!(buf.len(), EDGE_RECORD_SIZE);
    }

    #[test]
    fn test_edge_decode_checks() {
        let mut rec = Vec::new();
        encode_edge(&sample_edge(), &mut rec);
        let edge = decode_edge(&rec, 0, 0, 0..2, 2).unwrap();
        assert_eq!(edge, sample_edge());

        // Waypoints past the geometry pool
        assert!(matches!(
            decode_edge(&rec, 0, 0, 0..2, 1),
            Err(FormatError::OffsetOutOfBounds { .. })
        ));
        // Target outside the level's vertex range
        assert!(matches!(
            decode_edge(&rec, 0, 0, 0..1, 2),
            Err(FormatError::InvalidRecord { section: "edge", .. })
        ));

        // Shortcut bit without bypass ids
        let mut flagged = rec.clone();
        flagged[27] |= EdgeFlags::SHORTCUT.bits();
        assert!(matches!(
            decode_edge(&flagged, 0, 0, 0..2, 2),
            Err(FormatError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_names_table() {
        let names = vec!["Chaussée de Wavre".to_string(), String::new(), "E40".to_string()];
        let mut buf = Vec::new();
        encode_names(&names, &mut buf);

        let header = Header {
            n_levels: 1,
            created_unix: 0,
            bbox: BoundingBox::empty(),
            geometry_offset: 0,
            geometry_points: 0,
            names_offset: 0,
            names_bytes: buf.len() as u64,
            levels: [LevelEntry::default(); MAX_LEVELS],
        };
        assert_eq!(read_names(&buf, &header).unwrap(), names);

        // Corrupt the first length so it runs past the text block
        buf[8..12].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            read_names(&buf, &header),
            Err(FormatError::OffsetOutOfBounds { section: "string", .. })
        ));
    }
}
