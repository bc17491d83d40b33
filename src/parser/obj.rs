//! Wavefront OBJ decoder
//!
//! Reads geometric vertices and polygonal faces. Texture coordinates and
//! normals referenced by faces become per-corner `uv` and `N` attributes.
//! Grouping, smoothing and material statements are accepted and ignored.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::{AttribLocation, MeshVariant, ParserConfig, Point, PointCloud, PolygonMesh};

const FORMAT: Format = Format::Obj;

/// Per-corner attribute names produced from `vt` and `vn` references
pub(crate) const UV_NAME: &str = "uv";
pub(crate) const NORMAL_NAME: &str = "N";

/// Statements that carry no geometry this decoder keeps
const IGNORED: &[&str] = &[
    "p", "l", "o", "g", "s", "usemtl", "mtllib", "vp", "mg", "lod", "bevel", "c_interp",
    "d_interp", "shadow_obj", "trace_obj",
];

/// One face corner: position index plus optional texture/normal indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Corner {
    v: usize,
    vt: Option<usize>,
    vn: Option<usize>,
}

#[derive(Debug, Default)]
struct ObjData {
    positions: Vec<Point>,
    uvs: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    faces: Vec<Vec<Corner>>,
}

/// Logical lines with `\` continuations joined, tagged with their first line number
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        let (start, mut acc) = pending.take().unwrap_or((i + 1, String::new()));
        match line.strip_suffix('\\') {
            Some(head) => {
                acc.push_str(head);
                acc.push(' ');
                pending = Some((start, acc));
            }
            None => {
                acc.push_str(line);
                out.push((start, acc));
            }
        }
    }
    out.extend(pending);
    out
}

fn floats<const N: usize>(
    line: usize,
    what: &str,
    tokens: &[&str],
    required: usize,
) -> Result<[f64; N]> {
    if tokens.len() < required {
        return Err(Error::parse_at(
            FORMAT,
            line,
            format!("'{}' needs at least {} values, found {}", what, required, tokens.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, tok) in out.iter_mut().zip(tokens) {
        *slot = tok
            .parse::<f64>()
            .map_err(|_| Error::parse_value(FORMAT, what, tok, "number").at_line(line))?;
    }
    Ok(out)
}

/// Resolve a 1-based or negative (relative) OBJ index against `len` items
fn resolve(line: usize, token: &str, what: &str, len: usize) -> Result<usize> {
    let raw: i64 = token
        .parse()
        .map_err(|_| Error::parse_value(FORMAT, what, token, "integer").at_line(line))?;
    let index = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(len as i64 + r).ok(),
    };
    match index {
        Some(i) if i < len => Ok(i),
        _ => Err(Error::parse_at(
            FORMAT,
            line,
            format!("{} index {} out of range ({} defined)", what, raw, len),
        )),
    }
}

fn parse_corner(line: usize, token: &str, data: &ObjData) -> Result<Corner> {
    let mut parts = token.split('/');
    let v = resolve(line, parts.next().unwrap_or_default(), "vertex", data.positions.len())?;
    let vt = match parts.next() {
        Some("") | None => None,
        Some(t) => Some(resolve(line, t, "texture coordinate", data.uvs.len())?),
    };
    let vn = match parts.next() {
        Some("") | None => None,
        Some(t) => Some(resolve(line, t, "normal", data.normals.len())?),
    };
    Ok(Corner { v, vt, vn })
}

/// Decode an OBJ file
pub fn parse(bytes: &[u8], config: &ParserConfig) -> Result<MeshVariant> {
    let text = String::from_utf8_lossy(bytes);
    let mut data = ObjData::default();
    let mut skipped = 0usize;

    for (line, content) in logical_lines(&text) {
        let content = match content.find('#') {
            Some(i) => &content[..i],
            None => content.as_str(),
        };
        let mut tokens = content.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        match keyword {
            "v" => data.positions.push(floats::<3>(line, "vertex", &args, 3)?),
            "vt" => {
                let [u, v] = floats::<2>(line, "texture coordinate", &args, 1)?;
                data.uvs.push([u as f32, v as f32]);
            }
            "vn" => {
                let [x, y, z] = floats::<3>(line, "normal", &args, 3)?;
                data.normals.push([x as f32, y as f32, z as f32]);
            }
            "f" | "fo" => {
                if args.len() < 3 {
                    return Err(Error::parse_at(
                        FORMAT,
                        line,
                        format!("face needs at least 3 vertices, found {}", args.len()),
                    ));
                }
                let face = args
                    .iter()
                    .map(|t| parse_corner(line, t, &data))
                    .collect::<Result<Vec<_>>>()?;
                data.faces.push(face);
            }
            k if IGNORED.contains(&k) => {}
            k if config.strict() => {
                return Err(Error::parse_at(FORMAT, line, format!("unknown statement '{}'", k)));
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(statements = skipped, "Skipped unknown OBJ statements");
    }

    build(data)
}

fn build(data: ObjData) -> Result<MeshVariant> {
    let ObjData {
        positions,
        uvs,
        normals,
        faces,
    } = data;

    if faces.is_empty() {
        if positions.is_empty() {
            return Ok(MeshVariant::None);
        }
        return Ok(MeshVariant::PointCloud(PointCloud::new(positions)));
    }

    let corners: Vec<Corner> = faces.iter().flatten().copied().collect();
    let indices = faces
        .iter()
        .map(|f| f.iter().map(|c| c.v).collect())
        .collect::<Vec<Vec<usize>>>();
    let mut mesh = PolygonMesh::new(positions, indices)?;

    if let Some(values) = per_corner(&corners, |c| c.vt, &uvs, UV_NAME) {
        mesh.attributes
            .add_numeric(AttribLocation::FaceVertex, UV_NAME, 2, values)?;
    }
    if let Some(values) = per_corner(&corners, |c| c.vn, &normals, NORMAL_NAME) {
        mesh.attributes
            .add_numeric(AttribLocation::FaceVertex, NORMAL_NAME, 3, values)?;
    }
    Ok(MeshVariant::PolygonMesh(mesh))
}

/// Flatten referenced tuples per corner; `None` unless every corner has one
fn per_corner<const N: usize>(
    corners: &[Corner],
    index: impl Fn(&Corner) -> Option<usize>,
    table: &[[f32; N]],
    name: &str,
) -> Option<Vec<f32>> {
    let referenced = corners.iter().filter(|&c| index(c).is_some()).count();
    if referenced == 0 {
        return None;
    }
    if referenced < corners.len() {
        warn!(
            attribute = name,
            referenced,
            corners = corners.len(),
            "Only some face corners reference this attribute; dropped"
        );
        return None;
    }
    let mut out = Vec::with_capacity(corners.len() * N);
    for c in corners {
        out.extend_from_slice(&table[index(c)?]);
    }
    Some(out)
}
