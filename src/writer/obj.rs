//! Wavefront OBJ encoder
//!
//! Emits `v` lines for every point and 1-based `f` lines for every face.
//! Per-corner `uv` (2 components) and `N` (3 components) attributes are
//! written as `vt`/`vn` lines, one per corner.

use std::io::Write;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AttribLocation, Attribute, MeshVariant, PolygonMesh};
use crate::parser::obj::{NORMAL_NAME, UV_NAME};
use crate::validator::{report_unwritten, writable_attributes};

/// Encode a point cloud or polygon mesh as OBJ text
pub fn write(mesh: &MeshVariant) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    writeln!(out, "# Written by meshbridge")?;
    match mesh {
        MeshVariant::None => return Err(Error::NoGeometry("nothing to write as OBJ".to_string())),
        MeshVariant::TetMesh(_) => {
            return Err(Error::NoGeometry("OBJ cannot store tetrahedra".to_string()));
        }
        MeshVariant::PointCloud(cloud) => {
            write_points(&mut out, cloud.points())?;
            report_unwritten(mesh, &[]);
        }
        MeshVariant::PolygonMesh(poly) => {
            write_points(&mut out, poly.points())?;
            write_faces(&mut out, mesh, poly)?;
            report_unwritten(mesh, &[AttribLocation::FaceVertex]);
        }
    }
    debug!(bytes = out.len(), "Wrote OBJ file");
    Ok(out)
}

fn write_points(out: &mut Vec<u8>, points: &[[f64; 3]]) -> Result<()> {
    for [x, y, z] in points {
        writeln!(out, "v {} {} {}", x, y, z)?;
    }
    Ok(())
}

/// Corner attribute `name` if it is present with the expected tuple size
fn corner_attribute<'a>(attrs: &[&'a Attribute], name: &str, tuple_size: usize) -> Option<&'a Attribute> {
    let attr = attrs.iter().copied().find(|a| a.name() == name)?;
    if attr.tuple_size() != tuple_size {
        debug!(name, tuple_size = attr.tuple_size(), "Corner attribute has the wrong tuple size for OBJ");
        return None;
    }
    Some(attr)
}

fn write_faces(out: &mut Vec<u8>, mesh: &MeshVariant, poly: &PolygonMesh) -> Result<()> {
    let corners = writable_attributes(mesh, AttribLocation::FaceVertex);
    let uv = corner_attribute(&corners, UV_NAME, 2);
    let normal = corner_attribute(&corners, NORMAL_NAME, 3);

    if let Some(uv) = uv {
        let data = uv.data();
        for c in 0..poly.num_corners() {
            let u = data.value_f64(c * 2).unwrap_or_default();
            let v = data.value_f64(c * 2 + 1).unwrap_or_default();
            writeln!(out, "vt {} {}", u, v)?;
        }
    }
    if let Some(n) = normal {
        let data = n.data();
        for c in 0..poly.num_corners() {
            let x = data.value_f64(c * 3).unwrap_or_default();
            let y = data.value_f64(c * 3 + 1).unwrap_or_default();
            let z = data.value_f64(c * 3 + 2).unwrap_or_default();
            writeln!(out, "vn {} {} {}", x, y, z)?;
        }
    }

    let mut corner = 0;
    for face in poly.faces() {
        out.push(b'f');
        for &p in face {
            corner += 1;
            match (uv.is_some(), normal.is_some()) {
                (false, false) => write!(out, " {}", p + 1)?,
                (true, false) => write!(out, " {}/{}", p + 1, corner)?,
                (false, true) => write!(out, " {}//{}", p + 1, corner)?,
                (true, true) => write!(out, " {}/{}/{}", p + 1, corner, corner)?,
            }
        }
        out.push(b'\n');
    }
    Ok(())
}
