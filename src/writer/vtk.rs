//! VTK legacy encoder
//!
//! Writes version 4.2 files. Polygon meshes and point clouds become
//! `POLYDATA` (points as `VERTICES` cells), tetrahedral meshes become
//! `UNSTRUCTURED_GRID`. Binary output is big-endian as the format requires.

use std::io::Write;

use tracing::debug;

use super::{encode_name, value_bytes, write_ascii_values};
use crate::error::{Error, Result};
use crate::model::{
    AttribLocation, Attribute, AttributeData, MeshVariant, Point, VtkEncoding, WriterConfig,
};
use crate::parser::vtk::cell_type;
use crate::validator::{report_unwritten, writable_attributes};

/// Tuple sizes up to this go in `SCALARS` sections, larger ones in a `FIELD`
const MAX_SCALAR_COMPONENTS: usize = 4;

struct VtkWriter {
    out: Vec<u8>,
    binary: bool,
}

impl VtkWriter {
    fn header(&mut self, dataset: &str) -> Result<()> {
        writeln!(self.out, "# vtk DataFile Version 4.2")?;
        writeln!(self.out, "Written by meshbridge")?;
        writeln!(self.out, "{}", if self.binary { "BINARY" } else { "ASCII" })?;
        writeln!(self.out, "DATASET {}", dataset)?;
        Ok(())
    }

    /// Values as text rows or one big-endian block
    fn values(&mut self, data: &AttributeData, per_line: usize) -> Result<()> {
        if self.binary {
            self.out.extend_from_slice(&value_bytes(data, true));
            self.out.push(b'\n');
            Ok(())
        } else {
            write_ascii_values(&mut self.out, data, per_line)
        }
    }

    fn points(&mut self, points: &[Point]) -> Result<()> {
        writeln!(self.out, "POINTS {} double", points.len())?;
        let flat: Vec<f64> = points.iter().flatten().copied().collect();
        self.values(&AttributeData::F64(flat), 3)
    }

    /// A count-prefixed cell list under `keyword`
    fn cells<C: AsRef<[usize]>>(
        &mut self,
        keyword: &str,
        cells: impl ExactSizeIterator<Item = C>,
    ) -> Result<()> {
        let count = cells.len();
        let mut flat = Vec::new();
        for cell in cells {
            let cell = cell.as_ref();
            flat.push(to_i32(cell.len())?);
            for &i in cell {
                flat.push(to_i32(i)?);
            }
        }
        writeln!(self.out, "{} {} {}", keyword, count, flat.len())?;
        if self.binary {
            self.values(&AttributeData::I32(flat), 1)
        } else {
            let mut pos = 0;
            while pos < flat.len() {
                let n = flat[pos] as usize + 1;
                let row = AttributeData::I32(flat[pos..pos + n].to_vec());
                write_ascii_values(&mut self.out, &row, n)?;
                pos += n;
            }
            Ok(())
        }
    }

    fn cell_types(&mut self, count: usize, ty: u8) -> Result<()> {
        writeln!(self.out, "CELL_TYPES {}", count)?;
        self.values(&AttributeData::I32(vec![ty as i32; count]), 1)
    }

    /// `POINT_DATA`/`CELL_DATA` block; nothing is written without attributes
    fn data_block(&mut self, keyword: &str, count: usize, attrs: &[&Attribute]) -> Result<()> {
        if attrs.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "{} {}", keyword, count)?;
        let (scalars, field): (Vec<&Attribute>, Vec<&Attribute>) = attrs
            .iter()
            .partition(|a| a.tuple_size() <= MAX_SCALAR_COMPONENTS);
        for attr in scalars {
            writeln!(
                self.out,
                "SCALARS {} {} {}",
                encode_name(attr.name()),
                type_name(attr.data()),
                attr.tuple_size()
            )?;
            writeln!(self.out, "LOOKUP_TABLE default")?;
            self.values(attr.data(), attr.tuple_size())?;
        }
        if !field.is_empty() {
            writeln!(self.out, "FIELD FieldData {}", field.len())?;
            for attr in field {
                writeln!(
                    self.out,
                    "{} {} {} {}",
                    encode_name(attr.name()),
                    attr.tuple_size(),
                    attr.element_count(),
                    type_name(attr.data())
                )?;
                self.values(attr.data(), attr.tuple_size())?;
            }
        }
        Ok(())
    }
}

fn to_i32(v: usize) -> Result<i32> {
    i32::try_from(v)
        .map_err(|_| Error::Unsupported(format!("index {} exceeds the legacy VTK cell list range", v)))
}

fn type_name(data: &AttributeData) -> &'static str {
    match data {
        AttributeData::I8(_) => "char",
        AttributeData::I32(_) | AttributeData::Categorical { .. } => "int",
        AttributeData::I64(_) => "vtktypeint64",
        AttributeData::F32(_) => "float",
        AttributeData::F64(_) => "double",
    }
}

/// Encode a mesh as a VTK legacy file
pub fn write(mesh: &MeshVariant, config: &WriterConfig) -> Result<Vec<u8>> {
    let mut w = VtkWriter {
        out: Vec::new(),
        binary: config.vtk_encoding() == VtkEncoding::Binary,
    };
    let point_attrs = writable_attributes(mesh, AttribLocation::Vertex);

    match mesh {
        MeshVariant::None => return Err(Error::NoGeometry("nothing to write as VTK".to_string())),
        MeshVariant::PointCloud(cloud) => {
            w.header("POLYDATA")?;
            w.points(cloud.points())?;
            w.cells("VERTICES", (0..cloud.num_points()).map(|i| [i]))?;
            w.data_block("POINT_DATA", cloud.num_points(), &point_attrs)?;
            report_unwritten(mesh, &[AttribLocation::Vertex]);
        }
        MeshVariant::PolygonMesh(poly) => {
            w.header("POLYDATA")?;
            w.points(poly.points())?;
            w.cells("POLYGONS", poly.faces())?;
            w.data_block("POINT_DATA", poly.num_points(), &point_attrs)?;
            let face_attrs = writable_attributes(mesh, AttribLocation::Face);
            w.data_block("CELL_DATA", poly.num_faces(), &face_attrs)?;
            report_unwritten(mesh, &[AttribLocation::Vertex, AttribLocation::Face]);
        }
        MeshVariant::TetMesh(tets) => {
            w.header("UNSTRUCTURED_GRID")?;
            w.points(tets.points())?;
            w.cells("CELLS", tets.tets().iter())?;
            w.cell_types(tets.num_tets(), cell_type::TETRA)?;
            w.data_block("POINT_DATA", tets.num_points(), &point_attrs)?;
            let cell_attrs = writable_attributes(mesh, AttribLocation::Cell);
            w.data_block("CELL_DATA", tets.num_tets(), &cell_attrs)?;
            report_unwritten(mesh, &[AttribLocation::Vertex, AttribLocation::Cell]);
        }
    }
    debug!(bytes = w.out.len(), binary = w.binary, "Wrote VTK legacy file");
    Ok(w.out)
}
