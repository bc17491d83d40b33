//! File format dispatch

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{MeshVariant, ParserConfig, WriterConfig};
use crate::{parser, writer};

/// Supported mesh file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// VTK legacy (`.vtk`), ASCII or big-endian binary
    VtkLegacy,
    /// VTK XML unstructured grid (`.vtu`, `.pvtu`)
    Vtu,
    /// VTK XML poly data (`.vtp`, `.pvtp`)
    Vtp,
    /// Wavefront OBJ (`.obj`)
    Obj,
    /// Gmsh MSH (`.msh`), load only
    Msh,
}

impl Format {
    /// All formats
    pub const ALL: [Format; 5] = [
        Format::VtkLegacy,
        Format::Vtu,
        Format::Vtp,
        Format::Obj,
        Format::Msh,
    ];

    /// Detect format from a file extension (case-insensitive)
    ///
    /// Returns `None` if the extension is not recognized.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        Self::from_extension(&ext)
    }

    /// Detect format from an extension without the leading dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "vtk" => Some(Format::VtkLegacy),
            "vtu" | "pvtu" => Some(Format::Vtu),
            "vtp" | "pvtp" => Some(Format::Vtp),
            "obj" => Some(Format::Obj),
            "msh" => Some(Format::Msh),
            _ => None,
        }
    }

    /// Canonical file extension
    pub const fn extension(&self) -> &'static str {
        match self {
            Format::VtkLegacy => "vtk",
            Format::Vtu => "vtu",
            Format::Vtp => "vtp",
            Format::Obj => "obj",
            Format::Msh => "msh",
        }
    }

    /// Whether the format can hold tetrahedral meshes
    pub const fn supports_tets(&self) -> bool {
        matches!(self, Format::VtkLegacy | Format::Vtu | Format::Msh)
    }

    /// Whether the format can be written
    pub const fn can_encode(&self) -> bool {
        !matches!(self, Format::Msh)
    }

    /// Decode file bytes into a mesh
    ///
    /// Tetrahedra take priority over polygons, polygons over bare points.
    /// Returns `MeshVariant::None` when the file holds no usable geometry.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] (or [`Error::Xml`]) when the bytes are malformed,
    /// [`Error::Unsupported`] for MSH versions other than 2.x and 4.1.
    pub fn decode(&self, bytes: &[u8], config: &ParserConfig) -> Result<MeshVariant> {
        let mesh = match self {
            Format::VtkLegacy => parser::vtk::parse(bytes, config)?,
            Format::Vtu | Format::Vtp => parser::xml::parse(bytes, *self, config)?,
            Format::Obj => parser::obj::parse(bytes, config)?,
            Format::Msh => parser::msh::parse(bytes, config)?,
        };
        debug!(format = %self, kind = mesh.kind_name(), points = mesh.points().len(), "Decoded mesh");
        Ok(mesh)
    }

    /// Encode a mesh into file bytes
    ///
    /// # Errors
    ///
    /// - [`Error::Unsupported`] for MSH
    /// - [`Error::NoGeometry`] for `MeshVariant::None` and for tetrahedral
    ///   meshes sent to OBJ or VTP
    pub fn encode(&self, mesh: &MeshVariant, config: &WriterConfig) -> Result<Vec<u8>> {
        if !self.can_encode() {
            return Err(Error::Unsupported(format!("{} export", self)));
        }
        match mesh {
            MeshVariant::None => {
                return Err(Error::NoGeometry(format!("nothing to write as {}", self)));
            }
            MeshVariant::TetMesh(_) if !self.supports_tets() => {
                return Err(Error::NoGeometry(format!(
                    "{} cannot store tetrahedral meshes",
                    self
                )));
            }
            _ => {}
        }
        let bytes = match self {
            Format::VtkLegacy => writer::vtk::write(mesh, config)?,
            Format::Vtu => writer::xml::write(mesh, writer::xml::Dataset::UnstructuredGrid, config)?,
            Format::Vtp => writer::xml::write(mesh, writer::xml::Dataset::PolyData, config)?,
            Format::Obj => writer::obj::write(mesh)?,
            Format::Msh => return Err(Error::Unsupported(format!("{} export", self))),
        };
        debug!(format = %self, kind = mesh.kind_name(), bytes = bytes.len(), "Encoded mesh");
        Ok(bytes)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::VtkLegacy => "VTK legacy",
            Format::Vtu => "VTU",
            Format::Vtp => "VTP",
            Format::Obj => "OBJ",
            Format::Msh => "MSH",
        })
    }
}
