//! # meshbridge
//!
//! Mesh file codecs and attribute transfer between a host geometry container
//! and portable mesh representations.
//!
//! Files decode into a [`MeshVariant`]: a point cloud, a polygon mesh or a
//! tetrahedral mesh, each carrying an [`AttributeStore`] of typed per-element
//! data. The transfer engine moves meshes and every attribute it can
//! represent in and out of anything implementing [`HostGeometry`].
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - VTK legacy (ASCII and binary), VTU and VTP (ascii, base64, appended,
//!   zlib-compressed), Wavefront OBJ, and Gmsh MSH (load only)
//! - Integer, floating point and categorical (string) attributes of any
//!   tuple size at points, faces, cells and corners
//! - Point subsetting when pulling primitives out of a larger host
//!
//! ## Example
//!
//! ```
//! use meshbridge::{Format, MemoryGeometry, ParserConfig, WriterConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
//!
//! let mut host = MemoryGeometry::new();
//! let summary = meshbridge::load(&mut host, Format::Obj, obj, &ParserConfig::default())?;
//! assert_eq!(summary.primitives, 1);
//!
//! let vtk = meshbridge::save(&host, Format::VtkLegacy, &WriterConfig::default())?;
//! assert!(vtk.starts_with(b"# vtk DataFile Version"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod format;
pub mod host;
pub mod model;
pub mod parser;
pub mod transfer;
mod validator;
mod writer;

pub use error::{Error, ErrorContext, Result};
pub use format::Format;
pub use host::{
    ElementClass, HostAttribInfo, HostGeometry, MemoryAttribute, MemoryGeometry, MemoryValues,
    PrimitiveKind, StorageKind,
};
pub use model::{
    AttribLocation, Attribute, AttributeData, AttributeKind, AttributeStore, MeshVariant,
    NumericScalar, ParserConfig, Point, PointCloud, PolygonMesh, TetMesh, VtkEncoding,
    WriterConfig, XmlFormat,
};
pub use transfer::{
    PushSummary, pull_point_cloud, pull_polygon_mesh, pull_tetmesh, push_mesh, update_points,
};

use std::path::Path;

use tracing::{debug, info};

impl MeshVariant {
    /// Decode file bytes of the given format
    ///
    /// # Example
    ///
    /// ```
    /// use meshbridge::{Format, MeshVariant, ParserConfig};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mesh = MeshVariant::from_bytes(Format::Obj, b"v 1 2 3\n", &ParserConfig::default())?;
    /// assert_eq!(mesh.points(), &[[1.0, 2.0, 3.0]]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_bytes(format: Format, bytes: &[u8], config: &ParserConfig) -> Result<Self> {
        format.decode(bytes, config)
    }

    /// Encode this mesh in the given format
    pub fn to_bytes(&self, format: Format, config: &WriterConfig) -> Result<Vec<u8>> {
        format.encode(self, config)
    }

    /// Read and decode a file, picking the format from its extension
    pub fn read_file<P: AsRef<Path>>(path: P, config: &ParserConfig) -> Result<Self> {
        let format = format_of(path.as_ref())?;
        let bytes = std::fs::read(path)?;
        format.decode(&bytes, config)
    }

    /// Encode this mesh and write it, picking the format from the extension
    pub fn write_file<P: AsRef<Path>>(&self, path: P, config: &WriterConfig) -> Result<()> {
        let format = format_of(path.as_ref())?;
        let bytes = format.encode(self, config)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn format_of(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| {
        Error::Unsupported(format!("no mesh format for file '{}'", path.display()))
    })
}

/// Decode `bytes` and append the result to the host
///
/// Decoding completes before the host is touched, so a parse error leaves
/// the host unchanged. A file without usable geometry adds nothing and
/// returns an empty summary.
pub fn load<H: HostGeometry + ?Sized>(
    host: &mut H,
    format: Format,
    bytes: &[u8],
    config: &ParserConfig,
) -> Result<PushSummary> {
    let mesh = format.decode(bytes, config)?;
    if mesh.is_none() {
        debug!(%format, "File holds no geometry; host unchanged");
    }
    let summary = push_mesh(host, mesh);
    info!(
        %format,
        points = summary.points,
        primitives = summary.primitives,
        attributes = summary.attributes,
        skipped = summary.skipped,
        "Loaded mesh"
    );
    Ok(summary)
}

/// Pull the host's geometry and encode it
///
/// Tetrahedra are tried first (when the format can store them), then
/// polygons, then bare points. The first kind the host has is written.
///
/// # Errors
///
/// - [`Error::Unsupported`] for formats that cannot be written
/// - [`Error::NoGeometry`] when the host has nothing the format can store
pub fn save<H: HostGeometry + ?Sized>(host: &H, format: Format, config: &WriterConfig) -> Result<Vec<u8>> {
    if !format.can_encode() {
        return Err(Error::Unsupported(format!("{} export", format)));
    }
    let mesh = pull_for_save(host, format)
        .ok_or_else(|| Error::NoGeometry(format!("host has no geometry to write as {}", format)))?;
    info!(%format, kind = mesh.kind_name(), points = mesh.points().len(), "Saving mesh");
    format.encode(&mesh, config)
}

fn pull_for_save<H: HostGeometry + ?Sized>(host: &H, format: Format) -> Option<MeshVariant> {
    if format.supports_tets() {
        if let Some(mesh) = pull_tetmesh(host) {
            return Some(mesh.into());
        }
    }
    if let Some(mesh) = pull_polygon_mesh(host) {
        return Some(mesh.into());
    }
    pull_point_cloud(host).map(MeshVariant::from)
}

/// Read a mesh file into the host, picking the format from its extension
///
/// # Example
///
/// ```no_run
/// use meshbridge::{MemoryGeometry, ParserConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut host = MemoryGeometry::new();
/// meshbridge::load_file(&mut host, "part.vtu", &ParserConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub fn load_file<H: HostGeometry + ?Sized, P: AsRef<Path>>(
    host: &mut H,
    path: P,
    config: &ParserConfig,
) -> Result<PushSummary> {
    let format = format_of(path.as_ref())?;
    let bytes = std::fs::read(path)?;
    load(host, format, &bytes, config)
}

/// Write the host's geometry to a file, picking the format from its extension
pub fn save_file<H: HostGeometry + ?Sized, P: AsRef<Path>>(
    host: &H,
    path: P,
    config: &WriterConfig,
) -> Result<()> {
    let format = format_of(path.as_ref())?;
    let bytes = save(host, format, config)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
