//! Decoders for the supported mesh file formats
//!
//! Each submodule turns raw file bytes into a [`MeshVariant`]. Formats that
//! describe mixed cell lists (VTK, MSH) feed a [`MeshAssembler`], which keeps
//! the cells the portable meshes can represent, filters per-cell data down
//! to those cells, and picks the variant: tetrahedra first, then polygons,
//! then bare points.

pub mod msh;
pub mod obj;
pub mod vtk;
pub mod xml;

use tracing::{debug, warn};
use urlencoding::decode_binary;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::{
    AttribLocation, AttributeData, AttributeStore, MeshVariant, Point, PointCloud, PolygonMesh,
    TetMesh,
};

/// An attribute array read from a file, before it is attached to a mesh
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawArray {
    pub name: String,
    pub tuple_size: usize,
    pub data: AttributeData,
}

impl RawArray {
    pub fn new(name: impl Into<String>, tuple_size: usize, data: AttributeData) -> Self {
        Self {
            name: name.into(),
            tuple_size,
            data,
        }
    }

    fn element_count(&self) -> usize {
        if self.tuple_size == 0 {
            0
        } else {
            self.data.len() / self.tuple_size
        }
    }
}

/// Copy the tuples at `elements` out of a flat array
pub(crate) fn gather(data: &AttributeData, tuple_size: usize, elements: &[usize]) -> AttributeData {
    fn pick<T: Copy>(v: &[T], ts: usize, elements: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(elements.len() * ts);
        for &e in elements {
            out.extend_from_slice(&v[e * ts..(e + 1) * ts]);
        }
        out
    }
    match data {
        AttributeData::I8(v) => AttributeData::I8(pick(v, tuple_size, elements)),
        AttributeData::I32(v) => AttributeData::I32(pick(v, tuple_size, elements)),
        AttributeData::I64(v) => AttributeData::I64(pick(v, tuple_size, elements)),
        AttributeData::F32(v) => AttributeData::F32(pick(v, tuple_size, elements)),
        AttributeData::F64(v) => AttributeData::F64(pick(v, tuple_size, elements)),
        AttributeData::Categorical { strings, indices } => AttributeData::Categorical {
            strings: strings.clone(),
            indices: pick(indices, tuple_size, elements),
        },
    }
}

/// Add a raw array to a store, keeping its payload type
fn store_raw(store: &mut AttributeStore, location: AttribLocation, raw: RawArray) -> Result<()> {
    let RawArray {
        name,
        tuple_size,
        data,
    } = raw;
    match data {
        AttributeData::I8(v) => store.add_numeric(location, name, tuple_size, v),
        AttributeData::I32(v) => store.add_numeric(location, name, tuple_size, v),
        AttributeData::I64(v) => store.add_numeric(location, name, tuple_size, v),
        AttributeData::F32(v) => store.add_numeric(location, name, tuple_size, v),
        AttributeData::F64(v) => store.add_numeric(location, name, tuple_size, v),
        AttributeData::Categorical { strings, indices } => {
            store.add_categorical(location, name, tuple_size, strings, indices)
        }
    }
}

/// Collects points, supported cells and their data from a cell-list format
pub(crate) struct MeshAssembler {
    format: Format,
    points: Vec<Point>,
    poly_indices: Vec<usize>,
    poly_offsets: Vec<usize>,
    poly_cells: Vec<usize>,
    tets: Vec<[usize; 4]>,
    tet_cells: Vec<usize>,
    num_cells: usize,
    point_data: Vec<RawArray>,
    cell_data: Vec<RawArray>,
}

impl MeshAssembler {
    pub fn new(format: Format, points: Vec<Point>) -> Self {
        Self {
            format,
            points,
            poly_indices: Vec::new(),
            poly_offsets: vec![0],
            poly_cells: Vec::new(),
            tets: Vec::new(),
            tet_cells: Vec::new(),
            num_cells: 0,
            point_data: Vec::new(),
            cell_data: Vec::new(),
        }
    }

    /// Total number of cells in the file, including unsupported ones
    pub fn set_num_cells(&mut self, n: usize) {
        self.num_cells = n;
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Record polygon `cell` (its ordinal in the file's cell list)
    pub fn add_polygon(&mut self, cell: usize, points: &[usize]) {
        self.poly_indices.extend_from_slice(points);
        self.poly_offsets.push(self.poly_indices.len());
        self.poly_cells.push(cell);
    }

    /// Record tetrahedron `cell` (its ordinal in the file's cell list)
    pub fn add_tet(&mut self, cell: usize, points: [usize; 4]) {
        self.tets.push(points);
        self.tet_cells.push(cell);
    }

    pub fn add_point_data(&mut self, raw: RawArray) {
        self.point_data.push(raw);
    }

    pub fn add_cell_data(&mut self, raw: RawArray) {
        self.cell_data.push(raw);
    }

    /// Build the mesh variant
    pub fn finish(self) -> Result<MeshVariant> {
        let MeshAssembler {
            format,
            points,
            poly_indices,
            poly_offsets,
            poly_cells,
            tets,
            tet_cells,
            num_cells,
            point_data,
            cell_data,
        } = self;
        let num_points = points.len();

        let point_data = keep_matching(format, "point", point_data, num_points);
        let cell_data = keep_matching(format, "cell", cell_data, num_cells);
        let connectivity_error = |err: Error| match err {
            Error::InvalidIndex { index, len, .. } => Error::parse(
                format,
                format!("cell references point {} but only {} points exist", index, len),
            ),
            other => other,
        };

        if !tets.is_empty() {
            if !poly_cells.is_empty() {
                debug!(%format, polygons = poly_cells.len(), "Ignoring polygons in a tetrahedral mesh");
            }
            let mut mesh = TetMesh::new(points, tets).map_err(connectivity_error)?;
            attach(&mut mesh.attributes, point_data, cell_data, AttribLocation::Cell, &tet_cells)?;
            return Ok(MeshVariant::TetMesh(mesh));
        }

        if !poly_cells.is_empty() {
            let mut mesh =
                PolygonMesh::from_flat(points, poly_indices, poly_offsets).map_err(connectivity_error)?;
            attach(&mut mesh.attributes, point_data, cell_data, AttribLocation::Face, &poly_cells)?;
            return Ok(MeshVariant::PolygonMesh(mesh));
        }

        if num_points > 0 {
            let mut cloud = PointCloud::new(points);
            attach(&mut cloud.attributes, point_data, Vec::new(), AttribLocation::Cell, &[])?;
            return Ok(MeshVariant::PointCloud(cloud));
        }

        Ok(MeshVariant::None)
    }
}

fn keep_matching(format: Format, what: &str, arrays: Vec<RawArray>, expected: usize) -> Vec<RawArray> {
    arrays
        .into_iter()
        .filter(|raw| {
            let ok = raw.tuple_size > 0 && raw.data.len() == expected * raw.tuple_size;
            if !ok {
                warn!(
                    %format,
                    name = %raw.name,
                    found = raw.element_count(),
                    expected,
                    "Dropping {} data with wrong length",
                    what
                );
            }
            ok
        })
        .collect()
}

/// Store point data as is and cell data gathered down to the kept cells
fn attach(
    store: &mut AttributeStore,
    point_data: Vec<RawArray>,
    cell_data: Vec<RawArray>,
    cell_location: AttribLocation,
    kept_cells: &[usize],
) -> Result<()> {
    for raw in point_data {
        store_raw(store, AttribLocation::Vertex, raw)?;
    }
    for raw in cell_data {
        let data = gather(&raw.data, raw.tuple_size, kept_cells);
        store_raw(store, cell_location, RawArray::new(raw.name, raw.tuple_size, data))?;
    }
    Ok(())
}

/// Decode `%XX` escapes used for spaces and other characters in VTK names
///
/// Malformed escapes are kept literally.
pub(crate) fn percent_decode(name: &str) -> String {
    String::from_utf8_lossy(&decode_binary(name.as_bytes())).into_owned()
}
