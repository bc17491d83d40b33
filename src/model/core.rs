//! Portable mesh types

use crate::error::{Error, Result};

use super::attribute::{AttribLocation, AttributeStore};

/// A point position
pub type Point = [f64; 3];

fn check_point_index(index: usize, num_points: usize) -> Result<()> {
    if index >= num_points {
        return Err(Error::InvalidIndex {
            index: index as i64,
            len: num_points,
            what: "point list",
        });
    }
    Ok(())
}

/// A set of points with per-point attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point>,
    /// Attributes; only [`AttribLocation::Vertex`] is meaningful
    pub attributes: AttributeStore,
}

impl PointCloud {
    /// Create a point cloud from positions
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            attributes: AttributeStore::new(),
        }
    }

    /// Point positions
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of elements at a location, or `None` if the location does not apply
    pub fn num_elements(&self, location: AttribLocation) -> Option<usize> {
        match location {
            AttribLocation::Vertex => Some(self.points.len()),
            _ => None,
        }
    }
}

/// Points plus polygonal faces
///
/// Faces are stored as one flat list of point indices (the corner list) and
/// an offsets array of length `num_faces + 1`. Face `i` spans
/// `indices[offsets[i]..offsets[i + 1]]`. Winding is preserved as given.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonMesh {
    points: Vec<Point>,
    indices: Vec<usize>,
    offsets: Vec<usize>,
    /// Attributes at `Vertex`, `Face` and `FaceVertex`
    pub attributes: AttributeStore,
}

impl Default for PolygonMesh {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            indices: Vec::new(),
            offsets: vec![0],
            attributes: AttributeStore::new(),
        }
    }
}

impl PolygonMesh {
    /// Create a polygon mesh from per-face index lists
    ///
    /// Fails with [`Error::InvalidIndex`] if any face references a point
    /// that does not exist.
    pub fn new(points: Vec<Point>, faces: Vec<Vec<usize>>) -> Result<Self> {
        let num_corners = faces.iter().map(Vec::len).sum();
        let mut indices = Vec::with_capacity(num_corners);
        let mut offsets = Vec::with_capacity(faces.len() + 1);
        offsets.push(0);
        for face in faces {
            indices.extend(face);
            offsets.push(indices.len());
        }
        Self::from_flat(points, indices, offsets)
    }

    /// Create a polygon mesh from a flat corner list and face offsets
    ///
    /// `offsets` starts at 0, is non-decreasing and ends at `indices.len()`.
    pub fn from_flat(points: Vec<Point>, indices: Vec<usize>, offsets: Vec<usize>) -> Result<Self> {
        if offsets.first() != Some(&0)
            || offsets.last() != Some(&indices.len())
            || offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(Error::SizeMismatch {
                len: indices.len(),
                tuple_size: offsets.len().max(1),
            });
        }
        for &i in &indices {
            check_point_index(i, points.len())?;
        }
        Ok(Self {
            points,
            indices,
            offsets,
            attributes: AttributeStore::new(),
        })
    }

    /// Point positions
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of faces
    pub fn num_faces(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of corners (sum of face sizes)
    pub fn num_corners(&self) -> usize {
        self.indices.len()
    }

    /// Whether the mesh holds no faces
    pub fn is_empty(&self) -> bool {
        self.num_faces() == 0
    }

    /// Point indices of one face
    pub fn face(&self, i: usize) -> &[usize] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Iterate over faces in order
    pub fn faces(&self) -> impl ExactSizeIterator<Item = &[usize]> + '_ {
        self.offsets
            .windows(2)
            .map(move |w| &self.indices[w[0]..w[1]])
    }

    /// Flat corner list
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Face offsets (`num_faces + 1` entries, starting at 0)
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of elements at a location, or `None` if the location does not apply
    pub fn num_elements(&self, location: AttribLocation) -> Option<usize> {
        match location {
            AttribLocation::Vertex => Some(self.points.len()),
            AttribLocation::Face => Some(self.num_faces()),
            AttribLocation::FaceVertex => Some(self.indices.len()),
            AttribLocation::Cell | AttribLocation::CellVertex => None,
        }
    }
}

/// Points plus tetrahedra
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TetMesh {
    points: Vec<Point>,
    tets: Vec<[usize; 4]>,
    /// Attributes at `Vertex`, `Cell` and `CellVertex`
    pub attributes: AttributeStore,
}

impl TetMesh {
    /// Create a tetrahedral mesh
    ///
    /// Fails with [`Error::InvalidIndex`] if a tetrahedron references a
    /// point that does not exist.
    pub fn new(points: Vec<Point>, tets: Vec<[usize; 4]>) -> Result<Self> {
        for &i in tets.iter().flatten() {
            check_point_index(i, points.len())?;
        }
        Ok(Self {
            points,
            tets,
            attributes: AttributeStore::new(),
        })
    }

    /// Create a tetrahedral mesh from a flat index list, four per cell
    ///
    /// Fails with [`Error::SizeMismatch`] if the length is not a multiple of 4.
    pub fn from_flat_indices(points: Vec<Point>, indices: Vec<usize>) -> Result<Self> {
        if indices.len() % 4 != 0 {
            return Err(Error::SizeMismatch {
                len: indices.len(),
                tuple_size: 4,
            });
        }
        let tets = indices
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self::new(points, tets)
    }

    /// Point positions
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Tetrahedra
    pub fn tets(&self) -> &[[usize; 4]] {
        &self.tets
    }

    /// Number of tetrahedra
    pub fn num_tets(&self) -> usize {
        self.tets.len()
    }

    /// Whether the mesh holds no tetrahedra
    pub fn is_empty(&self) -> bool {
        self.tets.is_empty()
    }

    /// Number of elements at a location, or `None` if the location does not apply
    pub fn num_elements(&self, location: AttribLocation) -> Option<usize> {
        match location {
            AttribLocation::Vertex => Some(self.points.len()),
            AttribLocation::Cell => Some(self.tets.len()),
            AttribLocation::CellVertex => Some(self.tets.len() * 4),
            AttribLocation::Face | AttribLocation::FaceVertex => None,
        }
    }
}

/// Result of decoding a file, or the input to encoding one
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MeshVariant {
    /// No usable geometry
    #[default]
    None,
    /// Points only
    PointCloud(PointCloud),
    /// Polygonal surface
    PolygonMesh(PolygonMesh),
    /// Tetrahedral volume
    TetMesh(TetMesh),
}

impl MeshVariant {
    /// Whether this is [`MeshVariant::None`]
    pub fn is_none(&self) -> bool {
        matches!(self, MeshVariant::None)
    }

    /// Short name of the variant, used in log messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            MeshVariant::None => "none",
            MeshVariant::PointCloud(_) => "point cloud",
            MeshVariant::PolygonMesh(_) => "polygon mesh",
            MeshVariant::TetMesh(_) => "tetrahedral mesh",
        }
    }

    /// Point positions, empty for `None`
    pub fn points(&self) -> &[Point] {
        match self {
            MeshVariant::None => &[],
            MeshVariant::PointCloud(m) => m.points(),
            MeshVariant::PolygonMesh(m) => m.points(),
            MeshVariant::TetMesh(m) => m.points(),
        }
    }

    /// Number of elements at a location, or `None` if the location does not apply
    pub fn num_elements(&self, location: AttribLocation) -> Option<usize> {
        match self {
            MeshVariant::None => None,
            MeshVariant::PointCloud(m) => m.num_elements(location),
            MeshVariant::PolygonMesh(m) => m.num_elements(location),
            MeshVariant::TetMesh(m) => m.num_elements(location),
        }
    }

    /// Attribute store, `None` for an empty variant
    pub fn attributes(&self) -> Option<&AttributeStore> {
        match self {
            MeshVariant::None => None,
            MeshVariant::PointCloud(m) => Some(&m.attributes),
            MeshVariant::PolygonMesh(m) => Some(&m.attributes),
            MeshVariant::TetMesh(m) => Some(&m.attributes),
        }
    }
}

impl From<PointCloud> for MeshVariant {
    fn from(m: PointCloud) -> Self {
        MeshVariant::PointCloud(m)
    }
}

impl From<PolygonMesh> for MeshVariant {
    fn from(m: PolygonMesh) -> Self {
        MeshVariant::PolygonMesh(m)
    }
}

impl From<TetMesh> for MeshVariant {
    fn from(m: TetMesh) -> Self {
        MeshVariant::TetMesh(m)
    }
}
