//! Attribute transfer between a host geometry and portable meshes
//!
//! Pulling (host → mesh) collects the primitives of one kind, the points
//! they reference and their corners, then copies every transferable host
//! attribute at each element class. Pushing (mesh → host) appends the
//! mesh to the host and recreates every stored attribute at the matching
//! class.
//!
//! | Mesh location              | Host class  |
//! |----------------------------|-------------|
//! | `Vertex`                   | `Point`     |
//! | `Face`, `Cell`             | `Primitive` |
//! | `FaceVertex`, `CellVertex` | `Vertex`    |
//!
//! Attributes that cannot be transferred (unknown storage, wrong element
//! count, names the host refuses) are skipped and logged, never fatal.

mod pull;
mod push;

pub use pull::{pull_point_cloud, pull_polygon_mesh, pull_tetmesh};
pub use push::{push_mesh, push_point_cloud, push_polygon_mesh, push_tetmesh, update_points};

use crate::host::{ElementClass, StorageKind};
use crate::model::{AttribLocation, AttributeKind};

/// Counts reported by a push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Points appended (or updated, for [`update_points`])
    pub points: usize,
    /// Primitives appended
    pub primitives: usize,
    /// Attributes written
    pub attributes: usize,
    /// Attributes skipped
    pub skipped: usize,
}

impl PushSummary {
    /// Whether nothing was written to the host
    pub fn is_empty(&self) -> bool {
        self.points == 0 && self.primitives == 0 && self.attributes == 0
    }
}

/// Host class an attribute location maps to
pub fn element_class(location: AttribLocation) -> ElementClass {
    match location {
        AttribLocation::Vertex => ElementClass::Point,
        AttribLocation::Face | AttribLocation::Cell => ElementClass::Primitive,
        AttribLocation::FaceVertex | AttribLocation::CellVertex => ElementClass::Vertex,
    }
}

/// Host storage used to hold an attribute of the given kind
fn storage_for(kind: AttributeKind) -> StorageKind {
    match kind {
        AttributeKind::I8 => StorageKind::I8,
        AttributeKind::I32 => StorageKind::I32,
        AttributeKind::I64 => StorageKind::I64,
        AttributeKind::F32 => StorageKind::F32,
        AttributeKind::F64 => StorageKind::F64,
        AttributeKind::Categorical => StorageKind::String,
    }
}
