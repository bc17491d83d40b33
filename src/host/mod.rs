//! Host geometry capability interface
//!
//! The transfer engine never touches a concrete geometry container. It
//! reaches the host through [`HostGeometry`], which exposes points,
//! typed primitives, primitive corners ("vertices") and per-class attributes
//! with stable ordinals for the duration of a call.
//!
//! [`MemoryGeometry`] is a complete in-memory implementation used as the
//! reference host.

mod memory;

pub use memory::{MemoryAttribute, MemoryGeometry, MemoryValues};

use crate::model::Point;

/// Host element class an attribute belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementClass {
    /// Per point
    Point,
    /// Per primitive
    Primitive,
    /// Per primitive corner
    Vertex,
}

impl std::fmt::Display for ElementClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ElementClass::Point => "point",
            ElementClass::Primitive => "primitive",
            ElementClass::Vertex => "vertex",
        })
    }
}

/// Kind of a host primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Closed polygon
    Polygon,
    /// Tetrahedron with four corners
    Tetrahedron,
    /// Anything else (curves, volumes, packed geometry); never transferred
    Other,
}

/// Storage type of a host attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Boolean flags
    Bool,
    /// 8-bit integers
    I8,
    /// 32-bit integers
    I32,
    /// 64-bit integers
    I64,
    /// 32-bit floats
    F32,
    /// 64-bit floats
    F64,
    /// Strings
    String,
    /// Anything the engine cannot transfer (dictionaries, arrays, ...)
    Other,
}

/// Description of one host attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAttribInfo {
    /// Attribute name
    pub name: String,
    /// Storage type
    pub storage: StorageKind,
    /// Components per element
    pub tuple_size: usize,
    /// Whether this attribute holds point positions
    pub is_position: bool,
}

/// Capability set the transfer engine needs from a host geometry container
///
/// Ordinals are dense: points are `0..num_points()`, primitives
/// `0..num_primitives()` and vertices `0..num_vertices()`. Appending
/// primitives appends their vertices in primitive-then-local order.
///
/// Attribute accessors take the element ordinal and component index and
/// return `None` when the attribute or element does not exist or the
/// storage cannot be read in the requested representation.
pub trait HostGeometry {
    /// Number of points
    fn num_points(&self) -> usize;

    /// Position of a point
    fn point_position(&self, point: usize) -> Point;

    /// Overwrite the position of an existing point
    fn set_point_position(&mut self, point: usize, position: Point);

    /// Append points and return the ordinal of the first new point
    fn append_points(&mut self, positions: &[Point]) -> usize;

    /// Number of primitives of every kind
    fn num_primitives(&self) -> usize;

    /// Kind of a primitive
    fn primitive_kind(&self, prim: usize) -> PrimitiveKind;

    /// Number of corners of a primitive
    fn primitive_vertex_count(&self, prim: usize) -> usize;

    /// Vertex ordinal of one corner of a primitive
    fn primitive_vertex(&self, prim: usize, local: usize) -> usize;

    /// Number of vertices (primitive corners)
    fn num_vertices(&self) -> usize;

    /// Point a vertex refers to
    fn vertex_point(&self, vertex: usize) -> usize;

    /// Append polygons given as absolute point ordinals
    ///
    /// `offsets` has one more entry than there are polygons. Returns the
    /// ordinal of the first new primitive.
    fn append_polygons(&mut self, indices: &[usize], offsets: &[usize]) -> usize;

    /// Append tetrahedra given as absolute point ordinals and return the
    /// ordinal of the first new primitive
    fn append_tetrahedra(&mut self, tets: &[[usize; 4]]) -> usize;

    /// Attributes at an element class, in the host's order
    fn attributes(&self, class: ElementClass) -> Vec<HostAttribInfo>;

    /// Create an attribute, or reuse one with the same name and layout
    ///
    /// Returns `false` if the host cannot create it.
    fn add_attribute(
        &mut self,
        class: ElementClass,
        name: &str,
        storage: StorageKind,
        tuple_size: usize,
    ) -> bool;

    /// Read an integer component
    fn read_i64(&self, class: ElementClass, name: &str, elem: usize, comp: usize) -> Option<i64>;

    /// Read a float component
    fn read_f64(&self, class: ElementClass, name: &str, elem: usize, comp: usize) -> Option<f64>;

    /// Read a string component; `None` when unset
    fn read_string(
        &self,
        class: ElementClass,
        name: &str,
        elem: usize,
        comp: usize,
    ) -> Option<String>;

    /// Write an integer component
    fn write_i64(&mut self, class: ElementClass, name: &str, elem: usize, comp: usize, value: i64);

    /// Write a float component
    fn write_f64(&mut self, class: ElementClass, name: &str, elem: usize, comp: usize, value: f64);

    /// Write a string component; the empty string is the host's unset value
    fn write_string(
        &mut self,
        class: ElementClass,
        name: &str,
        elem: usize,
        comp: usize,
        value: &str,
    );

    /// Turn an arbitrary string into a legal attribute name
    ///
    /// The default replaces every character that is not ASCII alphanumeric
    /// or `_` with `_` and prefixes names starting with a digit (or empty
    /// names) with `_`.
    fn sanitize_name(&self, name: &str) -> String {
        let mut out: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
        out
    }
}
