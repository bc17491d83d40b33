//! In-memory host geometry

use super::{ElementClass, HostAttribInfo, HostGeometry, PrimitiveKind, StorageKind};
use crate::model::Point;

/// Name of the implicit position attribute
const POSITION: &str = "P";

/// Per-element values of a [`MemoryAttribute`], flat with `tuple_size`
/// components per element
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValues {
    /// Boolean flags
    Bool(Vec<bool>),
    /// 8-bit integers
    I8(Vec<i8>),
    /// 32-bit integers
    I32(Vec<i32>),
    /// 64-bit integers
    I64(Vec<i64>),
    /// 32-bit floats
    F32(Vec<f32>),
    /// 64-bit floats
    F64(Vec<f64>),
    /// Strings, `None` when unset
    String(Vec<Option<String>>),
    /// Opaque storage the engine cannot read
    Other,
}

impl MemoryValues {
    fn with_storage(storage: StorageKind, len: usize) -> Self {
        match storage {
            StorageKind::Bool => MemoryValues::Bool(vec![false; len]),
            StorageKind::I8 => MemoryValues::I8(vec![0; len]),
            StorageKind::I32 => MemoryValues::I32(vec![0; len]),
            StorageKind::I64 => MemoryValues::I64(vec![0; len]),
            StorageKind::F32 => MemoryValues::F32(vec![0.0; len]),
            StorageKind::F64 => MemoryValues::F64(vec![0.0; len]),
            StorageKind::String => MemoryValues::String(vec![None; len]),
            StorageKind::Other => MemoryValues::Other,
        }
    }

    fn storage(&self) -> StorageKind {
        match self {
            MemoryValues::Bool(_) => StorageKind::Bool,
            MemoryValues::I8(_) => StorageKind::I8,
            MemoryValues::I32(_) => StorageKind::I32,
            MemoryValues::I64(_) => StorageKind::I64,
            MemoryValues::F32(_) => StorageKind::F32,
            MemoryValues::F64(_) => StorageKind::F64,
            MemoryValues::String(_) => StorageKind::String,
            MemoryValues::Other => StorageKind::Other,
        }
    }

    fn resize(&mut self, len: usize) {
        match self {
            MemoryValues::Bool(v) => v.resize(len, false),
            MemoryValues::I8(v) => v.resize(len, 0),
            MemoryValues::I32(v) => v.resize(len, 0),
            MemoryValues::I64(v) => v.resize(len, 0),
            MemoryValues::F32(v) => v.resize(len, 0.0),
            MemoryValues::F64(v) => v.resize(len, 0.0),
            MemoryValues::String(v) => v.resize(len, None),
            MemoryValues::Other => {}
        }
    }
}

/// A host attribute held by [`MemoryGeometry`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryAttribute {
    name: String,
    tuple_size: usize,
    values: MemoryValues,
}

impl MemoryAttribute {
    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Components per element
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Storage type
    pub fn storage(&self) -> StorageKind {
        self.values.storage()
    }

    /// Flat values
    pub fn values(&self) -> &MemoryValues {
        &self.values
    }

    fn get_i64(&self, i: usize) -> Option<i64> {
        match &self.values {
            MemoryValues::Bool(v) => v.get(i).map(|&b| b as i64),
            MemoryValues::I8(v) => v.get(i).map(|&x| x as i64),
            MemoryValues::I32(v) => v.get(i).map(|&x| x as i64),
            MemoryValues::I64(v) => v.get(i).copied(),
            MemoryValues::F32(v) => v.get(i).map(|&x| x as i64),
            MemoryValues::F64(v) => v.get(i).map(|&x| x as i64),
            MemoryValues::String(_) | MemoryValues::Other => None,
        }
    }

    fn get_f64(&self, i: usize) -> Option<f64> {
        match &self.values {
            MemoryValues::F32(v) => v.get(i).map(|&x| x as f64),
            MemoryValues::F64(v) => v.get(i).copied(),
            _ => self.get_i64(i).map(|x| x as f64),
        }
    }

    fn set_i64(&mut self, i: usize, value: i64) {
        match &mut self.values {
            MemoryValues::Bool(v) => set(v, i, value != 0),
            MemoryValues::I8(v) => set(v, i, value as i8),
            MemoryValues::I32(v) => set(v, i, value as i32),
            MemoryValues::I64(v) => set(v, i, value),
            MemoryValues::F32(v) => set(v, i, value as f32),
            MemoryValues::F64(v) => set(v, i, value as f64),
            MemoryValues::String(_) | MemoryValues::Other => {}
        }
    }

    fn set_f64(&mut self, i: usize, value: f64) {
        match &mut self.values {
            MemoryValues::F32(v) => set(v, i, value as f32),
            MemoryValues::F64(v) => set(v, i, value),
            _ => self.set_i64(i, value as i64),
        }
    }
}

fn set<T>(v: &mut [T], i: usize, value: T) {
    if let Some(slot) = v.get_mut(i) {
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Primitive {
    kind: PrimitiveKind,
    vertices: Vec<usize>,
}

/// Vector-backed [`HostGeometry`]
///
/// Points carry an implicit `P` attribute (f64 × 3) reported as the
/// position attribute. An empty string written to a string attribute is
/// stored as unset.
///
/// # Example
///
/// ```
/// use meshbridge::host::{HostGeometry, MemoryGeometry};
///
/// let mut geo = MemoryGeometry::new();
/// let a = geo.add_point([0.0, 0.0, 0.0]);
/// let b = geo.add_point([1.0, 0.0, 0.0]);
/// let c = geo.add_point([0.0, 1.0, 0.0]);
/// geo.add_polygon(&[a, b, c]);
/// assert_eq!(geo.num_vertices(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryGeometry {
    points: Vec<Point>,
    primitives: Vec<Primitive>,
    vertex_points: Vec<usize>,
    point_attributes: Vec<MemoryAttribute>,
    primitive_attributes: Vec<MemoryAttribute>,
    vertex_attributes: Vec<MemoryAttribute>,
}

impl MemoryGeometry {
    /// Create empty geometry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one point and return its ordinal
    pub fn add_point(&mut self, position: Point) -> usize {
        self.append_points(&[position])
    }

    /// Add a polygon over existing points and return its ordinal
    pub fn add_polygon(&mut self, points: &[usize]) -> usize {
        self.push_primitive(PrimitiveKind::Polygon, points)
    }

    /// Add a tetrahedron over existing points and return its ordinal
    pub fn add_tetrahedron(&mut self, points: [usize; 4]) -> usize {
        self.push_primitive(PrimitiveKind::Tetrahedron, &points)
    }

    /// Add a primitive of a kind the engine does not transfer
    pub fn add_other_primitive(&mut self, points: &[usize]) -> usize {
        self.push_primitive(PrimitiveKind::Other, points)
    }

    /// Points referenced by a primitive's corners, in corner order
    pub fn primitive_points(&self, prim: usize) -> Vec<usize> {
        self.primitives
            .get(prim)
            .map(|p| p.vertices.iter().map(|&v| self.vertex_points[v]).collect())
            .unwrap_or_default()
    }

    /// Look up an attribute
    pub fn attribute(&self, class: ElementClass, name: &str) -> Option<&MemoryAttribute> {
        self.attribute_list(class).iter().find(|a| a.name == name)
    }

    fn push_primitive(&mut self, kind: PrimitiveKind, points: &[usize]) -> usize {
        let first_vertex = self.vertex_points.len();
        self.vertex_points.extend_from_slice(points);
        self.primitives.push(Primitive {
            kind,
            vertices: (first_vertex..self.vertex_points.len()).collect(),
        });
        self.resize_attributes(ElementClass::Primitive);
        self.resize_attributes(ElementClass::Vertex);
        self.primitives.len() - 1
    }

    fn element_count(&self, class: ElementClass) -> usize {
        match class {
            ElementClass::Point => self.points.len(),
            ElementClass::Primitive => self.primitives.len(),
            ElementClass::Vertex => self.vertex_points.len(),
        }
    }

    fn attribute_list(&self, class: ElementClass) -> &Vec<MemoryAttribute> {
        match class {
            ElementClass::Point => &self.point_attributes,
            ElementClass::Primitive => &self.primitive_attributes,
            ElementClass::Vertex => &self.vertex_attributes,
        }
    }

    fn attribute_list_mut(&mut self, class: ElementClass) -> &mut Vec<MemoryAttribute> {
        match class {
            ElementClass::Point => &mut self.point_attributes,
            ElementClass::Primitive => &mut self.primitive_attributes,
            ElementClass::Vertex => &mut self.vertex_attributes,
        }
    }

    fn attribute_mut(&mut self, class: ElementClass, name: &str) -> Option<&mut MemoryAttribute> {
        self.attribute_list_mut(class)
            .iter_mut()
            .find(|a| a.name == name)
    }

    fn resize_attributes(&mut self, class: ElementClass) {
        let count = self.element_count(class);
        for attr in self.attribute_list_mut(class) {
            attr.values.resize(count * attr.tuple_size);
        }
    }

    fn is_position(class: ElementClass, name: &str) -> bool {
        class == ElementClass::Point && name == POSITION
    }
}

impl HostGeometry for MemoryGeometry {
    fn num_points(&self) -> usize {
        self.points.len()
    }

    fn point_position(&self, point: usize) -> Point {
        self.points.get(point).copied().unwrap_or_default()
    }

    fn set_point_position(&mut self, point: usize, position: Point) {
        set(&mut self.points, point, position);
    }

    fn append_points(&mut self, positions: &[Point]) -> usize {
        let start = self.points.len();
        self.points.extend_from_slice(positions);
        self.resize_attributes(ElementClass::Point);
        start
    }

    fn num_primitives(&self) -> usize {
        self.primitives.len()
    }

    fn primitive_kind(&self, prim: usize) -> PrimitiveKind {
        self.primitives
            .get(prim)
            .map_or(PrimitiveKind::Other, |p| p.kind)
    }

    fn primitive_vertex_count(&self, prim: usize) -> usize {
        self.primitives.get(prim).map_or(0, |p| p.vertices.len())
    }

    fn primitive_vertex(&self, prim: usize, local: usize) -> usize {
        self.primitives[prim].vertices[local]
    }

    fn num_vertices(&self) -> usize {
        self.vertex_points.len()
    }

    fn vertex_point(&self, vertex: usize) -> usize {
        self.vertex_points[vertex]
    }

    fn append_polygons(&mut self, indices: &[usize], offsets: &[usize]) -> usize {
        let start = self.primitives.len();
        for w in offsets.windows(2) {
            self.push_primitive(PrimitiveKind::Polygon, &indices[w[0]..w[1]]);
        }
        start
    }

    fn append_tetrahedra(&mut self, tets: &[[usize; 4]]) -> usize {
        let start = self.primitives.len();
        for tet in tets {
            self.push_primitive(PrimitiveKind::Tetrahedron, tet);
        }
        start
    }

    fn attributes(&self, class: ElementClass) -> Vec<HostAttribInfo> {
        let mut out = Vec::new();
        if class == ElementClass::Point {
            out.push(HostAttribInfo {
                name: POSITION.to_string(),
                storage: StorageKind::F64,
                tuple_size: 3,
                is_position: true,
            });
        }
        out.extend(self.attribute_list(class).iter().map(|a| HostAttribInfo {
            name: a.name.clone(),
            storage: a.storage(),
            tuple_size: a.tuple_size,
            is_position: false,
        }));
        out
    }

    fn add_attribute(
        &mut self,
        class: ElementClass,
        name: &str,
        storage: StorageKind,
        tuple_size: usize,
    ) -> bool {
        if tuple_size == 0 {
            return false;
        }
        if Self::is_position(class, name) {
            return matches!(storage, StorageKind::F32 | StorageKind::F64) && tuple_size == 3;
        }
        let len = self.element_count(class) * tuple_size;
        let fresh = MemoryAttribute {
            name: name.to_string(),
            tuple_size,
            values: MemoryValues::with_storage(storage, len),
        };
        match self.attribute_mut(class, name) {
            Some(existing) if existing.storage() == storage && existing.tuple_size == tuple_size => {}
            Some(existing) => *existing = fresh,
            None => self.attribute_list_mut(class).push(fresh),
        }
        true
    }

    fn read_i64(&self, class: ElementClass, name: &str, elem: usize, comp: usize) -> Option<i64> {
        if Self::is_position(class, name) {
            return self.read_f64(class, name, elem, comp).map(|x| x as i64);
        }
        let attr = self.attribute(class, name)?;
        if comp >= attr.tuple_size {
            return None;
        }
        attr.get_i64(elem * attr.tuple_size + comp)
    }

    fn read_f64(&self, class: ElementClass, name: &str, elem: usize, comp: usize) -> Option<f64> {
        if Self::is_position(class, name) {
            return self.points.get(elem).and_then(|p| p.get(comp)).copied();
        }
        let attr = self.attribute(class, name)?;
        if comp >= attr.tuple_size {
            return None;
        }
        attr.get_f64(elem * attr.tuple_size + comp)
    }

    fn read_string(
        &self,
        class: ElementClass,
        name: &str,
        elem: usize,
        comp: usize,
    ) -> Option<String> {
        let attr = self.attribute(class, name)?;
        if comp >= attr.tuple_size {
            return None;
        }
        match &attr.values {
            MemoryValues::String(v) => v.get(elem * attr.tuple_size + comp)?.clone(),
            _ => None,
        }
    }

    fn write_i64(&mut self, class: ElementClass, name: &str, elem: usize, comp: usize, value: i64) {
        if Self::is_position(class, name) {
            self.write_f64(class, name, elem, comp, value as f64);
            return;
        }
        if let Some(attr) = self.attribute_mut(class, name) {
            if comp < attr.tuple_size {
                attr.set_i64(elem * attr.tuple_size + comp, value);
            }
        }
    }

    fn write_f64(&mut self, class: ElementClass, name: &str, elem: usize, comp: usize, value: f64) {
        if Self::is_position(class, name) {
            if let Some(c) = self.points.get_mut(elem).and_then(|p| p.get_mut(comp)) {
                *c = value;
            }
            return;
        }
        if let Some(attr) = self.attribute_mut(class, name) {
            if comp < attr.tuple_size {
                let i = elem * attr.tuple_size + comp;
                match attr.values {
                    MemoryValues::F32(_) | MemoryValues::F64(_) => attr.set_f64(i, value),
                    _ => attr.set_i64(i, value as i64),
                }
            }
        }
    }

    fn write_string(
        &mut self,
        class: ElementClass,
        name: &str,
        elem: usize,
        comp: usize,
        value: &str,
    ) {
        if let Some(attr) = self.attribute_mut(class, name) {
            let tuple_size = attr.tuple_size;
            if let (true, MemoryValues::String(v)) = (comp < tuple_size, &mut attr.values) {
                let stored = (!value.is_empty()).then(|| value.to_string());
                set(v, elem * tuple_size + comp, stored);
            }
        }
    }
}
