//! Mesh → host transfer

use tracing::{debug, warn};

use super::{PushSummary, element_class, storage_for};
use crate::host::{ElementClass, HostGeometry};
use crate::model::{
    AttribLocation, Attribute, AttributeData, AttributeStore, MeshVariant, NumericScalar,
    PointCloud, PolygonMesh, TetMesh,
};

/// Append any mesh variant to the host
///
/// `MeshVariant::None` writes nothing and returns an empty summary.
pub fn push_mesh<H: HostGeometry + ?Sized>(host: &mut H, mesh: MeshVariant) -> PushSummary {
    match mesh {
        MeshVariant::None => {
            debug!("Nothing to push");
            PushSummary::default()
        }
        MeshVariant::PointCloud(m) => push_point_cloud(host, &m),
        MeshVariant::PolygonMesh(m) => push_polygon_mesh(host, &m),
        MeshVariant::TetMesh(m) => push_tetmesh(host, &m),
    }
}

/// Append a point cloud and its point attributes
pub fn push_point_cloud<H: HostGeometry + ?Sized>(host: &mut H, cloud: &PointCloud) -> PushSummary {
    let point_base = host.append_points(cloud.points());
    let mut summary = PushSummary {
        points: cloud.num_points(),
        ..PushSummary::default()
    };
    let bases = Bases {
        point: point_base,
        primitive: 0,
        vertex: 0,
    };
    push_store(host, &cloud.attributes, &bases, |loc| cloud.num_elements(loc), &mut summary);
    summary
}

/// Append a polygon mesh with its point, face and corner attributes
pub fn push_polygon_mesh<H: HostGeometry + ?Sized>(host: &mut H, mesh: &PolygonMesh) -> PushSummary {
    let point_base = host.append_points(mesh.points());
    let vertex_base = host.num_vertices();
    let indices: Vec<usize> = mesh.indices().iter().map(|&i| i + point_base).collect();
    let prim_base = host.append_polygons(&indices, mesh.offsets());

    let mut summary = PushSummary {
        points: mesh.num_points(),
        primitives: mesh.num_faces(),
        ..PushSummary::default()
    };
    let bases = Bases {
        point: point_base,
        primitive: prim_base,
        vertex: vertex_base,
    };
    push_store(host, &mesh.attributes, &bases, |loc| mesh.num_elements(loc), &mut summary);
    summary
}

/// Append a tetrahedral mesh with its point, cell and corner attributes
pub fn push_tetmesh<H: HostGeometry + ?Sized>(host: &mut H, mesh: &TetMesh) -> PushSummary {
    let point_base = host.append_points(mesh.points());
    let vertex_base = host.num_vertices();
    let tets: Vec<[usize; 4]> = mesh
        .tets()
        .iter()
        .map(|t| t.map(|i| i + point_base))
        .collect();
    let prim_base = host.append_tetrahedra(&tets);

    let mut summary = PushSummary {
        points: mesh.num_points(),
        primitives: mesh.num_tets(),
        ..PushSummary::default()
    };
    let bases = Bases {
        point: point_base,
        primitive: prim_base,
        vertex: vertex_base,
    };
    push_store(host, &mesh.attributes, &bases, |loc| mesh.num_elements(loc), &mut summary);
    summary
}

/// Overwrite positions and numeric point attributes of existing points
///
/// Writes into host points `0..n` where `n` is the smaller of the two point
/// counts. Categorical attributes are not supported in this mode and are
/// skipped.
pub fn update_points<H: HostGeometry + ?Sized>(host: &mut H, cloud: &PointCloud) -> PushSummary {
    let n = cloud.num_points().min(host.num_points());
    if n != cloud.num_points() {
        warn!(
            host_points = host.num_points(),
            cloud_points = cloud.num_points(),
            "Point count mismatch in update; extra points ignored"
        );
    }
    for (i, &p) in cloud.points().iter().take(n).enumerate() {
        host.set_point_position(i, p);
    }

    let mut summary = PushSummary {
        points: n,
        ..PushSummary::default()
    };
    for attr in cloud.attributes.iter(AttribLocation::Vertex) {
        if matches!(attr.data(), AttributeData::Categorical { .. }) {
            debug!(name = attr.name(), "String attributes are not updated in place");
            summary.skipped += 1;
            continue;
        }
        if attr.element_count() < n {
            warn!(name = attr.name(), "Attribute has fewer elements than updated points");
            summary.skipped += 1;
            continue;
        }
        let Some(name) = prepare(host, ElementClass::Point, attr) else {
            summary.skipped += 1;
            continue;
        };
        write_values(host, ElementClass::Point, &name, 0, attr, n);
        summary.attributes += 1;
    }
    summary
}

/// First host ordinal of each class for the appended block
struct Bases {
    point: usize,
    primitive: usize,
    vertex: usize,
}

impl Bases {
    fn of(&self, class: ElementClass) -> usize {
        match class {
            ElementClass::Point => self.point,
            ElementClass::Primitive => self.primitive,
            ElementClass::Vertex => self.vertex,
        }
    }
}

fn push_store<H: HostGeometry + ?Sized>(
    host: &mut H,
    store: &AttributeStore,
    bases: &Bases,
    num_elements: impl Fn(AttribLocation) -> Option<usize>,
    summary: &mut PushSummary,
) {
    for attr in store.iter_all() {
        let location = attr.location();
        let Some(expected) = num_elements(location) else {
            debug!(name = attr.name(), %location, "Location does not apply to this mesh");
            summary.skipped += 1;
            continue;
        };
        if attr.element_count() != expected {
            warn!(
                name = attr.name(),
                %location,
                found = attr.element_count(),
                expected,
                "Attribute element count does not match mesh"
            );
            summary.skipped += 1;
            continue;
        }
        let class = element_class(location);
        let Some(name) = prepare(host, class, attr) else {
            summary.skipped += 1;
            continue;
        };
        write_values(host, class, &name, bases.of(class), attr, expected);
        summary.attributes += 1;
    }
}

/// Create the host attribute and return its sanitized name
fn prepare<H: HostGeometry + ?Sized>(
    host: &mut H,
    class: ElementClass,
    attr: &Attribute,
) -> Option<String> {
    let name = host.sanitize_name(attr.name());
    let clashes_with_position = host
        .attributes(class)
        .iter()
        .any(|info| info.is_position && info.name == name);
    if clashes_with_position {
        debug!(name = %name, "Attribute name is reserved for positions");
        return None;
    }
    if !host.add_attribute(class, &name, storage_for(attr.kind()), attr.tuple_size()) {
        debug!(name = %name, %class, "Host refused attribute");
        return None;
    }
    Some(name)
}

/// Write the first `count` elements of an attribute starting at `base`
fn write_values<H: HostGeometry + ?Sized>(
    host: &mut H,
    class: ElementClass,
    name: &str,
    base: usize,
    attr: &Attribute,
    count: usize,
) {
    let ts = attr.tuple_size();
    let len = count * ts;
    match attr.data() {
        AttributeData::I8(v) => write_numeric(host, class, name, base, ts, &v[..len]),
        AttributeData::I32(v) => write_numeric(host, class, name, base, ts, &v[..len]),
        AttributeData::I64(v) => write_numeric(host, class, name, base, ts, &v[..len]),
        AttributeData::F32(v) => write_numeric(host, class, name, base, ts, &v[..len]),
        AttributeData::F64(v) => write_numeric(host, class, name, base, ts, &v[..len]),
        AttributeData::Categorical { strings, indices } => {
            for (i, &idx) in indices[..len].iter().enumerate() {
                let value = usize::try_from(idx)
                    .ok()
                    .and_then(|k| strings.get(k))
                    .map_or("", String::as_str);
                host.write_string(class, name, base + i / ts, i % ts, value);
            }
        }
    }
}

fn write_numeric<T: NumericScalar, H: HostGeometry + ?Sized>(
    host: &mut H,
    class: ElementClass,
    name: &str,
    base: usize,
    ts: usize,
    values: &[T],
) {
    for (i, &v) in values.iter().enumerate() {
        let (elem, comp) = (base + i / ts, i % ts);
        if T::KIND.is_integer() {
            host.write_i64(class, name, elem, comp, v.to_i64());
        } else {
            host.write_f64(class, name, elem, comp, v.to_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryGeometry, MemoryValues, PrimitiveKind, StorageKind};

    fn quad_mesh() -> PolygonMesh {
        PolygonMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![vec![0, 1, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_push_polygon_mesh_appends_after_existing() {
        let mut geo = MemoryGeometry::new();
        geo.add_point([9.0; 3]);
        geo.add_polygon(&[0, 0, 0]);

        let mut mesh = quad_mesh();
        mesh.attributes
            .add_numeric(AttribLocation::FaceVertex, "uv", 2, vec![0.5f32; 8])
            .unwrap();
        mesh.attributes
            .add_numeric(AttribLocation::Face, "id", 1, vec![42i32])
            .unwrap();

        let summary = push_polygon_mesh(&mut geo, &mesh);
        assert_eq!(summary.points, 4);
        assert_eq!(summary.primitives, 1);
        assert_eq!(summary.attributes, 2);

        assert_eq!(geo.primitive_points(1), vec![1, 2, 3, 4]);
        assert_eq!(geo.read_i64(ElementClass::Primitive, "id", 1, 0), Some(42));
        assert_eq!(geo.read_i64(ElementClass::Primitive, "id", 0, 0), Some(0));
        assert_eq!(geo.read_f64(ElementClass::Vertex, "uv", 3, 1), Some(0.5));
        assert_eq!(geo.read_f64(ElementClass::Vertex, "uv", 2, 1), Some(0.0));
    }

    #[test]
    fn test_push_sanitizes_names() {
        let mut geo = MemoryGeometry::new();
        let mut cloud = PointCloud::new(vec![[0.0; 3]]);
        cloud
            .attributes
            .add_numeric(AttribLocation::Vertex, "my temp", 1, vec![1.5f64])
            .unwrap();
        push_point_cloud(&mut geo, &cloud);
        assert_eq!(geo.read_f64(ElementClass::Point, "my_temp", 0, 0), Some(1.5));
    }

    #[test]
    fn test_push_categorical_with_unset() {
        let mut geo = MemoryGeometry::new();
        let mut cloud = PointCloud::new(vec![[0.0; 3]; 3]);
        cloud
            .attributes
            .add_categorical(
                AttribLocation::Vertex,
                "name",
                1,
                vec!["a".into(), "b".into()],
                vec![1, -1, 0],
            )
            .unwrap();
        push_point_cloud(&mut geo, &cloud);
        let attr = geo.attribute(ElementClass::Point, "name").unwrap();
        assert_eq!(attr.storage(), StorageKind::String);
        assert_eq!(
            attr.values(),
            &MemoryValues::String(vec![Some("b".into()), None, Some("a".into())])
        );
    }

    #[test]
    fn test_push_skips_mismatched_and_position_names() {
        let mut geo = MemoryGeometry::new();
        let mut cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]]);
        cloud
            .attributes
            .add_numeric(AttribLocation::Vertex, "P", 3, vec![0.0f32; 3])
            .unwrap();
        cloud
            .attributes
            .add_numeric(AttribLocation::Vertex, "short", 1, vec![1i32, 2])
            .unwrap();
        cloud
            .attributes
            .add_numeric(AttribLocation::Face, "face", 1, vec![1i32])
            .unwrap();
        let summary = push_point_cloud(&mut geo, &cloud);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.attributes, 0);
        assert_eq!(geo.point_position(0), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_push_tetmesh() {
        let mut geo = MemoryGeometry::new();
        let mut mesh = TetMesh::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            vec![[0, 1, 2, 3]],
        )
        .unwrap();
        mesh.attributes
            .add_numeric(AttribLocation::CellVertex, "w", 1, vec![1i8, 2, 3, 4])
            .unwrap();
        let summary = push_mesh(&mut geo, mesh.into());
        assert_eq!(summary.primitives, 1);
        assert_eq!(geo.primitive_kind(0), PrimitiveKind::Tetrahedron);
        assert_eq!(geo.attribute(ElementClass::Vertex, "w").unwrap().storage(), StorageKind::I8);
        assert_eq!(geo.read_i64(ElementClass::Vertex, "w", 3, 0), Some(4));
    }

    #[test]
    fn test_push_none_is_noop() {
        let mut geo = MemoryGeometry::new();
        assert!(push_mesh(&mut geo, MeshVariant::None).is_empty());
        assert_eq!(geo.num_points(), 0);
    }

    #[test]
    fn test_update_points_overwrites_in_place() {
        let mut geo = MemoryGeometry::new();
        geo.append_points(&[[0.0; 3], [0.0; 3], [0.0; 3]]);

        let mut cloud = PointCloud::new(vec![[1.0; 3], [2.0; 3]]);
        cloud
            .attributes
            .add_numeric(AttribLocation::Vertex, "mass", 1, vec![3i64, 4])
            .unwrap();
        cloud
            .attributes
            .add_categorical(AttribLocation::Vertex, "s", 1, vec!["x".into()], vec![0, 0])
            .unwrap();

        let summary = update_points(&mut geo, &cloud);
        assert_eq!(summary.points, 2);
        assert_eq!(summary.attributes, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(geo.num_points(), 3);
        assert_eq!(geo.point_position(1), [2.0; 3]);
        assert_eq!(geo.point_position(2), [0.0; 3]);
        assert_eq!(geo.read_i64(ElementClass::Point, "mass", 1, 0), Some(4));
        assert!(geo.attribute(ElementClass::Point, "s").is_none());
    }
}
