//! Integration tests for host ↔ mesh attribute transfer

mod common;

use common::{host_points, mixed_host, textured_square, unit_tet};
use meshbridge::{
    AttribLocation, AttributeData, ElementClass, HostGeometry, MemoryGeometry, MemoryValues,
    MeshVariant, PointCloud, PrimitiveKind, PushSummary, StorageKind, pull_point_cloud,
    pull_polygon_mesh, pull_tetmesh, push_mesh, update_points,
};

#[test]
fn test_pull_tetmesh_keeps_only_referenced_points() {
    let geo = mixed_host();
    let mesh = pull_tetmesh(&geo).unwrap();

    assert_eq!(mesh.num_tets(), 2);
    assert_eq!(mesh.num_points(), 8);
    assert_eq!(mesh.tets(), &[[0, 1, 2, 3], [4, 5, 6, 7]]);
    assert_eq!(mesh.points()[4], [10.0, 0.0, 0.0]);

    let ids = mesh
        .attributes
        .get_numeric_as::<i64>(AttribLocation::Vertex, "id")
        .unwrap();
    assert_eq!(ids, vec![0, 100, 200, 300, 400, 500, 600, 700]);

    let weights = mesh
        .attributes
        .get_numeric_as::<f32>(AttribLocation::CellVertex, "weight")
        .unwrap();
    assert_eq!(weights, vec![0.0, 0.5, 1.0, 1.5, 4.0, 4.5, 5.0, 5.5]);
}

#[test]
fn test_pull_polygon_mesh_ignores_tetrahedra() {
    let geo = mixed_host();
    let mesh = pull_polygon_mesh(&geo).unwrap();

    assert_eq!(mesh.num_faces(), 1);
    assert_eq!(mesh.face(0), &[0, 1, 2, 3]);
    assert_eq!(mesh.points()[0], [0.0, 5.0, 0.0]);

    let ids = mesh
        .attributes
        .get_numeric_as::<i64>(AttribLocation::Vertex, "id")
        .unwrap();
    assert_eq!(ids, vec![800, 900, 1000, 1100]);
    let material = mesh.attributes.get(AttribLocation::Face, "material").unwrap();
    assert_eq!(material.categorical_value(0, 0), Some("glass"));
}

#[test]
fn test_pull_point_cloud_takes_every_point() {
    let geo = mixed_host();
    let cloud = pull_point_cloud(&geo).unwrap();
    assert_eq!(cloud.num_points(), 13);
    assert_eq!(cloud.points(), host_points(&geo).as_slice());
    assert_eq!(cloud.attributes.element_count(AttribLocation::Vertex, "id"), Some(13));
}

#[test]
fn test_pull_from_empty_host() {
    let geo = MemoryGeometry::new();
    assert!(pull_point_cloud(&geo).is_none());
    assert!(pull_polygon_mesh(&geo).is_none());
    assert!(pull_tetmesh(&geo).is_none());
}

#[test]
fn test_categorical_compaction() {
    let mut geo = MemoryGeometry::new();
    for i in 0..5 {
        geo.add_point([i as f64, 0.0, 0.0]);
    }
    assert!(geo.add_attribute(ElementClass::Point, "label", StorageKind::String, 1));
    for (p, s) in ["a", "b", "a", "c"].iter().enumerate() {
        geo.write_string(ElementClass::Point, "label", p, 0, s);
    }

    let cloud = pull_point_cloud(&geo).unwrap();
    let label = cloud.attributes.get(AttribLocation::Vertex, "label").unwrap();
    match label.data() {
        AttributeData::Categorical { strings, indices } => {
            assert_eq!(strings, &["a", "b", "c"]);
            assert_eq!(indices, &[0, 1, 0, 2, -1]);
        }
        other => panic!("expected categorical data, got {:?}", other.kind()),
    }
}

#[test]
fn test_push_polygon_mesh_into_populated_host() {
    let mut geo = mixed_host();
    let points_before = geo.num_points();
    let prims_before = geo.num_primitives();

    let summary = push_mesh(&mut geo, MeshVariant::PolygonMesh(textured_square()));
    assert_eq!(
        summary,
        PushSummary {
            points: 4,
            primitives: 2,
            attributes: 3,
            skipped: 0,
        }
    );
    assert_eq!(geo.num_points(), points_before + 4);
    assert_eq!(geo.primitive_kind(prims_before), PrimitiveKind::Polygon);
    assert_eq!(
        geo.primitive_points(prims_before + 1),
        vec![points_before, points_before + 2, points_before + 3]
    );

    assert_eq!(
        geo.read_f64(ElementClass::Point, "temperature", points_before + 2, 0),
        Some(30.0)
    );
    // Pre-existing points get a default value for the new attribute
    assert_eq!(geo.read_f64(ElementClass::Point, "temperature", 0, 0), Some(0.0));
    assert_eq!(
        geo.read_i64(ElementClass::Primitive, "region", prims_before + 1, 0),
        Some(2)
    );
    let uv = geo.attribute(ElementClass::Vertex, "uv").unwrap();
    assert_eq!(uv.tuple_size(), 2);
    assert_eq!(uv.storage(), StorageKind::F32);
}

#[test]
fn test_push_tetmesh_attributes() {
    let mut geo = MemoryGeometry::new();
    let summary = push_mesh(&mut geo, MeshVariant::TetMesh(unit_tet()));
    assert_eq!(summary.primitives, 1);
    assert_eq!(summary.attributes, 1);
    assert_eq!(geo.primitive_kind(0), PrimitiveKind::Tetrahedron);

    let stress = geo.attribute(ElementClass::Primitive, "stress").unwrap();
    assert_eq!(stress.tuple_size(), 6);
    assert_eq!(
        stress.values(),
        &MemoryValues::F64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    );
}

#[test]
fn test_push_categorical_unset_values() {
    let mut cloud = PointCloud::new(vec![[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
    cloud
        .attributes
        .add_categorical(
            AttribLocation::Vertex,
            "label",
            1,
            vec!["left".to_string(), "right".to_string()],
            vec![1, -1, 0],
        )
        .unwrap();

    let mut geo = MemoryGeometry::new();
    push_mesh(&mut geo, MeshVariant::PointCloud(cloud));
    assert_eq!(
        geo.attribute(ElementClass::Point, "label").unwrap().values(),
        &MemoryValues::String(vec![Some("right".to_string()), None, Some("left".to_string())])
    );
}

#[test]
fn test_push_skips_mismatched_and_misplaced_attributes() {
    let mut mesh = textured_square();
    mesh.attributes
        .add_numeric(AttribLocation::Vertex, "short", 1, vec![1.0f32, 2.0])
        .unwrap();
    mesh.attributes
        .add_numeric(AttribLocation::Cell, "volume", 1, vec![1.0f64, 2.0])
        .unwrap();

    let mut geo = MemoryGeometry::new();
    let summary = push_mesh(&mut geo, MeshVariant::PolygonMesh(mesh));
    assert_eq!(summary.attributes, 3);
    assert_eq!(summary.skipped, 2);
    assert!(geo.attribute(ElementClass::Point, "short").is_none());
    assert!(geo.attribute(ElementClass::Primitive, "volume").is_none());
}

#[test]
fn test_push_sanitizes_names() {
    let mut cloud = PointCloud::new(vec![[0.0; 3]]);
    cloud
        .attributes
        .add_numeric(AttribLocation::Vertex, "wall temp", 1, vec![5i32])
        .unwrap();
    cloud
        .attributes
        .add_numeric(AttribLocation::Vertex, "P", 3, vec![9.0f64, 9.0, 9.0])
        .unwrap();

    let mut geo = MemoryGeometry::new();
    let summary = push_mesh(&mut geo, MeshVariant::PointCloud(cloud));
    assert_eq!(summary.attributes, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(geo.read_i64(ElementClass::Point, "wall_temp", 0, 0), Some(5));
    // The position attribute was not overwritten
    assert_eq!(geo.point_position(0), [0.0, 0.0, 0.0]);
}

#[test]
fn test_push_none_is_empty() {
    let mut geo = mixed_host();
    let before = geo.clone();
    let summary = push_mesh(&mut geo, MeshVariant::None);
    assert!(summary.is_empty());
    assert_eq!(geo, before);
}

#[test]
fn test_update_points_in_place() {
    let mut geo = MemoryGeometry::new();
    for i in 0..3 {
        geo.add_point([i as f64, 0.0, 0.0]);
    }
    geo.add_polygon(&[0, 1, 2]);

    let mut cloud = PointCloud::new(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [2.0, 0.0, 1.0], [3.0, 0.0, 1.0]]);
    cloud
        .attributes
        .add_numeric(AttribLocation::Vertex, "speed", 1, vec![1.5f32, 2.5, 3.5, 4.5])
        .unwrap();
    cloud
        .attributes
        .add_categorical(AttribLocation::Vertex, "tag", 1, vec!["x".to_string()], vec![0; 4])
        .unwrap();

    let summary = update_points(&mut geo, &cloud);
    assert_eq!(summary.points, 3);
    assert_eq!(summary.attributes, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(geo.num_points(), 3);
    assert_eq!(geo.num_primitives(), 1);
    assert_eq!(geo.point_position(2), [2.0, 0.0, 1.0]);
    assert_eq!(geo.read_f64(ElementClass::Point, "speed", 2, 0), Some(3.5));
    assert!(geo.attribute(ElementClass::Point, "tag").is_none());
}

#[test]
fn test_pull_push_round_trip() {
    let mut first = MemoryGeometry::new();
    push_mesh(&mut first, MeshVariant::PolygonMesh(textured_square()));
    let pulled = pull_polygon_mesh(&first).unwrap();
    assert_eq!(pulled, textured_square());
}
