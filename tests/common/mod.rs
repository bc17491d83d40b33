//! Shared fixtures for integration tests
//!
//! Builders for host geometries and portable meshes used across the
//! codec and transfer test files.

#![allow(dead_code)]

use meshbridge::{
    AttribLocation, ElementClass, HostGeometry, MemoryGeometry, PolygonMesh, StorageKind, TetMesh,
};

/// Unit square split into two triangles, with one point attribute, one
/// face attribute and per-corner texture coordinates
pub fn textured_square() -> PolygonMesh {
    let mut mesh = PolygonMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![vec![0, 1, 2], vec![0, 2, 3]],
    )
    .unwrap();
    mesh.attributes
        .add_numeric(AttribLocation::Vertex, "temperature", 1, vec![10.0f64, 20.0, 30.0, 40.0])
        .unwrap();
    mesh.attributes
        .add_numeric(AttribLocation::Face, "region", 1, vec![1i32, 2])
        .unwrap();
    mesh.attributes
        .add_numeric(
            AttribLocation::FaceVertex,
            "uv",
            2,
            vec![0.0f32, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        )
        .unwrap();
    mesh
}

/// A single unit tetrahedron with a 6-component cell attribute
pub fn unit_tet() -> TetMesh {
    let mut mesh = TetMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        vec![[0, 1, 2, 3]],
    )
    .unwrap();
    mesh.attributes
        .add_numeric(
            AttribLocation::Cell,
            "stress",
            6,
            vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
    mesh
}

/// Host with two disjoint tetrahedra (points 0..8), a quad (points 8..12)
/// and a stray point (12), plus attributes at every element class
pub fn mixed_host() -> MemoryGeometry {
    let mut geo = MemoryGeometry::new();
    for t in 0..2 {
        let x = t as f64 * 10.0;
        geo.add_point([x, 0.0, 0.0]);
        geo.add_point([x + 1.0, 0.0, 0.0]);
        geo.add_point([x, 1.0, 0.0]);
        geo.add_point([x, 0.0, 1.0]);
    }
    for p in [[0.0, 5.0, 0.0], [1.0, 5.0, 0.0], [1.0, 6.0, 0.0], [0.0, 6.0, 0.0]] {
        geo.add_point(p);
    }
    geo.add_point([99.0, 99.0, 99.0]);

    geo.add_tetrahedron([0, 1, 2, 3]);
    geo.add_polygon(&[8, 9, 10, 11]);
    geo.add_tetrahedron([4, 5, 6, 7]);

    assert!(geo.add_attribute(ElementClass::Point, "id", StorageKind::I64, 1));
    for p in 0..geo.num_points() {
        geo.write_i64(ElementClass::Point, "id", p, 0, p as i64 * 100);
    }
    assert!(geo.add_attribute(ElementClass::Primitive, "material", StorageKind::String, 1));
    for (prim, name) in ["steel", "glass", "steel"].iter().enumerate() {
        geo.write_string(ElementClass::Primitive, "material", prim, 0, name);
    }
    assert!(geo.add_attribute(ElementClass::Vertex, "weight", StorageKind::F32, 1));
    for v in 0..geo.num_vertices() {
        geo.write_f64(ElementClass::Vertex, "weight", v, 0, v as f64 * 0.5);
    }
    geo
}

/// Point coordinates of a host, in host order
pub fn host_points(geo: &MemoryGeometry) -> Vec<[f64; 3]> {
    (0..geo.num_points()).map(|p| geo.point_position(p)).collect()
}
