//! Property-based tests for meshbridge
//!
//! These tests use proptest to generate random meshes and host attributes
//! and verify that codecs and transfer preserve them.

use meshbridge::{
    AttribLocation, AttributeData, ElementClass, Format, HostGeometry, MemoryGeometry,
    MeshVariant, ParserConfig, PolygonMesh, StorageKind, VtkEncoding, WriterConfig, XmlFormat,
    pull_point_cloud, pull_polygon_mesh, push_mesh,
};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// A point with finite, non-zero coordinates
fn point_strategy() -> impl Strategy<Value = [f64; 3]> {
    (
        prop::num::f64::NORMAL,
        prop::num::f64::NORMAL,
        prop::num::f64::NORMAL,
    )
        .prop_map(|(x, y, z)| [x, y, z])
}

/// Points plus faces of 3 to 6 corners indexing into them
fn polygon_mesh_strategy() -> impl Strategy<Value = PolygonMesh> {
    prop::collection::vec(point_strategy(), 3..40).prop_flat_map(|points| {
        let n = points.len();
        let face = prop::collection::vec(0..n, 3..=6);
        (Just(points), prop::collection::vec(face, 1..30))
            .prop_map(|(points, faces)| PolygonMesh::new(points, faces).unwrap())
    })
}

/// A polygon mesh carrying a scalar point attribute and an integer face attribute
fn attributed_mesh_strategy() -> impl Strategy<Value = PolygonMesh> {
    polygon_mesh_strategy().prop_flat_map(|mesh| {
        let points = prop::collection::vec(-1.0e6f64..1.0e6, mesh.num_points());
        let faces = prop::collection::vec(any::<i32>(), mesh.num_faces());
        (Just(mesh), points, faces).prop_map(|(mut mesh, p, f)| {
            mesh.attributes
                .add_numeric(AttribLocation::Vertex, "pressure", 1, p)
                .unwrap();
            mesh.attributes.add_numeric(AttribLocation::Face, "zone", 1, f).unwrap();
            mesh
        })
    })
}

fn writer_configs() -> Vec<WriterConfig> {
    vec![
        WriterConfig::new()
            .with_vtk_encoding(VtkEncoding::Ascii)
            .with_xml_format(XmlFormat::Ascii),
        WriterConfig::new(),
        WriterConfig::new().with_compression(true),
    ]
}

// ============================================================================
// Codec properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every VTK flavour decodes back to the mesh it encoded
    #[test]
    fn prop_vtk_round_trip(mesh in attributed_mesh_strategy()) {
        let mesh = MeshVariant::PolygonMesh(mesh);
        for format in [Format::VtkLegacy, Format::Vtu, Format::Vtp] {
            for config in writer_configs() {
                let bytes = mesh.to_bytes(format, &config).unwrap();
                let back = MeshVariant::from_bytes(format, &bytes, &ParserConfig::default()).unwrap();
                prop_assert_eq!(&back, &mesh);
            }
        }
    }

    /// OBJ keeps geometry and connectivity exactly
    #[test]
    fn prop_obj_round_trip(mesh in polygon_mesh_strategy()) {
        let mesh = MeshVariant::PolygonMesh(mesh);
        let bytes = mesh.to_bytes(Format::Obj, &WriterConfig::default()).unwrap();
        let back = MeshVariant::from_bytes(Format::Obj, &bytes, &ParserConfig::default()).unwrap();
        prop_assert_eq!(back, mesh);
    }

    /// Random bytes never panic any decoder
    #[test]
    fn prop_decoders_do_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        for format in Format::ALL {
            let _ = MeshVariant::from_bytes(format, &bytes, &ParserConfig::default());
        }
    }
}

// ============================================================================
// Transfer properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Pulling back a pushed mesh keeps every face and its attribute values
    #[test]
    fn prop_push_pull_identity(mesh in attributed_mesh_strategy()) {
        let mut geo = MemoryGeometry::new();
        push_mesh(&mut geo, MeshVariant::PolygonMesh(mesh.clone()));
        let pulled = pull_polygon_mesh(&geo).unwrap();

        prop_assert_eq!(pulled.num_faces(), mesh.num_faces());
        prop_assert!(pulled.num_points() <= mesh.num_points());
        for (a, b) in pulled.faces().zip(mesh.faces()) {
            let a: Vec<[f64; 3]> = a.iter().map(|&i| pulled.points()[i]).collect();
            let b: Vec<[f64; 3]> = b.iter().map(|&i| mesh.points()[i]).collect();
            prop_assert_eq!(a, b);
        }
        prop_assert_eq!(
            pulled.attributes.get(AttribLocation::Face, "zone").map(|a| a.data()),
            mesh.attributes.get(AttribLocation::Face, "zone").map(|a| a.data())
        );
    }

    /// String attributes compact to a first-occurrence table that rebuilds the input
    #[test]
    fn prop_categorical_compaction(
        labels in prop::collection::vec(prop::option::of("[a-d]{1,2}"), 1..50)
    ) {
        let mut geo = MemoryGeometry::new();
        for i in 0..labels.len() {
            geo.add_point([i as f64, 0.0, 0.0]);
        }
        prop_assert!(geo.add_attribute(ElementClass::Point, "label", StorageKind::String, 1));
        for (p, label) in labels.iter().enumerate() {
            if let Some(s) = label {
                geo.write_string(ElementClass::Point, "label", p, 0, s);
            }
        }

        let cloud = pull_point_cloud(&geo).unwrap();
        let attr = cloud.attributes.get(AttribLocation::Vertex, "label").unwrap();
        let AttributeData::Categorical { strings, indices } = attr.data() else {
            panic!("expected categorical data");
        };

        let mut seen: Vec<&str> = Vec::new();
        for label in labels.iter().flatten() {
            if !seen.contains(&label.as_str()) {
                seen.push(label.as_str());
            }
        }
        prop_assert_eq!(strings.iter().map(String::as_str).collect::<Vec<_>>(), seen);
        for (p, label) in labels.iter().enumerate() {
            prop_assert_eq!(attr.categorical_value(p, 0), label.as_deref());
            prop_assert_eq!(indices[p] == -1, label.is_none());
        }
    }
}
