//! Tests for which geometry `save` picks and for file based load/save

mod common;

use common::{host_points, mixed_host, textured_square};
use meshbridge::{
    Error, Format, HostGeometry, MemoryGeometry, MeshVariant, ParserConfig, WriterConfig, load,
    load_file, save, save_file,
};
use tempfile::tempdir;

fn points_only_host() -> MemoryGeometry {
    let mut geo = MemoryGeometry::new();
    geo.add_point([0.0, 0.0, 0.0]);
    geo.add_point([1.0, 2.0, 3.0]);
    geo
}

#[test]
fn test_points_only_host_saves_as_point_cloud() {
    let geo = points_only_host();
    for format in [Format::VtkLegacy, Format::Vtu, Format::Vtp, Format::Obj] {
        let bytes = save(&geo, format, &WriterConfig::default()).unwrap();
        let mesh = MeshVariant::from_bytes(format, &bytes, &ParserConfig::default()).unwrap();
        assert!(
            matches!(mesh, MeshVariant::PointCloud(_)),
            "{} decoded as {}",
            format,
            mesh.kind_name()
        );
        assert_eq!(mesh.points(), host_points(&geo).as_slice());
    }
}

#[test]
fn test_empty_host_has_nothing_to_save() {
    let geo = MemoryGeometry::new();
    for format in [Format::VtkLegacy, Format::Vtu, Format::Vtp, Format::Obj] {
        assert!(matches!(
            save(&geo, format, &WriterConfig::default()),
            Err(Error::NoGeometry(_))
        ));
    }
}

#[test]
fn test_msh_export_is_unsupported() {
    let geo = points_only_host();
    let err = save(&geo, Format::Msh, &WriterConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert!(!Format::Msh.can_encode());
}

#[test]
fn test_tet_mesh_rejected_by_surface_formats() {
    let mesh = MeshVariant::TetMesh(common::unit_tet());
    for format in [Format::Obj, Format::Vtp] {
        assert!(matches!(
            mesh.to_bytes(format, &WriterConfig::default()),
            Err(Error::NoGeometry(_))
        ));
    }
    assert!(matches!(
        MeshVariant::None.to_bytes(Format::VtkLegacy, &WriterConfig::default()),
        Err(Error::NoGeometry(_))
    ));
}

#[test]
fn test_other_primitives_are_not_saved() {
    let mut geo = points_only_host();
    geo.add_other_primitive(&[0, 1]);
    // Only the points survive, as a cloud
    let bytes = save(&geo, Format::Vtu, &WriterConfig::default()).unwrap();
    let mesh = MeshVariant::from_bytes(Format::Vtu, &bytes, &ParserConfig::default()).unwrap();
    assert!(matches!(mesh, MeshVariant::PointCloud(_)));
}

#[test]
fn test_file_round_trip_by_extension() {
    let dir = tempdir().unwrap();
    let geo = mixed_host();

    for name in ["mesh.vtk", "mesh.VTU", "mesh.vtp", "mesh.obj"] {
        let path = dir.path().join(name);
        save_file(&geo, &path, &WriterConfig::default()).unwrap();

        let mut back = MemoryGeometry::new();
        let summary = load_file(&mut back, &path, &ParserConfig::default()).unwrap();
        assert!(summary.primitives > 0, "{} loaded no primitives", name);
        assert!(back.num_points() < geo.num_points());
    }
}

#[test]
fn test_mesh_variant_file_helpers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("square.vtp");
    let mut square = textured_square();
    square.attributes.remove(meshbridge::AttribLocation::FaceVertex, "uv");
    let mesh = MeshVariant::PolygonMesh(square);

    mesh.write_file(&path, &WriterConfig::new().with_compression(true)).unwrap();
    let back = MeshVariant::read_file(&path, &ParserConfig::default()).unwrap();
    assert_eq!(back, mesh);
}

#[test]
fn test_unknown_extension_is_unsupported() {
    let dir = tempdir().unwrap();
    let geo = points_only_host();

    let err = save_file(&geo, dir.path().join("mesh.stl"), &WriterConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert!(err.to_string().contains("mesh.stl"));

    let mut target = MemoryGeometry::new();
    let err = load_file(&mut target, dir.path().join("noext"), &ParserConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let mut geo = MemoryGeometry::new();
    let err = load_file(&mut geo, dir.path().join("absent.obj"), &ParserConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().starts_with("[E1001]"));
}

#[test]
fn test_load_appends_to_existing_geometry() {
    let mut geo = points_only_host();
    let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    load(&mut geo, Format::Obj, obj, &ParserConfig::default()).unwrap();
    load(&mut geo, Format::Obj, obj, &ParserConfig::default()).unwrap();

    assert_eq!(geo.num_points(), 8);
    assert_eq!(geo.num_primitives(), 2);
    assert_eq!(geo.primitive_points(1), vec![5, 6, 7]);
}

#[test]
fn test_format_detection() {
    assert_eq!(Format::from_path("a/b/part.PVTU"), Some(Format::Vtu));
    assert_eq!(Format::from_path("x.msh"), Some(Format::Msh));
    assert_eq!(Format::from_path("x.stl"), None);
    assert_eq!(Format::from_path("no_extension"), None);
    for format in Format::ALL {
        assert_eq!(Format::from_extension(format.extension()), Some(format));
    }
}
