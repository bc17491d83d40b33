//! Integration tests for VTU/VTP load/save through a host

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{mixed_host, textured_square, unit_tet};
use meshbridge::{
    AttribLocation, ElementClass, Error, Format, HostGeometry, MemoryGeometry, MeshVariant,
    ParserConfig, PrimitiveKind, WriterConfig, XmlFormat, load, save,
};

const QUAD_VTP: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="5" NumberOfVerts="1" NumberOfPolys="1">
      <PointData>
        <DataArray type="Float32" Name="height" format="ascii">0 1 2 3 4</DataArray>
      </PointData>
      <CellData>
        <DataArray type="Int32" Name="group" format="ascii">5 6</DataArray>
      </CellData>
      <Points>
        <DataArray type="Float32" NumberOfComponents="3" format="ascii">
          0 0 0  1 0 0  1 1 0  0 1 0  5 5 5
        </DataArray>
      </Points>
      <Verts>
        <DataArray type="Int32" Name="connectivity" format="ascii">4</DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">1</DataArray>
      </Verts>
      <Polys>
        <DataArray type="Int32" Name="connectivity" format="ascii">0 1 2 3</DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">4</DataArray>
      </Polys>
    </Piece>
  </PolyData>
</VTKFile>
"#;

fn configs() -> [WriterConfig; 3] {
    [
        WriterConfig::new().with_xml_format(XmlFormat::Ascii),
        WriterConfig::new(),
        WriterConfig::new().with_compression(true),
    ]
}

#[test]
fn test_load_polydata_cell_data_after_verts() {
    let mut geo = MemoryGeometry::new();
    let summary = load(&mut geo, Format::Vtp, QUAD_VTP.as_bytes(), &ParserConfig::default()).unwrap();

    assert_eq!(summary.points, 5);
    assert_eq!(summary.primitives, 1);
    assert_eq!(geo.primitive_kind(0), PrimitiveKind::Polygon);
    assert_eq!(geo.primitive_points(0), vec![0, 1, 2, 3]);
    // Verts come first in the cell order, so the polygon owns the second value
    assert_eq!(geo.read_i64(ElementClass::Primitive, "group", 0, 0), Some(6));
    assert_eq!(geo.read_f64(ElementClass::Point, "height", 4, 0), Some(4.0));
}

#[test]
fn test_polygon_mesh_round_trip_both_datasets() {
    let mut mesh = textured_square();
    mesh.attributes.remove(AttribLocation::FaceVertex, "uv");
    let mesh = MeshVariant::PolygonMesh(mesh);

    for format in [Format::Vtu, Format::Vtp] {
        for config in configs() {
            let bytes = mesh.to_bytes(format, &config).unwrap();
            let back = MeshVariant::from_bytes(format, &bytes, &ParserConfig::default()).unwrap();
            assert_eq!(back, mesh, "{} with {:?}", format, config);
        }
    }
}

#[test]
fn test_tetrahedra_round_trip_through_vtu() {
    let mesh = MeshVariant::TetMesh(unit_tet());
    for config in configs() {
        let bytes = mesh.to_bytes(Format::Vtu, &config).unwrap();
        let back = MeshVariant::from_bytes(Format::Vtu, &bytes, &ParserConfig::default()).unwrap();
        assert_eq!(back, mesh);
    }
}

#[test]
fn test_save_host_as_vtu_and_vtp() {
    let geo = mixed_host();

    let vtu = save(&geo, Format::Vtu, &WriterConfig::default()).unwrap();
    let MeshVariant::TetMesh(tets) =
        MeshVariant::from_bytes(Format::Vtu, &vtu, &ParserConfig::default()).unwrap()
    else {
        panic!("expected tetrahedra in the VTU file");
    };
    assert_eq!(tets.num_tets(), 2);

    // VTP cannot hold tetrahedra, so the host's quad is written instead
    let vtp = save(&geo, Format::Vtp, &WriterConfig::default()).unwrap();
    let MeshVariant::PolygonMesh(poly) =
        MeshVariant::from_bytes(Format::Vtp, &vtp, &ParserConfig::default()).unwrap()
    else {
        panic!("expected polygons in the VTP file");
    };
    assert_eq!(poly.num_faces(), 1);
    let ids: Vec<i64> = poly.attributes.get_numeric_as(AttribLocation::Vertex, "id").unwrap();
    assert_eq!(ids, vec![800, 900, 1000, 1100]);
}

#[test]
fn test_compressed_output_declares_compressor() {
    let mesh = MeshVariant::TetMesh(unit_tet());
    let bytes = mesh
        .to_bytes(Format::Vtu, &WriterConfig::new().with_compression(true))
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains(r#"compressor="vtkZLibDataCompressor""#));
    assert!(text.contains(r#"header_type="UInt64""#));
}

#[test]
fn test_parallel_file_loads_nothing() {
    let src = r#"<VTKFile type="PUnstructuredGrid" version="0.1">
<PUnstructuredGrid GhostLevel="0">
<PPoints><PDataArray type="Float32" NumberOfComponents="3"/></PPoints>
<Piece Source="part_0.vtu"/>
</PUnstructuredGrid>
</VTKFile>"#;
    let mut geo = mixed_host();
    let before = geo.clone();
    let summary = load(&mut geo, Format::Vtu, src.as_bytes(), &ParserConfig::default()).unwrap();
    assert!(summary.is_empty());
    assert_eq!(geo, before);
}

#[test]
fn test_malformed_xml_is_an_error() {
    let mut geo = MemoryGeometry::new();
    let err = load(
        &mut geo,
        Format::Vtu,
        b"<VTKFile type=\"UnstructuredGrid\"><Piece></VTKFile>",
        &ParserConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Xml { format: Format::Vtu, .. } | Error::Parse { .. }));
    assert_eq!(geo.num_points(), 0);
}

/// One tetrahedron followed by one triangle, with a value per cell
const TET_AND_TRIANGLE_VTU: &str = r#"<VTKFile type="UnstructuredGrid" version="0.1">
<UnstructuredGrid><Piece NumberOfPoints="5" NumberOfCells="2">
<CellData><DataArray type="Int32" Name="part" format="ascii">1 2</DataArray></CellData>
<Points><DataArray type="Float64" NumberOfComponents="3" format="ascii">
0 0 0 1 0 0 0 1 0 0 0 1 1 1 0
</DataArray></Points>
<Cells>
<DataArray type="Int64" Name="connectivity" format="ascii">0 1 2 3 1 4 2</DataArray>
<DataArray type="Int64" Name="offsets" format="ascii">4 7</DataArray>
<DataArray type="UInt8" Name="types" format="ascii">10 5</DataArray>
</Cells>
</Piece></UnstructuredGrid></VTKFile>"#;

#[test]
fn test_unstructured_grid_read_as_vtp_keeps_only_surfaces() {
    let bytes = TET_AND_TRIANGLE_VTU.as_bytes();

    let vtu = MeshVariant::from_bytes(Format::Vtu, bytes, &ParserConfig::default()).unwrap();
    assert!(matches!(vtu, MeshVariant::TetMesh(_)));

    let MeshVariant::PolygonMesh(poly) =
        MeshVariant::from_bytes(Format::Vtp, bytes, &ParserConfig::default()).unwrap()
    else {
        panic!("VTP decoding must not produce tetrahedra");
    };
    assert_eq!(poly.num_faces(), 1);
    assert_eq!(poly.face(0), &[1, 4, 2]);
    let part: Vec<i32> = poly.attributes.get_numeric_as(AttribLocation::Face, "part").unwrap();
    assert_eq!(part, vec![2]);
}

#[test]
fn test_tets_only_grid_read_as_vtp_is_a_point_cloud() {
    let src = TET_AND_TRIANGLE_VTU
        .replace(r#"NumberOfCells="2""#, r#"NumberOfCells="1""#)
        .replace("0 1 2 3 1 4 2", "0 1 2 3")
        .replace(">4 7<", ">4<")
        .replace(">10 5<", ">10<")
        .replace(">1 2<", ">1<");
    let mesh = MeshVariant::from_bytes(Format::Vtp, src.as_bytes(), &ParserConfig::default()).unwrap();
    assert!(matches!(mesh, MeshVariant::PointCloud(_)));
}

/// A `Points` array whose inline compressed block carries the given header words
fn compressed_points_vtu(header: &[u64], payload: &[u8]) -> String {
    let header: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
    format!(
        r#"<VTKFile type="UnstructuredGrid" version="1.0" header_type="UInt64" compressor="vtkZLibDataCompressor">
<UnstructuredGrid><Piece NumberOfPoints="1" NumberOfCells="0">
<Points><DataArray type="Float32" NumberOfComponents="3" format="binary">{}{}</DataArray></Points>
</Piece></UnstructuredGrid></VTKFile>"#,
        STANDARD.encode(header),
        STANDARD.encode(payload)
    )
}

#[test]
fn test_oversized_compression_headers_are_errors() {
    let mut geo = MemoryGeometry::new();
    for header in [
        vec![1, 1 << 63, 1 << 63, 4],
        vec![u64::MAX, 8, 8, 4],
        vec![2, 1 << 63, 0, 4, 4],
        vec![2, 8, 8, u64::MAX, u64::MAX],
    ] {
        let src = compressed_points_vtu(&header, b"junk");
        let err = load(&mut geo, Format::Vtu, src.as_bytes(), &ParserConfig::default()).unwrap_err();
        assert_eq!(err.format(), Some(Format::Vtu), "{:?}", header);
    }
    assert_eq!(geo.num_points(), 0);
}
