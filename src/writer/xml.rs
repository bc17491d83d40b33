//! VTK XML encoder for `UnstructuredGrid` and `PolyData` files
//!
//! Arrays are written inline, either as ascii text or as base64 with
//! `UInt64` block headers. With compression enabled, binary arrays are split
//! into zlib blocks the way `vtkZLibDataCompressor` lays them out.

use std::io::Write as IoWrite;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;

use super::{value_bytes, write_ascii_values};
use crate::error::{Error, Result};
use crate::model::{AttribLocation, Attribute, AttributeData, MeshVariant, WriterConfig, XmlFormat};
use crate::parser::vtk::cell_type;
use crate::validator::{report_unwritten, writable_attributes};

/// Uncompressed size of one zlib block
const BLOCK_SIZE: usize = 1 << 15;

/// Which VTK XML dataset to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// `.vtu`
    UnstructuredGrid,
    /// `.vtp`
    PolyData,
}

impl Dataset {
    fn name(self) -> &'static str {
        match self {
            Dataset::UnstructuredGrid => "UnstructuredGrid",
            Dataset::PolyData => "PolyData",
        }
    }
}

/// Cells flattened into the three arrays VTK XML stores
struct Topology {
    connectivity: Vec<i64>,
    offsets: Vec<i64>,
    types: Vec<u8>,
}

impl Topology {
    fn build(mesh: &MeshVariant) -> Result<Self> {
        let mut topo = Topology {
            connectivity: Vec::new(),
            offsets: Vec::new(),
            types: Vec::new(),
        };
        match mesh {
            MeshVariant::None => return Err(Error::NoGeometry("nothing to write as VTK XML".to_string())),
            MeshVariant::PointCloud(cloud) => {
                for i in 0..cloud.num_points() {
                    topo.push(&[i], cell_type::VERTEX);
                }
            }
            MeshVariant::PolygonMesh(poly) => {
                for face in poly.faces() {
                    let ty = match face.len() {
                        3 => cell_type::TRIANGLE,
                        4 => cell_type::QUAD,
                        _ => cell_type::POLYGON,
                    };
                    topo.push(face, ty);
                }
            }
            MeshVariant::TetMesh(tets) => {
                for tet in tets.tets() {
                    topo.push(tet, cell_type::TETRA);
                }
            }
        }
        Ok(topo)
    }

    fn push(&mut self, cell: &[usize], ty: u8) {
        self.connectivity.extend(cell.iter().map(|&i| i as i64));
        self.offsets.push(self.connectivity.len() as i64);
        self.types.push(ty);
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }
}

/// quick-xml writer plus the array encoding settings
struct XmlOut {
    writer: Writer<Vec<u8>>,
    format: XmlFormat,
    compress: bool,
}

impl XmlOut {
    fn start(&mut self, elem: BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        self.writer
            .write_event(Event::Start(elem))
            .map_err(|e| Error::xml_write(format!("Failed to write {} element: {}", name, e)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(|e| Error::xml_write(format!("Failed to close {} element: {}", name, e)))
    }

    fn data_array(&mut self, name: Option<&str>, ty: &str, components: usize, data: &AttributeData) -> Result<()> {
        let body = match self.format {
            XmlFormat::Ascii => {
                let mut text = Vec::new();
                write_ascii_values(&mut text, data, components)?;
                String::from_utf8_lossy(&text).trim_end().to_string()
            }
            XmlFormat::Binary => encode_binary(value_bytes(data, false), self.compress)?,
        };
        self.array_element(name, ty, components, &body)
    }

    /// `UInt8` array written from its bytes
    fn byte_array(&mut self, name: &str, values: &[u8]) -> Result<()> {
        let body = match self.format {
            XmlFormat::Ascii => values
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            XmlFormat::Binary => encode_binary(values.to_vec(), self.compress)?,
        };
        self.array_element(Some(name), "UInt8", 1, &body)
    }

    fn array_element(&mut self, name: Option<&str>, ty: &str, components: usize, body: &str) -> Result<()> {
        let mut elem = BytesStart::new("DataArray");
        elem.push_attribute(("type", ty));
        if let Some(name) = name {
            elem.push_attribute(("Name", name));
        }
        if components != 1 {
            elem.push_attribute(("NumberOfComponents", components.to_string().as_str()));
        }
        let format = match self.format {
            XmlFormat::Ascii => "ascii",
            XmlFormat::Binary => "binary",
        };
        elem.push_attribute(("format", format));
        self.start(elem)?;
        if !body.is_empty() {
            self.writer
                .write_event(Event::Text(BytesText::new(body)))
                .map_err(|e| Error::xml_write(format!("Failed to write DataArray values: {}", e)))?;
        }
        self.end("DataArray")
    }

    fn attributes(&mut self, section: &str, attrs: &[&Attribute]) -> Result<()> {
        if attrs.is_empty() {
            return Ok(());
        }
        self.start(BytesStart::new(section))?;
        for attr in attrs {
            self.data_array(
                Some(attr.name()),
                type_name(attr.data()),
                attr.tuple_size(),
                attr.data(),
            )?;
        }
        self.end(section)
    }

    fn cells(&mut self, section: &str, topo: &Topology, with_types: bool) -> Result<()> {
        self.start(BytesStart::new(section))?;
        self.data_array(
            Some("connectivity"),
            "Int64",
            1,
            &AttributeData::I64(topo.connectivity.clone()),
        )?;
        self.data_array(Some("offsets"), "Int64", 1, &AttributeData::I64(topo.offsets.clone()))?;
        if with_types {
            self.byte_array("types", &topo.types)?;
        }
        self.end(section)
    }
}

fn type_name(data: &AttributeData) -> &'static str {
    match data {
        AttributeData::I8(_) => "Int8",
        AttributeData::I32(_) | AttributeData::Categorical { .. } => "Int32",
        AttributeData::I64(_) => "Int64",
        AttributeData::F32(_) => "Float32",
        AttributeData::F64(_) => "Float64",
    }
}

/// Base64 text of one array: header and payload encoded separately
fn encode_binary(raw: Vec<u8>, compress: bool) -> Result<String> {
    if !compress {
        let header = (raw.len() as u64).to_le_bytes();
        return Ok(format!("{}{}", STANDARD.encode(header), STANDARD.encode(&raw)));
    }

    let mut header: Vec<u64> = vec![0, BLOCK_SIZE as u64, (raw.len() % BLOCK_SIZE) as u64];
    let mut payload = Vec::new();
    for block in raw.chunks(BLOCK_SIZE) {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(block)?;
        let compressed = enc.finish()?;
        header.push(compressed.len() as u64);
        payload.extend_from_slice(&compressed);
    }
    header[0] = (header.len() - 3) as u64;
    let header_bytes: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
    Ok(format!(
        "{}{}",
        STANDARD.encode(header_bytes),
        STANDARD.encode(&payload)
    ))
}

/// Encode a mesh as a VTK XML file
pub fn write(mesh: &MeshVariant, dataset: Dataset, config: &WriterConfig) -> Result<Vec<u8>> {
    if dataset == Dataset::PolyData && matches!(mesh, MeshVariant::TetMesh(_)) {
        return Err(Error::NoGeometry("PolyData cannot store tetrahedra".to_string()));
    }
    let topo = Topology::build(mesh)?;
    let points = mesh.points();
    let cell_location = match mesh {
        MeshVariant::TetMesh(_) => AttribLocation::Cell,
        _ => AttribLocation::Face,
    };
    let point_attrs = writable_attributes(mesh, AttribLocation::Vertex);
    let cell_attrs = writable_attributes(mesh, cell_location);
    report_unwritten(mesh, &[AttribLocation::Vertex, cell_location]);

    let compress = config.compress() && config.xml_format() == XmlFormat::Binary;
    let mut out = XmlOut {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        format: config.xml_format(),
        compress,
    };

    out.writer
        .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
        .map_err(|e| Error::xml_write(format!("Failed to write XML declaration: {}", e)))?;

    let mut root = BytesStart::new("VTKFile");
    root.push_attribute(("type", dataset.name()));
    root.push_attribute(("version", "1.0"));
    root.push_attribute(("byte_order", "LittleEndian"));
    root.push_attribute(("header_type", "UInt64"));
    if compress {
        root.push_attribute(("compressor", "vtkZLibDataCompressor"));
    }
    out.start(root)?;
    out.start(BytesStart::new(dataset.name()))?;

    let point_cloud = matches!(mesh, MeshVariant::PointCloud(_));
    let mut piece = BytesStart::new("Piece");
    piece.push_attribute(("NumberOfPoints", points.len().to_string().as_str()));
    match dataset {
        Dataset::UnstructuredGrid => {
            piece.push_attribute(("NumberOfCells", topo.len().to_string().as_str()));
        }
        Dataset::PolyData => {
            let (verts, polys) = if point_cloud { (topo.len(), 0) } else { (0, topo.len()) };
            piece.push_attribute(("NumberOfVerts", verts.to_string().as_str()));
            piece.push_attribute(("NumberOfLines", "0"));
            piece.push_attribute(("NumberOfStrips", "0"));
            piece.push_attribute(("NumberOfPolys", polys.to_string().as_str()));
        }
    }
    out.start(piece)?;

    out.attributes("PointData", &point_attrs)?;
    out.attributes("CellData", &cell_attrs)?;

    out.start(BytesStart::new("Points"))?;
    let flat: Vec<f64> = points.iter().flatten().copied().collect();
    out.data_array(None, "Float64", 3, &AttributeData::F64(flat))?;
    out.end("Points")?;

    match dataset {
        Dataset::UnstructuredGrid => out.cells("Cells", &topo, true)?,
        Dataset::PolyData if point_cloud => out.cells("Verts", &topo, false)?,
        Dataset::PolyData => out.cells("Polys", &topo, false)?,
    }

    out.end("Piece")?;
    out.end(dataset.name())?;
    out.end("VTKFile")?;

    let mut bytes = out.writer.into_inner();
    bytes.push(b'\n');
    debug!(dataset = dataset.name(), bytes = bytes.len(), compress, "Wrote VTK XML file");
    Ok(bytes)
}
