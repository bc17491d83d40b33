//! VTK XML decoder for `UnstructuredGrid` (`.vtu`) and `PolyData` (`.vtp`)
//!
//! Supports `ascii`, inline `binary` (base64) and `appended` (raw or base64)
//! data arrays, `UInt32`/`UInt64` block headers, both byte orders and
//! `vtkZLibDataCompressor` compression. Multiple pieces are merged into one
//! mesh. Parallel files only reference external pieces and decode to
//! [`MeshVariant::None`].

use std::collections::HashMap;
use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use super::vtk::cell_type;
use super::{MeshAssembler, RawArray};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::{AttributeData, MeshVariant, ParserConfig, Point};

/// Format used for errors raised below [`parse`], which relabels them
const FORMAT: Format = Format::Vtu;

/// Default buffer capacity for XML parsing (4KB)
const XML_BUFFER_CAPACITY: usize = 4096;

/// Upper bound on the zlib expansion ratio used to size output buffers
const MAX_INFLATE_RATIO: usize = 1032;

fn error(message: impl Into<String>) -> Error {
    Error::parse(FORMAT, message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    UnstructuredGrid,
    PolyData,
    Parallel,
    Other,
}

/// File-wide settings from the `VTKFile` element
#[derive(Debug, Clone, Copy)]
struct FileInfo {
    kind: FileKind,
    order: ByteOrder,
    header_size: usize,
    compressed: bool,
}

impl Default for FileInfo {
    fn default() -> Self {
        Self {
            kind: FileKind::Other,
            order: ByteOrder::Little,
            header_size: 4,
            compressed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ScalarType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Int8" | "Char" => ScalarType::Int8,
            "UInt8" | "UChar" => ScalarType::UInt8,
            "Int16" => ScalarType::Int16,
            "UInt16" => ScalarType::UInt16,
            "Int32" => ScalarType::Int32,
            "UInt32" => ScalarType::UInt32,
            "Int64" => ScalarType::Int64,
            "UInt64" => ScalarType::UInt64,
            "Float32" => ScalarType::Float32,
            "Float64" => ScalarType::Float64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayFormat {
    Ascii,
    Binary,
    Appended,
}

/// Attributes of one `DataArray` element
#[derive(Debug, Clone)]
struct ArrayHeader {
    name: String,
    ty: Option<ScalarType>,
    type_name: String,
    components: usize,
    format: ArrayFormat,
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppendedEncoding {
    Raw,
    Base64,
}

/// Payload of the `AppendedData` element, starting after the `_` marker
struct Appended<'a> {
    encoding: AppendedEncoding,
    data: &'a [u8],
}

/// Piece section the reader is inside of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    PointData,
    CellData,
    Points,
    Cells,
    Verts,
    Lines,
    Strips,
    Polys,
}

/// Connectivity with end offsets, as stored in the file
#[derive(Debug, Default)]
struct Topology {
    connectivity: Vec<usize>,
    offsets: Vec<usize>,
}

impl Topology {
    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn cells(&self) -> Result<Vec<&[usize]>> {
        let mut start = 0;
        let mut out = Vec::with_capacity(self.offsets.len());
        for &end in &self.offsets {
            let cell = self
                .connectivity
                .get(start..end)
                .ok_or_else(|| error("cell offsets exceed connectivity"))?;
            out.push(cell);
            start = end;
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct Piece {
    points: Vec<Point>,
    cells: Topology,
    types: Vec<i64>,
    verts: Topology,
    lines: Topology,
    strips: Topology,
    polys: Topology,
    point_data: Vec<RawArray>,
    cell_data: Vec<RawArray>,
}

impl Piece {
    fn num_cells(&self, kind: FileKind) -> usize {
        match kind {
            FileKind::PolyData => {
                self.verts.len() + self.lines.len() + self.polys.len() + self.strips.len()
            }
            _ => self.types.len(),
        }
    }
}

/// Decode a VTK XML file as `format` (VTU or VTP)
///
/// Both flavours share one reader. Reading as VTP yields polygons or points
/// only; tetrahedra in an `UnstructuredGrid` are ignored.
pub fn parse(bytes: &[u8], format: Format, config: &ParserConfig) -> Result<MeshVariant> {
    decode(bytes, format, config).map_err(|e| e.for_format(format))
}

fn decode(bytes: &[u8], format: Format, _config: &ParserConfig) -> Result<MeshVariant> {
    let (xml, appended) = split_appended(bytes)?;
    let (info, pieces) = read_pieces(&xml, appended.as_ref())?;

    match info.kind {
        FileKind::Parallel => {
            warn!("Parallel VTK XML file references external pieces; nothing decoded");
            return Ok(MeshVariant::None);
        }
        FileKind::Other => {
            debug!("VTK XML dataset type is not a mesh");
            return Ok(MeshVariant::None);
        }
        FileKind::UnstructuredGrid | FileKind::PolyData => {}
    }
    assemble(format, info.kind, pieces)
}

/// Separate the XML markup from the raw `AppendedData` payload
///
/// Appended raw data is arbitrary binary, so the markup handed to the XML
/// reader stops at the `AppendedData` element and is closed artificially.
fn split_appended(bytes: &[u8]) -> Result<(Vec<u8>, Option<Appended<'_>>)> {
    let Some(start) = find(bytes, b"<AppendedData") else {
        return Ok((bytes.to_vec(), None));
    };
    let tag_end = find(&bytes[start..], b">")
        .map(|i| start + i)
        .ok_or_else(|| error("unterminated AppendedData element"))?;
    let tag = &bytes[start..=tag_end];

    let mut encoding = AppendedEncoding::Base64;
    let mut reader = Reader::from_reader(tag);
    let mut buf = Vec::new();
    if let Ok(Event::Start(e)) | Ok(Event::Empty(e)) = reader.read_event_into(&mut buf) {
        let attrs = parse_attributes(&e)?;
        if attrs.get("encoding").map(String::as_str) == Some("raw") {
            encoding = AppendedEncoding::Raw;
        }
    }

    let body = &bytes[tag_end + 1..];
    let marker = body
        .iter()
        .position(|&b| b == b'_')
        .ok_or_else(|| error("AppendedData is missing its '_' marker"))?;
    let data = &body[marker + 1..];

    let mut xml = bytes[..start].to_vec();
    xml.extend_from_slice(b"</VTKFile>");
    Ok((xml, Some(Appended { encoding, data })))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse attributes from an XML element
fn parse_attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::with_capacity(8);
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| error(format!("attribute name is not UTF-8: {}", e)))?;
        let value = std::str::from_utf8(&attr.value)
            .map_err(|e| error(format!("attribute value is not UTF-8: {}", e)))?;
        attrs.insert(key.to_string(), value.to_string());
    }
    Ok(attrs)
}

fn read_pieces(xml: &[u8], appended: Option<&Appended<'_>>) -> Result<(FileInfo, Vec<Piece>)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(XML_BUFFER_CAPACITY);
    let mut info = FileInfo::default();
    let mut pieces: Vec<Piece> = Vec::new();
    let mut piece: Option<Piece> = None;
    let mut section = Section::None;
    let mut array: Option<(ArrayHeader, Vec<u8>)> = None;

    loop {
        let event_result = reader.read_event_into(&mut buf);
        let is_empty_element = matches!(&event_result, Ok(Event::Empty(_)));

        match event_result {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"VTKFile" => info = file_info(&parse_attributes(e)?)?,
                    b"Piece" => {
                        piece = Some(Piece::default());
                        if is_empty_element {
                            pieces.extend(piece.take());
                        }
                    }
                    b"PointData" => section = Section::PointData,
                    b"CellData" => section = Section::CellData,
                    b"Points" => section = Section::Points,
                    b"Cells" => section = Section::Cells,
                    b"Verts" => section = Section::Verts,
                    b"Lines" => section = Section::Lines,
                    b"Strips" => section = Section::Strips,
                    b"Polys" => section = Section::Polys,
                    b"DataArray" => {
                        let header = array_header(&parse_attributes(e)?)?;
                        if is_empty_element {
                            let label = array_label(&header);
                            finish_array(&info, appended, piece.as_mut(), section, header, &[])
                                .map_err(|e| e.in_section(&label))?;
                        } else {
                            array = Some((header, Vec::new()));
                        }
                    }
                    _ => {}
                }
                if is_empty_element && name.as_ref() != b"DataArray" && name.as_ref() != b"Piece" {
                    section = close_section(section, name.as_ref());
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, text)) = array.as_mut() {
                    text.extend_from_slice(&t);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"DataArray" => {
                        if let Some((header, text)) = array.take() {
                            let label = array_label(&header);
                            finish_array(&info, appended, piece.as_mut(), section, header, &text)
                                .map_err(|e| e.in_section(&label))?;
                        }
                    }
                    b"Piece" => pieces.extend(piece.take()),
                    other => section = close_section(section, other),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml {
                    format: FORMAT,
                    source: e,
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok((info, pieces))
}

fn close_section(section: Section, name: &[u8]) -> Section {
    match name {
        b"PointData" | b"CellData" | b"Points" | b"Cells" | b"Verts" | b"Lines" | b"Strips"
        | b"Polys" => Section::None,
        _ => section,
    }
}

fn array_label(header: &ArrayHeader) -> String {
    format!("<DataArray Name=\"{}\">", header.name)
}

fn file_info(attrs: &HashMap<String, String>) -> Result<FileInfo> {
    let kind = match attrs.get("type").map(String::as_str) {
        Some("UnstructuredGrid") => FileKind::UnstructuredGrid,
        Some("PolyData") => FileKind::PolyData,
        Some("PUnstructuredGrid") | Some("PPolyData") => FileKind::Parallel,
        _ => FileKind::Other,
    };
    let order = match attrs.get("byte_order").map(String::as_str) {
        Some("BigEndian") => ByteOrder::Big,
        _ => ByteOrder::Little,
    };
    let header_size = match attrs.get("header_type").map(String::as_str) {
        Some("UInt64") => 8,
        Some("UInt32") | None => 4,
        Some(other) => return Err(error(format!("unsupported header_type '{}'", other))),
    };
    let compressed = match attrs.get("compressor").map(String::as_str) {
        None | Some("") => false,
        Some("vtkZLibDataCompressor") => true,
        Some(other) => return Err(Error::Unsupported(format!("VTK XML compressor '{}'", other))),
    };
    Ok(FileInfo {
        kind,
        order,
        header_size,
        compressed,
    })
}

fn array_header(attrs: &HashMap<String, String>) -> Result<ArrayHeader> {
    let type_name = attrs.get("type").cloned().unwrap_or_default();
    let components = match attrs.get("NumberOfComponents") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| Error::parse_value(FORMAT, "NumberOfComponents", v, "positive integer"))?,
        None => 1,
    };
    let format = match attrs.get("format").map(String::as_str) {
        None | Some("ascii") => ArrayFormat::Ascii,
        Some("binary") => ArrayFormat::Binary,
        Some("appended") => ArrayFormat::Appended,
        Some(other) => return Err(error(format!("unknown DataArray format '{}'", other))),
    };
    let offset = match attrs.get("offset") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| Error::parse_value(FORMAT, "DataArray offset", v, "non-negative integer"))?,
        None => 0,
    };
    Ok(ArrayHeader {
        name: attrs.get("Name").cloned().unwrap_or_default(),
        ty: ScalarType::parse(&type_name),
        type_name,
        components: components.max(1),
        format,
        offset,
    })
}

fn finish_array(
    info: &FileInfo,
    appended: Option<&Appended<'_>>,
    piece: Option<&mut Piece>,
    section: Section,
    header: ArrayHeader,
    text: &[u8],
) -> Result<()> {
    let Some(piece) = piece else {
        return Ok(());
    };
    if section == Section::None {
        return Ok(());
    }
    let Some(ty) = header.ty else {
        debug!(name = %header.name, ty = %header.type_name, "Skipping DataArray of unsupported type");
        return Ok(());
    };
    let data = decode_array(info, appended, &header, ty, text)?;

    match section {
        Section::None => {}
        Section::PointData => piece
            .point_data
            .push(RawArray::new(header.name, header.components, data)),
        Section::CellData => piece
            .cell_data
            .push(RawArray::new(header.name, header.components, data)),
        Section::Points => {
            let coords = data.to_numeric::<f64>().unwrap_or_default();
            if header.components != 3 || coords.len() % 3 != 0 {
                return Err(error("Points array must have 3 components"));
            }
            piece.points = coords.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        }
        Section::Cells | Section::Verts | Section::Lines | Section::Strips | Section::Polys => {
            let topology = match section {
                Section::Cells => &mut piece.cells,
                Section::Verts => &mut piece.verts,
                Section::Lines => &mut piece.lines,
                Section::Strips => &mut piece.strips,
                _ => &mut piece.polys,
            };
            let values = data.to_numeric::<i64>().unwrap_or_default();
            match header.name.as_str() {
                "connectivity" => topology.connectivity = to_indices(&values)?,
                "offsets" => topology.offsets = to_indices(&values)?,
                "types" if section == Section::Cells => piece.types = values,
                other => debug!(name = other, "Ignoring extra topology array"),
            }
        }
    }
    Ok(())
}

fn to_indices(values: &[i64]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| usize::try_from(v).map_err(|_| error(format!("negative index {}", v))))
        .collect()
}

fn decode_array(
    info: &FileInfo,
    appended: Option<&Appended<'_>>,
    header: &ArrayHeader,
    ty: ScalarType,
    text: &[u8],
) -> Result<AttributeData> {
    match header.format {
        ArrayFormat::Ascii => parse_ascii(text, ty),
        ArrayFormat::Binary => {
            let encoded: Vec<u8> = text.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            let bytes = decode_base64_block(&encoded, info)?;
            from_bytes(&bytes, ty, info.order)
        }
        ArrayFormat::Appended => {
            let appended = appended.ok_or_else(|| error("appended DataArray without AppendedData"))?;
            let src = appended
                .data
                .get(header.offset..)
                .ok_or_else(|| error(format!("appended offset {} is out of range", header.offset)))?;
            let bytes = match appended.encoding {
                AppendedEncoding::Raw => read_block(src, info)?,
                AppendedEncoding::Base64 => decode_base64_split(src, info)?,
            };
            from_bytes(&bytes, ty, info.order)
        }
    }
}

fn parse_ascii(text: &[u8], ty: ScalarType) -> Result<AttributeData> {
    let text = std::str::from_utf8(text).map_err(|_| error("ascii DataArray is not UTF-8"))?;
    let tokens = text.split_ascii_whitespace();
    fn all<T: std::str::FromStr>(tokens: std::str::SplitAsciiWhitespace<'_>) -> Result<Vec<T>> {
        tokens
            .map(|t| {
                t.parse::<T>()
                    .map_err(|_| Error::parse_value(FORMAT, "DataArray value", t, "number"))
            })
            .collect()
    }
    Ok(match ty {
        ScalarType::Int8 => AttributeData::I8(all(tokens)?),
        ScalarType::UInt8 | ScalarType::Int16 | ScalarType::UInt16 | ScalarType::Int32 => {
            AttributeData::I32(all(tokens)?)
        }
        ScalarType::UInt32 | ScalarType::Int64 => AttributeData::I64(all(tokens)?),
        ScalarType::UInt64 => AttributeData::I64(all::<u64>(tokens)?.into_iter().map(|v| v as i64).collect()),
        ScalarType::Float32 => AttributeData::F32(all(tokens)?),
        ScalarType::Float64 => AttributeData::F64(all(tokens)?),
    })
}

fn read_uint(bytes: &[u8], size: usize, order: ByteOrder) -> Result<usize> {
    let value = match (size, order) {
        (4, ByteOrder::Little) => u32::from_le_bytes(fixed(bytes)?) as u64,
        (4, ByteOrder::Big) => u32::from_be_bytes(fixed(bytes)?) as u64,
        (_, ByteOrder::Little) => u64::from_le_bytes(fixed(bytes)?),
        (_, ByteOrder::Big) => u64::from_be_bytes(fixed(bytes)?),
    };
    usize::try_from(value).map_err(|_| error("block size does not fit in memory"))
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| error("binary block header is truncated"))
}

/// Header of a binary block: either a byte count or the compression table
enum BlockHeader {
    Plain(usize),
    Compressed {
        block_size: usize,
        last_size: usize,
        sizes: Vec<usize>,
    },
}

impl BlockHeader {
    fn len(&self, info: &FileInfo) -> usize {
        match self {
            BlockHeader::Plain(_) => info.header_size,
            BlockHeader::Compressed { sizes, .. } => (3 + sizes.len()) * info.header_size,
        }
    }

    fn payload_len(&self) -> Result<usize> {
        match self {
            BlockHeader::Plain(n) => Ok(*n),
            BlockHeader::Compressed { sizes, .. } => sizes
                .iter()
                .try_fold(0usize, |acc, &n| acc.checked_add(n))
                .ok_or_else(|| error("compressed block sizes overflow")),
        }
    }

    fn parse(bytes: &[u8], info: &FileInfo) -> Result<Self> {
        let hs = info.header_size;
        let word = |i: usize| -> Result<usize> {
            let at = i * hs;
            read_uint(bytes.get(at..).unwrap_or_default(), hs, info.order)
        };
        if !info.compressed {
            return Ok(BlockHeader::Plain(word(0)?));
        }
        let count = word(0)?;
        let block_size = word(1)?;
        let last_size = word(2)?;
        // Every block needs its own header word
        let available = bytes.len() / hs;
        if count > available.saturating_sub(3) {
            return Err(error(format!(
                "compression header lists {} blocks but only {} bytes follow",
                count,
                bytes.len()
            )));
        }
        let sizes = (0..count).map(|i| word(3 + i)).collect::<Result<Vec<_>>>()?;
        Ok(BlockHeader::Compressed {
            block_size,
            last_size,
            sizes,
        })
    }

    /// Turn the payload bytes following the header into array bytes
    fn inflate(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match self {
            BlockHeader::Plain(n) => payload
                .get(..*n)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| error("binary block is truncated")),
            BlockHeader::Compressed {
                block_size,
                last_size,
                sizes,
            } => {
                let total = match sizes.len() {
                    0 => Some(0),
                    n => block_size
                        .checked_mul(n - 1)
                        .and_then(|full| full.checked_add(if *last_size == 0 { *block_size } else { *last_size })),
                }
                .ok_or_else(|| error("uncompressed size overflows"))?;
                let mut out = Vec::with_capacity(total.min(payload.len().saturating_mul(MAX_INFLATE_RATIO)));
                let mut start = 0usize;
                for &size in sizes {
                    let chunk = start
                        .checked_add(size)
                        .and_then(|end| payload.get(start..end))
                        .ok_or_else(|| error("compressed block is truncated"))?;
                    ZlibDecoder::new(chunk)
                        .read_to_end(&mut out)
                        .map_err(|e| error(format!("zlib decompression failed: {}", e)))?;
                    start += size;
                }
                Ok(out)
            }
        }
    }
}

/// Read a raw (unencoded) block: header followed by payload
fn read_block(src: &[u8], info: &FileInfo) -> Result<Vec<u8>> {
    let header = BlockHeader::parse(src, info)?;
    let payload = src
        .get(header.len(info)..)
        .ok_or_else(|| error("binary block is truncated"))?;
    header.inflate(payload)
}

fn base64_len(bytes: usize) -> Result<usize> {
    bytes
        .div_ceil(3)
        .checked_mul(4)
        .ok_or_else(|| error("base64 block size overflows"))
}

/// Decode an inline base64 block
///
/// Writers either encode the header and the payload separately or as one
/// stream. A single stream is tried first; separately padded parts make it
/// invalid, so the split layout is the fallback.
fn decode_base64_block(src: &[u8], info: &FileInfo) -> Result<Vec<u8>> {
    match STANDARD.decode(src) {
        Ok(all) => read_block(&all, info).or_else(|_| decode_base64_split(src, info)),
        Err(_) => decode_base64_split(src, info),
    }
}

/// Decode a base64 block whose header and payload are encoded separately
fn decode_base64_split(src: &[u8], info: &FileInfo) -> Result<Vec<u8>> {
    let hs = info.header_size;
    let first_words = if info.compressed { 3 } else { 1 };
    let mut header_chars = base64_len(first_words * hs)?;
    let leading = STANDARD.decode(
        src.get(..header_chars)
            .ok_or_else(|| error("base64 header is truncated"))?,
    )?;
    let header = if info.compressed {
        // The block count decides how long the encoded header is
        let count = read_uint(&leading, hs, info.order)?;
        let header_len = count
            .checked_add(3)
            .and_then(|words| words.checked_mul(hs))
            .ok_or_else(|| error("compression header size overflows"))?;
        header_chars = base64_len(header_len)?;
        let full = STANDARD.decode(
            src.get(..header_chars)
                .ok_or_else(|| error("base64 header is truncated"))?,
        )?;
        BlockHeader::parse(&full, info)?
    } else {
        BlockHeader::parse(&leading, info)?
    };
    let payload_chars = base64_len(header.payload_len()?)?;
    let payload = STANDARD.decode(
        header_chars
            .checked_add(payload_chars)
            .and_then(|end| src.get(header_chars..end))
            .ok_or_else(|| error("base64 payload is truncated"))?,
    )?;
    header.inflate(&payload)
}

fn from_bytes(bytes: &[u8], ty: ScalarType, order: ByteOrder) -> Result<AttributeData> {
    let size = ty.size();
    if bytes.len() % size != 0 {
        return Err(error(format!(
            "{} bytes cannot hold values of {} bytes",
            bytes.len(),
            size
        )));
    }
    macro_rules! decode {
        ($t:ty, $n:literal) => {
            bytes
                .chunks_exact($n)
                .map(|c| {
                    let mut a = [0u8; $n];
                    a.copy_from_slice(c);
                    match order {
                        ByteOrder::Little => <$t>::from_le_bytes(a),
                        ByteOrder::Big => <$t>::from_be_bytes(a),
                    }
                })
        };
    }
    Ok(match ty {
        ScalarType::Int8 => AttributeData::I8(bytes.iter().map(|&b| b as i8).collect()),
        ScalarType::UInt8 => AttributeData::I32(bytes.iter().map(|&b| b as i32).collect()),
        ScalarType::Int16 => AttributeData::I32(decode!(i16, 2).map(i32::from).collect()),
        ScalarType::UInt16 => AttributeData::I32(decode!(u16, 2).map(i32::from).collect()),
        ScalarType::Int32 => AttributeData::I32(decode!(i32, 4).collect()),
        ScalarType::UInt32 => AttributeData::I64(decode!(u32, 4).map(i64::from).collect()),
        ScalarType::Int64 => AttributeData::I64(decode!(i64, 8).collect()),
        ScalarType::UInt64 => AttributeData::I64(decode!(u64, 8).map(|v| v as i64).collect()),
        ScalarType::Float32 => AttributeData::F32(decode!(f32, 4).collect()),
        ScalarType::Float64 => AttributeData::F64(decode!(f64, 8).collect()),
    })
}

/// Concatenate same-named arrays across pieces
///
/// An array survives only if every piece has it with the same tuple size
/// and scalar kind.
fn merge_arrays(per_piece: Vec<Vec<RawArray>>) -> Vec<RawArray> {
    let mut iter = per_piece.into_iter();
    let Some(mut merged) = iter.next() else {
        return Vec::new();
    };
    for arrays in iter {
        let mut by_name: HashMap<String, RawArray> =
            arrays.into_iter().map(|a| (a.name.clone(), a)).collect();
        merged.retain_mut(|acc| {
            let Some(next) = by_name.remove(&acc.name) else {
                warn!(name = %acc.name, "Array missing from some pieces; dropped");
                return false;
            };
            if next.tuple_size != acc.tuple_size || !append_data(&mut acc.data, next.data) {
                warn!(name = %acc.name, "Array layout differs between pieces; dropped");
                return false;
            }
            true
        });
    }
    merged
}

fn append_data(acc: &mut AttributeData, next: AttributeData) -> bool {
    match (acc, next) {
        (AttributeData::I8(a), AttributeData::I8(b)) => a.extend(b),
        (AttributeData::I32(a), AttributeData::I32(b)) => a.extend(b),
        (AttributeData::I64(a), AttributeData::I64(b)) => a.extend(b),
        (AttributeData::F32(a), AttributeData::F32(b)) => a.extend(b),
        (AttributeData::F64(a), AttributeData::F64(b)) => a.extend(b),
        _ => return false,
    }
    true
}

fn assemble(format: Format, kind: FileKind, pieces: Vec<Piece>) -> Result<MeshVariant> {
    let total_points = pieces.iter().map(|p| p.points.len()).sum();
    let mut points: Vec<Point> = Vec::with_capacity(total_points);
    for p in &pieces {
        points.extend_from_slice(&p.points);
    }
    let mut asm = MeshAssembler::new(format, points);
    let keep_tets = format.supports_tets();

    let mut point_base = 0;
    let mut cell_base = 0;
    let mut ignored = 0;
    let shift = |cell: &[usize], base: usize| -> Vec<usize> { cell.iter().map(|&i| i + base).collect() };

    for p in &pieces {
        match kind {
            FileKind::PolyData => {
                let polys_base = cell_base + p.verts.len() + p.lines.len();
                for (i, cell) in p.polys.cells()?.into_iter().enumerate() {
                    asm.add_polygon(polys_base + i, &shift(cell, point_base));
                }
                ignored += p.verts.len() + p.lines.len() + p.strips.len();
            }
            _ => {
                let cells = p.cells.cells()?;
                if cells.len() != p.types.len() {
                    return Err(error(format!(
                        "{} cells but {} cell types",
                        cells.len(),
                        p.types.len()
                    )));
                }
                for (i, (cell, &ty)) in cells.into_iter().zip(&p.types).enumerate() {
                    let cell = shift(cell, point_base);
                    let id = cell_base + i;
                    match (u8::try_from(ty).unwrap_or(0), cell.len()) {
                        (cell_type::TRIANGLE, 3) | (cell_type::QUAD, 4) => asm.add_polygon(id, &cell),
                        (cell_type::POLYGON, n) if n >= 3 => asm.add_polygon(id, &cell),
                        (cell_type::PIXEL, 4) => asm.add_polygon(id, &[cell[0], cell[1], cell[3], cell[2]]),
                        (cell_type::TETRA, 4) if keep_tets => {
                            asm.add_tet(id, [cell[0], cell[1], cell[2], cell[3]])
                        }
                        _ => ignored += 1,
                    }
                }
            }
        }
        point_base += p.points.len();
        cell_base += p.num_cells(kind);
    }
    asm.set_num_cells(cell_base);
    if ignored > 0 {
        debug!(cells = ignored, "Ignored VTK cells of unsupported types");
    }
    if pieces.len() > 1 {
        debug!(pieces = pieces.len(), "Merging VTK XML pieces");
    }

    let (point_data, cell_data): (Vec<_>, Vec<_>) = pieces
        .into_iter()
        .map(|p| (p.point_data, p.cell_data))
        .unzip();
    for raw in merge_arrays(point_data) {
        asm.add_point_data(raw);
    }
    for raw in merge_arrays(cell_data) {
        asm.add_cell_data(raw);
    }
    asm.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttribLocation;

    fn parse_str(s: &str) -> Result<MeshVariant> {
        parse(s.as_bytes(), Format::Vtu, &ParserConfig::default())
    }

    #[test]
    fn test_ascii_unstructured_grid() {
        let src = r#"<?xml version="1.0"?>
<VTKFile type="UnstructuredGrid" version="0.1" byte_order="LittleEndian">
  <UnstructuredGrid>
    <Piece NumberOfPoints="4" NumberOfCells="1">
      <PointData>
        <DataArray type="Float32" Name="temp" format="ascii">1 2 3 4</DataArray>
      </PointData>
      <CellData>
        <DataArray type="Int32" Name="region" format="ascii">9</DataArray>
      </CellData>
      <Points>
        <DataArray type="Float64" NumberOfComponents="3" format="ascii">
          0 0 0 1 0 0 0 1 0 0 0 1
        </DataArray>
      </Points>
      <Cells>
        <DataArray type="Int64" Name="connectivity" format="ascii">0 1 2 3</DataArray>
        <DataArray type="Int64" Name="offsets" format="ascii">4</DataArray>
        <DataArray type="UInt8" Name="types" format="ascii">10</DataArray>
      </Cells>
    </Piece>
  </UnstructuredGrid>
</VTKFile>"#;
        let MeshVariant::TetMesh(mesh) = parse_str(src).unwrap() else {
            panic!("expected tet mesh");
        };
        assert_eq!(mesh.tets(), &[[0, 1, 2, 3]]);
        let temp: Vec<f32> = mesh.attributes.get_numeric_as(AttribLocation::Vertex, "temp").unwrap();
        assert_eq!(temp, vec![1.0, 2.0, 3.0, 4.0]);
        let region: Vec<i32> = mesh.attributes.get_numeric_as(AttribLocation::Cell, "region").unwrap();
        assert_eq!(region, vec![9]);
    }

    fn binary_block(payload: &[u8]) -> String {
        let header = (payload.len() as u64).to_le_bytes();
        format!("{}{}", STANDARD.encode(header), STANDARD.encode(payload))
    }

    #[test]
    fn test_inline_binary_polydata() {
        let pts: Vec<u8> = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let conn: Vec<u8> = [0i32, 1, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        let offs: Vec<u8> = 3i32.to_le_bytes().to_vec();
        let src = format!(
            r#"<VTKFile type="PolyData" version="1.0" byte_order="LittleEndian" header_type="UInt64">
<PolyData><Piece NumberOfPoints="3" NumberOfPolys="1">
<Points><DataArray type="Float32" NumberOfComponents="3" format="binary">{}</DataArray></Points>
<Polys>
<DataArray type="Int32" Name="connectivity" format="binary">{}</DataArray>
<DataArray type="Int32" Name="offsets" format="binary">{}</DataArray>
</Polys>
</Piece></PolyData></VTKFile>"#,
            binary_block(&pts),
            binary_block(&conn),
            binary_block(&offs)
        );
        let MeshVariant::PolygonMesh(mesh) = parse_str(&src).unwrap() else {
            panic!("expected polygon mesh");
        };
        assert_eq!(mesh.face(0), &[0, 1, 2]);
        assert_eq!(mesh.points()[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_appended_raw_data() {
        let mut appended = Vec::new();
        let pts: Vec<u8> = [0.0f64, 0.0, 0.0, 1.0, 1.0, 1.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        appended.extend_from_slice(&(pts.len() as u32).to_le_bytes());
        appended.extend_from_slice(&pts);

        let mut bytes = br#"<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
<PolyData><Piece NumberOfPoints="2">
<Points><DataArray type="Float64" NumberOfComponents="3" format="appended" offset="0"/></Points>
</Piece></PolyData>
<AppendedData encoding="raw">
_"#
        .to_vec();
        bytes.extend_from_slice(&appended);
        bytes.extend_from_slice(b"\n</AppendedData>\n</VTKFile>\n");

        let MeshVariant::PointCloud(cloud) = parse(&bytes, Format::Vtp, &ParserConfig::default()).unwrap() else {
            panic!("expected point cloud");
        };
        assert_eq!(cloud.points(), &[[0.0; 3], [1.0; 3]]);
    }

    #[test]
    fn test_compressed_inline_block() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let values: Vec<u8> = [1.5f32, 2.5, 3.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&values).unwrap();
        let compressed = enc.finish().unwrap();
        let mut header = Vec::new();
        for v in [1u32, values.len() as u32, values.len() as u32, compressed.len() as u32] {
            header.extend_from_slice(&v.to_le_bytes());
        }
        let text = format!("{}{}", STANDARD.encode(&header), STANDARD.encode(&compressed));
        let info = FileInfo {
            kind: FileKind::PolyData,
            order: ByteOrder::Little,
            header_size: 4,
            compressed: true,
        };
        let bytes = decode_base64_block(text.as_bytes(), &info).unwrap();
        assert_eq!(
            from_bytes(&bytes, ScalarType::Float32, ByteOrder::Little).unwrap(),
            AttributeData::F32(vec![1.5, 2.5, 3.5])
        );
    }

    #[test]
    fn test_big_endian_values() {
        let bytes: Vec<u8> = [7i32, -1].iter().flat_map(|v| v.to_be_bytes()).collect();
        assert_eq!(
            from_bytes(&bytes, ScalarType::Int32, ByteOrder::Big).unwrap(),
            AttributeData::I32(vec![7, -1])
        );
    }

    #[test]
    fn test_multiple_pieces_are_merged() {
        let piece = |x: f64, v: i32| {
            format!(
                r#"<Piece NumberOfPoints="3" NumberOfPolys="1">
<PointData><DataArray type="Int32" Name="v" format="ascii">{v} {v} {v}</DataArray></PointData>
<Points><DataArray type="Float64" NumberOfComponents="3" format="ascii">{x} 0 0 {x} 1 0 {x} 0 1</DataArray></Points>
<Polys>
<DataArray type="Int32" Name="connectivity" format="ascii">0 1 2</DataArray>
<DataArray type="Int32" Name="offsets" format="ascii">3</DataArray>
</Polys></Piece>"#
            )
        };
        let src = format!(
            r#"<VTKFile type="PolyData" version="0.1"><PolyData>{}{}</PolyData></VTKFile>"#,
            piece(0.0, 1),
            piece(5.0, 2)
        );
        let MeshVariant::PolygonMesh(mesh) = parse_str(&src).unwrap() else {
            panic!("expected polygon mesh");
        };
        assert_eq!(mesh.num_points(), 6);
        assert_eq!(mesh.face(1), &[3, 4, 5]);
        let v: Vec<i32> = mesh.attributes.get_numeric_as(AttribLocation::Vertex, "v").unwrap();
        assert_eq!(v, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_parallel_file_is_none() {
        let src = r#"<VTKFile type="PUnstructuredGrid" version="0.1">
<PUnstructuredGrid GhostLevel="0"><Piece Source="part0.vtu"/></PUnstructuredGrid></VTKFile>"#;
        assert!(parse_str(src).unwrap().is_none());
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_str("<VTKFile type=\"PolyData\"><PolyData></VTKFile>").unwrap_err();
        assert!(matches!(err, Error::Xml { format: Format::Vtu, .. }));
    }

    #[test]
    fn test_bad_ascii_value_has_context() {
        let src = r#"<VTKFile type="PolyData"><PolyData><Piece>
<Points><DataArray type="Float32" NumberOfComponents="3" format="ascii">0 x 0</DataArray></Points>
</Piece></PolyData></VTKFile>"#;
        let err = parse_str(src).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'x'"));
        assert!(msg.contains("DataArray"));
    }
}
