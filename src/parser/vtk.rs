//! VTK legacy file decoder
//!
//! Reads `UNSTRUCTURED_GRID` and `POLYDATA` datasets in ASCII or big-endian
//! binary encoding, with both the classic count-prefixed cell layout and
//! the `OFFSETS`/`CONNECTIVITY` layout introduced in version 5.1.

use tracing::{debug, warn};

use super::{MeshAssembler, RawArray, percent_decode};
use crate::error::{Error, ErrorContext, Result};
use crate::format::Format;
use crate::model::{AttributeData, MeshVariant, ParserConfig, Point};

const FORMAT: Format = Format::VtkLegacy;

/// VTK cell type codes the decoder keeps
pub(crate) mod cell_type {
    pub const VERTEX: u8 = 1;
    pub const TRIANGLE: u8 = 5;
    pub const POLYGON: u8 = 7;
    pub const PIXEL: u8 = 8;
    pub const QUAD: u8 = 9;
    pub const TETRA: u8 = 10;
}

/// Byte cursor over a legacy file, mixing text lines and binary blocks
#[derive(Clone, Copy)]
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse_at(FORMAT, self.line, message)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Next line, possibly empty, without its terminator
    fn raw_line(&mut self) -> Result<Option<&'a str>> {
        if self.at_end() {
            return Ok(None);
        }
        let rest = &self.data[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(n) => (&rest[..n], n + 1),
            None => (rest, rest.len()),
        };
        let text = std::str::from_utf8(line)
            .map_err(|_| self.error("header line is not valid UTF-8"))?;
        self.pos += consumed;
        self.line += 1;
        Ok(Some(text.trim_end_matches('\r')))
    }

    /// Next non-blank line, trimmed
    fn next_line(&mut self) -> Result<Option<&'a str>> {
        while let Some(line) = self.raw_line()? {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed));
            }
        }
        Ok(None)
    }

    /// Next non-blank line without consuming it; `None` if it is not text
    fn peek_line(&self) -> Option<&'a str> {
        let mut ahead = *self;
        ahead.next_line().ok().flatten()
    }

    /// Next whitespace-separated token
    fn next_token(&mut self) -> Result<&'a str> {
        while let Some(&b) = self.data.get(self.pos) {
            if !b.is_ascii_whitespace() {
                break;
            }
            if b == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        let start = self.pos;
        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("unexpected end of file"));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| self.error("data value is not valid UTF-8"))
    }

    /// Next `n` raw bytes
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error(format!("binary block of {} bytes is truncated", n)))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}

/// Scalar type names that appear in data section headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    Bit,
    UnsignedChar,
    Char,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    IdType,
    Float,
    Double,
}

impl DataType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "bit" => DataType::Bit,
            "unsigned_char" => DataType::UnsignedChar,
            "char" => DataType::Char,
            "short" => DataType::Short,
            "unsigned_short" => DataType::UnsignedShort,
            "int" => DataType::Int,
            "unsigned_int" => DataType::UnsignedInt,
            "long" | "vtktypeint64" => DataType::Long,
            "unsigned_long" | "vtktypeuint64" => DataType::UnsignedLong,
            "vtkidtype" => DataType::IdType,
            "float" => DataType::Float,
            "double" => DataType::Double,
            _ => return None,
        })
    }
}

fn data_type(cur: &Cursor<'_>, token: Option<&str>) -> Result<DataType> {
    let token = token.ok_or_else(|| cur.error("missing data type"))?;
    DataType::parse(token).ok_or_else(|| cur.error(format!("unknown data type '{}'", token)))
}

fn parse_ascii<T: std::str::FromStr>(cur: &mut Cursor<'_>, what: &str) -> Result<T> {
    let token = cur.next_token()?;
    token.parse::<T>().map_err(|_| {
        Error::parse_value(FORMAT, what, token, "number").at_line(cur.line)
    })
}

/// Read `count` values of `dtype`
fn read_array(cur: &mut Cursor<'_>, dtype: DataType, count: usize, binary: bool) -> Result<AttributeData> {
    if !binary {
        return Ok(match dtype {
            DataType::Bit | DataType::Char => {
                AttributeData::I8(collect(count, || parse_ascii::<i8>(cur, "char value"))?)
            }
            DataType::UnsignedChar | DataType::Short | DataType::UnsignedShort | DataType::Int => {
                AttributeData::I32(collect(count, || parse_ascii::<i32>(cur, "integer value"))?)
            }
            DataType::UnsignedInt | DataType::Long | DataType::IdType => {
                AttributeData::I64(collect(count, || parse_ascii::<i64>(cur, "integer value"))?)
            }
            DataType::UnsignedLong => AttributeData::I64(collect(count, || {
                parse_ascii::<u64>(cur, "integer value").map(|v| v as i64)
            })?),
            DataType::Float => {
                AttributeData::F32(collect(count, || parse_ascii::<f32>(cur, "float value"))?)
            }
            DataType::Double => {
                AttributeData::F64(collect(count, || parse_ascii::<f64>(cur, "float value"))?)
            }
        });
    }

    Ok(match dtype {
        DataType::Bit => {
            let bytes = cur.take(count.div_ceil(8))?;
            AttributeData::I8(
                (0..count)
                    .map(|i| ((bytes[i / 8] >> (7 - i % 8)) & 1) as i8)
                    .collect(),
            )
        }
        DataType::Char => AttributeData::I8(cur.take(count)?.iter().map(|&b| b as i8).collect()),
        DataType::UnsignedChar => {
            AttributeData::I32(cur.take(count)?.iter().map(|&b| b as i32).collect())
        }
        DataType::Short => AttributeData::I32(
            chunks::<2>(cur, count)?
                .map(|b| i16::from_be_bytes(b) as i32)
                .collect(),
        ),
        DataType::UnsignedShort => AttributeData::I32(
            chunks::<2>(cur, count)?
                .map(|b| u16::from_be_bytes(b) as i32)
                .collect(),
        ),
        DataType::Int => AttributeData::I32(chunks::<4>(cur, count)?.map(i32::from_be_bytes).collect()),
        DataType::IdType => AttributeData::I64(
            chunks::<4>(cur, count)?
                .map(|b| i32::from_be_bytes(b) as i64)
                .collect(),
        ),
        DataType::UnsignedInt => AttributeData::I64(
            chunks::<4>(cur, count)?
                .map(|b| u32::from_be_bytes(b) as i64)
                .collect(),
        ),
        DataType::Long => AttributeData::I64(chunks::<8>(cur, count)?.map(i64::from_be_bytes).collect()),
        DataType::UnsignedLong => AttributeData::I64(
            chunks::<8>(cur, count)?
                .map(|b| u64::from_be_bytes(b) as i64)
                .collect(),
        ),
        DataType::Float => AttributeData::F32(chunks::<4>(cur, count)?.map(f32::from_be_bytes).collect()),
        DataType::Double => AttributeData::F64(chunks::<8>(cur, count)?.map(f64::from_be_bytes).collect()),
    })
}

fn collect<T>(count: usize, mut next: impl FnMut() -> Result<T>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        out.push(next()?);
    }
    Ok(out)
}

fn chunks<'a, const N: usize>(
    cur: &mut Cursor<'a>,
    count: usize,
) -> Result<impl Iterator<Item = [u8; N]> + use<'a, N>> {
    let len = count
        .checked_mul(N)
        .ok_or_else(|| cur.error("array size overflows"))?;
    let bytes = cur.take(len)?;
    Ok(bytes.chunks_exact(N).map(|c| {
        let mut a = [0u8; N];
        a.copy_from_slice(c);
        a
    }))
}

fn read_i64s(cur: &mut Cursor<'_>, dtype: DataType, count: usize, binary: bool) -> Result<Vec<i64>> {
    let data = read_array(cur, dtype, count, binary)?;
    data.to_numeric::<i64>()
        .ok_or_else(|| cur.error("expected integer data"))
}

/// Product of two header counts, rejecting values that overflow
fn count_product(cur: &Cursor<'_>, count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .ok_or_else(|| cur.error(format!("count too large: {} x {}", count, width)))
}

fn parse_count(cur: &Cursor<'_>, token: Option<&str>, what: &str) -> Result<usize> {
    let token = token.ok_or_else(|| cur.error(format!("missing {}", what)))?;
    token
        .parse::<usize>()
        .map_err(|_| Error::parse_value(FORMAT, what, token, "non-negative integer").at_line(cur.line))
}

/// A flat list of cells
#[derive(Debug, Default)]
struct CellBlock {
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
}

impl CellBlock {
    fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    fn cell(&self, i: usize) -> &[usize] {
        &self.connectivity[self.offsets[i]..self.offsets[i + 1]]
    }
}

fn to_index(cur: &Cursor<'_>, v: i64) -> Result<usize> {
    usize::try_from(v).map_err(|_| cur.error(format!("negative index {}", v)))
}

/// Read a cell section body (`CELLS`, `POLYGONS`, ...) after its header line
fn read_cells(cur: &mut Cursor<'_>, first: usize, second: usize, binary: bool) -> Result<CellBlock> {
    if let Some(line) = cur.peek_line() {
        if line.to_ascii_uppercase().starts_with("OFFSETS") {
            cur.next_line()?;
            let dtype = data_type(cur, line.split_whitespace().nth(1))?;
            let offsets = read_i64s(cur, dtype, first, binary)?;
            let conn_line = cur
                .next_line()?
                .ok_or_else(|| cur.error("missing CONNECTIVITY"))?;
            let mut parts = conn_line.split_whitespace();
            if !parts
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case("CONNECTIVITY"))
            {
                return Err(cur.error(format!("expected CONNECTIVITY, found '{}'", conn_line)));
            }
            let dtype = data_type(cur, parts.next())?;
            let connectivity = read_i64s(cur, dtype, second, binary)?;

            let offsets = offsets
                .into_iter()
                .map(|v| to_index(cur, v))
                .collect::<Result<Vec<_>>>()?;
            let connectivity = connectivity
                .into_iter()
                .map(|v| to_index(cur, v))
                .collect::<Result<Vec<_>>>()?;
            let valid = offsets.is_empty()
                || (offsets[0] == 0
                    && offsets.windows(2).all(|w| w[0] <= w[1])
                    && offsets.last() == Some(&connectivity.len()));
            if !valid {
                return Err(cur.error("cell offsets do not match connectivity"));
            }
            let offsets = if offsets.is_empty() { vec![0] } else { offsets };
            return Ok(CellBlock {
                offsets,
                connectivity,
            });
        }
    }

    let raw = read_i64s(cur, DataType::Int, second, binary)?;
    let mut block = CellBlock {
        offsets: Vec::with_capacity(first.min(raw.len()) + 1),
        connectivity: Vec::with_capacity(raw.len().saturating_sub(first)),
    };
    block.offsets.push(0);
    let mut i = 0;
    for _ in 0..first {
        let n = to_index(cur, *raw.get(i).ok_or_else(|| cur.error("cell list is shorter than declared"))?)?;
        let cell = (i + 1)
            .checked_add(n)
            .and_then(|end| raw.get(i + 1..end))
            .ok_or_else(|| cur.error("cell list is shorter than declared"))?;
        for &v in cell {
            block.connectivity.push(to_index(cur, v)?);
        }
        block.offsets.push(block.connectivity.len());
        i += 1 + n;
    }
    if i != raw.len() {
        return Err(cur.error(format!(
            "cell list size {} does not match its {} cells",
            second, first
        )));
    }
    Ok(block)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dataset {
    UnstructuredGrid,
    PolyData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    None,
    Point,
    Cell,
}

/// Everything read from the file before assembly
#[derive(Default)]
struct Sections {
    points: Vec<Point>,
    cells: Option<CellBlock>,
    cell_types: Vec<i64>,
    verts: CellBlock,
    lines: CellBlock,
    polys: CellBlock,
    strips: CellBlock,
    point_data: Vec<RawArray>,
    cell_data: Vec<RawArray>,
}

/// Decode a VTK legacy file
pub fn parse(bytes: &[u8], config: &ParserConfig) -> Result<MeshVariant> {
    let mut cur = Cursor::new(bytes);

    let header = cur.raw_line()?.ok_or_else(|| cur.error("empty file"))?;
    if !header.trim_start().to_ascii_lowercase().starts_with("# vtk datafile version") {
        return Err(Error::parse_with_context(
            FORMAT,
            "missing '# vtk DataFile Version' header",
            ErrorContext::new()
                .line(1)
                .hint("Legacy VTK files start with '# vtk DataFile Version x.y'"),
        ));
    }
    let _title = cur.raw_line()?.ok_or_else(|| cur.error("missing title line"))?;
    let encoding = cur.next_line()?.ok_or_else(|| cur.error("missing ASCII/BINARY line"))?;
    let binary = if encoding.eq_ignore_ascii_case("binary") {
        true
    } else if encoding.eq_ignore_ascii_case("ascii") {
        false
    } else {
        return Err(cur.error(format!("expected ASCII or BINARY, found '{}'", encoding)));
    };

    let dataset_line = cur.next_line()?.ok_or_else(|| cur.error("missing DATASET line"))?;
    let mut parts = dataset_line.split_whitespace();
    if !parts.next().is_some_and(|k| k.eq_ignore_ascii_case("DATASET")) {
        return Err(cur.error(format!("expected DATASET, found '{}'", dataset_line)));
    }
    let dataset = match parts.next().map(str::to_ascii_uppercase).as_deref() {
        Some("UNSTRUCTURED_GRID") => Dataset::UnstructuredGrid,
        Some("POLYDATA") => Dataset::PolyData,
        other => {
            debug!(dataset = ?other, "Unsupported VTK dataset type");
            return Ok(MeshVariant::None);
        }
    };

    let sections = read_sections(&mut cur, dataset, binary, config)?;
    assemble(&cur, dataset, sections)
}

fn read_sections(
    cur: &mut Cursor<'_>,
    dataset: Dataset,
    binary: bool,
    config: &ParserConfig,
) -> Result<Sections> {
    let mut s = Sections::default();
    let mut target = Target::None;
    let mut expected = 0usize;

    while let Some(line) = cur.next_line()? {
        let mut parts = line.split_whitespace();
        let keyword = parts.next().unwrap_or_default().to_ascii_uppercase();
        match keyword.as_str() {
            "POINTS" => {
                let n = parse_count(cur, parts.next(), "point count")?;
                let dtype = data_type(cur, parts.next())?;
                let coords = read_array(cur, dtype, count_product(cur, n, 3)?, binary)
                    .map_err(|e| e.in_section("POINTS"))?
                    .to_numeric::<f64>()
                    .unwrap_or_default();
                s.points = coords.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            }
            "CELLS" | "VERTICES" | "LINES" | "POLYGONS" | "TRIANGLE_STRIPS" => {
                let first = parse_count(cur, parts.next(), "cell count")?;
                let second = parse_count(cur, parts.next(), "cell list size")?;
                let block = read_cells(cur, first, second, binary).map_err(|e| e.in_section(&keyword))?;
                match keyword.as_str() {
                    "CELLS" => s.cells = Some(block),
                    "VERTICES" => s.verts = block,
                    "LINES" => s.lines = block,
                    "POLYGONS" => s.polys = block,
                    _ => s.strips = block,
                }
            }
            "CELL_TYPES" => {
                let n = parse_count(cur, parts.next(), "cell type count")?;
                s.cell_types = read_i64s(cur, DataType::Int, n, binary)
                    .map_err(|e| e.in_section("CELL_TYPES"))?;
            }
            "POINT_DATA" => {
                expected = parse_count(cur, parts.next(), "point data count")?;
                target = Target::Point;
            }
            "CELL_DATA" => {
                expected = parse_count(cur, parts.next(), "cell data count")?;
                target = Target::Cell;
            }
            "SCALARS" => {
                let name = attribute_name(cur, parts.next())?;
                let dtype = data_type(cur, parts.next())?;
                let ncomp = match parts.next() {
                    Some(t) => parse_count(cur, Some(t), "component count")?,
                    None => 1,
                };
                if let Some(next) = cur.peek_line() {
                    if next.to_ascii_uppercase().starts_with("LOOKUP_TABLE") {
                        cur.next_line()?;
                    }
                }
                let data = read_array(cur, dtype, count_product(cur, expected, ncomp)?, binary)
                    .map_err(|e| e.in_section("SCALARS"))?;
                push_array(&mut s, target, RawArray::new(name, ncomp, data));
            }
            "COLOR_SCALARS" => {
                let name = attribute_name(cur, parts.next())?;
                let ncomp = parse_count(cur, parts.next(), "component count")?;
                let count = count_product(cur, expected, ncomp)?;
                let data = if binary {
                    AttributeData::F32(cur.take(count)?.iter().map(|&b| b as f32 / 255.0).collect())
                } else {
                    read_array(cur, DataType::Float, count, false)?
                };
                push_array(&mut s, target, RawArray::new(name, ncomp, data));
            }
            "LOOKUP_TABLE" => {
                // Standalone table definition; colors are not kept
                let _name = parts.next();
                let size = parse_count(cur, parts.next(), "lookup table size")?;
                let count = count_product(cur, size, 4)?;
                if binary {
                    cur.take(count)?;
                } else {
                    read_array(cur, DataType::Float, count, false)?;
                }
            }
            "VECTORS" | "NORMALS" | "TENSORS" | "TENSORS6" => {
                let name = attribute_name(cur, parts.next())?;
                let dtype = data_type(cur, parts.next())?;
                let ncomp = match keyword.as_str() {
                    "TENSORS" => 9,
                    "TENSORS6" => 6,
                    _ => 3,
                };
                let data = read_array(cur, dtype, count_product(cur, expected, ncomp)?, binary)
                    .map_err(|e| e.in_section(&keyword))?;
                push_array(&mut s, target, RawArray::new(name, ncomp, data));
            }
            "TEXTURE_COORDINATES" => {
                let name = attribute_name(cur, parts.next())?;
                let dim = parse_count(cur, parts.next(), "texture dimension")?;
                let dtype = data_type(cur, parts.next())?;
                let data = read_array(cur, dtype, count_product(cur, expected, dim)?, binary)
                    .map_err(|e| e.in_section("TEXTURE_COORDINATES"))?;
                push_array(&mut s, target, RawArray::new(name, dim, data));
            }
            "FIELD" => {
                let _field_name = parts.next();
                let num_arrays = parse_count(cur, parts.next(), "field array count")?;
                read_field(cur, &mut s, target, num_arrays, binary).map_err(|e| e.in_section("FIELD"))?;
            }
            "METADATA" => skip_metadata(cur)?,
            _ if config.strict() => {
                return Err(cur.error(format!("unknown section '{}'", keyword)));
            }
            _ => {
                warn!(section = %keyword, line = cur.line, "Unknown VTK section; ignoring the rest of the file");
                break;
            }
        }
    }

    if dataset == Dataset::PolyData && s.cells.is_some() {
        debug!("CELLS section in POLYDATA ignored");
    }
    Ok(s)
}

fn attribute_name(cur: &Cursor<'_>, token: Option<&str>) -> Result<String> {
    token
        .map(percent_decode)
        .ok_or_else(|| cur.error("missing attribute name"))
}

fn push_array(s: &mut Sections, target: Target, raw: RawArray) {
    match target {
        Target::Point => s.point_data.push(raw),
        Target::Cell => s.cell_data.push(raw),
        Target::None => debug!(name = %raw.name, "Attribute outside POINT_DATA/CELL_DATA ignored"),
    }
}

fn read_field(
    cur: &mut Cursor<'_>,
    s: &mut Sections,
    target: Target,
    num_arrays: usize,
    binary: bool,
) -> Result<()> {
    let mut read = 0;
    while read < num_arrays {
        let line = cur
            .next_line()?
            .ok_or_else(|| cur.error("field data ends early"))?;
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        if name.eq_ignore_ascii_case("METADATA") {
            skip_metadata(cur)?;
            continue;
        }
        read += 1;
        if name == "NULL_ARRAY" {
            continue;
        }
        let ncomp = parse_count(cur, parts.next(), "component count")?;
        let ntuples = parse_count(cur, parts.next(), "tuple count")?;
        let dtype = data_type(cur, parts.next())?;
        let data = read_array(cur, dtype, count_product(cur, ntuples, ncomp)?, binary)?;
        push_array(s, target, RawArray::new(percent_decode(name), ncomp, data));
    }
    Ok(())
}

/// Skip a `METADATA` block, which ends at the first blank line
fn skip_metadata(cur: &mut Cursor<'_>) -> Result<()> {
    while let Some(line) = cur.raw_line()? {
        if line.trim().is_empty() {
            break;
        }
    }
    Ok(())
}

fn assemble(cur: &Cursor<'_>, dataset: Dataset, s: Sections) -> Result<MeshVariant> {
    let mut asm = MeshAssembler::new(FORMAT, s.points);
    let mut ignored = 0usize;

    match dataset {
        Dataset::UnstructuredGrid => {
            let cells = s.cells.unwrap_or_default();
            if cells.len() != s.cell_types.len() {
                return Err(cur.error(format!(
                    "{} cells but {} cell types",
                    cells.len(),
                    s.cell_types.len()
                )));
            }
            asm.set_num_cells(cells.len());
            for (i, &ty) in s.cell_types.iter().enumerate() {
                let cell = cells.cell(i);
                match (u8::try_from(ty).unwrap_or(0), cell.len()) {
                    (cell_type::TRIANGLE, 3) | (cell_type::QUAD, 4) => asm.add_polygon(i, cell),
                    (cell_type::POLYGON, n) if n >= 3 => asm.add_polygon(i, cell),
                    (cell_type::PIXEL, 4) => asm.add_polygon(i, &[cell[0], cell[1], cell[3], cell[2]]),
                    (cell_type::TETRA, 4) => asm.add_tet(i, [cell[0], cell[1], cell[2], cell[3]]),
                    _ => ignored += 1,
                }
            }
        }
        Dataset::PolyData => {
            let base = s.verts.len() + s.lines.len();
            asm.set_num_cells(base + s.polys.len() + s.strips.len());
            for i in 0..s.polys.len() {
                asm.add_polygon(base + i, s.polys.cell(i));
            }
            ignored = base + s.strips.len();
        }
    }
    if ignored > 0 {
        debug!(cells = ignored, "Ignored VTK cells of unsupported types");
    }

    for raw in s.point_data {
        asm.add_point_data(raw);
    }
    for raw in s.cell_data {
        asm.add_cell_data(raw);
    }
    asm.finish()
}
