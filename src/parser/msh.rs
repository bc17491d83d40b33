//! Gmsh MSH decoder
//!
//! Reads the 2.2 and 4.1 layouts in both ASCII and binary encoding.
//! Triangles, quadrangles and tetrahedra are kept; other element types are
//! ignored. `$NodeData` and `$ElementData` blocks become `f64` attributes.
//! Nodes or elements a data block does not mention read as NaN, and blocks
//! sharing a name are merged with later values winning.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::{debug, warn};

use super::{MeshAssembler, RawArray};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::{AttributeData, MeshVariant, ParserConfig, Point};

const FORMAT: Format = Format::Msh;

/// Largest tuple a data block may declare (a 3x3 tensor)
const MAX_COMPONENTS: usize = 9;

mod element_type {
    pub const TRIANGLE: u32 = 2;
    pub const QUAD: u32 = 3;
    pub const TETRAHEDRON: u32 = 4;
}

/// Node count of each Gmsh element type
fn nodes_per_element(ty: u32) -> Option<usize> {
    Some(match ty {
        1 => 2,
        2 => 3,
        3 => 4,
        4 => 4,
        5 => 8,
        6 => 6,
        7 => 5,
        8 => 3,
        9 => 6,
        10 => 9,
        11 => 10,
        12 => 27,
        13 => 18,
        14 => 14,
        15 => 1,
        16 => 8,
        17 => 20,
        18 => 15,
        19 => 13,
        20 => 9,
        21 => 10,
        22 => 12,
        23 => 15,
        24 => 15,
        25 => 21,
        26 => 4,
        27 => 5,
        28 => 6,
        29 => 20,
        30 => 35,
        31 => 56,
        92 => 64,
        93 => 125,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V2,
    V41,
}

/// Layout settings from `$MeshFormat`
#[derive(Debug, Clone, Copy)]
struct Header {
    version: Version,
    binary: bool,
    big_endian: bool,
    /// Width of `size_t` fields in binary 4.1 files
    size_t: usize,
}

/// Byte cursor mixing text lines, text tokens and binary fields
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

    /// Next non-blank line, trimmed
    fn next_line(&mut self) -> Result<Option<&'a str>> {
        while self.pos < self.data.len() {
            let rest = &self.data[self.pos..];
            let (raw, consumed) = match rest.iter().position(|&b| b == b'\n') {
                Some(n) => (&rest[..n], n + 1),
                None => (rest, rest.len()),
            };
            let line = std::str::from_utf8(raw)
                .map_err(|_| self.error("text line is not valid UTF-8"))?
                .trim();
            self.pos += consumed;
            self.line += 1;
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn require_line(&mut self, what: &str) -> Result<&'a str> {
        self.next_line()?
            .ok_or_else(|| self.error(format!("unexpected end of file while reading {}", what)))
    }

    /// Next line parsed as a single value
    fn line_value<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let line = self.require_line(what)?;
        line.parse()
            .map_err(|_| Error::parse_value(FORMAT, what, line, std::any::type_name::<T>()).at_line(self.line - 1))
    }

    /// Next whitespace-separated token
    fn next_token(&mut self, what: &str) -> Result<&'a str> {
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
            return Err(self.error(format!("unexpected end of file while reading {}", what)));
        }
        std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| self.error(format!("{} is not valid UTF-8", what)))
    }

    fn token<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token(what)?;
        token
            .parse()
            .map_err(|_| Error::parse_value(FORMAT, what, token, std::any::type_name::<T>()).at_line(self.line))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error(format!("binary data of {} bytes is truncated", n)))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn fixed<const N: usize>(&mut self, h: &Header) -> Result<[u8; N]> {
        let mut a = [0u8; N];
        a.copy_from_slice(self.take(N)?);
        if h.big_endian {
            a.reverse();
        }
        Ok(a)
    }

    /// A C `int`: a token in ASCII files, 4 bytes in binary ones
    fn int(&mut self, h: &Header, what: &str) -> Result<i64> {
        if h.binary {
            Ok(i32::from_le_bytes(self.fixed(h)?) as i64)
        } else {
            self.token(what)
        }
    }

    /// A non-negative `int`, such as a tag or a type
    fn uint(&mut self, h: &Header, what: &str) -> Result<u64> {
        let v = self.int(h, what)?;
        u64::try_from(v).map_err(|_| self.error(format!("negative {} {}", what, v)))
    }

    /// A `size_t` field of the 4.1 layout
    fn size(&mut self, h: &Header, what: &str) -> Result<u64> {
        if !h.binary {
            return self.token(what);
        }
        Ok(match h.size_t {
            4 => u32::from_le_bytes(self.fixed(h)?) as u64,
            _ => u64::from_le_bytes(self.fixed(h)?),
        })
    }

    fn count(&mut self, h: &Header, what: &str) -> Result<usize> {
        let v = self.size(h, what)?;
        usize::try_from(v).map_err(|_| self.error(format!("{} {} is too large", what, v)))
    }

    fn double(&mut self, h: &Header, what: &str) -> Result<f64> {
        if h.binary {
            Ok(f64::from_le_bytes(self.fixed(h)?))
        } else {
            self.token(what)
        }
    }

    fn point(&mut self, h: &Header) -> Result<Point> {
        Ok([self.double(h, "x")?, self.double(h, "y")?, self.double(h, "z")?])
    }

    /// Consume the closing `$End<name>` line
    fn expect_end(&mut self, name: &str) -> Result<()> {
        let line = self
            .next_line()?
            .ok_or_else(|| self.error(format!("section ${} is never closed", name)))?;
        match line.strip_prefix("$End") {
            Some(end) if end == name => Ok(()),
            _ => Err(self.error(format!("expected $End{} but found {}", name, line))),
        }
    }

    /// Skip an uninterpreted section, which may hold binary data
    fn skip_section(&mut self, name: &str) -> Result<()> {
        let marker = format!("$End{}", name);
        let rest = &self.data[self.pos..];
        let at = rest
            .windows(marker.len())
            .position(|w| w == marker.as_bytes())
            .ok_or_else(|| self.error(format!("section ${} is never closed", name)))?;
        let end = at + marker.len();
        self.line += rest[..end].iter().filter(|&&b| b == b'\n').count();
        self.pos += end;
        Ok(())
    }
}

/// Initial capacity for a count read from the file
fn bounded(count: usize) -> usize {
    count.min(1 << 16)
}

fn mesh_format(cur: &mut Cursor<'_>) -> Result<Header> {
    let line = cur.require_line("MSH version")?;
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let file_type = parts.next().unwrap_or_default();
    let data_size = parts.next().unwrap_or("8");

    let version = match version {
        v if v.starts_with("2.") || v == "2" => Version::V2,
        "4.1" => Version::V41,
        other => return Err(Error::Unsupported(format!("MSH version {}", other))),
    };
    let binary = match file_type {
        "0" => false,
        "1" => true,
        other => {
            return Err(Error::parse_value(FORMAT, "MSH file type", other, "0 or 1").at_line(cur.line - 1));
        }
    };
    let size_t = match data_size {
        "4" => 4,
        "8" => 8,
        other => {
            return Err(Error::parse_value(FORMAT, "MSH data size", other, "4 or 8").at_line(cur.line - 1));
        }
    };

    let mut big_endian = false;
    if binary {
        let marker: [u8; 4] = cur
            .take(4)?
            .try_into()
            .map_err(|_| cur.error("endianness marker is truncated"))?;
        big_endian = if u32::from_le_bytes(marker) == 1 {
            false
        } else if u32::from_be_bytes(marker) == 1 {
            true
        } else {
            return Err(cur.error("binary MSH file has no valid endianness marker"));
        };
    }
    cur.expect_end("MeshFormat")?;
    Ok(Header {
        version,
        binary,
        big_endian,
        size_t,
    })
}

/// Nodes in file order with a tag lookup
#[derive(Default)]
struct Nodes {
    points: Vec<Point>,
    index: HashMap<u64, usize>,
}

impl Nodes {
    fn insert(&mut self, tag: u64, point: Point) {
        self.index.insert(tag, self.points.len());
        self.points.push(point);
    }

    fn lookup(&self, tag: u64, line: usize) -> Result<usize> {
        self.index.get(&tag).copied().ok_or_else(|| {
            Error::parse_at(FORMAT, line, format!("element references unknown node {}", tag))
        })
    }
}

fn read_nodes(cur: &mut Cursor<'_>, h: &Header) -> Result<Nodes> {
    let mut nodes = Nodes::default();
    match h.version {
        Version::V2 => {
            let count: usize = cur.line_value("node count")?;
            for _ in 0..count {
                let tag = cur.uint(h, "node tag")?;
                let p = cur.point(h)?;
                nodes.insert(tag, p);
            }
        }
        Version::V41 => {
            let blocks = cur.count(h, "entity block count")?;
            let _total = cur.size(h, "node count")?;
            let _min = cur.size(h, "min node tag")?;
            let _max = cur.size(h, "max node tag")?;
            for _ in 0..blocks {
                let dim = cur.int(h, "entity dimension")?;
                let _entity = cur.int(h, "entity tag")?;
                let parametric = cur.int(h, "parametric flag")?;
                let count = cur.count(h, "nodes in block")?;
                let mut tags = Vec::with_capacity(bounded(count));
                for _ in 0..count {
                    tags.push(cur.size(h, "node tag")?);
                }
                for tag in tags {
                    let p = cur.point(h)?;
                    if parametric != 0 {
                        for _ in 0..dim.clamp(0, 2) {
                            cur.double(h, "parametric coordinate")?;
                        }
                    }
                    nodes.insert(tag, p);
                }
            }
        }
    }
    cur.expect_end("Nodes")?;
    Ok(nodes)
}

/// Element tags in file order, with supported cells handed to the assembler
#[derive(Default)]
struct Elements {
    index: HashMap<u64, usize>,
    count: usize,
    ignored: usize,
}

impl Elements {
    fn record(
        &mut self,
        asm: &mut MeshAssembler,
        nodes: &Nodes,
        tag: u64,
        ty: u32,
        tags: &[u64],
        line: usize,
    ) -> Result<()> {
        let cell = self.count;
        self.count += 1;
        self.index.insert(tag, cell);
        if !add_element(asm, nodes, cell, ty, tags, line)? {
            self.ignored += 1;
        }
        Ok(())
    }

    /// An element of a type that is not decoded; it still takes a cell slot
    fn skip(&mut self, tag: u64) {
        self.index.insert(tag, self.count);
        self.count += 1;
        self.ignored += 1;
    }
}

fn add_element(
    asm: &mut MeshAssembler,
    nodes: &Nodes,
    cell: usize,
    ty: u32,
    tags: &[u64],
    line: usize,
) -> Result<bool> {
    if !matches!(
        ty,
        element_type::TRIANGLE | element_type::QUAD | element_type::TETRAHEDRON
    ) {
        return Ok(false);
    }
    let idx = tags
        .iter()
        .map(|&tag| nodes.lookup(tag, line))
        .collect::<Result<Vec<_>>>()?;
    match (ty, idx.as_slice()) {
        (element_type::TRIANGLE, [_, _, _]) | (element_type::QUAD, [_, _, _, _]) => {
            asm.add_polygon(cell, &idx);
            Ok(true)
        }
        (element_type::TETRAHEDRON, &[a, b, c, d]) => {
            asm.add_tet(cell, [a, b, c, d]);
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn parse_field<T: FromStr>(token: Option<&str>, what: &str, line: usize) -> Result<T> {
    let token = token.ok_or_else(|| Error::parse_at(FORMAT, line, format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| Error::parse_value(FORMAT, what, token, std::any::type_name::<T>()).at_line(line))
}

/// Node tags of one ASCII element line, checked against its type
fn element_nodes(fields: &[&str], ty: u32, line: usize) -> Result<Option<Vec<u64>>> {
    let Some(n) = nodes_per_element(ty) else {
        return Ok(None);
    };
    if fields.len() != n {
        return Err(Error::parse_at(
            FORMAT,
            line,
            format!("element type {} needs {} nodes, found {}", ty, n, fields.len()),
        ));
    }
    fields
        .iter()
        .map(|&f| parse_field(Some(f), "node tag", line))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn read_elements(
    cur: &mut Cursor<'_>,
    h: &Header,
    nodes: &Nodes,
    asm: &mut MeshAssembler,
) -> Result<Elements> {
    let mut elements = Elements::default();
    match (h.version, h.binary) {
        (Version::V2, false) => {
            let count: usize = cur.line_value("element count")?;
            for _ in 0..count {
                let text = cur.require_line("element")?;
                let line = cur.line - 1;
                let fields: Vec<&str> = text.split_whitespace().collect();
                let tag: u64 = parse_field(fields.first().copied(), "element tag", line)?;
                let ty: u32 = parse_field(fields.get(1).copied(), "element type", line)?;
                let ntags: usize = parse_field(fields.get(2).copied(), "tag count", line)?;
                let node_fields = 3usize
                    .checked_add(ntags)
                    .and_then(|start| fields.get(start..))
                    .ok_or_else(|| Error::parse_at(FORMAT, line, "element line ends inside its tags"))?;
                match element_nodes(node_fields, ty, line)? {
                    Some(tags) => elements.record(asm, nodes, tag, ty, &tags, line)?,
                    None => elements.skip(tag),
                }
            }
        }
        (Version::V2, true) => {
            let count: usize = cur.line_value("element count")?;
            while elements.count < count {
                let ty = u32::try_from(cur.uint(h, "element type")?).unwrap_or(u32::MAX);
                let follow = cur.uint(h, "elements in block")?;
                let ntags = cur.uint(h, "tag count")?;
                let n = nodes_per_element(ty)
                    .ok_or_else(|| cur.error(format!("unknown element type {} in binary data", ty)))?;
                if follow == 0 {
                    return Err(cur.error("binary element block is empty"));
                }
                for _ in 0..follow {
                    let tag = cur.uint(h, "element tag")?;
                    for _ in 0..ntags {
                        cur.int(h, "element tag value")?;
                    }
                    let line = cur.line;
                    let mut tags = Vec::with_capacity(n);
                    for _ in 0..n {
                        tags.push(cur.uint(h, "node tag")?);
                    }
                    elements.record(asm, nodes, tag, ty, &tags, line)?;
                }
            }
        }
        (Version::V41, binary) => {
            let blocks = cur.count(h, "entity block count")?;
            let _total = cur.size(h, "element count")?;
            let _min = cur.size(h, "min element tag")?;
            let _max = cur.size(h, "max element tag")?;
            for _ in 0..blocks {
                let _dim = cur.int(h, "entity dimension")?;
                let _entity = cur.int(h, "entity tag")?;
                let ty = u32::try_from(cur.uint(h, "element type")?).unwrap_or(u32::MAX);
                let count = cur.count(h, "elements in block")?;
                if binary {
                    let n = nodes_per_element(ty)
                        .ok_or_else(|| cur.error(format!("unknown element type {} in binary data", ty)))?;
                    for _ in 0..count {
                        let tag = cur.size(h, "element tag")?;
                        let line = cur.line;
                        let mut tags = Vec::with_capacity(n);
                        for _ in 0..n {
                            tags.push(cur.size(h, "node tag")?);
                        }
                        elements.record(asm, nodes, tag, ty, &tags, line)?;
                    }
                } else {
                    for _ in 0..count {
                        let text = cur.require_line("element")?;
                        let line = cur.line - 1;
                        let fields: Vec<&str> = text.split_whitespace().collect();
                        let tag: u64 = parse_field(fields.first().copied(), "element tag", line)?;
                        match element_nodes(fields.get(1..).unwrap_or_default(), ty, line)? {
                            Some(tags) => elements.record(asm, nodes, tag, ty, &tags, line)?,
                            None => elements.skip(tag),
                        }
                    }
                }
            }
        }
    }
    cur.expect_end("Elements")?;
    Ok(elements)
}

/// A `$NodeData` / `$ElementData` block
struct DataBlock {
    name: String,
    components: usize,
    entries: Vec<(u64, Vec<f64>, usize)>,
}

fn read_data(cur: &mut Cursor<'_>, h: &Header, section: &str, ordinal: usize) -> Result<DataBlock> {
    let string_tags: usize = cur.line_value("string tag count")?;
    let mut strings = Vec::with_capacity(bounded(string_tags));
    for _ in 0..string_tags {
        strings.push(cur.require_line("string tag")?.trim_matches('"'));
    }
    let real_tags: usize = cur.line_value("real tag count")?;
    for _ in 0..real_tags {
        cur.require_line("real tag")?;
    }
    let int_count: usize = cur.line_value("integer tag count")?;
    let mut ints = Vec::with_capacity(bounded(int_count));
    for _ in 0..int_count {
        ints.push(cur.line_value::<i64>("integer tag")?);
    }

    let int_tag = |i: usize, what: &str| -> Result<usize> {
        let v = *ints
            .get(i)
            .ok_or_else(|| cur.error(format!("${} is missing its {}", section, what)))?;
        usize::try_from(v).map_err(|_| cur.error(format!("negative {} {}", what, v)))
    };
    let components = int_tag(1, "component count")?;
    let count = int_tag(2, "entry count")?;
    if components == 0 || components > MAX_COMPONENTS {
        return Err(cur.error(format!(
            "data block has {} components; expected 1 to {}",
            components, MAX_COMPONENTS
        )));
    }

    let mut entries = Vec::with_capacity(bounded(count));
    for _ in 0..count {
        let tag = cur.uint(h, "data entity tag")?;
        let line = cur.line;
        let mut values = Vec::with_capacity(components);
        for _ in 0..components {
            values.push(cur.double(h, "data value")?);
        }
        entries.push((tag, values, line));
    }
    cur.expect_end(section)?;

    let name = match strings.first() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => format!("{}{}", section, ordinal),
    };
    Ok(DataBlock {
        name,
        components,
        entries,
    })
}

/// Scatter data blocks onto entity ordinals, merging blocks that share a name
fn scatter(
    blocks: Vec<DataBlock>,
    index: &HashMap<u64, usize>,
    len: usize,
    what: &str,
) -> Result<Vec<RawArray>> {
    let mut arrays: Vec<(String, usize, Vec<f64>)> = Vec::new();
    for block in blocks {
        let slot = match arrays.iter().position(|(n, _, _)| *n == block.name) {
            Some(i) if arrays[i].1 == block.components => i,
            Some(_) => {
                warn!(name = %block.name, "MSH data blocks disagree on component count; later block dropped");
                continue;
            }
            None => {
                let size = len
                    .checked_mul(block.components)
                    .ok_or_else(|| Error::parse(FORMAT, format!("data block '{}' is too large", block.name)))?;
                arrays.push((block.name.clone(), block.components, vec![f64::NAN; size]));
                arrays.len() - 1
            }
        };
        let ts = block.components;
        let values = &mut arrays[slot].2;
        let mut covered = 0;
        for (tag, tuple, line) in block.entries {
            let &at = index.get(&tag).ok_or_else(|| {
                Error::parse_at(FORMAT, line, format!("data refers to unknown {} {}", what, tag))
            })?;
            values[at * ts..(at + 1) * ts].copy_from_slice(&tuple);
            covered += 1;
        }
        if covered < len {
            debug!(name = %block.name, covered, total = len, "MSH data block covers only some {}s", what);
        }
    }
    Ok(arrays
        .into_iter()
        .map(|(name, ts, values)| RawArray::new(name, ts, AttributeData::F64(values)))
        .collect())
}

/// Decode a Gmsh MSH file
pub fn parse(bytes: &[u8], _config: &ParserConfig) -> Result<MeshVariant> {
    let mut cur = Cursor::new(bytes);
    let mut header: Option<Header> = None;
    let mut nodes: Option<Nodes> = None;
    let mut element_text: Option<usize> = None;
    let mut node_blocks = Vec::new();
    let mut element_blocks = Vec::new();
    let mut ordinal = 0;

    // Elements refer to nodes, so they are read in a second pass
    while let Some(line) = cur.next_line()? {
        let Some(name) = line.strip_prefix('$') else {
            return Err(cur.error(format!("expected a section header, found '{}'", line)));
        };
        let index = ordinal;
        ordinal += 1;
        let h = match (name, header) {
            ("MeshFormat", _) => {
                header = Some(mesh_format(&mut cur)?);
                continue;
            }
            (_, Some(h)) => h,
            (_, None) => return Err(cur.error("missing $MeshFormat section")),
        };
        match name {
            "Nodes" => nodes = Some(read_nodes(&mut cur, &h)?),
            "Elements" => {
                element_text = Some(cur.pos);
                cur.skip_section(name)?;
            }
            "NodeData" => node_blocks.push(read_data(&mut cur, &h, name, index)?),
            "ElementData" => element_blocks.push(read_data(&mut cur, &h, name, index)?),
            other => {
                debug!(section = other, "Skipping MSH section");
                cur.skip_section(other)?;
            }
        }
    }
    let Some(h) = header else {
        return Err(Error::parse(FORMAT, "missing $MeshFormat section"));
    };

    let nodes = nodes.unwrap_or_default();
    let mut asm = MeshAssembler::new(FORMAT, nodes.points.clone());

    let elements = match element_text {
        Some(pos) => {
            let mut ecur = Cursor::new(bytes);
            ecur.line = 1 + bytes[..pos].iter().filter(|&&b| b == b'\n').count();
            ecur.pos = pos;
            read_elements(&mut ecur, &h, &nodes, &mut asm)?
        }
        None => Elements::default(),
    };
    asm.set_num_cells(elements.count);
    if elements.ignored > 0 {
        debug!(elements = elements.ignored, "Ignored MSH elements of unsupported types");
    }

    for raw in scatter(node_blocks, &nodes.index, nodes.points.len(), "node")? {
        asm.add_point_data(raw);
    }
    for raw in scatter(element_blocks, &elements.index, elements.count, "element")? {
        asm.add_cell_data(raw);
    }
    asm.finish()
}
