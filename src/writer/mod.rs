//! Encoders for the writable mesh formats
//!
//! Each submodule serializes a [`MeshVariant`](crate::model::MeshVariant)
//! into the bytes of one file. Attribute selection goes through
//! [`crate::validator`] so every writer drops the same inconsistent data.

pub(crate) mod obj;
pub(crate) mod vtk;
pub(crate) mod xml;

use std::io::Write;

use crate::error::Result;
use crate::model::AttributeData;

/// Write values as text, `per_line` to a line
pub(crate) fn write_ascii_values<W: Write>(out: &mut W, data: &AttributeData, per_line: usize) -> Result<()> {
    fn lines<W: Write, T: std::fmt::Display>(out: &mut W, values: &[T], per_line: usize) -> Result<()> {
        for row in values.chunks(per_line.max(1)) {
            let mut first = true;
            for v in row {
                if !first {
                    out.write_all(b" ")?;
                }
                write!(out, "{}", v)?;
                first = false;
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }
    match data {
        AttributeData::I8(v) => lines(out, v, per_line),
        AttributeData::I32(v) => lines(out, v, per_line),
        AttributeData::I64(v) => lines(out, v, per_line),
        AttributeData::F32(v) => lines(out, v, per_line),
        AttributeData::F64(v) => lines(out, v, per_line),
        AttributeData::Categorical { indices, .. } => lines(out, indices, per_line),
    }
}

/// Raw bytes of numeric values in the requested byte order
pub(crate) fn value_bytes(data: &AttributeData, big_endian: bool) -> Vec<u8> {
    macro_rules! bytes {
        ($v:expr) => {
            $v.iter()
                .flat_map(|x| if big_endian { x.to_be_bytes() } else { x.to_le_bytes() })
                .collect()
        };
    }
    match data {
        AttributeData::I8(v) => v.iter().map(|&x| x as u8).collect(),
        AttributeData::I32(v) => bytes!(v),
        AttributeData::I64(v) => bytes!(v),
        AttributeData::F32(v) => bytes!(v),
        AttributeData::F64(v) => bytes!(v),
        AttributeData::Categorical { indices, .. } => bytes!(indices),
    }
}

/// Percent-encode characters that would split a whitespace-delimited name
pub(crate) fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_graphic() && b != b'%' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}
