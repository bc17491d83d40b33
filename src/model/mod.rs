//! Portable mesh representations and their attribute storage

mod attribute;
mod config;
mod core;

pub use attribute::{
    AttribLocation, Attribute, AttributeData, AttributeKind, AttributeStore, NumericScalar,
};
pub use config::{ParserConfig, VtkEncoding, WriterConfig, XmlFormat};
pub use core::{MeshVariant, Point, PointCloud, PolygonMesh, TetMesh};
