//! Type-erased per-element attribute storage

use crate::error::{Error, Result};
use std::fmt;

/// Element class an attribute is attached to
///
/// `Face`/`FaceVertex` are used by polygon meshes, `Cell`/`CellVertex` by
/// tetrahedral meshes. Corner attributes are stored flat in
/// primitive-then-local order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribLocation {
    /// One value per point
    Vertex,
    /// One value per polygon
    Face,
    /// One value per cell
    Cell,
    /// One value per polygon corner
    FaceVertex,
    /// One value per cell corner
    CellVertex,
}

impl AttribLocation {
    /// All locations in a stable order
    pub const ALL: [AttribLocation; 5] = [
        AttribLocation::Vertex,
        AttribLocation::Face,
        AttribLocation::Cell,
        AttribLocation::FaceVertex,
        AttribLocation::CellVertex,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            AttribLocation::Vertex => "vertex",
            AttribLocation::Face => "face",
            AttribLocation::Cell => "cell",
            AttribLocation::FaceVertex => "face-vertex",
            AttribLocation::CellVertex => "cell-vertex",
        }
    }

    /// Whether this location holds one value per primitive corner
    pub fn is_corner(&self) -> bool {
        matches!(self, AttribLocation::FaceVertex | AttribLocation::CellVertex)
    }

    /// Whether this location holds one value per primitive
    pub fn is_primitive(&self) -> bool {
        matches!(self, AttribLocation::Face | AttribLocation::Cell)
    }
}

impl fmt::Display for AttribLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar kind tag of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Signed 8-bit integers
    I8,
    /// Signed 32-bit integers
    I32,
    /// Signed 64-bit integers
    I64,
    /// 32-bit floats
    F32,
    /// 64-bit floats
    F64,
    /// String table plus per-component indices
    Categorical,
}

impl AttributeKind {
    /// Short type name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::I8 => "i8",
            AttributeKind::I32 => "i32",
            AttributeKind::I64 => "i64",
            AttributeKind::F32 => "f32",
            AttributeKind::F64 => "f64",
            AttributeKind::Categorical => "categorical",
        }
    }

    /// Whether the kind stores integers
    pub fn is_integer(&self) -> bool {
        matches!(self, AttributeKind::I8 | AttributeKind::I32 | AttributeKind::I64)
    }
}

/// Flat attribute payload
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    /// i8 values
    I8(Vec<i8>),
    /// i32 values
    I32(Vec<i32>),
    /// i64 values
    I64(Vec<i64>),
    /// f32 values
    F32(Vec<f32>),
    /// f64 values
    F64(Vec<f64>),
    /// Deduplicated string table with per-component indices (-1 = unset)
    Categorical {
        /// Unique strings
        strings: Vec<String>,
        /// Indices into `strings`
        indices: Vec<i64>,
    },
}

impl AttributeData {
    /// Kind tag of the payload
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeData::I8(_) => AttributeKind::I8,
            AttributeData::I32(_) => AttributeKind::I32,
            AttributeData::I64(_) => AttributeKind::I64,
            AttributeData::F32(_) => AttributeKind::F32,
            AttributeData::F64(_) => AttributeKind::F64,
            AttributeData::Categorical { .. } => AttributeKind::Categorical,
        }
    }

    /// Number of scalar values (for categorical data, the number of indices)
    pub fn len(&self) -> usize {
        match self {
            AttributeData::I8(v) => v.len(),
            AttributeData::I32(v) => v.len(),
            AttributeData::I64(v) => v.len(),
            AttributeData::F32(v) => v.len(),
            AttributeData::F64(v) => v.len(),
            AttributeData::Categorical { indices, .. } => indices.len(),
        }
    }

    /// Whether the payload holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the numeric values converted to `T`, or `None` for categorical data
    pub fn to_numeric<T: NumericScalar>(&self) -> Option<Vec<T>> {
        let out = match self {
            AttributeData::I8(v) => v.iter().map(|&x| T::from_i64(x as i64)).collect(),
            AttributeData::I32(v) => v.iter().map(|&x| T::from_i64(x as i64)).collect(),
            AttributeData::I64(v) => v.iter().map(|&x| T::from_i64(x)).collect(),
            AttributeData::F32(v) => v.iter().map(|&x| T::from_f64(x as f64)).collect(),
            AttributeData::F64(v) => v.iter().map(|&x| T::from_f64(x)).collect(),
            AttributeData::Categorical { .. } => return None,
        };
        Some(out)
    }

    /// Numeric value at a flat index widened to f64
    pub fn value_f64(&self, index: usize) -> Option<f64> {
        match self {
            AttributeData::I8(v) => v.get(index).map(|&x| x as f64),
            AttributeData::I32(v) => v.get(index).map(|&x| x as f64),
            AttributeData::I64(v) => v.get(index).map(|&x| x as f64),
            AttributeData::F32(v) => v.get(index).map(|&x| x as f64),
            AttributeData::F64(v) => v.get(index).copied(),
            AttributeData::Categorical { .. } => None,
        }
    }

    /// Numeric value at a flat index as i64 (floats truncate)
    pub fn value_i64(&self, index: usize) -> Option<i64> {
        match self {
            AttributeData::I8(v) => v.get(index).map(|&x| x as i64),
            AttributeData::I32(v) => v.get(index).map(|&x| x as i64),
            AttributeData::I64(v) => v.get(index).copied(),
            AttributeData::F32(v) => v.get(index).map(|&x| x as i64),
            AttributeData::F64(v) => v.get(index).map(|&x| x as i64),
            AttributeData::Categorical { .. } => None,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Numeric scalar types an attribute can store
///
/// Sealed: implemented for `i8`, `i32`, `i64`, `f32` and `f64` only.
/// Conversions between kinds saturate and truncate like `as` casts.
pub trait NumericScalar:
    sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + 'static
{
    /// Kind tag for this scalar
    const KIND: AttributeKind;

    /// Wrap a flat vector into the matching payload variant
    fn wrap(data: Vec<Self>) -> AttributeData;

    /// Borrow the payload if it has exactly this scalar type
    fn slice(data: &AttributeData) -> Option<&[Self]>;

    /// Convert from an integer
    fn from_i64(v: i64) -> Self;

    /// Convert from a float
    fn from_f64(v: f64) -> Self;

    /// Widen to i64
    fn to_i64(self) -> i64;

    /// Widen to f64
    fn to_f64(self) -> f64;
}

macro_rules! impl_numeric_scalar {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl NumericScalar for $ty {
            const KIND: AttributeKind = AttributeKind::$variant;

            fn wrap(data: Vec<Self>) -> AttributeData {
                AttributeData::$variant(data)
            }

            fn slice(data: &AttributeData) -> Option<&[Self]> {
                match data {
                    AttributeData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn from_i64(v: i64) -> Self {
                v as $ty
            }

            fn from_f64(v: f64) -> Self {
                v as $ty
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_numeric_scalar!(i8, I8);
impl_numeric_scalar!(i32, I32);
impl_numeric_scalar!(i64, I64);
impl_numeric_scalar!(f32, F32);
impl_numeric_scalar!(f64, F64);

/// A named attribute at one element location
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    location: AttribLocation,
    tuple_size: usize,
    data: AttributeData,
}

impl Attribute {
    /// Attribute name, unique per location within a store
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element location
    pub fn location(&self) -> AttribLocation {
        self.location
    }

    /// Number of scalar components per element
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Flat payload
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// Kind tag
    pub fn kind(&self) -> AttributeKind {
        self.data.kind()
    }

    /// Number of elements (flat length divided by the tuple size)
    pub fn element_count(&self) -> usize {
        self.data.len() / self.tuple_size
    }

    /// String value of one component of a categorical attribute
    ///
    /// Returns `None` for unset components (index -1), out-of-range elements
    /// and numeric attributes.
    pub fn categorical_value(&self, elem: usize, comp: usize) -> Option<&str> {
        if comp >= self.tuple_size {
            return None;
        }
        match &self.data {
            AttributeData::Categorical { strings, indices } => {
                let idx = *indices.get(elem * self.tuple_size + comp)?;
                if idx < 0 {
                    return None;
                }
                strings.get(idx as usize).map(String::as_str)
            }
            _ => None,
        }
    }
}

fn check_tuple_size(len: usize, tuple_size: usize) -> Result<()> {
    if tuple_size == 0 || len % tuple_size != 0 {
        return Err(Error::SizeMismatch { len, tuple_size });
    }
    Ok(())
}

/// Attribute table keyed by (location, name)
///
/// Insertion order is preserved so writers produce deterministic output.
/// Adding an attribute whose (location, name) already exists replaces the
/// old one in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    attributes: Vec<Attribute>,
}

impl AttributeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numeric attribute
    ///
    /// Fails with [`Error::SizeMismatch`] if `tuple_size` is zero or does not
    /// divide `data.len()`.
    pub fn add_numeric<T: NumericScalar>(
        &mut self,
        location: AttribLocation,
        name: impl Into<String>,
        tuple_size: usize,
        data: Vec<T>,
    ) -> Result<()> {
        check_tuple_size(data.len(), tuple_size)?;
        self.insert(Attribute {
            name: name.into(),
            location,
            tuple_size,
            data: T::wrap(data),
        });
        Ok(())
    }

    /// Add a categorical attribute
    ///
    /// Every index must lie in `[-1, strings.len())`; -1 marks an unset value.
    pub fn add_categorical(
        &mut self,
        location: AttribLocation,
        name: impl Into<String>,
        tuple_size: usize,
        strings: Vec<String>,
        indices: Vec<i64>,
    ) -> Result<()> {
        check_tuple_size(indices.len(), tuple_size)?;
        let len = strings.len();
        if let Some(&bad) = indices.iter().find(|&&i| i < -1 || i >= len as i64) {
            return Err(Error::InvalidIndex {
                index: bad,
                len,
                what: "categorical string table",
            });
        }
        self.insert(Attribute {
            name: name.into(),
            location,
            tuple_size,
            data: AttributeData::Categorical { strings, indices },
        });
        Ok(())
    }

    fn insert(&mut self, attr: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.location == attr.location && a.name == attr.name)
        {
            Some(existing) => *existing = attr,
            None => self.attributes.push(attr),
        }
    }

    /// Attributes at one location in store order
    ///
    /// The iterator is `Clone`, so it can be restarted.
    pub fn iter(
        &self,
        location: AttribLocation,
    ) -> impl Iterator<Item = &Attribute> + Clone + '_ {
        self.attributes
            .iter()
            .filter(move |a| a.location == location)
    }

    /// All attributes in store order
    pub fn iter_all(&self) -> std::slice::Iter<'_, Attribute> {
        self.attributes.iter()
    }

    /// Look up an attribute
    pub fn get(&self, location: AttribLocation, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.location == location && a.name == name)
    }

    /// Whether an attribute exists
    pub fn contains(&self, location: AttribLocation, name: &str) -> bool {
        self.get(location, name).is_some()
    }

    /// Remove and return an attribute
    pub fn remove(&mut self, location: AttribLocation, name: &str) -> Option<Attribute> {
        let pos = self
            .attributes
            .iter()
            .position(|a| a.location == location && a.name == name)?;
        Some(self.attributes.remove(pos))
    }

    /// Keep only attributes matching the predicate
    pub fn retain(&mut self, f: impl FnMut(&Attribute) -> bool) {
        self.attributes.retain(f);
    }

    /// Total number of attributes across all locations
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the store holds no attributes
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Element count of an attribute, if present
    pub fn element_count(&self, location: AttribLocation, name: &str) -> Option<usize> {
        self.get(location, name).map(Attribute::element_count)
    }

    /// Copy of a numeric attribute converted to `T`
    ///
    /// # Errors
    ///
    /// - [`Error::AttributeNotFound`] when no attribute has that (location, name)
    /// - [`Error::AttributeType`] when the attribute is categorical
    pub fn get_numeric_as<T: NumericScalar>(
        &self,
        location: AttribLocation,
        name: &str,
    ) -> Result<Vec<T>> {
        let attr = self
            .get(location, name)
            .ok_or_else(|| Error::AttributeNotFound {
                location,
                name: name.to_string(),
            })?;
        attr.data.to_numeric::<T>().ok_or_else(|| Error::AttributeType {
            location,
            name: name.to_string(),
            found: attr.kind().name(),
            expected: T::KIND.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_size_validation() {
        let mut store = AttributeStore::new();
        let err = store
            .add_numeric(AttribLocation::Vertex, "bad", 3, vec![0.0f32; 7])
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { len: 7, tuple_size: 3 }));

        store
            .add_numeric(AttribLocation::Vertex, "ok", 3, vec![0.0f32; 9])
            .unwrap();
        assert_eq!(store.element_count(AttribLocation::Vertex, "ok"), Some(3));

        let err = store
            .add_numeric::<i32>(AttribLocation::Vertex, "zero", 0, vec![])
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { tuple_size: 0, .. }));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut store = AttributeStore::new();
        store
            .add_numeric(AttribLocation::Vertex, "a", 1, vec![1i32])
            .unwrap();
        store
            .add_numeric(AttribLocation::Vertex, "b", 1, vec![2i32])
            .unwrap();
        store
            .add_numeric(AttribLocation::Vertex, "a", 1, vec![3.5f64])
            .unwrap();

        let names: Vec<_> = store.iter(AttribLocation::Vertex).map(|a| a.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(AttribLocation::Vertex, "a").unwrap().kind(),
            AttributeKind::F64
        );
    }

    #[test]
    fn test_same_name_different_locations() {
        let mut store = AttributeStore::new();
        store
            .add_numeric(AttribLocation::Vertex, "id", 1, vec![1i64, 2])
            .unwrap();
        store
            .add_numeric(AttribLocation::Face, "id", 1, vec![7i64])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.iter(AttribLocation::Face).count(), 1);
        assert_eq!(store.iter(AttribLocation::Cell).count(), 0);
    }

    #[test]
    fn test_iter_is_restartable() {
        let mut store = AttributeStore::new();
        for name in ["x", "y", "z"] {
            store
                .add_numeric(AttribLocation::Face, name, 1, vec![0i8])
                .unwrap();
        }
        let it = store.iter(AttribLocation::Face);
        let first: Vec<_> = it.clone().map(|a| a.name().to_string()).collect();
        let second: Vec<_> = it.map(|a| a.name().to_string()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_categorical_index_range() {
        let mut store = AttributeStore::new();
        let strings = vec!["a".to_string(), "b".to_string()];
        store
            .add_categorical(AttribLocation::Face, "tag", 1, strings.clone(), vec![0, 1, -1])
            .unwrap();

        let attr = store.get(AttribLocation::Face, "tag").unwrap();
        assert_eq!(attr.categorical_value(0, 0), Some("a"));
        assert_eq!(attr.categorical_value(1, 0), Some("b"));
        assert_eq!(attr.categorical_value(2, 0), None);
        assert_eq!(attr.categorical_value(3, 0), None);

        let err = store
            .add_categorical(AttribLocation::Face, "bad", 1, strings.clone(), vec![2])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { index: 2, len: 2, .. }));

        let err = store
            .add_categorical(AttribLocation::Face, "bad", 1, strings, vec![-2])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { index: -2, .. }));
    }

    #[test]
    fn test_get_numeric_as_converts() {
        let mut store = AttributeStore::new();
        store
            .add_numeric(AttribLocation::Vertex, "w", 2, vec![1.75f32, -2.5, 3.0, 4.0])
            .unwrap();

        let as_f64: Vec<f64> = store.get_numeric_as(AttribLocation::Vertex, "w").unwrap();
        assert_eq!(as_f64, vec![1.75, -2.5, 3.0, 4.0]);

        let as_i32: Vec<i32> = store.get_numeric_as(AttribLocation::Vertex, "w").unwrap();
        assert_eq!(as_i32, vec![1, -2, 3, 4]);
    }

    #[test]
    fn test_get_numeric_as_errors() {
        let mut store = AttributeStore::new();
        store
            .add_categorical(AttribLocation::Vertex, "s", 1, vec!["x".into()], vec![0])
            .unwrap();

        let err = store
            .get_numeric_as::<f32>(AttribLocation::Vertex, "missing")
            .unwrap_err();
        assert!(matches!(err, Error::AttributeNotFound { .. }));

        let err = store
            .get_numeric_as::<f32>(AttribLocation::Vertex, "s")
            .unwrap_err();
        match err {
            Error::AttributeType { found, expected, .. } => {
                assert_eq!(found, "categorical");
                assert_eq!(expected, "f32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remove_and_retain() {
        let mut store = AttributeStore::new();
        store
            .add_numeric(AttribLocation::Vertex, "a", 1, vec![1i32])
            .unwrap();
        store
            .add_numeric(AttribLocation::Cell, "b", 1, vec![1i32])
            .unwrap();
        assert!(store.remove(AttribLocation::Vertex, "a").is_some());
        assert!(store.remove(AttribLocation::Vertex, "a").is_none());
        store.retain(|a| a.location() != AttribLocation::Cell);
        assert!(store.is_empty());
    }

    #[test]
    fn test_value_accessors() {
        let data = AttributeData::I32(vec![4, -5]);
        assert_eq!(data.value_f64(1), Some(-5.0));
        assert_eq!(data.value_i64(0), Some(4));
        assert_eq!(data.value_i64(2), None);
        assert_eq!(i32::slice(&data), Some(&[4, -5][..]));
        assert_eq!(f32::slice(&data), None);
    }
}
