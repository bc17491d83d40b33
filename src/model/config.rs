//! Decoder and encoder configuration

/// Configuration for decoding mesh files
///
/// # Example
///
/// ```
/// use meshbridge::ParserConfig;
///
/// let config = ParserConfig::new().with_strict(true);
/// assert!(config.strict());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserConfig {
    strict: bool,
}

impl ParserConfig {
    /// Create a lenient configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn unknown OBJ statements and unknown VTK legacy sections into
    /// parse errors instead of skipping them
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Whether strict mode is on
    pub fn strict(&self) -> bool {
        self.strict
    }
}

/// Data encoding for VTK legacy output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VtkEncoding {
    /// Human-readable text
    Ascii,
    /// Big-endian binary
    #[default]
    Binary,
}

/// `DataArray` format for VTK XML output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XmlFormat {
    /// Whitespace-separated text
    Ascii,
    /// Inline base64 with a UInt64 length header
    #[default]
    Binary,
}

/// Configuration for encoding mesh files
///
/// # Example
///
/// ```
/// use meshbridge::{VtkEncoding, WriterConfig, XmlFormat};
///
/// let config = WriterConfig::new()
///     .with_vtk_encoding(VtkEncoding::Ascii)
///     .with_xml_format(XmlFormat::Binary)
///     .with_compression(true);
/// assert!(config.compress());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterConfig {
    vtk_encoding: VtkEncoding,
    xml_format: XmlFormat,
    compress: bool,
}

impl WriterConfig {
    /// Binary VTK legacy, inline binary VTK XML, no compression
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the VTK legacy encoding
    pub fn with_vtk_encoding(mut self, encoding: VtkEncoding) -> Self {
        self.vtk_encoding = encoding;
        self
    }

    /// Set the VTK XML data array format
    pub fn with_xml_format(mut self, format: XmlFormat) -> Self {
        self.xml_format = format;
        self
    }

    /// Compress VTK XML binary arrays with zlib
    ///
    /// Has no effect on ASCII arrays.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// VTK legacy encoding
    pub fn vtk_encoding(&self) -> VtkEncoding {
        self.vtk_encoding
    }

    /// VTK XML data array format
    pub fn xml_format(&self) -> XmlFormat {
        self.xml_format
    }

    /// Whether XML binary arrays are compressed
    pub fn compress(&self) -> bool {
        self.compress
    }
}
