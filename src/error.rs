//! Error types for mesh decoding, encoding and attribute transfer
//!
//! All errors carry an error code for categorization and, for parse failures,
//! the format whose parser failed together with location context.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O errors
//! - **E2xxx**: Parse errors for a specific file format
//! - **E3xxx**: Mesh and attribute consistency errors
//! - **E4xxx**: Unsupported operations and missing geometry
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading or writing a file
//! - `E2001`: Malformed input for the claimed format
//! - `E2002`: XML parsing error inside a VTK XML file
//! - `E3001`: Attribute data length is not a multiple of its tuple size
//! - `E3002`: Index out of range (connectivity or categorical table)
//! - `E3003`: Attribute not found
//! - `E3004`: Attribute has an unexpected type
//! - `E4001`: Unsupported format operation
//! - `E4002`: No encodable geometry

use crate::format::Format;
use crate::model::AttribLocation;
use std::io;
use thiserror::Error;

/// Result type for mesh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Additional context for parse errors
///
/// Provides optional supplementary information to help users locate the
/// problem in the input:
/// - The section or element being parsed (e.g. `POINTS`, `<DataArray>`, `$Nodes`)
/// - Line and column numbers (when the format is line based or XML)
/// - A hint for resolving common issues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The section, keyword or element where the error occurred
    pub section: Option<String>,

    /// Line number where the error occurred
    pub line: Option<usize>,

    /// Column number where the error occurred
    pub column: Option<usize>,

    /// A helpful hint for resolving the error
    pub hint: Option<String>,
}

impl ErrorContext {
    /// Create a new empty error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an error context with just a hint
    pub fn with_hint(hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
            ..Self::default()
        }
    }

    /// Set the section
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Set the line number
    pub fn line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Set the column number
    pub fn column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Set the hint
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref section) = self.section {
            parts.push(format!("Section: {}", section));
        }

        if let (Some(line), Some(column)) = (self.line, self.column) {
            parts.push(format!("Location: line {}, column {}", line, column));
        } else if let Some(line) = self.line {
            parts.push(format!("Line: {}", line));
        }

        if let Some(ref hint) = self.hint {
            parts.push(format!("Hint: {}", hint));
        }

        if !parts.is_empty() {
            write!(f, "\n{}", parts.join("\n"))
        } else {
            Ok(())
        }
    }
}

/// Errors that can occur when decoding, encoding or transferring meshes
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing a file
    ///
    /// **Error Code**: E1001
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed input bytes for the claimed format
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Truncated file
    /// - Wrong file extension for the content
    /// - Counts in a section header that disagree with the data that follows
    ///
    /// The host geometry is not modified when decoding fails.
    #[error("[E2001] {format} parse error: {message}{context}")]
    Parse {
        /// The format whose parser failed
        format: Format,
        /// Description of the failure
        message: String,
        /// Location information
        context: ErrorContext,
    },

    /// XML parsing error inside a VTK XML file
    ///
    /// **Error Code**: E2002
    #[error("[E2002] {format} XML parsing error: {source}")]
    Xml {
        /// The VTK XML flavour being read
        format: Format,
        /// Underlying reader error
        #[source]
        source: quick_xml::Error,
    },

    /// XML writing error
    ///
    /// **Error Code**: E2003
    ///
    /// **Common Causes**:
    /// - I/O error while emitting a VTK XML document
    #[error("[E2003] XML writing error: {0}")]
    XmlWrite(String),

    /// Attribute data length is not a multiple of its tuple size
    ///
    /// **Error Code**: E3001
    #[error("[E3001] Size mismatch: {len} values cannot be split into tuples of {tuple_size}")]
    SizeMismatch {
        /// Length of the flat data array
        len: usize,
        /// Requested tuple size
        tuple_size: usize,
    },

    /// An index is outside the range of the table it refers to
    ///
    /// **Error Code**: E3002
    ///
    /// Raised for categorical indices outside `[-1, strings.len())` and for
    /// connectivity that references points that do not exist.
    #[error("[E3002] Invalid index {index}: {what} has {len} entries")]
    InvalidIndex {
        /// The offending index
        index: i64,
        /// Length of the referenced table
        len: usize,
        /// What the index refers to
        what: &'static str,
    },

    /// Attribute lookup failed
    ///
    /// **Error Code**: E3003
    #[error("[E3003] Attribute '{name}' not found at {location}")]
    AttributeNotFound {
        /// Element location that was searched
        location: AttribLocation,
        /// Attribute name
        name: String,
    },

    /// Attribute exists but holds data of an incompatible type
    ///
    /// **Error Code**: E3004
    #[error("[E3004] Attribute '{name}' at {location} has type {found}, expected {expected}")]
    AttributeType {
        /// Element location
        location: AttribLocation,
        /// Attribute name
        name: String,
        /// Stored data type
        found: &'static str,
        /// Requested data type
        expected: &'static str,
    },

    /// Unsupported format operation
    ///
    /// **Error Code**: E4001
    ///
    /// **Common Causes**:
    /// - Saving to a load-only format (MSH)
    /// - MSH versions other than 2.x and 4.1
    /// - A file extension that maps to no known format
    #[error("[E4001] Unsupported: {0}")]
    Unsupported(String),

    /// Nothing to encode
    ///
    /// **Error Code**: E4002
    ///
    /// **Common Causes**:
    /// - The host holds no points, polygons or tetrahedra
    /// - The mesh kind cannot be represented by the target format
    ///   (tetrahedra in OBJ or VTP)
    #[error("[E4002] No geometry: {0}")]
    NoGeometry(String),
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::parse(Format::Vtu, format!("Attribute parsing failed: {}", err))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::parse(Format::Vtu, format!("Invalid base64 payload: {}", err))
    }
}

impl Error {
    /// Create a parse error for the given format without location context
    pub fn parse(format: Format, message: impl Into<String>) -> Self {
        Error::Parse {
            format,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a parse error for the given format at a line
    pub fn parse_at(format: Format, line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            format,
            message: message.into(),
            context: ErrorContext::new().line(line),
        }
    }

    /// Create a parse error with full context
    pub fn parse_with_context(
        format: Format,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Error::Parse {
            format,
            message: message.into(),
            context,
        }
    }

    /// Create a parse error for a value that failed to convert
    ///
    /// # Arguments
    /// * `format` - The format being parsed
    /// * `field_name` - What was being parsed (e.g. "point coordinate")
    /// * `value` - The text that failed to parse
    /// * `expected_type` - The expected type (e.g. "floating-point number")
    pub fn parse_value(format: Format, field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::parse(
            format,
            format!(
                "Failed to parse {}: expected {}, got '{}'",
                field_name, expected_type, value
            ),
        )
    }

    /// Attach a line number to a parse error; other errors pass through
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Error::Parse {
                format,
                message,
                context,
            } if context.line.is_none() => Error::Parse {
                format,
                message,
                context: context.line(line),
            },
            other => other,
        }
    }

    /// Create an XmlWrite error
    pub fn xml_write(message: String) -> Self {
        Error::XmlWrite(message)
    }

    /// Attach a section name to a parse error; other errors pass through
    pub fn in_section(self, section: &str) -> Self {
        match self {
            Error::Parse {
                format,
                message,
                context,
            } if context.section.is_none() => Error::Parse {
                format,
                message,
                context: context.section(section),
            },
            other => other,
        }
    }

    /// Relabel a parse or XML error with the format that was requested
    ///
    /// The VTK XML reader serves both VTU and VTP; its errors are tagged
    /// with the caller's format at the decoder boundary.
    pub fn for_format(self, format: Format) -> Self {
        match self {
            Error::Parse {
                message, context, ..
            } => Error::Parse {
                format,
                message,
                context,
            },
            Error::Xml { source, .. } => Error::Xml { format, source },
            other => other,
        }
    }

    /// The format whose parser failed, if this is a parse error
    pub fn format(&self) -> Option<Format> {
        match self {
            Error::Parse { format, .. } | Error::Xml { format, .. } => Some(*format),
            _ => None,
        }
    }
}
