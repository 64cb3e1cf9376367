//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout nxloc.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Most of these are *per-file* failures: batch operations (see
/// [`crate::pipeline`]) attach them to the file they concern and keep going.
/// Per-value problems such as a translation that does not fit its slot are
/// normally reported in result structs and only become an `Error` when a
/// strict mode is requested.
#[derive(Debug)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    BadMagic,
    /// A format version is present in the data but not supported by this
    /// parser.
    UnsupportedVersion(u16),
    /// A texture pixel format this crate cannot decode.
    UnsupportedFormat(u32),
    /// The stream ended before all expected bytes could be read.
    UnexpectedEof,
    /// A null-terminated string had no null terminator within the buffer.
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// The payload needs a compression dictionary but the set is empty.
    #[cfg(feature = "compression")]
    DictionaryNotFound,
    /// Zstandard decompression failed.
    #[cfg(feature = "compression")]
    Decompression {
        /// Dictionary that was tried, if any.
        dictionary: Option<String>,
        /// Every dictionary name the set offered.
        available: Vec<String>,
    },
    /// Zstandard compression failed.
    #[cfg(feature = "compression")]
    Compression(String),
    /// A replacement does not fit the fixed slot it must be written into.
    Overflow {
        /// Human-readable location of the value.
        key: String,
        /// Encoded size of the replacement in bytes.
        needed: usize,
        /// Bytes the slot can hold.
        available: usize,
    },
    /// A translated string carries a different set of control tags than its
    /// source.
    TagMismatch { expected: usize, found: usize },
}

impl Error {
    /// Whether this error means the input is corrupt or not the expected
    /// format.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::BadMagic
                | Error::UnsupportedVersion(_)
                | Error::UnsupportedFormat(_)
                | Error::UnexpectedEof
                | Error::UnterminatedName
                | Error::InvalidRange
                | Error::Parse(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadMagic => write!(f, "bad magic value"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported version: {v}"),
            Error::UnsupportedFormat(v) => write!(f, "unsupported pixel format: {v:#06x}"),
            Error::UnexpectedEof => write!(f, "unexpected end of file"),
            Error::UnterminatedName => write!(f, "unterminated string"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "compression")]
            Error::DictionaryNotFound => write!(f, "no compression dictionary available"),
            #[cfg(feature = "compression")]
            Error::Decompression {
                dictionary,
                available,
            } => write!(
                f,
                "zstd decompression failed (dictionary: {}, available: [{}])",
                dictionary.as_deref().unwrap_or("none"),
                available.join(", ")
            ),
            #[cfg(feature = "compression")]
            Error::Compression(s) => write!(f, "zstd compression failed: {s}"),
            Error::Overflow {
                key,
                needed,
                available,
            } => write!(
                f,
                "{key}: replacement needs {needed} bytes but the slot holds {available}"
            ),
            Error::TagMismatch { expected, found } => {
                write!(f, "tag mismatch: expected {expected} tags, found {found}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        }
    }
}
