//! Find and patch byte patterns, with wildcards, in an in-memory file image.
//!
//! ```
//! use hexpatch::{Pattern, Session};
//!
//! let mut session = Session::new(vec![0x74, 0x05, 0x90, 0x74, 0x05]);
//! let original = Pattern::from_hex("74 ??").unwrap();
//! let patch = Pattern::from_hex("EB ??").unwrap();
//! session.patch_all(&original, &patch, None, false).unwrap();
//! assert_eq!(&[0xEB, 0x05, 0x90, 0xEB, 0x05], session.bytes());
//! ```

pub mod patch;
pub mod pattern;
pub mod scan;
pub mod script;
pub mod session;

pub use patch::{apply, PatchOutcome};
pub use pattern::{PatchType, Pattern, Segment};
pub use scan::{search, ScanStrategy, Scanner};
pub use script::{Script, ScriptReport, Section};
pub use session::{MultiReport, Session};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid pattern token {token:?} at position {position}")]
    InvalidPatternSyntax { token: String, position: usize },

    #[error("Unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("Invalid mode {0:?}")]
    InvalidMode(String),

    #[error("Invalid offset {0:?}")]
    InvalidOffset(String),

    #[error("Offset 0x{offset:X} + {len} bytes is out of range for {size} bytes")]
    OffsetOutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("No matches found")]
    NoMatchFound,

    #[error("Patch failed at 0x{offset:X}: {outcome}")]
    Rejected { offset: usize, outcome: PatchOutcome },

    #[error("{0} is unset")]
    MissingKey(&'static str),

    #[error("Script line {line}: {reason}")]
    Script { line: usize, reason: String },

    #[error("Error processing patch: {name}: {source}")]
    Section {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parses a hexadecimal file offset, with or without a `0x` prefix.
pub fn parse_offset(str: &str) -> Result<usize> {
    let trimmed = str.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidOffset(str.to_owned()));
    }
    usize::from_str_radix(digits, 16).map_err(|_| Error::InvalidOffset(str.to_owned()))
}
