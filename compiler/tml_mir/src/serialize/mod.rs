//! MIR serialization: versioned binary format plus printer-backed text.
//!
//! ## Binary format
//!
//! ```text
//! header  = u32 magic ("MIR ") | u16 version_major | u16 version_minor
//! module  = string name | list struct_def | list enum_def
//!         | list function | list (string, constant)
//! string  = u32 length | bytes[length]
//! type    = u8 tag | tag-specific payload
//! instr   = u8 opcode | typed operands...
//! ```
//!
//! Every composite is length-prefixed; there are no backpatched
//! offsets, so the reader reconstructs the module in one forward pass
//! without the source. Multi-byte integers after the magic are
//! little-endian. Readers accept the same major version with the same
//! or a lower minor.
//!
//! ## Round trip
//!
//! `deserialize_binary(serialize_binary(m)) == m` for every well-formed
//! module; the text path preserves all observable fields the same way.

mod reader;
mod text;
mod writer;

use std::io::Write as _;
use std::path::Path;

use crate::model::MirModule;

pub use reader::deserialize_binary;
pub use text::{deserialize_text, TextParseError};
pub use writer::serialize_binary;

/// `"MIR "` in big-endian byte order at the start of the file.
pub const MAGIC: [u8; 4] = *b"MIR ";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Binary deserialization failure.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum DeserializeError {
    #[error("unsupported MIR version {major}.{minor} (reader is {VERSION_MAJOR}.{VERSION_MINOR})")]
    Version { major: u16, minor: u16 },
    #[error("corrupt MIR data at offset {offset}: {detail}")]
    Corrupt { offset: usize, detail: String },
    #[error("unexpected end of MIR data at offset {offset}")]
    Eof { offset: usize },
}

/// Failure reading a MIR file from disk.
#[derive(thiserror::Error, Debug)]
pub enum MirFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Binary(#[from] DeserializeError),
    #[error(transparent)]
    Text(#[from] TextParseError),
}

/// Serialize to text (printer-backed).
pub fn serialize_text(module: &MirModule) -> String {
    crate::printer::print_module(module)
}

/// Write a module to disk. `binary` picks the format; conventionally
/// `.mirb` for binary and `.mir` for text.
pub fn write_mir_file(
    path: impl AsRef<Path>,
    module: &MirModule,
    binary: bool,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    if binary {
        file.write_all(&serialize_binary(module))?;
    } else {
        file.write_all(serialize_text(module).as_bytes())?;
    }
    Ok(())
}

/// Read a module from disk, detecting the format by magic.
pub fn read_mir_file(path: impl AsRef<Path>) -> Result<MirModule, MirFileError> {
    let bytes = std::fs::read(path)?;
    if bytes.len() >= 4 && bytes[..4] == MAGIC {
        Ok(deserialize_binary(&bytes)?)
    } else {
        let text = String::from_utf8_lossy(&bytes);
        Ok(deserialize_text(&text)?)
    }
}

#[cfg(test)]
mod tests;
