use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The emulator could not be started; no supervision loop is entered.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("emulator `{}` not found: {source}", .path.display())]
    EmulatorNotFound {
        path: PathBuf,
        #[source]
        source: which::Error,
    },

    #[error("test image `{}` does not exist or is not a file", .0.display())]
    TestImageMissing(PathBuf),

    #[error("failed to reset serial output `{}`", .path.display())]
    ArtifactReset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn emulator `{}`", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The serial output contained a byte outside 7-bit ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("serial output is not 7-bit text (byte 0x{byte:02x} at offset {offset})")]
pub struct DecodeError {
    pub offset: usize,
    pub byte: u8,
    pub raw: Vec<u8>,
}

impl DecodeError {
    /// The full raw buffer with non-printable bytes escaped.
    pub fn raw_escaped(&self) -> RawBytes<'_> {
        RawBytes(&self.raw)
    }
}

pub struct RawBytes<'a>(&'a [u8]);

impl fmt::Display for RawBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to read serial output `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
