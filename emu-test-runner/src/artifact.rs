//! Whole-file snapshots of the emulator's serial output.
//!
//! The emulator appends to the file while we read it. Every read takes the
//! complete current contents, so a torn trailing line is simply completed on
//! the next poll and no locking is needed.

use std::io::{self, ErrorKind};
use std::path::Path;

use crate::error::{ArtifactError, DecodeError};

/// Read and decode the serial output at `path`.
///
/// A file that does not exist yet reads as empty.
pub async fn read(path: &Path) -> Result<String, ArtifactError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
        Err(source) => {
            return Err(ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(decode(bytes)?)
}

/// Remove any serial output left at `path` by an earlier run.
pub async fn reset(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Decode bytes as 7-bit ASCII, keeping the raw buffer on failure.
pub fn decode(bytes: Vec<u8>) -> Result<String, DecodeError> {
    if let Some(offset) = bytes.iter().position(|b| !b.is_ascii()) {
        return Err(DecodeError {
            offset,
            byte: bytes[offset],
            raw: bytes,
        });
    }
    Ok(bytes.into_iter().map(char::from).collect())
}
