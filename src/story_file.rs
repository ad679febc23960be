//! The immutable on-disk story file: raw bytes plus the parsed header.

use crate::error::{Error, Result};
use crate::header::Header;
use std::fs;
use std::path::Path;

/// Per-version maximum story file size, in bytes (§3).
fn max_size_for_version(version: u8) -> usize {
    match version {
        1 | 2 | 3 => 128 * 1024,
        4 | 5 => 256 * 1024,
        6 | 7 | 8 => 512 * 1024,
        _ => 0,
    }
}

/// The story file's bytes, read-only for the life of the program. Only
/// [`crate::state::State`] ever copies a prefix of it into a mutable buffer.
#[derive(Debug, Clone)]
pub struct StoryFile {
    bytes: Vec<u8>,
    header: Header,
}

impl StoryFile {
    /// Load and validate a story file from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::from_bytes(bytes)
    }

    /// Validate and wrap an already-read byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Format("story file is empty".to_string()));
        }
        let version = bytes[0];
        if !matches!(version, 1..=8) {
            return Err(Error::Format(format!("unknown story version {version}")));
        }
        let max_size = max_size_for_version(version);
        if bytes.len() > max_size {
            return Err(Error::Format(format!(
                "story file too large: {} bytes exceeds the {} byte cap for version {version}",
                bytes.len(),
                max_size
            )));
        }
        if bytes.len() < 64 {
            return Err(Error::Format(
                "story file smaller than the 64-byte header".to_string(),
            ));
        }
        let header = Header::parse(&bytes)?;
        Ok(StoryFile { bytes, header })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Raw immutable byte access with bounds checking.
    pub fn byte(&self, addr: usize) -> Result<u8> {
        self.bytes
            .get(addr)
            .copied()
            .ok_or_else(|| Error::MemoryAccess(format!("read byte out of bounds at {addr:#06x}")))
    }

    /// Raw immutable word access (big-endian) with bounds checking.
    pub fn word(&self, addr: usize) -> Result<u16> {
        let hi = self.byte(addr)?;
        let lo = self.byte(addr + 1)?;
        Ok(((hi as u16) << 8) | lo as u16)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_v3_story() -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[0] = 3; // version
        bytes
    }

    #[test]
    fn rejects_empty_file() {
        assert!(StoryFile::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = minimal_v3_story();
        bytes[0] = 9;
        assert!(StoryFile::from_bytes(bytes).is_err());
    }

    #[test]
    fn rejects_oversized_file() {
        let mut bytes = vec![0u8; 128 * 1024 + 1];
        bytes[0] = 3;
        assert!(StoryFile::from_bytes(bytes).is_err());
    }

    #[test]
    fn accepts_minimal_v3_story() {
        let story = StoryFile::from_bytes(minimal_v3_story()).unwrap();
        assert_eq!(story.version(), 3);
        assert_eq!(story.size(), 128);
    }

    #[test]
    fn v6_parses_but_is_not_rejected_here() {
        let mut bytes = minimal_v3_story();
        bytes[0] = 6;
        // StoryFile itself accepts v6; only Interpreter::new rejects it.
        assert!(StoryFile::from_bytes(bytes).is_ok());
    }
}
