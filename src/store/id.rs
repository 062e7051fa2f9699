//! Artifact identifiers and kinds
//!
//! An artifact id doubles as its filename, so the token grammar is the
//! path-traversal defense: ids that could escape the storage
//! directories are rejected before any filesystem access.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Maximum accepted id length (UUID + prefix + extension fits well under this)
const MAX_ID_LEN: usize = 120;

/// Which directory an artifact lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Uploaded as-is (stored under `incoming/`)
    Original,
    /// Produced by a transform (stored under `derived/`)
    Derived,
}

impl ArtifactKind {
    /// Directory name under the storage root
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Original => "incoming",
            ArtifactKind::Derived => "derived",
        }
    }

    /// Map the public URL segment (`original` / `transformed`) to a kind
    pub fn from_public_segment(segment: &str) -> Option<Self> {
        match segment {
            "original" => Some(ArtifactKind::Original),
            "transformed" => Some(ArtifactKind::Derived),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Validated artifact identifier
///
/// Grammar: ASCII alphanumeric plus `-`, `_`, `.`; no leading dot; no
/// `..` sequence; length 1..=120. Everything else — path separators,
/// parent references, percent-decoded traversal attempts — fails
/// [`FileId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Parse and validate a client-supplied id
    ///
    /// An id that fails the grammar is reported as `NotFound`: from the
    /// client's point of view a malformed id and an expired id are the
    /// same thing — no such artifact.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > MAX_ID_LEN {
            return Err(Error::NotFound(format!("invalid file id: {:?}", raw)));
        }
        if raw.starts_with('.') || raw.contains("..") {
            return Err(Error::NotFound(format!("invalid file id: {:?}", raw)));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        {
            return Err(Error::NotFound(format!("invalid file id: {:?}", raw)));
        }
        Ok(FileId(raw.to_string()))
    }

    /// Mint a fresh original-artifact id: `<uuid><ext>`
    pub fn new_original(extension: &str) -> Self {
        FileId(format!("{}{}", uuid::Uuid::new_v4(), extension))
    }

    /// Mint a fresh derived-artifact id: `transformed-<uuid>.mp3`
    ///
    /// The fixed `.mp3` suffix matches the external contract: derived
    /// artifacts are always named as MP3 regardless of the source
    /// container.
    pub fn new_derived() -> Self {
        FileId(format!("transformed-{}.mp3", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
