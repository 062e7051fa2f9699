//! Artifact store: filesystem-backed identity and byte storage
//!
//! The store owns two directories under the storage root, `incoming`
//! for uploads and `derived` for transform outputs. There is no
//! metadata database — the randomly generated filename IS the
//! artifact's identity, so the store carries the two responsibilities
//! a database would otherwise cover: collision-free id generation
//! (UUID v4) and traversal-safe path resolution ([`FileId`] grammar).
//!
//! Writes are atomic: bytes land in a dot-prefixed temp name in the
//! target directory and are renamed into place, so concurrent readers
//! and the retention sweeper never observe a partially written
//! artifact.

mod id;

pub use id::{ArtifactKind, FileId};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// Fixed audio MIME allow-list, matching the upload contract
const ALLOWED_AUDIO_MIME: &[&str] = &[
    "audio/mpeg",
    "audio/wav",
    "audio/mp3",
    "audio/x-m4a",
    "audio/m4a",
    "audio/ogg",
    "audio/webm",
    "audio/mp4",
];

/// Stored artifact record
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: FileId,
    #[serde(skip)]
    pub kind: ArtifactKind,
    /// For derived artifacts, the original they were produced from
    pub source_id: Option<FileId>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Declared content type, used only for delivery headers
    pub mime_hint: String,
}

/// Byte range resolved against a concrete file size (inclusive bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Parse a `Range` header value against a file of `total` bytes.
    ///
    /// Returns `Ok(None)` when the header should be ignored and the
    /// whole file served: absent unit prefix, multi-range requests
    /// (which RFC 7233 permits a server to ignore), or syntax we do
    /// not recognize. Returns `RangeNotSatisfiable` only for a
    /// well-formed single range that cannot be satisfied.
    pub fn parse(header: &str, total: u64) -> Result<Option<ByteRange>> {
        let Some(spec) = header.strip_prefix("bytes=") else {
            return Ok(None);
        };
        if spec.contains(',') {
            // Multi-range: serve the full file instead
            return Ok(None);
        }
        let spec = spec.trim();
        let Some((start_str, end_str)) = spec.split_once('-') else {
            return Ok(None);
        };

        let range = match (start_str.is_empty(), end_str.is_empty()) {
            // "-suffix": the last N bytes
            (true, false) => {
                let suffix: u64 = match end_str.parse() {
                    Ok(n) => n,
                    Err(_) => return Ok(None),
                };
                if suffix == 0 || total == 0 {
                    return Err(Error::RangeNotSatisfiable { total });
                }
                let len = suffix.min(total);
                ByteRange {
                    start: total - len,
                    end: total - 1,
                }
            }
            // "start-": from start to EOF
            (false, true) => {
                let start: u64 = match start_str.parse() {
                    Ok(n) => n,
                    Err(_) => return Ok(None),
                };
                if start >= total {
                    return Err(Error::RangeNotSatisfiable { total });
                }
                ByteRange {
                    start,
                    end: total - 1,
                }
            }
            // "start-end"
            (false, false) => {
                let (start, end): (u64, u64) = match (start_str.parse(), end_str.parse()) {
                    (Ok(s), Ok(e)) => (s, e),
                    _ => return Ok(None),
                };
                if start > end || start >= total {
                    return Err(Error::RangeNotSatisfiable { total });
                }
                ByteRange {
                    start,
                    end: end.min(total - 1),
                }
            }
            // "-"
            (true, true) => return Ok(None),
        };

        Ok(Some(range))
    }
}

/// An open artifact ready for streaming delivery
///
/// The file handle is already seeked to the start of the requested
/// span; the handler limits the read to `length` bytes.
pub struct AudioStream {
    pub file: fs::File,
    /// Total size of the artifact on disk
    pub total_size: u64,
    /// Number of bytes this response will carry
    pub length: u64,
    /// Present when serving partial content
    pub range: Option<ByteRange>,
}

/// A freshly allocated slot for a transform output
///
/// The engine writes to `temp_path`; on success the slot is committed,
/// renaming the bytes to their final, publicly resolvable name.
pub struct DerivedSlot {
    pub id: FileId,
    pub temp_path: PathBuf,
}

/// Filesystem-backed artifact store
pub struct ArtifactStore {
    incoming_dir: PathBuf,
    derived_dir: PathBuf,
    max_upload_bytes: u64,
}

impl ArtifactStore {
    /// Open the store rooted at `root`, creating both directories if missing
    pub async fn open(root: &Path, max_upload_bytes: u64) -> Result<Self> {
        let incoming_dir = root.join(ArtifactKind::Original.dir_name());
        let derived_dir = root.join(ArtifactKind::Derived.dir_name());
        fs::create_dir_all(&incoming_dir).await?;
        fs::create_dir_all(&derived_dir).await?;
        info!(
            "Artifact store ready: {} / {}",
            incoming_dir.display(),
            derived_dir.display()
        );
        Ok(Self {
            incoming_dir,
            derived_dir,
            max_upload_bytes,
        })
    }

    /// Directory holding artifacts of the given kind
    pub fn dir(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Original => &self.incoming_dir,
            ArtifactKind::Derived => &self.derived_dir,
        }
    }

    /// Validate and persist an uploaded original artifact
    ///
    /// Validation (content type, size ceiling) happens before any
    /// filesystem write. The stored extension comes from the client
    /// filename when usable, otherwise from the declared MIME type —
    /// browser microphone recordings arrive as `audio/webm` with no
    /// useful filename.
    pub async fn save_original(
        &self,
        data: &[u8],
        declared_mime: &str,
        original_name: Option<&str>,
    ) -> Result<Artifact> {
        let mime = declared_mime.trim().to_ascii_lowercase();
        if !is_allowed_audio_mime(&mime) {
            return Err(Error::InvalidContentType(declared_mime.to_string()));
        }
        let size = data.len() as u64;
        if size > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge {
                limit: self.max_upload_bytes,
            });
        }

        let extension = choose_extension(original_name, &mime);
        let id = FileId::new_original(&extension);
        self.write_atomic(ArtifactKind::Original, &id, data).await?;

        debug!("Stored original artifact {} ({} bytes, {})", id, size, mime);
        Ok(Artifact {
            id,
            kind: ArtifactKind::Original,
            source_id: None,
            size_bytes: size,
            created_at: Utc::now(),
            mime_hint: mime,
        })
    }

    /// Allocate a derived id and the temp path the engine writes to
    ///
    /// The temp name is dot-prefixed, which the id grammar can never
    /// resolve, so an in-progress transform is invisible to fetch.
    pub fn allocate_derived(&self) -> DerivedSlot {
        let id = FileId::new_derived();
        let temp_path = self.derived_dir.join(format!(".{}.tmp", id.as_str()));
        DerivedSlot { id, temp_path }
    }

    /// Commit a finished transform output: rename the temp file to its
    /// final name and record the artifact. Only called after the
    /// engine reported success, so a failed transform never becomes
    /// resolvable.
    pub async fn commit_derived(&self, slot: DerivedSlot, source_id: &FileId) -> Result<Artifact> {
        let final_path = self.derived_dir.join(slot.id.as_str());
        let metadata = fs::metadata(&slot.temp_path).await?;
        fs::rename(&slot.temp_path, &final_path).await?;

        debug!(
            "Committed derived artifact {} ({} bytes, from {})",
            slot.id,
            metadata.len(),
            source_id
        );
        Ok(Artifact {
            id: slot.id,
            kind: ArtifactKind::Derived,
            source_id: Some(source_id.clone()),
            size_bytes: metadata.len(),
            created_at: Utc::now(),
            mime_hint: "audio/mpeg".to_string(),
        })
    }

    /// Map an id to its path, failing `NotFound` when the file is absent
    ///
    /// Existence is checked here on every call rather than cached:
    /// the sweeper may remove any artifact at any time, and a stale
    /// positive would turn into a confusing downstream I/O error.
    pub async fn resolve(&self, id: &FileId, kind: ArtifactKind) -> Result<PathBuf> {
        let path = self.dir(kind).join(id.as_str());
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(Error::NotFound(id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(id.to_string()))
            }
            Err(e) => Err(Error::Storage(e)),
        }
    }

    /// Open an artifact for streaming, optionally honoring a `Range` header
    pub async fn stream_read(
        &self,
        id: &FileId,
        kind: ArtifactKind,
        range_header: Option<&str>,
    ) -> Result<AudioStream> {
        let path = self.resolve(id, kind).await?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            // The sweeper may have raced us between resolve and open
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(id.to_string()))
            }
            Err(e) => return Err(Error::Storage(e)),
        };
        let total_size = file.metadata().await?.len();

        let range = match range_header {
            Some(header) => ByteRange::parse(header, total_size)?,
            None => None,
        };

        let length = match range {
            Some(r) => {
                file.seek(SeekFrom::Start(r.start)).await?;
                r.len()
            }
            None => total_size,
        };

        Ok(AudioStream {
            file,
            total_size,
            length,
            range,
        })
    }

    /// Best-effort removal; a missing file is not an error here since
    /// deletion may race the sweeper
    pub async fn delete(&self, id: &FileId, kind: ArtifactKind) -> Result<()> {
        let path = self.dir(kind).join(id.as_str());
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(e)),
        }
    }

    /// Write bytes to a temp name in the target directory, then rename
    async fn write_atomic(&self, kind: ArtifactKind, id: &FileId, data: &[u8]) -> Result<()> {
        let dir = self.dir(kind);
        let temp_path = dir.join(format!(".{}.tmp", id.as_str()));
        let final_path = dir.join(id.as_str());

        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = async {
            file.write_all(data).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(())
        }
        .await
        {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(e));
        }
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(e));
        }
        Ok(())
    }
}

fn is_allowed_audio_mime(mime: &str) -> bool {
    ALLOWED_AUDIO_MIME.contains(&mime) || mime.starts_with("audio/")
}

/// Pick the stored extension: client filename first, MIME mapping second
fn choose_extension(original_name: Option<&str>, mime: &str) -> String {
    if let Some(name) = original_name {
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            // Only accept extensions that fit the id grammar
            if !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return format!(".{}", ext.to_ascii_lowercase());
            }
        }
    }
    mime_to_extension(mime).to_string()
}

/// Map declared MIME types to extensions for uploads without a usable
/// filename (browser recordings)
fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "audio/webm" => ".webm",
        "audio/mpeg" | "audio/mp3" => ".mp3",
        "audio/wav" => ".wav",
        "audio/ogg" => ".ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => ".m4a",
        _ => ".webm",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_allow_list() {
        assert!(is_allowed_audio_mime("audio/mpeg"));
        assert!(is_allowed_audio_mime("audio/webm"));
        // Prefix rule admits audio types beyond the named list
        assert!(is_allowed_audio_mime("audio/flac"));
        assert!(!is_allowed_audio_mime("video/mp4"));
        assert!(!is_allowed_audio_mime("application/octet-stream"));
        assert!(!is_allowed_audio_mime("text/plain"));
    }

    #[test]
    fn extension_prefers_client_filename() {
        assert_eq!(choose_extension(Some("song.MP3"), "audio/webm"), ".mp3");
        assert_eq!(choose_extension(Some("take2.wav"), "audio/wav"), ".wav");
    }

    #[test]
    fn extension_falls_back_to_mime() {
        assert_eq!(choose_extension(None, "audio/mpeg"), ".mp3");
        assert_eq!(choose_extension(Some("blob"), "audio/webm"), ".webm");
        assert_eq!(choose_extension(Some("noext"), "audio/mp4"), ".m4a");
        // Unknown audio types default to webm, the browser-recording case
        assert_eq!(choose_extension(None, "audio/flac"), ".webm");
    }

    #[test]
    fn extension_rejects_grammar_breaking_suffixes() {
        assert_eq!(
            choose_extension(Some("evil.mp3/../../x"), "audio/mpeg"),
            ".mp3"
        );
        assert_eq!(choose_extension(Some("weird.m p3"), "audio/mpeg"), ".mp3");
        assert_eq!(
            choose_extension(Some("dots.tar.verylongext"), "audio/ogg"),
            ".ogg"
        );
    }

    #[test]
    fn range_parse_bounded() {
        let r = ByteRange::parse("bytes=0-99", 1000).unwrap().unwrap();
        assert_eq!((r.start, r.end, r.len()), (0, 99, 100));
    }

    #[test]
    fn range_parse_open_ended() {
        let r = ByteRange::parse("bytes=950-", 1000).unwrap().unwrap();
        assert_eq!((r.start, r.end, r.len()), (950, 999, 50));
    }

    #[test]
    fn range_parse_suffix() {
        let r = ByteRange::parse("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!((r.start, r.end, r.len()), (900, 999, 100));
        // Suffix longer than the file clamps to the whole file
        let r = ByteRange::parse("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!((r.start, r.end), (0, 999));
    }

    #[test]
    fn range_parse_end_clamped_to_total() {
        let r = ByteRange::parse("bytes=900-5000", 1000).unwrap().unwrap();
        assert_eq!((r.start, r.end), (900, 999));
    }

    #[test]
    fn range_parse_unsatisfiable() {
        assert!(ByteRange::parse("bytes=1000-", 1000).is_err());
        assert!(ByteRange::parse("bytes=2000-3000", 1000).is_err());
        assert!(ByteRange::parse("bytes=5-2", 1000).is_err());
        assert!(ByteRange::parse("bytes=-0", 1000).is_err());
        assert!(ByteRange::parse("bytes=0-", 0).is_err());
    }

    #[test]
    fn range_parse_ignored_forms() {
        // Not a bytes range
        assert_eq!(ByteRange::parse("items=0-10", 1000).unwrap(), None);
        // Multi-range requests are served as the full file
        assert_eq!(ByteRange::parse("bytes=0-1,5-9", 1000).unwrap(), None);
        // Unparseable specs are ignored rather than rejected
        assert_eq!(ByteRange::parse("bytes=abc-def", 1000).unwrap(), None);
        assert_eq!(ByteRange::parse("bytes=-", 1000).unwrap(), None);
    }

    #[tokio::test]
    async fn save_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 1024).await.unwrap();
        let err = store
            .save_original(b"mpeg bytes", "video/mp4", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(_)));
    }

    #[tokio::test]
    async fn save_rejects_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 16).await.unwrap();
        let err = store
            .save_original(&[0u8; 17], "audio/mpeg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn save_resolve_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 1024).await.unwrap();

        let artifact = store
            .save_original(b"pcm-ish bytes", "audio/wav", Some("take.wav"))
            .await
            .unwrap();
        assert_eq!(artifact.size_bytes, 13);
        assert!(artifact.id.as_str().ends_with(".wav"));

        let path = store
            .resolve(&artifact.id, ArtifactKind::Original)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"pcm-ish bytes");

        store
            .delete(&artifact.id, ArtifactKind::Original)
            .await
            .unwrap();
        assert!(store
            .resolve(&artifact.id, ArtifactKind::Original)
            .await
            .is_err());
        // Idempotent: deleting again is fine
        store
            .delete(&artifact.id, ArtifactKind::Original)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn identical_uploads_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 1024).await.unwrap();
        let a = store
            .save_original(b"same bytes", "audio/mpeg", None)
            .await
            .unwrap();
        let b = store
            .save_original(b"same bytes", "audio/mpeg", None)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn stream_read_honors_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 1024).await.unwrap();
        let artifact = store
            .save_original(b"0123456789", "audio/mpeg", None)
            .await
            .unwrap();

        let stream = store
            .stream_read(&artifact.id, ArtifactKind::Original, Some("bytes=2-5"))
            .await
            .unwrap();
        assert_eq!(stream.total_size, 10);
        assert_eq!(stream.length, 4);
        assert_eq!(stream.range, Some(ByteRange { start: 2, end: 5 }));
    }

    #[tokio::test]
    async fn derived_slot_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), 1024).await.unwrap();
        let source = FileId::parse("1234.mp3").unwrap();

        let slot = store.allocate_derived();
        tokio::fs::write(&slot.temp_path, b"shifted audio").await.unwrap();

        let id = slot.id.clone();
        // Temp name is invisible to fetch while the engine runs
        assert!(store.resolve(&id, ArtifactKind::Derived).await.is_err());

        let artifact = store.commit_derived(slot, &source).await.unwrap();
        assert_eq!(artifact.size_bytes, 13);
        assert_eq!(artifact.source_id, Some(source));
        assert!(store.resolve(&id, ArtifactKind::Derived).await.is_ok());
    }
}
