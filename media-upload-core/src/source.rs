//! File source: turns paths into [`FileDescriptor`]s and applies the
//! selection policy (count, size, accepted types) before admission.
//!
//! The upload manager never validates files; whatever this module admits is
//! uploaded as-is.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::file::FileDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a file name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePolicy {
    /// `Some(1)` disables multi-select.
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_file_bytes: Option<u64>,
    /// HTML `accept` syntax: `image/png`, `video/*` or `.mp4`. Empty accepts all.
    #[serde(default)]
    pub accept: Vec<String>,
}

impl SourcePolicy {
    pub fn single() -> Self {
        Self {
            max_files: Some(1),
            ..Self::default()
        }
    }

    pub fn multiple() -> Self {
        Self::default()
    }

    fn accepts(&self, file: &FileDescriptor) -> bool {
        if self.accept.is_empty() {
            return true;
        }
        let mime = file.mime.to_ascii_lowercase();
        let name = file.name.to_ascii_lowercase();
        self.accept.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.starts_with('.') {
                name.ends_with(&entry)
            } else if let Some(prefix) = entry.strip_suffix("/*") {
                mime.split('/').next() == Some(prefix)
            } else {
                mime == entry
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooMany,
    TooLarge { size: u64, limit: u64 },
    UnsupportedType { mime: String },
}

#[derive(Debug, Clone)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct Selection {
    pub admitted: Vec<FileDescriptor>,
    pub rejected: Vec<Rejection>,
}

pub struct FileSource {
    policy: SourcePolicy,
}

impl FileSource {
    pub fn new(policy: SourcePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    /// Applies the policy to one interaction's candidates, keeping order.
    pub fn select(&self, candidates: Vec<FileDescriptor>) -> Selection {
        let mut selection = Selection::default();
        for file in candidates {
            let reason = if self
                .policy
                .max_files
                .is_some_and(|max| selection.admitted.len() >= max)
            {
                Some(RejectReason::TooMany)
            } else if let Some(limit) = self.policy.max_file_bytes.filter(|l| file.size() > *l) {
                Some(RejectReason::TooLarge {
                    size: file.size(),
                    limit,
                })
            } else if !self.policy.accepts(&file) {
                Some(RejectReason::UnsupportedType {
                    mime: file.mime.clone(),
                })
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    warn!(file = %file.name, ?reason, "[SOURCE] Rejected candidate file");
                    selection.rejected.push(Rejection {
                        name: file.name,
                        reason,
                    });
                }
                None => {
                    debug!(file = %file.name, size = file.size(), "[SOURCE] Accepted candidate file");
                    selection.admitted.push(file);
                }
            }
        }
        info!(
            admitted = selection.admitted.len(),
            rejected = selection.rejected.len(),
            "[SOURCE] Selection complete"
        );
        selection
    }

    /// Reads a file from disk into a descriptor.
    pub async fn read_path(path: impl AsRef<Path>) -> Result<FileDescriptor, SourceError> {
        let path = path.as_ref();
        let io_err = |source| SourceError::Io {
            path: path.display().to_string(),
            source,
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SourceError::InvalidName(path.display().to_string()))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
        let last_modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let content = tokio::fs::read(path).await.map_err(io_err)?;
        let mime = guess_mime(&name).to_string();

        debug!(file = %name, size = content.len(), mime = %mime, "[SOURCE] Read file from disk");
        Ok(FileDescriptor::new(name, mime, last_modified_ms, content))
    }
}

/// MIME type from the file extension; `application/octet-stream` when unknown.
pub fn guess_mime(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
