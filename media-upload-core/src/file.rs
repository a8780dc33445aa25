//! File descriptors handed over by the file source.

use serde::Serialize;

/// Coarse media classification derived from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
    Audio,
    Video,
    Other,
}

impl FileKind {
    /// Classifies by substring, checked in the order image, pdf, audio, video.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("image") {
            FileKind::Image
        } else if mime.contains("pdf") {
            FileKind::Pdf
        } else if mime.contains("audio") {
            FileKind::Audio
        } else if mime.contains("video") {
            FileKind::Video
        } else {
            FileKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Pdf => "pdf",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Other => "other",
        }
    }
}

/// Stable identity of an admitted file: name plus last-modified timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileIdentity {
    pub name: String,
    pub last_modified_ms: u64,
}

/// A candidate file: payload plus the metadata the source knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    /// Declared media type, e.g. `video/mp4`. May be empty.
    pub mime: String,
    /// Milliseconds since the Unix epoch.
    pub last_modified_ms: u64,
    pub content: Vec<u8>,
}

impl FileDescriptor {
    pub fn new(
        name: impl Into<String>,
        mime: impl Into<String>,
        last_modified_ms: u64,
        content: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            last_modified_ms,
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            name: self.name.clone(),
            last_modified_ms: self.last_modified_ms,
        }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_mime(&self.mime)
    }

    /// The first `max_chars` characters of the name.
    pub fn display_name(&self, max_chars: usize) -> String {
        self.name.chars().take(max_chars).collect()
    }
}
