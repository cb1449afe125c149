pub mod audio;
pub mod image;

pub use audio::AudioBuffer;
pub use image::{ImageFrame, ImageSignature};

use crate::error::{PackError, Result};
use crate::storage::StorageKind;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff"];
pub const VIDEO_EXTS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov", "m4v", "gif"];
pub const AUDIO_EXTS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac"];
pub const TEXT_EXTS: &[&str] = &["txt", "srt", "vtt", "csv", "md", "log"];
pub const WORKFLOW_EXTS: &[&str] = &["json"];

/// Lowercased extension without the dot, empty if none.
pub fn extension_of(name: &str) -> String {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// The five fixed content categories used for naming queues and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Images,
    Videos,
    Audios,
    Texts,
    Workflows,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Images,
        Category::Videos,
        Category::Audios,
        Category::Texts,
        Category::Workflows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Audios => "audios",
            Category::Texts => "texts",
            Category::Workflows => "workflows",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Category::Images => IMAGE_EXTS,
            Category::Videos => VIDEO_EXTS,
            Category::Audios => AUDIO_EXTS,
            Category::Texts => TEXT_EXTS,
            Category::Workflows => WORKFLOW_EXTS,
        }
    }

    pub fn for_extension(ext: &str) -> Option<Category> {
        let ext = ext.to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.extensions().contains(&ext.as_str()))
    }

    pub fn from_name(name: &str) -> Option<Category> {
        match name.trim().to_lowercase().as_str() {
            "images" => Some(Category::Images),
            "videos" => Some(Category::Videos),
            "audios" => Some(Category::Audios),
            "texts" => Some(Category::Texts),
            "workflows" => Some(Category::Workflows),
            _ => None,
        }
    }
}

/// The closed set of packable values. Dispatch extends by adding variants,
/// never by open-ended runtime type probing.
#[derive(Debug, Clone)]
pub enum ContentValue {
    Collection(Vec<ContentValue>),
    Images(Vec<ImageFrame>),
    Video(VideoHandle),
    Audio(AudioBuffer),
    Text(String),
    Structured(serde_json::Value),
    Bytes(Vec<u8>),
    FileRef(FileRef),
}

impl ContentValue {
    /// Upper bound on the archive members this value can produce, before
    /// dedup and per-member skips.
    pub fn member_count(&self) -> u64 {
        match self {
            ContentValue::Collection(values) => {
                values.iter().map(ContentValue::member_count).sum()
            }
            ContentValue::Images(frames) => frames.len() as u64,
            _ => 1,
        }
    }
}

impl From<String> for ContentValue {
    fn from(s: String) -> Self {
        ContentValue::Text(s)
    }
}

impl From<&str> for ContentValue {
    fn from(s: &str) -> Self {
        ContentValue::Text(s.to_string())
    }
}

impl From<Vec<ContentValue>> for ContentValue {
    fn from(values: Vec<ContentValue>) -> Self {
        ContentValue::Collection(values)
    }
}

/// A structured reference to a file under one of the storage roots.
#[derive(Debug, Clone)]
pub struct FileRef {
    pub filename: String,
    pub subfolder: String,
    pub kind: StorageKind,
}

impl FileRef {
    pub fn new<S: Into<String>>(filename: S, kind: StorageKind) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind,
        }
    }

    pub fn with_subfolder<S: Into<String>>(mut self, subfolder: S) -> Self {
        self.subfolder = subfolder.into();
        self
    }
}

/// A container-level video value. Either backed by a source file on disk
/// (verbatim-copyable) or by already-encoded bytes with a known container
/// format.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    member_name: Option<String>,
    source: VideoSource,
}

#[derive(Debug, Clone)]
enum VideoSource {
    File(PathBuf),
    Bytes {
        data: Vec<u8>,
        container_format: String,
    },
}

impl VideoHandle {
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            member_name: None,
            source: VideoSource::File(path.into()),
        }
    }

    pub fn from_bytes<S: Into<String>>(data: Vec<u8>, container_format: S) -> Self {
        Self {
            member_name: None,
            source: VideoSource::Bytes {
                data,
                container_format: container_format.into().to_lowercase(),
            },
        }
    }

    /// Remember the member name this video originally had inside an archive,
    /// so a later re-pack can restore it.
    pub fn with_member_name<S: Into<String>>(mut self, name: S) -> Self {
        self.member_name = Some(name.into());
        self
    }

    pub fn member_name(&self) -> Option<&str> {
        self.member_name.as_deref()
    }

    /// The backing source file, if this handle wraps one that still exists.
    pub fn source_file(&self) -> Option<&Path> {
        match &self.source {
            VideoSource::File(path) if path.is_file() => Some(path),
            _ => None,
        }
    }

    pub fn container_format(&self) -> String {
        match &self.source {
            VideoSource::File(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase(),
            VideoSource::Bytes {
                container_format, ..
            } => container_format.clone(),
        }
    }

    /// Container extension for a synthesized member name.
    pub fn inferred_extension(&self) -> &'static str {
        let format = self.container_format();
        if format.contains("webm") {
            "webm"
        } else if format.contains("matroska") || format.contains("mkv") {
            "mkv"
        } else if format.contains("avi") {
            "avi"
        } else {
            "mp4"
        }
    }

    /// Stream-encode into `writer`: the handle's own bytes, unmodified.
    pub fn save_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        match &self.source {
            VideoSource::File(path) => {
                let mut file = std::fs::File::open(path).map_err(|e| PackError::Decode {
                    what: format!("video {}", path.display()),
                    reason: e.to_string(),
                })?;
                Ok(std::io::copy(&mut file, writer)?)
            }
            VideoSource::Bytes { data, .. } => {
                writer.write_all(data)?;
                Ok(data.len() as u64)
            }
        }
    }
}
