use crate::archive::paths::{safe_basename, safe_member_relpath};
use crate::content::{extension_of, AudioBuffer, Category, ImageFrame, VideoHandle};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Typed contents recovered from one archive, plus an extension-keyed
/// manifest of the member names, shaped exactly like pack-time naming input.
#[derive(Debug, Default)]
pub struct UnpackedArchive {
    pub images: Vec<ImageFrame>,
    pub videos: Vec<VideoHandle>,
    pub audios: Vec<AudioBuffer>,
    pub texts: Vec<String>,
    pub manifest: BTreeMap<String, Vec<String>>,
    pub skipped: Vec<String>,
}

impl UnpackedArchive {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
            && self.videos.is_empty()
            && self.audios.is_empty()
            && self.texts.is_empty()
    }

    pub fn manifest_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.manifest).unwrap_or_default()
    }
}

/// Extracts archives into typed collections. Unreadable members are
/// dropped; a wholly unreadable archive yields an empty result, never an
/// error.
pub struct ArchiveReader {
    staging_root: PathBuf,
}

impl ArchiveReader {
    pub fn new(staging_root: PathBuf) -> Self {
        Self { staging_root }
    }

    /// Staging directory for one archive, keyed by a stable hash of its
    /// absolute path. Repeated extraction reuses and overwrites the same
    /// directory instead of accumulating copies.
    fn staging_dir(&self, archive_path: &Path) -> PathBuf {
        let absolute = archive_path
            .canonicalize()
            .unwrap_or_else(|_| archive_path.to_path_buf());
        let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
        let mut key = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            key.push_str(&format!("{:02x}", byte));
        }
        self.staging_root.join(key)
    }

    pub fn extract(&self, archive_path: &Path) -> UnpackedArchive {
        let mut result = UnpackedArchive::default();

        let file = match File::open(archive_path) {
            Ok(file) => file,
            Err(_) => return result,
        };
        let mut archive = match ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(_) => return result,
        };

        let staging = self.staging_dir(archive_path);

        for index in 0..archive.len() {
            let mut member = match archive.by_index(index) {
                Ok(member) => member,
                Err(_) => continue,
            };
            if member.is_dir() {
                continue;
            }

            let raw_name = member.name().to_string();
            let basename = safe_basename(&raw_name);
            if basename.is_empty() || basename.starts_with('.') {
                continue;
            }
            let name = match safe_member_relpath(&raw_name) {
                Ok(name) => name,
                Err(_) => {
                    result.skipped.push(format!("unsafe member '{}'", raw_name));
                    continue;
                }
            };

            let mut bytes = Vec::new();
            if member.read_to_end(&mut bytes).is_err() {
                result.skipped.push(format!("unreadable member '{}'", name));
                continue;
            }

            let ext = extension_of(&name);
            match Category::for_extension(&ext) {
                Some(Category::Images) => match ImageFrame::decode(&bytes) {
                    Ok(frame) => {
                        result.images.push(frame);
                        register(&mut result.manifest, &ext, &name);
                    }
                    Err(e) => result.skipped.push(format!("image '{}': {}", name, e)),
                },
                Some(Category::Videos) => {
                    match materialize(&staging, &name, &bytes) {
                        Ok(path) => {
                            result
                                .videos
                                .push(VideoHandle::from_file(path).with_member_name(&name));
                            register(&mut result.manifest, &ext, &name);
                        }
                        Err(e) => result.skipped.push(format!("video '{}': {}", name, e)),
                    }
                }
                Some(Category::Audios) => {
                    // staged to disk like video so external decoders can be
                    // pointed at it; decoding reuses the in-memory bytes
                    if let Err(e) = materialize(&staging, &name, &bytes) {
                        result.skipped.push(format!("audio '{}': {}", name, e));
                        continue;
                    }
                    match AudioBuffer::decode(&bytes, &ext) {
                        Ok(buffer) => {
                            result.audios.push(
                                buffer.with_member_name(&name).with_original_bytes(bytes),
                            );
                            register(&mut result.manifest, &ext, &name);
                        }
                        Err(e) => result.skipped.push(format!("audio '{}': {}", name, e)),
                    }
                }
                Some(Category::Texts) | Some(Category::Workflows) => {
                    let content = String::from_utf8_lossy(&bytes);
                    // the leading filename line preserves naming through a
                    // later re-pack
                    result.texts.push(format!("{}\n{}", name, content));
                    register(&mut result.manifest, &ext, &name);
                }
                None => {}
            }
        }

        result
    }
}

fn register(manifest: &mut BTreeMap<String, Vec<String>>, ext: &str, name: &str) {
    manifest.entry(ext.to_string()).or_default().push(name.to_string());
}

fn materialize(staging: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let target = staging.join(name);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, bytes)?;
    Ok(target)
}
