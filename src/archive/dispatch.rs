use crate::archive::paths::safe_member_relpath;
use crate::archive::paths::resolve_under_base;
use crate::archive::writer::ArchiveWriter;
use crate::content::{
    extension_of, AudioBuffer, Category, ContentValue, FileRef, ImageFrame, VideoHandle,
    IMAGE_EXTS, TEXT_EXTS, WORKFLOW_EXTS,
};
use crate::error::Result;
use crate::session::{FileSignature, SessionState};
use crate::storage::Storage;
use indicatif::ProgressBar;

/// Walks a nested content value and turns it into archive members.
///
/// Member-level failures (bad names, undecodable content, escaping file
/// references) are recorded and skipped; only archive-level I/O failures
/// propagate, so one bad item never loses the rest of the batch.
pub struct Dispatcher<'a> {
    writer: &'a mut ArchiveWriter,
    state: &'a mut SessionState,
    storage: &'a Storage,
    prefix: String,
    provenance: Option<String>,
    embed_metadata: bool,
    progress: Option<&'a ProgressBar>,
    written: u64,
    skipped: Vec<String>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        writer: &'a mut ArchiveWriter,
        state: &'a mut SessionState,
        storage: &'a Storage,
        prefix: String,
        provenance: Option<String>,
        embed_metadata: bool,
    ) -> Self {
        Self {
            writer,
            state,
            storage,
            prefix,
            provenance,
            embed_metadata,
            progress: None,
            written: 0,
            skipped: Vec::new(),
        }
    }

    /// Advance `progress` by one for every member written.
    pub fn with_progress(mut self, progress: &'a ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Members written by this dispatcher so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Human-readable notes for every member that was dropped.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn write_any(&mut self, value: &ContentValue) -> Result<()> {
        match value {
            ContentValue::Collection(values) => {
                for value in values {
                    self.write_any(value)?;
                }
                Ok(())
            }
            ContentValue::Images(frames) => self.write_images(frames),
            ContentValue::Video(handle) => self.write_video(handle),
            ContentValue::Audio(buffer) => self.write_audio(buffer),
            ContentValue::Text(text) => self.write_text(text),
            ContentValue::Structured(value) => {
                // canonical compact JSON with sorted keys, then the plain
                // text path like any other text value
                let serialized = serde_json::to_string(value).unwrap_or_default();
                self.write_text(&serialized)
            }
            ContentValue::Bytes(bytes) => self.write_blob(bytes),
            ContentValue::FileRef(file_ref) => self.write_file_ref(file_ref),
        }
    }

    fn write_images(&mut self, frames: &[ImageFrame]) -> Result<()> {
        for frame in frames {
            let queued = self.state.naming_mut().next_name(Category::Images);

            let provenance = if self.embed_metadata {
                self.provenance.as_deref()
            } else {
                None
            };

            let (arcname, bytes) = match &queued {
                Some(name) => {
                    // an explicit name forces a write even for repeated
                    // content, and leaves the dedup set untouched
                    let requested_ext = extension_of(name);
                    let target_ext = if IMAGE_EXTS.contains(&requested_ext.as_str()) {
                        requested_ext.clone()
                    } else {
                        "png".to_string()
                    };
                    let (bytes, actual_ext) = match frame.encode(&target_ext, provenance) {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            self.skipped.push(format!("image '{}': {}", name, e));
                            continue;
                        }
                    };
                    let named = rewrite_extension(name, &requested_ext, &actual_ext);
                    let arcname = safe_member_relpath(&named)
                        .unwrap_or_else(|_| self.synth_image_name(&actual_ext));
                    (arcname, bytes)
                }
                None => {
                    let signature = frame.signature();
                    if self.state.seen_image(&signature) {
                        continue;
                    }
                    let (bytes, actual_ext) = match frame.encode("png", provenance) {
                        Ok(encoded) => encoded,
                        Err(e) => {
                            self.skipped.push(format!("image: {}", e));
                            continue;
                        }
                    };
                    // recorded only once the frame has actually encoded
                    self.state.admit_image(signature);
                    (self.synth_image_name(&actual_ext), bytes)
                }
            };

            let unique = self.writer.unique_name(&arcname);
            self.writer.write_member(&unique, &bytes)?;
            self.record_write(Some(Category::Images));
        }
        Ok(())
    }

    fn synth_image_name(&self, ext: &str) -> String {
        format!(
            "{}_{:05}.{}",
            self.prefix,
            self.state.peek_index(Category::Images),
            ext
        )
    }

    fn write_video(&mut self, handle: &VideoHandle) -> Result<()> {
        // a handle-carried name wins; the queue is only drained for members
        // that arrive anonymous
        let requested = match handle.member_name() {
            Some(name) => Some(name.to_string()),
            None => self.state.naming_mut().next_name(Category::Videos),
        };
        let arcname = requested
            .as_deref()
            .and_then(|name| safe_member_relpath(name).ok())
            .unwrap_or_else(|| {
                format!(
                    "{}_video_{:05}.{}",
                    self.prefix,
                    self.state.peek_index(Category::Videos),
                    handle.inferred_extension()
                )
            });
        let unique = self.writer.unique_name(&arcname);

        // an original member name with its backing file still on disk means
        // the bytes can be copied without touching the encoding
        if handle.member_name().is_some() {
            if let Some(source) = handle.source_file() {
                self.writer.write_file_verbatim(&unique, source)?;
                self.record_write(Some(Category::Videos));
                self.write_video_sidecar(&unique)?;
                return Ok(());
            }
        }

        let mut bytes = Vec::new();
        if let Err(e) = handle.save_to(&mut bytes) {
            self.skipped.push(format!("video '{}': {}", unique, e));
            return Ok(());
        }
        self.writer.write_member(&unique, &bytes)?;
        self.record_write(Some(Category::Videos));
        self.write_video_sidecar(&unique)
    }

    /// Videos have no in-band text metadata slot, so provenance rides in a
    /// JSON sidecar member. Sidecars register a name but are not counted.
    fn write_video_sidecar(&mut self, video_arcname: &str) -> Result<()> {
        if !self.embed_metadata {
            return Ok(());
        }
        let Some(provenance) = self.provenance.clone() else {
            return Ok(());
        };
        let sidecar = self
            .writer
            .unique_name(&format!("{}.provenance.json", video_arcname));
        self.writer.write_member(&sidecar, provenance.as_bytes())
    }

    fn write_audio(&mut self, buffer: &AudioBuffer) -> Result<()> {
        let requested = match buffer.member_name() {
            Some(name) => Some(name.to_string()),
            None => self.state.naming_mut().next_name(Category::Audios),
        };

        if let (Some(original), Some(_)) = (buffer.original_bytes(), buffer.member_name()) {
            let arcname = requested
                .as_deref()
                .and_then(|name| safe_member_relpath(name).ok())
                .unwrap_or_else(|| self.synth_audio_name());
            let unique = self.writer.unique_name(&arcname);
            self.writer.write_member(&unique, original)?;
            self.record_write(Some(Category::Audios));
            return Ok(());
        }

        let bytes = match buffer.encode_wav() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.skipped.push(format!("audio: {}", e));
                return Ok(());
            }
        };

        let arcname = requested
            .as_deref()
            .and_then(|name| safe_member_relpath(name).ok())
            .map(|name| force_extension(&name, "wav"))
            .unwrap_or_else(|| self.synth_audio_name());

        let unique = self.writer.unique_name(&arcname);
        self.writer.write_member(&unique, &bytes)?;
        self.record_write(Some(Category::Audios));
        Ok(())
    }

    fn synth_audio_name(&self) -> String {
        format!(
            "{}_audio_{:05}.wav",
            self.prefix,
            self.state.peek_index(Category::Audios)
        )
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let (category, requested, body) = match detect_header(text) {
            Some((header, body)) => {
                let category = if WORKFLOW_EXTS.contains(&extension_of(&header).as_str()) {
                    Category::Workflows
                } else {
                    Category::Texts
                };
                // the in-band header takes precedence; a queued name for the
                // same category is consumed and discarded to keep FIFO order
                let _ = self.state.naming_mut().next_name(category);
                (category, Some(header), body.to_string())
            }
            None => {
                let queued = self.state.naming_mut().next_name(Category::Texts);
                (Category::Texts, queued, text.to_string())
            }
        };

        let arcname = requested
            .as_deref()
            .and_then(|name| safe_member_relpath(name).ok())
            .unwrap_or_else(|| match category {
                Category::Workflows => format!(
                    "{}_workflow_{:05}.json",
                    self.prefix,
                    self.state.peek_index(Category::Workflows)
                ),
                _ => format!(
                    "{}_text_{:05}.txt",
                    self.prefix,
                    self.state.peek_index(Category::Texts)
                ),
            });

        let unique = self.writer.unique_name(&arcname);
        self.writer.write_member(&unique, body.as_bytes())?;
        self.record_write(Some(category));
        Ok(())
    }

    fn write_blob(&mut self, bytes: &[u8]) -> Result<()> {
        let arcname = format!(
            "{}_blob_{:05}.bin",
            self.prefix,
            self.state.peek_blob_index()
        );
        let unique = self.writer.unique_name(&arcname);
        self.writer.write_member(&unique, bytes)?;
        self.state.bump_blob_index();
        self.record_write(None);
        Ok(())
    }

    fn write_file_ref(&mut self, file_ref: &FileRef) -> Result<()> {
        let base = self.storage.directory_for(file_ref.kind);

        let Some((relative, full)) =
            resolve_under_base(base, &file_ref.subfolder, &file_ref.filename)
        else {
            self.skipped.push(format!(
                "file reference '{}' escapes the {} directory",
                file_ref.filename,
                file_ref.kind.as_str()
            ));
            return Ok(());
        };

        if !full.is_file() {
            self.skipped
                .push(format!("file reference '{}' not found", relative));
            return Ok(());
        }

        let signature = match FileSignature::of(&full) {
            Ok(signature) => signature,
            Err(e) => {
                self.skipped
                    .push(format!("file reference '{}': {}", relative, e));
                return Ok(());
            }
        };
        if !self.state.admit_file(signature) {
            return Ok(());
        }

        let unique = self.writer.unique_name(&format!("files/{}", relative));
        self.writer.write_file_verbatim(&unique, &full)?;
        self.record_write(None);
        Ok(())
    }

    fn record_write(&mut self, category: Option<Category>) {
        if let Some(category) = category {
            self.state.bump_index(category);
        }
        if let Some(progress) = self.progress {
            progress.inc(1);
        }
        self.written += 1;
    }
}

/// First-line filename detection for text payloads: a line with a known
/// text/workflow extension or an embedded path separator names the member,
/// and the rest of the value is the body.
fn detect_header(text: &str) -> Option<(String, &str)> {
    let (first, rest) = text.split_once('\n')?;
    let candidate = first.trim();
    if candidate.is_empty() || candidate.len() > 240 {
        return None;
    }

    let ext = extension_of(candidate);
    let named_like = TEXT_EXTS.contains(&ext.as_str())
        || WORKFLOW_EXTS.contains(&ext.as_str())
        || candidate.contains('/')
        || candidate.contains('\\');
    if !named_like {
        return None;
    }

    Some((candidate.to_string(), rest))
}

/// Replace the final component's extension with `ext`, appending it when
/// the name has none.
fn force_extension(name: &str, ext: &str) -> String {
    let current = extension_of(name);
    if current.is_empty() {
        format!("{}.{}", name, ext)
    } else {
        format!("{}.{}", &name[..name.len() - current.len() - 1], ext)
    }
}

/// Swap the requested extension for the one the encoder actually produced.
fn rewrite_extension(name: &str, requested_ext: &str, actual_ext: &str) -> String {
    if requested_ext == actual_ext {
        return name.to_string();
    }
    if requested_ext.is_empty() {
        return format!("{}.{}", name, actual_ext);
    }
    let stem = &name[..name.len() - requested_ext.len() - 1];
    format!("{}.{}", stem, actual_ext)
}
