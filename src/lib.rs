pub mod archive;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod loader;
pub mod session;
pub mod storage;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{ArchiveConfig, CliOverrides, Config, StorageConfig};
pub use error::{PackError, Result, UserFriendlyError};

// Core functionality re-exports
pub use archive::{ArchiveReader, ArchiveWriter, Dispatcher, UnpackedArchive};
pub use content::{AudioBuffer, Category, ContentValue, FileRef, ImageFrame, VideoHandle};
pub use loader::DirectoryLoader;
pub use session::{fingerprint_of, NamingManifest, SessionStore};
pub use storage::{SavePath, Storage, StorageKind};
pub use ui::{OutputFormatter, OutputMode, PackSummary, ProgressManager};

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// One pack invocation: the value to write plus its session identity,
/// naming input, and optional provenance text.
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub value: ContentValue,
    pub naming: serde_json::Value,
    pub provenance: Option<String>,
    pub session_seed: serde_json::Value,
}

impl PackRequest {
    pub fn new(value: ContentValue) -> Self {
        Self {
            value,
            naming: serde_json::Value::Null,
            provenance: None,
            session_seed: serde_json::Value::Null,
        }
    }

    pub fn with_naming(mut self, naming: serde_json::Value) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_provenance<S: Into<String>>(mut self, provenance: S) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    pub fn with_session_seed(mut self, seed: serde_json::Value) -> Self {
        self.session_seed = seed;
        self
    }
}

/// Emitted exactly once per session, on the first call that writes members.
#[derive(Debug, Clone, PartialEq)]
pub struct PackNotification {
    pub filename: String,
    pub subfolder: String,
    pub location_kind: StorageKind,
}

/// Result of one pack call.
#[derive(Debug)]
pub struct PackOutcome {
    pub notification: Option<PackNotification>,
    pub written_this_call: u64,
    pub total_written: u64,
    pub archive_path: PathBuf,
    pub skipped: Vec<String>,
}

/// Main library interface for AnyPack functionality
pub struct AnyPack {
    config: Config,
    storage: Storage,
    sessions: SessionStore,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl AnyPack {
    /// Create a new AnyPack instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        config.validate()?;

        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet);
        let storage = Storage::new(&config.storage);
        let sessions = SessionStore::new(config.idle_timeout());

        Ok(Self {
            config,
            storage,
            sessions,
            output_formatter,
            progress_manager,
        })
    }

    /// Create AnyPack instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Pack a value into the session's archive, creating or appending as
    /// needed. Fails only if the whole session has still written nothing.
    pub fn pack(&mut self, request: PackRequest) -> Result<PackOutcome> {
        self.pack_at(request, Utc::now())
    }

    /// `pack` with an explicit clock, for deterministic session-expiry
    /// behavior.
    pub fn pack_at(&mut self, request: PackRequest, now: DateTime<Utc>) -> Result<PackOutcome> {
        // without an explicit seed, the provenance text identifies the run
        let seed = if request.session_seed.is_null() {
            request
                .provenance
                .as_deref()
                .map(|p| serde_json::Value::String(p.to_string()))
                .unwrap_or(serde_json::Value::Null)
        } else {
            request.session_seed.clone()
        };
        let state = self.sessions.resolve(&seed, now);
        state.load_manifest_once(&request.naming);

        if state.save_path().is_none() {
            let save_path = self
                .storage
                .allocate_save_path(&self.config.archive.filename_prefix)?;
            state.set_save_path(save_path);
        }
        let save_path = state.save_path().cloned().ok_or(PackError::EmptyArchive)?;
        let archive_path = save_path.archive_path();

        let append = state.total_written() > 0;
        let mut writer = ArchiveWriter::open(
            &archive_path,
            append,
            self.config.archive.compression_level,
        )?;

        let started = std::time::Instant::now();
        let progress = self
            .progress_manager
            .create_item_progress(request.value.member_count());

        let mut dispatcher = Dispatcher::new(
            &mut writer,
            state,
            &self.storage,
            save_path.filename_base.clone(),
            request.provenance.clone(),
            self.config.archive.embed_metadata,
        )
        .with_progress(&progress);
        dispatcher.write_any(&request.value)?;
        let written_this_call = dispatcher.written();
        let skipped = dispatcher.skipped().to_vec();

        writer.finish()?;
        state.record_written(written_this_call);

        if state.total_written() == 0 {
            progress.finish_and_clear();
            // don't leave an empty archive behind
            std::fs::remove_file(&archive_path).ok();
            return Err(PackError::EmptyArchive);
        }
        ui::finish_progress_with_summary(
            &progress,
            &format!("{} members written", written_this_call),
            started.elapsed(),
        );

        let notification = if state.take_notification_slot() {
            Some(PackNotification {
                filename: save_path.archive_filename(),
                subfolder: save_path.subfolder.clone(),
                location_kind: StorageKind::Output,
            })
        } else {
            None
        };

        Ok(PackOutcome {
            notification,
            written_this_call,
            total_written: state.total_written(),
            archive_path,
            skipped,
        })
    }

    /// Extract an archive into typed collections. A missing archive is a
    /// terminal error; a present-but-corrupt one yields an empty result.
    pub fn unpack(&self, archive: &Path) -> Result<UnpackedArchive> {
        let resolved = self.resolve_archive_path(archive)?;

        let started = std::time::Instant::now();
        let spinner = self
            .progress_manager
            .create_spinner("Reading archive members");
        let reader = ArchiveReader::new(self.storage.extract_staging_root());
        let result = reader.extract(&resolved);

        let recovered = result.images.len()
            + result.videos.len()
            + result.audios.len()
            + result.texts.len();
        ui::finish_progress_with_summary(
            &spinner,
            &format!("{} members recovered", recovered),
            started.elapsed(),
        );
        Ok(result)
    }

    fn resolve_archive_path(&self, archive: &Path) -> Result<PathBuf> {
        if archive.is_file() {
            return Ok(archive.to_path_buf());
        }
        if archive.is_relative() {
            let under_input = self.storage.directory_for(StorageKind::Input).join(archive);
            if under_input.is_file() {
                return Ok(under_input);
            }
        }
        Err(PackError::ArchiveNotFound {
            path: archive.display().to_string(),
        })
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config).map_err(PackError::Io)?;
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Get progress manager reference
    pub fn progress_manager(&self) -> &ProgressManager {
        &self.progress_manager
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &PackError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AnyPack {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use image::RgbImage;
    use serde_json::json;
    use std::fs::File;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn anypack_in(dir: &TempDir) -> AnyPack {
        let mut config = Config::default();
        config.storage.output_directory = dir.path().join("out");
        config.storage.input_directory = dir.path().join("in");
        config.storage.temp_directory = dir.path().join("tmp");
        AnyPack::new(config, OutputMode::Plain, 0, true).unwrap()
    }

    fn frame(rgb: [u8; 3]) -> ImageFrame {
        ImageFrame::new(RgbImage::from_pixel(2, 2, image::Rgb(rgb)))
    }

    fn member_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        names
    }

    #[test]
    fn test_anypack_creation() {
        let dir = TempDir::new().unwrap();
        let anypack = anypack_in(&dir);
        assert_eq!(anypack.config().archive.filename_prefix, "anypack");
    }

    #[test]
    fn test_pack_emits_notification_once_per_session() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let first = anypack
            .pack(
                PackRequest::new(ContentValue::Images(vec![frame([1, 1, 1])]))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();
        let notification = first.notification.expect("first call notifies");
        assert_eq!(notification.filename, "anypack_00001_.zip");
        assert_eq!(notification.location_kind, StorageKind::Output);

        let second = anypack
            .pack(
                PackRequest::new(ContentValue::Images(vec![frame([2, 2, 2])]))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();
        assert!(second.notification.is_none());
    }

    #[test]
    fn test_same_session_accumulates_into_one_archive() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let first = anypack
            .pack(
                PackRequest::new(ContentValue::Text("alpha".to_string()))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();
        let second = anypack
            .pack(
                PackRequest::new(ContentValue::Text("beta".to_string()))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();

        assert_eq!(first.archive_path, second.archive_path);
        assert_eq!(second.total_written, 2);
        assert_eq!(member_names(&second.archive_path).len(), 2);
    }

    #[test]
    fn test_new_fingerprint_starts_fresh_archive_with_reset_counters() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let first = anypack
            .pack(
                PackRequest::new(ContentValue::Images(vec![frame([1, 1, 1])]))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();
        let second = anypack
            .pack(
                PackRequest::new(ContentValue::Images(vec![frame([2, 2, 2])]))
                    .with_session_seed(json!("run-2")),
            )
            .unwrap();

        assert_ne!(first.archive_path, second.archive_path);
        // counters restart, so both archives hold a member with index zero
        assert_eq!(member_names(&first.archive_path), vec!["anypack_00000.png"]);
        assert_eq!(member_names(&second.archive_path), vec!["anypack_00000.png"]);
        assert_eq!(second.total_written, 1);
    }

    #[test]
    fn test_idle_timeout_resets_between_calls() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);
        let start = Utc::now();

        let first = anypack
            .pack_at(
                PackRequest::new(ContentValue::Text("alpha".to_string()))
                    .with_session_seed(json!("run-1")),
                start,
            )
            .unwrap();
        let second = anypack
            .pack_at(
                PackRequest::new(ContentValue::Text("beta".to_string()))
                    .with_session_seed(json!("run-1")),
                start + Duration::seconds(61),
            )
            .unwrap();

        assert_ne!(first.archive_path, second.archive_path);
        assert_eq!(second.total_written, 1);
    }

    #[test]
    fn test_empty_pack_is_terminal_and_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let result = anypack.pack(
            PackRequest::new(ContentValue::Collection(vec![])).with_session_seed(json!("run-1")),
        );
        assert!(matches!(result, Err(PackError::EmptyArchive)));
        assert!(!dir.path().join("out").join("anypack_00001_.zip").exists());
    }

    #[test]
    fn test_text_round_trip_preserves_name_and_body() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let outcome = anypack
            .pack(
                PackRequest::new(ContentValue::Text("notes.txt\nhello".to_string()))
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();

        let result = anypack.unpack(&outcome.archive_path).unwrap();
        assert_eq!(result.texts, vec!["notes.txt\nhello".to_string()]);
        assert_eq!(result.manifest_value(), json!({"txt": ["notes.txt"]}));
    }

    #[test]
    fn test_unpack_missing_archive_is_terminal() {
        let dir = TempDir::new().unwrap();
        let anypack = anypack_in(&dir);

        let result = anypack.unpack(Path::new("absent.zip"));
        assert!(matches!(result, Err(PackError::ArchiveNotFound { .. })));
    }

    #[test]
    fn test_all_arcnames_are_safe() {
        let dir = TempDir::new().unwrap();
        let mut anypack = anypack_in(&dir);

        let value = ContentValue::Collection(vec![
            ContentValue::Images(vec![frame([3, 3, 3])]),
            ContentValue::Text("body without header".to_string()),
            ContentValue::Structured(json!({"k": "v"})),
            ContentValue::Bytes(vec![1, 2, 3]),
        ]);
        let naming = json!({"images": ["..\\evil.png"]});
        let outcome = anypack
            .pack(
                PackRequest::new(value)
                    .with_naming(naming)
                    .with_session_seed(json!("run-1")),
            )
            .unwrap();

        for name in member_names(&outcome.archive_path) {
            assert!(crate::archive::safe_member_relpath(&name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        AnyPack::generate_sample_config(&config_path).unwrap();
        assert!(config_path.exists());

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[archive]"));
        assert!(content.contains("[storage]"));
    }

    #[test]
    fn test_version_info() {
        assert!(!version_info().is_empty());

        let build_info = build_info();
        assert!(build_info.to_string().contains("AnyPack"));
    }
}
