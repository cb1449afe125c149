use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// Prefix for synthesized member names and the archive filename itself.
    /// May contain `/` segments; the leading segments become the subfolder.
    pub filename_prefix: String,
    /// Deflate level handed to the ZIP writer (0-9).
    pub compression_level: i64,
    /// Seconds of inactivity after which an accumulation session is reset.
    pub idle_timeout_secs: i64,
    /// Embed provenance text into PNG members / video sidecars.
    pub embed_metadata: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub output_directory: PathBuf,
    pub input_directory: PathBuf,
    pub temp_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            filename_prefix: "anypack".to_string(),
            compression_level: 6,
            idle_timeout_secs: 60,
            embed_metadata: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            output_directory: cwd.join("output"),
            input_directory: cwd.join("input"),
            temp_directory: std::env::temp_dir().join("anypack"),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PackError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PackError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| PackError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["anypack.toml", "anypack.config.toml", ".anypack.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref prefix) = cli_args.prefix {
            self.archive.filename_prefix = prefix.clone();
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.storage.output_directory = output_dir.clone();
        }

        if let Some(ref input_dir) = cli_args.input_dir {
            self.storage.input_directory = input_dir.clone();
        }

        if let Some(embed) = cli_args.embed_metadata {
            self.archive.embed_metadata = embed;
        }

        if let Some(timeout) = cli_args.idle_timeout_secs {
            self.archive.idle_timeout_secs = timeout;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| PackError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| PackError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive.filename_prefix.trim().is_empty() {
            return Err(PackError::Config {
                message: "Filename prefix must not be empty".to_string(),
            });
        }

        if !(0..=9).contains(&self.archive.compression_level) {
            return Err(PackError::Config {
                message: format!(
                    "Compression level must be between 0 and 9, got {}",
                    self.archive.compression_level
                ),
            });
        }

        if self.archive.idle_timeout_secs <= 0 {
            return Err(PackError::Config {
                message: "Idle timeout must be greater than 0 seconds".to_string(),
            });
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.archive.idle_timeout_secs)
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub prefix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub embed_metadata: Option<bool>,
    pub idle_timeout_secs: Option<i64>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_input_dir(mut self, input_dir: Option<PathBuf>) -> Self {
        self.input_dir = input_dir;
        self
    }

    pub fn with_embed_metadata(mut self, embed: Option<bool>) -> Self {
        self.embed_metadata = embed;
        self
    }

    pub fn with_idle_timeout_secs(mut self, timeout: Option<i64>) -> Self {
        self.idle_timeout_secs = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.archive.filename_prefix, "anypack");
        assert_eq!(config.archive.compression_level, 6);
        assert_eq!(config.archive.idle_timeout_secs, 60);
        assert!(config.archive.embed_metadata);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.archive.filename_prefix = "  ".to_string();
        assert!(config.validate().is_err());

        config.archive.filename_prefix = "ok".to_string();
        config.archive.compression_level = 12;
        assert!(config.validate().is_err());

        config.archive.compression_level = 6;
        config.archive.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let config = Config::default();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(
            config.archive.filename_prefix,
            loaded_config.archive.filename_prefix
        );
        assert_eq!(
            config.storage.output_directory,
            loaded_config.storage.output_directory
        );
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_prefix(Some("batch".to_string()))
            .with_embed_metadata(Some(false))
            .with_idle_timeout_secs(Some(120));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.archive.filename_prefix, "batch");
        assert!(!config.archive.embed_metadata);
        assert_eq!(config.archive.idle_timeout_secs, 120);
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(!sample.is_empty());
        assert!(sample.contains("[archive]"));
        assert!(sample.contains("[storage]"));
    }
}
