use crate::config::StorageConfig;
use crate::error::{PackError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The storage roots a file reference or archive may live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Input,
    Output,
    Temp,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Input => "input",
            StorageKind::Output => "output",
            StorageKind::Temp => "temp",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "input" => Some(StorageKind::Input),
            "output" => Some(StorageKind::Output),
            "temp" => Some(StorageKind::Temp),
            _ => None,
        }
    }
}

/// An allocated archive target under the output root.
#[derive(Debug, Clone)]
pub struct SavePath {
    pub directory: PathBuf,
    pub filename_base: String,
    pub counter: u32,
    pub subfolder: String,
}

impl SavePath {
    pub fn archive_filename(&self) -> String {
        format!("{}_{:05}_.zip", self.filename_base, self.counter)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.directory.join(self.archive_filename())
    }
}

/// Resolves storage kinds to absolute roots and allocates unique output
/// paths for new archives.
pub struct Storage {
    input_directory: PathBuf,
    output_directory: PathBuf,
    temp_directory: PathBuf,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            input_directory: config.input_directory.clone(),
            output_directory: config.output_directory.clone(),
            temp_directory: config.temp_directory.clone(),
        }
    }

    pub fn directory_for(&self, kind: StorageKind) -> &Path {
        match kind {
            StorageKind::Input => &self.input_directory,
            StorageKind::Output => &self.output_directory,
            StorageKind::Temp => &self.temp_directory,
        }
    }

    /// Allocate the next free `<prefix>_<counter:05>_` slot under the output
    /// root. A prefix with `/` segments places the archive in a subfolder.
    /// The counter resumes one past the highest existing match, starting at 1.
    pub fn allocate_save_path(&self, prefix: &str) -> Result<SavePath> {
        let prefix = prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            return Err(PackError::Config {
                message: "Filename prefix must not be empty".to_string(),
            });
        }

        let (subfolder, filename_base) = match prefix.rsplit_once('/') {
            Some((sub, base)) => (sub.to_string(), base.to_string()),
            None => (String::new(), prefix.to_string()),
        };

        let directory = if subfolder.is_empty() {
            self.output_directory.clone()
        } else {
            self.output_directory.join(&subfolder)
        };

        fs::create_dir_all(&directory).map_err(|e| PackError::Permission {
            path: format!("Cannot create output directory {}: {}", directory.display(), e),
        })?;

        let pattern = Regex::new(&format!(r"^{}_(\d+)_", regex::escape(&filename_base)))
            .map_err(|e| PackError::Config {
                message: format!("Invalid filename prefix {}: {}", filename_base, e),
            })?;

        let mut highest = 0u32;
        for entry in fs::read_dir(&directory).map_err(PackError::Io)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(caps) = pattern.captures(&name) {
                if let Ok(counter) = caps[1].parse::<u32>() {
                    highest = highest.max(counter);
                }
            }
        }

        Ok(SavePath {
            directory,
            filename_base,
            counter: highest + 1,
            subfolder,
        })
    }

    /// Root for reader staging directories; created lazily.
    pub fn extract_staging_root(&self) -> PathBuf {
        self.temp_directory.join("archive_extract")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> Storage {
        Storage::new(&StorageConfig {
            output_directory: dir.path().join("out"),
            input_directory: dir.path().join("in"),
            temp_directory: dir.path().join("tmp"),
        })
    }

    #[test]
    fn test_directory_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        assert_eq!(
            storage.directory_for(StorageKind::Output),
            temp_dir.path().join("out")
        );
        assert_eq!(
            storage.directory_for(StorageKind::Input),
            temp_dir.path().join("in")
        );
    }

    #[test]
    fn test_allocation_starts_at_one() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        let save_path = storage.allocate_save_path("batch").unwrap();
        assert_eq!(save_path.counter, 1);
        assert_eq!(save_path.archive_filename(), "batch_00001_.zip");
        assert_eq!(save_path.subfolder, "");
        assert!(save_path.directory.exists());
    }

    #[test]
    fn test_allocation_resumes_after_existing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        let out = temp_dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("batch_00003_.zip"), b"x").unwrap();
        std::fs::write(out.join("batch_00007_.zip"), b"x").unwrap();
        std::fs::write(out.join("other_00042_.zip"), b"x").unwrap();

        let save_path = storage.allocate_save_path("batch").unwrap();
        assert_eq!(save_path.counter, 8);
    }

    #[test]
    fn test_prefix_with_subfolder() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        let save_path = storage.allocate_save_path("runs/batch").unwrap();
        assert_eq!(save_path.subfolder, "runs");
        assert_eq!(save_path.filename_base, "batch");
        assert_eq!(save_path.directory, temp_dir.path().join("out").join("runs"));
        assert!(save_path.directory.exists());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        assert!(storage.allocate_save_path("  ").is_err());
        assert!(storage.allocate_save_path("/").is_err());
    }

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!(StorageKind::from_str_loose("Output"), Some(StorageKind::Output));
        assert_eq!(StorageKind::from_str_loose(" input "), Some(StorageKind::Input));
        assert_eq!(StorageKind::from_str_loose("bogus"), None);
    }
}
