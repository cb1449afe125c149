use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Archive not found: {path}")]
    ArchiveNotFound { path: String },

    #[error("No content was written to the archive")]
    EmptyArchive,

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("Unsupported format: {what}")]
    Unsupported { what: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },
}

impl PackError {
    /// Whether this failure concerns a single member and the enclosing
    /// pack/unpack operation should keep going without it.
    pub fn is_member_recoverable(&self) -> bool {
        matches!(
            self,
            PackError::InvalidPath { .. }
                | PackError::Decode { .. }
                | PackError::Unsupported { .. }
                | PackError::Image(_)
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for PackError {
    fn user_message(&self) -> String {
        match self {
            PackError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            PackError::InvalidPath { path } => {
                format!("Invalid path: {}", path)
            }
            PackError::ArchiveNotFound { path } => {
                format!("Archive not found: {}", path)
            }
            PackError::EmptyArchive => {
                "Nothing was written: the input was empty or contained no packable content"
                    .to_string()
            }
            PackError::Decode { what, reason } => {
                format!("Could not decode {}: {}", what, reason)
            }
            PackError::Unsupported { what } => {
                format!("Unsupported format: {}", what)
            }
            PackError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            PackError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present."
                    .to_string(),
            ),
            PackError::ArchiveNotFound { .. } => Some(
                "Verify the archive path exists. Relative paths are resolved against the configured input directory.".to_string(),
            ),
            PackError::EmptyArchive => Some(
                "Provide at least one image, video, audio, text, or file input. Unreadable members are skipped silently.".to_string(),
            ),
            PackError::Unsupported { .. } => Some(
                "See the documentation for the list of supported image, video, audio, and text extensions.".to_string(),
            ),
            PackError::Permission { .. } => Some(
                "Ensure you have the necessary read/write permissions for the target directory."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for PackError {
    fn from(error: toml::de::Error) -> Self {
        PackError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = PackError::EmptyArchive;
        assert!(error.user_message().contains("Nothing was written"));
        assert!(error.suggestion().is_some());

        let error = PackError::InvalidPath {
            path: "../escape".to_string(),
        };
        assert!(error.user_message().contains("../escape"));
    }

    #[test]
    fn test_member_recoverable_classification() {
        assert!(PackError::InvalidPath {
            path: "x".to_string()
        }
        .is_member_recoverable());
        assert!(PackError::Decode {
            what: "wav".to_string(),
            reason: "truncated".to_string()
        }
        .is_member_recoverable());
        assert!(!PackError::EmptyArchive.is_member_recoverable());
        assert!(!PackError::Io(std::io::Error::other("disk")).is_member_recoverable());
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Value>("not [ valid").unwrap_err();
        let error = PackError::from(toml_error);
        assert!(matches!(error, PackError::Config { .. }));
    }
}
