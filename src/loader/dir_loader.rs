use crate::content::{extension_of, AudioBuffer, Category, ContentValue, ImageFrame, VideoHandle};
use crate::error::{PackError, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Turns files and directory trees on disk into packable content values,
/// classifying each file by extension. Relative paths under the loaded root
/// become member names, so a later unpack restores the original layout.
pub struct DirectoryLoader {
    follow_links: bool,
    max_depth: Option<usize>,
    include_hidden: bool,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            include_hidden: false,
        }
    }
}

impl DirectoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Load a single file or a whole directory tree.
    pub fn load_path(&self, path: &Path) -> Result<ContentValue> {
        if path.is_dir() {
            self.load_dir(path)
        } else if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.load_file(path, &name)
        } else {
            Err(PackError::InvalidPath {
                path: path.display().to_string(),
            })
        }
    }

    pub fn load_dir(&self, root: &Path) -> Result<ContentValue> {
        if !root.is_dir() {
            return Err(PackError::InvalidPath {
                path: root.display().to_string(),
            });
        }

        let mut walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut values = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.include_hidden && is_hidden(entry.path(), root) {
                continue;
            }

            let member_name = entry
                .path()
                .strip_prefix(root)
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| entry.file_name().to_string_lossy().to_string());

            match self.load_file(entry.path(), &member_name) {
                Ok(value) => values.push(value),
                // unreadable files drop out of the batch, same as members
                Err(_) => continue,
            }
        }

        Ok(ContentValue::Collection(values))
    }

    fn load_file(&self, path: &Path, member_name: &str) -> Result<ContentValue> {
        let ext = extension_of(member_name);

        match Category::for_extension(&ext) {
            Some(Category::Images) => {
                let bytes = std::fs::read(path)?;
                let frame = ImageFrame::decode(&bytes)?;
                Ok(ContentValue::Images(vec![frame]))
            }
            Some(Category::Videos) => Ok(ContentValue::Video(
                VideoHandle::from_file(path).with_member_name(member_name),
            )),
            Some(Category::Audios) => {
                let bytes = std::fs::read(path)?;
                let buffer = AudioBuffer::decode(&bytes, &ext)?
                    .with_member_name(member_name)
                    .with_original_bytes(bytes);
                Ok(ContentValue::Audio(buffer))
            }
            Some(Category::Texts) | Some(Category::Workflows) => {
                let bytes = std::fs::read(path)?;
                let content = String::from_utf8_lossy(&bytes);
                // header line carries the member name through the text path
                Ok(ContentValue::Text(format!("{}\n{}", member_name, content)))
            }
            None => {
                let bytes = std::fs::read(path)?;
                Ok(ContentValue::Bytes(bytes))
            }
        }
    }
}

fn is_hidden(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components().any(|c| {
                c.as_os_str()
                    .to_string_lossy()
                    .starts_with('.')
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_dir_classifies_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("raw.dat"), [0u8, 1, 2]).unwrap();

        let value = DirectoryLoader::new().load_dir(dir.path()).unwrap();
        let ContentValue::Collection(values) = value else {
            panic!("expected a collection");
        };
        assert_eq!(values.len(), 3);

        match &values[0] {
            ContentValue::Text(text) => assert_eq!(text, "a.txt\nalpha"),
            other => panic!("expected text, got {:?}", other),
        }
        match &values[1] {
            ContentValue::Text(text) => assert_eq!(text, "b.txt\nbeta"),
            other => panic!("expected text, got {:?}", other),
        }
        assert!(matches!(values[2], ContentValue::Bytes(_)));
    }

    #[test]
    fn test_nested_paths_become_member_names() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/notes.md"), "content").unwrap();

        let value = DirectoryLoader::new().load_dir(dir.path()).unwrap();
        let ContentValue::Collection(values) = value else {
            panic!("expected a collection");
        };
        match &values[0] {
            ContentValue::Text(text) => assert_eq!(text, "sub/notes.md\ncontent"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_hidden_files_skipped_by_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".secret.txt"), "hidden").unwrap();
        std::fs::write(dir.path().join("plain.txt"), "visible").unwrap();

        let value = DirectoryLoader::new().load_dir(dir.path()).unwrap();
        let ContentValue::Collection(values) = value else {
            panic!("expected a collection");
        };
        assert_eq!(values.len(), 1);

        let value = DirectoryLoader::new()
            .with_include_hidden(true)
            .load_dir(dir.path())
            .unwrap();
        let ContentValue::Collection(values) = value else {
            panic!("expected a collection");
        };
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("only.txt");
        std::fs::write(&path, "body").unwrap();

        let value = DirectoryLoader::new().load_path(&path).unwrap();
        match value {
            ContentValue::Text(text) => assert_eq!(text, "only.txt\nbody"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(DirectoryLoader::new()
            .load_path(&dir.path().join("absent"))
            .is_err());
    }

    #[test]
    fn test_video_files_keep_member_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), [0u8; 16]).unwrap();

        let value = DirectoryLoader::new().load_dir(dir.path()).unwrap();
        let ContentValue::Collection(values) = value else {
            panic!("expected a collection");
        };
        match &values[0] {
            ContentValue::Video(handle) => {
                assert_eq!(handle.member_name(), Some("clip.mp4"));
                assert!(handle.source_file().is_some());
            }
            other => panic!("expected video, got {:?}", other),
        }
    }
}
