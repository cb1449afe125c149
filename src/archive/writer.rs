use crate::error::Result;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Append-capable deflate ZIP writer that keeps member names unique.
pub struct ArchiveWriter {
    writer: ZipWriter<File>,
    options: FileOptions,
    seen: HashSet<String>,
}

impl ArchiveWriter {
    /// Create a fresh archive, or reopen an existing one for append. On
    /// append the existing member names are loaded so collision suffixes
    /// keep working across calls.
    pub fn open(path: &Path, append: bool, compression_level: i64) -> Result<Self> {
        let (writer, seen) = if append && path.is_file() {
            let seen = match ZipArchive::new(File::open(path)?) {
                Ok(archive) => archive.file_names().map(String::from).collect(),
                Err(_) => HashSet::new(),
            };
            let file = OpenOptions::new().read(true).write(true).open(path)?;
            (ZipWriter::new_append(file)?, seen)
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            (ZipWriter::new(File::create(path)?), HashSet::new())
        };

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level as i32));

        Ok(Self {
            writer,
            options,
            seen,
        })
    }

    /// Reserve a member name, appending `_dupN` before the extension until
    /// it no longer collides with anything already in the archive.
    pub fn unique_name(&mut self, arcname: &str) -> String {
        if self.seen.insert(arcname.to_string()) {
            return arcname.to_string();
        }

        // suffix numbering counts the write attempt, so the first duplicate
        // of a name becomes `_dup2`
        let (stem, ext) = split_extension(arcname);
        let mut n = 2usize;
        loop {
            let candidate = if ext.is_empty() {
                format!("{}_dup{}", stem, n)
            } else {
                format!("{}_dup{}.{}", stem, n, ext)
            };
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn write_member(&mut self, arcname: &str, bytes: &[u8]) -> Result<()> {
        self.writer.start_file(arcname, self.options)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Stream a file from disk into the archive without loading it whole.
    pub fn write_file_verbatim(&mut self, arcname: &str, path: &Path) -> Result<u64> {
        self.writer.start_file(arcname, self.options)?;
        let mut file = File::open(path)?;
        Ok(std::io::copy(&mut file, &mut self.writer)?)
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}

/// Split a member name into (everything before, extension) where the
/// extension belongs to the final path component.
fn split_extension(arcname: &str) -> (&str, &str) {
    let basename_start = arcname.rfind('/').map(|i| i + 1).unwrap_or(0);
    match arcname[basename_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = basename_start + dot;
            (&arcname[..split], &arcname[split + 1..])
        }
        _ => (arcname, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_member(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut member = archive.by_name(name).unwrap();
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");

        let mut writer = ArchiveWriter::open(&path, false, 6).unwrap();
        writer.write_member("hello.txt", b"hi there").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_member(&path, "hello.txt"), b"hi there");
    }

    #[test]
    fn test_append_preserves_existing_members() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");

        let mut writer = ArchiveWriter::open(&path, false, 6).unwrap();
        writer.write_member("first.txt", b"one").unwrap();
        writer.finish().unwrap();

        let mut writer = ArchiveWriter::open(&path, true, 6).unwrap();
        writer.write_member("second.txt", b"two").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_member(&path, "first.txt"), b"one");
        assert_eq!(read_member(&path, "second.txt"), b"two");
    }

    #[test]
    fn test_unique_name_suffixes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");
        let mut writer = ArchiveWriter::open(&path, false, 6).unwrap();

        assert_eq!(writer.unique_name("a/b.png"), "a/b.png");
        assert_eq!(writer.unique_name("a/b.png"), "a/b_dup2.png");
        assert_eq!(writer.unique_name("a/b.png"), "a/b_dup3.png");
        assert_eq!(writer.unique_name("noext"), "noext");
        assert_eq!(writer.unique_name("noext"), "noext_dup2");
    }

    #[test]
    fn test_unique_name_survives_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");

        let mut writer = ArchiveWriter::open(&path, false, 6).unwrap();
        let name = writer.unique_name("x.txt");
        writer.write_member(&name, b"one").unwrap();
        writer.finish().unwrap();

        let mut writer = ArchiveWriter::open(&path, true, 6).unwrap();
        assert_eq!(writer.unique_name("x.txt"), "x_dup2.txt");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a/b.png"), ("a/b", "png"));
        assert_eq!(split_extension("b.png"), ("b", "png"));
        assert_eq!(split_extension("a.dir/noext"), ("a.dir/noext", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_append_to_missing_file_creates_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.zip");

        let mut writer = ArchiveWriter::open(&path, true, 6).unwrap();
        writer.write_member("a.txt", b"x").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_member(&path, "a.txt"), b"x");
    }
}
