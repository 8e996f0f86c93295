//! Filesystem seam shared by the registry, the metric cache and the reports.
//!
//! Everything that touches disk outside of source discovery goes through
//! [`FileSystem`], so tests can swap in the in-memory [`mock::MockFs`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write content to a file, creating parent directories as needed.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Files directly inside `dir` with the given extension, sorted by path.
    fn list_files(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_files(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

pub fn default_fs() -> Arc<dyn FileSystem> {
    Arc::new(RealFs)
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::RwLock;

    /// In-memory filesystem for testing.
    #[derive(Debug, Default)]
    pub struct MockFs {
        files: RwLock<BTreeMap<PathBuf, String>>,
    }

    impl MockFs {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_files<I, P, C>(files: I) -> Self
        where
            I: IntoIterator<Item = (P, C)>,
            P: AsRef<Path>,
            C: Into<String>,
        {
            let map = files
                .into_iter()
                .map(|(p, c)| (p.as_ref().to_path_buf(), c.into()))
                .collect();
            Self {
                files: RwLock::new(map),
            }
        }

        pub fn contents(&self, path: &Path) -> Option<String> {
            self.files.read().unwrap().get(path).cloned()
        }
    }

    impl FileSystem for MockFs {
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.contents(path).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file not found: {}", path.display()),
                )
            })
        }

        fn write(&self, path: &Path, content: &str) -> io::Result<()> {
            self.files
                .write()
                .unwrap()
                .insert(path.to_path_buf(), content.to_string());
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            let files = self.files.read().unwrap();
            files.contains_key(path) || files.keys().any(|p| p.starts_with(path))
        }

        fn list_files(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
            if !self.exists(dir) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("directory not found: {}", dir.display()),
                ));
            }
            Ok(self
                .files
                .read()
                .unwrap()
                .keys()
                .filter(|p| p.parent() == Some(dir))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
                .cloned()
                .collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_fs_read_write() {
            let fs = MockFs::new();
            let path = Path::new("/test/file.txt");

            assert!(!fs.exists(path));
            assert!(fs.read_to_string(path).is_err());

            fs.write(path, "hello world").unwrap();
            assert!(fs.exists(path));
            assert!(fs.exists(Path::new("/test")));
            assert_eq!(fs.read_to_string(path).unwrap(), "hello world");
        }

        #[test]
        fn test_mock_fs_list_files() {
            let fs = MockFs::with_files([
                ("/a/one.toml", ""),
                ("/a/two.txt", ""),
                ("/a/nested/three.toml", ""),
                ("/a/zero.toml", ""),
            ]);

            let files = fs.list_files(Path::new("/a"), "toml").unwrap();
            assert_eq!(
                files,
                vec![PathBuf::from("/a/one.toml"), PathBuf::from("/a/zero.toml")]
            );
            assert!(fs.list_files(Path::new("/missing"), "toml").is_err());
        }
    }
}
