use ignore::WalkBuilder;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSIONS: &[&str] = &["rs", "py"];
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__"];

/// A source file together with the root it was discovered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub root: PathBuf,
}

impl SourceUnit {
    pub fn new(path: PathBuf, root: PathBuf) -> Self {
        Self { path, root }
    }

    /// Directory names between the root and the file.
    pub fn package_segments(&self) -> Vec<String> {
        let relative = self.path.strip_prefix(&self.root).unwrap_or(&self.path);
        relative
            .parent()
            .map(|dir| {
                dir.components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .filter(|s| !s.is_empty() && *s != ".")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Finds the files to parse under a set of source roots.
#[derive(Debug, Clone)]
pub struct SourceDiscovery {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
    exclude_dirs: Vec<String>,
}

impl SourceDiscovery {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        if !extensions.is_empty() {
            self.extensions = extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
        }
        self
    }

    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.exclude_dirs.extend(dirs);
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn has_reachable_root(&self) -> bool {
        self.roots.iter().any(|root| root.exists())
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == &ext.to_lowercase()))
    }

    /// Every matching file, sorted by path within each root. Unreachable
    /// roots are skipped. A file reachable from several roots is reported
    /// once, under the first root that reaches it.
    pub fn discover(&self) -> Vec<SourceUnit> {
        let mut units: IndexMap<PathBuf, SourceUnit> = IndexMap::new();
        let mut insert = |unit: SourceUnit| {
            let identity = std::fs::canonicalize(&unit.path).unwrap_or_else(|_| unit.path.clone());
            if units.contains_key(&identity) {
                tracing::debug!(path = %unit.path.display(), "file already discovered under another root");
                return;
            }
            units.insert(identity, unit);
        };

        for root in &self.roots {
            if !root.exists() {
                tracing::warn!(root = %root.display(), "source root does not exist, skipping");
                continue;
            }
            if root.is_file() {
                if self.accepts(root) {
                    let base = root.parent().map(Path::to_path_buf).unwrap_or_default();
                    insert(SourceUnit::new(root.clone(), base));
                }
                continue;
            }

            let excluded = self.exclude_dirs.clone();
            let walker = WalkBuilder::new(root)
                .hidden(true)
                .git_ignore(true)
                .sort_by_file_path(|a, b| a.cmp(b))
                .filter_entry(move |entry| {
                    let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                    !(is_dir && entry.depth() > 0 && excluded.iter().any(|d| entry.file_name() == d.as_str()))
                })
                .build();

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if path.is_file() && self.accepts(path) {
                            insert(SourceUnit::new(path.to_path_buf(), root.clone()));
                        }
                    }
                    Err(e) => tracing::warn!(root = %root.display(), "skipping unreadable entry: {}", e),
                }
            }
        }

        tracing::debug!(files = units.len(), "source discovery finished");
        units.into_values().collect()
    }
}
