//! Repository crawler with exclude filtering.
//!
//! Traversal respects .gitignore rules and never follows symlinks out of
//! the repository. On top of that, a baseline exclude list (dependency
//! directories, lockfiles, build outputs, binary extensions, caches) plus
//! user-supplied patterns filter the candidates.
//!
//! Pattern semantics are segment-wise: a pattern without a path separator
//! matches when any path component equals it (glob-style); a pattern with
//! a separator matches the repo-relative path as a glob.

use crate::error::{IndexError, IndexResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Baseline exclude patterns applied to every repository.
const DEFAULT_EXCLUDES: &[&str] = &[
    // Dependency and environment directories
    "node_modules",
    "bower_components",
    "vendor",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    ".tox",
    "site-packages",
    // Build outputs
    "target",
    "dist",
    "build",
    "out",
    "bin",
    "obj",
    ".next",
    ".nuxt",
    // VCS / IDE
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    // Caches and logs
    ".cache",
    ".pytest_cache",
    ".mypy_cache",
    ".gradle",
    "coverage",
    "logs",
    "*.log",
    "tmp",
    // Fixtures and mocks
    "fixtures",
    "__fixtures__",
    "__mocks__",
    "__snapshots__",
    "testdata",
    // Lockfiles
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    // Minified and generated artifacts
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.generated.*",
    // Binary and media extensions
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.ico", "*.bmp", "*.webp", "*.svg",
    "*.pdf", "*.zip", "*.tar", "*.gz", "*.bz2", "*.7z", "*.rar",
    "*.exe", "*.dll", "*.so", "*.dylib", "*.a", "*.o", "*.obj",
    "*.class", "*.jar", "*.war", "*.pyc", "*.pyo", "*.wasm",
    "*.woff", "*.woff2", "*.ttf", "*.eot", "*.otf",
    "*.mp3", "*.mp4", "*.avi", "*.mov", "*.wav",
    "*.db", "*.sqlite", "*.bin",
];

/// Walks a repository and yields the repo-relative paths to index.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    /// Patterns matched against individual path components
    component_set: GlobSet,
    /// Patterns (containing a separator) matched against the whole
    /// repo-relative path
    path_set: GlobSet,
}

impl Walker {
    pub fn new(root: &Path, user_patterns: &[String]) -> IndexResult<Self> {
        let mut component = GlobSetBuilder::new();
        let mut path = GlobSetBuilder::new();

        let all = DEFAULT_EXCLUDES
            .iter()
            .map(|p| p.to_string())
            .chain(user_patterns.iter().cloned());
        for pattern in all {
            let glob = match Glob::new(&pattern) {
                Ok(g) => g,
                Err(e) => {
                    warn!(%pattern, error = %e, "skipping invalid exclude pattern");
                    continue;
                }
            };
            if pattern.contains('/') {
                path.add(glob);
            } else {
                component.add(glob);
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            component_set: component.build().map_err(|e| {
                IndexError::General(format!("failed to build exclude set: {e}"))
            })?,
            path_set: path.build().map_err(|e| {
                IndexError::General(format!("failed to build exclude set: {e}"))
            })?,
        })
    }

    /// True when the repo-relative path is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.path_set.is_match(relative) {
            return true;
        }
        relative
            .components()
            .any(|c| self.component_set.is_match(Path::new(c.as_os_str())))
    }

    /// Enumerate candidate files as repo-relative paths, sorted for
    /// deterministic scan order.
    pub fn walk(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
                if self.is_excluded(&relative) {
                    None
                } else {
                    Some(relative)
                }
            })
            .collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "content").unwrap();
    }

    #[test]
    fn walks_source_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "README.md");

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&PathBuf::from("src/main.rs")));
    }

    #[test]
    fn default_excludes_skip_dependency_dirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "node_modules/lib/index.js");
        touch(dir.path(), "target/debug/main.rs");
        touch(dir.path(), "src/lib.rs");

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk();
        assert_eq!(files, vec![PathBuf::from("src/lib.rs")]);
    }

    #[test]
    fn binary_extensions_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "logo.png");
        touch(dir.path(), "app.exe");
        touch(dir.path(), "main.go");

        let walker = Walker::new(dir.path(), &[]).unwrap();
        assert_eq!(walker.walk(), vec![PathBuf::from("main.go")]);
    }

    #[test]
    fn separator_free_pattern_matches_any_component() {
        let dir = TempDir::new().unwrap();
        let walker = Walker::new(dir.path(), &["generated".to_string()]).unwrap();
        assert!(walker.is_excluded(Path::new("src/generated/api.ts")));
        assert!(walker.is_excluded(Path::new("generated/api.ts")));
        assert!(!walker.is_excluded(Path::new("src/api.ts")));
    }

    #[test]
    fn separator_pattern_matches_relative_path() {
        let dir = TempDir::new().unwrap();
        let walker = Walker::new(dir.path(), &["docs/**/*.ts".to_string()]).unwrap();
        assert!(walker.is_excluded(Path::new("docs/api/types.ts")));
        assert!(!walker.is_excluded(Path::new("src/api/types.ts")));
    }

    #[test]
    fn lockfiles_are_excluded() {
        let dir = TempDir::new().unwrap();
        let walker = Walker::new(dir.path(), &[]).unwrap();
        assert!(walker.is_excluded(Path::new("Cargo.lock")));
        assert!(walker.is_excluded(Path::new("web/package-lock.json")));
    }

    #[test]
    fn symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "secret.rs");
        touch(dir.path(), "main.rs");
        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk();
        assert_eq!(files, vec![PathBuf::from("main.rs")]);
    }

    #[test]
    fn invalid_user_pattern_is_ignored() {
        let dir = TempDir::new().unwrap();
        let walker = Walker::new(dir.path(), &["[".to_string()]);
        assert!(walker.is_ok());
    }
}
