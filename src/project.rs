//! Project identity and per-project persistent state layout.
//!
//! A project is identified by a stable id derived from the canonical
//! repository path and the directory's creation timestamp, so two
//! repositories checked out at the same path at different times get
//! distinct state directories.
//!
//! Layout under `<data-root>/contextweaver/<project-id>/`:
//! - `files.json`: file table and key-value pane
//! - `fts/`: full-text chunk index
//! - `vectors/`: vector store files
//! - `scan.lock`: advisory lock serializing scans

use crate::error::{IndexError, IndexResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Identity and state paths for one indexed repository.
#[derive(Debug, Clone)]
pub struct Project {
    /// Stable project identifier (16 hex chars)
    pub id: String,
    /// Canonicalized repository root
    pub repo_root: PathBuf,
    /// Per-project state directory
    pub data_dir: PathBuf,
}

impl Project {
    /// Resolve the project for a repository root, creating the state
    /// directory if needed. `data_root` overrides the default location
    /// (the user data directory).
    pub fn open(repo_path: &Path, data_root: Option<&Path>) -> IndexResult<Self> {
        let repo_root = repo_path
            .canonicalize()
            .map_err(|e| IndexError::FileRead {
                path: repo_path.to_path_buf(),
                source: e,
            })?;

        let id = Self::derive_id(&repo_root)?;

        let root = match data_root {
            Some(p) => p.to_path_buf(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("contextweaver"),
        };
        let data_dir = root.join(&id);
        fs::create_dir_all(&data_dir).map_err(|e| IndexError::FileRead {
            path: data_dir.clone(),
            source: e,
        })?;

        Ok(Self {
            id,
            repo_root,
            data_dir,
        })
    }

    /// Derive the stable id from canonical path + directory creation time.
    ///
    /// Falls back to the modification time on filesystems that do not
    /// record creation timestamps.
    fn derive_id(repo_root: &Path) -> IndexResult<String> {
        let meta = fs::metadata(repo_root).map_err(|e| IndexError::FileRead {
            path: repo_root.to_path_buf(),
            source: e,
        })?;
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .map_err(|e| IndexError::FileRead {
                path: repo_root.to_path_buf(),
                source: e,
            })?;
        let secs = created
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(repo_root.to_string_lossy().as_bytes());
        hasher.update(b":");
        hasher.update(secs.to_string().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Ok(digest[..16].to_string())
    }

    pub fn files_path(&self) -> PathBuf {
        self.data_dir.join("files.json")
    }

    pub fn fts_dir(&self) -> PathBuf {
        self.data_dir.join("fts")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("scan.lock")
    }
}

/// Advisory file lock serializing scans for one project.
///
/// Holds the owner PID in the lock file. A lock whose owner is no longer
/// alive is reclaimed, so a crashed scan does not wedge the project.
#[derive(Debug)]
pub struct ScanLock {
    path: PathBuf,
}

impl ScanLock {
    /// Acquire the lock, failing if another live process holds it.
    pub fn acquire(path: &Path) -> IndexResult<Self> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut f) => {
                let _ = write!(f, "{}", std::process::id());
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok());
                match holder {
                    Some(pid) if Self::process_alive(pid) => Err(IndexError::ScanLocked {
                        path: path.to_path_buf(),
                        pid,
                    }),
                    _ => {
                        // Stale lock from a dead process: reclaim it.
                        fs::remove_file(path).map_err(|e| IndexError::FileRead {
                            path: path.to_path_buf(),
                            source: e,
                        })?;
                        Self::acquire(path)
                    }
                }
            }
            Err(e) => Err(IndexError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{pid}")).exists()
    }

    /// Without /proc there is no cheap liveness probe; treat the lock as held.
    #[cfg(not(target_os = "linux"))]
    fn process_alive(_pid: u32) -> bool {
        true
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn project_id_is_stable_for_same_path() {
        let dir = TempDir::new().unwrap();
        let p1 = Project::open(dir.path(), Some(dir.path())).unwrap();
        let p2 = Project::open(dir.path(), Some(dir.path())).unwrap();
        assert_eq!(p1.id, p2.id);
        assert_eq!(p1.id.len(), 16);
    }

    #[test]
    fn different_paths_get_different_ids() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let pa = Project::open(a.path(), Some(root.path())).unwrap();
        let pb = Project::open(b.path(), Some(root.path())).unwrap();
        assert_ne!(pa.id, pb.id);
    }

    #[test]
    fn scan_lock_excludes_second_holder() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("scan.lock");

        let _held = ScanLock::acquire(&lock_path).unwrap();
        let second = ScanLock::acquire(&lock_path);
        assert!(matches!(second, Err(IndexError::ScanLocked { .. })));
    }

    #[test]
    fn scan_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("scan.lock");

        {
            let _held = ScanLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());

        let reacquired = ScanLock::acquire(&lock_path);
        assert!(reacquired.is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("scan.lock");

        // A pid that cannot be alive (pid_max on Linux is < 2^22 by default)
        fs::write(&lock_path, "4194999").unwrap();
        let lock = ScanLock::acquire(&lock_path);
        if cfg!(target_os = "linux") {
            assert!(lock.is_ok());
        }
    }
}
