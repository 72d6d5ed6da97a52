//! Persistent vector store over chunk records.
//!
//! # Storage format
//!
//! Two files under the store directory:
//! - `rows.json`: every chunk field except the embedding, in row order
//! - `vectors.bin`: 16-byte header (magic, version, dimension, count)
//!   followed by contiguous little-endian f32 rows
//!
//! Vectors are unit-normalized on insert, so cosine similarity is a dot
//! product at query time. Saves go through temp files + rename; a reader
//! opening the store always sees a consistent snapshot.

use super::ChunkRecord;
use crate::error::{StoreError, StoreResult};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Magic bytes identifying vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"WVEC";

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// A vector search hit: the stored record plus its similarity score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub record: ChunkRecord,
    pub score: f32,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<ChunkRecord>,
    by_file: HashMap<String, Vec<usize>>,
}

impl Inner {
    fn rebuild_file_index(&mut self) {
        self.by_file.clear();
        for (i, row) in self.rows.iter().enumerate() {
            self.by_file
                .entry(row.relative_path.clone())
                .or_default()
                .push(i);
        }
        let rows = &self.rows;
        for indexes in self.by_file.values_mut() {
            indexes.sort_by_key(|&i| rows[i].chunk_index);
        }
    }
}

/// Persistent store of chunk records keyed by chunk id.
#[derive(Debug)]
pub struct VectorStore {
    dir: PathBuf,
    dimension: usize,
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Open existing storage or initialize an empty one.
    ///
    /// Returns [`StoreError::DimensionChanged`] when the on-disk dimension
    /// differs from `dimension`; the caller decides whether to rebuild.
    pub fn open_or_create(dir: &Path, dimension: usize) -> StoreResult<Self> {
        fs::create_dir_all(dir).map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let store = Self {
            dir: dir.to_path_buf(),
            dimension,
            inner: RwLock::new(Inner::default()),
        };
        if store.vectors_path().exists() {
            store.load()?;
        }
        Ok(store)
    }

    /// Remove all storage files, leaving the directory empty.
    ///
    /// Used when a dimension change forces a rebuild.
    pub fn wipe(dir: &Path) -> StoreResult<()> {
        for name in ["rows.json", "vectors.bin"] {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| StoreError::Io { path, source: e })?;
            }
        }
        Ok(())
    }

    fn rows_path(&self) -> PathBuf {
        self.dir.join("rows.json")
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join("vectors.bin")
    }

    /// Atomically replace the chunk set of each given file.
    ///
    /// New rows are appended before stale rows (same path, different file
    /// hash, or superseded chunk id) are removed, so the persisted snapshot
    /// transitions from old-complete to new-complete without a window where
    /// a file has no chunks.
    pub fn batch_upsert_files(
        &self,
        files: Vec<(String, Vec<ChunkRecord>)>,
    ) -> StoreResult<()> {
        {
            let mut inner = self.inner.write();
            for (path, mut records) in files {
                for r in &mut records {
                    if r.vector.len() != self.dimension {
                        return Err(StoreError::Corrupted {
                            reason: format!(
                                "chunk '{}' has vector of length {}, store dimension is {}",
                                r.chunk_id,
                                r.vector.len(),
                                self.dimension
                            ),
                        });
                    }
                    normalize(&mut r.vector);
                }
                let new_ids: HashSet<String> =
                    records.iter().map(|r| r.chunk_id.clone()).collect();
                let new_hash = records.first().map(|r| r.file_hash.clone());

                let stale_before = inner.rows.len();
                inner.rows.extend(records);
                // Remove superseded rows, all of which precede the insert point
                let mut idx = 0;
                inner.rows.retain(|row| {
                    let keep = if idx >= stale_before {
                        true
                    } else {
                        !(row.relative_path == path
                            && (Some(&row.file_hash) != new_hash.as_ref()
                                || new_ids.contains(&row.chunk_id)))
                    };
                    idx += 1;
                    keep
                });
            }
            inner.rebuild_file_index();
        }
        self.save()
    }

    /// Remove all rows for the listed paths.
    pub fn delete_files(&self, paths: &[String]) -> StoreResult<()> {
        {
            let mut inner = self.inner.write();
            let doomed: HashSet<&String> = paths.iter().collect();
            inner.rows.retain(|row| !doomed.contains(&row.relative_path));
            inner.rebuild_file_index();
        }
        self.save()
    }

    /// Nearest neighbors by cosine similarity.
    ///
    /// Ties are broken by lexicographic chunk id so results are
    /// deterministic for a given snapshot.
    pub fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&dyn Fn(&ChunkRecord) -> bool>,
    ) -> Vec<VectorHit> {
        let mut query = query_vector.to_vec();
        normalize(&mut query);

        let inner = self.inner.read();
        let mut hits: Vec<VectorHit> = inner
            .rows
            .iter()
            .filter(|row| filter.map_or(true, |f| f(row)))
            .map(|row| VectorHit {
                score: dot(&query, &row.vector),
                record: row.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.chunk_id.cmp(&b.record.chunk_id))
        });
        hits.truncate(limit);
        hits
    }

    /// All chunks of one file, ordered by chunk index.
    pub fn chunks_for_file(&self, relative_path: &str) -> Vec<ChunkRecord> {
        let inner = self.inner.read();
        inner
            .by_file
            .get(relative_path)
            .map(|indexes| indexes.iter().map(|&i| inner.rows[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, chunk_id: &str) -> Option<ChunkRecord> {
        let inner = self.inner.read();
        inner.rows.iter().find(|r| r.chunk_id == chunk_id).cloned()
    }

    /// Paths currently present in the store.
    pub fn paths(&self) -> Vec<String> {
        self.inner.read().by_file.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// Drop every row and persist the empty state.
    pub fn clear(&self) -> StoreResult<()> {
        {
            let mut inner = self.inner.write();
            inner.rows.clear();
            inner.by_file.clear();
        }
        self.save()
    }

    fn load(&self) -> StoreResult<()> {
        let file = File::open(self.vectors_path()).map_err(|e| StoreError::Io {
            path: self.vectors_path(),
            source: e,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::Io {
            path: self.vectors_path(),
            source: e,
        })?;

        if mmap.len() < HEADER_SIZE || &mmap[0..4] != MAGIC_BYTES {
            return Err(StoreError::Corrupted {
                reason: "vector file missing header magic".to_string(),
            });
        }
        let version = u32::from_le_bytes(mmap[4..8].try_into().unwrap());
        if version != STORAGE_VERSION {
            return Err(StoreError::Corrupted {
                reason: format!("unsupported vector storage version {version}"),
            });
        }
        let stored_dim = u32::from_le_bytes(mmap[8..12].try_into().unwrap()) as usize;
        if stored_dim != self.dimension {
            return Err(StoreError::DimensionChanged {
                stored: stored_dim,
                configured: self.dimension,
            });
        }
        let count = u32::from_le_bytes(mmap[12..16].try_into().unwrap()) as usize;
        let expected = HEADER_SIZE + count * stored_dim * 4;
        if mmap.len() < expected {
            return Err(StoreError::Corrupted {
                reason: format!(
                    "vector file truncated: {} bytes, expected {expected}",
                    mmap.len()
                ),
            });
        }

        let json = fs::read_to_string(self.rows_path()).map_err(|e| StoreError::Io {
            path: self.rows_path(),
            source: e,
        })?;
        let mut rows: Vec<ChunkRecord> =
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupted {
                reason: format!("row metadata unreadable: {e}"),
            })?;
        if rows.len() != count {
            return Err(StoreError::Corrupted {
                reason: format!(
                    "row metadata lists {} rows, vector file has {count}",
                    rows.len()
                ),
            });
        }

        for (i, row) in rows.iter_mut().enumerate() {
            let start = HEADER_SIZE + i * stored_dim * 4;
            let mut vector = Vec::with_capacity(stored_dim);
            for d in 0..stored_dim {
                let off = start + d * 4;
                vector.push(f32::from_le_bytes(mmap[off..off + 4].try_into().unwrap()));
            }
            row.vector = vector;
        }

        let mut inner = self.inner.write();
        inner.rows = rows;
        inner.rebuild_file_index();
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        let inner = self.inner.read();

        let mut bin =
            Vec::with_capacity(HEADER_SIZE + inner.rows.len() * self.dimension * 4);
        bin.extend_from_slice(MAGIC_BYTES);
        bin.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        bin.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bin.extend_from_slice(&(inner.rows.len() as u32).to_le_bytes());
        for row in &inner.rows {
            for v in &row.vector {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        }

        let json =
            serde_json::to_string(&inner.rows).map_err(|e| StoreError::Serialization {
                reason: e.to_string(),
            })?;
        drop(inner);

        let bin_tmp = self.vectors_path().with_extension("bin.tmp");
        fs::write(&bin_tmp, &bin).map_err(|e| StoreError::Io {
            path: bin_tmp.clone(),
            source: e,
        })?;
        let json_tmp = self.rows_path().with_extension("json.tmp");
        fs::write(&json_tmp, &json).map_err(|e| StoreError::Io {
            path: json_tmp.clone(),
            source: e,
        })?;
        // Rows first: a reader pairing new rows with old vectors fails the
        // count check and retries, whereas orphaned vectors parse silently.
        fs::rename(&json_tmp, self.rows_path()).map_err(|e| StoreError::Io {
            path: self.rows_path(),
            source: e,
        })?;
        fs::rename(&bin_tmp, self.vectors_path()).map_err(|e| StoreError::Io {
            path: self.vectors_path(),
            source: e,
        })?;
        Ok(())
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
