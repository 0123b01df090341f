//! Permitflow Index
//!
//! Persistent semantic index over permit descriptions, and nothing but
//! descriptions: the indexed text is derived from the one field that
//! carries the semantic signal, keeping search descriptor-centric.
//!
//! ## Responsibilities
//!
//! - **Full build**: stream the permit catalog once, embed every row's
//!   indexed text, and atomically replace the on-disk artifact triple
//!   (vectors, id mapping, content hashes).
//! - **Incremental refresh**: append vectors for permits whose content
//!   hash is not yet present. Existing rows are never reordered.
//! - **Load / status**: bring artifacts into memory (with a consistency
//!   cross-check) and report what is loaded.
//! - **Snapshots**: readers rank against an immutable [`IndexSnapshot`]
//!   behind an `Arc`; an in-progress rebuild never disturbs them.
//!
//! Builds are mutually exclusive via an internal lock. A failed write
//! leaves the previous artifacts authoritative (see [`artifacts`] for the
//! temp-sibling + rename discipline).

mod artifacts;
mod error;
mod snapshot;

pub use crate::error::IndexError;
pub use crate::snapshot::IndexSnapshot;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use embedding::Embedder;
use serde::{Deserialize, Serialize};
use store::PermitStore;
use tracing::{info, warn};

use crate::artifacts::Artifacts;

/// Chunk size when streaming the catalog for a build.
const STREAM_CHUNK: usize = 2000;

/// Indexed text recipe. Description-only by design; other fields are
/// excluded so the vector space stays about the work being permitted.
pub fn index_text(description: &str) -> String {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        "no description available".to_string()
    } else {
        format!("project: {trimmed}")
    }
}

/// md5 hex of the indexed text, used to detect stale rows.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Outcome of a full build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReport {
    pub built: usize,
    pub dim: usize,
    pub took_ms: u64,
}

/// Outcome of an incremental refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncrementalReport {
    pub added: usize,
    pub took_ms: u64,
}

/// What is currently loaded in memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub loaded: bool,
    pub vectors: usize,
    pub dim: Option<usize>,
}

/// The index manager: owns the artifact directory and the loaded snapshot.
pub struct EmbeddingIndex {
    dir: PathBuf,
    store: PermitStore,
    embedder: Embedder,
    batch_size: usize,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
}

impl EmbeddingIndex {
    pub fn new<P: AsRef<Path>>(
        dir: P,
        store: PermitStore,
        embedder: Embedder,
        batch_size: usize,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            store,
            embedder,
            batch_size: batch_size.clamp(1, 256),
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Embed a free-text query with the index's embedder.
    pub fn embed_query(&self, text: &str) -> Vec<f32> {
        self.embedder.encode_one(text)
    }

    /// Whether the artifact triple exists on disk (says nothing about
    /// whether it is loaded or consistent).
    pub fn artifacts_present(&self) -> bool {
        Artifacts::present(&self.dir)
    }

    /// Current snapshot, if any is loaded.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        match self.snapshot.read() {
            Ok(slot) => slot.clone(),
            Err(_) => {
                warn!("index snapshot lock poisoned; treating index as unloaded");
                None
            }
        }
    }

    /// Full rebuild: stream the catalog, embed, atomically replace
    /// artifacts, reload.
    pub fn build(&self) -> Result<BuildReport, IndexError> {
        let _exclusive = self.build_lock.lock().map_err(|_| IndexError::Poisoned)?;
        let started = Instant::now();

        let mut ids: Vec<i64> = Vec::new();
        let mut vectors: Vec<f32> = Vec::new();
        let mut hashes: BTreeMap<String, String> = BTreeMap::new();

        for chunk in self.store.stream_chunks(STREAM_CHUNK) {
            let chunk = chunk?;
            let texts: Vec<String> =
                chunk.iter().map(|p| index_text(&p.description)).collect();
            for (permit, text) in chunk.iter().zip(&texts) {
                hashes.insert(permit.id.to_string(), content_hash(text));
                ids.push(permit.id);
            }
            for batch in texts.chunks(self.batch_size) {
                for vector in self.embedder.encode(batch) {
                    vectors.extend(vector);
                }
            }
        }

        let artifacts = Artifacts {
            dim: self.embedder.dim(),
            ids,
            vectors,
            hashes,
        };
        artifacts.save(&self.dir)?;
        let report = BuildReport {
            built: artifacts.ids.len(),
            dim: artifacts.dim,
            took_ms: started.elapsed().as_millis() as u64,
        };
        self.install(artifacts);

        info!(
            built = report.built,
            dim = report.dim,
            took_ms = report.took_ms,
            "full index build"
        );
        Ok(report)
    }

    /// Append vectors for the supplied permits whose content hash is not
    /// yet indexed. Requires existing artifacts.
    pub fn build_incremental(
        &self,
        permit_ids: &[i64],
    ) -> Result<IncrementalReport, IndexError> {
        let _exclusive = self.build_lock.lock().map_err(|_| IndexError::Poisoned)?;
        let started = Instant::now();

        let mut artifacts = Artifacts::load(&self.dir)?;

        let mut fresh: Vec<i64> = Vec::new();
        for id in permit_ids {
            if !artifacts.hashes.contains_key(&id.to_string()) && !fresh.contains(id) {
                fresh.push(*id);
            }
        }
        if fresh.is_empty() {
            self.install(artifacts);
            return Ok(IncrementalReport {
                added: 0,
                took_ms: started.elapsed().as_millis() as u64,
            });
        }

        let rows = self.store.fetch_by_ids(&fresh)?;
        for batch in rows.chunks(self.batch_size) {
            let texts: Vec<String> =
                batch.iter().map(|p| index_text(&p.description)).collect();
            for (permit, text) in batch.iter().zip(&texts) {
                artifacts
                    .hashes
                    .insert(permit.id.to_string(), content_hash(text));
                artifacts.ids.push(permit.id);
            }
            for vector in self.embedder.encode(&texts) {
                artifacts.vectors.extend(vector);
            }
        }

        artifacts.save(&self.dir)?;
        let report = IncrementalReport {
            added: rows.len(),
            took_ms: started.elapsed().as_millis() as u64,
        };
        self.install(artifacts);

        info!(added = report.added, took_ms = report.took_ms, "incremental index build");
        Ok(report)
    }

    /// Load artifacts from disk if present. Returns whether a consistent
    /// triple was loaded; corruption surfaces as
    /// [`IndexError::Inconsistent`] so the caller can force a rebuild.
    pub fn load(&self) -> Result<bool, IndexError> {
        match Artifacts::load(&self.dir) {
            Ok(artifacts) => {
                self.install(artifacts);
                Ok(true)
            }
            Err(IndexError::Missing(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn status(&self) -> IndexStatus {
        match self.snapshot() {
            Some(snap) => IndexStatus {
                loaded: true,
                vectors: snap.len(),
                dim: Some(snap.dim()),
            },
            None => IndexStatus {
                loaded: false,
                vectors: 0,
                dim: None,
            },
        }
    }

    fn install(&self, artifacts: Artifacts) {
        let snapshot = Arc::new(IndexSnapshot::new(
            artifacts.dim,
            artifacts.ids,
            artifacts.vectors,
        ));
        match self.snapshot.write() {
            Ok(mut slot) => *slot = Some(snapshot),
            Err(_) => warn!("index snapshot lock poisoned; skipping install"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::EmbeddingConfig;
    use ingest::NewPermit;
    use std::collections::HashSet;

    fn permit(number: &str, description: &str) -> NewPermit {
        NewPermit {
            city: "austin".into(),
            permit_number: number.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn manager(dir: &Path, store: &PermitStore) -> EmbeddingIndex {
        EmbeddingIndex::new(
            dir,
            store.clone(),
            Embedder::new(EmbeddingConfig { dim: 32, normalize: true }),
            256,
        )
    }

    #[test]
    fn index_text_recipe() {
        assert_eq!(index_text("re-roof house"), "project: re-roof house");
        assert_eq!(index_text(""), "no description available");
        assert_eq!(index_text("   "), "no description available");
    }

    #[test]
    fn full_build_covers_every_stored_permit() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        store
            .insert(&[
                permit("A-1", "roof replacement"),
                permit("A-2", "kitchen remodel"),
                permit("A-3", ""),
            ])
            .unwrap();

        let index = manager(dir.path(), &store);
        let report = index.build().unwrap();
        assert_eq!(report.built, 3);
        assert_eq!(report.dim, 32);

        let snap = index.snapshot().unwrap();
        let store_ids: HashSet<i64> = store
            .query_filtered(&store::PermitFilter::default(), 10)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        let index_ids: HashSet<i64> = snap.ids().iter().copied().collect();
        assert_eq!(index_ids, store_ids);
        assert_eq!(snap.ids().len(), index_ids.len(), "mapping is injective");
    }

    #[test]
    fn build_on_empty_store_produces_empty_loaded_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        let index = manager(dir.path(), &store);

        let report = index.build().unwrap();
        assert_eq!(report.built, 0);
        let status = index.status();
        assert!(status.loaded);
        assert_eq!(status.vectors, 0);
    }

    #[test]
    fn incremental_appends_without_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        store
            .insert(&[permit("A-1", "first"), permit("A-2", "second")])
            .unwrap();

        let index = manager(dir.path(), &store);
        index.build().unwrap();
        let before: Vec<i64> = index.snapshot().unwrap().ids().to_vec();

        store.insert(&[permit("A-3", "third")]).unwrap();
        let all_ids: Vec<i64> = (1..=store.max_id().unwrap()).collect();
        let report = index.build_incremental(&all_ids).unwrap();
        assert_eq!(report.added, 1);

        let after = index.snapshot().unwrap();
        assert_eq!(&after.ids()[..before.len()], &before[..]);
        assert_eq!(after.len(), 3);
    }

    #[test]
    fn incremental_is_a_noop_for_already_indexed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        store.insert(&[permit("A-1", "only")]).unwrap();

        let index = manager(dir.path(), &store);
        index.build().unwrap();
        let report = index.build_incremental(&[1, 1, 1]).unwrap();
        assert_eq!(report.added, 0);
    }

    #[test]
    fn incremental_without_artifacts_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        let index = manager(dir.path(), &store);

        assert!(matches!(
            index.build_incremental(&[1]),
            Err(IndexError::Missing(_))
        ));
    }

    #[test]
    fn load_roundtrips_through_a_new_manager() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        store.insert(&[permit("A-1", "roof")]).unwrap();

        let index = manager(dir.path(), &store);
        index.build().unwrap();

        // A fresh manager over the same directory sees the artifacts.
        let reloaded = manager(dir.path(), &store);
        assert!(!reloaded.status().loaded);
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.status().vectors, 1);

        // And load is idempotent.
        assert!(reloaded.load().unwrap());
    }

    #[test]
    fn load_is_false_when_nothing_was_built() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        let index = manager(dir.path(), &store);

        assert!(!index.load().unwrap());
        assert!(!index.artifacts_present());
        assert!(!index.status().loaded);
    }

    #[test]
    fn indexed_scores_follow_description_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = PermitStore::open_in_memory().unwrap();
        store
            .insert(&[
                permit("A-1", "complete roof replacement with shingles"),
                permit("A-2", "sewer line excavation"),
            ])
            .unwrap();

        let index = manager(dir.path(), &store);
        index.build().unwrap();
        let snap = index.snapshot().unwrap();
        let query = index.embed_query(&index_text("roof replacement"));

        let roofing = snap.score(1, &query).unwrap();
        let sewer = snap.score(2, &query).unwrap();
        assert!(roofing > sewer);
    }
}
