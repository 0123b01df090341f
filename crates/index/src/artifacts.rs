//! On-disk artifact triple: vectors, id mapping, content hashes.
//!
//! Layout under the index directory:
//! - `vectors.bin` — magic, dim, count header; then `count × dim` unit
//!   vectors as row-major little-endian f32.
//! - `idmap.bin` — magic, count header; then `count` little-endian i64
//!   permit ids, positionally aligned with the vector rows.
//! - `hashes.json` — `{permit_id_str: md5_hex}` of the indexed text.
//!
//! Writes go to temporary siblings and are renamed into place on success,
//! so a failed write leaves the pre-existing artifacts authoritative and a
//! loading reader never observes a half-written file.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::IndexError;

const VECTORS_FILE: &str = "vectors.bin";
const IDMAP_FILE: &str = "idmap.bin";
const HASHES_FILE: &str = "hashes.json";

const VECTORS_MAGIC: &[u8; 4] = b"PFV1";
const IDMAP_MAGIC: &[u8; 4] = b"PFM1";

/// In-memory image of the artifact triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Artifacts {
    pub dim: usize,
    /// Row → permit id, dense and injective.
    pub ids: Vec<i64>,
    /// Row-major flat vector data, `ids.len() * dim` entries.
    pub vectors: Vec<f32>,
    /// Permit id (as string key) → md5 hex of the indexed text.
    pub hashes: BTreeMap<String, String>,
}

impl Artifacts {
    pub fn present(dir: &Path) -> bool {
        dir.join(VECTORS_FILE).exists()
            && dir.join(IDMAP_FILE).exists()
            && dir.join(HASHES_FILE).exists()
    }

    /// Load and cross-check the triple.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        if !Self::present(dir) {
            return Err(IndexError::Missing(dir.to_path_buf()));
        }

        let (dim, vectors) = read_vectors(&dir.join(VECTORS_FILE))?;
        let ids = read_idmap(&dir.join(IDMAP_FILE))?;
        let hashes: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(dir.join(HASHES_FILE))?)?;

        let artifacts = Self {
            dim,
            ids,
            vectors,
            hashes,
        };
        artifacts.check_consistency()?;
        debug!(vectors = artifacts.ids.len(), dim, "loaded index artifacts");
        Ok(artifacts)
    }

    /// Atomically replace the triple on disk.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        self.check_consistency()?;
        fs::create_dir_all(dir)?;

        let staged = [
            (dir.join(VECTORS_FILE), encode_vectors(self.dim, &self.vectors)),
            (dir.join(IDMAP_FILE), encode_idmap(&self.ids)),
            (dir.join(HASHES_FILE), serde_json::to_vec(&self.hashes)?),
        ];

        let mut temps: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(staged.len());
        for (target, bytes) in &staged {
            let tmp = target.with_extension("tmp");
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            temps.push((tmp, target.clone()));
        }
        for (tmp, target) in temps {
            fs::rename(tmp, target)?;
        }
        debug!(vectors = self.ids.len(), dim = self.dim, "saved index artifacts");
        Ok(())
    }

    fn check_consistency(&self) -> Result<(), IndexError> {
        let count = self.ids.len();
        if self.vectors.len() != count * self.dim {
            return Err(IndexError::Inconsistent(format!(
                "vector data holds {} floats, expected {} rows x {} dim",
                self.vectors.len(),
                count,
                self.dim
            )));
        }
        if self.hashes.len() != count {
            return Err(IndexError::Inconsistent(format!(
                "hash file holds {} entries, mapping holds {}",
                self.hashes.len(),
                count
            )));
        }
        let unique: HashSet<i64> = self.ids.iter().copied().collect();
        if unique.len() != count {
            return Err(IndexError::Inconsistent(
                "mapping contains duplicate permit ids".into(),
            ));
        }
        Ok(())
    }
}

fn encode_vectors(dim: usize, vectors: &[f32]) -> Vec<u8> {
    let count = if dim == 0 { 0 } else { vectors.len() / dim };
    let mut bytes = Vec::with_capacity(16 + vectors.len() * 4);
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&(dim as u32).to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn read_vectors(path: &Path) -> Result<(usize, Vec<f32>), IndexError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 16 || &bytes[..4] != VECTORS_MAGIC {
        return Err(IndexError::Inconsistent(format!(
            "{} has no vector header",
            path.display()
        )));
    }
    let dim = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let count = u64::from_le_bytes([
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    ]) as usize;
    let body = &bytes[16..];
    if body.len() != count * dim * 4 {
        return Err(IndexError::Inconsistent(format!(
            "{} body is {} bytes, header promises {} rows x {} dim",
            path.display(),
            body.len(),
            count,
            dim
        )));
    }
    let mut vectors = Vec::with_capacity(count * dim);
    for chunk in body.chunks_exact(4) {
        vectors.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok((dim, vectors))
}

fn encode_idmap(ids: &[i64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12 + ids.len() * 8);
    bytes.extend_from_slice(IDMAP_MAGIC);
    bytes.extend_from_slice(&(ids.len() as u64).to_le_bytes());
    for id in ids {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes
}

fn read_idmap(path: &Path) -> Result<Vec<i64>, IndexError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 12 || &bytes[..4] != IDMAP_MAGIC {
        return Err(IndexError::Inconsistent(format!(
            "{} has no id-map header",
            path.display()
        )));
    }
    let count = u64::from_le_bytes([
        bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11],
    ]) as usize;
    let body = &bytes[12..];
    if body.len() != count * 8 {
        return Err(IndexError::Inconsistent(format!(
            "{} body is {} bytes, header promises {} ids",
            path.display(),
            body.len(),
            count
        )));
    }
    let mut ids = Vec::with_capacity(count);
    for chunk in body.chunks_exact(8) {
        ids.push(i64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artifacts {
        let mut hashes = BTreeMap::new();
        hashes.insert("7".to_string(), "aa".to_string());
        hashes.insert("9".to_string(), "bb".to_string());
        Artifacts {
            dim: 2,
            ids: vec![7, 9],
            vectors: vec![1.0, 0.0, 0.0, 1.0],
            hashes,
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = sample();
        artifacts.save(dir.path()).unwrap();

        let loaded = Artifacts::load(dir.path()).unwrap();
        assert_eq!(loaded, artifacts);
    }

    #[test]
    fn missing_triple_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        match Artifacts::load(dir.path()) {
            Err(IndexError::Missing(_)) => {}
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn partial_triple_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(HASHES_FILE)).unwrap();

        assert!(matches!(
            Artifacts::load(dir.path()),
            Err(IndexError::Missing(_))
        ));
    }

    #[test]
    fn truncated_idmap_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path()).unwrap();

        let path = dir.path().join(IDMAP_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        assert!(matches!(
            Artifacts::load(dir.path()),
            Err(IndexError::Inconsistent(_))
        ));
    }

    #[test]
    fn hash_count_mismatch_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = sample();
        artifacts.save(dir.path()).unwrap();

        artifacts.hashes.remove("9");
        assert!(matches!(
            artifacts.save(dir.path()),
            Err(IndexError::Inconsistent(_))
        ));
        // The failed save must not have touched the on-disk triple.
        let loaded = Artifacts::load(dir.path()).unwrap();
        assert_eq!(loaded.ids, vec![7, 9]);
    }

    #[test]
    fn no_temp_files_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        sample().save(dir.path()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn empty_index_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts {
            dim: 4,
            ..Default::default()
        };
        artifacts.save(dir.path()).unwrap();
        let loaded = Artifacts::load(dir.path()).unwrap();
        assert_eq!(loaded.dim, 4);
        assert!(loaded.ids.is_empty());
    }
}
