use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{HarvestError, Result};
use crate::normalization::{BattleRecord, CardIndex};

/// Identifier -> battles, keyed in sorted order so the serialized form is stable.
pub type ResultSet = BTreeMap<String, Vec<BattleRecord>>;

/// Durable JSON snapshot of a [`ResultSet`], plus the card mapping it was encoded with.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HarvestError + '_ {
    move |source| HarvestError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    path.with_file_name(format!("{stem}{suffix}"))
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<stem>.cards.json` next to the checkpoint.
    pub fn card_index_path(&self) -> PathBuf {
        sibling(&self.path, ".cards.json")
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint.json".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    /// Load the checkpoint. Missing or unreadable files yield an empty set.
    pub async fn load(&self) -> ResultSet {
        match self.try_load().await {
            Ok(results) => {
                info!(
                    path = %self.path.display(),
                    identifiers = results.len(),
                    "checkpoint loaded"
                );
                results
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring checkpoint; starting empty");
                ResultSet::new()
            }
        }
    }

    /// Strict variant of [`CheckpointStore::load`]; a missing file is still empty.
    pub async fn try_load(&self) -> Result<ResultSet> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ResultSet::new()),
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        serde_json::from_slice(&raw).map_err(|e| HarvestError::CheckpointCorruption {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn encode(results: &ResultSet) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(results)?)
    }

    /// Replace the checkpoint with `results`. Returns the number of bytes written.
    pub async fn persist(&self, results: &ResultSet) -> Result<usize> {
        let bytes = Self::encode(results)?;
        self.write_replace(&self.path, &bytes).await?;
        Ok(bytes.len())
    }

    /// Write to a sibling temp file, sync, then rename over `dest`.
    async fn write_replace(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }
        let tmp = if dest == self.path {
            self.temp_path()
        } else {
            sibling(dest, ".tmp")
        };
        let mut file = fs::File::create(&tmp).await.map_err(io_err(&tmp))?;
        file.write_all(bytes).await.map_err(io_err(&tmp))?;
        file.sync_all().await.map_err(io_err(&tmp))?;
        drop(file);
        fs::rename(&tmp, dest).await.map_err(io_err(dest))?;
        Ok(())
    }

    /// Card names in index order as saved by a previous run, if any.
    pub async fn load_card_names(&self) -> Option<Vec<String>> {
        let path = self.card_index_path();
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read saved card index");
                return None;
            }
        };
        match serde_json::from_slice::<Vec<String>>(&raw) {
            Ok(names) => Some(names),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "saved card index is corrupt; rebuilding");
                None
            }
        }
    }

    pub async fn persist_card_index(&self, index: &CardIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&index.names())?;
        self.write_replace(&self.card_index_path(), &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::battle::tests::{one_v_one, test_index};
    use crate::normalization::{normalize, DeckEncoding, Normalized};

    fn sample() -> ResultSet {
        let rec = match normalize(&one_v_one(3, 1), &test_index(), DeckEncoding::Indexed).unwrap() {
            Normalized::Record(r) => r,
            Normalized::Rejected(r) => panic!("{r}"),
        };
        let mut set = ResultSet::new();
        set.insert("P1".into(), vec![rec.clone(), rec]);
        set.insert("P0".into(), vec![]);
        set
    }

    #[tokio::test]
    async fn missing_checkpoint_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battles.json");
        std::fs::write(&path, b"{\"P1\": [{\"team_player\": ").unwrap();
        let store = CheckpointStore::new(&path);
        assert!(matches!(
            store.try_load().await,
            Err(HarvestError::CheckpointCorruption { .. })
        ));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn persisted_checkpoint_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested").join("battles.json"));
        let set = sample();
        store.persist(&set).await.unwrap();
        assert_eq!(store.load().await, set);
        // temp file was renamed away
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["battles.json".to_string()]);
    }

    #[tokio::test]
    async fn flushing_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        let set = sample();
        store.persist(&set).await.unwrap();
        let first = std::fs::read(store.path()).unwrap();
        store.persist(&set).await.unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn card_index_is_saved_beside_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        assert_eq!(store.card_index_path(), dir.path().join("battles.cards.json"));
        assert_eq!(store.load_card_names().await, None);

        let index = test_index();
        store.persist_card_index(&index).await.unwrap();
        assert_eq!(store.load_card_names().await, Some(index.names()));

        std::fs::write(store.card_index_path(), b"[1, 2").unwrap();
        assert_eq!(store.load_card_names().await, None);
    }
}
