use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{HarvestError, Result};
use crate::normalization::CardDescriptor;
use crate::providers::CardCatalogProvider;

/// Card catalog snapshot stored on disk as a JSON array of descriptors.
#[derive(Debug, Clone)]
pub struct FileCardCatalog {
    path: PathBuf,
}

impl FileCardCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write a snapshot that [`FileCardCatalog`] can read back.
    pub async fn save(path: &Path, cards: &[CardDescriptor]) -> Result<()> {
        let json = serde_json::to_vec_pretty(cards)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| HarvestError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl CardCatalogProvider for FileCardCatalog {
    async fn fetch_cards(&self) -> Result<Vec<CardDescriptor>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            HarvestError::config(format!(
                "cannot read card catalog {}: {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            HarvestError::config(format!(
                "card catalog {} is not valid JSON: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_snapshot_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.json");
        let cards = vec![
            CardDescriptor {
                name: "Knight".into(),
                icon_url: "k.png".into(),
                has_evolution: true,
                evolution_icon_url: Some("k-evo.png".into()),
            },
            CardDescriptor {
                name: "Archers".into(),
                icon_url: "a.png".into(),
                has_evolution: false,
                evolution_icon_url: None,
            },
        ];
        FileCardCatalog::save(&path, &cards).await.unwrap();
        let loaded = FileCardCatalog::new(&path).fetch_cards().await.unwrap();
        assert_eq!(loaded, cards);
    }

    #[tokio::test]
    async fn missing_or_invalid_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileCardCatalog::new(dir.path().join("nope.json"));
        assert!(matches!(
            missing.fetch_cards().await,
            Err(HarvestError::Configuration(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{not json").unwrap();
        assert!(matches!(
            FileCardCatalog::new(&bad).fetch_cards().await,
            Err(HarvestError::Configuration(_))
        ));
    }
}
