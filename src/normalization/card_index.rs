use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// One entry of a card catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDescriptor {
    pub name: String,
    pub icon_url: String,
    #[serde(default)]
    pub has_evolution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution_icon_url: Option<String>,
}

/// Dense `name -> index` mapping. The index of a card is its insertion position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardIndex {
    names: IndexSet<String>,
}

impl CardIndex {
    /// Build from a catalog snapshot, numbering cards by first appearance.
    pub fn build(cards: &[CardDescriptor]) -> Result<Self> {
        if cards.is_empty() {
            return Err(HarvestError::config("card catalog is empty"));
        }
        let names = cards.iter().map(|c| c.name.clone()).collect();
        Ok(Self { names })
    }

    /// Keep every previously saved name at its saved index and append catalog
    /// cards that were not known yet, in catalog order.
    ///
    /// An empty `saved` list is the same as [`CardIndex::build`].
    pub fn reconcile(saved: &[String], cards: &[CardDescriptor]) -> Result<Self> {
        if cards.is_empty() {
            return Err(HarvestError::config("card catalog is empty"));
        }
        let mut names: IndexSet<String> = saved.iter().cloned().collect();
        for card in cards {
            names.insert(card.name.clone());
        }
        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.names.get_index_of(name).map(|i| i as u32)
    }

    pub fn name_of(&self, index: u32) -> Option<&str> {
        self.names.get_index(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in index order; this is the persisted form of the mapping.
    pub fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}
