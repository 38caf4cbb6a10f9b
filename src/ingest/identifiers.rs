use std::path::Path;

use indexmap::IndexSet;

use crate::error::{HarvestError, Result};

/// Parse a newline-delimited identifier list. Blank lines are skipped and
/// duplicates collapse onto their first occurrence.
pub fn parse_identifiers(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

pub async fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        HarvestError::config(format!("cannot read identifiers from {}: {e}", path.display()))
    })?;
    Ok(parse_identifiers(&text))
}

pub async fn write_identifiers(path: &Path, identifiers: &[String]) -> Result<()> {
    let mut body = identifiers.join("\n");
    body.push('\n');
    tokio::fs::write(path, body)
        .await
        .map_err(|source| HarvestError::Io {
            path: path.display().to_string(),
            source,
        })
}
