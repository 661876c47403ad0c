use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Class id to label mapping.
///
/// Accepts the common label file formats: `"<id> <label>"` per line, or one
/// label per line where the line number is the id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: HashMap<u32, String>,
}

impl LabelMap {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        let labels = Self::parse(&raw);
        if labels.is_empty() {
            bail!("label file {} has no labels", path.display());
        }
        log::debug!("loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    pub fn parse(raw: &str) -> Self {
        let mut labels = HashMap::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let head = parts.next().unwrap_or_default();
            let tail = parts.next().map(str::trim).unwrap_or_default();
            match head.parse::<u32>() {
                Ok(id) if !tail.is_empty() => {
                    labels.insert(id, tail.to_string());
                }
                _ => {
                    labels.insert(line_no as u32, line.to_string());
                }
            }
        }
        Self { labels }
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
