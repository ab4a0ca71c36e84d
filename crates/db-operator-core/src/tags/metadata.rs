use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Per-home facts produced by the distribution download step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeEntry {
    #[serde(default)]
    pub mgl_dependency: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    home: BTreeMap<String, HomeEntry>,
    #[serde(default)]
    aliases: Vec<Vec<String>>,
}

impl Metadata {
    pub fn new(home: BTreeMap<String, HomeEntry>, aliases: Vec<Vec<String>>) -> Self {
        Self { home, aliases }
    }

    /// Missing or invalid metadata degrades to empty metadata with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        let parsed: Result<Self, String> = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("File \"{}\" is not valid JSON: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// The home's MGL dependency, when it is an MGL home.
    pub fn mgl_dependency(&self, home: &str) -> Option<&str> {
        self.home
            .get(home)
            .map(|entry| entry.mgl_dependency.as_str())
            .filter(|dependency| !dependency.is_empty())
    }

    pub fn category_by_home(&self, home: &str) -> Option<&str> {
        self.home
            .get(home)
            .map(|entry| entry.category.as_str())
            .filter(|category| !category.is_empty())
    }

    pub fn aliases(&self) -> &[Vec<String>] {
        &self.aliases
    }
}
