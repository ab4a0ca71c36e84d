use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Folders that never belong to a distribution tree.
const DEFAULT_IGNORED_FOLDERS: &[&str] = &[".git", ".github"];

/// Enumerates the files of a source tree as `/`-separated paths relative to
/// the root, sorted case-insensitively so tag ids come out the same on every run.
pub struct Finder {
    root: PathBuf,
    ignored: Vec<Pattern>,
}

impl Finder {
    pub fn new(root: &Path) -> Result<Self> {
        let mut finder = Self {
            root: root.to_path_buf(),
            ignored: Vec::new(),
        };
        for folder in DEFAULT_IGNORED_FOLDERS {
            finder.ignore_folder(folder)?;
        }
        Ok(finder)
    }

    /// Skips every folder whose relative path matches the glob.
    pub fn ignore_folder(&mut self, glob: &str) -> Result<()> {
        let pattern = Pattern::new(glob.trim_start_matches("./"))
            .map_err(|e| Error::InvalidConfig(format!("Invalid glob pattern '{}': {}", glob, e)))?;
        info!("Ignored folder: {}", pattern.as_str());
        self.ignored.push(pattern);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn find_all(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir() && self.is_ignored(entry.path()))
            });

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Some(relative) = self.relative(entry.path()) {
                files.push(relative);
            }
        }

        files.sort_by_key(|file| file.to_lowercase());
        debug!("Found {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        match self.relative(path) {
            Some(relative) => self.ignored.iter().any(|pattern| pattern.matches(&relative)),
            None => false,
        }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}
