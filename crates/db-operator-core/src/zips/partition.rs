use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::config::ZipSpec;
use crate::error::{Error, Result};
use crate::storage::builder::{with_sigil, without_sigil};
use crate::storage::models::{BundleMode, Database, SummaryContent, ZipBundle};

/// A child folder of a `subfolders` source gets its own bundle only with at
/// least this many files under it.
pub const SUBFOLDER_MIN_FILES: usize = 60;

const KIND_EXTRACT_ALL_CONTENTS: &str = "extract_all_contents";

/// Moves database entries into zip bundles. An entry moved by one bundle is
/// gone from the top-level maps and can't be matched again.
pub struct ZipsBuilder<'a> {
    db: &'a mut Database,
    zips: BTreeMap<String, ZipBundle>,
}

/// `path` is `source` itself or lies below it.
fn is_under(path: &str, source: &str) -> bool {
    match path.strip_prefix(source) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn description(unpacking: &str, at: &str) -> String {
    if at == "./" || at == "." {
        format!("Unpacking {} at the root", unpacking)
    } else {
        format!("Unpacking {} at {}", unpacking, at)
    }
}

impl<'a> ZipsBuilder<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self {
            db,
            zips: BTreeMap::new(),
        }
    }

    pub fn add_zip(&mut self, zip_id: &str, spec: &ZipSpec) -> Result<()> {
        match spec {
            ZipSpec::Simple { source } => self.simple_process(zip_id, source),
            ZipSpec::Multi { sources, path } => self.multi_process(zip_id, sources, path),
            ZipSpec::Subfolders { source } => self.subfolders_process(zip_id, source),
        }
    }

    pub fn build(self) -> BTreeMap<String, ZipBundle> {
        self.zips
    }

    fn simple_process(&mut self, zip_id: &str, configured_source: &str) -> Result<()> {
        let source = with_sigil(configured_source.trim_end_matches('/'));
        let mut content = SummaryContent::default();
        self.move_elements(zip_id, &source, &mut content);

        // Ancestors are copied, not moved, so the summary describes its own tree.
        let mut ancestor = source.as_str();
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            ancestor = parent;
            if ancestor.is_empty() || ancestor == "." {
                break;
            }
            match self.db.folders.get(ancestor) {
                Some(folder) => {
                    let mut folder = folder.clone();
                    folder.zip_id = Some(zip_id.to_string());
                    content.folders.insert(ancestor.to_string(), folder);
                }
                None => debug!("Ancestor folder {} of zip {} is not in the database", ancestor, zip_id),
            }
        }

        let (parent, name) = match source.rsplit_once('/') {
            Some((parent, name)) => (format!("{}/", parent), name.to_string()),
            None => ("./".to_string(), source.clone()),
        };

        let bundle = self.new_bundle(
            vec![name.clone()],
            description(&name, without_sigil(&parent)),
            &parent,
            content,
        );
        self.insert(
            zip_id,
            ZipBundle {
                source: Some(configured_source.to_string()),
                ..bundle
            },
        )
    }

    fn multi_process(&mut self, zip_id: &str, sources: &[String], path: &str) -> Result<()> {
        let mut content = SummaryContent::default();
        for source in sources {
            let source = with_sigil(source.trim_end_matches('/'));
            self.move_elements(zip_id, &source, &mut content);
        }

        let bundle = self.new_bundle(
            sources.to_vec(),
            description(&sources.join(", "), without_sigil(path)),
            &format!("{}/", path),
            content,
        );
        self.insert(
            zip_id,
            ZipBundle {
                mode: Some(BundleMode::Multi),
                ..bundle
            },
        )
    }

    fn subfolders_process(&mut self, zip_id: &str, configured_source: &str) -> Result<()> {
        let source = with_sigil(configured_source.trim_end_matches('/'));
        let depth = source.split('/').count();

        let subfolders: BTreeSet<String> = self
            .db
            .files
            .keys()
            .chain(self.db.folders.keys())
            .filter(|element| is_under(element, &source))
            .filter_map(|element| element.split('/').nth(depth))
            .map(str::to_string)
            .collect();

        let mut ordered: Vec<String> = subfolders.into_iter().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()));

        for folder in ordered {
            let composed_source = format!("{}/{}", source, folder);
            if !self.enough_files_for_subfolder(&composed_source) {
                debug!("Leaving {} unbundled, fewer than {} files", composed_source, SUBFOLDER_MIN_FILES);
                continue;
            }
            let composed_zip_id = format!("{}{}", zip_id, folder.to_lowercase());
            self.simple_process(&composed_zip_id, &composed_source)?;
        }
        Ok(())
    }

    fn enough_files_for_subfolder(&self, composed_source: &str) -> bool {
        self.db
            .files
            .keys()
            .filter(|file| is_under(file, composed_source))
            .take(SUBFOLDER_MIN_FILES)
            .count()
            >= SUBFOLDER_MIN_FILES
    }

    fn move_elements(&mut self, zip_id: &str, source: &str, content: &mut SummaryContent) {
        let files: Vec<String> = self
            .db
            .files
            .keys()
            .filter(|file| is_under(file, source))
            .cloned()
            .collect();
        for key in files {
            if let Some(mut record) = self.db.files.remove(&key) {
                record.zip_id = Some(zip_id.to_string());
                content.files.insert(key, record);
            }
        }

        let folders: Vec<String> = self
            .db
            .folders
            .keys()
            .filter(|folder| is_under(folder, source))
            .cloned()
            .collect();
        for key in folders {
            if let Some(mut record) = self.db.folders.remove(&key) {
                record.zip_id = Some(zip_id.to_string());
                content.folders.insert(key, record);
            }
        }
    }

    fn new_bundle(
        &self,
        contents: Vec<String>,
        description: String,
        parent: &str,
        content: SummaryContent,
    ) -> ZipBundle {
        let path = with_sigil(parent);
        let raw_files_size = content.files.values().map(|file| file.size).sum();
        ZipBundle {
            base_files_url: self.db.base_files_url.clone().unwrap_or_default(),
            contents,
            description,
            kind: KIND_EXTRACT_ALL_CONTENTS.to_string(),
            target_folder_path: path.clone(),
            path,
            raw_files_size,
            mode: None,
            source: None,
            summary_file_content: Some(content),
            summary_file: None,
            contents_file: None,
        }
    }

    fn insert(&mut self, zip_id: &str, bundle: ZipBundle) -> Result<()> {
        if self.zips.contains_key(zip_id) {
            return Err(Error::InvalidConfig(format!("Zip id \"{}\" is produced twice", zip_id)));
        }
        info!(
            "Zip {}: {} ({} files, {} bytes)",
            zip_id,
            bundle.description,
            bundle.summary_file_content.as_ref().map_or(0, |c| c.files.len()),
            bundle.raw_files_size
        );
        self.zips.insert(zip_id.to_string(), bundle);
        Ok(())
    }
}
