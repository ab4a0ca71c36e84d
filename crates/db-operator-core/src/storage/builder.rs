use std::collections::BTreeMap;
use tracing::debug;

use super::models::{Database, FileRecord, FolderRecord};
use crate::error::{Error, Result};
use crate::hasher::FileDigest;
use crate::tags::TagEngine;

/// Marks paths under `games/` and `docs/` so they never collide with the
/// top-level folders of the same name on the device.
pub const SIGIL: char = '|';

const IGNORED_FILE_NAMES: &[&str] = &[".delme", ".DS_Store"];
const IGNORED_ROOT_FILES: &[&str] = &["README.md", "LICENSE", "latest_linux.txt", ".gitattributes"];
const MAIN_BINARIES: &[&str] = &["MiSTer", "menu.rbf"];
const BOOT_ROMS: &[&str] = &["boot.rom", "boot0.rom", "boot1.rom"];
const BOOT_ROM_EXCEPTION: &str = "|games/AO486/";
const SYSTEM_PATH: &str = "system";
const SYSTEM_FOLDER: &str = "linux/";

/// Prefixes the sigil when the first segment is `games` or `docs`. Idempotent.
pub fn with_sigil(path: &str) -> String {
    if path.starts_with(SIGIL) {
        return path.to_string();
    }
    let first = path.split('/').next().unwrap_or_default();
    if first == "games" || first == "docs" {
        format!("{}{}", SIGIL, path)
    } else {
        path.to_string()
    }
}

pub fn without_sigil(path: &str) -> &str {
    path.strip_prefix(SIGIL).unwrap_or(path)
}

/// Repository housekeeping that is never published.
pub fn is_housekeeping(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    IGNORED_FILE_NAMES.contains(&name) || IGNORED_ROOT_FILES.contains(&path)
}

/// Builds the file and folder maps. Every file goes through
/// [`DatabaseBuilder::add_file`] before the first call to
/// [`DatabaseBuilder::add_parent_folders`].
pub struct DatabaseBuilder<'a> {
    files: BTreeMap<String, FileRecord>,
    folders: BTreeMap<String, FolderRecord>,
    tags: &'a mut TagEngine,
    folders_started: bool,
}

impl<'a> DatabaseBuilder<'a> {
    pub fn new(tags: &'a mut TagEngine) -> Self {
        Self {
            files: BTreeMap::new(),
            folders: BTreeMap::new(),
            tags,
            folders_started: false,
        }
    }

    pub fn add_file(&mut self, path: &str, digest: FileDigest) -> Result<()> {
        if self.folders_started {
            return Err(Error::Other(format!(
                "File {} added after folder tagging started",
                path
            )));
        }
        if is_housekeeping(path) {
            debug!("Skipping housekeeping file {}", path);
            return Ok(());
        }

        let key = with_sigil(path);
        let name = path.rsplit('/').next().unwrap_or(path);
        let is_main_binary = MAIN_BINARIES.contains(&key.as_str());

        let mut record = FileRecord {
            hash: digest.hash,
            size: digest.size,
            tags: self.tags.tags_for_file(path)?,
            overwrite: None,
            path: None,
            reboot: None,
            zip_id: None,
        };

        if BOOT_ROMS.contains(&name.to_lowercase().as_str()) && !key.starts_with(BOOT_ROM_EXCEPTION) {
            record.overwrite = Some(false);
        }
        if is_main_binary || key.starts_with(SYSTEM_FOLDER) {
            record.path = Some(SYSTEM_PATH.to_string());
        }
        if is_main_binary {
            record.reboot = Some(true);
        }

        self.files.insert(key, record);
        Ok(())
    }

    /// Adds every ancestor folder of `path`, nearest first, once per distinct folder.
    pub fn add_parent_folders(&mut self, path: &str) -> Result<()> {
        self.folders_started = true;

        let mut ancestor = path;
        while let Some((parent, _)) = ancestor.rsplit_once('/') {
            ancestor = parent;
            if ancestor.is_empty() || ancestor == "." {
                break;
            }
            let key = with_sigil(ancestor);
            if self.folders.contains_key(&key) {
                continue;
            }
            let tags = self.tags.tags_for_folder(ancestor)?;
            self.folders.insert(key, FolderRecord { tags, zip_id: None });
        }
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn build(self, db_id: &str) -> Result<Database> {
        if db_id.is_empty() {
            return Err(Error::MissingVariable("DB_ID"));
        }
        Ok(Database {
            db_id: db_id.to_string(),
            files: self.files,
            folders: self.folders,
            tag_dictionary: self.tags.dictionary(),
            timestamp: chrono::Utc::now().timestamp(),
            base_files_url: None,
            db_url: None,
            linux: None,
            zips: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{Metadata, DEFAULT_ALIASES};
    use tempfile::tempdir;

    fn digest(size: u64) -> FileDigest {
        FileDigest {
            size,
            hash: format!("{:032x}", size),
        }
    }

    #[test]
    fn test_with_sigil() {
        assert_eq!(with_sigil("games/NES/boot.rom"), "|games/NES/boot.rom");
        assert_eq!(with_sigil("docs"), "|docs");
        assert_eq!(with_sigil("|docs/x"), "|docs/x");
        assert_eq!(with_sigil("gamesfoo/x"), "gamesfoo/x");
        assert_eq!(with_sigil("_Console/x"), "_Console/x");
        assert_eq!(without_sigil("|games"), "games");
    }

    #[test]
    fn test_housekeeping() {
        assert!(is_housekeeping("README.md"));
        assert!(is_housekeeping("games/NES/.DS_Store"));
        assert!(!is_housekeeping("docs/README.md"));
    }

    #[test]
    fn test_overrides() {
        let tmp = tempdir().unwrap();
        let mut tags = TagEngine::new(tmp.path(), Metadata::default());
        tags.init_aliases(DEFAULT_ALIASES).unwrap();
        let mut builder = DatabaseBuilder::new(&mut tags);

        for (path, size) in [
            ("MiSTer", 1),
            ("menu.rbf", 2),
            ("linux/zImage_dtb", 3),
            ("games/NES/boot.rom", 4),
            ("games/AO486/boot0.rom", 5),
            ("README.md", 6),
        ] {
            builder.add_file(path, digest(size)).unwrap();
        }
        let db = builder.build("test_db").unwrap();

        assert_eq!(db.files.len(), 5);
        let mister = &db.files["MiSTer"];
        assert_eq!(mister.path.as_deref(), Some("system"));
        assert_eq!(mister.reboot, Some(true));
        assert_eq!(db.files["menu.rbf"].reboot, Some(true));

        let linux = &db.files["linux/zImage_dtb"];
        assert_eq!(linux.path.as_deref(), Some("system"));
        assert_eq!(linux.reboot, None);

        assert_eq!(db.files["|games/NES/boot.rom"].overwrite, Some(false));
        assert_eq!(db.files["|games/AO486/boot0.rom"].overwrite, None);
    }

    #[test]
    fn test_parent_folders_once_each() {
        let tmp = tempdir().unwrap();
        let mut tags = TagEngine::new(tmp.path(), Metadata::default());
        tags.init_aliases(DEFAULT_ALIASES).unwrap();
        let mut builder = DatabaseBuilder::new(&mut tags);

        let files = ["games/NES/Palettes/a.pal", "games/NES/Palettes/b.pal", "_Console/NES.rbf"];
        for file in files {
            builder.add_file(file, digest(1)).unwrap();
        }
        for file in files {
            builder.add_parent_folders(file).unwrap();
        }
        assert_eq!(builder.folder_count(), 4);

        let db = builder.build("test_db").unwrap();
        let keys: Vec<&str> = db.folders.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_Console", "|games", "|games/NES", "|games/NES/Palettes"]);
    }

    #[test]
    fn test_file_after_folders_is_rejected() {
        let tmp = tempdir().unwrap();
        let mut tags = TagEngine::new(tmp.path(), Metadata::default());
        let mut builder = DatabaseBuilder::new(&mut tags);
        builder.add_parent_folders("_Console/NES.rbf").unwrap();
        assert!(builder.add_file("_Console/SNES.rbf", digest(1)).is_err());
    }

    #[test]
    fn test_build_requires_db_id() {
        let tmp = tempdir().unwrap();
        let mut tags = TagEngine::new(tmp.path(), Metadata::default());
        let builder = DatabaseBuilder::new(&mut tags);
        assert!(matches!(builder.build(""), Err(Error::MissingVariable("DB_ID"))));
    }
}
