use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::BuildVars;
use crate::diff::diff_databases;
use crate::error::{Error, Result};
use crate::fetch::{load_database, Fetcher};
use crate::storage::models::Database;
use crate::storage::persist::{promote, save_database, save_zips};

/// Decides whether a freshly built database differs from the published one,
/// and writes it when it does.
pub struct DatabasePersistence<'a> {
    vars: &'a BuildVars,
    fetcher: &'a dyn Fetcher,
}

impl<'a> DatabasePersistence<'a> {
    pub fn new(vars: &'a BuildVars, fetcher: &'a dyn Fetcher) -> Self {
        Self { vars, fetcher }
    }

    /// Without a previous database to compare against, always save. A
    /// previous database that can't be reached counts as absent.
    pub fn needs_save(&self, db: &Database) -> Result<bool> {
        let Some(db_url) = self.vars.db_url() else {
            warn!("Missing \"DB_URL\", can not check previous db!");
            return Ok(true);
        };

        let previous = match load_database(db_url, self.fetcher) {
            Ok(previous) => previous,
            Err(e) if e.is_unreachable() => {
                warn!("Previous database at {} is unavailable: {}", db_url, e);
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        let current = serde_json::to_value(db)?;
        let report = diff_databases(previous, current)?;
        Ok(!report.equal)
    }

    /// Writes the zip artifacts and then the database file into `out_dir`.
    ///
    /// Everything is written to a staging directory inside `out_dir` first, so
    /// a failure part way leaves `out_dir` as it was.
    pub fn save(&self, db: &mut Database, source_dir: &Path, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".db-operator-staging")
            .tempdir_in(out_dir)?;

        let mut artifacts = Vec::new();
        if let Some(zips) = db.zips.as_mut() {
            let template = self
                .vars
                .base_files_url()
                .ok_or(Error::MissingVariable("BASE_FILES_URL"))?;
            artifacts = save_zips(zips, template, source_dir, staging.path())?;
        }

        let name = &self.vars.db_json_name;
        save_database(db, &staging.path().join(name), self.vars.is_debug_output())?;
        artifacts.push(name.clone());

        promote(staging.path(), out_dir, &artifacts)?;
        let target = out_dir.join(name);
        info!("Saved {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::{zipped, MapFetcher};
    use crate::storage::models::{FileRecord, SummaryContent, ZipBundle};
    use crate::tags::TagId;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn db() -> Database {
        let mut files = BTreeMap::new();
        files.insert(
            "_Console/NES.rbf".to_string(),
            FileRecord {
                hash: "h".to_string(),
                size: 1,
                tags: vec![TagId(0)],
                overwrite: None,
                path: None,
                reboot: None,
                zip_id: None,
            },
        );
        let mut tag_dictionary = BTreeMap::new();
        tag_dictionary.insert("console".to_string(), TagId(0));
        Database {
            db_id: "test".to_string(),
            files,
            folders: BTreeMap::new(),
            tag_dictionary,
            timestamp: 100,
            base_files_url: Some("https://host/new/".to_string()),
            db_url: Some("https://host/db.json.zip".to_string()),
            linux: None,
            zips: None,
        }
    }

    fn vars_with_url() -> BuildVars {
        BuildVars {
            db_id: "test".to_string(),
            db_url: "https://host/db.json.zip".to_string(),
            base_files_url: "https://host/%s/".to_string(),
            ..BuildVars::default()
        }
    }

    #[test]
    fn test_no_db_url_always_saves() {
        let vars = BuildVars::default();
        let fetcher = MapFetcher::default();
        assert!(DatabasePersistence::new(&vars, &fetcher).needs_save(&db()).unwrap());
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreachable_previous_forces_save() {
        let vars = vars_with_url();
        let fetcher = MapFetcher::default();
        assert!(DatabasePersistence::new(&vars, &fetcher).needs_save(&db()).unwrap());
    }

    #[test]
    fn test_same_content_does_not_save() {
        let mut previous = serde_json::to_value(db()).unwrap();
        previous["timestamp"] = serde_json::json!(1);
        previous["base_files_url"] = serde_json::json!("https://host/old/");
        let vars = vars_with_url();
        let fetcher = MapFetcher::default().with(
            "https://host/db.json.zip",
            zipped("db.json", &previous.to_string()),
        );
        assert!(!DatabasePersistence::new(&vars, &fetcher).needs_save(&db()).unwrap());
    }

    #[test]
    fn test_changed_content_saves() {
        let mut previous = serde_json::to_value(db()).unwrap();
        previous["files"]["_Console/NES.rbf"]["size"] = serde_json::json!(2);
        let vars = vars_with_url();
        let fetcher = MapFetcher::default().with(
            "https://host/db.json.zip",
            zipped("db.json", &previous.to_string()),
        );
        assert!(DatabasePersistence::new(&vars, &fetcher).needs_save(&db()).unwrap());
    }

    #[test]
    fn test_broken_previous_is_fatal() {
        let vars = vars_with_url();
        let fetcher = MapFetcher::default().with("https://host/db.json.zip", zipped("db.json", "{oops"));
        assert!(DatabasePersistence::new(&vars, &fetcher).needs_save(&db()).is_err());
    }

    #[test]
    fn test_save_writes_pretty_debug_file() {
        let tmp = tempdir().unwrap();
        let vars = vars_with_url();
        let fetcher = MapFetcher::default();
        let mut db = db();
        let target = DatabasePersistence::new(&vars, &fetcher)
            .save(&mut db, tmp.path(), tmp.path())
            .unwrap();
        assert_eq!(target, tmp.path().join("dbresult.json"));
        let text = std::fs::read_to_string(target).unwrap();
        assert!(text.contains("\n  \"db_id\": \"test\""));

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("dbresult.json")]);
    }

    fn bundle(files: &[&str]) -> ZipBundle {
        let mut content = SummaryContent::default();
        for file in files {
            content.files.insert(
                file.to_string(),
                FileRecord {
                    hash: "h".to_string(),
                    size: 1,
                    tags: vec![TagId(0)],
                    overwrite: None,
                    path: None,
                    reboot: None,
                    zip_id: Some("bundle".to_string()),
                },
            );
        }
        ZipBundle {
            base_files_url: String::new(),
            contents: vec!["filters".to_string()],
            description: "Unpacking filters at the root".to_string(),
            kind: "extract_all_contents".to_string(),
            path: String::new(),
            raw_files_size: files.len() as u64,
            target_folder_path: String::new(),
            mode: None,
            source: Some("filters".to_string()),
            summary_file_content: Some(content),
            summary_file: None,
            contents_file: None,
        }
    }

    #[test]
    fn test_save_publishes_zips_and_database_together() {
        let source = tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("filters")).unwrap();
        std::fs::write(source.path().join("filters/a.txt"), "a").unwrap();
        let out = tempdir().unwrap();

        let vars = vars_with_url();
        let fetcher = MapFetcher::default();
        let mut db = db();
        let mut zips = BTreeMap::new();
        zips.insert("a_first".to_string(), bundle(&["filters/a.txt"]));
        db.zips = Some(zips);

        DatabasePersistence::new(&vars, &fetcher)
            .save(&mut db, source.path(), out.path())
            .unwrap();

        let mut names: Vec<_> = std::fs::read_dir(out.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["a_first.zip", "a_first_summary.json.zip", "dbresult.json"]
        );
    }

    #[test]
    fn test_failed_save_leaves_output_untouched() {
        let source = tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("filters")).unwrap();
        std::fs::write(source.path().join("filters/a.txt"), "a").unwrap();
        let out = tempdir().unwrap();

        let vars = vars_with_url();
        let fetcher = MapFetcher::default();
        let mut db = db();
        let mut zips = BTreeMap::new();
        zips.insert("a_first".to_string(), bundle(&["filters/a.txt"]));
        zips.insert("b_second".to_string(), bundle(&["filters/vanished.txt"]));
        db.zips = Some(zips);

        let result = DatabasePersistence::new(&vars, &fetcher).save(&mut db, source.path(), out.path());
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
