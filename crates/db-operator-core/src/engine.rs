use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::BuildVars;
use crate::enrich::{current_revision, Enricher};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::gate::DatabasePersistence;
use crate::hasher;
use crate::progress::BuildReporter;
use crate::report::save_report_terms_in_readme;
use crate::scanner::Finder;
use crate::storage::builder::{is_housekeeping, DatabaseBuilder};
use crate::storage::models::Database;
use crate::tags::{Metadata, TagEngine, DEFAULT_ALIASES};

const README: &str = "README.md";

/// A database assembled from a tree, before enrichment.
#[derive(Debug)]
pub struct Assembly {
    pub database: Database,
    pub report_terms: Vec<String>,
    pub total_files: usize,
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub tag_duration: Duration,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub tag_duration: Duration,
    pub total_files: usize,
    pub files: usize,
    pub folders: usize,
    pub zips: usize,
    pub saved: bool,
    pub database_path: Option<PathBuf>,
}

/// Runs `build <source_dir>` end to end.
pub struct BuildEngine {
    source_dir: PathBuf,
    output_dir: PathBuf,
    vars: BuildVars,
    fetcher: Box<dyn Fetcher>,
    revision: Option<String>,
}

impl BuildEngine {
    pub fn new(source_dir: &Path, vars: BuildVars, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            output_dir: source_dir.to_path_buf(),
            vars,
            fetcher,
            revision: None,
        }
    }

    /// Where the database, zip artifacts and README go. Defaults to the source directory.
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        self.output_dir = dir.to_path_buf();
        self
    }

    /// Skips asking git for the checked out revision.
    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = Some(revision.to_string());
        self
    }

    /// Discovers, hashes and tags the tree. Files are tagged in one pass and
    /// their parent folders in a second one.
    pub fn assemble(&self, reporter: &dyn BuildReporter) -> Result<Assembly> {
        info!("Scanning {}...", self.source_dir.display());
        reporter.on_scan_start();
        let scan_start = Instant::now();
        let all_files = Finder::new(&self.source_dir)?.find_all()?;
        let scan_duration = scan_start.elapsed();
        reporter.on_scan_complete(all_files.len(), scan_duration.as_secs_f64());
        debug!("Scan completed in {:.2}s, {} files", scan_duration.as_secs_f64(), all_files.len());

        let published: Vec<String> = all_files
            .iter()
            .filter(|file| !is_housekeeping(file))
            .cloned()
            .collect();

        info!("Hashing {} files...", published.len());
        reporter.on_hash_start(published.len());
        let hash_start = Instant::now();
        let digests = hasher::digest_all(&self.source_dir, &published, reporter)?;
        let hash_duration = hash_start.elapsed();
        reporter.on_hash_complete(hash_duration.as_secs_f64());
        debug!("Hash completed in {:.2}s", hash_duration.as_secs_f64());

        info!("Tagging...");
        reporter.on_tag_start();
        let tag_start = Instant::now();
        let metadata = Metadata::load_or_default(Path::new(&self.vars.download_metadata_json));
        let mut tags = TagEngine::new(&self.source_dir, metadata);
        tags.init_aliases(DEFAULT_ALIASES)?;

        let (database, report_terms) = {
            let mut builder = DatabaseBuilder::new(&mut tags);
            for (file, digest) in published.iter().zip(digests) {
                builder.add_file(file, digest)?;
            }
            for file in &all_files {
                builder.add_parent_folders(file)?;
            }
            let database = builder.build(&self.vars.db_id)?;
            (database, tags.report_terms())
        };
        let tag_duration = tag_start.elapsed();
        reporter.on_tag_complete(database.files.len(), database.folders.len(), tag_duration.as_secs_f64());
        debug!(
            "Tagging completed in {:.2}s, {} files, {} folders, {} tags",
            tag_duration.as_secs_f64(),
            database.files.len(),
            database.folders.len(),
            database.tag_dictionary.len()
        );

        Ok(Assembly {
            database,
            report_terms,
            total_files: all_files.len(),
            scan_duration,
            hash_duration,
            tag_duration,
        })
    }

    /// Assemble, enrich, compare with the published database and save on change.
    /// Nothing is written unless every step before saving succeeds.
    pub fn run(&self, reporter: &dyn BuildReporter) -> Result<BuildOutcome> {
        self.vars.validate()?;

        let Assembly {
            mut database,
            report_terms,
            total_files,
            scan_duration,
            hash_duration,
            tag_duration,
        } = self.assemble(reporter)?;

        let revision = match &self.revision {
            Some(revision) => revision.clone(),
            None => current_revision(&self.source_dir)?,
        };

        let enricher = Enricher::new(&self.vars, self.fetcher.as_ref());
        enricher.apply_urls(&mut database, &revision)?;
        enricher.apply_linux_update(&mut database)?;
        enricher.apply_zips(&mut database)?;
        let zips = database.zips.as_ref().map_or(0, |zips| zips.len());
        reporter.on_zips_complete(zips);

        let persistence = DatabasePersistence::new(&self.vars, self.fetcher.as_ref());
        let database_path = if persistence.needs_save(&database)? {
            info!("Changes detected. Proceeding to save new db...");
            let path = persistence.save(&mut database, &self.source_dir, &self.output_dir)?;
            save_report_terms_in_readme(
                &report_terms,
                &self.source_dir.join(README),
                &self.output_dir.join(README),
            )?;
            info!("Saving complete.");
            Some(path)
        } else {
            info!("No changes detected.");
            None
        };
        reporter.on_save_complete(database_path.is_some());

        Ok(BuildOutcome {
            scan_duration,
            hash_duration,
            tag_duration,
            total_files,
            files: database.files.len(),
            folders: database.folders.len(),
            zips,
            saved: database_path.is_some(),
            database_path,
        })
    }
}
