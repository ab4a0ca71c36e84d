use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::config::BuildVars;
use crate::error::{Error, Result};
use crate::fetch::{latest_linux_release, Fetcher};
use crate::hasher::digest_bytes;
use crate::storage::models::{Database, LinuxRelease};
use crate::zips::{load_zips_config, ZipsBuilder};

/// Revision placeholder inside `BASE_FILES_URL`.
pub const REVISION_PLACEHOLDER: &str = "%s";

/// Attaches release metadata to an assembled database. Only the base URL is
/// mandatory; the other steps are skipped when their variable is unset.
pub struct Enricher<'a> {
    vars: &'a BuildVars,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Enricher<'a> {
    pub fn new(vars: &'a BuildVars, fetcher: &'a dyn Fetcher) -> Self {
        Self { vars, fetcher }
    }

    pub fn apply_urls(&self, db: &mut Database, revision: &str) -> Result<()> {
        let template = self
            .vars
            .base_files_url()
            .ok_or(Error::MissingVariable("BASE_FILES_URL"))?;
        db.base_files_url = Some(format_base_files_url(template, revision)?);
        info!("BASE_FILES_URL at {}: {}", revision, db.base_files_url.as_deref().unwrap_or_default());

        if let Some(db_url) = self.vars.db_url() {
            db.db_url = Some(db_url.to_string());
        }
        Ok(())
    }

    pub fn apply_linux_update(&self, db: &mut Database) -> Result<()> {
        let Some(repository) = self.vars.linux_github_repository() else {
            return Ok(());
        };
        info!("LINUX_GITHUB_REPOSITORY: {}", repository);

        let url = latest_linux_release(repository, self.fetcher)?;
        let digest = digest_bytes(&self.fetcher.fetch(&url)?);
        let version = release_version(&url);
        info!("Latest Linux release {} ({} bytes)", version, digest.size);

        db.linux = Some(LinuxRelease {
            hash: digest.hash,
            size: digest.size,
            url,
            version,
        });
        Ok(())
    }

    /// Needs `apply_urls` first: bundles copy the database's base URL.
    pub fn apply_zips(&self, db: &mut Database) -> Result<()> {
        let Some(zips_config) = self.vars.zips_config() else {
            return Ok(());
        };
        let config = load_zips_config(Path::new(zips_config))?;

        let mut builder = ZipsBuilder::new(db);
        for (zip_id, spec) in &config {
            builder.add_zip(zip_id, spec)?;
        }
        let zips = builder.build();
        info!("{} zips built from {}", zips.len(), zips_config);
        db.zips = Some(zips);
        Ok(())
    }
}

pub fn format_base_files_url(template: &str, revision: &str) -> Result<String> {
    if !template.contains(REVISION_PLACEHOLDER) {
        return Err(Error::InvalidConfig(format!(
            "BASE_FILES_URL \"{}\" has no {} placeholder",
            template, REVISION_PLACEHOLDER
        )));
    }
    Ok(template.replacen(REVISION_PLACEHOLDER, revision, 1))
}

/// Last six characters of the release file stem, `release_20230527.7z` gives `230527`.
pub fn release_version(url: &str) -> String {
    let stem = Path::new(url)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let chars: Vec<char> = stem.chars().collect();
    chars[chars.len().saturating_sub(6)..].iter().collect()
}

/// Commit hash checked out in `dir`.
pub fn current_revision(dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .current_dir(dir)
        .output()?;
    if !output.status.success() {
        return Err(Error::Other(format!(
            "git rev-parse failed in {}: {}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
