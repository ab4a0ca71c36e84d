use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::builder::without_sigil;
use super::models::{ArtifactDescriptor, Database, SummaryContent, ZipBundle};
use crate::error::{Error, Result};
use crate::hasher::digest_file;

/// Placeholder the zip artifact URLs carry until the zips branch is published.
pub const ZIPS_BRANCH_PLACEHOLDER: &str = "<ZIPS_BRANCH_BASE_URL>";

/// Serializes through `serde_json::Value`, whose maps keep keys sorted.
pub fn to_sorted_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let text = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(text)
}

pub fn save_database(db: &Database, target: &Path, pretty: bool) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(target, to_sorted_json(db, pretty)?)?;
    debug!("Database written to {}", target.display());
    Ok(())
}

fn zip_options() -> Result<SimpleFileOptions> {
    let fixed_time = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .map_err(|_| Error::Other("Invalid zip timestamp".to_string()))?;
    Ok(SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(1))
        .last_modified_time(fixed_time))
}

/// Externalizes every bundle's summary into its two archives and swaps the
/// in-memory content for the artifact descriptors. Returns the names of the
/// archives written into `out_dir`.
pub fn save_zips(
    zips: &mut BTreeMap<String, ZipBundle>,
    base_files_url: &str,
    source_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<String>> {
    if base_files_url.is_empty() {
        return Err(Error::MissingVariable("BASE_FILES_URL"));
    }
    let base_zips_url = base_files_url.replace("%s", ZIPS_BRANCH_PLACEHOLDER);
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::with_capacity(zips.len() * 2);
    for (zip_id, bundle) in zips.iter_mut() {
        let content = bundle.summary_file_content.take().unwrap_or_default();

        let summary_name = format!("{}_summary.json.zip", zip_id);
        let summary_path = out_dir.join(&summary_name);
        save_summary_file_zip(zip_id, &content, &summary_path)?;
        bundle.summary_file = Some(describe(&summary_path, &base_zips_url, &summary_name)?);

        let contents_name = format!("{}.zip", zip_id);
        let contents_path = out_dir.join(&contents_name);
        save_contents_file_zip(&content, &bundle.path, source_dir, &contents_path)?;
        bundle.contents_file = Some(describe(&contents_path, &base_zips_url, &contents_name)?);

        info!("Saved zip {} ({} files)", zip_id, content.files.len());
        written.push(summary_name);
        written.push(contents_name);
    }
    Ok(written)
}

/// Moves finished artifacts from `staging` into `out_dir`, in order.
pub fn promote(staging: &Path, out_dir: &Path, names: &[String]) -> Result<()> {
    for name in names {
        let target = out_dir.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging.join(name), &target)?;
        debug!("Published {}", target.display());
    }
    Ok(())
}

fn describe(artifact: &Path, base_zips_url: &str, name: &str) -> Result<ArtifactDescriptor> {
    let digest = digest_file(artifact)?;
    Ok(ArtifactDescriptor {
        hash: digest.hash,
        size: digest.size,
        url: format!("{}{}", base_zips_url, name),
    })
}

fn save_summary_file_zip(zip_id: &str, content: &SummaryContent, target: &Path) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(target)?);
    zip.start_file(format!("{}_summary.json", zip_id), zip_options()?)?;
    zip.write_all(to_sorted_json(content, false)?.as_bytes())?;
    zip.finish()?;
    Ok(())
}

fn save_contents_file_zip(
    content: &SummaryContent,
    zip_path: &str,
    source_dir: &Path,
    target: &Path,
) -> Result<()> {
    let options = zip_options()?;
    let mut zip = ZipWriter::new(File::create(target)?);
    for file in content.files.keys() {
        let source: PathBuf = source_dir.join(without_sigil(file));
        let entry = file.strip_prefix(zip_path).unwrap_or(file);
        debug!("Zipping {} as {}", source.display(), entry);

        zip.start_file(entry, options)?;
        let mut input = File::open(&source)?;
        io::copy(&mut input, &mut zip)?;
    }
    zip.finish()?;
    Ok(())
}
