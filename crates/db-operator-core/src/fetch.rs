//! Network and disk access for previously published databases and Linux
//! releases. Everything goes through [`Fetcher`] so callers can swap the
//! transport.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("db-operator/", env!("CARGO_PKG_VERSION"));
const GITHUB_API: &str = "https://api.github.com";

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
    github_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(github_token: Option<&str>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            github_token: github_token.map(str::to_string),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if url.starts_with(GITHUB_API) {
            request = request.header("Accept", "application/vnd.github.v3+json");
            if let Some(token) = &self.github_token {
                request = request.bearer_auth(token);
            }
        }
        let response = request.send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

fn is_remote(address: &str) -> bool {
    address.starts_with("http://") || address.starts_with("https://")
}

fn is_json(address: &str) -> bool {
    Path::new(address)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

/// Parses the first entry of a zip archive as JSON.
pub fn unzip_json(bytes: &[u8]) -> Result<Value> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Err(Error::Fetch("Zip archive has no entries".to_string()));
    }
    let mut entry = archive.by_index(0)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(serde_json::from_str(&text)?)
}

/// Loads a published database from a URL or a local path, `.json` or zipped.
/// Bundle summaries referenced by `summary_file.url` are attached as
/// `summary_file_content` when they can be fetched.
pub fn load_database(address: &str, fetcher: &dyn Fetcher) -> Result<Value> {
    info!("Loading database from {}", address);
    let bytes = if is_remote(address) {
        fetcher.fetch(address)?
    } else {
        fs::read(address)?
    };

    let mut db: Value = if is_json(address) {
        serde_json::from_slice(&bytes)?
    } else {
        unzip_json(&bytes)?
    };

    if let Some(zips) = db.get_mut("zips").and_then(Value::as_object_mut) {
        for (zip_id, bundle) in zips.iter_mut() {
            let Some(url) = bundle
                .pointer("/summary_file/url")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            match fetch_summary_file_content(&url, fetcher) {
                Ok(content) => bundle["summary_file_content"] = content,
                Err(e) => warn!("Could not fetch summary of zip {} from {}: {}", zip_id, url, e),
            }
        }
    }
    Ok(db)
}

fn fetch_summary_file_content(url: &str, fetcher: &dyn Fetcher) -> Result<Value> {
    let bytes = if is_remote(url) { fetcher.fetch(url)? } else { fs::read(url)? };
    let summary = unzip_json(&bytes)?;
    Ok(json!({
        "files": summary.get("files").cloned().unwrap_or_else(|| json!({})),
        "folders": summary.get("folders").cloned().unwrap_or_else(|| json!({})),
    }))
}

#[derive(Debug, Deserialize)]
struct GitTree {
    sha: String,
    tree: Vec<GitTreeEntry>,
}

#[derive(Debug, Deserialize)]
struct GitTreeEntry {
    path: String,
}

/// Raw download URL of the newest `release_*.7z` at the repository's HEAD.
pub fn latest_linux_release(repository: &str, fetcher: &dyn Fetcher) -> Result<String> {
    let url = format!("{}/repos/{}/git/trees/HEAD", GITHUB_API, repository);
    let tree: GitTree = serde_json::from_slice(&fetcher.fetch(&url)?)?;

    let latest = tree
        .tree
        .iter()
        .map(|entry| entry.path.as_str())
        .filter(|path| {
            let lower = path.to_lowercase();
            lower.starts_with("release_") && lower.ends_with(".7z")
        })
        .max()
        .ok_or_else(|| Error::Fetch(format!("No release_*.7z found in {}", repository)))?;

    Ok(format!(
        "https://raw.githubusercontent.com/{}/{}/{}",
        repository, tree.sha, latest
    ))
}
