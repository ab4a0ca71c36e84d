use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// How one named bundle carves content out of the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipSpec {
    /// Everything under `source`, unpacked at the parent of `source`.
    Simple { source: String },
    /// Everything under each of `sources`, unpacked at `path`.
    Multi { sources: Vec<String>, path: String },
    /// One simple bundle per large enough child folder of `source`.
    Subfolders { source: String },
}

#[derive(Debug, Deserialize)]
struct RawZipSpec {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    path: Option<String>,
}

impl ZipSpec {
    fn from_raw(zip_id: &str, raw: RawZipSpec) -> Result<Self> {
        let mode = raw.mode.as_deref().unwrap_or("simple");
        let missing = |field: &str| {
            Error::InvalidConfig(format!("Zip \"{}\" in {} mode needs \"{}\"", zip_id, mode, field))
        };

        match mode {
            "simple" => Ok(ZipSpec::Simple {
                source: raw.source.ok_or_else(|| missing("source"))?,
            }),
            "multi" => {
                if raw.sources.is_empty() {
                    return Err(missing("sources"));
                }
                Ok(ZipSpec::Multi {
                    sources: raw.sources,
                    path: raw.path.ok_or_else(|| missing("path"))?,
                })
            }
            "subfolders" => Ok(ZipSpec::Subfolders {
                source: raw.source.ok_or_else(|| missing("source"))?,
            }),
            other => Err(Error::UnknownZipMode(other.to_string())),
        }
    }
}

/// Parses `{"<zip_id>": {"mode": .., "source": .., ...}, ...}` keeping declaration order.
pub fn parse_zips_config(json: &str) -> Result<IndexMap<String, ZipSpec>> {
    let raw: IndexMap<String, RawZipSpec> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(zip_id, spec)| {
            let spec = ZipSpec::from_raw(&zip_id, spec)?;
            Ok((zip_id, spec))
        })
        .collect()
}

pub fn load_zips_config(path: &Path) -> Result<IndexMap<String, ZipSpec>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("Need \"{}\" to be a valid JSON! {}", path.display(), e))
    })?;
    parse_zips_config(&content)
}
