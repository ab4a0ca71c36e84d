use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tags::TagId;

/// A file entry of the database, keyed by its normalized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub size: u64,
    pub tags: Vec<TagId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_id: Option<String>,
}

/// A folder entry of the database, keyed by its normalized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub tags: Vec<TagId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_id: Option<String>,
}

/// The subset of files and folders moved into one zip bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryContent {
    pub files: BTreeMap<String, FileRecord>,
    pub folders: BTreeMap<String, FolderRecord>,
}

/// Size, digest and download location of a published artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub hash: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleMode {
    Simple,
    Multi,
}

/// One independently downloadable packaging of a subtree.
///
/// Before publishing, `summary_file_content` holds the moved entries. Publishing
/// replaces it with the `summary_file` and `contents_file` descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipBundle {
    pub base_files_url: String,
    pub contents: Vec<String>,
    pub description: String,
    pub kind: String,
    pub path: String,
    pub raw_files_size: u64,
    pub target_folder_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BundleMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_file_content: Option<SummaryContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_file: Option<ArtifactDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_file: Option<ArtifactDescriptor>,
}

/// Latest Linux image available for the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinuxRelease {
    pub hash: String,
    pub size: u64,
    pub url: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub db_id: String,
    pub files: BTreeMap<String, FileRecord>,
    pub folders: BTreeMap<String, FolderRecord>,
    pub tag_dictionary: BTreeMap<String, TagId>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_files_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<LinuxRelease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zips: Option<BTreeMap<String, ZipBundle>>,
}
