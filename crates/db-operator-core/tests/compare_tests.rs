use serde_json::json;
use std::fs;
use std::io::Write;
use tempfile::tempdir;

use db_operator_core::{diff_databases, load_database, Error, Fetcher, Result};

struct Offline;

impl Fetcher for Offline {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(Error::Fetch(format!("offline: {}", url)))
    }
}

fn published() -> serde_json::Value {
    json!({
        "db_id": "distribution_mister",
        "base_files_url": "https://raw.githubusercontent.com/MiSTer-devel/Distribution_MiSTer/aaa/",
        "timestamp": 1700000000,
        "files": {
            "_Console/NES.rbf": {"hash": "5d41402abc4b2a76b9719d911017c592", "size": 5, "tags": [0, 1]}
        },
        "folders": {"_Console": {"tags": [0]}},
        "tag_dictionary": {"console": 0, "consolecores": 0, "nes": 1}
    })
}

#[test]
fn test_compare_local_json_and_zip() {
    let tmp = tempdir().unwrap();

    let left_path = tmp.path().join("left.json");
    fs::write(&left_path, published().to_string()).unwrap();

    let mut right = published();
    right["timestamp"] = json!(1800000000);
    right["base_files_url"] = json!("https://raw.githubusercontent.com/MiSTer-devel/Distribution_MiSTer/bbb/");
    let right_path = tmp.path().join("right.json.zip");
    {
        let mut zip = zip::ZipWriter::new(fs::File::create(&right_path).unwrap());
        zip.start_file("right.json", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(right.to_string().as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    let left = load_database(&left_path.to_string_lossy(), &Offline).unwrap();
    let right = load_database(&right_path.to_string_lossy(), &Offline).unwrap();
    let report = diff_databases(left, right).unwrap();
    assert!(report.equal);
}

#[test]
fn test_compare_detects_tag_change() {
    let mut right = published();
    right["tag_dictionary"] = json!({"console": 0, "consolecores": 0, "snes": 1});
    let report = diff_databases(published(), right).unwrap();
    assert!(!report.equal);
    assert!(report.unified_diff.contains("snes"));
}

#[test]
fn test_compare_unreachable_remote_is_error() {
    let err = load_database("https://example.invalid/db.json.zip", &Offline).unwrap_err();
    assert!(err.is_unreachable());
}
