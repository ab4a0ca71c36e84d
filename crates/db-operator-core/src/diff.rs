use serde_json::{json, Map, Value};
use similar::TextDiff;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub equal: bool,
    /// Line diff of the two normalized databases, empty when they match.
    pub unified_diff: String,
}

/// Rewrites a database into its comparison form: volatile fields reset, tag
/// ids replaced by their sorted term names, the tag dictionary reduced to its
/// sorted terms. Applying it again changes nothing.
pub fn normalize(db: &mut Value) -> Result<()> {
    let obj = db
        .as_object_mut()
        .ok_or_else(|| Error::Other("Database is not a JSON object".to_string()))?;

    obj.insert("base_files_url".to_string(), json!(""));
    obj.insert("latest_zip_url".to_string(), json!(""));
    obj.insert("timestamp".to_string(), json!(0));
    obj.insert("db_files".to_string(), json!([]));
    obj.entry("db_url").or_insert_with(|| json!(""));
    obj.entry("default_options").or_insert_with(|| json!({}));

    let terms = tag_terms(obj.get("tag_dictionary"));

    for key in ["files", "folders"] {
        if let Some(elements) = obj.get_mut(key).and_then(Value::as_object_mut) {
            normalize_elements(&terms, elements)?;
        }
    }

    if let Some(zips) = obj.get_mut("zips").and_then(Value::as_object_mut) {
        for bundle in zips.values_mut() {
            let Some(bundle) = bundle.as_object_mut() else {
                continue;
            };
            bundle.insert("base_files_url".to_string(), json!(""));
            bundle.insert("contents_file".to_string(), json!({}));
            bundle.insert("summary_file".to_string(), json!({}));

            if let Some(content) = bundle
                .get_mut("summary_file_content")
                .and_then(Value::as_object_mut)
            {
                for key in ["files", "folders"] {
                    if let Some(elements) = content.get_mut(key).and_then(Value::as_object_mut) {
                        normalize_elements(&terms, elements)?;
                    }
                }
            }
        }
    }

    let mut names: Vec<String> = match obj.get("tag_dictionary") {
        Some(Value::Object(dictionary)) => dictionary.keys().cloned().collect(),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    names.sort();
    obj.insert(
        "tag_dictionary".to_string(),
        Value::Array(names.into_iter().map(Value::String).collect()),
    );
    Ok(())
}

/// Id to term. Terms are visited in sorted order so a later term wins when
/// two share an id.
fn tag_terms(dictionary: Option<&Value>) -> BTreeMap<u64, String> {
    let mut terms = BTreeMap::new();
    if let Some(Value::Object(dictionary)) = dictionary {
        let mut words: Vec<&String> = dictionary.keys().collect();
        words.sort();
        for word in words {
            if let Some(id) = dictionary.get(word.as_str()).and_then(Value::as_u64) {
                terms.insert(id, word.clone());
            }
        }
    }
    terms
}

fn normalize_elements(terms: &BTreeMap<u64, String>, elements: &mut Map<String, Value>) -> Result<()> {
    for element in elements.values_mut() {
        let Some(element) = element.as_object_mut() else {
            continue;
        };
        if let Some(Value::Array(tags)) = element.get("tags") {
            let mut names = Vec::with_capacity(tags.len());
            for tag in tags {
                let name = match tag {
                    Value::String(name) => name.clone(),
                    other => {
                        let id = other
                            .as_u64()
                            .ok_or_else(|| Error::Other(format!("Invalid tag {}", other)))?;
                        terms.get(&id).cloned().ok_or(Error::UnknownTag(id))?
                    }
                };
                names.push(name);
            }
            names.sort();
            element.insert(
                "tags".to_string(),
                Value::Array(names.into_iter().map(Value::String).collect()),
            );
        }
        if element.contains_key("url") {
            element.insert("url".to_string(), json!(""));
        }
    }
    Ok(())
}

/// Normalizes working copies of both databases and compares them. The diff
/// is logged for operators whatever the outcome.
pub fn diff_databases(mut left: Value, mut right: Value) -> Result<DiffReport> {
    normalize(&mut left)?;
    normalize(&mut right)?;

    let equal = serde_json::to_string(&left)? == serde_json::to_string(&right)?;

    let left_text = serde_json::to_string_pretty(&left)?;
    let right_text = serde_json::to_string_pretty(&right)?;
    let unified_diff = TextDiff::from_lines(&left_text, &right_text)
        .unified_diff()
        .context_radius(3)
        .header("left", "right")
        .to_string();

    if !unified_diff.is_empty() {
        info!("RED[-] is left, GREEN[+] is right\n{}", unified_diff);
    }

    Ok(DiffReport { equal, unified_diff })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "db_id": "distribution_mister",
            "base_files_url": "https://host/abc/",
            "timestamp": 1700000000,
            "files": {
                "_Console/NES.rbf": {"hash": "h1", "size": 10, "tags": [2, 0]},
                "|games/NES/boot.rom": {"hash": "h2", "size": 5, "tags": [1], "overwrite": false}
            },
            "folders": {
                "_Console": {"tags": [0]},
                "|games": {"tags": [1]}
            },
            "tag_dictionary": {"console": 0, "games": 1, "nes": 2, "famicom": 2},
            "zips": {
                "nes": {
                    "base_files_url": "https://host/abc/",
                    "summary_file": {"hash": "x", "size": 1, "url": "https://host/z"},
                    "summary_file_content": {
                        "files": {"|games/NES/a.nes": {"hash": "h3", "size": 1, "tags": [1, 2]}},
                        "folders": {}
                    }
                }
            }
        })
    }

    #[test]
    fn test_normalize_replaces_ids_with_terms() {
        let mut db = sample();
        normalize(&mut db).unwrap();

        assert_eq!(db["timestamp"], 0);
        assert_eq!(db["base_files_url"], "");
        assert_eq!(db["latest_zip_url"], "");
        assert_eq!(db["db_files"], json!([]));
        assert_eq!(db["db_url"], "");
        assert_eq!(db["default_options"], json!({}));
        assert_eq!(db["files"]["_Console/NES.rbf"]["tags"], json!(["console", "nes"]));
        assert_eq!(db["tag_dictionary"], json!(["console", "famicom", "games", "nes"]));

        let bundle = &db["zips"]["nes"];
        assert_eq!(bundle["base_files_url"], "");
        assert_eq!(bundle["summary_file"], json!({}));
        assert_eq!(bundle["contents_file"], json!({}));
        assert_eq!(
            bundle["summary_file_content"]["files"]["|games/NES/a.nes"]["tags"],
            json!(["games", "nes"])
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut once = sample();
        normalize(&mut once).unwrap();
        let mut twice = once.clone();
        normalize(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_keeps_existing_db_url() {
        let mut db = sample();
        db["db_url"] = json!("https://host/db.json.zip");
        normalize(&mut db).unwrap();
        assert_eq!(db["db_url"], "https://host/db.json.zip");
    }

    #[test]
    fn test_unknown_tag_id_is_error() {
        let mut db = sample();
        db["files"]["_Console/NES.rbf"]["tags"] = json!([42]);
        assert!(matches!(normalize(&mut db), Err(Error::UnknownTag(42))));
    }

    #[test]
    fn test_database_equals_itself() {
        let report = diff_databases(sample(), sample()).unwrap();
        assert!(report.equal);
        assert!(report.unified_diff.is_empty());
    }

    #[test]
    fn test_volatile_fields_are_ignored() {
        let mut right = sample();
        right["timestamp"] = json!(1800000000);
        right["base_files_url"] = json!("https://host/def/");
        assert!(diff_databases(sample(), right).unwrap().equal);
    }

    #[test]
    fn test_id_allocation_order_is_ignored() {
        let mut right = sample();
        right["tag_dictionary"] = json!({"console": 2, "games": 0, "nes": 1, "famicom": 1});
        right["files"]["_Console/NES.rbf"]["tags"] = json!([1, 2]);
        right["files"]["|games/NES/boot.rom"]["tags"] = json!([0]);
        right["folders"]["_Console"]["tags"] = json!([2]);
        right["folders"]["|games"]["tags"] = json!([0]);
        right["zips"]["nes"]["summary_file_content"]["files"]["|games/NES/a.nes"]["tags"] = json!([0, 1]);
        assert!(diff_databases(sample(), right).unwrap().equal);
    }

    #[test]
    fn test_content_change_is_reported() {
        let mut right = sample();
        right["files"]["_Console/NES.rbf"]["hash"] = json!("other");
        let report = diff_databases(sample(), right).unwrap();
        assert!(!report.equal);
        assert!(report.unified_diff.contains("-"));
        assert!(report.unified_diff.contains("other"));
    }
}
