use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;

/// Marker in the README that gets replaced by the tag listing.
pub const TAGS_PLACEHOLDER: &str = "ALL_TAGS_GO_HERE";

/// `` `a`, `b`, `c` ``
pub fn format_tag_list<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(|term| format!("`{}`", term.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Writes `source` to `target` with the tag placeholder filled in. A missing
/// README only warns. Returns whether a README was written.
pub fn save_report_terms_in_readme<S: AsRef<str>>(
    terms: &[S],
    source: &Path,
    target: &Path,
) -> Result<bool> {
    let tag_list = format_tag_list(terms);
    info!("TAG_LIST: {}", tag_list);

    let content = match fs::read_to_string(source) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} not found, tag list not written", source.display());
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    fs::write(target, content.replace(TAGS_PLACEHOLDER, &tag_list))?;
    info!("{} updated!", target.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_tag_list() {
        assert_eq!(format_tag_list(&["arcade", "nes"]), "`arcade`, `nes`");
    }

    #[test]
    fn test_replaces_placeholder() {
        let tmp = tempdir().unwrap();
        let readme = tmp.path().join("README.md");
        fs::write(&readme, "# Tags\n\nALL_TAGS_GO_HERE\n").unwrap();

        assert!(save_report_terms_in_readme(&["console", "nes"], &readme, &readme).unwrap());
        assert_eq!(
            fs::read_to_string(&readme).unwrap(),
            "# Tags\n\n`console`, `nes`\n"
        );
    }

    #[test]
    fn test_missing_readme_is_not_an_error() {
        let tmp = tempdir().unwrap();
        let readme = tmp.path().join("README.md");
        assert!(!save_report_terms_in_readme(&["nes"], &readme, &readme).unwrap());
        assert!(!readme.exists());
    }
}
