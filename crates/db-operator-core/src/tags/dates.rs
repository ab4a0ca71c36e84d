use std::path::Path;

const DATE_SUFFIX_LENGTH: usize = 9;
const MIN_DATED_LENGTH: usize = 10;

/// Removes a trailing `_YYYYMMDD` from a stem. Stems shorter than 10 bytes, or
/// whose last 9 bytes are not `_` plus 8 digits, come back unchanged.
pub fn strip_stem_date(stem: &str) -> &str {
    if stem.len() < MIN_DATED_LENGTH {
        return stem;
    }
    let cut = stem.len() - DATE_SUFFIX_LENGTH;
    if !stem.is_char_boundary(cut) {
        return stem;
    }
    let suffix = stem[cut..].as_bytes();
    if suffix[0] == b'_' && suffix[1..].iter().all(u8::is_ascii_digit) {
        &stem[..cut]
    } else {
        stem
    }
}

/// Same as [`strip_stem_date`] for a full file name or path, keeping the extension.
pub fn remove_date(name: &str) -> String {
    if name.len() < MIN_DATED_LENGTH {
        return name.to_string();
    }
    let path = Path::new(name);
    let (Some(file_name), Some(stem)) = (
        path.file_name().and_then(|f| f.to_str()),
        path.file_stem().and_then(|s| s.to_str()),
    ) else {
        return name.to_string();
    };

    let stripped = strip_stem_date(stem);
    if stripped.len() == stem.len() {
        return name.to_string();
    }

    let prefix = &name[..name.len() - file_name.len()];
    let extension = &file_name[stem.len()..];
    format!("{}{}{}", prefix, stripped, extension)
}

/// Distinct dateless stems among `names`, only for names that carried a date,
/// in first-seen order. `NES_20230101.rbf` and `NES_20230215.rbf` both yield `NES`.
pub fn uniq_files_with_stripped_date<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref();
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let no_date = strip_stem_date(stem);
        if no_date.len() == stem.len() || result.iter().any(|r| r == no_date) {
            continue;
        }
        result.push(no_date.to_string());
    }
    result
}
