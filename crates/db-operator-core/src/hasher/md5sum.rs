use rayon::prelude::*;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::progress::BuildReporter;

const CHUNK_LENGTH: usize = 8192;

/// Size and lowercase hex MD5 of one file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub hash: String,
}

pub fn digest_file(file: &Path) -> io::Result<FileDigest> {
    let mut f = File::open(file)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0; CHUNK_LENGTH];
    let mut size = 0u64;

    loop {
        let bytes_read = f.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(FileDigest {
        size,
        hash: format!("{:x}", context.compute()),
    })
}

pub fn digest_bytes(data: &[u8]) -> FileDigest {
    FileDigest {
        size: data.len() as u64,
        hash: format!("{:x}", md5::compute(data)),
    }
}

/// Hashes every file in parallel. The output is index-aligned with `files`.
pub fn digest_all(
    root: &Path,
    files: &[String],
    reporter: &dyn BuildReporter,
) -> io::Result<Vec<FileDigest>> {
    let total = files.len();
    let hashed = AtomicUsize::new(0);

    files
        .par_iter()
        .map(|file| {
            let path = root.join(file);
            let digest = digest_file(&path).map_err(|e| {
                io::Error::new(e.kind(), format!("Error hashing {}: {}", path.display(), e))
            })?;
            let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(done, total);
            Ok(digest)
        })
        .collect()
}
