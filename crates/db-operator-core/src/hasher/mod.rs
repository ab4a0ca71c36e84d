pub mod md5sum;

pub use md5sum::{digest_all, digest_bytes, digest_file, FileDigest};
