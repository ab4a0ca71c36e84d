pub mod builder;
pub mod models;
pub mod persist;

pub use builder::{is_housekeeping, with_sigil, without_sigil, DatabaseBuilder, SIGIL};
pub use models::{
    ArtifactDescriptor, BundleMode, Database, FileRecord, FolderRecord, LinuxRelease, SummaryContent,
    ZipBundle,
};
pub use persist::{save_database, save_zips, to_sorted_json};
