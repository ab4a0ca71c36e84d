pub mod config;
pub mod partition;

pub use config::{load_zips_config, parse_zips_config, ZipSpec};
pub use partition::{ZipsBuilder, SUBFOLDER_MIN_FILES};
