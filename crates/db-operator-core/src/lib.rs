pub mod config;
pub mod diff;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod hasher;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod storage;
pub mod tags;
pub mod zips;

pub use config::BuildVars;
pub use diff::{diff_databases, normalize, DiffReport};
pub use engine::{Assembly, BuildEngine, BuildOutcome};
pub use error::{Error, Result};
pub use fetch::{load_database, Fetcher, HttpFetcher};
pub use progress::{BuildReporter, SilentReporter};
pub use storage::Database;
