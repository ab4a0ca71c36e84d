use std::path::PathBuf;

use thiserror::Error;

use crate::tags::TagId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Variable \"{0}\" is missing!")]
    MissingVariable(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Defect XML in {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        source: quick_xml::Error,
    },

    #[error("Aliases with different indexes should not happen: {0} != {1}")]
    AliasConflict(TagId, TagId),

    #[error("Term is empty after cleaning: {0:?}")]
    EmptyTerm(String),

    #[error("Unknown zip mode: {0}")]
    UnknownZipMode(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Unknown tag id {0} in database")]
    UnknownTag(u64),

    #[error("{0}")]
    Other(String),
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let message = err.to_string();
        match err.into_io_error() {
            Some(io) => Error::Io(io),
            None => Error::Other(message),
        }
    }
}

impl Error {
    /// Failures that mean "the remote side could not be reached", as opposed to
    /// content that was reached but is broken.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Fetch(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
