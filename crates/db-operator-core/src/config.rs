use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Name of the database file that gets written pretty-printed for debugging.
pub const DEBUG_DB_JSON_NAME: &str = "dbresult.json";

const DEFAULT_DOWNLOAD_METADATA_JSON: &str = "/tmp/download_metadata.json";

/// Variables that drive a `build` run. Empty strings mean "unset".
#[derive(Debug, Clone, Deserialize)]
pub struct BuildVars {
    #[serde(default)]
    pub github_token: String,
    #[serde(default)]
    pub db_id: String,
    #[serde(default)]
    pub db_url: String,
    #[serde(default = "default_db_json_name")]
    pub db_json_name: String,
    #[serde(default)]
    pub base_files_url: String,
    #[serde(default)]
    pub linux_github_repository: String,
    #[serde(default)]
    pub zips_config: String,
    #[serde(default = "default_download_metadata_json")]
    pub download_metadata_json: String,
}

fn default_db_json_name() -> String {
    DEBUG_DB_JSON_NAME.to_string()
}

fn default_download_metadata_json() -> String {
    DEFAULT_DOWNLOAD_METADATA_JSON.to_string()
}

impl Default for BuildVars {
    fn default() -> Self {
        Self {
            github_token: String::new(),
            db_id: String::new(),
            db_url: String::new(),
            db_json_name: default_db_json_name(),
            base_files_url: String::new(),
            linux_github_repository: String::new(),
            zips_config: String::new(),
            download_metadata_json: default_download_metadata_json(),
        }
    }
}

/// Reads `Config.toml` (optional) and then the process environment, so that
/// `DB_ID=...` overrides `db_id = "..."` from the file.
pub fn load_configuration() -> std::result::Result<BuildVars, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::default())
        .build()?;
    Ok(builder.try_deserialize::<BuildVars>()?.trimmed())
}

impl BuildVars {
    fn trimmed(self) -> Self {
        Self {
            github_token: self.github_token.trim().to_string(),
            db_id: self.db_id.trim().to_string(),
            db_url: self.db_url.trim().to_string(),
            db_json_name: self.db_json_name.trim().to_string(),
            base_files_url: self.base_files_url.trim().to_string(),
            linux_github_repository: self.linux_github_repository.trim().to_string(),
            zips_config: self.zips_config.trim().to_string(),
            download_metadata_json: self.download_metadata_json.trim().to_string(),
        }
    }

    /// Fails on the variables every build needs before anything is written.
    pub fn validate(&self) -> Result<()> {
        if self.db_id.is_empty() {
            return Err(Error::MissingVariable("DB_ID"));
        }
        if self.base_files_url.is_empty() {
            return Err(Error::MissingVariable("BASE_FILES_URL"));
        }
        Ok(())
    }

    pub fn db_url(&self) -> Option<&str> {
        non_empty(&self.db_url)
    }

    pub fn base_files_url(&self) -> Option<&str> {
        non_empty(&self.base_files_url)
    }

    pub fn linux_github_repository(&self) -> Option<&str> {
        non_empty(&self.linux_github_repository)
    }

    pub fn zips_config(&self) -> Option<&str> {
        non_empty(&self.zips_config)
    }

    pub fn github_token(&self) -> Option<&str> {
        non_empty(&self.github_token)
    }

    pub fn is_debug_output(&self) -> bool {
        self.db_json_name == DEBUG_DB_JSON_NAME
    }

    /// Copy safe to print in logs.
    pub fn redacted(&self) -> Self {
        let mut vars = self.clone();
        if !vars.github_token.is_empty() {
            vars.github_token = "***".to_string();
        }
        vars
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
