use std::{fs::File, io::BufReader, path::PathBuf};

use home::home_dir;
use kseq2midi::KseqError;
use serde::{Deserialize, Serialize};

/// Suffix appended to the input path when none is configured
pub const DEFAULT_OUTPUT_SUFFIX: &str = ".mid";

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    output_suffix: Option<String>,
}

impl Config {
    // folder placed in $HOME directory
    const FOLDER: &'static str = ".kseq2midi";

    pub fn get_output_suffix(&self) -> &str {
        self.output_suffix
            .as_deref()
            .filter(|suffix| !suffix.is_empty())
            .unwrap_or(DEFAULT_OUTPUT_SUFFIX)
    }

    fn get_path() -> Result<PathBuf, KseqError> {
        let home = home_dir()
            .ok_or_else(|| KseqError::ConfigError("Could not find home directory".to_string()))?;
        Ok(home.join(Self::FOLDER).join("config.json"))
    }

    /// Defaults when no config file exists, the file is never created
    pub fn read_config() -> Result<Self, KseqError> {
        let config_path = Self::get_path()?;
        if !config_path.exists() {
            log::debug!("No local configuration at {}", config_path.display());
            return Ok(Self::default());
        }
        let file = File::open(&config_path)?;
        let config = Self::from_reader(BufReader::new(file))?;
        log::debug!("Loaded local configuration {config:?}");
        Ok(config)
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self, KseqError> {
        serde_json::from_reader(reader).map_err(|err| {
            KseqError::ConfigError(format!("Could not read local configuration {err:}"))
        })
    }
}
