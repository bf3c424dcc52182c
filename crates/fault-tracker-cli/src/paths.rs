//! File system paths for the CLI.

use crate::error::{CliError, CliResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".fault-tracker";

/// Locations of the CLI's config and durable queue.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths under `~/.fault-tracker`.
    pub fn new() -> CliResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Path("Could not determine home directory".to_string()))?;
        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Tracker options (~/.fault-tracker/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Durable queue (~/.fault-tracker/queue.sqlite).
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("queue.sqlite")
    }

    pub fn ensure_dirs(&self) -> CliResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
