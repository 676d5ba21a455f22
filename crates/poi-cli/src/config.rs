//! Runtime configuration for the `poi` binary.
//!
//! Values come from an optional TOML file layered under `POI_`-prefixed
//! environment variables (e.g. `POI_STORE_PATH`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use poi_store_sqlite::DEFAULT_MAX_DEPTH;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite file holding the catalogue and the pending-update log.
  #[serde(default = "default_store_path")]
  pub store_path:             PathBuf,
  /// History rows older than this many days are pruned by `prune-history`.
  #[serde(default = "default_retention_days")]
  pub history_retention_days: u32,
  /// Bound on parent-chain walks.
  #[serde(default = "default_max_depth")]
  pub max_depth:              u32,
}

fn default_store_path() -> PathBuf { PathBuf::from("data.sqlite") }

fn default_retention_days() -> u32 { 30 }

fn default_max_depth() -> u32 { DEFAULT_MAX_DEPTH }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("POI"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    settings
      .try_deserialize()
      .context("failed to deserialise Settings")
  }
}
