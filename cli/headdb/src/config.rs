use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment, File, FileFormat};
use headdb_catalog::CatalogConfig;
use tracing::debug;
use xdg::BaseDirectories;

/// Name of headdb managed directories
const HEADDB_DIR_NAME: &str = "headdb";
pub const HEADDB_CONFIG_FILE: &str = "headdb.toml";
/// Prefix of environment variables overriding config keys,
/// e.g. `HEADDB_FETCH_TIMEOUT_MILLIS=1000`
const HEADDB_ENV_PREFIX: &str = "HEADDB";

/// Read the catalog configuration.
///
/// Later sources override earlier ones:
/// 1. built-in defaults
/// 2. `config_file`, or `$XDG_CONFIG_HOME/headdb/headdb.toml` if it exists
/// 3. `HEADDB_*` environment variables
///    (`HEADDB_CATEGORIES` takes a comma separated list)
pub fn load(config_file: Option<&Path>) -> Result<CatalogConfig> {
    let mut builder = HierarchicalConfig::builder();

    match config_file {
        Some(path) => {
            debug!(path = %path.display(), "reading explicit config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        },
        None => {
            let dirs = BaseDirectories::with_prefix(HEADDB_DIR_NAME)
                .context("Could not determine config directory")?;
            match dirs.find_config_file(HEADDB_CONFIG_FILE) {
                Some(path) => {
                    debug!(path = %path.display(), "reading config file");
                    builder = builder.add_source(File::from(path).format(FileFormat::Toml));
                },
                None => debug!("no config file found, using defaults"),
            }
        },
    }

    builder = builder.add_source(
        Environment::with_prefix(HEADDB_ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("categories"),
    );

    builder
        .build()
        .context("Could not read config")?
        .try_deserialize()
        .context("Could not parse config")
}
