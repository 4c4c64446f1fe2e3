//! Init command - create the configuration file.

use bundlecache::config::{config_file_path, ConfigError, ConfigFile};

use crate::error::CliError;

/// Write `config.ini`, keeping any values already set.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    let config = match ConfigFile::load() {
        Ok(config) => {
            println!("Updating existing configuration.");
            config
        }
        Err(ConfigError::NotFound(_)) => ConfigFile::default(),
        Err(e) => return Err(e.into()),
    };
    config.save()?;

    println!("Configuration file: {}", path.display());
    println!("Cache directory:    {}", config.cache.directory.display());
    println!();
    if config.remote.main_url.is_none() {
        println!("Set the download server before syncing:");
        println!("  bundlecache config set remote.main_url https://cdn.example.com/bundles");
    } else {
        println!("Edit this file to customize bundlecache settings.");
    }
    Ok(())
}
