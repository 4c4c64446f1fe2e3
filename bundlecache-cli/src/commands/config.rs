//! `bundlecache config`: inspect and edit `config.ini`.
//!
//! Every edit goes through [`ConfigKey::set`], so the file only ever holds
//! values the library accepts. A missing file reads as the defaults; a file
//! that fails to parse is reported instead of being silently replaced.

use std::fmt::Write as _;

use bundlecache::config::{config_file_path, ConfigError, ConfigFile, ConfigKey};
use clap::Subcommand;

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print settings grouped by section, `*` marking changed values
    #[command(alias = "list")]
    Show {
        /// Only this section (cache, download, remote, logging)
        section: Option<String>,
    },

    /// Print one value, e.g. `config get download.max_concurrency`
    Get { key: String },

    /// Validate and store a value
    Set { key: String, value: String },

    /// Put a setting back to its default
    Unset { key: String },

    /// Print where config.ini lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { section } => {
            print!("{}", render(&load_or_default()?, section.as_deref())?);
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let key = lookup(&key)?;
            let value = key.get(&load_or_default()?);
            println!("{}", if value.is_empty() { "(not set)" } else { value.as_str() });
            Ok(())
        }
        ConfigCommands::Set { key, value } => edit(&key, |key, config| key.set(config, &value)),
        ConfigCommands::Unset { key } => edit(&key, |key, config| {
            key.set(config, &key.get(&ConfigFile::default()))
        }),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn load_or_default() -> Result<ConfigFile, CliError> {
    match ConfigFile::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => Ok(ConfigFile::default()),
        Err(e) => Err(e.into()),
    }
}

fn lookup(name: &str) -> Result<ConfigKey, CliError> {
    name.parse().map_err(|_| {
        CliError::Config(format!(
            "no setting named '{}' (see `bundlecache config show`)",
            name
        ))
    })
}

fn edit<F>(name: &str, apply: F) -> Result<(), CliError>
where
    F: FnOnce(ConfigKey, &mut ConfigFile) -> Result<(), ConfigError>,
{
    let key = lookup(name)?;
    let mut config = load_or_default()?;
    apply(key, &mut config)?;
    config.save()?;

    let value = key.get(&config);
    println!(
        "{} = {}",
        key.name(),
        if value.is_empty() { "(not set)" } else { value.as_str() }
    );
    Ok(())
}

/// Listing of `config`, optionally restricted to one section.
fn render(config: &ConfigFile, section: Option<&str>) -> Result<String, CliError> {
    let keys: Vec<ConfigKey> = ConfigKey::all()
        .iter()
        .copied()
        .filter(|k| section.map_or(true, |s| k.section().eq_ignore_ascii_case(s)))
        .collect();
    if keys.is_empty() {
        return Err(CliError::Config(format!(
            "unknown section '{}'",
            section.unwrap_or_default()
        )));
    }

    let defaults = ConfigFile::default();
    let width = keys.iter().map(|k| k.key_name().len()).max().unwrap_or(0);
    let mut out = String::new();
    let mut previous = None;

    for key in keys {
        if previous != Some(key.section()) {
            if previous.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", key.section());
            previous = Some(key.section());
        }
        let value = key.get(config);
        let marker = if value != key.get(&defaults) { '*' } else { ' ' };
        let shown = if value.is_empty() { "(not set)" } else { value.as_str() };
        let _ = writeln!(out, "{} {:<width$} = {}", marker, key.key_name(), shown);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_marks_changed_values() {
        let mut config = ConfigFile::default();
        ConfigKey::DownloadMaxConcurrency.set(&mut config, "3").unwrap();

        let out = render(&config, Some("download")).unwrap();

        assert!(out.starts_with("[download]\n"));
        assert!(!out.contains("[cache]"));
        let line = out
            .lines()
            .find(|l| l.contains("max_concurrency "))
            .unwrap();
        assert!(line.starts_with('*'));
        assert!(line.ends_with("= 3"));
        assert!(out
            .lines()
            .filter(|l| l.contains("retry_delay_ms"))
            .all(|l| l.starts_with(' ')));
    }

    #[test]
    fn test_render_all_sections() {
        let out = render(&ConfigFile::default(), None).unwrap();
        for section in ["[cache]", "[download]", "[remote]", "[logging]"] {
            assert!(out.contains(section), "{}", section);
        }
        assert!(out.contains("(not set)"));
    }

    #[test]
    fn test_render_unknown_section() {
        assert!(render(&ConfigFile::default(), Some("nope")).is_err());
    }

    #[test]
    fn test_lookup_reports_unknown_key() {
        assert_eq!(
            lookup("download.max_concurrency").unwrap(),
            ConfigKey::DownloadMaxConcurrency
        );
        let err = lookup("download.nope").unwrap_err().to_string();
        assert!(err.contains("download.nope"));
    }
}
