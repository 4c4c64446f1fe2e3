//! Clear command - remove cached files.

use bundlecache::fs::ClearMode;

use super::common::{CliContext, OperationRunner};
use crate::error::CliError;

pub fn run(
    package: Option<String>,
    mode: String,
    tags: Vec<String>,
    version: Option<String>,
) -> Result<(), CliError> {
    let mode = parse_mode(&mode, tags)?;

    let ctx = CliContext::new(package);
    let runner = OperationRunner::new()?;

    let manifest_needed = mode.needs_manifest();
    let mut fs = if manifest_needed {
        ctx.open_file_system()?
    } else {
        ctx.open_offline_file_system()?
    };

    runner.initialize(&mut fs)?;
    let manifest = match (manifest_needed, version) {
        (true, Some(version)) => Some(runner.load_manifest(&mut fs, &version, ctx.config())?),
        (true, None) => {
            return Err(CliError::Config(format!(
                "clear mode '{}' needs --version",
                mode
            )))
        }
        (false, _) => None,
    };

    let before = fs.file_count();
    let mut op = fs.clear_cache(mode.clone(), manifest);
    runner.run(&mut fs, &mut op, "Clear")?;

    println!(
        "Cleared '{}': {} bundles removed, {} remain cached.",
        mode,
        before.saturating_sub(fs.file_count()),
        fs.file_count()
    );
    Ok(())
}

/// `tags` takes its tags from `--tag`; every other mode uses the
/// `ClearMode` string form.
fn parse_mode(mode: &str, tags: Vec<String>) -> Result<ClearMode, CliError> {
    if mode == "tags" {
        if tags.is_empty() {
            return Err(CliError::Config(
                "clear mode 'tags' needs at least one --tag".to_string(),
            ));
        }
        return Ok(ClearMode::ByTags(tags));
    }
    mode.parse().map_err(CliError::Config)
}
