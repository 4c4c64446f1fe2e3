//! Verify command - full CRC and size check of cached bundles.

use bundlecache::CacheFileStatus;
use console::style;

use super::common::{CliContext, OperationRunner};
use crate::error::CliError;

pub fn run(package: Option<String>, version: String, repair: bool) -> Result<(), CliError> {
    let ctx = CliContext::new(package);
    let runner = OperationRunner::new()?;
    let mut fs = ctx.open_file_system()?;

    runner.initialize(&mut fs)?;
    let manifest = runner.load_manifest(&mut fs, &version, ctx.config())?;

    let mut ok = 0usize;
    let mut missing = 0usize;
    let mut corrupted = Vec::new();

    for bundle in &manifest.bundles {
        if runner.cancel_token().is_cancelled() {
            return Err(CliError::Cancelled);
        }
        if !fs.exists(bundle) {
            missing += 1;
            continue;
        }
        match fs.verify_cache_file(bundle) {
            CacheFileStatus::Succeed => ok += 1,
            CacheFileStatus::FileNotExist | CacheFileStatus::CachedFileCorrupted => {
                println!("  {} {} ({})", style("✗").red(), bundle.bundle_name, bundle.guid);
                corrupted.push(bundle.guid.clone());
            }
        }
    }

    println!(
        "{} valid, {} not cached, {} corrupted",
        style(ok).green(),
        missing,
        style(corrupted.len()).red()
    );

    if corrupted.is_empty() {
        return Ok(());
    }

    if repair {
        let removed = corrupted
            .iter()
            .filter(|guid| fs.delete_cache_bundle_file(guid))
            .count();
        println!("Deleted {} corrupted bundles.", removed);
        Ok(())
    } else {
        Err(CliError::Operation {
            what: "Verify".to_string(),
            reason: format!(
                "{} corrupted bundles found; rerun with --repair to delete them",
                corrupted.len()
            ),
        })
    }
}
