//! Fetch command - prefetch every bundle of a manifest version.

use bundlecache::fs::{DownloadFileOperation, DownloadOptions};
use bundlecache::operation::DEFAULT_TICK_INTERVAL;
use bundlecache::{CacheFileSystem, Operation, OperationStatus};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::{self, MissedTickBehavior};

use super::common::{format_size, CliContext, OperationRunner};
use crate::error::CliError;

pub fn run(package: Option<String>, version: String, tags: Vec<String>) -> Result<(), CliError> {
    let ctx = CliContext::new(package);
    let runner = OperationRunner::new()?;
    let mut fs = ctx.open_file_system()?;

    runner.initialize(&mut fs)?;
    let manifest = runner.load_manifest(&mut fs, &version, ctx.config())?;

    let selected: Vec<_> = if tags.is_empty() {
        manifest.bundles.iter().collect()
    } else {
        manifest.bundles_with_tags(&tags).collect()
    };
    let missing: Vec<_> = selected
        .iter()
        .filter(|b| fs.need_download(b))
        .copied()
        .cloned()
        .collect();

    if missing.is_empty() {
        println!(
            "All {} selected bundles are already cached.",
            selected.len()
        );
        return Ok(());
    }

    let total: u64 = missing.iter().map(|b| b.file_size).sum();
    println!(
        "Downloading {} of {} bundles ({})",
        missing.len(),
        selected.len(),
        format_size(total)
    );

    let options = DownloadOptions::from_settings(&fs.config().download);
    let mut ops: Vec<DownloadFileOperation> = missing
        .iter()
        .map(|bundle| fs.download_file_async(bundle, options.clone()))
        .collect();

    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {bytes}/{total_bytes} {bytes_per_sec} | {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let cancelled = runner.block_on(drive_all(&mut fs, &mut ops, &bar, &runner));
    bar.finish_and_clear();

    if cancelled {
        return Err(CliError::Cancelled);
    }

    let failed: Vec<_> = ops
        .iter()
        .filter(|op| op.status() == OperationStatus::Failed)
        .collect();
    println!(
        "{} {} downloaded, {} failed",
        style("Done:").green().bold(),
        ops.len() - failed.len(),
        failed.len()
    );
    for op in &failed {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            op.bundle().bundle_name,
            op.error().unwrap_or("unknown error")
        );
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::Operation {
            what: "Fetch".to_string(),
            reason: format!("{} bundles could not be downloaded", failed.len()),
        })
    }
}

/// Tick all downloads until they finish. Returns true when cancelled.
async fn drive_all(
    fs: &mut CacheFileSystem,
    ops: &mut [DownloadFileOperation],
    bar: &ProgressBar,
    runner: &OperationRunner,
) -> bool {
    let cancel = runner.cancel_token();
    let mut ticker = time::interval(DEFAULT_TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        fs.update();
        for op in ops.iter_mut() {
            op.update(fs);
        }

        let position: u64 = ops.iter().map(|op| op.downloaded_bytes()).sum();
        let done = ops.iter().filter(|op| op.is_done()).count();
        bar.set_position(position);
        bar.set_message(format!("{}/{} bundles", done, ops.len()));

        if done == ops.len() {
            return false;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                for op in ops.iter_mut() {
                    op.abort(fs);
                }
                return true;
            }
            _ = ticker.tick() => {}
        }
    }
}
