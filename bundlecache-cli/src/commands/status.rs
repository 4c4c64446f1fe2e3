//! Status command - summarize the local cache.

use bundlecache::config::config_file_path;

use super::common::{format_size, CliContext, OperationRunner};
use crate::error::CliError;

pub fn run(package: Option<String>) -> Result<(), CliError> {
    let ctx = CliContext::new(package);
    let runner = OperationRunner::new()?;
    let mut fs = ctx.open_offline_file_system()?;

    runner.initialize(&mut fs)?;

    let cached_bytes: u64 = fs
        .store()
        .index()
        .iter()
        .map(|record| record.data_file_size)
        .sum();
    let layout = fs.layout();

    println!("bundlecache v{}", bundlecache::VERSION);
    println!("==================");
    println!();
    println!("Config:     {}", config_file_path().display());
    println!("Package:    {}", ctx.package());
    println!("Cache root: {}", layout.package_root().display());
    println!(
        "Remote:     {}",
        ctx.config()
            .remote
            .main_url
            .as_deref()
            .unwrap_or("(not set)")
    );
    println!();
    println!(
        "Cached bundles: {} ({})",
        fs.file_count(),
        format_size(cached_bytes)
    );
    println!("Verify level:   {}", fs.config().verify_level);
    Ok(())
}
