//! Sync command - fetch the remote version and its manifest.

use bundlecache::Operation;

use super::common::{format_size, CliContext, OperationRunner};
use crate::error::CliError;

pub fn run(package: Option<String>, version: Option<String>) -> Result<(), CliError> {
    let ctx = CliContext::new(package);
    let runner = OperationRunner::new()?;
    let mut fs = ctx.open_file_system()?;
    let timeout = ctx.config().request_timeout();

    let version = match version {
        Some(version) => version,
        None => {
            let mut op = fs.request_package_version(true, timeout);
            runner.run(&mut fs, &mut op, "Version request")?;
            let version = op.package_version().map(str::to_string).ok_or_else(|| {
                CliError::Operation {
                    what: "Version request".to_string(),
                    reason: op.error().unwrap_or("no version returned").to_string(),
                }
            })?;
            println!("Remote version: {}", version);
            version
        }
    };

    let manifest = runner.load_manifest(&mut fs, &version, ctx.config())?;

    println!("Package:  {}", manifest.package_name);
    println!("Version:  {}", manifest.package_version);
    println!(
        "Bundles:  {} ({})",
        manifest.bundles.len(),
        format_size(manifest.total_size())
    );
    println!(
        "Manifest: {}",
        fs.layout().manifest_path(&version).display()
    );
    Ok(())
}
