//! Version command.

use crate::error::CliError;

pub fn run() -> Result<(), CliError> {
    println!("bundlecache {}", bundlecache::VERSION);
    Ok(())
}
