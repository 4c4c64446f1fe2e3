//! CLI command implementations.

pub mod clear;
pub mod common;
pub mod config;
pub mod fetch;
pub mod init;
pub mod status;
pub mod sync;
pub mod verify;
pub mod version;
