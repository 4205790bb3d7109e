//! Subcommand implementations.

pub mod config;
pub mod info;
pub mod process;
pub mod serve;

use std::path::PathBuf;

/// Expand `~` and environment variables in a path argument.
pub(crate) fn expand_path(path: &std::path::Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
