//! # Awful Support (library root)
//!
//! Retrieval-augmented customer-support answering over a local SQLite store:
//! - Dataset ingestion and entity extraction (`ingest`).
//! - Embedding and vector distance (`vector_store`), persisted rows (`store`,
//!   `models`, `schema`).
//! - Nearest-neighbour retrieval (`retriever`) and the entity co-occurrence
//!   graph (`graph`).
//! - Prompt assembly and completion (`context`, `template`, `api`).
//! - CLI parsing, configuration and terminal output (`commands`, `config`,
//!   `pretty`).
//!
//! ## Configuration directory
//! `config.yaml` and prompt templates live under the per-platform directory
//! returned by [`config_dir`], e.g.:
//!
//! - macOS: `~/Library/Application Support/com.awful-sec.asb`
//! - Linux (XDG): `~/.config/asb`
//! - Windows: `C:\Users\<you>\AppData\Roaming\awful-sec\asb\config`

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod api;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod pretty;
pub mod retriever;
pub mod schema;
pub mod store;
pub mod template;
pub mod vector_store;

#[cfg(test)]
mod test_support;

/// Return the per-platform configuration directory used by `asb`.
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined
/// (which is rare but possible in heavily sandboxed environments).
///
/// # Examples
/// ```rust
/// if let Ok(cfg) = awful_support::config_dir() {
///     println!("config at {}", cfg.display());
/// }
/// ```
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "awful-sec", "asb")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
