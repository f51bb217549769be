//! Command-line interface parsing for catalog-cache
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the settings the binary builds its cache coordinator from.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{CacheOptions, FileStore, DEFAULT_CACHE_TIMEOUT_SECS};
use crate::catalog::{EntityKind, InvalidEntityKind};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified kind is not recognized
    #[error(transparent)]
    InvalidKind(#[from] InvalidEntityKind),

    /// The cache timeout is not a positive number of seconds
    #[error("Invalid cache timeout: {0}. Must be a positive number of seconds")]
    InvalidTimeout(u64),
}

/// Fetch catalog entities through a persistent read-through cache
#[derive(Parser, Debug)]
#[command(name = "catalog-cache")]
#[command(about = "Fetch catalog entities through a persistent read-through cache")]
#[command(version)]
pub struct Cli {
    /// Entity kind: product, page or collection
    pub kind: String,

    /// Handle of the entity within its kind
    pub handle: String,

    /// Base URL of the catalog API
    #[arg(long, value_name = "URL")]
    pub base_url: String,

    /// Seconds a cached entity stays fresh
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_CACHE_TIMEOUT_SECS)]
    pub cache_timeout: u64,

    /// Directory for the persisted cache (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_persist: bool,

    /// Log cache activity to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where the cache snapshot is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// In-memory only
    Disabled,
    /// The platform's XDG cache directory
    DefaultDir,
    /// A directory given on the command line
    Dir(PathBuf),
}

/// Settings derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    pub kind: EntityKind,
    pub handle: String,
    pub base_url: String,
    pub options: CacheOptions,
    pub persistence: Persistence,
}

/// Parses a kind argument into an EntityKind.
///
/// # Returns
/// * `Ok(EntityKind)` if the string names a registered kind
/// * `Err(CliError::InvalidKind)` otherwise
pub fn parse_kind_arg(s: &str) -> Result<EntityKind, CliError> {
    Ok(s.parse::<EntityKind>()?)
}

impl Settings {
    /// Creates Settings from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Settings)` with validated kind and options
    /// * `Err(CliError)` if the kind or timeout is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let kind = parse_kind_arg(&cli.kind)?;
        let options = CacheOptions::new(cli.cache_timeout)
            .map_err(|_| CliError::InvalidTimeout(cli.cache_timeout))?;
        let persistence = match (&cli.cache_dir, cli.no_persist) {
            (_, true) => Persistence::Disabled,
            (Some(dir), false) => Persistence::Dir(dir.clone()),
            (None, false) => Persistence::DefaultDir,
        };

        Ok(Settings {
            kind,
            handle: cli.handle.clone(),
            base_url: cli.base_url.clone(),
            options,
            persistence,
        })
    }

    /// File store for the configured persistence, if any
    ///
    /// Returns `None` when persistence is disabled or when no default cache
    /// directory can be determined.
    pub fn file_store(&self) -> Option<FileStore> {
        match &self.persistence {
            Persistence::Disabled => None,
            Persistence::DefaultDir => FileStore::new(),
            Persistence::Dir(dir) => Some(FileStore::with_dir(dir.clone())),
        }
    }
}
