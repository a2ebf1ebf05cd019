//! XDG-compliant path resolution for conduit.
//!
//! Provides `ConduitPaths`, the default locations of the config file and the
//! learning store, following the XDG Base Directory Specification.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(conduit::paths::no_home),
        help("Set the HOME environment variable or pass explicit paths in the config file.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(conduit::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for conduit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConduitPaths {
    /// `$XDG_CONFIG_HOME/conduit/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/conduit/`
    pub data_dir: PathBuf,
}

impl ConduitPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("conduit");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("conduit");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Create the base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// `config_dir/conduit.toml`
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("conduit.toml")
    }

    /// `data_dir/learning.redb`
    pub fn learning_store_file(&self) -> PathBuf {
        self.data_dir.join("learning.redb")
    }
}
