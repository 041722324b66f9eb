//! Error types for module resolution, configuration and installation.

use std::path::PathBuf;
use thiserror::Error;

/// Resolution errors.
///
/// A failed scoped resolution surfaces exactly the delegate loader's error;
/// the resolver never wraps or replaces it.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid module name '{name}'")]
    InvalidName { name: String },

    #[error("Failed to load {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot determine the requesting location: {0}")]
    CallerUnknown(String),
}

impl ResolveError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn caller_unknown(reason: impl Into<String>) -> Self {
        Self::CallerUnknown(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Manifest (soli.toml) errors.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),
}

/// Requirement string errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequirementError {
    #[error("Requirement is empty")]
    Empty,

    #[error("Requirement '{0}' has no package name")]
    MissingName(String),

    #[error("Requirement '{0}' has a comparison but no version")]
    MissingVersion(String),
}

/// Installer errors.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Must install at least one dependency")]
    NoDependencies,

    #[error("No installer configured (set [require] installer in soli.toml or pass --installer)")]
    NoInstaller,

    #[error("Failed to run installer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Installer '{program}' exited with {status}")]
    Failed { program: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
