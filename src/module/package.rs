//! Package file (soli.toml) parsing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::loader::UnitLayout;
use super::resolver::ResolverConfig;
use crate::error::PackageError;

/// Name of the package file.
pub const PACKAGE_FILE: &str = "soli.toml";

/// A Solilang package configuration.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// Package description
    pub description: Option<String>,
    /// Module resolution settings from the [require] section
    pub require: RequireSettings,
    /// Dependencies: name -> path or version requirement
    pub dependencies: BTreeMap<String, Dependency>,
}

/// The [require] section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequireSettings {
    /// Private dependency folder name
    pub folder: Option<String>,
    /// Module unit file extension
    pub extension: Option<String>,
    /// External installer program
    pub installer: Option<String>,
    /// Package index URL
    pub registry: Option<String>,
}

/// A package dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Local path dependency
    Path(String),
    /// Version requirement, e.g. "1.2.0" or ">=1.2"
    Version(String),
}

impl Dependency {
    /// The argument handed to the installer for this dependency.
    pub fn install_spec(&self, name: &str) -> String {
        match self {
            Dependency::Path(path) => path.clone(),
            Dependency::Version(version) => {
                let version = version.trim();
                if version.is_empty() || version == "*" {
                    name.to_string()
                } else if version.starts_with(['=', '<', '>', '!']) {
                    format!("{}{}", name, version)
                } else {
                    format!("{}=={}", name, version)
                }
            }
        }
    }
}

impl Package {
    /// Create a new package with default values.
    pub fn new(name: &str) -> Self {
        Package {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            ..Default::default()
        }
    }

    /// Load a package from a soli.toml file.
    pub fn load(path: &Path) -> Result<Self, PackageError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a soli.toml content string.
    ///
    /// Simple TOML subset parser supporting:
    /// - [package] section with name, version, description
    /// - [require] section with folder, extension, installer, registry
    /// - [dependencies] section with name = "version" or name = { path = "..." }
    pub fn parse(content: &str) -> Result<Self, PackageError> {
        let mut package = Package::default();
        let mut current_section: Option<&str> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = &line[1..line.len() - 1];
                current_section = Some(match section.trim() {
                    "package" => "package",
                    "require" => "require",
                    "dependencies" => "dependencies",
                    other => {
                        return Err(PackageError::Parse(format!("Unknown section: {}", other)))
                    }
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(PackageError::Parse(format!("Expected key = value: {}", line)));
            };
            let key = key.trim();
            let value = value.trim();

            match current_section {
                Some("package") => {
                    let value = parse_string_value(value);
                    match key {
                        "name" => package.name = value,
                        "version" => package.version = value,
                        "description" => package.description = Some(value),
                        _ => return Err(PackageError::InvalidField(format!("package.{}", key))),
                    }
                }
                Some("require") => {
                    let value = Some(parse_string_value(value));
                    match key {
                        "folder" => package.require.folder = value,
                        "extension" => package.require.extension = value,
                        "installer" => package.require.installer = value,
                        "registry" => package.require.registry = value,
                        _ => return Err(PackageError::InvalidField(format!("require.{}", key))),
                    }
                }
                Some(_) => {
                    let dep = parse_dependency(value)?;
                    package.dependencies.insert(key.to_string(), dep);
                }
                None => {
                    return Err(PackageError::Parse(
                        "Key-value outside of section".to_string(),
                    ))
                }
            }
        }

        if package.name.is_empty() {
            return Err(PackageError::Parse(
                "Missing required field: package.name".to_string(),
            ));
        }

        Ok(package)
    }

    /// Find the soli.toml in the given directory or parent directories.
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let package_file = current.join(PACKAGE_FILE);
            if package_file.is_file() {
                return Some(package_file);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Resolver settings, falling back to defaults for unset fields.
    pub fn resolver_config(&self) -> ResolverConfig {
        let config = ResolverConfig::default();
        match &self.require.folder {
            Some(folder) => config.with_scope_folder(folder.clone()),
            None => config,
        }
    }

    pub fn unit_layout(&self) -> UnitLayout {
        self.require
            .extension
            .as_ref()
            .map(|ext| UnitLayout::new(ext.trim_start_matches('.')))
            .unwrap_or_default()
    }

    /// Installer arguments for every dependency, sorted by name.
    pub fn install_specs(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .map(|(name, dep)| dep.install_spec(name))
            .collect()
    }
}

/// Parse a TOML string value (with or without quotes).
fn parse_string_value(value: &str) -> String {
    let value = value.trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Parse a dependency value.
fn parse_dependency(value: &str) -> Result<Dependency, PackageError> {
    let value = value.trim();

    // Simple string: "1.2.0", ">=1.2" or "./path/to/dep"
    if value.starts_with('"') || value.starts_with('\'') {
        let spec = parse_string_value(value);
        if spec.starts_with('.') || spec.starts_with('/') || spec.contains('/') {
            return Ok(Dependency::Path(spec));
        }
        return Ok(Dependency::Version(spec));
    }

    // Inline table: { path = "..." } or { version = "..." }
    if value.starts_with('{') && value.ends_with('}') {
        let inner = value[1..value.len() - 1].trim();
        if let Some((key, val)) = inner.split_once('=') {
            let val = parse_string_value(val);
            return match key.trim() {
                "path" => Ok(Dependency::Path(val)),
                "version" => Ok(Dependency::Version(val)),
                other => Err(PackageError::InvalidField(format!("dependency.{}", other))),
            };
        }
    }

    Err(PackageError::Parse(format!(
        "Invalid dependency value: {}",
        value
    )))
}
