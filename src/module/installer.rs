//! Installing private dependencies.
//!
//! Units are installed by an external installer program into a directory's
//! scope folder (`<target>/.soli_modules`). This module only prepares that
//! folder, builds the installer command line and runs it; downloading and
//! unpacking is the installer's job.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::loader::UnitLayout;
use crate::error::InstallError;

/// Create `<target>/<folder>` (and missing parents). Returns its path.
pub fn make_scope_dir(target: &Path, folder: &str) -> Result<PathBuf, InstallError> {
    let dir = target.join(folder);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// An installer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    program: String,
    args: Vec<String>,
}

impl InstallCommand {
    /// Build `<installer> install --target <target>/<folder> --upgrade <deps>`.
    ///
    /// A dependency naming an existing file is passed as `-r <file>` so the
    /// installer reads requirements from it.
    pub fn build(
        installer: &str,
        target: &Path,
        folder: &str,
        dependencies: &[String],
    ) -> Result<Self, InstallError> {
        if installer.trim().is_empty() {
            return Err(InstallError::NoInstaller);
        }
        if dependencies.is_empty() {
            return Err(InstallError::NoDependencies);
        }

        let target = std::path::absolute(target)?.join(folder);
        let mut args = vec![
            "install".to_string(),
            "--target".to_string(),
            target.to_string_lossy().into_owned(),
            "--upgrade".to_string(),
        ];
        for dependency in dependencies {
            if Path::new(dependency).is_file() {
                args.push("-r".to_string());
            }
            args.push(dependency.clone());
        }

        Ok(InstallCommand {
            program: installer.to_string(),
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Run the installer, waiting for it to finish.
    pub fn run(&self) -> Result<(), InstallError> {
        info!(command = %self, "running installer");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|source| InstallError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(InstallError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

impl fmt::Display for InstallCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Unit names installed in a scope folder, sorted.
pub fn installed_units(scope_dir: &Path, layout: &UnitLayout) -> Result<Vec<String>, InstallError> {
    let mut units = Vec::new();
    for entry in fs::read_dir(scope_dir)? {
        let entry = entry?;
        if let Some(name) = layout.unit_name(&entry.path()) {
            units.push(name);
        }
    }
    units.sort();
    Ok(units)
}
