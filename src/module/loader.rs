//! Module loading strategies.
//!
//! A [`ModuleLoader`] turns a dependency name into a [`ModuleHandle`]. The
//! crate ships two implementations, selected explicitly by the host:
//!
//! - [`FileSystemLoader`]: searches the roots of an [`Environment`] in
//!   order and keeps one module per name in its [`ModuleRegistry`].
//! - [`ScopedResolver`](super::ScopedResolver): a decorator around any
//!   loader that adds per-directory private dependencies.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::caller::Requester;
use super::search_path::Environment;
use crate::error::ResolveError;

/// Default file extension of module units.
pub const DEFAULT_EXTENSION: &str = "sl";

/// File stems that mark a directory as a package unit.
const INDEX_STEMS: [&str; 2] = ["index", "mod"];

/// Shared handle to a loaded module. Identity is `Arc::ptr_eq`.
pub type ModuleHandle = Arc<Module>;

/// Whether a unit was a single file or a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    File,
    Package,
}

/// A loaded module unit.
#[derive(Debug)]
pub struct Module {
    name: String,
    origin: PathBuf,
    kind: UnitKind,
    source: String,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<PathBuf>,
        kind: UnitKind,
        source: impl Into<String>,
    ) -> Self {
        Module {
            name: name.into(),
            origin: origin.into(),
            kind,
            source: source.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the file the module was read from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the module was read from somewhere inside `dir`.
    pub fn is_within(&self, dir: &Path) -> bool {
        self.origin.starts_with(dir)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}' from '{}'>", self.name, self.origin.display())
    }
}

/// Per-request information handed to a loader.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub requester: Requester,
}

impl LoadContext {
    pub fn new(requester: Requester) -> Self {
        LoadContext { requester }
    }

    /// Context whose requester is the caller's source location.
    #[track_caller]
    pub fn caller() -> Self {
        LoadContext::new(Requester::caller())
    }
}

/// Strategy for loading modules by name.
pub trait ModuleLoader: Send + Sync {
    /// Load `name`, failing with the loader's own error when it cannot.
    fn load(&self, name: &str, ctx: &LoadContext) -> Result<ModuleHandle, ResolveError>;

    /// Forget any registration of `name` so later loads do not see it.
    fn evict(&self, _name: &str) -> Option<ModuleHandle> {
        None
    }
}

/// Name → module table of a loader, shared by every requester.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, ModuleHandle>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.read().get(name).cloned()
    }

    pub fn insert(&self, module: ModuleHandle) -> Option<ModuleHandle> {
        self.modules.write().insert(module.name().to_string(), module)
    }

    pub fn remove(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How module units are laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitLayout {
    /// Extension of unit files, without the dot.
    pub extension: String,
}

impl Default for UnitLayout {
    fn default() -> Self {
        UnitLayout {
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl UnitLayout {
    pub fn new(extension: impl Into<String>) -> Self {
        UnitLayout {
            extension: extension.into(),
        }
    }

    /// Candidate files for `segments` under `root`, in lookup order:
    /// `a/b.sl`, `a/b/index.sl`, `a/b/mod.sl`.
    pub fn candidates(&self, root: &Path, segments: &[&str]) -> Vec<(PathBuf, UnitKind)> {
        let Some((last, rest)) = segments.split_last() else {
            return Vec::new();
        };
        let base = rest.iter().fold(root.to_path_buf(), |acc, s| acc.join(s));

        let mut candidates = vec![(
            base.join(format!("{}.{}", last, self.extension)),
            UnitKind::File,
        )];
        for stem in INDEX_STEMS {
            candidates.push((
                base.join(last).join(format!("{}.{}", stem, self.extension)),
                UnitKind::Package,
            ));
        }
        candidates
    }

    /// Unit name for a directory entry, if the entry is a unit.
    pub fn unit_name(&self, entry: &Path) -> Option<String> {
        let file_name = entry.file_name()?.to_str()?;
        if entry.is_dir() {
            let is_package = INDEX_STEMS
                .iter()
                .any(|stem| entry.join(format!("{}.{}", stem, self.extension)).is_file());
            return is_package.then(|| file_name.to_string());
        }
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

/// Split a dotted module name into path segments.
pub fn name_segments(name: &str) -> Result<Vec<&str>, ResolveError> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(ResolveError::invalid_name(name));
    }
    let segments: Vec<&str> = name.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ResolveError::invalid_name(name));
    }
    Ok(segments)
}

/// Default loader: searches the roots of an [`Environment`] in order.
///
/// Loaded modules are registered by name, so repeated loads of the same
/// name return the same handle no matter who asks, until evicted.
pub struct FileSystemLoader {
    env: Arc<Environment>,
    layout: UnitLayout,
    registry: ModuleRegistry,
}

impl FileSystemLoader {
    pub fn new(env: Arc<Environment>) -> Self {
        Self::with_layout(env, UnitLayout::default())
    }

    pub fn with_layout(env: Arc<Environment>, layout: UnitLayout) -> Self {
        FileSystemLoader {
            env,
            layout,
            registry: ModuleRegistry::new(),
        }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn layout(&self) -> &UnitLayout {
        &self.layout
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Locate `name` on the current search path without reading it.
    pub fn find(&self, name: &str) -> Result<Option<(PathBuf, UnitKind)>, ResolveError> {
        let segments = name_segments(name)?;
        for root in self.env.search_path() {
            for (candidate, kind) in self.layout.candidates(&root, &segments) {
                if candidate.is_file() {
                    return Ok(Some((candidate, kind)));
                }
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for FileSystemLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemLoader")
            .field("layout", &self.layout)
            .field("registered", &self.registry.len())
            .finish()
    }
}

impl ModuleLoader for FileSystemLoader {
    fn load(&self, name: &str, _ctx: &LoadContext) -> Result<ModuleHandle, ResolveError> {
        if let Some(module) = self.registry.get(name) {
            return Ok(module);
        }

        let (path, kind) = self.find(name)?.ok_or_else(|| ResolveError::not_found(name))?;
        let source = fs::read_to_string(&path).map_err(|e| ResolveError::io(&path, e))?;
        debug!(module = name, origin = %path.display(), "loaded module");

        let module = Arc::new(Module::new(name, path, kind, source));
        self.registry.insert(module.clone());
        Ok(module)
    }

    fn evict(&self, name: &str) -> Option<ModuleHandle> {
        self.registry.remove(name)
    }
}
