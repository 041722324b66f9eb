//! Ordered module search path with scoped, reversible insertions.
//!
//! The search path is an owned [`Environment`] shared by `Arc` between the
//! loader that reads it and the resolver that temporarily extends it. A
//! [`SearchPathScope`] inserts one entry at [`RESERVED_INDEX`] and removes
//! the element at that same index when dropped, so the entry is gone on
//! every exit path: normal return, `Err`, or unwinding panic.

use std::env;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Index at which scoped entries are inserted.
///
/// Index 0 belongs to the entry point's own directory and is never touched.
pub const RESERVED_INDEX: usize = 1;

/// Environment variable listing extra global search roots.
pub const SEARCH_PATH_VAR: &str = "SOLI_PATH";

/// An entry currently inserted by a live [`SearchPathScope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveScope {
    pub index: usize,
    pub entry: PathBuf,
}

/// Search path state shared by a loader and a resolver.
#[derive(Debug, Default)]
pub struct Environment {
    paths: Mutex<Vec<PathBuf>>,
    scopes: Mutex<Vec<ActiveScope>>,
}

impl Environment {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Environment {
            paths: Mutex::new(paths.into_iter().map(Into::into).collect()),
            scopes: Mutex::new(Vec::new()),
        }
    }

    /// Build the search path for a process whose entry point lives in
    /// `entry_dir`: the entry directory, every root listed in `$SOLI_PATH`,
    /// then the user-wide module directory (`~/.soli/modules`).
    pub fn from_env(entry_dir: impl Into<PathBuf>) -> Self {
        let mut paths = vec![entry_dir.into()];
        paths.extend(global_roots());
        Environment::new(paths)
    }

    /// Like [`from_env`](Self::from_env) for a process with no known entry
    /// directory. The first global root then sits at index 0.
    pub fn global_only() -> Self {
        Environment::new(global_roots())
    }

    /// Snapshot of the current search path.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    /// Append a root at the end of the search path.
    pub fn push(&self, path: impl Into<PathBuf>) {
        self.paths.lock().push(path.into());
    }

    /// Insert a root at `index` (clamped to the current length).
    pub fn insert(&self, index: usize, path: impl Into<PathBuf>) {
        let mut paths = self.paths.lock();
        let index = index.min(paths.len());
        paths.insert(index, path.into());
    }

    /// Remove the root at `index`, if any.
    pub fn remove(&self, index: usize) -> Option<PathBuf> {
        let mut paths = self.paths.lock();
        (index < paths.len()).then(|| paths.remove(index))
    }

    /// Number of scopes currently open.
    pub fn scope_depth(&self) -> usize {
        self.scopes.lock().len()
    }

    /// Open scopes, outermost first.
    pub fn active_scopes(&self) -> Vec<ActiveScope> {
        self.scopes.lock().clone()
    }

    /// Run `action` with `entry` inserted at [`RESERVED_INDEX`].
    ///
    /// The entry is removed before this returns, whatever `action` does. The
    /// value (or panic) produced by `action` is passed through untouched.
    pub fn with_entry<R>(&self, entry: impl Into<PathBuf>, action: impl FnOnce() -> R) -> R {
        let _scope = SearchPathScope::enter(self, entry);
        action()
    }

    /// Like [`with_entry`](Self::with_entry), but runs `action` without any
    /// mutation when there is no entry.
    pub fn with_optional_entry<R>(&self, entry: Option<&Path>, action: impl FnOnce() -> R) -> R {
        match entry {
            Some(entry) => self.with_entry(entry, action),
            None => action(),
        }
    }
}

/// Roots listed in `$SOLI_PATH` (empty entries dropped), then `~/.soli/modules`.
fn global_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(extra) = env::var_os(SEARCH_PATH_VAR) {
        roots.extend(env::split_paths(&extra).filter(|p| !p.as_os_str().is_empty()));
    }
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".soli").join("modules"));
    }
    roots
}

/// Guard for one scoped search-path entry.
#[derive(Debug)]
pub struct SearchPathScope<'a> {
    env: &'a Environment,
    index: usize,
    entry: PathBuf,
}

impl<'a> SearchPathScope<'a> {
    /// Insert `entry` and return the guard that will remove it.
    pub fn enter(env: &'a Environment, entry: impl Into<PathBuf>) -> Self {
        let entry = entry.into();
        let index = {
            let mut paths = env.paths.lock();
            let index = RESERVED_INDEX.min(paths.len());
            paths.insert(index, entry.clone());
            index
        };
        env.scopes.lock().push(ActiveScope {
            index,
            entry: entry.clone(),
        });
        debug!(entry = %entry.display(), index, "entered search path scope");

        SearchPathScope { env, index, entry }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }
}

impl Drop for SearchPathScope<'_> {
    fn drop(&mut self) {
        {
            let mut paths = self.env.paths.lock();
            if self.index < paths.len() {
                let removed = paths.remove(self.index);
                if removed != self.entry {
                    warn!(
                        expected = %self.entry.display(),
                        removed = %removed.display(),
                        index = self.index,
                        "search path was reordered inside a scope"
                    );
                }
            } else {
                warn!(
                    entry = %self.entry.display(),
                    index = self.index,
                    "search path shrank inside a scope; nothing to remove"
                );
            }
        }

        let mut scopes = self.env.scopes.lock();
        match scopes.pop() {
            Some(top) if top.entry == self.entry && top.index == self.index => {}
            other => warn!(?other, entry = %self.entry.display(), "scopes closed out of order"),
        }
        debug!(entry = %self.entry.display(), "left search path scope");
    }
}
