//! Scoped module resolution.
//!
//! [`ScopedResolver`] wraps a delegate [`ModuleLoader`] and gives every
//! directory of a source tree its own view of dependency names:
//!
//! 1. the requester's directory is computed from its [`Requester`] marker;
//! 2. the [`ScopedCache`] is consulted (exact directory, then nearest
//!    cached ancestor);
//! 3. on a miss the nearest private dependency folder (`.soli_modules` by
//!    default) is put on the search path for exactly one delegate load;
//! 4. a module that came out of that folder is evicted from the delegate's
//!    registry and cached for the requester instead, so ordinary loads of
//!    the same name never see the private copy. Modules found in global
//!    locations are returned as-is and left to the delegate's own caching.
//!
//! Load failures are returned exactly as the delegate produced them.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::debug;

use super::cache::ScopedCache;
use super::caller::{PathResolver, Requester, RequesterDir};
use super::loader::{LoadContext, ModuleHandle, ModuleLoader};
use super::search_path::Environment;
use crate::error::ResolveError;

/// Default name of the private dependency folder.
pub const DEFAULT_SCOPE_FOLDER: &str = ".soli_modules";

/// Environment variable overriding the scope folder name.
pub const SCOPE_FOLDER_VAR: &str = "SOLI_REQUIRE_FOLDER";

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Folder, one level inside a directory, holding its private units.
    pub scope_folder: String,
    /// Root used to anchor relative `#[track_caller]` locations.
    pub source_root: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            scope_folder: DEFAULT_SCOPE_FOLDER.to_string(),
            source_root: None,
        }
    }
}

impl ResolverConfig {
    pub fn with_scope_folder(mut self, folder: impl Into<String>) -> Self {
        self.scope_folder = folder.into();
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Apply `$SOLI_REQUIRE_FOLDER` when set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(folder) = env::var(SCOPE_FOLDER_VAR) {
            if !folder.trim().is_empty() {
                self.scope_folder = folder.trim().to_string();
            }
        }
        self
    }
}

/// A private dependency folder found for a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalScope {
    /// Directory that owns the folder.
    pub owner: RequesterDir,
    /// The folder itself, `owner/<scope_folder>`.
    pub folder: PathBuf,
}

impl LocalScope {
    /// True when `module` was read from inside this scope's folder.
    pub fn satisfied(&self, module: &ModuleHandle) -> bool {
        module.is_within(&self.folder)
    }
}

/// Loader decorator adding per-directory dependency scopes.
pub struct ScopedResolver {
    delegate: Arc<dyn ModuleLoader>,
    env: Arc<Environment>,
    paths: PathResolver,
    cache: Mutex<ScopedCache<ModuleHandle>>,
    config: ResolverConfig,
    /// Serializes resolutions across threads; reentrant for nested loads.
    serial: ReentrantMutex<()>,
}

impl ScopedResolver {
    /// Create a resolver around `delegate`.
    ///
    /// `env` must be the environment the delegate searches, otherwise scoped
    /// entries are invisible to it.
    pub fn new(
        delegate: Arc<dyn ModuleLoader>,
        env: Arc<Environment>,
        config: ResolverConfig,
    ) -> Self {
        ScopedResolver {
            delegate,
            env,
            paths: PathResolver::new(config.source_root.clone()),
            cache: Mutex::new(ScopedCache::new()),
            config,
            serial: ReentrantMutex::new(()),
        }
    }

    /// Resolve `name` for the calling source location.
    #[track_caller]
    pub fn resolve(&self, name: &str) -> Result<ModuleHandle, ResolveError> {
        self.resolve_from(name, &Requester::caller())
    }

    /// Resolve `name` for an explicit requester.
    pub fn resolve_from(
        &self,
        name: &str,
        requester: &Requester,
    ) -> Result<ModuleHandle, ResolveError> {
        let _serial = self.serial.lock();

        let dir = self.paths.caller_directory(requester)?;
        if let Some(module) = self.cache.lock().get_nearest(name, &dir) {
            debug!(module = name, requester = %dir, "scoped cache hit");
            return Ok(module);
        }

        let scope = self.find_scope(&dir);
        let ctx = LoadContext::new(Requester::from(dir.clone()));
        let module = self.env.with_optional_entry(
            scope.as_ref().map(|s| s.folder.as_path()),
            || self.delegate.load(name, &ctx),
        )?;

        match scope {
            Some(scope) if scope.satisfied(&module) => {
                self.delegate.evict(name);
                self.cache.lock().set(name, dir.clone(), module.clone());
                debug!(
                    module = name,
                    requester = %dir,
                    origin = %module.origin().display(),
                    "cached scoped module"
                );
            }
            _ => {
                debug!(
                    module = name,
                    origin = %module.origin().display(),
                    "resolved from a global location"
                );
            }
        }

        Ok(module)
    }

    /// Nearest private dependency folder at or above `dir`.
    pub fn find_scope(&self, dir: &RequesterDir) -> Option<LocalScope> {
        dir.ancestors().find_map(|candidate| {
            let folder = candidate.join(&self.config.scope_folder);
            if !folder.is_dir() {
                return None;
            }
            Some(LocalScope {
                owner: RequesterDir::new(candidate)?,
                folder,
            })
        })
    }

    /// Exact-key check against the scoped cache.
    pub fn is_cached(&self, name: &str, dir: impl AsRef<Path>) -> bool {
        RequesterDir::new(dir)
            .map(|dir| self.cache.lock().is_cached(name, &dir))
            .unwrap_or(false)
    }

    /// Forget every scoped resolution.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn delegate(&self) -> &Arc<dyn ModuleLoader> {
        &self.delegate
    }
}

impl fmt::Debug for ScopedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedResolver")
            .field("config", &self.config)
            .field("cached", &self.cached_len())
            .finish()
    }
}

impl ModuleLoader for ScopedResolver {
    fn load(&self, name: &str, ctx: &LoadContext) -> Result<ModuleHandle, ResolveError> {
        self.resolve_from(name, &ctx.requester)
    }

    fn evict(&self, name: &str) -> Option<ModuleHandle> {
        self.cache.lock().remove(name);
        self.delegate.evict(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::loader::FileSystemLoader;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use tempfile::TempDir;

    /// Delegate that counts loads and can re-enter a resolver.
    struct CountingLoader {
        inner: FileSystemLoader,
        loads: AtomicUsize,
        reenter: OnceLock<(Weak<ScopedResolver>, String)>,
    }

    impl CountingLoader {
        fn new(env: Arc<Environment>) -> Self {
            CountingLoader {
                inner: FileSystemLoader::new(env),
                loads: AtomicUsize::new(0),
                reenter: OnceLock::new(),
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModuleLoader for CountingLoader {
        fn load(&self, name: &str, ctx: &LoadContext) -> Result<ModuleHandle, ResolveError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some((resolver, nested)) = self.reenter.get() {
                if name != nested {
                    let resolver = resolver.upgrade().expect("resolver alive");
                    resolver.resolve_from(nested, &ctx.requester)?;
                }
            }
            self.inner.load(name, ctx)
        }

        fn evict(&self, name: &str) -> Option<ModuleHandle> {
            self.inner.evict(name)
        }
    }

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        env: Arc<Environment>,
        delegate: Arc<CountingLoader>,
        resolver: Arc<ScopedResolver>,
    }

    /// Layout:
    ///   <root>/entry            search path entry point
    ///   <root>/global/re.sl     globally installed unit
    ///   <root>/proj/.deps/widget.sl
    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        for dir in ["entry", "global", "proj/.deps", "proj/sub"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("global/re.sl"), "global re").unwrap();
        fs::write(root.join("proj/.deps/widget.sl"), "proj widget").unwrap();

        let env = Arc::new(Environment::new([root.join("entry"), root.join("global")]));
        let delegate = Arc::new(CountingLoader::new(env.clone()));
        let config = ResolverConfig::default().with_scope_folder(".deps");
        let resolver = Arc::new(ScopedResolver::new(delegate.clone(), env.clone(), config));

        Fixture {
            _tmp: tmp,
            root,
            env,
            delegate,
            resolver,
        }
    }

    #[test]
    fn test_require_gets_local() {
        let fx = fixture();
        let module = fx
            .resolver
            .resolve_from("widget", &Requester::file(fx.root.join("proj/app.sl")))
            .unwrap();
        assert!(module.origin().starts_with(fx.root.join("proj/.deps")));
        assert_eq!(module.source(), "proj widget");
    }

    #[test]
    fn test_sequential_resolves_share_handle() {
        let fx = fixture();
        let requester = Requester::file(fx.root.join("proj/app.sl"));

        let first = fx.resolver.resolve_from("widget", &requester).unwrap();
        let second = fx.resolver.resolve_from("widget", &requester).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fx.delegate.loads(), 1);
    }

    #[test]
    fn test_nearest_ancestor_scope_used_and_cached_for_requester() {
        let fx = fixture();
        let module = fx
            .resolver
            .resolve_from("widget", &Requester::file(fx.root.join("proj/sub/mod.sl")))
            .unwrap();

        assert!(module.origin().starts_with(fx.root.join("proj/.deps")));
        assert!(fx.resolver.is_cached("widget", fx.root.join("proj/sub")));
        // only the requester's own directory gets an entry
        assert!(!fx.resolver.is_cached("widget", fx.root.join("proj")));
        assert_eq!(fx.resolver.cached_len(), 1);

        let again = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj/sub")))
            .unwrap();
        assert!(Arc::ptr_eq(&module, &again));
        assert_eq!(fx.delegate.loads(), 1);
    }

    #[test]
    fn test_nested_private_copy_not_shadowed_by_enclosing_scope() {
        let fx = fixture();
        fs::create_dir_all(fx.root.join("proj/a")).unwrap();
        fs::create_dir_all(fx.root.join("proj/b/.deps")).unwrap();
        fs::write(fx.root.join("proj/b/.deps/widget.sl"), "b widget").unwrap();

        let outer = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj/a")))
            .unwrap();
        let inner = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj/b")))
            .unwrap();

        assert_eq!(outer.source(), "proj widget");
        assert_eq!(inner.source(), "b widget");
        assert!(inner.origin().starts_with(fx.root.join("proj/b/.deps")));
        assert!(!fx.resolver.is_cached("widget", fx.root.join("proj")));

        // a directory below `b` inherits `b`'s copy, not the enclosing one
        let below = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj/b/deep")))
            .unwrap();
        assert!(Arc::ptr_eq(&inner, &below));
        assert_eq!(fx.delegate.loads(), 2);
    }

    #[test]
    fn test_local_resolution_does_not_leak_into_plain_loads() {
        let fx = fixture();
        fx.resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj")))
            .unwrap();

        assert!(!fx.delegate.inner.registry().contains("widget"));
        let err = fx
            .delegate
            .load("widget", &LoadContext::new(Requester::directory(fx.root.join("entry"))))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_global_module_is_not_scoped_cached() {
        let fx = fixture();
        let requester = Requester::directory(fx.root.join("proj"));

        let first = fx.resolver.resolve_from("re", &requester).unwrap();
        let second = fx.resolver.resolve_from("re", &requester).unwrap();

        assert!(!first.origin().starts_with(fx.root.join("proj/.deps")));
        assert!(!fx.resolver.is_cached("re", fx.root.join("proj")));
        assert_eq!(fx.delegate.loads(), 2);
        // the delegate's own registry still hands back one instance
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_directories_get_private_copies() {
        let fx = fixture();
        fs::create_dir_all(fx.root.join("other/.deps")).unwrap();
        fs::write(fx.root.join("other/.deps/widget.sl"), "other widget").unwrap();

        let proj = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("proj")))
            .unwrap();
        let other = fx
            .resolver
            .resolve_from("widget", &Requester::directory(fx.root.join("other")))
            .unwrap();

        assert_eq!(proj.source(), "proj widget");
        assert_eq!(other.source(), "other widget");
        assert!(!Arc::ptr_eq(&proj, &other));
    }

    #[test]
    fn test_failure_propagates_and_path_restored() {
        let fx = fixture();
        let before = fx.env.search_path();

        let err = fx
            .resolver
            .resolve_from("missing", &Requester::directory(fx.root.join("proj")))
            .unwrap_err();

        assert!(matches!(err, ResolveError::NotFound { ref name } if name == "missing"));
        assert_eq!(fx.env.search_path(), before);
        assert_eq!(fx.env.scope_depth(), 0);
        assert_eq!(fx.resolver.cached_len(), 0);
    }

    #[test]
    fn test_no_scope_folder_means_no_path_change() {
        let fx = fixture();
        assert!(fx
            .resolver
            .find_scope(&RequesterDir::new(fx.root.join("entry")).unwrap())
            .is_none());

        fx.resolver
            .resolve_from("re", &Requester::directory(fx.root.join("entry")))
            .unwrap();
        assert_eq!(fx.env.len(), 2);
    }

    #[test]
    fn test_reentrant_resolution_restores_path() {
        let fx = fixture();
        fs::write(fx.root.join("proj/.deps/gadget.sl"), "gadget").unwrap();
        fx.delegate
            .reenter
            .set((Arc::downgrade(&fx.resolver), "widget".to_string()))
            .ok()
            .unwrap();
        let before = fx.env.search_path();

        let gadget = fx
            .resolver
            .resolve_from("gadget", &Requester::directory(fx.root.join("proj/sub")))
            .unwrap();

        assert_eq!(gadget.source(), "gadget");
        assert!(fx.resolver.is_cached("widget", fx.root.join("proj/sub")));
        assert!(fx.resolver.is_cached("gadget", fx.root.join("proj/sub")));
        assert_eq!(fx.env.search_path(), before);
        assert_eq!(fx.env.scope_depth(), 0);
    }

    #[test]
    fn test_resolve_uses_call_site() {
        let fx = fixture();
        let env = fx.env.clone();
        let config = ResolverConfig::default().with_source_root(env!("CARGO_MANIFEST_DIR"));
        let resolver = ScopedResolver::new(fx.delegate.clone(), env, config);

        let module = resolver.resolve("re").unwrap();
        assert_eq!(module.source(), "global re");
    }

    #[test]
    fn test_unanchored_call_site_is_fatal() {
        let fx = fixture();
        if let Requester::Location(loc) = Requester::caller() {
            if Path::new(loc.file()).is_absolute() {
                return;
            }
        }
        let err = fx.resolver.resolve("re").unwrap_err();
        assert!(matches!(err, ResolveError::CallerUnknown(_)));
        assert_eq!(fx.delegate.loads(), 0);
    }

    #[test]
    fn test_resolver_as_loader_evicts_scopes() {
        let fx = fixture();
        let ctx = LoadContext::new(Requester::directory(fx.root.join("proj")));
        let loader: &dyn ModuleLoader = fx.resolver.as_ref();

        loader.load("widget", &ctx).unwrap();
        assert!(fx.resolver.is_cached("widget", fx.root.join("proj")));

        loader.evict("widget");
        assert!(!fx.resolver.is_cached("widget", fx.root.join("proj")));
    }

    #[test]
    fn test_with_scope_folder() {
        let config = ResolverConfig::default();
        assert_eq!(config.scope_folder, DEFAULT_SCOPE_FOLDER);
        assert_eq!(
            config.with_scope_folder(".vendored").scope_folder,
            ".vendored"
        );
    }

    #[test]
    fn test_scope_folder_env_override() {
        let saved = env::var_os(SCOPE_FOLDER_VAR);

        env::set_var(SCOPE_FOLDER_VAR, " .vendored ");
        let overridden = ResolverConfig::default().with_env_overrides();
        env::set_var(SCOPE_FOLDER_VAR, "   ");
        let blank = ResolverConfig::default()
            .with_scope_folder(".deps")
            .with_env_overrides();
        env::remove_var(SCOPE_FOLDER_VAR);
        let unset = ResolverConfig::default().with_env_overrides();

        match saved {
            Some(value) => env::set_var(SCOPE_FOLDER_VAR, value),
            None => env::remove_var(SCOPE_FOLDER_VAR),
        }

        assert_eq!(overridden.scope_folder, ".vendored");
        assert_eq!(blank.scope_folder, ".deps");
        assert_eq!(unset.scope_folder, DEFAULT_SCOPE_FOLDER);
    }
}
