//! Selecting the active loader.
//!
//! A [`LoaderSlot`] holds the loader a host uses for ordinary module loads.
//! It starts out with the original loader and can be switched to the scoped
//! resolver and back. The original is fixed when the slot is built and can
//! never be replaced, so any number of enable/disable cycles ends with the
//! very same loader instance in place.

use std::env;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::caller::Requester;
use super::loader::{FileSystemLoader, LoadContext, ModuleHandle, ModuleLoader};
use super::resolver::{ResolverConfig, ScopedResolver};
use super::search_path::Environment;
use crate::error::ResolveError;

/// The active loader of a host plus the two loaders it switches between.
pub struct LoaderSlot {
    original: Arc<dyn ModuleLoader>,
    interceptor: Arc<dyn ModuleLoader>,
    active: RwLock<Arc<dyn ModuleLoader>>,
}

impl LoaderSlot {
    /// Build a slot whose active loader is `original`.
    pub fn new(original: Arc<dyn ModuleLoader>, interceptor: Arc<dyn ModuleLoader>) -> Self {
        LoaderSlot {
            active: RwLock::new(original.clone()),
            original,
            interceptor,
        }
    }

    /// Build a slot over a filesystem loader and a scoped resolver wrapping
    /// it, both sharing `env`.
    pub fn with_environment(env: Arc<Environment>, config: ResolverConfig) -> Self {
        let original: Arc<dyn ModuleLoader> = Arc::new(FileSystemLoader::new(env.clone()));
        let interceptor = Arc::new(ScopedResolver::new(original.clone(), env, config));
        LoaderSlot::new(original, interceptor)
    }

    /// Route loads through the interceptor. Idempotent.
    pub fn enable_interception(&self) {
        let mut active = self.active.write();
        if !Arc::ptr_eq(&*active, &self.interceptor) {
            *active = self.interceptor.clone();
            debug!("module interception enabled");
        }
    }

    /// Restore the original loader. Idempotent.
    pub fn disable_interception(&self) {
        let mut active = self.active.write();
        if !Arc::ptr_eq(&*active, &self.original) {
            *active = self.original.clone();
            debug!("module interception disabled");
        }
    }

    pub fn is_intercepting(&self) -> bool {
        Arc::ptr_eq(&self.active(), &self.interceptor)
    }

    /// The loader currently in effect.
    pub fn active(&self) -> Arc<dyn ModuleLoader> {
        self.active.read().clone()
    }

    pub fn original(&self) -> &Arc<dyn ModuleLoader> {
        &self.original
    }

    pub fn interceptor(&self) -> &Arc<dyn ModuleLoader> {
        &self.interceptor
    }

    /// Load `name` through the active loader on behalf of the caller.
    #[track_caller]
    pub fn load(&self, name: &str) -> Result<ModuleHandle, ResolveError> {
        self.load_from(name, Requester::caller())
    }

    pub fn load_from(
        &self,
        name: &str,
        requester: Requester,
    ) -> Result<ModuleHandle, ResolveError> {
        self.active().load(name, &LoadContext::new(requester))
    }
}

impl fmt::Debug for LoaderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderSlot")
            .field("intercepting", &self.is_intercepting())
            .finish()
    }
}

lazy_static! {
    /// Process-wide slot, built on first use from the working directory,
    /// `$SOLI_PATH` and `$SOLI_REQUIRE_FOLDER`.
    static ref GLOBAL_SLOT: LoaderSlot = {
        let config = ResolverConfig::default().with_env_overrides();
        LoaderSlot::with_environment(Arc::new(process_environment(env::current_dir())), config)
    };
}

/// Search path for the process-wide slot. An unreadable working directory
/// leaves the entry slot out instead of searching an empty path.
fn process_environment(entry: io::Result<PathBuf>) -> Environment {
    match entry {
        Ok(entry) => Environment::from_env(entry),
        Err(e) => {
            warn!(error = %e, "working directory unreadable; search path has no entry directory");
            Environment::global_only()
        }
    }
}

/// The process-wide loader slot.
pub fn global() -> &'static LoaderSlot {
    &*GLOBAL_SLOT
}

/// Make the process-wide slot route loads through the scoped resolver.
pub fn enable_interception() {
    global().enable_interception();
}

/// Restore the process-wide slot's original loader.
pub fn disable_interception() {
    global().disable_interception();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_patch_replaces_and_restores() {
        let slot = LoaderSlot::with_environment(
            Arc::new(Environment::default()),
            ResolverConfig::default(),
        );
        let original = slot.active();

        slot.enable_interception();
        assert!(!Arc::ptr_eq(&original, &slot.active()));
        assert!(slot.is_intercepting());

        slot.disable_interception();
        assert!(Arc::ptr_eq(&original, &slot.active()));
    }

    #[test]
    fn test_toggles_are_idempotent() {
        let slot = LoaderSlot::with_environment(
            Arc::new(Environment::default()),
            ResolverConfig::default(),
        );
        let original = slot.original().clone();

        slot.enable_interception();
        slot.enable_interception();
        assert!(Arc::ptr_eq(&slot.active(), slot.interceptor()));

        slot.disable_interception();
        slot.disable_interception();
        assert!(Arc::ptr_eq(&slot.active(), &original));

        for _ in 0..3 {
            slot.enable_interception();
            slot.disable_interception();
        }
        assert!(Arc::ptr_eq(slot.original(), &original));
        assert!(Arc::ptr_eq(&slot.active(), &original));
    }

    #[test]
    fn test_load_goes_through_active_loader() {
        let tmp = TempDir::new().unwrap();
        let entry = tmp.path().join("entry");
        let proj = tmp.path().join("proj");
        fs::create_dir_all(&entry).unwrap();
        fs::create_dir_all(proj.join(".soli_modules")).unwrap();
        fs::write(proj.join(".soli_modules/widget.sl"), "private").unwrap();

        let slot = LoaderSlot::with_environment(
            Arc::new(Environment::new([entry])),
            ResolverConfig::default(),
        );
        let requester = Requester::directory(&proj);

        let err = slot.load_from("widget", requester.clone()).unwrap_err();
        assert!(err.is_not_found());

        slot.enable_interception();
        let module = slot.load_from("widget", requester.clone()).unwrap();
        assert_eq!(module.source(), "private");

        slot.disable_interception();
        assert!(slot.load_from("widget", requester).is_err());
    }

    #[test]
    fn test_unreadable_working_directory_is_left_out() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        let env = process_environment(Err(missing));
        assert!(env.search_path().iter().all(|p| !p.as_os_str().is_empty()));

        let env = process_environment(Ok(PathBuf::from("/entry")));
        assert_eq!(env.search_path()[0], PathBuf::from("/entry"));
    }

    #[test]
    fn test_global_slot_keeps_its_original() {
        let original = global().original().clone();
        enable_interception();
        disable_interception();
        disable_interception();
        assert!(Arc::ptr_eq(&global().active(), &original));
    }
}
