//! Requester-aware module cache.
//!
//! The delegate loader keeps one module per name. This cache adds the
//! requesting directory as a secondary key so that the same name can map to
//! different private copies in different parts of a source tree. Lookups
//! that miss the exact directory fall back to the nearest cached ancestor,
//! which mirrors how a nested directory inherits its enclosing scope's
//! dependencies.

use std::collections::HashMap;

use super::caller::RequesterDir;

/// Cache keyed by `(name, requester directory)`.
#[derive(Debug, Clone)]
pub struct ScopedCache<H> {
    entries: HashMap<String, HashMap<RequesterDir, H>>,
}

impl<H> Default for ScopedCache<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H: Clone> ScopedCache<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a handle, replacing any existing one for the same key.
    pub fn set(&mut self, name: &str, dir: RequesterDir, handle: H) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .insert(dir, handle);
    }

    /// Exact-key existence check. No ancestor fallback.
    pub fn is_cached(&self, name: &str, dir: &RequesterDir) -> bool {
        self.entries
            .get(name)
            .map(|scopes| scopes.contains_key(dir))
            .unwrap_or(false)
    }

    /// Exact-key lookup.
    pub fn get(&self, name: &str, dir: &RequesterDir) -> Option<H> {
        self.entries.get(name)?.get(dir).cloned()
    }

    /// Lookup with nearest-ancestor fallback.
    ///
    /// When `dir` itself has no entry, the most specific cached ancestor of
    /// `dir` is returned and memoized under `(name, dir)`. A miss is never
    /// memoized, so a later [`set`](Self::set) closer to `dir` still wins.
    pub fn get_nearest(&mut self, name: &str, dir: &RequesterDir) -> Option<H> {
        let scopes = self.entries.get_mut(name)?;
        if let Some(handle) = scopes.get(dir) {
            return Some(handle.clone());
        }

        let handle = scopes
            .iter()
            .filter(|(cached, _)| cached.is_ancestor_of(dir))
            .max_by_key(|(cached, _)| cached.specificity())
            .map(|(_, handle)| handle.clone())?;

        scopes.insert(dir.clone(), handle.clone());
        Some(handle)
    }

    /// Drop every scope of `name`. Returns true when anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Directories with a cached entry for `name`, sorted.
    pub fn scopes(&self, name: &str) -> Vec<&RequesterDir> {
        let mut dirs: Vec<_> = self
            .entries
            .get(name)
            .map(|scopes| scopes.keys().collect())
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of `(name, dir)` entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dir(path: &str) -> RequesterDir {
        RequesterDir::new(path).unwrap()
    }

    #[test]
    fn test_set_allows_get_with_same_path() {
        let mut cache = ScopedCache::new();
        let module = Arc::new("test");
        cache.set("test", dir("/some/path/to/test"), module.clone());

        let found = cache.get("test", &dir("/some/path/to/test")).unwrap();
        assert!(Arc::ptr_eq(&found, &module));
    }

    #[test]
    fn test_set_prevents_get_with_different_path() {
        let mut cache = ScopedCache::new();
        cache.set("test", dir("/some/path/to/test"), Arc::new("test"));

        assert!(cache.get("test", &dir("/some/path/to/test/notsame")).is_none());
    }

    #[test]
    fn test_cached_is_false_before_set() {
        let cache: ScopedCache<Arc<&str>> = ScopedCache::new();
        assert!(!cache.is_cached("test", &dir("/some/path/to/test")));
    }

    #[test]
    fn test_cached_is_true_after_set() {
        let mut cache = ScopedCache::new();
        cache.set("test", dir("/some/path/to/test"), Arc::new("test"));
        assert!(cache.is_cached("test", &dir("/some/path/to/test")));
    }

    #[test]
    fn test_set_overwrites() {
        let mut cache = ScopedCache::new();
        cache.set("test", dir("/p"), 1);
        cache.set("test", dir("/p"), 2);
        assert_eq!(cache.get("test", &dir("/p")), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_nearest_returns_parent_cache_if_found() {
        let mut cache = ScopedCache::new();
        let module = Arc::new("test");
        cache.set("test", dir("/some/path/to/test"), module.clone());

        let child = dir("/some/path/to/test/notsame");
        let found = cache.get_nearest("test", &child).unwrap();
        assert!(Arc::ptr_eq(&found, &module));

        // memoized under the exact key
        assert!(cache.is_cached("test", &child));
        let again = cache.get("test", &child).unwrap();
        assert!(Arc::ptr_eq(&again, &module));
    }

    #[test]
    fn test_get_nearest_not_returns_child_cache_if_found() {
        let mut cache = ScopedCache::new();
        cache.set("test", dir("/some/path/to/test/some/child"), Arc::new("child"));

        assert!(cache.get_nearest("test", &dir("/some/path/to/test")).is_none());
        assert!(!cache.is_cached("test", &dir("/some/path/to/test")));
    }

    #[test]
    fn test_get_nearest_prefers_most_specific_ancestor() {
        let mut cache = ScopedCache::new();
        cache.set("widget", dir("/proj"), "outer");
        cache.set("widget", dir("/proj/lib"), "inner");

        assert_eq!(
            cache.get_nearest("widget", &dir("/proj/lib/deep/er")),
            Some("inner")
        );
        assert_eq!(cache.get_nearest("widget", &dir("/proj/app")), Some("outer"));
    }

    #[test]
    fn test_get_nearest_ignores_sibling_prefix() {
        let mut cache = ScopedCache::new();
        cache.set("widget", dir("/proj/lib"), "lib");

        assert_eq!(cache.get_nearest("widget", &dir("/proj/library")), None);
    }

    #[test]
    fn test_miss_is_not_memoized() {
        let mut cache = ScopedCache::new();
        cache.set("widget", dir("/other"), "other");

        let requester = dir("/proj/sub");
        assert_eq!(cache.get_nearest("widget", &requester), None);

        cache.set("widget", dir("/proj"), "proj");
        assert_eq!(cache.get_nearest("widget", &requester), Some("proj"));
    }

    #[test]
    fn test_later_specific_set_takes_precedence_over_memo() {
        let mut cache = ScopedCache::new();
        cache.set("widget", dir("/proj"), "proj");
        assert_eq!(cache.get_nearest("widget", &dir("/proj/a/b")), Some("proj"));

        cache.set("widget", dir("/proj/a/b"), "specific");
        assert_eq!(
            cache.get_nearest("widget", &dir("/proj/a/b")),
            Some("specific")
        );
    }

    #[test]
    fn test_names_are_isolated() {
        let mut cache = ScopedCache::new();
        cache.set("a", dir("/proj"), 1);

        assert_eq!(cache.get_nearest("b", &dir("/proj/sub")), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = ScopedCache::new();
        cache.set("a", dir("/x"), 1);
        cache.set("a", dir("/y"), 2);
        cache.set("b", dir("/x"), 3);
        assert_eq!(cache.scopes("a"), vec![&dir("/x"), &dir("/y")]);

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
