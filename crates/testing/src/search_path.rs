// Scoped module search path
//
// Entries are added through a guard and removed when the guard drops, on
// every exit path including panics. Each entry carries a token so a guard
// removes exactly the entry it added, even when the same directory was added
// more than once.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SearchPathState {
    next_token: u64,
    entries: Vec<(u64, PathBuf)>,
}

/// Ordered list of directories searched when resolving module references.
///
/// Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    state: Arc<Mutex<SearchPathState>>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entries, most recently added first
    pub fn entries(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .entries
            .iter()
            .rev()
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().entries.iter().any(|(_, p)| p == path)
    }

    fn push(&self, path: PathBuf) -> u64 {
        let mut state = self.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        state.entries.push((token, path));
        token
    }

    fn remove(&self, token: u64) {
        self.state.lock().entries.retain(|(t, _)| *t != token);
    }
}

/// Removes its entry from the search path on drop
#[must_use = "the entry is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SearchPathGuard {
    search_path: SearchPath,
    token: u64,
    path: PathBuf,
}

impl SearchPathGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SearchPathGuard {
    fn drop(&mut self) {
        self.search_path.remove(self.token);
        tracing::trace!(path = %self.path.display(), "Removed search path entry");
    }
}

/// Add `path` to the front of `search_path` for the lifetime of the guard
pub fn add_to_search_path(search_path: &SearchPath, path: impl Into<PathBuf>) -> SearchPathGuard {
    let path = path.into();
    let token = search_path.push(path.clone());
    tracing::trace!(path = %path.display(), "Added search path entry");

    SearchPathGuard {
        search_path: search_path.clone(),
        token,
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_on_drop() {
        let search_path = SearchPath::new();
        {
            let _guard = add_to_search_path(&search_path, "/docs");
            assert!(search_path.contains(Path::new("/docs")));
        }
        assert!(search_path.is_empty());
    }

    #[test]
    fn test_newest_entry_first() {
        let search_path = SearchPath::new();
        let _a = add_to_search_path(&search_path, "/a");
        let _b = add_to_search_path(&search_path, "/b");

        assert_eq!(
            search_path.entries(),
            vec![PathBuf::from("/b"), PathBuf::from("/a")]
        );
    }

    #[test]
    fn test_duplicate_entries_removed_independently() {
        let search_path = SearchPath::new();
        let outer = add_to_search_path(&search_path, "/docs");
        let inner = add_to_search_path(&search_path, "/docs");

        drop(inner);
        assert_eq!(search_path.entries(), vec![PathBuf::from("/docs")]);

        drop(outer);
        assert!(search_path.is_empty());
    }

    #[test]
    fn test_out_of_order_drop_keeps_other_entries() {
        let search_path = SearchPath::new();
        let first = add_to_search_path(&search_path, "/first");
        let second = add_to_search_path(&search_path, "/second");

        drop(first);
        assert_eq!(search_path.entries(), vec![PathBuf::from("/second")]);
        assert_eq!(second.path(), Path::new("/second"));
    }

    #[test]
    fn test_restored_after_panic() {
        let search_path = SearchPath::new();
        let shared = search_path.clone();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = add_to_search_path(&shared, "/docs");
            panic!("import failed");
        }));

        assert!(outcome.is_err());
        assert!(search_path.is_empty());
    }
}
