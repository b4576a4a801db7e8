use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Entries {
    exists: HashMap<String, bool>,
    globs: HashMap<String, Vec<String>>,
}

/// Memoised `exists`/`glob` answers for one filesystem handle. Disabled
/// caches always recompute.
#[derive(Debug, Default)]
pub struct ListingsCache {
    enabled: bool,
    entries: Mutex<Entries>,
}

impl ListingsCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn exists<E>(
        &self,
        path: &str,
        compute: impl FnOnce() -> Result<bool, E>,
    ) -> Result<bool, E> {
        if !self.enabled {
            return compute();
        }
        if let Some(&hit) = self.entries().exists.get(path) {
            return Ok(hit);
        }
        let value = compute()?;
        self.entries().exists.insert(path.to_string(), value);
        Ok(value)
    }

    pub fn glob<E>(
        &self,
        pattern: &str,
        compute: impl FnOnce() -> Result<Vec<String>, E>,
    ) -> Result<Vec<String>, E> {
        if !self.enabled {
            return compute();
        }
        if let Some(hit) = self.entries().globs.get(pattern) {
            return Ok(hit.clone());
        }
        let value = compute()?;
        self.entries()
            .globs
            .insert(pattern.to_string(), value.clone());
        Ok(value)
    }

    /// Forgets `path`, everything below it and every ancestor of it.
    pub fn invalidate(&self, path: &str) {
        let path = path.trim_end_matches('/');
        let mut entries = self.entries();
        entries.exists.retain(|key, _| !related(key, path));
        entries.globs.retain(|pattern, _| {
            let literal = literal_prefix(pattern).trim_end_matches('/');
            !(related(pattern, path) || is_within(path, literal) || literal == path)
        });
    }

    pub fn clear(&self) {
        let mut entries = self.entries();
        entries.exists.clear();
        entries.globs.clear();
    }
}

fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn related(key: &str, path: &str) -> bool {
    key == path || is_within(key, path) || is_within(path, key)
}

fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}
