pub mod listings_cache;
pub mod local;
pub mod memory;
pub mod registry;

pub use listings_cache::ListingsCache;
pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;
pub use registry::{FileSystemFactory, FileSystemRegistry};

use crate::utils::error::{DatasetError, Result};
use regex::Regex;

pub(crate) fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    expr
}

/// Compiles a glob pattern where `*` and `?` never cross a `/`.
pub(crate) fn glob_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&wildcard_to_regex(pattern)).map_err(|e| DatasetError::InvalidConfigValue {
        field: "glob".to_string(),
        value: pattern.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn join_posix(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_regex_stays_within_segment() {
        let re = glob_regex("/data/x.fits/*/x.fits").unwrap();
        assert!(re.is_match("/data/x.fits/2024-01-01T00.00.00.000Z/x.fits"));
        assert!(!re.is_match("/data/x.fits/a/b/x.fits"));
        assert!(!re.is_match("/data/xxfits/v1/x.fits"));

        let re = glob_regex("/data/v?.fits").unwrap();
        assert!(re.is_match("/data/v1.fits"));
        assert!(!re.is_match("/data/v10.fits"));
    }

    #[test]
    fn test_join_posix() {
        assert_eq!(join_posix("", "a"), "a");
        assert_eq!(join_posix("/", "a"), "/a");
        assert_eq!(join_posix("/data", "a"), "/data/a");
    }
}
