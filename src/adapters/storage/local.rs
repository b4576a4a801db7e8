use crate::adapters::storage::{glob_regex, has_wildcard, join_posix, ListingsCache};
use crate::config::args::{reject_unknown_args, FileSystemOptions, OpenArgs, OpenMode};
use crate::domain::ports::FileSystem;
use crate::utils::error::{DatasetError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use walkdir::WalkDir;

/// Local disk. Parent directories are created on write when `auto_mkdir`
/// is set.
#[derive(Debug)]
pub struct LocalFileSystem {
    auto_mkdir: bool,
    listings: ListingsCache,
}

impl LocalFileSystem {
    pub fn new(options: &FileSystemOptions) -> Self {
        Self {
            auto_mkdir: options.auto_mkdir.unwrap_or(false),
            listings: ListingsCache::new(options.use_listings_cache.unwrap_or(false)),
        }
    }

    pub fn auto_mkdir(&self) -> bool {
        self.auto_mkdir
    }

    /// Walks from the longest literal prefix of `pattern`, exactly as deep
    /// as the wildcard segments that follow it.
    fn expand_glob(&self, pattern: &str) -> Result<Vec<String>> {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let literal = segments.iter().take_while(|s| !has_wildcard(s)).count();
        let root = segments[..literal].iter().fold(
            if pattern.starts_with('/') { "/".to_string() } else { String::new() },
            |base, segment| join_posix(&base, segment),
        );

        if literal == segments.len() {
            return Ok(if Path::new(&root).try_exists()? { vec![root] } else { Vec::new() });
        }

        let start = if root.is_empty() { "." } else { root.as_str() };
        if !Path::new(start).is_dir() {
            return Ok(Vec::new());
        }

        let matcher = glob_regex(&segments[literal..].join("/"))?;
        let depth = segments.len() - literal;
        let mut matches = Vec::new();
        for entry in WalkDir::new(start)
            .min_depth(depth)
            .max_depth(depth)
            .follow_links(true)
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().is_some_and(|io| io.kind() == ErrorKind::NotFound) => continue,
                Err(e) => return Err(std::io::Error::from(e).into()),
            };
            let Ok(relative) = entry.path().strip_prefix(start) else {
                continue;
            };
            let relative = relative.to_string_lossy();
            if matcher.is_match(&relative) {
                matches.push(join_posix(&root, &relative));
            }
        }
        matches.sort();
        Ok(matches)
    }
}

impl FileSystem for LocalFileSystem {
    fn protocol(&self) -> &str {
        "file"
    }

    fn open_read(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Read + Send>> {
        args.read_mode()?;
        tracing::debug!("Opening {} for reading", path);
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Write + Send>> {
        let mode = args.write_mode()?;
        if self.auto_mkdir {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        match mode {
            OpenMode::WriteBinary => options.write(true).create(true).truncate(true),
            OpenMode::CreateNew => options.write(true).create_new(true),
            OpenMode::AppendBinary => options.append(true).create(true),
            OpenMode::ReadBinary => {
                return Err(DatasetError::config("cannot open a write stream in 'rb' mode"))
            }
        };

        tracing::debug!("Opening {} for writing (mode {})", path, mode);
        let file = options.open(path)?;
        self.listings.invalidate(path);
        Ok(Box::new(BufWriter::new(file)))
    }

    fn check_open_args(&self, field: &str, args: &OpenArgs) -> Result<()> {
        reject_unknown_args(field, &args.extra)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.listings
            .exists(path, || Path::new(path).try_exists().map_err(Into::into))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        self.listings.glob(pattern, || self.expand_glob(pattern))
    }

    fn invalidate_cache(&self, path: &str) {
        tracing::debug!("Invalidating listings cache for {}", path);
        self.listings.invalidate(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(auto_mkdir: bool, cache: bool) -> FileSystemOptions {
        FileSystemOptions {
            auto_mkdir: Some(auto_mkdir),
            use_listings_cache: Some(cache),
            ..Default::default()
        }
    }

    fn write(fs: &LocalFileSystem, path: &str, mode: OpenMode, bytes: &[u8]) -> Result<()> {
        let mut stream = fs.open_write(path, &OpenArgs::with_mode(mode))?;
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    #[test]
    fn test_write_read_round_trip_with_auto_mkdir() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(true, false));
        let path = format!("{}/nested/deeper/x.bin", dir.path().display());

        assert!(!fs.exists(&path).unwrap());
        write(&fs, &path, OpenMode::WriteBinary, b"hello").unwrap();
        assert!(fs.exists(&path).unwrap());

        let mut buf = Vec::new();
        fs.open_read(&path, &OpenArgs::default())
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn test_missing_parent_without_auto_mkdir_fails() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(false, false));
        let path = format!("{}/missing/x.bin", dir.path().display());
        assert!(write(&fs, &path, OpenMode::WriteBinary, b"x").is_err());
    }

    #[test]
    fn test_create_new_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(true, false));
        let path = format!("{}/x.bin", dir.path().display());
        write(&fs, &path, OpenMode::CreateNew, b"a").unwrap();
        assert!(write(&fs, &path, OpenMode::CreateNew, b"b").is_err());
        write(&fs, &path, OpenMode::AppendBinary, b"c").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ac");
    }

    #[test]
    fn test_glob_matches_version_directories() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(true, false));
        let root = dir.path().display().to_string();
        for version in ["v1", "v2"] {
            write(&fs, &format!("{}/x.fits/{}/x.fits", root, version), OpenMode::WriteBinary, b"x")
                .unwrap();
        }
        std::fs::create_dir_all(format!("{}/x.fits/empty", root)).unwrap();

        let found = fs.glob(&format!("{}/x.fits/*/x.fits", root)).unwrap();
        assert_eq!(
            found,
            vec![
                format!("{}/x.fits/v1/x.fits", root),
                format!("{}/x.fits/v2/x.fits", root)
            ]
        );
        assert!(fs.glob(&format!("{}/nothing/*/x.fits", root)).unwrap().is_empty());
    }

    #[test]
    fn test_glob_wildcards_stay_at_their_depth() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(true, false));
        let root = dir.path().display().to_string();
        for path in ["a/v1/x.fits", "a/v2/x.fits", "a/v2/deep/x.fits", "b/v1/y.fits"] {
            write(&fs, &format!("{}/{}", root, path), OpenMode::WriteBinary, b"x").unwrap();
        }

        let found = fs.glob(&format!("{}/?/v*/*.fits", root)).unwrap();
        assert_eq!(
            found,
            vec![
                format!("{}/a/v1/x.fits", root),
                format!("{}/a/v2/x.fits", root),
                format!("{}/b/v1/y.fits", root),
            ]
        );
        assert_eq!(
            fs.glob(&format!("{}//a/v1/x.fits", root)).unwrap(),
            vec![format!("{}/a/v1/x.fits", root)]
        );
        assert!(fs.glob(&format!("{}/a/v3/x.fits", root)).unwrap().is_empty());
    }

    #[test]
    fn test_listings_cache_is_stale_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(&options(true, true));
        let path = format!("{}/x.bin", dir.path().display());

        assert!(!fs.exists(&path).unwrap());
        std::fs::write(&path, b"out of band").unwrap();
        assert!(!fs.exists(&path).unwrap());

        fs.invalidate_cache(&path);
        assert!(fs.exists(&path).unwrap());
    }
}
