//! Filepath parsing shared by every dataset: splits a protocol-qualified
//! URL into the protocol that selects a filesystem and the path handed to it.

use crate::utils::error::{DatasetError, Result};
use url::Url;

pub const PROTOCOL_DELIMITER: &str = "://";
pub const HTTP_PROTOCOLS: [&str; 2] = ["http", "https"];
pub const CLOUD_PROTOCOLS: [&str; 9] = [
    "s3", "s3n", "s3a", "gcs", "gs", "adl", "abfs", "abfss", "gdrive",
];

pub fn is_http(protocol: &str) -> bool {
    HTTP_PROTOCOLS.contains(&protocol)
}

/// Returns `(protocol, path)` for a filepath. Paths without a `scheme://`
/// prefix, and Windows drive paths, belong to the local `file` protocol.
/// HTTP(S) paths keep the host and cannot be versioned.
pub fn get_protocol_and_path(filepath: &str, versioned: bool) -> Result<(String, String)> {
    if filepath.trim().is_empty() {
        return Err(DatasetError::config("filepath cannot be empty"));
    }

    let (protocol, path) = parse_filepath(filepath)?;

    if is_http(&protocol) {
        if versioned {
            return Err(DatasetError::config(
                "Versioning is not supported for HTTP protocols. Please remove the \
                 `versioned` flag from the dataset configuration.",
            ));
        }
        let path = path
            .split_once(PROTOCOL_DELIMITER)
            .map(|(_, rest)| rest.to_string())
            .unwrap_or(path);
        return Ok((protocol, path));
    }

    Ok((protocol, path))
}

fn has_scheme(filepath: &str) -> bool {
    match filepath.split_once(PROTOCOL_DELIMITER) {
        Some((scheme, _)) => !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

fn is_windows_drive(filepath: &str) -> bool {
    let bytes = filepath.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

fn parse_filepath(filepath: &str) -> Result<(String, String)> {
    if is_windows_drive(filepath) || !has_scheme(filepath) {
        return Ok(("file".to_string(), filepath.to_string()));
    }

    let url = Url::parse(filepath).map_err(|e| DatasetError::InvalidConfigValue {
        field: "filepath".to_string(),
        value: filepath.to_string(),
        reason: format!("Invalid URL: {}", e),
    })?;

    let protocol = url.scheme().to_ascii_lowercase();
    if is_http(&protocol) {
        return Ok((protocol, filepath.to_string()));
    }

    let mut path = url.path().to_string();
    if protocol == "file" {
        path = strip_windows_drive_prefix(&path);
    }
    if let Some(query) = url.query() {
        path = format!("{}?{}", path, query);
    }
    if let Some(fragment) = url.fragment() {
        path = format!("{}#{}", path, fragment);
    }

    if CLOUD_PROTOCOLS.contains(&protocol.as_str()) {
        if let Some(host) = url.host_str().filter(|host| !host.is_empty()) {
            path = format!("{}{}", host, path);
            // ADLS Gen2 URIs carry the container as the user part.
            if protocol == "abfss" && !url.username().is_empty() {
                path = format!("{}@{}", url.username(), path);
            }
        }
    }

    // Local disk and the in-memory store have no hosts, so `scheme://a/b`
    // names the relative path `a/b`.
    if protocol == "file" || protocol == "memory" {
        if let Some(host) = url
            .host_str()
            .filter(|host| !host.is_empty() && *host != "localhost")
        {
            let rest = if path == "/" { "" } else { path.as_str() };
            path = format!("{}{}", host, rest);
        }
    }

    Ok((protocol, path))
}

/// `/C:/data/x.fits` and `/C|/data/x.fits` from `file:` URLs become `C:/data/x.fits`.
fn strip_windows_drive_prefix(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 4
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && (bytes[2] == b':' || bytes[2] == b'|')
        && (bytes[3] == b'/' || bytes[3] == b'\\')
    {
        return format!("{}:{}", &path[1..2], &path[3..]);
    }
    path.to_string()
}

/// Lexically normalises a path to POSIX form: collapses repeated
/// separators, drops `.` segments and any trailing separator.
pub fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Path string handed to a filesystem handle. HTTP filesystems want the
/// full URL back.
pub fn get_filepath_str(path: &str, protocol: &str) -> String {
    if is_http(protocol) {
        format!("{}{}{}", protocol, PROTOCOL_DELIMITER, path)
    } else {
        path.to_string()
    }
}

/// Final path segment, as used for the file name inside a version directory.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
