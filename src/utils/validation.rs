use crate::utils::error::{DatasetError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_filepath(field_name: &str, filepath: &str) -> Result<()> {
    if filepath.trim().is_empty() {
        return Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: filepath.to_string(),
            reason: "Filepath cannot be empty".to_string(),
        });
    }

    if filepath.contains('\0') {
        return Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: filepath.to_string(),
            reason: "Filepath contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_file_extension(
    field_name: &str,
    filepath: &str,
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<String> = allowed_extensions
        .iter()
        .map(|ext| ext.to_ascii_lowercase())
        .collect();

    // Query strings and fragments are not part of the file name.
    let name = filepath
        .split(['?', '#'])
        .next()
        .unwrap_or(filepath)
        .rsplit('/')
        .next()
        .unwrap_or(filepath);

    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            if allowed_set.contains(&extension.to_ascii_lowercase()) {
                Ok(())
            } else {
                Err(DatasetError::InvalidConfigValue {
                    field: field_name.to_string(),
                    value: filepath.to_string(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        extension,
                        allowed_extensions.join(", ")
                    ),
                })
            }
        }
        _ => Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: filepath.to_string(),
            reason: "File has no extension or invalid filename".to_string(),
        }),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| DatasetError::MissingConfig {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Version ids become directory names, so they must be a single path segment.
pub fn validate_version_id(field_name: &str, version: &str) -> Result<()> {
    validate_non_empty_string(field_name, version)?;
    if version.contains('/') || version.contains('\\') || version == "." || version == ".." {
        return Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: version.to_string(),
            reason: "Version must be a single path segment".to_string(),
        });
    }
    if version.contains(['*', '?', '[']) {
        return Err(DatasetError::InvalidConfigValue {
            field: field_name.to_string(),
            value: version.to_string(),
            reason: "Version cannot contain glob characters".to_string(),
        });
    }
    Ok(())
}
