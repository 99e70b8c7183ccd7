//! Path Validation module for secure file path handling
//!
//! This module provides security validation for every file path the bot reads
//! or writes (downloaded Telegram files, stored notes, generated solution
//! images). It implements multiple layers of validation:
//!
//! - Path traversal attack prevention (`..` directory traversal)
//! - Absolute path restrictions (temp directories and the storage root only)
//! - Filename sanitization and validation
//! - Length limits and constraints
//! - Reserved name checking (Windows reserved names)

use std::path::Path;

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// Path contains dangerous traversal sequences (..)
    PathTraversal,
    /// Path contains null bytes
    NullByte,
    /// Path is absolute and not in allowed directories
    AbsolutePathNotAllowed,
    /// Path contains invalid characters
    InvalidCharacters,
    /// Filename is too long
    FilenameTooLong,
    /// Path is too long
    PathTooLong,
    /// Filename uses reserved name
    ReservedName,
    /// Empty path provided
    EmptyPath,
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::PathTraversal => write!(f, "path contains traversal sequences"),
            PathValidationError::NullByte => write!(f, "path contains null bytes"),
            PathValidationError::AbsolutePathNotAllowed => {
                write!(f, "absolute path outside allowed directories")
            }
            PathValidationError::InvalidCharacters => write!(f, "path contains invalid characters"),
            PathValidationError::FilenameTooLong => write!(f, "filename is too long"),
            PathValidationError::PathTooLong => write!(f, "path is too long"),
            PathValidationError::ReservedName => write!(f, "filename uses a reserved name"),
            PathValidationError::EmptyPath => write!(f, "empty path provided"),
        }
    }
}

impl std::error::Error for PathValidationError {}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed filename length (255 bytes on most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum allowed path length (4096 bytes on most systems)
pub const MAX_PATH_LENGTH: usize = 4096;

/// Reserved filenames that should not be used (Windows compatibility)
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters that are not allowed in filenames
pub const FORBIDDEN_FILENAME_CHARS: &[char] = &[
    '<', '>', ':', '"', '|', '?', '*', '\0', // null byte
    '\x01', '\x02', '\x03', '\x04', '\x05', '\x06', '\x07', // control chars
    '\x08', '\x09', '\x0a', '\x0b', '\x0c', '\x0d', '\x0e', '\x0f', // control chars
    '\x10', '\x11', '\x12', '\x13', '\x14', '\x15', '\x16', '\x17', // control chars
    '\x18', '\x19', '\x1a', '\x1b', '\x1c', '\x1d', '\x1e', '\x1f', // control chars
];

/// Directories that are considered safe for absolute paths
pub const ALLOWED_ABSOLUTE_PATH_PREFIXES: &[&str] = &[
    "/tmp",
    "/var/tmp",
    "/private/tmp",
    "/private/var/tmp",
    "/var/folders", // macOS temp directories
];

/// Validate a file path for security issues
///
/// Checks traversal sequences, null bytes, length limits, absolute path
/// restrictions, and filename validity.
///
/// Relative paths and absolute paths under a temp directory pass; absolute
/// paths into system directories are rejected.
pub fn validate_file_path(path: &str) -> PathValidationResult<()> {
    if path.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(PathValidationError::PathTooLong);
    }

    if path.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if contains_path_traversal(path) {
        return Err(PathValidationError::PathTraversal);
    }

    validate_absolute_path(path)?;

    let path_obj = Path::new(path);
    if let Some(filename) = path_obj.file_name() {
        let filename_str = filename.to_string_lossy();
        validate_filename(&filename_str)?;
    }

    Ok(())
}

/// Validate a path destined for the bot's file storage
///
/// Same checks as [`validate_file_path`] except that absolute paths are
/// allowed when they stay inside `storage_root` (the configured `FILES_DIR`).
pub fn validate_storage_path(path: &str, storage_root: &str) -> PathValidationResult<()> {
    if path.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(PathValidationError::PathTooLong);
    }

    if path.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if contains_path_traversal(path) {
        return Err(PathValidationError::PathTraversal);
    }

    let path_obj = Path::new(path);
    if path_obj.is_absolute() && !path.starts_with(storage_root) {
        validate_absolute_path(path)?;
    }

    if let Some(filename) = path_obj.file_name() {
        let filename_str = filename.to_string_lossy();
        validate_filename(&filename_str)?;
    }

    Ok(())
}

/// Check if a path contains path traversal sequences
fn contains_path_traversal(path: &str) -> bool {
    // Check for .. as actual directory components
    if path.contains("..") {
        let path_obj = Path::new(path);
        for component in path_obj.components() {
            if let std::path::Component::ParentDir = component {
                return true;
            }
        }
    }

    // Check for encoded traversal (URL encoded)
    if path.contains("%2e%2e") || path.contains("%2E%2E") {
        return true;
    }

    // Check for backslash traversal on Windows
    if cfg!(windows) && path.contains("\\..\\") {
        return true;
    }

    false
}

/// Validate absolute paths to ensure they are in allowed directories
fn validate_absolute_path(path: &str) -> PathValidationResult<()> {
    let path_obj = Path::new(path);

    if path_obj.is_absolute() {
        let path_str = path_obj.to_string_lossy();

        let is_allowed = ALLOWED_ABSOLUTE_PATH_PREFIXES
            .iter()
            .any(|prefix| path_str.starts_with(prefix));

        if !is_allowed {
            return Err(PathValidationError::AbsolutePathNotAllowed);
        }
    }

    Ok(())
}

/// Validate a filename for security issues
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }

    if filename.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    // Check for reserved names (case-insensitive)
    let filename_upper = filename.to_uppercase();
    let name_without_ext = filename_upper.split('.').next().unwrap_or("");

    if RESERVED_NAMES.contains(&name_without_ext) {
        return Err(PathValidationError::ReservedName);
    }

    if filename
        .chars()
        .any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c))
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    if filename
        .chars()
        .any(|c| c.is_control() && c != '\t' && c != '\n' && c != '\r')
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    Ok(())
}

/// Sanitize a filename by removing or replacing dangerous characters
///
/// Replaces forbidden characters with underscores, trims whitespace and
/// leading/trailing dots, and truncates to the maximum filename length while
/// preserving the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = filename.to_string();

    for &forbidden in FORBIDDEN_FILENAME_CHARS {
        sanitized = sanitized.replace(forbidden, "_");
    }

    sanitized = sanitized.trim().to_string();

    if sanitized.is_empty() {
        sanitized = "unnamed_file".to_string();
    }

    // Ensure it doesn't start or end with dots (Windows issues)
    sanitized = sanitized.trim_matches('.').trim().to_string();
    if sanitized.is_empty() {
        sanitized = "unnamed_file".to_string();
    }

    if sanitized.len() > MAX_FILENAME_LENGTH {
        // Try to preserve extension
        if let Some(dot_pos) = sanitized.rfind('.') {
            let name = &sanitized[..dot_pos];
            let ext = &sanitized[dot_pos..];
            let max_name_len = MAX_FILENAME_LENGTH.saturating_sub(ext.len());
            sanitized = format!("{}{}", &name[..max_name_len.min(name.len())], ext);
        } else {
            sanitized = sanitized[..MAX_FILENAME_LENGTH].to_string();
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_allowed() {
        assert!(validate_file_path("notes.pdf").is_ok());
        assert!(validate_file_path("files/pdfs/notes.pdf").is_ok());
    }

    #[test]
    fn test_traversal_rejected() {
        assert_eq!(
            validate_file_path("../etc/passwd"),
            Err(PathValidationError::PathTraversal)
        );
        assert_eq!(
            validate_file_path("files/../../secret"),
            Err(PathValidationError::PathTraversal)
        );
        assert_eq!(
            validate_file_path("files/%2e%2e/secret"),
            Err(PathValidationError::PathTraversal)
        );
    }

    #[test]
    fn test_absolute_path_rules() {
        assert!(validate_file_path("/tmp/photo.jpg").is_ok());
        assert_eq!(
            validate_file_path("/etc/passwd"),
            Err(PathValidationError::AbsolutePathNotAllowed)
        );
    }

    #[test]
    fn test_storage_path_allows_configured_root() {
        assert!(validate_storage_path("/data/files/pdfs/notes.pdf", "/data/files").is_ok());
        assert_eq!(
            validate_storage_path("/etc/passwd", "/data/files"),
            Err(PathValidationError::AbsolutePathNotAllowed)
        );
    }

    #[test]
    fn test_null_byte_rejected() {
        assert_eq!(
            validate_file_path("file\0name.pdf"),
            Err(PathValidationError::NullByte)
        );
    }

    #[test]
    fn test_filename_sanitization() {
        assert_eq!(sanitize_filename("safe_file.jpg"), "safe_file.jpg");
        assert_eq!(sanitize_filename("unsafe<name>.jpg"), "unsafe_name_.jpg");
        assert_eq!(sanitize_filename(""), "unnamed_file");
        assert_eq!(sanitize_filename("..."), "unnamed_file");
    }

    #[test]
    fn test_reserved_names_rejected() {
        assert_eq!(
            validate_filename("CON.pdf"),
            Err(PathValidationError::ReservedName)
        );
        assert!(validate_filename("console.pdf").is_ok());
    }
}
