//! # File Manager Module
//!
//! Stores uploaded study material under a per-category directory tree,
//! records metadata in the database, and answers retrieval queries
//! ("send me physics notes"). All paths pass through the path validation
//! module before anything touches the filesystem.

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPool;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::FilesConfig;
use crate::db::{self, NewFile, StoredFile};
use crate::errors::error_logging;
use crate::path_validation::{sanitize_filename, validate_storage_path};

/// Category a stored file is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Image,
    Document,
    Audio,
    Video,
    Other,
}

impl FileCategory {
    /// Directory name under the storage root
    pub fn dir_name(&self) -> &'static str {
        match self {
            FileCategory::Pdf => "pdfs",
            FileCategory::Image => "images",
            FileCategory::Document => "documents",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }

    /// Stable name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Pdf => "pdf",
            FileCategory::Image => "image",
            FileCategory::Document => "document",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }

    fn all() -> &'static [FileCategory] {
        &[
            FileCategory::Pdf,
            FileCategory::Image,
            FileCategory::Document,
            FileCategory::Audio,
            FileCategory::Video,
            FileCategory::Other,
        ]
    }

    /// Categorize a file by its extension
    pub fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => FileCategory::Pdf,
            "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "tif" | "webp" => FileCategory::Image,
            "doc" | "docx" | "txt" | "rtf" | "odt" | "md" => FileCategory::Document,
            "mp3" | "ogg" | "wav" | "m4a" | "flac" => FileCategory::Audio,
            "mp4" | "mkv" | "avi" | "mov" | "webm" => FileCategory::Video,
            _ => FileCategory::Other,
        }
    }
}

/// Result of a successful file store operation
#[derive(Debug, Clone)]
pub struct StoredFileInfo {
    pub file_id: i64,
    pub filename: String,
    pub safe_filename: String,
    pub filepath: String,
    pub category: FileCategory,
    pub file_size: u64,
    pub file_hash: String,
}

/// Manages the on-disk file store and its database records
pub struct FileManager {
    files_dir: PathBuf,
    max_file_size: u64,
}

impl FileManager {
    /// Create a file manager and ensure the category directories exist
    pub fn new(config: &FilesConfig) -> Result<Self> {
        let files_dir = PathBuf::from(&config.files_dir);

        fs::create_dir_all(&files_dir)
            .with_context(|| format!("Failed to create files directory {}", files_dir.display()))?;

        for category in FileCategory::all() {
            let subdir = files_dir.join(category.dir_name());
            fs::create_dir_all(&subdir).with_context(|| {
                format!("Failed to create category directory {}", subdir.display())
            })?;
        }

        info!(files_dir = %files_dir.display(), "File storage initialized");

        Ok(Self {
            files_dir,
            max_file_size: config.max_file_size,
        })
    }

    /// Root directory of the file store
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Build a safe, unique filename for a user's upload
    ///
    /// Format: `<user>_<timestamp>_<sanitized-stem><ext>`. Sanitization keeps
    /// only alphanumerics, spaces, dashes, and underscores, then swaps spaces
    /// for underscores.
    pub fn generate_safe_filename(&self, telegram_id: i64, original_filename: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");

        let sanitized = sanitize_filename(original_filename);
        let path = Path::new(&sanitized);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();

        let clean_stem: String = stem
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
            .collect::<String>()
            .trim()
            .replace(' ', "_");

        let clean_stem = if clean_stem.is_empty() {
            "file".to_string()
        } else {
            clean_stem
        };

        format!("{telegram_id}_{timestamp}_{clean_stem}{extension}")
    }

    /// Store a downloaded file and record it in the database
    ///
    /// The source file (normally a temp file downloaded from Telegram) is
    /// copied into the category directory; the caller remains responsible for
    /// cleaning up the source.
    pub async fn store_file(
        &self,
        pool: &PgPool,
        telegram_id: i64,
        source_path: &str,
        original_filename: &str,
        description: Option<&str>,
        tags: &[String],
    ) -> Result<StoredFileInfo> {
        let file_size = fs::metadata(source_path)
            .with_context(|| format!("Failed to read metadata for {source_path}"))?
            .len();

        if file_size > self.max_file_size {
            return Err(anyhow::anyhow!(
                "File size {} exceeds maximum {}",
                file_size,
                self.max_file_size
            ));
        }

        let category = FileCategory::from_filename(original_filename);
        let safe_filename = self.generate_safe_filename(telegram_id, original_filename);
        let target_path = self.files_dir.join(category.dir_name()).join(&safe_filename);
        let target_str = target_path.to_string_lossy().to_string();

        let storage_root = self.files_dir.to_string_lossy();
        validate_storage_path(&target_str, &storage_root)
            .map_err(|e| anyhow::anyhow!("Storage path validation failed: {}", e))?;

        fs::copy(source_path, &target_path).with_context(|| {
            format!("Failed to copy {} to {}", source_path, target_path.display())
        })?;

        let file_hash = match calculate_file_hash(&target_path) {
            Ok(hash) => hash,
            Err(e) => {
                error_logging::log_filesystem_error(
                    &e,
                    "hash_stored_file",
                    Some(&target_str),
                    Some(file_size),
                );
                String::new()
            }
        };

        let tags_json = serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string());

        let file_id = db::create_file(
            pool,
            NewFile {
                telegram_id,
                filename: original_filename,
                filepath: &target_str,
                file_type: category.as_str(),
                file_size: file_size as i64,
                file_hash: if file_hash.is_empty() {
                    None
                } else {
                    Some(&file_hash)
                },
                description,
                tags: &tags_json,
            },
        )
        .await?;

        info!(
            telegram_id = %telegram_id,
            file_id = %file_id,
            filename = %original_filename,
            safe_filename = %safe_filename,
            "File stored successfully"
        );

        Ok(StoredFileInfo {
            file_id,
            filename: original_filename.to_string(),
            safe_filename,
            filepath: target_str,
            category,
            file_size,
            file_hash,
        })
    }

    /// Find the files most relevant to a free-text request
    ///
    /// Database search over filename/description/tags first; when nothing
    /// matches, the user's three most recent files are returned instead so
    /// "notes bhejo" always produces something useful.
    pub async fn relevant_files(
        &self,
        pool: &PgPool,
        telegram_id: i64,
        query: &str,
    ) -> Result<Vec<StoredFile>> {
        let keywords = extract_keywords(query);

        let mut matches = Vec::new();
        for keyword in &keywords {
            let found = db::search_files(pool, telegram_id, keyword).await?;
            for file in found {
                if !matches.iter().any(|f: &StoredFile| f.id == file.id) {
                    matches.push(file);
                }
            }
        }

        if matches.is_empty() {
            debug!(telegram_id = %telegram_id, "No search matches, falling back to recent files");
            matches = db::list_user_files(pool, telegram_id, None, 3).await?;
        }

        matches.truncate(5);
        Ok(matches)
    }

    /// Delete a file: soft delete in the database, best-effort on disk
    pub async fn delete_file(&self, pool: &PgPool, telegram_id: i64, file_id: i64) -> Result<bool> {
        let Some(file) = db::get_file_by_id(pool, telegram_id, file_id).await? else {
            return Ok(false);
        };

        let deleted = db::soft_delete_file(pool, telegram_id, file_id).await?;

        if deleted {
            if let Err(e) = fs::remove_file(&file.filepath) {
                // Row is already hidden; a stale file on disk is harmless
                warn!(filepath = %file.filepath, error = %e, "Could not remove file from disk");
            }
        }

        Ok(deleted)
    }
}

/// Calculate the SHA-256 hash of a file
pub fn calculate_file_hash(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 4096];

    loop {
        let bytes_read = file.read(&mut buffer).context("Failed to read file chunk")?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract search keywords from a free-text request
fn extract_keywords(text: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "can", "must", "send", "me", "notes",
        "file", "share", "bhejo", "chahiye", "do",
    ];

    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(&word.as_str()))
        .take(10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_filename() {
        assert_eq!(FileCategory::from_filename("notes.pdf"), FileCategory::Pdf);
        assert_eq!(FileCategory::from_filename("photo.JPG"), FileCategory::Image);
        assert_eq!(FileCategory::from_filename("essay.docx"), FileCategory::Document);
        assert_eq!(FileCategory::from_filename("lecture.mp3"), FileCategory::Audio);
        assert_eq!(FileCategory::from_filename("lab.mp4"), FileCategory::Video);
        assert_eq!(FileCategory::from_filename("archive.zip"), FileCategory::Other);
        assert_eq!(FileCategory::from_filename("no_extension"), FileCategory::Other);
    }

    #[test]
    fn test_keyword_extraction() {
        let keywords = extract_keywords("send me the physics notes chahiye");
        assert_eq!(keywords, vec!["physics"]);

        let keywords = extract_keywords("thermodynamics chapter 4 revision");
        assert!(keywords.contains(&"thermodynamics".to_string()));
        assert!(keywords.contains(&"revision".to_string()));
    }

    #[test]
    fn test_safe_filename_generation() {
        let config = FilesConfig {
            files_dir: std::env::temp_dir()
                .join("sathi_test_files")
                .to_string_lossy()
                .to_string(),
            max_file_size: 1024,
        };
        let manager = FileManager::new(&config).expect("test file manager");

        let name = manager.generate_safe_filename(42, "My Physics Notes!.pdf");
        assert!(name.starts_with("42_"));
        assert!(name.ends_with("_My_Physics_Notes.pdf"));
        assert!(!name.contains(' '));

        // Hostile names lose their separators
        let name = manager.generate_safe_filename(42, "../../etc/passwd");
        assert!(!name.contains(".."));
        assert!(!name.contains('/'));
    }
}
