//! # OCR Instance Manager Module
//!
//! This module provides thread-safe OCR instance management for reusing Tesseract instances.
//! Reusing instances significantly improves performance by avoiding initialization overhead.

use leptess::LepTess;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::ocr_config::OcrConfig;

/// Thread-safe OCR instance manager for reusing Tesseract instances
///
/// Manages a pool of Tesseract OCR instances keyed by language configuration.
/// Creating a Tesseract instance costs roughly 100-500ms, so instances are
/// created on first request for a language combination and reused afterwards.
///
/// Uses `Mutex<HashMap<>>` internally so multiple update handlers can request
/// instances concurrently. Memory usage scales with the number of unique
/// language combinations, which for this bot is normally just `eng+hin`.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create a new OCR instance manager with an empty pool
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create an OCR instance for the given configuration
    ///
    /// Returns an existing instance if one exists for the language configuration,
    /// otherwise creates a new instance and stores it for future reuse.
    ///
    /// # Errors
    ///
    /// Returns error if Tesseract instance creation fails (e.g., missing
    /// traineddata for the configured languages)
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        // Key includes both languages and model type so Fast/Best pools stay separate
        let key = format!("{}:{}", config.languages, config.model_type.tessdata_dir());

        // Try to get existing instance
        {
            let instances = self
                .instances
                .lock()
                .expect("Failed to acquire instances lock");
            if let Some(instance) = instances.get(&key) {
                return Ok(Arc::clone(instance));
            }
        }

        // Create new instance if none exists
        info!(
            "Creating new OCR instance for languages: {} with model: {}",
            config.languages,
            config.model_type.tessdata_dir()
        );

        // Determine tessdata path based on model type
        let tessdata_path = Self::get_tessdata_path(config.model_type);

        let mut tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        // Set default PSM mode (can be overridden later)
        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        let instance = Arc::new(Mutex::new(tess));

        // Store the instance
        {
            let mut instances = self
                .instances
                .lock()
                .expect("Failed to acquire instances lock");
            instances.insert(key, Arc::clone(&instance));
        }

        Ok(instance)
    }

    /// Get the tessdata path for the specified model type
    ///
    /// Attempts to find the appropriate tessdata directory based on the model type.
    /// Falls back to default path if specific model directory is not found.
    fn get_tessdata_path(model_type: crate::ocr_config::ModelType) -> Option<String> {
        use crate::ocr_config::ModelType;

        // Common tessdata installation paths to try
        let possible_paths = match model_type {
            ModelType::Fast => vec![
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => vec![
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        // Try each path and return the first one that exists
        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path.to_string());
            }
        }

        // Fall back to default (None) if no specific path found
        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        let instances = self
            .instances
            .lock()
            .expect("Failed to acquire instances lock");
        instances.len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
