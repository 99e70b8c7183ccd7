//! # OCR Processing Module
//!
//! This module provides optical character recognition (OCR) functionality for
//! extracting text from images using the Tesseract OCR engine. It is the shared
//! text-extraction pipeline behind the doubt solver and any scanned documents
//! students send.
//!
//! ## Features
//!
//! - Text extraction from images using Tesseract OCR
//! - Automatic image format detection and validation
//! - Support for multiple languages (default: English and Hindi)
//! - Circuit-breaker protection and retry with exponential backoff
//!
//! ## Supported Image Formats
//!
//! - PNG (Portable Network Graphics)
//! - JPEG/JPG (Joint Photographic Experts Group)
//! - BMP (Bitmap)
//! - TIFF/TIF (Tagged Image File Format)

use anyhow::Result;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, warn};

use crate::errors::error_logging;

// Re-export types for easier access from external usage
pub use crate::circuit_breaker::CircuitBreaker;
pub use crate::instance_manager::OcrInstanceManager;
pub use crate::ocr_config::{OcrConfig, RecoveryConfig};
pub use crate::ocr_errors::OcrError;

/// Validate an image file with format-specific size limits
///
/// Performs path validation, existence checks, a quick rejection for very
/// large files, format detection from magic bytes, per-format size limits,
/// and a memory usage estimate so a single oversized photo cannot push the
/// process into OOM territory.
pub fn validate_image_with_format_limits(
    image_path: &str,
    config: &crate::ocr_config::OcrConfig,
) -> Result<()> {
    // Comprehensive path validation first
    crate::path_validation::validate_file_path(image_path)
        .map_err(|e| anyhow::anyhow!("Image path validation failed: {}", e))?;

    let path = std::path::Path::new(image_path);

    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Image validation failed: file does not exist ({})",
            image_path
        ));
    }

    if !path.is_file() {
        return Err(anyhow::anyhow!(
            "Image validation failed: path is not a file ({})",
            image_path
        ));
    }

    let file_size = path.metadata()?.len();

    if file_size == 0 {
        return Err(anyhow::anyhow!(
            "Image validation failed: file is empty ({})",
            image_path
        ));
    }

    // Quick rejection for extremely large files
    if file_size > config.format_limits.min_quick_reject {
        info!(
            "Quick rejecting file {image_path}: {file_size} bytes exceeds quick reject threshold"
        );
        return Err(anyhow::anyhow!(
            "File too large for processing: {} bytes (exceeds quick reject threshold of {} bytes)",
            file_size,
            config.format_limits.min_quick_reject
        ));
    }

    // Try to detect format and apply format-specific limits
    let file = File::open(image_path)
        .map_err(|e| anyhow::anyhow!("Cannot open image file for validation: {} - {}", image_path, e))?;
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0; config.buffer_size];

    let bytes_read = reader.read(&mut buffer).unwrap_or(0);
    if bytes_read < config.min_format_bytes {
        // Could not read enough bytes, use general limit
        info!("Could not read enough bytes for format detection from {image_path}, using general size limit");
        if file_size > config.max_file_size {
            return Err(anyhow::anyhow!(
                "Image file too large: {} bytes (maximum allowed: {} bytes)",
                file_size,
                config.max_file_size
            ));
        }
        return Ok(());
    }
    buffer.truncate(bytes_read);

    match image::guess_format(&buffer) {
        Ok(format) => {
            let format_limit = match format {
                image::ImageFormat::Png => config.format_limits.png_max,
                image::ImageFormat::Jpeg => config.format_limits.jpeg_max,
                image::ImageFormat::Bmp => config.format_limits.bmp_max,
                image::ImageFormat::Tiff => config.format_limits.tiff_max,
                _ => {
                    info!("Detected unsupported format {format:?} for {image_path}, using general limit");
                    config.max_file_size
                }
            };

            if file_size > format_limit {
                return Err(anyhow::anyhow!(
                    "Image file too large for {:?} format: {} bytes (maximum allowed: {} bytes)",
                    format,
                    file_size,
                    format_limit
                ));
            }

            // Estimate memory usage for processing
            let estimated_memory_mb = estimate_memory_usage(file_size, &format);
            info!("Estimated memory usage for {image_path}: {estimated_memory_mb}MB");

            let max_memory_mb = std::env::var("OCR_MEMORY_LIMIT_MB")
                .unwrap_or_else(|_| "80".to_string())
                .parse::<f64>()
                .unwrap_or(80.0);
            if estimated_memory_mb > max_memory_mb {
                return Err(anyhow::anyhow!(
                    "Estimated memory usage too high: {}MB (maximum allowed: {}MB). File would cause out-of-memory errors.",
                    estimated_memory_mb,
                    max_memory_mb
                ));
            }

            Ok(())
        }
        Err(_) => {
            // Could not determine format, use general limit
            info!("Could not determine image format for {image_path}, using general size limit");
            if file_size > config.max_file_size {
                return Err(anyhow::anyhow!(
                    "Image file too large: {} bytes (maximum allowed: {} bytes)",
                    file_size,
                    config.max_file_size
                ));
            }
            Ok(())
        }
    }
}

/// Estimate memory usage for image processing based on file size and format
///
/// Calculates expected memory consumption during image decompression and OCR
/// processing. Estimates are conservative — better to reject a borderline file
/// than to risk OOM in the middle of an update.
///
/// | Format | Factor | Reason |
/// |--------|--------|--------|
/// | PNG    | 3.0x   | Lossless decompression expands compressed data |
/// | JPEG   | 2.5x   | Lossy decompression with working buffers |
/// | BMP    | 1.2x   | Mostly uncompressed, minimal expansion |
/// | TIFF   | 4.0x   | Complex format with layers and metadata |
pub fn estimate_memory_usage(file_size: u64, format: &image::ImageFormat) -> f64 {
    // Precision loss is acceptable: image files never reach sizes where
    // f64 precision becomes an issue.
    #[allow(clippy::cast_precision_loss)]
    let file_size_mb = file_size as f64 / (1024.0 * 1024.0);

    let memory_factor = match format {
        image::ImageFormat::Png => 3.0,
        image::ImageFormat::Jpeg => 2.5,
        image::ImageFormat::Bmp => 1.2,
        image::ImageFormat::Tiff => 4.0,
        _ => 3.0,
    };

    file_size_mb * memory_factor
}

/// Normalize OCR output before it is shown to users or sent to the AI
///
/// Trims surrounding whitespace, drops empty lines, and fixes the ligature
/// misreads Tesseract produces on printed study material (ﬁ → fi, ﬂ → fl).
fn normalize_extracted_text(text: &str) -> String {
    text.replace('\u{fb01}', "fi")
        .replace('\u{fb02}', "fl")
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Extract text from an image file using OCR with retry logic
///
/// The processing pipeline:
///
/// ```text
/// 1. Circuit breaker check — fail fast while the OCR engine is unhealthy
/// 2. Input validation — format detection, size limits, memory estimate
/// 3. Retry loop (max_retries + 1 attempts) with exponential backoff + jitter
/// 4. Circuit breaker bookkeeping — record success/failure
/// ```
///
/// # Arguments
///
/// * `image_path` - Path to the image file to process
/// * `config` - OCR configuration including languages, timeouts, and recovery options
/// * `instance_manager` - Manager for OCR instance reuse
/// * `circuit_breaker` - Circuit breaker shared across OCR operations
///
/// # Errors
///
/// Returns `OcrError` for the failure conditions:
/// - `Validation` - image format not supported or file too large
/// - `Initialization` - OCR engine initialization failed
/// - `ImageLoad` - could not load the image file
/// - `Extraction` - OCR processing failed (also used for an open circuit)
/// - `Timeout` - operation exceeded the configured timeout
pub async fn extract_text_from_image(
    image_path: &str,
    config: &crate::ocr_config::OcrConfig,
    instance_manager: &crate::instance_manager::OcrInstanceManager,
    circuit_breaker: &crate::circuit_breaker::CircuitBreaker,
) -> Result<String, crate::ocr_errors::OcrError> {
    let span = crate::observability::ocr_span("extract_text_from_image");
    let _enter = span.enter();

    let start_time = std::time::Instant::now();

    // Check circuit breaker before processing
    if circuit_breaker.is_open() {
        warn!("Circuit breaker is open, rejecting OCR request for image: {image_path}");
        return Err(crate::ocr_errors::OcrError::Extraction(
            "OCR service is temporarily unavailable due to repeated failures. Please try again later.".to_string()
        ));
    }

    // Validate input with enhanced format-specific validation
    validate_image_with_format_limits(image_path, config)
        .map_err(|e| crate::ocr_errors::OcrError::Validation(e.to_string()))?;

    info!("Starting OCR text extraction from image: {image_path}");

    // Retry loop with exponential backoff
    let mut attempt = 0;
    let max_attempts = config.recovery.max_retries + 1; // +1 for initial attempt

    loop {
        attempt += 1;

        match perform_ocr_extraction(image_path, config, instance_manager).await {
            Ok((text, ocr_duration)) => {
                let total_duration = start_time.elapsed();

                circuit_breaker.record_success();

                let image_size = std::fs::metadata(image_path).map(|m| m.len()).unwrap_or(0);
                crate::observability::record_ocr_operation(true, total_duration, image_size);

                info!(
                    "OCR extraction completed successfully on attempt {} in {}ms ({}ms in Tesseract). Extracted {} characters of text",
                    attempt,
                    total_duration.as_millis(),
                    ocr_duration.as_millis(),
                    text.len()
                );
                return Ok(text);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    let total_duration = start_time.elapsed();

                    circuit_breaker.record_failure();

                    let image_size = std::fs::metadata(image_path).map(|m| m.len()).unwrap_or(0);
                    crate::observability::record_ocr_operation(false, total_duration, image_size);

                    error_logging::log_ocr_error(
                        &err,
                        "ocr_extraction_retry",
                        None, // user_id not available in this context
                        Some(image_size),
                        Some(total_duration),
                    );
                    return Err(err);
                }

                let delay_ms = calculate_retry_delay(attempt, &config.recovery);
                warn!("OCR extraction attempt {attempt} failed: {err:?}. Retrying in {delay_ms}ms");

                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Perform a single OCR extraction with timeout protection
///
/// 1. Acquires or creates an OCR instance for the configured languages
/// 2. Loads the image into the Tesseract engine
/// 3. Extracts text and normalizes it
///
/// Times only the actual OCR processing (validation and retry logic are
/// measured by the caller).
async fn perform_ocr_extraction(
    image_path: &str,
    config: &crate::ocr_config::OcrConfig,
    instance_manager: &crate::instance_manager::OcrInstanceManager,
) -> Result<(String, std::time::Duration), crate::ocr_errors::OcrError> {
    let ocr_start_time = std::time::Instant::now();

    let timeout_duration = tokio::time::Duration::from_secs(config.recovery.operation_timeout_secs);

    let result = tokio::time::timeout(timeout_duration, async {
        // Get or create OCR instance from the manager
        let instance = instance_manager
            .get_instance(config)
            .map_err(|e| crate::ocr_errors::OcrError::Initialization(e.to_string()))?;

        // Perform OCR processing with the reused instance
        let extracted_text = {
            let mut tess = instance
                .lock()
                .expect("Failed to acquire Tesseract instance lock");
            tess.set_image(image_path).map_err(|e| {
                crate::ocr_errors::OcrError::ImageLoad(format!("Failed to load image for OCR: {e}"))
            })?;

            tess.get_utf8_text().map_err(|e| {
                crate::ocr_errors::OcrError::Extraction(format!(
                    "Failed to extract text from image: {e}"
                ))
            })?
        };

        Ok(normalize_extracted_text(&extracted_text))
    })
    .await;

    let ocr_duration = ocr_start_time.elapsed();
    let ocr_ms = ocr_duration.as_millis();

    match result {
        Ok(Ok(text)) => {
            info!(
                "OCR processing completed in {}ms, extracted {} characters",
                ocr_ms,
                text.len()
            );
            Ok((text, ocr_duration))
        }
        Ok(Err(e)) => {
            warn!("OCR processing failed after {ocr_ms}ms: {e:?}");
            Err(e)
        }
        Err(_) => {
            warn!(
                "OCR processing timed out after {}ms (limit: {}s)",
                ocr_ms, config.recovery.operation_timeout_secs
            );
            Err(crate::ocr_errors::OcrError::Timeout(format!(
                "OCR operation timed out after {} seconds",
                config.recovery.operation_timeout_secs
            )))
        }
    }
}

/// Calculate retry delay with exponential backoff and jitter
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay)
/// jitter = random(0, delay/4)
/// final_delay = delay + jitter
/// ```
///
/// The jitter component spreads out concurrent retries so several failing
/// updates do not hammer the OCR engine in lockstep.
pub fn calculate_retry_delay(attempt: u32, recovery: &crate::ocr_config::RecoveryConfig) -> u64 {
    // For retry delays, precision loss is acceptable as delays are small
    #[allow(clippy::cast_precision_loss)]
    let base_delay = recovery.base_retry_delay_ms as f64;

    let exponential_delay = base_delay * (2.0_f64).powf(f64::from(attempt - 1));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let delay = exponential_delay.min(recovery.max_retry_delay_ms as f64) as u64;

    // Add some jitter to prevent thundering herd
    let jitter = rand::random::<u64>() % (delay / 4).max(1);
    delay + jitter
}

/// Validate whether an image file is supported for OCR processing
///
/// Performs full validation (path, size limits, memory estimate) and then
/// detects the format from the file's magic bytes. Only formats Tesseract
/// accepts (PNG, JPEG, BMP, TIFF) pass.
pub fn is_supported_image_format(file_path: &str, config: &crate::ocr_config::OcrConfig) -> bool {
    // Enhanced validation first (includes size checks)
    if validate_image_with_format_limits(file_path, config).is_err() {
        return false;
    }

    match File::open(file_path) {
        Ok(file) => {
            let mut reader = BufReader::new(file);
            let mut buffer = vec![0; config.buffer_size];

            match reader.read(&mut buffer) {
                Ok(bytes_read) if bytes_read >= config.min_format_bytes => {
                    buffer.truncate(bytes_read);

                    match image::guess_format(&buffer) {
                        Ok(format) => {
                            // Tesseract supports: PNG, JPEG/JPG, BMP, TIFF
                            let supported = matches!(
                                format,
                                image::ImageFormat::Png
                                    | image::ImageFormat::Jpeg
                                    | image::ImageFormat::Bmp
                                    | image::ImageFormat::Tiff
                            );

                            if supported {
                                info!("Detected supported image format: {format:?} for file: {file_path}");
                            } else {
                                info!("Detected unsupported image format: {format:?} for file: {file_path}");
                            }

                            supported
                        }
                        Err(e) => {
                            info!("Could not determine image format for file: {file_path} - {e}");
                            false
                        }
                    }
                }
                Ok(bytes_read) => {
                    info!(
                        "Could not read enough bytes to determine image format for file: {} (read {} bytes, need at least {})",
                        file_path, bytes_read, config.min_format_bytes
                    );
                    false
                }
                Err(e) => {
                    info!("Error reading image file for format detection: {file_path} - {e}");
                    false
                }
            }
        }
        Err(e) => {
            info!("Could not open image file for format detection: {file_path} - {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extracted_text() {
        let raw = "  2x + 3 = 7 \n\n  solve for x  \n";
        assert_eq!(normalize_extracted_text(raw), "2x + 3 = 7\nsolve for x");

        // Ligature corrections
        assert_eq!(normalize_extracted_text("de\u{fb01}ne"), "define");
        assert_eq!(normalize_extracted_text("over\u{fb02}ow"), "overflow");
    }

    #[test]
    fn test_retry_delay_progression() {
        let recovery = RecoveryConfig::default();

        let delay1 = calculate_retry_delay(1, &recovery);
        assert!((1000..=1250).contains(&delay1));

        let delay2 = calculate_retry_delay(2, &recovery);
        assert!((2000..=2500).contains(&delay2));

        let delay3 = calculate_retry_delay(3, &recovery);
        assert!((4000..=5000).contains(&delay3));

        // Delay is capped at max_retry_delay_ms (+ jitter)
        let delay10 = calculate_retry_delay(10, &recovery);
        assert!(delay10 <= recovery.max_retry_delay_ms + recovery.max_retry_delay_ms / 4);
    }

    #[test]
    fn test_memory_estimates_by_format() {
        let one_mb = 1024 * 1024;
        assert_eq!(estimate_memory_usage(one_mb, &image::ImageFormat::Png), 3.0);
        assert_eq!(estimate_memory_usage(2 * one_mb, &image::ImageFormat::Jpeg), 5.0);
        assert!(estimate_memory_usage(one_mb, &image::ImageFormat::Bmp) < 2.0);
    }

    #[test]
    fn test_validate_missing_file() {
        let config = OcrConfig::default();
        assert!(validate_image_with_format_limits("/tmp/definitely-not-here.png", &config).is_err());
    }
}
