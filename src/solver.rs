//! # Doubt Solver Module
//!
//! Takes a photo of a problem, OCRs it, asks the AI for a worked solution,
//! and renders that solution under the original photo in a pen-colored,
//! handwriting-ish style — the result looks like a solved page from a
//! student's copy.

use ab_glyph::{FontVec, PxScale};
use image::{imageops, GenericImageView, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::SolverConfig;
use crate::instance_manager::OcrInstanceManager;
use crate::ocr;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;
use crate::openai::{OpenAiClient, OpenAiError};

/// Pen colors used for rendered solutions
const PEN_COLORS: [Rgb<u8>; 7] = [
    Rgb([204, 0, 0]),   // red
    Rgb([255, 100, 0]), // orange-red
    Rgb([0, 0, 204]),   // blue
    Rgb([0, 130, 0]),   // dark green
    Rgb([128, 0, 128]), // purple
    Rgb([255, 20, 147]), // deep pink
    Rgb([0, 0, 139]),   // dark blue
];

/// Errors from the doubt-solving pipeline
#[derive(Debug)]
pub enum SolveError {
    /// OCR found no usable text in the photo
    NoTextFound,
    /// OCR pipeline failure
    Ocr(OcrError),
    /// AI request failure
    Ai(OpenAiError),
    /// Image loading or rendering failure
    Render(String),
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveError::NoTextFound => write!(f, "[SOLVER] No text found in image"),
            SolveError::Ocr(e) => write!(f, "[SOLVER] {}", e),
            SolveError::Ai(e) => write!(f, "[SOLVER] {}", e),
            SolveError::Render(msg) => write!(f, "[SOLVER] Rendering failed: {}", msg),
        }
    }
}

impl std::error::Error for SolveError {}

impl From<OcrError> for SolveError {
    fn from(err: OcrError) -> Self {
        SolveError::Ocr(err)
    }
}

impl From<OpenAiError> for SolveError {
    fn from(err: OpenAiError) -> Self {
        SolveError::Ai(err)
    }
}

/// A successfully solved doubt
#[derive(Debug, Clone)]
pub struct SolvedDoubt {
    /// Path of the rendered image with the solution overlay
    pub solved_image_path: String,
    /// Text OCR extracted from the problem photo
    pub extracted_text: String,
    /// The AI's worked solution
    pub solution_text: String,
}

/// Solves photographed doubts end to end
pub struct DoubtSolver {
    openai: Arc<OpenAiClient>,
    config: SolverConfig,
    font: FontVec,
}

impl DoubtSolver {
    /// Create a solver, loading the solution font once up front
    pub fn new(openai: Arc<OpenAiClient>, config: SolverConfig) -> anyhow::Result<Self> {
        let font = load_font(config.font_path.as_deref())?;
        Ok(Self {
            openai,
            config,
            font,
        })
    }

    /// Solve the doubt in a photo
    ///
    /// Pipeline: preprocess (downscale + grayscale for better OCR), extract
    /// text, ask the AI for a solution, render the solution under the photo.
    /// The rendered image lands next to the input as `<stem>_solved.png`.
    pub async fn solve(
        &self,
        image_path: &str,
        ocr_config: &OcrConfig,
        instance_manager: &OcrInstanceManager,
        circuit_breaker: &CircuitBreaker,
    ) -> Result<SolvedDoubt, SolveError> {
        let preprocessed = self.preprocess_image(image_path)?;
        let preprocessed_str = preprocessed.to_string_lossy().to_string();

        let ocr_result = ocr::extract_text_from_image(
            &preprocessed_str,
            ocr_config,
            instance_manager,
            circuit_breaker,
        )
        .await;

        // The preprocessed copy is only needed for OCR
        if let Err(e) = fs::remove_file(&preprocessed) {
            debug!(path = %preprocessed.display(), error = %e, "Could not remove preprocessed image");
        }

        let extracted_text = ocr_result?;

        if extracted_text.trim().is_empty() {
            warn!(image_path = %image_path, "OCR extracted no text from doubt photo");
            return Err(SolveError::NoTextFound);
        }

        info!(
            chars = extracted_text.len(),
            "Extracted problem text, requesting solution"
        );

        let solution_text = self.openai.solve_problem(&extracted_text).await?;

        let solved_image_path = self.render_solution(image_path, &solution_text)?;

        Ok(SolvedDoubt {
            solved_image_path,
            extracted_text,
            solution_text,
        })
    }

    /// Downscale and grayscale a photo for OCR
    ///
    /// The grayscale copy goes to a sibling path so the original stays
    /// untouched for the final render.
    fn preprocess_image(&self, image_path: &str) -> Result<PathBuf, SolveError> {
        let img = image::open(image_path)
            .map_err(|e| SolveError::Render(format!("Failed to load image: {e}")))?;

        let img = if img.width() > self.config.max_image_width
            || img.height() > self.config.max_image_height
        {
            debug!(
                width = img.width(),
                height = img.height(),
                "Downscaling oversized doubt photo"
            );
            img.thumbnail(self.config.max_image_width, self.config.max_image_height)
        } else {
            img
        };

        let gray = img.grayscale();

        let preprocessed = sibling_path(image_path, "_ocr", "png");
        gray.save(&preprocessed)
            .map_err(|e| SolveError::Render(format!("Failed to save preprocessed image: {e}")))?;

        Ok(preprocessed)
    }

    /// Render the solution text onto a white strip below the problem photo
    fn render_solution(&self, image_path: &str, solution: &str) -> Result<String, SolveError> {
        let original = image::open(image_path)
            .map_err(|e| SolveError::Render(format!("Failed to load image: {e}")))?
            .to_rgb8();

        let width = original.width().max(480);
        let font_size = self.config.solution_font_size;
        let line_height = (font_size * 1.6) as u32;

        // Rough average glyph width; enough to wrap without measuring every glyph
        let max_chars = ((width as f32 - 60.0) / (font_size * 0.55)).max(16.0) as usize;
        let lines = wrap_text(solution, max_chars);

        let margin_top = line_height;
        let strip_height = margin_top + lines.len() as u32 * line_height + line_height;
        let height = original.height() + strip_height;

        let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        imageops::replace(&mut canvas, &original, 0, 0);

        let mut rng = rand::rng();
        let pen = *PEN_COLORS.choose(&mut rng).unwrap_or(&PEN_COLORS[0]);
        let scale = PxScale::from(font_size);

        let mut y = original.height() + margin_top;
        for line in &lines {
            // Slight horizontal jitter so the writing doesn't look typeset
            let x = 30 + rng.random_range(0..12);
            draw_text_mut(&mut canvas, pen, x as i32, y as i32, scale, &self.font, line);
            y += line_height;
        }

        let output = sibling_path(image_path, "_solved", "png");
        canvas
            .save(&output)
            .map_err(|e| SolveError::Render(format!("Failed to save solved image: {e}")))?;

        info!(output = %output.display(), lines = lines.len(), "Solution rendered onto image");

        Ok(output.to_string_lossy().to_string())
    }
}

/// Build `<stem><suffix>.<ext>` next to the input path
fn sibling_path(image_path: &str, suffix: &str, ext: &str) -> PathBuf {
    let path = Path::new(image_path);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let file_name = format!("{stem}{suffix}.{ext}");
    path.with_file_name(file_name)
}

/// Load a font for solution rendering
///
/// Tries the configured path first, then common system font locations.
fn load_font(configured_path: Option<&str>) -> anyhow::Result<FontVec> {
    let candidates: Vec<&str> = configured_path
        .into_iter()
        .chain([
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Comic Sans MS.ttf",
        ])
        .collect();

    for candidate in candidates {
        if Path::new(candidate).exists() {
            let font_data = fs::read(candidate)?;
            info!(font = %candidate, "Loaded solution font");
            return FontVec::try_from_vec(font_data)
                .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", candidate, e));
        }
    }

    Err(anyhow::anyhow!(
        "No suitable font found for solution rendering; set SOLUTION_FONT_PATH"
    ))
}

/// Word-wrap text to a maximum line width in characters
///
/// Existing line breaks are preserved; overlong words land on their own line
/// rather than being split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for source_line in text.lines() {
        let source_line = source_line.trim();
        if source_line.is_empty() {
            continue;
        }

        let mut current = String::new();
        for word in source_line.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + 1 + word.len() <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(current);
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_basic() {
        let lines = wrap_text("solve for x then substitute back into the equation", 20);
        assert!(lines.len() > 1);
        for line in &lines {
            // A single overlong word may exceed the limit; these don't
            assert!(line.len() <= 20);
        }
    }

    #[test]
    fn test_wrap_text_preserves_line_breaks() {
        let lines = wrap_text("Step 1: expand\nStep 2: simplify", 40);
        assert_eq!(lines, vec!["Step 1: expand", "Step 2: simplify"]);
    }

    #[test]
    fn test_wrap_text_skips_blank_lines() {
        let lines = wrap_text("first\n\n\nsecond", 40);
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_sibling_path() {
        let solved = sibling_path("/tmp/doubt_42.jpg", "_solved", "png");
        assert_eq!(solved, PathBuf::from("/tmp/doubt_42_solved.png"));

        let ocr = sibling_path("photo.jpeg", "_ocr", "png");
        assert_eq!(ocr, PathBuf::from("photo_ocr.png"));
    }
}
