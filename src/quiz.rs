//! # Quiz Generator Module
//!
//! Turns uploaded PDFs into multiple-choice quizzes. The AI produces the
//! questions; this module owns chunking, parsing, validation, storage,
//! display formatting, option-shuffled variations, and the no-AI
//! fill-in-the-blank fallback.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::QuizConfig;
use crate::db;
use crate::openai::OpenAiClient;
use crate::pdf;

/// Letters used for options, in display order
pub const ANSWER_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

/// One multiple-choice question as stored and displayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Correct option letter: "A".."D"
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

impl QuizQuestion {
    /// Index of the correct option
    pub fn answer_index(&self) -> Option<usize> {
        ANSWER_LETTERS.iter().position(|l| *l == self.answer)
    }
}

/// A freshly generated quiz, before or after persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub difficulty: String,
    pub subject: Option<String>,
}

/// Shape of a question as the AI returns it
#[derive(Debug, Deserialize)]
struct AiQuestion {
    question: String,
    options: Vec<String>,
    correct_answer: String,
    #[serde(default)]
    explanation: String,
}

lazy_static! {
    static ref QUESTION_PATTERN: Regex =
        Regex::new(r"(?i)(?:Question|Q\d+)[:.]?\s*(.+)").expect("question pattern must compile");
    static ref OPTION_PATTERN: Regex =
        Regex::new(r"(?im)^\s*([A-D])[.)]\s*(.+)$").expect("option pattern must compile");
    static ref ANSWER_PATTERN: Regex =
        Regex::new(r"(?i)(?:Answer|Correct)[:\s]*([A-D])").expect("answer pattern must compile");
}

/// Generates quizzes from PDFs and manages their persistence
pub struct QuizGenerator {
    openai: Arc<OpenAiClient>,
    config: QuizConfig,
}

impl QuizGenerator {
    pub fn new(openai: Arc<OpenAiClient>, config: QuizConfig) -> Self {
        Self { openai, config }
    }

    /// Generate a quiz from a PDF and store it
    ///
    /// Returns the stored quiz id together with the generated quiz. The
    /// question count scales with the amount of text (one question per ~500
    /// characters, at least 3, capped by configuration).
    pub async fn generate_from_pdf(
        &self,
        pool: &PgPool,
        telegram_id: i64,
        pdf_path: &str,
        subject: Option<&str>,
    ) -> Result<(i64, GeneratedQuiz)> {
        let text = pdf::extract_text(pdf_path, self.config.min_pdf_chars)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let num_questions = (text.len() / 500).clamp(3, self.config.max_questions);

        let questions = self.generate_questions_from_text(&text, num_questions).await;

        if questions.is_empty() {
            return Err(anyhow::anyhow!(
                "Could not generate questions from PDF content"
            ));
        }

        let title = quiz_title_from_path(pdf_path);

        let quiz = GeneratedQuiz {
            title: title.clone(),
            questions,
            difficulty: "medium".to_string(),
            subject: subject.map(|s| s.to_string()),
        };

        let questions_json =
            serde_json::to_string(&quiz.questions).context("Failed to serialize quiz questions")?;

        let quiz_id = db::create_quiz(
            pool,
            telegram_id,
            &title,
            &questions_json,
            quiz.questions.len() as i32,
            Some(pdf_path),
            subject,
            &quiz.difficulty,
        )
        .await?;

        crate::observability::record_quiz_generated(quiz.questions.len());

        info!(
            telegram_id = %telegram_id,
            quiz_id = %quiz_id,
            questions = quiz.questions.len(),
            "Quiz generated from PDF"
        );

        Ok((quiz_id, quiz))
    }

    /// Generate questions from already-extracted text
    ///
    /// Text is chunked on sentence boundaries; at most three chunks go to the
    /// AI. Parsing failures on one chunk don't abort the others.
    pub async fn generate_questions_from_text(
        &self,
        text: &str,
        num_questions: usize,
    ) -> Vec<QuizQuestion> {
        let chunks = pdf::split_into_chunks(text, 3000);
        let used_chunks = chunks.len().min(3);
        if used_chunks == 0 {
            return Vec::new();
        }

        let per_chunk = num_questions / used_chunks + 1;
        let mut questions = Vec::new();

        for chunk in chunks.iter().take(used_chunks) {
            match self.openai.generate_quiz_questions(chunk, per_chunk).await {
                Ok(raw) => {
                    let parsed = parse_ai_questions(&raw);
                    debug!(parsed = parsed.len(), "Parsed questions from AI output");
                    questions.extend(parsed);
                }
                Err(e) => {
                    warn!(error = %e, "Quiz question generation failed for chunk");
                }
            }
        }

        // Sample down if the AI over-delivered
        if questions.len() > num_questions {
            let mut rng = rand::rng();
            questions.shuffle(&mut rng);
            questions.truncate(num_questions);
        }

        questions
    }
}

/// Derive a quiz title from the source file name
fn quiz_title_from_path(pdf_path: &str) -> String {
    let stem = Path::new(pdf_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Notes");
    format!("Quiz from {stem}")
}

/// Parse AI output into validated questions
///
/// The model is asked for JSON, but doesn't always comply; code fences are
/// stripped and a regex extractor handles free-form output as a fallback.
pub fn parse_ai_questions(raw: &str) -> Vec<QuizQuestion> {
    let trimmed = strip_code_fences(raw);

    if let Ok(ai_questions) = serde_json::from_str::<Vec<AiQuestion>>(trimmed) {
        let questions: Vec<QuizQuestion> = ai_questions
            .into_iter()
            .map(|q| QuizQuestion {
                question: q.question,
                options: q.options,
                answer: q.correct_answer.trim().to_uppercase(),
                explanation: q.explanation,
                difficulty: default_difficulty(),
            })
            .filter(validate_question)
            .collect();

        if !questions.is_empty() {
            return questions;
        }
    }

    debug!("JSON parse yielded nothing, falling back to regex extraction");
    parse_questions_manually(trimmed)
}

/// Strip markdown code fences the model sometimes wraps JSON in
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Validate a question: exactly four options and an answer in A-D
pub fn validate_question(question: &QuizQuestion) -> bool {
    question.options.len() == 4
        && ANSWER_LETTERS.contains(&question.answer.as_str())
        && !question.question.trim().is_empty()
        && question.options.iter().all(|o| !o.trim().is_empty())
}

/// Regex fallback for non-JSON AI output
///
/// Splits the text into question blocks, then pulls options and the answer
/// letter out of each block. Questions that don't yield four options and an
/// answer are dropped.
fn parse_questions_manually(text: &str) -> Vec<QuizQuestion> {
    let mut questions = Vec::new();

    // Split on question headers; the first fragment precedes any question
    let mut blocks: Vec<&str> = Vec::new();
    let mut last_start = None;
    for m in QUESTION_PATTERN.find_iter(text) {
        if let Some(start) = last_start {
            blocks.push(&text[start..m.start()]);
        }
        last_start = Some(m.start());
    }
    if let Some(start) = last_start {
        blocks.push(&text[start..]);
    }

    for block in blocks {
        let Some(question_caps) = QUESTION_PATTERN.captures(block) else {
            continue;
        };

        let options: Vec<String> = OPTION_PATTERN
            .captures_iter(block)
            .take(4)
            .map(|caps| caps[2].trim().to_string())
            .collect();

        let answer = ANSWER_PATTERN
            .captures(block)
            .map(|caps| caps[1].to_uppercase());

        if let (4, Some(answer)) = (options.len(), answer) {
            let mut question_text = question_caps[1].trim().to_string();
            // The header regex is greedy up to end of line; drop a trailing option leak
            if let Some(pos) = question_text.find("\nA.") {
                question_text.truncate(pos);
            }

            let question = QuizQuestion {
                question: question_text,
                options,
                answer,
                explanation: String::new(),
                difficulty: default_difficulty(),
            };

            if validate_question(&question) {
                questions.push(question);
            }
        }
    }

    questions
}

/// Produce a variation of a quiz: shuffled options and question order
///
/// The answer letter is remapped so every variation stays correct.
pub fn shuffle_variation(questions: &[QuizQuestion]) -> Vec<QuizQuestion> {
    let mut rng = rand::rng();
    let mut varied: Vec<QuizQuestion> = questions
        .iter()
        .filter_map(|q| {
            let correct_index = q.answer_index()?;
            let correct_text = q.options.get(correct_index)?.clone();

            let mut options = q.options.clone();
            options.shuffle(&mut rng);
            let new_index = options.iter().position(|o| *o == correct_text)?;

            Some(QuizQuestion {
                question: q.question.clone(),
                options,
                answer: ANSWER_LETTERS[new_index].to_string(),
                explanation: q.explanation.clone(),
                difficulty: q.difficulty.clone(),
            })
        })
        .collect();

    varied.shuffle(&mut rng);
    varied
}

/// Generate simple fill-in-the-blank questions without AI
///
/// Fallback used when the AI is unavailable: long sentences get a content
/// word blanked out, with distractors drawn from the other content words.
pub fn fill_blank_questions(text: &str, num_questions: usize) -> Vec<QuizQuestion> {
    let mut rng = rand::rng();
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| s.len() > 20 && s.split_whitespace().count() > 5)
        .collect();

    let mut questions = Vec::new();

    for sentence in sentences {
        if questions.len() >= num_questions {
            break;
        }

        let content_words: Vec<&str> = sentence
            .split_whitespace()
            .filter(|w| w.len() > 3 && w.chars().all(|c| c.is_alphanumeric()))
            .collect();

        if content_words.len() < 4 {
            continue;
        }

        let target = content_words[rng.random_range(0..content_words.len())];
        let blanked = sentence.replacen(target, "______", 1);

        let mut options: Vec<String> = vec![target.to_string()];
        for word in &content_words {
            if options.len() >= 4 {
                break;
            }
            if *word != target && !options.contains(&(*word).to_string()) {
                options.push((*word).to_string());
            }
        }
        while options.len() < 4 {
            options.push(format!("Option {}", options.len() + 1));
        }

        options.shuffle(&mut rng);
        let correct_index = options
            .iter()
            .position(|o| o == target)
            .unwrap_or_default();

        questions.push(QuizQuestion {
            question: format!("Fill in the blank: {blanked}"),
            options,
            answer: ANSWER_LETTERS[correct_index].to_string(),
            explanation: format!("The correct word is '{target}'"),
            difficulty: "easy".to_string(),
        });
    }

    questions
}

/// Parse stored questions JSON back into structs
pub fn parse_stored_questions(questions_json: &str) -> Result<Vec<QuizQuestion>> {
    serde_json::from_str(questions_json).context("Failed to parse stored quiz questions")
}

/// Format a quiz for display in Telegram, optionally revealing answers
pub fn format_quiz_message(title: &str, questions: &[QuizQuestion], show_answers: bool) -> String {
    let mut text = format!("🧠 **{title}**\n\n");

    for (i, question) in questions.iter().enumerate() {
        text.push_str(&format!("**Q{}.** {}\n", i + 1, question.question));

        for (j, option) in question.options.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", ANSWER_LETTERS[j], option));
        }

        if show_answers {
            text.push_str(&format!("**Answer:** {}\n", question.answer));
            if !question.explanation.is_empty() {
                text.push_str(&format!("**Explanation:** {}\n", question.explanation));
            }
        }

        text.push('\n');
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_question() -> QuizQuestion {
        QuizQuestion {
            question: "Bharat ka capital kya hai?".to_string(),
            options: vec![
                "Mumbai".to_string(),
                "Delhi".to_string(),
                "Kolkata".to_string(),
                "Chennai".to_string(),
            ],
            answer: "B".to_string(),
            explanation: "New Delhi is the capital of India".to_string(),
            difficulty: "easy".to_string(),
        }
    }

    #[test]
    fn test_parse_json_questions() {
        let raw = r#"[
            {
                "question": "2 + 2 = ?",
                "options": ["3", "4", "5", "6"],
                "correct_answer": "b",
                "explanation": "Basic addition"
            }
        ]"#;

        let questions = parse_ai_questions(raw);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].answer, "B");
        assert_eq!(questions[0].options.len(), 4);
    }

    #[test]
    fn test_parse_json_in_code_fence() {
        let raw = "```json\n[{\"question\": \"Q?\", \"options\": [\"a\",\"b\",\"c\",\"d\"], \"correct_answer\": \"A\"}]\n```";
        let questions = parse_ai_questions(raw);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].answer, "A");
    }

    #[test]
    fn test_parse_rejects_invalid_questions() {
        // Three options only
        let raw = r#"[{"question": "Q?", "options": ["a","b","c"], "correct_answer": "A"}]"#;
        assert!(parse_ai_questions(raw).is_empty());

        // Answer outside A-D
        let raw = r#"[{"question": "Q?", "options": ["a","b","c","d"], "correct_answer": "E"}]"#;
        assert!(parse_ai_questions(raw).is_empty());
    }

    #[test]
    fn test_manual_parse_fallback() {
        let raw = "Q1. Sabse bada planet kaun sa hai?\nA. Earth\nB. Jupiter\nC. Saturn\nD. Mars\nAnswer: B\n\nQ2. 1 minute me kitne seconds?\nA. 50\nB. 60\nC. 70\nD. 80\nCorrect: B";

        let questions = parse_ai_questions(raw);
        assert_eq!(questions.len(), 2);
        assert!(questions[0].question.contains("planet"));
        assert_eq!(questions[0].answer, "B");
        assert_eq!(questions[1].options[1], "60");
    }

    #[test]
    fn test_shuffle_variation_keeps_answer_correct() {
        let original = vec![sample_question()];

        for _ in 0..10 {
            let varied = shuffle_variation(&original);
            assert_eq!(varied.len(), 1);
            let index = varied[0].answer_index().expect("valid answer letter");
            assert_eq!(varied[0].options[index], "Delhi");
        }
    }

    #[test]
    fn test_fill_blank_generation() {
        let text = "Photosynthesis converts sunlight into chemical energy inside plant cells. \
                    Mitochondria produce most of the chemical energy needed to power cells.";

        let questions = fill_blank_questions(text, 2);
        assert!(!questions.is_empty());
        for question in &questions {
            assert!(question.question.contains("______"));
            assert_eq!(question.options.len(), 4);
            let index = question.answer_index().expect("valid answer letter");
            // The blanked word is among the options at the answer position
            assert!(!question.options[index].is_empty());
        }
    }

    #[test]
    fn test_format_quiz_message() {
        let questions = vec![sample_question()];

        let without_answers = format_quiz_message("GK Quiz", &questions, false);
        assert!(without_answers.contains("Bharat ka capital"));
        assert!(without_answers.contains("A. Mumbai"));
        assert!(!without_answers.contains("**Answer:**"));

        let with_answers = format_quiz_message("GK Quiz", &questions, true);
        assert!(with_answers.contains("**Answer:** B"));
        assert!(with_answers.contains("**Explanation:**"));
    }

    #[test]
    fn test_stored_questions_round_trip() {
        let questions = vec![sample_question()];
        let json = serde_json::to_string(&questions).expect("serialize");
        let parsed = parse_stored_questions(&json).expect("parse");
        assert_eq!(parsed, questions);
    }
}
