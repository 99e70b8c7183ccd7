//! # Intent Detection Module
//!
//! This module classifies free-text messages so the bot can route them without
//! an AI round-trip: file requests, quiz requests, doubts, greetings, thanks,
//! and best wishes are all recognized locally from regex pattern tables,
//! including the Hinglish phrasings students actually type ("notes chahiye",
//! "bhejo"). It also extracts the academic subject from the message and
//! recent history, and scores its own confidence.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::ConversationTurn;

/// The recognized intent of a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FileRequest,
    QuizRequest,
    DoubtSolving,
    Greeting,
    Thanks,
    BestWishes,
    General,
}

impl Intent {
    /// Stable string name used when persisting the analysis
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FileRequest => "file_request",
            Intent::QuizRequest => "quiz_request",
            Intent::DoubtSolving => "doubt_solving",
            Intent::Greeting => "greeting",
            Intent::Thanks => "thanks",
            Intent::BestWishes => "best_wishes",
            Intent::General => "general",
        }
    }
}

/// Result of analyzing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub intent: Intent,
    pub subject: Option<Subject>,
    pub confidence: f32,
}

/// Academic subjects the bot recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    Physics,
    Chemistry,
    Biology,
    Computer,
    English,
    Hindi,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::Computer => "computer",
            Subject::English => "english",
            Subject::Hindi => "hindi",
        }
    }

    /// Display name for messages shown to users
    pub fn display(&self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::Computer => "Computer",
            Subject::English => "English",
            Subject::Hindi => "Hindi",
        }
    }

    fn all() -> &'static [Subject] {
        &[
            Subject::Math,
            Subject::Physics,
            Subject::Chemistry,
            Subject::Biology,
            Subject::Computer,
            Subject::English,
            Subject::Hindi,
        ]
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Subject::Math => &[
                "math",
                "mathematics",
                "algebra",
                "geometry",
                "calculus",
                "trigonometry",
                "statistics",
            ],
            Subject::Physics => &[
                "physics",
                "mechanics",
                "thermodynamics",
                "optics",
                "electricity",
                "magnetism",
            ],
            Subject::Chemistry => &[
                "chemistry",
                "organic",
                "inorganic",
                "physical chemistry",
                "biochemistry",
            ],
            Subject::Biology => &["biology", "botany", "zoology", "genetics", "ecology", "anatomy"],
            Subject::Computer => &[
                "computer",
                "programming",
                "coding",
                "software",
                "algorithm",
                "data structure",
            ],
            Subject::English => &["english", "grammar", "literature", "essay", "writing", "reading"],
            Subject::Hindi => &["hindi", "sahitya", "vyakaran", "kavita", "kahani"],
        }
    }
}

lazy_static! {
    static ref FILE_REQUEST_PATTERNS: Vec<Regex> = compile(&[
        r"send me (.*)",
        r"(.*) notes chahiye",
        r"(.*) file do",
        r"share (.*)",
        r"(.*) notes bhejo",
    ]);
    static ref QUIZ_REQUEST_PATTERNS: Vec<Regex> = compile(&[
        r"quiz (.*)",
        r"test (.*)",
        r"questions (.*)",
        r"mcq (.*)",
    ]);
    static ref DOUBT_PATTERNS: Vec<Regex> = compile(&[
        r"doubt (.*)",
        r"problem (.*)",
        r"help (.*)",
        r"solve (.*)",
        r"explain (.*)",
    ]);
    static ref GREETING_PATTERNS: Vec<Regex> = compile(&[
        r"^(hi|hello|hey|namaste|namaskar)\b",
        r"good morning|good afternoon|good evening",
        r"kaise ho|how are you",
    ]);
    static ref THANKS_PATTERNS: Vec<Regex> = compile(&[
        r"thanks|thank you|dhanyawad|shukriya",
        r"\b(great|awesome|perfect|excellent)\b",
    ]);
    static ref BEST_WISHES_PATTERNS: Vec<Regex> = compile(&[
        r"best wishes|good luck|all the best",
        r"wish you|wishing you",
    ]);
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("intent pattern must compile"))
        .collect()
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Detect the intent of a message
///
/// Pattern tables are checked first; keyword fallbacks catch phrasings the
/// patterns miss. Order matters: thanks/best-wishes before the generic
/// buckets so "thanks for the notes" is a thanks, not a file request.
pub fn detect_intent(message: &str) -> Intent {
    let text = message.to_lowercase();

    if matches_any(&THANKS_PATTERNS, &text) {
        return Intent::Thanks;
    }
    if matches_any(&BEST_WISHES_PATTERNS, &text) {
        return Intent::BestWishes;
    }
    if matches_any(&GREETING_PATTERNS, &text) {
        return Intent::Greeting;
    }
    if matches_any(&FILE_REQUEST_PATTERNS, &text) {
        return Intent::FileRequest;
    }
    if matches_any(&QUIZ_REQUEST_PATTERNS, &text) {
        return Intent::QuizRequest;
    }
    if matches_any(&DOUBT_PATTERNS, &text) {
        return Intent::DoubtSolving;
    }

    // Keyword fallbacks
    if ["file", "notes", "send", "share"].iter().any(|w| text.contains(w)) {
        Intent::FileRequest
    } else if ["quiz", "test", "questions"].iter().any(|w| text.contains(w)) {
        Intent::QuizRequest
    } else if ["doubt", "problem", "help", "solve"].iter().any(|w| text.contains(w)) {
        Intent::DoubtSolving
    } else {
        Intent::General
    }
}

/// Extract the academic subject from a message, falling back to recent history
pub fn extract_subject(message: &str, history: &[ConversationTurn]) -> Option<Subject> {
    let text = message.to_lowercase();

    for subject in Subject::all() {
        if subject.keywords().iter().any(|kw| text.contains(kw)) {
            return Some(*subject);
        }
    }

    // Look at the last few turns for a subject still in play
    for turn in history.iter().rev().take(3) {
        let turn_text = turn.message.to_lowercase();
        for subject in Subject::all() {
            if subject.keywords().iter().any(|kw| turn_text.contains(kw)) {
                return Some(*subject);
            }
        }
    }

    None
}

/// Confidence score for an analysis, in [0.5, 1.0]
fn calculate_confidence(intent: Intent, subject: Option<Subject>, message: &str) -> f32 {
    let mut confidence: f32 = 0.5;

    if intent != Intent::General {
        confidence += 0.2;
    }
    if subject.is_some() {
        confidence += 0.2;
    }
    if message.split_whitespace().count() > 3 {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

/// Analyze one message against the user's recent history
pub fn analyze_message(message: &str, history: &[ConversationTurn]) -> ContextAnalysis {
    let intent = detect_intent(message);
    let subject = extract_subject(message, history);
    let confidence = calculate_confidence(intent, subject, message);

    ContextAnalysis {
        intent,
        subject,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(sender: &str, message: &str) -> ConversationTurn {
        ConversationTurn {
            message: message.to_string(),
            sender: sender.to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_detect_file_request() {
        assert_eq!(detect_intent("send me physics notes"), Intent::FileRequest);
        assert_eq!(detect_intent("chemistry notes chahiye"), Intent::FileRequest);
        assert_eq!(detect_intent("maths notes bhejo"), Intent::FileRequest);
    }

    #[test]
    fn test_detect_quiz_request() {
        assert_eq!(detect_intent("quiz banao biology ka"), Intent::QuizRequest);
        assert_eq!(detect_intent("mcq practice karni hai"), Intent::QuizRequest);
    }

    #[test]
    fn test_detect_doubt() {
        assert_eq!(detect_intent("doubt hai is question me"), Intent::DoubtSolving);
        assert_eq!(detect_intent("solve this integral"), Intent::DoubtSolving);
    }

    #[test]
    fn test_detect_social_intents() {
        assert_eq!(detect_intent("namaste"), Intent::Greeting);
        assert_eq!(detect_intent("thanks yaar"), Intent::Thanks);
        assert_eq!(detect_intent("dhanyawad"), Intent::Thanks);
        assert_eq!(detect_intent("best wishes for exams"), Intent::BestWishes);
    }

    #[test]
    fn test_thanks_wins_over_file_keywords() {
        assert_eq!(detect_intent("thanks for the notes"), Intent::Thanks);
    }

    #[test]
    fn test_general_fallback() {
        assert_eq!(detect_intent("kya chal raha hai"), Intent::General);
    }

    #[test]
    fn test_subject_from_message() {
        assert_eq!(extract_subject("algebra samjha do", &[]), Some(Subject::Math));
        assert_eq!(
            extract_subject("thermodynamics ka chapter", &[]),
            Some(Subject::Physics)
        );
        assert_eq!(extract_subject("kuch bhi", &[]), None);
    }

    #[test]
    fn test_subject_from_history() {
        let history = vec![
            turn("user", "physics padh raha hun"),
            turn("bot", "Great!"),
        ];
        assert_eq!(extract_subject("aur notes bhejo", &history), Some(Subject::Physics));
    }

    #[test]
    fn test_history_lookback_is_limited() {
        let mut history = vec![turn("user", "chemistry ka doubt")];
        for _ in 0..3 {
            history.push(turn("user", "theek hai"));
        }
        // The chemistry turn is four messages back, outside the window
        assert_eq!(extract_subject("aur batao", &history), None);
    }

    #[test]
    fn test_confidence_scoring() {
        // Determinate intent + subject + long message hits the ceiling
        let analysis = analyze_message("send me the physics notes please", &[]);
        assert_eq!(analysis.intent, Intent::FileRequest);
        assert_eq!(analysis.subject, Some(Subject::Physics));
        assert!((analysis.confidence - 1.0).abs() < f32::EPSILON);

        // Short general message stays at the base score
        let analysis = analyze_message("acha", &[]);
        assert_eq!(analysis.intent, Intent::General);
        assert!((analysis.confidence - 0.5).abs() < f32::EPSILON);
    }
}
