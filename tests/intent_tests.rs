//! Integration tests for intent detection and context analysis

use chrono::Utc;
use study_sathi::db::ConversationTurn;
use study_sathi::intent::{analyze_message, detect_intent, extract_subject, Intent, Subject};

fn turn(sender: &str, message: &str) -> ConversationTurn {
    ConversationTurn {
        message: message.to_string(),
        sender: sender.to_string(),
        message_type: "text".to_string(),
        created_at: Utc::now(),
    }
}

#[test]
fn test_hinglish_file_requests() {
    for text in [
        "send me physics notes",
        "chemistry notes chahiye",
        "maths file do",
        "share your biology notes",
        "organic notes bhejo",
    ] {
        assert_eq!(detect_intent(text), Intent::FileRequest, "failed for: {text}");
    }
}

#[test]
fn test_quiz_and_doubt_requests() {
    assert_eq!(detect_intent("quiz chahiye physics ka"), Intent::QuizRequest);
    assert_eq!(detect_intent("mcq practice"), Intent::QuizRequest);
    assert_eq!(detect_intent("doubt hai yaar"), Intent::DoubtSolving);
    assert_eq!(detect_intent("explain newton's second law"), Intent::DoubtSolving);
}

#[test]
fn test_social_intents() {
    assert_eq!(detect_intent("hi"), Intent::Greeting);
    assert_eq!(detect_intent("namaste sathi"), Intent::Greeting);
    assert_eq!(detect_intent("shukriya bhai"), Intent::Thanks);
    assert_eq!(detect_intent("all the best for you too"), Intent::BestWishes);
}

#[test]
fn test_general_fallback() {
    assert_eq!(detect_intent("aaj mausam acha hai"), Intent::General);
}

#[test]
fn test_subject_extraction_prefers_current_message() {
    let history = vec![turn("user", "biology revision kar raha tha")];
    // Current message mentions physics, history says biology; message wins
    assert_eq!(
        extract_subject("ab physics ka doubt hai", &history),
        Some(Subject::Physics)
    );
}

#[test]
fn test_subject_extraction_falls_back_to_history() {
    let history = vec![
        turn("user", "calculus problems solve karne hai"),
        turn("bot", "Zaroor!"),
    ];
    assert_eq!(extract_subject("aur do", &history), Some(Subject::Math));
}

#[test]
fn test_analysis_combines_intent_and_subject() {
    let analysis = analyze_message("send me thermodynamics notes please", &[]);
    assert_eq!(analysis.intent, Intent::FileRequest);
    assert_eq!(analysis.subject, Some(Subject::Physics));
    assert!(analysis.confidence >= 0.9);
}

#[test]
fn test_analysis_serializes_for_context_storage() {
    let analysis = analyze_message("quiz banao chemistry ka", &[]);
    let json = serde_json::to_string(&analysis).expect("analysis serializes");
    assert!(json.contains("quiz_request"));
    assert!(json.contains("chemistry"));

    let parsed: study_sathi::intent::ContextAnalysis =
        serde_json::from_str(&json).expect("analysis parses");
    assert_eq!(parsed, analysis);
}
