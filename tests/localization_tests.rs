//! # Localization Tests
//!
//! Verifies that both locale bundles carry the strings the handlers rely on,
//! that argument substitution works, and that unknown languages fall back to
//! the default voice.

use study_sathi::localization::{create_localization_manager, detect_language, t_args_lang, t_lang};

/// Keys every locale must define — one entry per user-visible flow
const REQUIRED_KEYS: &[&str] = &[
    "welcome-title",
    "welcome-features",
    "welcome-commands",
    "help-title",
    "greeting-response",
    "thanks-response",
    "best-wishes-1",
    "best-wishes-2",
    "best-wishes-3",
    "doubt-prompt",
    "quiz-prompt",
    "ai-fallback",
    "notes-empty",
    "notes-header",
    "notes-send-error",
    "file-saved",
    "error-file-too-large",
    "processing-photo",
    "processing-pdf",
    "doubt-solved-caption",
    "error-no-text-found",
    "error-solve-failed",
    "error-download-failed",
    "error-unsupported-format",
    "error-quiz-failed",
    "quiz-take-button",
    "quiz-none",
    "quiz-list-header",
    "quiz-not-found",
    "quiz-expired",
    "quiz-finished",
    "memory-title",
    "memory-empty",
    "stats-title",
    "stats-empty",
    "group-quiz-hint",
    "group-quiz-active",
    "group-quiz-intro",
    "group-quiz-join-button",
    "group-quiz-joined",
    "group-quiz-join-closed",
    "group-quiz-no-participants",
    "group-quiz-question",
    "group-quiz-times-up",
    "group-quiz-correct",
    "group-quiz-wrong",
    "group-quiz-already-answered",
    "group-quiz-not-joined",
    "group-quiz-expired",
    "group-quiz-results",
    "group-quiz-total-participants",
    "leaderboard-title",
    "leaderboard-hint",
    "leaderboard-empty",
    "unsupported-message",
    "unknown-command",
    "cancelled",
];

#[test]
fn test_all_keys_present_in_both_locales() {
    let manager = create_localization_manager().expect("localization manager");

    for locale in ["en", "hi"] {
        for key in REQUIRED_KEYS {
            let value = manager.get_message_in_language(key, locale, None);
            assert!(
                !value.starts_with("Missing translation"),
                "locale {locale} is missing key {key}"
            );
            assert!(!value.trim().is_empty(), "locale {locale} key {key} is empty");
        }
    }
}

#[test]
fn test_argument_substitution() {
    let manager = create_localization_manager().expect("localization manager");

    let greeting = t_args_lang(&manager, "welcome-title", &[("name", "Asha")], Some("en"));
    assert!(greeting.contains("Asha"));

    let joined = t_args_lang(&manager, "group-quiz-joined", &[("count", "3")], Some("en"));
    assert!(joined.contains('3'));
}

#[test]
fn test_language_detection_and_fallback() {
    let manager = create_localization_manager().expect("localization manager");

    assert_eq!(detect_language(&manager, Some("hi")), "hi");
    assert_eq!(detect_language(&manager, Some("hi-IN")), "hi");
    assert_eq!(detect_language(&manager, Some("en-US")), "en");
    // Unsupported languages fall back to the default voice
    assert_eq!(detect_language(&manager, Some("fr")), "en");
    assert_eq!(detect_language(&manager, None), "en");

    // Unknown key reports itself rather than panicking
    let missing = t_lang(&manager, "definitely-not-a-key", Some("en"));
    assert!(missing.contains("definitely-not-a-key"));
}

#[test]
fn test_hindi_strings_differ_from_default() {
    let manager = create_localization_manager().expect("localization manager");

    let en = t_lang(&manager, "memory-empty", Some("en"));
    let hi = t_lang(&manager, "memory-empty", Some("hi"));
    assert_ne!(en, hi);
}
