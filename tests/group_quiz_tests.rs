//! Integration tests for the in-memory group quiz registry

use study_sathi::bot::group_quiz::{default_quiz, AnswerOutcome, GroupQuizRegistry};

const CHAT: i64 = -1001;
const ADMIN: i64 = 11;
const PLAYER: i64 = 22;

fn registry_with_session() -> GroupQuizRegistry {
    let registry = GroupQuizRegistry::new();
    assert!(registry.start(CHAT, default_quiz(), ADMIN));
    registry
}

#[test]
fn test_only_one_session_per_chat() {
    let registry = registry_with_session();
    assert!(registry.is_active(CHAT));
    // A second start in the same chat is refused
    assert!(!registry.start(CHAT, default_quiz(), ADMIN));
    // A different chat is fine
    assert!(registry.start(CHAT - 1, default_quiz(), ADMIN));
}

#[test]
fn test_join_window() {
    let registry = registry_with_session();

    assert_eq!(registry.join(CHAT, PLAYER, "Asha"), Some(1));
    // Joining twice doesn't duplicate the participant
    assert_eq!(registry.join(CHAT, PLAYER, "Asha"), Some(1));
    assert_eq!(registry.join(CHAT, PLAYER + 1, "Ravi"), Some(2));

    assert_eq!(registry.close_joining(CHAT), 2);
    // The window is closed now
    assert_eq!(registry.join(CHAT, PLAYER + 2, "Late"), None);

    // Joining a chat without a session fails
    assert_eq!(registry.join(CHAT + 5, PLAYER, "Nobody"), None);
}

#[test]
fn test_answer_outcomes() {
    let registry = registry_with_session();
    registry.join(CHAT, PLAYER, "Asha");
    registry.close_joining(CHAT);
    registry.set_current_question(CHAT, 0);

    // Non-participant
    assert_eq!(
        registry.record_answer(CHAT, 999, 0, "B"),
        AnswerOutcome::NotJoined
    );

    // Wrong question index (stale button)
    assert_eq!(
        registry.record_answer(CHAT, PLAYER, 3, "B"),
        AnswerOutcome::NoActiveQuestion
    );

    // First answer counts; the default quiz's first answer is B
    assert_eq!(
        registry.record_answer(CHAT, PLAYER, 0, "B"),
        AnswerOutcome::Recorded { correct: true }
    );

    // Second answer to the same question is rejected
    assert_eq!(
        registry.record_answer(CHAT, PLAYER, 0, "C"),
        AnswerOutcome::AlreadyAnswered
    );

    // Next question, wrong answer
    registry.set_current_question(CHAT, 1);
    assert_eq!(
        registry.record_answer(CHAT, PLAYER, 1, "A"),
        AnswerOutcome::Recorded { correct: false }
    );
}

#[test]
fn test_scoring_and_finish() {
    let registry = registry_with_session();
    registry.join(CHAT, PLAYER, "Asha");
    registry.join(CHAT, PLAYER + 1, "Ravi");
    registry.close_joining(CHAT);

    let quiz = default_quiz();
    for (index, question) in quiz.questions.iter().enumerate() {
        registry.set_current_question(CHAT, index);
        // Asha always answers correctly, Ravi always picks A
        registry.record_answer(CHAT, PLAYER, index, &question.answer);
        registry.record_answer(CHAT, PLAYER + 1, index, "A");
    }

    let session = registry.finish(CHAT).expect("session exists");
    assert!(!registry.is_active(CHAT));

    let asha = &session.participants[&PLAYER];
    assert_eq!(asha.score, quiz.questions.len() as i32);

    // One default-quiz answer is A, so Ravi scores exactly that one
    let ravi = &session.participants[&(PLAYER + 1)];
    let a_count = quiz.questions.iter().filter(|q| q.answer == "A").count() as i32;
    assert_eq!(ravi.score, a_count);

    // Finishing again yields nothing
    assert!(registry.finish(CHAT).is_none());
}
