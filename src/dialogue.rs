//! Quiz attempt dialogue module for handling conversation state with users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// Represents the conversation state for a private quiz attempt
///
/// A user taking a quiz answers one question at a time via inline buttons;
/// the state carries their progress so the callback handler can score each
/// answer and record the attempt at the end.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum QuizDialogueState {
    #[default]
    Idle,
    TakingQuiz {
        quiz_id: i64,
        current_question: usize,
        /// Answer letters given so far, in question order
        answers: Vec<String>,
        score: i32,
        started_at: DateTime<Utc>,
        language_code: Option<String>,
    },
}

/// Type alias for our quiz dialogue
pub type QuizDialogue = Dialogue<QuizDialogueState, InMemStorage<QuizDialogueState>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert!(matches!(QuizDialogueState::default(), QuizDialogueState::Idle));
    }

    #[test]
    fn test_taking_quiz_state_serializes() {
        let state = QuizDialogueState::TakingQuiz {
            quiz_id: 3,
            current_question: 1,
            answers: vec!["A".to_string()],
            score: 1,
            started_at: Utc::now(),
            language_code: Some("hi".to_string()),
        };

        let json = serde_json::to_string(&state).expect("state serializes");
        let parsed: QuizDialogueState = serde_json::from_str(&json).expect("state parses");

        match parsed {
            QuizDialogueState::TakingQuiz {
                quiz_id,
                current_question,
                answers,
                score,
                ..
            } => {
                assert_eq!(quiz_id, 3);
                assert_eq!(current_question, 1);
                assert_eq!(answers, vec!["A".to_string()]);
                assert_eq!(score, 1);
            }
            QuizDialogueState::Idle => panic!("Unexpected dialogue state"),
        }
    }
}
