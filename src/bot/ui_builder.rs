//! UI Builder module for creating keyboards and formatting messages

use std::sync::Arc;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::db::{FileTypeStats, StoredFile, UserStats};
use crate::localization::{t_lang, LocalizationManager};
use crate::quiz::ANSWER_LETTERS;

/// Keyboard with a single join button for a group quiz
pub fn create_join_keyboard(
    chat_id: i64,
    language_code: Option<&str>,
    localization: &Arc<LocalizationManager>,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        format!("🎯 {}", t_lang(localization, "group-quiz-join-button", language_code)),
        format!("gj:{chat_id}"),
    )]])
}

/// A/B/C/D answer keyboard for a group quiz question
pub fn create_group_answer_keyboard(
    chat_id: i64,
    question_index: usize,
    _language_code: Option<&str>,
    _localization: &Arc<LocalizationManager>,
) -> InlineKeyboardMarkup {
    let row = |letters: &[&str]| {
        letters
            .iter()
            .map(|letter| {
                InlineKeyboardButton::callback(
                    (*letter).to_string(),
                    format!("ga:{chat_id}:{question_index}:{letter}"),
                )
            })
            .collect::<Vec<_>>()
    };

    InlineKeyboardMarkup::new(vec![row(&ANSWER_LETTERS[..2]), row(&ANSWER_LETTERS[2..])])
}

/// A/B/C/D answer keyboard for a private quiz attempt
pub fn create_private_answer_keyboard(quiz_id: i64, question_index: usize) -> InlineKeyboardMarkup {
    let row = |letters: &[&str]| {
        letters
            .iter()
            .map(|letter| {
                InlineKeyboardButton::callback(
                    (*letter).to_string(),
                    format!("pq:{quiz_id}:{question_index}:{letter}"),
                )
            })
            .collect::<Vec<_>>()
    };

    InlineKeyboardMarkup::new(vec![row(&ANSWER_LETTERS[..2]), row(&ANSWER_LETTERS[2..])])
}

/// Button offered under a freshly generated quiz
pub fn create_take_quiz_keyboard(
    quiz_id: i64,
    language_code: Option<&str>,
    localization: &Arc<LocalizationManager>,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        format!("📝 {}", t_lang(localization, "quiz-take-button", language_code)),
        format!("take_quiz:{quiz_id}"),
    )]])
}

/// Keyboard listing a user's recent quizzes
pub fn create_quiz_list_keyboard(quizzes: &[(i64, String)]) -> InlineKeyboardMarkup {
    let buttons = quizzes
        .iter()
        .map(|(quiz_id, title)| {
            let button_text = if title.len() > 30 {
                format!("{}...", &title[..27])
            } else {
                title.clone()
            };
            vec![InlineKeyboardButton::callback(
                button_text,
                format!("take_quiz:{quiz_id}"),
            )]
        })
        .collect::<Vec<_>>();

    InlineKeyboardMarkup::new(buttons)
}

/// Format a file listing as a numbered list
pub fn format_files_list(files: &[StoredFile]) -> String {
    let mut result = String::new();
    for (i, file) in files.iter().enumerate() {
        result.push_str(&format!("{}. {}\n", i + 1, file.filename));
    }
    result
}

/// Format a user's chat memory, oldest first, long messages truncated
pub fn format_memory(
    history: &[crate::db::ConversationTurn],
    language_code: Option<&str>,
    localization: &Arc<LocalizationManager>,
) -> String {
    let mut text = format!("🧠 **{}**\n\n", t_lang(localization, "memory-title", language_code));

    for turn in history {
        let speaker = if turn.sender == "user" {
            "You"
        } else {
            "🤖 Sathi"
        };
        let mut content = turn.message.clone();
        if content.chars().count() > 100 {
            content = content.chars().take(100).collect::<String>() + "...";
        }
        text.push_str(&format!("*{}:* {}\n", speaker, content));
    }

    text
}

/// Format /stats output
pub fn format_stats(
    stats: &UserStats,
    file_breakdown: &[FileTypeStats],
    language_code: Option<&str>,
    localization: &Arc<LocalizationManager>,
) -> String {
    let mut text = format!(
        "📊 **{}**\n\n",
        t_lang(localization, "stats-title", language_code)
    );
    text.push_str(&format!("💬 Messages: {}\n", stats.total_messages));
    text.push_str(&format!("📁 Files: {}\n", stats.files_uploaded));
    text.push_str(&format!("🧠 Quizzes: {}\n", stats.quizzes_created));
    text.push_str(&format!(
        "🎯 Attempts: {} (avg {:.1}%)\n",
        stats.quiz_attempts, stats.average_score
    ));
    text.push_str(&format!(
        "📅 Member since: {}\n",
        stats.member_since.format("%Y-%m-%d")
    ));

    if !file_breakdown.is_empty() {
        text.push('\n');
        for entry in file_breakdown {
            text.push_str(&format!(
                "• {}: {} ({} KB)\n",
                entry.file_type,
                entry.count,
                entry.total_size / 1024
            ));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(id: i64, name: &str) -> StoredFile {
        StoredFile {
            id,
            telegram_id: 1,
            filename: name.to_string(),
            filepath: format!("files/pdfs/{name}"),
            file_type: "pdf".to_string(),
            file_size: 100,
            file_hash: None,
            description: None,
            tags: "[]".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_files_list() {
        let files = vec![file(1, "physics.pdf"), file(2, "chem.pdf")];
        let text = format_files_list(&files);
        assert_eq!(text, "1. physics.pdf\n2. chem.pdf\n");
    }

    #[test]
    fn test_private_answer_keyboard_layout() {
        let keyboard = create_private_answer_keyboard(9, 2);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(keyboard.inline_keyboard[1].len(), 2);
    }

    #[test]
    fn test_quiz_list_truncates_long_titles() {
        let long_title = "A very long quiz title that will not fit on a button".to_string();
        let keyboard = create_quiz_list_keyboard(&[(1, long_title)]);
        if let teloxide::types::InlineKeyboardButtonKind::CallbackData(data) =
            &keyboard.inline_keyboard[0][0].kind
        {
            assert_eq!(data, "take_quiz:1");
        } else {
            panic!("expected callback button");
        }
        assert!(keyboard.inline_keyboard[0][0].text.ends_with("..."));
    }
}
