//! Group quiz sessions: join window, timed questions, scoring, leaderboards

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::error_logging;
use crate::localization::{t_args_lang, t_lang};
use crate::quiz::{GeneratedQuiz, QuizQuestion};

use super::ui_builder::{create_group_answer_keyboard, create_join_keyboard};
use super::BotContext;

/// One participant's live state in a group quiz
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub score: i32,
    /// Question indexes already answered
    pub answered: Vec<usize>,
}

/// A running group quiz in one chat
#[derive(Debug)]
pub struct GroupQuizSession {
    pub quiz: GeneratedQuiz,
    pub current_question: usize,
    pub join_open: bool,
    pub participants: HashMap<i64, Participant>,
    pub started_at: DateTime<Utc>,
    pub admin_id: i64,
}

/// Outcome of recording a participant's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    NotJoined,
    NoActiveQuestion,
    AlreadyAnswered,
    Recorded { correct: bool },
}

/// Registry of active group quizzes, one per chat
#[derive(Default)]
pub struct GroupQuizRegistry {
    sessions: Mutex<HashMap<i64, GroupQuizSession>>,
}

impl GroupQuizRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a quiz is currently running in the chat
    pub fn is_active(&self, chat_id: i64) -> bool {
        self.sessions.lock().contains_key(&chat_id)
    }

    /// Start a session; returns false if one is already active
    pub fn start(&self, chat_id: i64, quiz: GeneratedQuiz, admin_id: i64) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&chat_id) {
            return false;
        }
        sessions.insert(
            chat_id,
            GroupQuizSession {
                quiz,
                current_question: 0,
                join_open: true,
                participants: HashMap::new(),
                started_at: Utc::now(),
                admin_id,
            },
        );
        true
    }

    /// Add a participant while the join window is open
    pub fn join(&self, chat_id: i64, user_id: i64, name: &str) -> Option<usize> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&chat_id)?;

        if !session.join_open {
            return None;
        }

        session.participants.entry(user_id).or_insert(Participant {
            name: name.to_string(),
            score: 0,
            answered: Vec::new(),
        });

        Some(session.participants.len())
    }

    /// Close the join window and report the participant count
    pub fn close_joining(&self, chat_id: i64) -> usize {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&chat_id) {
            Some(session) => {
                session.join_open = false;
                session.participants.len()
            }
            None => 0,
        }
    }

    /// The question at the given index, if the session exists
    pub fn question(&self, chat_id: i64, index: usize) -> Option<QuizQuestion> {
        let sessions = self.sessions.lock();
        sessions
            .get(&chat_id)
            .and_then(|s| s.quiz.questions.get(index).cloned())
    }

    /// Advance to the given question index
    pub fn set_current_question(&self, chat_id: i64, index: usize) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&chat_id) {
            session.current_question = index;
        }
    }

    /// Record a participant's answer for a question
    ///
    /// A participant may answer the current question exactly once; answers
    /// for past or future questions are rejected.
    pub fn record_answer(
        &self,
        chat_id: i64,
        user_id: i64,
        question_index: usize,
        answer: &str,
    ) -> AnswerOutcome {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(&chat_id) else {
            return AnswerOutcome::NoActiveQuestion;
        };

        if session.current_question != question_index {
            return AnswerOutcome::NoActiveQuestion;
        }

        let Some(question) = session.quiz.questions.get(question_index) else {
            return AnswerOutcome::NoActiveQuestion;
        };
        let correct = question.answer == answer;

        let Some(participant) = session.participants.get_mut(&user_id) else {
            return AnswerOutcome::NotJoined;
        };

        if participant.answered.contains(&question_index) {
            return AnswerOutcome::AlreadyAnswered;
        }

        participant.answered.push(question_index);
        if correct {
            participant.score += 1;
        }

        AnswerOutcome::Recorded { correct }
    }

    /// Remove and return a finished or cancelled session
    pub fn finish(&self, chat_id: i64) -> Option<GroupQuizSession> {
        self.sessions.lock().remove(&chat_id)
    }
}

/// Run a full group quiz in a background task
///
/// Flow: announce with a join button, wait out the join window, then one
/// question at a time with a per-question timer. With zero participants the
/// quiz is cancelled; otherwise results are posted and persisted.
pub async fn run_group_quiz(
    bot: Bot,
    ctx: Arc<BotContext>,
    chat_id: ChatId,
    quiz: GeneratedQuiz,
    admin_id: i64,
    language_code: Option<String>,
) -> anyhow::Result<()> {
    let lang = language_code.as_deref();

    if !ctx.group_quizzes.start(chat_id.0, quiz.clone(), admin_id) {
        bot.send_message(chat_id, t_lang(&ctx.localization, "group-quiz-active", lang))
            .await?;
        return Ok(());
    }

    let intro = t_args_lang(
        &ctx.localization,
        "group-quiz-intro",
        &[
            ("title", quiz.title.as_str()),
            ("count", &quiz.questions.len().to_string()),
            ("seconds", &ctx.config.quiz.time_limit_secs.to_string()),
        ],
        lang,
    );

    bot.send_message(chat_id, intro)
        .reply_markup(create_join_keyboard(chat_id.0, lang, &ctx.localization))
        .await?;

    // Everything past the announcement runs detached so the handler returns fast
    let bot = bot.clone();
    let ctx = Arc::clone(&ctx);
    let language_code = language_code.clone();
    tokio::spawn(async move {
        if let Err(e) = drive_group_quiz(bot, ctx, chat_id, language_code).await {
            error!(chat_id = %chat_id, error = %e, "Group quiz session failed");
        }
    });

    Ok(())
}

async fn drive_group_quiz(
    bot: Bot,
    ctx: Arc<BotContext>,
    chat_id: ChatId,
    language_code: Option<String>,
) -> anyhow::Result<()> {
    let lang = language_code.as_deref();

    tokio::time::sleep(Duration::from_secs(ctx.config.quiz.join_window_secs)).await;

    let participant_count = ctx.group_quizzes.close_joining(chat_id.0);
    if participant_count == 0 {
        warn!(chat_id = %chat_id, "Group quiz cancelled: no participants");
        ctx.group_quizzes.finish(chat_id.0);
        bot.send_message(
            chat_id,
            t_lang(&ctx.localization, "group-quiz-no-participants", lang),
        )
        .await?;
        return Ok(());
    }

    info!(chat_id = %chat_id, participants = participant_count, "Group quiz starting");

    let mut index = 0;
    while let Some(question) = ctx.group_quizzes.question(chat_id.0, index) {
        ctx.group_quizzes.set_current_question(chat_id.0, index);

        let header = t_args_lang(
            &ctx.localization,
            "group-quiz-question",
            &[
                ("number", &(index + 1).to_string()),
                ("seconds", &ctx.config.quiz.time_limit_secs.to_string()),
            ],
            lang,
        );

        let mut text = format!("{}\n\n**{}**\n\n", header, question.question);
        for (i, option) in question.options.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", crate::quiz::ANSWER_LETTERS[i], option));
        }

        bot.send_message(chat_id, text)
            .reply_markup(create_group_answer_keyboard(chat_id.0, index, lang, &ctx.localization))
            .await?;

        tokio::time::sleep(Duration::from_secs(ctx.config.quiz.time_limit_secs)).await;

        let mut reveal = t_args_lang(
            &ctx.localization,
            "group-quiz-times-up",
            &[("answer", question.answer.as_str())],
            lang,
        );
        if !question.explanation.is_empty() {
            reveal.push_str(&format!("\n💡 {}", question.explanation));
        }
        bot.send_message(chat_id, reveal).await?;

        index += 1;

        // Short pause before the next question
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    finish_group_quiz(&bot, &ctx, chat_id, lang).await
}

async fn finish_group_quiz(
    bot: &Bot,
    ctx: &Arc<BotContext>,
    chat_id: ChatId,
    lang: Option<&str>,
) -> anyhow::Result<()> {
    let Some(session) = ctx.group_quizzes.finish(chat_id.0) else {
        return Ok(());
    };

    let total_questions = session.quiz.questions.len() as i32;
    let mut results: Vec<(i64, Participant)> = session.participants.into_iter().collect();
    results.sort_by(|a, b| b.1.score.cmp(&a.1.score));

    let mut text = format!("{}\n\n", t_lang(&ctx.localization, "group-quiz-results", lang));
    for (rank, (_, participant)) in results.iter().take(10).enumerate() {
        let medal = match rank {
            0 => "🥇".to_string(),
            1 => "🥈".to_string(),
            2 => "🥉".to_string(),
            _ => format!("{}.", rank + 1),
        };
        let percentage = if total_questions > 0 {
            f64::from(participant.score) / f64::from(total_questions) * 100.0
        } else {
            0.0
        };
        text.push_str(&format!(
            "{} **{}** - {}/{} ({:.1}%)\n",
            medal, participant.name, participant.score, total_questions, percentage
        ));
    }
    text.push_str(&t_args_lang(
        &ctx.localization,
        "group-quiz-total-participants",
        &[("count", &results.len().to_string())],
        lang,
    ));

    bot.send_message(chat_id, text).await?;

    // Persist the session and per-user results
    let quiz_json = serde_json::to_string(&session.quiz).unwrap_or_else(|_| "{}".to_string());
    match db::create_group_quiz_session(
        &ctx.pool,
        chat_id.0,
        &session.quiz.title,
        session.started_at,
        results.len() as i32,
        &quiz_json,
    )
    .await
    {
        Ok(session_id) => {
            for (user_id, participant) in &results {
                let percentage = if total_questions > 0 {
                    f64::from(participant.score) / f64::from(total_questions) * 100.0
                } else {
                    0.0
                };
                if let Err(e) = db::record_group_quiz_result(
                    &ctx.pool,
                    session_id,
                    *user_id,
                    participant.score,
                    total_questions,
                    percentage,
                )
                .await
                {
                    error_logging::log_database_error(&e, "record_group_quiz_result", Some(*user_id));
                }
            }
        }
        Err(e) => {
            error_logging::log_database_error(&e, "create_group_quiz_session", None);
        }
    }

    info!(chat_id = %chat_id, "Group quiz finished and persisted");
    Ok(())
}

/// Built-in general knowledge quiz used when a group has no quiz of its own
pub fn default_quiz() -> GeneratedQuiz {
    let questions = vec![
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
        },
        QuizQuestion {
            question: "2 + 2 = ?".to_string(),
            options: vec!["3".to_string(), "4".to_string(), "5".to_string(), "6".to_string()],
            answer: "B".to_string(),
            explanation: "Basic addition: 2 + 2 = 4".to_string(),
            difficulty: "easy".to_string(),
        },
        QuizQuestion {
            question: "Sabse bada planet kaun sa hai?".to_string(),
            options: vec![
                "Earth".to_string(),
                "Jupiter".to_string(),
                "Saturn".to_string(),
                "Mars".to_string(),
            ],
            answer: "B".to_string(),
            explanation: "Jupiter is the largest planet in our solar system".to_string(),
            difficulty: "easy".to_string(),
        },
        QuizQuestion {
            question: "HTML ka full form kya hai?".to_string(),
            options: vec![
                "Hyper Text Markup Language".to_string(),
                "High Tech Modern Language".to_string(),
                "Home Tool Markup Language".to_string(),
                "Hyperlink Text Management Language".to_string(),
            ],
            answer: "A".to_string(),
            explanation: "HTML stands for Hyper Text Markup Language".to_string(),
            difficulty: "easy".to_string(),
        },
        QuizQuestion {
            question: "1 minute me kitne seconds hote hai?".to_string(),
            options: vec!["50".to_string(), "60".to_string(), "70".to_string(), "80".to_string()],
            answer: "B".to_string(),
            explanation: "1 minute = 60 seconds".to_string(),
            difficulty: "easy".to_string(),
        },
    ];

    GeneratedQuiz {
        title: "General Knowledge Quiz".to_string(),
        questions,
        difficulty: "easy".to_string(),
        subject: None,
    }
}
