//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MaybeInaccessibleMessage};
use tracing::{debug, warn};

use crate::db;
use crate::dialogue::{QuizDialogue, QuizDialogueState};
use crate::errors::error_logging;
use crate::localization::{t_args_lang, t_lang};
use crate::quiz::{parse_stored_questions, QuizQuestion, ANSWER_LETTERS};

use super::group_quiz::AnswerOutcome;
use super::ui_builder::create_private_answer_keyboard;
use super::BotContext;

/// Entry point for all callback queries
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<BotContext>,
    dialogue: QuizDialogue,
) -> Result<()> {
    let span = crate::observability::telegram_span("callback_handler", Some(q.from.id.0 as i64));
    let _enter = span.enter();

    crate::observability::record_telegram_message("callback");

    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    debug!(user_id = %q.from.id, data = %data, "Handling callback query");

    let parts: Vec<&str> = data.split(':').collect();

    match parts.as_slice() {
        ["gj", chat_id] => {
            let chat_id = chat_id.parse::<i64>().unwrap_or_default();
            handle_group_join(&bot, &q, &ctx, chat_id).await
        }
        ["ga", chat_id, question_index, letter] => {
            let chat_id = chat_id.parse::<i64>().unwrap_or_default();
            let question_index = question_index.parse::<usize>().unwrap_or_default();
            handle_group_answer(&bot, &q, &ctx, chat_id, question_index, letter).await
        }
        ["take_quiz", quiz_id] => {
            let quiz_id = quiz_id.parse::<i64>().unwrap_or_default();
            handle_take_quiz(&bot, &q, &ctx, dialogue, quiz_id).await
        }
        ["pq", quiz_id, question_index, letter] => {
            let quiz_id = quiz_id.parse::<i64>().unwrap_or_default();
            let question_index = question_index.parse::<usize>().unwrap_or_default();
            handle_private_answer(&bot, &q, &ctx, dialogue, quiz_id, question_index, letter).await
        }
        _ => {
            // Unknown or noop callbacks still need acknowledging
            bot.answer_callback_query(q.id.clone()).await?;
            Ok(())
        }
    }
}

fn language_of(q: &CallbackQuery) -> Option<&str> {
    q.from.language_code.as_deref()
}

fn chat_of(q: &CallbackQuery) -> ChatId {
    match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => msg.chat.id,
        _ => ChatId::from(q.from.id),
    }
}

async fn handle_group_join(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &Arc<BotContext>,
    chat_id: i64,
) -> Result<()> {
    let lang = language_of(q);
    let user_id = q.from.id.0 as i64;

    // The participant must exist as a user before FK rows reference them
    db::get_or_create_user(
        &ctx.pool,
        user_id,
        q.from.username.as_deref(),
        Some(q.from.first_name.as_str()),
        q.from.last_name.as_deref(),
        q.from.language_code.as_deref(),
    )
    .await?;

    match ctx.group_quizzes.join(chat_id, user_id, &q.from.first_name) {
        Some(count) => {
            if let Err(e) = db::upsert_group_member(&ctx.pool, chat_id, user_id, "member").await {
                error_logging::log_database_error(&e, "upsert_group_member", Some(user_id));
            }

            let text = t_args_lang(
                &ctx.localization,
                "group-quiz-joined",
                &[("count", count.to_string().as_str())],
                lang,
            );
            bot.answer_callback_query(q.id.clone()).text(text).await?;
        }
        None => {
            bot.answer_callback_query(q.id.clone())
                .text(t_lang(&ctx.localization, "group-quiz-join-closed", lang))
                .show_alert(true)
                .await?;
        }
    }

    Ok(())
}

async fn handle_group_answer(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &Arc<BotContext>,
    chat_id: i64,
    question_index: usize,
    letter: &str,
) -> Result<()> {
    let lang = language_of(q);
    let user_id = q.from.id.0 as i64;

    let outcome = ctx
        .group_quizzes
        .record_answer(chat_id, user_id, question_index, letter);

    let (key, alert) = match outcome {
        AnswerOutcome::Recorded { correct: true } => ("group-quiz-correct", false),
        AnswerOutcome::Recorded { correct: false } => ("group-quiz-wrong", false),
        AnswerOutcome::AlreadyAnswered => ("group-quiz-already-answered", true),
        AnswerOutcome::NotJoined => ("group-quiz-not-joined", true),
        AnswerOutcome::NoActiveQuestion => ("group-quiz-expired", true),
    };

    bot.answer_callback_query(q.id.clone())
        .text(t_lang(&ctx.localization, key, lang))
        .show_alert(alert)
        .await?;

    Ok(())
}

async fn handle_take_quiz(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &Arc<BotContext>,
    dialogue: QuizDialogue,
    quiz_id: i64,
) -> Result<()> {
    let lang = language_of(q);
    let chat_id = chat_of(q);

    let Some(record) = db::get_quiz(&ctx.pool, quiz_id).await? else {
        bot.answer_callback_query(q.id.clone())
            .text(t_lang(&ctx.localization, "quiz-not-found", lang))
            .show_alert(true)
            .await?;
        return Ok(());
    };

    let questions = match parse_stored_questions(&record.questions) {
        Ok(questions) if !questions.is_empty() => questions,
        _ => {
            warn!(quiz_id = %quiz_id, "Stored quiz has no parsable questions");
            bot.answer_callback_query(q.id.clone())
                .text(t_lang(&ctx.localization, "quiz-not-found", lang))
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };

    bot.answer_callback_query(q.id.clone()).await?;

    dialogue
        .update(QuizDialogueState::TakingQuiz {
            quiz_id,
            current_question: 0,
            answers: Vec::new(),
            score: 0,
            started_at: Utc::now(),
            language_code: lang.map(|s| s.to_string()),
        })
        .await?;

    send_private_question(bot, chat_id, &record.title, &questions, 0, quiz_id).await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_private_answer(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &Arc<BotContext>,
    dialogue: QuizDialogue,
    quiz_id: i64,
    question_index: usize,
    letter: &str,
) -> Result<()> {
    let lang = language_of(q);
    let chat_id = chat_of(q);
    let user_id = q.from.id.0 as i64;

    let state = dialogue.get().await?;
    let Some(QuizDialogueState::TakingQuiz {
        quiz_id: active_quiz,
        current_question,
        mut answers,
        mut score,
        started_at,
        language_code,
    }) = state
    else {
        bot.answer_callback_query(q.id.clone())
            .text(t_lang(&ctx.localization, "quiz-expired", lang))
            .show_alert(true)
            .await?;
        return Ok(());
    };

    if active_quiz != quiz_id || current_question != question_index {
        bot.answer_callback_query(q.id.clone())
            .text(t_lang(&ctx.localization, "quiz-expired", lang))
            .show_alert(true)
            .await?;
        return Ok(());
    }

    let Some(record) = db::get_quiz(&ctx.pool, quiz_id).await? else {
        dialogue.update(QuizDialogueState::Idle).await?;
        bot.answer_callback_query(q.id.clone())
            .text(t_lang(&ctx.localization, "quiz-not-found", lang))
            .show_alert(true)
            .await?;
        return Ok(());
    };
    let questions = parse_stored_questions(&record.questions)?;

    let Some(question) = questions.get(question_index) else {
        dialogue.update(QuizDialogueState::Idle).await?;
        return Ok(());
    };

    let correct = question.answer == letter;
    if correct {
        score += 1;
    }
    answers.push(letter.to_string());

    let feedback_key = if correct {
        "group-quiz-correct"
    } else {
        "group-quiz-wrong"
    };
    bot.answer_callback_query(q.id.clone())
        .text(t_lang(&ctx.localization, feedback_key, lang))
        .await?;

    let next_question = question_index + 1;
    if next_question < questions.len() {
        dialogue
            .update(QuizDialogueState::TakingQuiz {
                quiz_id,
                current_question: next_question,
                answers,
                score,
                started_at,
                language_code,
            })
            .await?;

        send_private_question(bot, chat_id, &record.title, &questions, next_question, quiz_id)
            .await?;
        return Ok(());
    }

    // Quiz finished: persist the attempt and show the summary
    dialogue.update(QuizDialogueState::Idle).await?;

    let time_taken = (Utc::now() - started_at).num_seconds().max(0) as i32;
    let answers_json = serde_json::to_string(&answers).unwrap_or_else(|_| "[]".to_string());

    if let Err(e) = db::record_quiz_attempt(
        &ctx.pool,
        quiz_id,
        user_id,
        &answers_json,
        score,
        questions.len() as i32,
        Some(time_taken),
    )
    .await
    {
        error_logging::log_database_error(&e, "record_quiz_attempt", Some(user_id));
    }

    let percentage = f64::from(score) / questions.len() as f64 * 100.0;
    let mut summary = t_args_lang(
        &ctx.localization,
        "quiz-finished",
        &[
            ("score", score.to_string().as_str()),
            ("total", questions.len().to_string().as_str()),
            ("percentage", format!("{percentage:.0}").as_str()),
        ],
        lang,
    );

    summary.push_str("\n\n");
    for (i, question) in questions.iter().enumerate() {
        let given = answers.get(i).map(String::as_str).unwrap_or("-");
        let mark = if given == question.answer { "✅" } else { "❌" };
        summary.push_str(&format!(
            "{} Q{}: {} (aapka: {})\n",
            mark,
            i + 1,
            question.answer,
            given
        ));
    }

    bot.send_message(chat_id, summary).await?;

    Ok(())
}

/// Send one question of a private quiz attempt
async fn send_private_question(
    bot: &Bot,
    chat_id: ChatId,
    title: &str,
    questions: &[QuizQuestion],
    index: usize,
    quiz_id: i64,
) -> Result<()> {
    let Some(question) = questions.get(index) else {
        return Ok(());
    };

    let mut text = format!(
        "🧠 **{}** — Q{}/{}\n\n**{}**\n\n",
        title,
        index + 1,
        questions.len(),
        question.question
    );
    for (i, option) in question.options.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", ANSWER_LETTERS[i], option));
    }

    bot.send_message(chat_id, text)
        .reply_markup(create_private_answer_keyboard(quiz_id, index))
        .await?;

    Ok(())
}
