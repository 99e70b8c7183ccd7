//! Command Handlers module for processing bot commands

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::db;
use crate::dialogue::QuizDialogue;
use crate::errors::error_logging;
use crate::localization::{t_args_lang, t_lang};

use super::group_quiz::{default_quiz, run_group_quiz};
use super::message_handler::send_relevant_files;
use super::ui_builder::{create_quiz_list_keyboard, format_memory, format_stats};
use super::BotContext;

/// Route a `/command` message
///
/// Commands may arrive as `/cmd@botname` in groups; the mention is stripped
/// before matching. The argument remainder is passed to commands that use it
/// (`/notes physics`).
pub async fn handle_command(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
    dialogue: QuizDialogue,
    text: &str,
) -> Result<()> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let raw_command = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or_default().trim();

    let command = raw_command
        .split('@')
        .next()
        .unwrap_or(raw_command)
        .to_lowercase();

    debug!(user_id = %msg.chat.id, command = %command, "Handling command");

    match command.as_str() {
        "/start" => handle_start(bot, msg, ctx).await,
        "/help" => handle_help(bot, msg, ctx).await,
        "/quiz" => handle_quiz(bot, msg, ctx).await,
        "/notes" => {
            let language_code = language_of(msg);
            send_relevant_files(bot, msg, ctx, args, language_code).await
        }
        "/memory" => handle_memory(bot, msg, ctx).await,
        "/stats" => handle_stats(bot, msg, ctx).await,
        "/groupquiz" => handle_group_quiz(bot, msg, ctx).await,
        "/leaderboard" => handle_leaderboard(bot, msg, ctx).await,
        "/cancel" => {
            dialogue.update(crate::dialogue::QuizDialogueState::Idle).await?;
            let language_code = language_of(msg);
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "cancelled", language_code),
            )
            .await?;
            Ok(())
        }
        _ => {
            let language_code = language_of(msg);
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "unknown-command", language_code),
            )
            .await?;
            Ok(())
        }
    }
}

fn language_of(msg: &Message) -> Option<&str> {
    msg.from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str())
}

fn telegram_id_of(msg: &Message) -> i64 {
    msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default()
}

async fn handle_start(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "Friend".to_string());

    let welcome = format!(
        "{}\n\n{}\n\n{}",
        t_args_lang(
            &ctx.localization,
            "welcome-title",
            &[("name", name.as_str())],
            language_code,
        ),
        t_lang(&ctx.localization, "welcome-features", language_code),
        t_lang(&ctx.localization, "welcome-commands", language_code),
    );

    bot.send_message(msg.chat.id, welcome).await?;
    Ok(())
}

async fn handle_help(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let telegram_id = telegram_id_of(msg);

    let help_message = vec![
        t_lang(&ctx.localization, "help-title", language_code),
        t_lang(&ctx.localization, "help-files", language_code),
        t_lang(&ctx.localization, "help-quiz", language_code),
        t_lang(&ctx.localization, "help-doubts", language_code),
        t_lang(&ctx.localization, "help-smart", language_code),
        t_lang(&ctx.localization, "welcome-commands", language_code),
        t_lang(&ctx.localization, "help-final", language_code),
    ]
    .join("\n\n");

    bot.send_message(msg.chat.id, help_message.clone()).await?;

    db::record_message(&ctx.pool, telegram_id, "/help", "user", "text").await?;
    db::record_message(&ctx.pool, telegram_id, &help_message, "bot", "text").await?;
    Ok(())
}

async fn handle_quiz(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let telegram_id = telegram_id_of(msg);

    let quizzes = db::list_user_quizzes(&ctx.pool, telegram_id, 5).await?;

    if quizzes.is_empty() {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "quiz-none", language_code),
        )
        .await?;
        return Ok(());
    }

    let entries: Vec<(i64, String)> = quizzes.iter().map(|q| (q.id, q.title.clone())).collect();

    bot.send_message(
        msg.chat.id,
        t_lang(&ctx.localization, "quiz-list-header", language_code),
    )
    .reply_markup(create_quiz_list_keyboard(&entries))
    .await?;

    Ok(())
}

async fn handle_memory(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let telegram_id = telegram_id_of(msg);

    let history = db::recent_history(&ctx.pool, telegram_id, 10).await?;

    if history.is_empty() {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "memory-empty", language_code),
        )
        .await?;
        return Ok(());
    }

    let memory_text = format_memory(&history, language_code, &ctx.localization);
    bot.send_message(msg.chat.id, memory_text).await?;
    Ok(())
}

async fn handle_stats(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let telegram_id = telegram_id_of(msg);

    let Some(stats) = db::get_user_stats(&ctx.pool, telegram_id).await? else {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "stats-empty", language_code),
        )
        .await?;
        return Ok(());
    };

    let breakdown = db::file_stats(&ctx.pool, telegram_id).await?;
    let text = format_stats(&stats, &breakdown, language_code, &ctx.localization);
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_group_quiz(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);
    let telegram_id = telegram_id_of(msg);

    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "group-quiz-hint", language_code),
        )
        .await?;
        return Ok(());
    }

    // Prefer the starter's latest generated quiz, fall back to the built-in one
    let quiz = match db::list_user_quizzes(&ctx.pool, telegram_id, 1).await {
        Ok(quizzes) if !quizzes.is_empty() => {
            let record = &quizzes[0];
            match crate::quiz::parse_stored_questions(&record.questions) {
                Ok(questions) => crate::quiz::GeneratedQuiz {
                    title: record.title.clone(),
                    questions,
                    difficulty: record.difficulty.clone(),
                    subject: record.subject.clone(),
                },
                Err(e) => {
                    error_logging::log_quiz_error(
                        &e,
                        "parse_stored_questions",
                        telegram_id,
                        None,
                        None,
                    );
                    default_quiz()
                }
            }
        }
        _ => default_quiz(),
    };

    run_group_quiz(
        bot.clone(),
        Arc::clone(ctx),
        msg.chat.id,
        quiz,
        telegram_id,
        language_code.map(|s| s.to_string()),
    )
    .await?;

    Ok(())
}

async fn handle_leaderboard(bot: &Bot, msg: &Message, ctx: &Arc<BotContext>) -> Result<()> {
    let language_code = language_of(msg);

    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "leaderboard-hint", language_code),
        )
        .await?;
        return Ok(());
    }

    let entries = db::group_leaderboard(&ctx.pool, msg.chat.id.0, 10).await?;

    if entries.is_empty() {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "leaderboard-empty", language_code),
        )
        .await?;
        return Ok(());
    }

    let mut text = format!(
        "🏆 **{}**\n\n",
        t_lang(&ctx.localization, "leaderboard-title", language_code)
    );
    for (rank, entry) in entries.iter().enumerate() {
        let medal = match rank {
            0 => "🥇".to_string(),
            1 => "🥈".to_string(),
            2 => "🥉".to_string(),
            _ => format!("{}.", rank + 1),
        };
        text.push_str(&format!(
            "{} **{}** - {:.1}% avg ({} quizzes)\n",
            medal, entry.first_name, entry.avg_percentage, entry.quiz_count
        ));
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
