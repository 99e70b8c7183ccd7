//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import intent analysis
use crate::intent::{self, Intent};

// Import OCR types
use crate::circuit_breaker::CircuitBreaker;
use crate::instance_manager::OcrInstanceManager;
use crate::ocr_config::OcrConfig;

// Import dialogue types
use crate::dialogue::QuizDialogue;

// Import database functions
use crate::db;
use crate::errors::error_logging;
use crate::solver::SolveError;

use super::command_handlers::handle_command;
use super::ui_builder::{create_take_quiz_keyboard, format_files_list};
use super::BotContext;

// Import observability
use crate::observability;

// Shared OCR state, created lazily on first use
static OCR_CONFIG: std::sync::LazyLock<OcrConfig> = std::sync::LazyLock::new(OcrConfig::default);
static OCR_INSTANCE_MANAGER: std::sync::LazyLock<OcrInstanceManager> =
    std::sync::LazyLock::new(OcrInstanceManager::default);
static OCR_CIRCUIT_BREAKER: std::sync::LazyLock<CircuitBreaker> =
    std::sync::LazyLock::new(|| CircuitBreaker::new(OCR_CONFIG.recovery.clone()));

/// Surprise links sent in response to "thanks"
const SURPRISE_LINKS: [&str; 4] = [
    "🎉 https://youtu.be/dQw4w9WgXcQ",
    "🌟 https://youtu.be/ZZ5LpwO-An4",
    "✨ https://youtu.be/L_jWHffIx5E",
    "🎊 https://youtu.be/fJ9rUzIMcZQ",
];

/// Download a Telegram file to a temp file and return its path
///
/// The temp file keeps the original extension so downstream consumers
/// (Tesseract, pdf-extract) can sniff the format from a sensible name.
/// The caller owns cleanup of the returned path.
pub async fn download_file(
    bot: &Bot,
    file_id: teloxide::types::FileId,
    suffix: &str,
) -> Result<String> {
    let file = bot.get_file(file_id).await?;
    let file_path = file.path;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file_path
    );

    let response = reqwest::get(&url).await?;
    let bytes = response.bytes().await?;

    let mut temp_file = tempfile::Builder::new().suffix(suffix).tempfile()?;
    temp_file.as_file_mut().write_all(&bytes)?;
    let path = temp_file.path().to_string_lossy().to_string();

    // Keep the file on disk; the caller deletes it when done
    let _ = temp_file.into_temp_path().keep()?;

    Ok(path)
}

fn user_language(msg: &Message) -> Option<&str> {
    msg.from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str())
}

fn user_first_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|user| user.first_name.clone())
        .unwrap_or_else(|| "Friend".to_string())
}

/// Register or refresh the sender in the database
async fn ensure_user(ctx: &Arc<BotContext>, msg: &Message) -> Result<()> {
    if let Some(from) = &msg.from {
        db::get_or_create_user(
            &ctx.pool,
            from.id.0 as i64,
            from.username.as_deref(),
            Some(from.first_name.as_str()),
            from.last_name.as_deref(),
            from.language_code.as_deref(),
        )
        .await?;
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
    dialogue: QuizDialogue,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let language_code = user_language(msg);
    let telegram_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default();

    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message");

    ensure_user(ctx, msg).await?;

    // Group chats: track membership, react to commands only
    if msg.chat.is_group() || msg.chat.is_supergroup() {
        db::upsert_group(
            &ctx.pool,
            msg.chat.id.0,
            msg.chat.title(),
            if msg.chat.is_supergroup() { "supergroup" } else { "group" },
            telegram_id,
        )
        .await?;
        db::upsert_group_member(&ctx.pool, msg.chat.id.0, telegram_id, "member").await?;

        if text.starts_with('/') {
            handle_command(bot, msg, ctx, dialogue, text).await?;
        } else {
            debug!(chat_id = %msg.chat.id, "Ignoring non-command group message");
        }
        return Ok(());
    }

    // Private chat: commands first
    if text.starts_with('/') {
        handle_command(bot, msg, ctx, dialogue, text).await?;
        return Ok(());
    }

    db::record_message(&ctx.pool, telegram_id, text, "user", "text").await?;
    ctx.cache.invalidate_user_context(telegram_id);

    let history = db::recent_history(
        &ctx.pool,
        telegram_id,
        ctx.config.openai.history_context_size,
    )
    .await?;

    let analysis = intent::analyze_message(text, &history);
    debug!(
        intent = analysis.intent.as_str(),
        subject = ?analysis.subject.map(|s| s.as_str()),
        confidence = analysis.confidence,
        "Message analyzed"
    );

    let reply = match analysis.intent {
        Intent::Thanks => {
            let link = SURPRISE_LINKS[rand_index(SURPRISE_LINKS.len())];
            t_args_lang(
                &ctx.localization,
                "thanks-response",
                &[("name", user_first_name(msg).as_str()), ("link", link)],
                language_code,
            )
        }
        Intent::BestWishes => {
            let key = ["best-wishes-1", "best-wishes-2", "best-wishes-3"][rand_index(3)];
            t_lang(&ctx.localization, key, language_code)
        }
        Intent::Greeting => t_args_lang(
            &ctx.localization,
            "greeting-response",
            &[("name", user_first_name(msg).as_str())],
            language_code,
        ),
        Intent::FileRequest => {
            send_relevant_files(bot, msg, ctx, text, language_code).await?;
            // send_relevant_files does its own replies and bookkeeping
            persist_analysis(ctx, telegram_id, &analysis).await;
            return Ok(());
        }
        Intent::QuizRequest => {
            let quiz_count = db::list_user_quizzes(&ctx.pool, telegram_id, 10).await?.len();
            let subject = analysis
                .subject
                .map(|s| s.display().to_string())
                .unwrap_or_else(|| "General".to_string());
            let mut reply = t_args_lang(
                &ctx.localization,
                "quiz-prompt",
                &[("subject", subject.as_str())],
                language_code,
            );
            if quiz_count > 0 {
                reply.push_str(&format!("\n\n📊 Previous quizzes: {quiz_count}"));
            }
            reply
        }
        Intent::DoubtSolving => t_lang(&ctx.localization, "doubt-prompt", language_code),
        Intent::General => match ctx.openai.assistant_reply(&history, text).await {
            Ok(response) => format!("🤖 **Sathi:** {response}"),
            Err(e) => {
                error_logging::log_openai_error(&e, "assistant_reply", Some(telegram_id), None);
                t_lang(&ctx.localization, "ai-fallback", language_code)
            }
        },
    };

    bot.send_message(msg.chat.id, reply.clone()).await?;
    db::record_message(&ctx.pool, telegram_id, &reply, "bot", "text").await?;

    persist_analysis(ctx, telegram_id, &analysis).await;

    Ok(())
}

fn rand_index(len: usize) -> usize {
    use rand::Rng;
    rand::rng().random_range(0..len)
}

/// Persist an intent analysis into the user's context row
async fn persist_analysis(
    ctx: &Arc<BotContext>,
    telegram_id: i64,
    analysis: &intent::ContextAnalysis,
) {
    let context_json = serde_json::to_string(analysis).unwrap_or_else(|_| "{}".to_string());
    let topic = analysis.subject.map(|s| s.as_str());

    if let Err(e) = db::update_user_context(&ctx.pool, telegram_id, topic, &context_json).await {
        error_logging::log_database_error(&e, "update_user_context", Some(telegram_id));
    }
    ctx.cache.invalidate_user_context(telegram_id);
}

/// Send the files most relevant to a free-text request
pub async fn send_relevant_files(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
    query: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let telegram_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default();

    let files = if query.trim().is_empty() {
        // Plain "/notes": recent files, cached
        match ctx.cache.get_user_files(telegram_id) {
            Some(files) => files,
            None => {
                let files = db::list_user_files(&ctx.pool, telegram_id, None, 5).await?;
                ctx.cache.put_user_files(telegram_id, files.clone());
                files
            }
        }
    } else {
        ctx.file_manager
            .relevant_files(&ctx.pool, telegram_id, query)
            .await?
    };

    if files.is_empty() {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "notes-empty", language_code),
        )
        .await?;
        return Ok(());
    }

    let listing = format!(
        "{}\n\n{}",
        t_lang(&ctx.localization, "notes-header", language_code),
        format_files_list(&files)
    );
    bot.send_message(msg.chat.id, listing).await?;

    for file in &files {
        if std::path::Path::new(&file.filepath).exists() {
            let document = InputFile::file(std::path::PathBuf::from(&file.filepath))
                .file_name(file.filename.clone());
            if let Err(e) = bot.send_document(msg.chat.id, document).await {
                error_logging::log_network_error(&e, "send_document", None, None);
                let failure = t_args_lang(
                    &ctx.localization,
                    "notes-send-error",
                    &[("filename", file.filename.as_str())],
                    language_code,
                );
                bot.send_message(msg.chat.id, failure).await?;
            }
        } else {
            warn!(filepath = %file.filepath, "Stored file missing from disk");
        }
    }

    Ok(())
}

async fn handle_photo_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
) -> Result<()> {
    let language_code = user_language(msg);
    let telegram_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default();

    debug!(user_id = %msg.chat.id, "Received photo message");

    ensure_user(ctx, msg).await?;

    let Some(photos) = msg.photo() else {
        return Ok(());
    };
    let Some(largest_photo) = photos.last() else {
        return Ok(());
    };

    db::record_message(&ctx.pool, telegram_id, "[photo]", "user", "photo").await?;

    bot.send_message(
        msg.chat.id,
        t_lang(&ctx.localization, "processing-photo", language_code),
    )
    .await?;

    let temp_path = match download_file(bot, largest_photo.file.id.clone(), ".jpg").await {
        Ok(path) => {
            debug!(user_id = %msg.chat.id, temp_path = %path, "Photo downloaded");
            path
        }
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Failed to download photo");
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "error-download-failed", language_code),
            )
            .await?;
            return Err(e);
        }
    };

    let solve_result = ctx
        .solver
        .solve(
            &temp_path,
            &OCR_CONFIG,
            &OCR_INSTANCE_MANAGER,
            &OCR_CIRCUIT_BREAKER,
        )
        .await;

    match solve_result {
        Ok(solved) => {
            info!(
                user_id = %msg.chat.id,
                chars_extracted = solved.extracted_text.len(),
                "Doubt solved, sending rendered image"
            );

            let caption = t_lang(&ctx.localization, "doubt-solved-caption", language_code);
            let photo = InputFile::file(std::path::PathBuf::from(&solved.solved_image_path));
            bot.send_photo(msg.chat.id, photo).caption(caption).await?;

            db::record_message(&ctx.pool, telegram_id, &solved.solution_text, "bot", "photo")
                .await?;

            if let Err(e) = std::fs::remove_file(&solved.solved_image_path) {
                debug!(path = %solved.solved_image_path, error = %e, "Could not remove solved image");
            }
        }
        Err(SolveError::NoTextFound) => {
            warn!(user_id = %msg.chat.id, "No text found in doubt photo");
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "error-no-text-found", language_code),
            )
            .await?;
        }
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Doubt solving failed");
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "error-solve-failed", language_code),
            )
            .await?;
        }
    }

    // Always clean up the downloaded photo
    if let Err(cleanup_err) = std::fs::remove_file(&temp_path) {
        error!(temp_path = %temp_path, error = %cleanup_err, "Failed to clean up temporary file");
    }

    Ok(())
}

async fn handle_document_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
) -> Result<()> {
    let language_code = user_language(msg);
    let telegram_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or_default();

    let Some(doc) = msg.document() else {
        return Ok(());
    };

    ensure_user(ctx, msg).await?;

    let filename = doc
        .file_name
        .clone()
        .unwrap_or_else(|| "upload.bin".to_string());
    let mime = doc.mime_type.as_ref().map(|m| m.to_string()).unwrap_or_default();

    debug!(user_id = %msg.chat.id, filename = %filename, mime = %mime, "Received document");

    if doc.file.size as u64 > ctx.config.files.max_file_size {
        bot.send_message(
            msg.chat.id,
            t_lang(&ctx.localization, "error-file-too-large", language_code),
        )
        .await?;
        return Ok(());
    }

    db::record_message(&ctx.pool, telegram_id, &filename, "user", "document").await?;

    let suffix = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let temp_path = match download_file(bot, doc.file.id.clone(), &suffix).await {
        Ok(path) => path,
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Failed to download document");
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "error-download-failed", language_code),
            )
            .await?;
            return Err(e);
        }
    };

    let result = async {
        let stored = ctx
            .file_manager
            .store_file(&ctx.pool, telegram_id, &temp_path, &filename, None, &[])
            .await?;
        ctx.cache.invalidate_user_files(telegram_id);

        let is_pdf = mime == "application/pdf" || filename.to_lowercase().ends_with(".pdf");
        if is_pdf {
            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "processing-pdf", language_code),
            )
            .await?;

            let context = match ctx.cache.get_user_context(telegram_id) {
                Some(context) => context,
                None => {
                    let context = db::get_user_context(&ctx.pool, telegram_id).await?;
                    ctx.cache.put_user_context(telegram_id, context.clone());
                    context
                }
            };
            let subject = context.current_topic.as_deref();

            match ctx
                .quiz_generator
                .generate_from_pdf(&ctx.pool, telegram_id, &stored.filepath, subject)
                .await
            {
                Ok((quiz_id, quiz)) => {
                    let preview =
                        crate::quiz::format_quiz_message(&quiz.title, &quiz.questions, false);
                    let keyboard =
                        create_take_quiz_keyboard(quiz_id, language_code, &ctx.localization);
                    bot.send_message(msg.chat.id, preview)
                        .reply_markup(keyboard)
                        .await?;
                }
                Err(e) => {
                    error_logging::log_quiz_error(
                        &e,
                        "generate_from_pdf",
                        telegram_id,
                        Some(&stored.filepath),
                        None,
                    );
                    bot.send_message(
                        msg.chat.id,
                        t_lang(&ctx.localization, "error-quiz-failed", language_code),
                    )
                    .await?;
                }
            }
        } else if mime.starts_with("image/") {
            // Image sent as a document: treat it like a doubt photo
            if !crate::ocr::is_supported_image_format(&temp_path, &OCR_CONFIG) {
                warn!(user_id = %msg.chat.id, "Unsupported image format rejected");
                bot.send_message(
                    msg.chat.id,
                    t_lang(&ctx.localization, "error-unsupported-format", language_code),
                )
                .await?;
                return Ok(());
            }

            bot.send_message(
                msg.chat.id,
                t_lang(&ctx.localization, "processing-photo", language_code),
            )
            .await?;

            match ctx
                .solver
                .solve(&temp_path, &OCR_CONFIG, &OCR_INSTANCE_MANAGER, &OCR_CIRCUIT_BREAKER)
                .await
            {
                Ok(solved) => {
                    let caption =
                        t_lang(&ctx.localization, "doubt-solved-caption", language_code);
                    let photo =
                        InputFile::file(std::path::PathBuf::from(&solved.solved_image_path));
                    bot.send_photo(msg.chat.id, photo).caption(caption).await?;
                    let _ = std::fs::remove_file(&solved.solved_image_path);
                }
                Err(SolveError::NoTextFound) => {
                    bot.send_message(
                        msg.chat.id,
                        t_lang(&ctx.localization, "error-no-text-found", language_code),
                    )
                    .await?;
                }
                Err(e) => {
                    error!(user_id = %msg.chat.id, error = %e, "Doubt solving failed");
                    bot.send_message(
                        msg.chat.id,
                        t_lang(&ctx.localization, "error-solve-failed", language_code),
                    )
                    .await?;
                }
            }
        } else {
            let saved = t_args_lang(
                &ctx.localization,
                "file-saved",
                &[("filename", filename.as_str())],
                language_code,
            );
            bot.send_message(msg.chat.id, saved).await?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(cleanup_err) = std::fs::remove_file(&temp_path) {
        error!(temp_path = %temp_path, error = %cleanup_err, "Failed to clean up temporary file");
    }

    result
}

async fn handle_unsupported_message(
    bot: &Bot,
    msg: &Message,
    ctx: &Arc<BotContext>,
) -> Result<()> {
    let language_code = user_language(msg);

    debug!(user_id = %msg.chat.id, "Received unsupported message type");

    bot.send_message(
        msg.chat.id,
        t_lang(&ctx.localization, "unsupported-message", language_code),
    )
    .await?;
    Ok(())
}

/// Entry point for all incoming messages
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    ctx: Arc<BotContext>,
    dialogue: QuizDialogue,
) -> Result<()> {
    let span = observability::telegram_span(
        "message_handler",
        msg.from.as_ref().map(|u| u.id.0 as i64),
    );
    let _enter = span.enter();

    let start_time = std::time::Instant::now();
    let message_type = if msg.text().is_some() {
        "text"
    } else if msg.photo().is_some() {
        "photo"
    } else if msg.document().is_some() {
        "document"
    } else {
        "unsupported"
    };

    observability::record_telegram_message(message_type);

    let result = if msg.text().is_some() {
        handle_text_message(&bot, &msg, &ctx, dialogue).await
    } else if msg.photo().is_some() {
        handle_photo_message(&bot, &msg, &ctx).await
    } else if msg.document().is_some() {
        handle_document_message(&bot, &msg, &ctx).await
    } else {
        handle_unsupported_message(&bot, &msg, &ctx).await
    };

    observability::record_request_metrics("telegram_message", start_time.elapsed());

    result
}
