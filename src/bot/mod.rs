//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules for better organization:
//! - `message_handler`: Handles incoming text, photo, and document messages
//! - `command_handlers`: The /start, /help, /notes, /memory, /stats family
//! - `callback_handler`: Inline keyboard callbacks (quiz answers, group joins)
//! - `group_quiz`: Synchronized group quiz sessions and scoring
//! - `ui_builder`: Creates keyboards and formats messages

pub mod callback_handler;
pub mod command_handlers;
pub mod group_quiz;
pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;

use sqlx::postgres::PgPool;

use crate::cache::CacheManager;
use crate::config::AppConfig;
use crate::files::FileManager;
use crate::localization::LocalizationManager;
use crate::openai::OpenAiClient;
use crate::quiz::QuizGenerator;
use crate::solver::DoubtSolver;

use self::group_quiz::GroupQuizRegistry;

/// Shared dependencies for every update handler
pub struct BotContext {
    pub pool: Arc<PgPool>,
    pub config: AppConfig,
    pub openai: Arc<OpenAiClient>,
    pub quiz_generator: QuizGenerator,
    pub solver: DoubtSolver,
    pub file_manager: FileManager,
    pub localization: Arc<LocalizationManager>,
    pub cache: CacheManager,
    pub group_quizzes: GroupQuizRegistry,
}

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::{download_file, message_handler};
