use anyhow::Result;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use std::time::Duration;
use study_sathi::bot::{self, BotContext};
use study_sathi::cache::CacheManager;
use study_sathi::config::AppConfig;
use study_sathi::db;
use study_sathi::dialogue::{QuizDialogue, QuizDialogueState};
use study_sathi::files::FileManager;
use study_sathi::localization;
use study_sathi::observability;
use study_sathi::openai::OpenAiClient;
use study_sathi::quiz::QuizGenerator;
use study_sathi::solver::DoubtSolver;
use study_sathi::webhook;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tracing::info;

/// Validate the full configuration at startup, before any network call
fn validate_configuration(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}. Please check your environment variables."))?;

    info!("Configuration validated successfully");
    Ok(())
}

/// Periodically delete conversation rows past the retention window
fn start_conversation_cleanup(pool: Arc<PgPool>, retention_days: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            if let Err(e) = db::cleanup_old_conversations(&pool, retention_days).await {
                tracing::error!(error = %e, "Conversation cleanup failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    observability::init_tracing()?;

    let config = AppConfig::from_env();
    validate_configuration(&config)?;

    info!("Initializing database connection");

    let pool = PgPool::connect(&config.database.url).await?;
    db::init_database_schema(&pool).await?;
    let shared_pool = Arc::new(pool);

    // Metrics recorder + /metrics endpoint
    observability::init_metrics().await?;

    start_conversation_cleanup(
        Arc::clone(&shared_pool),
        config.database.conversation_retention_days,
    );

    // Shared service clients
    let openai = Arc::new(OpenAiClient::new(config.openai.clone())?);
    let quiz_generator = QuizGenerator::new(Arc::clone(&openai), config.quiz.clone());
    let solver = DoubtSolver::new(Arc::clone(&openai), config.solver.clone())?;
    let file_manager = FileManager::new(&config.files)?;
    let localization_manager = localization::create_localization_manager()?;
    let cache_manager = CacheManager::new();

    // Custom client configuration for better reliability against Telegram
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

    let bot = Bot::with_client(config.bot.token.clone(), client);

    let webhook_config = config.webhook.clone();

    let ctx = Arc::new(BotContext {
        pool: Arc::clone(&shared_pool),
        config,
        openai,
        quiz_generator,
        solver,
        file_manager,
        localization: Arc::clone(&localization_manager),
        cache: cache_manager,
        group_quizzes: Default::default(),
    });

    info!("Bot initialized, starting dispatcher");

    // Shared dialogue storage for private quiz attempts
    let dialogue_storage = InMemStorage::<QuizDialogueState>::new();

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, msg: Message| {
                let ctx = Arc::clone(&ctx);
                let storage = storage.clone();
                let dialogue = QuizDialogue::new(storage, msg.chat.id);
                async move { bot::message_handler(bot, msg, ctx, dialogue).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let ctx = Arc::clone(&ctx);
            let storage = dialogue_storage.clone();
            move |bot: Bot, q: CallbackQuery| {
                let ctx = Arc::clone(&ctx);
                let storage = storage.clone();
                // Use the chat ID from the original message that contained the inline keyboard
                let chat_id = match &q.message {
                    Some(msg) => match msg {
                        teloxide::types::MaybeInaccessibleMessage::Regular(msg) => msg.chat.id,
                        teloxide::types::MaybeInaccessibleMessage::Inaccessible(_) => {
                            ChatId::from(q.from.id)
                        }
                    },
                    None => ChatId::from(q.from.id),
                };
                let dialogue = QuizDialogue::new(storage, chat_id);
                async move { bot::callback_handler(bot, q, ctx, dialogue).await }
            }
        }));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .enable_ctrlc_handler()
        .build();

    if webhook_config.enabled() {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], webhook_config.port));
        let url: teloxide::types::Url = webhook_config
            .url
            .as_deref()
            .expect("webhook enabled implies url is set")
            .parse()?;

        info!(addr = %addr, url = %url, "Starting webhook transport");

        let (listener, stop_flag, router) =
            webhooks::axum_to_router(bot.clone(), webhooks::Options::new(addr, url)).await?;

        let app = router.merge(webhook::admin_router(bot.clone(), &webhook_config)?);

        tokio::spawn(async move {
            let tcp = match tokio::net::TcpListener::bind(addr).await {
                Ok(tcp) => tcp,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to bind webhook listener");
                    return;
                }
            };
            if let Err(e) = axum::serve(tcp, app)
                .with_graceful_shutdown(stop_flag)
                .await
            {
                tracing::error!(error = %e, "Webhook server stopped with error");
            }
        });

        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the webhook update listener"),
            )
            .await;
    } else {
        info!("Starting long polling transport");
        dispatcher.dispatch().await;
    }

    Ok(())
}
