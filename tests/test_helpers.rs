//! # Test Helper Library
//!
//! This module provides common test setup functions to reduce code duplication
//! across integration tests and improve test reliability and consistency.

use sqlx::postgres::PgPool;
use std::sync::Arc;
use study_sathi::db;

/// Setup a test database connection pool
///
/// This function handles the common pattern of:
/// 1. Checking for DATABASE_URL environment variable
/// 2. Creating a connection pool
/// 3. Initializing the database schema
///
/// Returns None if DATABASE_URL is not set (graceful skip for integration tests)
pub async fn setup_test_database() -> Result<Option<Arc<PgPool>>, Box<dyn std::error::Error>> {
    // Check if DATABASE_URL is set
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("⚠️ Skipping database test - DATABASE_URL not set");
            return Ok(None);
        }
    };

    // Create connection pool
    let pool = match PgPool::connect(&database_url).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            println!("⚠️ Skipping database test - failed to connect: {}", e);
            return Ok(None);
        }
    };

    // Reset the schema once per test binary so repeated runs start clean
    let reset = RESET
        .get_or_try_init(|| async {
            let tables = [
                "group_quiz_results",
                "group_quiz_sessions",
                "group_members",
                "groups",
                "quiz_attempts",
                "quizzes",
                "files",
                "conversations",
                "user_context",
                "users",
            ];
            for table in tables {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
                    .execute(pool.as_ref())
                    .await?;
            }
            db::init_database_schema(&pool).await
        })
        .await;

    if let Err(e) = reset {
        println!("⚠️ Skipping database test - failed to init schema: {}", e);
        return Ok(None);
    }

    Ok(Some(pool))
}

static RESET: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Create a test user in the database
pub async fn create_test_user(
    pool: &PgPool,
    telegram_id: i64,
    first_name: &str,
) -> Result<db::User, Box<dyn std::error::Error>> {
    let user = db::get_or_create_user(
        pool,
        telegram_id,
        None,
        Some(first_name),
        None,
        Some("en"),
    )
    .await?;
    Ok(user)
}

/// Create a test quiz with a couple of questions
///
/// Returns the quiz ID
pub async fn create_test_quiz(
    pool: &PgPool,
    telegram_id: i64,
    title: &str,
) -> Result<i64, Box<dyn std::error::Error>> {
    let questions = serde_json::json!([
        {
            "question": "2 + 2 = ?",
            "options": ["3", "4", "5", "6"],
            "answer": "B",
            "explanation": "Basic addition",
            "difficulty": "easy"
        },
        {
            "question": "Sabse bada planet?",
            "options": ["Earth", "Jupiter", "Saturn", "Mars"],
            "answer": "B",
            "explanation": "",
            "difficulty": "easy"
        }
    ])
    .to_string();

    let quiz_id = db::create_quiz(
        pool,
        telegram_id,
        title,
        &questions,
        2,
        None,
        Some("math"),
        "easy",
    )
    .await?;

    Ok(quiz_id)
}
