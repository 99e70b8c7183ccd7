use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

/// Represents a user in the database
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: String,
    pub total_messages: i64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// A single stored conversation turn (user or bot)
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub message: String,
    pub sender: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// Represents a stored file in the database
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: i64,
    pub telegram_id: i64,
    pub filename: String,
    pub filepath: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_hash: Option<String>,
    pub description: Option<String>,
    /// JSON array of tag strings
    pub tags: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Represents a stored quiz
#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub title: String,
    /// JSON array of quiz questions
    pub questions: String,
    pub total_questions: i32,
    pub source_file: Option<String>,
    pub subject: Option<String>,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

/// The persisted conversational context for a user
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserContext {
    pub current_topic: Option<String>,
    /// JSON object with the last analysis
    pub context: String,
    pub last_query: Option<String>,
    pub query_count: i64,
}

/// Aggregated per-user statistics for /stats
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub total_messages: i64,
    pub member_since: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub files_uploaded: i64,
    pub quizzes_created: i64,
    pub quiz_attempts: i64,
    pub average_score: f64,
}

/// One row of a group leaderboard
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub first_name: String,
    pub avg_percentage: f64,
    pub quiz_count: i64,
}

/// Per-type breakdown used by file statistics
#[derive(Debug, Clone, PartialEq)]
pub struct FileTypeStats {
    pub file_type: String,
    pub count: i64,
    pub total_size: i64,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT UNIQUE NOT NULL,
            username VARCHAR(255),
            first_name VARCHAR(255),
            last_name VARCHAR(255),
            language_code VARCHAR(10) DEFAULT 'en',
            total_messages BIGINT DEFAULT 0,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
            last_active TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS conversations (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            message TEXT NOT NULL,
            sender VARCHAR(10) NOT NULL CHECK (sender IN ('user', 'bot')),
            message_type VARCHAR(20) DEFAULT 'text',
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create conversations table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS files (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            filename VARCHAR(255) NOT NULL,
            filepath TEXT NOT NULL,
            file_type VARCHAR(20) NOT NULL,
            file_size BIGINT NOT NULL,
            file_hash VARCHAR(64),
            description TEXT,
            tags TEXT DEFAULT '[]',
            is_active BOOLEAN DEFAULT TRUE,
            uploaded_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create files table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS quizzes (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            title VARCHAR(255) NOT NULL,
            questions TEXT NOT NULL,
            total_questions INTEGER NOT NULL,
            source_file TEXT,
            subject VARCHAR(50),
            difficulty VARCHAR(20) DEFAULT 'medium',
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create quizzes table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS quiz_attempts (
            id BIGSERIAL PRIMARY KEY,
            quiz_id BIGINT NOT NULL REFERENCES quizzes(id),
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            answers TEXT DEFAULT '[]',
            score INTEGER NOT NULL,
            total_questions INTEGER NOT NULL,
            time_taken_secs INTEGER,
            attempted_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create quiz_attempts table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_context (
            telegram_id BIGINT PRIMARY KEY REFERENCES users(telegram_id),
            current_topic VARCHAR(50),
            context TEXT DEFAULT '{}',
            last_query TEXT,
            query_count BIGINT DEFAULT 0,
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_context table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS groups (
            chat_id BIGINT PRIMARY KEY,
            title VARCHAR(255),
            group_type VARCHAR(20),
            admin_user_id BIGINT,
            is_active BOOLEAN DEFAULT TRUE,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create groups table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS group_members (
            id BIGSERIAL PRIMARY KEY,
            chat_id BIGINT NOT NULL REFERENCES groups(chat_id),
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            role VARCHAR(20) DEFAULT 'member',
            is_active BOOLEAN DEFAULT TRUE,
            joined_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (chat_id, telegram_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create group_members table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS group_quiz_sessions (
            id BIGSERIAL PRIMARY KEY,
            chat_id BIGINT NOT NULL REFERENCES groups(chat_id),
            quiz_title VARCHAR(255) NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            ended_at TIMESTAMPTZ,
            total_participants INTEGER DEFAULT 0,
            quiz TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create group_quiz_sessions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS group_quiz_results (
            id BIGSERIAL PRIMARY KEY,
            session_id BIGINT NOT NULL REFERENCES group_quiz_sessions(id),
            telegram_id BIGINT NOT NULL REFERENCES users(telegram_id),
            score INTEGER NOT NULL,
            total_questions INTEGER NOT NULL,
            percentage DOUBLE PRECISION NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create group_quiz_results table")?;

    // Indexes for the hot lookup paths
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS conversations_telegram_id_idx ON conversations(telegram_id, created_at)",
    )
    .execute(pool)
    .await
    .context("Failed to create conversations index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS files_telegram_id_idx ON files(telegram_id)")
        .execute(pool)
        .await
        .context("Failed to create files index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS quizzes_telegram_id_idx ON quizzes(telegram_id)")
        .execute(pool)
        .await
        .context("Failed to create quizzes index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS group_quiz_results_session_idx ON group_quiz_results(session_id)",
    )
    .execute(pool)
    .await
    .context("Failed to create group quiz results index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get(0),
        telegram_id: row.get(1),
        username: row.get(2),
        first_name: row.get(3),
        last_name: row.get(4),
        language_code: row.get(5),
        total_messages: row.get(6),
        created_at: row.get(7),
        last_active: row.get(8),
    }
}

const USER_COLUMNS: &str =
    "id, telegram_id, username, first_name, last_name, language_code, total_messages, created_at, last_active";

/// Get or create a user by Telegram ID
///
/// Existing users get their profile fields and last_active refreshed;
/// new users also get an empty user_context row.
pub async fn get_or_create_user(
    pool: &PgPool,
    telegram_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
    language_code: Option<&str>,
) -> Result<User> {
    debug!(telegram_id = %telegram_id, "Getting or creating user");

    if let Some(existing) = get_user_by_telegram_id(pool, telegram_id).await? {
        let row = sqlx::query(&format!(
            "UPDATE users SET username = COALESCE($1, username),
                              first_name = COALESCE($2, first_name),
                              last_name = COALESCE($3, last_name),
                              last_active = CURRENT_TIMESTAMP
             WHERE telegram_id = $4 RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(telegram_id)
        .fetch_one(pool)
        .await
        .context("Failed to refresh existing user")?;

        debug!(user_id = %existing.id, "User refreshed");
        return Ok(row_to_user(&row));
    }

    let language_code = language_code.unwrap_or("en");
    let row = sqlx::query(&format!(
        "INSERT INTO users (telegram_id, username, first_name, last_name, language_code)
         VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
    ))
    .bind(telegram_id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .bind(language_code)
    .fetch_one(pool)
    .await
    .context("Failed to create new user")?;

    sqlx::query("INSERT INTO user_context (telegram_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(telegram_id)
        .execute(pool)
        .await
        .context("Failed to initialize user context")?;

    let user = row_to_user(&row);
    debug!(user_id = %user.id, "User created successfully");
    Ok(user)
}

/// Get a user by Telegram ID
pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = $1"
    ))
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by telegram_id")?;

    Ok(row.map(|row| row_to_user(&row)))
}

/// Add a message to a user's conversation history
///
/// Also bumps the user's message counter and, for user-sent messages,
/// the context query counter and last query.
pub async fn record_message(
    pool: &PgPool,
    telegram_id: i64,
    message: &str,
    sender: &str,
    message_type: &str,
) -> Result<()> {
    debug!(telegram_id = %telegram_id, sender = %sender, "Recording conversation turn");

    sqlx::query(
        "INSERT INTO conversations (telegram_id, message, sender, message_type) VALUES ($1, $2, $3, $4)",
    )
    .bind(telegram_id)
    .bind(message)
    .bind(sender)
    .bind(message_type)
    .execute(pool)
    .await
    .context("Failed to insert conversation turn")?;

    sqlx::query(
        "UPDATE users SET total_messages = total_messages + 1, last_active = CURRENT_TIMESTAMP
         WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .execute(pool)
    .await
    .context("Failed to update user message counters")?;

    if sender == "user" {
        sqlx::query(
            "UPDATE user_context SET last_query = $1, query_count = query_count + 1,
                                     updated_at = CURRENT_TIMESTAMP
             WHERE telegram_id = $2",
        )
        .bind(message)
        .bind(telegram_id)
        .execute(pool)
        .await
        .context("Failed to update user context counters")?;
    }

    Ok(())
}

/// Get a user's recent conversation history in chronological order
pub async fn recent_history(
    pool: &PgPool,
    telegram_id: i64,
    limit: i64,
) -> Result<Vec<ConversationTurn>> {
    let rows = sqlx::query(
        "SELECT message, sender, message_type, created_at FROM conversations
         WHERE telegram_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(telegram_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch conversation history")?;

    let mut history: Vec<ConversationTurn> = rows
        .into_iter()
        .map(|row| ConversationTurn {
            message: row.get(0),
            sender: row.get(1),
            message_type: row.get(2),
            created_at: row.get(3),
        })
        .collect();

    // Rows come back newest-first; callers want chronological order
    history.reverse();
    Ok(history)
}

/// Delete user-sent conversation rows older than the retention window
pub async fn cleanup_old_conversations(pool: &PgPool, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(retention_days);

    let result = sqlx::query("DELETE FROM conversations WHERE created_at < $1 AND sender = 'user'")
        .bind(cutoff)
        .execute(pool)
        .await
        .context("Failed to clean up old conversations")?;

    let deleted = result.rows_affected();
    info!("Cleaned up {deleted} old conversation records");
    Ok(deleted)
}

/// Get a user's current context
pub async fn get_user_context(pool: &PgPool, telegram_id: i64) -> Result<UserContext> {
    let row = sqlx::query(
        "SELECT current_topic, context, last_query, query_count FROM user_context
         WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch user context")?;

    match row {
        Some(row) => Ok(UserContext {
            current_topic: row.get(0),
            context: row.get(1),
            last_query: row.get(2),
            query_count: row.get(3),
        }),
        None => Ok(UserContext {
            context: "{}".to_string(),
            ..Default::default()
        }),
    }
}

/// Update a user's context topic and analysis payload
pub async fn update_user_context(
    pool: &PgPool,
    telegram_id: i64,
    topic: Option<&str>,
    context_json: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE user_context SET current_topic = COALESCE($1, current_topic),
                                 context = $2, updated_at = CURRENT_TIMESTAMP
         WHERE telegram_id = $3",
    )
    .bind(topic)
    .bind(context_json)
    .bind(telegram_id)
    .execute(pool)
    .await
    .context("Failed to update user context")?;

    Ok(())
}

fn row_to_file(row: &sqlx::postgres::PgRow) -> StoredFile {
    StoredFile {
        id: row.get(0),
        telegram_id: row.get(1),
        filename: row.get(2),
        filepath: row.get(3),
        file_type: row.get(4),
        file_size: row.get(5),
        file_hash: row.get(6),
        description: row.get(7),
        tags: row.get(8),
        uploaded_at: row.get(9),
    }
}

const FILE_COLUMNS: &str =
    "id, telegram_id, filename, filepath, file_type, file_size, file_hash, description, tags, uploaded_at";

/// Parameters for inserting a file record
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    pub telegram_id: i64,
    pub filename: &'a str,
    pub filepath: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
    pub file_hash: Option<&'a str>,
    pub description: Option<&'a str>,
    /// JSON array of tag strings
    pub tags: &'a str,
}

/// Insert a file record and return its id
pub async fn create_file(pool: &PgPool, file: NewFile<'_>) -> Result<i64> {
    debug!(telegram_id = %file.telegram_id, filename = %file.filename, "Creating file record");

    let row = sqlx::query(
        "INSERT INTO files (telegram_id, filename, filepath, file_type, file_size, file_hash, description, tags)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
    )
    .bind(file.telegram_id)
    .bind(file.filename)
    .bind(file.filepath)
    .bind(file.file_type)
    .bind(file.file_size)
    .bind(file.file_hash)
    .bind(file.description)
    .bind(file.tags)
    .fetch_one(pool)
    .await
    .context("Failed to insert file record")?;

    let file_id: i64 = row.get(0);
    debug!(file_id = %file_id, "File record created");
    Ok(file_id)
}

/// List a user's active files, most recent first
pub async fn list_user_files(
    pool: &PgPool,
    telegram_id: i64,
    file_type: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredFile>> {
    let rows = match file_type {
        Some(file_type) => {
            sqlx::query(&format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE telegram_id = $1 AND file_type = $2 AND is_active = TRUE
                 ORDER BY uploaded_at DESC LIMIT $3"
            ))
            .bind(telegram_id)
            .bind(file_type)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE telegram_id = $1 AND is_active = TRUE
                 ORDER BY uploaded_at DESC LIMIT $2"
            ))
            .bind(telegram_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
    .context("Failed to list user files")?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Search a user's files by filename, description, or tags
pub async fn search_files(pool: &PgPool, telegram_id: i64, query: &str) -> Result<Vec<StoredFile>> {
    let pattern = format!("%{}%", query);

    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM files
         WHERE telegram_id = $1 AND is_active = TRUE
           AND (filename ILIKE $2 OR description ILIKE $2 OR tags ILIKE $2)
         ORDER BY uploaded_at DESC"
    ))
    .bind(telegram_id)
    .bind(&pattern)
    .fetch_all(pool)
    .await
    .context("Failed to search files")?;

    info!("Found {} files matching query", rows.len());
    Ok(rows.iter().map(row_to_file).collect())
}

/// Get a single active file by id, scoped to its owner
pub async fn get_file_by_id(
    pool: &PgPool,
    telegram_id: i64,
    file_id: i64,
) -> Result<Option<StoredFile>> {
    let row = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE id = $1 AND telegram_id = $2 AND is_active = TRUE"
    ))
    .bind(file_id)
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch file by id")?;

    Ok(row.map(|row| row_to_file(&row)))
}

/// Soft delete a file (keeps the row, hides it from listings)
pub async fn soft_delete_file(pool: &PgPool, telegram_id: i64, file_id: i64) -> Result<bool> {
    let result =
        sqlx::query("UPDATE files SET is_active = FALSE WHERE id = $1 AND telegram_id = $2")
            .bind(file_id)
            .bind(telegram_id)
            .execute(pool)
            .await
            .context("Failed to soft delete file")?;

    let deleted = result.rows_affected() > 0;
    if deleted {
        info!(file_id = %file_id, "File soft deleted");
    }
    Ok(deleted)
}

/// Per-type file statistics for a user
pub async fn file_stats(pool: &PgPool, telegram_id: i64) -> Result<Vec<FileTypeStats>> {
    let rows = sqlx::query(
        "SELECT file_type, COUNT(*), COALESCE(SUM(file_size), 0) FROM files
         WHERE telegram_id = $1 AND is_active = TRUE
         GROUP BY file_type ORDER BY COUNT(*) DESC",
    )
    .bind(telegram_id)
    .fetch_all(pool)
    .await
    .context("Failed to aggregate file stats")?;

    Ok(rows
        .into_iter()
        .map(|row| FileTypeStats {
            file_type: row.get(0),
            count: row.get(1),
            total_size: row.get(2),
        })
        .collect())
}

fn row_to_quiz(row: &sqlx::postgres::PgRow) -> QuizRecord {
    QuizRecord {
        id: row.get(0),
        telegram_id: row.get(1),
        title: row.get(2),
        questions: row.get(3),
        total_questions: row.get(4),
        source_file: row.get(5),
        subject: row.get(6),
        difficulty: row.get(7),
        created_at: row.get(8),
    }
}

const QUIZ_COLUMNS: &str =
    "id, telegram_id, title, questions, total_questions, source_file, subject, difficulty, created_at";

/// Insert a quiz and return its id
pub async fn create_quiz(
    pool: &PgPool,
    telegram_id: i64,
    title: &str,
    questions_json: &str,
    total_questions: i32,
    source_file: Option<&str>,
    subject: Option<&str>,
    difficulty: &str,
) -> Result<i64> {
    debug!(telegram_id = %telegram_id, title = %title, "Creating quiz");

    let row = sqlx::query(
        "INSERT INTO quizzes (telegram_id, title, questions, total_questions, source_file, subject, difficulty)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(telegram_id)
    .bind(title)
    .bind(questions_json)
    .bind(total_questions)
    .bind(source_file)
    .bind(subject)
    .bind(difficulty)
    .fetch_one(pool)
    .await
    .context("Failed to insert quiz")?;

    let quiz_id: i64 = row.get(0);
    debug!(quiz_id = %quiz_id, "Quiz created successfully");
    Ok(quiz_id)
}

/// Read a quiz by id
pub async fn get_quiz(pool: &PgPool, quiz_id: i64) -> Result<Option<QuizRecord>> {
    let row = sqlx::query(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"))
        .bind(quiz_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch quiz")?;

    Ok(row.map(|row| row_to_quiz(&row)))
}

/// List a user's quizzes, most recent first
pub async fn list_user_quizzes(
    pool: &PgPool,
    telegram_id: i64,
    limit: i64,
) -> Result<Vec<QuizRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE telegram_id = $1
         ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(telegram_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list user quizzes")?;

    Ok(rows.iter().map(row_to_quiz).collect())
}

/// Record a completed quiz attempt
pub async fn record_quiz_attempt(
    pool: &PgPool,
    quiz_id: i64,
    telegram_id: i64,
    answers_json: &str,
    score: i32,
    total_questions: i32,
    time_taken_secs: Option<i32>,
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO quiz_attempts (quiz_id, telegram_id, answers, score, total_questions, time_taken_secs)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(quiz_id)
    .bind(telegram_id)
    .bind(answers_json)
    .bind(score)
    .bind(total_questions)
    .bind(time_taken_secs)
    .fetch_one(pool)
    .await
    .context("Failed to record quiz attempt")?;

    let attempt_id: i64 = row.get(0);
    info!(attempt_id = %attempt_id, quiz_id = %quiz_id, score = %score, "Quiz attempt recorded");
    Ok(attempt_id)
}

/// Aggregate per-user statistics
pub async fn get_user_stats(pool: &PgPool, telegram_id: i64) -> Result<Option<UserStats>> {
    let user_row = sqlx::query(
        "SELECT total_messages, created_at, last_active FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch user for stats")?;

    let Some(user_row) = user_row else {
        return Ok(None);
    };

    let file_count: i64 = sqlx::query(
        "SELECT COUNT(*) FROM files WHERE telegram_id = $1 AND is_active = TRUE",
    )
    .bind(telegram_id)
    .fetch_one(pool)
    .await
    .context("Failed to count files")?
    .get(0);

    let quiz_count: i64 = sqlx::query("SELECT COUNT(*) FROM quizzes WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_one(pool)
        .await
        .context("Failed to count quizzes")?
        .get(0);

    let attempt_row = sqlx::query(
        "SELECT COUNT(*), COALESCE(AVG(score::float8 / NULLIF(total_questions, 0) * 100), 0)
         FROM quiz_attempts WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_one(pool)
    .await
    .context("Failed to aggregate quiz attempts")?;

    Ok(Some(UserStats {
        total_messages: user_row.get(0),
        member_since: user_row.get(1),
        last_active: user_row.get(2),
        files_uploaded: file_count,
        quizzes_created: quiz_count,
        quiz_attempts: attempt_row.get(0),
        average_score: attempt_row.get(1),
    }))
}

/// Insert or refresh a group record
pub async fn upsert_group(
    pool: &PgPool,
    chat_id: i64,
    title: Option<&str>,
    group_type: &str,
    admin_user_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO groups (chat_id, title, group_type, admin_user_id) VALUES ($1, $2, $3, $4)
         ON CONFLICT (chat_id) DO UPDATE SET title = EXCLUDED.title, is_active = TRUE",
    )
    .bind(chat_id)
    .bind(title)
    .bind(group_type)
    .bind(admin_user_id)
    .execute(pool)
    .await
    .context("Failed to upsert group")?;

    Ok(())
}

/// Insert or reactivate a group member
pub async fn upsert_group_member(
    pool: &PgPool,
    chat_id: i64,
    telegram_id: i64,
    role: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_members (chat_id, telegram_id, role) VALUES ($1, $2, $3)
         ON CONFLICT (chat_id, telegram_id)
         DO UPDATE SET is_active = TRUE, joined_at = CURRENT_TIMESTAMP",
    )
    .bind(chat_id)
    .bind(telegram_id)
    .bind(role)
    .execute(pool)
    .await
    .context("Failed to upsert group member")?;

    Ok(())
}

/// Persist a finished group quiz session and return its id
pub async fn create_group_quiz_session(
    pool: &PgPool,
    chat_id: i64,
    quiz_title: &str,
    started_at: DateTime<Utc>,
    total_participants: i32,
    quiz_json: &str,
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO group_quiz_sessions (chat_id, quiz_title, started_at, ended_at, total_participants, quiz)
         VALUES ($1, $2, $3, CURRENT_TIMESTAMP, $4, $5) RETURNING id",
    )
    .bind(chat_id)
    .bind(quiz_title)
    .bind(started_at)
    .bind(total_participants)
    .bind(quiz_json)
    .fetch_one(pool)
    .await
    .context("Failed to insert group quiz session")?;

    Ok(row.get(0))
}

/// Persist one participant's result for a group quiz session
pub async fn record_group_quiz_result(
    pool: &PgPool,
    session_id: i64,
    telegram_id: i64,
    score: i32,
    total_questions: i32,
    percentage: f64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO group_quiz_results (session_id, telegram_id, score, total_questions, percentage)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(session_id)
    .bind(telegram_id)
    .bind(score)
    .bind(total_questions)
    .bind(percentage)
    .execute(pool)
    .await
    .context("Failed to record group quiz result")?;

    Ok(())
}

/// Aggregate the historical leaderboard for a group chat
pub async fn group_leaderboard(
    pool: &PgPool,
    chat_id: i64,
    limit: i64,
) -> Result<Vec<LeaderboardEntry>> {
    let rows = sqlx::query(
        "SELECT COALESCE(u.first_name, 'Student'), AVG(r.percentage), COUNT(r.session_id)
         FROM group_quiz_results r
         JOIN users u ON r.telegram_id = u.telegram_id
         JOIN group_quiz_sessions s ON r.session_id = s.id
         WHERE s.chat_id = $1
         GROUP BY r.telegram_id, u.first_name
         ORDER BY AVG(r.percentage) DESC, COUNT(r.session_id) DESC
         LIMIT $2",
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to aggregate group leaderboard")?;

    Ok(rows
        .into_iter()
        .map(|row| LeaderboardEntry {
            first_name: row.get(0),
            avg_percentage: row.get(1),
            quiz_count: row.get(2),
        })
        .collect())
}
