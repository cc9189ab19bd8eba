// Database schema initialization

use color_eyre::Result;

pub async fn create_schema(conn: &libsql::Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS verses (
            id INTEGER PRIMARY KEY,
            surah INTEGER NOT NULL,
            ayah INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(surah, ayah)
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            surah INTEGER NOT NULL,
            ayah INTEGER NOT NULL,
            prompt TEXT NOT NULL,
            choices TEXT NOT NULL,
            correct_choice TEXT NOT NULL,
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard')),
            approved_at TEXT,
            created_at TEXT NOT NULL,
            created_by TEXT
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE INDEX IF NOT EXISTS idx_questions_difficulty_approved
        ON questions(difficulty) WHERE approved_at IS NOT NULL
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS daily_quizzes (
            id INTEGER PRIMARY KEY,
            quiz_date TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS daily_quiz_questions (
            id INTEGER PRIMARY KEY,
            daily_quiz_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            FOREIGN KEY(daily_quiz_id) REFERENCES daily_quizzes(id) ON DELETE CASCADE,
            FOREIGN KEY(question_id) REFERENCES questions(id) ON DELETE CASCADE,
            UNIQUE(daily_quiz_id, position)
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS quiz_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            daily_quiz_id INTEGER NOT NULL,
            current_index INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'in_progress'
                CHECK (status IN ('in_progress', 'completed', 'expired')),
            started_at TEXT NOT NULL,
            completed_at TEXT,
            last_activity_at TEXT NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            FOREIGN KEY(daily_quiz_id) REFERENCES daily_quizzes(id) ON DELETE CASCADE
        )
        "#,
        (),
    )
    .await?;

    // At most one in-progress session per (user, daily quiz); concurrent
    // starts are arbitrated by this index.
    conn.execute(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_in_progress
        ON quiz_sessions(user_id, daily_quiz_id) WHERE status = 'in_progress'
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS session_answers (
            id INTEGER PRIMARY KEY,
            session_id TEXT NOT NULL,
            question_id INTEGER NOT NULL,
            selected_choice TEXT NOT NULL,
            answered_at TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES quiz_sessions(id) ON DELETE CASCADE,
            UNIQUE(session_id, question_id)
        )
        "#,
        (),
    )
    .await?;

    // Append-only; the unique key also blocks a second completion from
    // duplicating attempt history.
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            question_id INTEGER NOT NULL,
            selected_choice TEXT,
            is_correct BOOLEAN NOT NULL,
            answered_at TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES quiz_sessions(id) ON DELETE CASCADE,
            UNIQUE(session_id, question_id)
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS streaks (
            user_id TEXT PRIMARY KEY,
            current INTEGER NOT NULL DEFAULT 0,
            longest INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            CHECK (longest >= current)
        )
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS generation_runs (
            id INTEGER PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            verses_scanned INTEGER NOT NULL,
            questions_staged INTEGER NOT NULL,
            batches INTEGER NOT NULL,
            error_count INTEGER NOT NULL,
            last_error TEXT,
            success BOOLEAN NOT NULL
        )
        "#,
        (),
    )
    .await?;

    Ok(())
}
