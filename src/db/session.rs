use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::OptionExt, Result};
use libsql::params;
use ulid::Ulid;

use super::helpers::query_optional;
use super::models::{parse_date, QuizSession, SessionRow};
use super::Db;
use crate::models::AttemptRecord;

const SESSION_COLUMNS: &str =
    "id, user_id, daily_quiz_id, current_index, status, started_at, completed_at, last_activity_at, timezone";

impl Db {
    /// Create a fresh in-progress session. The partial unique index on
    /// (user_id, daily_quiz_id) rejects this with a unique violation when an
    /// in-progress session already exists; callers re-fetch the winner.
    pub async fn insert_session(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
        timezone: &str,
    ) -> Result<QuizSession> {
        let id = Ulid::new().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;

        conn.execute(
            r#"
            INSERT INTO quiz_sessions (id, user_id, daily_quiz_id, current_index, status, started_at, last_activity_at, timezone)
            VALUES (?, ?, ?, 0, 'in_progress', ?, ?, ?)
            "#,
            params![id.clone(), user_id, daily_quiz_id, now.clone(), now, timezone],
        )
        .await?;

        tracing::info!("session {id} started for user={user_id} quiz={daily_quiz_id}");

        self.session_by_id(&id)
            .await?
            .ok_or_eyre("session missing immediately after insert")
    }

    pub async fn find_in_progress_session(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
    ) -> Result<Option<QuizSession>> {
        let conn = self.connect().await?;
        let row: Option<SessionRow> = query_optional(
            &conn,
            &format!(
                "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE user_id = ? AND daily_quiz_id = ? AND status = 'in_progress'"
            ),
            params![user_id, daily_quiz_id],
        )
        .await?;

        match row {
            Some(row) => {
                let answers = self.session_answers(&conn, &row.id).await?;
                Ok(Some(row.into_session(answers)?))
            }
            None => Ok(None),
        }
    }

    pub async fn session_by_id(&self, session_id: &str) -> Result<Option<QuizSession>> {
        let conn = self.connect().await?;
        let row: Option<SessionRow> = query_optional(
            &conn,
            &format!("SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE id = ?"),
            params![session_id],
        )
        .await?;

        match row {
            Some(row) => {
                let answers = self.session_answers(&conn, &row.id).await?;
                Ok(Some(row.into_session(answers)?))
            }
            None => Ok(None),
        }
    }

    /// Upsert one answer into the session's answer map (re-answering
    /// overwrites) and bump the activity timestamp. The cursor only moves
    /// forward, and only when `advance` is set.
    pub async fn save_answer(
        &self,
        session_id: &str,
        question_id: i64,
        selected_choice: &str,
        advance: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect().await?;
        let ts = now.to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO session_answers (session_id, question_id, selected_choice, answered_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, question_id)
            DO UPDATE SET selected_choice = excluded.selected_choice, answered_at = excluded.answered_at
            "#,
            params![session_id, question_id, selected_choice, ts.clone()],
        )
        .await?;

        let bump = i64::from(advance);
        conn.execute(
            "UPDATE quiz_sessions SET current_index = current_index + ?, last_activity_at = ? WHERE id = ? AND status = 'in_progress'",
            params![bump, ts, session_id],
        )
        .await?;

        Ok(())
    }

    /// Flip a session to completed and write its attempt history in one
    /// transaction. Returns false when the session was not in progress (a
    /// concurrent completion already won); nothing is written in that case.
    pub async fn record_completion(
        &self,
        session_id: &str,
        user_id: &str,
        completed_at: DateTime<Utc>,
        attempts: &[AttemptRecord],
    ) -> Result<bool> {
        let conn = self.connect().await?;
        let ts = completed_at.to_rfc3339();

        let tx = conn.transaction().await?;

        let flipped = tx
            .execute(
                "UPDATE quiz_sessions SET status = 'completed', completed_at = ?, last_activity_at = ? WHERE id = ? AND status = 'in_progress'",
                params![ts.clone(), ts.clone(), session_id],
            )
            .await?;

        if flipped == 0 {
            return Ok(false);
        }

        Self::insert_attempts_tx(&tx, session_id, user_id, &ts, attempts).await?;

        tx.commit().await?;

        tracing::info!(
            "session {session_id} completed with {} attempts recorded",
            attempts.len()
        );
        Ok(true)
    }

    /// The most recent quiz date this user completed, excluding the given
    /// session. Drives the streak continuity decision.
    pub async fn latest_completion_date(
        &self,
        user_id: &str,
        exclude_session: &str,
    ) -> Result<Option<NaiveDate>> {
        let conn = self.connect().await?;
        let row = conn
            .query(
                r#"
                SELECT dq.quiz_date
                FROM quiz_sessions s
                JOIN daily_quizzes dq ON dq.id = s.daily_quiz_id
                WHERE s.user_id = ? AND s.status = 'completed' AND s.id != ?
                ORDER BY dq.quiz_date DESC
                LIMIT 1
                "#,
                params![user_id, exclude_session],
            )
            .await?
            .next()
            .await?;

        match row {
            Some(row) => Ok(Some(parse_date(&row.get::<String>(0)?)?)),
            None => Ok(None),
        }
    }

    async fn session_answers(
        &self,
        conn: &libsql::Connection,
        session_id: &str,
    ) -> Result<HashMap<i64, String>> {
        let mut rows = conn
            .query(
                "SELECT question_id, selected_choice FROM session_answers WHERE session_id = ?",
                params![session_id],
            )
            .await?;

        let mut answers = HashMap::new();
        while let Some(row) = rows.next().await? {
            answers.insert(row.get::<i64>(0)?, row.get::<String>(1)?);
        }
        Ok(answers)
    }
}
