use chrono::{NaiveDate, Utc};
use color_eyre::{eyre::OptionExt, Result};
use libsql::params;

use super::helpers::query_optional;
use super::models::{parse_timestamp, DailyQuiz, DailyQuizRow};
use super::Db;

impl Db {
    /// Insert the quiz for a date together with its ordered question list in
    /// one transaction. The unique constraint on quiz_date arbitrates
    /// concurrent creation; losing inserts surface as a unique violation for
    /// the caller to recover from.
    pub async fn insert_daily_quiz(
        &self,
        date: NaiveDate,
        question_ids: &[i64],
    ) -> Result<DailyQuiz> {
        let conn = self.connect().await?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction().await?;

        let quiz_id = tx
            .query(
                "INSERT INTO daily_quizzes (quiz_date, created_at) VALUES (?, ?) RETURNING id",
                params![date.to_string(), now.clone()],
            )
            .await?
            .next()
            .await?
            .ok_or_eyre("could not get daily quiz id")?
            .get::<i64>(0)?;

        for (position, question_id) in question_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO daily_quiz_questions (daily_quiz_id, question_id, position) VALUES (?, ?, ?)",
                params![quiz_id, *question_id, position as i64],
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "daily quiz {quiz_id} created for {date} with {} questions",
            question_ids.len()
        );

        Ok(DailyQuiz {
            id: quiz_id,
            date,
            question_ids: question_ids.to_vec(),
            created_at: parse_timestamp(&now)?,
        })
    }

    pub async fn daily_quiz_by_date(&self, date: NaiveDate) -> Result<Option<DailyQuiz>> {
        let conn = self.connect().await?;
        let row: Option<DailyQuizRow> = query_optional(
            &conn,
            "SELECT id, quiz_date, created_at FROM daily_quizzes WHERE quiz_date = ?",
            params![date.to_string()],
        )
        .await?;

        match row {
            Some(row) => {
                let question_ids = self.quiz_question_ids(&conn, row.id).await?;
                Ok(Some(row.into_quiz(question_ids)?))
            }
            None => Ok(None),
        }
    }

    pub async fn daily_quiz_by_id(&self, quiz_id: i64) -> Result<Option<DailyQuiz>> {
        let conn = self.connect().await?;
        let row: Option<DailyQuizRow> = query_optional(
            &conn,
            "SELECT id, quiz_date, created_at FROM daily_quizzes WHERE id = ?",
            params![quiz_id],
        )
        .await?;

        match row {
            Some(row) => {
                let question_ids = self.quiz_question_ids(&conn, row.id).await?;
                Ok(Some(row.into_quiz(question_ids)?))
            }
            None => Ok(None),
        }
    }

    async fn quiz_question_ids(
        &self,
        conn: &libsql::Connection,
        quiz_id: i64,
    ) -> Result<Vec<i64>> {
        let mut rows = conn
            .query(
                "SELECT question_id FROM daily_quiz_questions WHERE daily_quiz_id = ? ORDER BY position",
                params![quiz_id],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }
}
