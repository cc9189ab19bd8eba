use chrono::Utc;
use color_eyre::{eyre::OptionExt, Result};
use libsql::params;

use super::helpers::{query_all, query_optional};
use super::models::{Question, QuestionRow};
use super::Db;
use crate::models::{Difficulty, GeneratedQuestion};

const QUESTION_COLUMNS: &str =
    "id, surah, ayah, prompt, choices, correct_choice, difficulty, approved_at, created_at, created_by";

impl Db {
    /// Stage generated questions into the moderation queue (approved_at stays
    /// null, so they are not quiz-eligible until a moderator approves them).
    pub async fn stage_generated_questions(
        &self,
        items: &[GeneratedQuestion],
        created_by: &str,
    ) -> Result<u64> {
        let conn = self.connect().await?;
        let now = Utc::now().to_rfc3339();

        let mut staged = 0u64;
        for item in items {
            let choices = serde_json::to_string(&item.choices)?;
            staged += conn
                .execute(
                    r#"
                    INSERT INTO questions (surah, ayah, prompt, choices, correct_choice, difficulty, approved_at, created_at, created_by)
                    VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)
                    "#,
                    params![
                        item.surah,
                        item.ayah,
                        item.prompt.clone(),
                        choices,
                        item.correct_choice.clone(),
                        item.difficulty.as_str(),
                        now.clone(),
                        created_by
                    ],
                )
                .await?;
        }

        tracing::info!("{staged} generated questions staged for moderation");
        Ok(staged)
    }

    /// Stamp a pending question as approved. Returns false if the question
    /// does not exist or was already approved.
    pub async fn approve_question(&self, question_id: i64) -> Result<bool> {
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "UPDATE questions SET approved_at = ? WHERE id = ? AND approved_at IS NULL",
                params![Utc::now().to_rfc3339(), question_id],
            )
            .await?;

        if affected > 0 {
            tracing::info!("question {question_id} approved");
        }
        Ok(affected > 0)
    }

    /// Candidate pool for one difficulty tier. Only approved questions are
    /// returned; ordering is arbitrary, randomization belongs to the selector.
    pub async fn approved_questions(
        &self,
        difficulty: Difficulty,
        limit: i64,
    ) -> Result<Vec<Question>> {
        let conn = self.connect().await?;
        let rows: Vec<QuestionRow> = query_all(
            &conn,
            &format!(
                "SELECT {QUESTION_COLUMNS} FROM questions WHERE difficulty = ? AND approved_at IS NOT NULL LIMIT ?"
            ),
            params![difficulty.as_str(), limit],
        )
        .await?;

        rows.into_iter().map(Question::try_from).collect()
    }

    pub async fn question_by_id(&self, question_id: i64) -> Result<Option<Question>> {
        let conn = self.connect().await?;
        let row: Option<QuestionRow> = query_optional(
            &conn,
            &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?"),
            params![question_id],
        )
        .await?;

        row.map(Question::try_from).transpose()
    }

    /// Resolve a list of question ids preserving the given order. Errors if
    /// any id is missing; a daily quiz referencing a vanished question is a
    /// data integrity failure, not a recoverable condition.
    pub async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>> {
        let mut questions = Vec::with_capacity(ids.len());
        for &id in ids {
            let question = self
                .question_by_id(id)
                .await?
                .ok_or_eyre(format!("question {id} referenced by a quiz is missing"))?;
            questions.push(question);
        }
        Ok(questions)
    }

    /// The moderation queue: generated questions awaiting approval.
    pub async fn pending_questions(&self, limit: i64) -> Result<Vec<Question>> {
        let conn = self.connect().await?;
        let rows: Vec<QuestionRow> = query_all(
            &conn,
            &format!(
                "SELECT {QUESTION_COLUMNS} FROM questions WHERE approved_at IS NULL ORDER BY created_at LIMIT ?"
            ),
            params![limit],
        )
        .await?;

        rows.into_iter().map(Question::try_from).collect()
    }
}
