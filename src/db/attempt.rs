use color_eyre::Result;
use libsql::params;

use super::helpers::query_all;
use super::models::{Attempt, AttemptRow};
use super::Db;
use crate::models::AttemptRecord;

impl Db {
    /// Insert attempt rows inside an open completion transaction.
    pub(crate) async fn insert_attempts_tx(
        tx: &libsql::Transaction,
        session_id: &str,
        user_id: &str,
        answered_at: &str,
        attempts: &[AttemptRecord],
    ) -> Result<()> {
        for attempt in attempts {
            tx.execute(
                r#"
                INSERT INTO attempts (user_id, session_id, question_id, selected_choice, is_correct, answered_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                params![
                    user_id,
                    session_id,
                    attempt.question_id,
                    attempt.selected_choice.clone(),
                    i64::from(attempt.is_correct),
                    answered_at
                ],
            )
            .await?;
        }
        Ok(())
    }

    pub async fn attempts_for_session(&self, session_id: &str) -> Result<Vec<Attempt>> {
        let conn = self.connect().await?;
        let rows: Vec<AttemptRow> = query_all(
            &conn,
            r#"
            SELECT user_id, session_id, question_id, selected_choice, is_correct, answered_at
            FROM attempts
            WHERE session_id = ?
            ORDER BY question_id
            "#,
            params![session_id],
        )
        .await?;

        rows.into_iter().map(Attempt::try_from).collect()
    }
}
