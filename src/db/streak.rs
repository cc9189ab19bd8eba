use chrono::{DateTime, Utc};
use color_eyre::{eyre::OptionExt, Result};
use libsql::params;

use super::helpers::query_optional;
use super::models::{Streak, StreakRow};
use super::Db;

// Each mutation below is a single upsert statement so two devices completing
// at once cannot interleave a read-modify-write and lose an update.
impl Db {
    pub async fn streak(&self, user_id: &str) -> Result<Option<Streak>> {
        let conn = self.connect().await?;
        let row: Option<StreakRow> = query_optional(
            &conn,
            "SELECT user_id, current, longest, updated_at FROM streaks WHERE user_id = ?",
            params![user_id],
        )
        .await?;

        row.map(Streak::try_from).transpose()
    }

    /// Continue a run: current + 1, longest raised to match when exceeded.
    pub async fn extend_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO streaks (user_id, current, longest, updated_at) VALUES (?, 1, 1, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current = streaks.current + 1,
                longest = MAX(streaks.longest, streaks.current + 1),
                updated_at = excluded.updated_at
            "#,
            params![user_id, now.to_rfc3339()],
        )
        .await?;

        self.streak(user_id)
            .await?
            .ok_or_eyre("streak row missing after upsert")
    }

    /// Start a new run at one: the day just completed counts as day one.
    pub async fn restart_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO streaks (user_id, current, longest, updated_at) VALUES (?, 1, 1, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current = 1,
                longest = MAX(streaks.longest, 1),
                updated_at = excluded.updated_at
            "#,
            params![user_id, now.to_rfc3339()],
        )
        .await?;

        self.streak(user_id)
            .await?
            .ok_or_eyre("streak row missing after upsert")
    }

    /// Imperfect completion: current drops to zero, longest is untouched.
    pub async fn reset_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            INSERT INTO streaks (user_id, current, longest, updated_at) VALUES (?, 0, 0, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current = 0,
                updated_at = excluded.updated_at
            "#,
            params![user_id, now.to_rfc3339()],
        )
        .await?;

        self.streak(user_id)
            .await?
            .ok_or_eyre("streak row missing after upsert")
    }
}
