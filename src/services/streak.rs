use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::Result;

use crate::db::{Db, Streak};

// ---------------------------------------------------------------------------
// StreakRepository trait (DIP: service defines the abstraction it needs)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait StreakRepository: Send + Sync {
    /// Most recent quiz date the user completed, not counting the session
    /// that triggered the current update.
    fn latest_completion_date(
        &self,
        user_id: &str,
        exclude_session: &str,
    ) -> impl std::future::Future<Output = Result<Option<NaiveDate>>> + Send;

    fn streak(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Streak>>> + Send;

    fn extend_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Streak>> + Send;

    fn restart_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Streak>> + Send;

    fn reset_streak(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Streak>> + Send;
}

impl StreakRepository for Db {
    async fn latest_completion_date(
        &self,
        user_id: &str,
        exclude_session: &str,
    ) -> Result<Option<NaiveDate>> {
        Db::latest_completion_date(self, user_id, exclude_session).await
    }

    async fn streak(&self, user_id: &str) -> Result<Option<Streak>> {
        Db::streak(self, user_id).await
    }

    async fn extend_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        Db::extend_streak(self, user_id, now).await
    }

    async fn restart_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        Db::restart_streak(self, user_id, now).await
    }

    async fn reset_streak(&self, user_id: &str, now: DateTime<Utc>) -> Result<Streak> {
        Db::reset_streak(self, user_id, now).await
    }
}

/// Whether a perfect completion on `completed_on` continues an existing run.
/// Same-day guards against double counting; one day back is an unbroken run.
/// Anything else starts over.
pub fn extends_run(prior: Option<NaiveDate>, completed_on: NaiveDate) -> bool {
    match prior {
        Some(prior) => {
            let gap = (completed_on - prior).num_days();
            gap == 0 || gap == 1
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// StreakService
// ---------------------------------------------------------------------------

pub struct StreakService<R: StreakRepository = Db> {
    repo: R,
}

impl<R: StreakRepository> StreakService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// All answers were correct: extend the run when yesterday (or today)
    /// was the last completion, otherwise start a new run at one.
    pub async fn apply_perfect(
        &self,
        user_id: &str,
        completed_on: NaiveDate,
        exclude_session: &str,
    ) -> Result<Streak> {
        let prior = self
            .repo
            .latest_completion_date(user_id, exclude_session)
            .await?;

        let streak = if extends_run(prior, completed_on) {
            self.repo.extend_streak(user_id, Utc::now()).await?
        } else {
            self.repo.restart_streak(user_id, Utc::now()).await?
        };

        tracing::info!(
            "streak for {user_id} now {} (longest {})",
            streak.current,
            streak.longest
        );
        Ok(streak)
    }

    /// At least one wrong answer: the run is over.
    pub async fn apply_imperfect(&self, user_id: &str) -> Result<Streak> {
        let streak = self.repo.reset_streak(user_id, Utc::now()).await?;
        tracing::info!(
            "streak for {user_id} reset to 0 (longest {} kept)",
            streak.longest
        );
        Ok(streak)
    }

    pub async fn current(&self, user_id: &str) -> Result<Option<Streak>> {
        self.repo.streak(user_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
