use chrono::{DateTime, Utc};
use color_eyre::Result;

use super::streak::{StreakRepository, StreakService};
use crate::db::{is_unique_violation, DailyQuiz, Db, Question, QuizSession};
use crate::models::{AnswerReview, AttemptRecord, QuizResult, SessionStatus};
use crate::names;

// ---------------------------------------------------------------------------
// SessionRepository trait (DIP: service defines the abstraction it needs)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait SessionRepository: Send + Sync {
    fn find_in_progress(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<QuizSession>>> + Send;

    fn insert_session(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
        timezone: &str,
    ) -> impl std::future::Future<Output = Result<QuizSession>> + Send;

    fn session_by_id(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<QuizSession>>> + Send;

    fn save_answer(
        &self,
        session_id: &str,
        question_id: i64,
        selected_choice: &str,
        advance: bool,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn daily_quiz_by_id(
        &self,
        daily_quiz_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<DailyQuiz>>> + Send;

    fn questions_for_quiz(
        &self,
        question_ids: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<Question>>> + Send;

    fn record_completion(
        &self,
        session_id: &str,
        user_id: &str,
        completed_at: DateTime<Utc>,
        attempts: &[AttemptRecord],
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl SessionRepository for Db {
    async fn find_in_progress(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
    ) -> Result<Option<QuizSession>> {
        Db::find_in_progress_session(self, user_id, daily_quiz_id).await
    }

    async fn insert_session(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
        timezone: &str,
    ) -> Result<QuizSession> {
        Db::insert_session(self, user_id, daily_quiz_id, timezone).await
    }

    async fn session_by_id(&self, session_id: &str) -> Result<Option<QuizSession>> {
        Db::session_by_id(self, session_id).await
    }

    async fn save_answer(
        &self,
        session_id: &str,
        question_id: i64,
        selected_choice: &str,
        advance: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Db::save_answer(self, session_id, question_id, selected_choice, advance, now).await
    }

    async fn daily_quiz_by_id(&self, daily_quiz_id: i64) -> Result<Option<DailyQuiz>> {
        Db::daily_quiz_by_id(self, daily_quiz_id).await
    }

    async fn questions_for_quiz(&self, question_ids: &[i64]) -> Result<Vec<Question>> {
        Db::questions_by_ids(self, question_ids).await
    }

    async fn record_completion(
        &self,
        session_id: &str,
        user_id: &str,
        completed_at: DateTime<Utc>,
        attempts: &[AttemptRecord],
    ) -> Result<bool> {
        Db::record_completion(self, session_id, user_id, completed_at, attempts).await
    }
}

// ---------------------------------------------------------------------------
// Outcome enums
// ---------------------------------------------------------------------------

pub enum StartOutcome {
    /// A fresh session was created.
    Started(QuizSession),
    /// An in-progress session already existed and is returned unchanged.
    Resumed(QuizSession),
    /// The referenced daily quiz does not exist.
    QuizNotFound,
}

pub enum AnswerOutcome {
    /// Answer stored (or overwritten); contains the updated session.
    Recorded(QuizSession),
    SessionNotFound,
    /// The session has already completed or expired.
    NotInProgress,
}

pub enum CompleteOutcome {
    Completed(QuizResult),
    SessionNotFound,
    /// The session was already completed; attempts are never duplicated.
    AlreadyCompleted,
    /// The session expired before it was finished.
    Expired,
}

// ---------------------------------------------------------------------------
// SessionService
// ---------------------------------------------------------------------------

pub struct SessionService<R: SessionRepository = Db, S: StreakRepository = Db> {
    repo: R,
    streaks: StreakService<S>,
}

impl<R: SessionRepository, S: StreakRepository> SessionService<R, S> {
    pub fn new(repo: R, streaks: StreakService<S>) -> Self {
        Self { repo, streaks }
    }

    /// Begin (or resume) the user's attempt at a daily quiz. Starting twice
    /// is idempotent: the existing in-progress session comes back unchanged,
    /// including when a concurrent start wins the insert race.
    pub async fn start(
        &self,
        user_id: &str,
        daily_quiz_id: i64,
        timezone: &str,
    ) -> Result<StartOutcome> {
        if let Some(existing) = self.repo.find_in_progress(user_id, daily_quiz_id).await? {
            tracing::info!("resuming session {} for user={user_id}", existing.id);
            return Ok(StartOutcome::Resumed(existing));
        }

        if self.repo.daily_quiz_by_id(daily_quiz_id).await?.is_none() {
            return Ok(StartOutcome::QuizNotFound);
        }

        for _ in 0..names::MAX_CONFLICT_RETRIES {
            match self
                .repo
                .insert_session(user_id, daily_quiz_id, timezone)
                .await
            {
                Ok(session) => return Ok(StartOutcome::Started(session)),
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!(
                        "lost session creation race for user={user_id} quiz={daily_quiz_id}, re-fetching"
                    );
                    if let Some(winner) = self.repo.find_in_progress(user_id, daily_quiz_id).await?
                    {
                        return Ok(StartOutcome::Resumed(winner));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(color_eyre::eyre::eyre!(
            "could not start session for user={user_id} quiz={daily_quiz_id} after {} attempts",
            names::MAX_CONFLICT_RETRIES
        ))
    }

    /// Store one answer. Re-answering a question overwrites the earlier
    /// choice. The cursor is a UI progress marker only: it moves forward when
    /// `advance` is set and never gates which question may be answered.
    pub async fn record_answer(
        &self,
        session_id: &str,
        question_id: i64,
        selected_choice: &str,
        advance: bool,
    ) -> Result<AnswerOutcome> {
        let Some(session) = self.repo.session_by_id(session_id).await? else {
            return Ok(AnswerOutcome::SessionNotFound);
        };
        if session.status != SessionStatus::InProgress {
            return Ok(AnswerOutcome::NotInProgress);
        }

        self.repo
            .save_answer(session_id, question_id, selected_choice, advance, Utc::now())
            .await?;

        let Some(updated) = self.repo.session_by_id(session_id).await? else {
            return Ok(AnswerOutcome::SessionNotFound);
        };
        Ok(AnswerOutcome::Recorded(updated))
    }

    /// Score the session against the full question list, persist the attempt
    /// history, flip the session to completed and update the streak. A second
    /// completion is rejected instead of duplicating attempts.
    pub async fn complete(&self, session_id: &str) -> Result<CompleteOutcome> {
        let Some(session) = self.repo.session_by_id(session_id).await? else {
            return Ok(CompleteOutcome::SessionNotFound);
        };
        match session.status {
            SessionStatus::Completed => return Ok(CompleteOutcome::AlreadyCompleted),
            SessionStatus::Expired => return Ok(CompleteOutcome::Expired),
            SessionStatus::InProgress => {}
        }

        let quiz = self
            .repo
            .daily_quiz_by_id(session.daily_quiz_id)
            .await?
            .ok_or_else(|| {
                color_eyre::eyre::eyre!(
                    "daily quiz {} referenced by session {session_id} is missing",
                    session.daily_quiz_id
                )
            })?;
        let questions = self.repo.questions_for_quiz(&quiz.question_ids).await?;

        let completed_at = Utc::now();
        let mut attempts = Vec::with_capacity(questions.len());
        let mut reviews = Vec::with_capacity(questions.len());
        let mut correct = 0usize;

        // Every quiz question is scored; an unanswered question counts wrong.
        for question in &questions {
            let selected = session.answers.get(&question.id).cloned();
            let is_correct = selected.as_deref() == Some(question.correct_choice.as_str());
            if is_correct {
                correct += 1;
            }
            attempts.push(AttemptRecord {
                question_id: question.id,
                selected_choice: selected.clone(),
                is_correct,
            });
            reviews.push(AnswerReview {
                question_id: question.id,
                selected_answer: selected,
                is_correct,
                time_spent_ms: 0,
            });
        }

        let flipped = self
            .repo
            .record_completion(session_id, &session.user_id, completed_at, &attempts)
            .await?;
        if !flipped {
            // A concurrent completion won; its attempts are the record.
            return Ok(CompleteOutcome::AlreadyCompleted);
        }

        let total = questions.len();
        let perfect = total > 0 && correct == total;
        let streak_update = if perfect {
            self.streaks
                .apply_perfect(&session.user_id, quiz.date, session_id)
                .await
        } else {
            self.streaks.apply_imperfect(&session.user_id).await
        };
        let streak_updated = match streak_update {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("could not update streak for {}: {e}", session.user_id);
                false
            }
        };

        let score = if total == 0 {
            0
        } else {
            ((correct as f64 / total as f64) * 100.0).round() as i64
        };

        Ok(CompleteOutcome::Completed(QuizResult {
            session_id: session_id.to_owned(),
            score,
            total_questions: total,
            correct_answers: correct,
            time_spent_ms: (completed_at - session.started_at).num_milliseconds(),
            answers: reviews,
            streak_updated,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::Difficulty;
    use crate::services::streak::MockStreakRepository;

    fn quiz_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 8).unwrap()
    }

    fn daily_quiz(question_ids: &[i64]) -> DailyQuiz {
        DailyQuiz {
            id: 7,
            date: quiz_date(),
            question_ids: question_ids.to_vec(),
            created_at: Utc::now(),
        }
    }

    fn question(id: i64) -> Question {
        Question {
            id,
            surah: id,
            ayah: 1,
            prompt: format!("Question {id}"),
            choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_choice: "a".into(),
            difficulty: Difficulty::Easy,
            approved_at: Some(Utc::now()),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn session(status: SessionStatus, answers: HashMap<i64, String>) -> QuizSession {
        QuizSession {
            id: "session-1".into(),
            user_id: "user-1".into(),
            daily_quiz_id: 7,
            current_index: 0,
            answers,
            status,
            started_at: Utc::now() - chrono::Duration::seconds(90),
            completed_at: None,
            last_activity_at: Utc::now(),
            timezone: "UTC".into(),
        }
    }

    fn answers(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs
            .iter()
            .map(|(id, choice)| (*id, (*choice).to_owned()))
            .collect()
    }

    fn no_streaks() -> StreakService<MockStreakRepository> {
        StreakService::new(MockStreakRepository::new())
    }

    fn streak_value(current: i64, longest: i64) -> crate::db::Streak {
        crate::db::Streak {
            user_id: "user-1".into(),
            current,
            longest,
            updated_at: Utc::now(),
        }
    }

    // ----- start tests -----

    #[tokio::test]
    async fn start_returns_existing_session_unchanged() {
        let mut mock = MockSessionRepository::new();
        mock.expect_find_in_progress().returning(|_, _| {
            let existing = session(SessionStatus::InProgress, HashMap::new());
            Box::pin(async move { Ok(Some(existing)) })
        });

        let service = SessionService::new(mock, no_streaks());
        let outcome = service.start("user-1", 7, "UTC").await.unwrap();
        assert!(matches!(outcome, StartOutcome::Resumed(ref s) if s.id == "session-1"));
    }

    #[tokio::test]
    async fn start_unknown_quiz_is_rejected() {
        let mut mock = MockSessionRepository::new();
        mock.expect_find_in_progress()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        mock.expect_daily_quiz_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let service = SessionService::new(mock, no_streaks());
        let outcome = service.start("user-1", 99, "UTC").await.unwrap();
        assert!(matches!(outcome, StartOutcome::QuizNotFound));
    }

    #[tokio::test]
    async fn start_lost_race_returns_the_winner() {
        let mut sequence = mockall::Sequence::new();
        let mut mock = MockSessionRepository::new();

        mock.expect_find_in_progress()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Box::pin(async { Ok(None) }));
        mock.expect_daily_quiz_by_id()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Box::pin(async { Ok(Some(daily_quiz(&[1, 2, 3, 4, 5]))) }));
        mock.expect_insert_session()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _| {
                Box::pin(async {
                    Err(color_eyre::eyre::eyre!(
                        "UNIQUE constraint failed: quiz_sessions.user_id, quiz_sessions.daily_quiz_id"
                    ))
                })
            });
        mock.expect_find_in_progress()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| {
                let winner = session(SessionStatus::InProgress, HashMap::new());
                Box::pin(async move { Ok(Some(winner)) })
            });

        let service = SessionService::new(mock, no_streaks());
        let outcome = service.start("user-1", 7, "UTC").await.unwrap();
        assert!(matches!(outcome, StartOutcome::Resumed(_)));
    }

    // ----- record_answer tests -----

    #[tokio::test]
    async fn record_answer_requires_in_progress() {
        let mut mock = MockSessionRepository::new();
        mock.expect_session_by_id().returning(|_| {
            let done = session(SessionStatus::Completed, HashMap::new());
            Box::pin(async move { Ok(Some(done)) })
        });

        let service = SessionService::new(mock, no_streaks());
        let outcome = service
            .record_answer("session-1", 1, "a", true)
            .await
            .unwrap();
        assert!(matches!(outcome, AnswerOutcome::NotInProgress));
    }

    #[tokio::test]
    async fn record_answer_unknown_session() {
        let mut mock = MockSessionRepository::new();
        mock.expect_session_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let service = SessionService::new(mock, no_streaks());
        let outcome = service
            .record_answer("missing", 1, "a", false)
            .await
            .unwrap();
        assert!(matches!(outcome, AnswerOutcome::SessionNotFound));
    }

    #[tokio::test]
    async fn record_answer_saves_and_returns_updated_session() {
        let mut sequence = mockall::Sequence::new();
        let mut mock = MockSessionRepository::new();

        mock.expect_session_by_id()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| {
                let fresh = session(SessionStatus::InProgress, HashMap::new());
                Box::pin(async move { Ok(Some(fresh)) })
            });
        mock.expect_save_answer()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|_, question_id, choice, advance, _| {
                *question_id == 3 && choice == "b" && *advance
            })
            .returning(|_, _, _, _, _| Box::pin(async { Ok(()) }));
        mock.expect_session_by_id()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| {
                let mut updated = session(SessionStatus::InProgress, answers(&[(3, "b")]));
                updated.current_index = 1;
                Box::pin(async move { Ok(Some(updated)) })
            });

        let service = SessionService::new(mock, no_streaks());
        let outcome = service
            .record_answer("session-1", 3, "b", true)
            .await
            .unwrap();
        match outcome {
            AnswerOutcome::Recorded(updated) => {
                assert_eq!(updated.current_index, 1);
                assert_eq!(updated.answers.get(&3).map(String::as_str), Some("b"));
            }
            _ => panic!("expected Recorded"),
        }
    }

    // ----- complete tests -----

    fn repo_for_completion(
        answers_map: HashMap<i64, String>,
        expect_flip: bool,
    ) -> MockSessionRepository {
        let mut mock = MockSessionRepository::new();
        mock.expect_session_by_id().returning(move |_| {
            let s = session(SessionStatus::InProgress, answers_map.clone());
            Box::pin(async move { Ok(Some(s)) })
        });
        mock.expect_daily_quiz_by_id()
            .returning(|_| Box::pin(async { Ok(Some(daily_quiz(&[1, 2, 3, 4, 5]))) }));
        mock.expect_questions_for_quiz().returning(|ids| {
            let questions: Vec<Question> = ids.iter().map(|id| question(*id)).collect();
            Box::pin(async move { Ok(questions) })
        });
        mock.expect_record_completion()
            .returning(move |_, _, _, _| Box::pin(async move { Ok(expect_flip) }));
        mock
    }

    #[tokio::test]
    async fn complete_scores_three_of_five_as_sixty() {
        // 1-3 answered correctly, 4 answered wrong, 5 left unanswered.
        let repo = repo_for_completion(
            answers(&[(1, "a"), (2, "a"), (3, "a"), (4, "c")]),
            true,
        );
        let mut streaks = MockStreakRepository::new();
        streaks
            .expect_reset_streak()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(streak_value(0, 4)) }));

        let service = SessionService::new(repo, StreakService::new(streaks));
        let outcome = service.complete("session-1").await.unwrap();

        let CompleteOutcome::Completed(result) = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(result.score, 60);
        assert_eq!(result.correct_answers, 3);
        assert_eq!(result.total_questions, 5);
        assert!(result.streak_updated);
        assert!(result.time_spent_ms >= 0);

        let unanswered = result.answers.iter().find(|a| a.question_id == 5).unwrap();
        assert!(unanswered.selected_answer.is_none());
        assert!(!unanswered.is_correct);
    }

    #[tokio::test]
    async fn complete_perfect_extends_streak() {
        let repo = repo_for_completion(
            answers(&[(1, "a"), (2, "a"), (3, "a"), (4, "a"), (5, "a")]),
            true,
        );
        let mut streaks = MockStreakRepository::new();
        streaks
            .expect_latest_completion_date()
            .returning(|_, _| Box::pin(async { Ok(Some(quiz_date().pred_opt().unwrap())) }));
        streaks
            .expect_extend_streak()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(streak_value(5, 5)) }));

        let service = SessionService::new(repo, StreakService::new(streaks));
        let outcome = service.complete("session-1").await.unwrap();

        let CompleteOutcome::Completed(result) = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(result.score, 100);
        assert!(result.streak_updated);
    }

    #[tokio::test]
    async fn complete_twice_is_rejected() {
        let mut mock = MockSessionRepository::new();
        mock.expect_session_by_id().returning(|_| {
            let done = session(SessionStatus::Completed, HashMap::new());
            Box::pin(async move { Ok(Some(done)) })
        });

        let service = SessionService::new(mock, no_streaks());
        let outcome = service.complete("session-1").await.unwrap();
        assert!(matches!(outcome, CompleteOutcome::AlreadyCompleted));
    }

    #[tokio::test]
    async fn complete_concurrent_loser_does_not_double_apply() {
        // The status flip fails inside the transaction: no attempts are
        // recorded and the streak must not be touched.
        let repo = repo_for_completion(answers(&[(1, "a")]), false);
        let service = SessionService::new(repo, no_streaks());

        let outcome = service.complete("session-1").await.unwrap();
        assert!(matches!(outcome, CompleteOutcome::AlreadyCompleted));
    }

    #[tokio::test]
    async fn complete_survives_streak_failure() {
        let repo = repo_for_completion(answers(&[(1, "a")]), true);
        let mut streaks = MockStreakRepository::new();
        streaks
            .expect_reset_streak()
            .returning(|_, _| Box::pin(async { Err(color_eyre::eyre::eyre!("db offline")) }));

        let service = SessionService::new(repo, StreakService::new(streaks));
        let outcome = service.complete("session-1").await.unwrap();

        let CompleteOutcome::Completed(result) = outcome else {
            panic!("expected Completed");
        };
        assert!(!result.streak_updated);
        assert_eq!(result.score, 20);
    }
}
