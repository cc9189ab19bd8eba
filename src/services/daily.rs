use std::collections::HashSet;

use chrono::NaiveDate;
use color_eyre::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::cache::QuizCache;
use crate::db::{is_unique_violation, DailyQuiz, Db, Question};
use crate::models::Difficulty;
use crate::names;

// ---------------------------------------------------------------------------
// DailyQuizRepository trait (DIP: service defines the abstraction it needs)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait DailyQuizRepository: Send + Sync {
    fn daily_quiz_by_date(
        &self,
        date: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Option<DailyQuiz>>> + Send;

    fn insert_daily_quiz(
        &self,
        date: NaiveDate,
        question_ids: &[i64],
    ) -> impl std::future::Future<Output = Result<DailyQuiz>> + Send;

    fn approved_questions(
        &self,
        difficulty: Difficulty,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Question>>> + Send;
}

impl DailyQuizRepository for Db {
    async fn daily_quiz_by_date(&self, date: NaiveDate) -> Result<Option<DailyQuiz>> {
        Db::daily_quiz_by_date(self, date).await
    }

    async fn insert_daily_quiz(&self, date: NaiveDate, question_ids: &[i64]) -> Result<DailyQuiz> {
        Db::insert_daily_quiz(self, date, question_ids).await
    }

    async fn approved_questions(&self, difficulty: Difficulty, limit: i64) -> Result<Vec<Question>> {
        Db::approved_questions(self, difficulty, limit).await
    }
}

// ---------------------------------------------------------------------------
// DailyQuizService
// ---------------------------------------------------------------------------

pub struct DailyQuizService<R: DailyQuizRepository = Db, C: QuizCache = super::cache::LruQuizCache> {
    repo: R,
    cache: C,
    seed: Option<u64>,
}

impl<R: DailyQuizRepository, C: QuizCache> DailyQuizService<R, C> {
    pub fn new(repo: R, cache: C) -> Self {
        Self {
            repo,
            cache,
            seed: None,
        }
    }

    /// Pin the selection RNG so repeated generations are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Resolve the quiz for a calendar date, creating it on first request.
    /// Concurrent callers converge on one persisted row: the unique
    /// constraint on the date arbitrates, and a losing insert re-reads the
    /// winner instead of failing the caller.
    pub async fn resolve(&self, date: NaiveDate) -> Result<DailyQuiz> {
        if let Some(quiz) = self.cache.get(date) {
            return Ok(quiz);
        }

        for attempt in 1..=names::MAX_CONFLICT_RETRIES {
            if let Some(quiz) = self.repo.daily_quiz_by_date(date).await? {
                self.cache.put(date, quiz.clone());
                return Ok(quiz);
            }

            let question_ids = self.select_question_ids(date).await?;
            match self.repo.insert_daily_quiz(date, &question_ids).await {
                Ok(quiz) => {
                    self.cache.put(date, quiz.clone());
                    return Ok(quiz);
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!(
                        "lost daily quiz creation race for {date} (attempt {attempt}), re-fetching"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // Someone else must have created the row on every attempt.
        match self.repo.daily_quiz_by_date(date).await? {
            Some(quiz) => {
                self.cache.put(date, quiz.clone());
                Ok(quiz)
            }
            None => Err(color_eyre::eyre::eyre!(
                "could not resolve daily quiz for {date} after {} attempts",
                names::MAX_CONFLICT_RETRIES
            )),
        }
    }

    /// Pick the day's questions: fixed difficulty composition, preferring an
    /// unused surah for every slot, shuffled across tiers at the end.
    async fn select_question_ids(&self, date: NaiveDate) -> Result<Vec<i64>> {
        let mut rng = StdRng::seed_from_u64(self.seed.unwrap_or_else(rand::random));
        let mut used_surahs = HashSet::new();
        let mut selected: Vec<Question> = Vec::with_capacity(names::DAILY_QUIZ_SIZE);

        for &(difficulty, count) in names::TIER_COMPOSITION {
            let mut pool = self
                .repo
                .approved_questions(difficulty, (count * names::POOL_OVERSAMPLE) as i64)
                .await?;

            let picked = pick_tier(&mut pool, count, &mut used_surahs, &mut rng);
            if picked.len() < count {
                tracing::warn!(
                    "only {} of {count} {difficulty} questions available for {date}, generating a smaller quiz",
                    picked.len()
                );
            }
            selected.extend(picked);
        }

        // Tier boundaries mean nothing to the user.
        selected.shuffle(&mut rng);
        Ok(selected.into_iter().map(|q| q.id).collect())
    }
}

/// Fill up to `count` slots from `pool`, preferring candidates whose surah
/// has not been used anywhere in the quiz yet. Slots fall back to the
/// remaining pool once every unused-surah candidate is exhausted.
fn pick_tier(
    pool: &mut Vec<Question>,
    count: usize,
    used_surahs: &mut HashSet<i64>,
    rng: &mut StdRng,
) -> Vec<Question> {
    let mut picked = Vec::with_capacity(count);

    for _ in 0..count {
        if pool.is_empty() {
            break;
        }

        let fresh: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, q)| !used_surahs.contains(&q.surah))
            .map(|(i, _)| i)
            .collect();

        let index = if fresh.is_empty() {
            rng.gen_range(0..pool.len())
        } else {
            fresh[rng.gen_range(0..fresh.len())]
        };

        let question = pool.swap_remove(index);
        used_surahs.insert(question.surah);
        picked.push(question);
    }

    picked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::cache::{LruQuizCache, NoopQuizCache};
    use chrono::Utc;

    fn question(id: i64, surah: i64, difficulty: Difficulty) -> Question {
        Question {
            id,
            surah,
            ayah: 1,
            prompt: format!("Question {id}"),
            choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_choice: "a".into(),
            difficulty,
            approved_at: Some(Utc::now()),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn pool(difficulty: Difficulty, base_id: i64, surahs: &[i64]) -> Vec<Question> {
        surahs
            .iter()
            .enumerate()
            .map(|(i, &surah)| question(base_id + i as i64, surah, difficulty))
            .collect()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 8).unwrap()
    }

    fn quiz_from(date: NaiveDate, ids: &[i64]) -> DailyQuiz {
        DailyQuiz {
            id: 1,
            date,
            question_ids: ids.to_vec(),
            created_at: Utc::now(),
        }
    }

    fn mock_with_pools(
        easy: Vec<Question>,
        medium: Vec<Question>,
        hard: Vec<Question>,
    ) -> MockDailyQuizRepository {
        let mut mock = MockDailyQuizRepository::new();
        mock.expect_daily_quiz_by_date()
            .returning(|_| Box::pin(async { Ok(None) }));
        mock.expect_approved_questions()
            .returning(move |difficulty, _| {
                let pool = match difficulty {
                    Difficulty::Easy => easy.clone(),
                    Difficulty::Medium => medium.clone(),
                    Difficulty::Hard => hard.clone(),
                };
                Box::pin(async move { Ok(pool) })
            });
        mock.expect_insert_daily_quiz().returning(|date, ids| {
            let quiz = quiz_from(date, ids);
            Box::pin(async move { Ok(quiz) })
        });
        mock
    }

    #[tokio::test]
    async fn generates_fixed_composition() {
        let mock = mock_with_pools(
            pool(Difficulty::Easy, 100, &[1, 2, 3, 4, 5, 6]),
            pool(Difficulty::Medium, 200, &[11, 12, 13, 14, 15]),
            pool(Difficulty::Hard, 300, &[21, 22, 23]),
        );

        let service = DailyQuizService::new(mock, NoopQuizCache).with_seed(7);
        let quiz = service.resolve(test_date()).await.unwrap();

        assert_eq!(quiz.question_ids.len(), 5);
        let easy = quiz.question_ids.iter().filter(|id| **id < 200).count();
        let medium = quiz
            .question_ids
            .iter()
            .filter(|id| (200..300).contains(*id))
            .count();
        let hard = quiz.question_ids.iter().filter(|id| **id >= 300).count();
        assert_eq!((easy, medium, hard), (2, 2, 1));
    }

    #[tokio::test]
    async fn prefers_distinct_surahs_across_the_whole_quiz() {
        // Every tier draws from the same surah range; a selection that
        // ignored the used set would collide almost surely.
        let surahs = &[1, 2, 3, 4, 5, 6, 7];
        for seed in 0..20 {
            let mock = mock_with_pools(
                pool(Difficulty::Easy, 100, surahs),
                pool(Difficulty::Medium, 200, surahs),
                pool(Difficulty::Hard, 300, surahs),
            );
            let service = DailyQuizService::new(mock, NoopQuizCache).with_seed(seed);
            let quiz = service.resolve(test_date()).await.unwrap();

            let mut seen = HashSet::new();
            for id in &quiz.question_ids {
                // Surah is recoverable from the id layout used by `pool`.
                let surah = surahs[(id % 100) as usize];
                assert!(seen.insert(surah), "duplicate surah with seed {seed}");
            }
        }
    }

    #[tokio::test]
    async fn under_filled_tier_degrades_instead_of_failing() {
        let mock = mock_with_pools(
            pool(Difficulty::Easy, 100, &[1, 2, 3]),
            pool(Difficulty::Medium, 200, &[11, 12]),
            Vec::new(),
        );

        let service = DailyQuizService::new(mock, NoopQuizCache).with_seed(1);
        let quiz = service.resolve(test_date()).await.unwrap();

        assert_eq!(quiz.question_ids.len(), 4, "missing hard tier drops to 4");
    }

    #[tokio::test]
    async fn same_seed_selects_the_same_quiz() {
        let make_service = || {
            let mock = mock_with_pools(
                pool(Difficulty::Easy, 100, &[1, 2, 3, 4, 5, 6]),
                pool(Difficulty::Medium, 200, &[11, 12, 13, 14, 15]),
                pool(Difficulty::Hard, 300, &[21, 22, 23]),
            );
            DailyQuizService::new(mock, NoopQuizCache).with_seed(42)
        };

        let first = make_service().resolve(test_date()).await.unwrap();
        let second = make_service().resolve(test_date()).await.unwrap();
        assert_eq!(first.question_ids, second.question_ids);
    }

    #[tokio::test]
    async fn cached_quiz_skips_the_repository() {
        // No expectations on the mock: any repository call would panic.
        let mock = MockDailyQuizRepository::new();
        let cache = LruQuizCache::new(4);
        cache.put(test_date(), quiz_from(test_date(), &[1, 2, 3, 4, 5]));

        let service = DailyQuizService::new(mock, cache);
        let quiz = service.resolve(test_date()).await.unwrap();
        assert_eq!(quiz.question_ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn persisted_quiz_is_returned_without_regeneration() {
        let mut mock = MockDailyQuizRepository::new();
        mock.expect_daily_quiz_by_date().times(1).returning(|date| {
            let quiz = quiz_from(date, &[9, 8, 7, 6, 5]);
            Box::pin(async move { Ok(Some(quiz)) })
        });

        let service = DailyQuizService::new(mock, NoopQuizCache);
        let quiz = service.resolve(test_date()).await.unwrap();
        assert_eq!(quiz.question_ids, vec![9, 8, 7, 6, 5]);
    }

    #[tokio::test]
    async fn lost_creation_race_refetches_the_winner() {
        let mut sequence = mockall::Sequence::new();
        let mut mock = MockDailyQuizRepository::new();

        mock.expect_daily_quiz_by_date()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Box::pin(async { Ok(None) }));
        mock.expect_approved_questions()
            .returning(|difficulty, _| {
                let pool = pool(difficulty, 100, &[1, 2, 3, 4, 5]);
                Box::pin(async move { Ok(pool) })
            });
        mock.expect_insert_daily_quiz()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| {
                Box::pin(async {
                    Err(color_eyre::eyre::eyre!(
                        "UNIQUE constraint failed: daily_quizzes.quiz_date"
                    ))
                })
            });
        mock.expect_daily_quiz_by_date()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|date| {
                let quiz = quiz_from(date, &[51, 52, 53, 54, 55]);
                Box::pin(async move { Ok(Some(quiz)) })
            });

        let service = DailyQuizService::new(mock, NoopQuizCache).with_seed(3);
        let quiz = service.resolve(test_date()).await.unwrap();
        assert_eq!(quiz.question_ids, vec![51, 52, 53, 54, 55]);
    }

    #[test]
    fn pick_tier_prefers_unused_surahs() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut used = HashSet::from([1, 2]);
        let mut pool = vec![
            question(1, 1, Difficulty::Easy),
            question(2, 2, Difficulty::Easy),
            question(3, 3, Difficulty::Easy),
        ];

        let picked = pick_tier(&mut pool, 1, &mut used, &mut rng);
        assert_eq!(picked[0].surah, 3, "only surah 3 is unused");
    }

    #[test]
    fn pick_tier_falls_back_when_diversity_is_impossible() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut used = HashSet::from([1]);
        let mut pool = vec![
            question(1, 1, Difficulty::Easy),
            question(2, 1, Difficulty::Easy),
        ];

        let picked = pick_tier(&mut pool, 2, &mut used, &mut rng);
        assert_eq!(picked.len(), 2, "falls back to the full pool");
    }
}
