use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::db::DailyQuiz;

/// Read-through cache for resolved daily quizzes. Purely a performance
/// optimization: the persisted row stays the source of truth, and entries are
/// safe to drop at any time because a daily quiz never changes once created.
pub trait QuizCache: Send + Sync {
    fn get(&self, date: NaiveDate) -> Option<DailyQuiz>;
    fn put(&self, date: NaiveDate, quiz: DailyQuiz);
}

/// Bounded least-recently-used cache keyed by quiz date.
pub struct LruQuizCache {
    capacity: usize,
    state: Mutex<LruState>,
}

struct LruState {
    entries: HashMap<NaiveDate, DailyQuiz>,
    order: VecDeque<NaiveDate>,
}

impl LruQuizCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }
}

impl QuizCache for LruQuizCache {
    fn get(&self, date: NaiveDate) -> Option<DailyQuiz> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        let quiz = state.entries.get(&date).cloned()?;
        state.order.retain(|d| *d != date);
        state.order.push_back(date);
        Some(quiz)
    }

    fn put(&self, date: NaiveDate, quiz: DailyQuiz) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.entries.insert(date, quiz).is_none() {
            state.order.push_back(date);
        } else {
            state.order.retain(|d| *d != date);
            state.order.push_back(date);
        }
        while state.entries.len() > self.capacity {
            let Some(evicted) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&evicted);
        }
    }
}

/// Cache that remembers nothing. Every resolve hits the store; useful in
/// tests and in deployments that want the database to be the only truth.
pub struct NoopQuizCache;

impl QuizCache for NoopQuizCache {
    fn get(&self, _date: NaiveDate) -> Option<DailyQuiz> {
        None
    }

    fn put(&self, _date: NaiveDate, _quiz: DailyQuiz) {}
}
