// Database entity structs and their raw row forms.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::WrapErr, Result};
use serde::Deserialize;

use crate::models::{Difficulty, SessionStatus};

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .wrap_err_with(|| format!("malformed timestamp in database: {raw:?}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .wrap_err_with(|| format!("malformed quiz date in database: {raw:?}"))
}

#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub surah: i64,
    pub ayah: i64,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_choice: String,
    pub difficulty: Difficulty,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct QuestionRow {
    pub id: i64,
    pub surah: i64,
    pub ayah: i64,
    pub prompt: String,
    pub choices: String,
    pub correct_choice: String,
    pub difficulty: String,
    pub approved_at: Option<String>,
    pub created_at: String,
    pub created_by: Option<String>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = color_eyre::Report;

    fn try_from(row: QuestionRow) -> Result<Self> {
        let choices: Vec<String> = serde_json::from_str(&row.choices)
            .wrap_err_with(|| format!("malformed choices for question {}", row.id))?;
        let difficulty = Difficulty::parse(&row.difficulty).ok_or_else(|| {
            color_eyre::eyre::eyre!("unknown difficulty {:?} for question {}", row.difficulty, row.id)
        })?;
        Ok(Question {
            id: row.id,
            surah: row.surah,
            ayah: row.ayah,
            prompt: row.prompt,
            choices,
            correct_choice: row.correct_choice,
            difficulty,
            approved_at: row.approved_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            created_by: row.created_by,
        })
    }
}

/// The fixed question set for one calendar date. Immutable once created.
#[derive(Debug, Clone)]
pub struct DailyQuiz {
    pub id: i64,
    pub date: NaiveDate,
    pub question_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub(crate) struct DailyQuizRow {
    pub id: i64,
    pub quiz_date: String,
    pub created_at: String,
}

impl DailyQuizRow {
    pub(crate) fn into_quiz(self, question_ids: Vec<i64>) -> Result<DailyQuiz> {
        Ok(DailyQuiz {
            id: self.id,
            date: parse_date(&self.quiz_date)?,
            question_ids,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// One user's attempt at a daily quiz, including the answer map.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub id: String,
    pub user_id: String,
    pub daily_quiz_id: i64,
    pub current_index: i64,
    pub answers: HashMap<i64, String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub timezone: String,
}

#[derive(Deserialize)]
pub(crate) struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub daily_quiz_id: i64,
    pub current_index: i64,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub last_activity_at: String,
    pub timezone: String,
}

impl SessionRow {
    pub(crate) fn into_session(self, answers: HashMap<i64, String>) -> Result<QuizSession> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            color_eyre::eyre::eyre!("unknown session status {:?} for {}", self.status, self.id)
        })?;
        Ok(QuizSession {
            id: self.id,
            user_id: self.user_id,
            daily_quiz_id: self.daily_quiz_id,
            current_index: self.current_index,
            answers,
            status,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            last_activity_at: parse_timestamp(&self.last_activity_at)?,
            timezone: self.timezone,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub user_id: String,
    pub session_id: String,
    pub question_id: i64,
    pub selected_choice: Option<String>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub(crate) struct AttemptRow {
    pub user_id: String,
    pub session_id: String,
    pub question_id: i64,
    pub selected_choice: Option<String>,
    // SQLite stores booleans as integers.
    pub is_correct: i64,
    pub answered_at: String,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = color_eyre::Report;

    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(Attempt {
            user_id: row.user_id,
            session_id: row.session_id,
            question_id: row.question_id,
            selected_choice: row.selected_choice,
            is_correct: row.is_correct != 0,
            answered_at: parse_timestamp(&row.answered_at)?,
        })
    }
}

/// Per-user consecutive-day perfect-completion counter.
#[derive(Debug, Clone)]
pub struct Streak {
    pub user_id: String,
    pub current: i64,
    pub longest: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub(crate) struct StreakRow {
    pub user_id: String,
    pub current: i64,
    pub longest: i64,
    pub updated_at: String,
}

impl TryFrom<StreakRow> for Streak {
    type Error = color_eyre::Report;

    fn try_from(row: StreakRow) -> Result<Self> {
        Ok(Streak {
            user_id: row.user_id,
            current: row.current,
            longest: row.longest,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// A verse together with how many approved questions currently cover it.
#[derive(Debug, Clone, Deserialize)]
pub struct VerseCoverage {
    pub surah: i64,
    pub ayah: i64,
    pub approved_count: i64,
}

/// Aggregate statistics for one batch generation run.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub verses_scanned: i64,
    pub questions_staged: i64,
    pub batches: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub success: bool,
}

#[derive(Deserialize)]
pub(crate) struct GenerationRunRow {
    pub started_at: String,
    pub finished_at: String,
    pub verses_scanned: i64,
    pub questions_staged: i64,
    pub batches: i64,
    pub error_count: i64,
    pub last_error: Option<String>,
    // SQLite stores booleans as integers.
    pub success: i64,
}

impl TryFrom<GenerationRunRow> for GenerationRun {
    type Error = color_eyre::Report;

    fn try_from(row: GenerationRunRow) -> Result<Self> {
        Ok(GenerationRun {
            started_at: parse_timestamp(&row.started_at)?,
            finished_at: parse_timestamp(&row.finished_at)?,
            verses_scanned: row.verses_scanned,
            questions_staged: row.questions_staged,
            batches: row.batches,
            error_count: row.error_count,
            last_error: row.last_error,
            success: row.success != 0,
        })
    }
}
