use serde::{Deserialize, Serialize};

/// Question difficulty tier. Stored in the database as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }
}

/// A verse of the Quran, the unit question coverage is measured against.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verse {
    pub surah: i64,
    pub ayah: i64,
    pub text: String,
}

/// A candidate question produced by the content-generation provider. Staged
/// into the moderation queue with a null approval timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub surah: i64,
    pub ayah: i64,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_choice: String,
    pub difficulty: Difficulty,
}

/// One question's outcome inside a completed session, written append-only.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub question_id: i64,
    pub selected_choice: Option<String>,
    pub is_correct: bool,
}

/// Summary returned to the caller when a session completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub session_id: String,
    /// 0-100, rounded to the nearest integer.
    pub score: i64,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub time_spent_ms: i64,
    pub answers: Vec<AnswerReview>,
    pub streak_updated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReview {
    pub question_id: i64,
    pub selected_answer: Option<String>,
    pub is_correct: bool,
    /// Per-question timing is not tracked; always zero at this layer.
    pub time_spent_ms: i64,
}
