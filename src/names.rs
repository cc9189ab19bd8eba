use crate::models::Difficulty;

// Daily quiz composition: 2 easy + 2 medium + 1 hard. Fixed policy, not
// user-configurable.
pub const TIER_COMPOSITION: &[(Difficulty, usize)] = &[
    (Difficulty::Easy, 2),
    (Difficulty::Medium, 2),
    (Difficulty::Hard, 1),
];
pub const DAILY_QUIZ_SIZE: usize = 5;

/// Candidate pools are fetched at this multiple of the required count so the
/// surah-diversity filter has room to choose.
pub const POOL_OVERSAMPLE: usize = 5;

/// Bounded retries when an insert loses a unique-constraint race and the
/// winner's row must be re-read.
pub const MAX_CONFLICT_RETRIES: usize = 3;

pub const QUIZ_CACHE_CAPACITY: usize = 32;

// Batch generation defaults
pub const COVERAGE_TARGET: i64 = 2;
pub const GENERATION_SCAN_LIMIT: i64 = 50;
pub const GENERATION_SUB_BATCH: usize = 5;
pub const GENERATION_BATCH_DELAY_MS: u64 = 1_500;
pub const GENERATED_BY: &str = "batch-generator";

pub const DEFAULT_TIMEZONE: &str = "UTC";
