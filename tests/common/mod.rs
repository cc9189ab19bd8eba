use std::sync::atomic::{AtomicU32, Ordering};

use murajaah::db::Db;
use murajaah::models::{Difficulty, GeneratedQuestion};

pub async fn create_test_db() -> Db {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path =
        std::env::temp_dir().join(format!("murajaah_test_{}_{}.db", std::process::id(), id));
    // Clean up leftover file from previous runs
    let _ = std::fs::remove_file(&path);
    let url = format!("file:{}", path.display());
    Db::new(url, String::new())
        .await
        .expect("failed to create test database")
}

/// Stage one question through the moderation queue and approve it, returning
/// its id. The correct choice is always "alpha".
pub async fn seed_approved_question(db: &Db, surah: i64, ayah: i64, difficulty: Difficulty) -> i64 {
    static PROMPT_COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = PROMPT_COUNTER.fetch_add(1, Ordering::SeqCst);
    let prompt = format!("Q{n}: which word completes {surah}:{ayah}?");

    let item = GeneratedQuestion {
        surah,
        ayah,
        prompt: prompt.clone(),
        choices: vec![
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string(),
            "delta".to_string(),
        ],
        correct_choice: "alpha".to_string(),
        difficulty,
    };
    db.stage_generated_questions(&[item], "test-seed")
        .await
        .expect("failed to stage question");

    let pending = db
        .pending_questions(10_000)
        .await
        .expect("failed to list pending questions");
    let question = pending
        .iter()
        .find(|q| q.prompt == prompt)
        .expect("staged question not found in moderation queue");

    assert!(db.approve_question(question.id).await.unwrap());
    question.id
}
