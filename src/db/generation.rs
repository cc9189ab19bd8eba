use color_eyre::{eyre::OptionExt, Result};
use libsql::params;

use super::helpers::query_all;
use super::models::{GenerationRun, GenerationRunRow, VerseCoverage};
use super::Db;
use crate::models::Verse;

impl Db {
    /// Load verses into the canonical list. Already-known (surah, ayah) pairs
    /// are skipped. Returns the number of newly inserted rows.
    pub async fn insert_verses(&self, verses: &[Verse]) -> Result<u64> {
        let conn = self.connect().await?;

        let mut inserted = 0u64;
        for verse in verses {
            inserted += conn
                .execute(
                    "INSERT OR IGNORE INTO verses (surah, ayah, text) VALUES (?, ?, ?)",
                    params![verse.surah, verse.ayah, verse.text.clone()],
                )
                .await?;
        }

        tracing::info!("{inserted} verses loaded ({} supplied)", verses.len());
        Ok(inserted)
    }

    /// Verses with fewer than `target` approved questions, least covered
    /// first. This is what the batch generator works through.
    pub async fn under_covered_verses(
        &self,
        target: i64,
        limit: i64,
    ) -> Result<Vec<VerseCoverage>> {
        let conn = self.connect().await?;
        query_all(
            &conn,
            r#"
            SELECT v.surah AS surah, v.ayah AS ayah, COUNT(q.id) AS approved_count
            FROM verses v
            LEFT JOIN questions q
                ON q.surah = v.surah AND q.ayah = v.ayah AND q.approved_at IS NOT NULL
            GROUP BY v.surah, v.ayah
            HAVING COUNT(q.id) < ?
            ORDER BY approved_count ASC, v.surah ASC, v.ayah ASC
            LIMIT ?
            "#,
            params![target, limit],
        )
        .await
    }

    pub async fn record_generation_run(&self, run: &GenerationRun) -> Result<i64> {
        let conn = self.connect().await?;
        let run_id = conn
            .query(
                r#"
                INSERT INTO generation_runs (started_at, finished_at, verses_scanned, questions_staged, batches, error_count, last_error, success)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
                params![
                    run.started_at.to_rfc3339(),
                    run.finished_at.to_rfc3339(),
                    run.verses_scanned,
                    run.questions_staged,
                    run.batches,
                    run.error_count,
                    run.last_error.clone(),
                    i64::from(run.success)
                ],
            )
            .await?
            .next()
            .await?
            .ok_or_eyre("could not get generation run id")?
            .get::<i64>(0)?;

        tracing::info!(
            "generation run {run_id} recorded: staged={} errors={}",
            run.questions_staged,
            run.error_count
        );
        Ok(run_id)
    }

    pub async fn generation_runs(&self, limit: i64) -> Result<Vec<GenerationRun>> {
        let conn = self.connect().await?;
        let rows: Vec<GenerationRunRow> = query_all(
            &conn,
            r#"
            SELECT started_at, finished_at, verses_scanned, questions_staged, batches, error_count, last_error, success
            FROM generation_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
            params![limit],
        )
        .await?;

        rows.into_iter().map(GenerationRun::try_from).collect()
    }
}
