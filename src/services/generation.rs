use std::time::Duration;

use chrono::Utc;
use color_eyre::Result;
use serde::Serialize;

use crate::db::{Db, GenerationRun, VerseCoverage};
use crate::models::GeneratedQuestion;
use crate::names;

// ---------------------------------------------------------------------------
// GenerationRepository trait (DIP: service defines the abstraction it needs)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait GenerationRepository: Send + Sync {
    fn under_covered_verses(
        &self,
        target: i64,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<VerseCoverage>>> + Send;

    fn stage_generated(
        &self,
        items: &[GeneratedQuestion],
        created_by: &str,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;

    fn record_run(
        &self,
        run: &GenerationRun,
    ) -> impl std::future::Future<Output = Result<i64>> + Send;
}

impl GenerationRepository for Db {
    async fn under_covered_verses(&self, target: i64, limit: i64) -> Result<Vec<VerseCoverage>> {
        Db::under_covered_verses(self, target, limit).await
    }

    async fn stage_generated(&self, items: &[GeneratedQuestion], created_by: &str) -> Result<u64> {
        Db::stage_generated_questions(self, items, created_by).await
    }

    async fn record_run(&self, run: &GenerationRun) -> Result<i64> {
        Db::record_generation_run(self, run).await
    }
}

// ---------------------------------------------------------------------------
// QuestionProvider trait (opaque content-generation integration)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait QuestionProvider: Send + Sync {
    fn generate(
        &self,
        surah: i64,
        ayah: i64,
        count: i64,
    ) -> impl std::future::Future<Output = Result<Vec<GeneratedQuestion>>> + Send;
}

#[derive(Serialize)]
struct GenerateRequest {
    surah: i64,
    ayah: i64,
    count: i64,
}

/// Provider backed by an HTTP generation endpoint. The endpoint receives a
/// verse reference and a count, and answers with candidate questions.
pub struct HttpQuestionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpQuestionProvider {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

impl QuestionProvider for HttpQuestionProvider {
    async fn generate(&self, surah: i64, ayah: i64, count: i64) -> Result<Vec<GeneratedQuestion>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest { surah, ayah, count })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("generation provider error: {status} - {text}");
            color_eyre::eyre::bail!("generation provider returned {status}");
        }

        let questions: Vec<GeneratedQuestion> = resp.json().await?;
        tracing::info!("provider returned {} questions for {surah}:{ayah}", questions.len());
        Ok(questions)
    }
}

// ---------------------------------------------------------------------------
// GenerationService
// ---------------------------------------------------------------------------

pub struct GenerationService<R: GenerationRepository = Db, P: QuestionProvider = HttpQuestionProvider>
{
    repo: R,
    provider: P,
    coverage_target: i64,
    scan_limit: i64,
    batch_delay: Duration,
}

impl<R: GenerationRepository, P: QuestionProvider> GenerationService<R, P> {
    pub fn new(repo: R, provider: P) -> Self {
        Self {
            repo,
            provider,
            coverage_target: names::COVERAGE_TARGET,
            scan_limit: names::GENERATION_SCAN_LIMIT,
            batch_delay: Duration::from_millis(names::GENERATION_BATCH_DELAY_MS),
        }
    }

    pub fn with_coverage_target(mut self, target: i64) -> Self {
        self.coverage_target = target;
        self
    }

    pub fn with_scan_limit(mut self, limit: i64) -> Self {
        self.scan_limit = limit;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// One scheduler pass: find under-covered verses, ask the provider to
    /// fill the gaps in rate-limited sub-batches, stage everything for
    /// moderation, and record run statistics. A failing sub-batch is tallied
    /// and the run moves on; it never aborts the whole pass.
    pub async fn run(&self) -> Result<GenerationRun> {
        let started_at = Utc::now();
        let verses = self
            .repo
            .under_covered_verses(self.coverage_target, self.scan_limit)
            .await?;
        tracing::info!(
            "generation run: {} verses below coverage target {}",
            verses.len(),
            self.coverage_target
        );

        let mut staged = 0i64;
        let mut batches = 0i64;
        let mut error_count = 0i64;
        let mut last_error = None;

        for chunk in verses.chunks(names::GENERATION_SUB_BATCH) {
            if batches > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }
            batches += 1;

            for verse in chunk {
                let missing = (self.coverage_target - verse.approved_count).max(0);
                if missing == 0 {
                    continue;
                }

                match self
                    .provider
                    .generate(verse.surah, verse.ayah, missing)
                    .await
                {
                    Ok(items) => {
                        let count = self
                            .repo
                            .stage_generated(&items, names::GENERATED_BY)
                            .await?;
                        staged += count as i64;
                    }
                    Err(e) => {
                        error_count += 1;
                        tracing::error!(
                            "generation failed for {}:{}: {e}",
                            verse.surah,
                            verse.ayah
                        );
                        last_error = Some(e.to_string());
                    }
                }
            }
        }

        let run = GenerationRun {
            started_at,
            finished_at: Utc::now(),
            verses_scanned: verses.len() as i64,
            questions_staged: staged,
            batches,
            error_count,
            last_error,
            success: error_count == 0,
        };
        self.repo.record_run(&run).await?;

        Ok(run)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
