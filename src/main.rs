use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use murajaah::db::Db;
use murajaah::models::Verse;
use murajaah::names;
use murajaah::services::cache::LruQuizCache;
use murajaah::services::daily::DailyQuizService;
use murajaah::services::generation::{GenerationService, HttpQuestionProvider};
use murajaah::services::streak::StreakService;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// libSQL server address
    #[arg(long, env)]
    url: String,

    /// libSQL authentication token.
    #[arg(long, env, default_value = "")]
    auth_token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve (or lazily create) the daily quiz for a date.
    ResolveDaily {
        /// Quiz date; defaults to today (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run one batch generation pass against the content provider.
    GenerateBatch {
        /// Content-generation endpoint URL.
        #[arg(long, env = "GENERATION_ENDPOINT")]
        endpoint: String,

        /// Bearer token for the generation endpoint.
        #[arg(long, env = "GENERATION_API_KEY", default_value = "")]
        api_key: String,

        /// Verses with fewer approved questions than this get new content.
        #[arg(long, default_value_t = names::COVERAGE_TARGET)]
        coverage_target: i64,

        /// Maximum number of verses to process in one run.
        #[arg(long, default_value_t = names::GENERATION_SCAN_LIMIT)]
        scan_limit: i64,
    },
    /// Load verses from a JSON file into the canonical verse list.
    SeedVerses {
        #[arg(long)]
        file: std::path::PathBuf,
    },
    /// Show a user's current and longest streak.
    Streak { user_id: String },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tracing=info,murajaah=debug".to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let db = Db::new(args.url, args.auth_token).await?;

    match args.command {
        Command::ResolveDaily { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let service =
                DailyQuizService::new(db.clone(), LruQuizCache::new(names::QUIZ_CACHE_CAPACITY));
            let quiz = service.resolve(date).await?;

            println!("daily quiz {} for {}", quiz.id, quiz.date);
            for (position, question_id) in quiz.question_ids.iter().enumerate() {
                match db.question_by_id(*question_id).await? {
                    Some(q) => println!(
                        "  {}. [{}] {}:{} - {}",
                        position + 1,
                        q.difficulty,
                        q.surah,
                        q.ayah,
                        q.prompt
                    ),
                    None => println!("  {}. question {question_id} (missing)", position + 1),
                }
            }
        }
        Command::GenerateBatch {
            endpoint,
            api_key,
            coverage_target,
            scan_limit,
        } => {
            let provider = HttpQuestionProvider::new(endpoint, api_key);
            let service = GenerationService::new(db, provider)
                .with_coverage_target(coverage_target)
                .with_scan_limit(scan_limit);

            let run = service.run().await?;
            println!(
                "generation run finished: scanned={} staged={} batches={} errors={} success={}",
                run.verses_scanned, run.questions_staged, run.batches, run.error_count, run.success
            );
            if let Some(error) = run.last_error {
                println!("last error: {error}");
            }
        }
        Command::SeedVerses { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let verses: Vec<Verse> = serde_json::from_str(&raw)?;
            let inserted = db.insert_verses(&verses).await?;
            println!("{inserted} verses inserted from {}", file.display());
        }
        Command::Streak { user_id } => {
            let service = StreakService::new(db);
            match service.current(&user_id).await? {
                Some(streak) => println!(
                    "streak for {user_id}: current={} longest={}",
                    streak.current, streak.longest
                ),
                None => println!("no completions recorded for {user_id}"),
            }
        }
    }

    Ok(())
}
