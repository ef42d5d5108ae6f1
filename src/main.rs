//! # Thread Harvester
//!
//! Harvests every page of a paginated XenForo forum thread (technofino.in by
//! default) into a single ordered corpus of messages with normalized
//! timestamps, and optionally summarizes it or answers questions about it
//! through an OpenAI-compatible model.
//!
//! ## Usage
//!
//! ```sh
//! thread_harvester https://www.technofino.in/community/threads/some-thread.12345/page-3 -j ./json -m ./md
//! ```
//!
//! ## Architecture
//!
//! 1. **Validating**: canonicalize the URL to the thread's first page
//! 2. **Fetching**: page 1 alone, then pages 2..N concurrently
//! 3. **Aggregating**: messages in page order, per-page failures kept as data
//! 4. **Output**: JSON result, Markdown rendering, optional summary and answers

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use thread_harvester::api::{
    self, ChatCompletionsGenerator, RetryGenerator, answer_question, summarize,
};
use thread_harvester::cli::Cli;
use thread_harvester::config;
use thread_harvester::harvest::{ProgressUpdate, ThreadHarvester};
use thread_harvester::models::HarvestStatus;
use thread_harvester::outputs::markdown::Answered;
use thread_harvester::outputs::{json, markdown};
use thread_harvester::scrapers::fetch::ReqwestFetcher;
use thread_harvester::utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("thread_harvester starting up");

    let args = Cli::parse();
    debug!(?args.json_output_dir, ?args.markdown_output_dir, "Parsed CLI arguments");

    let config = config::load_config(args.config.as_deref()).await?;

    // Fail on unwritable output dirs before touching the network.
    for dir in [&args.json_output_dir, &args.markdown_output_dir]
        .into_iter()
        .flatten()
    {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable");
            return Err(e);
        }
    }

    if args.wants_generation() && args.api_key.is_none() {
        return Err("--summarize/--question need an API key (--api-key or OPENAI_API_KEY)".into());
    }

    // ---- Harvest ----
    let fetcher = ReqwestFetcher::new(&config)?;
    let harvester = ThreadHarvester::new(fetcher, &config);
    let log_progress = |update: ProgressUpdate| {
        info!(stage = %update.stage, "{}", update.message);
    };
    let result = harvester.harvest(&args.thread_url, &log_progress).await;

    if let Some(failure) = &result.failure {
        error!(stage = %failure.stage, error = %failure.error, "Could not harvest thread");
        return Err(failure.error.clone().into());
    }
    match result.status {
        HarvestStatus::PartialSuccess => warn!(
            failed_pages = result.page_errors.len(),
            "Some pages could not be fetched; corpus is incomplete"
        ),
        HarvestStatus::EmptyThread => warn!("No messages found; the thread may be empty"),
        _ => {}
    }

    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = json::write_result(&result, dir).await {
            error!(error = %e, "Failed to write JSON");
        }
    }

    // ---- Summary and questions ----
    let mut summary = None;
    let mut answers = Vec::new();
    if let Some(api_key) = args.api_key.as_deref().filter(|_| args.wants_generation()) {
        let generator = RetryGenerator::new(
            ChatCompletionsGenerator::new(&config.generator, api_key),
            config.generator.max_retries,
            Duration::from_secs(1),
        );
        let today = Local::now().date_naive();

        if args.summarize {
            match summarize(&generator, &result, &args.keywords(), today).await {
                Ok(text) => {
                    info!(preview = %truncate_for_log(&text, 200), "Summary generated");
                    println!("--- Summary ---\n{text}\n");
                    summary = Some(text);
                }
                Err(e) => error!(error = %e, "Summary failed"),
            }
        }

        for question in &args.questions {
            match answer_question(&generator, &result, question, today).await {
                Ok(answer) => {
                    println!("--- Q: {question} ---\n{answer}\n");
                    answers.push(Answered {
                        question: question.clone(),
                        answer,
                    });
                }
                Err(e) => error!(%question, error = %e, "Question failed"),
            }
        }
    }

    if let Some(dir) = &args.markdown_output_dir {
        if let Err(e) =
            markdown::write_markdown(dir, &result, summary.as_deref(), &answers).await
        {
            error!(error = %e, "Failed to write Markdown");
        }
    }

    if args.json_output_dir.is_none() && args.markdown_output_dir.is_none() && !args.wants_generation() {
        println!("{}", api::format_corpus(&result.messages));
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        messages = result.messages.len(),
        pages = result.total_pages_discovered,
        status = ?result.status,
        "Execution complete"
    );

    Ok(())
}
