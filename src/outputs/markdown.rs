//! Markdown rendering of a harvested thread.
//!
//! The document opens with the harvest status, then the summary and any
//! question/answer pairs when they were generated, and ends with every message
//! in thread order.

use crate::models::{HarvestResult, HarvestStatus};
use crate::utils::thread_slug;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

/// A question asked about the thread and the model's answer.
#[derive(Debug, Clone)]
pub struct Answered {
    pub question: String,
    pub answer: String,
}

fn status_label(status: HarvestStatus) -> &'static str {
    match status {
        HarvestStatus::Success => "complete",
        HarvestStatus::PartialSuccess => "partial (some pages failed)",
        HarvestStatus::EmptyThread => "empty thread",
        HarvestStatus::Failed => "failed",
    }
}

pub fn thread_to_markdown(
    result: &HarvestResult,
    summary: Option<&str>,
    answers: &[Answered],
) -> String {
    let mut md = format!("# Thread: <{}>\n\n", result.thread_url);
    md.push_str(&format!(
        "- **Status:** {}\n- **Pages:** {}\n- **Messages:** {}\n",
        status_label(result.status),
        result.total_pages_discovered,
        result.messages.len()
    ));
    for err in &result.page_errors {
        md.push_str(&format!("- **Page {} failed:** {}\n", err.page_number, err.status));
    }
    md.push('\n');

    if let Some(summary) = summary {
        md.push_str("## Summary\n\n");
        md.push_str(summary.trim());
        md.push_str("\n\n");
    }

    if !answers.is_empty() {
        md.push_str("## Questions\n\n");
        for qa in answers {
            md.push_str(&format!("### {}\n\n{}\n\n", qa.question.trim(), qa.answer.trim()));
        }
    }

    if !result.messages.is_empty() {
        md.push_str("## Messages\n\n");
        for (i, message) in result.messages.iter().enumerate() {
            md.push_str(&format!(
                "### {}. {} ({})\n\n",
                i + 1,
                message.author,
                message.posted_at
            ));
            for line in message.body.lines() {
                md.push_str("> ");
                md.push_str(line);
                md.push('\n');
            }
            md.push('\n');
        }
    }

    md
}

/// Write the rendered thread to `{markdown_output_dir}/{thread-slug}.md`.
#[instrument(level = "info", skip_all, fields(%markdown_output_dir))]
pub async fn write_markdown(
    markdown_output_dir: &str,
    result: &HarvestResult,
    summary: Option<&str>,
    answers: &[Answered],
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(markdown_output_dir).await?;
    let path = PathBuf::from(markdown_output_dir)
        .join(format!("{}.md", thread_slug(&result.thread_url)));
    fs::write(&path, thread_to_markdown(result, summary, answers)).await?;
    info!(path = %path.display(), "Wrote thread Markdown");
    Ok(path)
}
