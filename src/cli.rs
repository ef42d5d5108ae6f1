//! Command-line interface definitions for the thread harvester.
//!
//! All options can be given as flags; the API key can also come from the
//! environment.

use clap::Parser;

/// Harvest a forum thread into an ordered message corpus, optionally
/// summarizing it and answering questions about it.
///
/// # Examples
///
/// ```sh
/// # Harvest only, write JSON
/// thread_harvester https://www.technofino.in/community/threads/x.123/page-4 -j ./json
///
/// # Summarize with a keyword focus and ask a question
/// OPENAI_API_KEY=sk-... thread_harvester <url> -m ./md --summarize \
///     --keywords "lounge,fees" --question "Is the card still lifetime free?"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of any page of the thread
    pub thread_url: String,

    /// Output directory for the JSON harvest result
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Output directory for the Markdown rendering
    #[arg(short, long)]
    pub markdown_output_dir: Option<String>,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Summarize the thread with the configured model
    #[arg(short, long)]
    pub summarize: bool,

    /// Comma-separated keywords to focus the summary on
    #[arg(short, long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Question to answer from the thread (repeatable)
    #[arg(short, long = "question")]
    pub questions: Vec<String>,

    /// API key for the summarization endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl Cli {
    /// Keywords with whitespace trimmed and blanks dropped.
    pub fn keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn wants_generation(&self) -> bool {
        self.summarize || !self.questions.is_empty()
    }
}
