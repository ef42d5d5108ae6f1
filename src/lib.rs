//! Paginated forum thread harvesting.
//!
//! [`harvest::ThreadHarvester`] turns the URL of any page of a XenForo thread
//! into a [`models::HarvestResult`]: every message of every page, in page
//! order, with timestamps normalized to ISO-8601 UTC where possible. Pages
//! that fail are recorded on the result instead of aborting the run.
//!
//! ```ignore
//! let config = HarvestConfig::default();
//! let harvester = ThreadHarvester::new(ReqwestFetcher::new(&config)?, &config);
//! let result = harvester.harvest(url, &NoProgress).await;
//! println!("{}", api::format_corpus(&result.messages));
//! ```
//!
//! The [`api`] module feeds a result to an OpenAI-compatible model for
//! summaries and question answering.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod harvest;
pub mod models;
pub mod outputs;
pub mod scrapers;
pub mod utils;
