//! Output generation for harvested threads.
//!
//! # Submodules
//!
//! - [`json`]: writes the full [`crate::models::HarvestResult`] for programmatic use
//! - [`markdown`]: renders the corpus (plus any summary and answers) for reading
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── hdfc-infinia-12345.json
//!
//! markdown_output_dir/
//! └── hdfc-infinia-12345.md
//! ```

pub mod json;
pub mod markdown;
