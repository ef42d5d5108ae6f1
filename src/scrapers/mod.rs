//! Forum thread scraping building blocks.
//!
//! Each submodule covers one step of reading a XenForo thread. All but
//! [`fetch`] are pure functions over their input.
//!
//! | Step | Module | Input → Output |
//! |------|--------|----------------|
//! | Canonicalize | [`thread_url`] | raw URL → first-page URL |
//! | Retrieve | [`fetch`] | page URL → [`extract::ParsedPage`] |
//! | Extract | [`extract`] | parsed page → messages, page count |
//! | Plan | [`pagination`] | page count → URLs of pages 2..N |
//!
//! [`crate::harvest`] strings them together.

pub mod extract;
pub mod fetch;
pub mod pagination;
pub mod thread_url;
