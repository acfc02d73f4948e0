//! Utility functions shared by the source adapters and the scoring client.
//!
//! - **Text processing**: HTML stripping, whitespace collapsing, and
//!   marker-aware truncation for article descriptions
//! - **URL handling**: scheme checks and rate-limit origin keys
//!
//! # Examples
//!
//! ```
//! use newsdigest::util::{origin_key, truncate_with_marker};
//!
//! assert_eq!(origin_key("https://www.reddit.com/r/rust/hot.json"), "www.reddit.com");
//! assert_eq!(truncate_with_marker("Long article title", 10), "Long ar...");
//! ```

mod origin;
mod text;

pub use origin::{is_secure_or_loopback, origin_key, parse_source_url, SourceUrlError};
pub use text::{
    collapse_whitespace, normalize_description, strip_control_chars, strip_html_tags,
    truncate_with_marker, MAX_DESCRIPTION_CHARS, TRUNCATION_MARKER,
};
