//! Civitai API integration: typed response shapes, the HTTP client, and
//! preview asset handling.

pub mod client;
pub mod images;
pub mod types;

pub use client::{CivitaiClient, FetchOutcome, API_BASE, HASH_LOOKUP_LEN};
pub use types::{ModelResponse, VersionImage, VersionResponse};
