//! Data model shared by the extractor, the date normalizer and the RSS renderer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a chapter's `pub_date` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// A date element next to the chapter link.
    Page,
    /// No date element was found; `pub_date` holds today's date.
    Fallback,
}

/// One chapter extracted from the source page, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub title: String,
    /// Absolute URL. Never empty.
    pub link: String,
    /// Raw date text from the page, or today's date as `YYYY-MM-DD`.
    pub pub_date: String,
    #[serde(rename = "dateSource")]
    pub date_source: DateSource,
}

/// Channel-level description of one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMetadata {
    pub title: String,
    /// Source page URL, used as the channel link.
    pub link: String,
    pub description: String,
    pub language: String,
    /// Destination file of the rendered feed.
    pub output_path: PathBuf,
    /// Href of the Atom `rel="self"` link.
    pub self_url: String,
}
