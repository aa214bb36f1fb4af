//! Page fetching and chapter extraction.
//!
//! Extraction runs an ordered list of [ExtractionStrategy] values; the first one that yields
//! any candidates wins. Each candidate is then turned into a [ChapterRecord] on a best-effort
//! basis: a malformed candidate is skipped and reported in [Extraction::skipped].

mod client;
mod error;

pub mod strategy;

pub use client::{FeedClient, FeedClientBuilder, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
pub use error::ScraperError;
pub use strategy::{ContainerStrategy, LinkPatternStrategy};

#[cfg(test)]
pub(crate) use client::test_server;

use crate::model::{ChapterRecord, DateSource};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::fmt;

pub const DEFAULT_MAX_CHAPTERS: usize = 20;

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// One way of locating chapter candidates in a parsed page.
///
/// A candidate is either a chapter anchor itself or an element containing one.
pub trait ExtractionStrategy {
    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>>;
}

/// Why a candidate produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoAnchor,
    EmptyHref,
    EmptyTitle,
    UnresolvableLink { href: String, reason: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoAnchor => write!(f, "no chapter link found"),
            SkipReason::EmptyHref => write!(f, "chapter link has no href"),
            SkipReason::EmptyTitle => write!(f, "chapter link has no text"),
            SkipReason::UnresolvableLink { href, reason } => {
                write!(f, "cannot resolve link {:?}: {}", href, reason)
            }
        }
    }
}

/// A candidate that was dropped, with its 0-based position among the capped candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCandidate {
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of one extraction pass.
#[derive(Debug, Default)]
pub struct Extraction {
    pub chapters: Vec<ChapterRecord>,
    pub skipped: Vec<SkippedCandidate>,
    /// Description of the strategy that matched, if any did.
    pub strategy: Option<String>,
}

/// Turns page markup into chapter records.
pub struct ChapterExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    anchor: Selector,
    date: Selector,
    origin: Url,
    max_chapters: usize,
}

impl ChapterExtractor {
    /// Extractor with no strategies yet. `origin` resolves relative links; `date_selector`
    /// locates the date element near each chapter link.
    pub fn new(origin: &str, date_selector: &str, max_chapters: usize) -> Result<Self, ScraperError> {
        let origin = Url::parse(origin).map_err(|e| ScraperError::InvalidUrl {
            input: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            strategies: Vec::new(),
            anchor: parse_selector("a")?,
            date: parse_selector(date_selector)?,
            origin,
            max_chapters,
        })
    }

    /// Append a strategy; strategies are tried in the order they were added.
    pub fn with_strategy(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();

        let mut candidates = Vec::new();
        for strategy in &self.strategies {
            candidates = strategy.candidates(&document);
            if !candidates.is_empty() {
                let description = strategy.describe();
                log::debug!("{} candidate(s) from {}", candidates.len(), description);
                extraction.strategy = Some(description);
                break;
            }
            log::debug!("no candidates from {}", strategy.describe());
        }

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        for (index, candidate) in candidates.into_iter().take(self.max_chapters).enumerate() {
            match self.record_from(candidate, &today) {
                Ok(record) => extraction.chapters.push(record),
                Err(reason) => {
                    log::warn!("Skipping chapter candidate {}: {}", index + 1, reason);
                    extraction.skipped.push(SkippedCandidate { index, reason });
                }
            }
        }
        extraction
    }

    fn record_from(&self, candidate: ElementRef<'_>, today: &str) -> Result<ChapterRecord, SkipReason> {
        let anchor = if candidate.value().name() == "a" {
            candidate
        } else {
            candidate
                .select(&self.anchor)
                .next()
                .ok_or(SkipReason::NoAnchor)?
        };

        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty() {
            return Err(SkipReason::EmptyHref);
        }
        let link = self.resolve_link(href)?;

        let title = stripped_text(anchor);
        if title.is_empty() {
            return Err(SkipReason::EmptyTitle);
        }

        let date_text = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.select(&self.date).next())
            .map(stripped_text)
            .filter(|s| !s.is_empty());
        let (pub_date, date_source) = match date_text {
            Some(d) => (d, DateSource::Page),
            None => (today.to_string(), DateSource::Fallback),
        };

        Ok(ChapterRecord {
            title,
            link,
            pub_date,
            date_source,
        })
    }

    /// Absolute http(s) hrefs are kept; anything without a scheme is joined onto the origin.
    fn resolve_link(&self, href: &str) -> Result<String, SkipReason> {
        let unresolvable = |reason: String| SkipReason::UnresolvableLink {
            href: href.to_string(),
            reason,
        };
        match Url::parse(href) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(href.to_string()),
            Ok(url) => Err(unresolvable(format!("unsupported scheme {}", url.scheme()))),
            Err(_) => self
                .origin
                .join(href)
                .map(|u| u.to_string())
                .map_err(|e| unresolvable(e.to_string())),
        }
    }
}

/// Text of an element with each text node trimmed and empty nodes dropped.
fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
