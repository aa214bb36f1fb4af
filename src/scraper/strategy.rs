//! Candidate selection strategies, tried in order until one matches something.

use crate::scraper::{parse_selector, ExtractionStrategy, ScraperError};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Chapter-list containers matched by a CSS selector (e.g. `div.comics-chapters`).
/// Each container is expected to hold one chapter anchor.
#[derive(Debug)]
pub struct ContainerStrategy {
    raw: String,
    selector: Selector,
}

impl ContainerStrategy {
    pub fn new(selector: &str) -> Result<Self, ScraperError> {
        Ok(Self {
            raw: selector.to_string(),
            selector: parse_selector(selector)?,
        })
    }
}

impl ExtractionStrategy for ContainerStrategy {
    fn describe(&self) -> String {
        format!("containers matching {}", self.raw)
    }

    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document.select(&self.selector).collect()
    }
}

/// Anchors whose `href` matches a title-specific path pattern.
#[derive(Debug)]
pub struct LinkPatternStrategy {
    pattern: Regex,
    anchors: Selector,
}

impl LinkPatternStrategy {
    pub fn new(pattern: &str) -> Result<Self, ScraperError> {
        let compiled = Regex::new(pattern).map_err(|e| ScraperError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: compiled,
            anchors: parse_selector("a[href]")?,
        })
    }
}

impl ExtractionStrategy for LinkPatternStrategy {
    fn describe(&self) -> String {
        format!("anchors with href matching {}", self.pattern.as_str())
    }

    fn candidates<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        document
            .select(&self.anchors)
            .filter(|a| {
                a.value()
                    .attr("href")
                    .map(|href| self.pattern.is_match(href))
                    .unwrap_or(false)
            })
            .collect()
    }
}
