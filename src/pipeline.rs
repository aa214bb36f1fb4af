//! One source, one run: fetch the page, extract chapters, write the feed.
//!
//! Nothing is written unless at least one chapter was extracted, so a failed run leaves the
//! previous feed file as it was.

use crate::config::Source;
use crate::rss::{write_feed, RenderError};
use crate::scraper::{
    ChapterExtractor, ContainerStrategy, Extraction, FeedClient, LinkPatternStrategy,
    ScraperError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Setup(ScraperError),

    #[error(transparent)]
    Fetch(ScraperError),

    #[error("No chapters found at {url} (page layout may have changed)")]
    NoChapters { url: String },

    #[error("{0}")]
    Render(#[from] RenderError),
}

/// Extractor for a source: its container selector first, then its link pattern.
pub fn extractor_for(source: &Source) -> Result<ChapterExtractor, ScraperError> {
    Ok(
        ChapterExtractor::new(&source.origin, &source.date_selector, source.max_chapters)?
            .with_strategy(ContainerStrategy::new(&source.chapter_selector)?)
            .with_strategy(LinkPatternStrategy::new(&source.chapter_link_pattern)?),
    )
}

/// Fetch and extract. Fails when the fetch fails or no chapter could be extracted.
pub fn collect_chapters(source: &Source, client: &FeedClient) -> Result<Extraction, PipelineError> {
    let extractor = extractor_for(source).map_err(PipelineError::Setup)?;

    log::info!("Fetching {} ({})", source.title, source.url);
    let html = client.fetch(&source.url).map_err(PipelineError::Fetch)?;

    let extraction = extractor.extract(&html);
    if extraction.chapters.is_empty() {
        return Err(PipelineError::NoChapters {
            url: source.url.clone(),
        });
    }
    log::info!(
        "Found {} chapter(s){}",
        extraction.chapters.len(),
        if extraction.skipped.is_empty() {
            String::new()
        } else {
            format!(", skipped {}", extraction.skipped.len())
        }
    );
    Ok(extraction)
}

/// Full run: fetch, extract, render and write `source.output_path`.
pub fn run_source(source: &Source, client: &FeedClient) -> Result<Extraction, PipelineError> {
    let extraction = collect_chapters(source, client)?;
    let meta = source.feed_metadata();
    write_feed(&meta, &extraction.chapters)?;
    log::info!("Wrote {}", meta.output_path.display());
    if let Some(latest) = extraction.chapters.first() {
        log::info!("Latest chapter: {}", latest.title);
    }
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::model::DateSource;
    use crate::rss::test_support::parse_feed;
    use crate::scraper::test_server::{serve, serve_stalled};
    use chrono::{DateTime, Duration, Utc};
    use std::path::Path;

    fn source_for(url: &str, output_name: &str) -> Source {
        SourceConfig {
            name: output_name.to_string(),
            url: url.to_string(),
            title: Some("一人之下 - 包子漫画".to_string()),
            chapter_link_pattern: Some("/comic/chapter/yirenzhixia-dongmantang/".to_string()),
            ..SourceConfig::default()
        }
        .resolve(&std::env::temp_dir())
        .unwrap()
    }

    fn chapters_html(dates: &[Option<&str>]) -> String {
        let mut html = String::from("<html><body><div class=\"chapter-list\">");
        for (i, date) in dates.iter().enumerate() {
            html.push_str(&format!(
                r#"<div class="comics-chapters"><a href="/comic/chapter/yirenzhixia-dongmantang/0_{i}.html"><div><span>第{i}话</span></div></a>{}</div>"#,
                date.map(|d| format!(r#"<span class="comic-update">{}</span>"#, d))
                    .unwrap_or_default()
            ));
        }
        html.push_str("</div></body></html>");
        html
    }

    fn cleanup(path: &Path) {
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn three_dated_chapters_produce_three_items() -> Result<(), PipelineError> {
        let body = chapters_html(&[Some("2026年01月30日"); 3]);
        let server = serve(200, &body);
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_scenario_a");
        cleanup(&source.output_path);

        let extraction = run_source(&source, &FeedClient::new().map_err(PipelineError::Setup)?)?;
        assert_eq!(extraction.chapters.len(), 3);

        let xml = std::fs::read_to_string(&source.output_path).unwrap();
        let feed = parse_feed(&xml);
        assert_eq!(feed.items.len(), 3);
        for item in &feed.items {
            assert_eq!(item.pub_date, "Fri, 30 Jan 2026 00:00:00 +0000");
            assert_eq!(item.guid, item.link);
            assert!(item.link.starts_with("http://127.0.0.1:"));
        }
        cleanup(&source.output_path);
        Ok(())
    }

    #[test]
    fn no_chapters_fails_and_keeps_previous_feed() {
        let server = serve(200, "<html><body><p>nothing here</p></body></html>");
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_scenario_b");
        std::fs::write(&source.output_path, "previous feed").unwrap();

        let result = run_source(&source, &FeedClient::new().unwrap());
        assert!(matches!(result, Err(PipelineError::NoChapters { .. })));
        assert_eq!(
            std::fs::read_to_string(&source.output_path).unwrap(),
            "previous feed"
        );
        cleanup(&source.output_path);
    }

    #[test]
    fn fetch_timeout_fails_without_writing() {
        let server = serve_stalled();
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_scenario_c");
        cleanup(&source.output_path);

        let client = FeedClient::builder().timeout_secs(1).build().unwrap();
        let result = run_source(&source, &client);
        assert!(matches!(
            result,
            Err(PipelineError::Fetch(ScraperError::Timeout { .. }))
        ));
        assert!(!source.output_path.exists());
    }

    #[test]
    fn http_error_status_is_fetch_failure() {
        let server = serve(503, "down");
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_http_error");
        cleanup(&source.output_path);
        let result = run_source(&source, &FeedClient::new().unwrap());
        assert!(matches!(
            result,
            Err(PipelineError::Fetch(ScraperError::HttpStatus { status: 503, .. }))
        ));
        assert!(!source.output_path.exists());
    }

    #[test]
    fn undated_chapter_uses_today_and_current_time() -> Result<(), PipelineError> {
        let body = chapters_html(&[Some("2026年01月30日"), None]);
        let server = serve(200, &body);
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_scenario_d");
        cleanup(&source.output_path);

        let before: DateTime<Utc> = Utc::now() - Duration::seconds(1);
        let extraction = run_source(&source, &FeedClient::new().map_err(PipelineError::Setup)?)?;
        let after: DateTime<Utc> = Utc::now() + Duration::seconds(1);

        let undated = &extraction.chapters[1];
        assert_eq!(undated.date_source, DateSource::Fallback);
        assert_eq!(
            undated.pub_date,
            chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
        );

        let feed = parse_feed(&std::fs::read_to_string(&source.output_path).unwrap());
        assert_eq!(feed.items[0].pub_date, "Fri, 30 Jan 2026 00:00:00 +0000");
        let rendered = DateTime::parse_from_rfc2822(&feed.items[1].pub_date)
            .unwrap()
            .with_timezone(&Utc);
        assert!(rendered >= before && rendered <= after, "{}", rendered);
        cleanup(&source.output_path);
        Ok(())
    }

    #[test]
    fn control_characters_in_titles_do_not_reach_the_feed() -> Result<(), PipelineError> {
        let body = r#"<html><body><div class="comics-chapters"><a href="/comic/chapter/yirenzhixia-dongmantang/0_1.html">第1&#1;话</a><span class="comic-update">2026年01月30日</span></div></body></html>"#;
        let server = serve(200, body);
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_control_chars");
        cleanup(&source.output_path);

        run_source(&source, &FeedClient::new().map_err(PipelineError::Setup)?)?;
        let xml = std::fs::read_to_string(&source.output_path).unwrap();
        assert!(!xml.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')));
        let feed = parse_feed(&xml);
        assert_eq!(feed.items[0].title, "第1话");
        cleanup(&source.output_path);
        Ok(())
    }

    #[test]
    fn fetch_error_keeps_transport_cause() {
        use std::error::Error as _;

        let server = serve_stalled();
        let url = server.url();
        let source = source_for(&url, "mangarss_pipeline_source_chain");
        let client = FeedClient::builder().timeout_secs(1).build().unwrap();
        let err = collect_chapters(&source, &client).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(ScraperError::Timeout { .. })));
        let cause = err.source().expect("timeout carries the reqwest error");
        assert!(cause.downcast_ref::<reqwest::Error>().is_some());
    }

    #[test]
    fn invalid_selector_fails_before_fetch() {
        let mut source = source_for("http://127.0.0.1:9/comic/x", "mangarss_pipeline_setup");
        source.chapter_selector = "div[[".to_string();
        let result = collect_chapters(&source, &FeedClient::new().unwrap());
        assert!(matches!(
            result,
            Err(PipelineError::Setup(ScraperError::InvalidSelector { .. }))
        ));
    }

    #[test]
    fn extractor_for_uses_source_cap() {
        let mut source = source_for("https://www.baozimh.com/comic/x", "cap");
        source.max_chapters = 2;
        let html = chapters_html(&[None, None, None, None]);
        let out = extractor_for(&source).unwrap().extract(&html);
        assert_eq!(out.chapters.len(), 2);
        assert_eq!(
            out.chapters[0].link,
            "https://www.baozimh.com/comic/chapter/yirenzhixia-dongmantang/0_0.html"
        );
    }
}
