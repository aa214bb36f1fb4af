//! mangarss: scrape manga aggregator chapter lists and publish them as RSS 2.0 feeds.

pub mod cli;
pub mod config;
pub mod date;
pub mod driver;
pub mod model;
pub mod pipeline;
pub mod rss;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use config::{load_config, Config, ConfigError, Source, SourceConfig};
pub use model::{ChapterRecord, DateSource, FeedMetadata};
pub use pipeline::{collect_chapters, run_source, PipelineError};
pub use rss::{render_feed, write_feed, RenderError};
pub use scraper::{
    ChapterExtractor, ContainerStrategy, Extraction, ExtractionStrategy, FeedClient,
    FeedClientBuilder, LinkPatternStrategy, ScraperError, SkipReason, SkippedCandidate,
};
