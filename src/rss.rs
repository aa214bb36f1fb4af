//! RSS 2.0 writer. Consumes [FeedMetadata] plus chapter records and writes one feed file.

use crate::date::{format_timestamp, record_pub_date};
use crate::model::{ChapterRecord, FeedMetadata};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Errors from the RSS writer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to serialize feed: {0}")]
    Xml(String),

    #[error("Failed to write feed: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn xml_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Xml(e.to_string())
}

/// XML 1.0 `Char`: tab, LF, CR, and everything from U+0020 except U+FFFE and U+FFFF.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Drop characters a feed reader's XML parser would reject (control characters from the page).
fn xml_safe(input: &str) -> Cow<'_, str> {
    if input.chars().all(is_xml_char) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn write_text_element<W: std::io::Write>(
    w: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), RenderError> {
    w.write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    w.write_event(Event::Text(BytesText::new(&xml_safe(text))))
        .map_err(xml_err)?;
    w.write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

/// Render the feed document with `now` as the build time and fallback date.
pub fn render_feed_at(
    meta: &FeedMetadata,
    chapters: &[ChapterRecord],
    now: DateTime<Utc>,
) -> Result<String, RenderError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    writer.write_event(Event::Start(rss)).map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .map_err(xml_err)?;

    write_text_element(&mut writer, "title", &meta.title)?;
    write_text_element(&mut writer, "link", &meta.link)?;
    write_text_element(&mut writer, "description", &meta.description)?;
    write_text_element(&mut writer, "language", &meta.language)?;
    write_text_element(&mut writer, "lastBuildDate", &format_timestamp(now))?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("href", &*xml_safe(&meta.self_url)));
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    writer.write_event(Event::Empty(self_link)).map_err(xml_err)?;

    for ch in chapters {
        writer
            .write_event(Event::Start(BytesStart::new("item")))
            .map_err(xml_err)?;
        write_text_element(&mut writer, "title", &ch.title)?;
        write_text_element(&mut writer, "link", &ch.link)?;
        write_text_element(
            &mut writer,
            "description",
            &format!("{} - {}", meta.title, ch.title),
        )?;
        write_text_element(&mut writer, "pubDate", &record_pub_date(ch, now))?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "true"));
        writer.write_event(Event::Start(guid)).map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(&xml_safe(&ch.link))))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("guid")))
            .map_err(xml_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("item")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .map_err(xml_err)?;

    let mut out = String::from_utf8(writer.into_inner()).map_err(xml_err)?;
    out.push('\n');
    Ok(out)
}

pub fn render_feed(meta: &FeedMetadata, chapters: &[ChapterRecord]) -> Result<String, RenderError> {
    render_feed_at(meta, chapters, Utc::now())
}

/// Render and write the feed to `meta.output_path`, replacing any previous file.
///
/// The document goes to a sibling `.tmp` file first and is renamed into place, so an
/// interrupted write never leaves a truncated feed behind.
pub fn write_feed(meta: &FeedMetadata, chapters: &[ChapterRecord]) -> Result<(), RenderError> {
    let xml = render_feed(meta, chapters)?;
    write_atomically(&meta.output_path, xml.as_bytes())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| RenderError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        RenderError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
