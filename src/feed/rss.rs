//! RSS 2.0 parsing
//!
//! Only the channel build date and the per-item fields the importer needs are kept.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

/// A parsed feed, as stored in the feed cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeed {
    pub title: Option<String>,
    /// `lastBuildDate` as reported by the feed
    pub build_date: Option<String>,
    #[serde(default)]
    pub items: Vec<RawFeedItem>,
}

/// One `<item>` of a feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedItem {
    pub title: Option<String>,
    /// `dc:creator`, falling back to `author`
    pub creator: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub guid: Option<String>,
    pub enclosure_url: Option<String>,
    /// `content:encoded`, falling back to `description`
    pub content: Option<String>,
}

#[derive(Default)]
struct ItemBuilder {
    item: RawFeedItem,
    author: Option<String>,
    description: Option<String>,
}

impl ItemBuilder {
    fn finish(self) -> RawFeedItem {
        let mut item = self.item;
        item.creator = item.creator.or(self.author);
        item.content = item.content.or(self.description);
        item
    }
}

/// Parse an RSS document
pub fn parse_rss(xml: &str) -> Result<RawFeed> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut feed = RawFeed::default();
    let mut seen_channel = false;
    let mut current: Option<ItemBuilder> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.name().as_ref() {
                    b"channel" => seen_channel = true,
                    b"item" => current = Some(ItemBuilder::default()),
                    b"enclosure" => {
                        if let Some(builder) = current.as_mut() {
                            builder.item.enclosure_url = enclosure_url(&e)?;
                        }
                    }
                    _ => (),
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"enclosure" {
                    if let Some(builder) = current.as_mut() {
                        builder.item.enclosure_url = enclosure_url(&e)?;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let chunk = e
                    .unescape()
                    .map_err(|err| Error::FeedParse(err.to_string()))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(e)) => {
                let value = non_empty(&text);
                let name = e.name();
                if name.as_ref() == b"item" {
                    if let Some(builder) = current.take() {
                        feed.items.push(builder.finish());
                    }
                } else if let Some(b) = current.as_mut() {
                    match name.as_ref() {
                        b"title" => b.item.title = value,
                        b"dc:creator" => b.item.creator = value,
                        b"author" => b.author = value,
                        b"link" => b.item.link = value,
                        b"pubDate" => b.item.pub_date = value,
                        b"guid" => b.item.guid = value,
                        b"content:encoded" => b.item.content = value,
                        b"description" => b.description = value,
                        _ => (),
                    }
                } else {
                    match name.as_ref() {
                        b"title" if feed.title.is_none() => feed.title = value,
                        b"lastBuildDate" => feed.build_date = value,
                        _ => (),
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => (),
        }
        buf.clear();
    }

    if !seen_channel {
        return Err(Error::FeedParse("no <channel> element".to_string()));
    }

    Ok(feed)
}

fn enclosure_url(e: &quick_xml::events::BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::FeedParse(err.to_string()))?;
        if attr.key.as_ref() == b"url" {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::FeedParse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Read</title>
    <link>https://oku.club/collection/zQtTo</link>
    <lastBuildDate>Fri, 19 Jul 2024 13:39:56 +0000</lastBuildDate>
    <item>
      <title>Piranesi</title>
      <dc:creator>Susanna Clarke</dc:creator>
      <link>https://oku.club/book/piranesi-by-susanna-clarke-Xy12</link>
      <guid>https://oku.club/book/piranesi-by-susanna-clarke-Xy12</guid>
      <pubDate>Tue, 02 Jul 2024 08:00:00 +0000</pubDate>
      <enclosure url="https://oku.club/covers/piranesi.jpg" type="image/jpeg" length="0"/>
      <description><![CDATA[A house of <b>endless</b> halls & tides.]]></description>
    </item>
    <item>
      <title>The Dispossessed &amp; Other Worlds</title>
      <author>Ursula K. Le Guin</author>
      <guid>https://oku.club/book/the-dispossessed-Ab34</guid>
      <pubDate>Mon, 01 Jul 2024 08:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_sample_feed() {
        let feed = parse_rss(SAMPLE_FEED).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Read"));
        assert_eq!(
            feed.build_date.as_deref(),
            Some("Fri, 19 Jul 2024 13:39:56 +0000")
        );
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title.as_deref(), Some("Piranesi"));
        assert_eq!(first.creator.as_deref(), Some("Susanna Clarke"));
        assert_eq!(
            first.enclosure_url.as_deref(),
            Some("https://oku.club/covers/piranesi.jpg")
        );
        assert_eq!(
            first.content.as_deref(),
            Some("A house of <b>endless</b> halls & tides.")
        );

        let second = &feed.items[1];
        assert_eq!(second.title.as_deref(), Some("The Dispossessed & Other Worlds"));
        assert_eq!(second.creator.as_deref(), Some("Ursula K. Le Guin"));
        assert_eq!(second.enclosure_url, None);
    }

    #[test]
    fn test_rejects_non_feed_documents() {
        assert!(matches!(
            parse_rss("<html><body>Not found</body></html>"),
            Err(Error::FeedParse(_))
        ));
        assert!(parse_rss("<rss><channel><item></channel></rss>").is_err());
    }
}
