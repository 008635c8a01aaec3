//! News-feed adapter (RSS 2.0, RSS 1.0 and Atom).
//!
//! Feeds are fetched concurrently and independently: an unreachable feed is
//! logged and skipped while the others still contribute.

use super::{check_status, first_non_empty, parse_timestamp, truncate_chars, FetchError, ProviderAdapter};
use crate::config::ActiveConfig;
use crate::models::{AlertItem, ProviderCategory};
use crate::severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const CATEGORY: ProviderCategory = ProviderCategory::Rss;

/// Description length shown on the dashboard before the continuation marker.
const DESCRIPTION_LIMIT: usize = 200;

/// Broad editorial filter (English and Portuguese) applied before severity.
pub const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "vulnerability",
    "exploit",
    "malware",
    "ransomware",
    "threat",
    "attack",
    "breach",
    "cve",
    "patch",
    "advisory",
    "segurança",
    "vulnerabilidade",
    "ameaça",
    "ataque",
];

/// One feed item, format-independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub published: Option<String>,
    /// Full body (`content:encoded` / Atom `content`), may contain HTML.
    pub content: Option<String>,
    /// Short body (`description` / Atom `summary`), may contain HTML.
    pub summary: Option<String>,
    pub categories: Vec<String>,
}

impl FeedEntry {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published.as_deref().and_then(parse_timestamp)
    }

    /// Plain-text body: summary preferred, full content otherwise.
    fn snippet(&self) -> String {
        [self.summary.as_deref(), self.content.as_deref()]
            .into_iter()
            .flatten()
            .map(strip_html)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }

    fn is_security_news(&self) -> bool {
        let title = self.title.as_deref().unwrap_or("").to_lowercase();
        let snippet = self.snippet().to_lowercase();
        let categories = self.categories.join(" ").to_lowercase();

        SECURITY_KEYWORDS
            .iter()
            .any(|kw| title.contains(kw) || snippet.contains(kw) || categories.contains(kw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    Published,
    Content,
    Summary,
    Category,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"guid" | b"id" => Some(Field::Guid),
            b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
            b"encoded" | b"content" => Some(Field::Content),
            b"description" | b"summary" => Some(Field::Summary),
            b"category" | b"subject" => Some(Field::Category),
            _ => None,
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn set_once(slot: &mut Option<String>, value: String) {
    let value = value.trim();
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

impl FeedEntry {
    fn apply(&mut self, field: Field, value: String) {
        match field {
            Field::Title => set_once(&mut self.title, value),
            Field::Link => set_once(&mut self.link, value),
            Field::Guid => set_once(&mut self.guid, value),
            Field::Published => set_once(&mut self.published, value),
            Field::Content => set_once(&mut self.content, value),
            Field::Summary => set_once(&mut self.summary, value),
            Field::Category => {
                let value = value.trim();
                if !value.is_empty() {
                    self.categories.push(value.to_string());
                }
            }
        }
    }

    /// Atom carries link and category in attributes.
    fn apply_attributes(&mut self, field: Field, e: &BytesStart<'_>) {
        match field {
            Field::Link => {
                let rel = attribute(e, b"rel");
                if matches!(rel.as_deref(), None | Some("alternate")) {
                    if let Some(href) = attribute(e, b"href") {
                        set_once(&mut self.link, href);
                    }
                }
            }
            Field::Category => {
                if let Some(term) = attribute(e, b"term") {
                    self.apply(Field::Category, term);
                }
            }
            _ => {}
        }
    }
}

/// Parse an RSS or Atom document into entries, in document order.
pub(crate) fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut saw_root = false;
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<(Field, Vec<u8>)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"rss" | b"feed" | b"RDF" => saw_root = true,
                    b"item" | b"entry" => {
                        current = Some(FeedEntry::default());
                        field = None;
                    }
                    name if field.is_none() => {
                        if let (Some(entry), Some(f)) = (current.as_mut(), Field::from_local_name(name)) {
                            entry.apply_attributes(f, &e);
                            field = Some((f, name.to_vec()));
                            text.clear();
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) if field.is_none() => {
                if let (Some(entry), Some(f)) =
                    (current.as_mut(), Field::from_local_name(e.local_name().as_ref()))
                {
                    entry.apply_attributes(f, &e);
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let local = local.as_ref();
                if let Some((f, name)) = &field {
                    if name.as_slice() == local {
                        if let Some(entry) = current.as_mut() {
                            entry.apply(*f, std::mem::take(&mut text));
                        }
                        field = None;
                    }
                } else if matches!(local, b"item" | b"entry") {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(FetchError::Malformed(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !saw_root {
        return Err(FetchError::Malformed("document is not an RSS or Atom feed".to_string()));
    }

    Ok(entries)
}

/// Remove markup and decode the common entities, collapsing whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merge per-feed results: failures are logged and dropped, survivors are
/// sorted newest first. Undated items sort last.
pub(crate) fn combine(results: Vec<(String, Result<Vec<FeedEntry>, FetchError>)>) -> Vec<FeedEntry> {
    let mut all = Vec::new();

    for (url, result) in results {
        match result {
            Ok(entries) => {
                debug!(feed = %url, count = entries.len(), "Feed fetched");
                all.extend(entries);
            }
            Err(e) => warn!(feed = %url, kind = e.kind(), "Feed failed: {}", e),
        }
    }

    all.sort_by_key(|entry| std::cmp::Reverse(entry.published_at()));
    all
}

/// The feed's own identifier for an entry: guid, else link, whitespace removed.
fn native_id(entry: &FeedEntry) -> Option<String> {
    let id = first_non_empty([entry.guid.as_deref(), entry.link.as_deref()], "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    (!id.is_empty()).then_some(id)
}

fn to_alert(entry: FeedEntry, native_id: &str) -> AlertItem {
    let title = first_non_empty([entry.title.as_deref()], "Security News");
    let mut body = entry.snippet();
    let severity = severity::from_keywords(&title, &body);

    if truncate_chars(&mut body, DESCRIPTION_LIMIT) {
        body.push_str("...");
    }

    AlertItem {
        id: CATEGORY.alert_id(native_id),
        source: CATEGORY.source(),
        severity,
        title,
        description: (!body.is_empty()).then_some(body),
        timestamp: entry.published_at().unwrap_or_else(Utc::now),
        link: entry.link,
    }
}

/// Filter merged entries to security news and map them to alerts.
///
/// The same article syndicated by several feeds keeps its first id; later
/// copies get a `-<index>` suffix so ids stay unique within the cycle.
pub(crate) fn normalize(entries: Vec<FeedEntry>) -> Vec<AlertItem> {
    let cycle_millis = Utc::now().timestamp_millis();
    let mut seen = HashSet::new();

    entries
        .into_iter()
        .filter(FeedEntry::is_security_news)
        .enumerate()
        .map(|(index, entry)| {
            let base = native_id(&entry).unwrap_or_else(|| format!("{}-{}", cycle_millis, index));
            let mut id = base.clone();
            let mut suffix = index;
            while !seen.insert(id.clone()) {
                id = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            to_alert(entry, &id)
        })
        .collect()
}

/// Adapter aggregating a list of news feeds.
pub struct RssAdapter {
    client: reqwest::Client,
    feed_timeout: Duration,
}

impl RssAdapter {
    pub fn new(client: reqwest::Client, feed_timeout: Duration) -> Self {
        Self {
            client,
            feed_timeout,
        }
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.feed_timeout)
            .header(
                "Accept",
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await?;

        let body = check_status(response).await?.text().await?;
        parse_feed(&body)
    }
}

#[async_trait]
impl ProviderAdapter for RssAdapter {
    fn category(&self) -> ProviderCategory {
        CATEGORY
    }

    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        _limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError> {
        let config = config
            .rss
            .as_ref()
            .ok_or_else(|| FetchError::NotConfigured("rss".to_string()))?;

        let urls: Vec<&str> = config.feed_urls().collect();
        if urls.is_empty() {
            return Err(FetchError::NotConfigured("feeds".to_string()));
        }
        debug!("Fetching {} news feeds", urls.len());

        let results = join_all(urls.iter().map(|url| async move {
            (url.to_string(), self.fetch_feed(url).await)
        }))
        .await;

        Ok(normalize(combine(results)))
    }
}
