//! RSS ingestion: fetch every configured feed, parse entries, and insert
//! new articles. Deduplication is by canonical article URL; blacklisted
//! sources are dropped before they ever reach the store.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use chainpulse_store::{NewArticle, Store};

use crate::sources::{FeedSource, BLACKLIST_SOURCES, CRYPTO_FEEDS};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Canonicalize an article URL for deduplication: drop the fragment and
/// common tracking parameters. Non-parseable URLs pass through trimmed so
/// dedup still works on string equality.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    parsed.set_fragment(None);
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && k != "ref" && k != "fbclid")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    parsed.to_string()
}

#[derive(Debug, Default)]
pub struct FetchStats {
    pub feeds_fetched: u32,
    pub feeds_failed: u32,
    pub entries_seen: u32,
    pub articles_inserted: u32,
    pub duplicates: u32,
    pub blacklisted: u32,
}

impl std::fmt::Display for FetchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== RSS Fetch Complete ===")?;
        writeln!(f, "Feeds fetched:     {}", self.feeds_fetched)?;
        writeln!(f, "Feeds failed:      {}", self.feeds_failed)?;
        writeln!(f, "Entries seen:      {}", self.entries_seen)?;
        writeln!(f, "Articles inserted: {}", self.articles_inserted)?;
        writeln!(f, "Duplicates:        {}", self.duplicates)?;
        writeln!(f, "Blacklisted:       {}", self.blacklisted)?;
        Ok(())
    }
}

pub struct RssFetcher {
    store: Store,
    http: reqwest::Client,
    feeds: &'static [FeedSource],
}

impl RssFetcher {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            feeds: CRYPTO_FEEDS,
        }
    }

    /// Fetch and ingest all feeds. A failing feed is logged and skipped.
    pub async fn run_cycle(&self) -> Result<FetchStats> {
        let mut stats = FetchStats::default();
        info!(feeds = self.feeds.len(), "starting rss fetch");

        for feed in self.feeds {
            match self.ingest_feed(feed, &mut stats).await {
                Ok(()) => stats.feeds_fetched += 1,
                Err(e) => {
                    stats.feeds_failed += 1;
                    warn!(feed = feed.label, error = %e, "feed fetch failed");
                }
            }
        }

        info!("{stats}");
        Ok(stats)
    }

    async fn ingest_feed(&self, source: &FeedSource, stats: &mut FetchStats) -> Result<()> {
        if BLACKLIST_SOURCES.contains(&source.label) {
            return Ok(());
        }

        let bytes = self
            .http
            .get(source.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let feed = feed_rs::parser::parse(bytes.as_ref())?;

        for entry in feed.entries {
            stats.entries_seen += 1;

            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }

            let text = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .or_else(|| {
                    entry
                        .content
                        .as_ref()
                        .and_then(|c| c.body.clone())
                })
                .unwrap_or_default();

            let published_at: DateTime<Utc> = entry
                .published
                .or(entry.updated)
                .unwrap_or_else(Utc::now);

            let article = NewArticle {
                id: Uuid::new_v4(),
                source: source.label.to_string(),
                url: canonical_url(&link),
                title,
                text: strip_html(&text),
                published_at,
            };

            match self.store.insert_article(&article).await {
                Ok(true) => stats.articles_inserted += 1,
                Ok(false) => stats.duplicates += 1,
                Err(e) => warn!(url = article.url.as_str(), error = %e, "article insert failed"),
            }
        }

        Ok(())
    }
}

/// Drop markup from feed summaries. RSS bodies arrive as HTML fragments;
/// downstream text processing wants plain text.
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_strips_tracking_and_fragment() {
        assert_eq!(
            canonical_url("https://example.com/post?utm_source=rss&id=3#section"),
            "https://example.com/post?id=3"
        );
        assert_eq!(
            canonical_url("https://example.com/post?utm_campaign=x"),
            "https://example.com/post"
        );
    }

    #[test]
    fn canonical_url_is_idempotent() {
        let once = canonical_url("https://example.com/a?ref=tw&x=1");
        assert_eq!(canonical_url(&once), once);
    }

    #[test]
    fn canonical_url_passes_through_unparseable_input() {
        assert_eq!(canonical_url("  not a url "), "not a url");
    }

    #[test]
    fn strip_html_removes_tags_and_collapses_whitespace() {
        assert_eq!(
            strip_html("<p>Bitcoin <b>rallies</b></p>\n  <p>again</p>"),
            "Bitcoin rallies again"
        );
        assert_eq!(strip_html("plain text"), "plain text");
    }
}
