/// One RSS source: lowercase label + feed URL.
#[derive(Debug, Clone, Copy)]
pub struct FeedSource {
    pub label: &'static str,
    pub url: &'static str,
}

/// Seed list of crypto news feeds.
pub const CRYPTO_FEEDS: &[FeedSource] = &[
    FeedSource { label: "coindesk", url: "https://www.coindesk.com/arc/outboundfeeds/rss/" },
    FeedSource { label: "cointelegraph", url: "https://cointelegraph.com/rss" },
    FeedSource { label: "decrypt", url: "https://decrypt.co/feed" },
    FeedSource { label: "theblock", url: "https://www.theblock.co/rss.xml" },
    FeedSource { label: "bitcoinmagazine", url: "https://bitcoinmagazine.com/feed" },
    FeedSource { label: "cryptoslate", url: "https://cryptoslate.com/feed/" },
    FeedSource { label: "cryptopotato", url: "https://cryptopotato.com/feed/" },
    FeedSource { label: "newsbtc", url: "https://www.newsbtc.com/feed/" },
    FeedSource { label: "bitcoinist", url: "https://bitcoinist.com/feed/" },
    FeedSource { label: "cryptobriefing", url: "https://cryptobriefing.com/feed/" },
    FeedSource { label: "thedefiant", url: "https://thedefiant.io/api/feed" },
    FeedSource { label: "blockworks", url: "https://blockworks.co/feed" },
    FeedSource { label: "protos", url: "https://protos.com/feed/" },
];

/// Sources excluded entirely at ingest (advertising-heavy content that
/// poisons entity extraction).
pub const BLACKLIST_SOURCES: &[&str] = &["benzinga"];
