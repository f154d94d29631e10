//! Shared, read-mostly cache of the latest quote and sentiment snapshot
//! per ticker. Writers race harmlessly: a write only replaces the cached
//! entry if its timestamp is newer, so a slow, stale refresh can never
//! clobber a fresher one that landed first (last-writer-wins by
//! timestamp, per spec section 5's shared-resource policy).

use analysis_core::SentimentSnapshot;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedQuote {
    pub current_price: f64,
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Default)]
pub struct DataCache {
    quotes: DashMap<String, Stamped<CachedQuote>>,
    sentiment: DashMap<String, Stamped<SentimentSnapshot>>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_quote(&self, ticker: &str, quote: CachedQuote, at: DateTime<Utc>) {
        let should_write = self.quotes.get(ticker).map(|existing| at >= existing.at).unwrap_or(true);
        if should_write {
            self.quotes.insert(ticker.to_string(), Stamped { value: quote, at });
        }
    }

    pub fn latest_quote(&self, ticker: &str) -> Option<CachedQuote> {
        self.quotes.get(ticker).map(|e| e.value.clone())
    }

    pub fn put_sentiment(&self, ticker: &str, sentiment: SentimentSnapshot, at: DateTime<Utc>) {
        let should_write = self.sentiment.get(ticker).map(|existing| at >= existing.at).unwrap_or(true);
        if should_write {
            self.sentiment.insert(ticker.to_string(), Stamped { value: sentiment, at });
        }
    }

    pub fn latest_sentiment(&self, ticker: &str) -> Option<SentimentSnapshot> {
        self.sentiment.get(ticker).map(|e| e.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stale_write_never_clobbers_a_newer_entry() {
        let cache = DataCache::new();
        let now = Utc::now();
        cache.put_quote("AAPL", CachedQuote { current_price: 190.0, change_percent: None, volume: None }, now);
        cache.put_quote(
            "AAPL",
            CachedQuote { current_price: 1.0, change_percent: None, volume: None },
            now - Duration::seconds(5),
        );
        assert_eq!(cache.latest_quote("AAPL").unwrap().current_price, 190.0);
    }

    #[test]
    fn newer_write_replaces_the_cached_entry() {
        let cache = DataCache::new();
        let now = Utc::now();
        cache.put_quote("AAPL", CachedQuote { current_price: 190.0, change_percent: None, volume: None }, now);
        cache.put_quote(
            "AAPL",
            CachedQuote { current_price: 191.5, change_percent: None, volume: None },
            now + Duration::seconds(5),
        );
        assert_eq!(cache.latest_quote("AAPL").unwrap().current_price, 191.5);
    }
}
