//! Market list filtering, sorting and incremental pagination.

use std::cmp::Ordering;
use std::ops::Range;

use crate::error::Result;
use crate::gecko::{CoinSummary, GeckoClient};

// Market-cap bucket thresholds.
const MEDIUM_CAP_FLOOR: f64 = 10e9;
const LARGE_CAP_FLOOR: f64 = 50e9;

/// Coarse market-cap classification against two fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapBucket {
    #[default]
    All,
    Small,
    Medium,
    Large,
}

impl CapBucket {
    pub fn all() -> &'static [CapBucket] {
        &[
            CapBucket::All,
            CapBucket::Small,
            CapBucket::Medium,
            CapBucket::Large,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            CapBucket::All => "All",
            CapBucket::Small => "Small (<$10B)",
            CapBucket::Medium => "Medium ($10B-$50B)",
            CapBucket::Large => "Large (>$50B)",
        }
    }

    pub fn next(self) -> CapBucket {
        let all = CapBucket::all();
        let i = all.iter().position(|&b| b == self).unwrap_or(0);
        all[(i + 1) % all.len()]
    }

    fn matches(self, market_cap: f64) -> bool {
        match self {
            CapBucket::All => true,
            CapBucket::Small => market_cap < MEDIUM_CAP_FLOOR,
            CapBucket::Medium => market_cap >= MEDIUM_CAP_FLOOR && market_cap < LARGE_CAP_FLOOR,
            CapBucket::Large => market_cap >= LARGE_CAP_FLOOR,
        }
    }
}

/// Sign filter on the 24h change, strict against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerfSign {
    #[default]
    All,
    Positive,
    Negative,
}

impl PerfSign {
    pub fn all() -> &'static [PerfSign] {
        &[PerfSign::All, PerfSign::Positive, PerfSign::Negative]
    }

    pub fn label(self) -> &'static str {
        match self {
            PerfSign::All => "All",
            PerfSign::Positive => "Gainers",
            PerfSign::Negative => "Losers",
        }
    }

    pub fn next(self) -> PerfSign {
        let all = PerfSign::all();
        let i = all.iter().position(|&p| p == self).unwrap_or(0);
        all[(i + 1) % all.len()]
    }

    fn matches(self, change: f64) -> bool {
        match self {
            PerfSign::All => true,
            PerfSign::Positive => change > 0.0,
            PerfSign::Negative => change < 0.0,
        }
    }
}

/// Composable filter over the loaded coin collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub search_text: String,
    pub bucket: CapBucket,
    pub price_range: (f64, f64),
    pub performance: PerfSign,
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec {
            search_text: String::new(),
            bucket: CapBucket::All,
            price_range: (0.0, f64::MAX),
            performance: PerfSign::All,
        }
    }
}

impl FilterSpec {
    /// All four predicates must hold. An empty search matches everything;
    /// a NaN figure never matches a range.
    pub fn matches(&self, coin: &CoinSummary) -> bool {
        let needle = self.search_text.trim().to_lowercase();
        let matches_search = needle.is_empty()
            || coin.name.to_lowercase().contains(&needle)
            || coin.symbol.to_lowercase().contains(&needle);

        matches_search
            && self.bucket.matches(coin.market_cap)
            && in_range(coin.current_price, self.price_range)
            && self.performance.matches(coin.price_change_percentage_24h)
    }

    pub fn is_default(&self) -> bool {
        *self == FilterSpec::default()
    }
}

// Inclusive on both bounds. Both comparisons are false for NaN, so a
// missing figure drops the row instead of panicking.
fn in_range(value: f64, (min, max): (f64, f64)) -> bool {
    value >= min && value <= max
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Symbol,
    Price,
    MarketCap,
    Change24h,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            SortKey::Name => "Name",
            SortKey::Symbol => "Symbol",
            SortKey::Price => "Price",
            SortKey::MarketCap => "Market Cap",
            SortKey::Change24h => "24h %",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Ascending,
    Descending,
}

impl SortDir {
    pub fn flipped(self) -> SortDir {
        match self {
            SortDir::Ascending => SortDir::Descending,
            SortDir::Descending => SortDir::Ascending,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDir::Ascending => "↑",
            SortDir::Descending => "↓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDir,
}

impl SortSpec {
    fn compare(&self, a: &CoinSummary, b: &CoinSummary) -> Ordering {
        let ordering = match self.key {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Symbol => a.symbol.to_lowercase().cmp(&b.symbol.to_lowercase()),
            SortKey::Price => numeric_cmp(a.current_price, b.current_price),
            SortKey::MarketCap => numeric_cmp(a.market_cap, b.market_cap),
            SortKey::Change24h => numeric_cmp(
                a.price_change_percentage_24h,
                b.price_change_percentage_24h,
            ),
        };
        match self.direction {
            SortDir::Ascending => ordering,
            SortDir::Descending => ordering.reverse(),
        }
    }
}

fn numeric_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Selecting the key already active flips its direction; any other key
/// starts a fresh ascending sort.
pub fn toggle_sort(current: Option<SortSpec>, key: SortKey) -> SortSpec {
    match current {
        Some(spec) if spec.key == key => SortSpec {
            key,
            direction: spec.direction.flipped(),
        },
        _ => SortSpec {
            key,
            direction: SortDir::Ascending,
        },
    }
}

/// Applies the filter and then the sort, returning borrowed rows in display
/// order. Pure, and cheap enough to call on every render.
///
/// `sort_by` is stable, so rows with equal keys keep their filtered-order
/// relative position; without a sort spec the collection order is preserved.
pub fn filter_and_sort<'a>(
    coins: &'a [CoinSummary],
    filter: &FilterSpec,
    sort: Option<SortSpec>,
) -> Vec<&'a CoinSummary> {
    let mut rows: Vec<&CoinSummary> = coins.iter().filter(|c| filter.matches(c)).collect();
    if let Some(spec) = sort {
        rows.sort_by(|a, b| spec.compare(a, b));
    }
    rows
}

/// Incremental pagination state for the market listing.
///
/// The upstream listing has no total-count field, so a short page is the
/// only end-of-data signal.
#[derive(Debug)]
pub struct MarketFeed {
    pub coins: Vec<CoinSummary>,
    page: u32,
    page_size: u32,
    has_more: bool,
    is_fetching: bool,
    error: Option<String>,
}

impl MarketFeed {
    pub fn new(page_size: u32) -> MarketFeed {
        MarketFeed {
            coins: Vec::new(),
            page: 0,
            page_size: page_size.max(1),
            has_more: true,
            is_fetching: false,
            error: None,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// True when the next page may be requested: there is more data and no
    /// request is already in flight.
    pub fn should_fetch(&self) -> bool {
        self.has_more && !self.is_fetching
    }

    /// Claims the next page number and raises the in-flight guard. The
    /// caller issues the actual fetch and reports back via [`apply_page`].
    ///
    /// The counter thereby always equals the number of pages requested so
    /// far: after the startup load it sits at 1 and the first scroll-driven
    /// fetch asks for page 2.
    ///
    /// [`apply_page`]: MarketFeed::apply_page
    pub fn begin_fetch(&mut self) -> u32 {
        self.is_fetching = true;
        self.page += 1;
        self.page
    }

    /// Folds a finished page fetch into the feed. A short page means the
    /// listing is exhausted; a failure records the message and stops any
    /// further attempts.
    pub fn apply_page(&mut self, result: Result<Vec<CoinSummary>>) {
        self.is_fetching = false;
        match result {
            Ok(coins) => {
                if (coins.len() as u32) < self.page_size {
                    self.has_more = false;
                }
                self.coins.extend(coins);
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.has_more = false;
            }
        }
    }
}

/// Index window of rows to render for a scroll offset and viewport height,
/// clamped to the row count. Rendering only this slice keeps large lists
/// cheap.
pub fn visible_window(offset: usize, viewport_rows: usize, total_rows: usize) -> Range<usize> {
    let start = offset.min(total_rows);
    let end = start.saturating_add(viewport_rows).min(total_rows);
    start..end
}

/// Drives the feed through up to `max_pages` fetches, stopping early on a
/// short page or an error. This is the CLI counterpart of the scroll
/// trigger.
pub async fn fetch_pages(client: &GeckoClient, page_size: u32, max_pages: u32) -> MarketFeed {
    let mut feed = MarketFeed::new(page_size);
    for _ in 0..max_pages {
        if !feed.should_fetch() {
            break;
        }
        let page = feed.begin_fetch();
        let result = client.fetch_markets(page, page_size).await;
        feed.apply_page(result);
    }
    feed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn coin(id: &str, name: &str, symbol: &str, price: f64, cap: f64, change: f64) -> CoinSummary {
        CoinSummary {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            current_price: price,
            market_cap: cap,
            price_change_percentage_24h: change,
        }
    }

    fn sample_coins() -> Vec<CoinSummary> {
        vec![
            coin("bitcoin", "Bitcoin", "btc", 50000.0, 900e9, 5.2),
            coin("ethereum", "Ethereum", "eth", 3000.0, 350e9, -2.1),
            coin("ripple", "XRP", "xrp", 0.5, 25e9, 1.3),
        ]
    }

    fn ids(rows: &[&CoinSummary]) -> Vec<String> {
        rows.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let coins = sample_coins();
        let rows = filter_and_sort(&coins, &FilterSpec::default(), None);
        assert_eq!(ids(&rows), vec!["bitcoin", "ethereum", "ripple"]);
    }

    #[test]
    fn test_search_matches_name_case_insensitively() {
        let coins = sample_coins();
        let filter = FilterSpec {
            search_text: "eth".to_string(),
            ..FilterSpec::default()
        };
        let rows = filter_and_sort(&coins, &filter, None);
        assert_eq!(ids(&rows), vec!["ethereum"]);

        let filter = FilterSpec {
            search_text: "ETH".to_string(),
            ..FilterSpec::default()
        };
        let rows = filter_and_sort(&coins, &filter, None);
        assert_eq!(ids(&rows), vec!["ethereum"]);
    }

    #[test]
    fn test_search_matches_symbol() {
        let coins = sample_coins();
        let filter = FilterSpec {
            search_text: "btc".to_string(),
            ..FilterSpec::default()
        };
        let rows = filter_and_sort(&coins, &filter, None);
        assert_eq!(ids(&rows), vec!["bitcoin"]);
    }

    #[test]
    fn test_large_bucket_keeps_bitcoin_and_ethereum() {
        let coins = sample_coins();
        let filter = FilterSpec {
            bucket: CapBucket::Large,
            ..FilterSpec::default()
        };
        let rows = filter_and_sort(&coins, &filter, None);
        assert_eq!(ids(&rows), vec!["bitcoin", "ethereum"]);
    }

    #[test]
    fn test_bucket_thresholds_are_half_open() {
        let coins = vec![
            coin("a", "A", "a", 1.0, 10e9 - 1.0, 0.0),
            coin("b", "B", "b", 1.0, 10e9, 0.0),
            coin("c", "C", "c", 1.0, 50e9 - 1.0, 0.0),
            coin("d", "D", "d", 1.0, 50e9, 0.0),
        ];

        let small = FilterSpec {
            bucket: CapBucket::Small,
            ..FilterSpec::default()
        };
        assert_eq!(ids(&filter_and_sort(&coins, &small, None)), vec!["a"]);

        let medium = FilterSpec {
            bucket: CapBucket::Medium,
            ..FilterSpec::default()
        };
        assert_eq!(ids(&filter_and_sort(&coins, &medium, None)), vec!["b", "c"]);

        let large = FilterSpec {
            bucket: CapBucket::Large,
            ..FilterSpec::default()
        };
        assert_eq!(ids(&filter_and_sort(&coins, &large, None)), vec!["d"]);
    }

    #[test]
    fn test_price_range_is_inclusive_on_both_bounds() {
        let coins = sample_coins();
        let filter = FilterSpec {
            price_range: (0.5, 3000.0),
            ..FilterSpec::default()
        };
        let rows = filter_and_sort(&coins, &filter, None);
        assert_eq!(ids(&rows), vec!["ethereum", "ripple"]);
    }

    #[test]
    fn test_performance_sign_is_strict_against_zero() {
        let mut coins = sample_coins();
        coins.push(coin("tether", "Tether", "usdt", 1.0, 80e9, 0.0));

        let positive = FilterSpec {
            performance: PerfSign::Positive,
            ..FilterSpec::default()
        };
        assert_eq!(
            ids(&filter_and_sort(&coins, &positive, None)),
            vec!["bitcoin", "ripple"]
        );

        let negative = FilterSpec {
            performance: PerfSign::Negative,
            ..FilterSpec::default()
        };
        assert_eq!(
            ids(&filter_and_sort(&coins, &negative, None)),
            vec!["ethereum"]
        );
    }

    #[test]
    fn test_nan_price_never_matches_a_range() {
        let coins = vec![coin("x", "X", "x", f64::NAN, 1e9, 0.0)];
        let filter = FilterSpec {
            price_range: (0.0, 100.0),
            ..FilterSpec::default()
        };
        assert!(filter_and_sort(&coins, &filter, None).is_empty());
    }

    #[test]
    fn test_filtered_output_is_a_subset_of_the_input() {
        let coins = sample_coins();
        let filters = [
            FilterSpec::default(),
            FilterSpec {
                search_text: "i".to_string(),
                ..FilterSpec::default()
            },
            FilterSpec {
                bucket: CapBucket::Medium,
                price_range: (1.0, 60000.0),
                performance: PerfSign::Positive,
                ..FilterSpec::default()
            },
        ];

        for filter in filters {
            let rows = filter_and_sort(&coins, &filter, None);
            assert!(rows.len() <= coins.len());
            for row in &rows {
                assert!(coins.iter().any(|c| c.id == row.id));
            }
            // no row appears twice
            for (i, row) in rows.iter().enumerate() {
                assert!(!rows[i + 1..].iter().any(|other| other.id == row.id));
            }
        }
    }

    #[test]
    fn test_sort_price_ascending_orders_xrp_eth_btc() {
        let coins = sample_coins();
        let sort = SortSpec {
            key: SortKey::Price,
            direction: SortDir::Ascending,
        };
        let rows = filter_and_sort(&coins, &FilterSpec::default(), Some(sort));
        assert_eq!(ids(&rows), vec!["ripple", "ethereum", "bitcoin"]);
    }

    #[test]
    fn test_sort_descending_reverses() {
        let coins = sample_coins();
        let sort = SortSpec {
            key: SortKey::MarketCap,
            direction: SortDir::Descending,
        };
        let rows = filter_and_sort(&coins, &FilterSpec::default(), Some(sort));
        assert_eq!(ids(&rows), vec!["bitcoin", "ethereum", "ripple"]);
    }

    #[test]
    fn test_sort_by_name_folds_case() {
        let coins = vec![
            coin("b", "beta", "b", 1.0, 1e9, 0.0),
            coin("a", "Alpha", "a", 1.0, 1e9, 0.0),
        ];
        let sort = SortSpec {
            key: SortKey::Name,
            direction: SortDir::Ascending,
        };
        let rows = filter_and_sort(&coins, &FilterSpec::default(), Some(sort));
        assert_eq!(ids(&rows), vec!["a", "b"]);
    }

    #[test]
    fn test_equal_keys_keep_their_relative_order() {
        let coins = vec![
            coin("first", "First", "f1", 10.0, 1e9, 0.0),
            coin("second", "Second", "s2", 10.0, 2e9, 0.0),
            coin("third", "Third", "t3", 5.0, 3e9, 0.0),
        ];
        let sort = SortSpec {
            key: SortKey::Price,
            direction: SortDir::Ascending,
        };
        let rows = filter_and_sort(&coins, &FilterSpec::default(), Some(sort));
        assert_eq!(ids(&rows), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_toggle_sort_same_key_flips_direction() {
        let first = toggle_sort(None, SortKey::Price);
        assert_eq!(first.direction, SortDir::Ascending);

        let second = toggle_sort(Some(first), SortKey::Price);
        assert_eq!(second.direction, SortDir::Descending);

        let third = toggle_sort(Some(second), SortKey::Price);
        assert_eq!(third.direction, SortDir::Ascending);
    }

    #[test]
    fn test_toggle_sort_new_key_resets_to_ascending() {
        let price_desc = SortSpec {
            key: SortKey::Price,
            direction: SortDir::Descending,
        };
        let switched = toggle_sort(Some(price_desc), SortKey::Name);
        assert_eq!(switched.key, SortKey::Name);
        assert_eq!(switched.direction, SortDir::Ascending);
    }

    #[test]
    fn test_feed_pages_count_up_from_the_preloaded_page() {
        let mut feed = MarketFeed::new(2);
        assert!(feed.should_fetch());

        // startup load
        assert_eq!(feed.begin_fetch(), 1);
        feed.apply_page(Ok(vec![
            coin("a", "A", "a", 1.0, 1e9, 0.0),
            coin("b", "B", "b", 1.0, 1e9, 0.0),
        ]));
        assert!(feed.has_more());

        // first scroll-driven fetch asks for page 2
        assert_eq!(feed.begin_fetch(), 2);
    }

    #[test]
    fn test_feed_short_page_stops_pagination() {
        let mut feed = MarketFeed::new(2);
        feed.begin_fetch();
        feed.apply_page(Ok(vec![coin("a", "A", "a", 1.0, 1e9, 0.0)]));

        assert!(!feed.has_more());
        assert!(!feed.should_fetch());
        assert_eq!(feed.coins.len(), 1);
    }

    #[test]
    fn test_feed_failure_records_error_and_stops() {
        let mut feed = MarketFeed::new(2);
        feed.begin_fetch();
        feed.apply_page(Err(Error::Api {
            status: 429,
            body: "too many requests".to_string(),
        }));

        assert!(feed.error().unwrap().contains("429"));
        assert!(!feed.has_more());
        assert!(!feed.is_fetching());
        assert!(feed.coins.is_empty());

        feed.dismiss_error();
        assert!(feed.error().is_none());
    }

    #[test]
    fn test_feed_guard_blocks_overlapping_fetches() {
        let mut feed = MarketFeed::new(2);
        feed.begin_fetch();
        assert!(feed.is_fetching());
        assert!(!feed.should_fetch());

        feed.apply_page(Ok(vec![
            coin("a", "A", "a", 1.0, 1e9, 0.0),
            coin("b", "B", "b", 1.0, 1e9, 0.0),
        ]));
        assert!(!feed.is_fetching());
        assert!(feed.should_fetch());
    }

    #[test]
    fn test_feed_appends_pages_in_order() {
        let mut feed = MarketFeed::new(1);
        feed.begin_fetch();
        feed.apply_page(Ok(vec![coin("a", "A", "a", 1.0, 1e9, 0.0)]));
        feed.begin_fetch();
        feed.apply_page(Ok(vec![coin("b", "B", "b", 1.0, 1e9, 0.0)]));

        let all_ids: Vec<&str> = feed.coins.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(all_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_visible_window_clamps_to_row_count() {
        assert_eq!(visible_window(0, 10, 3), 0..3);
        assert_eq!(visible_window(2, 10, 30), 2..12);
        assert_eq!(visible_window(28, 10, 30), 28..30);
        assert_eq!(visible_window(50, 10, 30), 30..30);
    }
}
