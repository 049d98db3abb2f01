//! CoinGecko REST API client and the typed response models.

use std::collections::HashMap;

use reqwest::header::CACHE_CONTROL;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Error, Result};

const GECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

// Upstream refreshes market data roughly once a minute; hint any transport
// cache accordingly.
const CACHE_HINT: &str = "max-age=60";

/// One row of the paged market listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub current_price: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub market_cap: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub price_change_percentage_24h: f64,
}

/// Full per-coin payload backing the detail view.
///
/// Replaced wholesale on every fetch; nothing is merged into an older copy.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub market_data: MarketData,
    #[serde(default)]
    pub tickers: Vec<Ticker>,
}

/// Currency-keyed figures and supply data nested inside [`CoinDetail`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    #[serde(default, deserialize_with = "numeric_map")]
    pub current_price: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub market_cap: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub total_volume: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub high_24h: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub low_24h: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub ath: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub ath_change_percentage: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub atl: HashMap<String, f64>,
    #[serde(default, deserialize_with = "numeric_map")]
    pub atl_change_percentage: HashMap<String, f64>,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub price_change_percentage_24h: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub market_cap_change_percentage_24h: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub circulating_supply: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub total_supply: f64,
    #[serde(default, deserialize_with = "zero_when_null")]
    pub max_supply: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    #[serde(default, deserialize_with = "zero_when_null")]
    pub last: f64,
}

impl CoinDetail {
    /// Display price: the first ticker's last trade, 0 when no tickers came
    /// back.
    pub fn ticker_price(&self) -> f64 {
        self.tickers.first().map(|t| t.last).unwrap_or(0.0)
    }

    /// Collapses the detail payload into the listing row shape, e.g. for
    /// tracking a coin that was never seen in the market table.
    pub fn to_summary(&self, currency: &str) -> CoinSummary {
        CoinSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            current_price: self.ticker_price(),
            market_cap: currency_figure(&self.market_data.market_cap, currency),
            price_change_percentage_24h: self.market_data.price_change_percentage_24h,
        }
    }
}

/// Looks up a currency-keyed figure, 0.0 when the currency is absent.
pub fn currency_figure(map: &HashMap<String, f64>, currency: &str) -> f64 {
    map.get(currency).copied().unwrap_or(0.0)
}

/// One OHLC candle as returned by the history endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcPoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Historical window accepted by the OHLC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Day,
    Week,
    TwoWeeks,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    Max,
}

impl Lookback {
    pub fn all() -> &'static [Lookback] {
        &[
            Lookback::Day,
            Lookback::Week,
            Lookback::TwoWeeks,
            Lookback::Month,
            Lookback::ThreeMonths,
            Lookback::SixMonths,
            Lookback::Year,
            Lookback::Max,
        ]
    }

    /// The `days` query value the upstream API expects.
    pub fn as_query(self) -> &'static str {
        match self {
            Lookback::Day => "1",
            Lookback::Week => "7",
            Lookback::TwoWeeks => "14",
            Lookback::Month => "30",
            Lookback::ThreeMonths => "90",
            Lookback::SixMonths => "180",
            Lookback::Year => "365",
            Lookback::Max => "max",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Lookback::Day => "1 Day",
            Lookback::Week => "7 Days",
            Lookback::TwoWeeks => "2 Weeks",
            Lookback::Month => "1 Month",
            Lookback::ThreeMonths => "3 Months",
            Lookback::SixMonths => "6 Months",
            Lookback::Year => "This Year",
            Lookback::Max => "Max",
        }
    }

    pub fn from_query(s: &str) -> Option<Lookback> {
        Lookback::all().iter().copied().find(|l| l.as_query() == s)
    }

    pub fn next(self) -> Lookback {
        let all = Lookback::all();
        let i = all.iter().position(|&l| l == self).unwrap_or(0);
        all[(i + 1) % all.len()]
    }

    pub fn previous(self) -> Lookback {
        let all = Lookback::all();
        let i = all.iter().position(|&l| l == self).unwrap_or(0);
        all[(i + all.len() - 1) % all.len()]
    }
}

/// Client for the CoinGecko REST API.
///
/// Cheap to clone; background fetch tasks each take their own copy.
#[derive(Debug, Clone)]
pub struct GeckoClient {
    client: reqwest::Client,
    currency: String,
}

impl GeckoClient {
    pub fn new(currency: &str) -> Self {
        GeckoClient {
            client: reqwest::Client::new(),
            currency: currency.to_lowercase(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Fetches one page of the market listing, sorted by descending market
    /// cap upstream.
    pub async fn fetch_markets(&self, page: u32, per_page: u32) -> Result<Vec<CoinSummary>> {
        let url = format!("{GECKO_API_URL}/coins/markets");
        let params = [
            ("vs_currency", self.currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];

        debug!("requesting market page {page} ({per_page} per page)");
        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, CACHE_HINT)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!("market listing failed: {status} - {body}");
            return Err(Error::Api { status, body });
        }

        Ok(response.json::<Vec<CoinSummary>>().await?)
    }

    /// Fetches the full detail payload for a single coin id.
    pub async fn fetch_detail(&self, id: &str) -> Result<CoinDetail> {
        let url = format!("{GECKO_API_URL}/coins/{id}");

        debug!("requesting detail for {id}");
        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, CACHE_HINT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!("detail fetch for {id} failed: {status} - {body}");
            return Err(Error::Api { status, body });
        }

        Ok(response.json::<CoinDetail>().await?)
    }

    /// Fetches OHLC history for a coin over the given lookback window.
    pub async fn fetch_ohlc(&self, id: &str, lookback: Lookback) -> Result<Vec<OhlcPoint>> {
        let url = format!("{GECKO_API_URL}/coins/{id}/ohlc");
        let params = [
            ("vs_currency", self.currency.clone()),
            ("days", lookback.as_query().to_string()),
        ];

        debug!("requesting {} of OHLC for {id}", lookback.as_query());
        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, CACHE_HINT)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!("OHLC fetch for {id} failed: {status} - {body}");
            return Err(Error::Api { status, body });
        }

        let rows: Vec<Vec<Value>> = response.json().await?;
        Ok(parse_ohlc(rows))
    }
}

// Candles arrive as [timestamp, open, high, low, close] arrays. Rows with
// missing or non-numeric columns are dropped rather than failing the fetch.
fn parse_ohlc(rows: Vec<Vec<Value>>) -> Vec<OhlcPoint> {
    let mut points = Vec::with_capacity(rows.len());

    for row in rows {
        if row.len() < 5 {
            continue;
        }
        let timestamp = match row[0].as_i64() {
            Some(t) => t,
            None => continue,
        };
        let open = match row[1].as_f64() {
            Some(v) => v,
            None => continue,
        };
        let high = match row[2].as_f64() {
            Some(v) => v,
            None => continue,
        };
        let low = match row[3].as_f64() {
            Some(v) => v,
            None => continue,
        };
        let close = match row[4].as_f64() {
            Some(v) => v,
            None => continue,
        };

        points.push(OhlcPoint {
            timestamp,
            open,
            high,
            low,
            close,
        });
    }

    points
}

fn zero_when_null<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn numeric_map<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_listing_deserializes() {
        let json = r#"[
            {
                "id": "bitcoin",
                "name": "Bitcoin",
                "symbol": "btc",
                "current_price": 50000.0,
                "market_cap": 900000000000.0,
                "price_change_percentage_24h": 5.2,
                "image": "https://example.com/btc.png"
            },
            {
                "id": "ethereum",
                "name": "Ethereum",
                "symbol": "eth",
                "current_price": null,
                "market_cap": 350000000000.0
            }
        ]"#;

        let coins: Vec<CoinSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[0].current_price, 50000.0);
        // null and missing numerics both default to zero
        assert_eq!(coins[1].current_price, 0.0);
        assert_eq!(coins[1].price_change_percentage_24h, 0.0);
    }

    #[test]
    fn test_detail_deserializes_and_prices_from_first_ticker() {
        let json = r#"{
            "id": "bitcoin",
            "name": "Bitcoin",
            "symbol": "btc",
            "market_cap_rank": 1,
            "market_data": {
                "current_price": {"usd": 50000.0, "eur": 46000.0},
                "market_cap": {"usd": 900000000000.0},
                "total_volume": {"usd": 30000000000.0},
                "circulating_supply": 19000000.0,
                "total_supply": 21000000.0,
                "max_supply": 21000000.0,
                "market_cap_change_percentage_24h": 4.9
            },
            "tickers": [
                {"last": 50012.5},
                {"last": 50011.0}
            ]
        }"#;

        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.market_cap_rank, Some(1));
        assert_eq!(detail.ticker_price(), 50012.5);
        assert_eq!(
            currency_figure(&detail.market_data.current_price, "usd"),
            50000.0
        );
        assert_eq!(currency_figure(&detail.market_data.current_price, "chf"), 0.0);
    }

    #[test]
    fn test_detail_without_tickers_prices_zero() {
        let json = r#"{"id": "x", "name": "X", "symbol": "x"}"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.ticker_price(), 0.0);
        assert_eq!(detail.market_data.circulating_supply, 0.0);
    }

    #[test]
    fn test_null_map_values_are_dropped() {
        let json = r#"{
            "id": "x", "name": "X", "symbol": "x",
            "market_data": {"ath": {"usd": null, "eur": 12.0}}
        }"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        assert_eq!(currency_figure(&detail.market_data.ath, "usd"), 0.0);
        assert_eq!(currency_figure(&detail.market_data.ath, "eur"), 12.0);
    }

    #[test]
    fn test_to_summary_uses_ticker_price() {
        let json = r#"{
            "id": "ethereum", "name": "Ethereum", "symbol": "eth",
            "market_data": {
                "market_cap": {"usd": 350000000000.0},
                "price_change_percentage_24h": -2.1
            },
            "tickers": [{"last": 3000.0}]
        }"#;
        let detail: CoinDetail = serde_json::from_str(json).unwrap();
        let summary = detail.to_summary("usd");
        assert_eq!(summary.current_price, 3000.0);
        assert_eq!(summary.market_cap, 350000000000.0);
        assert_eq!(summary.price_change_percentage_24h, -2.1);
    }

    #[test]
    fn test_parse_ohlc_skips_malformed_rows() {
        let rows: Vec<Vec<Value>> = serde_json::from_str(
            r#"[
                [1700000000000, 100.0, 110.0, 95.0, 105.0],
                [1700003600000, 105.0],
                [1700007200000, "bad", 120.0, 100.0, 115.0],
                [1700010800000, 105.0, 120.0, 100.0, 115.0]
            ]"#,
        )
        .unwrap();

        let points = parse_ohlc(rows);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, 1700000000000);
        assert_eq!(points[0].close, 105.0);
        assert_eq!(points[1].high, 120.0);
    }

    #[test]
    fn test_lookback_queries_and_cycle() {
        assert_eq!(Lookback::Day.as_query(), "1");
        assert_eq!(Lookback::Year.as_query(), "365");
        assert_eq!(Lookback::Max.as_query(), "max");
        assert_eq!(Lookback::from_query("14"), Some(Lookback::TwoWeeks));
        assert_eq!(Lookback::from_query("2"), None);

        assert_eq!(Lookback::Max.next(), Lookback::Day);
        assert_eq!(Lookback::Day.previous(), Lookback::Max);
        assert_eq!(Lookback::Month.next(), Lookback::ThreeMonths);
    }
}
