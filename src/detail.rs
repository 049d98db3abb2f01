//! Detail view assembly: numeric derivation from a coin payload, then a
//! separate formatting pass into display strings.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::gecko::{currency_figure, CoinDetail, OhlcPoint};

static CURRENCY_SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("usd", "$"),
        ("cad", "$"),
        ("aud", "$"),
        ("eur", "€"),
        ("gbp", "£"),
        ("jpy", "¥"),
    ])
});

/// Raw figures derived from a detail payload, before any formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStats {
    pub price: f64,
    pub market_cap: f64,
    pub market_cap_change_24h: f64,
    pub volume_24h: f64,
    pub volume_to_cap_pct: f64,
    pub fully_diluted_value: f64,
    pub circulating_supply: f64,
    pub total_supply: f64,
    pub max_supply: f64,
    pub issued_pct_of_max: f64,
    pub price_change_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub ath: f64,
    pub ath_change_pct: f64,
    pub atl: f64,
    pub atl_change_pct: f64,
    pub rank: Option<u32>,
}

/// Numeric derivation pass. Degenerate inputs produce zeros, never NaN.
///
/// The displayed market cap is `price * circulating_supply`, deliberately
/// not the upstream market_cap figure. The cap-change percentage does come
/// from the upstream field, so the two can disagree.
pub fn derive_stats(detail: &CoinDetail, currency: &str) -> DerivedStats {
    let md = &detail.market_data;

    // display price comes from the first ticker, not market_data
    let price = detail.ticker_price();

    let market_cap = if md.circulating_supply > 0.0 {
        price * md.circulating_supply
    } else {
        0.0
    };

    let volume_24h = currency_figure(&md.total_volume, currency);
    let volume_to_cap_pct = if market_cap > 0.0 {
        volume_24h / market_cap * 100.0
    } else {
        0.0
    };

    let issued_pct_of_max = if md.max_supply > 0.0 {
        md.circulating_supply / md.max_supply * 100.0
    } else {
        0.0
    };

    DerivedStats {
        price,
        market_cap,
        market_cap_change_24h: md.market_cap_change_percentage_24h,
        volume_24h,
        volume_to_cap_pct,
        fully_diluted_value: price * md.total_supply,
        circulating_supply: md.circulating_supply,
        total_supply: md.total_supply,
        max_supply: md.max_supply,
        issued_pct_of_max,
        price_change_24h: md.price_change_percentage_24h,
        high_24h: currency_figure(&md.high_24h, currency),
        low_24h: currency_figure(&md.low_24h, currency),
        ath: currency_figure(&md.ath, currency),
        ath_change_pct: currency_figure(&md.ath_change_percentage, currency),
        atl: currency_figure(&md.atl, currency),
        atl_change_pct: currency_figure(&md.atl_change_percentage, currency),
        rank: detail.market_cap_rank,
    }
}

/// One candle with its bucket timestamp rendered for tabular display.
#[derive(Debug, Clone)]
pub struct ChartCandle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Fully formatted strings for the detail panel. Currency glyphs are left
/// to the surrounding markup, mirroring the table renderers.
#[derive(Debug, Clone)]
pub struct DisplayModel {
    pub name: String,
    pub symbol: String,
    pub rank: String,
    pub price: String,
    pub price_change_24h: String,
    pub market_cap: String,
    pub market_cap_change_24h: String,
    pub volume_24h: String,
    pub volume_to_cap: String,
    pub fully_diluted_value: String,
    pub circulating_supply: String,
    pub total_supply: String,
    pub max_supply: String,
    pub issued_pct_of_max: String,
    pub high_24h: String,
    pub low_24h: String,
    pub ath: String,
    pub ath_change: String,
    pub atl: String,
    pub atl_change: String,
    pub gaining: bool,
    pub chart: Vec<ChartCandle>,
}

/// Builds the display model for a detail payload and its OHLC series:
/// numeric derivation first, then pure formatting.
pub fn assemble(detail: &CoinDetail, ohlc: &[OhlcPoint], currency: &str) -> DisplayModel {
    let stats = derive_stats(detail, currency);

    let chart = ohlc
        .iter()
        .map(|point| ChartCandle {
            date: format_candle_date(point.timestamp),
            open: point.open,
            high: point.high,
            low: point.low,
            close: point.close,
        })
        .collect();

    DisplayModel {
        name: detail.name.clone(),
        symbol: detail.symbol.to_uppercase(),
        rank: match stats.rank {
            Some(rank) => format!("#{rank}"),
            None => "-".to_string(),
        },
        price: format_with_commas(stats.price),
        price_change_24h: format_signed_percent(stats.price_change_24h),
        market_cap: format_large_number(stats.market_cap),
        market_cap_change_24h: format_signed_percent(stats.market_cap_change_24h),
        volume_24h: format_large_number(stats.volume_24h),
        volume_to_cap: format!("{:.2}%", stats.volume_to_cap_pct),
        fully_diluted_value: format_large_number(stats.fully_diluted_value),
        circulating_supply: format_with_commas(stats.circulating_supply),
        total_supply: format_with_commas(stats.total_supply),
        max_supply: format_with_commas(stats.max_supply),
        issued_pct_of_max: format!("{:.2}%", stats.issued_pct_of_max),
        high_24h: format_with_commas(stats.high_24h),
        low_24h: format_with_commas(stats.low_24h),
        ath: format_with_commas(stats.ath),
        ath_change: format_signed_percent(stats.ath_change_pct),
        atl: format_with_commas(stats.atl),
        atl_change: format_signed_percent(stats.atl_change_pct),
        gaining: stats.price_change_24h >= 0.0,
        chart,
    }
}

fn format_candle_date(timestamp_ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Groups the integer part with commas and keeps exactly two decimals.
pub fn format_with_commas(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let parts: Vec<&str> = formatted.split('.').collect();
    let integer_part = parts[0];
    let decimal_part = parts.get(1).unwrap_or(&"00");

    let formatted_integer = integer_part
        .chars()
        .rev()
        .collect::<String>()
        .chars()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>();

    format!("{formatted_integer}.{decimal_part}")
}

/// Magnitude-suffixed rendering: trillions, billions and millions get a
/// T/B/M suffix with two decimals, everything below prints as-is.
pub fn format_large_number(value: f64) -> String {
    if value >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if value >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        format!("{value}")
    }
}

/// Signed two-decimal percent; zero counts as a gain.
pub fn format_signed_percent(value: f64) -> String {
    if value >= 0.0 {
        format!("+{value:.2}%")
    } else {
        format!("{value:.2}%")
    }
}

/// Price tag with the currency's glyph, falling back to the uppercased
/// code for currencies without one.
pub fn format_price(value: f64, currency: &str) -> String {
    match CURRENCY_SYMBOLS.get(currency) {
        Some(symbol) => format!("{symbol}{}", format_with_commas(value)),
        None => format!("{} {}", format_with_commas(value), currency.to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gecko::{MarketData, Ticker};

    fn detail_with(
        price: f64,
        circulating: f64,
        total: f64,
        max: f64,
        volume: f64,
    ) -> CoinDetail {
        CoinDetail {
            id: "bitcoin".to_string(),
            name: "Bitcoin".to_string(),
            symbol: "btc".to_string(),
            market_cap_rank: Some(1),
            market_data: MarketData {
                total_volume: HashMap::from([("usd".to_string(), volume)]),
                market_cap: HashMap::from([("usd".to_string(), 900e9)]),
                market_cap_change_percentage_24h: 4.9,
                price_change_percentage_24h: 5.2,
                circulating_supply: circulating,
                total_supply: total,
                max_supply: max,
                ..MarketData::default()
            },
            tickers: vec![Ticker { last: price }],
        }
    }

    #[test]
    fn test_price_comes_from_the_first_ticker() {
        let mut detail = detail_with(50000.0, 19e6, 21e6, 21e6, 30e9);
        detail.tickers.push(Ticker { last: 1.0 });

        let stats = derive_stats(&detail, "usd");
        assert_eq!(stats.price, 50000.0);
    }

    #[test]
    fn test_market_cap_derives_from_circulating_supply() {
        let detail = detail_with(50000.0, 19e6, 21e6, 21e6, 30e9);
        let stats = derive_stats(&detail, "usd");

        assert_eq!(stats.market_cap, 50000.0 * 19e6);
        // the change percentage still comes from the upstream field
        assert_eq!(stats.market_cap_change_24h, 4.9);
    }

    #[test]
    fn test_zero_circulating_supply_yields_zero_cap_not_nan() {
        let detail = detail_with(50000.0, 0.0, 21e6, 21e6, 30e9);
        let stats = derive_stats(&detail, "usd");

        assert_eq!(stats.market_cap, 0.0);
        assert_eq!(stats.volume_to_cap_pct, 0.0);
        assert!(!stats.market_cap.is_nan());
        assert!(!stats.volume_to_cap_pct.is_nan());

        let model = assemble(&detail, &[], "usd");
        assert_eq!(model.market_cap, "0");
    }

    #[test]
    fn test_missing_tickers_degrade_to_an_all_zero_panel() {
        let mut detail = detail_with(0.0, 0.0, 0.0, 0.0, 0.0);
        detail.tickers.clear();
        detail.market_cap_rank = None;

        let model = assemble(&detail, &[], "usd");
        assert_eq!(model.price, "0.00");
        assert_eq!(model.market_cap, "0");
        assert_eq!(model.fully_diluted_value, "0");
        assert_eq!(model.rank, "-");
    }

    #[test]
    fn test_volume_ratio_uses_the_derived_cap() {
        let detail = detail_with(100.0, 1e6, 1e6, 1e6, 25e6);
        let stats = derive_stats(&detail, "usd");

        // cap = 100 * 1e6 = 1e8, volume = 25e6 -> 25%
        assert!((stats.volume_to_cap_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_diluted_value_is_price_times_total_supply() {
        let detail = detail_with(100.0, 1e6, 2e6, 4e6, 0.0);
        let stats = derive_stats(&detail, "usd");

        assert_eq!(stats.fully_diluted_value, 200e6);
        assert!((stats.issued_pct_of_max - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_max_supply_guards_the_issued_percentage() {
        let detail = detail_with(100.0, 1e6, 2e6, 0.0, 0.0);
        let stats = derive_stats(&detail, "usd");
        assert_eq!(stats.issued_pct_of_max, 0.0);
    }

    #[test]
    fn test_chart_rows_carry_formatted_dates() {
        let detail = detail_with(100.0, 1e6, 1e6, 1e6, 0.0);
        let ohlc = vec![OhlcPoint {
            timestamp: 1700000000000,
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
        }];

        let model = assemble(&detail, &ohlc, "usd");
        assert_eq!(model.chart.len(), 1);
        assert!(model.chart[0].date.starts_with("2023-11-14"));
        assert_eq!(model.chart[0].close, 105.0);
    }

    #[test]
    fn test_format_with_commas_groups_thousands() {
        assert_eq!(format_with_commas(1234567.891), "1,234,567.89");
        assert_eq!(format_with_commas(0.5), "0.50");
        assert_eq!(format_with_commas(999.0), "999.00");
    }

    #[test]
    fn test_format_large_number_tiers() {
        assert_eq!(format_large_number(1.5e12), "1.50T");
        assert_eq!(format_large_number(900e9), "900.00B");
        assert_eq!(format_large_number(12.3e6), "12.30M");
        assert_eq!(format_large_number(999999.0), "999999");
        assert_eq!(format_large_number(0.0), "0");
    }

    #[test]
    fn test_format_signed_percent() {
        assert_eq!(format_signed_percent(5.2), "+5.20%");
        assert_eq!(format_signed_percent(-2.1), "-2.10%");
        assert_eq!(format_signed_percent(0.0), "+0.00%");
    }

    #[test]
    fn test_format_price_symbols() {
        assert_eq!(format_price(50000.0, "usd"), "$50,000.00");
        assert_eq!(format_price(46000.0, "eur"), "€46,000.00");
        assert_eq!(format_price(100.0, "sek"), "100.00 SEK");
    }
}
