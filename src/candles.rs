//! Text candlestick chart for the detail screen.
//!
//! Each candle occupies one terminal column; every cell of that column is
//! mapped to a price band and drawn with the half-block glyph that best
//! covers the overlap of body and wick with the band.

use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::gecko::OhlcPoint;

const BODY: char = '┃';
const BODY_UPPER_HALF: char = '╹';
const BODY_LOWER_HALF: char = '╻';
const WICK: char = '│';
const WICK_UPPER_HALF: char = '╵';
const WICK_LOWER_HALF: char = '╷';
// body in one half of the cell, wick continuing through the other
const WICK_ABOVE_BODY: char = '╽';
const WICK_BELOW_BODY: char = '╿';

const BULLISH: Color = Color::Rgb(52, 208, 88);
const BEARISH: Color = Color::Rgb(234, 74, 90);

// A wide price gutter wastes chart columns on narrow terminals.
const NARROW_WIDTH: u16 = 80;
const Y_AXIS_WIDTH: u16 = 12;
const Y_AXIS_WIDTH_NARROW: u16 = 8;

/// Candlestick chart laid out for one drawing area, rendered as text lines.
pub struct CandleChart<'a> {
    candles: &'a [OhlcPoint],
    min_price: f64,
    max_price: f64,
    width: u16,
    height: u16,
    y_axis_width: u16,
}

impl<'a> CandleChart<'a> {
    /// Fits the most recent candles into the area, one column each, keeping
    /// two rows for the time axis.
    pub fn new(candles: &'a [OhlcPoint], area_width: u16, area_height: u16) -> CandleChart<'a> {
        let y_axis_width = if area_width < NARROW_WIDTH {
            Y_AXIS_WIDTH_NARROW
        } else {
            Y_AXIS_WIDTH
        };
        let width = area_width.saturating_sub(y_axis_width).max(1);
        let height = area_height.saturating_sub(2).max(1);

        let visible = if candles.len() > width as usize {
            &candles[candles.len() - width as usize..]
        } else {
            candles
        };
        let (min_price, max_price) = price_bounds(visible);

        CandleChart {
            candles: visible,
            min_price,
            max_price,
            width,
            height,
            y_axis_width,
        }
    }

    /// Chart rows from top to bottom, followed by the time axis.
    pub fn lines(&self) -> Vec<Line<'static>> {
        if self.candles.is_empty() {
            return Vec::new();
        }

        let band = (self.max_price - self.min_price) / self.height as f64;
        let mut lines = Vec::with_capacity(self.height as usize + 1);

        for row in 0..self.height {
            let high_edge = self.max_price - row as f64 * band;
            let low_edge = high_edge - band;

            let mut spans = Vec::with_capacity(self.candles.len() + 1);
            spans.push(Span::styled(
                self.price_label(row),
                Style::default().fg(Color::DarkGray),
            ));

            for candle in self.candles {
                let glyph = glyph_for_cell(candle, low_edge, high_edge);
                if glyph == ' ' {
                    spans.push(Span::raw(" "));
                } else {
                    spans.push(Span::styled(
                        glyph.to_string(),
                        Style::default().fg(candle_color(candle)),
                    ));
                }
            }

            lines.push(Line::from(spans));
        }

        lines.push(self.time_axis());
        lines
    }

    // Price ladder on the left, one label every fourth row.
    fn price_label(&self, row: u16) -> String {
        let value_width = self.y_axis_width.saturating_sub(3) as usize;
        if row % 4 == 0 {
            let band = (self.max_price - self.min_price) / self.height as f64;
            let price = self.max_price - row as f64 * band;
            format!("{price:>value_width$.2} │ ")
        } else {
            format!("{:>value_width$} │ ", "")
        }
    }

    fn time_axis(&self) -> Line<'static> {
        let first = self.candles.first().map(|c| c.timestamp).unwrap_or(0);
        let last = self.candles.last().map(|c| c.timestamp).unwrap_or(0);

        // intraday windows label by time, anything longer by date
        let span_ms = last.saturating_sub(first);
        let format = if span_ms < 2 * 24 * 3600 * 1000 {
            "%m-%d %H:%M"
        } else {
            "%Y-%m-%d"
        };

        let left = axis_timestamp(first, format);
        let right = axis_timestamp(last, format);

        let gutter = " ".repeat(self.y_axis_width as usize);
        let middle_width = (self.candles.len())
            .saturating_sub(left.chars().count() + right.chars().count());
        let text = format!("{gutter}{left}{}{right}", " ".repeat(middle_width));

        Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))
    }
}

fn axis_timestamp(timestamp_ms: i64, format: &str) -> String {
    match chrono::DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format(format).to_string(),
        None => String::new(),
    }
}

fn candle_color(candle: &OhlcPoint) -> Color {
    if candle.close >= candle.open {
        BULLISH
    } else {
        BEARISH
    }
}

/// The high/low span across the visible candles with a 2% margin so the
/// extremes never touch the chart border.
fn price_bounds(candles: &[OhlcPoint]) -> (f64, f64) {
    if candles.is_empty() {
        return (0.0, 1.0);
    }

    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for candle in candles {
        min = min.min(candle.low);
        max = max.max(candle.high);
    }

    let margin = (max - min) * 0.02;
    if margin > 0.0 {
        (min - margin, max + margin)
    } else {
        // flat series still needs a non-degenerate band
        (min - 1.0, max + 1.0)
    }
}

// Picks the glyph for one cell given the price band it covers. Body wins
// over wick; a half-covered cell uses the half-block pointing at the
// covered side, with transition glyphs when the wick fills the other half.
fn glyph_for_cell(candle: &OhlcPoint, low_edge: f64, high_edge: f64) -> char {
    let band = high_edge - low_edge;
    if band <= 0.0 {
        return ' ';
    }
    let center = (high_edge + low_edge) / 2.0;

    let body_top = candle.open.max(candle.close);
    let body_bottom = candle.open.min(candle.close);

    let body_cover = overlap(body_bottom, body_top, low_edge, high_edge) / band;
    if body_cover > 0.75 {
        return BODY;
    }
    if body_cover > 0.25 {
        let body_mid =
            (body_top.min(high_edge) + body_bottom.max(low_edge)) / 2.0;
        if body_mid > center {
            return if candle.low < center {
                WICK_BELOW_BODY
            } else {
                BODY_UPPER_HALF
            };
        }
        return if candle.high > center {
            WICK_ABOVE_BODY
        } else {
            BODY_LOWER_HALF
        };
    }

    let wick_cover = overlap(candle.low, candle.high, low_edge, high_edge) / band;
    if wick_cover > 0.75 {
        return WICK;
    }
    if wick_cover > 0.25 {
        let wick_mid =
            (candle.high.min(high_edge) + candle.low.max(low_edge)) / 2.0;
        return if wick_mid > center {
            WICK_UPPER_HALF
        } else {
            WICK_LOWER_HALF
        };
    }

    ' '
}

fn overlap(a_low: f64, a_high: f64, b_low: f64, b_high: f64) -> f64 {
    (a_high.min(b_high) - a_low.max(b_low)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> OhlcPoint {
        OhlcPoint {
            timestamp: 1700000000000,
            open,
            high,
            low,
            close,
        }
    }

    #[test]
    fn test_price_bounds_add_a_margin() {
        let candles = vec![candle(10.0, 20.0, 10.0, 15.0), candle(15.0, 30.0, 12.0, 28.0)];
        let (min, max) = price_bounds(&candles);
        assert!(min < 10.0);
        assert!(max > 30.0);
    }

    #[test]
    fn test_flat_series_keeps_a_nonzero_band() {
        let candles = vec![candle(10.0, 10.0, 10.0, 10.0)];
        let (min, max) = price_bounds(&candles);
        assert!(max > min);
    }

    #[test]
    fn test_body_fills_a_fully_covered_cell() {
        let c = candle(0.0, 10.0, 0.0, 10.0);
        assert_eq!(glyph_for_cell(&c, 4.0, 6.0), BODY);
    }

    #[test]
    fn test_wick_only_cell_draws_a_thin_line() {
        // body sits at 4..6, the wick reaches to 10
        let c = candle(4.0, 10.0, 4.0, 6.0);
        assert_eq!(glyph_for_cell(&c, 7.0, 9.0), WICK);
    }

    #[test]
    fn test_cell_outside_the_candle_stays_blank() {
        let c = candle(4.0, 6.0, 3.0, 5.0);
        assert_eq!(glyph_for_cell(&c, 8.0, 10.0), ' ');
    }

    #[test]
    fn test_half_covered_cell_uses_half_blocks() {
        // body top lands mid-cell with no wick above
        let c = candle(0.0, 5.0, 0.0, 5.0);
        assert_eq!(glyph_for_cell(&c, 4.0, 6.0), BODY_LOWER_HALF);

        // same shape but the wick continues through the upper half
        let c = candle(0.0, 10.0, 0.0, 5.0);
        assert_eq!(glyph_for_cell(&c, 4.0, 6.0), WICK_ABOVE_BODY);
    }

    #[test]
    fn test_bullish_and_bearish_colors() {
        assert_eq!(candle_color(&candle(10.0, 12.0, 9.0, 11.0)), BULLISH);
        assert_eq!(candle_color(&candle(11.0, 12.0, 9.0, 10.0)), BEARISH);
    }

    #[test]
    fn test_lines_cover_the_area_height() {
        let candles: Vec<OhlcPoint> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                OhlcPoint {
                    timestamp: 1700000000000 + i * 3600_000,
                    open: base,
                    high: base + 2.0,
                    low: base - 2.0,
                    close: base + 1.0,
                }
            })
            .collect();

        let chart = CandleChart::new(&candles, 80, 22);
        let lines = chart.lines();
        // 20 chart rows plus the time axis
        assert_eq!(lines.len(), 21);
    }

    #[test]
    fn test_empty_series_renders_nothing() {
        let chart = CandleChart::new(&[], 80, 22);
        assert!(chart.lines().is_empty());
    }

    #[test]
    fn test_only_the_most_recent_candles_fit() {
        let candles: Vec<OhlcPoint> = (0..500)
            .map(|i| OhlcPoint {
                timestamp: 1700000000000 + i * 3600_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
            })
            .collect();

        let chart = CandleChart::new(&candles, 80, 22);
        // 80 columns minus the price gutter
        assert_eq!(chart.candles.len(), 68);
    }
}
