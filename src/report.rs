//! Table and chart output for the CLI subcommands.

use colored::Colorize;
use piechart::{Chart, Color};

use crate::detail::{format_signed_percent, ChartCandle, DisplayModel};
use crate::gecko::CoinSummary;
use crate::tracker::{Tag, TrackedItem, TrackerStore};

// Print the market listing as a table
pub fn print_market_table(rows: &[&CoinSummary], store: &TrackerStore) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new(""),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Symbol").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("Market Cap").add_attribute(Attribute::Bold),
        Cell::new("24h %").add_attribute(Attribute::Bold),
    ]);

    let colorize_pct = |v: f64| {
        let c = if v >= 0.0 { TColor::Green } else { TColor::Red };
        Cell::new(format_signed_percent(v))
            .set_alignment(CellAlignment::Right)
            .fg(c)
    };

    for coin in rows {
        let marker = if store.is_starred(&coin.id) {
            "★"
        } else if store.contains(&coin.id, Tag::Watchlist) {
            "☆"
        } else if store.is_held(&coin.id) {
            "◆"
        } else {
            ""
        };

        table.add_row(vec![
            Cell::new(marker).fg(TColor::Yellow),
            Cell::new(&coin.name),
            Cell::new(coin.symbol.to_uppercase()),
            Cell::new(format!("{:.2}", coin.current_price)).set_alignment(CellAlignment::Right),
            Cell::new(crate::detail::format_large_number(coin.market_cap))
                .set_alignment(CellAlignment::Right),
            colorize_pct(coin.price_change_percentage_24h),
        ]);
    }

    println!("{table}");
}

pub fn print_watchlist(items: &[&TrackedItem]) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new(""),
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Symbol").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("24h %").add_attribute(Attribute::Bold),
    ]);

    for item in items {
        let star = if item.selected { "★" } else { "☆" };
        let change = item.coin.price_change_percentage_24h;
        let change_color = if change >= 0.0 {
            TColor::Green
        } else {
            TColor::Red
        };

        table.add_row(vec![
            Cell::new(star).fg(TColor::Yellow),
            Cell::new(&item.coin.name),
            Cell::new(item.coin.symbol.to_uppercase()),
            Cell::new(format!("{:.2}", item.coin.current_price))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_signed_percent(change))
                .set_alignment(CellAlignment::Right)
                .fg(change_color),
        ]);
    }

    println!("{table}");
}

// Print the holdings with live quotes as a table, TOTAL row last
pub fn print_holdings(rows: &[(&TrackedItem, f64)]) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Quantity").add_attribute(Attribute::Bold),
        Cell::new("Buy Price").add_attribute(Attribute::Bold),
        Cell::new("Invested").add_attribute(Attribute::Bold),
        Cell::new("Price").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
        Cell::new("PnL %").add_attribute(Attribute::Bold),
    ]);

    let colorize_pct = |v: f64| {
        let c = if v >= 0.0 { TColor::Green } else { TColor::Red };
        Cell::new(format!("{v:.2}%"))
            .set_alignment(CellAlignment::Right)
            .fg(c)
    };

    let mut total_invested = 0.0;
    let mut total_value = 0.0;

    for (item, live_price) in rows {
        let quantity = item.quantity.unwrap_or(0.0);
        let buy_price = item.price.unwrap_or(0.0);
        let invested = buy_price * quantity;
        let value = live_price * quantity;
        let pnl_pct = if invested > 0.0 {
            (value - invested) / invested * 100.0
        } else {
            0.0
        };

        total_invested += invested;
        total_value += value;

        table.add_row(vec![
            Cell::new(&item.coin.name),
            Cell::new(format!("{quantity:.4}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{buy_price:.2}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{invested:.2}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{live_price:.2}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{value:.2}")).set_alignment(CellAlignment::Right),
            colorize_pct(pnl_pct),
        ]);
    }

    let total_pnl_pct = if total_invested > 0.0 {
        (total_value - total_invested) / total_invested * 100.0
    } else {
        0.0
    };

    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(format!("{total_invested:.2}"))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(format!("{total_value:.2}"))
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
        colorize_pct(total_pnl_pct),
    ]);

    println!("{table}");
}

// Print the allocation in descending order %-wise
pub fn print_allocation(allocation: &[(String, f64)]) {
    let mut allocation_vec: Vec<&(String, f64)> = allocation.iter().collect();
    allocation_vec.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    println!("====================================");
    for (name, percentage) in allocation_vec {
        println!("{name: >12} | {percentage: >10.2}");
    }
}

pub fn draw_pie_chart(values: &[(String, f64)]) {
    let mut data = vec![];

    let colors = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Cyan,
        Color::White,
        Color::Purple,
        Color::Black,
    ];

    for (i, (name, value)) in values.iter().enumerate() {
        if *value <= 0.0 {
            continue;
        }
        data.push(piechart::Data {
            label: name.clone(),
            value: *value as f32,
            color: Some(colors[i % colors.len()].into()),
            fill: '•',
        });
    }

    if data.is_empty() {
        return;
    }

    Chart::new()
        .legend(true)
        .radius(9)
        .aspect_ratio(3)
        .draw(&data);
}

/// Prints the full detail panel: header, price line and the statistics
/// table assembled from the display model.
pub fn print_detail(model: &DisplayModel, currency: &str) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table,
    };

    let change = if model.gaining {
        model.price_change_24h.green()
    } else {
        model.price_change_24h.red()
    };

    println!(
        "{} ({})  rank {}",
        model.name.bold(),
        model.symbol,
        model.rank
    );
    println!(
        "{} {}  {}",
        model.price.bold(),
        currency.to_uppercase(),
        change
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    let row = |label: &str, value: &str| {
        vec![
            Cell::new(label).add_attribute(Attribute::Bold),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]
    };

    table.add_row(row("Market Cap", &model.market_cap));
    table.add_row(row("Cap Change 24h", &model.market_cap_change_24h));
    table.add_row(row("Volume 24h", &model.volume_24h));
    table.add_row(row("Volume / Cap", &model.volume_to_cap));
    table.add_row(row("Fully Diluted", &model.fully_diluted_value));
    table.add_row(row("Circulating Supply", &model.circulating_supply));
    table.add_row(row("Total Supply", &model.total_supply));
    table.add_row(row("Max Supply", &model.max_supply));
    table.add_row(row("Issued of Max", &model.issued_pct_of_max));
    table.add_row(row("High 24h", &model.high_24h));
    table.add_row(row("Low 24h", &model.low_24h));
    table.add_row(row(
        "ATH",
        &format!("{} ({})", model.ath, model.ath_change),
    ));
    table.add_row(row(
        "ATL",
        &format!("{} ({})", model.atl, model.atl_change),
    ));

    println!("{table}");
}

/// Prints the most recent candles of the fetched window, newest last.
pub fn print_recent_candles(candles: &[ChartCandle], limit: usize) {
    use comfy_table::{
        presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement,
        Table,
    };

    if candles.is_empty() {
        println!("No chart data for this range");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table.set_header(vec![
        Cell::new("Date").add_attribute(Attribute::Bold),
        Cell::new("Open").add_attribute(Attribute::Bold),
        Cell::new("High").add_attribute(Attribute::Bold),
        Cell::new("Low").add_attribute(Attribute::Bold),
        Cell::new("Close").add_attribute(Attribute::Bold),
    ]);

    let start = candles.len().saturating_sub(limit);
    for candle in &candles[start..] {
        let close_color = if candle.close >= candle.open {
            TColor::Green
        } else {
            TColor::Red
        };
        table.add_row(vec![
            Cell::new(&candle.date),
            Cell::new(format!("{:.2}", candle.open)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", candle.high)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", candle.low)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", candle.close))
                .set_alignment(CellAlignment::Right)
                .fg(close_color),
        ]);
    }

    println!("{table}");
}
