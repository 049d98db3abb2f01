use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{arg, ArgMatches, Command};
use colored::Colorize;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::detail::assemble;
use crate::gecko::{CoinSummary, GeckoClient, Lookback};
use crate::market::{fetch_pages, filter_and_sort, FilterSpec};
use crate::tracker::{
    last_value_snapshot, load_items, save_items, store_value_snapshot, Tag, TrackedItem,
};

mod candles;
mod detail;
mod error;
mod gecko;
mod market;
mod report;
mod tracker;
mod tui;

#[derive(Serialize, Deserialize)]
struct Config {
    currency: String,
    page_size: u32,
    lookback_days: String,
    tracker_file: String,
    snapshot_db: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            page_size: 20,
            lookback_days: "30".to_string(),
            tracker_file: String::new(),
            snapshot_db: String::new(),
        }
    }
}

fn cli() -> Command {
    Command::new("coinfolio")
        .about("Track cryptocurrency markets, watchlists and mock portfolios")
        .arg_required_else_help(true)
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("markets")
                .about("Show the market listing, largest caps first")
                .arg(
                    arg!(--pages <N> "Number of pages to load")
                        .required(false)
                        .default_value("1"),
                ),
        )
        .subcommand(
            Command::new("coin")
                .about("Show detailed statistics and recent candles for one coin")
                .arg(arg!(<ID> "Coin id, e.g. bitcoin"))
                .arg(
                    arg!(--days <DAYS> "Chart window: 1, 7, 14, 30, 90, 180, 365 or max")
                        .required(false),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Add a coin to the watchlist")
                .arg(arg!(<ID> "Coin id, e.g. bitcoin")),
        )
        .subcommand(
            Command::new("add")
                .about("Record a mock holding at the current price")
                .arg(arg!(<ID> "Coin id, e.g. bitcoin"))
                .arg(arg!([QUANTITY] "Units held").default_value("1")),
        )
        .subcommand(Command::new("watchlist").about("Show the watchlist with fresh quotes"))
        .subcommand(Command::new("holdings").about("Show holdings, allocation and value change"))
        .subcommand(Command::new("tui").about("Start the interactive terminal UI"))
}

// The TUI owns the terminal, so its logs go to a file next to the config;
// plain subcommands log to stderr and keep stdout for the tables.
fn init_logging(
    interactive: bool,
) -> eyre::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if interactive {
        let log_dir = config_dir()?;
        let file_appender = tracing_appender::rolling::never(log_dir, "coinfolio.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    }
}

fn config_dir() -> eyre::Result<PathBuf> {
    let config_path = confy::get_configuration_file_path("coinfolio", "config")?;
    Ok(config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf())
}

// Paths left empty in the config land next to the config file.
fn data_path(configured: &str, file_name: &str) -> eyre::Result<PathBuf> {
    if !configured.is_empty() {
        return Ok(PathBuf::from(configured));
    }
    Ok(config_dir()?.join(file_name))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load("coinfolio", "config")?;
    let matches = cli().get_matches();

    let interactive = matches.subcommand_name() == Some("tui");
    let _log_guard = init_logging(interactive)?;

    let client = GeckoClient::new(&cfg.currency);
    let tracker_file = data_path(&cfg.tracker_file, "tracker.json")?;
    let default_lookback = Lookback::from_query(&cfg.lookback_days).unwrap_or(Lookback::Month);

    match matches.subcommand() {
        Some(("config", _)) => {
            println!(
                "Your config file is located here: \n{}",
                confy::get_configuration_file_path("coinfolio", "config")?.display()
            );
        }
        Some(("markets", sub)) => run_markets(&client, &cfg, &tracker_file, sub).await?,
        Some(("coin", sub)) => run_coin(&client, default_lookback, sub).await?,
        Some(("watch", sub)) => run_watch(&client, &tracker_file, sub).await?,
        Some(("add", sub)) => run_add(&client, &tracker_file, sub).await?,
        Some(("watchlist", _)) => run_watchlist(&client, &tracker_file).await?,
        Some(("holdings", _)) => run_holdings(&client, &cfg, &tracker_file).await?,
        Some(("tui", _)) => {
            let store = load_items(&tracker_file)?;
            tui::run_tui(
                client,
                store,
                tracker_file,
                cfg.page_size,
                default_lookback,
            )
            .await
            .map_err(|e| eyre::eyre!("{e}"))?;
        }
        _ => {}
    }

    Ok(())
}

async fn run_markets(
    client: &GeckoClient,
    cfg: &Config,
    tracker_file: &Path,
    sub: &ArgMatches,
) -> eyre::Result<()> {
    let pages: u32 = sub
        .get_one::<String>("pages")
        .map(String::as_str)
        .unwrap_or("1")
        .parse()?;

    let feed = fetch_pages(client, cfg.page_size, pages).await;
    if let Some(message) = feed.error() {
        eprintln!("{}", format!("Warning: {message}").yellow());
    }

    let rows = filter_and_sort(&feed.coins, &FilterSpec::default(), None);
    let store = load_items(tracker_file)?;
    report::print_market_table(&rows, &store);
    println!("Showing {} out of {} coins", rows.len(), feed.coins.len());

    Ok(())
}

async fn run_coin(
    client: &GeckoClient,
    default_lookback: Lookback,
    sub: &ArgMatches,
) -> eyre::Result<()> {
    let Some(id) = sub.get_one::<String>("ID") else {
        return Ok(());
    };
    let lookback = match sub.get_one::<String>("days") {
        Some(days) => Lookback::from_query(days)
            .ok_or_else(|| eyre::eyre!("'{days}' is not a valid chart window"))?,
        None => default_lookback,
    };

    // statistics and chart are independent; fetch them at the same time
    let (detail_result, ohlc_result) =
        futures::join!(client.fetch_detail(id), client.fetch_ohlc(id, lookback));

    let detail = detail_result?;
    let ohlc = match ohlc_result {
        Ok(points) => points,
        Err(e) => {
            eprintln!("{}", format!("Warning: no chart data: {e}").yellow());
            Vec::new()
        }
    };

    let model = assemble(&detail, &ohlc, client.currency());
    report::print_detail(&model, client.currency());
    report::print_recent_candles(&model.chart, 10);

    Ok(())
}

async fn run_watch(
    client: &GeckoClient,
    tracker_file: &Path,
    sub: &ArgMatches,
) -> eyre::Result<()> {
    let Some(id) = sub.get_one::<String>("ID") else {
        return Ok(());
    };

    let mut store = load_items(tracker_file)?;
    let detail = client.fetch_detail(id).await?;
    let coin = detail.to_summary(client.currency());

    if store.add(TrackedItem::watchlist(coin)) {
        save_items(&store, tracker_file)?;
        println!("{}", format!("Watching {}", detail.name).green());
    } else {
        println!("{} is already on the watchlist", detail.name);
    }

    Ok(())
}

async fn run_add(client: &GeckoClient, tracker_file: &Path, sub: &ArgMatches) -> eyre::Result<()> {
    let Some(id) = sub.get_one::<String>("ID") else {
        return Ok(());
    };
    let quantity: f64 = sub
        .get_one::<String>("QUANTITY")
        .map(String::as_str)
        .unwrap_or("1")
        .parse()?;
    if quantity <= 0.0 {
        eyre::bail!("quantity must be positive");
    }

    let mut store = load_items(tracker_file)?;
    let detail = client.fetch_detail(id).await?;
    let price = detail.ticker_price();
    let coin = detail.to_summary(client.currency());

    if store.add(TrackedItem::holding(coin, price, quantity)) {
        save_items(&store, tracker_file)?;
        println!(
            "{}",
            format!("Added {} {} at {:.2}", quantity, detail.name, price).green()
        );
    } else {
        println!("{} is already in the portfolio", detail.name);
    }

    Ok(())
}

async fn run_watchlist(client: &GeckoClient, tracker_file: &Path) -> eyre::Result<()> {
    let store = load_items(tracker_file)?;
    let items = store.by_tag(Tag::Watchlist);
    if items.is_empty() {
        println!("Watchlist is empty. Add a coin with: coinfolio watch <ID>");
        return Ok(());
    }

    let refreshed = fetch_quotes(client, &items).await;
    let display: Vec<TrackedItem> = items
        .iter()
        .map(|item| {
            let mut item = (*item).clone();
            if let Some(coin) = refreshed.get(&item.id) {
                item.coin = coin.clone();
            }
            item
        })
        .collect();
    let rows: Vec<&TrackedItem> = display.iter().collect();
    report::print_watchlist(&rows);

    Ok(())
}

async fn run_holdings(
    client: &GeckoClient,
    cfg: &Config,
    tracker_file: &Path,
) -> eyre::Result<()> {
    let store = load_items(tracker_file)?;
    let holdings = store.by_tag(Tag::Portfolio);
    if holdings.is_empty() {
        println!("No holdings yet. Record one with: coinfolio add <ID>");
        return Ok(());
    }

    let refreshed = fetch_quotes(client, &holdings).await;
    let rows: Vec<(&TrackedItem, f64)> = holdings
        .iter()
        .map(|item| {
            let live = refreshed
                .get(&item.id)
                .map(|coin| coin.current_price)
                .or(item.price)
                .unwrap_or(0.0);
            (*item, live)
        })
        .collect();

    report::print_holdings(&rows);

    let values: Vec<(String, f64)> = rows
        .iter()
        .map(|(item, live)| (item.coin.name.clone(), live * item.quantity.unwrap_or(0.0)))
        .collect();
    report::draw_pie_chart(&values);

    let total: f64 = values.iter().map(|(_, value)| value).sum();
    if total > 0.0 {
        let allocation: Vec<(String, f64)> = values
            .iter()
            .map(|(name, value)| (name.clone(), value / total * 100.0))
            .collect();
        report::print_allocation(&allocation);
    }

    let db_path = data_path(&cfg.snapshot_db, "snapshots")?;
    match last_value_snapshot(&db_path) {
        Ok(Some(previous)) if previous > 0.0 => {
            let delta = (total - previous) / previous * 100.0;
            let line = format!("Since last check: {delta:+.2}%");
            if delta >= 0.0 {
                println!("{}", line.green());
            } else {
                println!("{}", line.red());
            }
        }
        Ok(_) => {}
        Err(e) => eprintln!("Error reading the snapshot database: {e}"),
    }
    if let Err(e) = store_value_snapshot(&db_path, total) {
        eprintln!("Error storing the value snapshot: {e}");
    }

    Ok(())
}

// Fetches a fresh quote for every tracked item in parallel. Items whose
// fetch fails keep their stored snapshot.
async fn fetch_quotes(
    client: &GeckoClient,
    items: &[&TrackedItem],
) -> HashMap<String, CoinSummary> {
    let tasks: Vec<_> = items
        .iter()
        .map(|item| {
            let client = client.clone();
            let id = item.id.clone();
            tokio::spawn(async move {
                let result = client
                    .fetch_detail(&id)
                    .await
                    .map(|detail| detail.to_summary(client.currency()));
                (id, result)
            })
        })
        .collect();

    let mut quotes = HashMap::new();
    for task in tasks {
        match task.await {
            Ok((id, Ok(coin))) => {
                quotes.insert(id, coin);
            }
            Ok((id, Err(e))) => eprintln!("Error fetching {id}: {e}"),
            Err(e) => eprintln!("Error fetching quote: {e:?}"),
        }
    }
    quotes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        let matches = cli().get_matches_from(vec!["coinfolio", "coin", "bitcoin"]);
        assert_eq!(matches.subcommand_name(), Some("coin"));
        let sub = matches.subcommand_matches("coin").unwrap();
        assert_eq!(sub.get_one::<String>("ID").unwrap(), "bitcoin");
    }

    #[test]
    fn test_cli_add_defaults_to_one_unit() {
        let matches = cli().get_matches_from(vec!["coinfolio", "add", "ethereum"]);
        let sub = matches.subcommand_matches("add").unwrap();
        assert_eq!(sub.get_one::<String>("QUANTITY").unwrap(), "1");
    }

    #[test]
    fn test_cli_markets_page_flag() {
        let matches = cli().get_matches_from(vec!["coinfolio", "markets", "--pages", "3"]);
        let sub = matches.subcommand_matches("markets").unwrap();
        assert_eq!(sub.get_one::<String>("pages").unwrap(), "3");
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.currency, "usd");
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.lookback_days, "30");
        assert!(cfg.tracker_file.is_empty());
    }
}
