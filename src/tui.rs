use crate::candles::CandleChart;
use crate::detail::{
    assemble, format_price, format_signed_percent, format_with_commas, DisplayModel,
};
use crate::gecko::{CoinDetail, CoinSummary, GeckoClient, Lookback, OhlcPoint};
use crate::market::{
    filter_and_sort, toggle_sort, visible_window, CapBucket, FilterSpec, MarketFeed, PerfSign,
    SortKey, SortSpec,
};
use crate::tracker::{save_items, Tag, TrackedItem, TrackerStore};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Tabs, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tui_big_text::{BigText, PixelSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Markets,
    Watchlist,
    Portfolio,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Markets => "Markets",
            Tab::Watchlist => "Watchlist",
            Tab::Portfolio => "Portfolio",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Markets, Tab::Watchlist, Tab::Portfolio]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    Search,
    RangeInput,
}

/// One fetch the event loop still has to hand to a background task.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Page {
        page: u32,
        per_page: u32,
    },
    Detail {
        id: String,
        generation: u64,
    },
    Chart {
        id: String,
        lookback: Lookback,
        generation: u64,
    },
}

/// Result of a background fetch, delivered over the update channel.
///
/// Detail and chart results carry the generation their request was issued
/// under; the app discards any result whose generation is no longer
/// current, so a slow response can never overwrite a newer view.
pub enum FetchEvent {
    Page(crate::error::Result<Vec<CoinSummary>>),
    Detail {
        generation: u64,
        result: crate::error::Result<Box<CoinDetail>>,
    },
    Chart {
        generation: u64,
        result: crate::error::Result<Vec<OhlcPoint>>,
    },
}

/// State of the coin detail screen while it is open.
#[derive(Debug)]
pub struct DetailView {
    pub coin_id: String,
    pub title: String,
    pub model: Option<DisplayModel>,
    pub ohlc: Vec<OhlcPoint>,
    pub lookback: Lookback,
    pub loading_detail: bool,
    pub loading_chart: bool,
    pub detail_error: Option<String>,
    pub chart_error: Option<String>,
}

pub struct App {
    pub current_tab: Tab,
    pub mode: AppMode,
    pub should_quit: bool,
    pub currency: String,
    pub feed: MarketFeed,
    pub filter: FilterSpec,
    pub sort: Option<SortSpec>,
    pub range_input: String,
    pub selected_row: usize,
    pub scroll_offset: usize,
    pub store: TrackerStore,
    pub tracker_file: PathBuf,
    pub detail: Option<DetailView>,
    pub default_lookback: Lookback,
    pub detail_generation: u64,
    pub chart_generation: u64,
    pub pending: Vec<FetchRequest>,
    pub error_message: Option<String>,
    pub flash_message: Option<(String, Instant)>,
    pub flash_state: bool,
    pub last_tick: Instant,
    pub client: GeckoClient,
    pub events: Option<mpsc::UnboundedReceiver<FetchEvent>>,
}

impl App {
    pub fn new(
        client: GeckoClient,
        store: TrackerStore,
        tracker_file: PathBuf,
        page_size: u32,
        default_lookback: Lookback,
    ) -> App {
        App {
            current_tab: Tab::Markets,
            mode: AppMode::Normal,
            should_quit: false,
            currency: client.currency().to_string(),
            feed: MarketFeed::new(page_size),
            filter: FilterSpec::default(),
            sort: None,
            range_input: String::new(),
            selected_row: 0,
            scroll_offset: 0,
            store,
            tracker_file,
            detail: None,
            default_lookback,
            detail_generation: 0,
            chart_generation: 0,
            pending: Vec::new(),
            error_message: None,
            flash_message: None,
            flash_state: false,
            last_tick: Instant::now(),
            client,
            events: None,
        }
    }

    pub fn set_event_receiver(&mut self, receiver: mpsc::UnboundedReceiver<FetchEvent>) {
        self.events = Some(receiver);
    }

    pub fn try_receive_event(&mut self) -> Option<FetchEvent> {
        self.events.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Folds a finished background fetch into the state. Detail and chart
    /// results from a superseded request are dropped.
    pub fn apply_event(&mut self, event: FetchEvent) {
        match event {
            FetchEvent::Page(result) => {
                self.feed.apply_page(result);
            }
            FetchEvent::Detail { generation, result } => {
                if generation != self.detail_generation {
                    return;
                }
                if let Some(view) = &mut self.detail {
                    view.loading_detail = false;
                    match result {
                        Ok(detail) => {
                            view.model = Some(assemble(&detail, &[], &self.currency));
                        }
                        Err(e) => view.detail_error = Some(e.to_string()),
                    }
                }
            }
            FetchEvent::Chart { generation, result } => {
                if generation != self.chart_generation {
                    return;
                }
                if let Some(view) = &mut self.detail {
                    view.loading_chart = false;
                    match result {
                        Ok(points) => view.ohlc = points,
                        Err(e) => view.chart_error = Some(e.to_string()),
                    }
                }
            }
        }
    }

    /// Claims the next page once the end of the rendered rows is in view.
    /// Also covers the very first load, when no rows exist at all.
    pub fn maybe_request_next_page(&mut self, viewport_rows: usize) {
        if self.current_tab != Tab::Markets || self.detail.is_some() {
            return;
        }
        let total = self.filtered_rows().len();
        let window = visible_window(self.scroll_offset, viewport_rows, total);
        if window.end >= total && self.feed.should_fetch() {
            let page = self.feed.begin_fetch();
            self.pending.push(FetchRequest::Page {
                page,
                per_page: self.feed.page_size(),
            });
        }
    }

    pub fn take_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.pending)
    }

    pub fn filtered_rows(&self) -> Vec<&CoinSummary> {
        filter_and_sort(&self.feed.coins, &self.filter, self.sort)
    }

    pub fn current_rows_len(&self) -> usize {
        match self.current_tab {
            Tab::Markets => self.filtered_rows().len(),
            Tab::Watchlist => self.store.by_tag(Tag::Watchlist).len(),
            Tab::Portfolio => self.store.by_tag(Tag::Portfolio).len(),
        }
    }

    /// The coin under the cursor on whichever list is showing.
    pub fn selected_coin(&self) -> Option<CoinSummary> {
        match self.current_tab {
            Tab::Markets => self
                .filtered_rows()
                .get(self.selected_row)
                .map(|c| (*c).clone()),
            Tab::Watchlist => self
                .store
                .by_tag(Tag::Watchlist)
                .get(self.selected_row)
                .map(|item| item.coin.clone()),
            Tab::Portfolio => self
                .store
                .by_tag(Tag::Portfolio)
                .get(self.selected_row)
                .map(|item| item.coin.clone()),
        }
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + 1) % tabs.len()];
        self.reset_selection();
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + tabs.len() - 1) % tabs.len()];
        self.reset_selection();
    }

    pub fn select_next(&mut self) {
        if self.selected_row + 1 < self.current_rows_len() {
            self.selected_row += 1;
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected_row > 0 {
            self.selected_row -= 1;
        }
    }

    pub fn ensure_visible(&mut self, viewport_rows: usize) {
        if viewport_rows == 0 {
            return;
        }
        if self.selected_row < self.scroll_offset {
            self.scroll_offset = self.selected_row;
        } else if self.selected_row >= self.scroll_offset + viewport_rows {
            self.scroll_offset = self.selected_row + 1 - viewport_rows;
        }
    }

    fn reset_selection(&mut self) {
        self.selected_row = 0;
        self.scroll_offset = 0;
    }

    pub fn search_push(&mut self, c: char) {
        self.filter.search_text.push(c);
        self.reset_selection();
    }

    pub fn search_pop(&mut self) {
        self.filter.search_text.pop();
        self.reset_selection();
    }

    pub fn cycle_cap_bucket(&mut self) {
        self.filter.bucket = self.filter.bucket.next();
        self.reset_selection();
    }

    pub fn cycle_performance(&mut self) {
        self.filter.performance = self.filter.performance.next();
        self.reset_selection();
    }

    pub fn toggle_sort_key(&mut self, key: SortKey) {
        if self.current_tab != Tab::Markets {
            return;
        }
        self.sort = Some(toggle_sort(self.sort, key));
    }

    pub fn clear_filters(&mut self) {
        self.filter = FilterSpec::default();
        self.sort = None;
        self.reset_selection();
    }

    pub fn enter_range_mode(&mut self) {
        self.mode = AppMode::RangeInput;
        self.range_input.clear();
    }

    pub fn exit_input_mode(&mut self) {
        self.mode = AppMode::Normal;
        self.range_input.clear();
    }

    /// Parses the `min,max` dialog input into the price range filter. An
    /// empty input resets the range; an empty side leaves that bound open.
    pub fn apply_range_input(&mut self) -> Result<(), String> {
        let input = self.range_input.trim().to_string();
        if input.is_empty() {
            self.filter.price_range = (0.0, f64::MAX);
            self.exit_input_mode();
            self.reset_selection();
            return Ok(());
        }

        let (min_part, max_part) = input
            .split_once(',')
            .ok_or_else(|| "Expected a range in the form min,max".to_string())?;

        let min = parse_bound(min_part, 0.0)?;
        let max = parse_bound(max_part, f64::MAX)?;
        if min > max {
            return Err("Minimum price exceeds maximum".to_string());
        }

        self.filter.price_range = (min, max);
        self.exit_input_mode();
        self.reset_selection();
        Ok(())
    }

    /// Watch the coin under the cursor, or flip its star when it is
    /// already on the watchlist. The entry itself stays either way.
    pub fn toggle_watch(&mut self) {
        let Some(coin) = self.selected_coin() else {
            return;
        };
        if self.store.contains(&coin.id, Tag::Watchlist) {
            self.store.toggle_selected(&coin.id);
            if self.store.is_starred(&coin.id) {
                self.set_flash(format!("Starred {}", coin.name));
            } else {
                self.set_flash(format!("Unstarred {}", coin.name));
            }
        } else {
            self.store.add(TrackedItem::watchlist(coin.clone()));
            self.set_flash(format!("Watching {}", coin.name));
        }
        self.persist_tracker();
    }

    /// Records one unit of the coin under the cursor at its current list
    /// price. Adding a coin held already changes nothing.
    pub fn add_holding(&mut self) {
        let Some(coin) = self.selected_coin() else {
            return;
        };
        let item = TrackedItem::holding(coin.clone(), coin.current_price, 1.0);
        if self.store.add(item) {
            self.set_flash(format!("Added {} to portfolio", coin.name));
            self.persist_tracker();
        } else {
            self.set_flash(format!("{} is already in the portfolio", coin.name));
        }
    }

    fn persist_tracker(&mut self) {
        if let Err(e) = save_items(&self.store, &self.tracker_file) {
            self.error_message = Some(format!("Failed to save tracker file: {e}"));
        }
    }

    /// Opens the detail screen and queues the two independent fetches,
    /// each under a fresh generation.
    pub fn open_detail(&mut self, coin: &CoinSummary) {
        self.detail_generation += 1;
        self.chart_generation += 1;
        self.detail = Some(DetailView {
            coin_id: coin.id.clone(),
            title: coin.name.clone(),
            model: None,
            ohlc: Vec::new(),
            lookback: self.default_lookback,
            loading_detail: true,
            loading_chart: true,
            detail_error: None,
            chart_error: None,
        });
        self.pending.push(FetchRequest::Detail {
            id: coin.id.clone(),
            generation: self.detail_generation,
        });
        self.pending.push(FetchRequest::Chart {
            id: coin.id.clone(),
            lookback: self.default_lookback,
            generation: self.chart_generation,
        });
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    /// Steps the chart window and refetches it under a new generation, so
    /// a late response for the old window cannot appear in the new one.
    pub fn change_lookback(&mut self, forward: bool) {
        let Some(view) = self.detail.as_mut() else {
            return;
        };
        view.lookback = if forward {
            view.lookback.next()
        } else {
            view.lookback.previous()
        };
        view.ohlc.clear();
        view.loading_chart = true;
        view.chart_error = None;
        let id = view.coin_id.clone();
        let lookback = view.lookback;
        self.chart_generation += 1;
        self.pending.push(FetchRequest::Chart {
            id,
            lookback,
            generation: self.chart_generation,
        });
    }

    /// The error shown in the popup, if any. Local messages win over the
    /// feed error, which wins over the detail screen's two fetch errors.
    pub fn current_error(&self) -> Option<String> {
        if let Some(message) = &self.error_message {
            return Some(message.clone());
        }
        if let Some(message) = self.feed.error() {
            return Some(message.to_string());
        }
        let view = self.detail.as_ref()?;
        if let Some(message) = &view.detail_error {
            return Some(message.clone());
        }
        view.chart_error.clone()
    }

    /// Clears one error site per press, in popup priority order.
    pub fn dismiss_error(&mut self) {
        if self.error_message.take().is_some() {
            return;
        }
        if self.feed.error().is_some() {
            self.feed.dismiss_error();
            return;
        }
        if let Some(view) = &mut self.detail {
            if view.detail_error.take().is_some() {
                return;
            }
            view.chart_error = None;
        }
    }

    pub fn set_flash(&mut self, message: String) {
        self.flash_message = Some((message, Instant::now()));
    }

    /// Advances the cursor blink and expires stale flash messages.
    pub fn tick(&mut self) {
        if self.last_tick.elapsed() >= Duration::from_millis(500) {
            self.flash_state = !self.flash_state;
            self.last_tick = Instant::now();
        }
        if let Some((_, since)) = &self.flash_message {
            if since.elapsed() >= Duration::from_secs(3) {
                self.flash_message = None;
            }
        }
    }

    /// Live figures for a tracked coin when the market list has them,
    /// falling back to the snapshot taken when it was added.
    fn live_coin<'a>(&'a self, item: &'a TrackedItem) -> &'a CoinSummary {
        self.feed
            .coins
            .iter()
            .find(|c| c.id == item.id)
            .unwrap_or(&item.coin)
    }
}

fn parse_bound(part: &str, open_value: f64) -> Result<f64, String> {
    let trimmed = part.trim();
    if trimmed.is_empty() {
        return Ok(open_value);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| format!("'{trimmed}' is not a number"))
}

// Rows a list table can show once tab bar, chrome and help are taken out.
fn list_viewport_rows(current_tab: Tab, total_height: u16) -> usize {
    let chrome = match current_tab {
        Tab::Markets => 11,
        Tab::Watchlist => 10,
        Tab::Portfolio => 18,
    };
    total_height.saturating_sub(chrome).max(1) as usize
}

fn spawn_fetch(
    request: FetchRequest,
    client: GeckoClient,
    sender: mpsc::UnboundedSender<FetchEvent>,
) {
    tokio::spawn(async move {
        let event = match request {
            FetchRequest::Page { page, per_page } => {
                FetchEvent::Page(client.fetch_markets(page, per_page).await)
            }
            FetchRequest::Detail { id, generation } => FetchEvent::Detail {
                generation,
                result: client.fetch_detail(&id).await.map(Box::new),
            },
            FetchRequest::Chart {
                id,
                lookback,
                generation,
            } => FetchEvent::Chart {
                generation,
                result: client.fetch_ohlc(&id, lookback).await,
            },
        };
        let _ = sender.send(event);
    });
}

pub async fn run_tui(
    client: GeckoClient,
    store: TrackerStore,
    tracker_file: PathBuf,
    page_size: u32,
    default_lookback: Lookback,
) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client, store, tracker_file, page_size, default_lookback);

    // Channel for results coming back from background fetch tasks
    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    app.set_event_receiver(event_receiver);

    let res = run_app(&mut terminal, &mut app, event_sender).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    sender: mpsc::UnboundedSender<FetchEvent>,
) -> io::Result<()>
where
    io::Error: From<<B as Backend>::Error>,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        // Fold in finished fetches from background tasks (non-blocking)
        while let Some(fetch_event) = app.try_receive_event() {
            app.apply_event(fetch_event);
        }

        let viewport_rows = list_viewport_rows(app.current_tab, terminal.size()?.height);
        app.maybe_request_next_page(viewport_rows);
        for request in app.take_requests() {
            spawn_fetch(request, app.client.clone(), sender.clone());
        }

        app.tick();

        // Use poll to check for events with timeout
        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.mode {
                        AppMode::Normal => {
                            handle_normal_key(app, key.code);
                            app.ensure_visible(viewport_rows);
                        }
                        AppMode::Search => match key.code {
                            KeyCode::Enter | KeyCode::Esc => {
                                app.mode = AppMode::Normal;
                            }
                            KeyCode::Backspace => {
                                app.search_pop();
                            }
                            KeyCode::Char(c) => {
                                app.search_push(c);
                            }
                            _ => {}
                        },
                        AppMode::RangeInput => match key.code {
                            KeyCode::Esc => {
                                app.exit_input_mode();
                            }
                            KeyCode::Enter => {
                                if let Err(e) = app.apply_range_input() {
                                    app.error_message = Some(e);
                                    app.exit_input_mode();
                                }
                            }
                            KeyCode::Backspace => {
                                app.range_input.pop();
                            }
                            KeyCode::Char(c) => {
                                if c.is_ascii_digit()
                                    || c == '.'
                                    || (c == ',' && !app.range_input.contains(','))
                                {
                                    app.range_input.push(c);
                                }
                            }
                            _ => {}
                        },
                    }

                    for request in app.take_requests() {
                        spawn_fetch(request, app.client.clone(), sender.clone());
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn handle_normal_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Esc => {
            if app.detail.is_some() {
                app.close_detail();
            } else {
                app.should_quit = true;
            }
        }
        KeyCode::Backspace => {
            if app.detail.is_some() {
                app.close_detail();
            }
        }
        // Vim navigation - hjkl
        KeyCode::Char('h') | KeyCode::Left => {
            if app.detail.is_some() {
                app.change_lookback(false);
            } else {
                app.previous_tab();
            }
        }
        KeyCode::Char('l') | KeyCode::Right => {
            if app.detail.is_some() {
                app.change_lookback(true);
            } else {
                app.next_tab();
            }
        }
        KeyCode::Tab => {
            if app.detail.is_none() {
                app.next_tab();
            }
        }
        KeyCode::BackTab => {
            if app.detail.is_none() {
                app.previous_tab();
            }
        }
        KeyCode::Char('j') | KeyCode::Down => {
            if app.detail.is_none() {
                app.select_next();
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if app.detail.is_none() {
                app.select_previous();
            }
        }
        KeyCode::Enter => {
            if app.detail.is_none() {
                if let Some(coin) = app.selected_coin() {
                    app.open_detail(&coin);
                }
            }
        }
        KeyCode::Char('/') => {
            if app.detail.is_none() && app.current_tab == Tab::Markets {
                app.mode = AppMode::Search;
            }
        }
        KeyCode::Char('b') => {
            if app.detail.is_none() && app.current_tab == Tab::Markets {
                app.cycle_cap_bucket();
            }
        }
        KeyCode::Char('g') => {
            if app.detail.is_none() && app.current_tab == Tab::Markets {
                app.cycle_performance();
            }
        }
        KeyCode::Char('r') => {
            if app.detail.is_none() && app.current_tab == Tab::Markets {
                app.enter_range_mode();
            }
        }
        KeyCode::Char('x') => {
            if app.detail.is_none() && app.current_tab == Tab::Markets {
                app.clear_filters();
            }
        }
        KeyCode::Char('n') => app.toggle_sort_key(SortKey::Name),
        KeyCode::Char('s') => app.toggle_sort_key(SortKey::Symbol),
        KeyCode::Char('p') => app.toggle_sort_key(SortKey::Price),
        KeyCode::Char('m') => app.toggle_sort_key(SortKey::MarketCap),
        KeyCode::Char('c') => app.toggle_sort_key(SortKey::Change24h),
        KeyCode::Char('w') => {
            if app.detail.is_none() {
                app.toggle_watch();
            }
        }
        KeyCode::Char('a') => {
            if app.detail.is_none() {
                app.add_holding();
            }
        }
        KeyCode::Char('d') => {
            app.dismiss_error();
        }
        KeyCode::Char('1') => app.current_tab = Tab::Markets,
        KeyCode::Char('2') => app.current_tab = Tab::Watchlist,
        KeyCode::Char('3') => app.current_tab = Tab::Portfolio,
        _ => {}
    }
}

fn ui(f: &mut Frame, app: &App) {
    if app.detail.is_some() {
        render_detail(f, f.area(), app);
    } else {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(f.area());

        render_tab_bar(f, chunks[0], app);

        match app.current_tab {
            Tab::Markets => render_markets(f, chunks[1], app),
            Tab::Watchlist => render_watchlist(f, chunks[1], app),
            Tab::Portfolio => render_portfolio(f, chunks[1], app),
        }

        render_footer(f, chunks[2], app);
    }

    if app.mode == AppMode::RangeInput {
        render_range_dialog(f, app);
    }

    if let Some(error) = app.current_error() {
        render_error_popup(f, &error);
    }
}

fn render_tab_bar(f: &mut Frame, area: Rect, app: &App) {
    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title("coinfolio"))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );

    f.render_widget(tabs, area);
}

fn render_markets(f: &mut Frame, area: Rect, app: &App) {
    let rows_all = app.filtered_rows();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    render_count_line(f, chunks[0], app, rows_all.len());

    if app.feed.coins.is_empty() && app.feed.is_fetching() {
        render_loading(f, chunks[1], "Loading market data...");
        return;
    }

    let header_cells = [
        "  ".to_string(),
        sort_header(app, SortKey::Name),
        sort_header(app, SortKey::Symbol),
        sort_header(app, SortKey::Price),
        sort_header(app, SortKey::MarketCap),
        sort_header(app, SortKey::Change24h),
    ]
    .into_iter()
    .map(|h| {
        Cell::from(h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let viewport = list_viewport_rows(Tab::Markets, f.area().height);
    let window = visible_window(app.scroll_offset, viewport, rows_all.len());

    let rows = rows_all[window.clone()].iter().enumerate().map(|(i, coin)| {
        let absolute = window.start + i;
        let row_style = if absolute == app.selected_row {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };

        let marker = tracked_marker(app, &coin.id);
        let change_color = if coin.price_change_percentage_24h >= 0.0 {
            Color::Green
        } else {
            Color::Red
        };

        Row::new(vec![
            Cell::from(marker).style(Style::default().fg(Color::Yellow)),
            Cell::from(coin.name.clone()).style(Style::default().fg(Color::White)),
            Cell::from(coin.symbol.to_uppercase()).style(Style::default().fg(Color::Gray)),
            Cell::from(format_list_price(coin.current_price))
                .style(Style::default().fg(Color::White)),
            Cell::from(crate::detail::format_large_number(coin.market_cap))
                .style(Style::default().fg(Color::Gray)),
            Cell::from(format_signed_percent(coin.price_change_percentage_24h))
                .style(Style::default().fg(change_color)),
        ])
        .height(1)
        .style(row_style)
    });

    let constraints = [
        Constraint::Length(3),
        Constraint::Percentage(30),
        Constraint::Length(8),
        Constraint::Percentage(22),
        Constraint::Percentage(24),
        Constraint::Percentage(16),
    ];

    let table = Table::new(rows, constraints)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Markets"))
        .style(Style::default().fg(Color::White));

    f.render_widget(table, chunks[1]);
}

fn render_count_line(f: &mut Frame, area: Rect, app: &App, shown: usize) {
    let total = app.feed.coins.len();
    let mut spans = vec![Span::styled(
        format!("Showing {shown} out of {total} coins"),
        Style::default().fg(Color::White),
    )];

    if app.feed.is_fetching() {
        spans.push(Span::styled(
            "  fetching...",
            Style::default().fg(Color::Yellow),
        ));
    } else if !app.feed.has_more() {
        spans.push(Span::styled(
            "  end of listing",
            Style::default().fg(Color::DarkGray),
        ));
    }

    if !app.filter.search_text.is_empty() || app.mode == AppMode::Search {
        let cursor = if app.mode == AppMode::Search && app.flash_state {
            "█"
        } else {
            ""
        };
        spans.push(Span::styled(
            format!("  search: {}{}", app.filter.search_text, cursor),
            Style::default().fg(Color::Cyan),
        ));
    }
    if app.filter.bucket != CapBucket::All {
        spans.push(Span::styled(
            format!("  cap: {}", app.filter.bucket.label()),
            Style::default().fg(Color::Cyan),
        ));
    }
    if app.filter.performance != PerfSign::All {
        spans.push(Span::styled(
            format!("  {}", app.filter.performance.label()),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(badge) = range_badge(app.filter.price_range) {
        spans.push(Span::styled(
            format!("  {badge}"),
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(spec) = app.sort {
        spans.push(Span::styled(
            format!("  sort: {} {}", spec.key.label(), spec.direction.arrow()),
            Style::default().fg(Color::Magenta),
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn range_badge(range: (f64, f64)) -> Option<String> {
    let (min, max) = range;
    if min <= 0.0 && max == f64::MAX {
        return None;
    }
    if max == f64::MAX {
        Some(format!("price from {min}"))
    } else if min <= 0.0 {
        Some(format!("price up to {max}"))
    } else {
        Some(format!("price {min} to {max}"))
    }
}

fn sort_header(app: &App, key: SortKey) -> String {
    match app.sort {
        Some(spec) if spec.key == key => format!("{} {}", key.label(), spec.direction.arrow()),
        _ => key.label().to_string(),
    }
}

fn tracked_marker(app: &App, id: &str) -> String {
    let star = if app.store.is_starred(id) {
        '★'
    } else if app.store.contains(id, Tag::Watchlist) {
        '☆'
    } else {
        ' '
    };
    let held = if app.store.is_held(id) { '◆' } else { ' ' };
    format!("{star}{held}")
}

fn render_watchlist(f: &mut Frame, area: Rect, app: &App) {
    let items = app.store.by_tag(Tag::Watchlist);
    if items.is_empty() {
        let placeholder = Paragraph::new("Watchlist is empty - press w on a coin in Markets")
            .block(Block::default().borders(Borders::ALL).title("Watchlist"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    }

    let header_cells = ["  ", "Name", "Symbol", "Price", "24h %"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let viewport = list_viewport_rows(Tab::Watchlist, f.area().height);
    let window = visible_window(app.scroll_offset, viewport, items.len());

    let rows = items[window.clone()].iter().enumerate().map(|(i, item)| {
        let absolute = window.start + i;
        let row_style = if absolute == app.selected_row && app.current_tab == Tab::Watchlist {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };

        let coin = app.live_coin(item);
        let star = if item.selected { "★" } else { "☆" };
        let change_color = if coin.price_change_percentage_24h >= 0.0 {
            Color::Green
        } else {
            Color::Red
        };

        Row::new(vec![
            Cell::from(star).style(Style::default().fg(Color::Yellow)),
            Cell::from(coin.name.clone()).style(Style::default().fg(Color::White)),
            Cell::from(coin.symbol.to_uppercase()).style(Style::default().fg(Color::Gray)),
            Cell::from(format_list_price(coin.current_price))
                .style(Style::default().fg(Color::White)),
            Cell::from(format_signed_percent(coin.price_change_percentage_24h))
                .style(Style::default().fg(change_color)),
        ])
        .height(1)
        .style(row_style)
    });

    let constraints = [
        Constraint::Length(3),
        Constraint::Percentage(40),
        Constraint::Length(8),
        Constraint::Percentage(30),
        Constraint::Percentage(20),
    ];

    let table = Table::new(rows, constraints)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Watchlist"))
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

fn render_portfolio(f: &mut Frame, area: Rect, app: &App) {
    let items = app.store.by_tag(Tag::Portfolio);
    if items.is_empty() {
        let placeholder = Paragraph::new("Portfolio is empty - press a on a coin in Markets")
            .block(Block::default().borders(Borders::ALL).title("Portfolio"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    }

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    render_total_value(f, main_chunks[0], app);

    let lower_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[1]);

    render_holdings_table(f, lower_chunks[0], app, &items);
    render_allocation_list(f, lower_chunks[1], app);
}

fn render_total_value(f: &mut Frame, area: Rect, app: &App) {
    let total_value = app.store.holdings_value();
    let big_text_value = format_price(total_value, &app.currency);

    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![big_text_value.clone().into()])
        .build();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(
            "Total Holdings Value ({})",
            app.currency.to_uppercase()
        ))
        .title_alignment(Alignment::Center);
    f.render_widget(block, area);

    // Center the big text within the widget
    let inner = area.inner(ratatui::layout::Margin {
        horizontal: 1,
        vertical: 1,
    });
    let big_text_width = big_text_value.len() as u16 * 4;
    let centered_area = if big_text_width < inner.width {
        let margin = (inner.width - big_text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };

    f.render_widget(big_text, centered_area);
}

fn render_holdings_table(f: &mut Frame, area: Rect, app: &App, items: &[&TrackedItem]) {
    let header_cells = ["Name", "Quantity", "Buy Price", "Value"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let viewport = list_viewport_rows(Tab::Portfolio, f.area().height);
    let window = visible_window(app.scroll_offset, viewport, items.len());

    let rows = items[window.clone()].iter().enumerate().map(|(i, item)| {
        let absolute = window.start + i;
        let row_style = if absolute == app.selected_row && app.current_tab == Tab::Portfolio {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };

        Row::new(vec![
            Cell::from(item.coin.name.clone()).style(Style::default().fg(Color::White)),
            Cell::from(format_quantity(item.quantity.unwrap_or(0.0)))
                .style(Style::default().fg(Color::Gray)),
            Cell::from(format_list_price(item.price.unwrap_or(0.0)))
                .style(Style::default().fg(Color::Gray)),
            Cell::from(format_with_commas(item.value())).style(Style::default().fg(Color::White)),
        ])
        .height(1)
        .style(row_style)
    });

    let total_row = Row::new(vec![
        Cell::from("TOTAL").style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Cell::from(""),
        Cell::from(""),
        Cell::from(format_with_commas(app.store.holdings_value())).style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
    ])
    .height(1);

    let constraints = [
        Constraint::Percentage(35),
        Constraint::Percentage(20),
        Constraint::Percentage(20),
        Constraint::Percentage(25),
    ];

    let table = Table::new(rows.chain(std::iter::once(total_row)), constraints)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Holdings"))
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

fn render_allocation_list(f: &mut Frame, area: Rect, app: &App) {
    let mut allocation = app.store.allocation();
    allocation.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let items: Vec<ListItem> = allocation
        .iter()
        .map(|(name, percentage)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{name:<15}"), Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("{percentage:>8.2}%"),
                    Style::default().fg(Color::Cyan),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Allocation"))
        .style(Style::default().fg(Color::White));

    f.render_widget(list, area);
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let Some(view) = &app.detail else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(11),
            Constraint::Length(3),
        ])
        .split(area);

    render_detail_header(f, chunks[0], view);
    render_detail_chart(f, chunks[1], view);
    render_detail_stats(f, chunks[2], view);
    render_footer(f, chunks[3], app);
}

fn render_detail_header(f: &mut Frame, area: Rect, view: &DetailView) {
    let lines = match &view.model {
        Some(model) => {
            let change_color = if model.gaining {
                Color::Green
            } else {
                Color::Red
            };
            vec![
                Line::from(vec![
                    Span::styled(
                        format!("{} ({})", model.name, model.symbol),
                        Style::default()
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  rank {}", model.rank),
                        Style::default().fg(Color::Gray),
                    ),
                ]),
                Line::from(vec![
                    Span::styled(
                        model.price.clone(),
                        Style::default()
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  {}", model.price_change_24h),
                        Style::default().fg(change_color),
                    ),
                ]),
            ]
        }
        None if view.loading_detail => vec![
            Line::from(Span::styled(
                view.title.clone(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Loading...",
                Style::default().fg(Color::Yellow),
            )),
        ],
        None => vec![Line::from(Span::styled(
            view.title.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ))],
    };

    let header = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_detail_chart(f: &mut Frame, area: Rect, view: &DetailView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} (h/l to change) ", view.lookback.label()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if view.loading_chart {
        let loading = Paragraph::new("Loading chart...")
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(loading, inner);
        return;
    }

    if view.ohlc.is_empty() {
        let empty = Paragraph::new("No chart data for this range")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(empty, inner);
        return;
    }

    let chart = CandleChart::new(&view.ohlc, inner.width, inner.height);
    f.render_widget(Paragraph::new(chart.lines()), inner);
}

fn render_detail_stats(f: &mut Frame, area: Rect, view: &DetailView) {
    let block = Block::default().borders(Borders::ALL).title("Statistics");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(model) = &view.model else {
        let placeholder = Paragraph::new("Statistics not loaded yet")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, inner);
        return;
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let left = vec![
        stat_line("Market Cap", &model.market_cap),
        stat_line("Cap Change 24h", &model.market_cap_change_24h),
        stat_line("Volume 24h", &model.volume_24h),
        stat_line("Volume / Cap", &model.volume_to_cap),
        stat_line("Fully Diluted", &model.fully_diluted_value),
        stat_line("High 24h", &model.high_24h),
        stat_line("Low 24h", &model.low_24h),
    ];
    let right = vec![
        stat_line("Circulating", &model.circulating_supply),
        stat_line("Total Supply", &model.total_supply),
        stat_line("Max Supply", &model.max_supply),
        stat_line("Issued of Max", &model.issued_pct_of_max),
        stat_line("ATH", &format!("{} ({})", model.ath, model.ath_change)),
        stat_line("ATL", &format!("{} ({})", model.atl, model.atl_change)),
    ];

    f.render_widget(Paragraph::new(left), columns[0]);
    f.render_widget(Paragraph::new(right), columns[1]);
}

fn stat_line(label: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<16}"), Style::default().fg(Color::Gray)),
        Span::styled(value.to_string(), Style::default().fg(Color::White)),
    ])
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    if let Some((message, _)) = &app.flash_message {
        let flash = Paragraph::new(message.clone())
            .block(Block::default().borders(Borders::ALL))
            .style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center);
        f.render_widget(flash, area);
        return;
    }

    let help_text = if app.detail.is_some() {
        "h/l (timeframe) | d (dismiss error) | Esc (back) | q (quit)"
    } else {
        match (app.mode, app.current_tab) {
            (AppMode::Search, _) => "Search: type to filter | Enter/Esc (done)",
            (AppMode::RangeInput, _) => "Range: min,max | Enter (apply) | Esc (cancel)",
            (_, Tab::Markets) => {
                "h/l (tabs) | j/k (move) | / (search) | b (cap) | g (sign) | r (range) | n s p m c (sort) | x (reset) | w (watch) | a (hold) | Enter (detail) | q (quit)"
            }
            (_, Tab::Watchlist) => "h/l (tabs) | j/k (move) | w (star) | Enter (detail) | q (quit)",
            (_, Tab::Portfolio) => "h/l (tabs) | j/k (move) | Enter (detail) | q (quit)",
        }
    };

    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);

    f.render_widget(help, area);
}

fn render_loading(f: &mut Frame, area: Rect, message: &str) {
    let loading_text = Paragraph::new(message.to_string())
        .block(Block::default().borders(Borders::ALL).title("Loading"))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    f.render_widget(loading_text, area);
}

fn render_range_dialog(f: &mut Frame, app: &App) {
    let popup_area = centered_rect(50, 30, f.area());
    f.render_widget(Clear, popup_area);

    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .margin(1)
        .split(popup_area);

    let main_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Price Range ")
        .title_alignment(Alignment::Center)
        .style(Style::default().bg(Color::Black));
    f.render_widget(main_block, popup_area);

    let current = match range_badge(app.filter.price_range) {
        Some(badge) => format!("Current: {badge}"),
        None => "Current: any price".to_string(),
    };
    let current_paragraph = Paragraph::new(current)
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(current_paragraph, popup_layout[0]);

    let cursor = if app.flash_state { "█" } else { "▌" };
    let input_field = Paragraph::new(format!("{}{}", app.range_input, cursor))
        .style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" min,max "),
        );
    f.render_widget(input_field, popup_layout[1]);

    let instructions = Paragraph::new("Leave a side empty to keep it open | Enter: Apply | Esc: Cancel")
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(instructions, popup_layout[2]);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(format!("{error}\n\nPress d to dismiss"))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn format_list_price(value: f64) -> String {
    if value >= 1000.0 {
        format_with_commas(value)
    } else if value >= 1.0 {
        format!("{value:.2}")
    } else if value >= 0.01 {
        format!("{value:.4}")
    } else {
        format!("{value:.8}")
    }
}

fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else if quantity >= 1.0 {
        format!("{quantity:.2}")
    } else {
        format!("{quantity:.8}")
    }
}
