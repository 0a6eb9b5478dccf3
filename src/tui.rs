use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::analysis::{self, FailedSymbol, ScanReport, SymbolResult};
use crate::comfy_table::{format_optional, format_timestamp, get_visibility_ratio};
use crate::error::ScreenerError;
use crate::screener::{ScreenedRow, Thresholds};
use crate::storage_utils::AppConfig;

const MAX_INPUT_LEN: usize = 16;

// --- App State ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Volume,
    PriceChange,
}

/// Why a scan produced no report.
#[derive(Debug)]
enum ScanFailure {
    Scan(ScreenerError),
    /// The scan task panicked or was cancelled before sending anything.
    Aborted(JoinError),
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFailure::Scan(e @ ScreenerError::InvalidParameter(_)) => write!(f, "Invalid settings: {}", e),
            ScanFailure::Scan(e) => write!(f, "Error fetching pairs ({}): {}", e.kind(), e),
            ScanFailure::Aborted(e) => write!(f, "Scan stopped unexpectedly: {}", e),
        }
    }
}

type ScanOutcome = std::result::Result<ScanReport, ScanFailure>;

enum Entry<'a> {
    Screened(&'a SymbolResult),
    Failed(&'a FailedSymbol),
}

struct App {
    config: AppConfig,
    volume_input: String,
    price_change_input: String,
    active_field: Field,
    report: Option<ScanReport>,
    selected_index: usize,
    is_refreshing: bool,
    status: String,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let thresholds = config.thresholds;
        Self {
            config,
            volume_input: thresholds.volume_threshold.to_string(),
            price_change_input: thresholds.price_change_threshold.to_string(),
            active_field: Field::Volume,
            report: None,
            selected_index: 0,
            is_refreshing: false,
            status: "Press F5 to run the screener".to_string(),
        }
    }

    fn active_input(&mut self) -> &mut String {
        match self.active_field {
            Field::Volume => &mut self.volume_input,
            Field::PriceChange => &mut self.price_change_input,
        }
    }

    /// Parses the form into an immutable threshold value.
    fn thresholds(&self) -> std::result::Result<Thresholds, String> {
        let volume = self
            .volume_input
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Volume threshold `{}` is not a number", self.volume_input))?;
        let price_change = self
            .price_change_input
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Price change threshold `{}` is not a number", self.price_change_input))?;
        Thresholds::new(volume, price_change).map_err(|e| e.to_string())
    }

    /// Screened symbols first, then the ones that failed.
    fn entries(&self) -> Vec<Entry<'_>> {
        match &self.report {
            Some(report) => report
                .results
                .iter()
                .map(Entry::Screened)
                .chain(report.failures.iter().map(Entry::Failed))
                .collect(),
            None => Vec::new(),
        }
    }

    fn entry_count(&self) -> usize {
        self.report.as_ref().map_or(0, |r| r.scanned())
    }

    fn set_report(&mut self, outcome: ScanOutcome) {
        self.is_refreshing = false;
        match outcome {
            Ok(report) => {
                self.status = if report.scanned() == 0 {
                    "No pairs available!".to_string()
                } else {
                    format!(
                        "Screened {} pairs, {} failed",
                        report.results.len(),
                        report.failures.len()
                    )
                };
                self.report = Some(report);
                self.selected_index = 0;
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                self.status = e.to_string();
            }
        }
    }
}

// --- TUI ---

pub async fn run_tui(config: AppConfig) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, config).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, config: AppConfig) -> Result<()> {
    let (report_tx, mut report_rx) = mpsc::channel::<ScanOutcome>(1);
    let mut app = App::new(config);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(outcome) = report_rx.try_recv() {
            app.set_report(outcome);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !handle_key_event(key, &mut app, &report_tx) {
                        return Ok(());
                    }
                }
                // The next draw picks up the new size.
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

fn start_scan(app: &mut App, tx: &mpsc::Sender<ScanOutcome>) {
    let thresholds = match app.thresholds() {
        Ok(t) => t,
        Err(msg) => {
            app.status = msg;
            return;
        }
    };

    info!(
        volume_threshold = thresholds.volume_threshold,
        price_change_threshold = thresholds.price_change_threshold,
        "Running screener"
    );
    app.is_refreshing = true;
    app.status = "Fetching data...".to_string();

    let config = app.config.clone();
    let tx_clone = tx.clone();
    tokio::spawn(async move {
        let scan = tokio::spawn(async move { analysis::run_scan(&config, thresholds).await });
        let _ = tx_clone.send(join_scan(scan).await).await;
    });
}

/// Always yields an outcome, so the refresh state is cleared even if the scan panics.
async fn join_scan(scan: JoinHandle<std::result::Result<ScanReport, ScreenerError>>) -> ScanOutcome {
    match scan.await {
        Ok(outcome) => outcome.map_err(ScanFailure::Scan),
        Err(e) => {
            warn!("Scan task failed: {}", e);
            Err(ScanFailure::Aborted(e))
        }
    }
}

/// Returns false when the user asked to quit.
fn handle_key_event(
    key: KeyEvent,
    app: &mut App,
    tx: &mpsc::Sender<ScanOutcome>,
) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) | KeyCode::Enter if !app.is_refreshing => start_scan(app, tx),
        KeyCode::Tab | KeyCode::BackTab => {
            app.active_field = match app.active_field {
                Field::Volume => Field::PriceChange,
                Field::PriceChange => Field::Volume,
            };
        }
        KeyCode::Backspace => {
            app.active_input().pop();
        }
        KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
            let input = app.active_input();
            if input.len() < MAX_INPUT_LEN {
                input.push(c);
            }
        }
        KeyCode::Up => {
            let count = app.entry_count();
            if count > 0 {
                app.selected_index = app.selected_index.checked_sub(1).unwrap_or(count - 1);
            }
        }
        KeyCode::Down => {
            let count = app.entry_count();
            if count > 0 {
                app.selected_index = (app.selected_index + 1) % count;
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(24), Constraint::Percentage(76)]).split(f.size());
    let right_chunks = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[1]);

    render_sidebar(f, app, main_layout[0]);

    let header = match &app.report {
        Some(report) => format!(
            "Last Scan: {} UTC | {} of {} pairs | {} failed",
            format_timestamp(&report.scanned_at),
            report.scanned(),
            report.total_listed,
            report.failures.len()
        ),
        None => "Last Scan: Never".to_string(),
    };
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title_alignment(Alignment::Center)
            .title(header),
        right_chunks[0],
    );

    let body = Layout::horizontal([Constraint::Length(22), Constraint::Min(0)]).split(right_chunks[1]);
    let entries = app.entries();
    render_symbol_list(f, app, &entries, body[0]);

    match entries.get(app.selected_index) {
        Some(Entry::Screened(result)) => render_result(f, result, body[1]),
        Some(Entry::Failed(failure)) => {
            f.render_widget(
                Paragraph::new(vec![
                    Line::from(format!("Kind: {}", failure.kind)),
                    Line::from(""),
                    Line::from(failure.message.clone()),
                ])
                .wrap(Wrap { trim: true })
                .style(Style::default().fg(Color::Red))
                .block(Block::default().borders(Borders::ALL).title(format!("{} failed", failure.symbol))),
                body[1],
            );
        }
        None => {
            f.render_widget(
                Paragraph::new("Set the thresholds and press F5 to run the screener.")
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL).title("Results")),
                body[1],
            );
        }
    }

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Running screener...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Settings")
        .title_alignment(Alignment::Center);
    let inner = sidebar_block.inner(area);
    f.render_widget(sidebar_block, area);

    let chunks = Layout::vertical([
        Constraint::Min(6),    // threshold form
        Constraint::Length(3), // status
        Constraint::Length(4), // key help
    ])
    .split(inner);

    let input_line = |value: &str, field: Field| {
        let mut line = Line::from(format!("> {}", value));
        if app.active_field == field {
            line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
        }
        line
    };

    let form = vec![
        Line::from("Volume Threshold"),
        input_line(&app.volume_input, Field::Volume),
        Line::from(""),
        Line::from("Price Change (%) Threshold"),
        input_line(&app.price_change_input, Field::PriceChange),
    ];
    f.render_widget(Paragraph::new(form), chunks[0]);

    f.render_widget(
        Paragraph::new(app.status.clone())
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::Gray)),
        chunks[1],
    );

    f.render_widget(
        Paragraph::new(vec![
            Line::from("Tab switches field"),
            Line::from("F5 runs screener"),
            Line::from("Up/Down selects pair"),
            Line::from("q quits"),
        ])
        .style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn render_symbol_list(f: &mut Frame, app: &App, entries: &[Entry<'_>], area: Rect) {
    let lines: Vec<Line> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let (text, color) = match entry {
                Entry::Screened(r) => (
                    format!("{} ({})", r.symbol, r.screening.hit_count()),
                    Color::Cyan,
                ),
                Entry::Failed(failed) => (format!("{} !", failed.symbol), Color::Red),
            };
            let mut line = Line::from(text).style(Style::default().fg(color));
            if i == app.selected_index {
                line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
            }
            line
        })
        .collect();

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Pairs")),
        area,
    );
}

fn render_result(f: &mut Frame, result: &SymbolResult, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(area);

    let sections = [
        ("Overbought", &result.screening.overbought, (255, 80, 80)),
        ("Oversold", &result.screening.oversold, (80, 255, 80)),
        ("Significant Price Changes", &result.screening.significant_change, (0, 255, 255)),
    ];
    for ((title, rows, accent), chunk) in sections.into_iter().zip(chunks.iter()) {
        let title = format!("{} - {} ({})", result.symbol, title, rows.len());
        f.render_widget(subset_table(title, rows, accent), *chunk);
    }
}

fn subset_table(title: String, rows: &[ScreenedRow], accent: (u8, u8, u8)) -> Table<'static> {
    let header = Row::new(["Time (UTC)", "Close", "Volume", "RSI", "Change (%)"].map(Cell::from))
        .style(Style::default().bg(Color::DarkGray));

    let top_move = rows
        .iter()
        .filter_map(|r| r.percent_change.map(f64::abs))
        .fold(0.0, f64::max);

    // Newest first so the latest signal is on screen.
    let table_rows: Vec<Row> = rows
        .iter()
        .rev()
        .map(|row| {
            let ratio = get_visibility_ratio(row.percent_change.map_or(0.0, f64::abs), top_move);
            let (r, g, b) = accent;
            let faded = Color::Rgb(
                (f64::from(r) * ratio) as u8,
                (f64::from(g) * ratio) as u8,
                (f64::from(b) * ratio) as u8,
            );
            Row::new([
                Cell::from(format_timestamp(&row.candle.timestamp)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(row.candle.close.to_string()),
                Cell::from(format!("{:.0}", row.candle.volume)),
                Cell::from(format_optional(row.rsi, 2)).style(Style::default().fg(faded)),
                Cell::from(format_optional(row.percent_change, 2)).style(Style::default().fg(faded)),
            ])
            .height(1)
        })
        .collect();

    Table::new(
        table_rows,
        [
            Constraint::Length(20),
            Constraint::Percentage(20),
            Constraint::Percentage(25),
            Constraint::Percentage(15),
            Constraint::Percentage(20),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
