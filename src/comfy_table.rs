use crate::analysis::{ScanReport, SymbolResult};
use crate::screener::ScreenedRow;
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use tracing::debug;

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%d-%m-%Y %H:%M:%S").to_string()
}

pub fn format_optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", precision, v))
}

/// Fades a cell from full intensity (largest move) down to 40%.
pub fn get_visibility_ratio(current: f64, top: f64) -> f64 {
    if top <= 0.0 {
        1.0
    } else {
        (0.4 + 0.6 * (current / top)).clamp(0.4, 1.0)
    }
}

fn base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

fn rows_table(rows: &[ScreenedRow], accent: (u8, u8, u8)) -> Table {
    let mut table = base_table(&["Time (UTC)", "Open", "High", "Low", "Close", "Volume", "RSI", "Change (%)"]);

    let top_move = rows
        .iter()
        .filter_map(|r| r.percent_change.map(f64::abs))
        .fold(0.0, f64::max);

    for row in rows {
        let c = &row.candle;
        let ratio = get_visibility_ratio(row.percent_change.map_or(0.0, f64::abs), top_move);
        let (r, g, b) = accent;
        let faded = Color::Rgb {
            r: (f64::from(r) * ratio) as u8,
            g: (f64::from(g) * ratio) as u8,
            b: (f64::from(b) * ratio) as u8,
        };

        table.add_row(vec![
            Cell::new(format_timestamp(&c.timestamp)).fg(Color::DarkGrey),
            Cell::new(c.open).set_alignment(CellAlignment::Right),
            Cell::new(c.high).set_alignment(CellAlignment::Right),
            Cell::new(c.low).set_alignment(CellAlignment::Right),
            Cell::new(c.close).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}", c.volume)).set_alignment(CellAlignment::Right),
            Cell::new(format_optional(row.rsi, 2))
                .fg(faded)
                .set_alignment(CellAlignment::Right),
            Cell::new(format_optional(row.percent_change, 2))
                .fg(faded)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn render_symbol(out: &mut String, result: &SymbolResult) {
    let latest_rsi = result.latest.as_ref().and_then(|r| r.rsi);
    out.push_str(&format!(
        "\nResults for {} ({} candles, last RSI {})\n",
        result.symbol,
        result.candles,
        format_optional(latest_rsi, 2)
    ));

    let sections = [
        ("Overbought", &result.screening.overbought, (255, 80, 80)),
        ("Oversold", &result.screening.oversold, (80, 255, 80)),
        ("Significant price changes", &result.screening.significant_change, (0, 255, 255)),
    ];
    for (title, rows, accent) in sections {
        if rows.is_empty() {
            out.push_str(&format!("{}: none\n", title));
        } else {
            out.push_str(&format!("{}:\n{}\n", title, rows_table(rows, accent)));
        }
    }
}

/// Renders the whole report as text.
pub fn render_report(report: &ScanReport) -> String {
    let mut out = format!(
        "(Scan taken at {} UTC, {} of {} pairs, volume > {}, |change| > {}%)\n",
        format_timestamp(&report.scanned_at),
        report.scanned(),
        report.total_listed,
        report.thresholds.volume_threshold,
        report.thresholds.price_change_threshold,
    );

    if report.scanned() == 0 {
        out.push_str("No pairs available!\n");
        return out;
    }

    for result in &report.results {
        render_symbol(&mut out, result);
    }

    if !report.failures.is_empty() {
        let mut table = base_table(&["Asset", "Kind", "Error"]);
        for failure in &report.failures {
            table.add_row(vec![
                Cell::new(&failure.symbol).fg(Color::Red),
                Cell::new(failure.kind).fg(Color::DarkGrey),
                Cell::new(&failure.message),
            ]);
        }
        out.push_str(&format!("\nFailed to fetch:\n{}\n", table));
    }

    out
}

pub fn run(report: &ScanReport) {
    if let Err(e) = clearscreen::clear() {
        debug!("Could not clear screen: {}", e);
    }
    println!("{}", render_report(report));
}
