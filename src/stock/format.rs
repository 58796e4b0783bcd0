//! Text rendering for quotes shown in chat and in the widget.

use chrono::DateTime;

use super::database::QuoteRecord;
use super::history::HistoryPoint;
use crate::preferences::DisplayMode;

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 32;

/// Why the quote list has nothing to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    NoNetwork,
    NoStocks,
    Loading,
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Magnitude with two decimals and grouped thousands, plus whether it is
/// negative after rounding (so -0.001 is not shown as "-0.00").
fn two_decimals(value: f64) -> (bool, String) {
    let abs = format!("{:.2}", value.abs());
    let negative = value < 0.0 && abs != "0.00";
    let (int, frac) = abs.split_once('.').unwrap_or((abs.as_str(), "00"));
    (negative, format!("{}.{}", group_thousands(int), frac))
}

/// `$1,234.50`
pub fn format_price(price: f64) -> String {
    let (negative, amount) = two_decimals(price);
    if negative {
        format!("-${amount}")
    } else {
        format!("${amount}")
    }
}

/// `+$2.00` / `-$1.50`
pub fn format_absolute_change(change: f64) -> String {
    let (negative, amount) = two_decimals(change);
    let sign = if negative { "-" } else { "+" };
    format!("{sign}${amount}")
}

/// `+1.35%` / `-0.39%`
pub fn format_percentage_change(change_percent: f64) -> String {
    let (negative, amount) = two_decimals(change_percent);
    let sign = if negative { "-" } else { "+" };
    format!("{sign}{amount}%")
}

pub fn format_change(record: &QuoteRecord, mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Absolute => format_absolute_change(record.absolute_change),
        DisplayMode::Percentage => format_percentage_change(record.percentage_change),
    }
}

fn trend_emoji(change: f64) -> &'static str {
    if change > 0.0 {
        "📈"
    } else if change < 0.0 {
        "📉"
    } else {
        "➡️"
    }
}

pub fn format_quote_line(record: &QuoteRecord, mode: DisplayMode) -> String {
    format!(
        "{} {}  {}  {}",
        trend_emoji(record.absolute_change),
        record.symbol,
        format_price(record.price),
        format_change(record, mode)
    )
}

/// The watchlist view; rows are expected in symbol order
pub fn format_quote_list(records: &[QuoteRecord], mode: DisplayMode) -> String {
    let mut lines: Vec<String> = records
        .iter()
        .map(|record| format_quote_line(record, mode))
        .collect();
    lines.push(String::new());
    lines.push(format!("Showing {mode} change. Use /mode to switch."));
    lines.join("\n")
}

pub fn format_empty_state(state: EmptyState) -> String {
    match state {
        EmptyState::NoNetwork => {
            "🌐 No network connection.\nStock data will refresh once you're back online. Use /refresh to retry.".to_string()
        }
        EmptyState::NoStocks => {
            "📭 Your watchlist is empty.\nAdd a stock with /add <SYMBOL>.".to_string()
        }
        EmptyState::Loading => "⏳ Loading stock data... try /list again in a moment.".to_string(),
    }
}

/// Compact view used by the widget: absolute change, always signed
pub fn format_widget(records: &[QuoteRecord]) -> String {
    if records.is_empty() {
        return "No stocks to show".to_string();
    }

    records
        .iter()
        .map(|record| {
            let pill = if record.absolute_change >= 0.0 { "🟢" } else { "🔴" };
            format!(
                "{} {} {} {}",
                pill,
                record.symbol,
                format_price(record.price),
                format_absolute_change(record.absolute_change)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Unicode sparkline of closes, downsampled to a fixed width
pub fn sparkline(points: &[HistoryPoint]) -> String {
    if points.is_empty() {
        return String::new();
    }

    let sampled: Vec<f64> = if points.len() <= SPARK_WIDTH {
        points.iter().map(|p| p.close).collect()
    } else {
        (0..SPARK_WIDTH)
            .map(|i| points[i * (points.len() - 1) / (SPARK_WIDTH - 1)].close)
            .collect()
    };

    let min = sampled.iter().copied().fold(f64::INFINITY, f64::min);
    let max = sampled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    sampled
        .iter()
        .map(|close| {
            if span <= f64::EPSILON {
                SPARK_BARS[SPARK_BARS.len() / 2]
            } else {
                let level = ((close - min) / span * (SPARK_BARS.len() - 1) as f64).round() as usize;
                SPARK_BARS[level.min(SPARK_BARS.len() - 1)]
            }
        })
        .collect()
}

fn format_day(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Detail view: latest quote plus a summary of the stored history
pub fn format_detail(record: &QuoteRecord, mode: DisplayMode) -> String {
    let mut text = format!(
        "{} {} Stock Detail\n\nPrice: {} ({})\n",
        trend_emoji(record.absolute_change),
        record.symbol,
        format_price(record.price),
        format_change(record, mode)
    );

    match record.history_points() {
        Ok(points) if !points.is_empty() => {
            let first = points[0];
            let last = points[points.len() - 1];
            let low = points.iter().map(|p| p.close).fold(f64::INFINITY, f64::min);
            let high = points.iter().map(|p| p.close).fold(f64::NEG_INFINITY, f64::max);

            text.push_str(&format!(
                "\nHistory: {} weekly closes, {} to {}\nFirst: {}  Last: {}\nLow: {}  High: {}\n{}\n",
                points.len(),
                format_day(first.timestamp_ms),
                format_day(last.timestamp_ms),
                format_price(first.close),
                format_price(last.close),
                format_price(low),
                format_price(high),
                sparkline(&points)
            ));
        }
        Ok(_) => text.push_str("\nNo history available yet.\n"),
        Err(e) => {
            log::warn!("Stored history for {} is unreadable: {}", record.symbol, e);
            text.push_str("\nHistory could not be read.\n");
        }
    }

    text.push_str(&format!(
        "\nLast Updated: {}",
        record.updated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    text
}

pub fn format_invalid_symbol_notice(symbol: &str) -> String {
    format!("❌ Stock symbol \"{symbol}\" could not be found and was removed from the watchlist.")
}
