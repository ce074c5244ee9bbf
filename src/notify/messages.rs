// Human-readable operator messages (Telegram Markdown)
use chrono::{DateTime, Utc};

use crate::execution::PortfolioSnapshot;
use crate::models::{ClosedTrade, ExitReason, Trade};

pub fn startup(symbol: &str, venue: &str) -> String {
    format!("🤖 *Bot is now online* ({} paper trading via {}).", symbol, venue)
}

pub fn trade_opened(trade: &Trade) -> String {
    format!(
        "🔔 *NEW TRADE OPENED*\n\nSide: {}\nEntry: `${:.2}`\nTP: `${:.2}`\nSL: `${:.2}`\nSize: `{:.6}`",
        trade.side(),
        trade.entry_price(),
        trade.take_profit(),
        trade.stop_loss(),
        trade.size()
    )
}

pub fn trade_closed(closed: &ClosedTrade) -> String {
    let status = match closed.reason {
        ExitReason::TakeProfit => "✅ TP HIT",
        ExitReason::StopLoss => "❌ SL HIT",
    };
    format!(
        "*{}*\n\nSide: {}\nNet P&L: `${:.2}` (incl. `${:.2}` fees)\n*New Balance: `${:.2}`*",
        status,
        closed.trade.side(),
        closed.net_pnl,
        closed.fees,
        closed.balance_after
    )
}

/// Uptime as `H:MM:SS`, hours unbounded
pub fn format_uptime(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - start).num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn periodic_report(snapshot: &PortfolioSnapshot, now: DateTime<Utc>) -> String {
    format!(
        "📊 *Periodic Report*\n\n\
         Bot Uptime: {}\n\
         ----------------------\n\
         Current Balance: `${:.2}`\n\
         Total P&L: `${:.2}`\n\
         ----------------------\n\
         Total Trades: {}\n\
         Wins: {}\n\
         Losses: {}\n\
         Win Rate: {:.2}%\n\
         Open Trades: {}",
        format_uptime(snapshot.start_time, now),
        snapshot.balance,
        snapshot.net_pnl,
        snapshot.total_trades,
        snapshot.wins,
        snapshot.losses,
        snapshot.win_rate_pct,
        snapshot.open_trades
    )
}

pub fn critical_error(error: &dyn std::fmt::Display) -> String {
    format!("🚨 *CRITICAL ERROR*: Bot loop failed with error: {}", error)
}
