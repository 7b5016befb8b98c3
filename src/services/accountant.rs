//! Portfolio Accountant
//!
//! Read-only aggregation of capital, realized/unrealized P&L and trade
//! statistics, per strategy and across the desk. Open trades are valued at
//! the supplied marks, falling back to each trade's last observed premium.

use std::collections::HashMap;

use crate::types::{Portfolio, PortfolioStats, Trade};

/// Label used for desk-wide totals.
pub const DESK_LABEL: &str = "ALL";

/// Statistics for a single strategy's portfolio.
pub fn portfolio_stats(portfolio: &Portfolio, marks: &HashMap<String, f64>) -> PortfolioStats {
    compute(
        portfolio.strategy(),
        portfolio.initial_capital(),
        portfolio.available_capital(),
        portfolio.open_trades(),
        portfolio.closed_trades().iter(),
        marks,
    )
}

/// Statistics across every portfolio.
pub fn desk_stats<'a, I>(portfolios: I, marks: &HashMap<String, f64>) -> PortfolioStats
where
    I: IntoIterator<Item = &'a Portfolio> + Clone,
{
    let initial: f64 = portfolios.clone().into_iter().map(Portfolio::initial_capital).sum();
    let available: f64 = portfolios.clone().into_iter().map(Portfolio::available_capital).sum();

    compute(
        DESK_LABEL,
        initial,
        available,
        portfolios.clone().into_iter().flat_map(|p| p.open_trades()),
        portfolios.into_iter().flat_map(|p| p.closed_trades().iter()),
        marks,
    )
}

/// Sum of winning P&L over the absolute sum of losing P&L.
///
/// `Some(0.0)` with no wins (including no trades at all), `None` when there are
/// wins but no losses.
pub fn profit_factor<'a, I>(closed: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Trade>,
{
    let (gross_profit, gross_loss) = closed
        .into_iter()
        .filter_map(|t| t.pnl)
        .fold((0.0, 0.0), |(win, loss), pnl| {
            if pnl > 0.0 {
                (win + pnl, loss)
            } else {
                (win, loss - pnl.min(0.0))
            }
        });
    gross_ratio(gross_profit, gross_loss)
}

fn gross_ratio(gross_profit: f64, gross_loss: f64) -> Option<f64> {
    if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        None
    } else {
        Some(0.0)
    }
}

fn compute<'a, O, C>(
    label: &str,
    initial_capital: f64,
    available_capital: f64,
    open: O,
    closed: C,
    marks: &HashMap<String, f64>,
) -> PortfolioStats
where
    O: Iterator<Item = &'a Trade>,
    C: Iterator<Item = &'a Trade>,
{
    let mut open_positions = 0;
    let mut unrealized_pnl = 0.0;
    let mut open_value = 0.0;
    for trade in open {
        let mark = marks.get(&trade.id).copied().unwrap_or(trade.mark_premium);
        open_positions += 1;
        unrealized_pnl += trade.pnl_at(mark);
        open_value += mark * trade.quantity as f64;
    }

    let mut total_trades = 0;
    let mut winning_trades = 0;
    let mut losing_trades = 0;
    let mut realized_pnl = 0.0;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;
    for pnl in closed.map(|t| t.pnl.unwrap_or(0.0)) {
        total_trades += 1;
        realized_pnl += pnl;
        if pnl > 0.0 {
            winning_trades += 1;
            gross_profit += pnl;
        } else if pnl < 0.0 {
            losing_trades += 1;
            gross_loss += -pnl;
        }
    }

    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64
    } else {
        0.0
    };
    let avg_win = if winning_trades > 0 {
        gross_profit / winning_trades as f64
    } else {
        0.0
    };
    let avg_loss = if losing_trades > 0 {
        gross_loss / losing_trades as f64
    } else {
        0.0
    };
    let total_pnl = realized_pnl + unrealized_pnl;
    let return_pct = if initial_capital > 0.0 {
        total_pnl / initial_capital * 100.0
    } else {
        0.0
    };

    PortfolioStats {
        strategy: label.to_string(),
        initial_capital,
        available_capital,
        open_positions,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        realized_pnl,
        unrealized_pnl,
        total_pnl,
        avg_win,
        avg_loss,
        profit_factor: gross_ratio(gross_profit, gross_loss),
        equity: available_capital + open_value,
        return_pct,
    }
}
