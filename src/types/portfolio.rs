//! Portfolio Types
//!
//! One `Portfolio` per strategy owns that strategy's capital and trade history.
//! Capital only moves through `fill` and `settle`, which keeps
//! `available + Σ open entry cost == initial + Σ closed pnl` true at all times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

use super::{Trade, TradeStatus, TradeTicket};

/// Max length of the strategy part of a trade id.
const ID_PREFIX_LEN: usize = 8;

/// Strategy-scoped paper trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    strategy: String,
    /// Leading part of every trade id, unique across the desk
    id_prefix: String,
    initial_capital: f64,
    available_capital: f64,
    /// Open trades by id
    open_trades: BTreeMap<String, Trade>,
    /// Terminal trades in closure order
    closed_trades: Vec<Trade>,
    /// Last sequence number handed out
    trade_counter: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(strategy: impl Into<String>, initial_capital: f64) -> Result<Self, EngineError> {
        let strategy = strategy.into();
        if strategy.trim().is_empty() {
            return Err(EngineError::InvalidInput("strategy name is empty".to_string()));
        }
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "initial capital must be positive, got {}",
                initial_capital
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id_prefix: id_prefix(&strategy),
            strategy,
            initial_capital,
            available_capital: initial_capital,
            open_trades: BTreeMap::new(),
            closed_trades: Vec::new(),
            trade_counter: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Replace the trade id prefix. Only allowed before the first fill.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Result<Self, EngineError> {
        let prefix = prefix.into();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(EngineError::InvalidInput(format!(
                "trade id prefix must be alphanumeric, got '{}'",
                prefix
            )));
        }
        if self.trade_counter > 0 {
            return Err(EngineError::InvalidInput(format!(
                "portfolio '{}' already issued trade ids",
                self.strategy
            )));
        }
        self.id_prefix = prefix;
        Ok(self)
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn available_capital(&self) -> f64 {
        self.available_capital
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.open_trades.values()
    }

    pub fn open_count(&self) -> usize {
        self.open_trades.len()
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn trade_counter(&self) -> u64 {
        self.trade_counter
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn get_open(&self, id: &str) -> Option<&Trade> {
        self.open_trades.get(id)
    }

    /// Find a trade by id, open or closed.
    pub fn find(&self, id: &str) -> Option<&Trade> {
        self.open_trades
            .get(id)
            .or_else(|| self.closed_trades.iter().find(|t| t.id == id))
    }

    /// Entry cost of everything still open.
    pub fn committed_capital(&self) -> f64 {
        self.open_trades.values().map(Trade::entry_cost).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().filter_map(|t| t.pnl).sum()
    }

    /// Drift of the capital conservation identity. Zero up to float error.
    pub fn conservation_gap(&self) -> f64 {
        (self.available_capital + self.committed_capital())
            - (self.initial_capital + self.realized_pnl())
    }

    /// Id the next filled ticket will receive.
    pub fn next_trade_id(&self) -> String {
        format!("{}-{:04}", self.id_prefix, self.trade_counter + 1)
    }

    /// Open a trade from a ticket, debiting its cost.
    pub fn fill(&mut self, ticket: TradeTicket, at: DateTime<Utc>) -> Result<Trade, EngineError> {
        if ticket.strategy != self.strategy {
            return Err(EngineError::InvalidInput(format!(
                "ticket for '{}' filled against '{}'",
                ticket.strategy, self.strategy
            )));
        }
        let cost = ticket.cost();
        if cost > self.available_capital {
            return Err(EngineError::InsufficientCapital {
                needed: cost,
                available: self.available_capital,
            });
        }

        let id = self.next_trade_id();
        let trade = Trade::from_ticket(id.clone(), ticket, at);

        self.trade_counter += 1;
        self.available_capital -= cost;
        self.open_trades.insert(id, trade.clone());
        self.updated_at = at;
        Ok(trade)
    }

    /// Close an open trade, crediting `exit_premium * quantity`.
    pub fn settle(
        &mut self,
        id: &str,
        status: TradeStatus,
        exit_premium: f64,
        at: DateTime<Utc>,
    ) -> Result<Trade, EngineError> {
        if !exit_premium.is_finite() || exit_premium < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "exit premium must be non-negative, got {}",
                exit_premium
            )));
        }
        let mut trade = self
            .open_trades
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::TradeNotFound(id.to_string()))?;
        trade.close(status, exit_premium, at)?;

        self.open_trades.remove(id);
        self.available_capital += exit_premium * trade.quantity as f64;
        self.closed_trades.push(trade.clone());
        self.updated_at = at;
        Ok(trade)
    }

    /// Record an observed premium on an open trade.
    pub fn mark(&mut self, id: &str, premium: f64) -> Result<(), EngineError> {
        let trade = self
            .open_trades
            .get_mut(id)
            .ok_or_else(|| EngineError::TradeNotFound(id.to_string()))?;
        trade.update_mark(premium);
        Ok(())
    }

    /// Drop all trades and restore the initial capital.
    pub fn reset(&mut self) {
        self.available_capital = self.initial_capital;
        self.open_trades.clear();
        self.closed_trades.clear();
        self.trade_counter = 0;
        self.updated_at = Utc::now();
    }
}

/// Uppercased alphanumeric part of a strategy name, used in trade ids.
pub fn id_prefix(strategy: &str) -> String {
    let prefix: String = strategy
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(ID_PREFIX_LEN)
        .collect::<String>()
        .to_uppercase();
    if prefix.is_empty() {
        "TRD".to_string()
    } else {
        prefix
    }
}

/// Aggregate performance of one strategy, or of the whole desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStats {
    pub strategy: String,
    pub initial_capital: f64,
    pub available_capital: f64,
    pub open_positions: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Gross profit over gross loss; `None` when there are wins but no losses
    pub profit_factor: Option<f64>,
    /// Available capital plus open positions at their marks
    pub equity: f64,
    pub return_pct: f64,
}

/// Point-in-time view of every strategy on the desk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskSnapshot {
    pub generated_at: DateTime<Utc>,
    pub instrument: String,
    pub totals: PortfolioStats,
    pub strategies: Vec<PortfolioStats>,
    pub open_trades: Vec<Trade>,
}
