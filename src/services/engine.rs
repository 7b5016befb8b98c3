//! Trading Engine
//!
//! Owns one `Portfolio` per strategy and drives the trade lifecycle:
//! - Opening trades from strategy signals (ATM strike, premium, sizing)
//! - Evaluating open trades against stop-loss and target each tick
//! - Manual exits at the last observed premium
//! - Snapshots and explicit persistence checkpoints
//!
//! The engine does no I/O while trading. Quotes arrive as closures or maps
//! supplied by the caller, and `&mut self` keeps every tick atomic.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::services::accountant;
use crate::services::estimator::PremiumEstimator;
use crate::services::sizer::{exit_levels, PositionSizer};
use crate::services::store::PortfolioStore;
use crate::services::strike::atm_strike;
use crate::types::{
    id_prefix, DeskSnapshot, InstrumentProfile, OptionContract, Portfolio, PortfolioStats, PremiumBar,
    Signal, Trade, TradeStatus, TradeTicket, ValidSignal,
};

/// Paper trading engine for a single instrument profile.
#[derive(Debug, Clone)]
pub struct TradingEngine {
    estimator: PremiumEstimator,
    sizer: PositionSizer,
    /// Starting capital for each newly seen strategy
    initial_capital: f64,
    portfolios: BTreeMap<String, Portfolio>,
    /// Strategies changed since the last successful persist
    dirty: BTreeSet<String>,
}

impl TradingEngine {
    pub fn new(
        profile: InstrumentProfile,
        initial_capital: f64,
        risk_fraction: f64,
    ) -> Result<Self, EngineError> {
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "initial capital must be positive, got {}",
                initial_capital
            )));
        }
        if !profile.strike_interval.is_finite() || profile.strike_interval <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "profile '{}' has a non-positive strike interval",
                profile.id
            )));
        }

        Ok(Self {
            estimator: PremiumEstimator::new(profile),
            sizer: PositionSizer::new(risk_fraction)?,
            initial_capital,
            portfolios: BTreeMap::new(),
            dirty: BTreeSet::new(),
        })
    }

    /// Rebuild an engine from persisted portfolios.
    pub fn restore(
        profile: InstrumentProfile,
        initial_capital: f64,
        risk_fraction: f64,
        store: &PortfolioStore,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new(profile, initial_capital, risk_fraction)?;
        for portfolio in store.load_all()? {
            if let Some(other) = engine
                .portfolios
                .values()
                .find(|p| p.id_prefix() == portfolio.id_prefix())
            {
                return Err(EngineError::Persistence(format!(
                    "strategies '{}' and '{}' share trade id prefix {}",
                    other.strategy(),
                    portfolio.strategy(),
                    portfolio.id_prefix()
                )));
            }
            info!(
                "Restored {}: {} open, {} closed, capital {:.2}",
                portfolio.strategy(),
                portfolio.open_count(),
                portfolio.closed_trades().len(),
                portfolio.available_capital()
            );
            engine
                .portfolios
                .insert(portfolio.strategy().to_string(), portfolio);
        }
        Ok(engine)
    }

    pub fn profile(&self) -> &InstrumentProfile {
        self.estimator.profile()
    }

    pub fn estimator(&self) -> &PremiumEstimator {
        &self.estimator
    }

    pub fn portfolio(&self, strategy: &str) -> Option<&Portfolio> {
        self.portfolios.get(strategy)
    }

    pub fn portfolios(&self) -> impl Iterator<Item = &Portfolio> + Clone {
        self.portfolios.values()
    }

    pub fn strategies(&self) -> Vec<String> {
        self.portfolios.keys().cloned().collect()
    }

    /// All open trades, ordered by strategy then id.
    pub fn open_trades(&self) -> Vec<&Trade> {
        self.portfolios.values().flat_map(|p| p.open_trades()).collect()
    }

    /// All closed trades, grouped by strategy in closure order.
    pub fn closed_trades(&self) -> Vec<&Trade> {
        self.portfolios
            .values()
            .flat_map(|p| p.closed_trades().iter())
            .collect()
    }

    /// Look up any trade, open or closed.
    pub fn find_trade(&self, trade_id: &str) -> Option<&Trade> {
        self.portfolios.values().find_map(|p| p.find(trade_id))
    }

    /// Trade id prefix for a new strategy, suffixed with a counter when
    /// another strategy already issues ids under the same prefix.
    fn unique_id_prefix(&self, strategy: &str) -> String {
        let base = id_prefix(strategy);
        let taken = |prefix: &str| self.portfolios.values().any(|p| p.id_prefix() == prefix);
        if !taken(&base) {
            return base;
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{}{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn open_owner(&self, trade_id: &str) -> Option<String> {
        self.portfolios
            .values()
            .find(|p| p.get_open(trade_id).is_some())
            .map(|p| p.strategy().to_string())
    }

    // ==========================================================================
    // Opening
    // ==========================================================================

    /// Work out strike, premium, levels and size for a signal without
    /// touching any portfolio.
    pub fn prepare_ticket<F>(
        &self,
        signal: &ValidSignal,
        available_capital: f64,
        live_quote: F,
    ) -> Result<TradeTicket, EngineError>
    where
        F: FnOnce(&OptionContract) -> Option<f64>,
    {
        let profile = self.profile();
        let strike = atm_strike(signal.reference_price, profile.strike_interval)?;
        let contract = OptionContract::new(profile.underlying.clone(), strike, signal.kind);

        let entry_premium = match live_quote(&contract).filter(|p| p.is_finite() && *p > 0.0) {
            Some(quote) => {
                debug!("Live quote for {}: {:.2}", contract, quote);
                quote
            }
            None => self.estimator.estimate_contract(
                &contract,
                signal.reference_price,
                signal.volatility_measure,
            )?,
        };

        let (stop_loss_premium, target_premium) =
            exit_levels(entry_premium, profile.stop_loss_fraction, profile.reward_ratio)?;
        let sizing = self.sizer.size(
            available_capital,
            entry_premium,
            profile.stop_loss_fraction,
            profile.lot_size,
        )?;

        Ok(TradeTicket {
            strategy: signal.strategy.clone(),
            contract,
            reference_price: signal.reference_price,
            entry_premium,
            quantity: sizing.quantity,
            stop_loss_premium,
            target_premium,
            notes: signal.notes.clone(),
        })
    }

    /// Open a trade from a signal, using `live_quote` for the entry premium
    /// when it yields a positive price and the estimator otherwise.
    pub fn open<F>(&mut self, signal: &Signal, live_quote: F) -> Result<Trade, EngineError>
    where
        F: FnOnce(&OptionContract) -> Option<f64>,
    {
        let signal = match signal.validate() {
            Ok(s) => s,
            Err(e) => {
                warn!("Rejected signal: {}", e);
                return Err(e);
            }
        };

        let mut portfolio = match self.portfolios.get(&signal.strategy) {
            Some(existing) => existing.clone(),
            None => Portfolio::new(signal.strategy.clone(), self.initial_capital)?
                .with_id_prefix(self.unique_id_prefix(&signal.strategy))?,
        };

        let ticket = self.prepare_ticket(&signal, portfolio.available_capital(), live_quote)?;
        let trade = portfolio.fill(ticket, Utc::now())?;

        info!(
            "Opened {} {} x{} @ {:.2} (SL {:.2}, TGT {:.2}), capital {:.2}",
            trade.id,
            trade.contract(),
            trade.quantity,
            trade.entry_premium,
            trade.stop_loss_premium,
            trade.target_premium,
            portfolio.available_capital()
        );

        self.dirty.insert(signal.strategy.clone());
        self.portfolios.insert(signal.strategy, portfolio);
        Ok(trade)
    }

    /// Open a trade priced entirely by the estimator.
    pub fn open_estimated(&mut self, signal: &Signal) -> Result<Trade, EngineError> {
        self.open(signal, |_| None)
    }

    // ==========================================================================
    // Evaluation
    // ==========================================================================

    /// Apply one premium observation to an open trade. Returns the closed
    /// trade when a stop-loss or target was crossed.
    pub fn evaluate(
        &mut self,
        trade_id: &str,
        observation: impl Into<PremiumBar>,
    ) -> Result<Option<Trade>, EngineError> {
        let bar = observation.into();
        if !bar.low.is_finite() || !bar.high.is_finite() || bar.low > bar.high {
            return Err(EngineError::InvalidInput(format!(
                "invalid premium observation for {}",
                trade_id
            )));
        }
        let strategy = self
            .open_owner(trade_id)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;
        let portfolio = self
            .portfolios
            .get_mut(&strategy)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;

        let trigger = portfolio
            .get_open(trade_id)
            .and_then(|trade| trade.exit_trigger(&bar));
        portfolio.mark(trade_id, bar.last)?;
        self.dirty.insert(strategy.clone());

        let Some((status, exit_premium)) = trigger else {
            return Ok(None);
        };

        let trade = portfolio.settle(trade_id, status, exit_premium, Utc::now())?;
        info!(
            "{} {} @ {:.2}, P&L {:.2}, capital {:.2}",
            trade.id,
            status,
            exit_premium,
            trade.pnl.unwrap_or_default(),
            portfolio.available_capital()
        );
        Ok(Some(trade))
    }

    /// Evaluate every open trade that has a price in `prices`.
    /// Returns the trades closed during this tick.
    pub fn evaluate_all(&mut self, prices: &HashMap<String, f64>) -> Vec<Trade> {
        let bars: HashMap<String, PremiumBar> = prices
            .iter()
            .map(|(id, price)| (id.clone(), PremiumBar::at(*price)))
            .collect();
        self.evaluate_bars(&bars)
    }

    /// Evaluate every open trade that has a bar in `bars`.
    pub fn evaluate_bars(&mut self, bars: &HashMap<String, PremiumBar>) -> Vec<Trade> {
        let ids: Vec<String> = self
            .open_trades()
            .into_iter()
            .filter(|t| bars.contains_key(&t.id))
            .map(|t| t.id.clone())
            .collect();

        for id in bars.keys().filter(|id| !ids.contains(*id)) {
            debug!("Ignoring price for {}: not an open trade", id);
        }

        let mut closed = Vec::new();
        for id in ids {
            let Some(bar) = bars.get(&id) else { continue };
            match self.evaluate(&id, *bar) {
                Ok(Some(trade)) => closed.push(trade),
                Ok(None) => {}
                Err(e) => warn!("Skipped evaluation of {}: {}", id, e),
            }
        }
        closed
    }

    /// Price every open trade: live quote when available, estimate otherwise.
    pub fn mark_to_market<F>(
        &self,
        reference_price: f64,
        volatility_measure: f64,
        mut live_quote: F,
    ) -> Result<HashMap<String, f64>, EngineError>
    where
        F: FnMut(&OptionContract) -> Option<f64>,
    {
        let mut marks = HashMap::new();
        for trade in self.open_trades() {
            let contract = trade.contract();
            let premium = match live_quote(&contract).filter(|p| p.is_finite() && *p > 0.0) {
                Some(quote) => quote,
                None => self.estimator.estimate_contract(
                    &contract,
                    reference_price,
                    volatility_measure,
                )?,
            };
            marks.insert(trade.id.clone(), premium);
        }
        Ok(marks)
    }

    // ==========================================================================
    // Manual Exit
    // ==========================================================================

    /// Close an open trade at its last observed premium.
    pub fn close_manual(&mut self, trade_id: &str) -> Result<Trade, EngineError> {
        let premium = self
            .portfolios
            .values()
            .find_map(|p| p.get_open(trade_id))
            .map(|t| t.mark_premium)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;
        self.close_manual_at(trade_id, premium)
    }

    /// Close an open trade at an explicit premium.
    pub fn close_manual_at(&mut self, trade_id: &str, premium: f64) -> Result<Trade, EngineError> {
        let strategy = self
            .open_owner(trade_id)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;
        let portfolio = self
            .portfolios
            .get_mut(&strategy)
            .ok_or_else(|| EngineError::TradeNotFound(trade_id.to_string()))?;

        let trade = portfolio.settle(trade_id, TradeStatus::ManualExit, premium, Utc::now())?;
        info!(
            "{} manual exit @ {:.2}, P&L {:.2}",
            trade.id,
            premium,
            trade.pnl.unwrap_or_default()
        );
        self.dirty.insert(strategy);
        Ok(trade)
    }

    /// Reset a strategy's portfolio to its initial capital.
    pub fn reset(&mut self, strategy: &str) -> Result<(), EngineError> {
        let portfolio = self
            .portfolios
            .get_mut(strategy)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown strategy '{}'", strategy)))?;
        portfolio.reset();
        self.dirty.insert(strategy.to_string());
        info!("Reset portfolio for {}", strategy);
        Ok(())
    }

    // ==========================================================================
    // Reporting
    // ==========================================================================

    pub fn stats(&self, strategy: &str, marks: &HashMap<String, f64>) -> Option<PortfolioStats> {
        self.portfolio(strategy)
            .map(|p| accountant::portfolio_stats(p, marks))
    }

    /// Desk-wide view valued at `marks` (or each trade's last mark).
    pub fn snapshot(&self, marks: &HashMap<String, f64>) -> DeskSnapshot {
        DeskSnapshot {
            generated_at: Utc::now(),
            instrument: self.profile().id.clone(),
            totals: accountant::desk_stats(self.portfolios(), marks),
            strategies: self
                .portfolios
                .values()
                .map(|p| accountant::portfolio_stats(p, marks))
                .collect(),
            open_trades: self.open_trades().into_iter().cloned().collect(),
        }
    }

    // ==========================================================================
    // Persistence
    // ==========================================================================

    pub fn has_unsaved_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Copies of every portfolio changed since the last checkpoint.
    pub fn pending_checkpoints(&self) -> Vec<Portfolio> {
        self.dirty
            .iter()
            .filter_map(|strategy| self.portfolios.get(strategy))
            .cloned()
            .collect()
    }

    /// Clear the changed flag for checkpoints that were written. A strategy
    /// that moved on since its copy was taken stays pending.
    pub fn mark_persisted(&mut self, saved: &[Portfolio]) {
        for checkpoint in saved {
            let strategy = checkpoint.strategy();
            match self.portfolios.get(strategy) {
                Some(current) if current != checkpoint => {
                    debug!("{} changed while being saved, keeping it pending", strategy)
                }
                _ => {
                    self.dirty.remove(strategy);
                }
            }
        }
    }

    /// Write every changed strategy to `store`. Each strategy file is
    /// replaced atomically; on failure the remaining strategies stay marked
    /// as changed and the in-memory state is untouched.
    pub fn persist(&mut self, store: &PortfolioStore) -> Result<usize, EngineError> {
        let (saved, result) = write_checkpoints(store, self.pending_checkpoints());
        self.mark_persisted(&saved);
        result?;

        if !saved.is_empty() {
            debug!("Persisted {} portfolio(s)", saved.len());
        }
        Ok(saved.len())
    }
}

/// Save checkpoints in order, stopping at the first failure. Returns the
/// checkpoints written before it.
pub fn write_checkpoints(
    store: &PortfolioStore,
    pending: Vec<Portfolio>,
) -> (Vec<Portfolio>, Result<(), EngineError>) {
    let mut saved = Vec::with_capacity(pending.len());
    for portfolio in pending {
        if let Err(e) = store.save(&portfolio) {
            return (saved, Err(e));
        }
        saved.push(portfolio);
    }
    (saved, Ok(()))
}
