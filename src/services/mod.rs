pub mod accountant;
pub mod engine;
pub mod estimator;
pub mod quotes;
pub mod runner;
pub mod sizer;
pub mod store;
pub mod strike;

pub use accountant::{desk_stats, portfolio_stats, profit_factor};
pub use engine::TradingEngine;
pub use estimator::{round_to_tick, PremiumEstimator};
pub use quotes::{QuoteCache, QuoteSource, SimulatedFeed};
pub use runner::{TickReport, TickRunner};
pub use sizer::{exit_levels, PositionSizer, Sizing};
pub use store::PortfolioStore;
pub use strike::atm_strike;
