pub mod instrument;
pub mod portfolio;
pub mod trade;

pub use instrument::*;
pub use portfolio::*;
pub use trade::*;
