//! Turns a consensus signal into concrete risk parameters and persists the
//! resulting decision.

mod db;
mod store;
mod translate;

pub use db::SignalDb;
pub use store::{ClosedTradeRow, SignalStore};
pub use translate::{
    confidence_to_stars, is_actionable, translate, RiskParameters, BASE_ALLOCATION_PCT, STOP_LOSS_PCT, TARGET_PCT,
};
